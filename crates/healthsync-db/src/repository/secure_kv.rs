//! # Secure Key-Value Repository
//!
//! String values by key. The sync engine keeps the sealed credential and
//! device identity here; this layer never sees plaintext.

use chrono::{SecondsFormat, Utc};
use sqlx::SqlitePool;
use tracing::debug;

use crate::error::DbResult;

/// Repository for the `secure_kv` table.
#[derive(Debug, Clone)]
pub struct SecureKvRepository {
    pool: SqlitePool,
}

impl SecureKvRepository {
    /// Creates a new SecureKvRepository.
    pub fn new(pool: SqlitePool) -> Self {
        SecureKvRepository { pool }
    }

    /// Returns the value stored under `key`, if any.
    pub async fn get(&self, key: &str) -> DbResult<Option<String>> {
        let value: Option<String> = sqlx::query_scalar("SELECT value FROM secure_kv WHERE key = ?1")
            .bind(key)
            .fetch_optional(&self.pool)
            .await?;

        Ok(value)
    }

    /// Stores `value` under `key`, replacing any previous value.
    pub async fn set(&self, key: &str, value: &str) -> DbResult<()> {
        let now = Utc::now().to_rfc3339_opts(SecondsFormat::Micros, true);

        debug!(key = %key, "Writing secure value");

        sqlx::query(
            r#"
            INSERT INTO secure_kv (key, value, updated_at)
            VALUES (?1, ?2, ?3)
            ON CONFLICT(key) DO UPDATE SET
                value = excluded.value,
                updated_at = excluded.updated_at
            "#,
        )
        .bind(key)
        .bind(value)
        .bind(now)
        .execute(&self.pool)
        .await?;

        Ok(())
    }

    /// Removes `key`. Returns true if a value was present.
    pub async fn remove(&self, key: &str) -> DbResult<bool> {
        let result = sqlx::query("DELETE FROM secure_kv WHERE key = ?1")
            .bind(key)
            .execute(&self.pool)
            .await?;

        Ok(result.rows_affected() > 0)
    }
}
