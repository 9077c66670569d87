//! # Secure Key-Value Store
//!
//! The storage boundary for the credential and the device identity.
//!
//! ```text
//! ┌─────────────────────────────────────────────────────────────────────────┐
//! │  TokenStore ──┐                                                         │
//! │               ├──► dyn SecureKeyValueStore                              │
//! │  DeviceIdentity┘        │                                               │
//! │                         ├── SqliteKeyValueStore  (agent, secure_kv,     │
//! │                         │                         AES-256-GCM at rest)  │
//! │                         └── InMemoryKeyValueStore (tests)               │
//! └─────────────────────────────────────────────────────────────────────────┘
//! ```
//!
//! Each `set` replaces one key atomically. Nothing here relies on
//! multi-key transactions.
//!
//! `SqliteKeyValueStore` seals every value with the install's
//! [`StoreKey`]. A row that does not open under that key (key rotated, row
//! written before encryption, tampering) reads as absent, so the credential
//! is re-requested and the device identity regenerated.

use async_trait::async_trait;
use healthsync_db::SecureKvRepository;
use std::collections::HashMap;
use tokio::sync::RwLock;
use tracing::warn;

use crate::cipher::StoreKey;
use crate::error::StoreError;

/// Async string store keyed by name.
#[async_trait]
pub trait SecureKeyValueStore: Send + Sync {
    /// Returns the value under `key`, or `None` if absent.
    async fn get(&self, key: &str) -> Result<Option<String>, StoreError>;

    /// Stores `value` under `key`, replacing any previous value.
    async fn set(&self, key: &str, value: &str) -> Result<(), StoreError>;

    /// Removes `key`. Removing an absent key is not an error.
    async fn remove(&self, key: &str) -> Result<(), StoreError>;
}

// =============================================================================
// SQLite-backed Store
// =============================================================================

/// Encrypted store backed by the `secure_kv` table.
#[derive(Debug, Clone)]
pub struct SqliteKeyValueStore {
    repo: SecureKvRepository,
    key: StoreKey,
}

impl SqliteKeyValueStore {
    pub fn new(repo: SecureKvRepository, key: StoreKey) -> Self {
        SqliteKeyValueStore { repo, key }
    }
}

#[async_trait]
impl SecureKeyValueStore for SqliteKeyValueStore {
    async fn get(&self, key: &str) -> Result<Option<String>, StoreError> {
        let Some(sealed) = self.repo.get(key).await? else {
            return Ok(None);
        };

        match self.key.open(key, &sealed) {
            Ok(value) => Ok(Some(value)),
            Err(e) => {
                warn!(key = %key, error = %e, "Ignoring undecryptable stored value");
                Ok(None)
            }
        }
    }

    async fn set(&self, key: &str, value: &str) -> Result<(), StoreError> {
        let sealed = self.key.seal(key, value)?;
        Ok(self.repo.set(key, &sealed).await?)
    }

    async fn remove(&self, key: &str) -> Result<(), StoreError> {
        self.repo.remove(key).await?;
        Ok(())
    }
}

// =============================================================================
// In-memory Store
// =============================================================================

/// Process-local store for tests and dry runs.
#[derive(Debug, Default)]
pub struct InMemoryKeyValueStore {
    values: RwLock<HashMap<String, String>>,
}

impl InMemoryKeyValueStore {
    pub fn new() -> Self {
        Self::default()
    }

    /// Number of stored keys.
    pub async fn len(&self) -> usize {
        self.values.read().await.len()
    }

    pub async fn is_empty(&self) -> bool {
        self.values.read().await.is_empty()
    }
}

#[async_trait]
impl SecureKeyValueStore for InMemoryKeyValueStore {
    async fn get(&self, key: &str) -> Result<Option<String>, StoreError> {
        Ok(self.values.read().await.get(key).cloned())
    }

    async fn set(&self, key: &str, value: &str) -> Result<(), StoreError> {
        self.values
            .write()
            .await
            .insert(key.to_string(), value.to_string());
        Ok(())
    }

    async fn remove(&self, key: &str) -> Result<(), StoreError> {
        self.values.write().await.remove(key);
        Ok(())
    }
}
