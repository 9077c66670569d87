//! # Sync Run Journal
//!
//! One row per orchestration attempt. The agent writes an entry after every
//! run so an operator can see when the last report went out and why the
//! failed ones failed.
//!
//! ```text
//! ┌─────────────────────────────────────────────────────────────────────────┐
//! │  SyncOrchestrator::run()  ──►  SyncOutcome                             │
//! │                                    │                                    │
//! │                                    ▼                                    │
//! │  sync_runs.record("health_data_sync", 2024-03-05, &outcome)            │
//! │                                    │                                    │
//! │                                    ▼                                    │
//! │  ┌──────────┬──────────────────┬────────────┬───────────────────────┐  │
//! │  │ id       │ job_name         │ outcome    │ reason                │  │
//! │  ├──────────┼──────────────────┼────────────┼───────────────────────┤  │
//! │  │ 7f3a...  │ health_data_sync │ success    │ NULL                  │  │
//! │  │ 91c0...  │ health_data_sync │ retryable_ │ backend unreachable   │  │
//! │  └──────────┴──────────────────┴────────────┴───────────────────────┘  │
//! │                                                                         │
//! │  cleanup_older_than(30) trims the table on agent startup               │
//! └─────────────────────────────────────────────────────────────────────────┘
//! ```

use chrono::{DateTime, Duration, NaiveDate, SecondsFormat, Utc};
use sqlx::sqlite::SqliteRow;
use sqlx::{Row, SqlitePool};
use tracing::debug;
use uuid::Uuid;

use crate::error::{DbError, DbResult};
use healthsync_core::mapper::format_report_date;
use healthsync_core::SyncOutcome;

/// A journal entry for one sync attempt.
#[derive(Debug, Clone, PartialEq)]
pub struct SyncRun {
    pub id: String,
    pub job_name: String,
    /// Report date the attempt was for, `YYYY-MM-DD`.
    pub report_date: String,
    /// One of `success`, `retryable_failure`, `permanent_failure`.
    pub outcome: String,
    /// Human-readable failure reason, `None` on success.
    pub reason: Option<String>,
    pub attempted_at: DateTime<Utc>,
}

impl SyncRun {
    /// Returns true if this attempt uploaded successfully.
    pub fn is_success(&self) -> bool {
        self.outcome == "success"
    }

    fn from_row(row: &SqliteRow) -> DbResult<Self> {
        let attempted_at: String = row.try_get("attempted_at")?;
        let attempted_at = DateTime::parse_from_rfc3339(&attempted_at)
            .map_err(|e| DbError::corrupt("sync_runs", e.to_string()))?
            .with_timezone(&Utc);

        Ok(SyncRun {
            id: row.try_get("id")?,
            job_name: row.try_get("job_name")?,
            report_date: row.try_get("report_date")?,
            outcome: row.try_get("outcome")?,
            reason: row.try_get("reason")?,
            attempted_at,
        })
    }
}

/// Timestamps are stored as fixed-width RFC 3339 so text comparison orders them.
fn encode_timestamp(at: DateTime<Utc>) -> String {
    at.to_rfc3339_opts(SecondsFormat::Micros, true)
}

/// Repository for the `sync_runs` table.
#[derive(Debug, Clone)]
pub struct SyncRunRepository {
    pool: SqlitePool,
}

impl SyncRunRepository {
    /// Creates a new SyncRunRepository.
    pub fn new(pool: SqlitePool) -> Self {
        SyncRunRepository { pool }
    }

    /// Records an attempt that finished now.
    pub async fn record(
        &self,
        job_name: &str,
        report_date: NaiveDate,
        outcome: &SyncOutcome,
    ) -> DbResult<SyncRun> {
        self.record_at(job_name, report_date, outcome, Utc::now())
            .await
    }

    /// Records an attempt with an explicit timestamp.
    pub async fn record_at(
        &self,
        job_name: &str,
        report_date: NaiveDate,
        outcome: &SyncOutcome,
        attempted_at: DateTime<Utc>,
    ) -> DbResult<SyncRun> {
        let run = SyncRun {
            id: Uuid::new_v4().to_string(),
            job_name: job_name.to_string(),
            report_date: format_report_date(report_date),
            outcome: outcome.kind().to_string(),
            reason: outcome.reason().map(|r| r.to_string()),
            attempted_at,
        };

        debug!(
            job = %run.job_name,
            date = %run.report_date,
            outcome = %run.outcome,
            "Recording sync run"
        );

        sqlx::query(
            r#"
            INSERT INTO sync_runs (id, job_name, report_date, outcome, reason, attempted_at)
            VALUES (?1, ?2, ?3, ?4, ?5, ?6)
            "#,
        )
        .bind(&run.id)
        .bind(&run.job_name)
        .bind(&run.report_date)
        .bind(&run.outcome)
        .bind(&run.reason)
        .bind(encode_timestamp(run.attempted_at))
        .execute(&self.pool)
        .await?;

        Ok(run)
    }

    /// The most recent attempt, if any.
    pub async fn latest(&self) -> DbResult<Option<SyncRun>> {
        let row = sqlx::query(
            r#"
            SELECT id, job_name, report_date, outcome, reason, attempted_at
            FROM sync_runs
            ORDER BY attempted_at DESC
            LIMIT 1
            "#,
        )
        .fetch_optional(&self.pool)
        .await?;

        row.as_ref().map(SyncRun::from_row).transpose()
    }

    /// The most recent successful attempt, if any.
    pub async fn latest_success(&self) -> DbResult<Option<SyncRun>> {
        let row = sqlx::query(
            r#"
            SELECT id, job_name, report_date, outcome, reason, attempted_at
            FROM sync_runs
            WHERE outcome = 'success'
            ORDER BY attempted_at DESC
            LIMIT 1
            "#,
        )
        .fetch_optional(&self.pool)
        .await?;

        row.as_ref().map(SyncRun::from_row).transpose()
    }

    /// Counts attempts with the given outcome kind (see [`SyncOutcome::kind`]).
    pub async fn count_by_outcome(&self, kind: &str) -> DbResult<i64> {
        let count: i64 = sqlx::query_scalar("SELECT COUNT(*) FROM sync_runs WHERE outcome = ?1")
            .bind(kind)
            .fetch_one(&self.pool)
            .await?;

        Ok(count)
    }

    /// Deletes entries older than `days_old` days.
    ///
    /// A window reaching past the earliest representable date keeps everything.
    ///
    /// ## Returns
    /// Number of deleted entries.
    pub async fn cleanup_older_than(&self, days_old: u32) -> DbResult<u64> {
        let cutoff = Duration::try_days(i64::from(days_old))
            .and_then(|window| Utc::now().checked_sub_signed(window));
        let Some(cutoff) = cutoff else {
            debug!(days_old, "Retention window covers all time, nothing to prune");
            return Ok(0);
        };

        let result = sqlx::query("DELETE FROM sync_runs WHERE attempted_at < ?1")
            .bind(encode_timestamp(cutoff))
            .execute(&self.pool)
            .await?;

        Ok(result.rows_affected())
    }
}
