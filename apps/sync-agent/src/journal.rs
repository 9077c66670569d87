//! # Sync Run Journal
//!
//! Runs the orchestrator for the scheduler and leaves a row in `sync_runs`
//! for every attempt.
//!
//! ```text
//! TokioScheduler ──► JournalingJob::run("health_data_sync")
//!                         │  now = Local::now()   (read once)
//!                         ├──► orchestrator.run_for_date(now.date, now.offset)
//!                         └──► sync_runs.record(job, now.date, outcome)
//! ```
//!
//! The journaled report date is the date that was synced, even when the
//! attempt straddles midnight. A journal write failure is logged and never
//! changes the outcome the scheduler sees.

use async_trait::async_trait;
use chrono::{FixedOffset, Local, NaiveDate};
use healthsync_core::SyncOutcome;
use healthsync_db::SyncRunRepository;
use healthsync_sync::{SyncJob, SyncOrchestrator};
use std::sync::Arc;
use tracing::{debug, warn};

/// Runs the orchestrator and records each outcome.
pub struct JournalingJob {
    orchestrator: Arc<SyncOrchestrator>,
    runs: SyncRunRepository,
}

impl JournalingJob {
    pub fn new(orchestrator: Arc<SyncOrchestrator>, runs: SyncRunRepository) -> Self {
        JournalingJob { orchestrator, runs }
    }

    /// Syncs `date` and journals the outcome under that same date.
    pub async fn run_on(
        &self,
        job_name: &str,
        date: NaiveDate,
        offset: FixedOffset,
    ) -> SyncOutcome {
        let outcome = self.orchestrator.run_for_date(date, offset).await;

        match self.runs.record(job_name, date, &outcome).await {
            Ok(run) => debug!(id = %run.id, outcome = %run.outcome, "Sync run journaled"),
            Err(e) => warn!(error = %e, job = %job_name, "Failed to journal sync run"),
        }

        outcome
    }
}

#[async_trait]
impl SyncJob for JournalingJob {
    async fn run(&self, job_name: &str) -> SyncOutcome {
        let now = Local::now();
        self.run_on(job_name, now.date_naive(), *now.offset()).await
    }
}
