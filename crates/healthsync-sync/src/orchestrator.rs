//! # Sync Orchestrator
//!
//! Drives one sync attempt end to end and folds everything that can go
//! wrong into a [`SyncOutcome`] for the host scheduler.
//!
//! ## State Machine
//! ```text
//! ┌─────────────────────────────────────────────────────────────────────────┐
//! │                         One Sync Attempt                                │
//! │                                                                         │
//! │  Idle                                                                  │
//! │   │                                                                     │
//! │   ▼                                                                     │
//! │  FetchingData ── source unreachable ──────────► RetryPending            │
//! │   │  map snapshot → DailyReport                 (DataSourceUnavailable) │
//! │   ▼                                                                     │
//! │  Authenticating ── Unreachable ───────────────► RetryPending            │
//! │   │             ├─ StoreUnavailable ──────────► RetryPending            │
//! │   │             └─ Rejected ──────────────────► FailedPermanently       │
//! │   ▼                                                                     │
//! │  Uploading                                                             │
//! │   ├── 2xx ────────────────────────────────────► Succeeded               │
//! │   ├── 401 ── refresh() ── fails ──────────────► FailedPermanently       │
//! │   │              │                                                      │
//! │   │              └── ok ── upload once more ── 401 ► FailedPermanently  │
//! │   │                             └── else: same table as below           │
//! │   ├── other 4xx ──────────────────────────────► FailedPermanently       │
//! │   ├── 5xx ────────────────────────────────────► RetryPending            │
//! │   └── no response ────────────────────────────► RetryPending            │
//! └─────────────────────────────────────────────────────────────────────────┘
//! ```
//!
//! A refresh that fails with `StoreUnavailable` (stale credential could not
//! be cleared) is retryable like any other store failure.
//!
//! The orchestrator never sleeps and never retries beyond the single
//! post-refresh upload. Backoff belongs to the host scheduler.

use async_trait::async_trait;
use chrono::{DateTime, FixedOffset, Local, NaiveDate, Utc};
use healthsync_core::{map_report, DailyReport, DayRange, FailureReason, SyncOutcome};
use std::sync::Arc;
use tokio::sync::RwLock;
use tracing::{debug, error, info, warn};

use crate::error::AuthError;
use crate::scheduler::SyncJob;
use crate::source::HealthDataSource;
use crate::token_manager::TokenManager;
use crate::transport::{SyncTransport, UploadStatus};

// =============================================================================
// Status
// =============================================================================

/// Where the orchestrator currently is.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Default)]
pub enum SyncPhase {
    #[default]
    Idle,
    FetchingData,
    Authenticating,
    Uploading,
    Succeeded,
    RetryPending,
    FailedPermanently,
}

impl std::fmt::Display for SyncPhase {
    fn fmt(&self, f: &mut std::fmt::Formatter<'_>) -> std::fmt::Result {
        let label = match self {
            SyncPhase::Idle => "idle",
            SyncPhase::FetchingData => "fetching_data",
            SyncPhase::Authenticating => "authenticating",
            SyncPhase::Uploading => "uploading",
            SyncPhase::Succeeded => "succeeded",
            SyncPhase::RetryPending => "retry_pending",
            SyncPhase::FailedPermanently => "failed_permanently",
        };
        write!(f, "{}", label)
    }
}

/// Observable state of the orchestrator.
#[derive(Debug, Clone, Default, PartialEq)]
pub struct SyncStatus {
    pub phase: SyncPhase,
    pub last_outcome: Option<SyncOutcome>,
    pub last_success_at: Option<DateTime<Utc>>,
    pub last_error: Option<String>,
}

// =============================================================================
// Notifications
// =============================================================================

/// Receives a signal after each successful upload.
pub trait SyncNotifier: Send + Sync {
    fn sync_completed(&self, report: &DailyReport);
}

/// Writes the completion notice to the log.
#[derive(Debug, Default, Clone, Copy)]
pub struct LogNotifier;

impl SyncNotifier for LogNotifier {
    fn sync_completed(&self, report: &DailyReport) {
        info!(date = %report.date, steps = report.steps, "Health data sync completed");
    }
}

/// Discards notifications.
#[derive(Debug, Default, Clone, Copy)]
pub struct NoOpNotifier;

impl SyncNotifier for NoOpNotifier {
    fn sync_completed(&self, _report: &DailyReport) {}
}

// =============================================================================
// Orchestrator
// =============================================================================

/// Runs sync attempts.
pub struct SyncOrchestrator {
    source: Arc<dyn HealthDataSource>,
    tokens: Arc<TokenManager>,
    transport: Arc<dyn SyncTransport>,
    notifier: Arc<dyn SyncNotifier>,
    upload_enabled: bool,
    status: RwLock<SyncStatus>,
}

impl SyncOrchestrator {
    /// Creates an orchestrator with uploads enabled and log notifications.
    pub fn new(
        source: Arc<dyn HealthDataSource>,
        tokens: Arc<TokenManager>,
        transport: Arc<dyn SyncTransport>,
    ) -> Self {
        SyncOrchestrator {
            source,
            tokens,
            transport,
            notifier: Arc::new(LogNotifier),
            upload_enabled: true,
            status: RwLock::new(SyncStatus::default()),
        }
    }

    /// Replaces the success notifier.
    pub fn with_notifier(mut self, notifier: Arc<dyn SyncNotifier>) -> Self {
        self.notifier = notifier;
        self
    }

    /// When disabled, attempts build and log the report but skip auth and upload.
    pub fn with_upload_enabled(mut self, enabled: bool) -> Self {
        self.upload_enabled = enabled;
        self
    }

    /// Snapshot of the current status.
    pub async fn status(&self) -> SyncStatus {
        self.status.read().await.clone()
    }

    /// Syncs "today" as seen in the device's local time zone.
    pub async fn run(&self) -> SyncOutcome {
        let now = Local::now();
        self.run_for_date(now.date_naive(), *now.offset()).await
    }

    /// Syncs the report for `date`, stamped with the UTC `offset`.
    pub async fn run_for_date(&self, date: NaiveDate, offset: FixedOffset) -> SyncOutcome {
        info!(date = %date, "Starting health data sync");

        let (outcome, report) = self.attempt(date, offset).await;
        self.finish(&outcome).await;

        match &outcome {
            SyncOutcome::Success => {
                info!(date = %date, "Sync succeeded");
                if let Some(report) = report {
                    self.notifier.sync_completed(&report);
                }
            }
            SyncOutcome::RetryableFailure(reason) => {
                warn!(date = %date, reason = %reason, "Sync failed, retry pending")
            }
            SyncOutcome::PermanentFailure(reason) => {
                error!(date = %date, reason = %reason, "Sync failed permanently")
            }
        }

        outcome
    }

    async fn attempt(
        &self,
        date: NaiveDate,
        offset: FixedOffset,
    ) -> (SyncOutcome, Option<DailyReport>) {
        self.set_phase(SyncPhase::FetchingData).await;

        let range = DayRange::for_date(date, &offset);
        let snapshot = match self.source.read_snapshot(range).await {
            Ok(snapshot) => snapshot,
            Err(e) => {
                warn!(error = %e, "Could not read health data");
                return (
                    SyncOutcome::RetryableFailure(FailureReason::DataSourceUnavailable),
                    None,
                );
            }
        };

        let report = map_report(&snapshot, date, offset);
        debug!(
            date = %report.date,
            steps = report.steps,
            active_minutes = report.active_minutes,
            time_zone = %report.time_zone,
            "Report built"
        );

        if !self.upload_enabled {
            info!(date = %report.date, "Upload disabled, report not sent");
            return (SyncOutcome::Success, None);
        }

        self.set_phase(SyncPhase::Authenticating).await;

        let credential = match self.tokens.get_valid_credential().await {
            Ok(credential) => credential,
            Err(e) => return (outcome_for_auth_error(&e), None),
        };

        self.set_phase(SyncPhase::Uploading).await;

        let status = self
            .transport
            .upload_report(&credential.access_token, &report)
            .await;

        let outcome = if status == UploadStatus::Unauthorized {
            info!("Upload unauthorized, refreshing credential");
            match self.tokens.refresh().await {
                Ok(refreshed) => {
                    let retry = self
                        .transport
                        .upload_report(&refreshed.access_token, &report)
                        .await;
                    outcome_for_upload(retry)
                }
                Err(e) => {
                    warn!(error = %e, "Refresh after 401 failed");
                    outcome_for_auth_error(&e)
                }
            }
        } else {
            outcome_for_upload(status)
        };

        (outcome, Some(report))
    }

    async fn set_phase(&self, phase: SyncPhase) {
        debug!(phase = %phase, "Sync phase");
        self.status.write().await.phase = phase;
    }

    async fn finish(&self, outcome: &SyncOutcome) {
        let mut status = self.status.write().await;
        status.phase = match outcome {
            SyncOutcome::Success => SyncPhase::Succeeded,
            SyncOutcome::RetryableFailure(_) => SyncPhase::RetryPending,
            SyncOutcome::PermanentFailure(_) => SyncPhase::FailedPermanently,
        };
        match outcome.reason() {
            None => {
                status.last_success_at = Some(Utc::now());
                status.last_error = None;
            }
            Some(reason) => status.last_error = Some(reason.to_string()),
        }
        status.last_outcome = Some(outcome.clone());
    }
}

fn outcome_for_auth_error(error: &AuthError) -> SyncOutcome {
    match error {
        AuthError::Unreachable(_) => {
            SyncOutcome::RetryableFailure(FailureReason::NetworkUnreachable)
        }
        AuthError::Rejected(_) => SyncOutcome::PermanentFailure(FailureReason::AuthRejected),
        AuthError::StoreUnavailable(_) => {
            SyncOutcome::RetryableFailure(FailureReason::CredentialStoreUnavailable)
        }
    }
}

/// Maps a classified upload response to the attempt outcome.
///
/// A 401 here is final: it is only reached for the post-refresh upload.
fn outcome_for_upload(status: UploadStatus) -> SyncOutcome {
    match status {
        UploadStatus::Accepted => SyncOutcome::Success,
        UploadStatus::Unauthorized => SyncOutcome::PermanentFailure(FailureReason::AuthRejected),
        UploadStatus::Rejected { status } => {
            SyncOutcome::PermanentFailure(FailureReason::UploadRejected { status })
        }
        UploadStatus::ServerError { status } => {
            SyncOutcome::RetryableFailure(FailureReason::ServerUnavailable { status })
        }
        UploadStatus::Unreachable { reason } => {
            debug!(reason = %reason, "Upload got no response");
            SyncOutcome::RetryableFailure(FailureReason::NetworkUnreachable)
        }
    }
}

#[async_trait]
impl SyncJob for SyncOrchestrator {
    async fn run(&self, job_name: &str) -> SyncOutcome {
        debug!(job = %job_name, "Job triggered");
        SyncOrchestrator::run(self).await
    }
}
