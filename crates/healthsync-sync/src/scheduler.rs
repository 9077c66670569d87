//! # Scheduling
//!
//! Turns a [`ScheduleMode`] into a job registration and runs registered
//! jobs on tokio.
//!
//! ## Registration Flow
//! ```text
//! ┌─────────────────────────────────────────────────────────────────────────┐
//! │                                                                         │
//! │  ScheduleDriver::new(mode)                                             │
//! │       │  register(&scheduler, local now)                               │
//! │       ▼                                                                 │
//! │  schedule_next(now, mode)   (pure, healthsync-core)                    │
//! │       │                                                                 │
//! │       ├── Daily ──► register_recurring("health_data_sync", 24h, delay) │
//! │       └── Fast  ──► register_one_shot("health_data_sync_now", delay)   │
//! │                          │                                              │
//! │                          ▼                                              │
//! │  dyn HostScheduler (TokioScheduler)                                    │
//! │       • one task per job name, re-registering aborts the old task      │
//! │       • runs the SyncJob; RetryableFailure → exponential backoff       │
//! │       • Success / PermanentFailure end the slot                        │
//! └─────────────────────────────────────────────────────────────────────────┘
//! ```

use async_trait::async_trait;
use backoff::backoff::Backoff;
use backoff::ExponentialBackoff;
use chrono::NaiveDateTime;
use healthsync_core::{schedule_next, JobKind, ScheduleMode, ScheduledJobDescriptor, SyncOutcome};
use std::collections::HashMap;
use std::sync::{Arc, Mutex, MutexGuard};
use std::time::Duration;
use tokio::task::JoinHandle;
use tokio::time::{interval_at, Instant, MissedTickBehavior};
use tracing::{debug, info, warn};

use crate::config::RetrySettings;

// =============================================================================
// Traits
// =============================================================================

/// Something the scheduler can run.
#[async_trait]
pub trait SyncJob: Send + Sync {
    async fn run(&self, job_name: &str) -> SyncOutcome;
}

/// Host-side periodic job facility.
///
/// Registering a name that is already registered replaces it.
pub trait HostScheduler: Send + Sync {
    fn register_recurring(&self, name: &str, period: Duration, initial_delay: Duration);

    fn register_one_shot(&self, name: &str, delay: Duration);
}

// =============================================================================
// Schedule Driver
// =============================================================================

/// Registers the sync job according to an explicit [`ScheduleMode`].
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub struct ScheduleDriver {
    mode: ScheduleMode,
}

impl ScheduleDriver {
    pub fn new(mode: ScheduleMode) -> Self {
        ScheduleDriver { mode }
    }

    pub fn mode(&self) -> ScheduleMode {
        self.mode
    }

    /// Computes and registers the job as seen at local time `now`.
    pub fn register(
        &self,
        scheduler: &dyn HostScheduler,
        now: NaiveDateTime,
    ) -> ScheduledJobDescriptor {
        let job = schedule_next(now, self.mode);

        match job.kind {
            JobKind::Recurring {
                period,
                initial_delay,
            } => scheduler.register_recurring(&job.name, period, initial_delay),
            JobKind::OneShot { delay } => scheduler.register_one_shot(&job.name, delay),
        }

        info!(
            job = %job.name,
            mode = %self.mode,
            initial_delay_secs = job.initial_delay().as_secs(),
            "Sync job registered"
        );
        job
    }
}

// =============================================================================
// Retry Policy
// =============================================================================

/// Backoff between re-runs after a retryable outcome.
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub struct RetryPolicy {
    pub initial_interval: Duration,
    pub max_interval: Duration,
    /// Re-runs after the first attempt. Zero disables retries.
    pub max_retries: u32,
}

impl RetryPolicy {
    fn backoff(&self) -> ExponentialBackoff {
        ExponentialBackoff {
            initial_interval: self.initial_interval,
            max_interval: self.max_interval,
            multiplier: 2.0,
            max_elapsed_time: None,
            ..Default::default()
        }
    }
}

impl From<&RetrySettings> for RetryPolicy {
    fn from(settings: &RetrySettings) -> Self {
        RetryPolicy {
            initial_interval: settings.initial_backoff(),
            max_interval: settings.max_backoff(),
            max_retries: settings.max_attempts,
        }
    }
}

impl Default for RetryPolicy {
    fn default() -> Self {
        RetryPolicy::from(&RetrySettings::default())
    }
}

/// Runs `job` until it stops asking for a retry or retries run out.
pub async fn run_with_retries(job: &dyn SyncJob, name: &str, policy: RetryPolicy) -> SyncOutcome {
    let mut backoff = policy.backoff();
    let mut retries = 0u32;

    loop {
        let outcome = job.run(name).await;
        if !outcome.is_retryable() {
            return outcome;
        }

        if retries >= policy.max_retries {
            warn!(job = %name, retries, "Giving up until the next scheduled run");
            return outcome;
        }

        let Some(delay) = backoff.next_backoff() else {
            return outcome;
        };
        retries += 1;

        info!(
            job = %name,
            retry = retries,
            delay_ms = delay.as_millis() as u64,
            "Retrying sync after backoff"
        );
        tokio::time::sleep(delay).await;
    }
}

// =============================================================================
// Tokio Scheduler
// =============================================================================

/// [`HostScheduler`] that runs jobs as tokio tasks in this process.
pub struct TokioScheduler {
    job: Arc<dyn SyncJob>,
    policy: RetryPolicy,
    tasks: Mutex<HashMap<String, JoinHandle<()>>>,
}

impl TokioScheduler {
    /// Must be used from within a tokio runtime.
    pub fn new(job: Arc<dyn SyncJob>, policy: RetryPolicy) -> Self {
        TokioScheduler {
            job,
            policy,
            tasks: Mutex::new(HashMap::new()),
        }
    }

    /// Names of jobs whose task is still alive.
    pub fn active_jobs(&self) -> Vec<String> {
        let mut names: Vec<String> = self
            .tasks()
            .iter()
            .filter(|(_, handle)| !handle.is_finished())
            .map(|(name, _)| name.clone())
            .collect();
        names.sort();
        names
    }

    /// Stops and forgets the job with `name`. Returns true if it existed.
    pub fn cancel(&self, name: &str) -> bool {
        match self.tasks().remove(name) {
            Some(handle) => {
                handle.abort();
                debug!(job = %name, "Job cancelled");
                true
            }
            None => false,
        }
    }

    /// Stops every job.
    pub fn shutdown(&self) {
        let mut tasks = self.tasks();
        for (name, handle) in tasks.drain() {
            handle.abort();
            debug!(job = %name, "Job stopped");
        }
        info!("Scheduler stopped");
    }

    fn tasks(&self) -> MutexGuard<'_, HashMap<String, JoinHandle<()>>> {
        self.tasks.lock().unwrap_or_else(|poisoned| poisoned.into_inner())
    }

    fn install(&self, name: &str, handle: JoinHandle<()>) {
        if let Some(previous) = self.tasks().insert(name.to_string(), handle) {
            previous.abort();
            debug!(job = %name, "Replaced earlier registration");
        }
    }
}

impl HostScheduler for TokioScheduler {
    fn register_recurring(&self, name: &str, period: Duration, initial_delay: Duration) {
        let job = self.job.clone();
        let policy = self.policy;
        let job_name = name.to_string();

        let handle = tokio::spawn(async move {
            let mut ticks = interval_at(Instant::now() + initial_delay, period);
            ticks.set_missed_tick_behavior(MissedTickBehavior::Delay);

            loop {
                ticks.tick().await;
                let outcome = run_with_retries(job.as_ref(), &job_name, policy).await;
                debug!(job = %job_name, outcome = %outcome, "Scheduled run finished");
            }
        });

        self.install(name, handle);
    }

    fn register_one_shot(&self, name: &str, delay: Duration) {
        let job = self.job.clone();
        let policy = self.policy;
        let job_name = name.to_string();

        let handle = tokio::spawn(async move {
            tokio::time::sleep(delay).await;
            let outcome = run_with_retries(job.as_ref(), &job_name, policy).await;
            debug!(job = %job_name, outcome = %outcome, "One-shot run finished");
        });

        self.install(name, handle);
    }
}

impl Drop for TokioScheduler {
    fn drop(&mut self) {
        for handle in self.tasks().values() {
            handle.abort();
        }
    }
}
