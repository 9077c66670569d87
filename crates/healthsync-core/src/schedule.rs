//! # Schedule Math
//!
//! Pure computation of when the next sync job should run.
//!
//! ## Modes
//! ```text
//! ┌─────────────────────────────────────────────────────────────────────────┐
//! │                          Schedule Modes                                 │
//! │                                                                         │
//! │  DAILY (production)                                                    │
//! │  ──────────────────                                                    │
//! │  now = 22:00, target = 23:57                                           │
//! │     │                                                                   │
//! │     ▼                                                                   │
//! │  initial delay = 117 min ──► then every 24h                            │
//! │                                                                         │
//! │  now = 00:10, target = 23:57 ──► 23:57 the same calendar day          │
//! │  now = 23:58, target = 23:57 (passed) ──► tomorrow 23:57               │
//! │                                                                         │
//! │  FAST (manual "sync now" / testing)                                    │
//! │  ──────────────────────────────────                                    │
//! │  one-shot job after a short fixed delay                                │
//! └─────────────────────────────────────────────────────────────────────────┘
//! ```
//!
//! Registration with a real scheduler lives in the sync engine; this module
//! only produces a [`ScheduledJobDescriptor`].

use std::time::Duration;

use chrono::{Duration as ChronoDuration, NaiveDateTime, NaiveTime};
use serde::{Deserialize, Serialize};

/// Logical name of the recurring daily job.
pub const DAILY_JOB_NAME: &str = "health_data_sync";

/// Logical name of the one-shot "sync now" job.
pub const ONE_SHOT_JOB_NAME: &str = "health_data_sync_now";

/// Period of the daily job.
pub const DAILY_PERIOD: Duration = Duration::from_secs(24 * 60 * 60);

/// Default target time-of-day for the daily sync (23:57 local).
pub fn default_daily_time() -> NaiveTime {
    NaiveTime::from_hms_opt(23, 57, 0).unwrap_or_default()
}

/// Default delay for the one-shot job.
pub const DEFAULT_FAST_DELAY: Duration = Duration::from_secs(60);

// =============================================================================
// Schedule Mode
// =============================================================================

/// How the sync job is scheduled.
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub enum ScheduleMode {
    /// Once a day at a fixed local time-of-day.
    Daily { at: NaiveTime },

    /// A single run after a short fixed delay.
    Fast { delay: Duration },
}

impl Default for ScheduleMode {
    fn default() -> Self {
        ScheduleMode::Daily {
            at: default_daily_time(),
        }
    }
}

impl std::fmt::Display for ScheduleMode {
    fn fmt(&self, f: &mut std::fmt::Formatter<'_>) -> std::fmt::Result {
        match self {
            ScheduleMode::Daily { at } => write!(f, "daily at {}", at.format("%H:%M")),
            ScheduleMode::Fast { delay } => write!(f, "one-shot in {}s", delay.as_secs()),
        }
    }
}

// =============================================================================
// Job Descriptor
// =============================================================================

/// What kind of job to register with the host scheduler.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Serialize, Deserialize)]
#[serde(tag = "kind", rename_all = "snake_case")]
pub enum JobKind {
    /// Runs after `initial_delay`, then every `period`.
    Recurring {
        period: Duration,
        initial_delay: Duration,
    },

    /// Runs once after `delay`.
    OneShot { delay: Duration },
}

/// A fully computed job registration.
///
/// Registering a descriptor always replaces an earlier registration with the
/// same `name`, so at most one instance per logical name is active.
#[derive(Debug, Clone, PartialEq, Eq, Serialize, Deserialize)]
pub struct ScheduledJobDescriptor {
    /// Logical job name used for de-duplication.
    pub name: String,
    /// Timing of the job.
    pub kind: JobKind,
}

impl ScheduledJobDescriptor {
    /// Delay before the first run.
    pub fn initial_delay(&self) -> Duration {
        match self.kind {
            JobKind::Recurring { initial_delay, .. } => initial_delay,
            JobKind::OneShot { delay } => delay,
        }
    }

    /// Period between runs, if recurring.
    pub fn period(&self) -> Option<Duration> {
        match self.kind {
            JobKind::Recurring { period, .. } => Some(period),
            JobKind::OneShot { .. } => None,
        }
    }
}

// =============================================================================
// Computation
// =============================================================================

/// Computes the job registration for `mode` as seen at local time `now`.
///
/// ## Example
/// ```rust
/// use chrono::{NaiveDate, NaiveTime};
/// use healthsync_core::schedule::{schedule_next, ScheduleMode};
///
/// let now = NaiveDate::from_ymd_opt(2024, 1, 1).unwrap().and_hms_opt(22, 0, 0).unwrap();
/// let mode = ScheduleMode::Daily { at: NaiveTime::from_hms_opt(23, 57, 0).unwrap() };
///
/// let job = schedule_next(now, mode);
/// assert_eq!(job.initial_delay().as_secs(), 117 * 60);
/// ```
pub fn schedule_next(now: NaiveDateTime, mode: ScheduleMode) -> ScheduledJobDescriptor {
    match mode {
        ScheduleMode::Daily { at } => {
            let minutes = minutes_until_next(now, at);
            ScheduledJobDescriptor {
                name: DAILY_JOB_NAME.to_string(),
                kind: JobKind::Recurring {
                    period: DAILY_PERIOD,
                    initial_delay: Duration::from_secs(minutes * 60),
                },
            }
        }
        ScheduleMode::Fast { delay } => ScheduledJobDescriptor {
            name: ONE_SHOT_JOB_NAME.to_string(),
            kind: JobKind::OneShot { delay },
        },
    }
}

/// Whole minutes (truncated) from `now` to the next occurrence of `at`.
///
/// If `now` is exactly at the target, the target is today and the delay is
/// zero. Only a strictly later `now` rolls over to tomorrow.
pub fn minutes_until_next(now: NaiveDateTime, at: NaiveTime) -> u64 {
    let today_target = now.date().and_time(at);
    let target = if now > today_target {
        today_target + ChronoDuration::days(1)
    } else {
        today_target
    };
    (target - now).num_minutes().max(0) as u64
}

// =============================================================================
// Unit Tests
// =============================================================================
