//! # Domain Types
//!
//! Core domain types for HealthSync.
//!
//! ## Type Hierarchy
//! ```text
//! ┌─────────────────────────────────────────────────────────────────────────┐
//! │                          Domain Types                                   │
//! │                                                                         │
//! │  ┌─────────────────┐   ┌─────────────────┐   ┌─────────────────┐       │
//! │  │ MetricsSnapshot │   │   DailyReport   │   │   SyncOutcome   │       │
//! │  │  ─────────────  │   │  ─────────────  │   │  ─────────────  │       │
//! │  │  steps          │──►│  date           │   │  Success        │       │
//! │  │  active_minutes │   │  steps, ...     │   │  Retryable(..)  │       │
//! │  │  calories, ...  │   │  time_zone      │   │  Permanent(..)  │       │
//! │  └─────────────────┘   └─────────────────┘   └─────────────────┘       │
//! │        (source)             (wire)              (to scheduler)          │
//! └─────────────────────────────────────────────────────────────────────────┘
//! ```
//!
//! All types here are immutable values. A snapshot is produced by the data
//! source, turned into a report by [`crate::mapper`], and the result of an
//! upload attempt is folded into a [`SyncOutcome`].

use chrono::{DateTime, Duration, NaiveDate, TimeZone, Utc};
use serde::{Deserialize, Serialize};

use crate::error::CoreResult;

// =============================================================================
// Metrics Snapshot
// =============================================================================

/// A day's aggregated health totals as reported by the data source.
///
/// Every metric defaults to zero. The data source normalises "no data" to
/// zero before handing the snapshot over, so there is no partial state.
///
/// Field aliases accept both camelCase and snake_case keys so exported
/// snapshot files from different tools deserialize the same way.
#[derive(Debug, Clone, Copy, Default, PartialEq, Serialize, Deserialize)]
#[serde(default)]
pub struct MetricsSnapshot {
    /// Total step count.
    #[serde(alias = "totalSteps")]
    pub steps: u32,

    /// Hours with standing activity.
    #[serde(alias = "stand", alias = "standHours")]
    pub stand_hours: u32,

    /// Distance covered in meters.
    #[serde(alias = "distance", alias = "distanceMeters")]
    pub distance_meters: f64,

    /// Minutes spent in exercise sessions.
    #[serde(alias = "activeMinutes", alias = "totalActiveMinutes")]
    pub active_minutes: u32,

    /// Active energy burned (kcal).
    #[serde(alias = "activeCalories")]
    pub active_calories: f64,

    /// Total energy burned (kcal).
    #[serde(alias = "totalCalories", alias = "totalCaloriesBurned")]
    pub total_calories: f64,

    /// Basal metabolic energy for the day (kcal).
    #[serde(alias = "basalMetabolicRate")]
    pub basal_metabolic_rate: f64,

    /// Average heart rate (bpm).
    #[serde(alias = "averageHeartRate")]
    pub average_heart_rate: u32,

    /// Average resting heart rate (bpm).
    #[serde(alias = "averageRestingHeartRate")]
    pub average_resting_heart_rate: u32,
}

impl MetricsSnapshot {
    /// A snapshot with every metric at zero.
    pub fn zero() -> Self {
        Self::default()
    }

    /// Returns true if the source had no data at all for the day.
    pub fn is_empty(&self) -> bool {
        *self == Self::zero()
    }

    /// Decodes an exported snapshot. Missing metrics become zero.
    pub fn from_json(json: &str) -> CoreResult<Self> {
        Ok(serde_json::from_str(json)?)
    }
}

// =============================================================================
// Day Range
// =============================================================================

/// Half-open time range `[start, end)` covering one calendar day.
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub struct DayRange {
    /// The calendar day this range covers.
    pub date: NaiveDate,
    /// Start of the day (inclusive).
    pub start: DateTime<Utc>,
    /// Start of the next day (exclusive).
    pub end: DateTime<Utc>,
}

impl DayRange {
    /// Builds the range for `date` in the given time zone.
    ///
    /// Midnight that does not exist locally (DST gaps) falls back to the
    /// earliest valid interpretation, and finally to UTC midnight.
    pub fn for_date<Tz: TimeZone>(date: NaiveDate, tz: &Tz) -> Self {
        let start = local_midnight(date, tz);
        let end = local_midnight(date + Duration::days(1), tz);
        DayRange { date, start, end }
    }
}

fn local_midnight<Tz: TimeZone>(date: NaiveDate, tz: &Tz) -> DateTime<Utc> {
    let midnight = date.and_hms_opt(0, 0, 0).unwrap_or_default();
    tz.from_local_datetime(&midnight)
        .earliest()
        .map(|dt| dt.with_timezone(&Utc))
        .unwrap_or_else(|| Utc.from_utc_datetime(&midnight))
}

// =============================================================================
// Daily Report
// =============================================================================

/// The wire-format report for one calendar day.
///
/// ## Wire Shape
/// ```json
/// {
///   "date": "2024-03-05",
///   "steps": 8500,
///   "stand": 9,
///   "distance": 6120.5,
///   "activeMinutes": 42,
///   "activeCalories": 410.0,
///   "totalCalories": 2290.0,
///   "basalMetabolicRate": 1700.0,
///   "averageHeartRate": 74,
///   "averageRestingHeartRate": 58,
///   "timeZone": "+0100"
/// }
/// ```
///
/// The backend replaces by date, so resending an identical report is a no-op.
#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
#[serde(rename_all = "camelCase")]
pub struct DailyReport {
    /// Calendar date, `YYYY-MM-DD`.
    pub date: String,
    pub steps: u32,
    pub stand: u32,
    pub distance: f64,
    pub active_minutes: u32,
    pub active_calories: f64,
    pub total_calories: f64,
    pub basal_metabolic_rate: f64,
    pub average_heart_rate: u32,
    pub average_resting_heart_rate: u32,
    /// UTC offset of the device, e.g. `+0100`.
    pub time_zone: String,
}

// =============================================================================
// Sync Outcome
// =============================================================================

/// Why a sync attempt did not succeed.
#[derive(Debug, Clone, PartialEq, Eq, Serialize, Deserialize)]
#[serde(tag = "kind", rename_all = "snake_case")]
pub enum FailureReason {
    /// The health data source could not be reached at all.
    DataSourceUnavailable,

    /// The backend could not be reached (DNS, connect, timeout).
    NetworkUnreachable,

    /// The secure store holding the credential and device identity could
    /// not be read or written.
    CredentialStoreUnavailable,

    /// The backend answered with a 5xx status.
    ServerUnavailable { status: u16 },

    /// The backend rejected the device identity, the login or the
    /// (refreshed) credential.
    AuthRejected,

    /// The backend rejected the report itself (non-401 4xx).
    UploadRejected { status: u16 },
}

impl std::fmt::Display for FailureReason {
    fn fmt(&self, f: &mut std::fmt::Formatter<'_>) -> std::fmt::Result {
        match self {
            FailureReason::DataSourceUnavailable => write!(f, "health data source unavailable"),
            FailureReason::NetworkUnreachable => write!(f, "backend unreachable"),
            FailureReason::CredentialStoreUnavailable => {
                write!(f, "credential store unavailable")
            }
            FailureReason::ServerUnavailable { status } => {
                write!(f, "backend unavailable (HTTP {})", status)
            }
            FailureReason::AuthRejected => write!(f, "authentication rejected"),
            FailureReason::UploadRejected { status } => {
                write!(f, "report rejected by backend (HTTP {})", status)
            }
        }
    }
}

/// Result of one orchestration attempt, consumed by the host scheduler.
#[derive(Debug, Clone, PartialEq, Eq, Serialize, Deserialize)]
#[serde(tag = "outcome", content = "reason", rename_all = "snake_case")]
pub enum SyncOutcome {
    /// Report uploaded (or intentionally skipped by configuration).
    Success,

    /// Transient failure; the host scheduler may re-invoke with backoff.
    RetryableFailure(FailureReason),

    /// Retrying will not help without operator intervention.
    PermanentFailure(FailureReason),
}

impl SyncOutcome {
    /// Returns true for [`SyncOutcome::Success`].
    pub fn is_success(&self) -> bool {
        matches!(self, SyncOutcome::Success)
    }

    /// Returns true if the host scheduler should try again.
    pub fn is_retryable(&self) -> bool {
        matches!(self, SyncOutcome::RetryableFailure(_))
    }

    /// The failure reason, if any.
    pub fn reason(&self) -> Option<&FailureReason> {
        match self {
            SyncOutcome::Success => None,
            SyncOutcome::RetryableFailure(reason) | SyncOutcome::PermanentFailure(reason) => {
                Some(reason)
            }
        }
    }

    /// Short label used in logs and the run journal.
    pub fn kind(&self) -> &'static str {
        match self {
            SyncOutcome::Success => "success",
            SyncOutcome::RetryableFailure(_) => "retryable_failure",
            SyncOutcome::PermanentFailure(_) => "permanent_failure",
        }
    }
}

impl std::fmt::Display for SyncOutcome {
    fn fmt(&self, f: &mut std::fmt::Formatter<'_>) -> std::fmt::Result {
        match self {
            SyncOutcome::Success => write!(f, "success"),
            SyncOutcome::RetryableFailure(reason) => write!(f, "retryable failure: {}", reason),
            SyncOutcome::PermanentFailure(reason) => write!(f, "permanent failure: {}", reason),
        }
    }
}

// =============================================================================
// Unit Tests
// =============================================================================

#[cfg(test)]
mod tests {
    use super::*;
    use chrono::FixedOffset;

    #[test]
    fn test_snapshot_defaults_to_zero() {
        let snapshot = MetricsSnapshot::default();
        assert_eq!(snapshot.steps, 0);
        assert_eq!(snapshot.distance_meters, 0.0);
        assert!(snapshot.is_empty());
    }

    #[test]
    fn test_snapshot_accepts_camel_case_and_missing_fields() {
        let json = r#"{ "steps": 8500, "activeMinutes": 42, "totalCalories": 2100.5 }"#;
        let snapshot = MetricsSnapshot::from_json(json).unwrap();
        assert_eq!(snapshot.steps, 8500);
        assert_eq!(snapshot.active_minutes, 42);
        assert_eq!(snapshot.total_calories, 2100.5);
        assert_eq!(snapshot.average_heart_rate, 0);
    }

    #[test]
    fn test_snapshot_from_invalid_json_fails() {
        assert!(MetricsSnapshot::from_json("[1, 2]").is_err());
    }

    #[test]
    fn test_day_range_in_fixed_offset() {
        let tz = FixedOffset::east_opt(3600).unwrap();
        let date = NaiveDate::from_ymd_opt(2024, 3, 5).unwrap();
        let range = DayRange::for_date(date, &tz);

        assert_eq!(range.start.to_rfc3339(), "2024-03-04T23:00:00+00:00");
        assert_eq!(range.end - range.start, Duration::hours(24));
    }

    #[test]
    fn test_report_serializes_camel_case() {
        let report = DailyReport {
            date: "2024-03-05".to_string(),
            steps: 8500,
            stand: 0,
            distance: 0.0,
            active_minutes: 42,
            active_calories: 0.0,
            total_calories: 0.0,
            basal_metabolic_rate: 0.0,
            average_heart_rate: 0,
            average_resting_heart_rate: 0,
            time_zone: "+0100".to_string(),
        };
        let value = serde_json::to_value(&report).unwrap();
        assert_eq!(value["date"], "2024-03-05");
        assert_eq!(value["activeMinutes"], 42);
        assert_eq!(value["timeZone"], "+0100");
        assert!(value.get("active_minutes").is_none());
    }

    #[test]
    fn test_outcome_helpers() {
        assert!(SyncOutcome::Success.is_success());
        assert!(SyncOutcome::RetryableFailure(FailureReason::NetworkUnreachable).is_retryable());

        let permanent = SyncOutcome::PermanentFailure(FailureReason::AuthRejected);
        assert!(!permanent.is_retryable());
        assert_eq!(permanent.reason(), Some(&FailureReason::AuthRejected));
        assert_eq!(permanent.kind(), "permanent_failure");
    }

    #[test]
    fn test_failure_reason_display() {
        let reason = FailureReason::ServerUnavailable { status: 503 };
        assert_eq!(reason.to_string(), "backend unavailable (HTTP 503)");
    }
}
