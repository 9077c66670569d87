//! # Report Mapper
//!
//! Converts a [`MetricsSnapshot`] and a calendar date into the wire-format
//! [`DailyReport`].
//!
//! ```text
//!   MetricsSnapshot ──┐
//!   NaiveDate ────────┼──► map_report() ──► DailyReport
//!   FixedOffset ──────┘
//! ```
//!
//! The mapping is pure: no clock, no locale, no failure path. Calling it twice
//! with the same inputs yields field-for-field equal reports, which is what
//! makes a re-upload after an ambiguous network failure safe.

use chrono::{FixedOffset, NaiveDate};

use crate::types::{DailyReport, MetricsSnapshot};

/// Date format used on the wire (ISO 8601 calendar date).
pub const REPORT_DATE_FORMAT: &str = "%Y-%m-%d";

/// Maps a snapshot for `date` into a report stamped with `offset`.
///
/// ## Example
/// ```rust
/// use chrono::{FixedOffset, NaiveDate};
/// use healthsync_core::mapper::map_report;
/// use healthsync_core::MetricsSnapshot;
///
/// let snapshot = MetricsSnapshot { steps: 8500, active_minutes: 42, ..Default::default() };
/// let date = NaiveDate::from_ymd_opt(2024, 3, 5).unwrap();
/// let offset = FixedOffset::east_opt(3600).unwrap();
///
/// let report = map_report(&snapshot, date, offset);
/// assert_eq!(report.date, "2024-03-05");
/// assert_eq!(report.steps, 8500);
/// assert_eq!(report.time_zone, "+0100");
/// ```
pub fn map_report(snapshot: &MetricsSnapshot, date: NaiveDate, offset: FixedOffset) -> DailyReport {
    DailyReport {
        date: format_report_date(date),
        steps: snapshot.steps,
        stand: snapshot.stand_hours,
        distance: snapshot.distance_meters,
        active_minutes: snapshot.active_minutes,
        active_calories: snapshot.active_calories,
        total_calories: snapshot.total_calories,
        basal_metabolic_rate: snapshot.basal_metabolic_rate,
        average_heart_rate: snapshot.average_heart_rate,
        average_resting_heart_rate: snapshot.average_resting_heart_rate,
        time_zone: format_offset(offset),
    }
}

/// Formats a date as `YYYY-MM-DD`.
pub fn format_report_date(date: NaiveDate) -> String {
    date.format(REPORT_DATE_FORMAT).to_string()
}

/// Formats a UTC offset as `+HHMM` / `-HHMM`.
pub fn format_offset(offset: FixedOffset) -> String {
    let seconds = offset.local_minus_utc();
    let sign = if seconds < 0 { '-' } else { '+' };
    let minutes = seconds.abs() / 60;
    format!("{}{:02}{:02}", sign, minutes / 60, minutes % 60)
}

// =============================================================================
// Unit Tests
// =============================================================================
