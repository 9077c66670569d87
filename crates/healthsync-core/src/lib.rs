//! # healthsync-core: Pure Logic for HealthSync
//!
//! This crate holds the data model of the daily health sync, the report
//! mapper and the schedule math, all as pure functions with zero I/O.
//!
//! ## Architecture Position
//! ```text
//! ┌─────────────────────────────────────────────────────────────────────────┐
//! │                        HealthSync Architecture                          │
//! │                                                                         │
//! │  ┌─────────────────────────────────────────────────────────────────┐   │
//! │  │                    apps/sync-agent                              │   │
//! │  │     config ──► schedule ──► orchestrator ──► run journal       │   │
//! │  └─────────────────────────────┬───────────────────────────────────┘   │
//! │                                │                                        │
//! │  ┌─────────────────────────────▼───────────────────────────────────┐   │
//! │  │                    healthsync-sync                              │   │
//! │  │   TokenManager, HttpTransport, SyncOrchestrator, TokioScheduler │   │
//! │  └─────────────────────────────┬───────────────────────────────────┘   │
//! │                                │                                        │
//! │  ┌─────────────────────────────▼───────────────────────────────────┐   │
//! │  │             ★ healthsync-core (THIS CRATE) ★                    │   │
//! │  │                                                                 │   │
//! │  │   ┌───────────┐  ┌───────────┐  ┌───────────┐  ┌───────────┐  │   │
//! │  │   │   types   │  │  mapper   │  │ schedule  │  │ validation│  │   │
//! │  │   │ Snapshot  │  │ Snapshot  │  │ Daily /   │  │ HH:MM,    │  │   │
//! │  │   │ Report    │  │ → Report  │  │ Fast      │  │ dates     │  │   │
//! │  │   │ Outcome   │  │           │  │           │  │           │  │   │
//! │  │   └───────────┘  └───────────┘  └───────────┘  └───────────┘  │   │
//! │  │                                                                 │   │
//! │  │   NO I/O • NO DATABASE • NO NETWORK • PURE FUNCTIONS           │   │
//! │  └─────────────────────────────────────────────────────────────────┘   │
//! └─────────────────────────────────────────────────────────────────────────┘
//! ```
//!
//! ## Modules
//!
//! - [`types`] - Domain types (MetricsSnapshot, DailyReport, SyncOutcome)
//! - [`mapper`] - Snapshot → wire report conversion
//! - [`schedule`] - Next-run computation for daily and one-shot jobs
//! - [`validation`] - Config and wire value validation
//! - [`error`] - Domain error types
//!
//! ## Example Usage
//!
//! ```rust
//! use chrono::{FixedOffset, NaiveDate};
//! use healthsync_core::{map_report, MetricsSnapshot};
//!
//! let snapshot = MetricsSnapshot { steps: 8500, active_minutes: 42, ..Default::default() };
//! let date = NaiveDate::from_ymd_opt(2024, 3, 5).unwrap();
//! let report = map_report(&snapshot, date, FixedOffset::east_opt(0).unwrap());
//!
//! assert_eq!(report.date, "2024-03-05");
//! assert_eq!(report.active_minutes, 42);
//! ```

// =============================================================================
// Module Declarations
// =============================================================================

pub mod error;
pub mod mapper;
pub mod schedule;
pub mod types;
pub mod validation;

// =============================================================================
// Re-exports for Convenience
// =============================================================================

pub use error::{CoreError, CoreResult, ValidationError};
pub use mapper::map_report;
pub use schedule::{schedule_next, JobKind, ScheduleMode, ScheduledJobDescriptor};
pub use types::*;
