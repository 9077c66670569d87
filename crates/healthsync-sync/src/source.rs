//! # Health Data Sources
//!
//! Where the day's metrics come from.
//!
//! ```text
//! ┌─────────────────────────────────────────────────────────────────────────┐
//! │  SyncOrchestrator                                                      │
//! │       │  read_snapshot(DayRange for 2024-03-05)                        │
//! │       ▼                                                                 │
//! │  dyn HealthDataSource                                                  │
//! │       ├── JsonDirectorySource  <dir>/2024-03-05.json                   │
//! │       └── StaticSource         fixed snapshot (tests, dry runs)        │
//! └─────────────────────────────────────────────────────────────────────────┘
//! ```
//!
//! A source reports missing metrics as zero. It returns an error only when
//! it cannot be read at all, which the orchestrator treats as retryable.

use async_trait::async_trait;
use healthsync_core::mapper::format_report_date;
use healthsync_core::{DayRange, MetricsSnapshot};
use std::io::ErrorKind;
use std::path::{Path, PathBuf};
use std::sync::atomic::{AtomicUsize, Ordering};
use tracing::{debug, warn};

use crate::error::DataSourceError;

/// Provider of daily health totals.
#[async_trait]
pub trait HealthDataSource: Send + Sync {
    /// Reads the aggregated totals for `range`.
    async fn read_snapshot(&self, range: DayRange) -> Result<MetricsSnapshot, DataSourceError>;
}

// =============================================================================
// JSON Export Directory
// =============================================================================

/// Reads one JSON export file per day from a directory.
///
/// ## File Layout
/// ```text
/// exports/
/// ├── 2024-03-04.json
/// └── 2024-03-05.json   { "steps": 8500, "activeMinutes": 42, ... }
/// ```
///
/// Keys may be camelCase or snake_case; absent keys read as zero. A day
/// without a file reads as an all-zero snapshot.
#[derive(Debug, Clone)]
pub struct JsonDirectorySource {
    dir: PathBuf,
}

impl JsonDirectorySource {
    pub fn new(dir: impl Into<PathBuf>) -> Self {
        JsonDirectorySource { dir: dir.into() }
    }

    pub fn dir(&self) -> &Path {
        &self.dir
    }

    fn file_for(&self, range: &DayRange) -> PathBuf {
        self.dir
            .join(format!("{}.json", format_report_date(range.date)))
    }
}

#[async_trait]
impl HealthDataSource for JsonDirectorySource {
    async fn read_snapshot(&self, range: DayRange) -> Result<MetricsSnapshot, DataSourceError> {
        let is_dir = tokio::fs::metadata(&self.dir)
            .await
            .map(|meta| meta.is_dir())
            .unwrap_or(false);
        if !is_dir {
            return Err(DataSourceError::Unavailable(format!(
                "export directory {} not found",
                self.dir.display()
            )));
        }

        let path = self.file_for(&range);
        let contents = match tokio::fs::read_to_string(&path).await {
            Ok(contents) => contents,
            Err(e) if e.kind() == ErrorKind::NotFound => {
                debug!(path = %path.display(), "No export for the day, reporting zeros");
                return Ok(MetricsSnapshot::zero());
            }
            Err(e) => {
                return Err(DataSourceError::Unavailable(format!(
                    "{}: {}",
                    path.display(),
                    e
                )))
            }
        };

        // A half-written export is worth retrying, not uploading as zeros
        MetricsSnapshot::from_json(&contents).map_err(|e| {
            warn!(path = %path.display(), error = %e, "Export file is not valid");
            DataSourceError::Unavailable(format!("{}: {}", path.display(), e))
        })
    }
}

// =============================================================================
// Static Source
// =============================================================================

/// Returns the same snapshot for every day, or always fails.
#[derive(Debug, Default)]
pub struct StaticSource {
    snapshot: Option<MetricsSnapshot>,
    reads: AtomicUsize,
}

impl StaticSource {
    pub fn new(snapshot: MetricsSnapshot) -> Self {
        StaticSource {
            snapshot: Some(snapshot),
            reads: AtomicUsize::new(0),
        }
    }

    /// A source that is never reachable.
    pub fn unavailable() -> Self {
        StaticSource {
            snapshot: None,
            reads: AtomicUsize::new(0),
        }
    }

    /// How many times the source was read.
    pub fn reads(&self) -> usize {
        self.reads.load(Ordering::SeqCst)
    }
}

#[async_trait]
impl HealthDataSource for StaticSource {
    async fn read_snapshot(&self, _range: DayRange) -> Result<MetricsSnapshot, DataSourceError> {
        self.reads.fetch_add(1, Ordering::SeqCst);
        self.snapshot
            .ok_or_else(|| DataSourceError::Unavailable("static source is offline".into()))
    }
}
