//! # Repository Module
//!
//! Database repository implementations for HealthSync.
//!
//! ```text
//! ┌─────────────────────────────────────────────────────────────────────────┐
//! │  Sync engine                                                           │
//! │       │                                                                 │
//! │       ├── db.secure_kv().get("credential")                             │
//! │       │        ▼                                                        │
//! │       │   SecureKvRepository  ──► secure_kv table                      │
//! │       │                                                                 │
//! │       └── db.sync_runs().record(job, date, &outcome)                   │
//! │                ▼                                                        │
//! │           SyncRunRepository   ──► sync_runs table                      │
//! └─────────────────────────────────────────────────────────────────────────┘
//! ```
//!
//! - [`SecureKvRepository`](secure_kv::SecureKvRepository) - string values by key
//! - [`SyncRunRepository`](sync_runs::SyncRunRepository) - attempt journal

pub mod secure_kv;
pub mod sync_runs;
