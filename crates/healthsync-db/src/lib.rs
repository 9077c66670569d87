//! # healthsync-db: Storage Layer for HealthSync
//!
//! SQLite storage for the sync agent, accessed asynchronously through sqlx.
//!
//! ## Architecture Position
//! ```text
//! ┌─────────────────────────────────────────────────────────────────────────┐
//! │                        HealthSync Data Flow                             │
//! │                                                                         │
//! │  healthsync-sync (SqliteKeyValueStore, agent run journal)              │
//! │       │                                                                 │
//! │       ▼                                                                 │
//! │  ┌─────────────────────────────────────────────────────────────────┐   │
//! │  │                  healthsync-db (THIS CRATE)                     │   │
//! │  │                                                                 │   │
//! │  │   ┌───────────────┐    ┌────────────────────┐  ┌────────────┐  │   │
//! │  │   │   Database    │    │   Repositories     │  │ Migrations │  │   │
//! │  │   │   (pool.rs)   │◄───│ SecureKvRepository │  │ (embedded) │  │   │
//! │  │   │  SqlitePool   │    │ SyncRunRepository  │  │ 001, 002   │  │   │
//! │  │   └───────────────┘    └────────────────────┘  └────────────┘  │   │
//! │  └─────────────────────────────────────────────────────────────────┘   │
//! │       │                                                                 │
//! │       ▼                                                                 │
//! │  healthsync.db (platform data dir, or [storage] db_path)               │
//! └─────────────────────────────────────────────────────────────────────────┘
//! ```
//!
//! ## Usage
//!
//! ```rust,ignore
//! use healthsync_db::{Database, DbConfig};
//!
//! let db = Database::new(DbConfig::new("path/to/healthsync.db")).await?;
//! db.secure_kv().set("device_id", "…").await?;
//! let last = db.sync_runs().latest().await?;
//! ```

pub mod error;
pub mod migrations;
pub mod pool;
pub mod repository;

pub use error::{DbError, DbResult};
pub use pool::{Database, DbConfig};

pub use repository::secure_kv::SecureKvRepository;
pub use repository::sync_runs::{SyncRun, SyncRunRepository};
