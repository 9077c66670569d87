//! # healthsync-sync: Sync Engine for HealthSync
//!
//! Collects the day's health totals, turns them into a report and uploads it
//! under a bearer token, with retry classification and credential refresh.
//!
//! ## Component Wiring
//! ```text
//! ┌─────────────────────────────────────────────────────────────────────────┐
//! │                         Sync Engine Wiring                              │
//! │                                                                         │
//! │  ScheduleDriver ──► TokioScheduler ──► SyncOrchestrator                │
//! │                       (backoff on        │                              │
//! │                        retryable)        ├──► HealthDataSource          │
//! │                                          │      + map_report            │
//! │                                          ├──► TokenManager              │
//! │                                          │      ├── TokenStore          │
//! │                                          │      ├── DeviceIdentity      │
//! │                                          │      └── SyncTransport       │
//! │                                          └──► SyncTransport (upload)    │
//! │                                                                         │
//! │  TokenStore / DeviceIdentity ──► dyn SecureKeyValueStore               │
//! │                                    └── SqliteKeyValueStore (secure_kv) │
//! │                                          └── StoreKey (AES-256-GCM)    │
//! └─────────────────────────────────────────────────────────────────────────┘
//! ```
//!
//! ## Modules
//!
//! - [`config`] - TOML + environment configuration
//! - [`error`] - Error types for setup, auth and storage boundaries
//! - [`store`] - Secure key-value store trait and implementations
//! - [`cipher`] - Per-install key sealing stored values
//! - [`device`] - Persistent device identity
//! - [`token_store`] / [`token_manager`] - Credential persistence and lifecycle
//! - [`transport`] - Backend REST boundary
//! - [`source`] - Health data sources
//! - [`orchestrator`] - One sync attempt → `SyncOutcome`
//! - [`scheduler`] - Schedule driver and tokio host scheduler
//!
//! ## Usage
//!
//! ```rust,ignore
//! let transport: Arc<dyn SyncTransport> = Arc::new(HttpTransport::new(&url, timeout)?);
//! let tokens = Arc::new(TokenManager::new(transport.clone(), token_store, device, method));
//! let orchestrator = SyncOrchestrator::new(source, tokens, transport);
//!
//! match orchestrator.run().await {
//!     SyncOutcome::Success => {}
//!     other => tracing::warn!(%other, "sync did not complete"),
//! }
//! ```

pub mod cipher;
pub mod config;
pub mod device;
pub mod error;
pub mod orchestrator;
pub mod scheduler;
pub mod source;
pub mod store;
pub mod token_manager;
pub mod token_store;
pub mod transport;

#[cfg(test)]
mod testing;

pub use cipher::{StoreKey, STORE_KEY_ENV};
pub use config::{AuthMethod, SyncConfig};
pub use device::DeviceIdentity;
pub use error::{AuthError, DataSourceError, StoreError, SyncError, SyncResult, TransportError};
pub use orchestrator::{LogNotifier, NoOpNotifier, SyncNotifier, SyncOrchestrator, SyncPhase, SyncStatus};
pub use scheduler::{HostScheduler, RetryPolicy, ScheduleDriver, SyncJob, TokioScheduler};
pub use source::{HealthDataSource, JsonDirectorySource, StaticSource};
pub use store::{InMemoryKeyValueStore, SecureKeyValueStore, SqliteKeyValueStore};
pub use token_manager::TokenManager;
pub use token_store::{Credential, TokenStore};
pub use transport::{HttpTransport, SyncTransport, TokenRequest, TokenResponse, UploadStatus};
