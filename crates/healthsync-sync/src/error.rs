//! # Sync Error Types
//!
//! Error types for the sync engine.
//!
//! ## Error Hierarchy
//! ```text
//! ┌─────────────────────────────────────────────────────────────────────────┐
//! │                       Sync Error Categories                             │
//! │                                                                         │
//! │  ┌─────────────────┐  ┌─────────────────┐  ┌─────────────────────────┐ │
//! │  │  Configuration  │  │   Credentials   │  │     Boundaries          │ │
//! │  │                 │  │                 │  │                         │ │
//! │  │  InvalidConfig  │  │  AuthError      │  │  TransportError         │ │
//! │  │  InvalidUrl     │  │   Unreachable   │  │  StoreError             │ │
//! │  │  ConfigLoad     │  │   Rejected      │  │  DataSourceError        │ │
//! │  │  HttpClient     │  │   StoreUnavail. │  │                         │ │
//! │  └─────────────────┘  └─────────────────┘  └─────────────────────────┘ │
//! │                                                                         │
//! │  The orchestrator never returns these: it folds them into a            │
//! │  SyncOutcome. SyncError is what setup code (config, stores, agent      │
//! │  wiring) propagates with `?`.                                          │
//! └─────────────────────────────────────────────────────────────────────────┘
//! ```

use thiserror::Error;

/// Result type alias for sync engine setup operations.
pub type SyncResult<T> = Result<T, SyncError>;

// =============================================================================
// Boundary Errors
// =============================================================================

/// Failure of a token request (`auth/token`, `auth/refresh`).
///
/// Upload failures are not errors; they are classified as
/// [`UploadStatus`](crate::transport::UploadStatus) values.
#[derive(Debug, Clone, PartialEq, Eq, Error)]
pub enum TransportError {
    /// DNS, connect, TLS or timeout failure. No HTTP response was received.
    #[error("Backend unreachable: {0}")]
    Unreachable(String),

    /// The backend answered with a non-2xx status.
    #[error("Backend answered HTTP {status}")]
    Status { status: u16 },

    /// A 2xx response whose body could not be decoded.
    #[error("Invalid response body: {0}")]
    InvalidResponse(String),
}

impl TransportError {
    /// Returns true for 4xx answers: the request itself was refused.
    pub fn is_client_error(&self) -> bool {
        matches!(self, TransportError::Status { status } if (400..500).contains(status))
    }
}

/// Credential lifecycle failure, as seen by the orchestrator.
#[derive(Debug, Clone, PartialEq, Eq, Error)]
pub enum AuthError {
    /// The backend could not be reached or answered 5xx. Worth retrying.
    #[error("Auth backend unreachable: {0}")]
    Unreachable(String),

    /// The backend refused the identity, the login or the refresh token.
    #[error("Authentication rejected: {0}")]
    Rejected(String),

    /// The credential or device identity could not be read, saved or
    /// cleared. Worth retrying.
    #[error("Credential store unavailable: {0}")]
    StoreUnavailable(String),
}

impl From<TransportError> for AuthError {
    fn from(err: TransportError) -> Self {
        if err.is_client_error() {
            AuthError::Rejected(err.to_string())
        } else {
            AuthError::Unreachable(err.to_string())
        }
    }
}

/// Secure key-value store failure.
#[derive(Debug, Clone, PartialEq, Eq, Error)]
pub enum StoreError {
    /// The underlying storage could not be read or written.
    #[error("Secure store unavailable: {0}")]
    Unavailable(String),

    /// A value could not be encoded for storage.
    #[error("Failed to encode value for '{key}': {reason}")]
    Encoding { key: String, reason: String },

    /// The store key could not be generated, read or parsed.
    #[error("Store key unavailable: {0}")]
    Key(String),

    /// A stored value did not decrypt under the current key.
    #[error("Stored value for '{key}' could not be decrypted: {reason}")]
    Undecryptable { key: String, reason: String },
}

impl From<healthsync_db::DbError> for StoreError {
    fn from(err: healthsync_db::DbError) -> Self {
        StoreError::Unavailable(err.to_string())
    }
}

/// Health data source failure.
///
/// Per-metric gaps are not errors; the source reports them as zero. This is
/// only returned when the source as a whole cannot be read.
#[derive(Debug, Clone, PartialEq, Eq, Error)]
pub enum DataSourceError {
    #[error("Health data source unavailable: {0}")]
    Unavailable(String),
}

// =============================================================================
// Sync Error
// =============================================================================

/// Error type for sync engine setup and wiring.
#[derive(Debug, Error)]
pub enum SyncError {
    // =========================================================================
    // Configuration Errors
    // =========================================================================
    /// Invalid sync configuration.
    #[error("Invalid sync configuration: {0}")]
    InvalidConfig(String),

    /// Invalid backend URL.
    #[error("Invalid backend URL: {0}")]
    InvalidUrl(String),

    /// Failed to load config file.
    #[error("Failed to load config: {0}")]
    ConfigLoadFailed(String),

    // =========================================================================
    // Wiring Errors
    // =========================================================================
    /// HTTP client could not be built.
    #[error("HTTP client error: {0}")]
    HttpClient(String),
}

// =============================================================================
// Error Conversions
// =============================================================================

impl From<url::ParseError> for SyncError {
    fn from(err: url::ParseError) -> Self {
        SyncError::InvalidUrl(err.to_string())
    }
}

impl From<reqwest::Error> for SyncError {
    fn from(err: reqwest::Error) -> Self {
        SyncError::HttpClient(err.to_string())
    }
}

impl From<std::io::Error> for SyncError {
    fn from(err: std::io::Error) -> Self {
        SyncError::ConfigLoadFailed(err.to_string())
    }
}

impl From<toml::de::Error> for SyncError {
    fn from(err: toml::de::Error) -> Self {
        SyncError::ConfigLoadFailed(err.to_string())
    }
}

impl From<healthsync_core::ValidationError> for SyncError {
    fn from(err: healthsync_core::ValidationError) -> Self {
        SyncError::InvalidConfig(err.to_string())
    }
}
