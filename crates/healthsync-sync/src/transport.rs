//! # Backend Transport
//!
//! REST boundary between the agent and the backend.
//!
//! ## Endpoints
//! ```text
//! ┌─────────────────────────────────────────────────────────────────────────┐
//! │                        Backend REST API                                 │
//! │                                                                         │
//! │  POST auth/token          { "deviceId" } | { "username", "password" }  │
//! │                           → { "accessToken", "expiresIn",              │
//! │                               "refreshToken"? }                        │
//! │                                                                         │
//! │  POST auth/refresh        { "refreshToken" } → same shape              │
//! │                                                                         │
//! │  POST health/data/daily   Authorization: Bearer <accessToken>          │
//! │                           body = DailyReport (camelCase)               │
//! │                           2xx accepted, body ignored                   │
//! └─────────────────────────────────────────────────────────────────────────┘
//! ```
//!
//! ## Upload Classification
//! ```text
//! 2xx             → UploadStatus::Accepted
//! 401             → UploadStatus::Unauthorized
//! other 4xx, 3xx  → UploadStatus::Rejected { status }
//! 5xx             → UploadStatus::ServerError { status }
//! no response     → UploadStatus::Unreachable { reason }
//! ```
//!
//! Timeouts live on the `reqwest` client, never in the caller.

use async_trait::async_trait;
use healthsync_core::DailyReport;
use serde::{Deserialize, Serialize};
use std::time::Duration;
use tracing::debug;
use url::Url;

use crate::error::{SyncResult, TransportError};

const TOKEN_PATH: &str = "auth/token";
const REFRESH_PATH: &str = "auth/refresh";
const UPLOAD_PATH: &str = "health/data/daily";

// =============================================================================
// Wire Types
// =============================================================================

/// Body of `POST auth/token`.
#[derive(Clone, PartialEq, Eq, Serialize, Deserialize)]
#[serde(untagged)]
pub enum TokenRequest {
    /// Device-identity exchange.
    Device {
        #[serde(rename = "deviceId")]
        device_id: String,
    },

    /// Username/password login.
    Login { username: String, password: String },
}

impl std::fmt::Debug for TokenRequest {
    fn fmt(&self, f: &mut std::fmt::Formatter<'_>) -> std::fmt::Result {
        match self {
            TokenRequest::Device { device_id } => f
                .debug_struct("Device")
                .field("device_id", device_id)
                .finish(),
            TokenRequest::Login { username, .. } => f
                .debug_struct("Login")
                .field("username", username)
                .field("password", &"***")
                .finish(),
        }
    }
}

/// Body of `POST auth/refresh`.
#[derive(Clone, Serialize, Deserialize)]
#[serde(rename_all = "camelCase")]
pub struct RefreshRequest {
    pub refresh_token: String,
}

/// Response of both token endpoints.
#[derive(Clone, PartialEq, Eq, Serialize, Deserialize)]
#[serde(rename_all = "camelCase")]
pub struct TokenResponse {
    pub access_token: String,

    /// Lifetime of the access token in seconds. Absent means unknown.
    #[serde(default)]
    pub expires_in: Option<u64>,

    #[serde(default)]
    pub refresh_token: Option<String>,
}

impl std::fmt::Debug for TokenResponse {
    fn fmt(&self, f: &mut std::fmt::Formatter<'_>) -> std::fmt::Result {
        f.debug_struct("TokenResponse")
            .field("access_token", &"***")
            .field("expires_in", &self.expires_in)
            .field("has_refresh_token", &self.refresh_token.is_some())
            .finish()
    }
}

/// Classified result of one upload request.
#[derive(Debug, Clone, PartialEq, Eq)]
pub enum UploadStatus {
    /// 2xx.
    Accepted,
    /// 401: the access token was refused.
    Unauthorized,
    /// Any other non-2xx, non-5xx status.
    Rejected { status: u16 },
    /// 5xx.
    ServerError { status: u16 },
    /// No HTTP response (DNS, connect, TLS, timeout).
    Unreachable { reason: String },
}

impl UploadStatus {
    /// Classifies an HTTP status code.
    pub fn from_status(status: u16) -> Self {
        match status {
            200..=299 => UploadStatus::Accepted,
            401 => UploadStatus::Unauthorized,
            500..=599 => UploadStatus::ServerError { status },
            _ => UploadStatus::Rejected { status },
        }
    }
}

// =============================================================================
// Transport Trait
// =============================================================================

/// The backend as seen by the token manager and the orchestrator.
#[async_trait]
pub trait SyncTransport: Send + Sync {
    /// `POST auth/token`.
    async fn exchange_token(&self, request: &TokenRequest) -> Result<TokenResponse, TransportError>;

    /// `POST auth/refresh`.
    async fn refresh_token(&self, refresh_token: &str) -> Result<TokenResponse, TransportError>;

    /// `POST health/data/daily` with a bearer token.
    async fn upload_report(&self, access_token: &str, report: &DailyReport) -> UploadStatus;
}

// =============================================================================
// HTTP Transport
// =============================================================================

/// [`SyncTransport`] over HTTPS with `reqwest`.
#[derive(Debug, Clone)]
pub struct HttpTransport {
    client: reqwest::Client,
    token_url: Url,
    refresh_url: Url,
    upload_url: Url,
}

impl HttpTransport {
    /// Creates a transport for the API rooted at `base_url`.
    ///
    /// A base URL without a trailing slash is treated as a directory, so
    /// `https://host/api` and `https://host/api/` resolve the same endpoints.
    pub fn new(base_url: &str, timeout: Duration) -> SyncResult<Self> {
        let mut base = Url::parse(base_url)?;
        if !base.path().ends_with('/') {
            let path = format!("{}/", base.path());
            base.set_path(&path);
        }

        let client = reqwest::Client::builder().timeout(timeout).build()?;

        Ok(HttpTransport {
            client,
            token_url: base.join(TOKEN_PATH)?,
            refresh_url: base.join(REFRESH_PATH)?,
            upload_url: base.join(UPLOAD_PATH)?,
        })
    }

    async fn post_token<B: Serialize + ?Sized>(
        &self,
        url: &Url,
        body: &B,
    ) -> Result<TokenResponse, TransportError> {
        let response = self
            .client
            .post(url.clone())
            .json(body)
            .send()
            .await
            .map_err(|e| TransportError::Unreachable(e.to_string()))?;

        let status = response.status();
        debug!(url = %url, status = status.as_u16(), "Token endpoint answered");

        if !status.is_success() {
            return Err(TransportError::Status {
                status: status.as_u16(),
            });
        }

        response
            .json::<TokenResponse>()
            .await
            .map_err(|e| TransportError::InvalidResponse(e.to_string()))
    }
}

#[async_trait]
impl SyncTransport for HttpTransport {
    async fn exchange_token(&self, request: &TokenRequest) -> Result<TokenResponse, TransportError> {
        self.post_token(&self.token_url, request).await
    }

    async fn refresh_token(&self, refresh_token: &str) -> Result<TokenResponse, TransportError> {
        let body = RefreshRequest {
            refresh_token: refresh_token.to_string(),
        };
        self.post_token(&self.refresh_url, &body).await
    }

    async fn upload_report(&self, access_token: &str, report: &DailyReport) -> UploadStatus {
        let result = self
            .client
            .post(self.upload_url.clone())
            .bearer_auth(access_token)
            .json(report)
            .send()
            .await;

        match result {
            Ok(response) => {
                let status = response.status().as_u16();
                debug!(date = %report.date, status, "Upload answered");
                UploadStatus::from_status(status)
            }
            Err(e) => UploadStatus::Unreachable {
                reason: e.to_string(),
            },
        }
    }
}
