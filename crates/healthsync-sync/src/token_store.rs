//! # Token Store
//!
//! Persists the current [`Credential`] as one JSON value under one key.
//!
//! ```text
//! key "credential" → {"access_token":"…","expires_at":"2024-03-05T23:57:00Z","refresh_token":"…"}
//! ```
//!
//! Reads are tolerant: a key that disappeared or a value that no longer
//! decodes both read as "no credential".

use chrono::{DateTime, Duration, Utc};
use serde::{Deserialize, Serialize};
use std::sync::Arc;
use tracing::{debug, warn};

use crate::error::StoreError;
use crate::store::SecureKeyValueStore;
use crate::transport::TokenResponse;

/// Storage key of the serialized credential.
pub const CREDENTIAL_KEY: &str = "credential";

/// The bearer credential used for uploads.
#[derive(Clone, PartialEq, Eq, Serialize, Deserialize)]
pub struct Credential {
    pub access_token: String,

    /// When the access token expires. `None` if the backend didn't say.
    #[serde(default)]
    pub expires_at: Option<DateTime<Utc>>,

    #[serde(default)]
    pub refresh_token: Option<String>,
}

impl Credential {
    /// Builds a credential from a token response received at `now`.
    ///
    /// `previous_refresh_token` is kept when the response does not rotate it.
    /// A lifetime too large to represent reads as "no known expiry".
    pub fn from_response(
        response: TokenResponse,
        previous_refresh_token: Option<String>,
        now: DateTime<Utc>,
    ) -> Self {
        let expires_at = response
            .expires_in
            .and_then(|secs| i64::try_from(secs).ok())
            .and_then(Duration::try_seconds)
            .and_then(|lifetime| now.checked_add_signed(lifetime));

        Credential {
            access_token: response.access_token,
            expires_at,
            refresh_token: response.refresh_token.or(previous_refresh_token),
        }
    }

    /// True if the token is expired at `now`, or will be within `margin`.
    ///
    /// A credential without an expiry is never known-expired.
    pub fn is_expired_at(&self, now: DateTime<Utc>, margin: Duration) -> bool {
        match self.expires_at {
            Some(expires_at) => now
                .checked_add_signed(margin)
                .map_or(true, |deadline| deadline >= expires_at),
            None => false,
        }
    }
}

// Tokens never show up in logs.
impl std::fmt::Debug for Credential {
    fn fmt(&self, f: &mut std::fmt::Formatter<'_>) -> std::fmt::Result {
        f.debug_struct("Credential")
            .field("access_token", &"***")
            .field("expires_at", &self.expires_at)
            .field("has_refresh_token", &self.refresh_token.is_some())
            .finish()
    }
}

/// Reads and writes the credential in a [`SecureKeyValueStore`].
#[derive(Clone)]
pub struct TokenStore {
    store: Arc<dyn SecureKeyValueStore>,
}

impl TokenStore {
    pub fn new(store: Arc<dyn SecureKeyValueStore>) -> Self {
        TokenStore { store }
    }

    /// Returns the stored credential, or `None` if absent or undecodable.
    pub async fn get(&self) -> Result<Option<Credential>, StoreError> {
        let Some(raw) = self.store.get(CREDENTIAL_KEY).await? else {
            return Ok(None);
        };

        match serde_json::from_str::<Credential>(&raw) {
            Ok(credential) => Ok(Some(credential)),
            Err(e) => {
                warn!(error = %e, "Stored credential is unreadable, treating as absent");
                Ok(None)
            }
        }
    }

    /// Replaces the stored credential.
    pub async fn save(&self, credential: &Credential) -> Result<(), StoreError> {
        let raw = serde_json::to_string(credential).map_err(|e| StoreError::Encoding {
            key: CREDENTIAL_KEY.to_string(),
            reason: e.to_string(),
        })?;

        self.store.set(CREDENTIAL_KEY, &raw).await?;
        debug!(expires_at = ?credential.expires_at, "Credential saved");
        Ok(())
    }

    /// Removes the credential entirely.
    pub async fn clear(&self) -> Result<(), StoreError> {
        self.store.remove(CREDENTIAL_KEY).await?;
        debug!("Credential cleared");
        Ok(())
    }
}
