//! # Token Manager
//!
//! Owns the credential lifecycle: obtain, reuse, refresh, clear.
//!
//! ## Credential Flow
//! ```text
//! ┌─────────────────────────────────────────────────────────────────────────┐
//! │                     get_valid_credential()                              │
//! │                                                                         │
//! │  TokenStore.get()                                                      │
//! │       │                                                                 │
//! │       ├── present, expires_at - 60s > now ──────────► return stored     │
//! │       │                                                                 │
//! │       └── absent / undecodable / known-expired                         │
//! │                │                                                        │
//! │                ▼                                                        │
//! │        POST auth/token  { deviceId } or { username, password }         │
//! │                │                                                        │
//! │                ├── 2xx ──► save ──► return new credential               │
//! │                ├── 4xx ──► AuthError::Rejected                          │
//! │                └── 5xx / network ──► AuthError::Unreachable             │
//! │                                                                         │
//! │                          refresh()                                      │
//! │                                                                         │
//! │  stored refresh token ──► POST auth/refresh                            │
//! │       │                        │                                        │
//! │       │                        ├── 2xx ──► save ──► return              │
//! │       │                        └── anything else ─┐                     │
//! │       └── none ───────────────────────────────────┴──► clear store,     │
//! │                                                        Rejected         │
//! └─────────────────────────────────────────────────────────────────────────┘
//! ```
//!
//! After a failed refresh the store is empty, so the next
//! `get_valid_credential()` performs a full exchange. If the store cannot be
//! cleared, refresh reports [`AuthError::StoreUnavailable`] instead of
//! `Rejected`, so the attempt stays retryable.
//!
//! ## Concurrency
//! All operations hold one async mutex, so two sync attempts in the same
//! process never exchange or refresh at the same time.

use chrono::{Duration, Utc};
use std::sync::Arc;
use tokio::sync::Mutex;
use tracing::{debug, error, info, warn};

use crate::config::AuthMethod;
use crate::device::DeviceIdentity;
use crate::error::AuthError;
use crate::token_store::{Credential, TokenStore};
use crate::transport::{SyncTransport, TokenRequest};

/// Safety margin before `expires_at` at which a credential counts as expired.
pub const EXPIRY_MARGIN_SECS: i64 = 60;

/// Attempts at removing a credential that must not outlive a failed refresh.
const CLEAR_ATTEMPTS: u32 = 3;

/// Credential lifecycle manager.
pub struct TokenManager {
    transport: Arc<dyn SyncTransport>,
    tokens: TokenStore,
    device: DeviceIdentity,
    method: AuthMethod,
    lock: Mutex<()>,
}

impl TokenManager {
    pub fn new(
        transport: Arc<dyn SyncTransport>,
        tokens: TokenStore,
        device: DeviceIdentity,
        method: AuthMethod,
    ) -> Self {
        TokenManager {
            transport,
            tokens,
            device,
            method,
            lock: Mutex::new(()),
        }
    }

    /// Returns a credential that is not known to be expired.
    ///
    /// Uses the stored one when possible; otherwise exchanges the device
    /// identity (or logs in) and persists the result before returning it.
    pub async fn get_valid_credential(&self) -> Result<Credential, AuthError> {
        let _guard = self.lock.lock().await;

        match self.tokens.get().await {
            Ok(Some(credential)) => {
                if !credential.is_expired_at(Utc::now(), Self::margin()) {
                    debug!(expires_at = ?credential.expires_at, "Using stored credential");
                    return Ok(credential);
                }
                debug!("Stored credential expired, requesting a new one");
            }
            Ok(None) => debug!("No stored credential, requesting one"),
            Err(e) => warn!(error = %e, "Could not read stored credential"),
        }

        let request = self.token_request().await?;
        let response = self.transport.exchange_token(&request).await.map_err(|e| {
            warn!(error = %e, method = %self.method, "Token request failed");
            AuthError::from(e)
        })?;

        let credential = Credential::from_response(response, None, Utc::now());
        self.tokens.save(&credential).await.map_err(|e| {
            error!(error = %e, "Failed to persist new credential");
            AuthError::StoreUnavailable(format!("credential not persisted: {}", e))
        })?;

        info!(
            method = %self.method,
            expires_at = ?credential.expires_at,
            "Obtained new credential"
        );
        Ok(credential)
    }

    /// Exchanges the stored refresh token for a new credential.
    ///
    /// Any failure clears the stored credential and returns
    /// [`AuthError::Rejected`], or [`AuthError::StoreUnavailable`] if the
    /// credential could not be cleared.
    pub async fn refresh(&self) -> Result<Credential, AuthError> {
        let _guard = self.lock.lock().await;

        let stored = match self.tokens.get().await {
            Ok(stored) => stored,
            Err(e) => {
                warn!(error = %e, "Could not read stored credential for refresh");
                None
            }
        };

        let Some(refresh_token) = stored.and_then(|c| c.refresh_token) else {
            warn!("No refresh token available");
            self.discard_credential().await?;
            return Err(AuthError::Rejected("no refresh token".into()));
        };

        let response = match self.transport.refresh_token(&refresh_token).await {
            Ok(response) => response,
            Err(e) => {
                warn!(error = %e, "Token refresh failed, clearing credential");
                self.discard_credential().await?;
                return Err(AuthError::Rejected(format!("refresh failed: {}", e)));
            }
        };

        let credential = Credential::from_response(response, Some(refresh_token), Utc::now());
        if let Err(e) = self.tokens.save(&credential).await {
            error!(error = %e, "Failed to persist refreshed credential");
            self.discard_credential().await?;
            return Err(AuthError::Rejected(format!("credential not persisted: {}", e)));
        }

        info!(expires_at = ?credential.expires_at, "Credential refreshed");
        Ok(credential)
    }

    /// Removes the stored credential. Caller holds `lock`.
    async fn discard_credential(&self) -> Result<(), AuthError> {
        let mut last_error = None;
        for attempt in 1..=CLEAR_ATTEMPTS {
            match self.tokens.clear().await {
                Ok(()) => return Ok(()),
                Err(e) => {
                    warn!(error = %e, attempt, "Failed to clear stored credential");
                    last_error = Some(e);
                }
            }
        }

        error!("Stale credential left in store");
        Err(AuthError::StoreUnavailable(format!(
            "stale credential not cleared: {}",
            last_error.map(|e| e.to_string()).unwrap_or_default()
        )))
    }

    async fn token_request(&self) -> Result<TokenRequest, AuthError> {
        match &self.method {
            AuthMethod::DeviceIdentity => {
                let device_id = self.device.get_or_create().await.map_err(|e| {
                    error!(error = %e, "Device identity unavailable");
                    AuthError::StoreUnavailable(format!("device identity unavailable: {}", e))
                })?;
                Ok(TokenRequest::Device { device_id })
            }
            AuthMethod::Password { username, password } => Ok(TokenRequest::Login {
                username: username.clone(),
                password: password.clone(),
            }),
        }
    }

    fn margin() -> Duration {
        Duration::seconds(EXPIRY_MARGIN_SECS)
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use crate::device::DEVICE_ID_KEY;
    use crate::error::TransportError;
    use crate::store::{InMemoryKeyValueStore, SecureKeyValueStore};
    use crate::testing::{token, FakeTransport, FlakyStore};

    struct Harness {
        kv: Arc<InMemoryKeyValueStore>,
        transport: Arc<FakeTransport>,
        manager: TokenManager,
    }

    fn harness(transport: FakeTransport, method: AuthMethod) -> Harness {
        let kv = Arc::new(InMemoryKeyValueStore::new());
        let transport = Arc::new(transport);
        let store: Arc<dyn SecureKeyValueStore> = kv.clone();
        let manager = TokenManager::new(
            transport.clone(),
            TokenStore::new(store.clone()),
            DeviceIdentity::new(store),
            method,
        );
        Harness {
            kv,
            transport,
            manager,
        }
    }

    async fn stored(h: &Harness) -> Option<Credential> {
        let store: Arc<dyn SecureKeyValueStore> = h.kv.clone();
        TokenStore::new(store).get().await.unwrap()
    }

    #[tokio::test]
    async fn test_second_call_uses_stored_credential() {
        let h = harness(
            FakeTransport::new().on_exchange(Ok(token("tok-1", Some(3600), Some("ref-1")))),
            AuthMethod::DeviceIdentity,
        );

        let first = h.manager.get_valid_credential().await.unwrap();
        let second = h.manager.get_valid_credential().await.unwrap();

        assert_eq!(first.access_token, "tok-1");
        assert_eq!(first, second);
        assert_eq!(h.transport.exchanges(), 1);
        assert_eq!(stored(&h).await, Some(first));
    }

    #[tokio::test]
    async fn test_device_exchange_sends_persisted_identity() {
        let h = harness(
            FakeTransport::new().on_exchange(Ok(token("tok", None, None))),
            AuthMethod::DeviceIdentity,
        );
        h.kv.set(DEVICE_ID_KEY, "device-42").await.unwrap();

        h.manager.get_valid_credential().await.unwrap();

        let sent = h.transport.sent_requests.lock().unwrap().clone();
        assert_eq!(
            sent,
            vec![TokenRequest::Device {
                device_id: "device-42".to_string()
            }]
        );
    }

    #[tokio::test]
    async fn test_password_login() {
        let h = harness(
            FakeTransport::new().on_exchange(Ok(token("tok", Some(3600), None))),
            AuthMethod::Password {
                username: "alice".to_string(),
                password: "secret".to_string(),
            },
        );

        h.manager.get_valid_credential().await.unwrap();

        let sent = h.transport.sent_requests.lock().unwrap().clone();
        assert!(matches!(&sent[0], TokenRequest::Login { username, .. } if username == "alice"));
    }

    #[tokio::test]
    async fn test_expired_credential_triggers_exchange() {
        let h = harness(
            FakeTransport::new()
                .on_exchange(Ok(token("short", Some(30), Some("ref"))))
                .on_exchange(Ok(token("long", Some(3600), Some("ref")))),
            AuthMethod::DeviceIdentity,
        );

        // 30s lifetime is inside the 60s margin
        let first = h.manager.get_valid_credential().await.unwrap();
        let second = h.manager.get_valid_credential().await.unwrap();

        assert_eq!(first.access_token, "short");
        assert_eq!(second.access_token, "long");
        assert_eq!(h.transport.exchanges(), 2);
        assert_eq!(h.transport.refreshes(), 0);
    }

    #[tokio::test]
    async fn test_exchange_failures_are_classified() {
        let h = harness(
            FakeTransport::new()
                .on_exchange(Err(TransportError::Status { status: 403 }))
                .on_exchange(Err(TransportError::Status { status: 502 }))
                .on_exchange(Err(TransportError::Unreachable("dns".into()))),
            AuthMethod::DeviceIdentity,
        );

        assert!(matches!(
            h.manager.get_valid_credential().await,
            Err(AuthError::Rejected(_))
        ));
        assert!(matches!(
            h.manager.get_valid_credential().await,
            Err(AuthError::Unreachable(_))
        ));
        assert!(matches!(
            h.manager.get_valid_credential().await,
            Err(AuthError::Unreachable(_))
        ));
        assert_eq!(stored(&h).await, None);
    }

    #[tokio::test]
    async fn test_refresh_replaces_credential() {
        let h = harness(
            FakeTransport::new()
                .on_exchange(Ok(token("tok-1", Some(3600), Some("ref-1"))))
                .on_refresh(Ok(token("tok-2", Some(3600), None))),
            AuthMethod::DeviceIdentity,
        );

        h.manager.get_valid_credential().await.unwrap();
        let refreshed = h.manager.refresh().await.unwrap();

        assert_eq!(refreshed.access_token, "tok-2");
        // Refresh token carried over when not rotated
        assert_eq!(refreshed.refresh_token.as_deref(), Some("ref-1"));
        assert_eq!(
            h.transport.sent_refresh_tokens.lock().unwrap().clone(),
            vec!["ref-1".to_string()]
        );
        assert_eq!(stored(&h).await, Some(refreshed));
    }

    #[tokio::test]
    async fn test_refresh_failure_clears_and_next_call_exchanges() {
        let h = harness(
            FakeTransport::new()
                .on_exchange(Ok(token("tok-1", Some(3600), Some("ref-1"))))
                .on_refresh(Err(TransportError::Unreachable("timeout".into())))
                .on_exchange(Ok(token("tok-2", Some(3600), Some("ref-2")))),
            AuthMethod::DeviceIdentity,
        );

        h.manager.get_valid_credential().await.unwrap();

        let err = h.manager.refresh().await.unwrap_err();
        assert!(matches!(err, AuthError::Rejected(_)));
        assert_eq!(stored(&h).await, None);

        let next = h.manager.get_valid_credential().await.unwrap();
        assert_eq!(next.access_token, "tok-2");
        assert_eq!(h.transport.exchanges(), 2);
    }

    #[tokio::test]
    async fn test_refresh_without_refresh_token_is_rejected() {
        let h = harness(
            FakeTransport::new().on_exchange(Ok(token("tok-1", Some(3600), None))),
            AuthMethod::DeviceIdentity,
        );

        h.manager.get_valid_credential().await.unwrap();

        assert!(matches!(h.manager.refresh().await, Err(AuthError::Rejected(_))));
        assert_eq!(h.transport.refreshes(), 0);
        assert_eq!(stored(&h).await, None);
    }

    #[tokio::test]
    async fn test_externally_cleared_credential_is_absent() {
        let h = harness(
            FakeTransport::new()
                .on_exchange(Ok(token("tok-1", Some(3600), None)))
                .on_exchange(Ok(token("tok-2", Some(3600), None))),
            AuthMethod::DeviceIdentity,
        );

        h.manager.get_valid_credential().await.unwrap();
        h.kv.remove(crate::token_store::CREDENTIAL_KEY).await.unwrap();

        let next = h.manager.get_valid_credential().await.unwrap();
        assert_eq!(next.access_token, "tok-2");
    }

    #[tokio::test]
    async fn test_failed_refresh_retries_clear() {
        let kv = Arc::new(FlakyStore::new(2));
        let transport = Arc::new(
            FakeTransport::new()
                .on_exchange(Ok(token("tok-1", Some(3600), Some("ref-1"))))
                .on_refresh(Err(TransportError::Status { status: 401 })),
        );
        let store: Arc<dyn SecureKeyValueStore> = kv.clone();
        let manager = TokenManager::new(
            transport,
            TokenStore::new(store.clone()),
            DeviceIdentity::new(store.clone()),
            AuthMethod::DeviceIdentity,
        );

        manager.get_valid_credential().await.unwrap();

        assert!(matches!(manager.refresh().await, Err(AuthError::Rejected(_))));
        assert_eq!(TokenStore::new(store).get().await.unwrap(), None);
    }

    #[tokio::test]
    async fn test_uncleared_credential_is_store_unavailable() {
        let kv = Arc::new(FlakyStore::new(usize::MAX));
        let transport = Arc::new(
            FakeTransport::new()
                .on_exchange(Ok(token("tok-1", Some(3600), Some("ref-1"))))
                .on_refresh(Err(TransportError::Unreachable("timeout".into()))),
        );
        let store: Arc<dyn SecureKeyValueStore> = kv.clone();
        let manager = TokenManager::new(
            transport,
            TokenStore::new(store.clone()),
            DeviceIdentity::new(store),
            AuthMethod::DeviceIdentity,
        );

        manager.get_valid_credential().await.unwrap();

        assert!(matches!(
            manager.refresh().await,
            Err(AuthError::StoreUnavailable(_))
        ));
        assert_eq!(kv.failed_removes(), CLEAR_ATTEMPTS as usize);
    }
}
