//! Scripted transport and store doubles for unit tests.

use async_trait::async_trait;
use healthsync_core::DailyReport;
use std::collections::VecDeque;
use std::sync::atomic::{AtomicUsize, Ordering};
use std::sync::Mutex;

use crate::error::{StoreError, TransportError};
use crate::store::{InMemoryKeyValueStore, SecureKeyValueStore};
use crate::transport::{SyncTransport, TokenRequest, TokenResponse, UploadStatus};

pub fn token(access: &str, expires_in: Option<u64>, refresh: Option<&str>) -> TokenResponse {
    TokenResponse {
        access_token: access.to_string(),
        expires_in,
        refresh_token: refresh.map(str::to_string),
    }
}

/// Answers each call from a per-endpoint queue and records what was sent.
#[derive(Default)]
pub struct FakeTransport {
    exchanges: Mutex<VecDeque<Result<TokenResponse, TransportError>>>,
    refreshes: Mutex<VecDeque<Result<TokenResponse, TransportError>>>,
    uploads: Mutex<VecDeque<UploadStatus>>,
    pub exchange_calls: AtomicUsize,
    pub refresh_calls: AtomicUsize,
    pub upload_calls: AtomicUsize,
    pub sent_requests: Mutex<Vec<TokenRequest>>,
    pub sent_refresh_tokens: Mutex<Vec<String>>,
    pub upload_tokens: Mutex<Vec<String>>,
    pub uploaded_reports: Mutex<Vec<DailyReport>>,
}

impl FakeTransport {
    pub fn new() -> Self {
        Self::default()
    }

    pub fn on_exchange(self, result: Result<TokenResponse, TransportError>) -> Self {
        self.exchanges.lock().unwrap().push_back(result);
        self
    }

    pub fn on_refresh(self, result: Result<TokenResponse, TransportError>) -> Self {
        self.refreshes.lock().unwrap().push_back(result);
        self
    }

    pub fn on_upload(self, status: UploadStatus) -> Self {
        self.uploads.lock().unwrap().push_back(status);
        self
    }

    pub fn exchanges(&self) -> usize {
        self.exchange_calls.load(Ordering::SeqCst)
    }

    pub fn refreshes(&self) -> usize {
        self.refresh_calls.load(Ordering::SeqCst)
    }

    pub fn uploads(&self) -> usize {
        self.upload_calls.load(Ordering::SeqCst)
    }
}

#[async_trait]
impl SyncTransport for FakeTransport {
    async fn exchange_token(&self, request: &TokenRequest) -> Result<TokenResponse, TransportError> {
        self.exchange_calls.fetch_add(1, Ordering::SeqCst);
        self.sent_requests.lock().unwrap().push(request.clone());
        self.exchanges
            .lock()
            .unwrap()
            .pop_front()
            .unwrap_or_else(|| Err(TransportError::Unreachable("no scripted exchange".into())))
    }

    async fn refresh_token(&self, refresh_token: &str) -> Result<TokenResponse, TransportError> {
        self.refresh_calls.fetch_add(1, Ordering::SeqCst);
        self.sent_refresh_tokens
            .lock()
            .unwrap()
            .push(refresh_token.to_string());
        self.refreshes
            .lock()
            .unwrap()
            .pop_front()
            .unwrap_or_else(|| Err(TransportError::Unreachable("no scripted refresh".into())))
    }

    async fn upload_report(&self, access_token: &str, report: &DailyReport) -> UploadStatus {
        self.upload_calls.fetch_add(1, Ordering::SeqCst);
        self.upload_tokens
            .lock()
            .unwrap()
            .push(access_token.to_string());
        self.uploaded_reports.lock().unwrap().push(report.clone());
        self.uploads
            .lock()
            .unwrap()
            .pop_front()
            .unwrap_or(UploadStatus::Unreachable {
                reason: "no scripted upload".into(),
            })
    }
}

/// In-memory store whose first `failing` removes return `Unavailable`.
#[derive(Default)]
pub struct FlakyStore {
    inner: InMemoryKeyValueStore,
    failing: AtomicUsize,
    failed: AtomicUsize,
}

impl FlakyStore {
    pub fn new(failing: usize) -> Self {
        FlakyStore {
            failing: AtomicUsize::new(failing),
            ..Self::default()
        }
    }

    pub fn failed_removes(&self) -> usize {
        self.failed.load(Ordering::SeqCst)
    }
}

#[async_trait]
impl SecureKeyValueStore for FlakyStore {
    async fn get(&self, key: &str) -> Result<Option<String>, StoreError> {
        self.inner.get(key).await
    }

    async fn set(&self, key: &str, value: &str) -> Result<(), StoreError> {
        self.inner.set(key, value).await
    }

    async fn remove(&self, key: &str) -> Result<(), StoreError> {
        let remaining = self.failing.load(Ordering::SeqCst);
        if remaining > 0 {
            self.failing.store(remaining - 1, Ordering::SeqCst);
            self.failed.fetch_add(1, Ordering::SeqCst);
            return Err(StoreError::Unavailable("disk I/O error".into()));
        }
        self.inner.remove(key).await
    }
}
