//! End-to-end sync attempts against a mocked backend.
//!
//! Each test wires the real `HttpTransport`, `TokenManager` and
//! `SyncOrchestrator` to a mockito server and checks both the outcome and
//! the requests the backend saw.

use anyhow::Result;
use chrono::{Duration, FixedOffset, NaiveDate, Utc};
use healthsync_core::{FailureReason, MetricsSnapshot, SyncOutcome};
use healthsync_db::{Database, DbConfig};
use healthsync_sync::{
    AuthMethod, Credential, DeviceIdentity, HttpTransport, InMemoryKeyValueStore,
    JsonDirectorySource, NoOpNotifier, SecureKeyValueStore, SqliteKeyValueStore, StaticSource,
    StoreKey, SyncOrchestrator, SyncTransport, TokenManager, TokenStore,
};
use mockito::{Matcher, Server, ServerGuard};
use serde_json::json;
use std::sync::Arc;

fn report_date() -> NaiveDate {
    NaiveDate::from_ymd_opt(2024, 3, 5).unwrap()
}

fn offset() -> FixedOffset {
    FixedOffset::east_opt(3600).unwrap()
}

fn snapshot() -> MetricsSnapshot {
    MetricsSnapshot {
        steps: 8500,
        active_minutes: 42,
        ..Default::default()
    }
}

/// The report built from `snapshot()` for `report_date()` at `offset()`.
fn expected_report() -> serde_json::Value {
    json!({
        "date": "2024-03-05",
        "steps": 8500,
        "stand": 0,
        "distance": 0.0,
        "activeMinutes": 42,
        "activeCalories": 0.0,
        "totalCalories": 0.0,
        "basalMetabolicRate": 0.0,
        "averageHeartRate": 0,
        "averageRestingHeartRate": 0,
        "timeZone": "+0100"
    })
}

fn token_body(access: &str, refresh: Option<&str>) -> String {
    let mut body = json!({ "accessToken": access, "expiresIn": 3600 });
    if let Some(refresh) = refresh {
        body["refreshToken"] = json!(refresh);
    }
    body.to_string()
}

struct Agent {
    store: Arc<dyn SecureKeyValueStore>,
    orchestrator: SyncOrchestrator,
}

fn agent_with(
    server: &ServerGuard,
    store: Arc<dyn SecureKeyValueStore>,
    method: AuthMethod,
    source: Arc<dyn healthsync_sync::HealthDataSource>,
) -> Agent {
    let transport: Arc<dyn SyncTransport> = Arc::new(
        HttpTransport::new(&server.url(), std::time::Duration::from_secs(5)).unwrap(),
    );
    let tokens = Arc::new(TokenManager::new(
        transport.clone(),
        TokenStore::new(store.clone()),
        DeviceIdentity::new(store.clone()),
        method,
    ));
    let orchestrator = SyncOrchestrator::new(source, tokens, transport)
        .with_notifier(Arc::new(NoOpNotifier));

    Agent {
        store,
        orchestrator,
    }
}

fn agent(server: &ServerGuard) -> Agent {
    agent_with(
        server,
        Arc::new(InMemoryKeyValueStore::new()),
        AuthMethod::DeviceIdentity,
        Arc::new(StaticSource::new(snapshot())),
    )
}

async fn stored_credential(agent: &Agent) -> Option<Credential> {
    TokenStore::new(agent.store.clone()).get().await.unwrap()
}

async fn run(agent: &Agent) -> SyncOutcome {
    agent.orchestrator.run_for_date(report_date(), offset()).await
}

#[tokio::test]
async fn test_report_is_uploaded_with_fresh_token() -> Result<()> {
    let mut server = Server::new_async().await;

    let token = server
        .mock("POST", "/auth/token")
        .match_body(Matcher::Regex(r#""deviceId":"[0-9a-f-]{36}""#.to_string()))
        .with_status(200)
        .with_header("content-type", "application/json")
        .with_body(token_body("tok-1", Some("ref-1")))
        .expect(1)
        .create_async()
        .await;

    let upload = server
        .mock("POST", "/health/data/daily")
        .match_header("authorization", "Bearer tok-1")
        .match_body(Matcher::Json(expected_report()))
        .with_status(200)
        .with_body("{}")
        .expect(1)
        .create_async()
        .await;

    let agent = agent(&server);
    assert_eq!(run(&agent).await, SyncOutcome::Success);

    token.assert_async().await;
    upload.assert_async().await;
    assert_eq!(stored_credential(&agent).await.unwrap().access_token, "tok-1");
    Ok(())
}

#[tokio::test]
async fn test_second_run_reuses_credential() -> Result<()> {
    let mut server = Server::new_async().await;

    let token = server
        .mock("POST", "/auth/token")
        .with_status(200)
        .with_body(token_body("tok-1", None))
        .expect(1)
        .create_async()
        .await;
    let upload = server
        .mock("POST", "/health/data/daily")
        .with_status(201)
        .expect(2)
        .create_async()
        .await;

    let agent = agent(&server);
    assert_eq!(run(&agent).await, SyncOutcome::Success);
    assert_eq!(run(&agent).await, SyncOutcome::Success);

    token.assert_async().await;
    upload.assert_async().await;
    Ok(())
}

#[tokio::test]
async fn test_401_refresh_401_is_permanent_after_two_uploads() -> Result<()> {
    let mut server = Server::new_async().await;

    let token = server
        .mock("POST", "/auth/token")
        .with_status(200)
        .with_body(token_body("tok-1", Some("ref-1")))
        .expect(1)
        .create_async()
        .await;
    let refresh = server
        .mock("POST", "/auth/refresh")
        .match_body(Matcher::Json(json!({ "refreshToken": "ref-1" })))
        .with_status(200)
        .with_body(token_body("tok-2", Some("ref-2")))
        .expect(1)
        .create_async()
        .await;
    let upload = server
        .mock("POST", "/health/data/daily")
        .with_status(401)
        .expect(2)
        .create_async()
        .await;

    let agent = agent(&server);
    assert_eq!(
        run(&agent).await,
        SyncOutcome::PermanentFailure(FailureReason::AuthRejected)
    );

    token.assert_async().await;
    refresh.assert_async().await;
    upload.assert_async().await;
    Ok(())
}

#[tokio::test]
async fn test_401_then_refresh_then_success() -> Result<()> {
    let mut server = Server::new_async().await;

    let refresh = server
        .mock("POST", "/auth/refresh")
        .with_status(200)
        .with_body(token_body("tok-2", None))
        .expect(1)
        .create_async()
        .await;
    let stale_upload = server
        .mock("POST", "/health/data/daily")
        .match_header("authorization", "Bearer stale")
        .match_body(Matcher::Json(expected_report()))
        .with_status(401)
        .expect(1)
        .create_async()
        .await;
    let fresh_upload = server
        .mock("POST", "/health/data/daily")
        .match_header("authorization", "Bearer tok-2")
        .match_body(Matcher::Json(expected_report()))
        .with_status(200)
        .expect(1)
        .create_async()
        .await;

    let agent = agent(&server);
    TokenStore::new(agent.store.clone())
        .save(&Credential {
            access_token: "stale".to_string(),
            expires_at: Some(Utc::now() + Duration::hours(1)),
            refresh_token: Some("ref-1".to_string()),
        })
        .await?;

    assert_eq!(run(&agent).await, SyncOutcome::Success);

    refresh.assert_async().await;
    stale_upload.assert_async().await;
    fresh_upload.assert_async().await;

    let stored = stored_credential(&agent).await.unwrap();
    assert_eq!(stored.access_token, "tok-2");
    assert_eq!(stored.refresh_token.as_deref(), Some("ref-1"));
    Ok(())
}

#[tokio::test]
async fn test_failed_refresh_leaves_store_empty() -> Result<()> {
    let mut server = Server::new_async().await;

    let refresh = server
        .mock("POST", "/auth/refresh")
        .with_status(503)
        .expect(1)
        .create_async()
        .await;
    let upload = server
        .mock("POST", "/health/data/daily")
        .with_status(401)
        .expect(1)
        .create_async()
        .await;

    let agent = agent(&server);
    TokenStore::new(agent.store.clone())
        .save(&Credential {
            access_token: "stale".to_string(),
            expires_at: Some(Utc::now() + Duration::hours(1)),
            refresh_token: Some("ref-1".to_string()),
        })
        .await?;

    assert_eq!(
        run(&agent).await,
        SyncOutcome::PermanentFailure(FailureReason::AuthRejected)
    );
    assert_eq!(stored_credential(&agent).await, None);

    refresh.assert_async().await;
    upload.assert_async().await;
    Ok(())
}

#[tokio::test]
async fn test_upload_status_classification() -> Result<()> {
    for (status, expected) in [
        (
            422,
            SyncOutcome::PermanentFailure(FailureReason::UploadRejected { status: 422 }),
        ),
        (
            503,
            SyncOutcome::RetryableFailure(FailureReason::ServerUnavailable { status: 503 }),
        ),
    ] {
        let mut server = Server::new_async().await;
        server
            .mock("POST", "/auth/token")
            .with_status(200)
            .with_body(token_body("tok", None))
            .create_async()
            .await;
        let refresh = server
            .mock("POST", "/auth/refresh")
            .expect(0)
            .create_async()
            .await;
        server
            .mock("POST", "/health/data/daily")
            .with_status(status)
            .create_async()
            .await;

        let agent = agent(&server);
        assert_eq!(run(&agent).await, expected);
        refresh.assert_async().await;
    }
    Ok(())
}

#[tokio::test]
async fn test_token_endpoint_failures() -> Result<()> {
    for (status, expected) in [
        (
            401,
            SyncOutcome::PermanentFailure(FailureReason::AuthRejected),
        ),
        (
            500,
            SyncOutcome::RetryableFailure(FailureReason::NetworkUnreachable),
        ),
    ] {
        let mut server = Server::new_async().await;
        server
            .mock("POST", "/auth/token")
            .with_status(status)
            .create_async()
            .await;
        let upload = server
            .mock("POST", "/health/data/daily")
            .expect(0)
            .create_async()
            .await;

        let agent = agent(&server);
        assert_eq!(run(&agent).await, expected);
        upload.assert_async().await;
    }
    Ok(())
}

#[tokio::test]
async fn test_unreachable_backend_is_retryable() -> Result<()> {
    // Bind then drop to get a port nothing listens on
    let port = {
        let listener = std::net::TcpListener::bind("127.0.0.1:0")?;
        listener.local_addr()?.port()
    };

    let store: Arc<dyn SecureKeyValueStore> = Arc::new(InMemoryKeyValueStore::new());
    let transport: Arc<dyn SyncTransport> = Arc::new(HttpTransport::new(
        &format!("http://127.0.0.1:{}/", port),
        std::time::Duration::from_secs(2),
    )?);
    let tokens = Arc::new(TokenManager::new(
        transport.clone(),
        TokenStore::new(store.clone()),
        DeviceIdentity::new(store),
        AuthMethod::DeviceIdentity,
    ));
    let orchestrator = SyncOrchestrator::new(
        Arc::new(StaticSource::new(snapshot())),
        tokens,
        transport,
    );

    assert_eq!(
        orchestrator.run_for_date(report_date(), offset()).await,
        SyncOutcome::RetryableFailure(FailureReason::NetworkUnreachable)
    );
    Ok(())
}

#[tokio::test]
async fn test_password_login_and_encrypted_sqlite_store() -> Result<()> {
    let mut server = Server::new_async().await;

    let login = server
        .mock("POST", "/auth/token")
        .match_body(Matcher::Json(json!({ "username": "alice", "password": "secret" })))
        .with_status(200)
        .with_body(token_body("tok-1", Some("ref-1")))
        .expect(1)
        .create_async()
        .await;
    let upload = server
        .mock("POST", "/health/data/daily")
        .match_header("authorization", "Bearer tok-1")
        .with_status(200)
        .expect(1)
        .create_async()
        .await;

    let dir = tempfile::tempdir()?;
    let db = Database::new(DbConfig::new(dir.path().join("healthsync.db"))).await?;
    let key_path = dir.path().join("secure_kv.key");
    let store: Arc<dyn SecureKeyValueStore> = Arc::new(SqliteKeyValueStore::new(
        db.secure_kv(),
        StoreKey::load_or_create(&key_path)?,
    ));

    let agent = agent_with(
        &server,
        store,
        AuthMethod::Password {
            username: "alice".to_string(),
            password: "secret".to_string(),
        },
        Arc::new(StaticSource::new(snapshot())),
    );

    assert_eq!(run(&agent).await, SyncOutcome::Success);
    login.assert_async().await;
    upload.assert_async().await;

    let raw = db.secure_kv().get("credential").await?.unwrap();
    assert!(!raw.contains("tok-1"));
    assert!(!raw.contains("ref-1"));

    // A restarted agent reads the credential back with the same key file
    let restarted: Arc<dyn SecureKeyValueStore> = Arc::new(SqliteKeyValueStore::new(
        db.secure_kv(),
        StoreKey::load_or_create(&key_path)?,
    ));
    let credential = TokenStore::new(restarted).get().await?.unwrap();
    assert_eq!(credential.access_token, "tok-1");
    Ok(())
}

#[tokio::test]
async fn test_upload_disabled_never_calls_backend() -> Result<()> {
    let mut server = Server::new_async().await;
    let any = server
        .mock("POST", Matcher::Any)
        .expect(0)
        .create_async()
        .await;

    let mut agent = agent(&server);
    agent.orchestrator = agent.orchestrator.with_upload_enabled(false);

    assert_eq!(run(&agent).await, SyncOutcome::Success);
    any.assert_async().await;
    Ok(())
}

#[tokio::test]
async fn test_json_export_source_feeds_the_report() -> Result<()> {
    let mut server = Server::new_async().await;
    server
        .mock("POST", "/auth/token")
        .with_status(200)
        .with_body(token_body("tok", None))
        .create_async()
        .await;
    let upload = server
        .mock("POST", "/health/data/daily")
        .match_body(Matcher::PartialJson(json!({
            "date": "2024-03-05",
            "steps": 1234,
            "averageRestingHeartRate": 55
        })))
        .with_status(200)
        .expect(1)
        .create_async()
        .await;

    let dir = tempfile::tempdir()?;
    std::fs::write(
        dir.path().join("2024-03-05.json"),
        r#"{ "steps": 1234, "averageRestingHeartRate": 55 }"#,
    )?;

    let agent = agent_with(
        &server,
        Arc::new(InMemoryKeyValueStore::new()),
        AuthMethod::DeviceIdentity,
        Arc::new(JsonDirectorySource::new(dir.path())),
    );

    assert_eq!(run(&agent).await, SyncOutcome::Success);
    upload.assert_async().await;
    Ok(())
}
