//! # HealthSync Agent
//!
//! Wires the sync engine to SQLite, the backend and a tokio schedule.
//!
//! ## Component Wiring
//! ```text
//! ┌─────────────────────────────────────────────────────────────────────────┐
//! │                         Agent::build(&config)                          │
//! │                                                                         │
//! │  Database ──► secure_kv ──► SqliteKeyValueStore ◄── StoreKey           │
//! │      │                          ├── TokenStore                          │
//! │      │                          └── DeviceIdentity                      │
//! │      │                                                                  │
//! │      │        HttpTransport ──► TokenManager ──┐                        │
//! │      │        JsonDirectorySource ─────────────┼──► SyncOrchestrator   │
//! │      │                                          │                       │
//! │      └──► sync_runs ──► JournalingJob ◄─────────┘                       │
//! │                              │                                          │
//! │                              ▼                                          │
//! │                       TokioScheduler ◄── ScheduleDriver(mode)          │
//! └─────────────────────────────────────────────────────────────────────────┘
//! ```

pub mod journal;

use anyhow::Context;
use chrono::{Local, NaiveDateTime};
use healthsync_core::ScheduledJobDescriptor;
use healthsync_db::{Database, DbConfig};
use healthsync_sync::{
    DeviceIdentity, HttpTransport, JsonDirectorySource, LogNotifier, RetryPolicy,
    ScheduleDriver, SecureKeyValueStore, SqliteKeyValueStore, StoreKey, SyncConfig,
    SyncOrchestrator, SyncStatus, SyncTransport, TokenManager, TokenStore, TokioScheduler,
    STORE_KEY_ENV,
};
use std::path::PathBuf;
use std::sync::Arc;
use tracing::{error, info};
use tracing_subscriber::EnvFilter;

use crate::journal::JournalingJob;

/// Environment variable naming the config file.
pub const CONFIG_PATH_ENV: &str = "HEALTHSYNC_CONFIG";

/// A fully wired agent, ready to register its schedule.
pub struct Agent {
    db: Database,
    orchestrator: Arc<SyncOrchestrator>,
    scheduler: TokioScheduler,
    driver: ScheduleDriver,
}

impl Agent {
    /// Opens storage and builds the sync engine described by `config`.
    pub async fn build(config: &SyncConfig) -> anyhow::Result<Self> {
        let db_path = config.db_path()?;
        let db = Database::new(DbConfig::new(&db_path))
            .await
            .with_context(|| format!("opening database at {}", db_path.display()))?;
        info!(?db_path, "Database connected and migrations applied");

        let pruned = db
            .sync_runs()
            .cleanup_older_than(config.storage.journal_retention_days)
            .await?;
        if pruned > 0 {
            info!(pruned, "Pruned old sync runs");
        }

        let key_path = config.key_path()?;
        let env_key = std::env::var(STORE_KEY_ENV).ok();
        let key = StoreKey::resolve(env_key.as_deref(), &key_path)
            .with_context(|| format!("loading store key from {}", key_path.display()))?;

        let store: Arc<dyn SecureKeyValueStore> =
            Arc::new(SqliteKeyValueStore::new(db.secure_kv(), key));
        let transport: Arc<dyn SyncTransport> = Arc::new(HttpTransport::new(
            &config.backend.base_url,
            config.backend.timeout(),
        )?);
        let tokens = Arc::new(TokenManager::new(
            transport.clone(),
            TokenStore::new(store.clone()),
            DeviceIdentity::new(store),
            config.auth.clone(),
        ));

        let source_dir = config.source_dir()?;
        info!(?source_dir, "Reading health exports");

        let orchestrator = Arc::new(
            SyncOrchestrator::new(
                Arc::new(JsonDirectorySource::new(source_dir)),
                tokens,
                transport,
            )
            .with_notifier(Arc::new(LogNotifier))
            .with_upload_enabled(config.backend.upload_enabled),
        );

        let job = Arc::new(JournalingJob::new(orchestrator.clone(), db.sync_runs()));
        let scheduler = TokioScheduler::new(job, RetryPolicy::from(&config.retry));
        let driver = ScheduleDriver::new(config.schedule_mode()?);

        Ok(Agent {
            db,
            orchestrator,
            scheduler,
            driver,
        })
    }

    /// Registers the sync job as seen at local time `now`.
    pub fn start(&self, now: NaiveDateTime) -> ScheduledJobDescriptor {
        self.driver.register(&self.scheduler, now)
    }

    pub async fn status(&self) -> SyncStatus {
        self.orchestrator.status().await
    }

    pub fn database(&self) -> &Database {
        &self.db
    }

    pub fn active_jobs(&self) -> Vec<String> {
        self.scheduler.active_jobs()
    }

    /// Cancels scheduled jobs and closes the database.
    pub async fn stop(self) {
        self.scheduler.shutdown();
        self.db.close().await;
    }
}

/// Runs the agent until Ctrl+C or SIGTERM.
pub async fn run() -> anyhow::Result<()> {
    init_tracing();

    info!("Starting HealthSync agent");

    let config_path = std::env::var_os(CONFIG_PATH_ENV).map(PathBuf::from);
    let config = SyncConfig::load(config_path).context("loading sync config")?;
    info!(
        device = %config.device.name,
        backend = %config.backend.base_url,
        auth = %config.auth,
        upload_enabled = config.backend.upload_enabled,
        "Configuration loaded"
    );

    let agent = Agent::build(&config).await?;
    let job = agent.start(Local::now().naive_local());
    info!(job = %job.name, "Agent running");

    shutdown_signal().await;

    info!("Shutting down");
    let status = agent.status().await;
    info!(phase = %status.phase, last_success_at = ?status.last_success_at, "Final sync status");
    agent.stop().await;

    info!("Agent shutdown complete");
    Ok(())
}

/// Initializes the tracing subscriber.
///
/// `RUST_LOG` overrides the default `info,healthsync=debug,sqlx=warn`.
fn init_tracing() {
    let filter = EnvFilter::try_from_default_env()
        .unwrap_or_else(|_| EnvFilter::new("info,healthsync=debug,sqlx=warn"));

    tracing_subscriber::fmt()
        .with_env_filter(filter)
        .with_target(true)
        .init();
}

/// Completes on Ctrl+C or, on unix, SIGTERM.
async fn shutdown_signal() {
    let ctrl_c = async {
        if let Err(e) = tokio::signal::ctrl_c().await {
            error!(error = %e, "Failed to listen for Ctrl+C");
            std::future::pending::<()>().await;
        }
    };

    #[cfg(unix)]
    let terminate = async {
        match tokio::signal::unix::signal(tokio::signal::unix::SignalKind::terminate()) {
            Ok(mut signal) => {
                signal.recv().await;
            }
            Err(e) => {
                error!(error = %e, "Failed to install SIGTERM handler");
                std::future::pending::<()>().await;
            }
        }
    };

    #[cfg(not(unix))]
    let terminate = std::future::pending::<()>();

    tokio::select! {
        _ = ctrl_c => info!("Received Ctrl+C"),
        _ = terminate => info!("Received SIGTERM"),
    }
}
