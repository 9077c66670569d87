//! # Sync Configuration
//!
//! Configuration management for the sync engine and the agent.
//!
//! ## Configuration Sources
//! ```text
//! ┌─────────────────────────────────────────────────────────────────────────┐
//! │                    Configuration Priority                               │
//! │                                                                         │
//! │  1. Environment Variables (highest priority)                           │
//! │     HEALTHSYNC_BACKEND_URL=https://api.example.com/                    │
//! │     HEALTHSYNC_SCHEDULE_MODE=fast                                      │
//! │                                                                         │
//! │  2. TOML Config File                                                   │
//! │     ~/.config/healthsync/sync.toml (Linux)                             │
//! │     ~/Library/Application Support/com.healthsync.agent/sync.toml       │
//! │                                                                         │
//! │  3. Default Values (lowest priority)                                   │
//! │     daily at 23:57, device-identity auth, upload enabled               │
//! └─────────────────────────────────────────────────────────────────────────┘
//! ```
//!
//! ## Configuration File Format
//! ```toml
//! # sync.toml
//! [device]
//! name = "Kitchen tablet"
//!
//! [backend]
//! base_url = "https://api.example.com/"
//! timeout_secs = 30
//! upload_enabled = true
//!
//! [auth]
//! method = "device_identity"   # device_identity | password
//!
//! [schedule]
//! mode = "daily"               # daily | fast
//! daily_at = "23:57"
//! fast_delay_secs = 60
//!
//! [retry]
//! initial_backoff_secs = 30
//! max_backoff_secs = 3600
//! max_attempts = 5
//!
//! [storage]
//! db_path = "/var/lib/healthsync/healthsync.db"
//! key_path = "/var/lib/healthsync/secure_kv.key"   # or HEALTHSYNC_STORE_KEY
//! journal_retention_days = 30
//!
//! [source]
//! dir = "/var/lib/healthsync/exports"
//! ```

use healthsync_core::schedule::{default_daily_time, DEFAULT_FAST_DELAY};
use healthsync_core::validation::{parse_time_of_day, validate_login};
use healthsync_core::ScheduleMode;
use serde::{Deserialize, Serialize};
use std::path::PathBuf;
use std::time::Duration;
use tracing::{debug, info, warn};
use url::Url;

use crate::error::{SyncError, SyncResult};

// =============================================================================
// Device Configuration
// =============================================================================

/// Configuration for this device.
///
/// The device identity itself is generated on first run and kept in the
/// secure store, not here.
#[derive(Debug, Clone, Serialize, Deserialize)]
pub struct DeviceConfig {
    /// Human-readable device name, used in logs only.
    #[serde(default = "default_device_name")]
    pub name: String,
}

fn default_device_name() -> String {
    "HealthSync Agent".to_string()
}

impl Default for DeviceConfig {
    fn default() -> Self {
        DeviceConfig {
            name: default_device_name(),
        }
    }
}

// =============================================================================
// Backend Settings
// =============================================================================

/// Where and how to reach the backend.
#[derive(Debug, Clone, Serialize, Deserialize)]
pub struct BackendSettings {
    /// Base URL of the REST API. Endpoint paths are resolved against it.
    #[serde(default = "default_base_url")]
    pub base_url: String,

    /// Per-request timeout (seconds).
    #[serde(default = "default_timeout")]
    pub timeout_secs: u64,

    /// When false, the report is built and logged but never uploaded.
    #[serde(default = "default_true")]
    pub upload_enabled: bool,
}

fn default_base_url() -> String {
    "http://localhost:8080/".to_string()
}

fn default_timeout() -> u64 {
    30
}

fn default_true() -> bool {
    true
}

impl Default for BackendSettings {
    fn default() -> Self {
        BackendSettings {
            base_url: default_base_url(),
            timeout_secs: default_timeout(),
            upload_enabled: true,
        }
    }
}

impl BackendSettings {
    /// Returns the request timeout as a Duration.
    pub fn timeout(&self) -> Duration {
        Duration::from_secs(self.timeout_secs)
    }
}

// =============================================================================
// Auth Settings
// =============================================================================

/// How the agent obtains its first credential.
///
/// ## Methods
/// ```text
/// device_identity  POST auth/token { "deviceId": "<uuid>" }
/// password         POST auth/token { "username": "...", "password": "..." }
/// ```
#[derive(Clone, PartialEq, Eq, Default, Serialize, Deserialize)]
#[serde(tag = "method", rename_all = "snake_case")]
pub enum AuthMethod {
    /// Exchange the persisted device identity for a token.
    #[default]
    DeviceIdentity,

    /// Log in with a username and password.
    Password { username: String, password: String },
}

// Keeps the password out of debug logs.
impl std::fmt::Debug for AuthMethod {
    fn fmt(&self, f: &mut std::fmt::Formatter<'_>) -> std::fmt::Result {
        match self {
            AuthMethod::DeviceIdentity => write!(f, "DeviceIdentity"),
            AuthMethod::Password { username, .. } => f
                .debug_struct("Password")
                .field("username", username)
                .field("password", &"***")
                .finish(),
        }
    }
}

impl std::fmt::Display for AuthMethod {
    fn fmt(&self, f: &mut std::fmt::Formatter<'_>) -> std::fmt::Result {
        match self {
            AuthMethod::DeviceIdentity => write!(f, "device_identity"),
            AuthMethod::Password { .. } => write!(f, "password"),
        }
    }
}

// =============================================================================
// Schedule Settings
// =============================================================================

/// Which schedule mode to run in.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Default, Serialize, Deserialize)]
#[serde(rename_all = "snake_case")]
pub enum ScheduleKind {
    /// Recurring job once a day.
    #[default]
    Daily,

    /// One-shot job shortly after startup (testing, manual sync).
    Fast,
}

impl std::str::FromStr for ScheduleKind {
    type Err = SyncError;

    fn from_str(s: &str) -> Result<Self, Self::Err> {
        match s.to_lowercase().as_str() {
            "daily" => Ok(ScheduleKind::Daily),
            "fast" | "now" => Ok(ScheduleKind::Fast),
            other => Err(SyncError::InvalidConfig(format!(
                "Unknown schedule mode: '{}'. Valid options: daily, fast",
                other
            ))),
        }
    }
}

/// Schedule settings.
#[derive(Debug, Clone, Serialize, Deserialize)]
pub struct ScheduleSettings {
    #[serde(default)]
    pub mode: ScheduleKind,

    /// Local time-of-day for daily mode, `HH:MM`.
    #[serde(default = "default_daily_at")]
    pub daily_at: String,

    /// Delay before the one-shot run in fast mode (seconds).
    #[serde(default = "default_fast_delay")]
    pub fast_delay_secs: u64,
}

fn default_daily_at() -> String {
    default_daily_time().format("%H:%M").to_string()
}

fn default_fast_delay() -> u64 {
    DEFAULT_FAST_DELAY.as_secs()
}

impl Default for ScheduleSettings {
    fn default() -> Self {
        ScheduleSettings {
            mode: ScheduleKind::default(),
            daily_at: default_daily_at(),
            fast_delay_secs: default_fast_delay(),
        }
    }
}

impl ScheduleSettings {
    /// Resolves the settings into the mode value the schedule driver takes.
    pub fn to_mode(&self) -> SyncResult<ScheduleMode> {
        match self.mode {
            ScheduleKind::Daily => Ok(ScheduleMode::Daily {
                at: parse_time_of_day(&self.daily_at)?,
            }),
            ScheduleKind::Fast => Ok(ScheduleMode::Fast {
                delay: Duration::from_secs(self.fast_delay_secs),
            }),
        }
    }
}

// =============================================================================
// Retry Settings
// =============================================================================

/// Backoff applied by the host scheduler after a retryable outcome.
#[derive(Debug, Clone, Serialize, Deserialize)]
pub struct RetrySettings {
    /// First retry delay (seconds).
    #[serde(default = "default_initial_backoff")]
    pub initial_backoff_secs: u64,

    /// Upper bound for a single retry delay (seconds).
    #[serde(default = "default_max_backoff")]
    pub max_backoff_secs: u64,

    /// Retries per scheduled run before giving up until the next one.
    #[serde(default = "default_max_attempts")]
    pub max_attempts: u32,
}

fn default_initial_backoff() -> u64 {
    30
}
fn default_max_backoff() -> u64 {
    3600
}
fn default_max_attempts() -> u32 {
    5
}

impl Default for RetrySettings {
    fn default() -> Self {
        RetrySettings {
            initial_backoff_secs: default_initial_backoff(),
            max_backoff_secs: default_max_backoff(),
            max_attempts: default_max_attempts(),
        }
    }
}

impl RetrySettings {
    pub fn initial_backoff(&self) -> Duration {
        Duration::from_secs(self.initial_backoff_secs)
    }

    pub fn max_backoff(&self) -> Duration {
        Duration::from_secs(self.max_backoff_secs)
    }
}

// =============================================================================
// Storage & Source Settings
// =============================================================================

/// Local storage settings.
#[derive(Debug, Clone, Serialize, Deserialize)]
pub struct StorageSettings {
    /// SQLite database path. Defaults to the platform data directory.
    #[serde(default)]
    pub db_path: Option<PathBuf>,

    /// Store key file. Defaults to `secure_kv.key` beside the database.
    #[serde(default)]
    pub key_path: Option<PathBuf>,

    /// Sync run journal entries older than this are pruned on startup.
    #[serde(default = "default_retention_days")]
    pub journal_retention_days: u32,
}

fn default_retention_days() -> u32 {
    30
}

impl Default for StorageSettings {
    fn default() -> Self {
        StorageSettings {
            db_path: None,
            key_path: None,
            journal_retention_days: default_retention_days(),
        }
    }
}

/// Health data source settings.
#[derive(Debug, Clone, Default, Serialize, Deserialize)]
pub struct SourceSettings {
    /// Directory of daily JSON exports. Defaults to `<data dir>/exports`.
    #[serde(default)]
    pub dir: Option<PathBuf>,
}

// =============================================================================
// Main Sync Configuration
// =============================================================================

/// Complete sync configuration.
#[derive(Debug, Clone, Default, Serialize, Deserialize)]
pub struct SyncConfig {
    #[serde(default)]
    pub device: DeviceConfig,

    #[serde(default)]
    pub backend: BackendSettings,

    #[serde(default)]
    pub auth: AuthMethod,

    #[serde(default)]
    pub schedule: ScheduleSettings,

    #[serde(default)]
    pub retry: RetrySettings,

    #[serde(default)]
    pub storage: StorageSettings,

    #[serde(default)]
    pub source: SourceSettings,
}

impl SyncConfig {
    /// Creates a new config with defaults.
    pub fn new() -> Self {
        Self::default()
    }

    /// Loads configuration from file, environment, and defaults.
    ///
    /// ## Load Order (later overrides earlier)
    /// 1. Default values
    /// 2. Config file (sync.toml)
    /// 3. Environment variables
    pub fn load(config_path: Option<PathBuf>) -> SyncResult<Self> {
        let mut config = Self::default();

        if let Some(path) = config_path.or_else(Self::default_config_path) {
            if path.exists() {
                info!(?path, "Loading sync config from file");
                let contents = std::fs::read_to_string(&path)?;
                config = toml::from_str(&contents)?;
            } else {
                debug!(?path, "Config file not found, using defaults");
            }
        }

        config.apply_env_overrides();
        config.validate()?;

        Ok(config)
    }

    /// Validates the configuration.
    pub fn validate(&self) -> SyncResult<()> {
        let url = Url::parse(&self.backend.base_url)?;
        if url.scheme() != "http" && url.scheme() != "https" {
            return Err(SyncError::InvalidUrl(format!(
                "Backend URL must start with http:// or https://, got: {}",
                self.backend.base_url
            )));
        }

        if self.backend.timeout_secs == 0 {
            return Err(SyncError::InvalidConfig(
                "timeout_secs must be greater than 0".into(),
            ));
        }

        if let AuthMethod::Password { username, password } = &self.auth {
            validate_login(username, password)?;
        }

        // Rejects a malformed daily_at even in fast mode
        parse_time_of_day(&self.schedule.daily_at)?;

        if self.retry.initial_backoff_secs == 0
            || self.retry.max_backoff_secs < self.retry.initial_backoff_secs
        {
            return Err(SyncError::InvalidConfig(
                "retry backoff must satisfy 0 < initial_backoff_secs <= max_backoff_secs".into(),
            ));
        }

        Ok(())
    }

    /// Applies environment variable overrides.
    fn apply_env_overrides(&mut self) {
        self.apply_overrides_from(|key| std::env::var(key).ok());
    }

    /// Applies overrides from an arbitrary key lookup.
    fn apply_overrides_from(&mut self, lookup: impl Fn(&str) -> Option<String>) {
        if let Some(url) = lookup("HEALTHSYNC_BACKEND_URL") {
            debug!(url = %url, "Overriding backend URL from environment");
            self.backend.base_url = url;
        }

        if let Some(mode) = lookup("HEALTHSYNC_SCHEDULE_MODE") {
            match mode.parse() {
                Ok(parsed) => {
                    debug!(mode = %mode, "Overriding schedule mode from environment");
                    self.schedule.mode = parsed;
                }
                Err(_) => warn!(mode = %mode, "Unknown schedule mode in environment"),
            }
        }

        if let Some(at) = lookup("HEALTHSYNC_DAILY_AT") {
            self.schedule.daily_at = at;
        }

        // Login needs both halves
        if let (Some(username), Some(password)) =
            (lookup("HEALTHSYNC_USERNAME"), lookup("HEALTHSYNC_PASSWORD"))
        {
            debug!(username = %username, "Using password login from environment");
            self.auth = AuthMethod::Password { username, password };
        }

        if let Some(path) = lookup("HEALTHSYNC_DB_PATH") {
            self.storage.db_path = Some(PathBuf::from(path));
        }

        if let Some(path) = lookup("HEALTHSYNC_KEY_PATH") {
            self.storage.key_path = Some(PathBuf::from(path));
        }

        if let Some(dir) = lookup("HEALTHSYNC_SOURCE_DIR") {
            self.source.dir = Some(PathBuf::from(dir));
        }

        if let Some(enabled) = lookup("HEALTHSYNC_UPLOAD_ENABLED") {
            match enabled.to_lowercase().as_str() {
                "true" | "1" | "yes" => self.backend.upload_enabled = true,
                "false" | "0" | "no" => self.backend.upload_enabled = false,
                _ => warn!(value = %enabled, "Unknown HEALTHSYNC_UPLOAD_ENABLED value"),
            }
        }
    }

    fn project_dirs() -> Option<directories::ProjectDirs> {
        directories::ProjectDirs::from("com", "healthsync", "agent")
    }

    /// Returns the default config file path.
    fn default_config_path() -> Option<PathBuf> {
        Self::project_dirs().map(|dirs| dirs.config_dir().join("sync.toml"))
    }

    // =========================================================================
    // Convenience Methods
    // =========================================================================

    /// Returns the schedule mode the agent should register.
    pub fn schedule_mode(&self) -> SyncResult<ScheduleMode> {
        self.schedule.to_mode()
    }

    /// Returns the database path, falling back to the platform data directory.
    pub fn db_path(&self) -> SyncResult<PathBuf> {
        if let Some(path) = &self.storage.db_path {
            return Ok(path.clone());
        }
        Self::project_dirs()
            .map(|dirs| dirs.data_dir().join("healthsync.db"))
            .ok_or_else(|| SyncError::InvalidConfig("No data directory available".into()))
    }

    /// Returns the store key file path, next to the database unless configured.
    pub fn key_path(&self) -> SyncResult<PathBuf> {
        if let Some(path) = &self.storage.key_path {
            return Ok(path.clone());
        }
        let db_path = self.db_path()?;
        Ok(db_path
            .parent()
            .map(|dir| dir.join("secure_kv.key"))
            .unwrap_or_else(|| PathBuf::from("secure_kv.key")))
    }

    /// Returns the export directory, falling back to the platform data directory.
    pub fn source_dir(&self) -> SyncResult<PathBuf> {
        if let Some(dir) = &self.source.dir {
            return Ok(dir.clone());
        }
        Self::project_dirs()
            .map(|dirs| dirs.data_dir().join("exports"))
            .ok_or_else(|| SyncError::InvalidConfig("No data directory available".into()))
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use chrono::NaiveTime;
    use std::collections::HashMap;

    fn lookup(pairs: &[(&str, &str)]) -> impl Fn(&str) -> Option<String> {
        let map: HashMap<String, String> = pairs
            .iter()
            .map(|(k, v)| (k.to_string(), v.to_string()))
            .collect();
        move |key| map.get(key).cloned()
    }

    #[test]
    fn test_default_config() {
        let config = SyncConfig::default();
        assert!(config.validate().is_ok());
        assert_eq!(config.auth, AuthMethod::DeviceIdentity);
        assert!(config.backend.upload_enabled);
        assert_eq!(
            config.schedule_mode().unwrap(),
            ScheduleMode::Daily {
                at: NaiveTime::from_hms_opt(23, 57, 0).unwrap()
            }
        );
    }

    #[test]
    fn test_schedule_kind_parsing() {
        assert_eq!("daily".parse::<ScheduleKind>().unwrap(), ScheduleKind::Daily);
        assert_eq!("FAST".parse::<ScheduleKind>().unwrap(), ScheduleKind::Fast);
        assert!("hourly".parse::<ScheduleKind>().is_err());
    }

    #[test]
    fn test_fast_mode() {
        let mut config = SyncConfig::default();
        config.schedule.mode = ScheduleKind::Fast;
        config.schedule.fast_delay_secs = 5;
        assert_eq!(
            config.schedule_mode().unwrap(),
            ScheduleMode::Fast {
                delay: Duration::from_secs(5)
            }
        );
    }

    #[test]
    fn test_config_validation() {
        let mut config = SyncConfig::default();

        config.backend.base_url = "ftp://example.com".to_string();
        assert!(matches!(config.validate(), Err(SyncError::InvalidUrl(_))));

        config.backend.base_url = "not a url".to_string();
        assert!(config.validate().is_err());

        config.backend.base_url = "https://api.example.com/".to_string();
        config.schedule.daily_at = "25:00".to_string();
        assert!(config.validate().is_err());

        config.schedule.daily_at = "07:30".to_string();
        config.auth = AuthMethod::Password {
            username: "".to_string(),
            password: "secret".to_string(),
        };
        assert!(config.validate().is_err());

        config.auth = AuthMethod::Password {
            username: "alice".to_string(),
            password: "secret".to_string(),
        };
        assert!(config.validate().is_ok());
    }

    #[test]
    fn test_env_overrides() {
        let mut config = SyncConfig::default();
        config.apply_overrides_from(lookup(&[
            ("HEALTHSYNC_BACKEND_URL", "https://api.example.com/v1/"),
            ("HEALTHSYNC_SCHEDULE_MODE", "fast"),
            ("HEALTHSYNC_DAILY_AT", "06:15"),
            ("HEALTHSYNC_USERNAME", "alice"),
            ("HEALTHSYNC_PASSWORD", "secret"),
            ("HEALTHSYNC_DB_PATH", "/tmp/hs.db"),
            ("HEALTHSYNC_SOURCE_DIR", "/tmp/exports"),
            ("HEALTHSYNC_UPLOAD_ENABLED", "false"),
        ]));

        assert_eq!(config.backend.base_url, "https://api.example.com/v1/");
        assert_eq!(config.schedule.mode, ScheduleKind::Fast);
        assert_eq!(config.schedule.daily_at, "06:15");
        assert_eq!(
            config.auth,
            AuthMethod::Password {
                username: "alice".to_string(),
                password: "secret".to_string()
            }
        );
        assert_eq!(config.db_path().unwrap(), PathBuf::from("/tmp/hs.db"));
        assert_eq!(config.source_dir().unwrap(), PathBuf::from("/tmp/exports"));
        assert!(!config.backend.upload_enabled);
        assert_eq!(config.key_path().unwrap(), PathBuf::from("/tmp/secure_kv.key"));

        config.apply_overrides_from(lookup(&[("HEALTHSYNC_KEY_PATH", "/etc/healthsync/kv.key")]));
        assert_eq!(
            config.key_path().unwrap(),
            PathBuf::from("/etc/healthsync/kv.key")
        );
    }

    #[test]
    fn test_username_alone_does_not_switch_auth() {
        let mut config = SyncConfig::default();
        config.apply_overrides_from(lookup(&[("HEALTHSYNC_USERNAME", "alice")]));
        assert_eq!(config.auth, AuthMethod::DeviceIdentity);
    }

    #[test]
    fn test_load_reads_file() {
        let dir = tempfile::tempdir().unwrap();
        let path = dir.path().join("sync.toml");

        let mut config = SyncConfig::default();
        config.auth = AuthMethod::Password {
            username: "alice".to_string(),
            password: "secret".to_string(),
        };
        config.schedule.daily_at = "21:00".to_string();
        let contents = toml::to_string_pretty(&config).unwrap();
        assert!(contents.contains("[backend]"));
        assert!(contents.contains("method = \"password\""));
        std::fs::write(&path, contents).unwrap();

        let loaded = SyncConfig::load(Some(path)).unwrap();
        assert_eq!(loaded.schedule.daily_at, "21:00");
    }

    #[test]
    fn test_partial_toml_uses_defaults() {
        let config: SyncConfig = toml::from_str(
            r#"
            [backend]
            base_url = "https://api.example.com/"

            [schedule]
            mode = "fast"
            "#,
        )
        .unwrap();

        assert_eq!(config.backend.timeout_secs, 30);
        assert_eq!(config.schedule.mode, ScheduleKind::Fast);
        assert_eq!(config.schedule.fast_delay_secs, 60);
        assert_eq!(config.retry.max_attempts, 5);
        assert_eq!(config.auth, AuthMethod::DeviceIdentity);
    }

    #[test]
    fn test_debug_hides_password() {
        let auth = AuthMethod::Password {
            username: "alice".to_string(),
            password: "hunter2".to_string(),
        };
        let debug = format!("{:?}", auth);
        assert!(debug.contains("alice"));
        assert!(!debug.contains("hunter2"));
    }
}
