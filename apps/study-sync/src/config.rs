//! Application configuration.
//!
//! Values come from built-in defaults, then an optional TOML file, then
//! `STUDY_SYNC_*` environment variables (a `.env` file is loaded first).

use std::path::{Path, PathBuf};
use std::time::Duration;

use chrono::{DateTime, Utc};
use serde::{Deserialize, Serialize};
use study_core::{InterleaveConfig, QualityThresholds};

pub const ENV_PREFIX: &str = "STUDY_SYNC_";
pub const MIN_BATCH_SIZE: usize = 50;
pub const MAX_BATCH_SIZE: usize = 100;

#[derive(Debug, thiserror::Error)]
pub enum ConfigError {
    #[error("cannot read config file {path}: {source}")]
    Io {
        path: PathBuf,
        #[source]
        source: std::io::Error,
    },

    #[error("cannot parse config file: {0}")]
    Parse(#[from] toml::de::Error),

    #[error("invalid value for {key}: {value}")]
    InvalidEnv { key: String, value: String },

    #[error("invalid configuration: {0}")]
    Invalid(String),
}

#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
#[serde(default)]
pub struct AppConfig {
    pub database_path: PathBuf,
    pub remote: RemoteConfig,
    pub sync: SyncConfig,
    pub study: StudyConfig,
}

impl Default for AppConfig {
    fn default() -> Self {
        Self {
            database_path: default_db_path(),
            remote: RemoteConfig::default(),
            sync: SyncConfig::default(),
            study: StudyConfig::default(),
        }
    }
}

/// Connection settings for the remote scheduler.
#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
#[serde(default)]
pub struct RemoteConfig {
    pub url: String,
    pub api_version: u32,
    pub request_timeout_ms: u64,
    pub probe_timeout_ms: u64,
    /// How long a probe result is reused.
    pub probe_cache_ttl_ms: u64,
    /// Total attempts for a call that keeps failing with a server error.
    pub max_attempts: u32,
    pub base_backoff_ms: u64,
    pub max_backoff_ms: u64,
    /// Day zero for review due dates reported as day counts.
    pub collection_epoch: DateTime<Utc>,
}

impl Default for RemoteConfig {
    fn default() -> Self {
        Self {
            url: "http://127.0.0.1:8765".to_string(),
            api_version: 6,
            request_timeout_ms: 10_000,
            probe_timeout_ms: 2_000,
            probe_cache_ttl_ms: 5_000,
            max_attempts: 3,
            base_backoff_ms: 200,
            max_backoff_ms: 5_000,
            collection_epoch: DateTime::UNIX_EPOCH,
        }
    }
}

impl RemoteConfig {
    pub fn request_timeout(&self) -> Duration {
        Duration::from_millis(self.request_timeout_ms)
    }

    pub fn probe_timeout(&self) -> Duration {
        Duration::from_millis(self.probe_timeout_ms)
    }

    pub fn probe_cache_ttl(&self) -> Duration {
        Duration::from_millis(self.probe_cache_ttl_ms)
    }

    /// Delay before retry number `attempt` (1-based), doubling up to the cap.
    pub fn backoff(&self, attempt: u32) -> Duration {
        let factor = 2u64.saturating_pow(attempt.saturating_sub(1));
        Duration::from_millis(
            self.base_backoff_ms
                .saturating_mul(factor)
                .min(self.max_backoff_ms),
        )
    }
}

/// Field names of the remote note model.
#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
#[serde(default)]
pub struct NoteFields {
    pub front: String,
    pub back: String,
    /// Carries the content key; the join key for pulls.
    pub identity: String,
    pub source: String,
    pub metadata: String,
}

impl Default for NoteFields {
    fn default() -> Self {
        Self {
            front: "Front".to_string(),
            back: "Back".to_string(),
            identity: "Identity".to_string(),
            source: "Source".to_string(),
            metadata: "Metadata".to_string(),
        }
    }
}

#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
#[serde(default)]
pub struct SyncConfig {
    pub interval_secs: u64,
    pub batch_size: usize,
    pub root_deck: String,
    pub note_model: String,
    pub fields: NoteFields,
    pub tag_prefix: String,
    pub thresholds: QualityThresholds,
    /// Push every eligible item, not only those changed since the last sync.
    pub full_sync: bool,
    /// Search expression for pulls. Defaults to the root deck and note model.
    pub pull_scope: Option<String>,
    pub start_probe_timeout_ms: u64,
    pub stop_timeout_ms: u64,
}

impl Default for SyncConfig {
    fn default() -> Self {
        Self {
            interval_secs: 300,
            batch_size: MIN_BATCH_SIZE,
            root_deck: "Study".to_string(),
            note_model: "StudySync".to_string(),
            fields: NoteFields::default(),
            tag_prefix: "study-sync".to_string(),
            thresholds: QualityThresholds::default(),
            full_sync: false,
            pull_scope: None,
            start_probe_timeout_ms: 1_500,
            stop_timeout_ms: 5_000,
        }
    }
}

impl SyncConfig {
    pub fn interval(&self) -> Duration {
        Duration::from_secs(self.interval_secs)
    }

    pub fn start_probe_timeout(&self) -> Duration {
        Duration::from_millis(self.start_probe_timeout_ms)
    }

    pub fn stop_timeout(&self) -> Duration {
        Duration::from_millis(self.stop_timeout_ms)
    }
}

#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
#[serde(default)]
pub struct StudyConfig {
    /// Local hour (0-23) at which a new study day begins.
    pub daily_reset_hour: u32,
    pub interleave: InterleaveConfig,
}

impl Default for StudyConfig {
    fn default() -> Self {
        Self {
            daily_reset_hour: 4,
            interleave: InterleaveConfig::default(),
        }
    }
}

impl AppConfig {
    /// Load configuration from an optional file plus the process environment.
    ///
    /// Without an explicit path, `STUDY_SYNC_CONFIG` names the file if set.
    pub fn load(path: Option<&Path>) -> Result<Self, ConfigError> {
        dotenvy::dotenv().ok();

        let file = path
            .map(Path::to_path_buf)
            .or_else(|| std::env::var_os(format!("{ENV_PREFIX}CONFIG")).map(PathBuf::from));
        let mut config = match file {
            Some(path) => Self::from_file(&path)?,
            None => Self::default(),
        };
        config.apply_env(|key| std::env::var(key).ok())?;
        config.validate()?;
        Ok(config)
    }

    pub fn from_file(path: &Path) -> Result<Self, ConfigError> {
        let text = std::fs::read_to_string(path).map_err(|source| ConfigError::Io {
            path: path.to_path_buf(),
            source,
        })?;
        Self::from_toml(&text)
    }

    pub fn from_toml(text: &str) -> Result<Self, ConfigError> {
        Ok(toml::from_str(text)?)
    }

    /// Apply `STUDY_SYNC_*` overrides using `lookup` to read variables.
    pub fn apply_env<F>(&mut self, lookup: F) -> Result<(), ConfigError>
    where
        F: Fn(&str) -> Option<String>,
    {
        let get = |name: &str| {
            let key = format!("{ENV_PREFIX}{name}");
            lookup(&key).map(|value| (key, value))
        };

        if let Some((_, value)) = get("DB") {
            self.database_path = PathBuf::from(value);
        }
        if let Some((_, value)) = get("URL") {
            self.remote.url = value;
        }
        if let Some((_, value)) = get("ROOT_DECK") {
            self.sync.root_deck = value;
        }
        if let Some((_, value)) = get("NOTE_MODEL") {
            self.sync.note_model = value;
        }
        if let Some((key, value)) = get("INTERVAL_SECS") {
            self.sync.interval_secs = parse_env(&key, &value)?;
        }
        if let Some((key, value)) = get("BATCH_SIZE") {
            self.sync.batch_size = parse_env(&key, &value)?;
        }
        if let Some((key, value)) = get("FULL_SYNC") {
            self.sync.full_sync = parse_env(&key, &value)?;
        }
        if let Some((key, value)) = get("REQUEST_TIMEOUT_MS") {
            self.remote.request_timeout_ms = parse_env(&key, &value)?;
        }
        if let Some((key, value)) = get("DAILY_RESET_HOUR") {
            self.study.daily_reset_hour = parse_env(&key, &value)?;
        }
        Ok(())
    }

    pub fn validate(&self) -> Result<(), ConfigError> {
        if !(MIN_BATCH_SIZE..=MAX_BATCH_SIZE).contains(&self.sync.batch_size) {
            return Err(ConfigError::Invalid(format!(
                "sync.batch_size must be within {MIN_BATCH_SIZE}..={MAX_BATCH_SIZE}, got {}",
                self.sync.batch_size
            )));
        }
        if self.sync.interval_secs == 0 {
            return Err(ConfigError::Invalid("sync.interval_secs must be positive".to_string()));
        }
        if self.remote.max_attempts == 0 {
            return Err(ConfigError::Invalid("remote.max_attempts must be positive".to_string()));
        }
        if self.study.daily_reset_hour > 23 {
            return Err(ConfigError::Invalid(format!(
                "study.daily_reset_hour must be 0-23, got {}",
                self.study.daily_reset_hour
            )));
        }
        if self.sync.root_deck.trim().is_empty() {
            return Err(ConfigError::Invalid("sync.root_deck must not be empty".to_string()));
        }
        self.sync
            .thresholds
            .validate()
            .map_err(|e| ConfigError::Invalid(e.to_string()))?;
        self.study
            .interleave
            .validate()
            .map_err(|e| ConfigError::Invalid(e.to_string()))?;
        Ok(())
    }
}

fn parse_env<T: std::str::FromStr>(key: &str, value: &str) -> Result<T, ConfigError> {
    value.trim().parse().map_err(|_| ConfigError::InvalidEnv {
        key: key.to_string(),
        value: value.to_string(),
    })
}

/// Get the database path.
pub fn default_db_path() -> PathBuf {
    let data_dir = dirs::data_local_dir().unwrap_or_else(|| PathBuf::from("."));
    data_dir.join("study-sync").join("study.db")
}
