//! Configuration loading and typed config structures for the dungeon relay.
//!
//! The configuration lives in `dungeon-relay.yaml`. Every field has a
//! default, so an empty file (or no file at all) yields a working setup
//! pointed at the live game server with one manager per dungeon.

use std::path::{Path, PathBuf};
use std::time::Duration;

use dungeon_raidlog::RetryPolicy;
use dungeon_types::DungeonKind;
use serde::Deserialize;

/// Polling period used when a manager does not set `log_check_interval`.
pub const DEFAULT_LOG_CHECK_INTERVAL_SECS: u64 = 15;

/// Errors that can occur when loading or validating configuration.
#[derive(Debug, thiserror::Error)]
pub enum ConfigError {
    /// Failed to read the configuration file from disk.
    #[error("failed to read config file: {source}")]
    Io {
        /// The underlying I/O error.
        #[from]
        source: std::io::Error,
    },

    /// Failed to parse YAML content.
    #[error("failed to parse config YAML: {source}")]
    Yaml {
        /// The underlying YAML parse error.
        source: serde_yml::Error,
    },

    /// `log_check_interval` is not an integer number of seconds.
    #[error("bad config for channel {channel}: log_check_interval must be an integer, got {value}")]
    BadConfig {
        /// The manager's channel setting.
        channel: String,
        /// The offending value, as written.
        value: String,
    },

    /// A manager was configured on a channel that is not its dungeon's.
    #[error("wrong channel {channel}: expected a channel list including {expected}")]
    WrongChannel {
        /// The manager's channel setting.
        channel: String,
        /// The channel the dungeon requires.
        expected: String,
    },
}

impl From<serde_yml::Error> for ConfigError {
    fn from(source: serde_yml::Error) -> Self {
        Self::Yaml { source }
    }
}

/// Top-level relay configuration.
///
/// Mirrors the structure of `dungeon-relay.yaml`.
#[derive(Debug, Clone, PartialEq, Deserialize)]
pub struct RelayConfig {
    /// Game server session settings.
    #[serde(default)]
    pub session: SessionConfig,

    /// Folder holding the classifier CSV files.
    #[serde(default = "default_database_folder")]
    pub database_folder: PathBuf,

    /// Folder holding the per-channel persistent state files.
    #[serde(default = "default_state_dir")]
    pub state_dir: PathBuf,

    /// Period of the heartbeat that drives log polling, in milliseconds.
    #[serde(default = "default_heartbeat_interval_ms")]
    pub heartbeat_interval_ms: u64,

    /// How long an initializing manager waits for a sibling's raid log.
    #[serde(default = "default_bus_reply_timeout_ms")]
    pub bus_reply_timeout_ms: u64,

    /// Retry schedule for raid log downloads.
    #[serde(default)]
    pub retry: RetryConfig,

    /// One entry per dungeon manager.
    #[serde(default = "default_managers")]
    pub managers: Vec<ManagerConfig>,
}

impl Default for RelayConfig {
    fn default() -> Self {
        Self {
            session: SessionConfig::default(),
            database_folder: default_database_folder(),
            state_dir: default_state_dir(),
            heartbeat_interval_ms: default_heartbeat_interval_ms(),
            bus_reply_timeout_ms: default_bus_reply_timeout_ms(),
            retry: RetryConfig::default(),
            managers: default_managers(),
        }
    }
}

impl RelayConfig {
    /// Load configuration from a YAML file at the given path.
    ///
    /// Environment variables override YAML values for the session:
    /// - `RELAY_BASE_URL` overrides `session.base_url`
    /// - `RELAY_SESSION_COOKIE` overrides `session.cookie`
    /// - `RELAY_PWD_HASH` overrides `session.pwd_hash`
    ///
    /// # Errors
    ///
    /// Returns [`ConfigError::Io`] if the file cannot be read, or
    /// [`ConfigError::Yaml`] if the content is not valid YAML.
    pub fn from_file(path: &Path) -> Result<Self, ConfigError> {
        let contents = std::fs::read_to_string(path)?;
        Self::parse(&contents)
    }

    /// Parse configuration from a YAML string.
    ///
    /// # Errors
    ///
    /// Returns [`ConfigError::Yaml`] if the string is not valid YAML.
    pub fn parse(yaml: &str) -> Result<Self, ConfigError> {
        let mut config: Self = serde_yml::from_str(yaml)?;
        config.session.apply_env_overrides();
        Ok(config)
    }

    /// Heartbeat period.
    pub const fn heartbeat_interval(&self) -> Duration {
        Duration::from_millis(self.heartbeat_interval_ms)
    }

    /// Bus reply timeout.
    pub const fn bus_reply_timeout(&self) -> Duration {
        Duration::from_millis(self.bus_reply_timeout_ms)
    }
}

/// Game server session settings.
#[derive(Debug, Clone, PartialEq, Eq, Deserialize)]
pub struct SessionConfig {
    /// Server base URL.
    #[serde(default = "default_base_url")]
    pub base_url: String,

    /// Cookie header of an already logged-in session.
    #[serde(default)]
    pub cookie: Option<String>,

    /// The session's `pwd` hash, sent with every raid log request.
    #[serde(default)]
    pub pwd_hash: Option<String>,
}

impl Default for SessionConfig {
    fn default() -> Self {
        Self {
            base_url: default_base_url(),
            cookie: None,
            pwd_hash: None,
        }
    }
}

impl SessionConfig {
    /// Override session settings with environment variables when set.
    ///
    /// Keeps credentials out of the YAML file.
    pub fn apply_env_overrides(&mut self) {
        if let Ok(val) = std::env::var("RELAY_BASE_URL") {
            self.base_url = val;
        }
        if let Ok(val) = std::env::var("RELAY_SESSION_COOKIE") {
            self.cookie = Some(val);
        }
        if let Ok(val) = std::env::var("RELAY_PWD_HASH") {
            self.pwd_hash = Some(val);
        }
    }
}

/// Retry schedule for raid log downloads.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Deserialize)]
pub struct RetryConfig {
    /// Total attempts per fetch.
    #[serde(default = "default_num_tries")]
    pub num_tries: u32,

    /// Delay after the first failure, in milliseconds.
    #[serde(default = "default_initial_delay_ms")]
    pub initial_delay_ms: u64,

    /// Backoff multiplier.
    #[serde(default = "default_scale_factor")]
    pub scale_factor: u32,
}

impl Default for RetryConfig {
    fn default() -> Self {
        Self {
            num_tries: default_num_tries(),
            initial_delay_ms: default_initial_delay_ms(),
            scale_factor: default_scale_factor(),
        }
    }
}

impl From<RetryConfig> for RetryPolicy {
    fn from(config: RetryConfig) -> Self {
        Self::new(
            config.num_tries,
            Duration::from_millis(config.initial_delay_ms),
            config.scale_factor,
        )
    }
}

/// Settings of one dungeon manager.
#[derive(Debug, Clone, PartialEq, Deserialize)]
pub struct ManagerConfig {
    /// Comma-separated channel names the manager serves.
    pub channel: String,

    /// Polling period in seconds. Kept as raw YAML so a non-integer is
    /// reported as a configuration error rather than a parse failure.
    #[serde(default)]
    pub log_check_interval: Option<serde_yml::Value>,
}

impl ManagerConfig {
    /// A manager entry for `channel` with the default interval.
    pub fn new(channel: &str) -> Self {
        Self {
            channel: channel.to_owned(),
            log_check_interval: None,
        }
    }

    /// A manager entry for `channel` polling every `secs` seconds.
    pub fn with_interval(channel: &str, secs: u64) -> Self {
        Self {
            channel: channel.to_owned(),
            log_check_interval: Some(serde_yml::Value::Number(secs.into())),
        }
    }

    /// The individual channel names.
    pub fn channels(&self) -> impl Iterator<Item = &str> {
        self.channel
            .split(',')
            .map(str::trim)
            .filter(|name| !name.is_empty())
    }

    /// Whether the channel list includes `kind`'s channel.
    pub fn serves(&self, kind: DungeonKind) -> bool {
        self.channels().any(|name| name == kind.channel())
    }

    /// The dungeons this entry should run a manager for.
    ///
    /// # Errors
    ///
    /// Returns [`ConfigError::WrongChannel`] if the list names neither
    /// dungeon.
    pub fn dungeons(&self) -> Result<Vec<DungeonKind>, ConfigError> {
        let kinds: Vec<DungeonKind> = [DungeonKind::Hobopolis, DungeonKind::Dreadsylvania]
            .into_iter()
            .filter(|kind| self.serves(*kind))
            .collect();
        if kinds.is_empty() {
            return Err(ConfigError::WrongChannel {
                channel: self.channel.clone(),
                expected: format!(
                    "{} or {}",
                    DungeonKind::Hobopolis.channel(),
                    DungeonKind::Dreadsylvania.channel()
                ),
            });
        }
        Ok(kinds)
    }

    /// The polling period in seconds.
    ///
    /// Accepts an integer or a string holding one.
    ///
    /// # Errors
    ///
    /// Returns [`ConfigError::BadConfig`] for anything else.
    pub fn log_check_interval(&self) -> Result<u64, ConfigError> {
        let Some(value) = &self.log_check_interval else {
            return Ok(DEFAULT_LOG_CHECK_INTERVAL_SECS);
        };
        let parsed = match value {
            serde_yml::Value::Number(n) => n.as_u64(),
            serde_yml::Value::String(s) => s.trim().parse().ok(),
            _ => None,
        };
        parsed.ok_or_else(|| ConfigError::BadConfig {
            channel: self.channel.clone(),
            value: serde_yml::to_string(value)
                .map_or_else(|_| format!("{value:?}"), |s| s.trim().to_owned()),
        })
    }
}

fn default_base_url() -> String {
    "https://www.kingdomofloathing.com".to_owned()
}

fn default_database_folder() -> PathBuf {
    PathBuf::from("database/data")
}

fn default_state_dir() -> PathBuf {
    PathBuf::from("state")
}

const fn default_heartbeat_interval_ms() -> u64 {
    1_000
}

const fn default_bus_reply_timeout_ms() -> u64 {
    500
}

const fn default_num_tries() -> u32 {
    5
}

const fn default_initial_delay_ms() -> u64 {
    500
}

const fn default_scale_factor() -> u32 {
    2
}

fn default_managers() -> Vec<ManagerConfig> {
    vec![
        ManagerConfig::new(DungeonKind::Hobopolis.channel()),
        ManagerConfig::new(DungeonKind::Dreadsylvania.channel()),
    ]
}
