//! Configuration System
//!
//! Handles loading configuration from files and environment variables.
//! Supports TOML config files and environment variable overrides.

use crate::migrate::extract::DEFAULT_SENTINEL_SPEAKER;
use crate::migrate::merge::DEFAULT_NOTIFICATION_LABEL;
use serde::{Deserialize, Serialize};
use std::path::{Path, PathBuf};

/// Main configuration structure
#[derive(Debug, Clone, Default, Deserialize, Serialize)]
pub struct Config {
    #[serde(default)]
    pub migrate: MigrateConfig,

    #[serde(default)]
    pub post_process: PostProcessConfig,

    #[serde(default)]
    pub logging: LoggingConfig,
}

/// Migration pipeline configuration
#[derive(Debug, Clone, Deserialize, Serialize)]
pub struct MigrateConfig {
    /// Placeholder speaker used by legacy dumps for platform notifications
    #[serde(default = "default_sentinel_speaker")]
    pub sentinel_speaker: String,

    /// Speaker written in place of the sentinel
    #[serde(default = "default_notification_label")]
    pub notification_label: String,

    #[serde(default = "default_bans_file")]
    pub bans_file: String,

    #[serde(default = "default_subs_file")]
    pub subs_file: String,

    #[serde(default = "default_ban_speaker")]
    pub ban_speaker: String,

    #[serde(default = "default_sub_speaker")]
    pub sub_speaker: String,

    /// Manifest file name under the destination root; empty disables it
    #[serde(default = "default_manifest_file")]
    pub manifest_file: String,
}

fn default_sentinel_speaker() -> String {
    DEFAULT_SENTINEL_SPEAKER.to_string()
}

fn default_notification_label() -> String {
    DEFAULT_NOTIFICATION_LABEL.to_string()
}

fn default_bans_file() -> String {
    "bans.txt".to_string()
}

fn default_subs_file() -> String {
    "subs.txt".to_string()
}

fn default_ban_speaker() -> String {
    "Ban".to_string()
}

fn default_sub_speaker() -> String {
    "Subscriber".to_string()
}

fn default_manifest_file() -> String {
    "migration-manifest.jsonl".to_string()
}

impl Default for MigrateConfig {
    fn default() -> Self {
        Self {
            sentinel_speaker: default_sentinel_speaker(),
            notification_label: default_notification_label(),
            bans_file: default_bans_file(),
            subs_file: default_subs_file(),
            ban_speaker: default_ban_speaker(),
            sub_speaker: default_sub_speaker(),
            manifest_file: default_manifest_file(),
        }
    }
}

/// How the speaker index is rebuilt for a finished file
#[derive(Debug, Clone, Copy, PartialEq, Eq, Deserialize, Serialize)]
#[serde(rename_all = "snake_case")]
pub enum IndexMode {
    /// Build the index inside the migrating process
    InProcess,
    /// Re-invoke this binary's hidden `nicks` subcommand
    Subprocess,
    /// Skip index rebuilds
    Disabled,
}

impl std::str::FromStr for IndexMode {
    type Err = ConfigError;

    fn from_str(s: &str) -> Result<Self, Self::Err> {
        match s.trim().to_lowercase().as_str() {
            "in_process" | "inprocess" => Ok(IndexMode::InProcess),
            "subprocess" => Ok(IndexMode::Subprocess),
            "disabled" | "off" | "none" => Ok(IndexMode::Disabled),
            other => Err(ConfigError::Invalid(format!("unknown index mode: {other}"))),
        }
    }
}

/// Post-processing (index rebuild + compression) configuration
#[derive(Debug, Clone, Deserialize, Serialize)]
pub struct PostProcessConfig {
    #[serde(default = "default_true")]
    pub enabled: bool,

    /// Settle time per step, counted from when a file is scheduled
    #[serde(default = "default_settle_delay")]
    pub settle_delay_ms: u64,

    #[serde(default = "default_index_mode")]
    pub index_mode: IndexMode,

    #[serde(default = "default_true")]
    pub compress: bool,

    /// Delete the canonical text file once its compressed copy exists
    #[serde(default)]
    pub remove_source: bool,
}

fn default_true() -> bool {
    true
}

fn default_settle_delay() -> u64 {
    1000
}

fn default_index_mode() -> IndexMode {
    IndexMode::InProcess
}

impl Default for PostProcessConfig {
    fn default() -> Self {
        Self {
            enabled: true,
            settle_delay_ms: default_settle_delay(),
            index_mode: default_index_mode(),
            compress: true,
            remove_source: false,
        }
    }
}

/// Logging configuration
#[derive(Debug, Clone, Deserialize, Serialize)]
pub struct LoggingConfig {
    #[serde(default = "default_log_level")]
    pub level: String,

    #[serde(default = "default_log_format")]
    pub format: String,
}

fn default_log_level() -> String {
    "info".to_string()
}

fn default_log_format() -> String {
    "pretty".to_string()
}

impl Default for LoggingConfig {
    fn default() -> Self {
        Self {
            level: default_log_level(),
            format: default_log_format(),
        }
    }
}

fn env_bool(var: &str) -> Option<bool> {
    let value = std::env::var(var).ok()?;
    match value.trim() {
        "1" | "true" | "TRUE" | "yes" | "on" => Some(true),
        "0" | "false" | "FALSE" | "no" | "off" => Some(false),
        _ => None,
    }
}

impl Config {
    /// Load configuration from a file
    pub fn load(path: &Path) -> Result<Self, ConfigError> {
        let content = std::fs::read_to_string(path).map_err(|e| ConfigError::Io {
            path: path.to_path_buf(),
            error: e.to_string(),
        })?;

        let config: Config = toml::from_str(&content).map_err(|e| ConfigError::Parse {
            path: path.to_path_buf(),
            error: e.to_string(),
        })?;

        config.validate()?;
        Ok(config)
    }

    /// Load configuration from environment variables only
    pub fn from_env() -> Self {
        let mut config = Config::default();
        config.apply_env_overrides();
        config
    }

    /// Load configuration with environment variable overrides
    pub fn load_with_env(path: &Path) -> Result<Self, ConfigError> {
        let mut config = Self::load(path)?;
        config.apply_env_overrides();
        Ok(config)
    }

    /// Load from default locations or environment
    pub fn load_default() -> Self {
        let config_paths = [
            dirs::config_dir().map(|p| p.join("chatvault").join("config.toml")),
            Some(PathBuf::from("/etc/chatvault/config.toml")),
            Some(PathBuf::from("./config.toml")),
        ];

        for path_opt in config_paths.iter().flatten() {
            if path_opt.exists() {
                match Self::load_with_env(path_opt) {
                    Ok(config) => {
                        tracing::info!("Loaded config from {:?}", path_opt);
                        return config;
                    }
                    Err(e) => {
                        tracing::warn!("Failed to load config from {:?}: {}", path_opt, e);
                    }
                }
            }
        }

        tracing::info!("Using default config with environment overrides");
        Self::from_env()
    }

    /// Reject settings the pipeline cannot run with
    pub fn validate(&self) -> Result<(), ConfigError> {
        if self.migrate.sentinel_speaker.is_empty() {
            return Err(ConfigError::Invalid(
                "migrate.sentinel_speaker cannot be empty".to_string(),
            ));
        }
        if self.migrate.notification_label.trim().is_empty() {
            return Err(ConfigError::Invalid(
                "migrate.notification_label cannot be empty".to_string(),
            ));
        }
        if !matches!(self.logging.format.as_str(), "pretty" | "json") {
            return Err(ConfigError::Invalid(format!(
                "logging.format must be `pretty` or `json`, got `{}`",
                self.logging.format
            )));
        }
        Ok(())
    }

    /// Apply environment variable overrides to an existing config
    fn apply_env_overrides(&mut self) {
        // Migration overrides
        if let Ok(label) = std::env::var("CHATVAULT_NOTIFICATION_LABEL") {
            self.migrate.notification_label = label;
        }
        if let Ok(manifest) = std::env::var("CHATVAULT_MANIFEST_FILE") {
            self.migrate.manifest_file = manifest;
        }

        // Post-processing overrides
        if let Some(enabled) = env_bool("CHATVAULT_POST_PROCESS") {
            self.post_process.enabled = enabled;
        }
        if let Ok(delay) = std::env::var("CHATVAULT_SETTLE_DELAY_MS") {
            if let Ok(ms) = delay.trim().parse() {
                self.post_process.settle_delay_ms = ms;
            }
        }
        if let Ok(mode) = std::env::var("CHATVAULT_INDEX_MODE") {
            match mode.parse() {
                Ok(mode) => self.post_process.index_mode = mode,
                Err(e) => tracing::warn!("Ignoring CHATVAULT_INDEX_MODE: {}", e),
            }
        }
        if let Some(compress) = env_bool("CHATVAULT_COMPRESS") {
            self.post_process.compress = compress;
        }

        // Logging overrides
        if let Ok(level) = std::env::var("CHATVAULT_LOG_LEVEL") {
            self.logging.level = level;
        }
        if let Ok(format) = std::env::var("CHATVAULT_LOG_FORMAT") {
            self.logging.format = format;
        }
    }
}

/// Configuration errors
#[derive(Debug, thiserror::Error)]
pub enum ConfigError {
    #[error("Failed to read config file {path:?}: {error}")]
    Io { path: PathBuf, error: String },

    #[error("Failed to parse config file {path:?}: {error}")]
    Parse { path: PathBuf, error: String },

    #[error("Invalid configuration: {0}")]
    Invalid(String),
}

/// Generate a default config file content
pub fn generate_default_config() -> String {
    format!(
        r#"# Chatvault Configuration
#
# Environment variables override these settings:
# - CHATVAULT_NOTIFICATION_LABEL
# - CHATVAULT_MANIFEST_FILE
# - CHATVAULT_POST_PROCESS
# - CHATVAULT_SETTLE_DELAY_MS
# - CHATVAULT_INDEX_MODE
# - CHATVAULT_COMPRESS
# - CHATVAULT_LOG_LEVEL
# - CHATVAULT_LOG_FORMAT

[migrate]
# Placeholder speaker legacy dumps use for platform notifications
sentinel_speaker = "{sentinel}"

# Speaker written in its place
notification_label = "twitchnotify"

# Sidecar event files looked up in every month directory
bans_file = "bans.txt"
subs_file = "subs.txt"

# Speakers used for injected sidecar events
ban_speaker = "Ban"
sub_speaker = "Subscriber"

# Manifest written under the destination root (empty disables it)
manifest_file = "migration-manifest.jsonl"

[post_process]
# Rebuild indexes and compress each finished file in the background
enabled = true

# Delay before each step (ms)
settle_delay_ms = 1000

# Index rebuild: in_process, subprocess or disabled
index_mode = "in_process"

# Write an LZ4 copy of each finished file
compress = true

# Delete the text file once compressed
remove_source = false

[logging]
# Log level: trace, debug, info, warn, error
level = "info"

# Log format: pretty (for development) or json (for production)
format = "pretty"
"#,
        sentinel = DEFAULT_SENTINEL_SPEAKER
    )
}
