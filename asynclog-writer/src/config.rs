//! Writer configuration.
//!
//! Configuration is loaded in the following order (later overrides earlier):
//! 1. Default values
//! 2. YAML config file (if specified via ASYNCLOG_CONFIG or --config)
//! 3. Environment variables
//!
//! Once a writer is built from a `Config`, the config is not consulted again.

use asynclog_format::{EncoderConfig, Level};
use asynclog_rotate::{RotateConfig, MEGABYTE};
use serde::{Deserialize, Serialize};
use std::path::{Path, PathBuf};
use std::time::Duration;

/// Writer configuration.
#[derive(Debug, Clone, Default, Serialize, Deserialize)]
#[serde(default)]
pub struct Config {
    /// Output file and rotation.
    pub file: FileConfig,
    /// Queueing and batching.
    pub writer: WriterConfig,
    /// Minimum level for `log` calls.
    pub level: Level,
    /// Record encoding.
    pub encoder: EncoderConfig,
}

impl Config {
    /// Loads configuration from file, then applies environment variable overrides.
    pub fn load() -> Result<Self, ConfigError> {
        let path = std::env::var_os("ASYNCLOG_CONFIG").map(PathBuf::from);
        Self::load_from(path.as_deref())
    }

    /// Like `load`, with the config file given explicitly.
    pub fn load_from(path: Option<&Path>) -> Result<Self, ConfigError> {
        let mut config = match path {
            Some(path) => Self::from_file(path)?,
            None => Self::default(),
        };

        config.apply_env_overrides()?;

        Ok(config)
    }

    /// Loads configuration from a YAML file.
    pub fn from_file(path: impl AsRef<Path>) -> Result<Self, ConfigError> {
        let path = path.as_ref();
        let content = std::fs::read_to_string(path)
            .map_err(|e| ConfigError::IoError(path.to_path_buf(), e))?;
        let config: Config = serde_yaml::from_str(&content)
            .map_err(|e| ConfigError::ParseError(path.to_path_buf(), e.to_string()))?;
        Ok(config)
    }

    /// Loads configuration from environment variables only.
    pub fn from_env() -> Result<Self, ConfigError> {
        let mut config = Self::default();
        config.apply_env_overrides()?;
        Ok(config)
    }

    /// Applies environment variable overrides to the configuration.
    ///
    /// An unknown `ASYNCLOG_LEVEL` is an error rather than a silent default.
    fn apply_env_overrides(&mut self) -> Result<(), ConfigError> {
        self.file.apply_env_overrides();
        self.writer.apply_env_overrides();

        if let Ok(level) = std::env::var("ASYNCLOG_LEVEL") {
            self.level = level
                .parse()
                .map_err(|e| ConfigError::ValidationError(format!("ASYNCLOG_LEVEL: {}", e)))?;
        }
        Ok(())
    }

    /// Checks the configuration for values the writer cannot run with.
    pub fn validate(&self) -> Result<(), ConfigError> {
        if self.file.path.as_os_str().is_empty() {
            return Err(ConfigError::ValidationError(
                "file.path must not be empty".to_string(),
            ));
        }
        if self.file.max_size_mb == 0 {
            return Err(ConfigError::ValidationError(
                "file.max_size_mb must be greater than zero".to_string(),
            ));
        }
        Ok(())
    }

    /// Saves configuration to a YAML file.
    pub fn save(&self, path: impl AsRef<Path>) -> Result<(), ConfigError> {
        let path = path.as_ref();
        let content = serde_yaml::to_string(self)
            .map_err(|e| ConfigError::ParseError(path.to_path_buf(), e.to_string()))?;
        std::fs::write(path, content).map_err(|e| ConfigError::IoError(path.to_path_buf(), e))?;
        Ok(())
    }
}

/// Output file configuration.
#[derive(Debug, Clone, Serialize, Deserialize)]
#[serde(default)]
pub struct FileConfig {
    /// Path of the active log file.
    pub path: PathBuf,
    /// Size in megabytes at which the file is rotated.
    pub max_size_mb: u64,
    /// Days to keep rotated backups (0 = forever).
    pub max_age_days: u32,
    /// Number of rotated backups to keep (0 = all).
    pub max_backups: usize,
    /// Gzip rotated backups.
    pub compress: bool,
    /// Use local time in backup names.
    pub local_time: bool,
}

impl Default for FileConfig {
    fn default() -> Self {
        Self {
            path: PathBuf::from("./logs/app.log"),
            max_size_mb: 100,
            max_age_days: 300,
            max_backups: 0,
            compress: true,
            local_time: true,
        }
    }
}

impl FileConfig {
    fn apply_env_overrides(&mut self) {
        if let Ok(path) = std::env::var("ASYNCLOG_PATH") {
            self.path = PathBuf::from(path);
        }

        if let Ok(size) = std::env::var("ASYNCLOG_MAX_SIZE_MB") {
            if let Ok(mb) = size.parse() {
                self.max_size_mb = mb;
            }
        }

        if let Ok(age) = std::env::var("ASYNCLOG_MAX_AGE_DAYS") {
            if let Ok(days) = age.parse() {
                self.max_age_days = days;
            }
        }

        if let Ok(backups) = std::env::var("ASYNCLOG_MAX_BACKUPS") {
            if let Ok(n) = backups.parse() {
                self.max_backups = n;
            }
        }

        if let Ok(compress) = std::env::var("ASYNCLOG_COMPRESS") {
            self.compress = compress == "1" || compress.to_lowercase() == "true";
        }
    }

    /// Returns the rotation size threshold in bytes.
    pub fn max_size(&self) -> u64 {
        self.max_size_mb.saturating_mul(MEGABYTE)
    }

    /// Builds the rotating file configuration.
    pub fn rotate_config(&self) -> RotateConfig {
        RotateConfig::new(&self.path)
            .with_max_size(self.max_size())
            .with_max_age_days(self.max_age_days)
            .with_max_backups(self.max_backups)
            .with_compress(self.compress)
            .with_local_time(self.local_time)
    }
}

/// Queueing and batching configuration.
#[derive(Debug, Clone, Serialize, Deserialize)]
#[serde(default)]
pub struct WriterConfig {
    /// A batch is written once it holds more than this many records.
    pub buf_limit: usize,
    /// Work queue capacity in records. Producers block when it is full.
    pub queue_size: usize,
    /// Write a partial batch once its oldest record is this old (0 = never).
    pub flush_interval_ms: u64,
    /// Give up on a full queue after this long (unset = block indefinitely).
    pub enqueue_timeout_ms: Option<u64>,
    /// Extra attempts for a failed batch write before it is dropped.
    pub write_retries: u32,
    /// Pause between write attempts.
    pub retry_delay_ms: u64,
}

impl Default for WriterConfig {
    fn default() -> Self {
        Self {
            buf_limit: 64,
            queue_size: 1024,
            flush_interval_ms: 0,
            enqueue_timeout_ms: None,
            write_retries: 0,
            retry_delay_ms: 10,
        }
    }
}

impl WriterConfig {
    fn apply_env_overrides(&mut self) {
        if let Ok(limit) = std::env::var("ASYNCLOG_BUF_LIMIT") {
            if let Ok(n) = limit.parse() {
                self.buf_limit = n;
            }
        }

        if let Ok(size) = std::env::var("ASYNCLOG_QUEUE_SIZE") {
            if let Ok(n) = size.parse() {
                self.queue_size = n;
            }
        }

        if let Ok(interval) = std::env::var("ASYNCLOG_FLUSH_INTERVAL_MS") {
            if let Ok(ms) = interval.parse() {
                self.flush_interval_ms = ms;
            }
        }
    }

    /// Returns the flush interval, if enabled.
    pub fn flush_interval(&self) -> Option<Duration> {
        match self.flush_interval_ms {
            0 => None,
            ms => Some(Duration::from_millis(ms)),
        }
    }

    /// Returns the enqueue timeout, if set.
    pub fn enqueue_timeout(&self) -> Option<Duration> {
        self.enqueue_timeout_ms.map(Duration::from_millis)
    }

    /// Returns the delay between write attempts.
    pub fn retry_delay(&self) -> Duration {
        Duration::from_millis(self.retry_delay_ms)
    }
}

/// Configuration error.
#[derive(Debug)]
pub enum ConfigError {
    IoError(PathBuf, std::io::Error),
    ParseError(PathBuf, String),
    ValidationError(String),
}

impl std::fmt::Display for ConfigError {
    fn fmt(&self, f: &mut std::fmt::Formatter<'_>) -> std::fmt::Result {
        match self {
            ConfigError::IoError(path, e) => {
                write!(f, "failed to read config file '{}': {}", path.display(), e)
            }
            ConfigError::ParseError(path, e) => {
                write!(f, "failed to parse config file '{}': {}", path.display(), e)
            }
            ConfigError::ValidationError(msg) => {
                write!(f, "configuration validation failed: {}", msg)
            }
        }
    }
}

impl std::error::Error for ConfigError {}
