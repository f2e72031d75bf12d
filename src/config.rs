//! Optional TOML configuration file.
//!
//! Every key is optional; a missing or empty file yields `Config::default()`.
//! Command-line flags are layered on top in `main`. Out-of-range values are
//! clamped rather than rejected, see [`Config::clamped`].
use serde::Deserialize;
use std::path::{Path, PathBuf};
use std::time::Duration;
use thiserror::Error;

#[derive(Debug, Error)]
pub enum ConfigError {
    #[error("Failed to read config file: {0}")]
    Io(#[from] std::io::Error),

    #[error("Invalid TOML in config file: {0}")]
    Parse(#[from] toml::de::Error),

    #[error("Config file too large: {0}")]
    TooLarge(String),
}

pub const ITEMS_PER_PAGE_RANGE: (usize, usize) = (2, 500);
pub const INTERVAL_MINUTES_RANGE: (u64, u64) = (1, 1440);
pub const TIMEOUT_SECONDS_RANGE: (u64, u64) = (1, 60);

/// Runtime configuration.
#[derive(Debug, Clone, PartialEq, Eq, Deserialize)]
#[serde(default)]
pub struct Config {
    /// Directory holding the pages.
    pub directory: PathBuf,

    /// Primary page size. Rollover happens at twice this.
    pub items_per_page: usize,

    /// Pause between update cycles, in minutes.
    pub update_interval_minutes: u64,

    /// Total time allowed per fetch, in seconds.
    pub timeout_seconds: u64,

    /// Minimum spacing between two requests to one host, in seconds.
    pub min_request_interval_seconds: u64,

    /// Custom page template.
    pub template: Option<PathBuf>,

    /// Development fetch cache directory.
    pub cache_dir: Option<PathBuf>,

    pub verbose: bool,
}

impl Default for Config {
    fn default() -> Self {
        Self {
            directory: PathBuf::from("news"),
            items_per_page: crate::aggregator::DEFAULT_ITEMS_PER_PAGE,
            update_interval_minutes: 10,
            timeout_seconds: crate::feed::DEFAULT_TIMEOUT.as_secs(),
            min_request_interval_seconds: crate::feed::DEFAULT_MIN_INTERVAL.as_secs(),
            template: None,
            cache_dir: None,
            verbose: false,
        }
    }
}

impl Config {
    /// Maximum config file size (1 MB).
    const MAX_FILE_SIZE: u64 = 1_048_576;

    const KNOWN_KEYS: [&'static str; 8] = [
        "directory",
        "items_per_page",
        "update_interval_minutes",
        "timeout_seconds",
        "min_request_interval_seconds",
        "template",
        "cache_dir",
        "verbose",
    ];

    /// Load configuration from a TOML file.
    ///
    /// - Missing file → `Ok(Config::default())`
    /// - Empty file → `Ok(Config::default())`
    /// - Invalid TOML → `Err(ConfigError::Parse)` with line number info
    /// - Unknown keys → accepted, logged as warning
    pub fn load(path: &Path) -> Result<Self, ConfigError> {
        match std::fs::metadata(path) {
            Ok(meta) if meta.len() > Self::MAX_FILE_SIZE => {
                return Err(ConfigError::TooLarge(format!(
                    "Config file is {} bytes (max {} bytes)",
                    meta.len(),
                    Self::MAX_FILE_SIZE
                )));
            }
            Err(e) if e.kind() == std::io::ErrorKind::NotFound => {
                tracing::debug!(path = %path.display(), "No config file found, using defaults");
                return Ok(Self::default());
            }
            Err(e) => return Err(ConfigError::Io(e)),
            Ok(_) => {}
        }

        let content = match std::fs::read_to_string(path) {
            Ok(c) => c,
            Err(e) if e.kind() == std::io::ErrorKind::NotFound => {
                // Deleted between metadata and read
                tracing::debug!(path = %path.display(), "Config file disappeared, using defaults");
                return Ok(Self::default());
            }
            Err(e) => return Err(ConfigError::Io(e)),
        };

        if content.trim().is_empty() {
            tracing::debug!(path = %path.display(), "Config file is empty, using defaults");
            return Ok(Self::default());
        }

        if let Ok(raw) = content.parse::<toml::Table>() {
            for key in raw.keys() {
                if !Self::KNOWN_KEYS.contains(&key.as_str()) {
                    tracing::warn!(key = %key, "Unknown key in config file, ignoring");
                }
            }
        }

        let config: Config = toml::from_str(&content)?;
        tracing::info!(
            path = %path.display(),
            directory = %config.directory.display(),
            "Loaded configuration"
        );
        Ok(config)
    }

    /// Copy with every numeric setting pulled into its allowed range.
    pub fn clamped(mut self) -> Self {
        self.items_per_page = self
            .items_per_page
            .clamp(ITEMS_PER_PAGE_RANGE.0, ITEMS_PER_PAGE_RANGE.1);
        self.update_interval_minutes = self
            .update_interval_minutes
            .clamp(INTERVAL_MINUTES_RANGE.0, INTERVAL_MINUTES_RANGE.1);
        self.timeout_seconds = self
            .timeout_seconds
            .clamp(TIMEOUT_SECONDS_RANGE.0, TIMEOUT_SECONDS_RANGE.1);
        self
    }

    pub fn update_interval(&self) -> Duration {
        Duration::from_secs(self.update_interval_minutes * 60)
    }

    pub fn timeout(&self) -> Duration {
        Duration::from_secs(self.timeout_seconds)
    }

    pub fn min_request_interval(&self) -> Duration {
        Duration::from_secs(self.min_request_interval_seconds)
    }
}
