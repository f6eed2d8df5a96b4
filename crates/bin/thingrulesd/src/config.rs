//! Configuration loading: TOML file with environment variable overrides.
//!
//! Looks for `thingrules.toml` in the working directory. Every field has a
//! default so the file is optional. Environment variables take precedence
//! over file values.

use std::time::Duration;

use serde::Deserialize;

/// Top-level configuration.
#[derive(Debug, Default, Deserialize)]
#[serde(default)]
pub struct Config {
    /// Database settings.
    pub database: DatabaseConfig,
    /// Logging settings.
    pub logging: LoggingConfig,
    /// Rule engine settings.
    pub engine: EngineConfig,
    /// Outbound IFTTT webhook settings.
    pub ifttt: IftttConfig,
    /// Virtual device layer settings.
    pub devices: DevicesConfig,
}

/// `SQLite` database configuration.
#[derive(Debug, Deserialize)]
#[serde(default)]
pub struct DatabaseConfig {
    /// `SQLite` connection URL or file path.
    pub url: String,
}

/// Logging configuration.
#[derive(Debug, Deserialize)]
#[serde(default)]
pub struct LoggingConfig {
    /// Filter directive (`RUST_LOG` syntax).
    pub filter: String,
}

#[derive(Debug, Deserialize)]
#[serde(default)]
pub struct EngineConfig {
    /// Seconds between clock ticks that drive time triggers.
    pub tick_interval_secs: u64,
    /// Capacity of the device event channel.
    pub event_capacity: usize,
    /// Milliseconds a trigger waits for one device read.
    pub read_timeout_ms: u64,
}

#[derive(Debug, Deserialize)]
#[serde(default)]
pub struct IftttConfig {
    /// Maker key; the notifier is disabled without one.
    pub key: Option<String>,
    pub base_url: String,
}

#[derive(Debug, Deserialize)]
#[serde(default)]
pub struct DevicesConfig {
    /// Seed the demo virtual things and the `log` notifier.
    pub demo: bool,
}

impl Config {
    /// Load configuration from `thingrules.toml` (if present) then apply
    /// environment-variable overrides.
    ///
    /// # Errors
    ///
    /// Returns an error if the TOML file exists but is malformed, or if the
    /// resulting configuration is invalid.
    pub fn load() -> Result<Self, ConfigError> {
        let mut config = Self::from_file("thingrules.toml")?;
        config.apply_env_overrides();
        config.validate()?;
        Ok(config)
    }

    fn from_file(path: &str) -> Result<Self, ConfigError> {
        match std::fs::read_to_string(path) {
            Ok(content) => toml::from_str(&content).map_err(ConfigError::Parse),
            Err(err) if err.kind() == std::io::ErrorKind::NotFound => Ok(Self::default()),
            Err(err) => Err(ConfigError::Io(err)),
        }
    }

    fn apply_env_overrides(&mut self) {
        if let Ok(val) = std::env::var("THINGRULES_DATABASE_URL") {
            self.database.url = val;
        }
        if let Ok(val) = std::env::var("THINGRULES_LOG") {
            self.logging.filter = val;
        }
        if let Ok(val) = std::env::var("RUST_LOG") {
            self.logging.filter = val;
        }
        if let Ok(val) = std::env::var("THINGRULES_TICK_SECS") {
            if let Ok(secs) = val.parse() {
                self.engine.tick_interval_secs = secs;
            }
        }
        if let Ok(val) = std::env::var("THINGRULES_IFTTT_KEY") {
            self.ifttt.key = Some(val);
        }
    }

    fn validate(&self) -> Result<(), ConfigError> {
        if !(1..=60).contains(&self.engine.tick_interval_secs) {
            return Err(ConfigError::Validation(format!(
                "engine.tick_interval_secs must be between 1 and 60, got {}",
                self.engine.tick_interval_secs
            )));
        }
        if self.engine.event_capacity == 0 {
            return Err(ConfigError::Validation(
                "engine.event_capacity must be non-zero".to_string(),
            ));
        }
        if self.engine.read_timeout_ms == 0 {
            return Err(ConfigError::Validation(
                "engine.read_timeout_ms must be non-zero".to_string(),
            ));
        }
        Ok(())
    }

    /// Return the database URL in `sqlx`-compatible format.
    #[must_use]
    pub fn database_url(&self) -> &str {
        &self.database.url
    }

    #[must_use]
    pub fn tick_interval(&self) -> Duration {
        Duration::from_secs(self.engine.tick_interval_secs)
    }

    #[must_use]
    pub fn read_timeout(&self) -> Duration {
        Duration::from_millis(self.engine.read_timeout_ms)
    }

    /// The IFTTT key, if one is set and non-empty.
    #[must_use]
    pub fn ifttt_key(&self) -> Option<&str> {
        self.ifttt.key.as_deref().filter(|key| !key.is_empty())
    }
}

impl Default for DatabaseConfig {
    fn default() -> Self {
        Self {
            url: "sqlite:thingrules.db?mode=rwc".to_string(),
        }
    }
}

impl Default for LoggingConfig {
    fn default() -> Self {
        Self {
            filter: "thingrulesd=info,thingrules=info".to_string(),
        }
    }
}

impl Default for EngineConfig {
    fn default() -> Self {
        Self {
            tick_interval_secs: 15,
            event_capacity: 256,
            read_timeout_ms: 2000,
        }
    }
}

impl Default for IftttConfig {
    fn default() -> Self {
        Self {
            key: None,
            base_url: thingrules_adapter_ifttt_reqwest::DEFAULT_BASE_URL.to_string(),
        }
    }
}

impl Default for DevicesConfig {
    fn default() -> Self {
        Self { demo: true }
    }
}

/// Configuration errors.
#[derive(Debug, thiserror::Error)]
pub enum ConfigError {
    /// TOML parse failure.
    #[error("failed to parse config file")]
    Parse(#[from] toml::de::Error),
    /// File I/O failure.
    #[error("failed to read config file")]
    Io(#[from] std::io::Error),
    /// Semantic validation failure.
    #[error("invalid configuration: {0}")]
    Validation(String),
}
