use serde::{Deserialize, Serialize};
use std::path::Path;
use std::time::Duration;
use thiserror::Error;
use tracing::{debug, info};

/// Default location of the configuration file.
pub const CONFIG_PATH: &str = "/etc/cake_stats.conf";

/// A ring buffer shorter than two samples can't show a trend.
pub const MIN_HISTORY_CAPACITY: usize = 2;

/// Top-level configuration for cake-stats.
#[derive(Clone, Debug, Serialize, Deserialize, PartialEq)]
#[serde(default)]
pub struct Config {
    /// How often `tc` is polled, in milliseconds.
    pub poll_interval_ms: u64,

    /// Samples retained per interface.
    pub history_capacity: usize,

    /// Address the web service binds to, e.g. `0.0.0.0:11112`.
    pub listen_address: String,

    /// The `tc` binary to run. A bare name is looked up on `PATH`.
    pub tc_binary: String,

    /// Upper bound on one `tc` invocation, in milliseconds. A poll that
    /// takes longer is abandoned and the cycle skipped.
    pub collect_timeout_ms: u64,

    /// Use `tc -j` when the binary supports it. The text report carries
    /// more per-tier detail, so this is off by default.
    pub prefer_json: bool,
}

impl Default for Config {
    fn default() -> Self {
        Self {
            poll_interval_ms: 100,
            history_capacity: 300,
            listen_address: "0.0.0.0:11112".to_string(),
            tc_binary: "tc".to_string(),
            collect_timeout_ms: 2_000,
            prefer_json: false,
        }
    }
}

impl Config {
    /// Load from the default path.
    pub fn load() -> Result<Self, ConfigError> {
        Self::load_from(CONFIG_PATH)
    }

    /// Load from `path`. A missing file gives the defaults; a file that
    /// exists but doesn't parse is an error.
    pub fn load_from<P: AsRef<Path>>(path: P) -> Result<Self, ConfigError> {
        let path = path.as_ref();
        if !path.exists() {
            info!("No config file at {}, using defaults", path.display());
            return Ok(Self::default());
        }
        let raw = std::fs::read_to_string(path)
            .map_err(|e| ConfigError::CannotRead(path.display().to_string(), e))?;
        let config = Self::from_toml(&raw)?;
        debug!("Loaded configuration from {}: {:?}", path.display(), config);
        Ok(config)
    }

    /// Parse and validate a TOML document.
    pub fn from_toml(raw: &str) -> Result<Self, ConfigError> {
        let config: Self = toml::from_str(raw).map_err(|e| ConfigError::Toml(e.to_string()))?;
        config.validated()
    }

    /// Clamp and check values. Called on every load, and by the daemon
    /// again after command-line overrides are applied.
    pub fn validated(mut self) -> Result<Self, ConfigError> {
        if self.poll_interval_ms == 0 {
            return Err(ConfigError::Invalid("poll_interval_ms must be greater than zero".into()));
        }
        if self.collect_timeout_ms == 0 {
            return Err(ConfigError::Invalid("collect_timeout_ms must be greater than zero".into()));
        }
        if self.listen_address.trim().is_empty() {
            return Err(ConfigError::Invalid("listen_address must not be empty".into()));
        }
        if self.tc_binary.trim().is_empty() {
            return Err(ConfigError::Invalid("tc_binary must not be empty".into()));
        }
        self.history_capacity = self.history_capacity.max(MIN_HISTORY_CAPACITY);
        Ok(self)
    }

    /// The poll interval as a `Duration`.
    pub fn poll_interval(&self) -> Duration {
        Duration::from_millis(self.poll_interval_ms)
    }

    /// The collection timeout as a `Duration`.
    pub fn collect_timeout(&self) -> Duration {
        Duration::from_millis(self.collect_timeout_ms)
    }
}

/// Errors from loading the configuration.
#[derive(Debug, Error)]
pub enum ConfigError {
    /// The file exists but can't be read.
    #[error("Unable to read {0}")]
    CannotRead(String, #[source] std::io::Error),
    /// The file isn't valid TOML, or a field has the wrong type.
    #[error("Unable to parse configuration: {0}")]
    Toml(String),
    /// A value is out of range.
    #[error("Invalid configuration: {0}")]
    Invalid(String),
}

#[cfg(test)]
mod test {
    use super::*;
    use std::io::Write;

    #[test]
    fn missing_file_gives_defaults() {
        let config = Config::load_from("/this/path/does/not/exist.conf").unwrap();
        assert_eq!(config, Config::default());
        assert_eq!(config.poll_interval(), Duration::from_millis(100));
    }

    #[test]
    fn partial_file_fills_defaults() {
        let config = Config::from_toml("poll_interval_ms = 500\nprefer_json = true\n").unwrap();
        assert_eq!(config.poll_interval_ms, 500);
        assert!(config.prefer_json);
        assert_eq!(config.history_capacity, 300);
        assert_eq!(config.tc_binary, "tc");
    }

    #[test]
    fn tiny_history_is_clamped() {
        let config = Config::from_toml("history_capacity = 1").unwrap();
        assert_eq!(config.history_capacity, MIN_HISTORY_CAPACITY);
    }

    #[test]
    fn zero_interval_is_rejected() {
        let result = Config::from_toml("poll_interval_ms = 0");
        assert!(matches!(result, Err(ConfigError::Invalid(_))));
    }

    #[test]
    fn wrong_type_is_rejected() {
        let result = Config::from_toml("poll_interval_ms = \"fast\"");
        assert!(matches!(result, Err(ConfigError::Toml(_))));
    }

    #[test]
    fn loads_from_disk() {
        let mut file = tempfile::NamedTempFile::new().unwrap();
        writeln!(file, "listen_address = \"127.0.0.1:9000\"").unwrap();
        writeln!(file, "history_capacity = 60").unwrap();
        let config = Config::load_from(file.path()).unwrap();
        assert_eq!(config.listen_address, "127.0.0.1:9000");
        assert_eq!(config.history_capacity, 60);
    }
}
