//! Demo configuration
//!
//! The demo reads an optional TOML file. Every field has a default, so an
//! empty file, or no file at all, gives the stock behaviour:
//!
//! ```toml
//! refresh_interval_ms = 2000
//! fetch_delay_ms = 250
//! fetch_failure_rate = 0.3
//! guarded = true
//! render_interval_ms = 500
//! run_for_ms = 10000
//! ```

use crate::error::ConfigError;
use serde::Deserialize;
use std::path::{Path, PathBuf};
use std::time::Duration;
use tracing::warn;


/// Environment variable naming a config file when none is given explicitly
pub const CONFIG_ENV_VAR: &str = "DETACHED_DEMO_CONFIG";


/// Settings of the demo page and its collaborators
#[derive(Clone, Debug, Deserialize, PartialEq)]
#[serde(default, deny_unknown_fields)]
pub struct DemoConfig {
    /// Period of the refresh timer
    pub refresh_interval_ms: u64,

    /// Simulated latency of each fetch
    pub fetch_delay_ms: u64,

    /// Probability that a fetch fails, between 0 and 1
    pub fetch_failure_rate: f64,

    /// Whether refreshes are attached to a failure continuation. When false,
    /// the first failed refresh ends the session.
    pub guarded: bool,

    /// How often the console renders the page
    pub render_interval_ms: u64,

    /// How long the demo runs before disposing the page
    pub run_for_ms: u64,
}
//
impl Default for DemoConfig {
    fn default() -> Self {
        DemoConfig {
            refresh_interval_ms: 2000,
            fetch_delay_ms: 250,
            fetch_failure_rate: 0.3,
            guarded: true,
            render_interval_ms: 500,
            run_for_ms: 10_000,
        }
    }
}
//
impl DemoConfig {
    /// Load the config from a file, or the environment's file, or defaults
    pub fn load(path: Option<&Path>) -> Result<Self, ConfigError> {
        let path = match path {
            Some(path) => Some(path.to_path_buf()),
            None => std::env::var_os(CONFIG_ENV_VAR).map(PathBuf::from),
        };
        match path {
            Some(path) => Self::from_file(&path),
            None => Ok(Self::default()),
        }
    }

    /// Load and validate a config file
    pub fn from_file(path: &Path) -> Result<Self, ConfigError> {
        let content = std::fs::read_to_string(path).map_err(|source| {
            warn!("Failed to read config at {:?}: {}", path, source);
            ConfigError::Read { path: path.to_path_buf(), source }
        })?;
        let config: DemoConfig = toml::from_str(&content).map_err(|source| {
            warn!("Failed to parse config at {:?}: {}", path, source);
            ConfigError::Parse { path: path.to_path_buf(), source }
        })?;
        config.validate()?;
        Ok(config)
    }

    /// Reject settings the demo cannot run with
    pub fn validate(&self) -> Result<(), ConfigError> {
        if self.refresh_interval_ms == 0 {
            return Err(ConfigError::Invalid(
                "refresh_interval_ms must be positive".to_owned()
            ));
        }
        if self.render_interval_ms == 0 {
            return Err(ConfigError::Invalid(
                "render_interval_ms must be positive".to_owned()
            ));
        }
        if !(0.0..=1.0).contains(&self.fetch_failure_rate) {
            return Err(ConfigError::Invalid(format!(
                "fetch_failure_rate must be between 0 and 1, got {}",
                self.fetch_failure_rate
            )));
        }
        Ok(())
    }

    pub fn refresh_interval(&self) -> Duration {
        Duration::from_millis(self.refresh_interval_ms)
    }

    pub fn fetch_delay(&self) -> Duration {
        Duration::from_millis(self.fetch_delay_ms)
    }

    pub fn render_interval(&self) -> Duration {
        Duration::from_millis(self.render_interval_ms)
    }

    pub fn run_for(&self) -> Duration {
        Duration::from_millis(self.run_for_ms)
    }
}


/// Unit tests
#[cfg(test)]
mod tests {
    use super::*;
    use std::io::Write;

    fn write_config(content: &str) -> tempfile::NamedTempFile {
        let mut file = tempfile::NamedTempFile::new().unwrap();
        file.write_all(content.as_bytes()).unwrap();
        file
    }

    /// Check that an empty file gives the defaults
    #[test]
    fn empty_file_is_default() {
        let file = write_config("");
        assert_eq!(DemoConfig::from_file(file.path()).unwrap(),
                   DemoConfig::default());
        assert_eq!(DemoConfig::default().refresh_interval(),
                   Duration::from_millis(2000));
    }

    /// Check that fields override the defaults one by one
    #[test]
    fn partial_override() {
        let file = write_config("refresh_interval_ms = 100\nguarded = false\n");
        let config = DemoConfig::from_file(file.path()).unwrap();
        assert_eq!(config.refresh_interval(), Duration::from_millis(100));
        assert!(!config.guarded);
        assert_eq!(config.fetch_delay_ms, DemoConfig::default().fetch_delay_ms);
    }

    /// Check that out-of-range values are rejected
    #[test]
    fn invalid_values() {
        let file = write_config("fetch_failure_rate = 1.5\n");
        assert!(matches!(DemoConfig::from_file(file.path()),
                         Err(ConfigError::Invalid(_))));

        let file = write_config("refresh_interval_ms = 0\n");
        assert!(matches!(DemoConfig::from_file(file.path()),
                         Err(ConfigError::Invalid(_))));
    }

    /// Check that unknown keys and bad syntax are parse errors
    #[test]
    fn parse_errors() {
        let file = write_config("refresh_interval = 100\n");
        let err = DemoConfig::from_file(file.path()).unwrap_err();
        assert!(matches!(err, ConfigError::Parse { .. }));
        assert_eq!(err.path().map(PathBuf::as_path), Some(file.path()));
    }

    /// Check that a missing file is a read error
    #[test]
    fn missing_file() {
        let dir = tempfile::tempdir().unwrap();
        let path = dir.path().join("absent.toml");
        assert!(matches!(DemoConfig::from_file(&path),
                         Err(ConfigError::Read { .. })));
    }
}
