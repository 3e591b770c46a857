//! Configuration module
//!
//! Handles loading and saving the link configuration. Durations are
//! stored as milliseconds in the file and converted to the runtime
//! structs the engine, sequencer and negotiator take.

use serde::{Deserialize, Serialize};
use std::path::{Path, PathBuf};
use std::time::Duration;
use thiserror::Error;

use crate::bulk::BulkConfig;
use crate::session::SessionConfig;
use crate::turbo::{TurboConfig, MAX_SPEED_INDEX};

/// Configuration errors
#[derive(Error, Debug)]
pub enum ConfigError {
    #[error("IO error: {0}")]
    Io(#[from] std::io::Error),

    #[error("Parse error: {0}")]
    Parse(#[from] toml::de::Error),

    #[error("Serialize error: {0}")]
    Serialize(#[from] toml::ser::Error),

    #[error("Config file not found: {0}")]
    NotFound(PathBuf),
}

pub type ConfigResult<T> = Result<T, ConfigError>;

/// Main configuration
#[derive(Debug, Clone, Default, Serialize, Deserialize)]
pub struct Config {
    /// Request/reply session settings
    #[serde(default)]
    pub session: SessionSection,

    /// Bulk transfer settings
    #[serde(default)]
    pub bulk: BulkSection,

    /// Speed negotiation settings
    #[serde(default)]
    pub turbo: TurboSection,

    /// Codec settings
    #[serde(default)]
    pub codec: CodecSection,
}

/// Session settings
#[derive(Debug, Clone, Serialize, Deserialize)]
pub struct SessionSection {
    /// Idle watchdog timeout in ms
    #[serde(default = "default_idle_timeout")]
    pub idle_timeout_ms: u64,
    /// Delay before a resend in ms
    #[serde(default = "default_resend_delay")]
    pub resend_delay_ms: u64,
    /// Attempt budget for interactive requests (unset = unbounded)
    #[serde(default = "default_attempts")]
    pub attempts: Option<u32>,
}

fn default_idle_timeout() -> u64 {
    5000
}

fn default_resend_delay() -> u64 {
    150
}

fn default_attempts() -> Option<u32> {
    Some(3)
}

impl Default for SessionSection {
    fn default() -> Self {
        Self {
            idle_timeout_ms: default_idle_timeout(),
            resend_delay_ms: default_resend_delay(),
            attempts: default_attempts(),
        }
    }
}

impl SessionSection {
    pub fn to_session_config(&self) -> SessionConfig {
        SessionConfig {
            idle_timeout: Duration::from_millis(self.idle_timeout_ms),
            resend_delay: Duration::from_millis(self.resend_delay_ms),
            attempts: self.attempts,
        }
    }
}

/// Bulk transfer settings
#[derive(Debug, Clone, Serialize, Deserialize)]
pub struct BulkSection {
    /// Pause between outgoing dumps in ms
    #[serde(default = "default_send_pacing")]
    pub send_pacing_ms: u64,
}

fn default_send_pacing() -> u64 {
    20
}

impl Default for BulkSection {
    fn default() -> Self {
        Self {
            send_pacing_ms: default_send_pacing(),
        }
    }
}

/// Speed negotiation settings
#[derive(Debug, Clone, Serialize, Deserialize)]
pub struct TurboSection {
    /// Per-exchange negotiation timeout in ms
    #[serde(default = "default_negotiation_timeout")]
    pub negotiation_timeout_ms: u64,
    /// Heartbeat period while elevated, in ms
    #[serde(default = "default_keepalive_interval")]
    pub keepalive_interval_ms: u64,
    /// Highest speed index to negotiate
    #[serde(default = "default_max_speed_index")]
    pub max_speed_index: u8,
}

fn default_negotiation_timeout() -> u64 {
    1000
}

fn default_keepalive_interval() -> u64 {
    300
}

fn default_max_speed_index() -> u8 {
    MAX_SPEED_INDEX
}

impl Default for TurboSection {
    fn default() -> Self {
        Self {
            negotiation_timeout_ms: default_negotiation_timeout(),
            keepalive_interval_ms: default_keepalive_interval(),
            max_speed_index: default_max_speed_index(),
        }
    }
}

impl TurboSection {
    pub fn to_turbo_config(&self) -> TurboConfig {
        TurboConfig {
            negotiation_timeout: Duration::from_millis(self.negotiation_timeout_ms),
            keepalive_interval: Duration::from_millis(self.keepalive_interval_ms),
            max_speed_index: self.max_speed_index.clamp(1, MAX_SPEED_INDEX),
        }
    }
}

/// Codec settings
#[derive(Debug, Clone, Serialize, Deserialize)]
pub struct CodecSection {
    /// Verify dump checksums on decode
    #[serde(default)]
    pub verify_checksums: bool,
}

impl Default for CodecSection {
    fn default() -> Self {
        Self {
            verify_checksums: false,
        }
    }
}

impl Config {
    /// Load configuration from a file
    pub fn load(path: &Path) -> ConfigResult<Self> {
        if !path.exists() {
            return Err(ConfigError::NotFound(path.to_path_buf()));
        }

        let contents = std::fs::read_to_string(path)?;
        let config: Config = toml::from_str(&contents)?;
        Ok(config)
    }

    /// Load configuration from the default locations, falling back to
    /// defaults when no file is present
    pub fn load_default() -> ConfigResult<Self> {
        let config_paths = [
            PathBuf::from("./mdlink.toml"),
            PathBuf::from("./config.toml"),
        ];

        for path in &config_paths {
            if path.exists() {
                return Self::load(path);
            }
        }

        Ok(Self::default())
    }

    /// Save configuration to a file
    pub fn save(&self, path: &Path) -> ConfigResult<()> {
        let contents = toml::to_string_pretty(self)?;

        if let Some(parent) = path.parent() {
            std::fs::create_dir_all(parent)?;
        }

        std::fs::write(path, contents)?;
        Ok(())
    }

    pub fn bulk_config(&self) -> BulkConfig {
        BulkConfig {
            send_pacing: Duration::from_millis(self.bulk.send_pacing_ms),
            verify_checksums: self.codec.verify_checksums,
        }
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use tempfile::NamedTempFile;

    #[test]
    fn test_default_config() {
        let config = Config::default();
        assert_eq!(config.session.idle_timeout_ms, 5000);
        assert_eq!(config.session.attempts, Some(3));
        assert_eq!(config.turbo.max_speed_index, MAX_SPEED_INDEX);
        assert!(!config.codec.verify_checksums);
    }

    #[test]
    fn test_save_and_load() {
        let mut config = Config::default();
        config.turbo.max_speed_index = 7;
        config.codec.verify_checksums = true;
        let file = NamedTempFile::new().unwrap();

        config.save(file.path()).unwrap();

        let loaded = Config::load(file.path()).unwrap();
        assert_eq!(loaded.turbo.max_speed_index, 7);
        assert!(loaded.codec.verify_checksums);
        assert_eq!(loaded.session.resend_delay_ms, config.session.resend_delay_ms);
    }

    #[test]
    fn test_missing_file_is_an_error() {
        let err = Config::load(Path::new("/nonexistent/mdlink.toml")).unwrap_err();
        assert!(matches!(err, ConfigError::NotFound(_)));
    }

    #[test]
    fn test_partial_file_fills_defaults() {
        let partial = "[session]\nidle_timeout_ms = 2000\n";
        let config: Config = toml::from_str(partial).unwrap();
        assert_eq!(config.session.idle_timeout_ms, 2000);
        assert_eq!(config.session.resend_delay_ms, 150);
        assert_eq!(config.bulk.send_pacing_ms, 20);
    }

    #[test]
    fn test_runtime_conversion() {
        let config = Config::default();
        let session = config.session.to_session_config();
        assert_eq!(session.idle_timeout, Duration::from_millis(5000));
        let turbo = config.turbo.to_turbo_config();
        assert_eq!(turbo.keepalive_interval, Duration::from_millis(300));
        assert_eq!(config.bulk_config().send_pacing, Duration::from_millis(20));
    }

    #[test]
    fn test_max_speed_index_clamped_on_conversion() {
        let mut config = Config::default();
        config.turbo.max_speed_index = 99;
        assert_eq!(config.turbo.to_turbo_config().max_speed_index, MAX_SPEED_INDEX);
    }
}
