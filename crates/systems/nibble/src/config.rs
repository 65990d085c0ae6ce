//! Machine configuration.

use std::path::PathBuf;

use nibble_core::logging::{LogConfig, LogLevel};
use nibble_core::palette::PixelFormat;
use serde::{Deserialize, Serialize};
use thiserror::Error;

#[derive(Error, Debug)]
pub enum ConfigError {
    #[error("invalid config: {0}")]
    Parse(#[from] serde_json::Error),
    #[error("sample rate {0} out of range (8000..=192000)")]
    SampleRate(u32),
    #[error("cannot open log file {path}: {source}")]
    LogFile {
        path: PathBuf,
        source: std::io::Error,
    },
}

/// Host-chosen settings for a [`crate::Machine`].
#[derive(Debug, Clone, PartialEq, Eq, Serialize, Deserialize)]
#[serde(default)]
pub struct MachineConfig {
    /// Audio output rate in Hz.
    pub sample_rate: u32,
    /// Framebuffer pixel layout.
    pub pixel_format: PixelFormat,
    /// Global log level applied by [`MachineConfig::apply_logging`].
    pub log_level: LogLevel,
    /// File that log lines are appended to. Stderr when unset.
    pub log_file: Option<PathBuf>,
}

impl Default for MachineConfig {
    fn default() -> Self {
        Self {
            sample_rate: 44100,
            pixel_format: PixelFormat::Rgba8888,
            log_level: LogLevel::Off,
            log_file: None,
        }
    }
}

impl MachineConfig {
    /// Parse and validate a JSON config. Missing fields take their defaults.
    pub fn from_json(text: &str) -> Result<Self, ConfigError> {
        let config: MachineConfig = serde_json::from_str(text)?;
        config.validate()?;
        Ok(config)
    }

    pub fn validate(&self) -> Result<(), ConfigError> {
        if !(8000..=192_000).contains(&self.sample_rate) {
            return Err(ConfigError::SampleRate(self.sample_rate));
        }
        Ok(())
    }

    /// Set the global log level and route output to `log_file`, or back to
    /// stderr when it is unset.
    pub fn apply_logging(&self) -> Result<(), ConfigError> {
        let logger = LogConfig::global();
        match &self.log_file {
            Some(path) => logger
                .set_log_file(path)
                .map_err(|source| ConfigError::LogFile {
                    path: path.clone(),
                    source,
                })?,
            None => logger.clear_log_file(),
        }
        logger.set_global_level(self.log_level);
        Ok(())
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn test_defaults() {
        let config = MachineConfig::from_json("{}").unwrap();
        assert_eq!(config, MachineConfig::default());
        assert_eq!(config.sample_rate, 44100);
    }

    #[test]
    fn test_partial_config() {
        let config =
            MachineConfig::from_json(r#"{"sample_rate": 48000, "pixel_format": "bgra8888"}"#)
                .unwrap();
        assert_eq!(config.sample_rate, 48000);
        assert_eq!(config.pixel_format, PixelFormat::Bgra8888);
        assert_eq!(config.log_level, LogLevel::Off);
    }

    #[test]
    fn test_log_level_field() {
        let config = MachineConfig::from_json(r#"{"log_level": "debug"}"#).unwrap();
        assert_eq!(config.log_level, LogLevel::Debug);
    }

    #[test]
    fn test_log_file_field() {
        let config = MachineConfig::from_json(r#"{"log_file": "/tmp/nibble.log"}"#).unwrap();
        assert_eq!(config.log_file, Some(PathBuf::from("/tmp/nibble.log")));
        assert_eq!(MachineConfig::default().log_file, None);
    }

    #[test]
    fn test_invalid_sample_rate() {
        assert!(matches!(
            MachineConfig::from_json(r#"{"sample_rate": 10}"#),
            Err(ConfigError::SampleRate(10))
        ));
    }

    #[test]
    fn test_malformed_json() {
        assert!(matches!(
            MachineConfig::from_json("{"),
            Err(ConfigError::Parse(_))
        ));
    }
}
