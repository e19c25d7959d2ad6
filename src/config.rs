//! Configuration management for the control channel
//!
//! Settings come from an optional `config.toml` with environment overrides
//! (`FTP_CHANNEL_*`). Every field has a default, so a missing file is fine.

use config::{Config, Environment, File};
use serde::Deserialize;
use std::time::Duration;

use crate::protocol::TextEncoding;

/// Complete channel configuration
#[derive(Debug, Deserialize, Clone)]
#[serde(default)]
pub struct ChannelConfig {
    /// Charset for reply lines and command text
    /// Environment: FTP_CHANNEL_ENCODING
    pub encoding: TextEncoding,

    /// Longest reply line accepted before the connection is failed
    pub max_line_length: usize,

    /// Timeout for establishing the TCP connection
    pub connect_timeout_secs: u64,

    /// Mechanism named in the AUTH command
    pub auth_mechanism: String,

    /// Credentials used by `authorize_anonymous`
    pub default_user: String,
    pub default_password: String,
}

impl Default for ChannelConfig {
    fn default() -> Self {
        Self {
            encoding: TextEncoding::Utf8,
            max_line_length: 20480,
            connect_timeout_secs: 30,
            auth_mechanism: "GSSAPI".to_string(),
            default_user: "anonymous".to_string(),
            default_password: String::new(),
        }
    }
}

impl ChannelConfig {
    /// Load configuration from `config.toml` (if present) with environment
    /// overrides.
    pub fn load() -> Result<Self, config::ConfigError> {
        Self::load_from("config")
    }

    /// Load configuration from the given file stem (extension optional).
    pub fn load_from(path: &str) -> Result<Self, config::ConfigError> {
        let settings = Config::builder()
            .add_source(File::with_name(path).required(false))
            .add_source(Environment::with_prefix("FTP_CHANNEL").try_parsing(true))
            .build()?;
        let config: ChannelConfig = settings.try_deserialize()?;
        config.validate()?;
        Ok(config)
    }

    /// Validation for all configuration values
    pub fn validate(&self) -> Result<(), config::ConfigError> {
        if self.max_line_length == 0 {
            return Err(config::ConfigError::Message(
                "max_line_length must be greater than 0".into(),
            ));
        }

        if self.connect_timeout_secs == 0 {
            return Err(config::ConfigError::Message(
                "connect_timeout_secs must be greater than 0".into(),
            ));
        }

        if self.auth_mechanism.trim().is_empty() {
            return Err(config::ConfigError::Message(
                "auth_mechanism cannot be empty".into(),
            ));
        }

        Ok(())
    }

    /// Get connection timeout as Duration
    pub fn connect_timeout(&self) -> Duration {
        Duration::from_secs(self.connect_timeout_secs)
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn test_defaults_are_valid() {
        let config = ChannelConfig::default();
        assert!(config.validate().is_ok());
        assert_eq!(config.max_line_length, 20480);
        assert_eq!(config.connect_timeout(), Duration::from_secs(30));
    }

    #[test]
    fn test_missing_file_uses_defaults() {
        let config = ChannelConfig::load_from("does-not-exist/ftp-channel").unwrap();
        assert_eq!(config.default_user, "anonymous");
        assert_eq!(config.encoding, TextEncoding::Utf8);
    }

    #[test]
    fn test_validation_rejects_zero_line_length() {
        let config = ChannelConfig {
            max_line_length: 0,
            ..ChannelConfig::default()
        };
        assert!(config.validate().is_err());
    }
}
