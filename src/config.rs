//! Configuration management module.

use serde::{Deserialize, Serialize};
use std::path::{Path, PathBuf};
use thiserror::Error;

/// Configuration load result.
#[derive(Debug)]
pub enum ConfigLoadResult {
    /// Config loaded successfully.
    Loaded(AppConfig),
    /// Config file missing (defaults apply).
    Missing,
    /// Config file exists but invalid.
    Invalid(ConfigError),
}

/// Configuration errors.
#[derive(Error, Debug)]
pub enum ConfigError {
    #[error("Failed to read config file: {0}")]
    Read(#[from] std::io::Error),

    #[error("Failed to parse config: {0}")]
    Parse(#[from] toml::de::Error),

    #[error("Failed to serialize config: {0}")]
    Serialize(#[from] toml::ser::Error),

    #[error("Validation failed: {0}")]
    Validation(String),
}

/// Main application configuration.
#[derive(Debug, Clone, Default, Serialize, Deserialize)]
pub struct AppConfig {
    #[serde(default)]
    pub printer: PrinterConfig,
    #[serde(default)]
    pub server: ServerConfig,
}

/// Printer connection settings.
#[derive(Debug, Clone, Serialize, Deserialize)]
pub struct PrinterConfig {
    pub host: String,
    #[serde(default = "default_port")]
    pub port: u16,
    /// Shared secret the device expects in every command header.
    #[serde(default = "default_pin_code")]
    pub pin_code: u16,
    /// Connect timeout in seconds.
    #[serde(default = "default_timeout_secs")]
    pub timeout_secs: u64,
}

/// Simulator settings for the `serve` subcommand.
#[derive(Debug, Clone, Serialize, Deserialize)]
pub struct ServerConfig {
    pub host: String,
    #[serde(default = "default_port")]
    pub port: u16,
    pub model_name: String,
    /// Battery level, 0-7.
    pub battery: u8,
    /// Prints left in the cartridge, 0-10.
    pub prints_remaining: u8,
    /// Lifetime print counter.
    pub total_prints: u32,
}

fn default_port() -> u16 {
    8080
}

fn default_pin_code() -> u16 {
    1111
}

fn default_timeout_secs() -> u64 {
    10
}

impl AppConfig {
    /// Get config file path (same directory as executable).
    pub fn default_path() -> PathBuf {
        std::env::current_exe()
            .ok()
            .and_then(|p| p.parent().map(|p| p.to_path_buf()))
            .unwrap_or_else(|| PathBuf::from("."))
            .join("config.toml")
    }

    /// Attempt to load config with detailed result.
    pub fn try_load(path: &Path) -> ConfigLoadResult {
        if !path.exists() {
            return ConfigLoadResult::Missing;
        }

        match std::fs::read_to_string(path) {
            Ok(content) => match toml::from_str::<AppConfig>(&content) {
                Ok(config) => match config.validate() {
                    Ok(()) => ConfigLoadResult::Loaded(config),
                    Err(e) => ConfigLoadResult::Invalid(e),
                },
                Err(e) => ConfigLoadResult::Invalid(ConfigError::Parse(e)),
            },
            Err(e) => ConfigLoadResult::Invalid(ConfigError::Read(e)),
        }
    }

    /// Validate configuration values.
    pub fn validate(&self) -> Result<(), ConfigError> {
        if self.printer.host.trim().is_empty() {
            return Err(ConfigError::Validation("Printer host cannot be empty".to_string()));
        }
        if self.printer.port == 0 {
            return Err(ConfigError::Validation("Printer port must be greater than 0".to_string()));
        }
        if self.printer.timeout_secs < 1 {
            return Err(ConfigError::Validation(
                "Printer timeout must be at least 1 second".to_string(),
            ));
        }
        if self.server.host.trim().is_empty() {
            return Err(ConfigError::Validation("Server host cannot be empty".to_string()));
        }
        if self.server.model_name.trim().is_empty() {
            return Err(ConfigError::Validation("Server model name cannot be empty".to_string()));
        }
        if self.server.battery > 7 {
            return Err(ConfigError::Validation("Battery level must be 0-7".to_string()));
        }
        if self.server.prints_remaining > 10 {
            return Err(ConfigError::Validation("Prints remaining must be 0-10".to_string()));
        }
        Ok(())
    }

    /// Save configuration to file.
    pub fn save(&self, path: &Path) -> Result<(), ConfigError> {
        let content = toml::to_string_pretty(self)?;
        std::fs::write(path, content)?;
        Ok(())
    }
}

impl Default for PrinterConfig {
    fn default() -> Self {
        Self {
            host: "192.168.0.251".to_string(),
            port: default_port(),
            pin_code: default_pin_code(),
            timeout_secs: default_timeout_secs(),
        }
    }
}

impl Default for ServerConfig {
    fn default() -> Self {
        Self {
            host: "0.0.0.0".to_string(),
            port: default_port(),
            model_name: "SP-2".to_string(),
            battery: 2,
            prints_remaining: 10,
            total_prints: 20,
        }
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn test_default_config_validates() {
        let config = AppConfig::default();
        assert!(config.validate().is_ok());
    }

    #[test]
    fn test_parse_partial_config() {
        let config: AppConfig = toml::from_str(
            r#"
            [printer]
            host = "10.0.0.5"

            [server]
            host = "127.0.0.1"
            model_name = "SP-3"
            battery = 3
            prints_remaining = 5
            total_prints = 100
            "#,
        )
        .unwrap();

        assert_eq!(config.printer.host, "10.0.0.5");
        assert_eq!(config.printer.port, 8080);
        assert_eq!(config.printer.pin_code, 1111);
        assert_eq!(config.server.model_name, "SP-3");
        assert!(config.validate().is_ok());
    }

    #[test]
    fn test_validation_empty_host() {
        let mut config = AppConfig::default();
        config.printer.host = String::new();
        assert!(config.validate().is_err());
    }

    #[test]
    fn test_validation_invalid_port() {
        let mut config = AppConfig::default();
        config.printer.port = 0;
        assert!(config.validate().is_err());
    }

    #[test]
    fn test_validation_battery_range() {
        let mut config = AppConfig::default();
        config.server.battery = 8;
        assert!(config.validate().is_err());

        config.server.battery = 7;
        assert!(config.validate().is_ok());
    }

    #[test]
    fn test_validation_remaining_range() {
        let mut config = AppConfig::default();
        config.server.prints_remaining = 11;
        assert!(config.validate().is_err());
    }
}
