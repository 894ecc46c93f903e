//! # Engine Configuration
//!
//! ## Configuration Sources
//! ```text
//! ┌─────────────────────────────────────────────────────────────────────────┐
//! │                    Configuration Priority                               │
//! │                                                                         │
//! │  1. Environment Variables (highest priority)                           │
//! │     MEDSTOCK_DB_PATH=/var/lib/medstock/medstock.db                     │
//! │     MEDSTOCK_TIMEZONE=Europe/Moscow                                    │
//! │                                                                         │
//! │  2. TOML Config File                                                   │
//! │     ~/.config/medstock/medstock.toml (Linux)                           │
//! │     ~/Library/Application Support/com.medstock.medstock/… (macOS)      │
//! │                                                                         │
//! │  3. Default Values (lowest priority)                                   │
//! │     platform data dir, 5 connections, Europe/Moscow, 6 months          │
//! └─────────────────────────────────────────────────────────────────────────┘
//! ```
//!
//! ## Configuration File Format
//! ```toml
//! # medstock.toml
//! [database]
//! path = "/var/lib/medstock/medstock.db"
//! max_connections = 5
//! busy_timeout_ms = 5000
//!
//! [business]
//! timezone = "Europe/Moscow"
//! finance_window = 6
//! ```

use std::path::PathBuf;
use std::time::Duration;

use chrono_tz::Tz;
use serde::{Deserialize, Serialize};
use thiserror::Error;
use tracing::{debug, info, warn};

use medstock_core::{DEFAULT_FINANCE_WINDOW, MAX_FINANCE_WINDOW};
use medstock_db::DbConfig;

// =============================================================================
// Config Errors
// =============================================================================

#[derive(Debug, Error)]
pub enum ConfigError {
    #[error("Failed to read config file: {0}")]
    Io(#[from] std::io::Error),

    #[error("Failed to parse config file: {0}")]
    Parse(#[from] toml::de::Error),

    #[error("Failed to serialize config: {0}")]
    Serialize(#[from] toml::ser::Error),

    #[error("Invalid configuration: {0}")]
    Invalid(String),
}

pub type ConfigResult<T> = Result<T, ConfigError>;

// =============================================================================
// Database Settings
// =============================================================================

#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
pub struct DatabaseSettings {
    /// SQLite file. Unset means the platform data directory.
    #[serde(default)]
    pub path: Option<PathBuf>,

    #[serde(default = "default_max_connections")]
    pub max_connections: u32,

    /// How long a writer waits for a competing writer's lock.
    #[serde(default = "default_busy_timeout_ms")]
    pub busy_timeout_ms: u64,
}

fn default_max_connections() -> u32 {
    5
}

fn default_busy_timeout_ms() -> u64 {
    5_000
}

impl Default for DatabaseSettings {
    fn default() -> Self {
        DatabaseSettings {
            path: None,
            max_connections: default_max_connections(),
            busy_timeout_ms: default_busy_timeout_ms(),
        }
    }
}

// =============================================================================
// Business Settings
// =============================================================================

#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
pub struct BusinessSettings {
    /// IANA name of the timezone that defines business days and months.
    #[serde(default = "default_timezone")]
    pub timezone: String,

    /// Months in the finance series when the caller does not say.
    #[serde(default = "default_finance_window")]
    pub finance_window: u32,
}

fn default_timezone() -> String {
    medstock_core::DEFAULT_BUSINESS_TZ.name().to_string()
}

fn default_finance_window() -> u32 {
    DEFAULT_FINANCE_WINDOW
}

impl Default for BusinessSettings {
    fn default() -> Self {
        BusinessSettings {
            timezone: default_timezone(),
            finance_window: default_finance_window(),
        }
    }
}

// =============================================================================
// Engine Configuration
// =============================================================================

/// Complete engine configuration.
#[derive(Debug, Clone, Default, PartialEq, Serialize, Deserialize)]
pub struct EngineConfig {
    #[serde(default)]
    pub database: DatabaseSettings,

    #[serde(default)]
    pub business: BusinessSettings,
}

impl EngineConfig {
    /// Loads configuration from file, environment, and defaults.
    ///
    /// ## Load Order (later overrides earlier)
    /// 1. Default values
    /// 2. Config file (`medstock.toml`)
    /// 3. Environment variables
    pub fn load(config_path: Option<PathBuf>) -> ConfigResult<Self> {
        let mut config = Self::default();

        if let Some(path) = config_path.or_else(Self::default_config_path) {
            if path.exists() {
                info!(?path, "Loading engine config from file");
                let contents = std::fs::read_to_string(&path)?;
                config = toml::from_str(&contents)?;
            } else {
                debug!(?path, "Config file not found, using defaults");
            }
        }

        config.apply_env_overrides(|key| std::env::var(key).ok());
        config.validate()?;

        Ok(config)
    }

    /// Saves configuration to file.
    pub fn save(&self, config_path: Option<PathBuf>) -> ConfigResult<()> {
        let path = config_path
            .or_else(Self::default_config_path)
            .ok_or_else(|| ConfigError::Invalid("No config path available".into()))?;

        if let Some(parent) = path.parent() {
            std::fs::create_dir_all(parent)?;
        }

        let contents = toml::to_string_pretty(self)?;
        std::fs::write(&path, contents)?;

        info!(?path, "Engine config saved");
        Ok(())
    }

    /// Validates the configuration.
    pub fn validate(&self) -> ConfigResult<()> {
        self.timezone()?;

        if self.database.max_connections == 0 {
            return Err(ConfigError::Invalid(
                "max_connections must be greater than 0".into(),
            ));
        }

        if !(1..=MAX_FINANCE_WINDOW).contains(&self.business.finance_window) {
            return Err(ConfigError::Invalid(format!(
                "finance_window must be between 1 and {}",
                MAX_FINANCE_WINDOW
            )));
        }

        Ok(())
    }

    /// Applies `MEDSTOCK_*` overrides read through `lookup`.
    ///
    /// Unparseable numbers are logged and ignored.
    pub fn apply_env_overrides(&mut self, lookup: impl Fn(&str) -> Option<String>) {
        if let Some(path) = lookup("MEDSTOCK_DB_PATH") {
            debug!(path = %path, "Overriding database path from environment");
            self.database.path = Some(PathBuf::from(path));
        }

        if let Some(max) = lookup("MEDSTOCK_MAX_CONNECTIONS") {
            match max.parse::<u32>() {
                Ok(n) => self.database.max_connections = n,
                Err(_) => warn!(value = %max, "Ignoring MEDSTOCK_MAX_CONNECTIONS"),
            }
        }

        if let Some(ms) = lookup("MEDSTOCK_BUSY_TIMEOUT_MS") {
            match ms.parse::<u64>() {
                Ok(n) => self.database.busy_timeout_ms = n,
                Err(_) => warn!(value = %ms, "Ignoring MEDSTOCK_BUSY_TIMEOUT_MS"),
            }
        }

        if let Some(tz) = lookup("MEDSTOCK_TIMEZONE") {
            debug!(timezone = %tz, "Overriding business timezone from environment");
            self.business.timezone = tz;
        }

        if let Some(window) = lookup("MEDSTOCK_FINANCE_WINDOW") {
            match window.parse::<u32>() {
                Ok(n) => self.business.finance_window = n,
                Err(_) => warn!(value = %window, "Ignoring MEDSTOCK_FINANCE_WINDOW"),
            }
        }
    }

    /// The parsed business timezone.
    pub fn timezone(&self) -> ConfigResult<Tz> {
        self.business.timezone.parse::<Tz>().map_err(|e| {
            ConfigError::Invalid(format!(
                "unknown timezone '{}': {}",
                self.business.timezone, e
            ))
        })
    }

    /// The database file, falling back to the platform data directory.
    pub fn database_path(&self) -> PathBuf {
        self.database.path.clone().unwrap_or_else(|| {
            directories::ProjectDirs::from("com", "medstock", "medstock")
                .map(|dirs| dirs.data_dir().join("medstock.db"))
                .unwrap_or_else(|| PathBuf::from("medstock.db"))
        })
    }

    /// Pool settings for [`medstock_db::Database::new`].
    pub fn db_config(&self) -> DbConfig {
        DbConfig::new(self.database_path())
            .max_connections(self.database.max_connections)
            .busy_timeout(Duration::from_millis(self.database.busy_timeout_ms))
    }

    fn default_config_path() -> Option<PathBuf> {
        directories::ProjectDirs::from("com", "medstock", "medstock")
            .map(|dirs| dirs.config_dir().join("medstock.toml"))
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use std::collections::HashMap;

    #[test]
    fn test_default_config() {
        let config = EngineConfig::default();
        assert_eq!(config.timezone().unwrap(), chrono_tz::Europe::Moscow);
        assert_eq!(config.business.finance_window, 6);
        assert_eq!(config.database.max_connections, 5);
        assert!(config.validate().is_ok());
    }

    #[test]
    fn test_partial_toml_keeps_defaults() {
        let config: EngineConfig = toml::from_str(
            r#"
            [database]
            path = "/tmp/shop.db"
            "#,
        )
        .unwrap();
        assert_eq!(config.database_path(), PathBuf::from("/tmp/shop.db"));
        assert_eq!(config.database.busy_timeout_ms, 5_000);
        assert_eq!(config.business.timezone, "Europe/Moscow");
    }

    #[test]
    fn test_env_overrides_win() {
        let env: HashMap<&str, &str> = [
            ("MEDSTOCK_DB_PATH", "/srv/medstock.db"),
            ("MEDSTOCK_TIMEZONE", "Asia/Yekaterinburg"),
            ("MEDSTOCK_FINANCE_WINDOW", "12"),
            ("MEDSTOCK_MAX_CONNECTIONS", "many"),
        ]
        .into_iter()
        .collect();

        let mut config = EngineConfig::default();
        config.apply_env_overrides(|k| env.get(k).map(|v| v.to_string()));

        assert_eq!(config.database.path, Some(PathBuf::from("/srv/medstock.db")));
        assert_eq!(config.timezone().unwrap(), chrono_tz::Asia::Yekaterinburg);
        assert_eq!(config.business.finance_window, 12);
        // Unparseable value leaves the default in place
        assert_eq!(config.database.max_connections, 5);
    }

    #[test]
    fn test_validation() {
        let mut config = EngineConfig::default();
        config.business.timezone = "Mars/Olympus".into();
        assert!(config.validate().is_err());

        let mut config = EngineConfig::default();
        config.business.finance_window = 0;
        assert!(config.validate().is_err());

        let mut config = EngineConfig::default();
        config.database.max_connections = 0;
        assert!(config.validate().is_err());
    }

    #[test]
    fn test_toml_serialization() {
        let toml_str = toml::to_string_pretty(&EngineConfig::default()).unwrap();
        assert!(toml_str.contains("[database]"));
        assert!(toml_str.contains("[business]"));
    }
}
