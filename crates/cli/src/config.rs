//! Deployment configuration (`sacco.toml`)
//!
//! Only where things live and how loud the logs are. Business policy
//! (limits, rates, guarantor rules) is stored in the database.

use sacco_core::Channel;
use serde::{Deserialize, Serialize};
use std::path::{Path, PathBuf};
use thiserror::Error;

/// Configuration loading errors
#[derive(Error, Debug)]
pub enum ConfigError {
    #[error("config file not found: {0}")]
    NotFound(String),

    #[error("IO error: {0}")]
    Io(#[from] std::io::Error),

    #[error("parse error: {0}")]
    Parse(#[from] toml::de::Error),

    #[error("validation error: {0}")]
    Validation(String),
}

const LOG_LEVELS: [&str; 5] = ["trace", "debug", "info", "warn", "error"];

#[derive(Debug, Clone, Default, PartialEq, Serialize, Deserialize)]
pub struct SaccoConfig {
    #[serde(default)]
    pub database: DatabaseConfig,

    #[serde(default)]
    pub logging: LoggingConfig,

    #[serde(default)]
    pub sacco: OrganisationConfig,

    #[serde(default)]
    pub notifications: NotificationConfig,
}

#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
pub struct DatabaseConfig {
    #[serde(default = "default_db_path")]
    pub path: PathBuf,

    /// JSONL audit trail directory
    #[serde(default = "default_events_dir")]
    pub events_dir: PathBuf,
}

fn default_db_path() -> PathBuf {
    PathBuf::from("data/sacco.db")
}

fn default_events_dir() -> PathBuf {
    PathBuf::from("data/events")
}

impl Default for DatabaseConfig {
    fn default() -> Self {
        Self {
            path: default_db_path(),
            events_dir: default_events_dir(),
        }
    }
}

#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
pub struct LoggingConfig {
    /// Overridden by `RUST_LOG`
    #[serde(default = "default_log_level")]
    pub level: String,
}

fn default_log_level() -> String {
    "info".to_string()
}

impl Default for LoggingConfig {
    fn default() -> Self {
        Self {
            level: default_log_level(),
        }
    }
}

/// Seeds the stored policy on `sacco init`
#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
pub struct OrganisationConfig {
    #[serde(default = "default_name")]
    pub name: String,

    #[serde(default = "default_currency")]
    pub currency: String,
}

fn default_name() -> String {
    "SACCO".to_string()
}

fn default_currency() -> String {
    "KES".to_string()
}

impl Default for OrganisationConfig {
    fn default() -> Self {
        Self {
            name: default_name(),
            currency: default_currency(),
        }
    }
}

#[derive(Debug, Clone, Default, PartialEq, Serialize, Deserialize)]
pub struct NotificationConfig {
    /// Outbound channels used besides in-app notifications
    #[serde(default)]
    pub channels: Vec<Channel>,
}

impl SaccoConfig {
    pub fn load_file<P: AsRef<Path>>(path: P) -> Result<Self, ConfigError> {
        let path = path.as_ref();
        if !path.exists() {
            return Err(ConfigError::NotFound(path.display().to_string()));
        }

        let content = std::fs::read_to_string(path)?;
        Self::load_str(&content)
    }

    pub fn load_str(content: &str) -> Result<Self, ConfigError> {
        let config: SaccoConfig = toml::from_str(content)?;
        config.validate()?;
        Ok(config)
    }

    /// Load `path`, falling back to defaults when the file is absent
    pub fn load_or_default<P: AsRef<Path>>(path: P) -> Result<Self, ConfigError> {
        match Self::load_file(path) {
            Err(ConfigError::NotFound(_)) => Ok(Self::default()),
            other => other,
        }
    }

    pub fn validate(&self) -> Result<(), ConfigError> {
        if self.database.path.as_os_str().is_empty() {
            return Err(ConfigError::Validation("database.path must not be empty".into()));
        }
        if self.database.events_dir.as_os_str().is_empty() {
            return Err(ConfigError::Validation(
                "database.events_dir must not be empty".into(),
            ));
        }

        // Accept directive strings like "sacco=debug,sqlx=warn" as long as
        // every bare level is known
        for directive in self.logging.level.split(',') {
            let level = directive.rsplit('=').next().unwrap_or(directive).trim();
            if !LOG_LEVELS.contains(&level.to_lowercase().as_str()) {
                return Err(ConfigError::Validation(format!(
                    "unknown log level '{}'",
                    level
                )));
            }
        }

        let currency = &self.sacco.currency;
        if currency.len() != 3 || !currency.chars().all(|c| c.is_ascii_uppercase()) {
            return Err(ConfigError::Validation(format!(
                "currency must be a three-letter ISO code, got '{}'",
                currency
            )));
        }
        if self.sacco.name.trim().is_empty() {
            return Err(ConfigError::Validation("sacco.name must not be empty".into()));
        }
        Ok(())
    }

    /// `sqlite:` URL for the configured database file
    pub fn database_url(&self) -> String {
        format!("sqlite:{}?mode=rwc", self.database.path.display())
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn test_defaults() {
        let config = SaccoConfig::load_str("").unwrap();
        assert_eq!(config, SaccoConfig::default());
        assert_eq!(config.database.path, PathBuf::from("data/sacco.db"));
        assert_eq!(config.logging.level, "info");
        assert_eq!(config.sacco.currency, "KES");
        assert!(config.notifications.channels.is_empty());
    }

    #[test]
    fn test_full_file() {
        let config = SaccoConfig::load_str(
            r#"
            [database]
            path = "/var/lib/sacco/sacco.db"
            events_dir = "/var/lib/sacco/events"

            [logging]
            level = "sacco=debug,sqlx=warn"

            [sacco]
            name = "Umoja SACCO"
            currency = "UGX"

            [notifications]
            channels = ["email", "sms"]
            "#,
        )
        .unwrap();

        assert_eq!(config.database.events_dir, PathBuf::from("/var/lib/sacco/events"));
        assert_eq!(config.sacco.name, "Umoja SACCO");
        assert_eq!(config.notifications.channels, vec![Channel::Email, Channel::Sms]);
        assert_eq!(config.database_url(), "sqlite:/var/lib/sacco/sacco.db?mode=rwc");
    }

    #[test]
    fn test_validation() {
        let err = SaccoConfig::load_str("[sacco]\ncurrency = \"kes\"").unwrap_err();
        assert!(matches!(err, ConfigError::Validation(_)));

        let err = SaccoConfig::load_str("[logging]\nlevel = \"loud\"").unwrap_err();
        assert!(matches!(err, ConfigError::Validation(_)));

        let err = SaccoConfig::load_str("[notifications]\nchannels = [\"pigeon\"]").unwrap_err();
        assert!(matches!(err, ConfigError::Parse(_)));
    }

    #[test]
    fn test_missing_file() {
        let dir = tempfile::TempDir::new().unwrap();
        let path = dir.path().join("absent.toml");

        assert!(matches!(SaccoConfig::load_file(&path), Err(ConfigError::NotFound(_))));
        assert_eq!(SaccoConfig::load_or_default(&path).unwrap(), SaccoConfig::default());

        std::fs::write(&path, "[sacco]\nname = \"Jamii\"\n").unwrap();
        assert_eq!(SaccoConfig::load_or_default(&path).unwrap().sacco.name, "Jamii");
    }
}
