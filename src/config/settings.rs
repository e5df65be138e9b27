//! Application settings loaded from config.toml
//!
//! Every section is optional; missing values fall back to defaults that work
//! for a local `SQLite` file. `DATABASE_URL` in the environment (or `.env`)
//! takes precedence over the file.

use crate::errors::{Error, Result};
use serde::Deserialize;
use std::path::Path;

/// Configuration structure representing the entire config.toml file
#[derive(Debug, Clone, Default, Deserialize, PartialEq, Eq)]
#[serde(default)]
pub struct Settings {
    /// Database connection
    pub database: DatabaseSettings,
    /// Transaction sync
    pub sync: SyncSettings,
    /// Log output
    pub logging: LoggingSettings,
}

/// `[database]` section
#[derive(Debug, Clone, Deserialize, PartialEq, Eq)]
#[serde(default)]
pub struct DatabaseSettings {
    /// `SeaORM` connection URL
    pub url: String,
}

impl Default for DatabaseSettings {
    fn default() -> Self {
        Self {
            url: "sqlite://data/budget.sqlite?mode=rwc".to_string(),
        }
    }
}

/// `[sync]` section
#[derive(Debug, Clone, Deserialize, PartialEq, Eq)]
#[serde(default)]
pub struct SyncSettings {
    /// How many days back a scheduled pull covers
    pub lookback_days: u32,
}

impl Default for SyncSettings {
    fn default() -> Self {
        Self { lookback_days: 30 }
    }
}

/// `[logging]` section
#[derive(Debug, Clone, Deserialize, PartialEq, Eq)]
#[serde(default)]
pub struct LoggingSettings {
    /// `tracing` filter directive used when `RUST_LOG` is not set
    pub filter: String,
}

impl Default for LoggingSettings {
    fn default() -> Self {
        Self {
            filter: "info".to_string(),
        }
    }
}

/// Parses settings from TOML text.
///
/// # Errors
/// Returns [`Error::Config`] if the TOML is invalid or a field has the wrong type.
pub fn parse_settings(contents: &str) -> Result<Settings> {
    toml::from_str(contents).map_err(|e| Error::Config {
        message: format!("Failed to parse config.toml: {e}"),
    })
}

/// Loads settings from a TOML file, applying the `DATABASE_URL` override.
///
/// A missing file is not an error; defaults are used instead.
///
/// # Errors
/// Returns [`Error::Config`] if the file exists but cannot be read or parsed.
pub fn load_settings<P: AsRef<Path>>(path: P) -> Result<Settings> {
    let path = path.as_ref();
    let mut settings = if path.exists() {
        let contents = std::fs::read_to_string(path).map_err(|e| Error::Config {
            message: format!("Failed to read config file {}: {e}", path.display()),
        })?;
        parse_settings(&contents)?
    } else {
        Settings::default()
    };

    if let Ok(url) = std::env::var("DATABASE_URL") {
        settings.database.url = url;
    }
    Ok(settings)
}

#[cfg(test)]
mod tests {
    #![allow(clippy::unwrap_used)]
    use super::*;

    #[test]
    fn test_parse_settings() {
        let toml_str = r#"
            [database]
            url = "sqlite::memory:"

            [sync]
            lookback_days = 7

            [logging]
            filter = "budget_engine=debug"
        "#;

        let settings = parse_settings(toml_str).unwrap();
        assert_eq!(settings.database.url, "sqlite::memory:");
        assert_eq!(settings.sync.lookback_days, 7);
        assert_eq!(settings.logging.filter, "budget_engine=debug");
    }

    #[test]
    fn test_missing_sections_use_defaults() {
        let settings = parse_settings("[sync]\nlookback_days = 14\n").unwrap();
        assert_eq!(settings.sync.lookback_days, 14);
        assert_eq!(settings.database, DatabaseSettings::default());
        assert_eq!(settings.logging.filter, "info");
    }

    #[test]
    fn test_invalid_settings() {
        let result = parse_settings("[sync]\nlookback_days = \"a month\"\n");
        assert!(matches!(result, Err(Error::Config { .. })));
    }
}
