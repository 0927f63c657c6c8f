use anyhow::{anyhow, Result};
use chrono::FixedOffset;
use serde::Deserialize;
use std::env;
use tracing::{info, warn};

// Import logging macros
use crate::{log_system_event, log_validation};

/// Complete application configuration loaded from environment variables
#[derive(Debug, Clone, Deserialize)]
pub struct Config {
    pub database: DatabaseConfig,
    pub scheduler: SchedulerConfig,
    pub logging: LoggingConfig,
}

/// Database connection configuration
#[derive(Debug, Clone, Deserialize)]
pub struct DatabaseConfig {
    pub url: String,
    pub max_connections: u32,
}

/// Review scheduling configuration
#[derive(Debug, Clone, Deserialize)]
pub struct SchedulerConfig {
    /// Due cards handed out per study session.
    pub session_limit: usize,
    /// Learner's offset from UTC; decides where "today" starts for statistics.
    pub utc_offset_minutes: i32,
    /// Optimistic write attempts before a review gives up with a conflict.
    pub max_write_attempts: u32,
}

/// Logging system configuration
#[derive(Debug, Clone, Deserialize)]
pub struct LoggingConfig {
    pub level: String,
    pub file_enabled: bool,
    pub console_enabled: bool,
    pub log_directory: String,
}

impl Default for SchedulerConfig {
    fn default() -> Self {
        Self {
            session_limit: 20,
            utc_offset_minutes: 0,
            max_write_attempts: 3,
        }
    }
}

impl Config {
    /// Load configuration from environment variables with sensible defaults
    pub fn from_env() -> Result<Self> {
        Self::from_lookup(|key| env::var(key).ok())
    }

    /// Load configuration from any key/value source
    pub fn from_lookup(lookup: impl Fn(&str) -> Option<String>) -> Result<Self> {
        log_system_event!(config, "Loading application configuration");

        let config = Config {
            database: DatabaseConfig::from_lookup(&lookup)?,
            scheduler: SchedulerConfig::from_lookup(&lookup)?,
            logging: LoggingConfig::from_lookup(&lookup)?,
        };

        log_system_event!(config, "Configuration loaded successfully");
        config.log_configuration_summary();

        Ok(config)
    }

    /// Log a summary of loaded configuration (without sensitive data)
    fn log_configuration_summary(&self) {
        info!(
            database_url_masked = %mask_sensitive_data(&self.database.url),
            max_connections = self.database.max_connections,
            session_limit = self.scheduler.session_limit,
            utc_offset_minutes = self.scheduler.utc_offset_minutes,
            log_level = %self.logging.level,
            "Configuration summary"
        );
    }

    /// Validate configuration values
    pub fn validate(&self) -> Result<()> {
        self.check_values()
            .inspect_err(|e| {
                log_validation!(failure, "configuration", error = e);
            })?;

        log_validation!(success, "configuration", "Configuration validation completed successfully");
        Ok(())
    }

    fn check_values(&self) -> Result<()> {
        if !self.database.url.starts_with("sqlite:") {
            return Err(anyhow!("DATABASE_URL must start with 'sqlite:'"));
        }

        if self.database.max_connections == 0 {
            return Err(anyhow!("DATABASE_MAX_CONNECTIONS must be greater than 0"));
        }

        if self.scheduler.session_limit == 0 {
            return Err(anyhow!("STUDY_SESSION_LIMIT must be greater than 0"));
        }

        if self.scheduler.max_write_attempts == 0 {
            return Err(anyhow!("REVIEW_WRITE_ATTEMPTS must be greater than 0"));
        }

        self.scheduler.day_boundary()?;

        let base_level = self
            .logging
            .level
            .split(',')
            .next()
            .unwrap_or_default()
            .to_lowercase();
        if !["trace", "debug", "info", "warn", "error"].contains(&base_level.as_str()) {
            warn!("Invalid log level '{}', using 'info' as fallback", self.logging.level);
        }

        Ok(())
    }
}

impl DatabaseConfig {
    fn from_lookup(lookup: &impl Fn(&str) -> Option<String>) -> Result<Self> {
        let url = lookup("DATABASE_URL").unwrap_or_else(|| "sqlite:study_scheduler.db".to_string());
        let max_connections = parse_or("DATABASE_MAX_CONNECTIONS", lookup, 5u32)?;

        Ok(DatabaseConfig { url, max_connections })
    }
}

impl SchedulerConfig {
    fn from_lookup(lookup: &impl Fn(&str) -> Option<String>) -> Result<Self> {
        let defaults = SchedulerConfig::default();

        Ok(SchedulerConfig {
            session_limit: parse_or("STUDY_SESSION_LIMIT", lookup, defaults.session_limit)?,
            utc_offset_minutes: parse_or(
                "STUDY_UTC_OFFSET_MINUTES",
                lookup,
                defaults.utc_offset_minutes,
            )?,
            max_write_attempts: parse_or(
                "REVIEW_WRITE_ATTEMPTS",
                lookup,
                defaults.max_write_attempts,
            )?,
        })
    }

    /// The fixed offset whose calendar days count as the learner's days.
    pub fn day_boundary(&self) -> Result<FixedOffset> {
        // FixedOffset accepts anything under a day, but real zones stay within ±1439 minutes
        if self.utc_offset_minutes.abs() >= 24 * 60 {
            return Err(anyhow!(
                "STUDY_UTC_OFFSET_MINUTES must be between -1439 and 1439, got {}",
                self.utc_offset_minutes
            ));
        }

        FixedOffset::east_opt(self.utc_offset_minutes * 60)
            .ok_or_else(|| anyhow!("Invalid UTC offset: {} minutes", self.utc_offset_minutes))
    }
}

impl LoggingConfig {
    fn from_lookup(lookup: &impl Fn(&str) -> Option<String>) -> Result<Self> {
        let level = lookup("RUST_LOG").unwrap_or_else(|| "info,study_scheduler=debug".to_string());
        let log_directory = lookup("LOG_DIRECTORY").unwrap_or_else(|| "logs".to_string());

        Ok(LoggingConfig {
            level,
            file_enabled: parse_or("LOG_FILE_ENABLED", lookup, true)?,
            console_enabled: parse_or("LOG_CONSOLE_ENABLED", lookup, true)?,
            log_directory,
        })
    }
}

fn parse_or<T: std::str::FromStr>(
    key: &str,
    lookup: &impl Fn(&str) -> Option<String>,
    default: T,
) -> Result<T> {
    match lookup(key) {
        None => Ok(default),
        Some(raw) => raw
            .trim()
            .parse::<T>()
            .map_err(|_| anyhow!("Invalid {} value: '{}'", key, raw)),
    }
}

/// Mask sensitive data in configuration for safe logging
fn mask_sensitive_data(data: &str) -> String {
    let chars: Vec<char> = data.chars().collect();
    if chars.len() <= 8 {
        "*".repeat(chars.len())
    } else {
        let head: String = chars[..4].iter().collect();
        let tail: String = chars[chars.len() - 4..].iter().collect();
        format!("{}***{}", head, tail)
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use std::collections::HashMap;

    fn lookup_from(pairs: &[(&str, &str)]) -> impl Fn(&str) -> Option<String> {
        let map: HashMap<String, String> = pairs
            .iter()
            .map(|(k, v)| (k.to_string(), v.to_string()))
            .collect();
        move |key| map.get(key).cloned()
    }

    #[test]
    fn test_mask_sensitive_data() {
        assert_eq!(mask_sensitive_data("short"), "*****");
        assert_eq!(mask_sensitive_data("sqlite:study_scheduler.db"), "sqli***r.db");
    }

    #[test]
    fn test_defaults() {
        let config = Config::from_lookup(lookup_from(&[])).unwrap();
        assert_eq!(config.database.url, "sqlite:study_scheduler.db");
        assert_eq!(config.database.max_connections, 5);
        assert_eq!(config.scheduler.session_limit, 20);
        assert_eq!(config.scheduler.utc_offset_minutes, 0);
        assert_eq!(config.scheduler.max_write_attempts, 3);
        assert!(config.logging.file_enabled);
        assert_eq!(config.logging.log_directory, "logs");
        assert!(config.validate().is_ok());
    }

    #[test]
    fn test_invalid_number_is_an_error() {
        let result = Config::from_lookup(lookup_from(&[("STUDY_SESSION_LIMIT", "lots")]));
        assert!(result.is_err());
    }

    #[test]
    fn test_malformed_log_switch_is_an_error() {
        let result = Config::from_lookup(lookup_from(&[("LOG_FILE_ENABLED", "yes")]));
        assert!(result.is_err());

        let config = Config::from_lookup(lookup_from(&[("LOG_CONSOLE_ENABLED", " false ")])).unwrap();
        assert!(!config.logging.console_enabled);
    }

    #[test]
    fn test_day_boundary() {
        let config = SchedulerConfig {
            utc_offset_minutes: -300,
            ..SchedulerConfig::default()
        };
        assert_eq!(config.day_boundary().unwrap().local_minus_utc(), -300 * 60);

        let config = SchedulerConfig {
            utc_offset_minutes: 1440,
            ..SchedulerConfig::default()
        };
        assert!(config.day_boundary().is_err());
    }

    #[test]
    fn test_config_validation() {
        let config = Config::from_lookup(lookup_from(&[("DATABASE_URL", "sqlite::memory:")])).unwrap();
        assert!(config.validate().is_ok());

        let mut invalid = config.clone();
        invalid.database.url = "postgres://localhost/study".to_string();
        assert!(invalid.validate().is_err());

        let mut invalid = config.clone();
        invalid.scheduler.session_limit = 0;
        assert!(invalid.validate().is_err());

        let mut invalid = config;
        invalid.scheduler.max_write_attempts = 0;
        assert!(invalid.validate().is_err());
    }
}
