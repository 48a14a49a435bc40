//! Application configuration loaded from environment variables.

use std::time::Duration;

use event_bus::RelayConfig;
use thiserror::Error;

/// A setting that was present but unusable.
#[derive(Debug, Error, PartialEq, Eq)]
pub enum ConfigError {
    #[error("{key} must be greater than zero")]
    Zero { key: &'static str },
}

/// Output format of the tracing subscriber.
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub enum LogFormat {
    Pretty,
    Json,
}

impl LogFormat {
    fn parse(value: &str) -> Self {
        if value.eq_ignore_ascii_case("json") {
            LogFormat::Json
        } else {
            LogFormat::Pretty
        }
    }
}

/// Server configuration with sensible defaults.
///
/// Reads from environment variables:
/// - `HOST`: bind address (default: `"0.0.0.0"`)
/// - `PORT`: listen port (default: `3000`)
/// - `RUST_LOG`: tracing filter directive (default: `"info"`)
/// - `LOG_FORMAT`: `pretty` or `json` (default: `pretty`)
/// - `DATABASE_URL`: PostgreSQL URL; in-memory stores are used when unset
/// - `OUTBOX_POLL_INTERVAL_MS`: relay poll interval (default: `250`)
/// - `OUTBOX_BATCH_SIZE`: records per relay pass (default: `100`)
/// - `OUTBOX_MAX_ATTEMPTS`: publish attempts before a record is parked (default: `10`)
/// - `EVENT_MAX_REDELIVERIES`: consumer redeliveries before dead-lettering (default: `5`)
#[derive(Debug, Clone)]
pub struct Config {
    pub host: String,
    pub port: u16,
    pub log_level: String,
    pub log_format: LogFormat,
    pub database_url: Option<String>,
    pub outbox_poll_interval: Duration,
    pub outbox_batch_size: usize,
    pub outbox_max_attempts: u32,
    pub event_max_redeliveries: u32,
}

fn parsed_or<T: std::str::FromStr>(value: Option<String>, default: T) -> T {
    value.and_then(|v| v.parse().ok()).unwrap_or(default)
}

fn nonzero<T: Default + PartialEq>(key: &'static str, value: T) -> Result<T, ConfigError> {
    if value == T::default() {
        return Err(ConfigError::Zero { key });
    }
    Ok(value)
}

impl Config {
    /// Loads configuration from environment variables, falling back to defaults.
    ///
    /// Fails when an outbox relay setting is zero.
    pub fn from_env() -> Result<Self, ConfigError> {
        Self::from_lookup(|key| std::env::var(key).ok())
    }

    /// Loads configuration through `lookup`, which returns the raw value of a key.
    pub fn from_lookup(lookup: impl Fn(&str) -> Option<String>) -> Result<Self, ConfigError> {
        let defaults = Self::default();
        let poll_ms = parsed_or(
            lookup("OUTBOX_POLL_INTERVAL_MS"),
            defaults.outbox_poll_interval.as_millis() as u64,
        );

        Ok(Self {
            host: lookup("HOST").unwrap_or(defaults.host),
            port: parsed_or(lookup("PORT"), defaults.port),
            log_level: lookup("RUST_LOG").unwrap_or(defaults.log_level),
            log_format: lookup("LOG_FORMAT")
                .map(|v| LogFormat::parse(&v))
                .unwrap_or(defaults.log_format),
            database_url: lookup("DATABASE_URL").filter(|url| !url.is_empty()),
            outbox_poll_interval: Duration::from_millis(nonzero(
                "OUTBOX_POLL_INTERVAL_MS",
                poll_ms,
            )?),
            outbox_batch_size: nonzero(
                "OUTBOX_BATCH_SIZE",
                parsed_or(lookup("OUTBOX_BATCH_SIZE"), defaults.outbox_batch_size),
            )?,
            outbox_max_attempts: nonzero(
                "OUTBOX_MAX_ATTEMPTS",
                parsed_or(lookup("OUTBOX_MAX_ATTEMPTS"), defaults.outbox_max_attempts),
            )?,
            event_max_redeliveries: parsed_or(
                lookup("EVENT_MAX_REDELIVERIES"),
                defaults.event_max_redeliveries,
            ),
        })
    }

    /// Returns the `"host:port"` bind address string.
    pub fn addr(&self) -> String {
        format!("{}:{}", self.host, self.port)
    }

    pub fn relay_config(&self) -> RelayConfig {
        RelayConfig {
            poll_interval: self.outbox_poll_interval,
            batch_size: self.outbox_batch_size,
            max_attempts: self.outbox_max_attempts,
        }
    }
}

impl Default for Config {
    fn default() -> Self {
        let relay = RelayConfig::default();
        Self {
            host: "0.0.0.0".to_string(),
            port: 3000,
            log_level: "info".to_string(),
            log_format: LogFormat::Pretty,
            database_url: None,
            outbox_poll_interval: relay.poll_interval,
            outbox_batch_size: relay.batch_size,
            outbox_max_attempts: relay.max_attempts,
            event_max_redeliveries: 5,
        }
    }
}

#[cfg(test)]
mod tests {
    use std::collections::HashMap;

    use super::*;

    #[test]
    fn test_default_values() {
        let config = Config::default();
        assert_eq!(config.host, "0.0.0.0");
        assert_eq!(config.port, 3000);
        assert_eq!(config.log_level, "info");
        assert_eq!(config.log_format, LogFormat::Pretty);
        assert!(config.database_url.is_none());
        assert_eq!(config.outbox_poll_interval, Duration::from_millis(250));
        assert_eq!(config.outbox_batch_size, 100);
        assert_eq!(config.outbox_max_attempts, 10);
        assert_eq!(config.event_max_redeliveries, 5);
    }

    #[test]
    fn test_addr_formatting() {
        let config = Config {
            host: "127.0.0.1".to_string(),
            port: 8080,
            ..Config::default()
        };
        assert_eq!(config.addr(), "127.0.0.1:8080");
    }

    #[test]
    fn test_relay_config_follows_outbox_settings() {
        let config = Config {
            outbox_poll_interval: Duration::from_millis(50),
            outbox_batch_size: 7,
            outbox_max_attempts: 2,
            ..Config::default()
        };
        let relay = config.relay_config();
        assert_eq!(relay.poll_interval, Duration::from_millis(50));
        assert_eq!(relay.batch_size, 7);
        assert_eq!(relay.max_attempts, 2);
    }

    fn lookup_from(pairs: &[(&str, &str)]) -> impl Fn(&str) -> Option<String> {
        let vars: HashMap<String, String> = pairs
            .iter()
            .map(|(k, v)| (k.to_string(), v.to_string()))
            .collect();
        move |key| vars.get(key).cloned()
    }

    #[test]
    fn test_from_lookup_reads_overrides() {
        let config = Config::from_lookup(lookup_from(&[
            ("PORT", "8081"),
            ("LOG_FORMAT", "json"),
            ("DATABASE_URL", ""),
            ("OUTBOX_POLL_INTERVAL_MS", "40"),
            ("OUTBOX_BATCH_SIZE", "not-a-number"),
        ]))
        .unwrap();

        assert_eq!(config.port, 8081);
        assert_eq!(config.log_format, LogFormat::Json);
        assert!(config.database_url.is_none());
        assert_eq!(config.outbox_poll_interval, Duration::from_millis(40));
        assert_eq!(config.outbox_batch_size, 100);
    }

    #[test]
    fn test_zero_relay_settings_are_rejected() {
        for key in [
            "OUTBOX_POLL_INTERVAL_MS",
            "OUTBOX_BATCH_SIZE",
            "OUTBOX_MAX_ATTEMPTS",
        ] {
            let result = Config::from_lookup(lookup_from(&[(key, "0")]));
            assert_eq!(result.unwrap_err(), ConfigError::Zero { key });
        }

        let config = Config::from_lookup(lookup_from(&[("EVENT_MAX_REDELIVERIES", "0")])).unwrap();
        assert_eq!(config.event_max_redeliveries, 0);
    }

    #[test]
    fn test_log_format_parsing() {
        assert_eq!(LogFormat::parse("json"), LogFormat::Json);
        assert_eq!(LogFormat::parse("JSON"), LogFormat::Json);
        assert_eq!(LogFormat::parse("pretty"), LogFormat::Pretty);
        assert_eq!(LogFormat::parse("anything"), LogFormat::Pretty);
    }
}
