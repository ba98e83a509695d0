//! Environment-driven configuration.

use std::time::Duration;

use thiserror::Error;

use stockroom_inventory::DatePolicy;

use crate::ledger::LedgerSettings;

#[derive(Debug, Error)]
pub enum ConfigError {
    #[error("invalid value for {var}: {reason}")]
    Invalid { var: &'static str, reason: String },
}

#[derive(Debug, Clone, PartialEq, Eq)]
pub struct LedgerConfig {
    /// Postgres connection string. Unset means the in-memory store.
    pub database_url: Option<String>,
    pub bind_addr: String,
    pub date_policy: DatePolicy,
    pub lock_timeout: Duration,
    pub db_max_connections: u32,
    pub outbox_poll_interval: Duration,
    pub outbox_batch_size: usize,
    pub low_stock_alerts: bool,
}

impl Default for LedgerConfig {
    fn default() -> Self {
        Self {
            database_url: None,
            bind_addr: "0.0.0.0:8080".to_string(),
            date_policy: DatePolicy::Lenient,
            lock_timeout: Duration::from_millis(5_000),
            db_max_connections: 10,
            outbox_poll_interval: Duration::from_millis(500),
            outbox_batch_size: 100,
            low_stock_alerts: true,
        }
    }
}

impl LedgerConfig {
    pub fn from_env() -> Result<Self, ConfigError> {
        Self::from_lookup(|key| std::env::var(key).ok())
    }

    /// Build from any key/value source; unset or blank keys keep their defaults.
    pub fn from_lookup(lookup: impl Fn(&str) -> Option<String>) -> Result<Self, ConfigError> {
        let get = |key: &str| lookup(key).filter(|v| !v.trim().is_empty());
        let defaults = Self::default();

        Ok(Self {
            database_url: get("DATABASE_URL"),
            bind_addr: get("BIND_ADDR").unwrap_or(defaults.bind_addr),
            date_policy: match get("DATE_POLICY") {
                Some(raw) => raw.parse().map_err(|e| ConfigError::Invalid {
                    var: "DATE_POLICY",
                    reason: format!("{e}"),
                })?,
                None => defaults.date_policy,
            },
            lock_timeout: parse_millis(get("LOCK_TIMEOUT_MS"), "LOCK_TIMEOUT_MS")?
                .unwrap_or(defaults.lock_timeout),
            db_max_connections: parse_num(get("DB_MAX_CONNECTIONS"), "DB_MAX_CONNECTIONS")?
                .unwrap_or(defaults.db_max_connections),
            outbox_poll_interval: parse_millis(get("OUTBOX_POLL_MS"), "OUTBOX_POLL_MS")?
                .unwrap_or(defaults.outbox_poll_interval),
            outbox_batch_size: parse_num(get("OUTBOX_BATCH_SIZE"), "OUTBOX_BATCH_SIZE")?
                .unwrap_or(defaults.outbox_batch_size),
            low_stock_alerts: parse_bool(get("LOW_STOCK_ALERTS"), "LOW_STOCK_ALERTS")?
                .unwrap_or(defaults.low_stock_alerts),
        })
    }

    pub fn ledger_settings(&self) -> LedgerSettings {
        LedgerSettings {
            date_policy: self.date_policy,
            low_stock_alerts: self.low_stock_alerts,
        }
    }
}

fn parse_num<T>(raw: Option<String>, var: &'static str) -> Result<Option<T>, ConfigError>
where
    T: std::str::FromStr + PartialOrd + Default,
    T::Err: std::fmt::Display,
{
    let Some(raw) = raw else { return Ok(None) };
    let value: T = raw.trim().parse().map_err(|e: T::Err| ConfigError::Invalid {
        var,
        reason: e.to_string(),
    })?;
    if value <= T::default() {
        return Err(ConfigError::Invalid {
            var,
            reason: "must be greater than zero".to_string(),
        });
    }
    Ok(Some(value))
}

fn parse_millis(raw: Option<String>, var: &'static str) -> Result<Option<Duration>, ConfigError> {
    Ok(parse_num::<u64>(raw, var)?.map(Duration::from_millis))
}

fn parse_bool(raw: Option<String>, var: &'static str) -> Result<Option<bool>, ConfigError> {
    let Some(raw) = raw else { return Ok(None) };
    match raw.trim().to_ascii_lowercase().as_str() {
        "1" | "true" | "yes" | "on" => Ok(Some(true)),
        "0" | "false" | "no" | "off" => Ok(Some(false)),
        other => Err(ConfigError::Invalid {
            var,
            reason: format!("expected a boolean, got '{other}'"),
        }),
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use std::collections::HashMap;

    fn load(pairs: &[(&str, &str)]) -> Result<LedgerConfig, ConfigError> {
        let vars: HashMap<String, String> = pairs
            .iter()
            .map(|(k, v)| (k.to_string(), v.to_string()))
            .collect();
        LedgerConfig::from_lookup(|key| vars.get(key).cloned())
    }

    #[test]
    fn empty_environment_uses_defaults() {
        assert_eq!(load(&[]).unwrap(), LedgerConfig::default());
    }

    #[test]
    fn values_are_read_from_the_environment() {
        let config = load(&[
            ("DATABASE_URL", "postgres://localhost/stockroom"),
            ("DATE_POLICY", "STRICT"),
            ("LOCK_TIMEOUT_MS", "250"),
            ("OUTBOX_BATCH_SIZE", "7"),
            ("LOW_STOCK_ALERTS", "off"),
        ])
        .unwrap();

        assert_eq!(
            config.database_url.as_deref(),
            Some("postgres://localhost/stockroom")
        );
        assert_eq!(config.date_policy, DatePolicy::Strict);
        assert_eq!(config.lock_timeout, Duration::from_millis(250));
        assert_eq!(config.outbox_batch_size, 7);
        assert!(!config.low_stock_alerts);
    }

    #[test]
    fn blank_values_fall_back_to_defaults() {
        let config = load(&[("BIND_ADDR", "  "), ("DATABASE_URL", "")]).unwrap();
        assert_eq!(config.bind_addr, "0.0.0.0:8080");
        assert!(config.database_url.is_none());
    }

    #[test]
    fn malformed_values_name_the_variable() {
        let err = load(&[("LOCK_TIMEOUT_MS", "soon")]).unwrap_err();
        assert!(err.to_string().contains("LOCK_TIMEOUT_MS"));

        let err = load(&[("DB_MAX_CONNECTIONS", "0")]).unwrap_err();
        assert!(err.to_string().contains("greater than zero"));

        assert!(load(&[("DATE_POLICY", "whenever")]).is_err());
    }
}
