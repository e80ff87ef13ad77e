//! Run configuration assembled from environment-style key/value pairs.

use std::collections::BTreeMap;
use std::path::Path;
use std::str::FromStr;
use std::time::Duration;

use serde::Serialize;

use crate::connection::{ConnectionSettings, Engine, RedactedConnection};
use crate::error::{Error, Result};
use crate::session::{SessionSetting, parse_session_tuning};

pub const DEFAULT_BATCH_SIZE: usize = 1000;
pub const DEFAULT_TOTAL_EMPLOYEES: u64 = 10_000;
pub const DEFAULT_MAX_CONNECTION_RETRIES: u32 = 5;
pub const DEFAULT_RETRY_DELAY_SECS: u64 = 2;
pub const DEFAULT_MAX_BATCH_RECONNECTS: u32 = 3;
pub const DEFAULT_STATS_REFRESH_PROBABILITY: f64 = 0.1;
pub const DEFAULT_LOG_LEVEL: &str = "info";

/// Effective settings for one load run.
#[derive(Debug, Clone)]
pub struct LoadConfig {
    pub connection: ConnectionSettings,
    pub batch_size: usize,
    pub total_employees: u64,
    pub max_connection_retries: u32,
    pub retry_delay: Duration,
    pub max_batch_reconnects: u32,
    pub seed: Option<u64>,
    pub skip_if_populated: bool,
    pub stats_refresh_probability: f64,
    pub session_tuning: Vec<SessionSetting>,
    /// `tracing` filter directive for console output.
    pub log_level: String,
}

impl LoadConfig {
    /// Build a config from the process environment, layered over an optional
    /// `.env` file. Process variables win over file entries.
    pub fn from_env(env_file: Option<&Path>) -> Result<Self> {
        let mut vars = match env_file {
            Some(path) => load_env_file(path)?,
            None => BTreeMap::new(),
        };
        vars.extend(std::env::vars());
        Self::from_vars(&vars)
    }

    pub fn from_vars(vars: &BTreeMap<String, String>) -> Result<Self> {
        let engine = match lookup(vars, "DB_ENGINE") {
            Some(value) => Engine::parse(value)?,
            None => Engine::Postgres,
        };
        let port = match lookup(vars, "DB_PORT") {
            Some(value) => parse_number::<u16>("DB_PORT", value)?,
            None => engine.default_port(),
        };

        let connection = ConnectionSettings {
            engine,
            host: lookup(vars, "DB_HOST").unwrap_or("localhost").to_string(),
            port,
            user: required(vars, "DB_USER")?.to_string(),
            // Empty passwords are legitimate (trust auth), so only absence is an error.
            password: vars
                .get("DB_PASSWORD")
                .map(|value| value.trim().to_string())
                .ok_or_else(|| Error::Config("DB_PASSWORD is required".to_string()))?,
            database: required(vars, "DB_NAME")?.to_string(),
        };

        let batch_size = positive::<usize>(vars, "BATCH_SIZE", DEFAULT_BATCH_SIZE)?;
        let total_employees = positive::<u64>(vars, "TOTAL_EMPLOYEES", DEFAULT_TOTAL_EMPLOYEES)?;
        let max_connection_retries = positive::<u32>(
            vars,
            "MAX_CONNECTION_RETRIES",
            DEFAULT_MAX_CONNECTION_RETRIES,
        )?;
        let retry_delay = Duration::from_secs(match lookup(vars, "RETRY_DELAY_SECS") {
            Some(value) => parse_number::<u64>("RETRY_DELAY_SECS", value)?,
            None => DEFAULT_RETRY_DELAY_SECS,
        });
        let max_batch_reconnects = match lookup(vars, "MAX_BATCH_RECONNECTS") {
            Some(value) => parse_number::<u32>("MAX_BATCH_RECONNECTS", value)?,
            None => DEFAULT_MAX_BATCH_RECONNECTS,
        };
        let seed = lookup(vars, "SEED")
            .map(|value| parse_number::<u64>("SEED", value))
            .transpose()?;
        let skip_if_populated = match lookup(vars, "SKIP_IF_POPULATED") {
            Some(value) => parse_bool("SKIP_IF_POPULATED", value)?,
            None => false,
        };
        let stats_refresh_probability = match lookup(vars, "STATS_REFRESH_PROBABILITY") {
            Some(value) => {
                let probability = parse_number::<f64>("STATS_REFRESH_PROBABILITY", value)?;
                if !(0.0..=1.0).contains(&probability) {
                    return Err(Error::Config(format!(
                        "STATS_REFRESH_PROBABILITY must be within [0, 1] (got {probability})"
                    )));
                }
                probability
            }
            None => DEFAULT_STATS_REFRESH_PROBABILITY,
        };
        // Unlike the other keys, an empty SESSION_TUNING is meaningful: no tuning.
        let session_tuning = match vars.get("SESSION_TUNING") {
            Some(value) => parse_session_tuning(value)?,
            None => SessionSetting::bulk_load_defaults(),
        };
        let log_level = lookup(vars, "LOG_LEVEL")
            .unwrap_or(DEFAULT_LOG_LEVEL)
            .to_string();

        Ok(Self {
            connection,
            batch_size,
            total_employees,
            max_connection_retries,
            retry_delay,
            max_batch_reconnects,
            seed,
            skip_if_populated,
            stats_refresh_probability,
            session_tuning,
            log_level,
        })
    }

    /// Serializable view with the password removed.
    pub fn redacted(&self) -> RedactedConfig {
        RedactedConfig {
            connection: self.connection.redacted(),
            batch_size: self.batch_size,
            total_employees: self.total_employees,
            max_connection_retries: self.max_connection_retries,
            retry_delay_secs: self.retry_delay.as_secs(),
            max_batch_reconnects: self.max_batch_reconnects,
            seed: self.seed,
            skip_if_populated: self.skip_if_populated,
            stats_refresh_probability: self.stats_refresh_probability,
            session_tuning: self
                .session_tuning
                .iter()
                .map(ToString::to_string)
                .collect(),
            log_level: self.log_level.clone(),
        }
    }
}

/// Configuration as written to run artifacts.
#[derive(Debug, Clone, Serialize)]
pub struct RedactedConfig {
    pub connection: RedactedConnection,
    pub batch_size: usize,
    pub total_employees: u64,
    pub max_connection_retries: u32,
    pub retry_delay_secs: u64,
    pub max_batch_reconnects: u32,
    pub seed: Option<u64>,
    pub skip_if_populated: bool,
    pub stats_refresh_probability: f64,
    pub session_tuning: Vec<String>,
    pub log_level: String,
}

/// Read `KEY=VALUE` lines from a dotenv-style file.
///
/// Blank lines and `#` comments are skipped; surrounding quotes on values
/// are stripped.
pub fn load_env_file(path: &Path) -> Result<BTreeMap<String, String>> {
    let content = std::fs::read_to_string(path).map_err(|err| {
        Error::Config(format!("cannot read env file {}: {err}", path.display()))
    })?;
    let mut values = BTreeMap::new();
    for line in content.lines() {
        let line = line.trim();
        if line.is_empty() || line.starts_with('#') {
            continue;
        }
        let line = line.strip_prefix("export ").unwrap_or(line);
        let mut parts = line.splitn(2, '=');
        let key = parts.next().unwrap_or("").trim();
        let value = parts.next().unwrap_or("").trim();
        if key.is_empty() {
            continue;
        }
        values.insert(key.to_string(), unquote(value).to_string());
    }
    Ok(values)
}

fn unquote(value: &str) -> &str {
    for quote in ['"', '\''] {
        if let Some(inner) = value
            .strip_prefix(quote)
            .and_then(|rest| rest.strip_suffix(quote))
        {
            return inner;
        }
    }
    value
}

fn lookup<'a>(vars: &'a BTreeMap<String, String>, key: &str) -> Option<&'a str> {
    vars.get(key)
        .map(|value| value.trim())
        .filter(|value| !value.is_empty())
}

fn required<'a>(vars: &'a BTreeMap<String, String>, key: &str) -> Result<&'a str> {
    lookup(vars, key).ok_or_else(|| Error::Config(format!("{key} is required")))
}

fn parse_number<T: FromStr>(key: &str, value: &str) -> Result<T> {
    value
        .parse::<T>()
        .map_err(|_| Error::Config(format!("{key} must be a number (got '{value}')")))
}

fn positive<T>(vars: &BTreeMap<String, String>, key: &str, default: T) -> Result<T>
where
    T: FromStr + PartialEq + Default,
{
    match lookup(vars, key) {
        Some(value) => {
            let parsed = parse_number::<T>(key, value)?;
            if parsed == T::default() {
                return Err(Error::Config(format!("{key} must be greater than zero")));
            }
            Ok(parsed)
        }
        None => Ok(default),
    }
}

fn parse_bool(key: &str, value: &str) -> Result<bool> {
    match value.to_ascii_lowercase().as_str() {
        "1" | "true" | "yes" | "on" => Ok(true),
        "0" | "false" | "no" | "off" => Ok(false),
        _ => Err(Error::Config(format!("{key} expects a boolean (got '{value}')"))),
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    fn vars(pairs: &[(&str, &str)]) -> BTreeMap<String, String> {
        pairs
            .iter()
            .map(|(key, value)| (key.to_string(), value.to_string()))
            .collect()
    }

    fn minimal() -> Vec<(&'static str, &'static str)> {
        vec![
            ("DB_USER", "loader"),
            ("DB_PASSWORD", "secret"),
            ("DB_NAME", "employees"),
        ]
    }

    #[test]
    fn applies_defaults() {
        let config = LoadConfig::from_vars(&vars(&minimal())).expect("config");
        assert_eq!(config.connection.engine, Engine::Postgres);
        assert_eq!(config.connection.port, 5432);
        assert_eq!(config.connection.host, "localhost");
        assert_eq!(config.batch_size, DEFAULT_BATCH_SIZE);
        assert_eq!(config.total_employees, DEFAULT_TOTAL_EMPLOYEES);
        assert_eq!(config.retry_delay, Duration::from_secs(2));
        assert_eq!(config.session_tuning, SessionSetting::bulk_load_defaults());
        assert!(!config.skip_if_populated);
    }

    #[test]
    fn missing_required_keys_are_config_errors() {
        for missing in ["DB_USER", "DB_PASSWORD", "DB_NAME"] {
            let pairs: Vec<_> = minimal()
                .into_iter()
                .filter(|(key, _)| *key != missing)
                .collect();
            let err = LoadConfig::from_vars(&vars(&pairs)).expect_err("missing key");
            assert!(matches!(err, Error::Config(ref msg) if msg.contains(missing)));
        }
    }

    #[test]
    fn rejects_zero_batch_size_and_bad_numbers() {
        let mut pairs = minimal();
        pairs.push(("BATCH_SIZE", "0"));
        assert!(LoadConfig::from_vars(&vars(&pairs)).is_err());

        let mut pairs = minimal();
        pairs.push(("TOTAL_EMPLOYEES", "lots"));
        assert!(LoadConfig::from_vars(&vars(&pairs)).is_err());

        let mut pairs = minimal();
        pairs.push(("STATS_REFRESH_PROBABILITY", "1.5"));
        assert!(LoadConfig::from_vars(&vars(&pairs)).is_err());
    }

    #[test]
    fn empty_session_tuning_disables_tuning() {
        let mut pairs = minimal();
        pairs.push(("SESSION_TUNING", ""));
        pairs.push(("DB_ENGINE", "mysql"));
        let config = LoadConfig::from_vars(&vars(&pairs)).expect("config");
        assert!(config.session_tuning.is_empty());
        assert_eq!(config.connection.port, 3306);
    }

    #[test]
    fn redacted_config_hides_password() {
        let config = LoadConfig::from_vars(&vars(&minimal())).expect("config");
        let rendered = serde_json::to_string(&config.redacted()).expect("serialize");
        assert!(!rendered.contains("secret"));
        assert!(rendered.contains("durability-level=relaxed"));
    }
}
