// src/config.rs

use price_service::DEFAULT_BASE_URL;
use std::env;
use std::net::SocketAddr;
use std::str::FromStr;
use std::time::Duration;
use thiserror::Error;

pub const DEFAULT_LISTEN_ADDR: &str = "127.0.0.1:8080";
pub const DEFAULT_FETCH_TIMEOUT_SECS: u64 = 30;

#[derive(Debug, Error, PartialEq)]
pub enum ConfigError {
    #[error("{name} has an invalid value '{value}': {reason}")]
    Invalid {
        name: &'static str,
        value: String,
        reason: String,
    },
}

#[derive(Debug, Clone, PartialEq)]
pub struct Config {
    pub listen_addr: SocketAddr,
    pub yahoo_base_url: String,
    pub fetch_timeout: Duration,
    pub adjusted_close: bool,
    pub risk_free_rate: f64,
}

impl Default for Config {
    fn default() -> Self {
        Config {
            listen_addr: SocketAddr::from(([127, 0, 0, 1], 8080)),
            yahoo_base_url: DEFAULT_BASE_URL.to_string(),
            fetch_timeout: Duration::from_secs(DEFAULT_FETCH_TIMEOUT_SECS),
            adjusted_close: true,
            risk_free_rate: 0.0,
        }
    }
}

impl Config {
    /// Reads `PO_*` variables, after loading a `.env` file if one exists.
    pub fn from_env() -> Result<Self, ConfigError> {
        dotenvy::dotenv().ok();
        Config::from_lookup(|name| env::var(name).ok())
    }

    pub fn from_lookup<F>(lookup: F) -> Result<Self, ConfigError>
    where
        F: Fn(&str) -> Option<String>,
    {
        let listen_addr = parse(&lookup, "PO_LISTEN_ADDR", DEFAULT_LISTEN_ADDR)?;
        let yahoo_base_url = lookup("PO_YAHOO_BASE_URL")
            .map(|url| url.trim_end_matches('/').to_string())
            .unwrap_or_else(|| DEFAULT_BASE_URL.to_string());
        let timeout_secs: u64 = parse(&lookup, "PO_FETCH_TIMEOUT_SECS", "30")?;
        if timeout_secs == 0 {
            return Err(invalid("PO_FETCH_TIMEOUT_SECS", "0", "must be at least 1"));
        }
        let adjusted_close = parse(&lookup, "PO_ADJUSTED_CLOSE", "true")?;
        let risk_free_rate: f64 = parse(&lookup, "PO_RISK_FREE_RATE", "0.0")?;
        if !risk_free_rate.is_finite() {
            return Err(invalid(
                "PO_RISK_FREE_RATE",
                &risk_free_rate.to_string(),
                "must be finite",
            ));
        }

        Ok(Config {
            listen_addr,
            yahoo_base_url,
            fetch_timeout: Duration::from_secs(timeout_secs),
            adjusted_close,
            risk_free_rate,
        })
    }
}

fn parse<T, F>(lookup: &F, name: &'static str, default: &str) -> Result<T, ConfigError>
where
    T: FromStr,
    T::Err: std::fmt::Display,
    F: Fn(&str) -> Option<String>,
{
    let value = lookup(name).unwrap_or_else(|| default.to_string());
    value
        .trim()
        .parse()
        .map_err(|e: T::Err| invalid(name, &value, &e.to_string()))
}

fn invalid(name: &'static str, value: &str, reason: &str) -> ConfigError {
    ConfigError::Invalid {
        name,
        value: value.to_string(),
        reason: reason.to_string(),
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use std::collections::HashMap;

    fn config(vars: &[(&str, &str)]) -> Result<Config, ConfigError> {
        let vars: HashMap<String, String> = vars
            .iter()
            .map(|(k, v)| (k.to_string(), v.to_string()))
            .collect();
        Config::from_lookup(|name| vars.get(name).cloned())
    }

    #[test]
    fn test_defaults() {
        assert_eq!(config(&[]).unwrap(), Config::default());
    }

    #[test]
    fn test_overrides() {
        let config = config(&[
            ("PO_LISTEN_ADDR", "0.0.0.0:9000"),
            ("PO_YAHOO_BASE_URL", "http://localhost:1234/"),
            ("PO_FETCH_TIMEOUT_SECS", "5"),
            ("PO_ADJUSTED_CLOSE", "false"),
            ("PO_RISK_FREE_RATE", "0.02"),
        ])
        .unwrap();

        assert_eq!(config.listen_addr.port(), 9000);
        assert_eq!(config.yahoo_base_url, "http://localhost:1234");
        assert_eq!(config.fetch_timeout, Duration::from_secs(5));
        assert!(!config.adjusted_close);
        assert_eq!(config.risk_free_rate, 0.02);
    }

    #[test]
    fn test_invalid_values() {
        assert!(matches!(
            config(&[("PO_LISTEN_ADDR", "localhost")]),
            Err(ConfigError::Invalid { name: "PO_LISTEN_ADDR", .. })
        ));
        assert!(config(&[("PO_FETCH_TIMEOUT_SECS", "0")]).is_err());
        assert!(config(&[("PO_ADJUSTED_CLOSE", "yes")]).is_err());
        assert!(config(&[("PO_RISK_FREE_RATE", "inf")]).is_err());
    }
}
