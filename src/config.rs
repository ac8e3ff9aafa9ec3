//! Service configuration
//!
//! Settings come from the environment (optionally seeded from `.env`).

use std::time::Duration;
use thiserror::Error;

const DEFAULT_PORT: u16 = 8083;
const DEFAULT_TIMEOUT_SECS: u64 = 30;
const DEFAULT_SESSION_TTL_SECS: u64 = 1800;

#[derive(Error, Debug, PartialEq, Eq)]
pub enum ConfigError {
    #[error("missing required setting {0}")]
    Missing(&'static str),

    #[error("invalid value for {key}: {value}")]
    Invalid { key: &'static str, value: String },
}

#[derive(Debug, Clone, PartialEq, Eq)]
pub struct Config {
    pub api_url: String,
    pub api_token: Option<String>,
    pub seller_id: Option<String>,
    pub request_timeout: Duration,
    pub port: u16,
    pub nats_url: Option<String>,
    /// Builder sessions untouched for this long are dropped.
    pub session_ttl: Duration,
}

impl Config {
    /// Reads settings from the process environment (call `dotenvy::dotenv()` first to honour `.env`).
    pub fn from_env() -> Result<Self, ConfigError> {
        Self::from_lookup(|key| std::env::var(key).ok())
    }

    pub fn from_lookup(lookup: impl Fn(&str) -> Option<String>) -> Result<Self, ConfigError> {
        let get = |key: &str| lookup(key).map(|v| v.trim().to_string()).filter(|v| !v.is_empty());

        let api_url = get("GOSELLER_API_URL").ok_or(ConfigError::Missing("GOSELLER_API_URL"))?;
        let request_timeout = match get("GOSELLER_REQUEST_TIMEOUT_SECS") {
            Some(v) => Duration::from_secs(parse(&v, "GOSELLER_REQUEST_TIMEOUT_SECS")?),
            None => Duration::from_secs(DEFAULT_TIMEOUT_SECS),
        };
        let session_ttl = match get("GOSELLER_SESSION_TTL_SECS") {
            Some(v) => Duration::from_secs(parse(&v, "GOSELLER_SESSION_TTL_SECS")?),
            None => Duration::from_secs(DEFAULT_SESSION_TTL_SECS),
        };
        let port = match get("PORT") {
            Some(v) => parse(&v, "PORT")?,
            None => DEFAULT_PORT,
        };

        Ok(Self {
            api_url,
            api_token: get("GOSELLER_API_TOKEN"),
            seller_id: get("GOSELLER_SELLER_ID"),
            request_timeout,
            port,
            nats_url: get("NATS_URL"),
            session_ttl,
        })
    }
}

fn parse<T: std::str::FromStr>(value: &str, key: &'static str) -> Result<T, ConfigError> {
    value.parse().map_err(|_| ConfigError::Invalid { key, value: value.to_string() })
}

#[cfg(test)]
mod tests {
    use super::*;
    use std::collections::HashMap;

    fn lookup(pairs: &[(&str, &str)]) -> impl Fn(&str) -> Option<String> {
        let map: HashMap<String, String> = pairs.iter().map(|(k, v)| (k.to_string(), v.to_string())).collect();
        move |key| map.get(key).cloned()
    }

    #[test]
    fn test_defaults() {
        let cfg = Config::from_lookup(lookup(&[("GOSELLER_API_URL", "https://api.goseller.pk/api")])).unwrap();
        assert_eq!(cfg.port, 8083);
        assert_eq!(cfg.request_timeout, Duration::from_secs(30));
        assert_eq!(cfg.seller_id, None);
        assert_eq!(cfg.nats_url, None);
        assert_eq!(cfg.session_ttl, Duration::from_secs(1800));
    }

    #[test]
    fn test_missing_api_url() {
        let err = Config::from_lookup(lookup(&[("GOSELLER_API_URL", "  ")])).unwrap_err();
        assert_eq!(err, ConfigError::Missing("GOSELLER_API_URL"));
    }

    #[test]
    fn test_invalid_port() {
        let err = Config::from_lookup(lookup(&[("GOSELLER_API_URL", "http://x"), ("PORT", "eighty")])).unwrap_err();
        assert!(matches!(err, ConfigError::Invalid { key: "PORT", .. }));
    }

    #[test]
    fn test_full() {
        let cfg = Config::from_lookup(lookup(&[
            ("GOSELLER_API_URL", "http://x"), ("GOSELLER_API_TOKEN", "tok"), ("GOSELLER_SELLER_ID", "s-1"),
            ("GOSELLER_REQUEST_TIMEOUT_SECS", "5"), ("PORT", "9000"), ("NATS_URL", "nats://localhost:4222"),
            ("GOSELLER_SESSION_TTL_SECS", "600"),
        ])).unwrap();
        assert_eq!(cfg.session_ttl, Duration::from_secs(600));
        assert_eq!(cfg.request_timeout, Duration::from_secs(5));
        assert_eq!(cfg.port, 9000);
        assert_eq!(cfg.api_token.as_deref(), Some("tok"));
        assert_eq!(cfg.nats_url.as_deref(), Some("nats://localhost:4222"));
    }
}
