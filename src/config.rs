// src/config.rs
use std::{net::SocketAddr, str::FromStr, time::Duration};

use thiserror::Error;

use crate::services::gemini::DEFAULT_BASE_URL;

pub const DEFAULT_MODEL: &str = "gemini-2.0-flash";
pub const DEFAULT_BIND_ADDR: &str = "0.0.0.0:9090";

#[derive(Debug, Error)]
pub enum ConfigError {
    #[error("GEMINI_API_KEY environment variable not set")]
    MissingApiKey,

    #[error("invalid value for {key}: {value:?}")]
    Invalid { key: &'static str, value: String },
}

/// Registry tuning, separate from the rest so tests can build one directly.
#[derive(Clone, Debug)]
pub struct SessionSettings {
    pub model: String,
    pub ttl: Duration,
    pub max_sessions: usize,
}

impl Default for SessionSettings {
    fn default() -> Self {
        Self {
            model: DEFAULT_MODEL.to_string(),
            ttl: Duration::from_secs(3600),
            max_sessions: 10_000,
        }
    }
}

#[derive(Clone, Debug)]
pub struct Config {
    pub api_key: String,
    pub base_url: String,
    pub bind_addr: SocketAddr,
    pub sessions: SessionSettings,
    pub purge_interval: Duration,
    pub cors_permissive: bool,
}

impl Config {
    pub fn from_env() -> Result<Self, ConfigError> {
        Self::from_lookup(|key| std::env::var(key).ok())
    }

    pub fn from_lookup(lookup: impl Fn(&str) -> Option<String>) -> Result<Self, ConfigError> {
        let api_key = lookup("GEMINI_API_KEY")
            .filter(|k| !k.trim().is_empty())
            .ok_or(ConfigError::MissingApiKey)?;

        let defaults = SessionSettings::default();
        let model = lookup("GEMINI_MODEL")
            .filter(|m| !m.trim().is_empty())
            .unwrap_or(defaults.model);

        let ttl_secs: u64 = parse_or(&lookup, "SESSION_TTL_SECS", defaults.ttl.as_secs())?;
        let max_sessions: usize = parse_or(&lookup, "MAX_SESSIONS", defaults.max_sessions)?;
        let purge_secs: u64 = parse_or(&lookup, "SESSION_PURGE_INTERVAL_SECS", 60)?;
        for (key, value) in [
            ("SESSION_TTL_SECS", ttl_secs),
            ("MAX_SESSIONS", max_sessions as u64),
            ("SESSION_PURGE_INTERVAL_SECS", purge_secs),
        ] {
            if value == 0 {
                return Err(ConfigError::Invalid { key, value: "0".to_string() });
            }
        }

        Ok(Self {
            api_key,
            base_url: lookup("GEMINI_BASE_URL").unwrap_or_else(|| DEFAULT_BASE_URL.to_string()),
            bind_addr: parse_or(&lookup, "BIND_ADDR", SocketAddr::from(([0, 0, 0, 0], 9090)))?,
            sessions: SessionSettings {
                model,
                ttl: Duration::from_secs(ttl_secs),
                max_sessions,
            },
            purge_interval: Duration::from_secs(purge_secs),
            cors_permissive: parse_or(&lookup, "CORS_PERMISSIVE", true)?,
        })
    }
}

fn parse_or<T: FromStr>(
    lookup: &impl Fn(&str) -> Option<String>,
    key: &'static str,
    default: T,
) -> Result<T, ConfigError> {
    match lookup(key) {
        None => Ok(default),
        Some(raw) => raw
            .trim()
            .parse()
            .map_err(|_| ConfigError::Invalid { key, value: raw }),
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use std::collections::HashMap;

    fn config(vars: &[(&str, &str)]) -> Result<Config, ConfigError> {
        let map: HashMap<String, String> = vars
            .iter()
            .map(|(k, v)| (k.to_string(), v.to_string()))
            .collect();
        Config::from_lookup(|k| map.get(k).cloned())
    }

    #[test]
    fn api_key_is_required() {
        assert!(matches!(config(&[]), Err(ConfigError::MissingApiKey)));
        assert!(matches!(config(&[("GEMINI_API_KEY", " ")]), Err(ConfigError::MissingApiKey)));
    }

    #[test]
    fn defaults_apply() {
        let cfg = config(&[("GEMINI_API_KEY", "k")]).unwrap();
        assert_eq!(cfg.bind_addr.to_string(), DEFAULT_BIND_ADDR);
        assert_eq!(cfg.sessions.model, DEFAULT_MODEL);
        assert_eq!(cfg.base_url, DEFAULT_BASE_URL);
        assert!(cfg.cors_permissive);
    }

    #[test]
    fn overrides_and_bad_values() {
        let cfg = config(&[
            ("GEMINI_API_KEY", "k"),
            ("BIND_ADDR", "127.0.0.1:8080"),
            ("MAX_SESSIONS", "5"),
            ("CORS_PERMISSIVE", "false"),
        ])
        .unwrap();
        assert_eq!(cfg.bind_addr.port(), 8080);
        assert_eq!(cfg.sessions.max_sessions, 5);
        assert!(!cfg.cors_permissive);

        let err = config(&[("GEMINI_API_KEY", "k"), ("SESSION_TTL_SECS", "soon")]).unwrap_err();
        assert!(matches!(err, ConfigError::Invalid { key: "SESSION_TTL_SECS", .. }));
        let err = config(&[("GEMINI_API_KEY", "k"), ("MAX_SESSIONS", "0")]).unwrap_err();
        assert!(matches!(err, ConfigError::Invalid { key: "MAX_SESSIONS", .. }));
    }
}
