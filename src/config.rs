use std::env;
use std::time::Duration;
use thiserror::Error;
use uuid::Uuid;

use crate::rate::DEFAULT_WINDOW_MS;

pub const DEFAULT_COOLDOWN_MS: u64 = 150;

#[derive(Debug, Error, PartialEq, Eq)]
pub enum ConfigError {
    #[error("{name} must be a positive integer, got {value:?}")]
    InvalidNumber { name: &'static str, value: String },
}

/// Knobs of one poll-viewing session.
#[derive(Debug, Clone)]
pub struct SessionConfig {
    /// Trailing window of the momentum estimate, in milliseconds.
    pub rate_window_ms: i64,
    /// How long the vote lock stays held after a submission settles.
    pub cooldown: Duration,
    /// Stable identity of the local voter.
    pub voter_id: String,
}

impl Default for SessionConfig {
    fn default() -> Self {
        Self {
            rate_window_ms: DEFAULT_WINDOW_MS,
            cooldown: Duration::from_millis(DEFAULT_COOLDOWN_MS),
            voter_id: Uuid::new_v4().to_string(),
        }
    }
}

#[derive(Debug, Clone)]
pub struct AppConfig {
    pub database_url: String,
    pub session: SessionConfig,
    pub demo_duration: Duration,
    pub expiry_check: Duration,
}

impl AppConfig {
    /// Reads the process environment. Call `dotenvy::dotenv()` first to honour a `.env` file.
    pub fn from_env() -> Result<Self, ConfigError> {
        Self::from_lookup(|name| env::var(name).ok())
    }

    fn from_lookup(lookup: impl Fn(&str) -> Option<String>) -> Result<Self, ConfigError> {
        let number = |name: &'static str, default: u64| -> Result<u64, ConfigError> {
            match lookup(name) {
                None => Ok(default),
                Some(value) => match value.trim().parse::<u64>() {
                    Ok(parsed) if parsed > 0 => Ok(parsed),
                    _ => Err(ConfigError::InvalidNumber { name, value }),
                },
            }
        };

        let rate_window_ms = number("RATE_WINDOW_MS", DEFAULT_WINDOW_MS as u64)?;
        let cooldown_ms = number("VOTE_COOLDOWN_MS", DEFAULT_COOLDOWN_MS)?;
        let demo_secs = number("DEMO_DURATION_SECS", 20)?;
        let expiry_check_ms = number("EXPIRY_CHECK_MS", 1000)?;

        let voter_id = lookup("VOTER_ID")
            .filter(|id| !id.trim().is_empty())
            .unwrap_or_else(|| Uuid::new_v4().to_string());

        Ok(Self {
            database_url: lookup("DATABASE_URL")
                .unwrap_or_else(|| "sqlite:versus_momentum.db".to_string()),
            session: SessionConfig {
                rate_window_ms: i64::try_from(rate_window_ms).unwrap_or(DEFAULT_WINDOW_MS),
                cooldown: Duration::from_millis(cooldown_ms),
                voter_id,
            },
            demo_duration: Duration::from_secs(demo_secs),
            expiry_check: Duration::from_millis(expiry_check_ms),
        })
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use std::collections::HashMap;

    fn lookup(vars: &[(&str, &str)]) -> impl Fn(&str) -> Option<String> {
        let vars: HashMap<String, String> = vars
            .iter()
            .map(|(k, v)| (k.to_string(), v.to_string()))
            .collect();
        move |name: &str| vars.get(name).cloned()
    }

    #[test]
    fn defaults_apply_when_unset() {
        let config = AppConfig::from_lookup(lookup(&[])).unwrap();
        assert_eq!(config.database_url, "sqlite:versus_momentum.db");
        assert_eq!(config.session.rate_window_ms, 5000);
        assert_eq!(config.session.cooldown, Duration::from_millis(150));
        assert_eq!(config.demo_duration, Duration::from_secs(20));
        assert!(!config.session.voter_id.is_empty());
    }

    #[test]
    fn overrides_are_read() {
        let config = AppConfig::from_lookup(lookup(&[
            ("DATABASE_URL", "sqlite::memory:"),
            ("RATE_WINDOW_MS", "10000"),
            ("VOTE_COOLDOWN_MS", "300"),
            ("VOTER_ID", "voter-7"),
        ]))
        .unwrap();
        assert_eq!(config.database_url, "sqlite::memory:");
        assert_eq!(config.session.rate_window_ms, 10_000);
        assert_eq!(config.session.cooldown, Duration::from_millis(300));
        assert_eq!(config.session.voter_id, "voter-7");
    }

    #[test]
    fn malformed_numbers_are_rejected() {
        let err = AppConfig::from_lookup(lookup(&[("RATE_WINDOW_MS", "soon")])).unwrap_err();
        assert_eq!(
            err,
            ConfigError::InvalidNumber { name: "RATE_WINDOW_MS", value: "soon".into() }
        );
        assert!(AppConfig::from_lookup(lookup(&[("VOTE_COOLDOWN_MS", "0")])).is_err());
    }
}
