//! Client Configuration
//!
//! Read from `CHESS_*` environment variables, falling back to defaults.

use std::time::Duration;

use thiserror::Error;

use crate::core::backoff::BackoffConfig;
use crate::game::state::LocalPlayer;
use crate::network::recorder::RetryPolicy;

/// Default relay endpoint.
pub const DEFAULT_SERVER_URL: &str = "ws://localhost:8080/ws";
/// Default profile service endpoint.
pub const DEFAULT_PROFILE_URL: &str = "http://localhost:8080";
/// Default connect timeout.
pub const DEFAULT_CONNECT_TIMEOUT: Duration = Duration::from_secs(10);
/// Default delay between outcome recording attempts.
pub const DEFAULT_RECORD_RETRY: Duration = Duration::from_secs(3);
/// Default outcome recording attempts.
pub const DEFAULT_RECORD_ATTEMPTS: u32 = 5;

/// Configuration errors.
#[derive(Debug, Error, PartialEq, Eq)]
pub enum ConfigError {
    /// Variable set but not a valid number.
    #[error("{var} must be a non-negative integer, got {value:?}")]
    InvalidNumber {
        /// Variable name.
        var: &'static str,
        /// Raw value.
        value: String,
    },
    /// Variable set to a value outside its allowed range.
    #[error("{var} is out of range: {reason}")]
    OutOfRange {
        /// Variable name.
        var: &'static str,
        /// What is wrong.
        reason: &'static str,
    },
}

/// Client configuration.
#[derive(Debug, Clone, PartialEq, Eq)]
pub struct ClientConfig {
    /// Relay websocket URL.
    pub server_url: String,
    /// Profile service base URL (match history).
    pub profile_url: String,
    /// Local user id.
    pub user_id: String,
    /// Local display name.
    pub username: String,
    /// Session cookie for the profile service, if any.
    pub auth_token: Option<String>,
    /// Reconnect backoff.
    pub reconnect: BackoffConfig,
    /// Timeout for a single connect attempt.
    pub connect_timeout: Duration,
    /// Outcome recording retries.
    pub recording: RetryPolicy,
}

impl Default for ClientConfig {
    fn default() -> Self {
        Self {
            server_url: DEFAULT_SERVER_URL.to_string(),
            profile_url: DEFAULT_PROFILE_URL.to_string(),
            user_id: "guest".to_string(),
            username: "Guest".to_string(),
            auth_token: None,
            reconnect: BackoffConfig::default(),
            connect_timeout: DEFAULT_CONNECT_TIMEOUT,
            recording: RetryPolicy {
                delay: DEFAULT_RECORD_RETRY,
                max_attempts: DEFAULT_RECORD_ATTEMPTS,
            },
        }
    }
}

impl ClientConfig {
    /// Create config from environment variables.
    pub fn from_env() -> Result<Self, ConfigError> {
        Self::from_lookup(|key| std::env::var(key).ok())
    }

    /// Create config from an arbitrary variable source.
    pub fn from_lookup<F>(lookup: F) -> Result<Self, ConfigError>
    where
        F: Fn(&str) -> Option<String>,
    {
        let defaults = Self::default();
        let millis = |var: &'static str, default: Duration| -> Result<Duration, ConfigError> {
            Ok(parse_u64(var, lookup(var))?.map(Duration::from_millis).unwrap_or(default))
        };
        let count = |var: &'static str, default: u32| -> Result<u32, ConfigError> {
            match parse_u64(var, lookup(var))? {
                Some(n) => u32::try_from(n).map_err(|_| ConfigError::OutOfRange {
                    var,
                    reason: "too large",
                }),
                None => Ok(default),
            }
        };

        let config = Self {
            server_url: lookup("CHESS_SERVER_URL").unwrap_or(defaults.server_url),
            profile_url: lookup("CHESS_PROFILE_URL")
                .map(|url| url.trim_end_matches('/').to_string())
                .unwrap_or(defaults.profile_url),
            user_id: lookup("CHESS_USER_ID").unwrap_or(defaults.user_id),
            username: lookup("CHESS_USERNAME").unwrap_or(defaults.username),
            auth_token: lookup("CHESS_AUTH_TOKEN").filter(|t| !t.is_empty()),
            reconnect: BackoffConfig {
                base_delay: millis("CHESS_RECONNECT_BASE_MS", defaults.reconnect.base_delay)?,
                max_delay: millis("CHESS_RECONNECT_MAX_MS", defaults.reconnect.max_delay)?,
                max_attempts: count("CHESS_RECONNECT_ATTEMPTS", defaults.reconnect.max_attempts)?,
            },
            connect_timeout: millis("CHESS_CONNECT_TIMEOUT_MS", defaults.connect_timeout)?,
            recording: RetryPolicy {
                delay: millis("CHESS_RECORD_RETRY_MS", defaults.recording.delay)?,
                max_attempts: count("CHESS_RECORD_ATTEMPTS", defaults.recording.max_attempts)?,
            },
        };
        config.validate()?;
        Ok(config)
    }

    /// Check cross-field constraints.
    pub fn validate(&self) -> Result<(), ConfigError> {
        if self.reconnect.base_delay > self.reconnect.max_delay {
            return Err(ConfigError::OutOfRange {
                var: "CHESS_RECONNECT_BASE_MS",
                reason: "base delay exceeds max delay",
            });
        }
        if self.recording.max_attempts == 0 {
            return Err(ConfigError::OutOfRange {
                var: "CHESS_RECORD_ATTEMPTS",
                reason: "at least one attempt is required",
            });
        }
        Ok(())
    }

    /// Local identity for the session machine.
    pub fn local_player(&self) -> LocalPlayer {
        LocalPlayer::new(self.user_id.clone(), self.username.clone())
    }
}

fn parse_u64(var: &'static str, raw: Option<String>) -> Result<Option<u64>, ConfigError> {
    match raw {
        None => Ok(None),
        Some(value) => value
            .trim()
            .parse::<u64>()
            .map(Some)
            .map_err(|_| ConfigError::InvalidNumber { var, value }),
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use std::collections::HashMap;

    fn lookup(vars: &[(&str, &str)]) -> impl Fn(&str) -> Option<String> {
        let map: HashMap<String, String> = vars
            .iter()
            .map(|(k, v)| (k.to_string(), v.to_string()))
            .collect();
        move |key| map.get(key).cloned()
    }

    #[test]
    fn test_defaults_when_unset() {
        let config = ClientConfig::from_lookup(lookup(&[])).unwrap();
        assert_eq!(config, ClientConfig::default());
        assert_eq!(config.reconnect.base_delay, Duration::from_secs(1));
        assert_eq!(config.reconnect.max_delay, Duration::from_secs(30));
        assert_eq!(config.reconnect.max_attempts, 5);
        assert_eq!(config.recording.delay, Duration::from_secs(3));
    }

    #[test]
    fn test_overrides() {
        let config = ClientConfig::from_lookup(lookup(&[
            ("CHESS_SERVER_URL", "wss://relay.example/ws"),
            ("CHESS_PROFILE_URL", "https://profile.example/"),
            ("CHESS_USER_ID", "u-1"),
            ("CHESS_USERNAME", "alice"),
            ("CHESS_AUTH_TOKEN", "abc"),
            ("CHESS_RECONNECT_BASE_MS", "500"),
            ("CHESS_RECONNECT_ATTEMPTS", "8"),
            ("CHESS_RECORD_ATTEMPTS", "2"),
        ]))
        .unwrap();
        assert_eq!(config.server_url, "wss://relay.example/ws");
        assert_eq!(config.profile_url, "https://profile.example");
        assert_eq!(config.local_player(), LocalPlayer::new("u-1", "alice"));
        assert_eq!(config.auth_token.as_deref(), Some("abc"));
        assert_eq!(config.reconnect.base_delay, Duration::from_millis(500));
        assert_eq!(config.reconnect.max_attempts, 8);
        assert_eq!(config.recording.max_attempts, 2);
    }

    #[test]
    fn test_invalid_number() {
        let err = ClientConfig::from_lookup(lookup(&[("CHESS_RECONNECT_MAX_MS", "soon")])).unwrap_err();
        assert_eq!(
            err,
            ConfigError::InvalidNumber { var: "CHESS_RECONNECT_MAX_MS", value: "soon".into() }
        );
    }

    #[test]
    fn test_base_above_max_rejected() {
        let err = ClientConfig::from_lookup(lookup(&[
            ("CHESS_RECONNECT_BASE_MS", "60000"),
            ("CHESS_RECONNECT_MAX_MS", "1000"),
        ]))
        .unwrap_err();
        assert!(matches!(err, ConfigError::OutOfRange { var: "CHESS_RECONNECT_BASE_MS", .. }));
    }
}
