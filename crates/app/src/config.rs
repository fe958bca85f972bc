//! Runtime configuration from the process environment.

use std::time::Duration;

use thiserror::Error;
use tracing::warn;

use checkin_building::AllowList;
use checkin_infra::DEFAULT_MAX_REENTRANCY_DEPTH;
use checkin_observability::LogFormat;

pub const AUTHORIZED_USERS_VAR: &str = "CHECKIN_AUTHORIZED_USERS";
pub const MAX_REENTRANCY_DEPTH_VAR: &str = "CHECKIN_MAX_REENTRANCY_DEPTH";
pub const MAX_DELIVERY_ATTEMPTS_VAR: &str = "CHECKIN_MAX_DELIVERY_ATTEMPTS";
pub const CONSUMER_POLL_MS_VAR: &str = "CHECKIN_CONSUMER_POLL_MS";
pub const LOG_FORMAT_VAR: &str = "CHECKIN_LOG_FORMAT";

const DEFAULT_AUTHORIZED_USERS: [&str; 3] = ["fritz", "franz", "otto"];

/// Upper bound for `CHECKIN_CONSUMER_POLL_MS`.
pub const MAX_CONSUMER_POLL_MS: u64 = 60_000;

#[derive(Debug, Clone, PartialEq, Eq, Error)]
pub enum ConfigError {
    #[error("{var}={value:?} is invalid: {reason}")]
    Invalid {
        var: &'static str,
        value: String,
        reason: String,
    },
}

impl ConfigError {
    fn invalid(var: &'static str, value: &str, reason: impl ToString) -> Self {
        ConfigError::Invalid {
            var,
            value: value.to_string(),
            reason: reason.to_string(),
        }
    }
}

#[derive(Debug, Clone, PartialEq, Eq)]
pub struct AppConfig {
    pub authorized_users: Vec<String>,
    pub max_reentrancy_depth: usize,
    pub max_delivery_attempts: u32,
    pub consumer_poll_interval: Duration,
    pub log_format: LogFormat,
}

impl Default for AppConfig {
    fn default() -> Self {
        Self {
            authorized_users: DEFAULT_AUTHORIZED_USERS.iter().map(|u| u.to_string()).collect(),
            max_reentrancy_depth: DEFAULT_MAX_REENTRANCY_DEPTH,
            max_delivery_attempts: 5,
            consumer_poll_interval: Duration::from_millis(100),
            log_format: LogFormat::Json,
        }
    }
}

impl AppConfig {
    /// Read `CHECKIN_*` variables, falling back to defaults for unset ones.
    pub fn from_env() -> Result<Self, ConfigError> {
        Self::from_lookup(|var| std::env::var(var).ok())
    }

    /// Same as [`AppConfig::from_env`] with an explicit variable source.
    pub fn from_lookup(lookup: impl Fn(&str) -> Option<String>) -> Result<Self, ConfigError> {
        let mut config = Self::default();

        match lookup(AUTHORIZED_USERS_VAR) {
            Some(raw) => {
                let users: Vec<String> = raw
                    .split(',')
                    .map(str::trim)
                    .filter(|u| !u.is_empty())
                    .map(str::to_string)
                    .collect();
                if users.is_empty() {
                    return Err(ConfigError::invalid(
                        AUTHORIZED_USERS_VAR,
                        &raw,
                        "at least one username is required",
                    ));
                }
                config.authorized_users = users;
            }
            None => {
                warn!(
                    "{AUTHORIZED_USERS_VAR} not set; using default allow list {}",
                    DEFAULT_AUTHORIZED_USERS.join(",")
                );
            }
        }

        if let Some(raw) = lookup(MAX_REENTRANCY_DEPTH_VAR) {
            config.max_reentrancy_depth = raw
                .trim()
                .parse()
                .map_err(|e| ConfigError::invalid(MAX_REENTRANCY_DEPTH_VAR, &raw, e))?;
        }

        if let Some(raw) = lookup(MAX_DELIVERY_ATTEMPTS_VAR) {
            let attempts: u32 = raw
                .trim()
                .parse()
                .map_err(|e| ConfigError::invalid(MAX_DELIVERY_ATTEMPTS_VAR, &raw, e))?;
            if attempts == 0 {
                return Err(ConfigError::invalid(
                    MAX_DELIVERY_ATTEMPTS_VAR,
                    &raw,
                    "must be at least 1",
                ));
            }
            config.max_delivery_attempts = attempts;
        }

        if let Some(raw) = lookup(CONSUMER_POLL_MS_VAR) {
            let millis: u64 = raw
                .trim()
                .parse()
                .map_err(|e| ConfigError::invalid(CONSUMER_POLL_MS_VAR, &raw, e))?;
            if !(1..=MAX_CONSUMER_POLL_MS).contains(&millis) {
                return Err(ConfigError::invalid(
                    CONSUMER_POLL_MS_VAR,
                    &raw,
                    format!("must be between 1 and {MAX_CONSUMER_POLL_MS}"),
                ));
            }
            config.consumer_poll_interval = Duration::from_millis(millis);
        }

        if let Some(raw) = lookup(LOG_FORMAT_VAR) {
            config.log_format = raw
                .parse()
                .map_err(|e| ConfigError::invalid(LOG_FORMAT_VAR, &raw, e))?;
        }

        Ok(config)
    }

    pub fn allow_list(&self) -> AllowList {
        AllowList::new(self.authorized_users.iter().cloned())
    }
}
