//! Queue configuration.
//!
//! `QueueConfig` can be built from defaults, a JSON file, or `FERRY_*`
//! environment variables. Every source goes through `validate()`.

use std::collections::{BTreeMap, HashMap};
use std::env;
use std::fmt;
use std::path::Path;
use std::time::Duration;

use serde::{Deserialize, Serialize};
use thiserror::Error;

use crate::backoff::{BackoffPolicy, DEFAULT_MAX_RETRY_DELAY, DEFAULT_RETRY_INTERVALS_SECS};
use crate::models::OperationKind;
use crate::util::{is_http_url, normalize_text_option};

pub const DEFAULT_API_BASE_URL: &str = "http://localhost:3000";
pub const DEFAULT_MAX_ATTEMPTS: u32 = 5;
pub const DEFAULT_SYNC_INTERVAL_SECS: u64 = 30;
pub const DEFAULT_DISPATCH_TIMEOUT_SECS: u64 = 15;
pub const DEFAULT_IN_FLIGHT_GRACE_SECS: u64 = 60;
pub const DEFAULT_RETENTION_SECS: u64 = 24 * 60 * 60;

#[derive(Debug, Error)]
pub enum ConfigError {
    #[error("Invalid configuration: {0}")]
    Invalid(String),
    #[error("Failed to read config file: {0}")]
    Io(#[from] std::io::Error),
    #[error("Failed to parse config file: {0}")]
    Parse(#[from] serde_json::Error),
}

impl From<ConfigError> for crate::Error {
    fn from(error: ConfigError) -> Self {
        Self::Configuration(error.to_string())
    }
}

/// Tunables for the queue and its background loop.
#[derive(Clone, PartialEq, Eq, Serialize, Deserialize)]
#[serde(default, deny_unknown_fields)]
pub struct QueueConfig {
    /// Root of the remote API, without a trailing slash
    pub api_base_url: String,
    /// Bearer token attached to every request
    pub auth_token: Option<String>,
    pub max_attempts: u32,
    /// Delay after attempt 1, 2, ...; the last entry repeats
    pub retry_intervals_secs: Vec<u64>,
    pub max_retry_delay_secs: u64,
    pub sync_interval_secs: u64,
    pub enable_periodic_sync: bool,
    pub dispatch_timeout_secs: u64,
    /// How old an in-flight claim must be before startup recovers it
    pub in_flight_grace_secs: u64,
    /// How long terminal records are kept
    pub retention_secs: u64,
    pub priority_overrides: BTreeMap<OperationKind, i32>,
}

impl Default for QueueConfig {
    fn default() -> Self {
        Self {
            api_base_url: DEFAULT_API_BASE_URL.to_string(),
            auth_token: None,
            max_attempts: DEFAULT_MAX_ATTEMPTS,
            retry_intervals_secs: DEFAULT_RETRY_INTERVALS_SECS.to_vec(),
            max_retry_delay_secs: DEFAULT_MAX_RETRY_DELAY.as_secs(),
            sync_interval_secs: DEFAULT_SYNC_INTERVAL_SECS,
            enable_periodic_sync: true,
            dispatch_timeout_secs: DEFAULT_DISPATCH_TIMEOUT_SECS,
            in_flight_grace_secs: DEFAULT_IN_FLIGHT_GRACE_SECS,
            retention_secs: DEFAULT_RETENTION_SECS,
            priority_overrides: BTreeMap::new(),
        }
    }
}

impl fmt::Debug for QueueConfig {
    fn fmt(&self, formatter: &mut fmt::Formatter<'_>) -> fmt::Result {
        formatter
            .debug_struct("QueueConfig")
            .field("api_base_url", &self.api_base_url)
            .field("auth_token", &self.auth_token.as_ref().map(|_| "[REDACTED]"))
            .field("max_attempts", &self.max_attempts)
            .field("retry_intervals_secs", &self.retry_intervals_secs)
            .field("max_retry_delay_secs", &self.max_retry_delay_secs)
            .field("sync_interval_secs", &self.sync_interval_secs)
            .field("enable_periodic_sync", &self.enable_periodic_sync)
            .field("dispatch_timeout_secs", &self.dispatch_timeout_secs)
            .field("in_flight_grace_secs", &self.in_flight_grace_secs)
            .field("retention_secs", &self.retention_secs)
            .field("priority_overrides", &self.priority_overrides)
            .finish()
    }
}

impl QueueConfig {
    pub fn from_env() -> Result<Self, ConfigError> {
        let values: HashMap<String, String> = env::vars().collect();
        Self::from_lookup(|name| values.get(name).cloned())
    }

    /// Build from `FERRY_*` variables; unset values keep their defaults.
    pub fn from_lookup(lookup: impl Fn(&str) -> Option<String>) -> Result<Self, ConfigError> {
        let defaults = Self::default();

        let api_base_url = optional_trimmed(&lookup, "FERRY_API_BASE_URL")
            .map_or(defaults.api_base_url, |url| {
                url.trim_end_matches('/').to_string()
            });
        let auth_token = optional_trimmed(&lookup, "FERRY_AUTH_TOKEN");

        let retry_intervals_secs = match optional_trimmed(&lookup, "FERRY_RETRY_INTERVALS_SECS") {
            Some(raw) => parse_interval_list(&raw)?,
            None => defaults.retry_intervals_secs,
        };

        let config = Self {
            api_base_url,
            auth_token,
            max_attempts: parse_or(&lookup, "FERRY_MAX_ATTEMPTS", defaults.max_attempts)?,
            retry_intervals_secs,
            max_retry_delay_secs: parse_or(
                &lookup,
                "FERRY_MAX_RETRY_DELAY_SECS",
                defaults.max_retry_delay_secs,
            )?,
            sync_interval_secs: parse_or(
                &lookup,
                "FERRY_SYNC_INTERVAL_SECS",
                defaults.sync_interval_secs,
            )?,
            enable_periodic_sync: parse_or(
                &lookup,
                "FERRY_ENABLE_PERIODIC_SYNC",
                defaults.enable_periodic_sync,
            )?,
            dispatch_timeout_secs: parse_or(
                &lookup,
                "FERRY_DISPATCH_TIMEOUT_SECS",
                defaults.dispatch_timeout_secs,
            )?,
            in_flight_grace_secs: parse_or(
                &lookup,
                "FERRY_IN_FLIGHT_GRACE_SECS",
                defaults.in_flight_grace_secs,
            )?,
            retention_secs: parse_or(&lookup, "FERRY_RETENTION_SECS", defaults.retention_secs)?,
            priority_overrides: defaults.priority_overrides,
        };

        config.validate()?;
        Ok(config)
    }

    /// Read a JSON config file. Missing fields take their defaults.
    pub fn load(path: impl AsRef<Path>) -> Result<Self, ConfigError> {
        let contents = std::fs::read_to_string(path.as_ref())?;
        let mut config: Self = serde_json::from_str(&contents)?;
        config.api_base_url = config.api_base_url.trim().trim_end_matches('/').to_string();
        config.auth_token = normalize_text_option(config.auth_token);
        config.validate()?;
        Ok(config)
    }

    pub fn validate(&self) -> Result<(), ConfigError> {
        if !is_http_url(&self.api_base_url) {
            return Err(ConfigError::Invalid(
                "api_base_url must start with http:// or https://".to_string(),
            ));
        }
        if self.max_attempts == 0 {
            return Err(ConfigError::Invalid(
                "max_attempts must be at least 1".to_string(),
            ));
        }
        if self.retry_intervals_secs.is_empty() {
            return Err(ConfigError::Invalid(
                "retry_intervals_secs must not be empty".to_string(),
            ));
        }
        if self.max_retry_delay_secs == 0 {
            return Err(ConfigError::Invalid(
                "max_retry_delay_secs must be at least 1".to_string(),
            ));
        }
        if self.dispatch_timeout_secs == 0 {
            return Err(ConfigError::Invalid(
                "dispatch_timeout_secs must be at least 1".to_string(),
            ));
        }
        if self.enable_periodic_sync && self.sync_interval_secs == 0 {
            return Err(ConfigError::Invalid(
                "sync_interval_secs must be at least 1 when periodic sync is enabled".to_string(),
            ));
        }
        Ok(())
    }

    pub fn backoff_policy(&self) -> BackoffPolicy {
        BackoffPolicy::from_secs(&self.retry_intervals_secs, self.max_retry_delay_secs)
    }

    pub fn priority_for(&self, kind: OperationKind) -> i32 {
        self.priority_overrides
            .get(&kind)
            .copied()
            .unwrap_or_else(|| kind.default_priority())
    }

    pub const fn sync_interval(&self) -> Duration {
        Duration::from_secs(self.sync_interval_secs)
    }

    pub const fn dispatch_timeout(&self) -> Duration {
        Duration::from_secs(self.dispatch_timeout_secs)
    }

    pub const fn in_flight_grace(&self) -> Duration {
        Duration::from_secs(self.in_flight_grace_secs)
    }

    pub const fn retention(&self) -> Duration {
        Duration::from_secs(self.retention_secs)
    }
}

fn parse_or<V: std::str::FromStr>(
    lookup: impl Fn(&str) -> Option<String>,
    name: &'static str,
    default: V,
) -> Result<V, ConfigError> {
    match optional_trimmed(lookup, name) {
        Some(raw) => raw
            .parse()
            .map_err(|_| ConfigError::Invalid(format!("{name} has an invalid value: {raw}"))),
        None => Ok(default),
    }
}

fn parse_interval_list(raw: &str) -> Result<Vec<u64>, ConfigError> {
    raw.split(',')
        .map(str::trim)
        .filter(|part| !part.is_empty())
        .map(|part| {
            part.parse::<u64>().map_err(|_| {
                ConfigError::Invalid(format!(
                    "FERRY_RETRY_INTERVALS_SECS must be comma-separated integers, got '{part}'"
                ))
            })
        })
        .collect()
}

fn optional_trimmed(lookup: impl Fn(&str) -> Option<String>, name: &str) -> Option<String> {
    normalize_text_option(lookup(name))
}
