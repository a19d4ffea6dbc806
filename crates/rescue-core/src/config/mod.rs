//! Runtime configuration for the queue, sync engine, and remote handlers.
//!
//! Values are read from `RESCUE_*` environment variables. Every variable is
//! optional; unset values fall back to the defaults below.

use std::env;
use std::time::Duration;

use serde::{Deserialize, Serialize};

use crate::error::{Error, Result};
use crate::util::{is_http_url, normalize_text_option};

pub const ENV_API_BASE_URL: &str = "RESCUE_API_BASE_URL";
pub const ENV_API_TOKEN: &str = "RESCUE_API_TOKEN";
pub const ENV_REACHABILITY_URL: &str = "RESCUE_REACHABILITY_URL";
pub const ENV_SYNC_INTERVAL_SECS: &str = "RESCUE_SYNC_INTERVAL_SECS";
pub const ENV_MAX_RETRIES: &str = "RESCUE_MAX_RETRIES";
pub const ENV_LEASE_TTL_SECS: &str = "RESCUE_LEASE_TTL_SECS";
pub const ENV_MAX_ATTACHMENT_BYTES: &str = "RESCUE_MAX_ATTACHMENT_BYTES";
pub const ENV_REACHABILITY_TIMEOUT_MS: &str = "RESCUE_REACHABILITY_TIMEOUT_MS";

pub const DEFAULT_SYNC_INTERVAL_SECS: u64 = 30;
pub const DEFAULT_MAX_RETRIES: u32 = 3;
pub const DEFAULT_LEASE_TTL_SECS: u64 = 120;
pub const DEFAULT_MAX_ATTACHMENT_BYTES: usize = 10 * 1024 * 1024;
/// Upper bound for a reachability probe.
pub const MAX_REACHABILITY_TIMEOUT_MS: u64 = 500;

/// Queue and sync engine settings.
#[derive(Debug, Clone, PartialEq, Eq, Serialize, Deserialize)]
#[serde(default)]
pub struct QueueConfig {
    /// Base URL of the REST API requests are replayed against.
    pub api_base_url: Option<String>,
    /// Bearer token attached to replayed requests.
    #[serde(skip_serializing)]
    pub api_token: Option<String>,
    /// URL probed by the reachability check.
    pub reachability_url: Option<String>,
    pub sync_interval_secs: u64,
    /// Failed attempts after which a request is parked as failed.
    pub max_retries: u32,
    pub lease_ttl_secs: u64,
    /// Largest inline attachment that will be uploaded.
    pub max_attachment_bytes: usize,
    pub reachability_timeout_ms: u64,
}

impl Default for QueueConfig {
    fn default() -> Self {
        Self {
            api_base_url: None,
            api_token: None,
            reachability_url: None,
            sync_interval_secs: DEFAULT_SYNC_INTERVAL_SECS,
            max_retries: DEFAULT_MAX_RETRIES,
            lease_ttl_secs: DEFAULT_LEASE_TTL_SECS,
            max_attachment_bytes: DEFAULT_MAX_ATTACHMENT_BYTES,
            reachability_timeout_ms: MAX_REACHABILITY_TIMEOUT_MS,
        }
    }
}

impl QueueConfig {
    /// Load configuration from environment variables.
    pub fn from_env() -> Result<Self> {
        parse_config(|key| env::var(key).ok())
    }

    /// Drain interval, at least one second.
    #[must_use]
    pub fn sync_interval(&self) -> Duration {
        Duration::from_secs(self.sync_interval_secs.max(1))
    }

    /// Probe timeout, never longer than [`MAX_REACHABILITY_TIMEOUT_MS`].
    #[must_use]
    pub fn reachability_timeout(&self) -> Duration {
        Duration::from_millis(
            self.reachability_timeout_ms
                .clamp(1, MAX_REACHABILITY_TIMEOUT_MS),
        )
    }

    #[must_use]
    pub fn lease_ttl_ms(&self) -> i64 {
        i64::try_from(self.lease_ttl_secs.saturating_mul(1000)).unwrap_or(i64::MAX)
    }

    /// Probe URL, falling back to the API base URL.
    #[must_use]
    pub fn reachability_target(&self) -> Option<&str> {
        self.reachability_url
            .as_deref()
            .or(self.api_base_url.as_deref())
    }
}

/// Parse configuration through an arbitrary variable lookup.
pub fn parse_config(lookup: impl Fn(&str) -> Option<String>) -> Result<QueueConfig> {
    let defaults = QueueConfig::default();

    let api_base_url = parse_url(&lookup, ENV_API_BASE_URL)?;
    let reachability_url = parse_url(&lookup, ENV_REACHABILITY_URL)?;
    let api_token = normalize_text_option(lookup(ENV_API_TOKEN));

    let sync_interval_secs =
        parse_number(&lookup, ENV_SYNC_INTERVAL_SECS)?.unwrap_or(defaults.sync_interval_secs);
    if sync_interval_secs == 0 {
        return Err(Error::InvalidInput(format!(
            "{ENV_SYNC_INTERVAL_SECS} must be greater than zero"
        )));
    }

    let max_retries = parse_number(&lookup, ENV_MAX_RETRIES)?.unwrap_or(defaults.max_retries);
    if max_retries == 0 {
        return Err(Error::InvalidInput(format!(
            "{ENV_MAX_RETRIES} must be greater than zero"
        )));
    }

    let lease_ttl_secs =
        parse_number(&lookup, ENV_LEASE_TTL_SECS)?.unwrap_or(defaults.lease_ttl_secs);
    let max_attachment_bytes =
        parse_number(&lookup, ENV_MAX_ATTACHMENT_BYTES)?.unwrap_or(defaults.max_attachment_bytes);

    let reachability_timeout_ms = parse_number::<u64>(&lookup, ENV_REACHABILITY_TIMEOUT_MS)?
        .map_or(defaults.reachability_timeout_ms, |value| {
            value.clamp(1, MAX_REACHABILITY_TIMEOUT_MS)
        });

    Ok(QueueConfig {
        api_base_url,
        api_token,
        reachability_url,
        sync_interval_secs,
        max_retries,
        lease_ttl_secs,
        max_attachment_bytes,
        reachability_timeout_ms,
    })
}

fn parse_url(lookup: &impl Fn(&str) -> Option<String>, key: &str) -> Result<Option<String>> {
    let Some(value) = normalize_text_option(lookup(key)) else {
        return Ok(None);
    };
    if !is_http_url(&value) {
        return Err(Error::InvalidInput(format!(
            "{key} must start with http:// or https://"
        )));
    }
    Ok(Some(value.trim_end_matches('/').to_string()))
}

fn parse_number<T: std::str::FromStr>(
    lookup: &impl Fn(&str) -> Option<String>,
    key: &str,
) -> Result<Option<T>> {
    let Some(value) = normalize_text_option(lookup(key)) else {
        return Ok(None);
    };
    value
        .parse::<T>()
        .map(Some)
        .map_err(|_| Error::InvalidInput(format!("{key} must be a non-negative integer, got '{value}'")))
}

#[cfg(test)]
mod tests {
    use std::collections::HashMap;

    use pretty_assertions::assert_eq;

    use super::*;

    fn parse_from_map(map: &HashMap<&str, &str>) -> Result<QueueConfig> {
        parse_config(|key| map.get(key).map(|value| (*value).to_string()))
    }

    #[test]
    fn empty_environment_yields_defaults() {
        let config = parse_from_map(&HashMap::new()).unwrap();
        assert_eq!(config, QueueConfig::default());
        assert_eq!(config.max_retries, 3);
        assert_eq!(config.sync_interval(), Duration::from_secs(30));
        assert_eq!(config.max_attachment_bytes, 10 * 1024 * 1024);
    }

    #[test]
    fn zero_interval_from_deserialized_config_is_clamped() {
        let config: QueueConfig =
            serde_json::from_str(r#"{ "sync_interval_secs": 0 }"#).unwrap();
        assert_eq!(config.sync_interval_secs, 0);
        assert_eq!(config.sync_interval(), Duration::from_secs(1));
    }

    #[test]
    fn urls_are_trimmed_and_validated() {
        let mut map = HashMap::new();
        map.insert(ENV_API_BASE_URL, " https://api.example.org/v1/ ");
        let config = parse_from_map(&map).unwrap();
        assert_eq!(
            config.api_base_url.as_deref(),
            Some("https://api.example.org/v1")
        );
        assert_eq!(
            config.reachability_target(),
            Some("https://api.example.org/v1")
        );

        map.insert(ENV_REACHABILITY_URL, "api.example.org/health");
        let err = parse_from_map(&map).unwrap_err();
        match err {
            Error::InvalidInput(message) => assert!(message.contains(ENV_REACHABILITY_URL)),
            other => panic!("unexpected error: {other:?}"),
        }
    }

    #[test]
    fn numeric_values_are_parsed() {
        let mut map = HashMap::new();
        map.insert(ENV_SYNC_INTERVAL_SECS, "5");
        map.insert(ENV_MAX_RETRIES, "7");
        map.insert(ENV_LEASE_TTL_SECS, "60");
        map.insert(ENV_MAX_ATTACHMENT_BYTES, "1024");

        let config = parse_from_map(&map).unwrap();
        assert_eq!(config.sync_interval_secs, 5);
        assert_eq!(config.max_retries, 7);
        assert_eq!(config.lease_ttl_ms(), 60_000);
        assert_eq!(config.max_attachment_bytes, 1024);
    }

    #[test]
    fn invalid_numbers_are_rejected() {
        let mut map = HashMap::new();
        map.insert(ENV_MAX_RETRIES, "three");
        let err = parse_from_map(&map).unwrap_err();
        match err {
            Error::InvalidInput(message) => assert!(message.contains(ENV_MAX_RETRIES)),
            other => panic!("unexpected error: {other:?}"),
        }

        let mut map = HashMap::new();
        map.insert(ENV_SYNC_INTERVAL_SECS, "0");
        assert!(parse_from_map(&map).is_err());
    }

    #[test]
    fn reachability_timeout_is_clamped() {
        let mut map = HashMap::new();
        map.insert(ENV_REACHABILITY_TIMEOUT_MS, "5000");
        let config = parse_from_map(&map).unwrap();
        assert_eq!(config.reachability_timeout_ms, 500);
        assert_eq!(config.reachability_timeout(), Duration::from_millis(500));

        map.insert(ENV_REACHABILITY_TIMEOUT_MS, "250");
        let config = parse_from_map(&map).unwrap();
        assert_eq!(config.reachability_timeout(), Duration::from_millis(250));
    }

    #[test]
    fn api_token_is_not_serialized() {
        let config = QueueConfig {
            api_token: Some("secret".to_string()),
            ..QueueConfig::default()
        };
        let json = serde_json::to_string(&config).unwrap();
        assert!(!json.contains("secret"));
    }
}
