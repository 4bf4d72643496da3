//! Runtime configuration from environment variables
//!
//! Loaded once at startup. Anything invalid here is fatal: the process refuses
//! to start ingesting rather than running with a half-understood setup.
//!
//! Environment variables:
//! - `BTCFLOW_WS_URL` (default: wss://ws.blockchain.info/inv)
//! - `BTCFLOW_DB_PATH` (default: blockchain_data.db)
//! - `MONITORED_ADDRESSES` (comma-separated, default: none)
//! - `MAX_STORED_TRANSACTIONS` / `MAX_STORED_BLOCKS` / `MAX_STORED_ADDRESSES`
//! - `HIGH_VALUE_THRESHOLD_SATS` (default: 100000000, one whole coin)
//! - `DUPLICATE_POLICY` (`ignore` or `overwrite`, default: ignore)
//! - `SUBSCRIBE_UNCONFIRMED` / `SUBSCRIBE_BLOCKS` (default: true)
//! - `RECONNECT_BASE_MS` / `RECONNECT_MAX_MS` / `RECONNECT_JITTER` / `RECONNECT_STABLE_SECS`
//! - `HEARTBEAT_TIMEOUT_SECS` / `PING_INTERVAL_SECS` / `HANDSHAKE_TIMEOUT_SECS`
//! - `RUST_LOG` (default: info)
//! - `LOG_FILE` (optional, log lines also appended there)

use bitcoin::Network;
use std::env;
use std::str::FromStr;
use std::time::Duration;

/// Satoshis in one whole coin
pub const SATS_PER_BTC: u64 = 100_000_000;

#[derive(Debug)]
pub enum ConfigError {
    InvalidValue(String),
    InvalidAddress(String),
}

impl std::fmt::Display for ConfigError {
    fn fmt(&self, f: &mut std::fmt::Formatter<'_>) -> std::fmt::Result {
        match self {
            ConfigError::InvalidValue(msg) => write!(f, "Invalid configuration value: {}", msg),
            ConfigError::InvalidAddress(addr) => write!(f, "Malformed bitcoin address: {}", addr),
        }
    }
}

impl std::error::Error for ConfigError {}

/// What to do when a transaction or block hash is observed a second time
#[derive(Debug, Clone, Copy, PartialEq, Eq, Default)]
pub enum DuplicatePolicy {
    /// Keep the first stored copy (INSERT OR IGNORE)
    #[default]
    Ignore,
    /// Replace the stored fields with the latest observation, keeping its
    /// original insertion position
    Overwrite,
}

impl FromStr for DuplicatePolicy {
    type Err = ConfigError;

    fn from_str(s: &str) -> Result<Self, Self::Err> {
        match s.trim().to_lowercase().as_str() {
            "ignore" => Ok(DuplicatePolicy::Ignore),
            "overwrite" => Ok(DuplicatePolicy::Overwrite),
            other => Err(ConfigError::InvalidValue(format!(
                "DUPLICATE_POLICY must be 'ignore' or 'overwrite', got '{}'",
                other
            ))),
        }
    }
}

/// Reconnect backoff parameters
#[derive(Debug, Clone, PartialEq)]
pub struct BackoffConfig {
    pub base_delay: Duration,
    pub max_delay: Duration,
    /// Fraction of each delay that may be randomly shaved off, in [0, 0.5)
    pub jitter: f64,
    /// A Subscribed period at least this long resets the backoff to base
    pub stability_period: Duration,
}

impl Default for BackoffConfig {
    fn default() -> Self {
        Self {
            base_delay: Duration::from_millis(1_000),
            max_delay: Duration::from_millis(60_000),
            jitter: 0.2,
            stability_period: Duration::from_secs(30),
        }
    }
}

/// Feed session parameters
#[derive(Debug, Clone)]
pub struct FeedConfig {
    pub ws_url: String,
    pub subscribe_unconfirmed: bool,
    pub subscribe_blocks: bool,
    pub backoff: BackoffConfig,
    pub heartbeat_timeout: Duration,
    pub ping_interval: Duration,
    pub handshake_timeout: Duration,
}

impl Default for FeedConfig {
    fn default() -> Self {
        Self {
            ws_url: "wss://ws.blockchain.info/inv".to_string(),
            subscribe_unconfirmed: true,
            subscribe_blocks: true,
            backoff: BackoffConfig::default(),
            heartbeat_timeout: Duration::from_secs(90),
            ping_interval: Duration::from_secs(30),
            handshake_timeout: Duration::from_secs(10),
        }
    }
}

/// Store sizing and duplicate handling
#[derive(Debug, Clone)]
pub struct RetentionConfig {
    pub db_path: String,
    pub max_transactions: usize,
    pub max_blocks: usize,
    pub max_addresses: usize,
    pub duplicate_policy: DuplicatePolicy,
}

impl Default for RetentionConfig {
    fn default() -> Self {
        Self {
            db_path: "blockchain_data.db".to_string(),
            max_transactions: 10_000,
            max_blocks: 1_000,
            max_addresses: 1_000,
            duplicate_policy: DuplicatePolicy::Ignore,
        }
    }
}

#[derive(Debug, Clone)]
pub struct RuntimeConfig {
    pub feed: FeedConfig,
    pub retention: RetentionConfig,
    pub monitored_addresses: Vec<String>,
    pub high_value_threshold: u64,
    pub rust_log: String,
    pub log_file: Option<String>,
}

impl RuntimeConfig {
    /// Load configuration from the process environment
    pub fn from_env() -> Result<Self, ConfigError> {
        Self::from_lookup(|key| env::var(key).ok())
    }

    /// Load configuration through an arbitrary key lookup
    pub fn from_lookup<F>(lookup: F) -> Result<Self, ConfigError>
    where
        F: Fn(&str) -> Option<String>,
    {
        let feed_defaults = FeedConfig::default();
        let backoff_defaults = BackoffConfig::default();
        let retention_defaults = RetentionConfig::default();

        let ws_url = lookup("BTCFLOW_WS_URL").unwrap_or(feed_defaults.ws_url);
        if !ws_url.starts_with("ws://") && !ws_url.starts_with("wss://") {
            return Err(ConfigError::InvalidValue(
                "BTCFLOW_WS_URL must start with ws:// or wss://".to_string(),
            ));
        }

        let backoff = BackoffConfig {
            base_delay: Duration::from_millis(parse_or(
                &lookup,
                "RECONNECT_BASE_MS",
                backoff_defaults.base_delay.as_millis() as u64,
            )?),
            max_delay: Duration::from_millis(parse_or(
                &lookup,
                "RECONNECT_MAX_MS",
                backoff_defaults.max_delay.as_millis() as u64,
            )?),
            jitter: parse_or(&lookup, "RECONNECT_JITTER", backoff_defaults.jitter)?,
            stability_period: Duration::from_secs(parse_or(
                &lookup,
                "RECONNECT_STABLE_SECS",
                backoff_defaults.stability_period.as_secs(),
            )?),
        };

        let feed = FeedConfig {
            ws_url,
            subscribe_unconfirmed: parse_or(&lookup, "SUBSCRIBE_UNCONFIRMED", true)?,
            subscribe_blocks: parse_or(&lookup, "SUBSCRIBE_BLOCKS", true)?,
            backoff,
            heartbeat_timeout: Duration::from_secs(parse_or(
                &lookup,
                "HEARTBEAT_TIMEOUT_SECS",
                feed_defaults.heartbeat_timeout.as_secs(),
            )?),
            ping_interval: Duration::from_secs(parse_or(
                &lookup,
                "PING_INTERVAL_SECS",
                feed_defaults.ping_interval.as_secs(),
            )?),
            handshake_timeout: Duration::from_secs(parse_or(
                &lookup,
                "HANDSHAKE_TIMEOUT_SECS",
                feed_defaults.handshake_timeout.as_secs(),
            )?),
        };

        let duplicate_policy = match lookup("DUPLICATE_POLICY") {
            Some(raw) => raw.parse::<DuplicatePolicy>()?,
            None => DuplicatePolicy::default(),
        };

        let retention = RetentionConfig {
            db_path: lookup("BTCFLOW_DB_PATH").unwrap_or(retention_defaults.db_path),
            max_transactions: parse_or(
                &lookup,
                "MAX_STORED_TRANSACTIONS",
                retention_defaults.max_transactions,
            )?,
            max_blocks: parse_or(&lookup, "MAX_STORED_BLOCKS", retention_defaults.max_blocks)?,
            max_addresses: parse_or(
                &lookup,
                "MAX_STORED_ADDRESSES",
                retention_defaults.max_addresses,
            )?,
            duplicate_policy,
        };

        // Optional monitored addresses (comma-separated list)
        let monitored_addresses: Vec<String> = lookup("MONITORED_ADDRESSES")
            .map(|s| {
                s.split(',')
                    .map(|addr| addr.trim().to_string())
                    .filter(|addr| !addr.is_empty())
                    .collect()
            })
            .unwrap_or_default();

        let config = Self {
            feed,
            retention,
            monitored_addresses,
            high_value_threshold: parse_or(&lookup, "HIGH_VALUE_THRESHOLD_SATS", SATS_PER_BTC)?,
            rust_log: lookup("RUST_LOG").unwrap_or_else(|| "info".to_string()),
            log_file: lookup("LOG_FILE")
                .map(|path| path.trim().to_string())
                .filter(|path| !path.is_empty()),
        };

        config.validate()?;
        Ok(config)
    }

    pub fn validate(&self) -> Result<(), ConfigError> {
        let retention = &self.retention;
        if retention.max_transactions == 0
            || retention.max_blocks == 0
            || retention.max_addresses == 0
        {
            return Err(ConfigError::InvalidValue(
                "retention caps must be greater than zero".to_string(),
            ));
        }

        if retention.db_path.trim().is_empty() {
            return Err(ConfigError::InvalidValue(
                "BTCFLOW_DB_PATH cannot be empty".to_string(),
            ));
        }

        let backoff = &self.feed.backoff;
        if backoff.base_delay.is_zero() || backoff.base_delay > backoff.max_delay {
            return Err(ConfigError::InvalidValue(format!(
                "reconnect delays must satisfy 0 < base ({:?}) <= max ({:?})",
                backoff.base_delay, backoff.max_delay
            )));
        }

        if !(0.0..0.5).contains(&backoff.jitter) {
            return Err(ConfigError::InvalidValue(format!(
                "RECONNECT_JITTER must be in [0, 0.5), got {}",
                backoff.jitter
            )));
        }

        if self.feed.heartbeat_timeout.is_zero() || self.feed.ping_interval.is_zero() {
            return Err(ConfigError::InvalidValue(
                "heartbeat timeout and ping interval must be non-zero".to_string(),
            ));
        }

        if !self.feed.subscribe_unconfirmed
            && !self.feed.subscribe_blocks
            && self.monitored_addresses.is_empty()
        {
            return Err(ConfigError::InvalidValue(
                "nothing to subscribe to: enable a stream or monitor an address".to_string(),
            ));
        }

        for address in &self.monitored_addresses {
            validate_address(address)?;
        }

        Ok(())
    }
}

fn parse_or<T, F>(lookup: &F, key: &str, default: T) -> Result<T, ConfigError>
where
    T: FromStr,
    F: Fn(&str) -> Option<String>,
{
    match lookup(key) {
        Some(raw) => raw.trim().to_lowercase().parse::<T>().map_err(|_| {
            ConfigError::InvalidValue(format!("{} has unparsable value '{}'", key, raw))
        }),
        None => Ok(default),
    }
}

/// Full parse of a mainnet address (base58check or bech32/bech32m),
/// checksum included
pub fn validate_address(address: &str) -> Result<(), ConfigError> {
    let invalid = || ConfigError::InvalidAddress(address.to_string());

    let unchecked = bitcoin::Address::from_str(address).map_err(|e| {
        log::debug!("Rejected address {}: {}", address, e);
        invalid()
    })?;
    unchecked
        .require_network(Network::Bitcoin)
        .map_err(|_| invalid())?;

    Ok(())
}

#[cfg(test)]
mod tests {
    use super::*;
    use std::collections::HashMap;

    fn lookup_from(pairs: &[(&str, &str)]) -> impl Fn(&str) -> Option<String> {
        let map: HashMap<String, String> = pairs
            .iter()
            .map(|(k, v)| (k.to_string(), v.to_string()))
            .collect();
        move |key| map.get(key).cloned()
    }

    #[test]
    fn test_default_config() {
        let config = RuntimeConfig::from_lookup(lookup_from(&[])).unwrap();

        assert_eq!(config.feed.ws_url, "wss://ws.blockchain.info/inv");
        assert_eq!(config.retention.db_path, "blockchain_data.db");
        assert_eq!(config.retention.max_transactions, 10_000);
        assert_eq!(config.retention.max_blocks, 1_000);
        assert_eq!(config.retention.duplicate_policy, DuplicatePolicy::Ignore);
        assert_eq!(config.high_value_threshold, SATS_PER_BTC);
        assert!(config.monitored_addresses.is_empty());
        assert_eq!(config.feed.backoff, BackoffConfig::default());
        assert_eq!(config.log_file, None);
    }

    #[test]
    fn test_log_file_optional() {
        let config =
            RuntimeConfig::from_lookup(lookup_from(&[("LOG_FILE", " btcflow.log ")])).unwrap();
        assert_eq!(config.log_file.as_deref(), Some("btcflow.log"));

        let blank = RuntimeConfig::from_lookup(lookup_from(&[("LOG_FILE", "  ")])).unwrap();
        assert_eq!(blank.log_file, None);
    }

    #[test]
    fn test_custom_config() {
        let config = RuntimeConfig::from_lookup(lookup_from(&[
            ("BTCFLOW_DB_PATH", "/tmp/test.db"),
            ("MAX_STORED_TRANSACTIONS", "500"),
            ("DUPLICATE_POLICY", "Overwrite"),
            ("RECONNECT_BASE_MS", "250"),
            ("RECONNECT_JITTER", "0"),
            (
                "MONITORED_ADDRESSES",
                "1A1zP1eP5QGefi2DMPTfTL5SLmv7DivfNa, bc1qar0srrr7xfkvy5l643lydnw9re59gtzzwf5mdq,",
            ),
        ]))
        .unwrap();

        assert_eq!(config.retention.db_path, "/tmp/test.db");
        assert_eq!(config.retention.max_transactions, 500);
        assert_eq!(config.retention.duplicate_policy, DuplicatePolicy::Overwrite);
        assert_eq!(config.feed.backoff.base_delay, Duration::from_millis(250));
        assert_eq!(config.feed.backoff.jitter, 0.0);
        assert_eq!(config.monitored_addresses.len(), 2);
    }

    #[test]
    fn test_zero_cap_rejected() {
        let result = RuntimeConfig::from_lookup(lookup_from(&[("MAX_STORED_BLOCKS", "0")]));
        assert!(matches!(result, Err(ConfigError::InvalidValue(_))));
    }

    #[test]
    fn test_unparsable_number_rejected() {
        let result =
            RuntimeConfig::from_lookup(lookup_from(&[("MAX_STORED_TRANSACTIONS", "lots")]));
        assert!(matches!(result, Err(ConfigError::InvalidValue(_))));
    }

    #[test]
    fn test_backoff_bounds_rejected() {
        let inverted = RuntimeConfig::from_lookup(lookup_from(&[
            ("RECONNECT_BASE_MS", "5000"),
            ("RECONNECT_MAX_MS", "1000"),
        ]));
        assert!(inverted.is_err());

        let jittery = RuntimeConfig::from_lookup(lookup_from(&[("RECONNECT_JITTER", "0.5")]));
        assert!(jittery.is_err());
    }

    #[test]
    fn test_malformed_address_rejected() {
        let result = RuntimeConfig::from_lookup(lookup_from(&[(
            "MONITORED_ADDRESSES",
            "1A1zP1eP5QGefi2DMPTfTL5SLmv7DivfNa,not-an-address",
        )]));
        assert!(matches!(result, Err(ConfigError::InvalidAddress(a)) if a == "not-an-address"));
    }

    #[test]
    fn test_address_parsing() {
        assert!(validate_address("1A1zP1eP5QGefi2DMPTfTL5SLmv7DivfNa").is_ok());
        assert!(validate_address("3J98t1WpEZ73CNmQviecrnyiWrnqRhWNLy").is_ok());
        assert!(validate_address("bc1qar0srrr7xfkvy5l643lydnw9re59gtzzwf5mdq").is_ok());
        // '0' and 'O' are not base58
        assert!(validate_address("1A1zP1eP5QGefi2DMPTfTL5SLmv7Div0Oa").is_err());
        assert!(validate_address("bc1qAr0srrr7xfkvy5l643lydnw9re59gtzzwf5mdq").is_err());
        assert!(validate_address("").is_err());
    }

    #[test]
    fn test_bad_checksum_rejected() {
        // Last character changed on otherwise well-formed addresses
        assert!(validate_address("1A1zP1eP5QGefi2DMPTfTL5SLmv7DivfNb").is_err());
        assert!(validate_address("bc1qar0srrr7xfkvy5l643lydnw9re59gtzzwf5mdp").is_err());

        let result = RuntimeConfig::from_lookup(lookup_from(&[(
            "MONITORED_ADDRESSES",
            "1A1zP1eP5QGefi2DMPTfTL5SLmv7DivfNb",
        )]));
        assert!(matches!(result, Err(ConfigError::InvalidAddress(_))));
    }

    #[test]
    fn test_testnet_address_rejected() {
        assert!(validate_address("tb1qw508d6qejxtdg4y5r3zarvary0c5xw7kxpjzsx").is_err());
        assert!(validate_address("mipcBbFg9gMiCh81Kj8tqqdgoZub1ZJRfn").is_err());
    }

    #[test]
    fn test_duplicate_policy_parse() {
        assert_eq!("ignore".parse::<DuplicatePolicy>().unwrap(), DuplicatePolicy::Ignore);
        assert_eq!(" OVERWRITE ".parse::<DuplicatePolicy>().unwrap(), DuplicatePolicy::Overwrite);
        assert!("replace".parse::<DuplicatePolicy>().is_err());
    }
}
