//! Hub Configuration Settings
//!
//! Configuration types for the hub, loaded from environment variables.

use std::str::FromStr;
use std::time::Duration;

use rust_decimal::Decimal;

use crate::application::services::ProducerSettings;
use crate::domain::snapshot::{AccountParameters, SnapshotError};

/// HTTP listener settings.
#[derive(Debug, Clone, PartialEq, Eq)]
pub struct ServerSettings {
    /// Listen port for WebSocket and health endpoints.
    pub port: u16,
    /// Path accepting WebSocket upgrades.
    pub ws_path: String,
    /// Read a client identifier as the first inbound message.
    pub identify_clients: bool,
}

impl Default for ServerSettings {
    fn default() -> Self {
        Self {
            port: 8080,
            ws_path: "/ws".to_string(),
            identify_clients: true,
        }
    }
}

/// Snapshot producer settings.
#[derive(Debug, Clone, Copy, PartialEq)]
pub struct ProducerConfig {
    /// Time between snapshots.
    pub interval: Duration,
    /// Largest relative price move per tick (0.005 = ±0.5%).
    pub max_relative_delta: f64,
    /// Carry each new price into the next tick.
    pub random_walk: bool,
}

impl Default for ProducerConfig {
    fn default() -> Self {
        Self {
            interval: Duration::from_secs(1),
            max_relative_delta: 0.005,
            random_walk: false,
        }
    }
}

impl From<ProducerConfig> for ProducerSettings {
    fn from(config: ProducerConfig) -> Self {
        Self {
            interval: config.interval,
            random_walk: config.random_walk,
        }
    }
}

/// Complete hub configuration.
#[derive(Debug, Clone, Default, PartialEq)]
pub struct HubConfig {
    /// HTTP listener settings.
    pub server: ServerSettings,
    /// Snapshot producer settings.
    pub producer: ProducerConfig,
    /// Simulated account.
    pub account: AccountParameters,
}

impl HubConfig {
    /// Create configuration from environment variables.
    ///
    /// # Errors
    ///
    /// Returns an error if an account parameter is set but is not a
    /// decimal, if the WebSocket path is empty or relative, or if the
    /// account cannot be valued at the largest allowed price move.
    pub fn from_env() -> Result<Self, ConfigError> {
        Self::from_lookup(|key| std::env::var(key).ok())
    }

    /// Create configuration from an arbitrary key lookup.
    ///
    /// # Errors
    ///
    /// Same as [`HubConfig::from_env`].
    pub fn from_lookup(lookup: impl Fn(&str) -> Option<String>) -> Result<Self, ConfigError> {
        let defaults = Self::default();

        let ws_path = lookup("HUB_WS_PATH").unwrap_or(defaults.server.ws_path);
        if ws_path.is_empty() {
            return Err(ConfigError::EmptyValue("HUB_WS_PATH".to_string()));
        }
        if !ws_path.starts_with('/') {
            return Err(ConfigError::InvalidValue {
                key: "HUB_WS_PATH".to_string(),
                value: ws_path,
            });
        }

        let server = ServerSettings {
            port: parse_or(&lookup, "HUB_PORT", defaults.server.port),
            ws_path,
            identify_clients: parse_bool_or(
                &lookup,
                "HUB_IDENTIFY_CLIENTS",
                defaults.server.identify_clients,
            ),
        };

        let producer = ProducerConfig {
            interval: lookup("PRODUCER_INTERVAL_MS")
                .and_then(|v| v.parse::<u64>().ok())
                .filter(|ms| *ms > 0)
                .map_or(defaults.producer.interval, Duration::from_millis),
            max_relative_delta: lookup("PRODUCER_MAX_RELATIVE_DELTA")
                .and_then(|v| v.parse::<f64>().ok())
                .filter(|d| d.is_finite() && *d >= 0.0)
                .unwrap_or(defaults.producer.max_relative_delta),
            random_walk: parse_bool_or(
                &lookup,
                "PRODUCER_RANDOM_WALK",
                defaults.producer.random_walk,
            ),
        };

        let account = AccountParameters {
            balance: parse_decimal(&lookup, "ACCOUNT_BALANCE", defaults.account.balance)?,
            position_size: parse_decimal(
                &lookup,
                "ACCOUNT_POSITION_SIZE",
                defaults.account.position_size,
            )?,
            baseline_price: parse_decimal(
                &lookup,
                "ACCOUNT_BASELINE_PRICE",
                defaults.account.baseline_price,
            )?,
            lock_price: parse_decimal(&lookup, "ACCOUNT_LOCK_PRICE", defaults.account.lock_price)?,
        };

        let max_delta = Decimal::try_from(producer.max_relative_delta).map_err(|_| {
            ConfigError::InvalidValue {
                key: "PRODUCER_MAX_RELATIVE_DELTA".to_string(),
                value: producer.max_relative_delta.to_string(),
            }
        })?;
        account.check_range(max_delta)?;

        Ok(Self {
            server,
            producer,
            account,
        })
    }
}

/// Configuration error.
#[derive(Debug, thiserror::Error, PartialEq, Eq)]
pub enum ConfigError {
    /// Environment variable has empty value.
    #[error("environment variable {0} cannot be empty")]
    EmptyValue(String),
    /// Environment variable could not be parsed.
    #[error("environment variable {key} has invalid value {value:?}")]
    InvalidValue {
        /// Variable name.
        key: String,
        /// Raw value.
        value: String,
    },
    /// Account parameters overflow at the largest allowed price move.
    #[error("account parameters out of range: {0}")]
    AccountOutOfRange(#[from] SnapshotError),
}

fn parse_or<T: FromStr>(lookup: &impl Fn(&str) -> Option<String>, key: &str, default: T) -> T {
    lookup(key)
        .and_then(|v| v.trim().parse().ok())
        .unwrap_or(default)
}

fn parse_bool_or(lookup: &impl Fn(&str) -> Option<String>, key: &str, default: bool) -> bool {
    lookup(key).map_or(default, |v| match v.trim().to_lowercase().as_str() {
        "1" | "true" | "yes" | "on" => true,
        "0" | "false" | "no" | "off" => false,
        _ => default,
    })
}

fn parse_decimal(
    lookup: &impl Fn(&str) -> Option<String>,
    key: &str,
    default: Decimal,
) -> Result<Decimal, ConfigError> {
    match lookup(key) {
        None => Ok(default),
        Some(raw) => Decimal::from_str(raw.trim()).map_err(|_| ConfigError::InvalidValue {
            key: key.to_string(),
            value: raw,
        }),
    }
}
