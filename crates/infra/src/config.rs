//! Checkout configuration.
//!
//! Loaded from the environment with defaults; every field can also be set in
//! code (tests build configs directly).

use std::str::FromStr;
use std::time::Duration;

use rust_decimal::Decimal;
use thiserror::Error;

use dualmart_orders::OrderNumber;

use crate::retry::RetryPolicy;

pub const ENV_MAX_ATTEMPTS: &str = "CHECKOUT_MAX_ATTEMPTS";
pub const ENV_RETRY_BASE_DELAY_MS: &str = "CHECKOUT_RETRY_BASE_DELAY_MS";
pub const ENV_TX_TIMEOUT_MS: &str = "CHECKOUT_TX_TIMEOUT_MS";
pub const ENV_ORDER_ID_PREFIX: &str = "ORDER_ID_PREFIX";
pub const ENV_ORDER_ID_MAX_PROBES: &str = "ORDER_ID_MAX_PROBES";
pub const ENV_WHOLESALE_TAX_RATE: &str = "WHOLESALE_TAX_RATE";
pub const ENV_ORDER_CACHE_NAMESPACE: &str = "ORDER_CACHE_NAMESPACE";
pub const ENV_DATABASE_URL: &str = "DATABASE_URL";

#[derive(Debug, Clone, PartialEq, Eq, Error)]
pub enum ConfigError {
    #[error("invalid value for {key}: '{value}' ({reason})")]
    Invalid {
        key: &'static str,
        value: String,
        reason: String,
    },
}

impl ConfigError {
    fn invalid(key: &'static str, value: impl Into<String>, reason: impl Into<String>) -> Self {
        ConfigError::Invalid {
            key,
            value: value.into(),
            reason: reason.into(),
        }
    }
}

#[derive(Debug, Clone, PartialEq)]
pub struct CheckoutConfig {
    /// Whole-transaction attempts (first try included).
    pub max_attempts: u32,
    pub retry_base_delay: Duration,
    pub retry_max_delay: Duration,
    /// Upper bound on a single transaction attempt.
    pub tx_timeout: Duration,
    pub order_id_prefix: String,
    /// Identifier candidates probed per attempt.
    pub order_id_max_probes: u32,
    /// Applied to wholesale credit/invoice orders only.
    pub wholesale_tax_rate: Decimal,
    pub cache_namespace: String,
    pub database_url: Option<String>,
}

impl Default for CheckoutConfig {
    fn default() -> Self {
        Self {
            max_attempts: 3,
            retry_base_delay: Duration::from_millis(25),
            retry_max_delay: Duration::from_millis(500),
            tx_timeout: Duration::from_millis(5_000),
            order_id_prefix: "ORD".to_string(),
            order_id_max_probes: 5,
            wholesale_tax_rate: Decimal::new(10, 2),
            cache_namespace: "orders".to_string(),
            database_url: None,
        }
    }
}

impl CheckoutConfig {
    pub fn from_env() -> Result<Self, ConfigError> {
        Self::from_lookup(|key| std::env::var(key).ok())
    }

    /// Build from an arbitrary key lookup (unset keys keep their defaults).
    pub fn from_lookup<F>(lookup: F) -> Result<Self, ConfigError>
    where
        F: Fn(&str) -> Option<String>,
    {
        let mut cfg = Self::default();

        if let Some(v) = lookup(ENV_MAX_ATTEMPTS) {
            cfg.max_attempts = parse(ENV_MAX_ATTEMPTS, &v)?;
        }
        if let Some(v) = lookup(ENV_RETRY_BASE_DELAY_MS) {
            cfg.retry_base_delay = Duration::from_millis(parse(ENV_RETRY_BASE_DELAY_MS, &v)?);
        }
        if let Some(v) = lookup(ENV_TX_TIMEOUT_MS) {
            cfg.tx_timeout = Duration::from_millis(parse(ENV_TX_TIMEOUT_MS, &v)?);
        }
        if let Some(v) = lookup(ENV_ORDER_ID_PREFIX) {
            cfg.order_id_prefix = v.trim().to_string();
        }
        if let Some(v) = lookup(ENV_ORDER_ID_MAX_PROBES) {
            cfg.order_id_max_probes = parse(ENV_ORDER_ID_MAX_PROBES, &v)?;
        }
        if let Some(v) = lookup(ENV_WHOLESALE_TAX_RATE) {
            cfg.wholesale_tax_rate = parse(ENV_WHOLESALE_TAX_RATE, &v)?;
        }
        if let Some(v) = lookup(ENV_ORDER_CACHE_NAMESPACE) {
            cfg.cache_namespace = v.trim().to_string();
        }
        cfg.database_url = lookup(ENV_DATABASE_URL).filter(|v| !v.trim().is_empty());

        cfg.validate()?;
        Ok(cfg)
    }

    pub fn validate(&self) -> Result<(), ConfigError> {
        if self.max_attempts == 0 {
            return Err(ConfigError::invalid(ENV_MAX_ATTEMPTS, "0", "must be at least 1"));
        }
        if self.tx_timeout.is_zero() {
            return Err(ConfigError::invalid(ENV_TX_TIMEOUT_MS, "0", "must be positive"));
        }
        if self.order_id_max_probes == 0 {
            return Err(ConfigError::invalid(ENV_ORDER_ID_MAX_PROBES, "0", "must be at least 1"));
        }
        OrderNumber::validate_prefix(&self.order_id_prefix).map_err(|e| {
            ConfigError::invalid(ENV_ORDER_ID_PREFIX, self.order_id_prefix.clone(), e.to_string())
        })?;
        if self.wholesale_tax_rate < Decimal::ZERO || self.wholesale_tax_rate > Decimal::ONE {
            return Err(ConfigError::invalid(
                ENV_WHOLESALE_TAX_RATE,
                self.wholesale_tax_rate.to_string(),
                "must be within 0..=1",
            ));
        }
        if self.cache_namespace.is_empty() {
            return Err(ConfigError::invalid(ENV_ORDER_CACHE_NAMESPACE, "", "cannot be empty"));
        }
        Ok(())
    }

    pub fn retry_policy(&self) -> RetryPolicy {
        RetryPolicy::exponential(self.max_attempts, self.retry_base_delay, self.retry_max_delay)
    }

}

fn parse<T>(key: &'static str, raw: &str) -> Result<T, ConfigError>
where
    T: FromStr,
    T::Err: core::fmt::Display,
{
    raw.trim()
        .parse()
        .map_err(|e: T::Err| ConfigError::invalid(key, raw, e.to_string()))
}
