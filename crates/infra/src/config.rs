//! Runtime configuration read from the environment.

use std::time::Duration;

use thiserror::Error;

const DEFAULT_BIND_ADDR: &str = "0.0.0.0:8080";
const DEV_JWT_SECRET: &str = "stockroom-dev-secret";

#[derive(Debug, Error, Clone, PartialEq, Eq)]
pub enum ConfigError {
    #[error("invalid value for {key}: '{value}' ({reason})")]
    Invalid {
        key: &'static str,
        value: String,
        reason: String,
    },
}

/// Knobs for the checkout unit of work.
#[derive(Debug, Clone, PartialEq, Eq)]
pub struct CheckoutConfig {
    /// Total attempts (first try included) when the store reports contention.
    pub max_attempts: u32,
    /// Backoff before retry `n` is `n * retry_backoff`.
    pub retry_backoff: Duration,
    /// Deadline applied by callers that wrap a checkout in a timeout.
    pub timeout: Duration,
    /// Put stock back when an order is cancelled.
    pub restock_on_cancel: bool,
}

impl Default for CheckoutConfig {
    fn default() -> Self {
        Self {
            max_attempts: 3,
            retry_backoff: Duration::from_millis(10),
            timeout: Duration::from_millis(5000),
            restock_on_cancel: true,
        }
    }
}

#[derive(Debug, Clone, PartialEq, Eq)]
pub struct AppConfig {
    pub bind_addr: String,
    /// `None` selects the in-memory store.
    pub database_url: Option<String>,
    pub jwt_secret: String,
    pub checkout: CheckoutConfig,
}

impl AppConfig {
    pub fn from_env() -> Result<Self, ConfigError> {
        Self::from_lookup(|key| std::env::var(key).ok())
    }

    /// Build from an arbitrary key lookup. Empty values count as unset.
    pub fn from_lookup<F>(lookup: F) -> Result<Self, ConfigError>
    where
        F: Fn(&str) -> Option<String>,
    {
        let get = |key: &str| lookup(key).filter(|v| !v.trim().is_empty());

        let jwt_secret = match get("JWT_SECRET") {
            Some(secret) => secret,
            None => {
                tracing::warn!("JWT_SECRET not set; using the development secret");
                DEV_JWT_SECRET.to_string()
            }
        };

        let defaults = CheckoutConfig::default();
        let max_attempts = parse_or("CHECKOUT_MAX_ATTEMPTS", get("CHECKOUT_MAX_ATTEMPTS"), defaults.max_attempts)?;
        if max_attempts == 0 {
            return Err(ConfigError::Invalid {
                key: "CHECKOUT_MAX_ATTEMPTS",
                value: "0".to_string(),
                reason: "must be at least 1".to_string(),
            });
        }
        let backoff_ms = parse_or(
            "CHECKOUT_RETRY_BACKOFF_MS",
            get("CHECKOUT_RETRY_BACKOFF_MS"),
            defaults.retry_backoff.as_millis() as u64,
        )?;
        let timeout_ms = parse_or(
            "CHECKOUT_TIMEOUT_MS",
            get("CHECKOUT_TIMEOUT_MS"),
            defaults.timeout.as_millis() as u64,
        )?;
        let restock_on_cancel = match get("RESTOCK_ON_CANCEL") {
            Some(raw) => parse_bool("RESTOCK_ON_CANCEL", &raw)?,
            None => defaults.restock_on_cancel,
        };

        Ok(Self {
            bind_addr: get("BIND_ADDR").unwrap_or_else(|| DEFAULT_BIND_ADDR.to_string()),
            database_url: get("DATABASE_URL"),
            jwt_secret,
            checkout: CheckoutConfig {
                max_attempts,
                retry_backoff: Duration::from_millis(backoff_ms),
                timeout: Duration::from_millis(timeout_ms),
                restock_on_cancel,
            },
        })
    }
}

fn parse_or<T>(key: &'static str, raw: Option<String>, default: T) -> Result<T, ConfigError>
where
    T: std::str::FromStr,
    T::Err: std::fmt::Display,
{
    match raw {
        None => Ok(default),
        Some(value) => value.trim().parse::<T>().map_err(|e| ConfigError::Invalid {
            key,
            reason: e.to_string(),
            value,
        }),
    }
}

fn parse_bool(key: &'static str, raw: &str) -> Result<bool, ConfigError> {
    match raw.trim().to_ascii_lowercase().as_str() {
        "1" | "true" | "yes" | "on" => Ok(true),
        "0" | "false" | "no" | "off" => Ok(false),
        _ => Err(ConfigError::Invalid {
            key,
            value: raw.to_string(),
            reason: "expected a boolean".to_string(),
        }),
    }
}
