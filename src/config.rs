//! Service configuration from the environment.

use std::{env, fmt::Display, str::FromStr};

use thiserror::Error;
use tracing::info;

#[derive(Debug, Error, PartialEq, Eq)]
pub enum ConfigError {
    #[error("{0} must be set")]
    Missing(&'static str),
    #[error("Invalid {key} value '{value}': {reason}")]
    Invalid { key: &'static str, value: String, reason: String },
}

#[derive(Clone, Debug)]
pub struct Config {
    pub database_url: String,
    pub database_max_connections: u32,
    pub port: u16,
    pub paystack_secret_key: String,
    pub currency: String,
}

impl Config {
    /// Reads the process environment. Call `dotenvy::dotenv()` first to pick up a `.env` file.
    pub fn from_env() -> Result<Self, ConfigError> {
        Self::from_lookup(|key| env::var(key).ok())
    }

    pub fn from_lookup(lookup: impl Fn(&str) -> Option<String>) -> Result<Self, ConfigError> {
        Ok(Self {
            database_url: required(&lookup, "DATABASE_URL")?,
            database_max_connections: with_default(&lookup, "DATABASE_MAX_CONNECTIONS", 10)?,
            port: with_default(&lookup, "PORT", 8083)?,
            paystack_secret_key: required(&lookup, "PAYSTACK_SECRET_KEY")?,
            currency: lookup("STORE_CURRENCY").map(|c| c.trim().to_uppercase()).filter(|c| !c.is_empty()).unwrap_or_else(|| "GHS".to_string()),
        })
    }
}

fn required(lookup: &impl Fn(&str) -> Option<String>, key: &'static str) -> Result<String, ConfigError> {
    lookup(key).filter(|v| !v.trim().is_empty()).ok_or(ConfigError::Missing(key))
}

fn with_default<T: FromStr + Display>(lookup: &impl Fn(&str) -> Option<String>, key: &'static str, default: T) -> Result<T, ConfigError>
where
    T::Err: Display,
{
    match lookup(key) {
        Some(value) => match value.trim().parse::<T>() {
            Ok(parsed) => Ok(parsed),
            Err(e) => Err(ConfigError::Invalid { key, reason: e.to_string(), value }),
        },
        None => {
            info!("{key} not set, using default: {default}");
            Ok(default)
        }
    }
}
