use crate::constants::*;
use crate::models::Currency;
use std::env;
use thiserror::Error;

#[derive(Debug, Clone)]
pub struct Config {
    pub data_path: String,
    pub default_account: Currency,
}

#[derive(Debug, Error)]
pub enum ConfigError {
    #[error("DATABASE_PATH cannot be empty")]
    EmptyDataPath,
    #[error("Invalid default account: {0}")]
    InvalidAccount(String),
}

impl Config {
    /// Reads `.env` (if present) and then the process environment.
    pub fn from_env() -> Result<Self, ConfigError> {
        dotenv::dotenv().ok();

        let data_path = env::var("DATABASE_PATH").unwrap_or_else(|_| DEFAULT_DATA_PATH.to_string());
        let account = env::var("DEFAULT_ACCOUNT").unwrap_or_else(|_| DEFAULT_ACCOUNT.to_string());

        Self::from_values(&data_path, &account)
    }

    pub fn from_values(data_path: &str, account: &str) -> Result<Self, ConfigError> {
        if data_path.trim().is_empty() {
            return Err(ConfigError::EmptyDataPath);
        }

        let default_account = account
            .parse::<Currency>()
            .map_err(|_| ConfigError::InvalidAccount(account.to_string()))?;

        Ok(Config {
            data_path: data_path.to_string(),
            default_account,
        })
    }
}

impl Default for Config {
    fn default() -> Self {
        Config {
            data_path: DEFAULT_DATA_PATH.to_string(),
            default_account: Currency::Usd,
        }
    }
}
