use crate::domain::Decimal;
use crate::engine::EscrowMode;
use std::collections::HashMap;
use std::str::FromStr;
use thiserror::Error;

pub const DEFAULT_MAX_PROOF_BYTES: usize = 5 * 1024 * 1024;

#[derive(Debug, Clone)]
pub struct Config {
    pub port: u16,
    pub database_path: String,
    pub upload_path: String,
    pub max_proof_bytes: usize,
    pub escrow_mode: EscrowMode,
    pub swap_btc_usdt_rate: Decimal,
    pub allow_demo_balance: bool,
}

#[derive(Debug, Error)]
pub enum ConfigError {
    #[error("Missing required environment variable: {0}")]
    MissingEnv(String),
    #[error("Invalid value for {0}: {1}")]
    InvalidValue(String, String),
}

impl Config {
    pub fn from_env() -> Result<Self, ConfigError> {
        Self::from_env_map(std::env::vars().collect())
    }

    pub fn from_env_map(env_map: HashMap<String, String>) -> Result<Self, ConfigError> {
        let port = env_map
            .get("PORT")
            .map(|s| s.as_str())
            .unwrap_or("8080")
            .parse::<u16>()
            .map_err(|_| {
                ConfigError::InvalidValue("PORT".to_string(), "must be a valid u16".to_string())
            })?;

        let database_path = env_map
            .get("DATABASE_PATH")
            .cloned()
            .ok_or_else(|| ConfigError::MissingEnv("DATABASE_PATH".to_string()))?;

        let upload_path = env_map
            .get("UPLOAD_PATH")
            .cloned()
            .unwrap_or_else(|| "./uploads".to_string());

        let max_proof_bytes = match env_map.get("MAX_PROOF_BYTES") {
            Some(s) => s.parse::<usize>().ok().filter(|n| *n > 0).ok_or_else(|| {
                ConfigError::InvalidValue(
                    "MAX_PROOF_BYTES".to_string(),
                    "must be a positive integer".to_string(),
                )
            })?,
            None => DEFAULT_MAX_PROOF_BYTES,
        };

        let escrow_mode = env_map
            .get("ESCROW_MODE")
            .map(|s| s.as_str())
            .unwrap_or("advisory")
            .parse::<EscrowMode>()
            .map_err(|_| {
                ConfigError::InvalidValue(
                    "ESCROW_MODE".to_string(),
                    "must be advisory or reserve".to_string(),
                )
            })?;

        let swap_btc_usdt_rate = Decimal::from_str(
            env_map
                .get("SWAP_BTC_USDT_RATE")
                .map(|s| s.as_str())
                .unwrap_or("45000"),
        )
        .ok()
        .filter(|r| r.is_positive())
        .ok_or_else(|| {
            ConfigError::InvalidValue(
                "SWAP_BTC_USDT_RATE".to_string(),
                "must be a positive decimal".to_string(),
            )
        })?;

        let allow_demo_balance = match env_map
            .get("ALLOW_DEMO_BALANCE")
            .map(|s| s.as_str())
            .unwrap_or("false")
        {
            "true" | "1" => true,
            "false" | "0" => false,
            other => {
                return Err(ConfigError::InvalidValue(
                    "ALLOW_DEMO_BALANCE".to_string(),
                    format!("must be true or false, got {}", other),
                ))
            }
        };

        Ok(Config {
            port,
            database_path,
            upload_path,
            max_proof_bytes,
            escrow_mode,
            swap_btc_usdt_rate,
            allow_demo_balance,
        })
    }
}
