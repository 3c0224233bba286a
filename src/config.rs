use std::time::Duration;

use crate::sweeper::{DEFAULT_RESET_INTERVAL, DEFAULT_SWEEP_INTERVAL};

/// Runtime configuration, read from the environment (`.env` supported).
pub struct Config {
    pub database_url: String,
    pub bind_addr: String,
    pub upload_dir: String,
    pub cors_origins: Vec<String>,
    pub webhook_url: Option<String>,
    pub sweep_interval: Duration,
    pub reset_interval: Duration,
}

impl Config {
    pub fn from_env() -> Self {
        Self {
            database_url: var_or("DATABASE_URL", "sqlite://phantomtalk.db?mode=rwc"),
            bind_addr: var_or("BIND_ADDR", "0.0.0.0:8080"),
            upload_dir: var_or("UPLOAD_DIR", "uploads"),
            cors_origins: var_or("CORS_ORIGINS", "*")
                .split(',')
                .map(|origin| origin.trim().to_owned())
                .filter(|origin| !origin.is_empty())
                .collect(),
            webhook_url: dotenv::var("DISCORD_WEBHOOK_URL").ok(),
            sweep_interval: Duration::from_secs(secs_or(
                "SWEEP_INTERVAL_SECS",
                DEFAULT_SWEEP_INTERVAL.as_secs(),
            )),
            reset_interval: Duration::from_secs(secs_or(
                "RESET_INTERVAL_SECS",
                DEFAULT_RESET_INTERVAL.as_secs(),
            )),
        }
    }
}

fn var_or(key: &str, default: &str) -> String {
    dotenv::var(key).unwrap_or_else(|_| default.to_owned())
}

fn secs_or(key: &str, default: u64) -> u64 {
    dotenv::var(key)
        .ok()
        .and_then(|v| v.parse().ok())
        .unwrap_or(default)
}
