//! Configuration for auction_watch

use anyhow::{anyhow, Context, Result};
use std::env;
use std::time::Duration;

#[derive(Debug, Clone)]
pub struct Config {
    // Storage & messaging
    pub database_url: String,
    pub redis_url: String,

    // Battle.net credentials
    pub bnet_client_id: String,
    pub bnet_client_secret: String,

    // Telegram delivery
    pub telegram_bot_token: String,

    // Scheduling
    pub update_interval: Duration,
    pub worker_pool_size: usize,
    pub provider_max_attempts: u32,

    // Startup interval discovery
    pub discovery_probe_interval: Duration,
    pub discovery_max_attempts: u32,

    // Monitoring
    pub stats_log_every_cycles: u64,
}

impl Config {
    pub fn from_env() -> Result<Self> {
        let database_url = required("DATABASE_URL")?;
        let redis_url =
            env::var("REDIS_URL").unwrap_or_else(|_| "redis://localhost:6379".to_string());

        let bnet_client_id = required("BNET_CLIENT_ID")?;
        let bnet_client_secret = required("BNET_CLIENT_SECRET")?;
        let telegram_bot_token = required("TELEGRAM_BOT_TOKEN")?;

        let update_interval_mins = parse_u64("UPDATE_INTERVAL_MINS", 60)?;
        let worker_pool_size = parse_u64("WORKER_POOL_SIZE", 4)? as usize;
        let provider_max_attempts = parse_u64("PROVIDER_MAX_ATTEMPTS", 5)? as u32;
        let discovery_probe_interval_secs = parse_u64("DISCOVERY_PROBE_INTERVAL_SECS", 60)?;
        let discovery_max_attempts = parse_u64("DISCOVERY_MAX_ATTEMPTS", 60)? as u32;
        let stats_log_every_cycles = parse_u64("STATS_LOG_EVERY_CYCLES", 1)?;

        let config = Self {
            database_url,
            redis_url,
            bnet_client_id,
            bnet_client_secret,
            telegram_bot_token,
            update_interval: Duration::from_secs(update_interval_mins * 60),
            worker_pool_size,
            provider_max_attempts,
            discovery_probe_interval: Duration::from_secs(discovery_probe_interval_secs),
            discovery_max_attempts,
            stats_log_every_cycles,
        };
        config.validate()?;
        Ok(config)
    }

    pub fn validate(&self) -> Result<()> {
        if self.update_interval.is_zero() {
            return Err(anyhow!("UPDATE_INTERVAL_MINS must be > 0"));
        }
        if self.worker_pool_size == 0 {
            return Err(anyhow!("WORKER_POOL_SIZE must be > 0"));
        }
        if self.provider_max_attempts == 0 {
            return Err(anyhow!("PROVIDER_MAX_ATTEMPTS must be > 0"));
        }
        if self.discovery_probe_interval.is_zero() {
            return Err(anyhow!("DISCOVERY_PROBE_INTERVAL_SECS must be > 0"));
        }
        if self.stats_log_every_cycles == 0 {
            return Err(anyhow!("STATS_LOG_EVERY_CYCLES must be > 0"));
        }
        Ok(())
    }
}

fn required(key: &str) -> Result<String> {
    env::var(key)
        .ok()
        .filter(|v| !v.trim().is_empty())
        .ok_or_else(|| anyhow!("{key} must be set"))
}

fn parse_u64(key: &str, default: u64) -> Result<u64> {
    let raw = env::var(key).unwrap_or_else(|_| default.to_string());
    raw.trim()
        .parse::<u64>()
        .with_context(|| format!("Invalid {key}: {raw} (expected non-negative integer)"))
}
