// src/config.rs

use config::{Config, ConfigError, File};
use serde::Deserialize;

#[derive(Debug, Deserialize, Clone)]
pub struct MarketConfig {
    /// Combined-stream websocket base, e.g. wss://stream.binance.com:9443
    pub stream_url: String,
    /// Market snapshot endpoint base (CoinGecko-compatible).
    pub snapshot_url: String,
    /// News listing endpoint.
    pub news_url: String,
    pub news_api_key: String,
    /// How many coins the snapshot pulls.
    pub snapshot_limit: u32,
    /// Coalescing window for quote updates, milliseconds.
    pub flush_interval_ms: u64,
}

#[derive(Debug, Deserialize, Clone)]
pub struct AppConfig {
    /// Backend project base URL (REST and realtime derive from it).
    pub backend_url: String,
    pub backend_api_key: String,
    pub email: String,
    pub password: String,
    pub market: MarketConfig,
}

impl AppConfig {
    pub fn new() -> Result<Self, ConfigError> {
        let builder = Config::builder()
            .add_source(File::with_name("Settings"))
            .add_source(config::Environment::with_prefix("APP").separator("__"));

        let config = builder.build()?;
        config.try_deserialize()
    }
}
