// src/market/http.rs
use crate::config::MarketConfig;
use crate::error::StoreError;
use crate::types::{CoinQuote, NewsItem};
use reqwest::Client;
use serde::Deserialize;
use tracing::info;

/// Read-only third-party market data: the coin snapshot and the news
/// listing. Both are fetched once and again only on explicit refresh; the
/// response shapes are externally defined.
pub struct MarketDataClient {
    http_client: Client,
    config: MarketConfig,
}

impl MarketDataClient {
    pub fn new(config: MarketConfig) -> Self {
        Self {
            http_client: Client::new(),
            config,
        }
    }

    /// Top coins by market cap with 24h change, seeding the market view and
    /// the streaming symbol set.
    pub async fn fetch_snapshot(&self) -> Result<Vec<CoinQuote>, StoreError> {
        let query = [
            ("vs_currency", "usd".to_string()),
            ("order", "market_cap_desc".to_string()),
            ("per_page", self.config.snapshot_limit.to_string()),
            ("page", "1".to_string()),
            ("price_change_percentage", "24h".to_string()),
        ];
        let query_string =
            serde_urlencoded::to_string(query).map_err(|e| StoreError::Decode(e.to_string()))?;
        let url = format!("{}?{}", self.config.snapshot_url, query_string);

        let response = self.http_client.get(&url).send().await?;
        let status = response.status();
        if !status.is_success() {
            return Err(StoreError::Api {
                status: status.as_u16(),
                message: response.text().await.unwrap_or_default(),
            });
        }
        let coins: Vec<CoinQuote> = response
            .json()
            .await
            .map_err(|e| StoreError::Decode(e.to_string()))?;
        info!(coins = coins.len(), "market snapshot fetched");
        Ok(coins)
    }

    pub async fn fetch_news(&self) -> Result<Vec<NewsItem>, StoreError> {
        #[derive(Deserialize)]
        struct NewsResponse {
            #[serde(rename = "Data")]
            data: Vec<NewsItem>,
        }

        let url = news_request_url(&self.config.news_url, &self.config.news_api_key);
        let response = self.http_client.get(&url).send().await?;
        let status = response.status();
        if !status.is_success() {
            return Err(StoreError::Api {
                status: status.as_u16(),
                message: response.text().await.unwrap_or_default(),
            });
        }
        let news: NewsResponse = response
            .json()
            .await
            .map_err(|e| StoreError::Decode(e.to_string()))?;
        Ok(news.data)
    }
}

/// The news endpoint rejects an empty `api_key`, so the parameter is sent
/// only when a key is configured.
fn news_request_url(news_url: &str, api_key: &str) -> String {
    if api_key.is_empty() {
        format!("{news_url}?lang=EN")
    } else {
        format!("{news_url}?lang=EN&api_key={api_key}")
    }
}
