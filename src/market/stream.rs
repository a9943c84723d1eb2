// src/market/stream.rs
use crate::remote::SubscriptionHandle;
use crate::types::QuoteTick;
use anyhow::{Context, Result};
use futures_util::StreamExt;
use rust_decimal::Decimal;
use serde::Deserialize;
use tokio::sync::mpsc;
use tokio_tungstenite::connect_async;
use tracing::{error, info};
use url::Url;

/// 24h ticker event off the exchange combined stream. Short field names map
/// the exchange JSON.
#[derive(Debug, Deserialize)]
struct TickerEvent {
    #[serde(rename = "s")]
    symbol: String,

    #[serde(rename = "c")]
    last_price: Decimal,

    #[serde(rename = "P")]
    change_pct_24h: Decimal,

    #[serde(rename = "E")]
    event_time: u64,
}

#[derive(Debug, Deserialize)]
struct CombinedFrame {
    #[allow(dead_code)]
    stream: String,
    data: TickerEvent,
}

/// Strip the quote-asset suffix so stream symbols line up with snapshot
/// symbols ("BTCUSDT" -> "btc").
fn display_symbol(stream_symbol: &str) -> String {
    stream_symbol
        .strip_suffix("USDT")
        .unwrap_or(stream_symbol)
        .to_lowercase()
}

fn map_tick(frame: CombinedFrame) -> QuoteTick {
    QuoteTick {
        symbol: display_symbol(&frame.data.symbol),
        price: frame.data.last_price,
        change_pct_24h: frame.data.change_pct_24h,
        timestamp: frame.data.event_time,
    }
}

/// One streaming connection per distinct symbol set. Resubscribing tears the
/// previous connection down first; dropping the feed tears it down
/// unconditionally.
pub struct MarketStream {
    stream_url: String,
    connection: Option<SubscriptionHandle>,
}

impl MarketStream {
    pub fn new(stream_url: impl Into<String>) -> Self {
        Self {
            stream_url: stream_url.into().trim_end_matches('/').to_string(),
            connection: None,
        }
    }

    pub fn is_connected(&self) -> bool {
        self.connection
            .as_ref()
            .map(|c| !c.is_finished())
            .unwrap_or(false)
    }

    /// Open a combined stream for `symbols` (base symbols, e.g. "btc"),
    /// replacing any existing connection.
    pub async fn subscribe(
        &mut self,
        symbols: &[String],
        sender: mpsc::Sender<QuoteTick>,
    ) -> Result<()> {
        // Old connection goes first so two readers never feed one consumer.
        self.connection = None;

        let streams = symbols
            .iter()
            .map(|s| format!("{}usdt@ticker", s.to_lowercase()))
            .collect::<Vec<_>>()
            .join("/");
        let ws_url = format!("{}/stream?streams={}", self.stream_url, streams);
        let url = Url::parse(&ws_url).context("parsing stream url")?;

        info!(symbols = symbols.len(), "starting quote stream task");

        let task = tokio::spawn(async move {
            match connect_async(url).await {
                Ok((ws_stream, _)) => {
                    let (_, mut read) = ws_stream.split();
                    info!("quote stream connected");

                    while let Some(message) = read.next().await {
                        match message {
                            Ok(msg) => {
                                let Ok(text) = msg.to_text() else { continue };
                                match serde_json::from_str::<CombinedFrame>(text) {
                                    Ok(frame) => {
                                        if sender.send(map_tick(frame)).await.is_err() {
                                            break;
                                        }
                                    }
                                    // Control frames and subscribe acks don't
                                    // carry a data envelope.
                                    Err(_) => continue,
                                }
                            }
                            Err(e) => {
                                error!("quote stream error: {}", e);
                                break;
                            }
                        }
                    }
                }
                Err(e) => error!("failed to connect quote stream: {}", e),
            }
            info!("quote stream task finished");
        });

        self.connection = Some(SubscriptionHandle::new(task));
        Ok(())
    }

    pub fn shutdown(&mut self) {
        self.connection = None;
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn parses_combined_ticker_frame() {
        let frame: CombinedFrame = serde_json::from_str(
            r#"{
                "stream": "btcusdt@ticker",
                "data": {
                    "e": "24hrTicker",
                    "E": 1714557600000,
                    "s": "BTCUSDT",
                    "c": "65123.45",
                    "P": "-2.31"
                }
            }"#,
        )
        .unwrap();

        let tick = map_tick(frame);
        assert_eq!(tick.symbol, "btc");
        assert_eq!(tick.price.to_string(), "65123.45");
        assert_eq!(tick.change_pct_24h.to_string(), "-2.31");
        assert_eq!(tick.timestamp, 1714557600000);
    }

    #[test]
    fn display_symbol_passes_through_non_usdt_pairs() {
        assert_eq!(display_symbol("ETHUSDT"), "eth");
        assert_eq!(display_symbol("ETHBTC"), "ethbtc");
    }
}
