// src/main.rs
use anyhow::{Context, Result};
use dotenvy::dotenv;
use signal_mentor::config::AppConfig;
use signal_mentor::feed::aggregator::FeedAggregator;
use signal_mentor::feed::cache::SignalFeed;
use signal_mentor::market::http::MarketDataClient;
use signal_mentor::market::stream::MarketStream;
use signal_mentor::market::batcher;
use signal_mentor::remote::supabase::SupabaseClient;
use signal_mentor::remote::traits::{ProfileStore, SignalInsertStream};
use signal_mentor::types::FeedEvent;
use std::sync::Arc;
use std::time::Duration;
use tokio::sync::mpsc;
use tracing::{error, info, warn};
use tracing_subscriber::EnvFilter;

#[tokio::main]
async fn main() -> Result<()> {
    dotenv().ok();

    let file_appender = tracing_appender::rolling::daily("logs", "signal-mentor.log");
    let (non_blocking, _log_guard) = tracing_appender::non_blocking(file_appender);
    tracing_subscriber::fmt()
        .with_env_filter(EnvFilter::from_default_env().add_directive("signal_mentor=info".parse()?))
        .with_writer(non_blocking)
        .with_ansi(false)
        .init();

    let config = AppConfig::new().context("loading Settings")?;

    println!("========================================");
    println!("        SIGNAL MENTOR - v0.1.0");
    println!("========================================");

    // 1. Authenticate; the session is threaded explicitly everywhere.
    let auth = SupabaseClient::new(&config.backend_url, &config.backend_api_key);
    let session = auth
        .sign_in(&config.email, &config.password)
        .await
        .context("signing in")?;
    let client = Arc::new(
        SupabaseClient::new(&config.backend_url, &config.backend_api_key)
            .with_session(session.clone()),
    );

    let profile = client
        .fetch_profile(&session.user_id)
        .await?
        .context("no profile for this account; complete registration first")?;
    println!("User:   {} ({:?})", profile.full_name, profile.user_type);
    println!("========================================");

    // 2. Channels
    let (event_tx, mut event_rx) = mpsc::channel(256);
    let (insert_tx, mut insert_rx) = mpsc::channel(100);
    let (tick_tx, tick_rx) = mpsc::channel(1000);

    // 3. Feed: bulk load, realtime inserts, aggregates.
    let mut feed = SignalFeed::new(
        client.clone(),
        session.clone(),
        profile.user_type,
        event_tx.clone(),
    );
    feed.load_all().await?;

    let mut aggregator = FeedAggregator::new(
        client.clone(),
        client.clone(),
        session.clone(),
        profile.user_type,
    );
    if let Err(e) = aggregator.rebuild(&feed.signal_ids()).await {
        warn!("initial aggregate rebuild failed: {e:#}");
    }

    let _insert_sub = client.subscribe_inserts(insert_tx).await?;

    // 4. Market: snapshot seeds the symbol set, stream feeds the batcher.
    let market_data = MarketDataClient::new(config.market.clone());
    let mut market_stream = MarketStream::new(&config.market.stream_url);
    match market_data.fetch_snapshot().await {
        Ok(coins) => {
            let symbols: Vec<String> = coins.iter().map(|c| c.symbol.clone()).collect();
            market_stream.subscribe(&symbols, tick_tx).await?;
        }
        Err(e) => warn!("market snapshot unavailable, quote stream skipped: {e}"),
    }
    tokio::spawn(batcher::run(
        tick_rx,
        event_tx,
        Duration::from_millis(config.market.flush_interval_ms),
    ));

    info!("event loop running");

    loop {
        tokio::select! {
            Some(signal) = insert_rx.recv() => {
                info!(id = %signal.id, symbol = %signal.symbol, "signal pushed");
                feed.apply_insert(signal);
                if let Err(e) = aggregator.rebuild(&feed.signal_ids()).await {
                    error!("aggregate rebuild failed: {e:#}");
                }
            }
            Some(event) = event_rx.recv() => match event {
                FeedEvent::SignalsChanged => {
                    info!(count = feed.cache().len(), "feed changed");
                }
                FeedEvent::SignalConfirmed { temp_id, id } => {
                    info!(%temp_id, %id, "submission confirmed");
                }
                FeedEvent::SignalFailed { temp_id } => {
                    warn!(%temp_id, "submission failed, awaiting retry or discard");
                }
                FeedEvent::QuoteBatch(batch) => {
                    info!(updates = batch.len(), "quote batch applied");
                }
            },
            _ = tokio::signal::ctrl_c() => {
                info!("shutting down");
                break;
            }
        }
    }

    market_stream.shutdown();
    Ok(())
}
