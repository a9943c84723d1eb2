// src/market/batcher.rs
use crate::types::{FeedEvent, QuoteTick};
use std::collections::HashMap;
use tokio::sync::mpsc;
use tokio::time::{sleep_until, Duration, Instant};
use tracing::debug;

/// Time-windowed coalescing of streaming quotes. Incoming ticks overwrite a
/// pending-updates map keyed by symbol (latest wins, intermediate values are
/// dropped); the first tick after an idle period arms a single flush
/// deadline, and flushing clears both the map and the deadline so the next
/// tick re-arms it. Display refresh rate is therefore bounded to one batch
/// per interval no matter how fast ticks arrive.
#[derive(Debug)]
pub struct TickBatcher {
    interval: Duration,
    pending: HashMap<String, QuoteTick>,
    deadline: Option<Instant>,
}

impl TickBatcher {
    pub fn new(interval: Duration) -> Self {
        Self {
            interval,
            pending: HashMap::new(),
            deadline: None,
        }
    }

    /// Record a tick. Returns true when this tick armed the flush deadline.
    pub fn offer(&mut self, tick: QuoteTick, now: Instant) -> bool {
        self.pending.insert(tick.symbol.clone(), tick);
        if self.deadline.is_none() {
            self.deadline = Some(now + self.interval);
            return true;
        }
        false
    }

    pub fn deadline(&self) -> Option<Instant> {
        self.deadline
    }

    pub fn pending_count(&self) -> usize {
        self.pending.len()
    }

    /// Drain all pending updates as one batch and disarm the deadline.
    pub fn flush(&mut self) -> Vec<QuoteTick> {
        self.deadline = None;
        self.pending.drain().map(|(_, tick)| tick).collect()
    }
}

/// Pump ticks from the stream into coalesced `QuoteBatch` events. Returns
/// when the tick channel closes; dropping the pump cancels any armed
/// deadline implicitly, so teardown never produces a late batch.
pub async fn run(
    mut ticks: mpsc::Receiver<QuoteTick>,
    events: mpsc::Sender<FeedEvent>,
    interval: Duration,
) {
    let mut batcher = TickBatcher::new(interval);
    loop {
        match batcher.deadline() {
            Some(deadline) => {
                tokio::select! {
                    maybe_tick = ticks.recv() => match maybe_tick {
                        Some(tick) => {
                            batcher.offer(tick, Instant::now());
                        }
                        None => break,
                    },
                    _ = sleep_until(deadline) => {
                        let batch = batcher.flush();
                        debug!(updates = batch.len(), "flushing quote batch");
                        if events.send(FeedEvent::QuoteBatch(batch)).await.is_err() {
                            break;
                        }
                    }
                }
            }
            None => match ticks.recv().await {
                Some(tick) => {
                    batcher.offer(tick, Instant::now());
                }
                None => break,
            },
        }
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use rust_decimal::Decimal;

    fn tick(symbol: &str, price: i64, seq: u64) -> QuoteTick {
        QuoteTick {
            symbol: symbol.to_string(),
            price: Decimal::from(price),
            change_pct_24h: Decimal::ONE,
            timestamp: seq,
        }
    }

    #[tokio::test(start_paused = true)]
    async fn fifty_ticks_in_one_window_coalesce_to_last_value() {
        let mut batcher = TickBatcher::new(Duration::from_millis(1000));
        let now = Instant::now();

        for i in 0..50 {
            let armed = batcher.offer(tick("btc", 65_000 + i, i as u64), now);
            assert_eq!(armed, i == 0, "only the first tick arms the deadline");
        }

        assert_eq!(batcher.pending_count(), 1);
        let batch = batcher.flush();
        assert_eq!(batch.len(), 1);
        assert_eq!(batch[0].price, Decimal::from(65_049));
        assert_eq!(batcher.deadline(), None, "flush disarms the deadline");
    }

    #[tokio::test(start_paused = true)]
    async fn distinct_symbols_flush_together() {
        let mut batcher = TickBatcher::new(Duration::from_millis(1000));
        let now = Instant::now();
        batcher.offer(tick("btc", 65_000, 1), now);
        batcher.offer(tick("eth", 3_000, 2), now);

        let mut batch = batcher.flush();
        batch.sort_by(|a, b| a.symbol.cmp(&b.symbol));
        assert_eq!(batch.len(), 2);
        assert_eq!(batch[0].symbol, "btc");
        assert_eq!(batch[1].symbol, "eth");
    }

    #[tokio::test(start_paused = true)]
    async fn pump_emits_exactly_one_batch_per_window() {
        let (tick_tx, tick_rx) = mpsc::channel(256);
        let (event_tx, mut event_rx) = mpsc::channel(16);

        let pump = tokio::spawn(run(tick_rx, event_tx, Duration::from_millis(1000)));

        for i in 0..50 {
            tick_tx.send(tick("btc", 65_000 + i, i as u64)).await.unwrap();
        }
        // Let the pump drain the channel before the window expires.
        for _ in 0..8 {
            tokio::task::yield_now().await;
        }
        tokio::time::advance(Duration::from_millis(1100)).await;

        let event = event_rx.recv().await.unwrap();
        let FeedEvent::QuoteBatch(batch) = event else {
            panic!("expected a quote batch");
        };
        assert_eq!(batch.len(), 1);
        assert_eq!(batch[0].price, Decimal::from(65_049));

        // No second batch without new ticks.
        tokio::time::advance(Duration::from_millis(2000)).await;
        assert!(event_rx.try_recv().is_err());

        // The next tick re-arms the window.
        tick_tx.send(tick("btc", 70_000, 99)).await.unwrap();
        tokio::time::advance(Duration::from_millis(1100)).await;
        let FeedEvent::QuoteBatch(batch) = event_rx.recv().await.unwrap() else {
            panic!("expected a quote batch");
        };
        assert_eq!(batch[0].price, Decimal::from(70_000));

        drop(tick_tx);
        pump.await.unwrap();
    }
}
