// src/feed/cache.rs
use crate::error::StoreError;
use crate::remote::traits::SignalStore;
use crate::types::{FeedEvent, Session, Signal, SignalDraft, SyncState, UserType};
use anyhow::{bail, Context, Result};
use std::sync::Arc;
use tokio::sync::mpsc;
use tracing::{error, info, warn};
use uuid::Uuid;

/// Reserved prefix marking ids minted locally, before the backend assigns a
/// permanent one.
const TEMP_PREFIX: &str = "temp-";

pub fn mint_temp_id() -> String {
    format!("{}{}", TEMP_PREFIX, Uuid::new_v4().simple())
}

pub fn is_temp_id(id: &str) -> bool {
    id.starts_with(TEMP_PREFIX)
}

#[derive(Debug, Clone)]
pub struct FeedEntry {
    pub signal: Signal,
    pub state: SyncState,
}

/// What `apply_insert` did with a pushed row.
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub enum InsertOutcome {
    /// New row, prepended at the head.
    Prepended,
    /// Matched an optimistic entry awaiting confirmation; replaced it in place.
    ReconciledPending,
    /// A row with this id is already cached.
    Duplicate,
}

/// What `confirm` did with an insert response.
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub enum ConfirmOutcome {
    /// The temp entry was replaced in place with the canonical row.
    Replaced,
    /// A racing push already reconciled this entry under its permanent id.
    AlreadyReconciled,
    /// The temp entry is gone (discarded while the insert was in flight).
    Missing,
}

/// Ordered-by-recency signal collection. Pure state: reconciliation between
/// bulk loads, realtime pushes and optimistic submissions happens here, with
/// no I/O, so every race permutation is checkable in isolation.
///
/// Merge contract: last reconciliation wins, by id replacement. The cache
/// never holds two entries with the same id, and never holds both a temp
/// placeholder and its confirmed row.
#[derive(Debug, Default)]
pub struct SignalCache {
    entries: Vec<FeedEntry>,
}

impl SignalCache {
    pub fn new() -> Self {
        Self::default()
    }

    pub fn entries(&self) -> &[FeedEntry] {
        &self.entries
    }

    pub fn len(&self) -> usize {
        self.entries.len()
    }

    pub fn is_empty(&self) -> bool {
        self.entries.is_empty()
    }

    pub fn get(&self, id: &str) -> Option<&FeedEntry> {
        self.entries.iter().find(|e| e.signal.id == id)
    }

    pub fn position(&self, id: &str) -> Option<usize> {
        self.entries.iter().position(|e| e.signal.id == id)
    }

    pub fn ids(&self) -> Vec<String> {
        self.entries.iter().map(|e| e.signal.id.clone()).collect()
    }

    /// Wholesale replacement from a bulk load. All loaded rows are confirmed.
    pub fn replace_all(&mut self, signals: Vec<Signal>) {
        self.entries = signals
            .into_iter()
            .map(|signal| FeedEntry {
                signal,
                state: SyncState::Confirmed,
            })
            .collect();
    }

    /// Prepend an optimistic entry bearing a freshly minted temp id.
    pub fn insert_pending(&mut self, signal: Signal) {
        debug_assert!(is_temp_id(&signal.id));
        self.entries.insert(
            0,
            FeedEntry {
                signal,
                state: SyncState::Pending,
            },
        );
    }

    /// Merge a pushed row. Duplicate ids are dropped; a push that matches a
    /// pending optimistic entry (same author, symbol and timestamp) settles
    /// that entry in place instead of adding a second row.
    pub fn apply_insert(&mut self, incoming: Signal) -> InsertOutcome {
        if self.get(&incoming.id).is_some() {
            return InsertOutcome::Duplicate;
        }
        if let Some(entry) = self.entries.iter_mut().find(|e| {
            e.state == SyncState::Pending
                && e.signal.user_id == incoming.user_id
                && e.signal.symbol == incoming.symbol
                && e.signal.timestamp == incoming.timestamp
        }) {
            entry.signal = incoming;
            entry.state = SyncState::Confirmed;
            return InsertOutcome::ReconciledPending;
        }
        self.entries.insert(
            0,
            FeedEntry {
                signal: incoming,
                state: SyncState::Confirmed,
            },
        );
        InsertOutcome::Prepended
    }

    /// Settle an optimistic entry with the canonical row from the insert
    /// response, preserving its position. Never re-sorts.
    pub fn confirm(&mut self, temp_id: &str, confirmed: Signal) -> ConfirmOutcome {
        let Some(index) = self.position(temp_id) else {
            if self.get(&confirmed.id).is_some() {
                return ConfirmOutcome::AlreadyReconciled;
            }
            return ConfirmOutcome::Missing;
        };
        if self.get(&confirmed.id).is_some() {
            // A racing push landed the permanent row separately; the temp
            // placeholder is now redundant.
            self.entries.remove(index);
            return ConfirmOutcome::AlreadyReconciled;
        }
        self.entries[index] = FeedEntry {
            signal: confirmed,
            state: SyncState::Confirmed,
        };
        ConfirmOutcome::Replaced
    }

    pub fn mark_failed(&mut self, temp_id: &str) -> bool {
        match self.entries.iter_mut().find(|e| e.signal.id == temp_id) {
            Some(entry) => {
                entry.state = SyncState::Failed;
                true
            }
            None => false,
        }
    }

    pub fn mark_pending(&mut self, temp_id: &str) -> bool {
        match self.entries.iter_mut().find(|e| e.signal.id == temp_id) {
            Some(entry) => {
                entry.state = SyncState::Pending;
                true
            }
            None => false,
        }
    }

    /// Drop an entry by id. Used for user-initiated discard of failed
    /// submissions; confirmed rows are never removed client-side.
    pub fn remove(&mut self, id: &str) -> bool {
        match self.position(id) {
            Some(index) => {
                self.entries.remove(index);
                true
            }
            None => false,
        }
    }
}

/// The signal feed service: owns the cache, talks to the backend, emits
/// change events for whatever renders the feed.
pub struct SignalFeed {
    store: Arc<dyn SignalStore>,
    session: Session,
    role: UserType,
    cache: SignalCache,
    events: mpsc::Sender<FeedEvent>,
}

impl SignalFeed {
    pub fn new(
        store: Arc<dyn SignalStore>,
        session: Session,
        role: UserType,
        events: mpsc::Sender<FeedEvent>,
    ) -> Self {
        Self {
            store,
            session,
            role,
            cache: SignalCache::new(),
            events,
        }
    }

    pub fn cache(&self) -> &SignalCache {
        &self.cache
    }

    pub fn signals(&self) -> impl Iterator<Item = &Signal> {
        self.cache.entries().iter().map(|e| &e.signal)
    }

    pub fn signal_ids(&self) -> Vec<String> {
        self.cache.ids()
    }

    fn emit(&self, event: FeedEvent) {
        match self.events.try_send(event) {
            Ok(_) => {}
            Err(mpsc::error::TrySendError::Full(event)) => {
                warn!(?event, "feed event dropped, consumer is lagging");
            }
            Err(mpsc::error::TrySendError::Closed(_)) => {
                error!("feed event channel closed, consumer is gone");
            }
        }
    }

    /// Bulk load, replacing the cache wholesale. On failure the cache keeps
    /// its previous contents and the error surfaces to the caller.
    pub async fn load_all(&mut self) -> Result<()> {
        let signals = self.store.fetch_signals().await.context("loading feed")?;
        info!(count = signals.len(), "feed loaded");
        self.cache.replace_all(signals);
        self.emit(FeedEvent::SignalsChanged);
        Ok(())
    }

    /// Merge one realtime-pushed row.
    pub fn apply_insert(&mut self, incoming: Signal) {
        match self.cache.apply_insert(incoming) {
            InsertOutcome::Duplicate => {}
            outcome => {
                if outcome == InsertOutcome::ReconciledPending {
                    info!("realtime push settled a pending submission");
                }
                self.emit(FeedEvent::SignalsChanged);
            }
        }
    }

    /// Optimistic submission: prepend immediately under a temp id, then issue
    /// exactly one remote insert. Returns the permanent id on success; on
    /// failure the entry stays visible in the `Failed` state for `retry` or
    /// `discard`.
    pub async fn add_signal(&mut self, draft: SignalDraft) -> Result<String> {
        if self.role != UserType::Trader {
            return Err(StoreError::Forbidden {
                role: self.role,
                action: "post signals",
            }
            .into());
        }
        if draft.user_id != self.session.user_id {
            bail!("draft author does not match the active session");
        }

        let temp_id = mint_temp_id();
        self.cache.insert_pending(Signal {
            id: temp_id.clone(),
            user_id: draft.user_id.clone(),
            username: draft.username.clone(),
            symbol: draft.symbol.clone(),
            direction: draft.direction,
            time_frame: draft.time_frame,
            entry_price: draft.entry_price.clone(),
            recommended_leverage: draft.recommended_leverage.clone(),
            targets: draft.targets.clone(),
            stop_loss: draft.stop_loss.clone(),
            timestamp: draft.timestamp,
        });
        self.emit(FeedEvent::SignalsChanged);

        self.submit(temp_id, draft).await
    }

    /// Re-issue the insert for an entry that previously failed.
    pub async fn retry(&mut self, temp_id: &str) -> Result<String> {
        let entry = self
            .cache
            .get(temp_id)
            .with_context(|| format!("no entry {temp_id} to retry"))?;
        if entry.state != SyncState::Failed {
            bail!("entry {temp_id} is not in the failed state");
        }
        let draft = draft_of(&entry.signal);
        self.cache.mark_pending(temp_id);
        self.emit(FeedEvent::SignalsChanged);
        self.submit(temp_id.to_string(), draft).await
    }

    /// Drop a failed submission without retrying it.
    pub fn discard(&mut self, temp_id: &str) -> Result<()> {
        let entry = self
            .cache
            .get(temp_id)
            .with_context(|| format!("no entry {temp_id} to discard"))?;
        if entry.state != SyncState::Failed {
            bail!("entry {temp_id} is not in the failed state");
        }
        self.cache.remove(temp_id);
        self.emit(FeedEvent::SignalsChanged);
        Ok(())
    }

    async fn submit(&mut self, temp_id: String, draft: SignalDraft) -> Result<String> {
        match self.store.insert_signal(&draft).await {
            Ok(confirmed) => {
                let id = confirmed.id.clone();
                match self.cache.confirm(&temp_id, confirmed) {
                    ConfirmOutcome::Replaced => {
                        self.emit(FeedEvent::SignalConfirmed {
                            temp_id,
                            id: id.clone(),
                        });
                        self.emit(FeedEvent::SignalsChanged);
                    }
                    ConfirmOutcome::AlreadyReconciled => {
                        self.emit(FeedEvent::SignalsChanged);
                    }
                    ConfirmOutcome::Missing => {
                        warn!(temp_id, "submission confirmed after its entry was discarded");
                    }
                }
                Ok(id)
            }
            Err(e) => {
                self.cache.mark_failed(&temp_id);
                self.emit(FeedEvent::SignalFailed {
                    temp_id: temp_id.clone(),
                });
                Err(e).with_context(|| format!("signal insert failed, entry {temp_id} kept"))
            }
        }
    }
}

fn draft_of(signal: &Signal) -> SignalDraft {
    SignalDraft {
        user_id: signal.user_id.clone(),
        username: signal.username.clone(),
        symbol: signal.symbol.clone(),
        direction: signal.direction,
        time_frame: signal.time_frame,
        entry_price: signal.entry_price.clone(),
        recommended_leverage: signal.recommended_leverage.clone(),
        targets: signal.targets.clone(),
        stop_loss: signal.stop_loss.clone(),
        timestamp: signal.timestamp,
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use crate::remote::traits::MockSignalStore;
    use crate::types::{Direction, TimeFrame};
    use chrono::{TimeZone, Utc};

    fn signal(id: &str, user: &str, symbol: &str, minute: u32) -> Signal {
        Signal {
            id: id.to_string(),
            user_id: user.to_string(),
            username: format!("user-{user}"),
            symbol: symbol.to_string(),
            direction: Direction::Long,
            time_frame: TimeFrame::H1,
            entry_price: "100".to_string(),
            recommended_leverage: "5".to_string(),
            targets: ["101".to_string(), "102".to_string(), "103".to_string()],
            stop_loss: "99".to_string(),
            timestamp: Utc.with_ymd_and_hms(2024, 5, 1, 10, minute, 0).unwrap(),
        }
    }

    fn btc_draft(user: &str) -> SignalDraft {
        SignalDraft {
            user_id: user.to_string(),
            username: "trader-u".to_string(),
            symbol: "BTCUSDT".to_string(),
            direction: Direction::Long,
            time_frame: TimeFrame::H1,
            entry_price: "65000".to_string(),
            recommended_leverage: "10".to_string(),
            targets: [
                "66000".to_string(),
                "67000".to_string(),
                "68000".to_string(),
            ],
            stop_loss: "64000".to_string(),
            timestamp: Utc.with_ymd_and_hms(2024, 5, 1, 12, 0, 0).unwrap(),
        }
    }

    fn session(user: &str) -> Session {
        Session {
            user_id: user.to_string(),
            access_token: "jwt".to_string(),
        }
    }

    fn feed(store: MockSignalStore, user: &str, role: UserType) -> SignalFeed {
        let (tx, _rx) = mpsc::channel(64);
        SignalFeed::new(Arc::new(store), session(user), role, tx)
    }

    // --- pure cache ---

    #[test]
    fn load_then_pushes_keep_recency_order() {
        let mut cache = SignalCache::new();
        cache.replace_all(vec![signal("b", "u1", "ETHUSDT", 5), signal("a", "u1", "BTCUSDT", 1)]);

        cache.apply_insert(signal("c", "u2", "SOLUSDT", 10));
        cache.apply_insert(signal("d", "u2", "XRPUSDT", 11));

        assert_eq!(cache.len(), 4);
        assert_eq!(cache.ids(), vec!["d", "c", "b", "a"]);
    }

    #[test]
    fn duplicate_push_is_a_noop() {
        let mut cache = SignalCache::new();
        assert_eq!(
            cache.apply_insert(signal("s1", "u1", "BTCUSDT", 0)),
            InsertOutcome::Prepended
        );
        assert_eq!(
            cache.apply_insert(signal("s1", "u1", "BTCUSDT", 0)),
            InsertOutcome::Duplicate
        );
        assert_eq!(cache.len(), 1);
    }

    #[test]
    fn push_settles_matching_pending_entry_in_place() {
        let mut cache = SignalCache::new();
        cache.replace_all(vec![signal("old", "u9", "ETHUSDT", 0)]);

        let mut temp = signal("", "u1", "BTCUSDT", 30);
        temp.id = mint_temp_id();
        let temp_id = temp.id.clone();
        cache.insert_pending(temp);

        let pushed = signal("sig_7", "u1", "BTCUSDT", 30);
        assert_eq!(cache.apply_insert(pushed), InsertOutcome::ReconciledPending);

        assert_eq!(cache.len(), 2);
        assert_eq!(cache.position("sig_7"), Some(0));
        assert!(cache.get(&temp_id).is_none());
        assert_eq!(cache.get("sig_7").unwrap().state, SyncState::Confirmed);
    }

    #[test]
    fn confirm_after_racing_push_drops_the_redundant_temp() {
        let mut cache = SignalCache::new();
        let mut temp = signal("", "u1", "BTCUSDT", 30);
        temp.id = mint_temp_id();
        let temp_id = temp.id.clone();
        cache.insert_pending(temp);

        // The push reconciled the entry under its permanent id first.
        cache.apply_insert(signal("sig_7", "u1", "BTCUSDT", 30));
        assert_eq!(cache.len(), 1);

        // The insert response then resolves for a temp id that no longer exists.
        let outcome = cache.confirm(&temp_id, signal("sig_7", "u1", "BTCUSDT", 30));
        assert_eq!(outcome, ConfirmOutcome::AlreadyReconciled);
        assert_eq!(cache.len(), 1);
        assert_eq!(cache.ids(), vec!["sig_7"]);
    }

    #[test]
    fn confirm_preserves_position_without_resorting() {
        let mut cache = SignalCache::new();
        let mut temp = signal("", "u1", "BTCUSDT", 30);
        temp.id = mint_temp_id();
        let temp_id = temp.id.clone();
        cache.insert_pending(temp);
        // Newer pushes land above the pending entry while the insert is in flight.
        cache.apply_insert(signal("newer", "u2", "ETHUSDT", 45));
        assert_eq!(cache.position(&temp_id), Some(1));

        let outcome = cache.confirm(&temp_id, signal("sig_9", "u1", "BTCUSDT", 30));
        assert_eq!(outcome, ConfirmOutcome::Replaced);
        assert_eq!(cache.position("sig_9"), Some(1));
    }

    // --- async feed service ---

    #[tokio::test]
    async fn optimistic_round_trip_replaces_temp_at_index_zero() {
        let mut store = MockSignalStore::new();
        store.expect_fetch_signals().times(1).returning(|| {
            Ok(vec![
                signal("s2", "u5", "ETHUSDT", 9),
                signal("s1", "u5", "BTCUSDT", 3),
            ])
        });
        store
            .expect_insert_signal()
            .times(1)
            .returning(|draft: &SignalDraft| {
                Ok(Signal {
                    id: "sig_42".to_string(),
                    user_id: draft.user_id.clone(),
                    username: draft.username.clone(),
                    symbol: draft.symbol.clone(),
                    direction: draft.direction,
                    time_frame: draft.time_frame,
                    entry_price: draft.entry_price.clone(),
                    recommended_leverage: draft.recommended_leverage.clone(),
                    targets: draft.targets.clone(),
                    stop_loss: draft.stop_loss.clone(),
                    timestamp: draft.timestamp,
                })
            });

        let mut feed = feed(store, "u1", UserType::Trader);
        feed.load_all().await.unwrap();

        let id = feed.add_signal(btc_draft("u1")).await.unwrap();
        assert_eq!(id, "sig_42");

        let entries = feed.cache().entries();
        assert_eq!(entries.len(), 3);
        let confirmed = &entries[0];
        assert_eq!(confirmed.signal.id, "sig_42");
        assert_eq!(confirmed.state, SyncState::Confirmed);
        assert_eq!(confirmed.signal.symbol, "BTCUSDT");
        assert_eq!(confirmed.signal.entry_price, "65000");
        assert_eq!(
            confirmed.signal.targets,
            ["66000".to_string(), "67000".to_string(), "68000".to_string()]
        );
        assert_eq!(confirmed.signal.stop_loss, "64000");
        assert_eq!(
            feed.cache()
                .entries()
                .iter()
                .filter(|e| e.signal.symbol == "BTCUSDT" && e.signal.user_id == "u1")
                .count(),
            1
        );
    }

    #[tokio::test]
    async fn failed_insert_keeps_entry_in_failed_state_until_retry() {
        let mut store = MockSignalStore::new();
        let mut attempts = 0u32;
        store.expect_insert_signal().times(2).returning(move |draft| {
            attempts += 1;
            if attempts == 1 {
                Err(anyhow::anyhow!("network down"))
            } else {
                Ok(Signal {
                    id: "sig_99".to_string(),
                    user_id: draft.user_id.clone(),
                    username: draft.username.clone(),
                    symbol: draft.symbol.clone(),
                    direction: draft.direction,
                    time_frame: draft.time_frame,
                    entry_price: draft.entry_price.clone(),
                    recommended_leverage: draft.recommended_leverage.clone(),
                    targets: draft.targets.clone(),
                    stop_loss: draft.stop_loss.clone(),
                    timestamp: draft.timestamp,
                })
            }
        });

        let mut feed = feed(store, "u1", UserType::Trader);
        assert!(feed.add_signal(btc_draft("u1")).await.is_err());

        let entries = feed.cache().entries();
        assert_eq!(entries.len(), 1);
        assert_eq!(entries[0].state, SyncState::Failed);
        let temp_id = entries[0].signal.id.clone();
        assert!(is_temp_id(&temp_id));

        let id = feed.retry(&temp_id).await.unwrap();
        assert_eq!(id, "sig_99");
        assert_eq!(feed.cache().entries()[0].state, SyncState::Confirmed);
    }

    #[tokio::test]
    async fn discard_removes_only_failed_entries() {
        let mut store = MockSignalStore::new();
        store
            .expect_insert_signal()
            .times(1)
            .returning(|_| Err(anyhow::anyhow!("rejected")));

        let mut feed = feed(store, "u1", UserType::Trader);
        assert!(feed.add_signal(btc_draft("u1")).await.is_err());

        let temp_id = feed.cache().entries()[0].signal.id.clone();
        feed.discard(&temp_id).unwrap();
        assert!(feed.cache().is_empty());
        assert!(feed.discard(&temp_id).is_err());
    }

    #[tokio::test]
    async fn investors_cannot_post_signals() {
        let store = MockSignalStore::new();
        let mut feed = feed(store, "u1", UserType::Investor);
        let err = feed.add_signal(btc_draft("u1")).await.unwrap_err();
        assert!(err.to_string().contains("not allowed"));
        assert!(feed.cache().is_empty());
    }

    #[tokio::test]
    async fn full_event_channel_never_blocks_cache_updates() {
        let mut store = MockSignalStore::new();
        store
            .expect_fetch_signals()
            .returning(|| Ok(vec![signal("s0", "u5", "ETHUSDT", 1)]));

        // One-slot channel, pre-filled: every later notification hits the
        // full arm and is dropped, never awaited.
        let (tx, mut rx) = mpsc::channel(1);
        tx.try_send(FeedEvent::SignalsChanged).unwrap();

        let mut feed = SignalFeed::new(Arc::new(store), session("u1"), UserType::Trader, tx);
        feed.load_all().await.unwrap();
        feed.apply_insert(signal("s1", "u2", "BTCUSDT", 2));

        assert_eq!(feed.cache().len(), 2, "cache mutations proceed regardless");
        assert!(matches!(rx.try_recv().unwrap(), FeedEvent::SignalsChanged));
        assert!(rx.try_recv().is_err(), "overflow notifications are dropped");
    }

    #[tokio::test]
    async fn load_failure_leaves_previous_contents() {
        let mut store = MockSignalStore::new();
        let mut calls = 0u32;
        store.expect_fetch_signals().times(2).returning(move || {
            calls += 1;
            if calls == 1 {
                Ok(vec![signal("s1", "u5", "BTCUSDT", 3)])
            } else {
                Err(anyhow::anyhow!("backend unavailable"))
            }
        });

        let mut feed = feed(store, "u1", UserType::Trader);
        feed.load_all().await.unwrap();
        assert_eq!(feed.cache().len(), 1);

        assert!(feed.load_all().await.is_err());
        assert_eq!(feed.cache().len(), 1, "cache must keep its previous value");
    }
}
