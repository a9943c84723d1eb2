// src/remote/traits.rs
use crate::remote::SubscriptionHandle;
use crate::types::{Comment, Profile, Reaction, ReactionKind, Signal, SignalDraft};
use anyhow::Result;
use async_trait::async_trait;
#[cfg(test)]
use mockall::automock;
use tokio::sync::mpsc;

#[cfg_attr(test, automock)]
#[async_trait]
pub trait SignalStore: Send + Sync {
    /// All signals, most recent first.
    async fn fetch_signals(&self) -> Result<Vec<Signal>>;

    /// Insert a draft and return the canonical row the backend produced.
    async fn insert_signal(&self, draft: &SignalDraft) -> Result<Signal>;
}

#[cfg_attr(test, automock)]
#[async_trait]
pub trait SignalInsertStream: Send + Sync {
    /// Subscribe to INSERT events on the signals table. Each delivered row is
    /// mapped and forwarded over `sender` until the handle is dropped.
    async fn subscribe_inserts(&self, sender: mpsc::Sender<Signal>) -> Result<SubscriptionHandle>;
}

#[cfg_attr(test, automock)]
#[async_trait]
pub trait ReactionStore: Send + Sync {
    /// The complete reaction set for the platform.
    async fn fetch_reactions(&self) -> Result<Vec<Reaction>>;

    async fn insert_reaction(&self, signal_id: &str, user_id: &str, kind: ReactionKind)
        -> Result<()>;

    /// Switch the existing (signal, user) row to `kind` in place.
    async fn update_reaction(&self, signal_id: &str, user_id: &str, kind: ReactionKind)
        -> Result<()>;

    async fn delete_reaction(&self, signal_id: &str, user_id: &str) -> Result<()>;
}

#[cfg_attr(test, automock)]
#[async_trait]
pub trait CommentStore: Send + Sync {
    /// One signal's comments, oldest first.
    async fn fetch_comments(&self, signal_id: &str) -> Result<Vec<Comment>>;

    /// The complete comment set, used for feed-wide count folding.
    async fn fetch_all_comments(&self) -> Result<Vec<Comment>>;

    async fn insert_comment<'a>(
        &self,
        signal_id: &str,
        user_id: &str,
        content: &str,
        parent_id: Option<&'a str>,
    ) -> Result<()>;

    async fn update_comment(&self, id: &str, content: &str) -> Result<()>;

    async fn delete_comment(&self, id: &str) -> Result<()>;
}

#[cfg_attr(test, automock)]
#[async_trait]
pub trait ProfileStore: Send + Sync {
    async fn fetch_profile(&self, user_id: &str) -> Result<Option<Profile>>;

    async fn fetch_profiles(&self) -> Result<Vec<Profile>>;

    async fn fetch_profiles_by_ids(&self, user_ids: &[String]) -> Result<Vec<Profile>>;

    async fn upsert_profile(&self, profile: &Profile) -> Result<()>;
}

#[cfg_attr(test, automock)]
#[async_trait]
pub trait FollowStore: Send + Sync {
    async fn is_following(&self, trader_id: &str, investor_id: &str) -> Result<bool>;

    async fn follow(&self, trader_id: &str, investor_id: &str) -> Result<()>;

    async fn unfollow(&self, trader_id: &str, investor_id: &str) -> Result<()>;

    /// Investor ids following the given trader.
    async fn follower_ids(&self, trader_id: &str) -> Result<Vec<String>>;

    async fn follower_count(&self, trader_id: &str) -> Result<u64>;

    /// Trader ids the given investor follows, for home-feed scoping.
    async fn followed_trader_ids(&self, investor_id: &str) -> Result<Vec<String>>;
}
