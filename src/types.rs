// src/types.rs
use chrono::{DateTime, Utc};
use rust_decimal::Decimal;
use serde::{Deserialize, Serialize};

#[derive(Debug, Clone, Copy, PartialEq, Eq, Serialize, Deserialize)]
pub enum Direction {
    #[serde(rename = "LONG")]
    Long,
    #[serde(rename = "SHORT")]
    Short,
}

impl Direction {
    pub fn as_str(&self) -> &'static str {
        match self {
            Direction::Long => "LONG",
            Direction::Short => "SHORT",
        }
    }
}

/// Chart time frames a signal can target. The backend stores the short code.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Serialize, Deserialize)]
pub enum TimeFrame {
    #[serde(rename = "5m")]
    M5,
    #[serde(rename = "15m")]
    M15,
    #[serde(rename = "30m")]
    M30,
    #[serde(rename = "1h")]
    H1,
    #[serde(rename = "2h")]
    H2,
    #[serde(rename = "4h")]
    H4,
    #[serde(rename = "6h")]
    H6,
}

impl TimeFrame {
    pub fn as_str(&self) -> &'static str {
        match self {
            TimeFrame::M5 => "5m",
            TimeFrame::M15 => "15m",
            TimeFrame::M30 => "30m",
            TimeFrame::H1 => "1h",
            TimeFrame::H2 => "2h",
            TimeFrame::H4 => "4h",
            TimeFrame::H6 => "6h",
        }
    }
}

/// A published trade idea. Price levels travel as decimal strings end to end;
/// the backend stores them as text and the client never does arithmetic on them.
#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
pub struct Signal {
    pub id: String,
    pub user_id: String,
    pub username: String,
    pub symbol: String,
    pub direction: Direction,
    pub time_frame: TimeFrame,
    pub entry_price: String,
    pub recommended_leverage: String,
    pub targets: [String; 3],
    pub stop_loss: String,
    pub timestamp: DateTime<Utc>,
}

/// A fully-populated signal awaiting submission. No id yet; the feed assigns
/// a temporary one and the backend the permanent one.
#[derive(Debug, Clone, PartialEq)]
pub struct SignalDraft {
    pub user_id: String,
    pub username: String,
    pub symbol: String,
    pub direction: Direction,
    pub time_frame: TimeFrame,
    pub entry_price: String,
    pub recommended_leverage: String,
    pub targets: [String; 3],
    pub stop_loss: String,
    pub timestamp: DateTime<Utc>,
}

/// Confirmation state of one feed entry.
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub enum SyncState {
    /// Optimistically inserted, remote insert in flight.
    Pending,
    /// Reconciled against the backend row. Terminal.
    Confirmed,
    /// Remote insert rejected; stays until the user retries or discards.
    Failed,
}

#[derive(Debug, Clone, Copy, PartialEq, Eq, Serialize, Deserialize)]
#[serde(rename_all = "lowercase")]
pub enum ReactionKind {
    Like,
    Dislike,
}

#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
pub struct Reaction {
    pub signal_id: String,
    pub user_id: String,
    pub kind: ReactionKind,
}

#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
pub struct Comment {
    pub id: String,
    pub signal_id: String,
    pub user_id: String,
    pub content: String,
    pub parent_id: Option<String>,
    pub created_at: DateTime<Utc>,
}

/// Profile role. Mutually exclusive: traders post signals, investors react
/// and comment.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Serialize, Deserialize)]
#[serde(rename_all = "lowercase")]
pub enum UserType {
    Investor,
    Trader,
}

#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
pub struct Profile {
    pub user_id: String,
    pub full_name: String,
    pub bio: String,
    /// Key into the fixed local avatar catalog, empty if never chosen.
    pub avatar_id: String,
    pub user_type: UserType,
    pub created_at: DateTime<Utc>,
}

#[derive(Debug, Clone, PartialEq, Eq, Serialize, Deserialize)]
pub struct Follow {
    pub trader_id: String,
    pub investor_id: String,
}

/// Authenticated identity, passed explicitly into every component that acts
/// on the user's behalf. Never read from global state.
#[derive(Debug, Clone)]
pub struct Session {
    pub user_id: String,
    pub access_token: String,
}

/// Per-signal reaction rollup produced by the aggregator. Present for every
/// cached signal, zeroed when there is no activity.
#[derive(Debug, Clone, Copy, Default, PartialEq, Eq)]
pub struct ReactionSummary {
    pub like_count: u32,
    pub dislike_count: u32,
    pub mine: Option<ReactionKind>,
}

/// One message off the exchange ticker stream.
#[derive(Debug, Clone, PartialEq)]
pub struct QuoteTick {
    pub symbol: String,
    pub price: Decimal,
    pub change_pct_24h: Decimal,
    pub timestamp: u64,
}

/// One row of the third-party market snapshot.
#[derive(Debug, Clone, PartialEq, Deserialize)]
pub struct CoinQuote {
    pub id: String,
    pub symbol: String,
    #[serde(rename = "current_price")]
    pub price: Decimal,
    pub market_cap: Decimal,
    #[serde(rename = "price_change_percentage_24h")]
    pub change_pct_24h: Decimal,
}

/// One article off the third-party news listing.
#[derive(Debug, Clone, PartialEq, Deserialize)]
pub struct NewsItem {
    pub id: String,
    pub title: String,
    pub url: String,
    pub source: String,
    #[serde(rename = "published_on")]
    pub published_at: i64,
}

/// Notifications the data layer pushes to whatever is rendering it.
#[derive(Debug, Clone)]
pub enum FeedEvent {
    /// The cache contents changed (load, push, optimistic insert, reconcile).
    SignalsChanged,
    /// An optimistic entry was confirmed under its permanent id.
    SignalConfirmed { temp_id: String, id: String },
    /// An optimistic entry's remote insert was rejected.
    SignalFailed { temp_id: String },
    /// One coalesced batch of quote updates is ready to apply.
    QuoteBatch(Vec<QuoteTick>),
}
