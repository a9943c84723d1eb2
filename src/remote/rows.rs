// src/remote/rows.rs
//! Wire structs mirroring the backend table columns, plus row <-> domain
//! mapping. Column names follow the storage schema (`timeframe`,
//! `entry_price`, `target1..3`), not the domain naming.

use crate::types::{
    Comment, Direction, Profile, Reaction, ReactionKind, Signal, SignalDraft, TimeFrame, UserType,
};
use chrono::{DateTime, Utc};
use serde::{Deserialize, Deserializer, Serialize};

/// Backends hand ids back as either text or numbers depending on the column
/// type; the domain treats them as opaque strings either way.
fn opaque_id<'de, D>(deserializer: D) -> Result<String, D::Error>
where
    D: Deserializer<'de>,
{
    let value = serde_json::Value::deserialize(deserializer)?;
    match value {
        serde_json::Value::String(s) => Ok(s),
        serde_json::Value::Number(n) => Ok(n.to_string()),
        other => Err(serde::de::Error::custom(format!(
            "expected string or number id, got {other}"
        ))),
    }
}

#[derive(Debug, Clone, Deserialize)]
pub struct SignalRow {
    #[serde(deserialize_with = "opaque_id")]
    pub id: String,
    pub user_id: String,
    pub username: String,
    pub symbol: String,
    pub direction: Direction,
    pub timeframe: TimeFrame,
    pub entry_price: String,
    pub recommended_leverage: String,
    pub target1: String,
    pub target2: String,
    pub target3: String,
    pub stop_loss: String,
    pub timestamp: DateTime<Utc>,
}

impl From<SignalRow> for Signal {
    fn from(r: SignalRow) -> Self {
        Signal {
            id: r.id,
            user_id: r.user_id,
            username: r.username,
            symbol: r.symbol,
            direction: r.direction,
            time_frame: r.timeframe,
            entry_price: r.entry_price,
            recommended_leverage: r.recommended_leverage,
            targets: [r.target1, r.target2, r.target3],
            stop_loss: r.stop_loss,
            timestamp: r.timestamp,
        }
    }
}

#[derive(Debug, Serialize)]
pub struct SignalInsert<'a> {
    pub user_id: &'a str,
    pub username: &'a str,
    pub symbol: &'a str,
    pub direction: Direction,
    pub timeframe: TimeFrame,
    pub entry_price: &'a str,
    pub recommended_leverage: &'a str,
    pub target1: &'a str,
    pub target2: &'a str,
    pub target3: &'a str,
    pub stop_loss: &'a str,
    pub timestamp: DateTime<Utc>,
}

impl<'a> From<&'a SignalDraft> for SignalInsert<'a> {
    fn from(d: &'a SignalDraft) -> Self {
        SignalInsert {
            user_id: &d.user_id,
            username: &d.username,
            symbol: &d.symbol,
            direction: d.direction,
            timeframe: d.time_frame,
            entry_price: &d.entry_price,
            recommended_leverage: &d.recommended_leverage,
            target1: &d.targets[0],
            target2: &d.targets[1],
            target3: &d.targets[2],
            stop_loss: &d.stop_loss,
            timestamp: d.timestamp,
        }
    }
}

#[derive(Debug, Clone, Deserialize)]
pub struct ReactionRow {
    #[serde(deserialize_with = "opaque_id")]
    pub signal_id: String,
    pub user_id: String,
    #[serde(rename = "type")]
    pub kind: ReactionKind,
}

impl From<ReactionRow> for Reaction {
    fn from(r: ReactionRow) -> Self {
        Reaction {
            signal_id: r.signal_id,
            user_id: r.user_id,
            kind: r.kind,
        }
    }
}

#[derive(Debug, Clone, Deserialize)]
pub struct CommentRow {
    #[serde(deserialize_with = "opaque_id")]
    pub id: String,
    #[serde(deserialize_with = "opaque_id")]
    pub signal_id: String,
    pub user_id: String,
    pub content: String,
    #[serde(default)]
    pub parent_id: Option<serde_json::Value>,
    pub created_at: DateTime<Utc>,
}

impl From<CommentRow> for Comment {
    fn from(r: CommentRow) -> Self {
        let parent_id = match r.parent_id {
            Some(serde_json::Value::String(s)) => Some(s),
            Some(serde_json::Value::Number(n)) => Some(n.to_string()),
            _ => None,
        };
        Comment {
            id: r.id,
            signal_id: r.signal_id,
            user_id: r.user_id,
            content: r.content,
            parent_id,
            created_at: r.created_at,
        }
    }
}

#[derive(Debug, Clone, Deserialize)]
pub struct ProfileRow {
    pub user_id: String,
    #[serde(default)]
    pub full_name: Option<String>,
    #[serde(default)]
    pub bio: Option<String>,
    #[serde(default)]
    pub avatar_url: Option<String>,
    pub user_type: UserType,
    pub created_at: DateTime<Utc>,
}

impl From<ProfileRow> for Profile {
    fn from(r: ProfileRow) -> Self {
        Profile {
            user_id: r.user_id,
            full_name: r.full_name.unwrap_or_default(),
            bio: r.bio.unwrap_or_default(),
            avatar_id: r.avatar_url.unwrap_or_default(),
            user_type: r.user_type,
            created_at: r.created_at,
        }
    }
}

#[derive(Debug, Serialize)]
pub struct ProfileUpsert<'a> {
    pub user_id: &'a str,
    pub full_name: &'a str,
    pub bio: &'a str,
    pub avatar_url: &'a str,
    pub user_type: UserType,
    pub created_at: DateTime<Utc>,
}

impl<'a> From<&'a Profile> for ProfileUpsert<'a> {
    fn from(p: &'a Profile) -> Self {
        ProfileUpsert {
            user_id: &p.user_id,
            full_name: &p.full_name,
            bio: &p.bio,
            avatar_url: &p.avatar_id,
            user_type: p.user_type,
            created_at: p.created_at,
        }
    }
}

#[derive(Debug, Clone, Deserialize)]
pub struct FollowRow {
    pub trader_id: String,
    pub investor_id: String,
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn signal_row_maps_columns_into_target_triple() {
        let row: SignalRow = serde_json::from_str(
            r#"{
                "id": 42,
                "user_id": "u1",
                "username": "ayse",
                "symbol": "BTCUSDT",
                "direction": "LONG",
                "timeframe": "1h",
                "entry_price": "65000",
                "recommended_leverage": "10",
                "target1": "66000",
                "target2": "67000",
                "target3": "68000",
                "stop_loss": "64000",
                "timestamp": "2024-05-01T10:00:00Z"
            }"#,
        )
        .unwrap();

        let signal: Signal = row.into();
        assert_eq!(signal.id, "42");
        assert_eq!(signal.targets, ["66000", "67000", "68000"]);
        assert_eq!(signal.direction, Direction::Long);
        assert_eq!(signal.time_frame, TimeFrame::H1);
    }

    #[test]
    fn comment_row_tolerates_null_parent() {
        let row: CommentRow = serde_json::from_str(
            r#"{
                "id": "c1",
                "signal_id": "42",
                "user_id": "u2",
                "content": "nice entry",
                "parent_id": null,
                "created_at": "2024-05-01T11:00:00Z"
            }"#,
        )
        .unwrap();
        let comment: Comment = row.into();
        assert_eq!(comment.parent_id, None);
    }

    #[test]
    fn profile_upsert_writes_backend_column_names() {
        use chrono::TimeZone;

        let profile = Profile {
            user_id: "u1".to_string(),
            full_name: "Ayse".to_string(),
            bio: "scalper".to_string(),
            avatar_id: "ethereum".to_string(),
            user_type: UserType::Trader,
            created_at: Utc.with_ymd_and_hms(2024, 1, 1, 0, 0, 0).unwrap(),
        };

        let body = serde_json::to_value(ProfileUpsert::from(&profile)).unwrap();
        assert_eq!(body["user_id"], "u1");
        assert_eq!(body["avatar_url"], "ethereum");
        assert_eq!(body["user_type"], "trader");
        assert!(body.get("avatar_id").is_none(), "domain name must not leak");
    }

    #[test]
    fn follow_row_decodes_both_edge_columns() {
        let row: FollowRow = serde_json::from_str(
            r#"{ "trader_id": "t1", "investor_id": "i1" }"#,
        )
        .unwrap();
        assert_eq!(row.trader_id, "t1");
        assert_eq!(row.investor_id, "i1");
    }

    #[test]
    fn profile_row_defaults_missing_optionals() {
        let row: ProfileRow = serde_json::from_str(
            r#"{
                "user_id": "u1",
                "user_type": "trader",
                "created_at": "2024-01-01T00:00:00Z"
            }"#,
        )
        .unwrap();
        let profile: Profile = row.into();
        assert_eq!(profile.full_name, "");
        assert_eq!(profile.user_type, UserType::Trader);
    }
}
