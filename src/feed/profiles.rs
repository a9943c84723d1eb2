// src/feed/profiles.rs
use crate::error::StoreError;
use crate::remote::traits::{FollowStore, ProfileStore};
use crate::types::{Profile, Session, UserType};
use anyhow::{bail, Context, Result};
use std::collections::HashMap;
use std::sync::Arc;

/// The fixed local avatar catalog. Profiles store one of these ids; anything
/// else renders as the placeholder.
pub const AVATAR_IDS: [&str; 9] = [
    "bitcoin",
    "bnb",
    "cardano",
    "dogecoin",
    "ethereum",
    "litecoin",
    "ripple",
    "solana",
    "stellar",
];

pub fn is_known_avatar(id: &str) -> bool {
    AVATAR_IDS.contains(&id)
}

/// Profile and follow-graph operations for one session.
pub struct ProfileDirectory {
    profiles: Arc<dyn ProfileStore>,
    follows: Arc<dyn FollowStore>,
    session: Session,
}

impl ProfileDirectory {
    pub fn new(
        profiles: Arc<dyn ProfileStore>,
        follows: Arc<dyn FollowStore>,
        session: Session,
    ) -> Self {
        Self {
            profiles,
            follows,
            session,
        }
    }

    pub async fn me(&self) -> Result<Option<Profile>> {
        self.profiles
            .fetch_profile(&self.session.user_id)
            .await
            .context("loading own profile")
    }

    /// Save the caller's profile. The avatar id must come from the catalog
    /// (or be empty for never-chosen).
    pub async fn save(&self, profile: &Profile) -> Result<()> {
        if profile.user_id != self.session.user_id {
            bail!("cannot save another user's profile");
        }
        if !profile.avatar_id.is_empty() && !is_known_avatar(&profile.avatar_id) {
            bail!("unknown avatar id {:?}", profile.avatar_id);
        }
        self.profiles
            .upsert_profile(profile)
            .await
            .context("saving profile")
    }

    /// user-id -> display-name map for the whole platform, rebuilt wholesale
    /// by feed consumers on every dependency change.
    pub async fn display_names(&self) -> Result<HashMap<String, String>> {
        let profiles = self
            .profiles
            .fetch_profiles()
            .await
            .context("loading display names")?;
        Ok(profiles
            .into_iter()
            .map(|p| (p.user_id, p.full_name))
            .collect())
    }

    /// Follow a trader as the active investor.
    pub async fn follow(&self, trader: &Profile) -> Result<()> {
        if trader.user_type != UserType::Trader {
            return Err(StoreError::Forbidden {
                role: trader.user_type,
                action: "be followed",
            }
            .into());
        }
        self.follows
            .follow(&trader.user_id, &self.session.user_id)
            .await
            .context("following trader")
    }

    pub async fn unfollow(&self, trader_id: &str) -> Result<()> {
        self.follows
            .unfollow(trader_id, &self.session.user_id)
            .await
            .context("unfollowing trader")
    }

    pub async fn is_following(&self, trader_id: &str) -> Result<bool> {
        self.follows
            .is_following(trader_id, &self.session.user_id)
            .await
            .context("checking follow state")
    }

    /// Profiles of everyone following the given trader.
    pub async fn followers(&self, trader_id: &str) -> Result<Vec<Profile>> {
        let ids = self
            .follows
            .follower_ids(trader_id)
            .await
            .context("listing follower ids")?;
        if ids.is_empty() {
            return Ok(Vec::new());
        }
        self.profiles
            .fetch_profiles_by_ids(&ids)
            .await
            .context("loading follower profiles")
    }

    pub async fn follower_count(&self, trader_id: &str) -> Result<u64> {
        self.follows
            .follower_count(trader_id)
            .await
            .context("counting followers")
    }

    /// Trader ids the active investor follows, for scoping the home feed.
    pub async fn followed_traders(&self) -> Result<Vec<String>> {
        self.follows
            .followed_trader_ids(&self.session.user_id)
            .await
            .context("listing followed traders")
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use crate::remote::traits::{MockFollowStore, MockProfileStore};
    use chrono::Utc;

    fn profile(user: &str, user_type: UserType, avatar: &str) -> Profile {
        Profile {
            user_id: user.to_string(),
            full_name: format!("name-{user}"),
            bio: String::new(),
            avatar_id: avatar.to_string(),
            user_type,
            created_at: Utc::now(),
        }
    }

    fn directory(profiles: MockProfileStore, follows: MockFollowStore) -> ProfileDirectory {
        ProfileDirectory::new(
            Arc::new(profiles),
            Arc::new(follows),
            Session {
                user_id: "me".to_string(),
                access_token: "jwt".to_string(),
            },
        )
    }

    #[test]
    fn avatar_catalog_is_closed() {
        assert!(is_known_avatar("ethereum"));
        assert!(!is_known_avatar("shiba"));
    }

    #[tokio::test]
    async fn save_rejects_unknown_avatar() {
        let dir = directory(MockProfileStore::new(), MockFollowStore::new());
        let bad = profile("me", UserType::Investor, "shiba");
        assert!(dir.save(&bad).await.is_err());
    }

    #[tokio::test]
    async fn save_accepts_empty_avatar() {
        let mut profiles = MockProfileStore::new();
        profiles
            .expect_upsert_profile()
            .times(1)
            .returning(|_| Ok(()));
        let dir = directory(profiles, MockFollowStore::new());
        dir.save(&profile("me", UserType::Investor, ""))
            .await
            .unwrap();
    }

    #[tokio::test]
    async fn cannot_follow_an_investor() {
        let dir = directory(MockProfileStore::new(), MockFollowStore::new());
        let other = profile("u2", UserType::Investor, "bitcoin");
        assert!(dir.follow(&other).await.is_err());
    }

    #[tokio::test]
    async fn followers_resolves_profiles_from_edge_ids() {
        let mut follows = MockFollowStore::new();
        follows
            .expect_follower_ids()
            .returning(|_| Ok(vec!["u2".to_string(), "u3".to_string()]));
        let mut profiles = MockProfileStore::new();
        profiles.expect_fetch_profiles_by_ids().returning(|ids| {
            Ok(ids
                .iter()
                .map(|id| profile(id, UserType::Investor, "bitcoin"))
                .collect())
        });

        let dir = directory(profiles, follows);
        let followers = dir.followers("t1").await.unwrap();
        assert_eq!(followers.len(), 2);
    }
}
