// src/feed/aggregator.rs
use crate::error::StoreError;
use crate::remote::traits::{CommentStore, ReactionStore};
use crate::types::{Comment, Reaction, ReactionKind, ReactionSummary, Session, UserType};
use anyhow::{Context, Result};
use std::collections::HashMap;
use std::sync::Arc;
use tracing::debug;

/// Fold the complete reaction set into per-signal summaries. Every id in
/// `signal_ids` gets an entry, zeroed when it has no activity; reactions for
/// unknown signals are dropped.
pub fn fold_reactions(
    signal_ids: &[String],
    reactions: &[Reaction],
    me: &str,
) -> HashMap<String, ReactionSummary> {
    let mut map: HashMap<String, ReactionSummary> = signal_ids
        .iter()
        .map(|id| (id.clone(), ReactionSummary::default()))
        .collect();
    for reaction in reactions {
        let Some(summary) = map.get_mut(&reaction.signal_id) else {
            continue;
        };
        match reaction.kind {
            ReactionKind::Like => summary.like_count += 1,
            ReactionKind::Dislike => summary.dislike_count += 1,
        }
        if reaction.user_id == me {
            summary.mine = Some(reaction.kind);
        }
    }
    map
}

/// Fold the complete comment set into per-signal counts with the same
/// zero-baseline guarantee.
pub fn fold_comment_counts(signal_ids: &[String], comments: &[Comment]) -> HashMap<String, u32> {
    let mut map: HashMap<String, u32> = signal_ids.iter().map(|id| (id.clone(), 0)).collect();
    for comment in comments {
        if let Some(count) = map.get_mut(&comment.signal_id) {
            *count += 1;
        }
    }
    map
}

/// Derived per-signal activity for the whole feed. Rebuilt wholesale on every
/// dependency change, never patched incrementally.
#[derive(Debug, Default, Clone)]
pub struct FeedSummary {
    reactions: HashMap<String, ReactionSummary>,
    comment_counts: HashMap<String, u32>,
}

impl FeedSummary {
    /// Rollup for one signal. Zeroes, never absent, for signals the last
    /// rebuild knew about; zeroes for unknown ids too so callers need no
    /// special case.
    pub fn for_signal(&self, signal_id: &str) -> (ReactionSummary, u32) {
        (
            self.reactions.get(signal_id).copied().unwrap_or_default(),
            self.comment_counts.get(signal_id).copied().unwrap_or(0),
        )
    }
}

pub struct FeedAggregator {
    reactions: Arc<dyn ReactionStore>,
    comments: Arc<dyn CommentStore>,
    session: Session,
    role: UserType,
    summary: FeedSummary,
}

impl FeedAggregator {
    pub fn new(
        reactions: Arc<dyn ReactionStore>,
        comments: Arc<dyn CommentStore>,
        session: Session,
        role: UserType,
    ) -> Self {
        Self {
            reactions,
            comments,
            session,
            role,
            summary: FeedSummary::default(),
        }
    }

    pub fn summary(&self) -> &FeedSummary {
        &self.summary
    }

    /// Full refetch and refold of both collections. The fetches are the only
    /// suspension points; the folds run synchronously over fetched data.
    pub async fn rebuild(&mut self, signal_ids: &[String]) -> Result<()> {
        let reactions = self
            .reactions
            .fetch_reactions()
            .await
            .context("rebuilding reaction summaries")?;
        let comments = self
            .comments
            .fetch_all_comments()
            .await
            .context("rebuilding comment counts")?;
        debug!(
            reactions = reactions.len(),
            comments = comments.len(),
            "aggregates refolded"
        );
        self.summary = FeedSummary {
            reactions: fold_reactions(signal_ids, &reactions, &self.session.user_id),
            comment_counts: fold_comment_counts(signal_ids, &comments),
        };
        Ok(())
    }

    /// Toggle the active user's reaction on one signal:
    /// same kind again removes it, the opposite kind switches in place, and
    /// no current reaction inserts one. The whole reaction set is refetched
    /// afterwards; counts are never adjusted incrementally.
    pub async fn toggle_reaction(
        &mut self,
        signal_ids: &[String],
        signal_id: &str,
        kind: ReactionKind,
    ) -> Result<()> {
        if self.role != UserType::Investor {
            return Err(StoreError::Forbidden {
                role: self.role,
                action: "react to signals",
            }
            .into());
        }

        let me = self.session.user_id.clone();
        let current = self
            .summary
            .reactions
            .get(signal_id)
            .and_then(|s| s.mine);

        match current {
            Some(existing) if existing == kind => {
                self.reactions
                    .delete_reaction(signal_id, &me)
                    .await
                    .context("removing reaction")?;
            }
            Some(_) => {
                self.reactions
                    .update_reaction(signal_id, &me, kind)
                    .await
                    .context("switching reaction")?;
            }
            None => {
                self.reactions
                    .insert_reaction(signal_id, &me, kind)
                    .await
                    .context("adding reaction")?;
            }
        }

        let reactions = self
            .reactions
            .fetch_reactions()
            .await
            .context("refetching reactions after toggle")?;
        self.summary.reactions = fold_reactions(signal_ids, &reactions, &me);
        Ok(())
    }
}
