// src/feed/comments.rs
use crate::error::StoreError;
use crate::remote::traits::{CommentStore, ProfileStore};
use crate::types::{Comment, Session, UserType};
use anyhow::{bail, Context, Result};
use std::collections::{HashMap, HashSet};
use std::sync::Arc;

const FALLBACK_AUTHOR: &str = "Anonymous";

/// One comment enriched with display data.
#[derive(Debug, Clone, PartialEq)]
pub struct ThreadComment {
    pub comment: Comment,
    pub author: String,
    /// Display name of the comment being replied to, for `@name` rendering.
    pub reply_to_author: Option<String>,
}

/// A signal's comments, split into roots and replies grouped by parent.
/// Arbitrarily nested parents all collapse into their root's reply list for
/// the two-level rendering.
#[derive(Debug, Default, Clone)]
pub struct CommentThread {
    pub roots: Vec<ThreadComment>,
    pub replies: HashMap<String, Vec<ThreadComment>>,
}

impl CommentThread {
    pub fn total(&self) -> usize {
        self.roots.len() + self.replies.values().map(Vec::len).sum::<usize>()
    }
}

/// Build the rendered thread from raw rows (oldest first) and a user-id to
/// display-name map. A reply whose parent row is gone is re-parented to root
/// so it stays addressable; storage-side cascade is the schema owner's call.
pub fn assemble_thread(comments: Vec<Comment>, names: &HashMap<String, String>) -> CommentThread {
    let known_ids: HashSet<String> = comments.iter().map(|c| c.id.clone()).collect();
    let authors_by_id: HashMap<String, String> = comments
        .iter()
        .map(|c| (c.id.clone(), display_name(names, &c.user_id)))
        .collect();

    let mut thread = CommentThread::default();
    for comment in comments {
        let author = display_name(names, &comment.user_id);
        let parent = comment
            .parent_id
            .as_ref()
            .filter(|p| known_ids.contains(*p))
            .cloned();
        match parent {
            Some(parent_id) => {
                let reply_to_author = authors_by_id.get(&parent_id).cloned();
                thread.replies.entry(parent_id).or_default().push(ThreadComment {
                    comment,
                    author,
                    reply_to_author,
                });
            }
            None => thread.roots.push(ThreadComment {
                comment,
                author,
                reply_to_author: None,
            }),
        }
    }
    thread
}

fn display_name(names: &HashMap<String, String>, user_id: &str) -> String {
    names
        .get(user_id)
        .filter(|n| !n.is_empty())
        .cloned()
        .unwrap_or_else(|| FALLBACK_AUTHOR.to_string())
}

/// Comment operations for one user session. Only investors may write; edits
/// and deletes are limited to the caller's own comments.
pub struct CommentBoard {
    comments: Arc<dyn CommentStore>,
    profiles: Arc<dyn ProfileStore>,
    session: Session,
    role: UserType,
}

impl CommentBoard {
    pub fn new(
        comments: Arc<dyn CommentStore>,
        profiles: Arc<dyn ProfileStore>,
        session: Session,
        role: UserType,
    ) -> Self {
        Self {
            comments,
            profiles,
            session,
            role,
        }
    }

    pub async fn fetch_thread(&self, signal_id: &str) -> Result<CommentThread> {
        let rows = self
            .comments
            .fetch_comments(signal_id)
            .await
            .context("loading comment thread")?;

        let mut author_ids: Vec<String> = rows.iter().map(|c| c.user_id.clone()).collect();
        author_ids.sort();
        author_ids.dedup();

        let profiles = self
            .profiles
            .fetch_profiles_by_ids(&author_ids)
            .await
            .context("loading comment authors")?;
        let names: HashMap<String, String> = profiles
            .into_iter()
            .map(|p| (p.user_id, p.full_name))
            .collect();

        Ok(assemble_thread(rows, &names))
    }

    pub async fn post(&self, signal_id: &str, content: &str) -> Result<()> {
        self.ensure_investor("comment")?;
        let content = content.trim();
        if content.is_empty() {
            bail!("empty comment");
        }
        self.comments
            .insert_comment(signal_id, &self.session.user_id, content, None)
            .await
            .context("posting comment")
    }

    /// Reply under a root comment. The mention prefix is stored with the
    /// content, matching how threads render the reply target.
    pub async fn reply(&self, signal_id: &str, parent: &ThreadComment, content: &str) -> Result<()> {
        self.ensure_investor("reply")?;
        let content = content.trim();
        if content.is_empty() {
            bail!("empty reply");
        }
        let body = format!("@{} {}", parent.author, content);
        self.comments
            .insert_comment(signal_id, &self.session.user_id, &body, Some(&parent.comment.id))
            .await
            .context("posting reply")
    }

    pub async fn edit(&self, comment: &Comment, content: &str) -> Result<()> {
        if comment.user_id != self.session.user_id {
            bail!("cannot edit another user's comment");
        }
        let content = content.trim();
        if content.is_empty() {
            bail!("empty comment");
        }
        self.comments
            .update_comment(&comment.id, content)
            .await
            .context("editing comment")
    }

    /// Deletes only the targeted row; replies are left in place and re-parent
    /// to root on the next thread assembly.
    pub async fn delete(&self, comment: &Comment) -> Result<()> {
        if comment.user_id != self.session.user_id {
            bail!("cannot delete another user's comment");
        }
        self.comments
            .delete_comment(&comment.id)
            .await
            .context("deleting comment")
    }

    fn ensure_investor(&self, action: &'static str) -> Result<()> {
        if self.role != UserType::Investor {
            return Err(StoreError::Forbidden {
                role: self.role,
                action,
            }
            .into());
        }
        Ok(())
    }
}
