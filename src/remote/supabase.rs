// src/remote/supabase.rs
use crate::error::StoreError;
use crate::remote::rows::{
    CommentRow, FollowRow, ProfileRow, ProfileUpsert, ReactionRow, SignalInsert, SignalRow,
};
use crate::remote::traits::{
    CommentStore, FollowStore, ProfileStore, ReactionStore, SignalInsertStream, SignalStore,
};
use crate::remote::SubscriptionHandle;
use crate::types::{Comment, Profile, Reaction, ReactionKind, Session, Signal, SignalDraft};
use anyhow::{Context, Result};
use async_trait::async_trait;
use futures_util::{SinkExt, StreamExt};
use reqwest::{Client, Method, StatusCode};
use serde::de::DeserializeOwned;
use serde::{Deserialize, Serialize};
use serde_json::json;
use std::time::Duration;
use tokio::sync::mpsc;
use tokio_tungstenite::{connect_async, tungstenite::Message};
use tracing::{debug, error, info, warn};
use url::Url;

const HEARTBEAT_INTERVAL: Duration = Duration::from_secs(30);

/// REST + realtime client for the managed backend. One instance per session;
/// the access token is fixed at construction so no component ever reaches
/// into ambient auth state.
pub struct SupabaseClient {
    http_client: Client,
    base_url: String,
    api_key: String,
    session: Option<Session>,
}

impl SupabaseClient {
    pub fn new(base_url: impl Into<String>, api_key: impl Into<String>) -> Self {
        Self {
            http_client: Client::new(),
            base_url: base_url.into().trim_end_matches('/').to_string(),
            api_key: api_key.into(),
            session: None,
        }
    }

    pub fn with_session(mut self, session: Session) -> Self {
        self.session = Some(session);
        self
    }

    fn bearer(&self) -> &str {
        self.session
            .as_ref()
            .map(|s| s.access_token.as_str())
            .unwrap_or(&self.api_key)
    }

    /// Password-grant sign-in. Returns the session to thread through the
    /// data-layer constructors.
    pub async fn sign_in(&self, email: &str, password: &str) -> Result<Session, StoreError> {
        #[derive(Deserialize)]
        struct AuthUser {
            id: String,
        }
        #[derive(Deserialize)]
        struct AuthResponse {
            access_token: String,
            user: AuthUser,
        }

        let url = format!("{}/auth/v1/token?grant_type=password", self.base_url);
        let response = self
            .http_client
            .post(&url)
            .header("apikey", &self.api_key)
            .json(&json!({ "email": email, "password": password }))
            .send()
            .await?;

        let response = Self::check_status(response).await?;
        let auth: AuthResponse = response
            .json()
            .await
            .map_err(|e| StoreError::Decode(e.to_string()))?;

        info!(user_id = %auth.user.id, "signed in");
        Ok(Session {
            user_id: auth.user.id,
            access_token: auth.access_token,
        })
    }

    async fn check_status(response: reqwest::Response) -> Result<reqwest::Response, StoreError> {
        let status = response.status();
        if status.is_success() {
            return Ok(response);
        }
        if status == StatusCode::UNAUTHORIZED {
            return Err(StoreError::Unauthorized);
        }
        let message = response.text().await.unwrap_or_default();
        Err(StoreError::Api {
            status: status.as_u16(),
            message,
        })
    }

    fn table_url(&self, table: &str, query: &[(&str, String)]) -> Result<String, StoreError> {
        let query_string =
            serde_urlencoded::to_string(query).map_err(|e| StoreError::Decode(e.to_string()))?;
        Ok(format!(
            "{}/rest/v1/{}?{}",
            self.base_url, table, query_string
        ))
    }

    async fn get_rows<T: DeserializeOwned>(
        &self,
        table: &str,
        query: &[(&str, String)],
    ) -> Result<Vec<T>, StoreError> {
        let url = self.table_url(table, query)?;
        let response = self
            .http_client
            .get(&url)
            .header("apikey", &self.api_key)
            .bearer_auth(self.bearer())
            .send()
            .await?;
        let response = Self::check_status(response).await?;
        response
            .json::<Vec<T>>()
            .await
            .map_err(|e| StoreError::Decode(e.to_string()))
    }

    /// Insert returning the representation the backend produced.
    async fn insert_returning<T: DeserializeOwned>(
        &self,
        table: &str,
        body: &impl Serialize,
    ) -> Result<T, StoreError> {
        let url = self.table_url(table, &[])?;
        let response = self
            .http_client
            .post(&url)
            .header("apikey", &self.api_key)
            .bearer_auth(self.bearer())
            .header("Prefer", "return=representation")
            .json(body)
            .send()
            .await?;
        let response = Self::check_status(response).await?;
        let mut rows: Vec<T> = response
            .json()
            .await
            .map_err(|e| StoreError::Decode(e.to_string()))?;
        if rows.is_empty() {
            return Err(StoreError::Decode(format!(
                "insert into {table} returned no representation"
            )));
        }
        Ok(rows.remove(0))
    }

    /// Fire-and-forget mutation: plain insert, or PATCH/DELETE matched by the
    /// query filters.
    async fn mutate(
        &self,
        method: Method,
        table: &str,
        query: &[(&str, String)],
        body: Option<serde_json::Value>,
        prefer: Option<&str>,
    ) -> Result<(), StoreError> {
        let url = self.table_url(table, query)?;
        let mut request = self
            .http_client
            .request(method, &url)
            .header("apikey", &self.api_key)
            .bearer_auth(self.bearer());
        if let Some(prefer) = prefer {
            request = request.header("Prefer", prefer);
        }
        if let Some(body) = body {
            request = request.json(&body);
        }
        let response = request.send().await?;
        Self::check_status(response).await?;
        Ok(())
    }

    // PostgREST filter syntax: ?<column>=eq.<value>
    fn eq(column: &'static str, value: &str) -> (&'static str, String) {
        (column, format!("eq.{value}"))
    }
}

#[async_trait]
impl SignalStore for SupabaseClient {
    async fn fetch_signals(&self) -> Result<Vec<Signal>> {
        let rows: Vec<SignalRow> = self
            .get_rows(
                "signals",
                &[
                    ("select", "*".to_string()),
                    ("order", "timestamp.desc".to_string()),
                ],
            )
            .await
            .context("fetching signals")?;
        Ok(rows.into_iter().map(Signal::from).collect())
    }

    async fn insert_signal(&self, draft: &SignalDraft) -> Result<Signal> {
        let row: SignalRow = self
            .insert_returning("signals", &SignalInsert::from(draft))
            .await
            .context("inserting signal")?;
        Ok(row.into())
    }
}

#[async_trait]
impl ReactionStore for SupabaseClient {
    async fn fetch_reactions(&self) -> Result<Vec<Reaction>> {
        let rows: Vec<ReactionRow> = self
            .get_rows(
                "reactions",
                &[("select", "signal_id,user_id,type".to_string())],
            )
            .await
            .context("fetching reactions")?;
        Ok(rows.into_iter().map(Reaction::from).collect())
    }

    async fn insert_reaction(
        &self,
        signal_id: &str,
        user_id: &str,
        kind: ReactionKind,
    ) -> Result<()> {
        self.mutate(
            Method::POST,
            "reactions",
            &[],
            Some(json!({ "signal_id": signal_id, "user_id": user_id, "type": kind })),
            None,
        )
        .await
        .context("inserting reaction")
    }

    async fn update_reaction(
        &self,
        signal_id: &str,
        user_id: &str,
        kind: ReactionKind,
    ) -> Result<()> {
        self.mutate(
            Method::PATCH,
            "reactions",
            &[Self::eq("signal_id", signal_id), Self::eq("user_id", user_id)],
            Some(json!({ "type": kind })),
            None,
        )
        .await
        .context("updating reaction")
    }

    async fn delete_reaction(&self, signal_id: &str, user_id: &str) -> Result<()> {
        self.mutate(
            Method::DELETE,
            "reactions",
            &[Self::eq("signal_id", signal_id), Self::eq("user_id", user_id)],
            None,
            None,
        )
        .await
        .context("deleting reaction")
    }
}

#[async_trait]
impl CommentStore for SupabaseClient {
    async fn fetch_comments(&self, signal_id: &str) -> Result<Vec<Comment>> {
        let rows: Vec<CommentRow> = self
            .get_rows(
                "comments",
                &[
                    ("select", "*".to_string()),
                    Self::eq("signal_id", signal_id),
                    ("order", "created_at.asc".to_string()),
                ],
            )
            .await
            .context("fetching comments")?;
        Ok(rows.into_iter().map(Comment::from).collect())
    }

    async fn fetch_all_comments(&self) -> Result<Vec<Comment>> {
        let rows: Vec<CommentRow> = self
            .get_rows("comments", &[("select", "*".to_string())])
            .await
            .context("fetching all comments")?;
        Ok(rows.into_iter().map(Comment::from).collect())
    }

    async fn insert_comment<'a>(
        &self,
        signal_id: &str,
        user_id: &str,
        content: &str,
        parent_id: Option<&'a str>,
    ) -> Result<()> {
        self.mutate(
            Method::POST,
            "comments",
            &[],
            Some(json!({
                "signal_id": signal_id,
                "user_id": user_id,
                "content": content,
                "parent_id": parent_id,
            })),
            None,
        )
        .await
        .context("inserting comment")
    }

    async fn update_comment(&self, id: &str, content: &str) -> Result<()> {
        self.mutate(
            Method::PATCH,
            "comments",
            &[Self::eq("id", id)],
            Some(json!({ "content": content })),
            None,
        )
        .await
        .context("updating comment")
    }

    async fn delete_comment(&self, id: &str) -> Result<()> {
        self.mutate(Method::DELETE, "comments", &[Self::eq("id", id)], None, None)
            .await
            .context("deleting comment")
    }
}

#[async_trait]
impl ProfileStore for SupabaseClient {
    async fn fetch_profile(&self, user_id: &str) -> Result<Option<Profile>> {
        let rows: Vec<ProfileRow> = self
            .get_rows(
                "profiles",
                &[("select", "*".to_string()), Self::eq("user_id", user_id)],
            )
            .await
            .context("fetching profile")?;
        Ok(rows.into_iter().next().map(Profile::from))
    }

    async fn fetch_profiles(&self) -> Result<Vec<Profile>> {
        let rows: Vec<ProfileRow> = self
            .get_rows("profiles", &[("select", "*".to_string())])
            .await
            .context("fetching profiles")?;
        Ok(rows.into_iter().map(Profile::from).collect())
    }

    async fn fetch_profiles_by_ids(&self, user_ids: &[String]) -> Result<Vec<Profile>> {
        if user_ids.is_empty() {
            return Ok(Vec::new());
        }
        let filter = format!("in.({})", user_ids.join(","));
        let rows: Vec<ProfileRow> = self
            .get_rows(
                "profiles",
                &[("select", "*".to_string()), ("user_id", filter)],
            )
            .await
            .context("fetching profiles by ids")?;
        Ok(rows.into_iter().map(Profile::from).collect())
    }

    async fn upsert_profile(&self, profile: &Profile) -> Result<()> {
        let body = serde_json::to_value(ProfileUpsert::from(profile))
            .map_err(|e| StoreError::Decode(e.to_string()))?;
        self.mutate(
            Method::POST,
            "profiles",
            &[("on_conflict", "user_id".to_string())],
            Some(body),
            Some("resolution=merge-duplicates"),
        )
        .await
        .context("upserting profile")
    }
}

#[async_trait]
impl FollowStore for SupabaseClient {
    async fn is_following(&self, trader_id: &str, investor_id: &str) -> Result<bool> {
        let rows: Vec<FollowRow> = self
            .get_rows(
                "follows",
                &[
                    ("select", "trader_id,investor_id".to_string()),
                    Self::eq("trader_id", trader_id),
                    Self::eq("investor_id", investor_id),
                ],
            )
            .await
            .context("checking follow edge")?;
        Ok(!rows.is_empty())
    }

    async fn follow(&self, trader_id: &str, investor_id: &str) -> Result<()> {
        self.mutate(
            Method::POST,
            "follows",
            &[],
            Some(json!({ "trader_id": trader_id, "investor_id": investor_id })),
            None,
        )
        .await
        .context("inserting follow edge")
    }

    async fn unfollow(&self, trader_id: &str, investor_id: &str) -> Result<()> {
        self.mutate(
            Method::DELETE,
            "follows",
            &[
                Self::eq("trader_id", trader_id),
                Self::eq("investor_id", investor_id),
            ],
            None,
            None,
        )
        .await
        .context("deleting follow edge")
    }

    async fn follower_ids(&self, trader_id: &str) -> Result<Vec<String>> {
        let rows: Vec<FollowRow> = self
            .get_rows(
                "follows",
                &[
                    ("select", "trader_id,investor_id".to_string()),
                    Self::eq("trader_id", trader_id),
                ],
            )
            .await
            .context("fetching follower ids")?;
        Ok(rows.into_iter().map(|e| e.investor_id).collect())
    }

    async fn follower_count(&self, trader_id: &str) -> Result<u64> {
        let url = self.table_url(
            "follows",
            &[
                ("select", "trader_id".to_string()),
                Self::eq("trader_id", trader_id),
            ],
        )?;
        let response = self
            .http_client
            .head(&url)
            .header("apikey", &self.api_key)
            .bearer_auth(self.bearer())
            .header("Prefer", "count=exact")
            .send()
            .await
            .map_err(StoreError::Http)?;
        let response = Self::check_status(response).await?;

        // Content-Range: 0-24/25 -- the total sits after the slash.
        let total = response
            .headers()
            .get("content-range")
            .and_then(|v| v.to_str().ok())
            .and_then(|v| v.rsplit('/').next())
            .and_then(|v| v.parse::<u64>().ok())
            .ok_or_else(|| StoreError::Decode("missing content-range count".to_string()))?;
        Ok(total)
    }

    async fn followed_trader_ids(&self, investor_id: &str) -> Result<Vec<String>> {
        let rows: Vec<FollowRow> = self
            .get_rows(
                "follows",
                &[
                    ("select", "trader_id,investor_id".to_string()),
                    Self::eq("investor_id", investor_id),
                ],
            )
            .await
            .context("fetching followed trader ids")?;
        Ok(rows.into_iter().map(|e| e.trader_id).collect())
    }
}

/// Pull the inserted row out of a realtime frame. Both the legacy shape
/// (`payload.record`) and the channel-config shape (`payload.data.record`)
/// appear in the wild depending on the server version.
fn extract_inserted_row(frame: &serde_json::Value) -> Option<&serde_json::Value> {
    let payload = frame.get("payload")?;
    payload
        .get("record")
        .or_else(|| payload.get("data").and_then(|d| d.get("record")))
}

#[async_trait]
impl SignalInsertStream for SupabaseClient {
    async fn subscribe_inserts(&self, sender: mpsc::Sender<Signal>) -> Result<SubscriptionHandle> {
        let ws_base = self
            .base_url
            .replacen("https://", "wss://", 1)
            .replacen("http://", "ws://", 1);
        let ws_url = format!(
            "{}/realtime/v1/websocket?apikey={}&vsn=1.0.0",
            ws_base, self.api_key
        );
        let url = Url::parse(&ws_url).context("parsing realtime url")?;

        info!("starting realtime task for signals inserts");

        let task = tokio::spawn(async move {
            let (ws_stream, _) = match connect_async(url).await {
                Ok(ok) => ok,
                Err(e) => {
                    error!("failed to connect realtime websocket: {}", e);
                    return;
                }
            };
            let (mut write, mut read) = ws_stream.split();
            info!("realtime websocket connected");

            let join = json!({
                "topic": "realtime:public:signals",
                "event": "phx_join",
                "payload": {
                    "config": {
                        "postgres_changes": [
                            { "event": "INSERT", "schema": "public", "table": "signals" }
                        ]
                    }
                },
                "ref": "1",
            });
            if let Err(e) = write.send(Message::Text(join.to_string())).await {
                error!("failed to join realtime channel: {}", e);
                return;
            }

            let mut heartbeat = tokio::time::interval(HEARTBEAT_INTERVAL);
            heartbeat.tick().await; // first tick is immediate

            loop {
                tokio::select! {
                    _ = heartbeat.tick() => {
                        let beat = json!({
                            "topic": "phoenix",
                            "event": "heartbeat",
                            "payload": {},
                            "ref": null,
                        });
                        if let Err(e) = write.send(Message::Text(beat.to_string())).await {
                            error!("realtime heartbeat failed: {}", e);
                            break;
                        }
                    }
                    message = read.next() => {
                        let Some(message) = message else { break };
                        match message {
                            Ok(msg) => {
                                let Ok(text) = msg.to_text() else { continue };
                                let Ok(frame) = serde_json::from_str::<serde_json::Value>(text) else {
                                    continue;
                                };
                                let Some(record) = extract_inserted_row(&frame) else { continue };
                                match serde_json::from_value::<SignalRow>(record.clone()) {
                                    Ok(row) => {
                                        debug!(id = %row.id, "realtime insert received");
                                        if sender.send(row.into()).await.is_err() {
                                            break;
                                        }
                                    }
                                    Err(e) => warn!("undecodable realtime row: {}", e),
                                }
                            }
                            Err(e) => {
                                error!("realtime websocket error: {}", e);
                                break;
                            }
                        }
                    }
                }
            }
            info!("realtime task finished");
        });

        Ok(SubscriptionHandle::new(task))
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn extracts_record_from_legacy_frame() {
        let frame = json!({
            "topic": "realtime:public:signals",
            "event": "INSERT",
            "payload": { "record": { "id": 1 } },
        });
        assert!(extract_inserted_row(&frame).is_some());
    }

    #[test]
    fn extracts_record_from_channel_config_frame() {
        let frame = json!({
            "topic": "realtime:public:signals",
            "event": "postgres_changes",
            "payload": { "data": { "type": "INSERT", "record": { "id": 1 } } },
        });
        assert!(extract_inserted_row(&frame).is_some());
    }

    #[test]
    fn ignores_frames_without_record() {
        let frame = json!({ "topic": "phoenix", "event": "phx_reply", "payload": {} });
        assert!(extract_inserted_row(&frame).is_none());
    }
}
