//! IETF Zulip chat history.

use std::time::Duration;

use async_trait::async_trait;
use chrono::{DateTime, Utc};
use serde::Deserialize;
use tracing::{debug, instrument, warn};
use url::Url;

use ietf2vcon_shared::{
    ChatMessage, Fetch, Ietf2VconError, Result, Session, TimeWindow, ZulipCredentials,
};

use crate::{ChatFetcher, http_client};

/// Messages requested per stream, newest first.
const HISTORY_LIMIT: u32 = 5000;

#[derive(Debug, Deserialize)]
struct MessagesResponse {
    #[serde(default)]
    messages: Vec<ZulipMessage>,
}

#[derive(Debug, Deserialize)]
struct ZulipMessage {
    timestamp: i64,
    #[serde(default)]
    sender_full_name: Option<String>,
    #[serde(default)]
    sender_email: Option<String>,
    #[serde(default)]
    content: String,
    #[serde(default)]
    subject: Option<String>,
}

/// Zulip REST client. Without credentials every fetch is unavailable.
#[derive(Debug, Clone)]
pub struct ZulipClient {
    client: reqwest::Client,
    base: Url,
    credentials: Option<ZulipCredentials>,
}

impl ZulipClient {
    pub fn new(
        base_url: &str,
        credentials: Option<ZulipCredentials>,
        timeout: Duration,
    ) -> Result<Self> {
        let base = Url::parse(base_url)
            .map_err(|e| Ietf2VconError::config(format!("invalid Zulip URL: {e}")))?;
        Ok(Self {
            client: http_client(timeout)?,
            base,
            credentials,
        })
    }

    pub fn has_credentials(&self) -> bool {
        self.credentials.is_some()
    }

    /// Latest messages of `stream`, oldest first. `Ok(None)` if the stream
    /// does not exist.
    #[instrument(skip(self, credentials))]
    async fn stream_messages(
        &self,
        credentials: &ZulipCredentials,
        stream: &str,
    ) -> Result<Option<Vec<ChatMessage>>> {
        let url = self
            .base
            .join("/api/v1/messages")
            .map_err(|e| Ietf2VconError::config(format!("Zulip URL: {e}")))?;
        let narrow = serde_json::json!([{ "operator": "stream", "operand": stream }]).to_string();

        let response = self
            .client
            .get(url.clone())
            .basic_auth(&credentials.email, Some(&credentials.api_key))
            .query(&[
                ("anchor", "newest".to_string()),
                ("num_before", HISTORY_LIMIT.to_string()),
                ("num_after", "0".to_string()),
                ("narrow", narrow),
            ])
            .send()
            .await
            .map_err(|e| Ietf2VconError::Network(format!("{url}: {e}")))?;

        let status = response.status();
        if status == reqwest::StatusCode::NOT_FOUND {
            return Ok(None);
        }
        if !status.is_success() {
            return Err(Ietf2VconError::Network(format!("{url}: HTTP {status}")));
        }

        let body: MessagesResponse = response
            .json()
            .await
            .map_err(|e| Ietf2VconError::parse(format!("Zulip messages: {e}")))?;

        let mut messages: Vec<ChatMessage> = body
            .messages
            .into_iter()
            .filter_map(|m| {
                let Some(timestamp) = DateTime::<Utc>::from_timestamp(m.timestamp, 0) else {
                    warn!(timestamp = m.timestamp, "skipping message with bad timestamp");
                    return None;
                };
                Some(ChatMessage {
                    timestamp,
                    sender: m.sender_full_name.unwrap_or_else(|| "Unknown".into()),
                    sender_email: m.sender_email,
                    content: m.content,
                    topic: m.subject,
                    stream: Some(stream.to_string()),
                })
            })
            .collect();
        messages.sort_by_key(|m| m.timestamp);
        Ok(Some(messages))
    }
}

#[async_trait]
impl ChatFetcher for ZulipClient {
    async fn fetch_chat(
        &self,
        session: &Session,
        window: Option<TimeWindow>,
    ) -> Fetch<Vec<ChatMessage>> {
        let Some(credentials) = &self.credentials else {
            return Fetch::unavailable("no Zulip credentials configured");
        };
        let stream = session.group_acronym.to_lowercase();

        match self.stream_messages(credentials, &stream).await {
            Ok(Some(messages)) => {
                let total = messages.len();
                let messages: Vec<ChatMessage> = match window {
                    Some(w) => messages.into_iter().filter(|m| w.contains(m.timestamp)).collect(),
                    None => messages,
                };
                debug!(stream = %stream, total, kept = messages.len(), "zulip history");
                Fetch::Available(messages)
                    .non_empty(format!("no messages in #{stream} during the session"))
            }
            Ok(None) => Fetch::unavailable(format!("Zulip stream #{stream} not found")),
            Err(e) => Fetch::Unavailable(e.to_string()),
        }
    }
}
