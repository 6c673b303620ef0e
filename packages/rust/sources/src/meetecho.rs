//! Meetecho session recordings.
//!
//! Meetecho URLs follow a fixed pattern, so locating a recording is a string
//! operation. An optional HEAD request confirms the page exists.

use std::time::Duration;

use async_trait::async_trait;
use tracing::debug;

use ietf2vcon_shared::{Fetch, Result, Session};

use crate::{VideoAsset, VideoFetcher, http_client};

pub const DEFAULT_BASE_URL: &str = "https://meetings.conf.meetecho.com";

/// Builds Meetecho recording URLs.
#[derive(Debug, Clone)]
pub struct MeetechoLocator {
    base: String,
    head_check: Option<reqwest::Client>,
}

impl Default for MeetechoLocator {
    fn default() -> Self {
        Self::new(DEFAULT_BASE_URL)
    }
}

impl MeetechoLocator {
    pub fn new(base_url: &str) -> Self {
        Self {
            base: base_url.trim_end_matches('/').to_string(),
            head_check: None,
        }
    }

    /// Check each URL with a HEAD request before reporting it.
    pub fn with_head_check(mut self, timeout: Duration) -> Result<Self> {
        self.head_check = Some(http_client(timeout)?);
        Ok(self)
    }

    /// `{base}/ietf{n}/?group={acronym}`
    pub fn recording_url(&self, meeting: u32, group: &str) -> String {
        format!("{}/ietf{meeting}/?group={}", self.base, group.to_lowercase())
    }
}

#[async_trait]
impl VideoFetcher for MeetechoLocator {
    fn provider(&self) -> &str {
        "meetecho"
    }

    async fn fetch_video(&self, session: &Session) -> Fetch<VideoAsset> {
        let url = self.recording_url(session.meeting_number, &session.group_acronym);

        if let Some(client) = &self.head_check {
            match client.head(&url).send().await {
                Ok(resp) if resp.status().is_success() => {}
                Ok(resp) => {
                    return Fetch::unavailable(format!("{url}: HTTP {}", resp.status()));
                }
                Err(e) => return Fetch::unavailable(format!("{url}: {e}")),
            }
        }

        debug!(%url, "meetecho recording");
        Fetch::Available(VideoAsset {
            provider: "meetecho".into(),
            url,
            // A player page, not a media file.
            mimetype: "text/html".into(),
            duration: session.duration_seconds.map(|s| s as f64),
            title: Some(format!(
                "IETF {} {} Meetecho recording",
                session.meeting_number,
                session.group_acronym.to_uppercase()
            )),
            video_id: None,
        })
    }
}
