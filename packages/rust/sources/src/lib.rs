//! External data sources for a conversion run.
//!
//! Each capability is reached through an object-safe trait so the
//! orchestrator can be driven by real clients or by test fakes. Every trait
//! method returns a [`Fetch`]: implementations convert their internal errors
//! into [`Fetch::Unavailable`] at this boundary and never fail outright.

pub mod datatracker;
pub mod meetecho;
mod process;
pub mod whisper;
pub mod youtube;
pub mod zulip;

use std::path::{Path, PathBuf};
use std::time::Duration;

use async_trait::async_trait;
use serde::{Deserialize, Serialize};

use ietf2vcon_shared::{
    ChatMessage, Fetch, Ietf2VconError, Material, Meeting, Person, Result, Session, TimeWindow,
    WhisperModel,
};
use ietf2vcon_vcon::Segment;

pub use datatracker::DatatrackerClient;
pub use meetecho::MeetechoLocator;
pub use whisper::WhisperCli;
pub use youtube::YoutubeClient;
pub use zulip::ZulipClient;

/// User-Agent for every HTTP request.
pub const USER_AGENT: &str = concat!("ietf2vcon/", env!("CARGO_PKG_VERSION"));

/// Build an HTTP client with the crate User-Agent and a request timeout.
pub(crate) fn http_client(timeout: Duration) -> Result<reqwest::Client> {
    reqwest::Client::builder()
        .user_agent(USER_AGENT)
        .timeout(timeout)
        .build()
        .map_err(|e| Ietf2VconError::Network(format!("client build: {e}")))
}

// ---------------------------------------------------------------------------
// Payload types
// ---------------------------------------------------------------------------

/// Meeting and session metadata for one conversion.
#[derive(Debug, Clone, PartialEq)]
pub struct ResolvedSession {
    pub meeting: Meeting,
    pub session: Session,
    /// Non-fatal oddities found while resolving (e.g. index out of range).
    pub notes: Vec<String>,
}

/// A located session recording.
#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
pub struct VideoAsset {
    /// `youtube` or `meetecho`.
    pub provider: String,
    pub url: String,
    pub mimetype: String,
    /// Seconds.
    #[serde(default, skip_serializing_if = "Option::is_none")]
    pub duration: Option<f64>,
    #[serde(default, skip_serializing_if = "Option::is_none")]
    pub title: Option<String>,
    #[serde(default, skip_serializing_if = "Option::is_none")]
    pub video_id: Option<String>,
}

/// Output of a speech-to-text run.
#[derive(Debug, Clone, PartialEq)]
pub struct SpeechResult {
    pub segments: Vec<Segment>,
    pub language: Option<String>,
}

// ---------------------------------------------------------------------------
// Collaborator traits
// ---------------------------------------------------------------------------

/// Resolves meeting/session metadata and the people who ran it.
#[async_trait]
pub trait SessionResolver: Send + Sync {
    /// Meeting metadata plus the `index`-th session of `group`.
    async fn resolve(&self, meeting: u32, group: &str, index: usize) -> Fetch<ResolvedSession>;

    /// Current chairs of `group`.
    async fn chairs(&self, group: &str) -> Fetch<Vec<Person>>;
}

/// Locates (and optionally downloads) a session recording.
#[async_trait]
pub trait VideoFetcher: Send + Sync {
    /// Short provider name, used in reports and dialog metadata.
    fn provider(&self) -> &str;

    async fn fetch_video(&self, session: &Session) -> Fetch<VideoAsset>;

    /// Download the asset to a local file.
    async fn download(&self, _asset: &VideoAsset) -> Fetch<PathBuf> {
        Fetch::unavailable(format!("{} recordings cannot be downloaded", self.provider()))
    }
}

/// Meeting materials (slides, agenda, minutes, ...).
#[async_trait]
pub trait MaterialsFetcher: Send + Sync {
    async fn fetch_materials(&self, meeting: u32, group: &str) -> Fetch<Vec<Material>>;

    /// Raw content of one material, for embedding inline.
    async fn material_content(&self, material: &Material) -> Fetch<Vec<u8>> {
        Fetch::unavailable(format!("cannot download {}", material.url))
    }
}

/// Published captions for an online video.
#[async_trait]
pub trait CaptionFetcher: Send + Sync {
    async fn fetch_captions(&self, video_url: &str) -> Fetch<Vec<Segment>>;
}

/// Local speech-to-text.
#[async_trait]
pub trait SpeechToText: Send + Sync {
    async fn transcribe(&self, media: &Path, model: WhisperModel) -> Fetch<SpeechResult>;
}

/// Session chat log.
#[async_trait]
pub trait ChatFetcher: Send + Sync {
    async fn fetch_chat(
        &self,
        session: &Session,
        window: Option<TimeWindow>,
    ) -> Fetch<Vec<ChatMessage>>;
}
