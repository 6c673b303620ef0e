//! Per-capability source selection.
//!
//! The fallback policy is plain data ([`SourcePolicy`]); [`plan_video`] and
//! [`plan_transcript`] turn it into an ordered list of sources, and
//! [`SourceSelector`] walks that list against the configured collaborators.
//! Missing data is a [`Fetch`]; the only error is a transcript whose segments
//! cannot form a valid analysis entry.

use std::future::Future;
use std::path::{Path, PathBuf};
use std::sync::Arc;
use std::time::Duration;

use tracing::{debug, info, warn};

use ietf2vcon_shared::{
    AppConfig, BothVideoMode, ChatMessage, Fetch, Material, Person, Result, Session,
    TranscriptPreference, VideoPreference, WhisperModel,
};
use ietf2vcon_sources::{
    CaptionFetcher, ChatFetcher, MaterialsFetcher, ResolvedSession, SessionResolver, SpeechToText,
    VideoAsset, VideoFetcher,
};
use ietf2vcon_vcon::Transcript;

// ---------------------------------------------------------------------------
// Policy
// ---------------------------------------------------------------------------

#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub struct VideoPolicy {
    pub preference: VideoPreference,
    pub both_mode: BothVideoMode,
    /// Download the YouTube recording and embed it inline.
    pub download: bool,
}

#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub struct TranscriptPolicy {
    pub preference: TranscriptPreference,
    pub whisper_model: WhisperModel,
}

/// Source preferences and time bounds for one conversion.
#[derive(Debug, Clone, PartialEq, Eq)]
pub struct SourcePolicy {
    pub video: VideoPolicy,
    pub transcript: TranscriptPolicy,
    pub fetch_timeout: Duration,
    pub download_timeout: Duration,
    pub transcribe_timeout: Duration,
}

impl SourcePolicy {
    pub fn from_config(config: &AppConfig) -> Self {
        Self {
            video: VideoPolicy {
                preference: config.defaults.video_source,
                both_mode: config.defaults.both_video_mode,
                download: false,
            },
            transcript: TranscriptPolicy {
                preference: config.defaults.transcript_source,
                whisper_model: config.defaults.whisper_model,
            },
            fetch_timeout: config.timeouts.fetch(),
            download_timeout: config.timeouts.download(),
            transcribe_timeout: config.timeouts.transcribe(),
        }
    }
}

impl Default for SourcePolicy {
    fn default() -> Self {
        Self::from_config(&AppConfig::default())
    }
}

// ---------------------------------------------------------------------------
// Plans
// ---------------------------------------------------------------------------

#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub enum VideoSource {
    Youtube,
    Meetecho,
}

/// Ordered video sources. With `take_all`, every available source becomes a
/// dialog entry; otherwise the first available one wins.
#[derive(Debug, Clone, PartialEq, Eq)]
pub struct VideoPlan {
    pub sources: Vec<VideoSource>,
    pub take_all: bool,
}

pub fn plan_video(policy: &VideoPolicy) -> VideoPlan {
    match policy.preference {
        VideoPreference::Youtube => VideoPlan {
            sources: vec![VideoSource::Youtube],
            take_all: false,
        },
        VideoPreference::Meetecho => VideoPlan {
            sources: vec![VideoSource::Meetecho],
            take_all: false,
        },
        VideoPreference::Both => VideoPlan {
            sources: vec![VideoSource::Youtube, VideoSource::Meetecho],
            take_all: policy.both_mode == BothVideoMode::Supplement,
        },
    }
}

#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub enum TranscriptSource {
    /// Published YouTube captions. Needs a YouTube video.
    Captions,
    /// Local speech-to-text. Needs downloaded media.
    Whisper,
}

pub fn plan_transcript(policy: &TranscriptPolicy) -> Vec<TranscriptSource> {
    match policy.preference {
        TranscriptPreference::Auto => vec![TranscriptSource::Captions, TranscriptSource::Whisper],
        TranscriptPreference::Youtube => vec![TranscriptSource::Captions],
        TranscriptPreference::Whisper => vec![TranscriptSource::Whisper],
    }
}

// ---------------------------------------------------------------------------
// Collaborators
// ---------------------------------------------------------------------------

/// The external sources available to a conversion. Missing entries make the
/// corresponding capability unavailable.
#[derive(Clone)]
pub struct Collaborators {
    pub resolver: Arc<dyn SessionResolver>,
    pub youtube: Option<Arc<dyn VideoFetcher>>,
    pub meetecho: Option<Arc<dyn VideoFetcher>>,
    pub materials: Option<Arc<dyn MaterialsFetcher>>,
    pub captions: Option<Arc<dyn CaptionFetcher>>,
    pub speech: Option<Arc<dyn SpeechToText>>,
    pub chat: Option<Arc<dyn ChatFetcher>>,
}

impl Collaborators {
    /// Only a session resolver; every other capability is unavailable.
    pub fn new(resolver: Arc<dyn SessionResolver>) -> Self {
        Self {
            resolver,
            youtube: None,
            meetecho: None,
            materials: None,
            captions: None,
            speech: None,
            chat: None,
        }
    }
}

/// A video chosen for the document.
#[derive(Debug, Clone, PartialEq)]
pub struct SelectedVideo {
    pub asset: VideoAsset,
    /// Downloaded media, if requested and successful.
    pub local_path: Option<PathBuf>,
}

impl SelectedVideo {
    pub fn is_youtube(&self) -> bool {
        self.asset.provider == "youtube"
    }
}

/// A transcript and the selected video it was derived from.
#[derive(Debug, Clone, PartialEq)]
pub struct SourcedTranscript {
    pub transcript: Transcript,
    /// Index into the selected videos.
    pub video: usize,
}

/// Result of video selection: the videos (primary first) plus warnings about
/// degraded steps.
#[derive(Debug, Clone, PartialEq)]
pub struct VideoSelection {
    pub videos: Fetch<Vec<SelectedVideo>>,
    pub warnings: Vec<String>,
}

// ---------------------------------------------------------------------------
// Selector
// ---------------------------------------------------------------------------

/// Walks the fetch plans against the configured collaborators.
#[derive(Clone)]
pub struct SourceSelector {
    sources: Collaborators,
    policy: SourcePolicy,
}

impl SourceSelector {
    pub fn new(sources: Collaborators, policy: SourcePolicy) -> Self {
        Self { sources, policy }
    }

    pub fn policy(&self) -> &SourcePolicy {
        &self.policy
    }

    pub async fn resolve(&self, meeting: u32, group: &str, index: usize) -> Fetch<ResolvedSession> {
        bounded(
            "session lookup",
            self.policy.fetch_timeout,
            self.sources.resolver.resolve(meeting, group, index),
        )
        .await
    }

    pub async fn chairs(&self, group: &str) -> Fetch<Vec<Person>> {
        bounded(
            "chair lookup",
            self.policy.fetch_timeout,
            self.sources.resolver.chairs(group),
        )
        .await
    }

    pub async fn video(&self, session: &Session) -> VideoSelection {
        let plan = plan_video(&self.policy.video);
        let mut videos = Vec::new();
        let mut reasons = Vec::new();
        let mut warnings = Vec::new();

        for source in plan.sources {
            let fetcher = match source {
                VideoSource::Youtube => self.sources.youtube.as_ref(),
                VideoSource::Meetecho => self.sources.meetecho.as_ref(),
            };
            let Some(fetcher) = fetcher else {
                reasons.push(format!("{source:?} source not configured").to_lowercase());
                continue;
            };

            let asset = match bounded(
                "video lookup",
                self.policy.fetch_timeout,
                fetcher.fetch_video(session),
            )
            .await
            {
                Fetch::Available(asset) => asset,
                Fetch::Unavailable(reason) => {
                    debug!(provider = fetcher.provider(), %reason, "video source unavailable");
                    reasons.push(format!("{}: {reason}", fetcher.provider()));
                    continue;
                }
            };

            let local_path = if self.policy.video.download && source == VideoSource::Youtube {
                match bounded("download", self.policy.download_timeout, fetcher.download(&asset)).await
                {
                    Fetch::Available(path) => {
                        info!(path = %path.display(), "downloaded recording");
                        Some(path)
                    }
                    Fetch::Unavailable(reason) => {
                        warn!(%reason, "download failed, keeping URL reference");
                        warnings.push(format!(
                            "video download failed ({reason}); using URL reference"
                        ));
                        None
                    }
                }
            } else {
                None
            };

            videos.push(SelectedVideo { asset, local_path });
            if !plan.take_all {
                break;
            }
        }

        let videos = if videos.is_empty() {
            Fetch::Unavailable(reasons.join("; "))
        } else {
            Fetch::Available(videos)
        };
        VideoSelection { videos, warnings }
    }

    pub async fn materials(&self, meeting: u32, group: &str) -> Fetch<Vec<Material>> {
        let Some(fetcher) = &self.sources.materials else {
            return Fetch::unavailable("materials source not configured");
        };
        bounded(
            "materials lookup",
            self.policy.fetch_timeout,
            fetcher.fetch_materials(meeting, group),
        )
        .await
        .non_empty(format!("no materials for {group} at IETF {meeting}"))
    }

    /// Content of one material, bounded like a media download.
    pub async fn material_content(&self, material: &Material) -> Fetch<Vec<u8>> {
        let Some(fetcher) = &self.sources.materials else {
            return Fetch::unavailable("materials source not configured");
        };
        bounded(
            "material download",
            self.policy.download_timeout,
            fetcher.material_content(material),
        )
        .await
    }

    /// Transcript for the selected videos.
    ///
    /// Captions come from the first YouTube video; whisper needs its
    /// downloaded media. Explicit preferences never fall through to the other
    /// source. Segments that cannot form a transcript are an error, not an
    /// unavailability.
    pub async fn transcript(&self, videos: &[SelectedVideo]) -> Result<Fetch<SourcedTranscript>> {
        let youtube = videos.iter().position(SelectedVideo::is_youtube);
        let media = videos
            .iter()
            .enumerate()
            .find_map(|(i, v)| v.local_path.as_deref().map(|path| (i, path)));
        let mut reasons = Vec::new();

        for source in plan_transcript(&self.policy.transcript) {
            let attempt = match source {
                TranscriptSource::Captions => match youtube {
                    Some(i) => self.captions(&videos[i].asset.url).await?.map(|t| (i, t)),
                    None => Fetch::unavailable("captions need a YouTube video"),
                },
                TranscriptSource::Whisper => match media {
                    Some((i, path)) => self.whisper(path).await?.map(|t| (i, t)),
                    None => Fetch::unavailable("whisper needs downloaded media"),
                },
            };
            match attempt {
                Fetch::Available((video, transcript)) => {
                    return Ok(Fetch::Available(SourcedTranscript { transcript, video }));
                }
                Fetch::Unavailable(reason) => {
                    debug!(?source, %reason, "transcript source unavailable");
                    reasons.push(reason);
                }
            }
        }
        Ok(Fetch::Unavailable(reasons.join("; ")))
    }

    async fn captions(&self, video_url: &str) -> Result<Fetch<Transcript>> {
        let Some(fetcher) = &self.sources.captions else {
            return Ok(Fetch::unavailable("caption source not configured"));
        };
        match bounded(
            "captions",
            self.policy.fetch_timeout,
            fetcher.fetch_captions(video_url),
        )
        .await
        .non_empty("captions are empty")
        {
            Fetch::Available(segments) => {
                let transcript = Transcript::new("youtube", segments)?
                    .with_model("auto-generated")
                    .with_language("en");
                Ok(Fetch::Available(transcript))
            }
            Fetch::Unavailable(reason) => Ok(Fetch::Unavailable(format!("captions: {reason}"))),
        }
    }

    async fn whisper(&self, media: &Path) -> Result<Fetch<Transcript>> {
        let Some(stt) = &self.sources.speech else {
            return Ok(Fetch::unavailable("speech-to-text not configured"));
        };
        let model = self.policy.transcript.whisper_model;
        match bounded(
            "whisper",
            self.policy.transcribe_timeout,
            stt.transcribe(media, model),
        )
        .await
        {
            Fetch::Available(result) if result.segments.is_empty() => {
                Ok(Fetch::unavailable("whisper: no speech recognized"))
            }
            Fetch::Available(result) => {
                let mut transcript =
                    Transcript::new("whisper", result.segments)?.with_model(model.as_str());
                if let Some(lang) = result.language {
                    transcript = transcript.with_language(lang);
                }
                Ok(Fetch::Available(transcript))
            }
            Fetch::Unavailable(reason) => Ok(Fetch::Unavailable(format!("whisper: {reason}"))),
        }
    }

    pub async fn chat(&self, session: &Session) -> Fetch<Vec<ChatMessage>> {
        let Some(fetcher) = &self.sources.chat else {
            return Fetch::unavailable("chat source not configured");
        };
        bounded(
            "chat history",
            self.policy.fetch_timeout,
            fetcher.fetch_chat(session, session.window()),
        )
        .await
        .non_empty("no chat messages")
    }
}

/// Bound a collaborator call; a timeout is just another unavailability.
async fn bounded<T>(
    what: &str,
    limit: Duration,
    fut: impl Future<Output = Fetch<T>>,
) -> Fetch<T> {
    match tokio::time::timeout(limit, fut).await {
        Ok(fetched) => fetched,
        Err(_) => {
            warn!(what, ?limit, "collaborator timed out");
            Fetch::unavailable(format!("{what} timed out after {limit:?}"))
        }
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use crate::testing::*;
    use ietf2vcon_vcon::Segment;

    fn policy(video: VideoPreference, both: BothVideoMode, transcript: TranscriptPreference) -> SourcePolicy {
        let mut p = SourcePolicy::default();
        p.video.preference = video;
        p.video.both_mode = both;
        p.transcript.preference = transcript;
        p
    }

    #[test]
    fn video_plans() {
        let mut p = SourcePolicy::default().video;
        assert_eq!(plan_video(&p).sources, [VideoSource::Youtube]);

        p.preference = VideoPreference::Both;
        p.both_mode = BothVideoMode::Supplement;
        let plan = plan_video(&p);
        assert_eq!(plan.sources, [VideoSource::Youtube, VideoSource::Meetecho]);
        assert!(plan.take_all);

        p.both_mode = BothVideoMode::Fallback;
        assert!(!plan_video(&p).take_all);
    }

    #[test]
    fn transcript_plans() {
        let mut p = SourcePolicy::default().transcript;
        assert_eq!(
            plan_transcript(&p),
            [TranscriptSource::Captions, TranscriptSource::Whisper]
        );
        p.preference = TranscriptPreference::Youtube;
        assert_eq!(plan_transcript(&p), [TranscriptSource::Captions]);
        p.preference = TranscriptPreference::Whisper;
        assert_eq!(plan_transcript(&p), [TranscriptSource::Whisper]);
    }

    #[tokio::test]
    async fn both_supplement_keeps_two_videos() {
        let fakes = Fakes::default();
        let selector = SourceSelector::new(
            fakes.collaborators(),
            policy(VideoPreference::Both, BothVideoMode::Supplement, TranscriptPreference::Auto),
        );
        let selection = selector.video(&session()).await;
        let videos = selection.videos.ok().unwrap();
        let providers: Vec<&str> = videos.iter().map(|v| v.asset.provider.as_str()).collect();
        assert_eq!(providers, ["youtube", "meetecho"]);
    }

    #[tokio::test]
    async fn both_fallback_uses_meetecho_only_without_youtube() {
        let mut fakes = Fakes::default();
        let p = policy(VideoPreference::Both, BothVideoMode::Fallback, TranscriptPreference::Auto);

        let selector = SourceSelector::new(fakes.collaborators(), p.clone());
        let videos = selector.video(&session()).await.videos.ok().unwrap();
        assert_eq!(videos.len(), 1);
        assert!(videos[0].is_youtube());

        fakes.youtube = FakeVideo::missing("youtube");
        let selector = SourceSelector::new(fakes.collaborators(), p);
        let videos = selector.video(&session()).await.videos.ok().unwrap();
        assert_eq!(videos.len(), 1);
        assert_eq!(videos[0].asset.provider, "meetecho");
    }

    #[tokio::test]
    async fn single_source_never_falls_through() {
        let mut fakes = Fakes::default();
        fakes.youtube = FakeVideo::missing("youtube");
        let selector = SourceSelector::new(
            fakes.collaborators(),
            policy(VideoPreference::Youtube, BothVideoMode::Supplement, TranscriptPreference::Auto),
        );
        let selection = selector.video(&session()).await;
        assert!(selection.videos.reason().unwrap().contains("youtube"));
    }

    #[tokio::test]
    async fn failed_download_degrades_to_url() {
        let mut fakes = Fakes::default();
        fakes.youtube = FakeVideo::youtube().failing_download();
        let mut p = SourcePolicy::default();
        p.video.download = true;
        let selector = SourceSelector::new(fakes.collaborators(), p);

        let selection = selector.video(&session()).await;
        let videos = selection.videos.ok().unwrap();
        assert_eq!(videos[0].local_path, None);
        assert_eq!(selection.warnings.len(), 1);
    }

    #[tokio::test]
    async fn auto_without_media_is_unavailable_not_error() {
        let mut fakes = Fakes::default();
        fakes.captions = FakeCaptions::empty();
        let selector = SourceSelector::new(fakes.collaborators(), SourcePolicy::default());

        let videos = vec![youtube_video(None)];
        let fetched = selector.transcript(&videos).await.unwrap();
        let reason = fetched.reason().unwrap();
        assert!(reason.contains("captions"));
        assert!(reason.contains("whisper needs downloaded media"));
        assert_eq!(fakes.speech.calls(), 0);
    }

    #[tokio::test]
    async fn auto_uses_whisper_when_media_exists() {
        let mut fakes = Fakes::default();
        fakes.captions = FakeCaptions::empty();
        let selector = SourceSelector::new(fakes.collaborators(), SourcePolicy::default());

        let videos = vec![meetecho_video(), youtube_video(Some("/tmp/ietf121-vcon.mp4"))];
        let sourced = selector.transcript(&videos).await.unwrap().ok().unwrap();
        assert_eq!(sourced.video, 1);
        assert_eq!(sourced.transcript.provider(), "whisper");
        assert_eq!(sourced.transcript.model(), Some("base"));
        assert_eq!(fakes.speech.calls(), 1);
    }

    #[tokio::test]
    async fn explicit_youtube_does_not_call_whisper() {
        let mut fakes = Fakes::default();
        fakes.captions = FakeCaptions::empty();
        let selector = SourceSelector::new(
            fakes.collaborators(),
            policy(VideoPreference::Youtube, BothVideoMode::Supplement, TranscriptPreference::Youtube),
        );

        let videos = vec![youtube_video(Some("/tmp/ietf121-vcon.mp4"))];
        assert!(!selector.transcript(&videos).await.unwrap().is_available());
        assert_eq!(fakes.speech.calls(), 0);
    }

    #[tokio::test]
    async fn explicit_whisper_without_media_is_unavailable() {
        let fakes = Fakes::default();
        let selector = SourceSelector::new(
            fakes.collaborators(),
            policy(VideoPreference::Youtube, BothVideoMode::Supplement, TranscriptPreference::Whisper),
        );

        let fetched = selector.transcript(&[youtube_video(None)]).await.unwrap();
        assert_eq!(fetched.reason(), Some("whisper needs downloaded media"));
        assert_eq!(fakes.captions.calls(), 0);
    }

    #[tokio::test]
    async fn captions_become_youtube_transcript() {
        let fakes = Fakes::default();
        let selector = SourceSelector::new(fakes.collaborators(), SourcePolicy::default());

        let videos = [meetecho_video(), youtube_video(None)];
        let sourced = selector.transcript(&videos).await.unwrap().ok().unwrap();
        assert_eq!(sourced.video, 1);
        assert_eq!(sourced.transcript.provider(), "youtube");
        assert_eq!(sourced.transcript.model(), Some("auto-generated"));
        assert_eq!(sourced.transcript.segments().len(), 2);
    }

    #[tokio::test]
    async fn out_of_order_captions_are_an_error() {
        let mut fakes = Fakes::default();
        fakes.captions = FakeCaptions::with_segments(vec![
            Segment::new(0, 5.0, 6.0, "second"),
            Segment::new(1, 1.0, 2.0, "first"),
        ]);
        let selector = SourceSelector::new(fakes.collaborators(), SourcePolicy::default());

        let err = selector.transcript(&[youtube_video(None)]).await.unwrap_err();
        assert!(err.is_structural());
        assert_eq!(fakes.speech.calls(), 0);
    }

    #[tokio::test]
    async fn slow_collaborator_times_out() {
        let mut fakes = Fakes::default();
        fakes.materials = FakeMaterials::slow(Duration::from_secs(60));
        let mut p = SourcePolicy::default();
        p.fetch_timeout = Duration::from_millis(50);
        let selector = SourceSelector::new(fakes.collaborators(), p);

        let fetched = selector.materials(121, "vcon").await;
        assert_eq!(fetched.reason(), Some("materials lookup timed out after 50ms"));
    }

    #[tokio::test]
    async fn missing_collaborators_are_unavailable() {
        let fakes = Fakes::default();
        let selector = SourceSelector::new(
            Collaborators::new(fakes.collaborators().resolver),
            SourcePolicy::default(),
        );
        assert!(!selector.video(&session()).await.videos.is_available());
        assert!(!selector.materials(121, "vcon").await.is_available());
        assert!(!selector.chat(&session()).await.is_available());
    }
}
