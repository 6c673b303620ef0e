//! In-memory collaborators for selector and orchestrator tests.

use std::path::{Path, PathBuf};
use std::sync::Arc;
use std::sync::atomic::{AtomicUsize, Ordering};
use std::time::Duration;

use async_trait::async_trait;
use chrono::{TimeZone, Utc};

use ietf2vcon_shared::{
    ChatMessage, Fetch, Material, Meeting, Person, Session, TimeWindow, WhisperModel,
};
use ietf2vcon_sources::{
    CaptionFetcher, ChatFetcher, MaterialsFetcher, ResolvedSession, SessionResolver, SpeechResult,
    SpeechToText, VideoAsset, VideoFetcher,
};
use ietf2vcon_vcon::Segment;

use crate::selector::{Collaborators, SelectedVideo};

pub const YOUTUBE_URL: &str = "https://www.youtube.com/watch?v=abc123def45";

pub fn session() -> Session {
    let mut s = Session::minimal(121, "vcon");
    s.session_id = "33000".into();
    s.name = Some("Virtualized Conversations".into());
    s.start_time = Some(Utc.with_ymd_and_hms(2024, 11, 4, 9, 30, 0).unwrap());
    s.duration_seconds = Some(7200);
    s.room = Some("Liffey A".into());
    s
}

pub fn youtube_video(local: Option<&str>) -> SelectedVideo {
    SelectedVideo {
        asset: youtube_asset(),
        local_path: local.map(PathBuf::from),
    }
}

pub fn meetecho_video() -> SelectedVideo {
    SelectedVideo {
        asset: meetecho_asset(),
        local_path: None,
    }
}

fn meetecho_asset() -> VideoAsset {
    VideoAsset {
        provider: "meetecho".into(),
        url: "https://meetings.conf.meetecho.com/ietf121/?group=vcon".into(),
        mimetype: "text/html".into(),
        duration: Some(7200.0),
        title: None,
        video_id: None,
    }
}

fn youtube_asset() -> VideoAsset {
    VideoAsset {
        provider: "youtube".into(),
        url: YOUTUBE_URL.into(),
        mimetype: "video/mp4".into(),
        duration: Some(7212.0),
        title: Some("IETF121-VCON-20241104-0930".into()),
        video_id: Some("abc123def45".into()),
    }
}

#[derive(Clone, Default)]
pub struct Counter(Arc<AtomicUsize>);

impl Counter {
    fn hit(&self) {
        self.0.fetch_add(1, Ordering::SeqCst);
    }

    fn get(&self) -> usize {
        self.0.load(Ordering::SeqCst)
    }
}

// ---------------------------------------------------------------------------

#[derive(Clone)]
pub struct FakeResolver {
    pub resolved: Fetch<ResolvedSession>,
    pub chairs: Fetch<Vec<Person>>,
}

impl Default for FakeResolver {
    fn default() -> Self {
        let mut meeting = Meeting::numbered(121);
        meeting.city = Some("Dublin".into());
        meeting.country = Some("IE".into());
        Self {
            resolved: Fetch::Available(ResolvedSession {
                meeting,
                session: session(),
                notes: vec![],
            }),
            chairs: Fetch::Available(vec![
                Person {
                    name: "Alice Example".into(),
                    email: Some("alice@example.com".into()),
                    affiliation: Some("Example Corp".into()),
                    role: Some("chair".into()),
                },
                Person {
                    name: "Bob Example".into(),
                    email: None,
                    affiliation: None,
                    role: Some("chair".into()),
                },
            ]),
        }
    }
}

#[async_trait]
impl SessionResolver for FakeResolver {
    async fn resolve(&self, _meeting: u32, _group: &str, _index: usize) -> Fetch<ResolvedSession> {
        self.resolved.clone()
    }

    async fn chairs(&self, _group: &str) -> Fetch<Vec<Person>> {
        self.chairs.clone()
    }
}

#[derive(Clone)]
pub struct FakeVideo {
    provider: String,
    asset: Fetch<VideoAsset>,
    download: Fetch<PathBuf>,
}

impl FakeVideo {
    pub fn youtube() -> Self {
        Self {
            provider: "youtube".into(),
            asset: Fetch::Available(youtube_asset()),
            download: Fetch::unavailable("no download configured"),
        }
    }

    pub fn meetecho() -> Self {
        Self {
            provider: "meetecho".into(),
            asset: Fetch::Available(meetecho_asset()),
            download: Fetch::unavailable("meetecho recordings cannot be downloaded"),
        }
    }

    pub fn missing(provider: &str) -> Self {
        Self {
            provider: provider.into(),
            asset: Fetch::unavailable(format!("no {provider} recording")),
            download: Fetch::unavailable("nothing to download"),
        }
    }

    /// Reported duration in seconds, whatever its sign.
    pub fn with_duration(mut self, seconds: f64) -> Self {
        if let Fetch::Available(asset) = &mut self.asset {
            asset.duration = Some(seconds);
        }
        self
    }

    pub fn downloading_to(mut self, path: &Path) -> Self {
        self.download = Fetch::Available(path.to_path_buf());
        self
    }

    pub fn failing_download(mut self) -> Self {
        self.download = Fetch::unavailable("HTTP 403");
        self
    }
}

#[async_trait]
impl VideoFetcher for FakeVideo {
    fn provider(&self) -> &str {
        &self.provider
    }

    async fn fetch_video(&self, _session: &Session) -> Fetch<VideoAsset> {
        self.asset.clone()
    }

    async fn download(&self, _asset: &VideoAsset) -> Fetch<PathBuf> {
        self.download.clone()
    }
}

#[derive(Clone)]
pub struct FakeMaterials {
    materials: Fetch<Vec<Material>>,
    /// Served for every material; `None` fails each download.
    content: Option<Vec<u8>>,
    delay: Option<Duration>,
    downloads: Counter,
}

impl Default for FakeMaterials {
    fn default() -> Self {
        let material = |kind: &str, title: &str, url: &str| Material {
            kind: kind.into(),
            title: title.into(),
            url: url.into(),
            filename: None,
            mimetype: Some("application/pdf".into()),
            order: None,
        };
        Self {
            materials: Fetch::Available(vec![
                material(
                    "slides",
                    "Chair slides",
                    "https://datatracker.ietf.org/meeting/121/materials/slides-121-vcon-chairs",
                ),
                material("recording", "Recording", YOUTUBE_URL),
                material(
                    "agenda",
                    "VCON Agenda",
                    "https://datatracker.ietf.org/meeting/121/agenda/vcon/",
                ),
            ]),
            content: None,
            delay: None,
            downloads: Counter::default(),
        }
    }
}

impl FakeMaterials {
    pub fn slow(delay: Duration) -> Self {
        Self {
            delay: Some(delay),
            ..Self::default()
        }
    }

    pub fn with_content(mut self, bytes: &[u8]) -> Self {
        self.content = Some(bytes.to_vec());
        self
    }

    pub fn downloads(&self) -> usize {
        self.downloads.get()
    }
}

#[async_trait]
impl MaterialsFetcher for FakeMaterials {
    async fn fetch_materials(&self, _meeting: u32, _group: &str) -> Fetch<Vec<Material>> {
        if let Some(delay) = self.delay {
            tokio::time::sleep(delay).await;
        }
        self.materials.clone()
    }

    async fn material_content(&self, _material: &Material) -> Fetch<Vec<u8>> {
        self.downloads.hit();
        match &self.content {
            Some(bytes) => Fetch::Available(bytes.clone()),
            None => Fetch::unavailable("HTTP 404"),
        }
    }
}

#[derive(Clone)]
pub struct FakeCaptions {
    segments: Fetch<Vec<Segment>>,
    calls: Counter,
}

impl Default for FakeCaptions {
    fn default() -> Self {
        Self {
            segments: Fetch::Available(vec![
                Segment::new(0, 1.2, 4.7, "good morning everyone welcome to vcon"),
                Segment::new(1, 4.71, 9.1, "first item is the note well"),
            ]),
            calls: Counter::default(),
        }
    }
}

impl FakeCaptions {
    pub fn empty() -> Self {
        Self {
            segments: Fetch::unavailable("no captions published"),
            calls: Counter::default(),
        }
    }

    pub fn with_segments(segments: Vec<Segment>) -> Self {
        Self {
            segments: Fetch::Available(segments),
            calls: Counter::default(),
        }
    }

    pub fn calls(&self) -> usize {
        self.calls.get()
    }
}

#[async_trait]
impl CaptionFetcher for FakeCaptions {
    async fn fetch_captions(&self, _video_url: &str) -> Fetch<Vec<Segment>> {
        self.calls.hit();
        self.segments.clone()
    }
}

#[derive(Clone, Default)]
pub struct FakeSpeech {
    calls: Counter,
}

impl FakeSpeech {
    pub fn calls(&self) -> usize {
        self.calls.get()
    }
}

#[async_trait]
impl SpeechToText for FakeSpeech {
    async fn transcribe(&self, _media: &Path, _model: WhisperModel) -> Fetch<SpeechResult> {
        self.calls.hit();
        Fetch::Available(SpeechResult {
            segments: vec![
                Segment::new(0, 0.0, 3.48, "Good morning everyone.").with_confidence(0.8),
                Segment::new(1, 3.48, 5.9, "Welcome to vCon.").with_confidence(0.6),
            ],
            language: Some("en".into()),
        })
    }
}

#[derive(Clone)]
pub struct FakeChat {
    pub messages: Fetch<Vec<ChatMessage>>,
}

impl Default for FakeChat {
    fn default() -> Self {
        let msg = |minute: u32, sender: &str, content: &str| ChatMessage {
            timestamp: Utc.with_ymd_and_hms(2024, 11, 4, 9, minute, 0).unwrap(),
            sender: sender.into(),
            sender_email: None,
            content: content.into(),
            topic: Some("ietf-121".into()),
            stream: Some("vcon".into()),
        };
        Self {
            messages: Fetch::Available(vec![
                msg(31, "Alice Example", "slides are up"),
                msg(45, "Carol", "+1 to adoption"),
            ]),
        }
    }
}

#[async_trait]
impl ChatFetcher for FakeChat {
    async fn fetch_chat(
        &self,
        _session: &Session,
        _window: Option<TimeWindow>,
    ) -> Fetch<Vec<ChatMessage>> {
        self.messages.clone()
    }
}

// ---------------------------------------------------------------------------

/// One fake per collaborator, all available by default.
#[derive(Clone)]
pub struct Fakes {
    pub resolver: FakeResolver,
    pub youtube: FakeVideo,
    pub meetecho: FakeVideo,
    pub materials: FakeMaterials,
    pub captions: FakeCaptions,
    pub speech: FakeSpeech,
    pub chat: FakeChat,
}

impl Default for Fakes {
    fn default() -> Self {
        Self {
            resolver: FakeResolver::default(),
            youtube: FakeVideo::youtube(),
            meetecho: FakeVideo::meetecho(),
            materials: FakeMaterials::default(),
            captions: FakeCaptions::default(),
            speech: FakeSpeech::default(),
            chat: FakeChat::default(),
        }
    }
}

impl Fakes {
    /// Counters are shared, so `self` still observes calls made through the
    /// returned collaborators.
    pub fn collaborators(&self) -> Collaborators {
        Collaborators {
            resolver: Arc::new(self.resolver.clone()),
            youtube: Some(Arc::new(self.youtube.clone())),
            meetecho: Some(Arc::new(self.meetecho.clone())),
            materials: Some(Arc::new(self.materials.clone())),
            captions: Some(Arc::new(self.captions.clone())),
            speech: Some(Arc::new(self.speech.clone())),
            chat: Some(Arc::new(self.chat.clone())),
        }
    }
}
