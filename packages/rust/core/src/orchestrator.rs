//! End-to-end conversion: session → capabilities → vCon.
//!
//! Stages run as `Resolving → FetchingVideo → FetchingMaterials →
//! FetchingTranscript → FetchingChat → Assembling → Finalized`. Fetch stages
//! only gather data; the builder is created and filled in `Assembling`, in a
//! fixed order, so sequential and concurrent runs produce the same document.

use std::fmt;
use std::path::Path;
use std::time::Instant;

use serde_json::json;
use tracing::{info, instrument, warn};

use ietf2vcon_shared::{ChatMessage, Fetch, Material, Meeting, Person, Result, Session};
use ietf2vcon_vcon::{DialogRef, DialogSpec, DialogType, Transcript, Vcon, VconBuilder};

use crate::selector::{SelectedVideo, SourceSelector, SourcedTranscript, VideoSelection};

/// Which session to convert.
#[derive(Debug, Clone, PartialEq, Eq)]
pub struct ConversionRequest {
    pub meeting: u32,
    pub group: String,
    /// Position among the group's sessions at this meeting.
    pub session_index: usize,
}

impl ConversionRequest {
    pub fn new(meeting: u32, group: &str) -> Self {
        Self {
            meeting,
            group: group.to_lowercase(),
            session_index: 0,
        }
    }

    pub fn with_session_index(mut self, index: usize) -> Self {
        self.session_index = index;
        self
    }
}

/// Which capabilities to include and how chat is attached.
#[derive(Debug, Clone, PartialEq, Eq)]
pub struct ConversionOptions {
    pub include_video: bool,
    pub include_materials: bool,
    pub include_transcript: bool,
    pub include_chat: bool,
    /// Chat as a `text` dialog entry (`true`) or a `chat_log` attachment.
    pub chat_as_dialog: bool,
    /// Download materials and embed their content.
    pub inline_materials: bool,
    /// Run video+transcript alongside materials and chat.
    pub concurrent: bool,
}

impl Default for ConversionOptions {
    fn default() -> Self {
        Self {
            include_video: true,
            include_materials: true,
            include_transcript: true,
            include_chat: true,
            chat_as_dialog: true,
            inline_materials: false,
            concurrent: false,
        }
    }
}

#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub enum Stage {
    Resolving,
    FetchingVideo,
    FetchingMaterials,
    FetchingTranscript,
    FetchingChat,
    Assembling,
    Finalized,
}

impl fmt::Display for Stage {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        f.write_str(match self {
            Self::Resolving => "Resolving session",
            Self::FetchingVideo => "Fetching video",
            Self::FetchingMaterials => "Fetching materials",
            Self::FetchingTranscript => "Fetching transcript",
            Self::FetchingChat => "Fetching chat",
            Self::Assembling => "Assembling vCon",
            Self::Finalized => "Finalized",
        })
    }
}

/// Outcome of one capability.
#[derive(Debug, Clone, PartialEq, Eq)]
pub enum CapabilityStatus {
    NotRequested,
    Skipped(String),
    Available(String),
    Unavailable(String),
}

impl CapabilityStatus {
    pub fn is_available(&self) -> bool {
        matches!(self, Self::Available(_))
    }
}

impl fmt::Display for CapabilityStatus {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        match self {
            Self::NotRequested => f.write_str("not requested"),
            Self::Skipped(reason) => write!(f, "skipped ({reason})"),
            Self::Available(detail) => f.write_str(detail),
            Self::Unavailable(reason) => write!(f, "unavailable ({reason})"),
        }
    }
}

#[derive(Debug, Clone, PartialEq, Eq)]
pub struct Capabilities {
    pub video: CapabilityStatus,
    pub materials: CapabilityStatus,
    pub transcript: CapabilityStatus,
    pub chat: CapabilityStatus,
}

impl Capabilities {
    pub fn iter(&self) -> impl Iterator<Item = (&'static str, &CapabilityStatus)> {
        [
            ("video", &self.video),
            ("materials", &self.materials),
            ("transcript", &self.transcript),
            ("chat", &self.chat),
        ]
        .into_iter()
    }
}

/// Result of a conversion.
#[derive(Debug, Clone)]
pub struct ConversionReport {
    pub vcon: Vcon,
    pub meeting: Meeting,
    pub group: String,
    pub session_id: String,
    pub capabilities: Capabilities,
    /// The attached transcript, kept for subtitle export.
    pub transcript: Option<Transcript>,
    pub warnings: Vec<String>,
    pub elapsed: std::time::Duration,
}

/// Progress callback for reporting conversion status.
pub trait ProgressReporter: Send + Sync {
    /// Called when entering a stage.
    fn stage(&self, stage: Stage);
    /// Called once per capability, after assembly.
    fn capability(&self, name: &str, status: &CapabilityStatus);
    /// Called when the conversion completes.
    fn done(&self, report: &ConversionReport);
}

/// No-op progress reporter for headless/test usage.
pub struct SilentProgress;

impl ProgressReporter for SilentProgress {
    fn stage(&self, _stage: Stage) {}
    fn capability(&self, _name: &str, _status: &CapabilityStatus) {}
    fn done(&self, _report: &ConversionReport) {}
}

/// Everything the fetch stages gathered, handed to assembly.
struct Gathered {
    video: Option<VideoSelection>,
    transcript: Option<Fetch<SourcedTranscript>>,
    materials: Option<Fetch<Vec<GatheredMaterial>>>,
    chat: Option<Fetch<Vec<ChatMessage>>>,
}

/// A material and, when inlining, the outcome of its download.
struct GatheredMaterial {
    material: Material,
    content: Option<Fetch<Vec<u8>>>,
}

/// Assembly output. Capability statuses describe what made it into the
/// document, not just what was fetched.
struct Assembled {
    vcon: Vcon,
    transcript: Option<Transcript>,
    capabilities: Capabilities,
}

/// Runs conversions against one set of collaborators.
#[derive(Clone)]
pub struct Converter {
    selector: SourceSelector,
    options: ConversionOptions,
}

impl Converter {
    pub fn new(selector: SourceSelector, options: ConversionOptions) -> Self {
        Self { selector, options }
    }

    pub fn options(&self) -> &ConversionOptions {
        &self.options
    }

    /// Convert one session.
    ///
    /// Capability failures are recorded in the report. Errors are reserved
    /// for structural defects: transcript segments that cannot be ordered
    /// into an analysis entry, or an assembled document that fails validation.
    #[instrument(skip_all, fields(meeting = request.meeting, group = %request.group, index = request.session_index))]
    pub async fn convert(
        &self,
        request: &ConversionRequest,
        progress: &dyn ProgressReporter,
    ) -> Result<ConversionReport> {
        let start = Instant::now();
        let mut warnings = Vec::new();

        info!("starting conversion");

        // --- Resolving ---
        progress.stage(Stage::Resolving);
        let (meeting, session) = match self
            .selector
            .resolve(request.meeting, &request.group, request.session_index)
            .await
        {
            Fetch::Available(resolved) => {
                warnings.extend(resolved.notes);
                (resolved.meeting, resolved.session)
            }
            Fetch::Unavailable(reason) => {
                warn!(%reason, "session lookup failed, using a minimal session");
                warnings.push(format!("session metadata unavailable ({reason}); using defaults"));
                (
                    Meeting::numbered(request.meeting),
                    Session::minimal(request.meeting, &request.group),
                )
            }
        };
        let chairs = self.selector.chairs(&request.group).await;
        if let Some(reason) = chairs.reason() {
            warnings.push(format!("chairs unavailable ({reason}); using a generic chair party"));
        }

        // --- Fetching ---
        let gathered = if self.options.concurrent {
            let ((video, transcript), materials, chat) = tokio::join!(
                async {
                    let video = self.fetch_video(&session, progress).await;
                    let transcript = self.fetch_transcript(video.as_ref(), progress).await;
                    (video, transcript)
                },
                self.fetch_materials(request, progress),
                self.fetch_chat(&session, progress)
            );
            Gathered {
                video,
                transcript: transcript?,
                materials,
                chat,
            }
        } else {
            let video = self.fetch_video(&session, progress).await;
            let materials = self.fetch_materials(request, progress).await;
            let transcript = self.fetch_transcript(video.as_ref(), progress).await?;
            let chat = self.fetch_chat(&session, progress).await;
            Gathered {
                video,
                transcript,
                materials,
                chat,
            }
        };

        // --- Assembling ---
        progress.stage(Stage::Assembling);
        let assembled = self
            .assemble(request, &meeting, &session, chairs, gathered, &mut warnings)
            .await?;
        for (name, status) in assembled.capabilities.iter() {
            progress.capability(name, status);
        }
        progress.stage(Stage::Finalized);

        let report = ConversionReport {
            vcon: assembled.vcon,
            meeting,
            group: request.group.clone(),
            session_id: session.session_id,
            capabilities: assembled.capabilities,
            transcript: assembled.transcript,
            warnings,
            elapsed: start.elapsed(),
        };

        progress.done(&report);

        info!(
            uuid = %report.vcon.uuid(),
            dialogs = report.vcon.dialog().len(),
            attachments = report.vcon.attachments().len(),
            analysis = report.vcon.analysis().len(),
            warnings = report.warnings.len(),
            elapsed_ms = report.elapsed.as_millis(),
            "conversion complete"
        );

        Ok(report)
    }

    async fn fetch_video(
        &self,
        session: &Session,
        progress: &dyn ProgressReporter,
    ) -> Option<VideoSelection> {
        if !self.options.include_video {
            return None;
        }
        progress.stage(Stage::FetchingVideo);
        Some(self.selector.video(session).await)
    }

    /// `None` when the transcript or the video it depends on was not requested.
    async fn fetch_transcript(
        &self,
        video: Option<&VideoSelection>,
        progress: &dyn ProgressReporter,
    ) -> Result<Option<Fetch<SourcedTranscript>>> {
        if !self.options.include_transcript {
            return Ok(None);
        }
        let Some(selection) = video else {
            return Ok(None);
        };
        match &selection.videos {
            Fetch::Available(videos) => {
                progress.stage(Stage::FetchingTranscript);
                self.selector.transcript(videos).await.map(Some)
            }
            Fetch::Unavailable(_) => Ok(Some(Fetch::unavailable("no video to transcribe"))),
        }
    }

    async fn fetch_materials(
        &self,
        request: &ConversionRequest,
        progress: &dyn ProgressReporter,
    ) -> Option<Fetch<Vec<GatheredMaterial>>> {
        if !self.options.include_materials {
            return None;
        }
        progress.stage(Stage::FetchingMaterials);
        Some(match self.selector.materials(request.meeting, &request.group).await {
            Fetch::Available(materials) => {
                let mut gathered = Vec::with_capacity(materials.len());
                for material in materials {
                    // Recordings are never embedded.
                    let content = if self.options.inline_materials && !material.is_recording() {
                        Some(self.selector.material_content(&material).await)
                    } else {
                        None
                    };
                    gathered.push(GatheredMaterial { material, content });
                }
                Fetch::Available(gathered)
            }
            Fetch::Unavailable(reason) => Fetch::Unavailable(reason),
        })
    }

    async fn fetch_chat(
        &self,
        session: &Session,
        progress: &dyn ProgressReporter,
    ) -> Option<Fetch<Vec<ChatMessage>>> {
        if !self.options.include_chat {
            return None;
        }
        progress.stage(Stage::FetchingChat);
        Some(self.selector.chat(session).await)
    }

    /// The single point where the document is built.
    async fn assemble(
        &self,
        request: &ConversionRequest,
        meeting: &Meeting,
        session: &Session,
        chairs: Fetch<Vec<Person>>,
        gathered: Gathered,
        warnings: &mut Vec<String>,
    ) -> Result<Assembled> {
        let mut builder = VconBuilder::new();
        builder.set_meeting_metadata(meeting, session)?;
        builder.add_ingress_info(request.meeting, &request.group, request.session_index)?;
        builder.add_ietf_note_well()?;

        let mut chair_count = 0;
        for chair in chairs.ok().unwrap_or_default() {
            match builder.add_person(&chair, "chair") {
                Ok(_) => chair_count += 1,
                Err(e) => warnings.push(format!("skipped chair {}: {e}", chair.name)),
            }
        }
        if chair_count == 0 {
            let name = format!("{} Chairs", request.group.to_uppercase());
            builder.add_party(&name, "chair", None)?;
        }
        builder.add_party("IETF Attendees", "attendee", None)?;

        // Video dialogs in selection order; entry i belongs to selected video i.
        let mut video_dialogs: Vec<(String, Option<DialogRef>)> = Vec::new();
        let video = match gathered.video {
            None => CapabilityStatus::NotRequested,
            Some(selection) => {
                warnings.extend(selection.warnings);
                match selection.videos {
                    Fetch::Available(videos) => {
                        let mut added = Vec::new();
                        for video in videos {
                            let spec = video_dialog(&video, session, warnings).await;
                            let provider = video.asset.provider;
                            match builder.add_dialog(spec) {
                                Ok(dialog) => {
                                    added.push(format!("{provider} {}", video.asset.url));
                                    video_dialogs.push((provider, Some(dialog)));
                                }
                                Err(e) => {
                                    warnings.push(format!("skipped {provider} video: {e}"));
                                    video_dialogs.push((provider, None));
                                }
                            }
                        }
                        if added.is_empty() {
                            CapabilityStatus::Unavailable("every video dialog was rejected".into())
                        } else {
                            CapabilityStatus::Available(added.join(", "))
                        }
                    }
                    Fetch::Unavailable(reason) => CapabilityStatus::Unavailable(reason),
                }
            }
        };
        let has_video = video_dialogs.iter().any(|(_, dialog)| dialog.is_some());

        let materials = match gathered.materials {
            None => CapabilityStatus::NotRequested,
            Some(Fetch::Unavailable(reason)) => CapabilityStatus::Unavailable(reason),
            Some(Fetch::Available(gathered)) => {
                let (mut attached, mut inlined, mut rejected) = (0, 0, 0);
                for GatheredMaterial { material, content } in gathered {
                    // The recording is already a dialog entry.
                    if has_video && material.is_recording() {
                        continue;
                    }
                    let inline = matches!(content, Some(Fetch::Available(_)));
                    let added = match content {
                        Some(Fetch::Available(bytes)) => {
                            builder.add_material_inline(&material, &bytes)
                        }
                        Some(Fetch::Unavailable(reason)) => {
                            warnings.push(format!(
                                "could not download {} ({reason}); using URL reference",
                                material.title
                            ));
                            builder.add_material(&material)
                        }
                        None => builder.add_material(&material),
                    };
                    match added {
                        Ok(_) => {
                            attached += 1;
                            if inline {
                                inlined += 1;
                            }
                        }
                        Err(e) => {
                            rejected += 1;
                            warnings.push(format!("skipped material {}: {e}", material.title));
                        }
                    }
                }
                if attached == 0 && rejected > 0 {
                    CapabilityStatus::Unavailable("every material was rejected".into())
                } else if self.options.inline_materials {
                    CapabilityStatus::Available(format!("{attached} materials, {inlined} inline"))
                } else {
                    CapabilityStatus::Available(format!("{attached} materials"))
                }
            }
        };

        let mut attached = None;
        let transcript = match gathered.transcript {
            None if !self.options.include_transcript => CapabilityStatus::NotRequested,
            None => CapabilityStatus::Skipped("video not requested".into()),
            Some(Fetch::Unavailable(reason)) => CapabilityStatus::Unavailable(reason),
            Some(Fetch::Available(SourcedTranscript { transcript, video: source })) => {
                match video_dialogs.get(source) {
                    Some((_, Some(dialog))) => {
                        builder.add_transcript(*dialog, &transcript)?;
                        let status = CapabilityStatus::Available(format!(
                            "{}, {} segments",
                            transcript.provider(),
                            transcript.segments().len()
                        ));
                        attached = Some(transcript);
                        status
                    }
                    other => {
                        let provider = other.map_or("source", |(provider, _)| provider.as_str());
                        let reason = format!("{provider} video dialog was rejected");
                        warn!(%reason, "dropping transcript");
                        warnings.push(format!("skipped transcript: {reason}"));
                        CapabilityStatus::Unavailable(reason)
                    }
                }
            }
        };

        let chat = match gathered.chat {
            None => CapabilityStatus::NotRequested,
            Some(Fetch::Unavailable(reason)) => CapabilityStatus::Unavailable(reason),
            Some(Fetch::Available(messages)) => {
                let added = if self.options.chat_as_dialog {
                    builder.add_chat_dialog(&messages).map(|_| ())
                } else {
                    builder.add_chat_attachment(&messages).map(|_| ())
                };
                match added {
                    Ok(()) => CapabilityStatus::Available(format!("{} messages", messages.len())),
                    Err(e) => {
                        warnings.push(format!("skipped chat log: {e}"));
                        CapabilityStatus::Unavailable(format!("chat log rejected: {e}"))
                    }
                }
            }
        };

        Ok(Assembled {
            vcon: builder.build()?,
            transcript: attached,
            capabilities: Capabilities {
                video,
                materials,
                transcript,
                chat,
            },
        })
    }
}

/// Dialog entry for a selected video: inline media when downloaded,
/// otherwise a URL reference.
async fn video_dialog(
    video: &SelectedVideo,
    session: &Session,
    warnings: &mut Vec<String>,
) -> DialogSpec {
    let asset = &video.asset;
    let mut meta = json!({
        "provider": asset.provider,
        "source_url": asset.url,
    });
    if let Some(title) = &asset.title {
        meta["title"] = json!(title);
    }
    if let Some(id) = &asset.video_id {
        meta["video_id"] = json!(id);
    }

    let mut spec = None;
    if let Some(path) = &video.local_path {
        match tokio::fs::read(path).await {
            Ok(bytes) => {
                let mut inline =
                    DialogSpec::inline_media(DialogType::Video, &bytes, media_mimetype(path, &asset.mimetype));
                if let Some(name) = path.file_name() {
                    inline = inline.with_filename(name.to_string_lossy());
                }
                spec = Some(inline);
            }
            Err(e) => {
                warn!(path = %path.display(), error = %e, "cannot read downloaded media");
                warnings.push(format!(
                    "could not read {} ({e}); using URL reference",
                    path.display()
                ));
            }
        }
    }

    let mut spec =
        spec.unwrap_or_else(|| DialogSpec::url(DialogType::Video, &asset.url, &asset.mimetype));
    spec = spec.with_meta(meta);
    if let Some(start) = session.start_time {
        spec = spec.with_start(start);
    }
    let duration = asset
        .duration
        .or(session.duration_seconds.map(|s| s as f64));
    if let Some(d) = duration {
        spec = spec.with_duration(d);
    }
    spec
}

fn media_mimetype(path: &Path, fallback: &str) -> String {
    let ext = path
        .extension()
        .map(|e| e.to_string_lossy().to_ascii_lowercase());
    match ext.as_deref() {
        Some("mp4" | "m4v") => "video/mp4",
        Some("webm") => "video/webm",
        Some("mkv") => "video/x-matroska",
        Some("mp3") => "audio/mpeg",
        Some("m4a") => "audio/mp4",
        _ => fallback,
    }
    .to_string()
}

#[cfg(test)]
mod tests {
    use super::*;
    use crate::selector::{Collaborators, SourcePolicy};
    use crate::testing::*;
    use ietf2vcon_shared::{BothVideoMode, VideoPreference};
    use ietf2vcon_vcon::{Encoding, PartyRole, Segment, WTF_ANALYSIS_TYPE};
    use std::sync::Mutex;

    fn converter(collaborators: Collaborators, options: ConversionOptions) -> Converter {
        Converter::new(
            SourceSelector::new(collaborators, SourcePolicy::default()),
            options,
        )
    }

    fn converter_with_policy(
        collaborators: Collaborators,
        policy: SourcePolicy,
        options: ConversionOptions,
    ) -> Converter {
        Converter::new(SourceSelector::new(collaborators, policy), options)
    }

    async fn run(converter: &Converter) -> ConversionReport {
        converter
            .convert(&ConversionRequest::new(121, "vcon"), &SilentProgress)
            .await
            .unwrap()
    }

    /// JSON with the per-run identity removed.
    fn normalized(vcon: &Vcon) -> serde_json::Value {
        let mut value = serde_json::to_value(vcon).unwrap();
        let obj = value.as_object_mut().unwrap();
        obj.remove("uuid");
        obj.remove("created_at");
        obj.remove("updated_at");
        value
    }

    #[tokio::test]
    async fn full_conversion() {
        let fakes = Fakes::default();
        let report = run(&converter(fakes.collaborators(), ConversionOptions::default())).await;
        let vcon = &report.vcon;

        assert_eq!(vcon.subject(), Some("IETF 121 - VCON Working Group Session"));
        assert_eq!(report.session_id, "33000");

        let names: Vec<&str> = vcon.parties().iter().map(|p| p.name.as_str()).collect();
        assert_eq!(names, ["Alice Example", "Bob Example", "IETF Attendees"]);
        assert_eq!(vcon.parties()[2].role, PartyRole::Attendee);

        // Video first, chat dialog last.
        assert_eq!(vcon.dialog().len(), 2);
        assert_eq!(vcon.dialog()[0].kind, DialogType::Video);
        assert_eq!(vcon.dialog()[0].url.as_deref(), Some(YOUTUBE_URL));
        assert_eq!(vcon.dialog()[1].kind, DialogType::Text);

        let analysis: Vec<_> = vcon.analysis_of_type(WTF_ANALYSIS_TYPE).collect();
        assert_eq!(analysis.len(), 1);
        assert_eq!(analysis[0].dialog, 0);
        assert_eq!(analysis[0].vendor, "youtube");

        // Recording material dropped in favour of the video dialog.
        assert_eq!(vcon.attachments_of_type("recording").count(), 0);
        assert_eq!(vcon.attachments_of_type("slides").count(), 1);
        assert_eq!(vcon.attachments_of_type("lawful_basis").count(), 1);
        assert_eq!(vcon.attachments_of_type("meeting_metadata").count(), 1);
        assert_eq!(vcon.attachments_of_type("ingress_info").count(), 1);

        assert!(report.capabilities.iter().all(|(_, s)| s.is_available()));
        assert!(report.transcript.is_some());
        assert!(vcon.validate().is_empty());
    }

    #[tokio::test]
    async fn sequential_and_concurrent_documents_match() {
        let fakes = Fakes::default();
        let mut policy = SourcePolicy::default();
        policy.video.preference = VideoPreference::Both;

        let sequential = run(&converter_with_policy(
            fakes.collaborators(),
            policy.clone(),
            ConversionOptions::default(),
        ))
        .await;
        let concurrent = run(&converter_with_policy(
            fakes.collaborators(),
            policy,
            ConversionOptions {
                concurrent: true,
                ..ConversionOptions::default()
            },
        ))
        .await;

        assert_eq!(normalized(&sequential.vcon), normalized(&concurrent.vcon));
        assert_eq!(sequential.capabilities, concurrent.capabilities);
    }

    #[tokio::test]
    async fn no_captions_means_no_transcript_analysis() {
        let mut fakes = Fakes::default();
        fakes.captions = FakeCaptions::empty();
        let report = run(&converter(fakes.collaborators(), ConversionOptions::default())).await;

        assert_eq!(report.vcon.analysis_of_type(WTF_ANALYSIS_TYPE).count(), 0);
        assert!(matches!(
            report.capabilities.transcript,
            CapabilityStatus::Unavailable(_)
        ));
        assert!(report.transcript.is_none());
        assert_eq!(report.vcon.dialog()[0].kind, DialogType::Video);
    }

    #[tokio::test]
    async fn downloaded_media_is_inlined_and_transcribed_by_whisper() {
        let dir = std::env::temp_dir().join(format!("ietf2vcon-orch-{}", uuid::Uuid::now_v7()));
        std::fs::create_dir_all(&dir).unwrap();
        let media = dir.join("abc123def45.mp4");
        std::fs::write(&media, b"not really a video").unwrap();

        let mut fakes = Fakes::default();
        fakes.youtube = FakeVideo::youtube().downloading_to(&media);
        fakes.captions = FakeCaptions::empty();
        let mut policy = SourcePolicy::default();
        policy.video.download = true;

        let report = run(&converter_with_policy(
            fakes.collaborators(),
            policy,
            ConversionOptions::default(),
        ))
        .await;

        let dialog = &report.vcon.dialog()[0];
        assert!(dialog.url.is_none());
        assert!(dialog.body.is_some());
        assert_eq!(dialog.alg.as_deref(), Some("SHA-256"));
        assert_eq!(dialog.filename.as_deref(), Some("abc123def45.mp4"));

        let analysis: Vec<_> = report.vcon.analysis_of_type(WTF_ANALYSIS_TYPE).collect();
        assert_eq!(analysis[0].vendor, "whisper");
        assert_eq!(fakes.speech.calls(), 1);

        let _ = std::fs::remove_dir_all(&dir);
    }

    #[tokio::test]
    async fn both_supplement_yields_two_video_dialogs() {
        let fakes = Fakes::default();
        let mut policy = SourcePolicy::default();
        policy.video.preference = VideoPreference::Both;
        policy.video.both_mode = BothVideoMode::Supplement;

        let report = run(&converter_with_policy(
            fakes.collaborators(),
            policy,
            ConversionOptions {
                include_chat: false,
                ..ConversionOptions::default()
            },
        ))
        .await;

        let kinds: Vec<DialogType> = report.vcon.dialog().iter().map(|d| d.kind).collect();
        assert_eq!(kinds, [DialogType::Video, DialogType::Video]);
        assert_eq!(report.vcon.dialog()[1].mimetype, "text/html");
        // Captions stay on the YouTube dialog they came from.
        assert_eq!(report.vcon.analysis()[0].dialog, 0);
    }

    #[tokio::test]
    async fn transcript_is_dropped_when_its_video_is_rejected() {
        let mut fakes = Fakes::default();
        fakes.youtube = FakeVideo::youtube().with_duration(-5.0);
        let mut policy = SourcePolicy::default();
        policy.video.preference = VideoPreference::Both;
        policy.video.both_mode = BothVideoMode::Supplement;

        let report = run(&converter_with_policy(
            fakes.collaborators(),
            policy,
            ConversionOptions {
                include_chat: false,
                ..ConversionOptions::default()
            },
        ))
        .await;

        // Only the Meetecho dialog made it, and the YouTube captions must not
        // be attributed to it.
        let dialogs = report.vcon.dialog();
        assert_eq!(dialogs.len(), 1);
        assert_eq!(dialogs[0].mimetype, "text/html");
        assert!(report.vcon.analysis().is_empty());
        assert!(report.transcript.is_none());
        assert_eq!(fakes.captions.calls(), 1);

        assert_eq!(
            report.capabilities.transcript,
            CapabilityStatus::Unavailable("youtube video dialog was rejected".into())
        );
        match &report.capabilities.video {
            CapabilityStatus::Available(detail) => {
                assert!(detail.starts_with("meetecho "));
                assert!(!detail.contains("youtube"));
            }
            other => panic!("unexpected video status {other:?}"),
        }
        assert!(report.warnings.iter().any(|w| w.starts_with("skipped youtube video")));
        assert!(report.vcon.validate().is_empty());
    }

    #[tokio::test]
    async fn every_video_rejected_keeps_recording_material() {
        let mut fakes = Fakes::default();
        fakes.youtube = FakeVideo::youtube().with_duration(f64::NAN);
        let report = run(&converter(fakes.collaborators(), ConversionOptions::default())).await;

        assert_eq!(
            report.capabilities.video,
            CapabilityStatus::Unavailable("every video dialog was rejected".into())
        );
        assert!(!report.capabilities.transcript.is_available());
        assert_eq!(report.vcon.attachments_of_type("recording").count(), 1);
        assert_eq!(report.vcon.analysis_of_type(WTF_ANALYSIS_TYPE).count(), 0);
    }

    #[tokio::test]
    async fn malformed_captions_fail_the_conversion() {
        for concurrent in [false, true] {
            let mut fakes = Fakes::default();
            fakes.captions = FakeCaptions::with_segments(vec![
                Segment::new(0, 5.0, 6.0, "second"),
                Segment::new(1, 1.0, 2.0, "first"),
            ]);
            let converter = converter(
                fakes.collaborators(),
                ConversionOptions {
                    concurrent,
                    ..ConversionOptions::default()
                },
            );

            let err = converter
                .convert(&ConversionRequest::new(121, "vcon"), &SilentProgress)
                .await
                .unwrap_err();
            assert!(err.is_structural(), "concurrent={concurrent}: {err}");
        }
    }

    #[tokio::test]
    async fn inline_materials_embed_downloaded_content() {
        let mut fakes = Fakes::default();
        fakes.materials = FakeMaterials::default().with_content(b"%PDF-1.7 chair slides");
        let report = run(&converter(
            fakes.collaborators(),
            ConversionOptions {
                inline_materials: true,
                ..ConversionOptions::default()
            },
        ))
        .await;

        let slides = report.vcon.attachments_of_type("slides").next().unwrap();
        assert!(slides.url.is_none());
        assert_eq!(slides.encoding, Some(Encoding::Base64url));
        assert_eq!(slides.meta.as_ref().unwrap()["alg"], "SHA-256");
        assert_eq!(
            report.capabilities.materials,
            CapabilityStatus::Available("2 materials, 2 inline".into())
        );
        // The recording is never downloaded.
        assert_eq!(fakes.materials.downloads(), 2);
        assert!(report.vcon.validate().is_empty());
    }

    #[tokio::test]
    async fn failed_material_download_keeps_url_reference() {
        let fakes = Fakes::default();
        let report = run(&converter(
            fakes.collaborators(),
            ConversionOptions {
                inline_materials: true,
                ..ConversionOptions::default()
            },
        ))
        .await;

        let slides = report.vcon.attachments_of_type("slides").next().unwrap();
        assert!(slides.url.is_some());
        assert!(slides.body.is_none());
        assert_eq!(
            report.capabilities.materials,
            CapabilityStatus::Available("2 materials, 0 inline".into())
        );
        assert!(
            report
                .warnings
                .iter()
                .any(|w| w == "could not download Chair slides (HTTP 404); using URL reference")
        );
    }

    #[tokio::test]
    async fn chat_without_credentials_keeps_document_valid() {
        let mut fakes = Fakes::default();
        fakes.chat.messages = Fetch::unavailable("no Zulip credentials configured");
        let report = run(&converter(fakes.collaborators(), ConversionOptions::default())).await;

        assert_eq!(
            report.capabilities.chat,
            CapabilityStatus::Unavailable("no Zulip credentials configured".into())
        );
        assert!(report.vcon.dialog().iter().all(|d| d.kind != DialogType::Text));
        assert!(report.vcon.validate().is_empty());
    }

    #[tokio::test]
    async fn chat_as_attachment() {
        let fakes = Fakes::default();
        let report = run(&converter(
            fakes.collaborators(),
            ConversionOptions {
                chat_as_dialog: false,
                ..ConversionOptions::default()
            },
        ))
        .await;
        assert_eq!(report.vcon.attachments_of_type("chat_log").count(), 1);
        assert_eq!(report.vcon.dialog().len(), 1);
    }

    #[tokio::test]
    async fn resolver_failure_degrades_to_minimal_session() {
        let mut fakes = Fakes::default();
        fakes.resolver.resolved = Fetch::unavailable("HTTP 503");
        fakes.resolver.chairs = Fetch::unavailable("HTTP 503");
        let report = run(&converter(fakes.collaborators(), ConversionOptions::default())).await;

        assert_eq!(report.session_id, "vcon-121");
        assert_eq!(report.vcon.parties()[0].name, "VCON Chairs");
        assert_eq!(report.vcon.parties()[0].role, PartyRole::Chair);
        assert_eq!(report.warnings.len(), 2);
    }

    #[tokio::test]
    async fn skipped_video_skips_transcript_and_keeps_recording_material() {
        let fakes = Fakes::default();
        let report = run(&converter(
            fakes.collaborators(),
            ConversionOptions {
                include_video: false,
                ..ConversionOptions::default()
            },
        ))
        .await;

        assert_eq!(report.capabilities.video, CapabilityStatus::NotRequested);
        assert!(matches!(
            report.capabilities.transcript,
            CapabilityStatus::Skipped(_)
        ));
        assert_eq!(report.vcon.attachments_of_type("recording").count(), 1);
        assert_eq!(fakes.captions.calls(), 0);
    }

    #[tokio::test]
    async fn unavailable_video_makes_transcript_unavailable() {
        let mut fakes = Fakes::default();
        fakes.youtube = FakeVideo::missing("youtube");
        let report = run(&converter(fakes.collaborators(), ConversionOptions::default())).await;

        assert_eq!(
            report.capabilities.transcript,
            CapabilityStatus::Unavailable("no video to transcribe".into())
        );
        assert!(report.vcon.analysis().is_empty());
    }

    #[derive(Default)]
    struct Recorder(Mutex<Vec<String>>);

    impl ProgressReporter for Recorder {
        fn stage(&self, stage: Stage) {
            self.0.lock().unwrap().push(stage.to_string());
        }
        fn capability(&self, name: &str, _status: &CapabilityStatus) {
            self.0.lock().unwrap().push(format!("cap:{name}"));
        }
        fn done(&self, _report: &ConversionReport) {
            self.0.lock().unwrap().push("done".into());
        }
    }

    #[tokio::test]
    async fn progress_follows_stage_order() {
        let fakes = Fakes::default();
        let recorder = Recorder::default();
        converter(fakes.collaborators(), ConversionOptions::default())
            .convert(&ConversionRequest::new(121, "VCON"), &recorder)
            .await
            .unwrap();

        let events = recorder.0.lock().unwrap().clone();
        assert_eq!(
            events,
            [
                "Resolving session",
                "Fetching video",
                "Fetching materials",
                "Fetching transcript",
                "Fetching chat",
                "Assembling vCon",
                "cap:video",
                "cap:materials",
                "cap:transcript",
                "cap:chat",
                "Finalized",
                "done",
            ]
        );
    }
}
