//! YouTube search, download and captions through `yt-dlp`.

use std::path::{Path, PathBuf};
use std::sync::LazyLock;

use async_trait::async_trait;
use regex::Regex;
use serde::Deserialize;
use tracing::{debug, info, instrument};

use ietf2vcon_shared::{Fetch, Ietf2VconError, Result, Session};
use ietf2vcon_vcon::Segment;

use crate::process::run;
use crate::{CaptionFetcher, VideoAsset, VideoFetcher};

/// Default `yt-dlp` format selector.
pub const DEFAULT_FORMAT: &str = "best[height<=1080]";

const SEARCH_RESULTS: usize = 5;

static VIDEO_ID_RE: LazyLock<Regex> = LazyLock::new(|| {
    Regex::new(r"(?:v=|/v/|youtu\.be/|/embed/|/live/)([a-zA-Z0-9_-]{11})").expect("valid regex")
});

static BARE_ID_RE: LazyLock<Regex> =
    LazyLock::new(|| Regex::new(r"^[a-zA-Z0-9_-]{11}$").expect("valid regex"));

/// One line of `yt-dlp --flat-playlist` search output.
#[derive(Debug, Clone, PartialEq)]
pub struct SearchHit {
    pub id: String,
    pub title: String,
    pub duration: Option<f64>,
}

/// `yt-dlp` wrapper.
#[derive(Debug, Clone)]
pub struct YoutubeClient {
    program: String,
    download_dir: PathBuf,
    format: String,
}

impl YoutubeClient {
    pub fn new(program: impl Into<String>, download_dir: impl Into<PathBuf>) -> Self {
        Self {
            program: program.into(),
            download_dir: download_dir.into(),
            format: DEFAULT_FORMAT.to_string(),
        }
    }

    pub fn with_format(mut self, format: impl Into<String>) -> Self {
        self.format = format.into();
        self
    }

    /// Search query for a session: `IETF 121 VCON 2024-11-04`.
    pub fn search_query(session: &Session) -> String {
        let mut query = format!(
            "IETF {} {}",
            session.meeting_number,
            session.group_acronym.to_uppercase()
        );
        if let Some(start) = session.start_time {
            query.push_str(&start.format(" %Y-%m-%d").to_string());
        }
        query
    }

    /// Search YouTube and return the raw hits.
    #[instrument(skip(self))]
    pub async fn search(&self, query: &str) -> Result<Vec<SearchHit>> {
        let args = vec![
            "--flat-playlist".to_string(),
            "--print".to_string(),
            "%(id)s|%(title)s|%(duration)s".to_string(),
            format!("ytsearch{SEARCH_RESULTS}:{query}"),
        ];
        let stdout = run(&self.program, &args).await?;
        Ok(parse_search_output(&stdout))
    }

    /// Fetch the caption track of `video_id` and parse it.
    #[instrument(skip(self))]
    pub async fn captions(&self, video_id: &str) -> Result<Vec<Segment>> {
        let dir = self.download_dir.join("captions");
        tokio::fs::create_dir_all(&dir)
            .await
            .map_err(|e| Ietf2VconError::io(&dir, e))?;

        let template = dir.join(video_id);
        let args = vec![
            "--write-auto-sub".to_string(),
            "--write-sub".to_string(),
            "--sub-lang".to_string(),
            "en".to_string(),
            "--sub-format".to_string(),
            "json3".to_string(),
            "--skip-download".to_string(),
            "-o".to_string(),
            template.to_string_lossy().into_owned(),
            video_url(video_id),
        ];
        run(&self.program, &args).await?;

        let path = find_caption_file(&dir, video_id)
            .await
            .ok_or_else(|| Ietf2VconError::parse(format!("no captions published for {video_id}")))?;
        let raw = tokio::fs::read_to_string(&path)
            .await
            .map_err(|e| Ietf2VconError::io(&path, e))?;
        parse_json3(&raw)
    }
}

#[async_trait]
impl VideoFetcher for YoutubeClient {
    fn provider(&self) -> &str {
        "youtube"
    }

    async fn fetch_video(&self, session: &Session) -> Fetch<VideoAsset> {
        let query = Self::search_query(session);
        let hits = match self.search(&query).await {
            Ok(hits) => hits,
            Err(e) => return Fetch::Unavailable(e.to_string()),
        };
        debug!(query = %query, hits = hits.len(), "youtube search");

        let Some(hit) = hits
            .into_iter()
            .find(|h| title_matches_session(&h.title, session.meeting_number, &session.group_acronym))
        else {
            return Fetch::unavailable(format!("no YouTube recording matches \"{query}\""));
        };

        info!(video_id = %hit.id, title = %hit.title, "found YouTube recording");
        Fetch::Available(VideoAsset {
            provider: "youtube".into(),
            url: video_url(&hit.id),
            mimetype: "video/mp4".into(),
            duration: hit.duration,
            title: Some(hit.title),
            video_id: Some(hit.id),
        })
    }

    async fn download(&self, asset: &VideoAsset) -> Fetch<PathBuf> {
        let id = asset
            .video_id
            .clone()
            .or_else(|| extract_video_id(&asset.url));
        let Some(id) = id else {
            return Fetch::unavailable(format!("no video id in {}", asset.url));
        };

        if let Err(e) = tokio::fs::create_dir_all(&self.download_dir).await {
            return Fetch::Unavailable(Ietf2VconError::io(&self.download_dir, e).to_string());
        }
        let template = self.download_dir.join(format!("{id}.%(ext)s"));
        let args = vec![
            "-f".to_string(),
            self.format.clone(),
            "-o".to_string(),
            template.to_string_lossy().into_owned(),
            "--print".to_string(),
            "after_move:filepath".to_string(),
            video_url(&id),
        ];

        match run(&self.program, &args).await {
            Ok(stdout) => match stdout.lines().rev().map(str::trim).find(|l| !l.is_empty()) {
                Some(path) => Fetch::Available(PathBuf::from(path)),
                None => Fetch::unavailable("yt-dlp reported no output file"),
            },
            Err(e) => Fetch::Unavailable(e.to_string()),
        }
    }
}

#[async_trait]
impl CaptionFetcher for YoutubeClient {
    async fn fetch_captions(&self, video_url: &str) -> Fetch<Vec<Segment>> {
        let Some(id) = extract_video_id(video_url) else {
            return Fetch::unavailable(format!("not a YouTube URL: {video_url}"));
        };
        Fetch::from_result(self.captions(&id).await).non_empty(format!("captions for {id} are empty"))
    }
}

// ---------------------------------------------------------------------------
// Pure helpers
// ---------------------------------------------------------------------------

pub fn video_url(id: &str) -> String {
    format!("https://www.youtube.com/watch?v={id}")
}

/// Pull the 11-character id out of a watch, short, or embed URL, or accept a
/// bare id.
pub fn extract_video_id(url: &str) -> Option<String> {
    if let Some(caps) = VIDEO_ID_RE.captures(url) {
        return caps.get(1).map(|m| m.as_str().to_string());
    }
    BARE_ID_RE.is_match(url).then(|| url.to_string())
}

/// Whether a video title names this meeting and group.
pub fn title_matches_session(title: &str, meeting: u32, group: &str) -> bool {
    let title = title.to_lowercase();
    let names_meeting = [
        format!("ietf {meeting}"),
        format!("ietf{meeting}"),
        format!("ietf-{meeting}"),
    ]
    .iter()
    .any(|needle| title.contains(needle.as_str()));
    names_meeting && title.contains(&group.to_lowercase())
}

/// Parse `id|title|duration` lines. Duration may be `NA`.
pub fn parse_search_output(stdout: &str) -> Vec<SearchHit> {
    stdout
        .lines()
        .filter_map(|line| {
            let mut parts = line.trim().splitn(3, '|');
            let id = parts.next()?.trim();
            let title = parts.next()?.trim();
            if id.is_empty() {
                return None;
            }
            let duration = parts.next().and_then(|d| d.trim().parse::<f64>().ok());
            Some(SearchHit {
                id: id.to_string(),
                title: title.to_string(),
                duration,
            })
        })
        .collect()
}

#[derive(Debug, Deserialize)]
struct Json3 {
    #[serde(default)]
    events: Vec<Json3Event>,
}

#[derive(Debug, Deserialize)]
#[serde(rename_all = "camelCase")]
struct Json3Event {
    #[serde(default)]
    t_start_ms: u64,
    #[serde(default)]
    d_duration_ms: u64,
    #[serde(default)]
    segs: Vec<Json3Seg>,
}

#[derive(Debug, Deserialize)]
struct Json3Seg {
    #[serde(default)]
    utf8: String,
}

/// Parse YouTube's `json3` caption format into ordered segments.
///
/// Events without text (window/style events, lone newlines) are dropped.
pub fn parse_json3(raw: &str) -> Result<Vec<Segment>> {
    let doc: Json3 =
        serde_json::from_str(raw).map_err(|e| Ietf2VconError::parse(format!("json3 captions: {e}")))?;

    let mut cues: Vec<(u64, u64, String)> = doc
        .events
        .into_iter()
        .filter_map(|ev| {
            let text: String = ev.segs.iter().map(|s| s.utf8.as_str()).collect();
            let text = text.split_whitespace().collect::<Vec<_>>().join(" ");
            (!text.is_empty()).then_some((ev.t_start_ms, ev.d_duration_ms, text))
        })
        .collect();
    cues.sort_by_key(|(start, _, _)| *start);

    Ok(cues
        .into_iter()
        .enumerate()
        .map(|(i, (start, dur, text))| {
            Segment::new(i as u32, start as f64 / 1000.0, start.saturating_add(dur) as f64 / 1000.0, text)
        })
        .collect())
}

async fn find_caption_file(dir: &Path, video_id: &str) -> Option<PathBuf> {
    let preferred = dir.join(format!("{video_id}.en.json3"));
    if tokio::fs::try_exists(&preferred).await.unwrap_or(false) {
        return Some(preferred);
    }

    let mut entries = tokio::fs::read_dir(dir).await.ok()?;
    while let Ok(Some(entry)) = entries.next_entry().await {
        let name = entry.file_name();
        let name = name.to_string_lossy();
        if name.starts_with(video_id) && name.ends_with(".json3") {
            return Some(entry.path());
        }
    }
    None
}
