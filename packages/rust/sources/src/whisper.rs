//! Local speech-to-text through the `whisper` command line.

use std::path::{Path, PathBuf};

use async_trait::async_trait;
use serde::Deserialize;
use tracing::{info, instrument};

use ietf2vcon_shared::{Fetch, Ietf2VconError, Result, WhisperModel};
use ietf2vcon_vcon::Segment;

use crate::process::run;
use crate::{SpeechResult, SpeechToText};

/// `whisper` CLI wrapper. Output JSON lands next to the media file.
#[derive(Debug, Clone)]
pub struct WhisperCli {
    program: String,
}

impl WhisperCli {
    pub fn new(program: impl Into<String>) -> Self {
        Self {
            program: program.into(),
        }
    }

    #[instrument(skip(self), fields(media = %media.display()))]
    pub async fn run(&self, media: &Path, model: WhisperModel) -> Result<SpeechResult> {
        let output_dir = media
            .parent()
            .filter(|p| !p.as_os_str().is_empty())
            .map(Path::to_path_buf)
            .unwrap_or_else(|| PathBuf::from("."));

        let args = vec![
            media.to_string_lossy().into_owned(),
            "--model".to_string(),
            model.as_str().to_string(),
            "--output_dir".to_string(),
            output_dir.to_string_lossy().into_owned(),
            "--output_format".to_string(),
            "json".to_string(),
        ];
        run(&self.program, &args).await?;

        let json_path = json_output_path(&output_dir, media)?;
        let raw = tokio::fs::read_to_string(&json_path)
            .await
            .map_err(|e| Ietf2VconError::io(&json_path, e))?;

        let result = parse_whisper_json(&raw)?;
        info!(segments = result.segments.len(), language = ?result.language, "whisper finished");
        Ok(result)
    }
}

#[async_trait]
impl SpeechToText for WhisperCli {
    async fn transcribe(&self, media: &Path, model: WhisperModel) -> Fetch<SpeechResult> {
        match self.run(media, model).await {
            Ok(result) if result.segments.is_empty() => {
                Fetch::unavailable(format!("whisper produced no speech for {}", media.display()))
            }
            other => Fetch::from_result(other),
        }
    }
}

#[derive(Debug, Deserialize)]
struct WhisperOutput {
    #[serde(default)]
    language: Option<String>,
    #[serde(default)]
    segments: Vec<WhisperSegment>,
}

#[derive(Debug, Deserialize)]
struct WhisperSegment {
    start: f64,
    end: f64,
    #[serde(default)]
    text: String,
    #[serde(default)]
    avg_logprob: Option<f64>,
}

/// Parse whisper's JSON output.
///
/// Confidence is `exp(avg_logprob)` clamped to `[0, 1]`. Blank segments are
/// dropped and ids renumbered.
/// `<output_dir>/<media stem>.json`. Only the last extension is replaced.
fn json_output_path(output_dir: &Path, media: &Path) -> Result<PathBuf> {
    let stem = media
        .file_stem()
        .ok_or_else(|| Ietf2VconError::validation(format!("no file name in {}", media.display())))?;
    Ok(output_dir.join(format!("{}.json", stem.to_string_lossy())))
}

pub fn parse_whisper_json(raw: &str) -> Result<SpeechResult> {
    let out: WhisperOutput = serde_json::from_str(raw)
        .map_err(|e| Ietf2VconError::parse(format!("whisper output: {e}")))?;

    let segments = out
        .segments
        .into_iter()
        .filter(|s| !s.text.trim().is_empty())
        .enumerate()
        .map(|(i, s)| {
            let seg = Segment::new(i as u32, s.start, s.end, s.text.trim());
            match s.avg_logprob {
                Some(lp) => seg.with_confidence(lp.exp().clamp(0.0, 1.0)),
                None => seg,
            }
        })
        .collect();

    Ok(SpeechResult {
        segments,
        language: out.language.filter(|l| !l.is_empty()),
    })
}
