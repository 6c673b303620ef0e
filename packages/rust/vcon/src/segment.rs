//! Transcript segments and their aggregation.

use std::collections::HashSet;

use serde::{Deserialize, Serialize};
use tracing::warn;

use ietf2vcon_shared::{Ietf2VconError, Result};

/// Overlap between consecutive segments up to this many seconds is not flagged.
pub const OVERLAP_TOLERANCE_SECS: f64 = 0.05;

/// One time-bounded unit of transcribed text.
#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
pub struct Segment {
    pub id: u32,
    /// Seconds from the start of the media.
    pub start: f64,
    pub end: f64,
    pub text: String,
    /// Party index of the speaker, when known.
    #[serde(default, skip_serializing_if = "Option::is_none")]
    pub speaker: Option<u32>,
    #[serde(default, skip_serializing_if = "Option::is_none")]
    pub confidence: Option<f64>,
}

impl Segment {
    pub fn new(id: u32, start: f64, end: f64, text: impl Into<String>) -> Self {
        Self {
            id,
            start,
            end,
            text: text.into(),
            speaker: None,
            confidence: None,
        }
    }

    pub fn with_confidence(mut self, confidence: f64) -> Self {
        self.confidence = Some(confidence);
        self
    }

    fn check(&self) -> Result<()> {
        if !self.start.is_finite() || self.start < 0.0 {
            return Err(Ietf2VconError::validation(format!(
                "segment {}: start {} must be a non-negative number",
                self.id, self.start
            )));
        }
        if !self.end.is_finite() || self.end < self.start {
            return Err(Ietf2VconError::validation(format!(
                "segment {}: end {} is before start {}",
                self.id, self.end, self.start
            )));
        }
        if self.text.trim().is_empty() {
            return Err(Ietf2VconError::validation(format!(
                "segment {}: empty text",
                self.id
            )));
        }
        if self.confidence.is_some_and(|c| !c.is_finite()) {
            return Err(Ietf2VconError::validation(format!(
                "segment {}: confidence is not a number",
                self.id
            )));
        }
        Ok(())
    }
}

/// An ordered, validated sequence of segments from one provider.
///
/// Fields are private so a transcript cannot change after it has been
/// checked (and, by extension, after it has been attached to a document).
#[derive(Debug, Clone, PartialEq)]
pub struct Transcript {
    segments: Vec<Segment>,
    provider: String,
    model: Option<String>,
    language: Option<String>,
    reported_duration: Option<f64>,
}

impl Transcript {
    /// Validate `segments` and wrap them.
    ///
    /// Fails on a duplicate id, a negative or inverted time range, empty
    /// text, or a start that regresses relative to its predecessor.
    /// Overlapping segments are accepted and logged.
    pub fn new(provider: impl Into<String>, segments: Vec<Segment>) -> Result<Self> {
        let provider = provider.into();
        if provider.trim().is_empty() {
            return Err(Ietf2VconError::validation("transcript provider is empty"));
        }

        let mut ids = HashSet::with_capacity(segments.len());
        for (i, seg) in segments.iter().enumerate() {
            seg.check()?;
            if !ids.insert(seg.id) {
                return Err(Ietf2VconError::validation(format!(
                    "duplicate segment id {}",
                    seg.id
                )));
            }
            if let Some(prev) = i.checked_sub(1).map(|p| &segments[p]) {
                if seg.start < prev.start {
                    return Err(Ietf2VconError::validation(format!(
                        "segment {} starts at {} before segment {} at {}",
                        seg.id, seg.start, prev.id, prev.start
                    )));
                }
            }
        }

        let transcript = Self {
            segments,
            provider,
            model: None,
            language: None,
            reported_duration: None,
        };

        let overlaps = transcript.overlaps();
        if !overlaps.is_empty() {
            warn!(
                provider = %transcript.provider,
                count = overlaps.len(),
                first = ?overlaps[0],
                "transcript has overlapping segments"
            );
        }

        Ok(transcript)
    }

    pub fn with_model(mut self, model: impl Into<String>) -> Self {
        self.model = Some(model.into());
        self
    }

    pub fn with_language(mut self, language: impl Into<String>) -> Self {
        self.language = Some(language.into());
        self
    }

    /// Duration reported by the source, used when there are no segments.
    pub fn with_reported_duration(mut self, seconds: f64) -> Self {
        if seconds.is_finite() && seconds >= 0.0 {
            self.reported_duration = Some(seconds);
        }
        self
    }

    pub fn segments(&self) -> &[Segment] {
        &self.segments
    }

    pub fn provider(&self) -> &str {
        &self.provider
    }

    pub fn model(&self) -> Option<&str> {
        self.model.as_deref()
    }

    pub fn language(&self) -> Option<&str> {
        self.language.as_deref()
    }

    pub fn is_empty(&self) -> bool {
        self.segments.is_empty()
    }

    /// Segment texts joined with a single space.
    pub fn text(&self) -> String {
        self.segments
            .iter()
            .map(|s| s.text.trim())
            .collect::<Vec<_>>()
            .join(" ")
    }

    /// Latest segment end, or the reported duration when there are no segments.
    pub fn duration(&self) -> Option<f64> {
        if self.segments.is_empty() {
            return self.reported_duration;
        }
        self.segments.iter().map(|s| s.end).reduce(f64::max)
    }

    /// Mean of the segment confidences that are present.
    pub fn confidence(&self) -> Option<f64> {
        let values: Vec<f64> = self.segments.iter().filter_map(|s| s.confidence).collect();
        if values.is_empty() {
            None
        } else {
            Some(values.iter().sum::<f64>() / values.len() as f64)
        }
    }

    /// Pairs of consecutive segment ids whose overlap exceeds the tolerance.
    pub fn overlaps(&self) -> Vec<(u32, u32)> {
        self.segments
            .windows(2)
            .filter(|w| w[0].end > w[1].start + OVERLAP_TOLERANCE_SECS)
            .map(|w| (w[0].id, w[1].id))
            .collect()
    }
}
