//! World Transcription Format (draft-howe-wtf-transcription) analysis bodies.

use serde_json::{Map, Value, json};

use crate::segment::Transcript;

/// Analysis `type` for WTF transcripts.
pub const WTF_ANALYSIS_TYPE: &str = "wtf_transcription";

/// Analysis `spec` for WTF transcripts.
pub const WTF_SPEC: &str = "draft-howe-wtf-transcription-00";

/// Build the WTF body for a transcript.
///
/// Times are rounded to milliseconds and confidences to four decimals.
/// The body carries no wall-clock timestamp so that the same transcript
/// always yields the same body.
pub fn wtf_body(transcript: &Transcript) -> Value {
    let segments: Vec<Value> = transcript
        .segments()
        .iter()
        .map(|seg| {
            let mut obj = Map::new();
            obj.insert("id".into(), json!(seg.id));
            obj.insert("start".into(), json!(round_to(seg.start, 3)));
            obj.insert("end".into(), json!(round_to(seg.end, 3)));
            obj.insert("text".into(), json!(seg.text.trim()));
            if let Some(speaker) = seg.speaker {
                obj.insert("speaker".into(), json!(speaker));
            }
            if let Some(confidence) = seg.confidence {
                obj.insert("confidence".into(), json!(round_to(confidence, 4)));
            }
            Value::Object(obj)
        })
        .collect();

    json!({
        "transcript": {
            "text": transcript.text(),
            "language": transcript.language().unwrap_or("en"),
            "duration": transcript.duration().map(|d| round_to(d, 3)),
            "confidence": transcript.confidence().map(|c| round_to(c, 4)),
        },
        "segments": segments,
        "metadata": {
            "provider": transcript.provider(),
            "model": transcript.model(),
            "segment_count": transcript.segments().len(),
        },
    })
}

fn round_to(value: f64, decimals: i32) -> f64 {
    let factor = 10f64.powi(decimals);
    (value * factor).round() / factor
}
