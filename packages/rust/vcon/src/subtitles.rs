//! SRT and WebVTT renderings of a transcript.

use crate::segment::Transcript;

/// Render as SubRip (`HH:MM:SS,mmm`).
pub fn to_srt(transcript: &Transcript) -> String {
    render(transcript, None, ',')
}

/// Render as WebVTT (`WEBVTT` header, `HH:MM:SS.mmm`).
pub fn to_webvtt(transcript: &Transcript) -> String {
    render(transcript, Some("WEBVTT"), '.')
}

fn render(transcript: &Transcript, header: Option<&str>, ms_sep: char) -> String {
    let mut out = String::new();
    if let Some(header) = header {
        out.push_str(header);
        out.push_str("\n\n");
    }
    for (i, seg) in transcript.segments().iter().enumerate() {
        out.push_str(&format!(
            "{}\n{} --> {}\n{}\n\n",
            i + 1,
            timestamp(seg.start, ms_sep),
            timestamp(seg.end, ms_sep),
            seg.text.trim()
        ));
    }
    out
}

fn timestamp(seconds: f64, ms_sep: char) -> String {
    let total_ms = (seconds.max(0.0) * 1000.0).round() as u64;
    let ms = total_ms % 1000;
    let secs = total_ms / 1000;
    format!(
        "{:02}:{:02}:{:02}{ms_sep}{:03}",
        secs / 3600,
        (secs % 3600) / 60,
        secs % 60,
        ms
    )
}
