//! Writing and reading vCon files and subtitle exports.

use std::path::{Path, PathBuf};

use tracing::{debug, info, instrument};

use ietf2vcon_shared::{Ietf2VconError, Result};
use ietf2vcon_vcon::{Transcript, Vcon, to_srt, to_webvtt};

use crate::orchestrator::ConversionReport;

/// Subtitle formats to export.
#[derive(Debug, Clone, Copy, Default, PartialEq, Eq)]
pub struct SubtitleFormats {
    pub srt: bool,
    pub webvtt: bool,
}

impl SubtitleFormats {
    pub fn any(&self) -> bool {
        self.srt || self.webvtt
    }
}

/// `ietf<meeting>_<group>`, the stem shared by every output file of a run.
pub fn base_name(report: &ConversionReport) -> String {
    format!("ietf{}_{}", report.meeting.number, report.group)
}

/// `ietf<meeting>_<group>_<session_id>.vcon.json`
pub fn default_file_name(report: &ConversionReport) -> String {
    let session: String = report
        .session_id
        .chars()
        .map(|c| if c.is_ascii_alphanumeric() || c == '-' || c == '_' { c } else { '_' })
        .collect();
    format!("{}_{session}.vcon.json", base_name(report))
}

/// Write the report's vCon as pretty JSON.
///
/// `path` overrides the default `<output_dir>/<default_file_name>`.
#[instrument(skip_all, fields(uuid = %report.vcon.uuid()))]
pub fn save_vcon(report: &ConversionReport, path: Option<&Path>, output_dir: &Path) -> Result<PathBuf> {
    let target = match path {
        Some(p) => p.to_path_buf(),
        None => output_dir.join(default_file_name(report)),
    };
    let json = report.vcon.to_json_pretty()?;
    write_atomic(&target, json.as_bytes())?;
    info!(path = %target.display(), bytes = json.len(), "saved vCon");
    Ok(target)
}

/// Read a vCon file and check its structure.
///
/// Structural violations are reported as [`Ietf2VconError::IncompleteDocument`].
pub fn load_vcon(path: &Path) -> Result<Vcon> {
    let content = std::fs::read_to_string(path).map_err(|e| Ietf2VconError::io(path, e))?;
    let vcon = Vcon::from_json(&content)?;
    let violations = vcon.validate();
    if !violations.is_empty() {
        return Err(Ietf2VconError::IncompleteDocument { violations });
    }
    Ok(vcon)
}

/// Write `<base>.srt` and/or `<base>.vtt` next to each other in `output_dir`.
pub fn export_subtitles(
    transcript: &Transcript,
    output_dir: &Path,
    base: &str,
    formats: SubtitleFormats,
) -> Result<Vec<PathBuf>> {
    let mut written = Vec::new();
    if formats.srt {
        let path = output_dir.join(format!("{base}.srt"));
        write_atomic(&path, to_srt(transcript).as_bytes())?;
        written.push(path);
    }
    if formats.webvtt {
        let path = output_dir.join(format!("{base}.vtt"));
        write_atomic(&path, to_webvtt(transcript).as_bytes())?;
        written.push(path);
    }
    debug!(count = written.len(), "exported subtitles");
    Ok(written)
}

/// Write to `.<name>.tmp` beside the target, then rename over it.
fn write_atomic(target: &Path, content: &[u8]) -> Result<()> {
    let dir = match target.parent() {
        Some(p) if !p.as_os_str().is_empty() => p.to_path_buf(),
        _ => PathBuf::from("."),
    };
    std::fs::create_dir_all(&dir).map_err(|e| Ietf2VconError::io(&dir, e))?;

    let name = target
        .file_name()
        .ok_or_else(|| Ietf2VconError::validation(format!("not a file path: {}", target.display())))?;
    let temp = dir.join(format!(".{}.tmp", name.to_string_lossy()));

    std::fs::write(&temp, content).map_err(|e| Ietf2VconError::io(&temp, e))?;
    std::fs::rename(&temp, target).map_err(|e| Ietf2VconError::io(target, e))?;
    debug!(path = %target.display(), size = content.len(), "wrote file");
    Ok(())
}
