//! Running external programs (yt-dlp, whisper).

use std::process::Stdio;

use tokio::process::Command;
use tracing::debug;

use ietf2vcon_shared::{Ietf2VconError, Result};

/// Run `program` with `args` and return its stdout.
///
/// The child is killed if the returned future is dropped, so callers can
/// bound it with `tokio::time::timeout`.
pub(crate) async fn run(program: &str, args: &[String]) -> Result<String> {
    debug!(program, ?args, "spawning");
    let output = Command::new(program)
        .args(args)
        .stdin(Stdio::null())
        .stdout(Stdio::piped())
        .stderr(Stdio::piped())
        .kill_on_drop(true)
        .output()
        .await
        .map_err(|e| match e.kind() {
            std::io::ErrorKind::NotFound => Ietf2VconError::tool(program, "not found on PATH"),
            _ => Ietf2VconError::tool(program, e.to_string()),
        })?;

    if !output.status.success() {
        let stderr = String::from_utf8_lossy(&output.stderr);
        let last = stderr.lines().rev().find(|l| !l.trim().is_empty()).unwrap_or("");
        return Err(Ietf2VconError::tool(
            program,
            format!("exited with {}: {}", output.status, last.trim()),
        ));
    }

    Ok(String::from_utf8_lossy(&output.stdout).into_owned())
}

#[cfg(test)]
mod tests {
    use super::*;

    #[tokio::test]
    async fn missing_program_is_a_tool_error() {
        let err = run("ietf2vcon-definitely-not-installed", &[]).await.unwrap_err();
        assert!(err.to_string().contains("not found on PATH"));
    }
}
