//! Error types for ietf2vcon.
//!
//! Library crates use [`Ietf2VconError`] via `thiserror`.
//! The CLI wraps this with `color-eyre` for rich diagnostics.
//!
//! Capability-level failures (a source that is down, a session with no
//! captions) are *not* errors: they travel as [`crate::Fetch::Unavailable`].
//! The variants here that matter to a conversion run are the structural ones,
//! see [`Ietf2VconError::is_structural`].

use std::path::PathBuf;

/// Top-level error type for all ietf2vcon operations.
#[derive(Debug, thiserror::Error)]
pub enum Ietf2VconError {
    /// Configuration loading or validation error.
    #[error("config error: {message}")]
    Config { message: String },

    /// Network/HTTP error talking to Datatracker, Zulip, etc.
    #[error("network error: {0}")]
    Network(String),

    /// Response or file content could not be parsed.
    #[error("parse error: {message}")]
    Parse { message: String },

    /// Filesystem I/O error.
    #[error("I/O error at {path:?}: {source}")]
    Io {
        path: PathBuf,
        source: std::io::Error,
    },

    /// An external program (yt-dlp, whisper) failed or is missing.
    #[error("{program} failed: {message}")]
    Tool { program: String, message: String },

    /// A builder call was given input that would break a document invariant.
    #[error("validation error: {message}")]
    Validation { message: String },

    /// An analysis entry referenced a dialog entry that does not exist.
    #[error("dangling dialog reference: index {index} but document has {dialog_count} dialog entries")]
    DanglingReference { index: usize, dialog_count: usize },

    /// `build()` found one or more violated invariants.
    #[error("incomplete document: {}", violations.join("; "))]
    IncompleteDocument { violations: Vec<String> },
}

/// Convenience alias used throughout the codebase.
pub type Result<T> = std::result::Result<T, Ietf2VconError>;

impl Ietf2VconError {
    /// Create a config error from any displayable message.
    pub fn config(msg: impl Into<String>) -> Self {
        Self::Config {
            message: msg.into(),
        }
    }

    /// Create a parse error from any displayable message.
    pub fn parse(msg: impl Into<String>) -> Self {
        Self::Parse {
            message: msg.into(),
        }
    }

    /// Create a validation error from any displayable message.
    pub fn validation(msg: impl Into<String>) -> Self {
        Self::Validation {
            message: msg.into(),
        }
    }

    /// Create a tool error for an external program.
    pub fn tool(program: impl Into<String>, msg: impl Into<String>) -> Self {
        Self::Tool {
            program: program.into(),
            message: msg.into(),
        }
    }

    /// Wrap a `std::io::Error` with a path for context.
    pub fn io(path: impl Into<PathBuf>, source: std::io::Error) -> Self {
        Self::Io {
            path: path.into(),
            source,
        }
    }

    /// Whether this error signals a broken document invariant.
    ///
    /// Structural errors are always fatal to a conversion run; they mean the
    /// orchestrator handed the builder input it should never have produced.
    pub fn is_structural(&self) -> bool {
        matches!(
            self,
            Self::Validation { .. } | Self::DanglingReference { .. } | Self::IncompleteDocument { .. }
        )
    }
}
