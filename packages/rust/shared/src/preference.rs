//! Source preferences shared by config, CLI flags, and the source selector.

use std::fmt;
use std::str::FromStr;

use serde::{Deserialize, Serialize};

use crate::error::Ietf2VconError;

/// Which video source(s) to attach as dialog entries.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Hash, Default, Serialize, Deserialize)]
#[serde(rename_all = "lowercase")]
pub enum VideoPreference {
    #[default]
    Youtube,
    Meetecho,
    Both,
}

/// How the second source behaves under [`VideoPreference::Both`].
#[derive(Debug, Clone, Copy, PartialEq, Eq, Hash, Default, Serialize, Deserialize)]
#[serde(rename_all = "lowercase")]
pub enum BothVideoMode {
    /// Meetecho is always added as a second dialog entry.
    #[default]
    Supplement,
    /// Meetecho is only used when YouTube is unavailable.
    Fallback,
}

/// Where the transcript comes from.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Hash, Default, Serialize, Deserialize)]
#[serde(rename_all = "lowercase")]
pub enum TranscriptPreference {
    /// YouTube captions, then Whisper if local media exists.
    #[default]
    Auto,
    Youtube,
    Whisper,
}

/// Whisper model size.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Hash, Default, Serialize, Deserialize)]
#[serde(rename_all = "lowercase")]
pub enum WhisperModel {
    Tiny,
    #[default]
    Base,
    Small,
    Medium,
    Large,
}

macro_rules! string_enum {
    ($ty:ident, $what:literal, { $($variant:ident => $s:literal),+ $(,)? }) => {
        impl $ty {
            pub fn as_str(&self) -> &'static str {
                match self {
                    $(Self::$variant => $s,)+
                }
            }
        }

        impl fmt::Display for $ty {
            fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
                f.write_str(self.as_str())
            }
        }

        impl FromStr for $ty {
            type Err = Ietf2VconError;

            fn from_str(s: &str) -> std::result::Result<Self, Self::Err> {
                match s.trim().to_ascii_lowercase().as_str() {
                    $($s => Ok(Self::$variant),)+
                    other => Err(Ietf2VconError::config(format!(
                        concat!("unknown ", $what, " '{}': expected one of ", $($s, " "),+),
                        other
                    ))),
                }
            }
        }
    };
}

string_enum!(VideoPreference, "video source", {
    Youtube => "youtube",
    Meetecho => "meetecho",
    Both => "both",
});

string_enum!(BothVideoMode, "both-video mode", {
    Supplement => "supplement",
    Fallback => "fallback",
});

string_enum!(TranscriptPreference, "transcript source", {
    Auto => "auto",
    Youtube => "youtube",
    Whisper => "whisper",
});

string_enum!(WhisperModel, "whisper model", {
    Tiny => "tiny",
    Base => "base",
    Small => "small",
    Medium => "medium",
    Large => "large",
});
