//! IETF domain types and the capability outcome shared by every crate.

use chrono::{DateTime, Duration, Utc};
use serde::{Deserialize, Serialize};

// ---------------------------------------------------------------------------
// Fetch
// ---------------------------------------------------------------------------

/// Outcome of fetching one capability from an external collaborator.
///
/// Collaborators never raise past their boundary: a missing recording, an
/// expired credential, or a timeout all become [`Fetch::Unavailable`] with a
/// human-readable reason.
#[derive(Debug, Clone, PartialEq)]
pub enum Fetch<T> {
    /// The source delivered a value.
    Available(T),
    /// The source could not deliver; the string says why.
    Unavailable(String),
}

impl<T> Fetch<T> {
    /// Shorthand for an unavailable outcome.
    pub fn unavailable(reason: impl Into<String>) -> Self {
        Self::Unavailable(reason.into())
    }

    pub fn is_available(&self) -> bool {
        matches!(self, Self::Available(_))
    }

    /// Discard the reason and keep the value, if any.
    pub fn ok(self) -> Option<T> {
        match self {
            Self::Available(v) => Some(v),
            Self::Unavailable(_) => None,
        }
    }

    /// The unavailability reason, if any.
    pub fn reason(&self) -> Option<&str> {
        match self {
            Self::Available(_) => None,
            Self::Unavailable(r) => Some(r),
        }
    }

    pub fn map<U>(self, f: impl FnOnce(T) -> U) -> Fetch<U> {
        match self {
            Self::Available(v) => Fetch::Available(f(v)),
            Self::Unavailable(r) => Fetch::Unavailable(r),
        }
    }

    /// Convert a fallible collaborator result at the capability boundary.
    pub fn from_result<E: std::fmt::Display>(result: std::result::Result<T, E>) -> Self {
        match result {
            Ok(v) => Self::Available(v),
            Err(e) => Self::Unavailable(e.to_string()),
        }
    }
}

impl<T> Fetch<Vec<T>> {
    /// Treat an empty list as unavailable ("source empty").
    pub fn non_empty(self, reason: impl Into<String>) -> Self {
        match self {
            Self::Available(v) if v.is_empty() => Self::Unavailable(reason.into()),
            other => other,
        }
    }
}

// ---------------------------------------------------------------------------
// Meeting / Session
// ---------------------------------------------------------------------------

/// IETF meeting metadata.
#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
pub struct Meeting {
    pub number: u32,
    #[serde(default, skip_serializing_if = "Option::is_none")]
    pub city: Option<String>,
    #[serde(default, skip_serializing_if = "Option::is_none")]
    pub country: Option<String>,
    #[serde(default, skip_serializing_if = "Option::is_none")]
    pub start_date: Option<DateTime<Utc>>,
    #[serde(default, skip_serializing_if = "Option::is_none")]
    pub time_zone: Option<String>,
}

impl Meeting {
    /// A meeting known only by its number.
    pub fn numbered(number: u32) -> Self {
        Self {
            number,
            city: None,
            country: None,
            start_date: None,
            time_zone: None,
        }
    }

    /// `"City, Country"` when the city is known.
    pub fn location(&self) -> Option<String> {
        self.city.as_ref().map(|city| match &self.country {
            Some(country) => format!("{city}, {country}"),
            None => city.clone(),
        })
    }
}

/// One working group session at a meeting.
#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
pub struct Session {
    pub meeting_number: u32,
    pub group_acronym: String,
    pub session_id: String,
    #[serde(default, skip_serializing_if = "Option::is_none")]
    pub name: Option<String>,
    #[serde(default, skip_serializing_if = "Option::is_none")]
    pub start_time: Option<DateTime<Utc>>,
    #[serde(default, skip_serializing_if = "Option::is_none")]
    pub duration_seconds: Option<u64>,
    #[serde(default, skip_serializing_if = "Option::is_none")]
    pub room: Option<String>,
}

impl Session {
    /// Placeholder session used when Datatracker has no record.
    pub fn minimal(meeting_number: u32, group_acronym: &str) -> Self {
        Self {
            meeting_number,
            group_acronym: group_acronym.to_string(),
            session_id: format!("{group_acronym}-{meeting_number}"),
            name: None,
            start_time: None,
            duration_seconds: None,
            room: None,
        }
    }

    /// The chat window for this session, if its start is known.
    ///
    /// Without a duration the window is open-ended.
    pub fn window(&self) -> Option<TimeWindow> {
        let start = self.start_time?;
        let end = self
            .duration_seconds
            .and_then(|secs| i64::try_from(secs).ok())
            .map(|secs| start + Duration::seconds(secs));
        Some(TimeWindow { start, end })
    }
}

/// A `[start, end]` interval; `end = None` means "until now".
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub struct TimeWindow {
    pub start: DateTime<Utc>,
    pub end: Option<DateTime<Utc>>,
}

impl TimeWindow {
    pub fn contains(&self, ts: DateTime<Utc>) -> bool {
        ts >= self.start && self.end.is_none_or(|end| ts <= end)
    }
}

// ---------------------------------------------------------------------------
// Material / Person / ChatMessage
// ---------------------------------------------------------------------------

/// Meeting material (slides, agenda, minutes, recording link, ...).
#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
pub struct Material {
    /// slides, agenda, minutes, recording, chatlog, bluesheets, document.
    #[serde(rename = "type")]
    pub kind: String,
    pub title: String,
    pub url: String,
    #[serde(default, skip_serializing_if = "Option::is_none")]
    pub filename: Option<String>,
    #[serde(default, skip_serializing_if = "Option::is_none")]
    pub mimetype: Option<String>,
    #[serde(default, skip_serializing_if = "Option::is_none")]
    pub order: Option<i64>,
}

impl Material {
    pub fn is_recording(&self) -> bool {
        self.kind == "recording"
    }
}

/// Person involved in a session (chair, presenter, ...).
#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
pub struct Person {
    pub name: String,
    #[serde(default, skip_serializing_if = "Option::is_none")]
    pub email: Option<String>,
    #[serde(default, skip_serializing_if = "Option::is_none")]
    pub affiliation: Option<String>,
    #[serde(default, skip_serializing_if = "Option::is_none")]
    pub role: Option<String>,
}

/// A chat message from the session's Zulip stream.
#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
pub struct ChatMessage {
    pub timestamp: DateTime<Utc>,
    pub sender: String,
    #[serde(default, skip_serializing_if = "Option::is_none")]
    pub sender_email: Option<String>,
    pub content: String,
    #[serde(default, skip_serializing_if = "Option::is_none")]
    pub topic: Option<String>,
    #[serde(default, skip_serializing_if = "Option::is_none")]
    pub stream: Option<String>,
}

impl ChatMessage {
    /// `[YYYY-MM-DD HH:MM:SS] sender: content`
    pub fn to_log_line(&self) -> String {
        format!(
            "[{}] {}: {}",
            self.timestamp.format("%Y-%m-%d %H:%M:%S"),
            self.sender,
            self.content
        )
    }
}
