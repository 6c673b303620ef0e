//! The vCon document schema.
//!
//! Entry types have public fields so they can be inspected freely; the
//! [`Vcon`] root only exposes accessors. A `Vcon` is obtained either from
//! [`crate::VconBuilder::build`] or by parsing a persisted file with
//! [`Vcon::from_json`], after which [`Vcon::validate`] reports any broken
//! invariant.

use std::collections::HashSet;
use std::fmt;

use chrono::{DateTime, Utc};
use serde::{Deserialize, Serialize};
use serde_json::Value;
use uuid::Uuid;

use ietf2vcon_shared::{Ietf2VconError, Result};

/// vCon schema version written by this crate.
pub const VCON_VERSION: &str = "0.0.1";

// ---------------------------------------------------------------------------
// Party
// ---------------------------------------------------------------------------

/// Role of a party in the session.
///
/// Unknown roles read from disk become [`PartyRole::Custom`]; the builder
/// only accepts them after an explicit [`crate::VconBuilder::allow_role`].
#[derive(Debug, Clone, PartialEq, Eq, Hash, Serialize, Deserialize)]
#[serde(from = "String", into = "String")]
pub enum PartyRole {
    Chair,
    Presenter,
    Speaker,
    Attendee,
    NoteTaker,
    Custom(String),
}

impl PartyRole {
    /// Parse one of the built-in roles. `scribe` is an alias for `note-taker`.
    pub fn known(s: &str) -> Option<Self> {
        match s.trim().to_ascii_lowercase().as_str() {
            "chair" => Some(Self::Chair),
            "presenter" => Some(Self::Presenter),
            "speaker" => Some(Self::Speaker),
            "attendee" => Some(Self::Attendee),
            "note-taker" | "notetaker" | "scribe" => Some(Self::NoteTaker),
            _ => None,
        }
    }

    pub fn as_str(&self) -> &str {
        match self {
            Self::Chair => "chair",
            Self::Presenter => "presenter",
            Self::Speaker => "speaker",
            Self::Attendee => "attendee",
            Self::NoteTaker => "note-taker",
            Self::Custom(s) => s,
        }
    }
}

impl From<String> for PartyRole {
    fn from(s: String) -> Self {
        Self::known(&s).unwrap_or(Self::Custom(s))
    }
}

impl From<PartyRole> for String {
    fn from(role: PartyRole) -> Self {
        role.as_str().to_string()
    }
}

impl fmt::Display for PartyRole {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        f.write_str(self.as_str())
    }
}

/// A participant. Identity is the `(name, role)` pair.
#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
pub struct Party {
    pub name: String,
    #[serde(default, skip_serializing_if = "Option::is_none")]
    pub mailto: Option<String>,
    pub role: PartyRole,
    #[serde(default, skip_serializing_if = "Option::is_none")]
    pub meta: Option<Value>,
}

// ---------------------------------------------------------------------------
// Payloads
// ---------------------------------------------------------------------------

/// Body encoding.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Serialize, Deserialize)]
#[serde(rename_all = "lowercase")]
pub enum Encoding {
    None,
    Base64,
    Base64url,
    Json,
}

/// Where an entry's content lives: behind a URL or inline in the document.
///
/// Builder inputs take a `Payload`, so "both" and "neither" cannot be
/// expressed. Persisted entries keep the flat `url`/`body` fields of the
/// wire format and are checked by [`Vcon::validate`].
#[derive(Debug, Clone, PartialEq)]
pub enum Payload {
    Url(String),
    Inline { body: Value, encoding: Encoding },
}

impl Payload {
    pub fn url(url: impl Into<String>) -> Self {
        Self::Url(url.into())
    }

    /// Plain text carried inline with `encoding = "none"`.
    pub fn text(text: impl Into<String>) -> Self {
        Self::Inline {
            body: Value::String(text.into()),
            encoding: Encoding::None,
        }
    }

    /// A structured JSON body with `encoding = "none"`.
    pub fn json(body: Value) -> Self {
        Self::Inline {
            body,
            encoding: Encoding::None,
        }
    }

    /// True when the URL is blank or the body carries nothing.
    pub fn is_empty(&self) -> bool {
        match self {
            Self::Url(url) => url.trim().is_empty(),
            Self::Inline { body, .. } => match body {
                Value::Null => true,
                Value::String(s) => s.is_empty(),
                Value::Array(a) => a.is_empty(),
                Value::Object(o) => o.is_empty(),
                _ => false,
            },
        }
    }

    pub(crate) fn into_fields(self) -> (Option<String>, Option<Value>, Option<Encoding>) {
        match self {
            Self::Url(url) => (Some(url), None, None),
            Self::Inline { body, encoding } => (None, Some(body), Some(encoding)),
        }
    }
}

// ---------------------------------------------------------------------------
// Dialog / Attachment / Analysis
// ---------------------------------------------------------------------------

#[derive(Debug, Clone, Copy, PartialEq, Eq, Serialize, Deserialize)]
#[serde(rename_all = "lowercase")]
pub enum DialogType {
    Recording,
    Video,
    Audio,
    Text,
}

impl fmt::Display for DialogType {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        f.write_str(match self {
            Self::Recording => "recording",
            Self::Video => "video",
            Self::Audio => "audio",
            Self::Text => "text",
        })
    }
}

/// One media stream of the session.
#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
pub struct Dialog {
    #[serde(rename = "type")]
    pub kind: DialogType,
    pub start: DateTime<Utc>,
    #[serde(default)]
    pub parties: Vec<usize>,
    #[serde(default, skip_serializing_if = "Option::is_none")]
    pub duration: Option<f64>,
    pub mimetype: String,
    #[serde(default, skip_serializing_if = "Option::is_none")]
    pub filename: Option<String>,
    #[serde(default, skip_serializing_if = "Option::is_none")]
    pub url: Option<String>,
    #[serde(default, skip_serializing_if = "Option::is_none")]
    pub body: Option<Value>,
    #[serde(default, skip_serializing_if = "Option::is_none")]
    pub encoding: Option<Encoding>,
    #[serde(default, skip_serializing_if = "Option::is_none")]
    pub alg: Option<String>,
    #[serde(default, skip_serializing_if = "Option::is_none")]
    pub signature: Option<String>,
    #[serde(default, skip_serializing_if = "Option::is_none")]
    pub meta: Option<Value>,
}

/// A document attached to the session (materials, lawful basis, metadata).
#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
pub struct Attachment {
    #[serde(rename = "type")]
    pub kind: String,
    #[serde(default, skip_serializing_if = "Option::is_none")]
    pub url: Option<String>,
    #[serde(default, skip_serializing_if = "Option::is_none")]
    pub body: Option<Value>,
    #[serde(default, skip_serializing_if = "Option::is_none")]
    pub encoding: Option<Encoding>,
    #[serde(default, skip_serializing_if = "Option::is_none")]
    pub mimetype: Option<String>,
    #[serde(default, skip_serializing_if = "Option::is_none")]
    pub filename: Option<String>,
    #[serde(default, skip_serializing_if = "Option::is_none")]
    pub meta: Option<Value>,
}

/// A derived artifact bound to one dialog entry by position.
#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
pub struct Analysis {
    #[serde(rename = "type")]
    pub kind: String,
    /// Position of the dialog entry this analysis describes.
    pub dialog: usize,
    pub vendor: String,
    #[serde(default, skip_serializing_if = "Option::is_none")]
    pub spec: Option<String>,
    pub body: Value,
    #[serde(default, skip_serializing_if = "Option::is_none")]
    pub encoding: Option<Encoding>,
}

// ---------------------------------------------------------------------------
// Vcon
// ---------------------------------------------------------------------------

/// A finished conversation container.
#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
pub struct Vcon {
    vcon: String,
    uuid: Uuid,
    created_at: DateTime<Utc>,
    #[serde(default, skip_serializing_if = "Option::is_none")]
    updated_at: Option<DateTime<Utc>>,
    #[serde(default, skip_serializing_if = "Option::is_none")]
    subject: Option<String>,
    #[serde(default)]
    parties: Vec<Party>,
    #[serde(default)]
    dialog: Vec<Dialog>,
    #[serde(default)]
    attachments: Vec<Attachment>,
    #[serde(default)]
    analysis: Vec<Analysis>,
}

impl Vcon {
    /// An empty draft owned by the builder.
    pub(crate) fn draft(uuid: Uuid, created_at: DateTime<Utc>) -> Self {
        Self {
            vcon: VCON_VERSION.to_string(),
            uuid,
            created_at,
            updated_at: None,
            subject: None,
            parties: Vec::new(),
            dialog: Vec::new(),
            attachments: Vec::new(),
            analysis: Vec::new(),
        }
    }

    pub fn version(&self) -> &str {
        &self.vcon
    }

    pub fn uuid(&self) -> Uuid {
        self.uuid
    }

    pub fn created_at(&self) -> DateTime<Utc> {
        self.created_at
    }

    pub fn updated_at(&self) -> Option<DateTime<Utc>> {
        self.updated_at
    }

    pub fn subject(&self) -> Option<&str> {
        self.subject.as_deref()
    }

    pub fn parties(&self) -> &[Party] {
        &self.parties
    }

    pub fn dialog(&self) -> &[Dialog] {
        &self.dialog
    }

    pub fn attachments(&self) -> &[Attachment] {
        &self.attachments
    }

    pub fn analysis(&self) -> &[Analysis] {
        &self.analysis
    }

    /// Analysis entries of one type, e.g. `wtf_transcription`.
    pub fn analysis_of_type<'a>(&'a self, kind: &'a str) -> impl Iterator<Item = &'a Analysis> {
        self.analysis.iter().filter(move |a| a.kind == kind)
    }

    /// Attachments of one type, e.g. `lawful_basis`.
    pub fn attachments_of_type<'a>(
        &'a self,
        kind: &'a str,
    ) -> impl Iterator<Item = &'a Attachment> {
        self.attachments.iter().filter(move |a| a.kind == kind)
    }

    pub fn to_json_pretty(&self) -> Result<String> {
        serde_json::to_string_pretty(self)
            .map_err(|e| Ietf2VconError::parse(format!("vCon serialization failed: {e}")))
    }

    pub fn from_json(s: &str) -> Result<Self> {
        serde_json::from_str(s).map_err(|e| Ietf2VconError::parse(format!("invalid vCon: {e}")))
    }

    // Mutators for the builder. Callers must have validated first.

    pub(crate) fn set_subject(&mut self, subject: String) {
        self.subject = Some(subject);
    }

    pub(crate) fn push_party(&mut self, party: Party) -> usize {
        self.parties.push(party);
        self.parties.len() - 1
    }

    pub(crate) fn push_dialog(&mut self, dialog: Dialog) -> usize {
        self.dialog.push(dialog);
        self.dialog.len() - 1
    }

    pub(crate) fn push_attachment(&mut self, attachment: Attachment) -> usize {
        self.attachments.push(attachment);
        self.attachments.len() - 1
    }

    pub(crate) fn push_analysis(&mut self, analysis: Analysis) -> usize {
        self.analysis.push(analysis);
        self.analysis.len() - 1
    }

    pub(crate) fn stamp(&mut self, at: DateTime<Utc>) {
        self.updated_at = Some(at.max(self.created_at));
    }

    /// Check every structural invariant and return all violations.
    ///
    /// An empty list means the document is valid.
    pub fn validate(&self) -> Vec<String> {
        let mut violations = Vec::new();

        if self.vcon.trim().is_empty() {
            violations.push("vcon version is empty".to_string());
        }
        if self.uuid.is_nil() {
            violations.push("uuid is not set".to_string());
        }
        if self.subject.as_deref().is_some_and(|s| s.trim().is_empty()) {
            violations.push("subject is empty".to_string());
        }
        if self.updated_at.is_some_and(|u| u < self.created_at) {
            violations.push("updated_at is before created_at".to_string());
        }

        if self.parties.is_empty() {
            violations.push("document has no parties".to_string());
        }
        let mut identities = HashSet::new();
        for (i, party) in self.parties.iter().enumerate() {
            if party.name.trim().is_empty() {
                violations.push(format!("parties[{i}]: empty name"));
            }
            if !identities.insert((party.name.as_str(), party.role.as_str())) {
                violations.push(format!(
                    "parties[{i}]: duplicate party '{}' with role {}",
                    party.name, party.role
                ));
            }
        }

        for (i, d) in self.dialog.iter().enumerate() {
            if let Some(v) = payload_violation(d.url.as_deref(), d.body.as_ref()) {
                violations.push(format!("dialog[{i}]: {v}"));
            }
            if d.mimetype.trim().is_empty() {
                violations.push(format!("dialog[{i}]: empty mimetype"));
            }
            if d.duration.is_some_and(|x| !x.is_finite() || x < 0.0) {
                violations.push(format!("dialog[{i}]: invalid duration"));
            }
            for p in &d.parties {
                if *p >= self.parties.len() {
                    violations.push(format!(
                        "dialog[{i}]: party {p} out of range ({} parties)",
                        self.parties.len()
                    ));
                }
            }
        }

        for (i, a) in self.attachments.iter().enumerate() {
            if a.kind.trim().is_empty() {
                violations.push(format!("attachments[{i}]: empty type"));
            }
            if let Some(v) = payload_violation(a.url.as_deref(), a.body.as_ref()) {
                violations.push(format!("attachments[{i}]: {v}"));
            }
        }

        for (i, a) in self.analysis.iter().enumerate() {
            if a.kind.trim().is_empty() {
                violations.push(format!("analysis[{i}]: empty type"));
            }
            if a.vendor.trim().is_empty() {
                violations.push(format!("analysis[{i}]: empty vendor"));
            }
            if a.dialog >= self.dialog.len() {
                violations.push(format!(
                    "analysis[{i}]: dangling dialog reference {} ({} dialog entries)",
                    a.dialog,
                    self.dialog.len()
                ));
            }
        }

        violations
    }
}

fn payload_violation(url: Option<&str>, body: Option<&Value>) -> Option<&'static str> {
    match (url, body) {
        (Some(_), Some(_)) => Some("both url and body are set"),
        (None, None) => Some("neither url nor body is set"),
        (Some(u), None) if u.trim().is_empty() => Some("empty url"),
        (None, Some(Value::Null)) => Some("null body"),
        _ => None,
    }
}
