//! Incremental, validated construction of a [`Vcon`].
//!
//! Every operation checks its input against the current draft before
//! touching it: a call either succeeds and leaves a valid draft, or returns
//! an error and leaves the draft exactly as it was.

use std::collections::BTreeSet;

use base64::Engine;
use base64::engine::general_purpose::URL_SAFE_NO_PAD;
use chrono::{DateTime, Utc};
use serde::{Deserialize, Serialize};
use serde_json::{Value, json};
use sha2::{Digest, Sha256};
use tracing::debug;
use uuid::Uuid;

use ietf2vcon_shared::{ChatMessage, Ietf2VconError, Material, Meeting, Person, Result, Session};

use crate::document::{
    Analysis, Attachment, Dialog, DialogType, Encoding, Party, PartyRole, Payload, Vcon,
};
use crate::segment::Transcript;
use crate::wtf::{WTF_ANALYSIS_TYPE, WTF_SPEC, wtf_body};

/// Spec identifier carried in the meta of lawful-basis attachments.
pub const LAWFUL_BASIS_SPEC: &str = "draft-howe-vcon-lawful-basis-00";

/// IETF Note Well terms URL.
pub const NOTE_WELL_URL: &str = "https://www.ietf.org/about/note-well/";

/// Handle to a dialog entry of one specific builder.
///
/// Returned by [`VconBuilder::add_dialog`] and [`VconBuilder::dialog_ref`].
/// A handle from another builder is rejected by
/// [`VconBuilder::add_analysis`].
#[derive(Debug, Clone, Copy, PartialEq, Eq, Hash)]
pub struct DialogRef {
    document: Uuid,
    index: usize,
}

impl DialogRef {
    /// Position of the dialog entry within its document.
    pub fn index(&self) -> usize {
        self.index
    }
}

/// Input for [`VconBuilder::add_dialog`].
#[derive(Debug, Clone)]
pub struct DialogSpec {
    pub kind: DialogType,
    pub payload: Payload,
    pub mimetype: String,
    /// Defaults to the document's `created_at`.
    pub start: Option<DateTime<Utc>>,
    /// Seconds.
    pub duration: Option<f64>,
    /// Party indices; defaults to every party present at the time of the call.
    pub parties: Option<Vec<usize>>,
    pub filename: Option<String>,
    pub meta: Option<Value>,
    signature: Option<String>,
}

impl DialogSpec {
    /// A dialog entry that references media by URL.
    pub fn url(kind: DialogType, url: impl Into<String>, mimetype: impl Into<String>) -> Self {
        Self::new(kind, Payload::url(url), mimetype)
    }

    /// A dialog entry with media bytes embedded as base64url, signed with SHA-256.
    pub fn inline_media(kind: DialogType, bytes: &[u8], mimetype: impl Into<String>) -> Self {
        let mut spec = Self::new(
            kind,
            Payload::Inline {
                body: Value::String(URL_SAFE_NO_PAD.encode(bytes)),
                encoding: Encoding::Base64url,
            },
            mimetype,
        );
        spec.signature = Some(sha256_hex(bytes));
        spec
    }

    pub fn new(kind: DialogType, payload: Payload, mimetype: impl Into<String>) -> Self {
        Self {
            kind,
            payload,
            mimetype: mimetype.into(),
            start: None,
            duration: None,
            parties: None,
            filename: None,
            meta: None,
            signature: None,
        }
    }

    pub fn with_start(mut self, start: DateTime<Utc>) -> Self {
        self.start = Some(start);
        self
    }

    pub fn with_duration(mut self, seconds: f64) -> Self {
        self.duration = Some(seconds);
        self
    }

    pub fn with_parties(mut self, parties: Vec<usize>) -> Self {
        self.parties = Some(parties);
        self
    }

    pub fn with_filename(mut self, filename: impl Into<String>) -> Self {
        self.filename = Some(filename.into());
        self
    }

    pub fn with_meta(mut self, meta: Value) -> Self {
        self.meta = Some(meta);
        self
    }
}

/// Input for [`VconBuilder::add_attachment`].
#[derive(Debug, Clone)]
pub struct AttachmentSpec {
    pub kind: String,
    pub payload: Payload,
    pub mimetype: Option<String>,
    pub filename: Option<String>,
    pub meta: Option<Value>,
}

impl AttachmentSpec {
    pub fn new(kind: impl Into<String>, payload: Payload) -> Self {
        Self {
            kind: kind.into(),
            payload,
            mimetype: None,
            filename: None,
            meta: None,
        }
    }

    pub fn with_meta(mut self, meta: Value) -> Self {
        self.meta = Some(meta);
        self
    }
}

/// One purpose for which processing is granted or denied.
#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
pub struct PurposeGrant {
    pub purpose: String,
    pub status: String,
}

impl PurposeGrant {
    pub fn granted(purpose: impl Into<String>) -> Self {
        Self {
            purpose: purpose.into(),
            status: "granted".into(),
        }
    }
}

/// Body of a `lawful_basis` attachment (draft-howe-vcon-lawful-basis).
#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
pub struct LawfulBasis {
    /// GDPR Article 6 basis, e.g. `legitimate_interests`.
    pub lawful_basis: String,
    #[serde(default, skip_serializing_if = "Vec::is_empty")]
    pub purpose_grants: Vec<PurposeGrant>,
    #[serde(default, skip_serializing_if = "Option::is_none")]
    pub terms_of_service: Option<String>,
    #[serde(default, skip_serializing_if = "Option::is_none")]
    pub terms_of_service_name: Option<String>,
    #[serde(default, skip_serializing_if = "Option::is_none")]
    pub jurisdiction: Option<String>,
    #[serde(default, skip_serializing_if = "Option::is_none")]
    pub controller: Option<String>,
    #[serde(default, skip_serializing_if = "Option::is_none")]
    pub expiration: Option<DateTime<Utc>>,
    #[serde(default, skip_serializing_if = "Option::is_none")]
    pub notes: Option<String>,
}

impl LawfulBasis {
    /// The IETF Note Well: participation implies agreement to recording,
    /// transcription, and public archival.
    pub fn ietf_note_well() -> Self {
        Self {
            lawful_basis: "legitimate_interests".into(),
            purpose_grants: ["recording", "transcription", "publication", "archival", "analysis"]
                .into_iter()
                .map(PurposeGrant::granted)
                .collect(),
            terms_of_service: Some(NOTE_WELL_URL.into()),
            terms_of_service_name: Some("IETF Note Well".into()),
            jurisdiction: Some("IETF".into()),
            controller: Some("Internet Engineering Task Force (IETF)".into()),
            expiration: None,
            notes: Some(
                "Participation in IETF meetings constitutes agreement to the Note Well, \
                 which permits recording, transcription, and public archival of proceedings. \
                 See also BCP 78 (RFC 5378) and BCP 79 (RFC 8179) for IPR policies."
                    .into(),
            ),
        }
    }
}

/// Owns the in-progress document until [`VconBuilder::build`].
#[derive(Debug)]
pub struct VconBuilder {
    draft: Vcon,
    custom_roles: BTreeSet<String>,
}

impl Default for VconBuilder {
    fn default() -> Self {
        Self::new()
    }
}

impl VconBuilder {
    /// Start a document with a fresh UUIDv7 and the current time.
    pub fn new() -> Self {
        Self::with_identity(Uuid::now_v7(), Utc::now())
    }

    /// Start a document with a fixed identity.
    pub fn with_identity(uuid: Uuid, created_at: DateTime<Utc>) -> Self {
        Self {
            draft: Vcon::draft(uuid, created_at),
            custom_roles: BTreeSet::new(),
        }
    }

    pub fn uuid(&self) -> Uuid {
        self.draft.uuid()
    }

    pub fn party_count(&self) -> usize {
        self.draft.parties().len()
    }

    pub fn dialog_count(&self) -> usize {
        self.draft.dialog().len()
    }

    // -----------------------------------------------------------------------
    // Subject / metadata
    // -----------------------------------------------------------------------

    pub fn set_subject(&mut self, text: &str) -> Result<()> {
        let text = text.trim();
        if text.is_empty() {
            return Err(Ietf2VconError::validation("subject is empty"));
        }
        self.draft.set_subject(text.to_string());
        Ok(())
    }

    /// Set the subject from the session and attach a `meeting_metadata` record.
    pub fn set_meeting_metadata(&mut self, meeting: &Meeting, session: &Session) -> Result<()> {
        if session.group_acronym.trim().is_empty() {
            return Err(Ietf2VconError::validation("session has no group acronym"));
        }
        let subject = format!(
            "IETF {} - {} Working Group Session",
            meeting.number,
            session.group_acronym.to_uppercase()
        );
        let body = json!({
            "ietf_meeting_number": meeting.number,
            "location": meeting.location(),
            "working_group": session.group_acronym,
            "session_id": session.session_id,
            "session_name": session.name,
            "room": session.room,
            "start_time": session.start_time.map(|t| t.to_rfc3339()),
            "duration_seconds": session.duration_seconds,
        });

        self.draft.set_subject(subject);
        self.draft.push_attachment(Attachment {
            kind: "meeting_metadata".into(),
            url: None,
            body: Some(body),
            encoding: Some(Encoding::None),
            mimetype: None,
            filename: None,
            meta: None,
        });
        Ok(())
    }

    // -----------------------------------------------------------------------
    // Parties
    // -----------------------------------------------------------------------

    /// Opt in to a role outside the built-in set.
    pub fn allow_role(&mut self, role: &str) -> Result<()> {
        let role = role.trim().to_ascii_lowercase();
        if role.is_empty() {
            return Err(Ietf2VconError::validation("role is empty"));
        }
        self.custom_roles.insert(role);
        Ok(())
    }

    /// Append a party and return its index.
    pub fn add_party(&mut self, name: &str, role: &str, contact: Option<&str>) -> Result<usize> {
        self.push_party(name, role, contact, None)
    }

    /// Append a person, keeping their affiliation in `meta`.
    ///
    /// The person's own role wins over `default_role` when present.
    pub fn add_person(&mut self, person: &Person, default_role: &str) -> Result<usize> {
        let role = person.role.as_deref().unwrap_or(default_role);
        let meta = person
            .affiliation
            .as_ref()
            .map(|a| json!({ "affiliation": a }));
        self.push_party(&person.name, role, person.email.as_deref(), meta)
    }

    fn push_party(
        &mut self,
        name: &str,
        role: &str,
        contact: Option<&str>,
        meta: Option<Value>,
    ) -> Result<usize> {
        let name = name.trim();
        if name.is_empty() {
            return Err(Ietf2VconError::validation("party name is empty"));
        }
        let role = self.resolve_role(role)?;
        if self
            .draft
            .parties()
            .iter()
            .any(|p| p.name == name && p.role == role)
        {
            return Err(Ietf2VconError::validation(format!(
                "party '{name}' with role {role} already exists"
            )));
        }

        let mailto = contact
            .map(|c| c.trim().trim_start_matches("mailto:").to_string())
            .filter(|c| !c.is_empty());

        let index = self.draft.push_party(Party {
            name: name.to_string(),
            mailto,
            role,
            meta,
        });
        debug!(index, name, "added party");
        Ok(index)
    }

    fn resolve_role(&self, role: &str) -> Result<PartyRole> {
        if let Some(known) = PartyRole::known(role) {
            return Ok(known);
        }
        let normalized = role.trim().to_ascii_lowercase();
        if self.custom_roles.contains(&normalized) {
            Ok(PartyRole::Custom(normalized))
        } else {
            Err(Ietf2VconError::validation(format!(
                "unrecognized party role '{}' (call allow_role first)",
                role.trim()
            )))
        }
    }

    // -----------------------------------------------------------------------
    // Dialog
    // -----------------------------------------------------------------------

    /// Append a dialog entry and return a handle to it.
    pub fn add_dialog(&mut self, spec: DialogSpec) -> Result<DialogRef> {
        if spec.payload.is_empty() {
            return Err(Ietf2VconError::validation("dialog payload is empty"));
        }
        if spec.mimetype.trim().is_empty() {
            return Err(Ietf2VconError::validation("dialog mimetype is empty"));
        }
        if let Some(d) = spec.duration {
            if !d.is_finite() || d < 0.0 {
                return Err(Ietf2VconError::validation(format!(
                    "dialog duration {d} must be a non-negative number"
                )));
            }
        }
        let party_count = self.party_count();
        let parties = match spec.parties {
            Some(parties) => {
                if let Some(bad) = parties.iter().find(|p| **p >= party_count) {
                    return Err(Ietf2VconError::validation(format!(
                        "dialog party {bad} out of range ({party_count} parties)"
                    )));
                }
                parties
            }
            None => (0..party_count).collect(),
        };

        let start = spec.start.unwrap_or(self.draft.created_at());
        let alg = spec.signature.as_ref().map(|_| "SHA-256".to_string());
        let (url, body, encoding) = spec.payload.into_fields();
        let index = self.draft.push_dialog(Dialog {
            kind: spec.kind,
            start,
            parties,
            duration: spec.duration,
            mimetype: spec.mimetype,
            filename: spec.filename,
            url,
            body,
            encoding,
            alg,
            signature: spec.signature,
            meta: spec.meta,
        });
        debug!(index, kind = ?spec.kind, "added dialog");

        Ok(DialogRef {
            document: self.draft.uuid(),
            index,
        })
    }

    /// Handle for an existing dialog position.
    pub fn dialog_ref(&self, index: usize) -> Result<DialogRef> {
        let dialog_count = self.dialog_count();
        if index >= dialog_count {
            return Err(Ietf2VconError::DanglingReference {
                index,
                dialog_count,
            });
        }
        Ok(DialogRef {
            document: self.draft.uuid(),
            index,
        })
    }

    /// Chat log as a plain-text `text` dialog entry, one line per message.
    pub fn add_chat_dialog(&mut self, messages: &[ChatMessage]) -> Result<DialogRef> {
        let first = messages
            .first()
            .ok_or_else(|| Ietf2VconError::validation("chat log has no messages"))?;
        let text = messages
            .iter()
            .map(ChatMessage::to_log_line)
            .collect::<Vec<_>>()
            .join("\n");

        let spec = DialogSpec::new(DialogType::Text, Payload::text(text), "text/plain")
            .with_start(first.timestamp)
            .with_meta(chat_meta(messages));
        self.add_dialog(spec)
    }

    // -----------------------------------------------------------------------
    // Attachments
    // -----------------------------------------------------------------------

    /// Append an attachment and return its index.
    pub fn add_attachment(&mut self, spec: AttachmentSpec) -> Result<usize> {
        let kind = spec.kind.trim();
        if kind.is_empty() {
            return Err(Ietf2VconError::validation("attachment type is empty"));
        }
        if spec.payload.is_empty() {
            return Err(Ietf2VconError::validation(format!(
                "{kind} attachment payload is empty"
            )));
        }
        let kind = kind.to_string();
        let (url, body, encoding) = spec.payload.into_fields();
        Ok(self.draft.push_attachment(Attachment {
            kind,
            url,
            body,
            encoding,
            mimetype: spec.mimetype,
            filename: spec.filename,
            meta: spec.meta,
        }))
    }

    /// A meeting material as a URL attachment tagged with its type.
    pub fn add_material(&mut self, material: &Material) -> Result<usize> {
        let spec = AttachmentSpec {
            kind: material.kind.clone(),
            payload: Payload::url(material.url.clone()),
            mimetype: material.mimetype.clone(),
            filename: material.filename.clone(),
            meta: Some(json!({
                "title": material.title,
                "order": material.order,
            })),
        };
        self.add_attachment(spec)
    }

    /// A meeting material with its content embedded as base64url. The SHA-256
    /// of the raw bytes is kept in `meta` next to the source URL.
    pub fn add_material_inline(&mut self, material: &Material, content: &[u8]) -> Result<usize> {
        let spec = AttachmentSpec {
            kind: material.kind.clone(),
            payload: Payload::Inline {
                body: Value::String(URL_SAFE_NO_PAD.encode(content)),
                encoding: Encoding::Base64url,
            },
            mimetype: material.mimetype.clone(),
            filename: material.filename.clone(),
            meta: Some(json!({
                "title": material.title,
                "order": material.order,
                "source_url": material.url,
                "alg": "SHA-256",
                "signature": sha256_hex(content),
            })),
        };
        self.add_attachment(spec)
    }

    /// Record where the document came from.
    pub fn add_ingress_info(
        &mut self,
        meeting: u32,
        group: &str,
        session_index: usize,
    ) -> Result<usize> {
        let body = json!({
            "source": "ietf2vcon",
            "converter_version": env!("CARGO_PKG_VERSION"),
            "ietf_meeting": meeting,
            "working_group": group,
            "session_index": session_index,
        });
        self.add_attachment(AttachmentSpec::new("ingress_info", Payload::json(body)))
    }

    pub fn add_lawful_basis(&mut self, basis: &LawfulBasis) -> Result<usize> {
        if basis.lawful_basis.trim().is_empty() {
            return Err(Ietf2VconError::validation("lawful basis is empty"));
        }
        let body = serde_json::to_value(basis)
            .map_err(|e| Ietf2VconError::validation(format!("lawful basis: {e}")))?;
        self.add_attachment(
            AttachmentSpec::new("lawful_basis", Payload::json(body))
                .with_meta(json!({ "spec": LAWFUL_BASIS_SPEC })),
        )
    }

    /// The IETF Note Well as the lawful basis. Not deduplicated.
    pub fn add_ietf_note_well(&mut self) -> Result<usize> {
        self.add_lawful_basis(&LawfulBasis::ietf_note_well())
    }

    /// Chat log as a `chat_log` attachment with a JSON body.
    pub fn add_chat_attachment(&mut self, messages: &[ChatMessage]) -> Result<usize> {
        if messages.is_empty() {
            return Err(Ietf2VconError::validation("chat log has no messages"));
        }
        let body = serde_json::to_value(messages)
            .map_err(|e| Ietf2VconError::validation(format!("chat log: {e}")))?;
        let mut spec =
            AttachmentSpec::new("chat_log", Payload::json(body)).with_meta(chat_meta(messages));
        spec.mimetype = Some("application/json".into());
        self.add_attachment(spec)
    }

    // -----------------------------------------------------------------------
    // Analysis
    // -----------------------------------------------------------------------

    /// Append an analysis entry bound to `dialog`.
    pub fn add_analysis(
        &mut self,
        kind: &str,
        dialog: DialogRef,
        vendor: &str,
        spec: Option<&str>,
        body: Value,
    ) -> Result<usize> {
        let dialog_count = self.dialog_count();
        if dialog.document != self.draft.uuid() || dialog.index >= dialog_count {
            return Err(Ietf2VconError::DanglingReference {
                index: dialog.index,
                dialog_count,
            });
        }
        if kind.trim().is_empty() {
            return Err(Ietf2VconError::validation("analysis type is empty"));
        }
        if vendor.trim().is_empty() {
            return Err(Ietf2VconError::validation("analysis vendor is empty"));
        }

        let index = self.draft.push_analysis(Analysis {
            kind: kind.trim().to_string(),
            dialog: dialog.index,
            vendor: vendor.trim().to_string(),
            spec: spec.map(String::from),
            body,
            encoding: Some(Encoding::None),
        });
        debug!(index, dialog = dialog.index, kind, "added analysis");
        Ok(index)
    }

    /// One `wtf_transcription` analysis entry; vendor is the transcript provider.
    pub fn add_transcript(&mut self, dialog: DialogRef, transcript: &Transcript) -> Result<usize> {
        let party_count = self.party_count();
        if let Some(seg) = transcript
            .segments()
            .iter()
            .find(|s| s.speaker.is_some_and(|p| p as usize >= party_count))
        {
            return Err(Ietf2VconError::validation(format!(
                "segment {} speaker out of range ({party_count} parties)",
                seg.id
            )));
        }
        self.add_analysis(
            WTF_ANALYSIS_TYPE,
            dialog,
            transcript.provider(),
            Some(WTF_SPEC),
            wtf_body(transcript),
        )
    }

    // -----------------------------------------------------------------------
    // Finalize
    // -----------------------------------------------------------------------

    /// Validate the whole document, stamp `updated_at`, and freeze it.
    pub fn build(mut self) -> Result<Vcon> {
        let violations = self.draft.validate();
        if !violations.is_empty() {
            return Err(Ietf2VconError::IncompleteDocument { violations });
        }
        self.draft.stamp(Utc::now());
        Ok(self.draft)
    }
}

fn chat_meta(messages: &[ChatMessage]) -> Value {
    json!({
        "source": "zulip",
        "stream": messages.first().and_then(|m| m.stream.clone()),
        "message_count": messages.len(),
    })
}

fn sha256_hex(bytes: &[u8]) -> String {
    let mut hasher = Sha256::new();
    hasher.update(bytes);
    format!("{:x}", hasher.finalize())
}

#[cfg(test)]
mod tests {
    use super::*;
    use crate::segment::Segment;
    use chrono::TimeZone;

    fn snapshot(b: &VconBuilder) -> String {
        serde_json::to_string(&b.draft).unwrap()
    }

    fn with_chair() -> VconBuilder {
        let mut b = VconBuilder::new();
        b.add_party("VCON Chairs", "chair", None).unwrap();
        b
    }

    fn video(b: &mut VconBuilder) -> DialogRef {
        b.add_dialog(DialogSpec::url(
            DialogType::Video,
            "https://www.youtube.com/watch?v=abc123def45",
            "video/mp4",
        ))
        .unwrap()
    }

    fn transcript(provider: &str) -> Transcript {
        Transcript::new(
            provider,
            vec![
                Segment::new(0, 0.0, 2.0, "good morning"),
                Segment::new(1, 2.0, 4.5, "agenda bash"),
            ],
        )
        .unwrap()
    }

    #[test]
    fn failed_calls_leave_draft_unchanged() {
        let mut b = with_chair();
        video(&mut b);
        let before = snapshot(&b);

        assert!(b.set_subject("   ").is_err());
        assert!(b.add_party("", "chair", None).is_err());
        assert!(b.add_party("Alice", "wizard", None).is_err());
        assert!(b.add_party("VCON Chairs", "chair", None).is_err());
        assert!(
            b.add_dialog(DialogSpec::url(DialogType::Video, "", "video/mp4"))
                .is_err()
        );
        assert!(
            b.add_dialog(DialogSpec::url(DialogType::Video, "https://x", "   "))
                .is_err()
        );
        assert!(
            b.add_dialog(
                DialogSpec::url(DialogType::Video, "https://x", "video/mp4").with_duration(-1.0)
            )
            .is_err()
        );
        assert!(
            b.add_dialog(
                DialogSpec::url(DialogType::Video, "https://x", "video/mp4").with_parties(vec![3])
            )
            .is_err()
        );
        assert!(
            b.add_attachment(AttachmentSpec::new("slides", Payload::url("")))
                .is_err()
        );
        assert!(
            b.add_attachment(AttachmentSpec::new(" ", Payload::url("https://x")))
                .is_err()
        );
        assert!(b.add_chat_dialog(&[]).is_err());
        assert!(b.add_chat_attachment(&[]).is_err());

        assert_eq!(before, snapshot(&b));
    }

    #[test]
    fn same_name_different_role_is_allowed() {
        let mut b = VconBuilder::new();
        assert_eq!(b.add_party("Alice", "chair", Some("mailto:alice@example.com")).unwrap(), 0);
        assert_eq!(b.add_party("Alice", "presenter", None).unwrap(), 1);
        assert_eq!(b.draft.parties()[0].mailto.as_deref(), Some("alice@example.com"));
        // Alias resolves to the same identity.
        b.add_party("Bob", "note-taker", None).unwrap();
        assert!(b.add_party("Bob", "scribe", None).is_err());
    }

    #[test]
    fn custom_role_requires_opt_in() {
        let mut b = VconBuilder::new();
        assert!(b.add_party("Carol", "author", None).is_err());
        b.allow_role("Author").unwrap();
        b.add_party("Carol", "author", None).unwrap();
        assert_eq!(b.draft.parties()[0].role, PartyRole::Custom("author".into()));
    }

    #[test]
    fn dialog_indices_are_stable_and_parties_default_to_all() {
        let mut b = with_chair();
        b.add_party("IETF Attendees", "attendee", None).unwrap();
        let first = video(&mut b);
        let second = b
            .add_dialog(
                DialogSpec::url(DialogType::Video, "https://meetings.conf.meetecho.com/ietf121/?group=vcon", "text/html")
                    .with_parties(vec![0]),
            )
            .unwrap();

        assert_eq!(first.index(), 0);
        assert_eq!(second.index(), 1);
        assert_eq!(b.draft.dialog()[0].parties, vec![0, 1]);
        assert_eq!(b.draft.dialog()[1].parties, vec![0]);
    }

    #[test]
    fn dangling_references_are_rejected() {
        let mut b = with_chair();
        for n in 0..3 {
            assert!(matches!(
                b.dialog_ref(n),
                Err(Ietf2VconError::DanglingReference { index, dialog_count: 0 }) if index == n
            ));
        }
        let handle = video(&mut b);
        assert!(b.dialog_ref(0).is_ok());
        assert!(matches!(
            b.dialog_ref(1),
            Err(Ietf2VconError::DanglingReference { index: 1, dialog_count: 1 })
        ));

        let mut other = with_chair();
        let before = snapshot(&other);
        let err = other
            .add_analysis("summary", handle, "test", None, json!({"text": "x"}))
            .unwrap_err();
        assert!(matches!(err, Ietf2VconError::DanglingReference { .. }));
        assert_eq!(before, snapshot(&other));
    }

    #[test]
    fn transcript_becomes_wtf_analysis() {
        let mut b = with_chair();
        let dialog = video(&mut b);
        b.add_transcript(dialog, &transcript("youtube")).unwrap();

        let vcon = b.build().unwrap();
        let analysis = &vcon.analysis()[0];
        assert_eq!(analysis.kind, "wtf_transcription");
        assert_eq!(analysis.vendor, "youtube");
        assert_eq!(analysis.dialog, 0);
        assert_eq!(analysis.spec.as_deref(), Some(WTF_SPEC));
        assert_eq!(analysis.body["transcript"]["text"], "good morning agenda bash");
    }

    #[test]
    fn transcript_speaker_must_be_a_party() {
        let mut b = with_chair();
        let dialog = video(&mut b);
        let mut seg = Segment::new(0, 0.0, 1.0, "hi");
        seg.speaker = Some(5);
        let t = Transcript::new("whisper", vec![seg]).unwrap();
        assert!(b.add_transcript(dialog, &t).is_err());
    }

    #[test]
    fn note_well_shape() {
        let mut b = with_chair();
        b.add_ietf_note_well().unwrap();
        let vcon = b.build().unwrap();

        let lawful: Vec<_> = vcon.attachments_of_type("lawful_basis").collect();
        assert_eq!(lawful.len(), 1);
        let body = lawful[0].body.as_ref().unwrap();
        assert_eq!(body["lawful_basis"], "legitimate_interests");
        assert_eq!(body["terms_of_service"], NOTE_WELL_URL);
        let grants = body["purpose_grants"].as_array().unwrap();
        for purpose in ["recording", "transcription"] {
            assert!(
                grants
                    .iter()
                    .any(|g| g["purpose"] == purpose && g["status"] == "granted")
            );
        }
        assert_eq!(lawful[0].meta.as_ref().unwrap()["spec"], LAWFUL_BASIS_SPEC);
    }

    #[test]
    fn note_well_is_not_deduplicated() {
        let mut b = with_chair();
        b.add_ietf_note_well().unwrap();
        b.add_ietf_note_well().unwrap();
        assert_eq!(b.build().unwrap().attachments_of_type("lawful_basis").count(), 2);
    }

    #[test]
    fn empty_builder_reports_every_violation() {
        let b = VconBuilder::with_identity(Uuid::nil(), Utc::now());
        match b.build() {
            Err(Ietf2VconError::IncompleteDocument { violations }) => {
                assert!(violations.iter().any(|v| v.contains("no parties")));
                assert!(violations.iter().any(|v| v.contains("uuid")));
            }
            other => panic!("expected IncompleteDocument, got {other:?}"),
        }
    }

    #[test]
    fn build_stamps_updated_at() {
        let vcon = with_chair().build().unwrap();
        assert!(vcon.updated_at().unwrap() >= vcon.created_at());
        assert!(vcon.validate().is_empty());
    }

    #[test]
    fn inline_media_is_signed() {
        let mut b = with_chair();
        let bytes = b"\x00\x01fake-mp4\xff";
        b.add_dialog(
            DialogSpec::inline_media(DialogType::Video, bytes, "video/mp4").with_filename("s.mp4"),
        )
        .unwrap();
        let dialog = &b.draft.dialog()[0];
        assert_eq!(dialog.alg.as_deref(), Some("SHA-256"));
        assert_eq!(dialog.signature.as_deref(), Some(sha256_hex(bytes).as_str()));
        assert_eq!(dialog.encoding, Some(Encoding::Base64url));
        assert!(dialog.url.is_none());
        let body = dialog.body.as_ref().and_then(Value::as_str).unwrap();
        assert_eq!(URL_SAFE_NO_PAD.decode(body).unwrap(), bytes);
    }

    #[test]
    fn meeting_metadata_sets_subject() {
        let mut b = with_chair();
        let mut meeting = Meeting::numbered(121);
        meeting.city = Some("Dublin".into());
        let session = Session::minimal(121, "vcon");
        b.set_meeting_metadata(&meeting, &session).unwrap();
        let vcon = b.build().unwrap();
        assert_eq!(vcon.subject(), Some("IETF 121 - VCON Working Group Session"));
        let meta = vcon.attachments_of_type("meeting_metadata").next().unwrap();
        assert_eq!(meta.body.as_ref().unwrap()["location"], "Dublin");
        assert_eq!(meta.body.as_ref().unwrap()["session_id"], "vcon-121");
    }

    #[test]
    fn chat_dialog_and_attachment() {
        let mut b = with_chair();
        let messages = vec![
            ChatMessage {
                timestamp: Utc.with_ymd_and_hms(2024, 11, 4, 9, 31, 5).unwrap(),
                sender: "Alice".into(),
                sender_email: None,
                content: "+1".into(),
                topic: None,
                stream: Some("vcon".into()),
            },
            ChatMessage {
                timestamp: Utc.with_ymd_and_hms(2024, 11, 4, 9, 32, 0).unwrap(),
                sender: "Bob".into(),
                sender_email: None,
                content: "same".into(),
                topic: None,
                stream: Some("vcon".into()),
            },
        ];
        let chat = b.add_chat_dialog(&messages).unwrap();
        b.add_chat_attachment(&messages).unwrap();

        let vcon = b.build().unwrap();
        let dialog = &vcon.dialog()[chat.index()];
        assert_eq!(dialog.kind, DialogType::Text);
        assert_eq!(dialog.start, messages[0].timestamp);
        assert_eq!(
            dialog.body.as_ref().and_then(Value::as_str),
            Some("[2024-11-04 09:31:05] Alice: +1\n[2024-11-04 09:32:00] Bob: same")
        );
        let log = vcon.attachments_of_type("chat_log").next().unwrap();
        assert_eq!(log.meta.as_ref().unwrap()["message_count"], 2);
    }

    #[test]
    fn material_attachment() {
        let mut b = with_chair();
        let material = Material {
            kind: "slides".into(),
            title: "Chairs' slides".into(),
            url: "https://datatracker.ietf.org/meeting/121/materials/slides-121-vcon-chairs-00".into(),
            filename: None,
            mimetype: Some("application/pdf".into()),
            order: Some(1),
        };
        b.add_material(&material).unwrap();
        let vcon = b.build().unwrap();
        let att = &vcon.attachments()[0];
        assert_eq!(att.kind, "slides");
        assert_eq!(att.url.as_deref(), Some(material.url.as_str()));
        assert_eq!(att.meta.as_ref().unwrap()["title"], "Chairs' slides");
    }

    #[test]
    fn inline_material_carries_content_and_digest() {
        let mut b = with_chair();
        let material = Material {
            kind: "slides".into(),
            title: "Chairs' slides".into(),
            url: "https://datatracker.ietf.org/meeting/121/materials/slides-121-vcon-chairs-00".into(),
            filename: Some("slides-121-vcon-chairs-00.pdf".into()),
            mimetype: Some("application/pdf".into()),
            order: Some(1),
        };
        let pdf = b"%PDF-1.7\n\xe2\xe3\xcf\xd3";
        b.add_material_inline(&material, pdf).unwrap();
        assert!(b.add_material_inline(&material, b"").is_err());

        let vcon = b.build().unwrap();
        let att = &vcon.attachments()[0];
        assert!(att.url.is_none());
        assert_eq!(att.encoding, Some(Encoding::Base64url));
        assert_eq!(att.filename.as_deref(), Some("slides-121-vcon-chairs-00.pdf"));
        let body = att.body.as_ref().and_then(Value::as_str).unwrap();
        assert_eq!(URL_SAFE_NO_PAD.decode(body).unwrap(), pdf);

        let meta = att.meta.as_ref().unwrap();
        assert_eq!(meta["alg"], "SHA-256");
        assert_eq!(meta["signature"], sha256_hex(pdf));
        assert_eq!(meta["source_url"], material.url);
        assert!(vcon.validate().is_empty());
    }

    #[test]
    fn serialize_parse_round_trip() {
        let mut b = with_chair();
        b.set_subject("IETF 121 - VCON Working Group Session").unwrap();
        b.add_ietf_note_well().unwrap();
        let d0 = video(&mut b);
        b.add_dialog(DialogSpec::url(DialogType::Video, "https://meetecho", "text/html"))
            .unwrap();
        b.add_transcript(d0, &transcript("whisper")).unwrap();
        b.add_analysis("summary", b.dialog_ref(1).unwrap(), "test", None, json!("short"))
            .unwrap();
        let vcon = b.build().unwrap();

        let json = vcon.to_json_pretty().unwrap();
        let parsed = Vcon::from_json(&json).unwrap();
        assert_eq!(parsed, vcon);
        assert_eq!(parsed.analysis()[1].dialog, 1);
    }
}
