//! vCon document model and builder.
//!
//! [`VconBuilder`] is the only way to create a new [`Vcon`]: every mutation is
//! checked before it is applied, and [`VconBuilder::build`] validates the
//! whole document once more before freezing it.

pub mod builder;
pub mod document;
pub mod segment;
pub mod subtitles;
pub mod wtf;

pub use builder::{
    AttachmentSpec, DialogRef, DialogSpec, LAWFUL_BASIS_SPEC, LawfulBasis, NOTE_WELL_URL,
    PurposeGrant, VconBuilder,
};
pub use document::{
    Analysis, Attachment, Dialog, DialogType, Encoding, Party, PartyRole, Payload, VCON_VERSION,
    Vcon,
};
pub use segment::{OVERLAP_TOLERANCE_SECS, Segment, Transcript};
pub use subtitles::{to_srt, to_webvtt};
pub use wtf::{WTF_ANALYSIS_TYPE, WTF_SPEC, wtf_body};
