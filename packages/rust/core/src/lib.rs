//! Conversion of a single IETF working-group session into a vCon.
//!
//! [`selector`] decides which collaborators to ask for each capability,
//! [`orchestrator`] runs the stages and assembles the document, and
//! [`persist`] writes the result to disk.

pub mod orchestrator;
pub mod persist;
pub mod selector;

#[cfg(test)]
mod testing;

pub use orchestrator::{
    CapabilityStatus, Capabilities, ConversionOptions, ConversionReport, ConversionRequest,
    Converter, ProgressReporter, SilentProgress, Stage,
};
pub use persist::{SubtitleFormats, export_subtitles, load_vcon, save_vcon};
pub use selector::{Collaborators, SourcePolicy, SourceSelector};
