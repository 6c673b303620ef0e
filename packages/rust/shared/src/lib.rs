//! Shared types, error model, and configuration for ietf2vcon.
//!
//! This crate is the foundation depended on by all other ietf2vcon crates.
//! It provides:
//! - [`Ietf2VconError`], the unified error type
//! - IETF domain types ([`Meeting`], [`Session`], [`Material`], [`Person`], [`ChatMessage`])
//! - The capability outcome [`Fetch`] and source preferences
//! - Configuration ([`AppConfig`], config loading)

pub mod config;
pub mod error;
pub mod preference;
pub mod types;

// Re-export public API at crate root for ergonomic imports.
pub use config::{
    AppConfig, DatatrackerConfig, DefaultsConfig, TimeoutsConfig, ToolsConfig, ZulipConfig,
    ZulipCredentials, config_dir, config_file_path, init_config, load_config, load_config_from,
};
pub use error::{Ietf2VconError, Result};
pub use preference::{BothVideoMode, TranscriptPreference, VideoPreference, WhisperModel};
pub use types::{ChatMessage, Fetch, Material, Meeting, Person, Session, TimeWindow};
