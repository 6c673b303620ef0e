//! Application configuration for ietf2vcon.
//!
//! User config lives at `~/.ietf2vcon/ietf2vcon.toml`.
//! CLI flags override config file values, which override defaults.

use std::path::{Path, PathBuf};
use std::time::Duration;

use serde::{Deserialize, Serialize};

use crate::error::{Ietf2VconError, Result};
use crate::preference::{BothVideoMode, TranscriptPreference, VideoPreference, WhisperModel};

/// Default configuration file name.
const CONFIG_FILE_NAME: &str = "ietf2vcon.toml";

/// Default config directory name under the user's home.
const CONFIG_DIR_NAME: &str = ".ietf2vcon";

// ---------------------------------------------------------------------------
// Config structs (matching ietf2vcon.toml schema)
// ---------------------------------------------------------------------------

/// Top-level application config, deserialized from TOML.
#[derive(Debug, Clone, Default, Serialize, Deserialize)]
pub struct AppConfig {
    /// Global defaults for `convert`.
    #[serde(default)]
    pub defaults: DefaultsConfig,

    /// Per-fetch time bounds.
    #[serde(default)]
    pub timeouts: TimeoutsConfig,

    /// Datatracker API settings.
    #[serde(default)]
    pub datatracker: DatatrackerConfig,

    /// Zulip chat settings.
    #[serde(default)]
    pub zulip: ZulipConfig,

    /// External programs.
    #[serde(default)]
    pub tools: ToolsConfig,
}

/// `[defaults]` section.
#[derive(Debug, Clone, Serialize, Deserialize)]
pub struct DefaultsConfig {
    /// Directory for vCon files, downloads, and subtitle exports.
    #[serde(default = "default_output_dir")]
    pub output_dir: String,

    #[serde(default)]
    pub video_source: VideoPreference,

    #[serde(default)]
    pub both_video_mode: BothVideoMode,

    #[serde(default)]
    pub transcript_source: TranscriptPreference,

    #[serde(default)]
    pub whisper_model: WhisperModel,

    /// Fetch independent capabilities concurrently.
    #[serde(default)]
    pub concurrent: bool,
}

impl Default for DefaultsConfig {
    fn default() -> Self {
        Self {
            output_dir: default_output_dir(),
            video_source: VideoPreference::default(),
            both_video_mode: BothVideoMode::default(),
            transcript_source: TranscriptPreference::default(),
            whisper_model: WhisperModel::default(),
            concurrent: false,
        }
    }
}

fn default_output_dir() -> String {
    "./output".into()
}

/// `[timeouts]` section. All values in seconds.
#[derive(Debug, Clone, Serialize, Deserialize)]
pub struct TimeoutsConfig {
    /// Bound for metadata, materials, captions, and chat fetches.
    #[serde(default = "default_fetch_secs")]
    pub fetch_secs: u64,

    /// Bound for a media download.
    #[serde(default = "default_download_secs")]
    pub download_secs: u64,

    /// Bound for a Whisper run.
    #[serde(default = "default_transcribe_secs")]
    pub transcribe_secs: u64,
}

impl TimeoutsConfig {
    pub fn fetch(&self) -> Duration {
        Duration::from_secs(self.fetch_secs)
    }

    pub fn download(&self) -> Duration {
        Duration::from_secs(self.download_secs)
    }

    pub fn transcribe(&self) -> Duration {
        Duration::from_secs(self.transcribe_secs)
    }
}

impl Default for TimeoutsConfig {
    fn default() -> Self {
        Self {
            fetch_secs: default_fetch_secs(),
            download_secs: default_download_secs(),
            transcribe_secs: default_transcribe_secs(),
        }
    }
}

fn default_fetch_secs() -> u64 {
    120
}
fn default_download_secs() -> u64 {
    3600
}
fn default_transcribe_secs() -> u64 {
    3600
}

/// `[datatracker]` section.
#[derive(Debug, Clone, Serialize, Deserialize)]
pub struct DatatrackerConfig {
    #[serde(default = "default_datatracker_url")]
    pub base_url: String,
}

impl Default for DatatrackerConfig {
    fn default() -> Self {
        Self {
            base_url: default_datatracker_url(),
        }
    }
}

fn default_datatracker_url() -> String {
    "https://datatracker.ietf.org".into()
}

/// `[zulip]` section.
#[derive(Debug, Clone, Serialize, Deserialize)]
pub struct ZulipConfig {
    #[serde(default = "default_zulip_url")]
    pub base_url: String,

    /// Name of the env var holding the account email.
    #[serde(default = "default_zulip_email_env")]
    pub email_env: String,

    /// Name of the env var holding the API key (never store the key itself).
    #[serde(default = "default_zulip_key_env")]
    pub api_key_env: String,
}

impl Default for ZulipConfig {
    fn default() -> Self {
        Self {
            base_url: default_zulip_url(),
            email_env: default_zulip_email_env(),
            api_key_env: default_zulip_key_env(),
        }
    }
}

fn default_zulip_url() -> String {
    "https://zulip.ietf.org".into()
}
fn default_zulip_email_env() -> String {
    "ZULIP_EMAIL".into()
}
fn default_zulip_key_env() -> String {
    "ZULIP_API_KEY".into()
}

/// Resolved Zulip credentials. Only ever held in memory.
#[derive(Clone)]
pub struct ZulipCredentials {
    pub email: String,
    pub api_key: String,
}

impl std::fmt::Debug for ZulipCredentials {
    fn fmt(&self, f: &mut std::fmt::Formatter<'_>) -> std::fmt::Result {
        f.debug_struct("ZulipCredentials")
            .field("email", &self.email)
            .field("api_key", &"<redacted>")
            .finish()
    }
}

impl ZulipConfig {
    /// Read credentials from the configured env vars.
    ///
    /// Explicit values (CLI flags) win over the environment. Returns `None`
    /// unless both email and key are present and non-empty.
    pub fn credentials(
        &self,
        email: Option<&str>,
        api_key: Option<&str>,
    ) -> Option<ZulipCredentials> {
        let from_env = |var: &str| std::env::var(var).ok().filter(|v| !v.is_empty());
        let email = email
            .map(String::from)
            .filter(|v| !v.is_empty())
            .or_else(|| from_env(&self.email_env))?;
        let api_key = api_key
            .map(String::from)
            .filter(|v| !v.is_empty())
            .or_else(|| from_env(&self.api_key_env))?;
        Some(ZulipCredentials { email, api_key })
    }
}

/// `[tools]` section.
#[derive(Debug, Clone, Serialize, Deserialize)]
pub struct ToolsConfig {
    #[serde(default = "default_yt_dlp")]
    pub yt_dlp: String,

    #[serde(default = "default_whisper")]
    pub whisper: String,
}

impl Default for ToolsConfig {
    fn default() -> Self {
        Self {
            yt_dlp: default_yt_dlp(),
            whisper: default_whisper(),
        }
    }
}

fn default_yt_dlp() -> String {
    "yt-dlp".into()
}
fn default_whisper() -> String {
    "whisper".into()
}

// ---------------------------------------------------------------------------
// Config loading
// ---------------------------------------------------------------------------

/// Get the path to the config directory (`~/.ietf2vcon/`).
pub fn config_dir() -> Result<PathBuf> {
    let home = dirs::home_dir()
        .ok_or_else(|| Ietf2VconError::config("could not determine home directory"))?;
    Ok(home.join(CONFIG_DIR_NAME))
}

/// Get the path to the config file (`~/.ietf2vcon/ietf2vcon.toml`).
pub fn config_file_path() -> Result<PathBuf> {
    Ok(config_dir()?.join(CONFIG_FILE_NAME))
}

/// Load the application config from disk. Returns defaults if the file does not exist.
pub fn load_config() -> Result<AppConfig> {
    let path = config_file_path()?;

    if !path.exists() {
        tracing::debug!(?path, "config file not found, using defaults");
        return Ok(AppConfig::default());
    }

    load_config_from(&path)
}

/// Load the application config from a specific file path.
pub fn load_config_from(path: &Path) -> Result<AppConfig> {
    let content = std::fs::read_to_string(path).map_err(|e| Ietf2VconError::io(path, e))?;

    let config: AppConfig = toml::from_str(&content).map_err(|e| {
        Ietf2VconError::config(format!("failed to parse {}: {e}", path.display()))
    })?;

    url::Url::parse(&config.datatracker.base_url).map_err(|e| {
        Ietf2VconError::config(format!("invalid datatracker.base_url: {e}"))
    })?;
    url::Url::parse(&config.zulip.base_url)
        .map_err(|e| Ietf2VconError::config(format!("invalid zulip.base_url: {e}")))?;

    Ok(config)
}

/// Create the config directory and write a default config file.
/// Returns the path to the created file.
pub fn init_config() -> Result<PathBuf> {
    let dir = config_dir()?;
    std::fs::create_dir_all(&dir).map_err(|e| Ietf2VconError::io(&dir, e))?;

    let path = dir.join(CONFIG_FILE_NAME);
    let config = AppConfig::default();
    let content =
        toml::to_string_pretty(&config).map_err(|e| Ietf2VconError::config(e.to_string()))?;

    std::fs::write(&path, content).map_err(|e| Ietf2VconError::io(&path, e))?;
    tracing::info!(?path, "created default config file");

    Ok(path)
}
