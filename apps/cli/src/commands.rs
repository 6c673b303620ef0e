//! CLI command definitions, routing, and tracing setup.

use std::collections::BTreeMap;
use std::path::{Path, PathBuf};
use std::sync::Arc;

use clap::{Args, Parser, Subcommand};
use color_eyre::eyre::{Result, eyre};
use tokio::sync::Semaphore;
use tokio::task::JoinSet;
use tracing::{info, warn};

use ietf2vcon_core::persist::base_name;
use ietf2vcon_core::{
    Collaborators, ConversionOptions, ConversionReport, ConversionRequest, Converter,
    SilentProgress, SourcePolicy, SourceSelector, SubtitleFormats, export_subtitles, load_vcon,
    save_vcon,
};
use ietf2vcon_shared::{
    AppConfig, BothVideoMode, TranscriptPreference, VideoPreference, WhisperModel,
    ZulipCredentials, init_config, load_config, load_config_from,
};
use ietf2vcon_sources::{
    DatatrackerClient, MeetechoLocator, WhisperCli, YoutubeClient, ZulipClient,
};

use crate::progress::{CliProgress, batch_bar};

// ---------------------------------------------------------------------------
// CLI structure
// ---------------------------------------------------------------------------

/// IETF meeting sessions as vCon documents.
#[derive(Parser)]
#[command(
    name = "ietf2vcon",
    version,
    about = "Convert IETF working-group sessions into vCon documents.",
    long_about = None,
)]
pub(crate) struct Cli {
    /// Log format: text (default) or json.
    #[arg(long, default_value = "text", global = true)]
    pub log_format: LogFormat,

    /// Verbosity level (-v, -vv, -vvv).
    #[arg(short, long, action = clap::ArgAction::Count, global = true)]
    pub verbose: u8,

    /// Config file to use instead of ~/.ietf2vcon/ietf2vcon.toml.
    #[arg(long, global = true)]
    pub config: Option<PathBuf>,

    #[command(subcommand)]
    pub command: Command,
}

/// Log output format.
#[derive(Clone, Debug, clap::ValueEnum)]
pub(crate) enum LogFormat {
    Text,
    Json,
}

#[derive(Subcommand)]
pub(crate) enum Command {
    /// Convert one session of a working group.
    Convert(ConvertArgs),

    /// Convert every group's first session at a meeting.
    ConvertAll(ConvertAllArgs),

    /// List the sessions of a meeting, or of one group at it.
    ListSessions {
        #[arg(short, long)]
        meeting: u32,

        /// Show only this group, with schedule details.
        #[arg(short, long)]
        group: Option<String>,
    },

    /// List the materials of a group's sessions.
    ListMaterials {
        #[arg(short, long)]
        meeting: u32,

        #[arg(short, long)]
        group: String,
    },

    /// Summarize and check a vCon file.
    Info {
        vcon_file: PathBuf,
    },

    /// Configuration management.
    Config {
        #[command(subcommand)]
        action: ConfigAction,
    },
}

/// Source preferences shared by `convert` and `convert-all`. Unset flags fall
/// back to the config file.
#[derive(Args)]
pub(crate) struct SourceArgs {
    /// Video source: youtube, meetecho, or both.
    #[arg(long)]
    video_source: Option<VideoPreference>,

    /// With `--video-source both`: supplement or fallback.
    #[arg(long)]
    both_video_mode: Option<BothVideoMode>,

    /// Transcript source: auto, youtube, or whisper.
    #[arg(long)]
    transcript_source: Option<TranscriptPreference>,

    /// Whisper model size.
    #[arg(long)]
    whisper_model: Option<WhisperModel>,

    /// Run the independent fetch stages concurrently.
    #[arg(long)]
    concurrent: bool,

    /// Output directory for vCon files, downloads, and subtitles.
    #[arg(long)]
    output_dir: Option<PathBuf>,
}

#[derive(Args)]
pub(crate) struct ConvertArgs {
    /// IETF meeting number (e.g. 121).
    #[arg(short, long)]
    meeting: u32,

    /// Working group acronym (e.g. vcon).
    #[arg(short, long)]
    group: String,

    /// Session index when the group met more than once.
    #[arg(short, long, default_value_t = 0)]
    session: usize,

    /// Output file (defaults to <output-dir>/ietf<meeting>_<group>_<session>.vcon.json).
    #[arg(short, long)]
    output: Option<PathBuf>,

    #[command(flatten)]
    sources: SourceArgs,

    /// Download the video and embed it inline.
    #[arg(long)]
    download_video: bool,

    #[arg(long)]
    no_video: bool,

    #[arg(long)]
    no_materials: bool,

    /// Download materials and embed them inline.
    #[arg(long)]
    inline_materials: bool,

    #[arg(long)]
    no_transcript: bool,

    #[arg(long)]
    no_chat: bool,

    /// Attach chat as a chat_log attachment instead of a text dialog.
    #[arg(long)]
    chat_as_attachment: bool,

    /// Also write the transcript as SRT.
    #[arg(long)]
    export_srt: bool,

    /// Also write the transcript as WebVTT.
    #[arg(long)]
    export_webvtt: bool,

    /// Zulip account email (default: env var named in config).
    #[arg(long)]
    zulip_email: Option<String>,

    /// Zulip API key (default: env var named in config).
    #[arg(long)]
    zulip_api_key: Option<String>,
}

impl ConvertArgs {
    fn options(&self, concurrent: bool) -> ConversionOptions {
        ConversionOptions {
            include_video: !self.no_video,
            include_materials: !self.no_materials,
            include_transcript: !self.no_transcript,
            include_chat: !self.no_chat,
            chat_as_dialog: !self.chat_as_attachment,
            inline_materials: self.inline_materials,
            concurrent,
        }
    }
}

#[derive(Args)]
pub(crate) struct ConvertAllArgs {
    #[arg(short, long)]
    meeting: u32,

    /// Only these groups (repeatable or comma-separated).
    #[arg(long, value_delimiter = ',')]
    groups: Vec<String>,

    /// Conversions to run at once.
    #[arg(long, default_value_t = 1)]
    parallel: usize,

    #[command(flatten)]
    sources: SourceArgs,

    #[arg(long)]
    no_video: bool,

    #[arg(long)]
    no_transcript: bool,

    /// Include Zulip chat (credentials from the environment).
    #[arg(long)]
    chat: bool,
}

#[derive(Subcommand)]
pub(crate) enum ConfigAction {
    /// Initialize config file with defaults.
    Init,
    /// Show resolved configuration.
    Show,
}

// ---------------------------------------------------------------------------
// Tracing setup
// ---------------------------------------------------------------------------

/// Initialize tracing based on CLI flags.
pub(crate) fn init_tracing(cli: &Cli) {
    use tracing_subscriber::{EnvFilter, fmt};

    let filter = match cli.verbose {
        0 => "ietf2vcon=info",
        1 => "ietf2vcon=debug",
        _ => "ietf2vcon=trace",
    };

    let env_filter = EnvFilter::try_from_default_env().unwrap_or_else(|_| EnvFilter::new(filter));

    match cli.log_format {
        LogFormat::Text => {
            fmt()
                .with_env_filter(env_filter)
                .with_target(false)
                .with_writer(std::io::stderr)
                .init();
        }
        LogFormat::Json => {
            fmt()
                .json()
                .with_env_filter(env_filter)
                .with_writer(std::io::stderr)
                .init();
        }
    }
}

// ---------------------------------------------------------------------------
// Command dispatch
// ---------------------------------------------------------------------------

pub(crate) async fn run(cli: Cli) -> Result<()> {
    let config_path = cli.config.as_deref();
    match cli.command {
        Command::Convert(args) => cmd_convert(read_config(config_path)?, args).await,
        Command::ConvertAll(args) => cmd_convert_all(read_config(config_path)?, args).await,
        Command::ListSessions { meeting, group } => {
            cmd_list_sessions(&read_config(config_path)?, meeting, group.as_deref()).await
        }
        Command::ListMaterials { meeting, group } => {
            cmd_list_materials(&read_config(config_path)?, meeting, &group).await
        }
        Command::Info { vcon_file } => cmd_info(&vcon_file),
        Command::Config { action } => match action {
            ConfigAction::Init => cmd_config_init(),
            ConfigAction::Show => cmd_config_show(config_path),
        },
    }
}

fn read_config(path: Option<&Path>) -> Result<AppConfig> {
    Ok(match path {
        Some(p) => load_config_from(p)?,
        None => load_config()?,
    })
}

impl SourceArgs {
    /// Fold flags into `config`.
    fn apply(&self, config: &mut AppConfig) {
        let d = &mut config.defaults;
        if let Some(v) = self.video_source {
            d.video_source = v;
        }
        if let Some(v) = self.both_video_mode {
            d.both_video_mode = v;
        }
        if let Some(v) = self.transcript_source {
            d.transcript_source = v;
        }
        if let Some(v) = self.whisper_model {
            d.whisper_model = v;
        }
        if self.concurrent {
            d.concurrent = true;
        }
        if let Some(dir) = &self.output_dir {
            d.output_dir = dir.to_string_lossy().into_owned();
        }
    }
}

/// Wire the real collaborators from config.
fn collaborators(
    config: &AppConfig,
    output_dir: &Path,
    credentials: Option<ZulipCredentials>,
) -> Result<Collaborators> {
    let fetch = config.timeouts.fetch();
    let datatracker = Arc::new(DatatrackerClient::new(&config.datatracker.base_url, fetch)?);
    let youtube = Arc::new(YoutubeClient::new(
        config.tools.yt_dlp.clone(),
        output_dir.join("videos"),
    ));
    let zulip = ZulipClient::new(&config.zulip.base_url, credentials, fetch)?;
    if !zulip.has_credentials() {
        info!(
            email_env = %config.zulip.email_env,
            api_key_env = %config.zulip.api_key_env,
            "no Zulip credentials, chat will be unavailable"
        );
    }

    Ok(Collaborators {
        resolver: datatracker.clone(),
        youtube: Some(youtube.clone()),
        meetecho: Some(Arc::new(MeetechoLocator::default())),
        materials: Some(datatracker),
        captions: Some(youtube),
        speech: Some(Arc::new(WhisperCli::new(config.tools.whisper.clone()))),
        chat: Some(Arc::new(zulip)),
    })
}

// ---------------------------------------------------------------------------
// Command handlers
// ---------------------------------------------------------------------------

async fn cmd_convert(mut config: AppConfig, args: ConvertArgs) -> Result<()> {
    args.sources.apply(&mut config);
    let output_dir = PathBuf::from(&config.defaults.output_dir);

    let credentials = config
        .zulip
        .credentials(args.zulip_email.as_deref(), args.zulip_api_key.as_deref());
    let mut policy = SourcePolicy::from_config(&config);
    policy.video.download = args.download_video;

    let options = args.options(config.defaults.concurrent);
    let converter = Converter::new(
        SourceSelector::new(collaborators(&config, &output_dir, credentials)?, policy),
        options,
    );

    let request = ConversionRequest::new(args.meeting, &args.group).with_session_index(args.session);
    info!(
        meeting = request.meeting,
        group = %request.group,
        session = request.session_index,
        "converting session"
    );

    let report = converter.convert(&request, &CliProgress::new()).await?;
    let path = save_vcon(&report, args.output.as_deref(), &output_dir)?;

    let formats = SubtitleFormats {
        srt: args.export_srt,
        webvtt: args.export_webvtt,
    };
    let mut subtitles = Vec::new();
    if formats.any() {
        match &report.transcript {
            Some(transcript) => {
                subtitles = export_subtitles(transcript, &output_dir, &base_name(&report), formats)?;
            }
            None => warn!("no transcript, skipping subtitle export"),
        }
    }

    print_report(&report, &path, &subtitles);
    Ok(())
}

fn print_report(report: &ConversionReport, path: &Path, subtitles: &[PathBuf]) {
    println!();
    println!(
        "  IETF {} {} (session {})",
        report.meeting.number,
        report.group.to_uppercase(),
        report.session_id
    );
    for (name, status) in report.capabilities.iter() {
        let mark = if status.is_available() { "✓" } else { "–" };
        println!("  {mark} {name:<11} {status}");
    }
    if !report.warnings.is_empty() {
        println!();
        println!("  Warnings:");
        for w in &report.warnings {
            println!("    • {w}");
        }
    }
    println!();
    println!("  Output: {}", path.display());
    for s in subtitles {
        println!("          {}", s.display());
    }
    println!("  Time:   {:.1}s", report.elapsed.as_secs_f64());
    println!();
}

async fn cmd_convert_all(mut config: AppConfig, args: ConvertAllArgs) -> Result<()> {
    args.sources.apply(&mut config);
    let output_dir = PathBuf::from(&config.defaults.output_dir);

    let groups = if args.groups.is_empty() {
        let datatracker =
            DatatrackerClient::new(&config.datatracker.base_url, config.timeouts.fetch())?;
        let mut groups: Vec<String> = datatracker
            .meeting_sessions(args.meeting)
            .await?
            .into_iter()
            .map(|s| s.group_acronym.to_lowercase())
            .filter(|g| g != "unknown")
            .collect();
        groups.sort();
        groups.dedup();
        groups
    } else {
        args.groups.iter().map(|g| g.trim().to_lowercase()).collect()
    };
    if groups.is_empty() {
        return Err(eyre!("no sessions found for IETF {}", args.meeting));
    }
    info!(meeting = args.meeting, groups = groups.len(), parallel = args.parallel, "converting meeting");

    let credentials = if args.chat {
        config.zulip.credentials(None, None)
    } else {
        None
    };
    let options = ConversionOptions {
        include_video: !args.no_video,
        include_transcript: !args.no_transcript,
        include_chat: args.chat,
        concurrent: config.defaults.concurrent,
        ..ConversionOptions::default()
    };
    let converter = Converter::new(
        SourceSelector::new(
            collaborators(&config, &output_dir, credentials)?,
            SourcePolicy::from_config(&config),
        ),
        options,
    );

    let total = groups.len();
    let bar = batch_bar(total);
    let semaphore = Arc::new(Semaphore::new(args.parallel.max(1)));
    let mut tasks = JoinSet::new();
    for group in groups {
        let converter = converter.clone();
        let semaphore = Arc::clone(&semaphore);
        let output_dir = output_dir.clone();
        let meeting = args.meeting;
        tasks.spawn(async move {
            let _permit = semaphore.acquire_owned().await;
            let request = ConversionRequest::new(meeting, &group);
            let outcome = match converter.convert(&request, &SilentProgress).await {
                Ok(report) => save_vcon(&report, None, &output_dir),
                Err(e) => Err(e),
            };
            (group, outcome)
        });
    }

    let mut results = BTreeMap::new();
    while let Some(joined) = tasks.join_next().await {
        match joined {
            Ok((group, outcome)) => {
                bar.set_message(format!("converted {group}"));
                if let Err(e) = &outcome {
                    warn!(group = %group, error = %e, "conversion failed");
                }
                results.insert(group, outcome.map_err(|e| e.to_string()));
            }
            Err(e) => warn!(error = %e, "conversion task panicked"),
        }
        bar.inc(1);
    }
    bar.finish_and_clear();

    println!();
    println!("  IETF {} conversion results", args.meeting);
    let mut failed = 0;
    for (group, outcome) in &results {
        match outcome {
            Ok(path) => println!("  ✓ {group:<12} {}", path.display()),
            Err(e) => {
                failed += 1;
                println!("  ✗ {group:<12} {e}");
            }
        }
    }
    println!();
    let lost = total - results.len();
    println!("  {}/{total} successful", results.len() - failed);
    println!();

    if failed + lost > 0 {
        return Err(eyre!("{} of {total} conversions failed", failed + lost));
    }
    Ok(())
}

async fn cmd_list_sessions(config: &AppConfig, meeting: u32, group: Option<&str>) -> Result<()> {
    let datatracker = DatatrackerClient::new(&config.datatracker.base_url, config.timeouts.fetch())?;

    match group {
        Some(group) => {
            let sessions = datatracker.group_sessions(meeting, group).await?;
            if sessions.is_empty() {
                return Err(eyre!("no sessions for {group} at IETF {meeting}"));
            }
            println!("IETF {meeting} {} sessions:", group.to_uppercase());
            for (i, s) in sessions.iter().enumerate() {
                let start = s
                    .start_time
                    .map(|t| t.format("%Y-%m-%d %H:%M UTC").to_string())
                    .unwrap_or_else(|| "unscheduled".into());
                println!(
                    "  [{i}] {:<8} {start}  {}  {}",
                    s.session_id,
                    s.room.as_deref().unwrap_or("-"),
                    s.name.as_deref().unwrap_or(""),
                );
            }
        }
        None => {
            let sessions = datatracker.meeting_sessions(meeting).await?;
            let mut groups: BTreeMap<String, (usize, Option<String>)> = BTreeMap::new();
            for s in sessions {
                let entry = groups.entry(s.group_acronym.to_lowercase()).or_default();
                entry.0 += 1;
                if entry.1.is_none() {
                    entry.1 = s.name;
                }
            }
            println!("IETF {meeting}: {} groups", groups.len());
            for (acronym, (count, name)) in &groups {
                println!("  {acronym:<12} {count:>2}  {}", name.as_deref().unwrap_or(""));
            }
        }
    }
    Ok(())
}

async fn cmd_list_materials(config: &AppConfig, meeting: u32, group: &str) -> Result<()> {
    let datatracker = DatatrackerClient::new(&config.datatracker.base_url, config.timeouts.fetch())?;
    let materials = datatracker.materials(meeting, group).await?;

    println!("IETF {meeting} {} materials:", group.to_uppercase());
    for m in &materials {
        println!("  {:<10} {}", m.kind, m.title);
        println!("             {}", m.url);
    }
    Ok(())
}

fn cmd_info(path: &Path) -> Result<()> {
    let vcon = load_vcon(path)?;

    println!("vCon: {}", path.display());
    println!("  UUID:        {}", vcon.uuid());
    println!("  Subject:     {}", vcon.subject().unwrap_or("-"));
    println!("  Created:     {}", vcon.created_at().to_rfc3339());
    if let Some(updated) = vcon.updated_at() {
        println!("  Updated:     {}", updated.to_rfc3339());
    }
    println!("  Parties:     {}", vcon.parties().len());
    println!("  Dialogs:     {}", vcon.dialog().len());
    println!("  Attachments: {}", vcon.attachments().len());
    println!("  Analysis:    {}", vcon.analysis().len());

    if !vcon.parties().is_empty() {
        println!();
        println!("Parties:");
        for (i, p) in vcon.parties().iter().enumerate() {
            println!("  {i}: {} ({})", p.name, p.role);
        }
    }
    if !vcon.dialog().is_empty() {
        println!();
        println!("Dialogs:");
        for (i, d) in vcon.dialog().iter().enumerate() {
            let location = d.url.as_deref().unwrap_or("inline");
            println!("  {i}: {} {} {location}", d.kind, d.mimetype);
        }
    }
    if !vcon.attachments().is_empty() {
        println!();
        println!("Attachments:");
        for (i, a) in vcon.attachments().iter().enumerate() {
            println!("  {i}: {}", a.kind);
        }
    }
    if !vcon.analysis().is_empty() {
        println!();
        println!("Analysis:");
        for (i, a) in vcon.analysis().iter().enumerate() {
            println!("  {i}: {} on dialog {} by {}", a.kind, a.dialog, a.vendor);
        }
    }
    Ok(())
}

fn cmd_config_init() -> Result<()> {
    let path = init_config()?;
    println!("Config initialized at: {}", path.display());
    Ok(())
}

fn cmd_config_show(path: Option<&Path>) -> Result<()> {
    let config = read_config(path)?;
    println!("{}", toml::to_string_pretty(&config)?);
    Ok(())
}
