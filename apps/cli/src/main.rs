//! ietf2vcon CLI: convert IETF working-group sessions into vCon documents.
//!
//! Pulls session metadata, recordings, materials, transcripts, and chat from
//! the IETF's public services and writes one `.vcon.json` per session.

mod commands;
mod progress;

use clap::Parser;
use color_eyre::eyre::Result;

use commands::Cli;

#[tokio::main]
async fn main() -> Result<()> {
    color_eyre::install()?;
    let cli = Cli::parse();
    commands::init_tracing(&cli);
    commands::run(cli).await
}
