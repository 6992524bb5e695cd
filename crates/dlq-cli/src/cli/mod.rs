//! CLI for the DLQ download queue.

mod commands;

use anyhow::Result;
use clap::{Parser, Subcommand};
use dlq_core::config;
use std::path::PathBuf;

use commands::{run_config, run_get, run_playlist, SessionOptions};

/// Top-level CLI for the DLQ download queue.
#[derive(Debug, Parser)]
#[command(name = "dlq")]
#[command(about = "DLQ: playlist-aware media download queue", long_about = None)]
pub struct Cli {
    #[command(subcommand)]
    pub command: CliCommand,
}

#[derive(Debug, Subcommand)]
pub enum CliCommand {
    /// Download one or more media URLs as mp3.
    Get {
        /// Media page URLs (http/https).
        #[arg(required = true, value_name = "URL")]
        urls: Vec<String>,
        /// Destination directory (default: current directory).
        #[arg(long, value_name = "DIR")]
        dest: Option<PathBuf>,
        /// Run up to N downloads at once (default: max_concurrent from config).
        #[arg(long, value_name = "N")]
        jobs: Option<usize>,
        /// Queue all URLs as one group, drained before later groups.
        #[arg(long, value_name = "ID")]
        playlist_id: Option<String>,
        /// Print every event as a JSON line instead of progress text.
        #[arg(long)]
        json: bool,
    },

    /// Expand a playlist URL and download every entry.
    Playlist {
        /// Playlist URL (http/https).
        url: String,
        /// Destination directory (default: current directory).
        #[arg(long, value_name = "DIR")]
        dest: Option<PathBuf>,
        /// Run up to N downloads at once (default: max_concurrent from config).
        #[arg(long, value_name = "N")]
        jobs: Option<usize>,
        /// Performance factor; at most 50 entries per unit are accepted
        /// (default: playlist_performance from config).
        #[arg(long, value_name = "P")]
        performance: Option<usize>,
        /// Print every event as a JSON line instead of progress text.
        #[arg(long)]
        json: bool,
    },

    /// Show the config file location and effective settings.
    Config,
}

impl CliCommand {
    pub async fn run_from_args() -> Result<()> {
        let cli = Cli::parse();
        let cfg = config::load_or_init()?;
        tracing::debug!("loaded config: {:?}", cfg);

        match cli.command {
            CliCommand::Get {
                urls,
                dest,
                jobs,
                playlist_id,
                json,
            } => {
                let opts = SessionOptions::resolve(&cfg, dest, jobs, json)?;
                run_get(&opts, &urls, playlist_id).await?;
            }
            CliCommand::Playlist {
                url,
                dest,
                jobs,
                performance,
                json,
            } => {
                let opts = SessionOptions::resolve(&cfg, dest, jobs, json)?;
                let performance = performance.unwrap_or(cfg.playlist_performance);
                run_playlist(&opts, &url, performance).await?;
            }
            CliCommand::Config => run_config(&cfg)?,
        }

        Ok(())
    }
}

#[cfg(test)]
mod tests;
