//! Playlist expansion through the downloader's flat-playlist mode.

use serde::Serialize;
use std::process::Stdio;
use thiserror::Error;
use tokio::process::Command;

const UNKNOWN_TITLE: &str = "Unknown Playlist";

/// Each unit of playlist performance admits this many entries.
const ENTRIES_PER_PERFORMANCE: usize = 50;

/// Largest playlist accepted at `performance` (treated as at least 1).
pub fn max_playlist_size(performance: usize) -> usize {
    performance.max(1).saturating_mul(ENTRIES_PER_PERFORMANCE)
}

#[derive(Debug, Error)]
pub enum PlaylistError {
    #[error("failed to start {program}: {source}")]
    Spawn {
        program: String,
        #[source]
        source: std::io::Error,
    },
    #[error("{0}")]
    Failed(String),
    #[error("playlist too large: {count} videos (max {max})")]
    TooLarge { count: usize, max: usize },
}

#[derive(Debug, Clone, PartialEq, Eq, Serialize)]
pub struct PlaylistInfo {
    pub count: usize,
    pub title: String,
}

#[derive(Debug, Clone, PartialEq, Eq, Serialize)]
pub struct PlaylistEntry {
    pub url: String,
    pub title: String,
}

#[derive(Debug, Clone)]
pub struct PlaylistExpander {
    program: String,
    max_playlist_size: usize,
}

impl PlaylistExpander {
    pub fn new(program: impl Into<String>, max_playlist_size: usize) -> Self {
        Self {
            program: program.into(),
            max_playlist_size,
        }
    }

    /// `TooLarge` if a playlist of `count` entries exceeds the limit.
    pub fn check_size(&self, count: usize) -> Result<(), PlaylistError> {
        if count > self.max_playlist_size {
            return Err(PlaylistError::TooLarge {
                count,
                max: self.max_playlist_size,
            });
        }
        Ok(())
    }

    /// Entry count and title of the playlist at `url`.
    pub async fn playlist_info(&self, url: &str) -> Result<PlaylistInfo, PlaylistError> {
        let out = self
            .run(&[
                "--flat-playlist",
                "--print",
                "%(playlist_count)s",
                "--print",
                "%(playlist_title)s",
                url,
            ])
            .await?;
        Ok(parse_info(&out))
    }

    /// Every entry of the playlist at `url`, in playlist order.
    pub async fn expand(&self, url: &str) -> Result<Vec<PlaylistEntry>, PlaylistError> {
        let out = self
            .run(&["--flat-playlist", "--print", "url", "--print", "title", url])
            .await?;
        let entries = parse_entries(&out);
        self.check_size(entries.len())?;
        tracing::debug!("expanded {} into {} entries", url, entries.len());
        Ok(entries)
    }

    async fn run(&self, args: &[&str]) -> Result<String, PlaylistError> {
        let output = Command::new(&self.program)
            .args(args)
            .stdin(Stdio::null())
            .kill_on_drop(true)
            .output()
            .await
            .map_err(|source| PlaylistError::Spawn {
                program: self.program.clone(),
                source,
            })?;
        if !output.status.success() {
            let stderr = String::from_utf8_lossy(&output.stderr).trim().to_string();
            return Err(PlaylistError::Failed(if stderr.is_empty() {
                format!("{} exited with {}", self.program, output.status)
            } else {
                stderr
            }));
        }
        Ok(String::from_utf8_lossy(&output.stdout).into_owned())
    }
}

/// First line is the count (0 if unparsable), second the title.
pub fn parse_info(stdout: &str) -> PlaylistInfo {
    let mut lines = stdout.trim().lines();
    let count = lines
        .next()
        .and_then(|l| l.trim().parse().ok())
        .unwrap_or(0);
    let title = lines
        .next()
        .map(str::trim)
        .filter(|t| !t.is_empty())
        .unwrap_or(UNKNOWN_TITLE)
        .to_string();
    PlaylistInfo { count, title }
}

/// Alternating url/title lines; blank lines are skipped and a trailing
/// url without a title is dropped.
pub fn parse_entries(stdout: &str) -> Vec<PlaylistEntry> {
    let lines: Vec<&str> = stdout
        .lines()
        .map(str::trim)
        .filter(|l| !l.is_empty())
        .collect();
    lines
        .chunks_exact(2)
        .map(|pair| PlaylistEntry {
            url: pair[0].to_string(),
            title: pair[1].to_string(),
        })
        .collect()
}
