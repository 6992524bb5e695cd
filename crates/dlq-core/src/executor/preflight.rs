//! Checks run between dispatch and spawning the downloader.

use anyhow::{bail, Context, Result};
use std::fs;
use std::path::{Path, PathBuf};

use crate::registry::{Task, TaskRegistry, TaskState};

/// Destinations longer than this leave little room for a file name on
/// platforms with a short path limit.
const LONG_PATH_WARN: usize = 180;

const MAX_STEM_CHARS: usize = 80;

#[derive(Debug, Clone, PartialEq, Eq)]
pub enum PreflightOutcome {
    /// Spawn the downloader.
    Proceed,
    /// The predicted output file is already on disk.
    AlreadyExists(PathBuf),
}

/// Expected output file name for `title`, mirroring the downloader's
/// restricted-filename sanitising: punctuation dropped, whitespace runs
/// become `_`, stem capped at 80 characters, `.mp3` appended.
pub fn predict_filename(title: &str) -> Option<String> {
    let kept: String = title
        .chars()
        .filter(|c| c.is_ascii_alphanumeric() || *c == '_' || *c == '-' || c.is_whitespace())
        .collect();
    let stem: String = kept
        .split_whitespace()
        .collect::<Vec<_>>()
        .join("_")
        .chars()
        .take(MAX_STEM_CHARS)
        .collect();
    if stem.is_empty() {
        return None;
    }
    Some(format!("{}.mp3", stem))
}

/// Validate `task` before its job starts.
///
/// Fails when the destination is missing, not a directory, or not writable,
/// or when another task is already downloading the same source.
pub fn check(registry: &TaskRegistry, task: &Task) -> Result<PreflightOutcome> {
    let dest = &task.destination;
    check_destination(dest)?;

    let duplicate = registry
        .get_by_state(TaskState::Downloading)
        .into_iter()
        .any(|other| other.id != task.id && other.source == task.source);
    if duplicate {
        bail!("a download for {} is already running", task.source);
    }

    if dest.as_os_str().len() > LONG_PATH_WARN {
        tracing::warn!(task = task.id, "destination path is very long: {}", dest.display());
    }

    if !task.metadata.is_playlist {
        if let Some(name) = task.metadata.title.as_deref().and_then(predict_filename) {
            let path = dest.join(name);
            if path.is_file() {
                return Ok(PreflightOutcome::AlreadyExists(path));
            }
        }
    }
    Ok(PreflightOutcome::Proceed)
}

fn check_destination(dest: &Path) -> Result<()> {
    let meta = fs::metadata(dest)
        .with_context(|| format!("destination {} does not exist", dest.display()))?;
    if !meta.is_dir() {
        bail!("destination {} is not a directory", dest.display());
    }
    let probe = dest.join(format!(".dlq-write-probe-{}", std::process::id()));
    fs::OpenOptions::new()
        .write(true)
        .create(true)
        .truncate(true)
        .open(&probe)
        .with_context(|| format!("destination {} is not writable", dest.display()))?;
    if let Err(e) = fs::remove_file(&probe) {
        tracing::debug!("leaving write probe {}: {}", probe.display(), e);
    }
    Ok(())
}
