use anyhow::{bail, Context, Result};
use serde::{Deserialize, Serialize};
use std::fs;
use std::path::PathBuf;

/// Progress report throttling (optional section in config.toml).
#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
pub struct ProgressConfig {
    /// Minimum jump, in percentage points, reported inside the fast window.
    pub min_step_fast: f64,
    /// Minimum jump reported after the fast window.
    pub min_step: f64,
    /// Length of the fast window after a report, in milliseconds.
    pub fast_window_ms: u64,
    /// After this many milliseconds without a report, any reading is reported.
    pub force_after_ms: u64,
}

impl Default for ProgressConfig {
    fn default() -> Self {
        Self {
            min_step_fast: 5.0,
            min_step: 2.0,
            fast_window_ms: 1000,
            force_after_ms: 5000,
        }
    }
}

/// Global configuration loaded from `~/.config/dlq/config.toml`.
#[derive(Debug, Clone, Serialize, Deserialize)]
pub struct DlqConfig {
    /// Maximum number of downloads running at once.
    pub max_concurrent: usize,
    /// Downloader executable (looked up on PATH unless absolute).
    pub downloader_program: String,
    /// Optional ffmpeg location passed to the downloader when it exists.
    #[serde(default)]
    pub ffmpeg_path: Option<PathBuf>,
    /// Seconds between SIGTERM and a hard kill when cancelling.
    pub cancel_grace_secs: u64,
    /// Playlist performance factor; the largest accepted playlist is 50x this.
    pub playlist_performance: usize,
    /// Optional progress throttling; if missing, built-in defaults are used.
    #[serde(default)]
    pub progress: Option<ProgressConfig>,
}

impl Default for DlqConfig {
    fn default() -> Self {
        Self {
            max_concurrent: 20,
            downloader_program: "yt-dlp".to_string(),
            ffmpeg_path: None,
            cancel_grace_secs: 3,
            playlist_performance: 20,
            progress: None,
        }
    }
}

impl DlqConfig {
    /// Reject values the gate cannot run with.
    pub fn validate(&self) -> Result<()> {
        if self.max_concurrent == 0 {
            bail!("max_concurrent must be at least 1");
        }
        Ok(())
    }
}

pub fn config_path() -> Result<PathBuf> {
    let xdg_dirs = xdg::BaseDirectories::with_prefix("dlq")?;
    Ok(xdg_dirs.place_config_file("config.toml")?)
}

/// Load configuration from disk, creating a default file if none exists.
pub fn load_or_init() -> Result<DlqConfig> {
    let path = config_path()?;
    if !path.exists() {
        let default_cfg = DlqConfig::default();
        let toml = toml::to_string_pretty(&default_cfg)?;
        if let Some(parent) = path.parent() {
            fs::create_dir_all(parent)?;
        }
        fs::write(&path, toml)?;
        tracing::info!("created default config at {}", path.display());
        return Ok(default_cfg);
    }

    let data = fs::read_to_string(&path)?;
    let cfg: DlqConfig = toml::from_str(&data)?;
    cfg.validate()
        .with_context(|| format!("invalid config {}", path.display()))?;
    Ok(cfg)
}
