//! Shared download session: manager setup, event printing, Ctrl-C and the
//! final summary.

use anyhow::{bail, Result};
use dlq_core::config::DlqConfig;
use dlq_core::events::Event;
use dlq_core::registry::{RegistryStats, TaskState};
use dlq_core::DownloadManager;
use std::path::PathBuf;

#[derive(Debug, Clone)]
pub struct SessionOptions {
    pub config: DlqConfig,
    pub dest: PathBuf,
    pub json: bool,
}

impl SessionOptions {
    /// Apply command-line overrides on top of the loaded config.
    pub fn resolve(
        cfg: &DlqConfig,
        dest: Option<PathBuf>,
        jobs: Option<usize>,
        json: bool,
    ) -> Result<Self> {
        let mut config = cfg.clone();
        if let Some(jobs) = jobs {
            if jobs == 0 {
                bail!("--jobs must be at least 1");
            }
            config.max_concurrent = jobs;
        }
        let dest = match dest {
            Some(d) => d,
            None => std::env::current_dir()?,
        };
        Ok(Self { config, dest, json })
    }

    /// Manager with a console printer attached.
    pub fn start(&self) -> DownloadManager {
        let manager = DownloadManager::new(&self.config);
        let json = self.json;
        manager.subscribe(move |event| print_event(event, json));
        manager
    }
}

fn print_event(event: &Event, json: bool) {
    if json {
        match serde_json::to_string(event) {
            Ok(line) => println!("{}", line),
            Err(e) => tracing::warn!("event not serializable: {}", e),
        }
        return;
    }
    match event {
        Event::StateChanged { id, to, .. } => println!("[{}] {}", id, to),
        Event::Progress { id, percent } => println!("[{}] {:5.1}%", id, percent),
        Event::Error { id, message } => eprintln!("[{}] error: {}", id, message),
        Event::PlaylistInfo { count, title, .. } => {
            println!("playlist {:?}: {} video(s)", title, count)
        }
        Event::PlaylistError { message, .. } => eprintln!("playlist error: {}", message),
        _ => {}
    }
}

/// Wait for every download to settle. Ctrl-C cancels whatever is left.
pub async fn wait(manager: &DownloadManager) {
    tokio::select! {
        _ = manager.wait_idle() => {}
        res = tokio::signal::ctrl_c() => {
            if let Err(e) = res {
                tracing::warn!("ctrl-c handler: {}", e);
            }
            let n = manager.cancel_all();
            eprintln!("interrupted: cancelling {} download(s)", n);
            manager.wait_idle().await;
        }
    }
}

/// Print per-task results and counts; Err if any download failed.
pub fn summarize(manager: &DownloadManager, json: bool) -> Result<RegistryStats> {
    let stats = manager.stats().registry;
    if json {
        println!("{}", serde_json::to_string(&manager.stats())?);
    } else {
        println!();
        for task in manager.all() {
            let label = task
                .metadata
                .title
                .clone()
                .unwrap_or_else(|| task.source.clone());
            match (task.state, &task.error) {
                (TaskState::Error, Some(err)) => println!("{:<6} {:<14} {} ({})", task.id, task.state, label, err),
                _ => println!("{:<6} {:<14} {}", task.id, task.state, label),
            }
        }
        println!(
            "{} completed, {} already present, {} stopped, {} failed",
            stats.completed, stats.already_exists, stats.stopped, stats.error
        );
    }
    if stats.error > 0 {
        bail!("{} download(s) failed", stats.error);
    }
    Ok(stats)
}
