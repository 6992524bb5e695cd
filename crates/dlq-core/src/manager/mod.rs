//! Download manager: the facade the CLI talks to.
//!
//! Owns one instance of each component (registry, events, state machine,
//! gate, scheduler, executor) and validates input before anything is
//! created.

mod validate;

use rand::distributions::Alphanumeric;
use rand::Rng;
use serde::Serialize;
use std::path::PathBuf;
use std::sync::Arc;
use std::time::{SystemTime, UNIX_EPOCH};
use thiserror::Error;
use tokio::sync::{mpsc, Notify};

use crate::config::DlqConfig;
use crate::events::{log_event, Event, EventBus};
use crate::executor::{Executor, ProcessExecutor, ProcessExecutorOptions};
use crate::gate::{GateError, GateStats, SlotGate};
use crate::playlist::{max_playlist_size, PlaylistError, PlaylistExpander};
use crate::registry::{RegistryStats, Task, TaskId, TaskMetadata, TaskRegistry};
use crate::scheduler::{GroupSnapshot, QueueInfo, Scheduler, SchedulerError};
use crate::state_machine::StateMachine;

pub use validate::{destination_dir, source_url};

#[derive(Debug, Error)]
pub enum ManagerError {
    #[error("invalid source {url:?}: {reason}")]
    InvalidSource { url: String, reason: String },
    #[error("invalid destination {}: {reason}", path.display())]
    InvalidDestination { path: PathBuf, reason: String },
    #[error(transparent)]
    Scheduler(#[from] SchedulerError),
    #[error(transparent)]
    Gate(#[from] GateError),
    #[error(transparent)]
    Playlist(#[from] PlaylistError),
    #[error("{live} download(s) still queued or running")]
    Busy { live: usize },
}

#[derive(Debug, Clone, Serialize)]
pub struct ManagerStats {
    pub registry: RegistryStats,
    pub queue: QueueInfo,
    pub gate: GateStats,
    pub groups: GroupSnapshot,
}

#[derive(Debug, Clone, PartialEq, Eq, Serialize)]
pub struct PlaylistSummary {
    pub title: String,
    pub video_count: usize,
    pub task_ids: Vec<TaskId>,
}

pub struct DownloadManager {
    registry: Arc<TaskRegistry>,
    events: EventBus,
    gate: Arc<SlotGate>,
    scheduler: Arc<Scheduler>,
    downloader_program: String,
    /// Woken on every state change and slot release.
    activity: Arc<Notify>,
}

impl DownloadManager {
    /// Manager running the configured downloader.
    pub fn new(config: &DlqConfig) -> Self {
        let options = ProcessExecutorOptions::from_config(config);
        Self::with_executor(config.max_concurrent, |sm, events| {
            Arc::new(ProcessExecutor::new(sm.clone(), events.clone(), options))
        })
        .with_downloader_program(config.downloader_program.clone())
    }

    /// Program used for playlist expansion.
    pub fn with_downloader_program(mut self, program: impl Into<String>) -> Self {
        self.downloader_program = program.into();
        self
    }

    /// Manager over a caller-supplied executor, built from the shared state
    /// machine and event bus.
    pub fn with_executor<F>(max_concurrent: usize, make_executor: F) -> Self
    where
        F: FnOnce(&StateMachine, &EventBus) -> Arc<dyn Executor>,
    {
        let registry = Arc::new(TaskRegistry::new());
        let events = EventBus::new();
        events.subscribe(log_event);
        let activity = Arc::new(Notify::new());
        let wake = Arc::clone(&activity);
        events.subscribe(move |event| {
            if matches!(event, Event::StateChanged { .. } | Event::Finished { .. }) {
                wake.notify_waiters();
            }
        });

        let state_machine = StateMachine::new(Arc::clone(&registry), events.clone());
        let gate = Arc::new(SlotGate::new(max_concurrent));
        let executor = make_executor(&state_machine, &events);
        let scheduler = Scheduler::new(
            Arc::clone(&registry),
            state_machine,
            Arc::clone(&gate),
            executor,
            events.clone(),
        );
        Self {
            registry,
            events,
            gate,
            scheduler,
            downloader_program: DlqConfig::default().downloader_program,
            activity,
        }
    }

    /// Validate, create and enqueue one download.
    pub fn add_download(
        &self,
        source: &str,
        destination: impl Into<PathBuf>,
        metadata: TaskMetadata,
    ) -> Result<TaskId, ManagerError> {
        let destination = destination.into();
        source_url(source)?;
        destination_dir(&destination)?;

        let source = source.trim();
        let id = self.registry.create(source, destination, metadata.clone());
        self.events.emit(Event::Created {
            id,
            source: source.to_string(),
            metadata,
        });
        if let Err(e) = self.scheduler.enqueue(id) {
            tracing::warn!(task = id, "enqueue failed, dropping task: {}", e);
            self.registry.remove(id);
            return Err(e.into());
        }
        Ok(id)
    }

    /// Expand a playlist and enqueue every entry as one group.
    ///
    /// At most `performance * 50` entries are accepted. The group key is the
    /// caller's `playlist_id` if given, else a fresh `playlist_<ms>_<rand>`.
    pub async fn add_playlist(
        &self,
        url: &str,
        destination: impl Into<PathBuf>,
        metadata: TaskMetadata,
        performance: usize,
    ) -> Result<PlaylistSummary, ManagerError> {
        let destination = destination.into();
        source_url(url)?;
        destination_dir(&destination)?;

        let expander =
            PlaylistExpander::new(self.downloader_program.clone(), max_playlist_size(performance));
        self.events.emit(Event::PlaylistExpansionStarted {
            url: url.to_string(),
        });
        let expanded = async {
            let info = expander.playlist_info(url).await?;
            self.events.emit(Event::PlaylistInfo {
                url: url.to_string(),
                count: info.count,
                title: info.title.clone(),
            });
            // Refuse before fetching every entry of an oversized playlist.
            expander.check_size(info.count)?;
            let entries = expander.expand(url).await?;
            Ok::<_, PlaylistError>((info, entries))
        }
        .await;
        let (info, entries) = match expanded {
            Ok(v) => v,
            Err(e) => {
                self.events.emit(Event::PlaylistError {
                    url: url.to_string(),
                    message: e.to_string(),
                });
                return Err(e.into());
            }
        };
        self.events.emit(Event::PlaylistExpanded {
            url: url.to_string(),
            entries: entries.len(),
            destination: destination.clone(),
        });

        let group = metadata.playlist_id.clone().unwrap_or_else(playlist_group_key);
        let title = metadata.playlist_title.clone().unwrap_or(info.title);
        let mut task_ids = Vec::with_capacity(entries.len());
        for entry in entries {
            let meta = TaskMetadata {
                playlist_id: Some(group.clone()),
                playlist_title: Some(title.clone()),
                playlist_url: Some(url.to_string()),
                title: Some(entry.title),
                is_playlist: false,
            };
            match self.add_download(&entry.url, destination.clone(), meta) {
                Ok(id) => task_ids.push(id),
                Err(e) => tracing::warn!("skipping playlist entry {}: {}", entry.url, e),
            }
        }
        tracing::info!("playlist {:?}: {} task(s) in group {}", title, task_ids.len(), group);
        Ok(PlaylistSummary {
            title,
            video_count: task_ids.len(),
            task_ids,
        })
    }

    pub fn cancel(&self, id: TaskId) -> Result<(), ManagerError> {
        Ok(self.scheduler.cancel(id)?)
    }

    /// Evict a task, terminating its job if one is running.
    pub fn remove(&self, id: TaskId) -> bool {
        self.registry.remove(id)
    }

    pub fn get(&self, id: TaskId) -> Option<Task> {
        self.registry.get(id)
    }

    pub fn all(&self) -> Vec<Task> {
        self.registry.get_all()
    }

    pub fn stats(&self) -> ManagerStats {
        ManagerStats {
            registry: self.registry.get_stats(),
            queue: self.scheduler.queue_info(),
            gate: self.gate.stats(),
            groups: self.scheduler.group_snapshot(),
        }
    }

    /// Change the concurrency ceiling. Refused while anything is queued,
    /// running or holding a slot.
    pub fn set_max_concurrent(&self, max_concurrent: usize) -> Result<(), ManagerError> {
        let stats = self.registry.get_stats();
        let live = stats.queued + stats.downloading + stats.cancelling;
        if live > 0 {
            return Err(ManagerError::Busy { live });
        }
        self.gate.set_max_concurrent(max_concurrent)?;
        tracing::info!("max_concurrent set to {}", max_concurrent);
        self.events.emit(Event::MaxConcurrentChanged { max_concurrent });
        Ok(())
    }

    /// Drop every task, terminating running jobs.
    pub fn clear(&self) {
        self.registry.clear();
    }

    pub fn subscribe<F>(&self, observer: F)
    where
        F: Fn(&Event) + Send + Sync + 'static,
    {
        self.events.subscribe(observer);
    }

    pub fn subscribe_channel(&self) -> mpsc::UnboundedReceiver<Event> {
        self.events.subscribe_channel()
    }

    /// Cancel every task that can still be cancelled. Returns how many were.
    pub fn cancel_all(&self) -> usize {
        self.registry
            .get_all()
            .into_iter()
            .filter(|t| !t.state.is_terminal())
            .filter(|t| self.scheduler.cancel(t.id).is_ok())
            .count()
    }

    fn is_idle(&self) -> bool {
        self.registry.get_stats().live() == 0 && self.gate.stats().in_use == 0
    }

    /// Resolve once no task is live and every slot is back.
    pub async fn wait_idle(&self) {
        loop {
            let notified = self.activity.notified();
            tokio::pin!(notified);
            notified.as_mut().enable();
            if self.is_idle() {
                return;
            }
            notified.await;
        }
    }
}

fn playlist_group_key() -> String {
    let millis = SystemTime::now()
        .duration_since(UNIX_EPOCH)
        .map(|d| d.as_millis())
        .unwrap_or(0);
    let suffix: String = rand::thread_rng()
        .sample_iter(&Alphanumeric)
        .take(9)
        .map(|b| char::from(b).to_ascii_lowercase())
        .collect();
    format!("playlist_{}_{}", millis, suffix)
}
