//! Types stored in and returned by the task registry.

use serde::{Deserialize, Serialize};
use std::fmt;
use std::path::PathBuf;
use std::time::SystemTime;

/// Task identifier. Allocated from 1 upward; never reused within a registry.
pub type TaskId = u64;

/// Lifecycle state of a task. Only the state machine changes it.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Hash, Serialize, Deserialize)]
#[serde(rename_all = "SCREAMING_SNAKE_CASE")]
pub enum TaskState {
    Created,
    Queued,
    Downloading,
    Cancelling,
    Completed,
    Error,
    Stopped,
    AlreadyExists,
}

impl TaskState {
    pub const ALL: [TaskState; 8] = [
        TaskState::Created,
        TaskState::Queued,
        TaskState::Downloading,
        TaskState::Cancelling,
        TaskState::Completed,
        TaskState::Error,
        TaskState::Stopped,
        TaskState::AlreadyExists,
    ];

    pub fn as_str(self) -> &'static str {
        match self {
            TaskState::Created => "CREATED",
            TaskState::Queued => "QUEUED",
            TaskState::Downloading => "DOWNLOADING",
            TaskState::Cancelling => "CANCELLING",
            TaskState::Completed => "COMPLETED",
            TaskState::Error => "ERROR",
            TaskState::Stopped => "STOPPED",
            TaskState::AlreadyExists => "ALREADY_EXISTS",
        }
    }

    /// No outgoing transitions.
    pub fn is_terminal(self) -> bool {
        matches!(
            self,
            TaskState::Completed | TaskState::Error | TaskState::Stopped | TaskState::AlreadyExists
        )
    }
}

impl fmt::Display for TaskState {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        f.write_str(self.as_str())
    }
}

/// Caller-supplied metadata. Only `playlist_id` matters to scheduling; the
/// rest is carried through for the executor and for display.
#[derive(Debug, Clone, Default, PartialEq, Serialize, Deserialize)]
pub struct TaskMetadata {
    /// Group-key hint. Tasks sharing it are drained together, in order.
    #[serde(default, skip_serializing_if = "Option::is_none")]
    pub playlist_id: Option<String>,
    #[serde(default, skip_serializing_if = "Option::is_none")]
    pub playlist_title: Option<String>,
    #[serde(default, skip_serializing_if = "Option::is_none")]
    pub playlist_url: Option<String>,
    /// Entry title, used to predict the output filename.
    #[serde(default, skip_serializing_if = "Option::is_none")]
    pub title: Option<String>,
    /// True when the source itself is a playlist URL (downloader expands it).
    #[serde(default)]
    pub is_playlist: bool,
}

/// Scheduling group a task belongs to.
#[derive(Debug, Clone, PartialEq, Eq, Hash)]
pub enum GroupKey {
    Playlist(String),
    /// Synthetic key for an ungrouped task; unique per task.
    Single(TaskId),
}

impl GroupKey {
    pub fn for_task(id: TaskId, metadata: &TaskMetadata) -> Self {
        match metadata.playlist_id.as_deref() {
            Some(p) if !p.is_empty() => GroupKey::Playlist(p.to_string()),
            _ => GroupKey::Single(id),
        }
    }
}

impl fmt::Display for GroupKey {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        match self {
            GroupKey::Playlist(p) => f.write_str(p),
            GroupKey::Single(id) => write!(f, "single_{}", id),
        }
    }
}

/// Resource owned by a task while its job runs (e.g. a child process).
pub trait ExecutionHandle: Send + fmt::Debug {
    /// Best-effort termination request. Returns whether a signal was sent.
    fn terminate(&mut self) -> bool;
}

/// Point-in-time copy of a task record. The live execution handle stays in
/// the registry; only its presence is reported.
#[derive(Debug, Clone)]
pub struct Task {
    pub id: TaskId,
    pub source: String,
    pub destination: PathBuf,
    pub metadata: TaskMetadata,
    pub group: GroupKey,
    pub state: TaskState,
    /// Percentage in [0, 100].
    pub progress: f64,
    pub error: Option<String>,
    pub has_execution_handle: bool,
    pub created_at: SystemTime,
    /// First entry into DOWNLOADING.
    pub started_at: Option<SystemTime>,
    /// Entry into a terminal state.
    pub finished_at: Option<SystemTime>,
}

/// Per-state counts, computed on demand from the records.
#[derive(Debug, Clone, Default, PartialEq, Eq, Serialize, Deserialize)]
pub struct RegistryStats {
    pub total: usize,
    pub created: usize,
    pub queued: usize,
    pub downloading: usize,
    pub cancelling: usize,
    pub completed: usize,
    pub error: usize,
    pub stopped: usize,
    pub already_exists: usize,
}

impl RegistryStats {
    pub(super) fn count(&mut self, state: TaskState) {
        self.total += 1;
        let slot = match state {
            TaskState::Created => &mut self.created,
            TaskState::Queued => &mut self.queued,
            TaskState::Downloading => &mut self.downloading,
            TaskState::Cancelling => &mut self.cancelling,
            TaskState::Completed => &mut self.completed,
            TaskState::Error => &mut self.error,
            TaskState::Stopped => &mut self.stopped,
            TaskState::AlreadyExists => &mut self.already_exists,
        };
        *slot += 1;
    }

    /// Tasks that have not reached a terminal state.
    pub fn live(&self) -> usize {
        self.created + self.queued + self.downloading + self.cancelling
    }
}
