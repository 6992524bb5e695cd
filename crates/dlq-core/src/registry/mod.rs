//! In-memory task registry: the single store of task records.
//!
//! Pure CRUD plus aggregate counts. No transition validation and no
//! scheduling policy live here; the state machine validates before it calls
//! `update_state`. Lookups on unknown ids return `None`/`false`.

pub mod types;

pub use types::*;

use std::collections::BTreeMap;
use std::path::PathBuf;
use std::sync::{Mutex, MutexGuard, PoisonError};
use std::time::SystemTime;

struct TaskRecord {
    task: Task,
    handle: Option<Box<dyn ExecutionHandle>>,
}

impl TaskRecord {
    fn apply_state(&mut self, state: TaskState) {
        self.task.state = state;
        if state == TaskState::Downloading && self.task.started_at.is_none() {
            self.task.started_at = Some(SystemTime::now());
        }
        if state.is_terminal() {
            self.task.finished_at = Some(SystemTime::now());
            self.handle = None;
        }
    }

    fn snapshot(&self) -> Task {
        let mut task = self.task.clone();
        task.has_execution_handle = self.handle.is_some();
        task
    }
}

struct Inner {
    // Ids are allocated in increasing order, so key order is insertion order.
    tasks: BTreeMap<TaskId, TaskRecord>,
    next_id: TaskId,
}

/// Shared task store. Wrap in `Arc` and hand the same instance to every component.
pub struct TaskRegistry {
    inner: Mutex<Inner>,
}

impl std::fmt::Debug for TaskRegistry {
    fn fmt(&self, f: &mut std::fmt::Formatter<'_>) -> std::fmt::Result {
        let inner = self.lock();
        f.debug_struct("TaskRegistry")
            .field("tasks", &inner.tasks.len())
            .field("next_id", &inner.next_id)
            .finish()
    }
}

impl Default for TaskRegistry {
    fn default() -> Self {
        Self::new()
    }
}

impl TaskRegistry {
    pub fn new() -> Self {
        Self {
            inner: Mutex::new(Inner {
                tasks: BTreeMap::new(),
                next_id: 1,
            }),
        }
    }

    fn lock(&self) -> MutexGuard<'_, Inner> {
        self.inner.lock().unwrap_or_else(PoisonError::into_inner)
    }

    /// Insert a new task in CREATED and return its id.
    pub fn create(
        &self,
        source: impl Into<String>,
        destination: impl Into<PathBuf>,
        metadata: TaskMetadata,
    ) -> TaskId {
        let mut inner = self.lock();
        let id = inner.next_id;
        inner.next_id += 1;
        let group = GroupKey::for_task(id, &metadata);
        let task = Task {
            id,
            source: source.into(),
            destination: destination.into(),
            metadata,
            group,
            state: TaskState::Created,
            progress: 0.0,
            error: None,
            has_execution_handle: false,
            created_at: SystemTime::now(),
            started_at: None,
            finished_at: None,
        };
        inner.tasks.insert(id, TaskRecord { task, handle: None });
        id
    }

    pub fn get(&self, id: TaskId) -> Option<Task> {
        self.lock().tasks.get(&id).map(TaskRecord::snapshot)
    }

    pub fn exists(&self, id: TaskId) -> bool {
        self.lock().tasks.contains_key(&id)
    }

    /// Current state only, without cloning the record.
    pub fn state_of(&self, id: TaskId) -> Option<TaskState> {
        self.lock().tasks.get(&id).map(|r| r.task.state)
    }

    /// All tasks in insertion order.
    pub fn get_all(&self) -> Vec<Task> {
        self.lock().tasks.values().map(TaskRecord::snapshot).collect()
    }

    pub fn get_by_state(&self, state: TaskState) -> Vec<Task> {
        self.lock()
            .tasks
            .values()
            .filter(|r| r.task.state == state)
            .map(TaskRecord::snapshot)
            .collect()
    }

    /// Unconditional state write. Stamps `started_at` on the first entry into
    /// DOWNLOADING; on any terminal state stamps `finished_at` and drops the
    /// execution handle.
    pub fn update_state(&self, id: TaskId, state: TaskState) -> bool {
        let mut inner = self.lock();
        let Some(record) = inner.tasks.get_mut(&id) else {
            return false;
        };
        record.apply_state(state);
        true
    }

    /// Like `update_state`, but only if the current state is still `expected`.
    /// `None` if the task is absent, `Some(false)` if the state moved on.
    pub fn compare_and_update_state(
        &self,
        id: TaskId,
        expected: TaskState,
        state: TaskState,
    ) -> Option<bool> {
        let mut inner = self.lock();
        let record = inner.tasks.get_mut(&id)?;
        if record.task.state != expected {
            return Some(false);
        }
        record.apply_state(state);
        Some(true)
    }

    /// Clamp to [0, 100] and store. NaN is stored as 0.
    pub fn update_progress(&self, id: TaskId, progress: f64) -> bool {
        let mut inner = self.lock();
        let Some(record) = inner.tasks.get_mut(&id) else {
            return false;
        };
        record.task.progress = if progress.is_nan() {
            0.0
        } else {
            progress.clamp(0.0, 100.0)
        };
        true
    }

    pub fn set_error(&self, id: TaskId, message: impl Into<String>) -> bool {
        let mut inner = self.lock();
        let Some(record) = inner.tasks.get_mut(&id) else {
            return false;
        };
        record.task.error = Some(message.into());
        true
    }

    /// Attach (or with `None`, detach) the in-flight job resource.
    pub fn set_execution_handle(
        &self,
        id: TaskId,
        handle: Option<Box<dyn ExecutionHandle>>,
    ) -> bool {
        let mut inner = self.lock();
        let Some(record) = inner.tasks.get_mut(&id) else {
            return false;
        };
        record.handle = handle;
        true
    }

    /// Signal the live handle without detaching it. False if there is none.
    pub fn terminate_execution(&self, id: TaskId) -> bool {
        let mut inner = self.lock();
        match inner.tasks.get_mut(&id).and_then(|r| r.handle.as_mut()) {
            Some(handle) => handle.terminate(),
            None => false,
        }
    }

    /// Evict a task, terminating its live handle first.
    pub fn remove(&self, id: TaskId) -> bool {
        let removed = self.lock().tasks.remove(&id);
        match removed {
            Some(mut record) => {
                if let Some(handle) = record.handle.as_mut() {
                    handle.terminate();
                }
                true
            }
            None => false,
        }
    }

    /// Evict every task, terminating live handles.
    pub fn clear(&self) {
        let drained = std::mem::take(&mut self.lock().tasks);
        for (_, mut record) in drained {
            if let Some(handle) = record.handle.as_mut() {
                handle.terminate();
            }
        }
    }

    pub fn get_stats(&self) -> RegistryStats {
        let inner = self.lock();
        let mut stats = RegistryStats::default();
        for record in inner.tasks.values() {
            stats.count(record.task.state);
        }
        stats
    }
}

#[cfg(test)]
mod tests;
