//! Task scheduler.
//!
//! Turns QUEUED tasks into DOWNLOADING ones as slots free up. Tasks are
//! grouped by key (playlist id, or a per-task singleton key); a group is
//! drained in enqueue order before the next group, in first-seen order, is
//! considered. Completions release their slot and re-drive dispatch.

mod dispatch;
mod finish;
mod groups;

use serde::Serialize;
use std::sync::atomic::AtomicBool;
use std::sync::{Arc, Mutex, MutexGuard, PoisonError};
use thiserror::Error;

use crate::events::{Event, EventBus};
use crate::executor::Executor;
use crate::gate::{GateStats, SlotGate};
use crate::registry::{TaskId, TaskRegistry, TaskState};
use crate::state_machine::{StateMachine, TransitionError};

pub use groups::GroupSnapshot;
use groups::GroupQueue;

#[derive(Debug, Clone, PartialEq, Eq, Error)]
pub enum SchedulerError {
    #[error("task {0} not found")]
    NotFound(TaskId),
    #[error(transparent)]
    Transition(#[from] TransitionError),
    #[error("cannot cancel task {id} in state {state}")]
    CannotCancel { id: TaskId, state: TaskState },
}

/// Queue occupancy for status display.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Serialize)]
pub struct QueueInfo {
    pub queued: usize,
    pub downloading: usize,
    pub gate: GateStats,
}

pub struct Scheduler {
    registry: Arc<TaskRegistry>,
    state_machine: StateMachine,
    gate: Arc<SlotGate>,
    executor: Arc<dyn Executor>,
    events: EventBus,
    groups: Mutex<GroupQueue>,
    /// A dispatch pass is in flight.
    dispatch_running: AtomicBool,
    /// A re-drive arrived; the running pass must loop once more.
    dispatch_pending: AtomicBool,
}

impl Scheduler {
    /// Build a scheduler over shared components. Also forwards executor
    /// progress events into the registry.
    pub fn new(
        registry: Arc<TaskRegistry>,
        state_machine: StateMachine,
        gate: Arc<SlotGate>,
        executor: Arc<dyn Executor>,
        events: EventBus,
    ) -> Arc<Self> {
        let progress_sink = Arc::clone(&registry);
        events.subscribe(move |event| {
            if let Event::Progress { id, percent } = event {
                progress_sink.update_progress(*id, *percent);
            }
        });
        Arc::new(Self {
            registry,
            state_machine,
            gate,
            executor,
            events,
            groups: Mutex::new(GroupQueue::default()),
            dispatch_running: AtomicBool::new(false),
            dispatch_pending: AtomicBool::new(false),
        })
    }

    fn groups(&self) -> MutexGuard<'_, GroupQueue> {
        self.groups.lock().unwrap_or_else(PoisonError::into_inner)
    }

    /// CREATED -> QUEUED, file the task under its group, and schedule a
    /// dispatch pass. Dispatch runs on a spawned task, so a burst of
    /// enqueues is admitted together.
    pub fn enqueue(self: &Arc<Self>, id: TaskId) -> Result<(), SchedulerError> {
        self.state_machine.transition(id, TaskState::Queued)?;
        let group = self
            .registry
            .get(id)
            .map(|t| t.group)
            .ok_or(SchedulerError::NotFound(id))?;
        tracing::debug!(task = id, group = %group, "queued");
        self.groups().push(group, id);
        self.events.emit(Event::Queued { id });
        self.request_dispatch();
        Ok(())
    }

    /// Cancel a task.
    ///
    /// - CREATED: straight to STOPPED.
    /// - QUEUED: CANCELLING then STOPPED; it is never dispatched.
    /// - DOWNLOADING: CANCELLING, and the executor is asked to terminate the
    ///   job. The final state is settled when the job returns.
    /// - anything else: `CannotCancel`.
    pub fn cancel(&self, id: TaskId) -> Result<(), SchedulerError> {
        loop {
            let state = self
                .registry
                .state_of(id)
                .ok_or(SchedulerError::NotFound(id))?;
            let attempt = match state {
                TaskState::Created => self.state_machine.stop_unqueued(id),
                TaskState::Queued => self
                    .state_machine
                    .transition_from(id, TaskState::Queued, TaskState::Cancelling)
                    .and_then(|()| self.state_machine.transition(id, TaskState::Stopped)),
                TaskState::Downloading => self
                    .state_machine
                    .transition_from(id, TaskState::Downloading, TaskState::Cancelling)
                    .map(|()| {
                        let has_handle = self
                            .registry
                            .get(id)
                            .is_some_and(|t| t.has_execution_handle);
                        if has_handle && !self.executor.cancel(id) {
                            tracing::warn!(task = id, "termination signal not delivered");
                        }
                    }),
                other => return Err(SchedulerError::CannotCancel { id, state: other }),
            };
            match attempt {
                // Dispatch or completion moved the task; decide again.
                Err(TransitionError::Stale { .. }) => continue,
                other => {
                    if other.is_ok() {
                        tracing::info!(task = id, "cancelled from {}", state);
                    }
                    return other.map_err(SchedulerError::from);
                }
            }
        }
    }

    pub fn queue_info(&self) -> QueueInfo {
        let stats = self.registry.get_stats();
        QueueInfo {
            queued: stats.queued,
            downloading: stats.downloading,
            gate: self.gate.stats(),
        }
    }

    pub fn group_snapshot(&self) -> GroupSnapshot {
        self.groups().snapshot()
    }
}
