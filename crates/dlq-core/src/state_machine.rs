//! Transition table and the only path by which a task's state changes.

use std::sync::Arc;
use std::time::SystemTime;
use thiserror::Error;

use crate::events::{Event, EventBus};
use crate::registry::{TaskId, TaskRegistry, TaskState};

#[derive(Debug, Clone, PartialEq, Eq, Error)]
pub enum TransitionError {
    #[error("task {0} not found")]
    NotFound(TaskId),
    #[error("invalid transition: {from} -> {to}")]
    Invalid {
        id: TaskId,
        from: TaskState,
        to: TaskState,
    },
    /// `transition_from` found the task in a different state than expected.
    #[error("task {id} is {actual}, expected {expected}")]
    Stale {
        id: TaskId,
        expected: TaskState,
        actual: TaskState,
    },
}

/// States reachable from `from` in one step.
pub fn allowed_transitions(from: TaskState) -> &'static [TaskState] {
    use TaskState::*;
    match from {
        Created => &[Queued],
        Queued => &[Downloading, Cancelling],
        Downloading => &[Cancelling, Completed, Error, AlreadyExists],
        Cancelling => &[Stopped, Error],
        Completed | Error | Stopped | AlreadyExists => &[],
    }
}

pub fn can_transition(from: TaskState, to: TaskState) -> bool {
    allowed_transitions(from).contains(&to)
}

/// Actively holding a slot and running.
pub fn is_active_state(state: TaskState) -> bool {
    state == TaskState::Downloading
}

pub fn is_terminal_state(state: TaskState) -> bool {
    state.is_terminal()
}

#[derive(Debug, Clone)]
pub struct StateMachine {
    registry: Arc<TaskRegistry>,
    events: EventBus,
}

impl StateMachine {
    pub fn new(registry: Arc<TaskRegistry>, events: EventBus) -> Self {
        Self { registry, events }
    }

    pub fn registry(&self) -> &Arc<TaskRegistry> {
        &self.registry
    }

    /// Validate `id`'s current state against the table, write the new state,
    /// and notify observers. On error the task is left unchanged.
    pub fn transition(&self, id: TaskId, to: TaskState) -> Result<(), TransitionError> {
        let from = loop {
            let from = self
                .registry
                .state_of(id)
                .ok_or(TransitionError::NotFound(id))?;
            if !can_transition(from, to) {
                return Err(TransitionError::Invalid { id, from, to });
            }
            // Re-validate if another transition landed between read and write.
            match self.registry.compare_and_update_state(id, from, to) {
                Some(true) => break from,
                Some(false) => continue,
                None => return Err(TransitionError::NotFound(id)),
            }
        };
        self.notify(id, from, to);
        Ok(())
    }

    /// Transition only if the task is currently in `expected`. Fails with
    /// `Stale` (task unchanged) if another transition got there first.
    pub fn transition_from(
        &self,
        id: TaskId,
        expected: TaskState,
        to: TaskState,
    ) -> Result<(), TransitionError> {
        if !can_transition(expected, to) {
            return Err(TransitionError::Invalid {
                id,
                from: expected,
                to,
            });
        }
        match self.registry.compare_and_update_state(id, expected, to) {
            Some(true) => {
                self.notify(id, expected, to);
                Ok(())
            }
            Some(false) => {
                let actual = self
                    .registry
                    .state_of(id)
                    .ok_or(TransitionError::NotFound(id))?;
                Err(TransitionError::Stale {
                    id,
                    expected,
                    actual,
                })
            }
            None => Err(TransitionError::NotFound(id)),
        }
    }

    /// Stop a task that was never queued. CREATED -> STOPPED is outside the
    /// table; this is the only path that writes it. Fails with `Stale` if the
    /// task has left CREATED.
    pub fn stop_unqueued(&self, id: TaskId) -> Result<(), TransitionError> {
        let (from, to) = (TaskState::Created, TaskState::Stopped);
        match self.registry.compare_and_update_state(id, from, to) {
            Some(true) => {
                self.notify(id, from, to);
                Ok(())
            }
            Some(false) => {
                let actual = self
                    .registry
                    .state_of(id)
                    .ok_or(TransitionError::NotFound(id))?;
                Err(TransitionError::Stale {
                    id,
                    expected: from,
                    actual,
                })
            }
            None => Err(TransitionError::NotFound(id)),
        }
    }

    fn notify(&self, id: TaskId, from: TaskState, to: TaskState) {
        tracing::debug!(task = id, "{} -> {}", from, to);
        self.events.emit(Event::StateChanged {
            id,
            from,
            to,
            at: SystemTime::now(),
        });
    }

    pub fn valid_transitions(&self, id: TaskId) -> Vec<TaskState> {
        self.registry
            .state_of(id)
            .map(|s| allowed_transitions(s).to_vec())
            .unwrap_or_default()
    }
}
