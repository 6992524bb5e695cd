//! Job launch and completion: settle the final state, release the slot,
//! and re-drive dispatch.

use std::sync::Arc;

use crate::events::Event;
use crate::registry::{TaskId, TaskState};
use crate::state_machine::TransitionError;

use super::Scheduler;

impl Scheduler {
    /// Hand a DOWNLOADING task to the executor on its own task. The slot
    /// taken by dispatch is released when the job settles, whatever the outcome.
    pub(super) fn start_download(self: &Arc<Self>, id: TaskId) {
        let this = Arc::clone(self);
        tokio::spawn(async move {
            let executor = Arc::clone(&this.executor);
            // Inner task so a panicking executor still gives the slot back.
            let outcome = match tokio::spawn(async move { executor.execute(id).await }).await {
                Ok(outcome) => outcome,
                Err(e) => Err(anyhow::anyhow!("execution task join: {}", e)),
            };
            this.finish(id, outcome);
        });
    }

    fn finish(self: &Arc<Self>, id: TaskId, outcome: anyhow::Result<()>) {
        let error = outcome.err().map(|e| format!("{:#}", e));
        self.settle(id, error.as_deref());
        self.gate.release();
        self.events.emit(Event::Finished { id });
        if self.groups().release_if_drained(&self.registry) {
            tracing::debug!(task = id, "current group drained on completion");
        }
        self.request_dispatch();
    }

    /// Move the task to its terminal state for this outcome.
    ///
    /// Success: DOWNLOADING -> COMPLETED, CANCELLING -> STOPPED; a state the
    /// executor already settled (ALREADY_EXISTS) is left alone.
    /// Failure: CANCELLING -> STOPPED (cancellation wins); otherwise the error
    /// is recorded and the task goes to ERROR.
    fn settle(&self, id: TaskId, error: Option<&str>) {
        loop {
            let Some(state) = self.registry.state_of(id) else {
                tracing::debug!(task = id, "finished after eviction");
                return;
            };
            let target = match (state, error) {
                (TaskState::Cancelling, _) => TaskState::Stopped,
                (TaskState::Downloading, None) => TaskState::Completed,
                (TaskState::Downloading, Some(message)) => {
                    self.registry.set_error(id, message);
                    TaskState::Error
                }
                (other, _) => {
                    if !other.is_terminal() {
                        tracing::warn!(task = id, "job returned while task is {}", other);
                    }
                    return;
                }
            };
            match self.state_machine.transition_from(id, state, target) {
                Ok(()) => {
                    match error {
                        Some(message) if target == TaskState::Error => {
                            tracing::warn!(task = id, "failed: {}", message)
                        }
                        _ => tracing::info!(task = id, "{}", target),
                    }
                    return;
                }
                // A cancel landed between the read and the write.
                Err(TransitionError::Stale { .. }) => continue,
                Err(err) => {
                    tracing::debug!(task = id, "settle: {}", err);
                    return;
                }
            }
        }
    }
}
