//! Dispatch loop: fill free slots with queued tasks, group by group.

use std::sync::atomic::Ordering;
use std::sync::Arc;

use crate::registry::{TaskId, TaskState};

use super::Scheduler;

impl Scheduler {
    /// Run dispatch passes until no more progress can be made.
    ///
    /// At most one pass runs at a time. A call that arrives while a pass is
    /// running returns immediately after flagging a re-drive, and the running
    /// caller loops once more, so requests are coalesced but never lost.
    pub async fn process_queue(self: &Arc<Self>) {
        self.dispatch_pending.store(true, Ordering::SeqCst);
        if self.dispatch_running.swap(true, Ordering::SeqCst) {
            return;
        }
        loop {
            self.dispatch_pending.store(false, Ordering::SeqCst);
            self.dispatch_pass().await;
            self.dispatch_running.store(false, Ordering::SeqCst);
            if !self.dispatch_pending.load(Ordering::SeqCst)
                || self.dispatch_running.swap(true, Ordering::SeqCst)
            {
                break;
            }
        }
    }

    /// Schedule `process_queue` on the current tokio runtime.
    pub fn request_dispatch(self: &Arc<Self>) {
        match tokio::runtime::Handle::try_current() {
            Ok(handle) => {
                let this = Arc::clone(self);
                handle.spawn(async move { this.process_queue().await });
            }
            Err(_) => tracing::warn!("no tokio runtime; dispatch deferred until next re-drive"),
        }
    }

    async fn dispatch_pass(self: &Arc<Self>) {
        loop {
            if self.gate.available() == 0 {
                break;
            }
            let Some(id) = self.next_queued_task() else {
                break;
            };
            self.gate.acquire().await;
            if let Err(err) = self.state_machine.transition(id, TaskState::Downloading) {
                // Cancelled or evicted since the scan.
                tracing::debug!(task = id, "not dispatched: {}", err);
                self.gate.release();
                continue;
            }
            tracing::info!(task = id, "dispatched");
            self.start_download(id);
        }
    }

    fn next_queued_task(&self) -> Option<TaskId> {
        self.groups().next_queued(&self.registry)
    }
}
