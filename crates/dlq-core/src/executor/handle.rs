//! Handle to a running downloader process, stored in the registry.

use tokio::sync::oneshot;

use crate::registry::ExecutionHandle;

/// Terminates a child process: SIGTERM first, then the runner escalates to a
/// hard kill once the grace period elapses.
#[derive(Debug)]
pub struct ProcessHandle {
    pid: Option<u32>,
    escalate: Option<oneshot::Sender<()>>,
}

impl ProcessHandle {
    /// Handle for `pid`, plus the receiver the runner watches to start its
    /// grace timer.
    pub fn new(pid: Option<u32>) -> (Self, oneshot::Receiver<()>) {
        let (tx, rx) = oneshot::channel();
        (
            Self {
                pid,
                escalate: Some(tx),
            },
            rx,
        )
    }
}

impl ExecutionHandle for ProcessHandle {
    fn terminate(&mut self) -> bool {
        let signalled = self.pid.is_some_and(send_sigterm);
        let escalated = self
            .escalate
            .take()
            .is_some_and(|tx| tx.send(()).is_ok());
        signalled || escalated
    }
}

#[cfg(unix)]
fn send_sigterm(pid: u32) -> bool {
    let Ok(pid) = libc::pid_t::try_from(pid) else {
        return false;
    };
    // SAFETY: kill(2) has no memory effects; a stale pid yields ESRCH.
    unsafe { libc::kill(pid, libc::SIGTERM) == 0 }
}

#[cfg(not(unix))]
fn send_sigterm(_pid: u32) -> bool {
    false
}
