//! Execution collaborator: runs one task's job to completion.
//!
//! The scheduler only knows the [`Executor`] trait. [`ProcessExecutor`] is
//! the production implementation that drives an external downloader
//! (yt-dlp by default) in the task's destination directory.

mod args;
mod handle;
mod preflight;
mod process;
mod progress;

use async_trait::async_trait;

use crate::registry::TaskId;

pub use args::{build_download_args, OUTPUT_TEMPLATE};
pub use handle::ProcessHandle;
pub use preflight::{predict_filename, PreflightOutcome};
pub use process::{ProcessExecutor, ProcessExecutorOptions};
pub use progress::{parse_percent, ProgressThrottle};

/// Runs jobs on behalf of the scheduler.
///
/// `execute` resolves once the job is over. It may settle the task itself
/// (e.g. DOWNLOADING -> ALREADY_EXISTS); the scheduler does not override a
/// terminal state it finds afterwards. The implementation attaches and
/// detaches the task's execution handle through the registry and reports
/// progress as [`Event::Progress`](crate::events::Event::Progress).
#[async_trait]
pub trait Executor: Send + Sync {
    /// Run the job for `id`. An `Err` is recorded as the task's error.
    async fn execute(&self, id: TaskId) -> anyhow::Result<()>;

    /// Best-effort termination of the running job. Returns whether a
    /// termination signal was actually sent.
    fn cancel(&self, id: TaskId) -> bool;
}
