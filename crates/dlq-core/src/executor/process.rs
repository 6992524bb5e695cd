//! [`Executor`] that runs the external downloader as a child process.

use anyhow::{anyhow, bail, Context, Result};
use async_trait::async_trait;
use std::path::PathBuf;
use std::process::{ExitStatus, Stdio};
use std::sync::{Arc, Mutex, MutexGuard, PoisonError};
use std::time::{Duration, Instant};
use tokio::io::{AsyncBufReadExt, AsyncRead, AsyncReadExt, BufReader};
use tokio::process::{Child, Command};
use tokio::sync::oneshot;

use super::args::build_download_args;
use super::handle::ProcessHandle;
use super::preflight::{self, PreflightOutcome};
use super::progress::{parse_percent, ProgressThrottle};
use super::Executor;
use crate::config::{DlqConfig, ProgressConfig};
use crate::events::{Event, EventBus};
use crate::registry::{TaskId, TaskRegistry, TaskState};
use crate::state_machine::StateMachine;

/// Stderr fragments that mean the downloader itself is out of date.
const OUTDATED_MARKERS: [&str; 4] = [
    "Signature extraction failed",
    "HTTP Error 403",
    "SSAP",
    "downloaded file is empty",
];

const OUTDATED_HINT: &str =
    "the site rejected the downloader; update it (e.g. `yt-dlp -U`) and try again";

#[derive(Debug, Clone)]
pub struct ProcessExecutorOptions {
    /// Downloader program, looked up on `PATH` unless absolute.
    pub program: String,
    pub ffmpeg_path: Option<PathBuf>,
    /// Time between SIGTERM and a hard kill on cancel.
    pub cancel_grace: Duration,
    pub progress: ProgressConfig,
}

impl Default for ProcessExecutorOptions {
    fn default() -> Self {
        Self {
            program: "yt-dlp".to_string(),
            ffmpeg_path: None,
            cancel_grace: Duration::from_secs(3),
            progress: ProgressConfig::default(),
        }
    }
}

impl ProcessExecutorOptions {
    pub fn from_config(cfg: &DlqConfig) -> Self {
        Self {
            program: cfg.downloader_program.clone(),
            ffmpeg_path: cfg.ffmpeg_path.clone(),
            cancel_grace: Duration::from_secs(cfg.cancel_grace_secs),
            progress: cfg.progress.clone().unwrap_or_default(),
        }
    }
}

pub struct ProcessExecutor {
    registry: Arc<TaskRegistry>,
    state_machine: StateMachine,
    events: EventBus,
    options: ProcessExecutorOptions,
    throttle: Mutex<ProgressThrottle>,
}

impl ProcessExecutor {
    pub fn new(state_machine: StateMachine, events: EventBus, options: ProcessExecutorOptions) -> Self {
        let throttle = ProgressThrottle::from_config(&options.progress);
        Self {
            registry: Arc::clone(state_machine.registry()),
            state_machine,
            events,
            options,
            throttle: Mutex::new(throttle),
        }
    }

    fn throttle(&self) -> MutexGuard<'_, ProgressThrottle> {
        self.throttle.lock().unwrap_or_else(PoisonError::into_inner)
    }

    async fn run(&self, id: TaskId) -> Result<()> {
        let task = self
            .registry
            .get(id)
            .ok_or_else(|| anyhow!("task {} not found", id))?;

        if let PreflightOutcome::AlreadyExists(path) = preflight::check(&self.registry, &task)? {
            tracing::info!(task = id, "already downloaded: {}", path.display());
            self.events.emit(Event::Progress { id, percent: 100.0 });
            self.state_machine.transition(id, TaskState::AlreadyExists)?;
            return Ok(());
        }

        let args = build_download_args(
            &task.source,
            task.metadata.is_playlist,
            self.options.ffmpeg_path.as_deref(),
        );
        tracing::debug!(task = id, "spawning {} {:?}", self.options.program, args);
        let mut child = Command::new(&self.options.program)
            .args(&args)
            .current_dir(&task.destination)
            .stdin(Stdio::null())
            .stdout(Stdio::piped())
            .stderr(Stdio::piped())
            .kill_on_drop(true)
            .spawn()
            .with_context(|| format!("failed to start {}", self.options.program))?;

        let (handle, term_rx) = ProcessHandle::new(child.id());
        self.registry.set_execution_handle(id, Some(Box::new(handle)));
        // A cancel that landed before the handle was attached found nothing
        // to signal.
        if self.registry.state_of(id) == Some(TaskState::Cancelling) {
            self.registry.terminate_execution(id);
        }

        let stdout = child.stdout.take();
        let stderr = child.stderr.take();
        let (_, stderr_text, status) = tokio::join!(
            self.pump_stdout(id, stdout),
            read_all(stderr),
            wait_with_grace(&mut child, term_rx, self.options.cancel_grace),
        );
        self.throttle().forget(id);
        self.registry.set_execution_handle(id, None);
        let status = status.context("waiting for downloader")?;

        if status.success() {
            self.events.emit(Event::Progress { id, percent: 100.0 });
            return Ok(());
        }
        if self.registry.state_of(id) == Some(TaskState::Cancelling) {
            tracing::debug!(task = id, "downloader stopped by cancel ({})", status);
            return Ok(());
        }
        bail!(describe_failure(&stderr_text, status))
    }

    async fn pump_stdout<R>(&self, id: TaskId, stdout: Option<R>)
    where
        R: AsyncRead + Unpin,
    {
        let Some(stdout) = stdout else { return };
        let mut lines = BufReader::new(stdout).lines();
        loop {
            match lines.next_line().await {
                Ok(Some(line)) => {
                    if let Some(percent) = parse_percent(&line) {
                        if self.throttle().should_report(id, percent, Instant::now()) {
                            self.events.emit(Event::Progress { id, percent });
                        }
                    }
                    self.events.emit(Event::Output { id, line });
                }
                Ok(None) => break,
                Err(e) => {
                    tracing::debug!(task = id, "stdout read: {}", e);
                    break;
                }
            }
        }
    }
}

#[async_trait]
impl Executor for ProcessExecutor {
    async fn execute(&self, id: TaskId) -> Result<()> {
        let outcome = self.run(id).await;
        if let Err(e) = &outcome {
            self.events.emit(Event::Error {
                id,
                message: format!("{:#}", e),
            });
        }
        outcome
    }

    fn cancel(&self, id: TaskId) -> bool {
        self.throttle().forget(id);
        self.registry.terminate_execution(id)
    }
}

async fn read_all<R>(stream: Option<R>) -> String
where
    R: AsyncRead + Unpin,
{
    let mut out = String::new();
    if let Some(mut stream) = stream {
        if let Err(e) = stream.read_to_string(&mut out).await {
            tracing::debug!("stderr read: {}", e);
        }
    }
    out
}

/// Wait for the child. Once the handle fires, give it `grace` to exit after
/// SIGTERM before killing it outright.
async fn wait_with_grace(
    child: &mut Child,
    term_rx: oneshot::Receiver<()>,
    grace: Duration,
) -> std::io::Result<ExitStatus> {
    let terminated = tokio::select! {
        status = child.wait() => return status,
        signal = term_rx => signal.is_ok(),
    };
    if !terminated {
        return child.wait().await;
    }
    match tokio::time::timeout(grace, child.wait()).await {
        Ok(status) => status,
        Err(_) => {
            tracing::warn!("downloader ignored SIGTERM for {:?}; killing", grace);
            child.start_kill()?;
            child.wait().await
        }
    }
}

/// Error message for a failed run.
fn describe_failure(stderr: &str, status: ExitStatus) -> String {
    if OUTDATED_MARKERS.iter().any(|m| stderr.contains(m)) {
        return OUTDATED_HINT.to_string();
    }
    let stderr = stderr.trim();
    if !stderr.is_empty() {
        return stderr.to_string();
    }
    match status.code() {
        Some(code) => format!("process exited with code {}", code),
        None => "process terminated by a signal".to_string(),
    }
}
