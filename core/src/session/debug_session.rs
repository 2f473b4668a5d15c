use std::path::Path;
use std::path::PathBuf;
use std::sync::Arc;
use std::sync::atomic::AtomicBool;
use std::sync::atomic::Ordering;
use std::time::Duration;

use tokio::sync::Mutex;
use tokio::sync::mpsc;
use tokio::sync::oneshot;
use tokio::task::JoinHandle;
use tokio::time::Instant;
use tokio_util::sync::CancellationToken;
use tracing::info;
use tracing::warn;

use super::errors::SessionError;
use super::manager::CommandOutput;
use super::manager::DebuggerProfile;
use super::manager::SessionSummary;
use super::process::ProcessControl;
use super::process::ReadEvent;
use super::process::spawn_debugger;
use super::serializer::COMMAND_QUEUE_CAPACITY;
use super::serializer::PendingCommand;
use super::serializer::Worker;
use super::session_id::SessionId;

/// Window granted to the debugger to print its first ready prompt.
const STARTUP_PROMPT_TIMEOUT: Duration = Duration::from_secs(10);
/// Window granted to a graceful quit before the process is killed.
const QUIT_GRACE_TIMEOUT: Duration = Duration::from_secs(5);

/// One managed debugger session: the spawned process, its FIFO command queue
/// and the single worker draining it. The registry holds these behind `Arc`;
/// lifetime is governed by explicit start/terminate, not registry membership.
pub(crate) struct DebugSession {
    session_id: SessionId,
    executable: String,
    working_dir: PathBuf,
    quit_command: String,
    submission_timeout: Duration,
    process: Arc<ProcessControl>,
    commands_tx: mpsc::Sender<PendingCommand>,
    active: Arc<AtomicBool>,
    cancel: CancellationToken,
    worker: Mutex<Option<JoinHandle<()>>>,
}

impl DebugSession {
    /// Spawns the debugger, waits for its initial ready prompt and starts the
    /// serializer worker. On any failure nothing is left running.
    pub(crate) async fn start(
        session_id: SessionId,
        profile: &DebuggerProfile,
        executable: String,
        working_dir: PathBuf,
    ) -> Result<Arc<Self>, SessionError> {
        let (control, mut io) =
            spawn_debugger(session_id, &executable, &profile.args, &working_dir)?;
        let process = Arc::new(control);

        let deadline = Instant::now() + STARTUP_PROMPT_TIMEOUT;
        loop {
            let remaining = deadline.saturating_duration_since(Instant::now());
            match io.read_until(&profile.markers, remaining).await {
                ReadEvent::Ready(_) => break,
                ReadEvent::Pager(_) => {
                    if let Err(err) = io.write_newline().await {
                        process.kill();
                        return Err(err);
                    }
                }
                ReadEvent::TimedOut(_) => {
                    process.kill();
                    return Err(SessionError::StartupTimeout);
                }
                ReadEvent::Eof(_) => {
                    process.kill();
                    return Err(SessionError::spawn(anyhow::anyhow!(
                        "debugger process exited before producing a prompt"
                    )));
                }
            }
        }

        let active = Arc::new(AtomicBool::new(true));
        let cancel = CancellationToken::new();
        let (commands_tx, commands_rx) = mpsc::channel(COMMAND_QUEUE_CAPACITY);

        let worker = Worker::new(
            session_id,
            io,
            process.clone(),
            profile.markers.clone(),
            profile.read_timeout,
            profile.submission_timeout,
            active.clone(),
        );
        let handle = tokio::spawn(worker.run(commands_rx, cancel.clone()));

        info!(
            session_id = %session_id,
            pid = ?process.pid(),
            executable = %executable,
            "debugger session started"
        );

        Ok(Arc::new(Self {
            session_id,
            executable,
            working_dir,
            quit_command: profile.quit_command.clone(),
            submission_timeout: profile.submission_timeout,
            process,
            commands_tx,
            active,
            cancel,
            worker: Mutex::new(Some(handle)),
        }))
    }

    pub(crate) fn is_active(&self) -> bool {
        self.active.load(Ordering::SeqCst)
    }

    pub(crate) fn pid(&self) -> Option<u32> {
        if self.process.has_exited() {
            None
        } else {
            self.process.pid()
        }
    }

    pub(crate) fn executable(&self) -> &str {
        &self.executable
    }

    pub(crate) fn working_dir(&self) -> &Path {
        &self.working_dir
    }

    pub(crate) fn summary(&self) -> SessionSummary {
        SessionSummary {
            session_id: self.session_id,
            executable: self.executable.clone(),
            working_dir: self.working_dir.clone(),
            is_active: self.is_active(),
            pid: self.pid(),
        }
    }

    /// Enqueues a command and waits for its paired result. The queue entry
    /// outlives a submission timeout: the command still executes in order and
    /// the worker discards its fulfilment.
    pub(crate) async fn submit(&self, command: &str) -> Result<CommandOutput, SessionError> {
        if !self.is_active() {
            return Err(SessionError::Inactive {
                session_id: self.session_id,
            });
        }

        let (result_tx, result_rx) = oneshot::channel();
        let pending = PendingCommand {
            command: command.to_string(),
            submitted_at: Instant::now(),
            result_tx,
        };
        if self.commands_tx.send(pending).await.is_err() {
            return Err(SessionError::Terminated {
                session_id: self.session_id,
            });
        }

        match tokio::time::timeout(self.submission_timeout, result_rx).await {
            Ok(Ok(result)) => result,
            Ok(Err(_)) => Err(SessionError::Terminated {
                session_id: self.session_id,
            }),
            Err(_) => Err(SessionError::Timeout {
                session_id: self.session_id,
            }),
        }
    }

    /// Shuts the session down: no new submissions, worker cancelled, graceful
    /// quit with a bounded wait, forced kill as the fallback. Best-effort and
    /// safe to call in any state.
    pub(crate) async fn terminate(&self) {
        self.active.store(false, Ordering::SeqCst);
        self.cancel.cancel();

        if !self.process.has_exited() {
            let quit_sent = self.process.send_line(&self.quit_command).await.is_ok();
            if !quit_sent || !self.process.wait_exited(QUIT_GRACE_TIMEOUT).await {
                warn!(
                    session_id = %self.session_id,
                    "debugger ignored graceful quit; killing process"
                );
                self.process.kill();
            }
        }

        if let Some(handle) = self.worker.lock().await.take() {
            let _ = handle.await;
        }

        info!(session_id = %self.session_id, "debugger session terminated");
    }
}
