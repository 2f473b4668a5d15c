use std::sync::Arc;
use std::sync::atomic::AtomicBool;
use std::sync::atomic::Ordering;
use std::time::Duration;

use tokio::sync::mpsc;
use tokio::sync::oneshot;
use tokio::time::Instant;
use tokio_util::sync::CancellationToken;
use tracing::debug;
use tracing::warn;

use super::driver::run_command;
use super::errors::SessionError;
use super::manager::CommandOutput;
use super::process::ProcessControl;
use super::process::ProcessIo;
use super::prompt::PromptMarkers;
use super::session_id::SessionId;

pub(crate) const COMMAND_QUEUE_CAPACITY: usize = 128;

/// One queued command request awaiting its turn on the session worker. The
/// result slot is fulfilled exactly once.
pub(crate) struct PendingCommand {
    pub(crate) command: String,
    pub(crate) submitted_at: Instant,
    pub(crate) result_tx: oneshot::Sender<Result<CommandOutput, SessionError>>,
}

/// The single per-session worker: drains the queue in submission order, one
/// command at a time, and fulfils each request's result slot. Every failure
/// along the way becomes a produced result value; the loop itself ends only
/// on cancellation or queue closure.
pub(crate) struct Worker {
    session_id: SessionId,
    io: ProcessIo,
    process: Arc<ProcessControl>,
    markers: PromptMarkers,
    read_timeout: Duration,
    submission_timeout: Duration,
    active: Arc<AtomicBool>,
}

impl Worker {
    pub(crate) fn new(
        session_id: SessionId,
        io: ProcessIo,
        process: Arc<ProcessControl>,
        markers: PromptMarkers,
        read_timeout: Duration,
        submission_timeout: Duration,
        active: Arc<AtomicBool>,
    ) -> Self {
        Self {
            session_id,
            io,
            process,
            markers,
            read_timeout,
            submission_timeout,
            active,
        }
    }

    pub(crate) async fn run(
        mut self,
        mut queue: mpsc::Receiver<PendingCommand>,
        cancel: CancellationToken,
    ) {
        loop {
            let pending = tokio::select! {
                _ = cancel.cancelled() => break,
                pending = queue.recv() => match pending {
                    Some(pending) => pending,
                    None => break,
                },
            };

            let stale = pending.submitted_at.elapsed() >= self.submission_timeout;
            let result = self.execute(&pending.command).await;
            if pending.result_tx.send(result).is_err() && stale {
                debug!(
                    session_id = %self.session_id,
                    command = %pending.command,
                    "submitter timed out before its command ran; result discarded"
                );
            }
        }

        // Abandon anything still queued so no submitter waits forever.
        queue.close();
        while let Ok(pending) = queue.try_recv() {
            let _ = pending.result_tx.send(Err(SessionError::Terminated {
                session_id: self.session_id,
            }));
        }
    }

    async fn execute(&mut self, command: &str) -> Result<CommandOutput, SessionError> {
        if !self.active.load(Ordering::SeqCst) || self.process.has_exited() {
            self.active.store(false, Ordering::SeqCst);
            return Err(SessionError::Inactive {
                session_id: self.session_id,
            });
        }

        let round_trip = run_command(&mut self.io, &self.markers, command, self.read_timeout)
            .await
            .inspect_err(|_| self.active.store(false, Ordering::SeqCst))?;

        // A timeout against a live process is best-effort partial output; a
        // timeout against a dead one means the stream is about to close.
        if round_trip.saw_eof || (round_trip.timed_out && self.process.has_exited()) {
            self.active.store(false, Ordering::SeqCst);
            warn!(
                session_id = %self.session_id,
                command = %command,
                "debugger process exited during command execution"
            );
        }

        Ok(CommandOutput {
            session_id: self.session_id,
            command: command.to_string(),
            output: round_trip.output,
        })
    }
}
