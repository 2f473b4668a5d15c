use std::collections::HashMap;
use std::env;
use std::path::PathBuf;
use std::sync::Arc;
use std::time::Duration;

use serde::Serialize;
use tokio::sync::Mutex;
use tracing::warn;

use super::debug_session::DebugSession;
use super::errors::SessionError;
use super::prompt::PromptMarkers;
use super::session_id::SessionId;

/// How a debugger backend is launched and recognized: the executable, the
/// arguments selecting its line-oriented interface mode, its prompt markers,
/// its quit command, and two windows: one per read-until-prompt step, one on
/// how long a submitter waits for its paired result. Submission-window expiry
/// does not dequeue the request; it still executes in order and the worker
/// discards its unclaimed result.
#[derive(Debug, Clone)]
pub struct DebuggerProfile {
    pub executable: String,
    pub args: Vec<String>,
    pub markers: PromptMarkers,
    pub quit_command: String,
    pub read_timeout: Duration,
    pub submission_timeout: Duration,
}

impl DebuggerProfile {
    /// GDB in machine-interface mode with quiet startup.
    pub fn gdb() -> Self {
        Self {
            executable: "gdb".to_string(),
            args: vec!["--interpreter=mi3".to_string(), "--quiet".to_string()],
            markers: PromptMarkers::gdb(),
            quit_command: "quit".to_string(),
            read_timeout: Duration::from_secs(5),
            submission_timeout: Duration::from_secs(30),
        }
    }
}

impl Default for DebuggerProfile {
    fn default() -> Self {
        Self::gdb()
    }
}

/// Parameters for [`SessionManager::start`]. Unset fields fall back to the
/// profile executable and the host process working directory.
#[derive(Debug, Clone, Default)]
pub struct StartParams {
    pub executable: Option<String>,
    pub working_dir: Option<PathBuf>,
}

#[derive(Debug, Clone, Serialize)]
pub struct StartedSession {
    pub session_id: SessionId,
    pub pid: Option<u32>,
    pub executable: String,
    pub working_dir: PathBuf,
}

#[derive(Debug, Clone, Copy, Serialize)]
pub struct TerminatedSession {
    pub session_id: SessionId,
}

/// Point-in-time view of one registered session. Consistent with some recent
/// state; sessions may transition concurrently with the snapshot.
#[derive(Debug, Clone, Serialize)]
pub struct SessionSummary {
    pub session_id: SessionId,
    pub executable: String,
    pub working_dir: PathBuf,
    pub is_active: bool,
    pub pid: Option<u32>,
}

/// Successful command round trip: the command as submitted plus the raw text
/// the debugger produced for it, stripped of prompt artifacts.
#[derive(Debug, Clone, PartialEq, Eq, Serialize)]
pub struct CommandOutput {
    pub session_id: SessionId,
    pub command: String,
    pub output: String,
}

/// Registry and lifecycle manager for debugger sessions.
///
/// The guarded id-to-session map is the only state shared across concurrent
/// callers; each session's command queue is the only state shared with its
/// worker, and the lock is never held across process I/O.
#[derive(Clone)]
pub struct SessionManager {
    inner: Arc<Inner>,
}

struct Inner {
    profile: DebuggerProfile,
    sessions: Mutex<HashMap<SessionId, Arc<DebugSession>>>,
}

impl SessionManager {
    pub fn new(profile: DebuggerProfile) -> Self {
        Self {
            inner: Arc::new(Inner {
                profile,
                sessions: Mutex::new(HashMap::new()),
            }),
        }
    }

    /// Starts a new debugger session: spawn, wait for the initial ready
    /// prompt, register. Nothing is registered on failure.
    pub async fn start(&self, params: StartParams) -> Result<StartedSession, SessionError> {
        let executable = params
            .executable
            .unwrap_or_else(|| self.inner.profile.executable.clone());
        let working_dir = match params.working_dir {
            Some(dir) => dir,
            None => env::current_dir().map_err(|err| SessionError::spawn(err.into()))?,
        };

        let session_id = SessionId::generate();
        let session =
            DebugSession::start(session_id, &self.inner.profile, executable, working_dir).await?;

        let started = StartedSession {
            session_id,
            pid: session.pid(),
            executable: session.executable().to_string(),
            working_dir: session.working_dir().to_path_buf(),
        };
        self.inner
            .sessions
            .lock()
            .await
            .insert(session_id, session);
        Ok(started)
    }

    /// Terminates and deregisters a session. Removal happens first so no new
    /// submission can reach a session being torn down; an unknown or already
    /// terminated id is a `NotFound`, never a hang.
    pub async fn terminate(&self, session_id: SessionId) -> Result<TerminatedSession, SessionError> {
        let session = self
            .inner
            .sessions
            .lock()
            .await
            .remove(&session_id)
            .ok_or(SessionError::NotFound { session_id })?;
        session.terminate().await;
        Ok(TerminatedSession { session_id })
    }

    /// Snapshot of all registered sessions, ordered by id.
    pub async fn list(&self) -> Vec<SessionSummary> {
        let sessions = {
            let guard = self.inner.sessions.lock().await;
            guard.values().cloned().collect::<Vec<_>>()
        };
        let mut summaries: Vec<SessionSummary> =
            sessions.iter().map(|session| session.summary()).collect();
        summaries.sort_by_key(|summary| summary.session_id);
        summaries
    }

    /// Submits a command to a session's serializer and waits for its result.
    pub async fn execute(
        &self,
        session_id: SessionId,
        command: &str,
    ) -> Result<CommandOutput, SessionError> {
        let session = {
            let guard = self.inner.sessions.lock().await;
            guard.get(&session_id).cloned()
        }
        .ok_or(SessionError::NotFound { session_id })?;
        session.submit(command).await
    }

    /// Terminates every registered session, best-effort. For host teardown.
    pub async fn shutdown(&self) {
        let ids: Vec<SessionId> = {
            let guard = self.inner.sessions.lock().await;
            guard.keys().copied().collect()
        };
        for session_id in ids {
            if let Err(err) = self.terminate(session_id).await {
                warn!(
                    session_id = %session_id,
                    error = %err,
                    "failed to terminate session during shutdown"
                );
            }
        }
    }
}

impl Default for SessionManager {
    fn default() -> Self {
        Self::new(DebuggerProfile::gdb())
    }
}
