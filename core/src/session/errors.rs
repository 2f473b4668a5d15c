use thiserror::Error;

use super::session_id::SessionId;

/// Failure taxonomy surfaced to callers. Read-window expiry during a command
/// is deliberately absent: the driver treats it as partial output, not an
/// error, unless the process has also exited.
#[derive(Debug, Error)]
pub enum SessionError {
    #[error("unknown session id {session_id}")]
    NotFound { session_id: SessionId },
    #[error("failed to spawn debugger process: {source}")]
    Spawn {
        #[source]
        source: anyhow::Error,
    },
    #[error("debugger produced no ready prompt within the startup window")]
    StartupTimeout,
    #[error("session {session_id} is not active")]
    Inactive { session_id: SessionId },
    #[error("failed to write to stdin of session {session_id}")]
    WriteToStdin { session_id: SessionId },
    #[error("session {session_id} produced no result within the submission window")]
    Timeout { session_id: SessionId },
    #[error("session {session_id} terminated before the command completed")]
    Terminated { session_id: SessionId },
}

impl SessionError {
    pub(crate) fn spawn(source: anyhow::Error) -> Self {
        Self::Spawn { source }
    }
}
