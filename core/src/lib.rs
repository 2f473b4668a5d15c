//! Session management core for remote, tool-call-style access to an
//! interactive command-line debugger.
//!
//! One [`SessionManager`] owns any number of debugger sessions. Each session
//! wraps a single interactive child process behind a FIFO command serializer:
//! concurrent callers submit command strings, a dedicated worker applies them
//! one at a time, and a prompt/pager protocol driver assembles the raw text
//! the debugger produced for each round trip.
//!
//! The dispatch layer that maps named remote operations onto this crate, and
//! the transport that exposes them to a remote caller, live outside: they
//! call [`SessionManager::start`], [`SessionManager::execute`],
//! [`SessionManager::list`] and [`SessionManager::terminate`] with validated
//! arguments and forward the structured results unchanged.

mod session;

pub use session::CommandOutput;
pub use session::DebuggerProfile;
pub use session::PromptMarkers;
pub use session::SessionError;
pub use session::SessionId;
pub use session::SessionManager;
pub use session::SessionSummary;
pub use session::StartParams;
pub use session::StartedSession;
pub use session::TerminatedSession;
