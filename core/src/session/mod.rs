mod debug_session;
mod driver;
mod errors;
mod manager;
mod process;
mod prompt;
mod serializer;
mod session_id;

pub use errors::SessionError;
pub use manager::CommandOutput;
pub use manager::DebuggerProfile;
pub use manager::SessionManager;
pub use manager::SessionSummary;
pub use manager::StartParams;
pub use manager::StartedSession;
pub use manager::TerminatedSession;
pub use prompt::PromptMarkers;
pub use session_id::SessionId;
