use std::time::Duration;

use super::errors::SessionError;
use super::process::ProcessIo;
use super::process::ReadEvent;
use super::prompt::PromptMarkers;

/// Result of one command round trip against the debugger prompt.
#[derive(Debug, PartialEq, Eq)]
pub(crate) struct RoundTrip {
    /// Output fragments joined and stripped of prompt artifacts.
    pub(crate) output: String,
    /// The final read expired without a prompt; `output` is best-effort
    /// partial output. The caller decides whether the process also died.
    pub(crate) timed_out: bool,
    /// The output stream closed while reading; the process is gone.
    pub(crate) saw_eof: bool,
}

/// Drives one command through the prompt/pager protocol: write the line, then
/// read until the ready prompt, acknowledging pager pages as they appear so
/// unbounded pages all drain into the result. A read timeout ends the round
/// trip with whatever partial output was captured; some commands legitimately
/// produce no further prompt within the window. End of stream keeps only the
/// fragments already closed by a prompt or pager boundary; the unterminated
/// tail is discarded.
pub(crate) async fn run_command(
    io: &mut ProcessIo,
    markers: &PromptMarkers,
    command: &str,
    read_timeout: Duration,
) -> Result<RoundTrip, SessionError> {
    io.write_line(command).await?;

    let mut fragments: Vec<String> = Vec::new();
    let mut timed_out = false;
    let mut saw_eof = false;
    loop {
        match io.read_until(markers, read_timeout).await {
            ReadEvent::Ready(before) => {
                fragments.push(before);
                break;
            }
            ReadEvent::Pager(before) => {
                fragments.push(before);
                io.write_newline().await?;
            }
            ReadEvent::TimedOut(before) => {
                fragments.push(before);
                timed_out = true;
                break;
            }
            ReadEvent::Eof(_) => {
                saw_eof = true;
                break;
            }
        }
    }

    let output = fragments
        .iter()
        .map(String::as_str)
        .filter(|fragment| !fragment.is_empty())
        .collect::<Vec<_>>()
        .join("\n")
        .trim()
        .to_string();

    Ok(RoundTrip {
        output,
        timed_out,
        saw_eof,
    })
}
