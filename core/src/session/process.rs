use std::io::ErrorKind;
use std::io::Read;
use std::path::Path;
use std::sync::Arc;
use std::sync::Mutex as StdMutex;
use std::sync::atomic::AtomicBool;
use std::sync::atomic::Ordering;
use std::time::Duration;

use portable_pty::ChildKiller;
use portable_pty::CommandBuilder;
use portable_pty::PtySize;
use portable_pty::native_pty_system;
use tokio::sync::Notify;
use tokio::sync::mpsc;
use tokio::task::JoinHandle;
use tokio::time::Instant;
use tokio::time::sleep;

use super::errors::SessionError;
use super::prompt::MarkerKind;
use super::prompt::PromptMarkers;
use super::session_id::SessionId;

/// Outcome of one `read_until` call: which boundary ended the read, carrying
/// all text consumed before it.
#[derive(Debug, Clone, PartialEq, Eq)]
pub(crate) enum ReadEvent {
    Ready(String),
    Pager(String),
    TimedOut(String),
    Eof(String),
}

/// Shared control half of a spawned debugger process. Stdin writes, liveness
/// checks and termination are safe from any task; reading output stays with
/// the worker-owned [`ProcessIo`].
pub(crate) struct ProcessControl {
    session_id: SessionId,
    pid: Option<u32>,
    writer_tx: mpsc::Sender<Vec<u8>>,
    killer: StdMutex<Box<dyn ChildKiller + Send + Sync>>,
    exited: Arc<AtomicBool>,
    exit_notify: Arc<Notify>,
    reader_handle: JoinHandle<()>,
    writer_handle: JoinHandle<()>,
    wait_handle: JoinHandle<()>,
}

impl ProcessControl {
    pub(crate) fn pid(&self) -> Option<u32> {
        self.pid
    }

    pub(crate) fn has_exited(&self) -> bool {
        self.exited.load(Ordering::SeqCst)
    }

    /// Writes `text` plus a line terminator to the child's input stream.
    pub(crate) async fn send_line(&self, text: &str) -> Result<(), SessionError> {
        let mut bytes = text.as_bytes().to_vec();
        bytes.push(b'\n');
        self.writer_tx
            .send(bytes)
            .await
            .map_err(|_| SessionError::WriteToStdin {
                session_id: self.session_id,
            })
    }

    /// Forced kill. Graceful termination is a quit command followed by
    /// [`ProcessControl::wait_exited`]; this is the fallback.
    pub(crate) fn kill(&self) {
        if let Ok(mut killer) = self.killer.lock() {
            let _ = killer.kill();
        }
    }

    /// Waits up to `timeout` for the child to exit; true when it did.
    pub(crate) async fn wait_exited(&self, timeout: Duration) -> bool {
        let deadline = Instant::now() + timeout;
        loop {
            let notified = self.exit_notify.notified();
            tokio::pin!(notified);
            if self.has_exited() {
                return true;
            }
            let remaining = deadline.saturating_duration_since(Instant::now());
            if remaining == Duration::ZERO {
                return false;
            }
            tokio::select! {
                _ = &mut notified => {}
                _ = sleep(remaining) => {}
            }
        }
    }
}

impl Drop for ProcessControl {
    fn drop(&mut self) {
        self.reader_handle.abort();
        self.writer_handle.abort();
        self.wait_handle.abort();
    }
}

/// Worker-owned I/O half: the output stream plus the accumulation buffer the
/// marker scanner runs over. Exactly one task reads from it, so output that
/// arrives between reads is buffered, never lost.
pub(crate) struct ProcessIo {
    session_id: SessionId,
    output_rx: mpsc::UnboundedReceiver<Vec<u8>>,
    writer_tx: mpsc::Sender<Vec<u8>>,
    buffer: String,
}

impl ProcessIo {
    pub(crate) fn new(
        session_id: SessionId,
        output_rx: mpsc::UnboundedReceiver<Vec<u8>>,
        writer_tx: mpsc::Sender<Vec<u8>>,
    ) -> Self {
        Self {
            session_id,
            output_rx,
            writer_tx,
            buffer: String::new(),
        }
    }

    pub(crate) async fn write_line(&self, text: &str) -> Result<(), SessionError> {
        let mut bytes = text.as_bytes().to_vec();
        bytes.push(b'\n');
        self.writer_tx
            .send(bytes)
            .await
            .map_err(|_| SessionError::WriteToStdin {
                session_id: self.session_id,
            })
    }

    /// Sends a bare newline, acknowledging one pager page.
    pub(crate) async fn write_newline(&self) -> Result<(), SessionError> {
        self.writer_tx
            .send(vec![b'\n'])
            .await
            .map_err(|_| SessionError::WriteToStdin {
                session_id: self.session_id,
            })
    }

    /// Reads until one of `markers` appears, `timeout` elapses, or the stream
    /// closes. The matched marker text itself is removed from the buffer;
    /// anything after it stays buffered for the next read.
    pub(crate) async fn read_until(
        &mut self,
        markers: &PromptMarkers,
        timeout: Duration,
    ) -> ReadEvent {
        let deadline = Instant::now() + timeout;
        loop {
            if let Some(marker) = markers.scan(&self.buffer) {
                let before = self.buffer[..marker.start].to_string();
                self.buffer.drain(..marker.end);
                return match marker.kind {
                    MarkerKind::Ready => ReadEvent::Ready(before),
                    MarkerKind::Pager => ReadEvent::Pager(before),
                };
            }

            let remaining = deadline.saturating_duration_since(Instant::now());
            if remaining == Duration::ZERO {
                return ReadEvent::TimedOut(std::mem::take(&mut self.buffer));
            }
            match tokio::time::timeout(remaining, self.output_rx.recv()).await {
                Ok(Some(chunk)) => self.buffer.push_str(&String::from_utf8_lossy(&chunk)),
                Ok(None) => return ReadEvent::Eof(std::mem::take(&mut self.buffer)),
                Err(_) => return ReadEvent::TimedOut(std::mem::take(&mut self.buffer)),
            }
        }
    }
}

/// Launches the debugger over a PTY pair. The interactive prompt and pager
/// only appear on a real terminal, so a plain pipe pair is not enough.
pub(crate) fn spawn_debugger(
    session_id: SessionId,
    executable: &str,
    args: &[String],
    working_dir: &Path,
) -> Result<(ProcessControl, ProcessIo), SessionError> {
    let pty_system = native_pty_system();
    let pair = pty_system
        .openpty(PtySize {
            rows: 24,
            cols: 80,
            pixel_width: 0,
            pixel_height: 0,
        })
        .map_err(SessionError::spawn)?;

    let mut command_builder = CommandBuilder::new(executable);
    for arg in args {
        command_builder.arg(arg);
    }
    command_builder.cwd(working_dir);

    let mut child = pair
        .slave
        .spawn_command(command_builder)
        .map_err(SessionError::spawn)?;
    let killer = child.clone_killer();
    let pid = child.process_id();

    let (writer_tx, mut writer_rx) = mpsc::channel::<Vec<u8>>(128);
    let (output_tx, output_rx) = mpsc::unbounded_channel::<Vec<u8>>();

    let mut reader = pair
        .master
        .try_clone_reader()
        .map_err(SessionError::spawn)?;
    let reader_handle = tokio::task::spawn_blocking(move || {
        let mut buf = [0u8; 8192];
        loop {
            match reader.read(&mut buf) {
                Ok(0) => break,
                Ok(n) => {
                    if output_tx.send(buf[..n].to_vec()).is_err() {
                        break;
                    }
                }
                Err(ref e) if e.kind() == ErrorKind::Interrupted => continue,
                Err(ref e) if e.kind() == ErrorKind::WouldBlock => {
                    std::thread::sleep(Duration::from_millis(5));
                    continue;
                }
                Err(_) => break,
            }
        }
    });

    let writer = pair.master.take_writer().map_err(SessionError::spawn)?;
    let writer = Arc::new(StdMutex::new(writer));
    let writer_handle = tokio::spawn({
        let writer = writer.clone();
        async move {
            while let Some(bytes) = writer_rx.recv().await {
                let writer = writer.clone();
                let _ = tokio::task::spawn_blocking(move || {
                    if let Ok(mut guard) = writer.lock() {
                        use std::io::Write;
                        let _ = guard.write_all(&bytes);
                        let _ = guard.flush();
                    }
                })
                .await;
            }
        }
    });

    let exited = Arc::new(AtomicBool::new(false));
    let exit_notify = Arc::new(Notify::new());
    let wait_exited = exited.clone();
    let wait_notify = exit_notify.clone();
    let wait_handle = tokio::task::spawn_blocking(move || {
        let _ = child.wait();
        wait_exited.store(true, Ordering::SeqCst);
        wait_notify.notify_waiters();
    });

    let control = ProcessControl {
        session_id,
        pid,
        writer_tx: writer_tx.clone(),
        killer: StdMutex::new(killer),
        exited,
        exit_notify,
        reader_handle,
        writer_handle,
        wait_handle,
    };
    let io = ProcessIo::new(session_id, output_rx, writer_tx);
    Ok((control, io))
}

#[cfg(test)]
mod tests {
    use super::*;

    fn io_pair() -> (
        ProcessIo,
        mpsc::UnboundedSender<Vec<u8>>,
        mpsc::Receiver<Vec<u8>>,
    ) {
        let (output_tx, output_rx) = mpsc::unbounded_channel();
        let (writer_tx, writer_rx) = mpsc::channel(128);
        (
            ProcessIo::new(SessionId::generate(), output_rx, writer_tx),
            output_tx,
            writer_rx,
        )
    }

    fn push(tx: &mpsc::UnboundedSender<Vec<u8>>, bytes: &[u8]) {
        if tx.send(bytes.to_vec()).is_err() {
            panic!("output channel closed");
        }
    }

    #[tokio::test]
    async fn read_until_returns_text_before_ready_prompt() {
        let (mut io, output_tx, _writer_rx) = io_pair();
        push(&output_tx, b"GNU gdb 13.2\n(gdb) ");

        let event = io
            .read_until(&PromptMarkers::gdb(), Duration::from_secs(1))
            .await;
        assert_eq!(event, ReadEvent::Ready("GNU gdb 13.2\n".to_string()));
    }

    #[tokio::test]
    async fn read_until_keeps_text_after_the_marker_buffered() {
        let (mut io, output_tx, _writer_rx) = io_pair();
        push(&output_tx, b"(gdb) leftover\n(gdb) ");

        let markers = PromptMarkers::gdb();
        let first = io.read_until(&markers, Duration::from_secs(1)).await;
        assert_eq!(first, ReadEvent::Ready(String::new()));

        let second = io.read_until(&markers, Duration::from_secs(1)).await;
        assert_eq!(second, ReadEvent::Ready(" leftover\n".to_string()));
    }

    #[tokio::test]
    async fn read_until_reports_timeout_with_partial_text() {
        let (mut io, output_tx, _writer_rx) = io_pair();
        push(&output_tx, b"still running");

        let event = io
            .read_until(&PromptMarkers::gdb(), Duration::from_millis(50))
            .await;
        assert_eq!(event, ReadEvent::TimedOut("still running".to_string()));
    }

    #[tokio::test]
    async fn read_until_reports_end_of_stream() {
        let (mut io, output_tx, _writer_rx) = io_pair();
        push(&output_tx, b"tail");
        drop(output_tx);

        let event = io
            .read_until(&PromptMarkers::gdb(), Duration::from_secs(1))
            .await;
        assert_eq!(event, ReadEvent::Eof("tail".to_string()));
    }

    #[tokio::test]
    async fn marker_split_across_chunks_still_matches() {
        let (mut io, output_tx, _writer_rx) = io_pair();
        push(&output_tx, b"output\n(gd");
        push(&output_tx, b"b) ");

        let event = io
            .read_until(&PromptMarkers::gdb(), Duration::from_secs(1))
            .await;
        assert_eq!(event, ReadEvent::Ready("output\n".to_string()));
    }
}
