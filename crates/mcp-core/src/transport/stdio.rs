//! Stdio transport: one JSON-RPC frame per line over stdin/stdout.
//!
//! A server side bound to the current process's stdio, and a client
//! side that spawns a child process and owns its pipes.

use std::process::Stdio;
use std::sync::atomic::{AtomicBool, AtomicU64, Ordering};
use std::sync::Arc;
use std::time::Duration;

use serde_json::Value;
use tokio::io::{AsyncBufReadExt, AsyncWriteExt, BufReader, BufWriter};
use tokio::process::{Child, ChildStdin, ChildStdout, Command};
use tokio::sync::{mpsc, Mutex};

use crate::error::{TransportError, TransportResult};
use crate::frame::{self, Frame};

/// Default cap on a single stdio line.
pub const MAX_LINE_BYTES: usize = 16 * 1024 * 1024;

/// Default grace period between SIGTERM and SIGKILL when tearing down a
/// child process tree.
pub const DEFAULT_KILL_GRACE: Duration = Duration::from_secs(2);

/// Builds the platform shell invocation for `command`, the way a
/// terminal would run it: `sh -c` on unix, `cmd /C` on windows. Letting
/// the shell parse the command gives callers quoting, pipes, and
/// env/glob expansion instead of the naive whitespace split a direct
/// `Command::new(program).args(...)` would require.
#[cfg(unix)]
fn shell_command(command: &str) -> Command {
    let mut cmd = Command::new("sh");
    cmd.arg("-c").arg(command);
    cmd
}

#[cfg(not(unix))]
fn shell_command(command: &str) -> Command {
    let mut cmd = Command::new("cmd");
    cmd.arg("/C").arg(command);
    cmd
}

/// The server side of the stdio transport: reads line-delimited frames
/// from the process's own stdin and writes responses to its own stdout,
/// inheriting stderr for human logs. One session exists for the
/// transport's whole lifetime.
pub struct StdioServerTransport {
    stdout: Mutex<tokio::io::Stdout>,
    max_line_bytes: usize,
}

impl StdioServerTransport {
    /// Bind to the current process's stdio.
    #[must_use]
    pub fn new() -> Self {
        Self { stdout: Mutex::new(tokio::io::stdout()), max_line_bytes: MAX_LINE_BYTES }
    }

    /// Read frames from stdin until EOF, invoking `on_frame` for each
    /// successfully decoded one. A malformed line is logged and skipped
    /// rather than terminating the stream.
    ///
    /// # Errors
    ///
    /// Returns an error only on an underlying I/O failure reading stdin.
    pub async fn run<F, Fut>(&self, mut on_frame: F) -> TransportResult<()>
    where
        F: FnMut(Frame) -> Fut,
        Fut: std::future::Future<Output = ()>,
    {
        let stdin = tokio::io::stdin();
        let mut reader = BufReader::new(stdin);
        let mut line = String::new();

        loop {
            line.clear();
            let bytes_read = reader.read_line(&mut line).await?;
            if bytes_read == 0 {
                tracing::info!("stdin closed, stdio transport shutting down");
                return Ok(());
            }

            let trimmed = line.trim();
            if trimmed.is_empty() {
                continue;
            }
            if trimmed.len() > self.max_line_bytes {
                tracing::warn!(len = trimmed.len(), "stdio line exceeds maximum size, dropping");
                continue;
            }

            match frame::decode(trimmed.as_bytes()) {
                Ok(frame) => on_frame(frame).await,
                Err(err) => tracing::warn!(error = %err, "malformed stdio frame, skipping"),
            }
        }
    }

    /// Write one frame as a line to stdout, serialized so concurrent
    /// callers never interleave partial writes.
    ///
    /// # Errors
    ///
    /// Returns an error on an underlying I/O failure.
    pub async fn send(&self, frame: &Frame) -> TransportResult<()> {
        let mut bytes = frame::encode(frame);
        bytes.push(b'\n');
        let mut stdout = self.stdout.lock().await;
        stdout.write_all(&bytes).await?;
        stdout.flush().await?;
        Ok(())
    }
}

impl Default for StdioServerTransport {
    fn default() -> Self {
        Self::new()
    }
}

/// The client side of the stdio transport: spawns a child process,
/// pipes its stdin/stdout for RPC, and inherits its stderr so the
/// child's own logs reach the parent's terminal untouched.
pub struct StdioClientTransport {
    child: Mutex<Option<Child>>,
    stdin: Mutex<Option<BufWriter<ChildStdin>>>,
    next_id: AtomicU64,
    closed: AtomicBool,
    kill_grace: Duration,
}

impl StdioClientTransport {
    /// Spawn `command` via the platform shell (see [`shell_command`])
    /// with the default SIGTERM-then-SIGKILL grace period
    /// ([`DEFAULT_KILL_GRACE`]) and take ownership of its pipes.
    ///
    /// # Errors
    ///
    /// Returns [`TransportError::Io`] if the command cannot be spawned
    /// or its pipes cannot be captured.
    pub async fn spawn(command: &str) -> TransportResult<(Arc<Self>, mpsc::UnboundedReceiver<Frame>)> {
        Self::spawn_with_grace(command, DEFAULT_KILL_GRACE).await
    }

    /// Spawn `command` via the platform shell, same as [`Self::spawn`],
    /// but with a caller-chosen grace period between the SIGTERM sent
    /// to the child's process tree on [`Self::close`] and the SIGKILL
    /// that follows if it hasn't exited by then.
    ///
    /// On unix the child is placed in its own process group so the
    /// signal reaches every descendant the shell spawned, not just the
    /// shell itself. Returns the transport plus a channel that yields
    /// every frame the child writes to its stdout.
    ///
    /// # Errors
    ///
    /// Returns [`TransportError::Io`] if `command` is empty, the
    /// command cannot be spawned, or its pipes cannot be captured.
    pub async fn spawn_with_grace(
        command: &str,
        kill_grace: Duration,
    ) -> TransportResult<(Arc<Self>, mpsc::UnboundedReceiver<Frame>)> {
        if command.trim().is_empty() {
            return Err(TransportError::Io(std::io::Error::new(std::io::ErrorKind::InvalidInput, "empty command")));
        }

        let mut cmd = shell_command(command);
        #[cfg(unix)]
        {
            use std::os::unix::process::CommandExt;
            // A group of its own so close() can signal the whole tree
            // (the shell plus whatever it execs) by process group id.
            cmd.process_group(0);
        }

        let mut child = cmd.stdin(Stdio::piped()).stdout(Stdio::piped()).stderr(Stdio::inherit()).spawn()?;

        let stdin = child.stdin.take().ok_or_else(|| {
            TransportError::Io(std::io::Error::new(std::io::ErrorKind::BrokenPipe, "child stdin unavailable"))
        })?;
        let stdout = child.stdout.take().ok_or_else(|| {
            TransportError::Io(std::io::Error::new(std::io::ErrorKind::BrokenPipe, "child stdout unavailable"))
        })?;

        let transport = Arc::new(Self {
            child: Mutex::new(Some(child)),
            stdin: Mutex::new(Some(BufWriter::new(stdin))),
            next_id: AtomicU64::new(1),
            closed: AtomicBool::new(false),
            kill_grace,
        });

        let (tx, rx) = mpsc::unbounded_channel();
        tokio::spawn(Self::read_loop(stdout, tx));

        Ok((transport, rx))
    }

    async fn read_loop(stdout: ChildStdout, tx: mpsc::UnboundedSender<Frame>) {
        let mut reader = BufReader::new(stdout);
        let mut line = String::new();
        loop {
            line.clear();
            match reader.read_line(&mut line).await {
                Ok(0) => {
                    tracing::info!("child process stdout closed");
                    return;
                }
                Ok(_) => {
                    let trimmed = line.trim();
                    if trimmed.is_empty() {
                        continue;
                    }
                    match frame::decode(trimmed.as_bytes()) {
                        Ok(frame) => {
                            if tx.send(frame).is_err() {
                                return;
                            }
                        }
                        Err(err) => tracing::warn!(error = %err, "malformed frame from child process"),
                    }
                }
                Err(err) => {
                    tracing::error!(error = %err, "error reading child process stdout");
                    return;
                }
            }
        }
    }

    /// The next request id this transport will mint.
    pub fn next_request_id(&self) -> Value {
        Value::from(self.next_id.fetch_add(1, Ordering::SeqCst))
    }

    /// Write one frame, followed by a newline, to the child's stdin.
    ///
    /// # Errors
    ///
    /// Returns [`TransportError::Closed`] after [`StdioClientTransport::close`]
    /// has run, or [`TransportError::Io`] on a pipe write failure.
    pub async fn send(&self, frame: &Frame) -> TransportResult<()> {
        if self.closed.load(Ordering::SeqCst) {
            return Err(TransportError::Closed);
        }
        let mut guard = self.stdin.lock().await;
        let Some(writer) = guard.as_mut() else {
            return Err(TransportError::Closed);
        };
        let mut bytes = frame::encode(frame);
        bytes.push(b'\n');
        writer.write_all(&bytes).await?;
        writer.flush().await?;
        Ok(())
    }

    /// Terminate the child's entire process tree: SIGTERM first, then
    /// SIGKILL if it hasn't exited within this transport's grace period
    /// (see [`Self::spawn_with_grace`]). On platforms without signals,
    /// falls back to tokio's own `Child::kill`.
    pub async fn close(&self) {
        self.closed.store(true, Ordering::SeqCst);
        *self.stdin.lock().await = None;
        if let Some(mut child) = self.child.lock().await.take() {
            terminate_tree(&mut child, self.kill_grace).await;
        }
    }
}

#[cfg(unix)]
async fn terminate_tree(child: &mut Child, grace: Duration) {
    use nix::sys::signal::{self, Signal};
    use nix::unistd::Pid;

    let Some(pid) = child.id() else {
        // Already reaped; nothing left to signal.
        return;
    };
    // Negative pid addresses the whole process group `spawn_with_grace`
    // placed the child in, covering the shell and whatever it execs.
    let group = Pid::from_raw(-(i32::try_from(pid).unwrap_or(i32::MAX)));

    if let Err(err) = signal::kill(group, Signal::SIGTERM) {
        tracing::warn!(error = %err, "failed to send SIGTERM to child process group");
    }

    if tokio::time::timeout(grace, child.wait()).await.is_err() {
        tracing::warn!(pid, "child process tree did not exit within grace period, sending SIGKILL");
        if let Err(err) = signal::kill(group, Signal::SIGKILL) {
            tracing::warn!(error = %err, "failed to send SIGKILL to child process group");
        }
        let _ = child.wait().await;
    }
}

#[cfg(not(unix))]
async fn terminate_tree(child: &mut Child, _grace: Duration) {
    if let Err(err) = child.kill().await {
        tracing::warn!(error = %err, "failed to kill child process");
    }
}
