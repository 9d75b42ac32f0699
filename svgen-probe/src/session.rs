//! A running server under probe: piped stdio, a stderr drain task, and a
//! shutdown that always reaps the child.

use snafu::ResultExt;
use std::collections::VecDeque;
use std::process::Stdio;
use std::sync::{Arc, Mutex, PoisonError};
use std::time::Duration;
use tokio::io::{AsyncBufReadExt, AsyncWriteExt, BufReader};
use tokio::process::{Child, ChildStdin, ChildStderr, ChildStdout, Command};
use tokio::task::JoinHandle;

use crate::error::{EncodeSnafu, ReadSnafu, Result, SendSnafu, SpawnSnafu, WaitSnafu};
use crate::jsonrpc::{JsonRpcRequest, Method, RequestId};
use crate::plan::Target;
use crate::report::STDERR_TAIL_LINES;

/// How long to wait for stderr to reach EOF once the child is gone
const STDERR_FLUSH: Duration = Duration::from_millis(500);

/// Result of one bounded read from the server's stdout
#[derive(Debug, Clone, PartialEq, Eq)]
pub enum LineRead {
    Line(String),
    Closed,
    TimedOut,
}

/// What is left of a session after shutdown
#[derive(Debug, Clone, Default, PartialEq, Eq)]
pub struct Finished {
    /// `None` when the child was killed by a signal
    pub exit_code: Option<i32>,
    pub stderr: Vec<String>,
}

pub struct ServerSession {
    child: Child,
    stdin: Option<ChildStdin>,
    stdout: BufReader<ChildStdout>,
    /// Bytes of a line whose read timed out before its newline arrived
    stdout_buf: Vec<u8>,
    stdout_closed: bool,
    stderr_tail: StderrTail,
    stderr_task: JoinHandle<()>,
    next_id: i64,
}

impl ServerSession {
    pub fn spawn(target: &Target) -> Result<Self> {
        let mut command = Command::new(&target.program);
        command
            .args(&target.args)
            .stdin(Stdio::piped())
            .stdout(Stdio::piped())
            .stderr(Stdio::piped())
            .kill_on_drop(true);
        if let Some(cwd) = &target.cwd {
            command.current_dir(cwd);
        }

        let mut child = command.spawn().context(SpawnSnafu {
            program: &target.program,
        })?;
        tracing::debug!("started `{}` as pid {:?}", target.display(), child.id());

        let stdio = (child.stdin.take(), child.stdout.take(), child.stderr.take());
        let (Some(stdin), Some(stdout), Some(stderr)) = stdio else {
            return Err(std::io::Error::other("child stdio was not piped")).context(SpawnSnafu {
                program: &target.program,
            });
        };

        let stderr_tail = StderrTail::default();
        let stderr_task = tokio::spawn(drain_stderr(stderr, stderr_tail.clone()));

        Ok(Self {
            child,
            stdin: Some(stdin),
            stdout: BufReader::new(stdout),
            stdout_buf: Vec::new(),
            stdout_closed: false,
            stderr_tail,
            stderr_task,
            next_id: 1,
        })
    }

    /// Send one request line and return the id it was given
    pub async fn send(&mut self, method: Method) -> Result<RequestId> {
        let id = RequestId::Number(self.next_id);
        self.next_id += 1;

        let request = JsonRpcRequest::new(id.clone(), method);
        let mut line = serde_json::to_string(&request).context(EncodeSnafu {
            method: method.as_str(),
        })?;
        line.push('\n');

        let stdin = self.stdin.as_mut().ok_or_else(|| {
            std::io::Error::new(std::io::ErrorKind::BrokenPipe, "stdin already closed")
        });
        let stdin = stdin.context(SendSnafu {
            method: method.as_str(),
        })?;
        stdin.write_all(line.as_bytes()).await.context(SendSnafu {
            method: method.as_str(),
        })?;
        stdin.flush().await.context(SendSnafu {
            method: method.as_str(),
        })?;

        tracing::debug!("sent {}", line.trim_end());
        Ok(id)
    }

    /// Read one stdout line, waiting at most `limit`
    pub async fn read_line(&mut self, limit: Duration) -> Result<LineRead> {
        if self.stdout_closed {
            return Ok(LineRead::Closed);
        }

        // A timed out `read_until` leaves its partial line in `stdout_buf`
        let read = self.stdout.read_until(b'\n', &mut self.stdout_buf);
        match tokio::time::timeout(limit, read).await {
            Err(_) => Ok(LineRead::TimedOut),
            Ok(read) => {
                read.context(ReadSnafu)?;
                if self.stdout_buf.is_empty() {
                    self.stdout_closed = true;
                    return Ok(LineRead::Closed);
                }
                Ok(LineRead::Line(take_line(&mut self.stdout_buf)))
            }
        }
    }

    /// Everything left on stdout, for a child that has already exited
    pub async fn drain_stdout(&mut self, limit: Duration) -> Result<Vec<String>> {
        let mut lines = Vec::new();
        while let LineRead::Line(line) = self.read_line(limit).await? {
            lines.push(line);
        }
        Ok(lines)
    }

    /// Exit code if the child has exited; `Some(None)` means killed by a signal
    pub fn exit_status(&mut self) -> Result<Option<Option<i32>>> {
        let status = self.child.try_wait().context(WaitSnafu)?;
        Ok(status.map(|status| status.code()))
    }

    /// Wait up to `limit` for the child to exit on its own
    pub async fn wait_exit(&mut self, limit: Duration) -> Result<Option<Option<i32>>> {
        match tokio::time::timeout(limit, self.child.wait()).await {
            Err(_) => Ok(None),
            Ok(status) => Ok(Some(status.context(WaitSnafu)?.code())),
        }
    }

    /// Close stdin, ask the child to stop, kill it after `grace`, and reap it
    pub async fn shutdown(mut self, grace: Duration) -> Finished {
        drop(self.stdin.take());

        let status = match self.child.try_wait() {
            Ok(Some(status)) => Some(status),
            _ => {
                terminate(&mut self.child);
                match tokio::time::timeout(grace, self.child.wait()).await {
                    Ok(Ok(status)) => Some(status),
                    _ => {
                        tracing::debug!("server ignored SIGTERM, killing it");
                        if let Err(e) = self.child.kill().await {
                            tracing::warn!("failed to kill server: {e}");
                        }
                        self.child.try_wait().ok().flatten()
                    }
                }
            }
        };

        // Grandchildren may hold stderr open; keep whatever arrived in time
        if tokio::time::timeout(STDERR_FLUSH, &mut self.stderr_task)
            .await
            .is_err()
        {
            self.stderr_task.abort();
        }

        Finished {
            exit_code: status.and_then(|status| status.code()),
            stderr: self.stderr_tail.lines(),
        }
    }
}

/// The last [`STDERR_TAIL_LINES`] stderr lines, shared with the drain task
#[derive(Debug, Clone, Default)]
struct StderrTail(Arc<Mutex<VecDeque<String>>>);

impl StderrTail {
    fn push(&self, line: String) {
        let mut tail = self.0.lock().unwrap_or_else(PoisonError::into_inner);
        if tail.len() == STDERR_TAIL_LINES {
            tail.pop_front();
        }
        tail.push_back(line);
    }

    fn lines(&self) -> Vec<String> {
        let tail = self.0.lock().unwrap_or_else(PoisonError::into_inner);
        tail.iter().cloned().collect()
    }
}

/// Read stderr until EOF so the server never blocks on a full pipe
async fn drain_stderr(stderr: ChildStderr, tail: StderrTail) {
    let mut reader = BufReader::new(stderr);
    let mut buf = Vec::new();
    loop {
        match reader.read_until(b'\n', &mut buf).await {
            Ok(0) => break,
            Ok(_) => tail.push(take_line(&mut buf)),
            Err(e) => {
                tracing::debug!("stopped reading server stderr: {e}");
                break;
            }
        }
    }
}

/// Decode one buffered line without its terminator and clear the buffer.
/// Invalid UTF-8 is replaced rather than rejected.
fn take_line(buf: &mut Vec<u8>) -> String {
    if buf.last() == Some(&b'\n') {
        buf.pop();
        if buf.last() == Some(&b'\r') {
            buf.pop();
        }
    }
    let line = String::from_utf8_lossy(buf).into_owned();
    buf.clear();
    line
}

#[cfg(unix)]
fn terminate(child: &mut Child) {
    let Some(pid) = child.id().and_then(|pid| libc::pid_t::try_from(pid).ok()) else {
        return;
    };
    // SAFETY: `pid` belongs to a child we have not reaped yet
    unsafe {
        libc::kill(pid, libc::SIGTERM);
    }
}

#[cfg(not(unix))]
fn terminate(child: &mut Child) {
    let _ = child.start_kill();
}
