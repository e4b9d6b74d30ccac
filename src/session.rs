//! Exclusive ownership of one server subprocess and its stdio pipes.
//!
//! Messages are newline-delimited JSON. Stdout is drained by a reader thread
//! into a channel so that [`ProcessSession::receive`] can honour a deadline
//! while the caller stays single-threaded and blocking. Stderr is drained into
//! a bounded ring for diagnostics.
//!
//! The subprocess is terminated exactly once: either by [`ProcessSession::close`]
//! or, on every other exit path, when the session is dropped.

use crate::error::SessionError;
use crate::mcp::{Message, Request};
use serde::Serialize;
use std::collections::{BTreeMap, VecDeque};
use std::io::{BufRead, BufReader, Read, Write};
use std::path::PathBuf;
use std::process::{Child, ChildStdin, Command, ExitStatus, Stdio};
use std::sync::mpsc::{self, Receiver, RecvTimeoutError};
use std::sync::{Arc, Mutex};
use std::thread::{self, JoinHandle};
use std::time::{Duration, Instant};
use tracing::{debug, trace, warn};

const TERMINATE_GRACE: Duration = Duration::from_millis(500);
const REAP_POLL: Duration = Duration::from_millis(10);
const STDERR_DRAIN_WAIT: Duration = Duration::from_millis(100);
const STDERR_KEEP_LINES: usize = 64;

/// What to launch: program path, arguments and extra environment.
#[derive(Debug, Clone, Default, PartialEq, Eq, Serialize)]
pub struct ServerCommand {
    pub program: PathBuf,
    pub args: Vec<String>,
    pub env: BTreeMap<String, String>,
}

impl ServerCommand {
    pub fn new(program: impl Into<PathBuf>) -> Self {
        Self {
            program: program.into(),
            ..Self::default()
        }
    }

    pub fn with_args<I, S>(mut self, args: I) -> Self
    where
        I: IntoIterator<Item = S>,
        S: Into<String>,
    {
        self.args = args.into_iter().map(Into::into).collect();
        self
    }

    pub fn display(&self) -> String {
        let mut rendered = self.program.display().to_string();
        for arg in &self.args {
            rendered.push(' ');
            rendered.push_str(arg);
        }
        rendered
    }
}

/// Diagnostics collected when a session is released.
#[derive(Debug, Clone)]
pub struct SessionExit {
    pub status: Option<ExitStatus>,
    pub stderr: Vec<String>,
}

pub struct ProcessSession {
    child: Child,
    stdin: Option<ChildStdin>,
    lines: Receiver<Vec<u8>>,
    stderr: Arc<Mutex<VecDeque<String>>>,
    stderr_reader: Option<JoinHandle<()>>,
    program: String,
    last_id: Option<u64>,
    pending: Option<u64>,
    output_closed: bool,
    released: bool,
}

impl ProcessSession {
    /// Spawns the subprocess with stdin, stdout and stderr piped.
    pub fn spawn(command: &ServerCommand) -> Result<Self, SessionError> {
        let program = command.program.display().to_string();
        let mut child = Command::new(&command.program)
            .args(&command.args)
            .envs(&command.env)
            .stdin(Stdio::piped())
            .stdout(Stdio::piped())
            .stderr(Stdio::piped())
            .spawn()
            .map_err(|source| SessionError::SpawnFailed {
                program: program.clone(),
                source,
            })?;
        debug!(program = %program, pid = child.id(), "spawned server");

        let stdin = child.stdin.take();
        let stdout = child.stdout.take();
        let stderr_pipe = child.stderr.take();

        let (tx, lines) = mpsc::channel();
        if let Some(stdout) = stdout {
            thread::spawn(move || {
                let mut reader = BufReader::new(stdout);
                let mut buf = Vec::new();
                loop {
                    buf.clear();
                    match reader.read_until(b'\n', &mut buf) {
                        Ok(0) => break,
                        Ok(_) => {
                            // A trailing fragment without a newline is not a complete frame.
                            if buf.last() != Some(&b'\n') {
                                trace!("discarding unterminated trailing output");
                                break;
                            }
                            if tx.send(std::mem::take(&mut buf)).is_err() {
                                break;
                            }
                        }
                        Err(err) => {
                            debug!(error = %err, "stdout reader stopped");
                            break;
                        }
                    }
                }
            });
        }

        let stderr = Arc::new(Mutex::new(VecDeque::new()));
        let stderr_reader = stderr_pipe.map(|pipe| {
            let sink = Arc::clone(&stderr);
            thread::spawn(move || drain_stderr(pipe, sink))
        });

        Ok(Self {
            child,
            stdin,
            lines,
            stderr,
            stderr_reader,
            program,
            last_id: None,
            pending: None,
            output_closed: false,
            released: false,
        })
    }

    pub fn program(&self) -> &str {
        &self.program
    }

    pub fn pid(&self) -> u32 {
        self.child.id()
    }

    /// Writes one request as a single line and flushes it.
    ///
    /// Request ids must strictly increase, and a new request is refused while
    /// the previous one is still awaiting its response. Once the server has
    /// exited or closed its output, every write is a `WriteError`.
    pub fn send(&mut self, request: &Request) -> Result<(), SessionError> {
        if let Some(id) = request.id {
            if let Some(pending) = self.pending {
                return Err(SessionError::OutOfSequence {
                    id,
                    reason: format!("request {pending} is still awaiting a response"),
                });
            }
            if let Some(last) = self.last_id
                && id <= last
            {
                return Err(SessionError::OutOfSequence {
                    id,
                    reason: format!("ids must increase (last issued {last})"),
                });
            }
        }

        if let Some(reason) = self.exit_reason() {
            return Err(SessionError::WriteError(std::io::Error::new(
                std::io::ErrorKind::BrokenPipe,
                reason,
            )));
        }

        let serialized = serde_json::to_string(request).map_err(|err| {
            SessionError::WriteError(std::io::Error::new(std::io::ErrorKind::InvalidData, err))
        })?;
        let stdin = self.stdin.as_mut().ok_or_else(|| {
            SessionError::WriteError(std::io::Error::new(
                std::io::ErrorKind::BrokenPipe,
                "stdin already closed",
            ))
        })?;
        writeln!(stdin, "{serialized}").map_err(SessionError::WriteError)?;
        stdin.flush().map_err(SessionError::WriteError)?;
        trace!(line = %serialized, "sent");

        if let Some(id) = request.id {
            self.last_id = Some(id);
            self.pending = Some(id);
        }
        Ok(())
    }

    /// Reads the response to the outstanding request, waiting at most `timeout`.
    ///
    /// Blank lines and server notifications are skipped. A late response to an
    /// earlier, already timed-out request is discarded. Whatever the outcome,
    /// the outstanding request is resolved once this returns.
    pub fn receive(&mut self, timeout: Duration) -> Result<Message, SessionError> {
        let expected = self.pending.take();
        let deadline = Instant::now() + timeout;
        loop {
            let remaining = deadline.saturating_duration_since(Instant::now());
            let line = match self.lines.recv_timeout(remaining) {
                Ok(line) => line,
                Err(RecvTimeoutError::Timeout) => return Err(SessionError::TimedOut(timeout)),
                Err(RecvTimeoutError::Disconnected) => {
                    self.output_closed = true;
                    return Err(SessionError::EmptyResponse);
                }
            };
            let trimmed = line.trim_ascii();
            if trimmed.is_empty() {
                continue;
            }
            trace!(line = %String::from_utf8_lossy(trimmed), "received");

            // Parsing from bytes rejects lines that are not valid UTF-8.
            let message: Message =
                serde_json::from_slice(trimmed).map_err(|err| SessionError::ParseError {
                    message: err.to_string(),
                    line: String::from_utf8_lossy(trimmed).into_owned(),
                })?;

            if message.is_notification() {
                debug!(
                    method = message.method.as_deref().unwrap_or_default(),
                    "skipping server notification"
                );
                continue;
            }

            let Some(expected) = expected else {
                return Ok(message);
            };
            match message.id_u64() {
                Some(id) if id == expected => return Ok(message),
                Some(id) if id < expected => {
                    warn!(id, expected, "discarding stale response");
                    continue;
                }
                _ => {
                    return Err(SessionError::UnexpectedId {
                        expected,
                        actual: message.id_display(),
                    });
                }
            }
        }
    }

    /// Sends a request and waits for its response.
    pub fn call(&mut self, request: &Request, timeout: Duration) -> Result<Message, SessionError> {
        self.send(request)?;
        self.receive(timeout)
    }

    /// Why the server can no longer take input, if it cannot.
    fn exit_reason(&mut self) -> Option<String> {
        if self.output_closed {
            return Some("server closed its output".to_string());
        }
        match self.child.try_wait() {
            Ok(Some(status)) => Some(format!("server exited ({status})")),
            _ => None,
        }
    }

    /// Terminates the subprocess and returns its exit status and captured stderr.
    pub fn close(mut self) -> SessionExit {
        let status = self.terminate();
        SessionExit {
            status,
            stderr: self.stderr_lines(),
        }
    }

    /// Most recent stderr lines, oldest first.
    pub fn stderr_lines(&self) -> Vec<String> {
        match self.stderr.lock() {
            Ok(lines) => lines.iter().cloned().collect(),
            Err(_) => Vec::new(),
        }
    }

    fn terminate(&mut self) -> Option<ExitStatus> {
        if self.released {
            return None;
        }
        self.released = true;
        drop(self.stdin.take());

        let status = match self.child.try_wait() {
            Ok(Some(status)) => Some(status),
            _ => {
                signal_terminate(&mut self.child);
                let deadline = Instant::now() + TERMINATE_GRACE;
                loop {
                    match self.child.try_wait() {
                        Ok(Some(status)) => break Some(status),
                        Ok(None) if Instant::now() < deadline => thread::sleep(REAP_POLL),
                        _ => {
                            debug!(program = %self.program, "server ignored SIGTERM, killing");
                            let _ = self.child.kill();
                            break self.child.wait().ok();
                        }
                    }
                }
            }
        };

        if let Some(handle) = self.stderr_reader.take() {
            let deadline = Instant::now() + STDERR_DRAIN_WAIT;
            while !handle.is_finished() && Instant::now() < deadline {
                thread::sleep(REAP_POLL);
            }
            if handle.is_finished() {
                let _ = handle.join();
            }
        }
        debug!(program = %self.program, ?status, "server terminated");
        status
    }
}

impl Drop for ProcessSession {
    fn drop(&mut self) {
        self.terminate();
    }
}

fn drain_stderr(pipe: impl Read, sink: Arc<Mutex<VecDeque<String>>>) {
    let reader = BufReader::new(pipe);
    for line in reader.lines() {
        let Ok(line) = line else {
            break;
        };
        debug!(target: "mcp_verify::server_stderr", "{line}");
        if let Ok(mut lines) = sink.lock() {
            if lines.len() == STDERR_KEEP_LINES {
                lines.pop_front();
            }
            lines.push_back(line);
        }
    }
}

#[cfg(unix)]
fn signal_terminate(child: &mut Child) {
    // SAFETY: the pid belongs to a child we own and have not reaped yet.
    unsafe {
        libc::kill(child.id() as libc::pid_t, libc::SIGTERM);
    }
}

#[cfg(not(unix))]
fn signal_terminate(child: &mut Child) {
    let _ = child.kill();
}
