//! Keeps a child's stdout and stderr pipes empty.

use crate::ServerId;

use std::collections::VecDeque;
use std::io::ErrorKind;
use std::sync::{Mutex, PoisonError};

use tokio::io::{AsyncBufReadExt, AsyncRead, BufReader};
use tokio::process::{ChildStderr, ChildStdout};
use tokio::task::JoinHandle;
use tracing::{debug, warn};

const OUTPUT_TARGET: &str = "mcp_supervisor::output";

/// Last few lines a process wrote, for crash diagnostics.
#[derive(Debug)]
pub struct OutputTail {
    lines: Mutex<VecDeque<String>>,
    capacity: usize,
}

impl OutputTail {
    pub fn new(capacity: usize) -> Self {
        Self {
            lines: Mutex::new(VecDeque::with_capacity(capacity)),
            capacity,
        }
    }

    pub fn push(&self, line: &str) {
        if self.capacity == 0 {
            return;
        }
        let mut lines = self.lines.lock().unwrap_or_else(PoisonError::into_inner);
        if lines.len() == self.capacity {
            lines.pop_front();
        }
        lines.push_back(line.to_string());
    }

    /// Most recent non-blank line.
    pub fn last_line(&self) -> Option<String> {
        let lines = self.lines.lock().unwrap_or_else(PoisonError::into_inner);
        lines
            .iter()
            .rev()
            .map(|line| line.trim())
            .find(|line| !line.is_empty())
            .map(str::to_string)
    }

    pub fn lines(&self) -> Vec<String> {
        let lines = self.lines.lock().unwrap_or_else(PoisonError::into_inner);
        lines.iter().cloned().collect()
    }
}

/// Spawn the drain task for one process.
///
/// Both pipes are read line by line on a single task until each reports end
/// of stream, so they behave as one combined output stream. Lines go to the
/// `mcp_supervisor::output` debug target and the tail buffer. Bytes that are
/// not UTF-8 are replaced, never treated as the end of the pipe.
pub fn spawn_output_drain(
    server_id: ServerId,
    stdout: Option<ChildStdout>,
    stderr: Option<ChildStderr>,
    tail: std::sync::Arc<OutputTail>,
) -> JoinHandle<()> {
    tokio::spawn(async move {
        let mut stdout = LineReader::new(&server_id, "stdout", stdout);
        let mut stderr = LineReader::new(&server_id, "stderr", stderr);

        loop {
            tokio::select! {
                line = stdout.next_line(), if stdout.is_open() => {
                    if let Some(line) = line {
                        record(&server_id, "stdout", &line, &tail);
                    }
                }
                line = stderr.next_line(), if stderr.is_open() => {
                    if let Some(line) = line {
                        record(&server_id, "stderr", &line, &tail);
                    }
                }
                else => break,
            }
        }

        debug!(server_id = %server_id, "Output drained to end of stream");
    })
}

/// Splits one pipe into lines of lossily decoded text.
///
/// A line cut short by `select!` stays in `buf` and is completed by the
/// next call.
pub(crate) struct LineReader<'a, R> {
    server_id: &'a ServerId,
    stream: &'static str,
    reader: Option<BufReader<R>>,
    buf: Vec<u8>,
}

impl<'a, R> LineReader<'a, R>
where
    R: AsyncRead + Unpin,
{
    pub(crate) fn new(server_id: &'a ServerId, stream: &'static str, pipe: Option<R>) -> Self {
        Self {
            server_id,
            stream,
            reader: pipe.map(BufReader::new),
            buf: Vec::new(),
        }
    }

    pub(crate) fn is_open(&self) -> bool {
        self.reader.is_some()
    }

    /// Next complete line, or the unterminated remainder once the pipe ends.
    ///
    /// `None` means nothing is left; the reader is closed after that.
    pub(crate) async fn next_line(&mut self) -> Option<String> {
        loop {
            let reader = self.reader.as_mut()?;
            match reader.read_until(b'\n', &mut self.buf).await {
                Ok(0) => {
                    self.reader = None;
                    return self.take_line();
                }
                Ok(_) if self.buf.ends_with(b"\n") => return self.take_line(),
                Ok(_) => continue,
                Err(e) if e.kind() == ErrorKind::Interrupted => continue,
                Err(e) => {
                    warn!(
                        server_id = %self.server_id,
                        stream = self.stream,
                        "Output pipe failed, no longer reading it: {e}"
                    );
                    self.reader = None;
                    return self.take_line();
                }
            }
        }
    }

    fn take_line(&mut self) -> Option<String> {
        if self.buf.is_empty() {
            return None;
        }
        let line = String::from_utf8_lossy(&self.buf)
            .trim_end_matches(['\n', '\r'])
            .to_string();
        self.buf.clear();
        Some(line)
    }
}

fn record(server_id: &ServerId, stream: &'static str, line: &str, tail: &OutputTail) {
    debug!(target: OUTPUT_TARGET, server_id = %server_id, stream, "{line}");
    tail.push(line);
}
