//! Child process execution with bounded, concurrently drained output.
//!
//! Every command runs under `sh -c`. Its stdout and stderr are each drained
//! by a dedicated tokio task that echoes lines to the terminal as they arrive
//! and keeps only the most recent lines in a [`BoundedLineBuffer`]. Both
//! drain tasks are joined before the result is handed back, so the buffers
//! are never read while still being written.

use std::io::{self, Write};
use std::path::{Path, PathBuf};
use std::process::Stdio;

use tokio::io::{AsyncBufRead, AsyncBufReadExt, AsyncRead, BufReader};
use tokio::process::Command;

use crate::buffer::{BoundedLineBuffer, DEFAULT_STDERR_LINES, DEFAULT_STDOUT_LINES};

/// Default interpreter used to run command lines.
pub const DEFAULT_SHELL: &str = "sh";

/// Longest line kept in a buffer. The terminal still sees the whole line.
pub const MAX_LINE_BYTES: usize = 64 * 1024;

/// Appended to a line cut at [`MAX_LINE_BYTES`].
pub const TRUNCATED_MARKER: &str = " [truncated]";

/// How a command that managed to start came to an end.
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub enum ExitStatus {
    Success,
    /// Nonzero exit. Signal terminations are reported as `128 + signal`.
    Failure { code: i32 },
}

impl ExitStatus {
    pub fn code(&self) -> i32 {
        match self {
            ExitStatus::Success => 0,
            ExitStatus::Failure { code } => *code,
        }
    }

    pub fn is_success(&self) -> bool {
        matches!(self, ExitStatus::Success)
    }
}

impl From<std::process::ExitStatus> for ExitStatus {
    fn from(status: std::process::ExitStatus) -> Self {
        match status.code() {
            Some(0) => ExitStatus::Success,
            Some(code) => ExitStatus::Failure { code },
            None => ExitStatus::Failure {
                code: signal_exit_code(status),
            },
        }
    }
}

#[cfg(unix)]
fn signal_exit_code(status: std::process::ExitStatus) -> i32 {
    use std::os::unix::process::ExitStatusExt;
    status.signal().map(|signal| 128 + signal).unwrap_or(1)
}

#[cfg(not(unix))]
fn signal_exit_code(_status: std::process::ExitStatus) -> i32 {
    1
}

/// One finished run of a shell command.
#[derive(Debug, Clone)]
pub struct CommandExecution {
    pub command: String,
    pub working_dir: PathBuf,
    pub status: ExitStatus,
    /// Tail of standard output
    pub stdout: BoundedLineBuffer,
    /// Tail of standard error
    pub stderr: BoundedLineBuffer,
}

impl CommandExecution {
    pub fn exit_code(&self) -> i32 {
        self.status.code()
    }

    pub fn failed(&self) -> bool {
        !self.status.is_success()
    }
}

/// Errors that prevent a [`CommandExecution`] from being produced.
#[derive(Debug, thiserror::Error)]
pub enum RunnerError {
    #[error("failed to launch `{shell}` in {}: {source}", working_dir.display())]
    Launch {
        shell: String,
        working_dir: PathBuf,
        #[source]
        source: io::Error,
    },

    #[error("{0} pipe was unexpectedly not available")]
    MissingPipe(&'static str),

    #[error("failed to wait for command: {0}")]
    Wait(#[source] io::Error),

    #[error("output drain task failed: {0}")]
    Join(#[from] tokio::task::JoinError),
}

/// Which output stream of the child a drain task is reading.
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub enum OutputStream {
    Stdout,
    Stderr,
}

impl OutputStream {
    fn description(self) -> &'static str {
        match self {
            OutputStream::Stdout => "standard output",
            OutputStream::Stderr => "standard error",
        }
    }

    /// Forward raw output to the matching stream of this process.
    fn echo(self, bytes: &[u8]) {
        // Write failures on our own terminal must not stop the drain.
        let _ = match self {
            OutputStream::Stdout => {
                let mut out = io::stdout().lock();
                out.write_all(bytes).and_then(|_| out.flush())
            }
            OutputStream::Stderr => {
                let mut err = io::stderr().lock();
                err.write_all(bytes).and_then(|_| err.flush())
            }
        };
    }
}

/// Runs command lines under a host shell.
#[derive(Debug, Clone)]
pub struct ProcessRunner {
    shell: String,
    stdout_lines: usize,
    stderr_lines: usize,
    echo: bool,
}

impl Default for ProcessRunner {
    fn default() -> Self {
        Self {
            shell: DEFAULT_SHELL.to_string(),
            stdout_lines: DEFAULT_STDOUT_LINES,
            stderr_lines: DEFAULT_STDERR_LINES,
            echo: true,
        }
    }
}

impl ProcessRunner {
    pub fn new() -> Self {
        Self::default()
    }

    /// Builder: interpreter program, invoked as `<shell> -c <command>`
    pub fn shell(mut self, shell: impl Into<String>) -> Self {
        self.shell = shell.into();
        self
    }

    /// Builder: number of stdout / stderr lines to keep
    pub fn capacities(mut self, stdout_lines: usize, stderr_lines: usize) -> Self {
        self.stdout_lines = stdout_lines;
        self.stderr_lines = stderr_lines;
        self
    }

    /// Builder: whether lines are forwarded to the terminal as they arrive
    pub fn echo(mut self, echo: bool) -> Self {
        self.echo = echo;
        self
    }

    /// Run `command` in `working_dir` and wait for it and its output to finish.
    pub async fn run(
        &self,
        command: &str,
        working_dir: &Path,
    ) -> Result<CommandExecution, RunnerError> {
        tracing::debug!(command, cwd = %working_dir.display(), "spawning command");

        let mut child = Command::new(&self.shell)
            .arg("-c")
            .arg(command)
            .current_dir(working_dir)
            .stdin(Stdio::inherit())
            .stdout(Stdio::piped())
            .stderr(Stdio::piped())
            .spawn()
            .map_err(|source| RunnerError::Launch {
                shell: self.shell.clone(),
                working_dir: working_dir.to_path_buf(),
                source,
            })?;

        let stdout = child
            .stdout
            .take()
            .ok_or(RunnerError::MissingPipe("stdout"))?;
        let stderr = child
            .stderr
            .take()
            .ok_or(RunnerError::MissingPipe("stderr"))?;

        let stdout_task = tokio::spawn(drain(
            stdout,
            OutputStream::Stdout,
            BoundedLineBuffer::new(self.stdout_lines),
            self.echo,
            MAX_LINE_BYTES,
        ));
        let stderr_task = tokio::spawn(drain(
            stderr,
            OutputStream::Stderr,
            BoundedLineBuffer::new(self.stderr_lines),
            self.echo,
            MAX_LINE_BYTES,
        ));

        let status = child.wait().await.map_err(RunnerError::Wait)?;
        let stdout = stdout_task.await?;
        let stderr = stderr_task.await?;

        let status = ExitStatus::from(status);
        tracing::debug!(command, code = status.code(), "command finished");

        Ok(CommandExecution {
            command: command.to_string(),
            working_dir: working_dir.to_path_buf(),
            status,
            stdout,
            stderr,
        })
    }
}

/// Read `reader` line by line until EOF, echoing and buffering each line.
///
/// At most `max_line` bytes of a line are buffered. A read error ends this
/// drain only; it is reported and whatever was buffered so far is returned.
async fn drain<R>(
    reader: R,
    stream: OutputStream,
    mut buffer: BoundedLineBuffer,
    echo: bool,
    max_line: usize,
) -> BoundedLineBuffer
where
    R: AsyncRead + Unpin,
{
    let mut reader = BufReader::new(reader);
    let mut raw = Vec::new();
    let echo = echo.then_some(stream);

    loop {
        raw.clear();
        match read_line_capped(&mut reader, &mut raw, max_line, echo).await {
            Ok(LineRead::Eof) => break,
            Ok(read) => {
                let mut line = String::from_utf8_lossy(trim_line_ending(&raw)).into_owned();
                if read == LineRead::Truncated {
                    tracing::debug!(stream = stream.description(), max_line, "line truncated");
                    line.push_str(TRUNCATED_MARKER);
                }
                buffer.add(line);
            }
            Err(err) => {
                tracing::debug!(stream = stream.description(), error = %err, "drain stopped");
                eprintln!("reading {}: {err}", stream.description());
                break;
            }
        }
    }

    buffer
}

#[derive(Debug, Clone, Copy, PartialEq, Eq)]
enum LineRead {
    Eof,
    Line,
    /// The line was longer than the limit; only its head was kept.
    Truncated,
}

/// Consume one line from `reader`, copying at most `limit` bytes of it
/// (newline excluded) into `raw`. Everything consumed is echoed as is.
async fn read_line_capped<R>(
    reader: &mut R,
    raw: &mut Vec<u8>,
    limit: usize,
    echo: Option<OutputStream>,
) -> io::Result<LineRead>
where
    R: AsyncBufRead + Unpin,
{
    let mut consumed = false;
    let mut truncated = false;

    loop {
        let available = reader.fill_buf().await?;
        if available.is_empty() {
            // Keep the prompt off the end of an unterminated last line.
            if let (true, Some(stream)) = (consumed, echo) {
                stream.echo(b"\n");
            }
            break;
        }

        let (chunk, complete) = match available.iter().position(|&b| b == b'\n') {
            Some(pos) => (&available[..=pos], true),
            None => (available, false),
        };
        if let Some(stream) = echo {
            stream.echo(chunk);
        }

        let content = if complete { &chunk[..chunk.len() - 1] } else { chunk };
        let room = limit.saturating_sub(raw.len());
        truncated |= content.len() > room;
        raw.extend_from_slice(&content[..content.len().min(room)]);

        let used = chunk.len();
        reader.consume(used);
        consumed = true;
        if complete {
            break;
        }
    }

    Ok(match (consumed, truncated) {
        (false, _) => LineRead::Eof,
        (true, false) => LineRead::Line,
        (true, true) => LineRead::Truncated,
    })
}

fn trim_line_ending(raw: &[u8]) -> &[u8] {
    let raw = raw.strip_suffix(b"\n").unwrap_or(raw);
    raw.strip_suffix(b"\r").unwrap_or(raw)
}
