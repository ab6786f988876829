//! Process execution utilities with timeout support
//!
//! Every external tool call (yt-dlp, ffmpeg, zip) goes through here so that
//! exit codes and captured output look the same to callers, and hung
//! processes are killed instead of blocking a request forever.

use std::collections::VecDeque;
use std::ffi::OsStr;
use std::process::Stdio;
use std::time::Duration;
use tokio::io::{AsyncBufReadExt, BufReader};
use tokio::process::Command;
use tokio::sync::mpsc;

use crate::core::error::AppError;

/// Number of stderr lines kept from a streaming run
const STDERR_TAIL_LINES: usize = 200;

/// One way of invoking an external tool: a program plus fixed leading
/// arguments (e.g. `python3 -m yt_dlp`).
#[derive(Debug, Clone, PartialEq, Eq)]
pub struct ToolCommand {
    pub program: String,
    pub prefix_args: Vec<String>,
}

impl ToolCommand {
    pub fn new(program: impl Into<String>) -> Self {
        Self {
            program: program.into(),
            prefix_args: Vec::new(),
        }
    }

    pub fn with_prefix(program: impl Into<String>, prefix_args: &[&str]) -> Self {
        Self {
            program: program.into(),
            prefix_args: prefix_args.iter().map(|s| s.to_string()).collect(),
        }
    }

    /// Builds a tokio Command with the prefix arguments already applied.
    pub fn command<I, S>(&self, args: I) -> Command
    where
        I: IntoIterator<Item = S>,
        S: AsRef<OsStr>,
    {
        let mut cmd = Command::new(&self.program);
        cmd.args(&self.prefix_args).args(args).stdin(Stdio::null()).kill_on_drop(true);
        cmd
    }

    /// Human-readable form for logs.
    pub fn display(&self) -> String {
        if self.prefix_args.is_empty() {
            self.program.clone()
        } else {
            format!("{} {}", self.program, self.prefix_args.join(" "))
        }
    }
}

/// Captured result of a finished process.
#[derive(Debug, Clone, Default)]
pub struct ProcessOutput {
    /// Exit code; `None` when the process was killed by a signal
    pub exit_code: Option<i32>,
    pub stdout: String,
    pub stderr: String,
}

impl ProcessOutput {
    pub fn success(&self) -> bool {
        self.exit_code == Some(0)
    }

    /// Last non-empty stdout line, trimmed.
    pub fn last_stdout_line(&self) -> Option<&str> {
        self.stdout.lines().map(str::trim).filter(|l| !l.is_empty()).last()
    }
}

fn spawn_error(tool: &ToolCommand, e: std::io::Error) -> AppError {
    AppError::ToolUnavailable(format!("failed to start '{}': {}", tool.display(), e))
}

fn timeout_error(tool: &ToolCommand, timeout: Duration) -> AppError {
    AppError::Job {
        message: format!("'{}' timed out after {}s", tool.display(), timeout.as_secs()),
        stderr: String::new(),
    }
}

/// Run a tool to completion with a timeout, capturing stdout and stderr.
///
/// A non-zero exit is *not* an error here; callers inspect `exit_code`.
pub async fn run_with_timeout<I, S>(tool: &ToolCommand, args: I, timeout: Duration) -> Result<ProcessOutput, AppError>
where
    I: IntoIterator<Item = S>,
    S: AsRef<OsStr>,
{
    let mut cmd = tool.command(args);
    cmd.stdout(Stdio::piped()).stderr(Stdio::piped());

    match tokio::time::timeout(timeout, cmd.output()).await {
        Ok(Ok(output)) => Ok(ProcessOutput {
            exit_code: output.status.code(),
            stdout: String::from_utf8_lossy(&output.stdout).into_owned(),
            stderr: String::from_utf8_lossy(&output.stderr).into_owned(),
        }),
        Ok(Err(e)) => Err(spawn_error(tool, e)),
        Err(_) => Err(timeout_error(tool, timeout)),
    }
}

/// Run a tool while forwarding every stdout and stderr line to `line_tx`
/// as soon as it is printed.
///
/// Stdout is kept whole (callers recover printed paths from it); stderr is
/// kept as a bounded tail for diagnostics.
pub async fn run_streaming<I, S>(
    tool: &ToolCommand,
    args: I,
    timeout: Duration,
    line_tx: mpsc::UnboundedSender<String>,
) -> Result<ProcessOutput, AppError>
where
    I: IntoIterator<Item = S>,
    S: AsRef<OsStr>,
{
    let mut cmd = tool.command(args);
    cmd.stdout(Stdio::piped()).stderr(Stdio::piped());
    let mut child = cmd.spawn().map_err(|e| spawn_error(tool, e))?;

    let stdout = child.stdout.take();
    let stderr = child.stderr.take();
    let stdout_tx = line_tx.clone();
    let stderr_tx = line_tx;
    let stdout_name = tool.program.clone();
    let stderr_name = tool.program.clone();

    let read_stdout = async move {
        let mut collected = String::new();
        if let Some(stream) = stdout {
            let mut lines = BufReader::new(stream).lines();
            while let Ok(Some(line)) = lines.next_line().await {
                log::debug!("{} stdout: {}", stdout_name, line);
                collected.push_str(&line);
                collected.push('\n');
                let _ = stdout_tx.send(line);
            }
        }
        collected
    };

    let read_stderr = async move {
        let mut tail: VecDeque<String> = VecDeque::new();
        if let Some(stream) = stderr {
            let mut lines = BufReader::new(stream).lines();
            while let Ok(Some(line)) = lines.next_line().await {
                log::debug!("{} stderr: {}", stderr_name, line);
                tail.push_back(line.clone());
                if tail.len() > STDERR_TAIL_LINES {
                    tail.pop_front();
                }
                let _ = stderr_tx.send(line);
            }
        }
        tail.make_contiguous().join("\n")
    };

    let run = async {
        let (stdout, stderr, status) = tokio::join!(read_stdout, read_stderr, child.wait());
        (stdout, stderr, status)
    };

    let result = tokio::time::timeout(timeout, run).await;
    match result {
        Ok((stdout, stderr, Ok(status))) => Ok(ProcessOutput {
            exit_code: status.code(),
            stdout,
            stderr,
        }),
        Ok((_, _, Err(e))) => Err(AppError::Job {
            message: format!("'{}' process failed: {}", tool.display(), e),
            stderr: String::new(),
        }),
        Err(_) => {
            log::error!("'{}' timed out after {}s, killing", tool.display(), timeout.as_secs());
            let _ = child.kill().await;
            Err(timeout_error(tool, timeout))
        }
    }
}
