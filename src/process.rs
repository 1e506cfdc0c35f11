//! Bounded external process execution.
//!
//! Every external tool (ExifTool, Meshroom) runs through [`run_streaming`],
//! which enforces a wall-clock timeout and kills the child when it is
//! exceeded. Stdout is delivered line by line as it is produced; stderr is
//! collected for error messages.

use std::{
    io::{BufRead, BufReader, ErrorKind, Read},
    process::{Command, ExitStatus, Stdio},
    sync::mpsc::{self, RecvTimeoutError},
    thread,
    time::{Duration, Instant},
};

use crate::error::{ProcessFailure, VidmeshError};

const POLL_INTERVAL: Duration = Duration::from_millis(50);

/// Maximum number of stderr bytes quoted in an error message.
const STDERR_EXCERPT: usize = 2000;

/// Captured output of a finished tool.
#[derive(Debug, Clone)]
pub struct ToolOutput {
    /// Everything written to stdout.
    pub stdout: String,
    /// Everything written to stderr.
    pub stderr: String,
    /// Exit status.
    pub status: ExitStatus,
}

/// Run `command` to completion, failing after `timeout`.
///
/// # Errors
///
/// Returns [`VidmeshError::Process`] if the tool cannot be found or started,
/// exits unsuccessfully, or exceeds `timeout`.
pub fn run_with_timeout(
    command: Command,
    tool: &str,
    timeout: Duration,
) -> Result<ToolOutput, VidmeshError> {
    run_streaming(command, tool, timeout, |_| {})
}

/// Run `command`, passing each stdout line to `on_line` as it arrives.
///
/// # Errors
///
/// Same as [`run_with_timeout`].
pub fn run_streaming<F>(
    mut command: Command,
    tool: &str,
    timeout: Duration,
    mut on_line: F,
) -> Result<ToolOutput, VidmeshError>
where
    F: FnMut(&str),
{
    log::debug!("Running {command:?} (timeout {}s)", timeout.as_secs());

    let mut child = command
        .stdin(Stdio::null())
        .stdout(Stdio::piped())
        .stderr(Stdio::piped())
        .spawn()
        .map_err(|error| {
            let failure = if error.kind() == ErrorKind::NotFound {
                ProcessFailure::NotFound
            } else {
                ProcessFailure::Spawn
            };
            VidmeshError::process(tool, failure, error.to_string())
        })?;

    let deadline = Instant::now() + timeout;

    let (sender, receiver) = mpsc::channel::<String>();
    let stdout_reader = child.stdout.take().map(|stdout| {
        thread::spawn(move || {
            for line in BufReader::new(stdout).lines() {
                let Ok(line) = line else { break };
                if sender.send(line).is_err() {
                    break;
                }
            }
        })
    });
    let stderr_reader = child.stderr.take().map(|mut stderr| {
        thread::spawn(move || {
            let mut buffer = String::new();
            let _ = stderr.read_to_string(&mut buffer);
            buffer
        })
    });

    let mut stdout = String::new();
    let timed_out = loop {
        let remaining = deadline.saturating_duration_since(Instant::now());
        if remaining.is_zero() {
            break true;
        }
        match receiver.recv_timeout(remaining.min(POLL_INTERVAL * 4)) {
            Ok(line) => {
                on_line(&line);
                stdout.push_str(&line);
                stdout.push('\n');
            }
            Err(RecvTimeoutError::Timeout) => continue,
            Err(RecvTimeoutError::Disconnected) => break false,
        }
    };

    let status = if timed_out {
        None
    } else {
        wait_until(&mut child, deadline, tool)?
    };

    let Some(status) = status else {
        log::warn!("{tool} exceeded {}s, killing it", timeout.as_secs());
        let _ = child.kill();
        let _ = child.wait();
        return Err(VidmeshError::process(
            tool,
            ProcessFailure::Timeout(timeout),
            "process killed",
        ));
    };

    if let Some(handle) = stdout_reader {
        let _ = handle.join();
    }
    let stderr = stderr_reader
        .and_then(|handle| handle.join().ok())
        .unwrap_or_default();

    if !status.success() {
        return Err(VidmeshError::process(
            tool,
            ProcessFailure::ExitStatus(status.code()),
            excerpt(&stderr),
        ));
    }

    Ok(ToolOutput {
        stdout,
        stderr,
        status,
    })
}

/// Wait for the child to exit. Returns `None` if the deadline passes first.
fn wait_until(
    child: &mut std::process::Child,
    deadline: Instant,
    tool: &str,
) -> Result<Option<ExitStatus>, VidmeshError> {
    loop {
        match child.try_wait() {
            Ok(Some(status)) => return Ok(Some(status)),
            Ok(None) if Instant::now() >= deadline => return Ok(None),
            Ok(None) => thread::sleep(POLL_INTERVAL),
            Err(error) => {
                return Err(VidmeshError::process(
                    tool,
                    ProcessFailure::Spawn,
                    error.to_string(),
                ));
            }
        }
    }
}

/// Last part of a tool's stderr, trimmed.
fn excerpt(stderr: &str) -> String {
    let trimmed = stderr.trim();
    if trimmed.len() <= STDERR_EXCERPT {
        return trimmed.to_string();
    }
    let mut start = trimmed.len() - STDERR_EXCERPT;
    while !trimmed.is_char_boundary(start) {
        start += 1;
    }
    format!("...{}", &trimmed[start..])
}

#[cfg(all(test, unix))]
mod tests {
    use super::*;

    fn shell(script: &str) -> Command {
        let mut command = Command::new("sh");
        command.arg("-c").arg(script);
        command
    }

    #[test]
    fn streams_stdout_lines() {
        let mut lines = Vec::new();
        let output = run_streaming(
            shell("echo one; echo two"),
            "sh",
            Duration::from_secs(10),
            |line| lines.push(line.to_string()),
        )
        .unwrap();
        assert_eq!(lines, vec!["one", "two"]);
        assert_eq!(output.stdout, "one\ntwo\n");
    }

    #[test]
    fn nonzero_exit_reports_code_and_stderr() {
        let error = run_with_timeout(shell("echo broken >&2; exit 3"), "sh", Duration::from_secs(10))
            .unwrap_err();
        match error {
            VidmeshError::Process { failure, detail, .. } => {
                assert_eq!(failure, ProcessFailure::ExitStatus(Some(3)));
                assert_eq!(detail, "broken");
            }
            other => panic!("unexpected error: {other}"),
        }
    }

    #[test]
    fn slow_tool_is_killed() {
        let started = Instant::now();
        let error =
            run_with_timeout(shell("sleep 30"), "sh", Duration::from_millis(300)).unwrap_err();
        assert!(matches!(
            error,
            VidmeshError::Process {
                failure: ProcessFailure::Timeout(_),
                ..
            }
        ));
        assert!(started.elapsed() < Duration::from_secs(10));
    }

    #[test]
    fn missing_binary_is_not_found() {
        let error = run_with_timeout(
            Command::new("vidmesh-no-such-tool"),
            "vidmesh-no-such-tool",
            Duration::from_secs(1),
        )
        .unwrap_err();
        assert!(matches!(
            error,
            VidmeshError::Process {
                failure: ProcessFailure::NotFound,
                ..
            }
        ));
    }
}
