//! External transform invocation with a hard per-call timeout.
//!
//! Every call into the measurement/rendering transform is synchronous and
//! blocking. On deadline the child process is killed and a timeout error
//! propagates up, aborting the session.

use std::io::{self, Read};
use std::process::{Child, Command, Stdio};
use std::thread;
use std::time::{Duration, Instant};

use thiserror::Error;

/// How much stderr to keep in error messages.
const STDERR_TAIL_CHARS: usize = 400;

/// Poll interval while waiting for the child to exit.
const WAIT_POLL: Duration = Duration::from_millis(25);

/// Errors from running the external transform.
#[derive(Error, Debug)]
pub enum ToolError {
    #[error("failed to spawn {tool}: {source}")]
    Spawn {
        tool: String,
        #[source]
        source: io::Error,
    },

    #[error("{tool} timed out after {seconds}s")]
    Timeout { tool: String, seconds: u64 },

    #[error("{tool} failed with exit code {exit_code}: {detail}")]
    Failed {
        tool: String,
        exit_code: i32,
        detail: String,
    },

    #[error("I/O error while running {tool}: {source}")]
    Io {
        tool: String,
        #[source]
        source: io::Error,
    },
}

/// Captured output of a finished transform invocation.
#[derive(Debug)]
pub struct ToolOutput {
    /// Raw stdout bytes (sample data for decode calls).
    pub stdout: Vec<u8>,
    /// Stderr text (the transform writes its reports here).
    pub stderr: String,
}

/// Run a prepared command, enforcing the timeout.
///
/// stdout and stderr are drained on dedicated threads while the child is
/// polled, so a chatty transform can never fill a pipe and deadlock.
pub fn run_with_timeout(
    cmd: &mut Command,
    tool: &str,
    timeout: Duration,
) -> Result<ToolOutput, ToolError> {
    cmd.stdin(Stdio::null())
        .stdout(Stdio::piped())
        .stderr(Stdio::piped());

    tracing::debug!(tool, command = ?cmd, "running external transform");

    let mut child = cmd.spawn().map_err(|e| ToolError::Spawn {
        tool: tool.to_string(),
        source: e,
    })?;

    let stdout_reader = spawn_reader(child.stdout.take());
    let stderr_reader = spawn_reader(child.stderr.take());

    let started = Instant::now();
    let status = loop {
        match child.try_wait() {
            Ok(Some(status)) => break status,
            Ok(None) => {
                if started.elapsed() >= timeout {
                    kill_child(&mut child, tool);
                    return Err(ToolError::Timeout {
                        tool: tool.to_string(),
                        seconds: timeout.as_secs(),
                    });
                }
                thread::sleep(WAIT_POLL);
            }
            Err(e) => {
                kill_child(&mut child, tool);
                return Err(ToolError::Io {
                    tool: tool.to_string(),
                    source: e,
                });
            }
        }
    };

    let stdout = stdout_reader.join().unwrap_or_default();
    let stderr_bytes = stderr_reader.join().unwrap_or_default();
    let stderr = String::from_utf8_lossy(&stderr_bytes).into_owned();

    if !status.success() {
        return Err(ToolError::Failed {
            tool: tool.to_string(),
            exit_code: status.code().unwrap_or(-1),
            detail: tail(&stderr, STDERR_TAIL_CHARS),
        });
    }

    Ok(ToolOutput { stdout, stderr })
}

fn spawn_reader<R: Read + Send + 'static>(
    source: Option<R>,
) -> thread::JoinHandle<Vec<u8>> {
    thread::spawn(move || {
        let mut buffer = Vec::new();
        if let Some(mut reader) = source {
            let _ = reader.read_to_end(&mut buffer);
        }
        buffer
    })
}

fn kill_child(child: &mut Child, tool: &str) {
    if let Err(e) = child.kill() {
        tracing::warn!(tool, error = %e, "failed to kill transform child");
    }
    let _ = child.wait();
}

/// Last `chars` characters of a string, on a char boundary.
pub fn tail(text: &str, chars: usize) -> String {
    let count = text.chars().count();
    if count <= chars {
        return text.to_string();
    }
    text.chars().skip(count - chars).collect()
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn successful_command_captures_output() {
        let mut cmd = Command::new("sh");
        cmd.arg("-c").arg("echo out; echo err >&2");
        let output = run_with_timeout(&mut cmd, "sh", Duration::from_secs(5)).unwrap();
        assert_eq!(String::from_utf8_lossy(&output.stdout).trim(), "out");
        assert_eq!(output.stderr.trim(), "err");
    }

    #[test]
    fn failing_command_reports_exit_code_and_stderr() {
        let mut cmd = Command::new("sh");
        cmd.arg("-c").arg("echo broken >&2; exit 3");
        let err = run_with_timeout(&mut cmd, "sh", Duration::from_secs(5)).unwrap_err();
        match err {
            ToolError::Failed {
                exit_code, detail, ..
            } => {
                assert_eq!(exit_code, 3);
                assert!(detail.contains("broken"));
            }
            other => panic!("unexpected error: {other}"),
        }
    }

    #[test]
    fn hung_command_is_killed_on_timeout() {
        let mut cmd = Command::new("sleep");
        cmd.arg("30");
        let started = Instant::now();
        let err = run_with_timeout(&mut cmd, "sleep", Duration::from_millis(200)).unwrap_err();
        assert!(matches!(err, ToolError::Timeout { .. }));
        assert!(started.elapsed() < Duration::from_secs(5));
    }

    #[test]
    fn missing_binary_is_a_spawn_error() {
        let mut cmd = Command::new("definitely-not-a-real-binary");
        let err = run_with_timeout(&mut cmd, "transform", Duration::from_secs(1)).unwrap_err();
        assert!(matches!(err, ToolError::Spawn { .. }));
    }

    #[test]
    fn tail_respects_char_boundaries() {
        assert_eq!(tail("abcdef", 3), "def");
        assert_eq!(tail("ab", 10), "ab");
        assert_eq!(tail("héllo", 4), "éllo");
    }
}
