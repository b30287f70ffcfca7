//! Blocking subprocess execution with explicit timeouts.
//!
//! Every external interaction in this crate (encryption tool, key
//! generation, cluster queries) goes through [`run`]. The child's stdio is
//! drained on background threads while the parent polls for exit, so large
//! outputs cannot deadlock the pipe buffers; on deadline the child is
//! killed and the call reported as timed out.

use std::io::Read;
use std::process::{Command, Stdio};
use std::time::{Duration, Instant};

/// Poll interval while waiting for a child process to exit.
const POLL_INTERVAL: Duration = Duration::from_millis(25);

/// Captured result of a finished subprocess.
#[derive(Debug)]
pub(crate) struct ProcessOutput {
    /// Whether the child exited with status zero.
    pub success: bool,
    /// Captured standard output.
    pub stdout: Vec<u8>,
    /// Captured standard error.
    pub stderr: Vec<u8>,
}

impl ProcessOutput {
    /// The error stream as trimmed text, for diagnostics.
    pub fn stderr_text(&self) -> String {
        String::from_utf8_lossy(&self.stderr).trim().to_string()
    }

    /// The output stream as text.
    pub fn stdout_text(&self) -> String {
        String::from_utf8_lossy(&self.stdout).into_owned()
    }
}

/// Failure modes of [`run`], mapped by callers onto domain errors.
#[derive(Debug)]
pub(crate) enum ProcessError {
    /// The binary does not exist on `PATH`.
    Missing(std::io::Error),
    /// Spawning or waiting failed for another reason.
    Io(std::io::Error),
    /// The child did not exit before the deadline and was killed.
    TimedOut,
}

/// Renders a command as the string shown in diagnostics, e.g.
/// `sops --encrypt --in-place /path/file.enc.yaml`.
pub(crate) fn display_command(command: &Command) -> String {
    let mut rendered = command.get_program().to_string_lossy().into_owned();
    for arg in command.get_args() {
        rendered.push(' ');
        rendered.push_str(&arg.to_string_lossy());
    }
    rendered
}

/// Runs a command to completion, enforcing `timeout`.
///
/// Stdin is closed; stdout and stderr are captured in full.
pub(crate) fn run(
    command: &mut Command,
    timeout: Duration,
) -> Result<ProcessOutput, ProcessError> {
    let mut child = command
        .stdin(Stdio::null())
        .stdout(Stdio::piped())
        .stderr(Stdio::piped())
        .spawn()
        .map_err(|e| {
            if e.kind() == std::io::ErrorKind::NotFound {
                ProcessError::Missing(e)
            } else {
                ProcessError::Io(e)
            }
        })?;

    let stdout_handle = child.stdout.take().map(spawn_reader);
    let stderr_handle = child.stderr.take().map(spawn_reader);

    let deadline = Instant::now() + timeout;
    let status = loop {
        match child.try_wait() {
            Ok(Some(status)) => break status,
            Ok(None) => {
                if Instant::now() >= deadline {
                    // Best effort; the child may have exited in the window.
                    let _ = child.kill();
                    let _ = child.wait();
                    return Err(ProcessError::TimedOut);
                }
                std::thread::sleep(POLL_INTERVAL);
            }
            Err(e) => return Err(ProcessError::Io(e)),
        }
    };

    let stdout = join_reader(stdout_handle);
    let stderr = join_reader(stderr_handle);

    Ok(ProcessOutput {
        success: status.success(),
        stdout,
        stderr,
    })
}

fn spawn_reader<R: Read + Send + 'static>(mut source: R) -> std::thread::JoinHandle<Vec<u8>> {
    std::thread::spawn(move || {
        let mut buffer = Vec::new();
        let _ = source.read_to_end(&mut buffer);
        buffer
    })
}

fn join_reader(handle: Option<std::thread::JoinHandle<Vec<u8>>>) -> Vec<u8> {
    handle
        .and_then(|h| h.join().ok())
        .unwrap_or_default()
}
