//! Subprocess execution shared by the command-line adapters.
//!
//! [`run_captured`] spawns a prepared [`tokio::process::Command`], optionally
//! feeds it standard input, captures both output streams up to a byte cap,
//! and enforces an optional timeout.

use std::io;
use std::process::{ExitStatus, Stdio};
use std::time::Duration;

use thiserror::Error;
use tokio::io::{AsyncRead, AsyncReadExt, AsyncWriteExt};
use tokio::process::Command;

/// Maximum bytes captured per output stream (1 MiB).
pub const MAX_OUTPUT_BYTES: u64 = 1024 * 1024;

/// Captured result of a finished process.
#[derive(Debug, Clone)]
pub struct CommandOutput {
    /// Exit status.
    pub status: ExitStatus,
    /// Standard output, lossily decoded.
    pub stdout: String,
    /// Standard error, lossily decoded.
    pub stderr: String,
}

impl CommandOutput {
    /// Returns whether the process exited with status zero.
    #[must_use]
    pub fn success(&self) -> bool {
        self.status.success()
    }

    /// Returns standard error, or standard output when standard error is
    /// empty, trimmed.
    #[must_use]
    pub fn diagnostic(&self) -> String {
        let stderr = self.stderr.trim();
        if stderr.is_empty() {
            self.stdout.trim().to_owned()
        } else {
            stderr.to_owned()
        }
    }
}

/// Errors returned while running a subprocess.
#[derive(Debug, Error)]
pub enum ProcessError {
    /// The process could not be started.
    #[error("failed to start process: {0}")]
    Spawn(#[source] io::Error),

    /// Waiting on the process failed.
    #[error("failed to wait for process: {0}")]
    Wait(#[source] io::Error),

    /// The process exceeded its time budget and was killed.
    #[error("process timed out after {} seconds", .0.as_secs())]
    TimedOut(Duration),
}

/// Runs `command` to completion and captures its output.
///
/// On unix the child leads its own process group. When the timeout elapses
/// the whole group is killed, so background children that still hold the
/// output pipes cannot keep the call alive.
///
/// # Errors
///
/// Returns [`ProcessError`] when the process cannot be started, waited on,
/// or exceeds `timeout`.
pub async fn run_captured(
    command: &mut Command,
    stdin: Option<Vec<u8>>,
    timeout: Option<Duration>,
) -> Result<CommandOutput, ProcessError> {
    command
        .stdin(if stdin.is_some() {
            Stdio::piped()
        } else {
            Stdio::null()
        })
        .stdout(Stdio::piped())
        .stderr(Stdio::piped())
        .kill_on_drop(true);
    #[cfg(unix)]
    command.process_group(0);

    let mut child = command.spawn().map_err(ProcessError::Spawn)?;
    let group = child.id();

    if let (Some(mut pipe), Some(bytes)) = (child.stdin.take(), stdin) {
        tokio::spawn(async move {
            if let Err(error) = pipe.write_all(&bytes).await {
                tracing::debug!(%error, "child closed standard input early");
            }
        });
    }

    let mut stdout_task = tokio::spawn(read_stream(child.stdout.take()));
    let mut stderr_task = tokio::spawn(read_stream(child.stderr.take()));

    let collected = async {
        let status = child.wait().await.map_err(ProcessError::Wait)?;
        let stdout = (&mut stdout_task).await.unwrap_or_default();
        let stderr = (&mut stderr_task).await.unwrap_or_default();
        Ok::<_, ProcessError>(CommandOutput {
            status,
            stdout: String::from_utf8_lossy(&stdout).into_owned(),
            stderr: String::from_utf8_lossy(&stderr).into_owned(),
        })
    };

    let Some(limit) = timeout else {
        return collected.await;
    };
    let waited = tokio::time::timeout(limit, collected).await;
    match waited {
        Ok(result) => result,
        Err(_) => {
            kill_group(group);
            stdout_task.abort();
            stderr_task.abort();
            Err(ProcessError::TimedOut(limit))
        }
    }
}

/// Sends `SIGKILL` to the process group led by `leader`.
#[cfg(unix)]
fn kill_group(leader: Option<u32>) {
    use nix::sys::signal::{Signal, killpg};
    use nix::unistd::Pid;

    let Some(pid) = leader.and_then(|id| i32::try_from(id).ok()) else {
        return;
    };
    if let Err(error) = killpg(Pid::from_raw(pid), Signal::SIGKILL) {
        tracing::debug!(%error, pid, "process group already gone");
    }
}

#[cfg(not(unix))]
const fn kill_group(_leader: Option<u32>) {}

/// Reads a stream to the end, keeping at most [`MAX_OUTPUT_BYTES`].
///
/// Bytes past the cap are drained so the child never blocks on a full pipe.
async fn read_stream<R: AsyncRead + Unpin>(handle: Option<R>) -> Vec<u8> {
    let mut buffer = Vec::new();
    let Some(mut stream) = handle else {
        return buffer;
    };
    if let Err(error) = (&mut stream)
        .take(MAX_OUTPUT_BYTES)
        .read_to_end(&mut buffer)
        .await
    {
        tracing::debug!(%error, "failed to read child output");
        return buffer;
    }
    if let Err(error) = tokio::io::copy(&mut stream, &mut tokio::io::sink()).await {
        tracing::debug!(%error, "failed to drain child output");
    }
    buffer
}
