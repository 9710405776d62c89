//! Process spawning and output capture
//!
//! Runs a command to completion with both output streams drained
//! concurrently, an optional wall clock limit and an optional cap on the
//! bytes kept per stream.

use std::process::{ExitStatus, Stdio};
use std::time::Duration;

use thiserror::Error;
use tokio::io::{AsyncRead, AsyncReadExt};
use tokio::process::Command;
use tracing::{debug, instrument, warn};

const READ_CHUNK: usize = 8 * 1024;

/// Appended to a stream that hit the output cap
pub const TRUNCATION_MARKER: &str = "\n[output truncated]";

/// Errors that occur while running a subprocess
#[derive(Debug, Error)]
pub enum ProcessError {
    #[error("failed to spawn {program}: {source}")]
    Spawn {
        program: String,
        #[source]
        source: std::io::Error,
    },

    #[error("{program} timed out after {:.1}s", limit.as_secs_f64())]
    TimedOut { program: String, limit: Duration },

    #[error("I/O error while running {program}: {source}")]
    Io {
        program: String,
        #[source]
        source: std::io::Error,
    },
}

/// Exit status and captured streams of a finished process
#[derive(Debug)]
pub struct CapturedOutput {
    pub status: ExitStatus,
    pub stdout: Vec<u8>,
    pub stderr: Vec<u8>,

    /// stdout hit the output cap
    pub stdout_truncated: bool,

    /// stderr hit the output cap
    pub stderr_truncated: bool,
}

impl CapturedOutput {
    #[must_use]
    pub fn success(&self) -> bool {
        self.status.success()
    }

    pub fn exit_code(&self) -> Option<i32> {
        self.status.code()
    }

    #[must_use]
    pub fn truncated(&self) -> bool {
        self.stdout_truncated || self.stderr_truncated
    }

    pub fn stdout_lossy(&self) -> String {
        decode(&self.stdout, self.stdout_truncated)
    }

    pub fn stderr_lossy(&self) -> String {
        decode(&self.stderr, self.stderr_truncated)
    }

    /// stdout followed by stderr, newline-separated when both are present
    pub fn combined(&self) -> String {
        let mut combined = self.stdout_lossy();
        let stderr = self.stderr_lossy();
        if !combined.is_empty() && !stderr.is_empty() && !combined.ends_with('\n') {
            combined.push('\n');
        }
        combined.push_str(&stderr);
        combined
    }
}

/// Run `command` to completion and capture its output.
///
/// stdin is closed. When `timeout` elapses the process is killed and
/// [`ProcessError::TimedOut`] is returned. Output beyond `max_output` bytes
/// per stream is read and discarded so the child never blocks on a full
/// pipe.
#[instrument(skip(command), fields(program = ?command.as_std().get_program()))]
pub async fn run_captured(
    command: &mut Command,
    timeout: Option<Duration>,
    max_output: Option<usize>,
) -> Result<CapturedOutput, ProcessError> {
    let program = command
        .as_std()
        .get_program()
        .to_string_lossy()
        .into_owned();

    let mut child = command
        .stdin(Stdio::null())
        .stdout(Stdio::piped())
        .stderr(Stdio::piped())
        .kill_on_drop(true)
        .spawn()
        .map_err(|source| ProcessError::Spawn {
            program: program.clone(),
            source,
        })?;

    let io_error = |source| ProcessError::Io {
        program: program.clone(),
        source,
    };
    let missing_pipe = || {
        std::io::Error::new(std::io::ErrorKind::BrokenPipe, "output pipe not captured")
    };
    let stdout = child.stdout.take().ok_or_else(missing_pipe).map_err(io_error)?;
    let stderr = child.stderr.take().ok_or_else(missing_pipe).map_err(io_error)?;

    let cap = max_output.unwrap_or(usize::MAX);
    let collect = async {
        tokio::try_join!(drain(stdout, cap), drain(stderr, cap), child.wait())
    };

    let collected = match timeout {
        Some(limit) => {
            let waited = tokio::time::timeout(limit, collect).await;
            if let Ok(collected) = waited {
                collected
            } else {
                warn!(%program, ?limit, "process timed out, killing");
                if let Err(e) = child.kill().await {
                    warn!(%program, error = %e, "failed to kill timed out process");
                }
                return Err(ProcessError::TimedOut { program, limit });
            }
        }
        None => collect.await,
    };
    let ((stdout, stdout_truncated), (stderr, stderr_truncated), status) =
        collected.map_err(io_error)?;

    debug!(
        %program,
        exit_code = ?status.code(),
        stdout_len = stdout.len(),
        stderr_len = stderr.len(),
        "process finished"
    );

    Ok(CapturedOutput {
        status,
        stdout,
        stderr,
        stdout_truncated,
        stderr_truncated,
    })
}

/// Decode captured bytes. A capped stream loses the character the cap split
/// and ends with [`TRUNCATION_MARKER`].
fn decode(bytes: &[u8], truncated: bool) -> String {
    if !truncated {
        return String::from_utf8_lossy(bytes).into_owned();
    }
    let end = bytes.len() - incomplete_tail(bytes);
    let mut text = String::from_utf8_lossy(&bytes[..end]).into_owned();
    text.push_str(TRUNCATION_MARKER);
    text
}

/// Length of a UTF-8 sequence left unfinished at the end of `bytes`
fn incomplete_tail(bytes: &[u8]) -> usize {
    let len = bytes.len();
    for back in 1..=len.min(4) {
        let byte = bytes[len - back];
        if byte & 0b1100_0000 != 0b1000_0000 {
            let width = match byte {
                0xC0..=0xDF => 2,
                0xE0..=0xEF => 3,
                0xF0..=0xF7 => 4,
                _ => 1,
            };
            return if width > back { back } else { 0 };
        }
    }
    0
}

/// Read `reader` to EOF, keeping at most `cap` bytes
async fn drain<R>(mut reader: R, cap: usize) -> std::io::Result<(Vec<u8>, bool)>
where
    R: AsyncRead + Unpin,
{
    let mut kept = Vec::new();
    let mut truncated = false;
    let mut chunk = vec![0u8; READ_CHUNK];

    loop {
        let read = reader.read(&mut chunk).await?;
        if read == 0 {
            break;
        }
        let room = cap.saturating_sub(kept.len());
        if read > room {
            truncated = true;
        }
        kept.extend_from_slice(&chunk[..read.min(room)]);
    }

    Ok((kept, truncated))
}
