//! Execution step for code running
//!
//! Writes the submission into a prepared workspace, runs it under node
//! through the flavor's bootstrap wrapper and classifies what came back.

use std::future::Future;
use std::path::PathBuf;
use std::time::Duration;

use tokio::process::Command;
use tracing::{debug, instrument, warn};

use crate::config::Config;
use crate::runner::ExecuteError;
use crate::types::ErrorKind;
use crate::workspace::{CapturedOutput, ProcessError, Workspace, run_captured};

/// Output reported when a run succeeds without printing anything
pub const NO_OUTPUT: &str = "No output";

/// Prefix of the output reported for a runtime error
pub const ERROR_PREFIX: &str = "Error: ";

/// What a run produced, before the manifest is read back
#[derive(Debug, Clone, PartialEq, Eq)]
pub struct RunOutput {
    pub output: String,

    /// `Some(RuntimeError)` when the output reports a failure in the code
    pub error_kind: Option<ErrorKind>,
}

/// Runs source text inside a prepared workspace
pub trait Executor: Send + Sync {
    fn run(
        &self,
        workspace: &Workspace,
        source: &str,
    ) -> impl Future<Output = Result<RunOutput, ExecuteError>> + Send;
}

/// Runs code with the node binary
#[derive(Debug, Clone)]
pub struct NodeExecutor {
    node_path: PathBuf,
    timeout: Duration,
    max_output: Option<usize>,
    benign_stderr: Vec<String>,
}

impl NodeExecutor {
    pub fn from_config(config: &Config) -> Self {
        Self {
            node_path: config.node_binary(),
            timeout: config.limits.run_timeout(),
            max_output: config.limits.max_output(),
            benign_stderr: config.benign_stderr.clone(),
        }
    }
}

impl Executor for NodeExecutor {
    #[instrument(skip_all, fields(flavor = %workspace.flavor()))]
    async fn run(&self, workspace: &Workspace, source: &str) -> Result<RunOutput, ExecuteError> {
        let flavor = workspace.flavor();
        workspace
            .write_file(&flavor.code_file(), source.as_bytes())
            .await?;
        workspace.write_bootstrap().await?;

        let mut command = Command::new(&self.node_path);
        command
            .arg(flavor.bootstrap_file())
            .current_dir(workspace.root())
            .env("NODE_PATH", workspace.node_modules());

        debug!(node = %self.node_path.display(), "running submission");

        let captured = run_captured(&mut command, Some(self.timeout), self.max_output)
            .await
            .map_err(|e| match e {
                ProcessError::TimedOut { limit, .. } => ExecuteError::TimedOut(limit),
                other => ExecuteError::Process(other),
            })?;

        if captured.truncated() {
            warn!(max_output = ?self.max_output, "submission output truncated");
        }

        classify(&captured, &self.benign_stderr)
    }
}

/// Decide what a finished run reports.
///
/// Standard error left after dropping benign lines is a runtime error and
/// becomes the output. Otherwise a failed exit is a process error, and a
/// clean exit reports standard output.
pub fn classify(captured: &CapturedOutput, benign: &[String]) -> Result<RunOutput, ExecuteError> {
    let stderr = significant_stderr(&captured.stderr_lossy(), benign);
    if !stderr.trim().is_empty() {
        return Ok(RunOutput {
            output: format!("{ERROR_PREFIX}{stderr}"),
            error_kind: Some(ErrorKind::RuntimeError),
        });
    }

    if !captured.success() {
        return Err(ExecuteError::Exited {
            exit_code: captured.exit_code(),
        });
    }

    let stdout = captured.stdout_lossy();
    let output = if stdout.is_empty() {
        NO_OUTPUT.to_string()
    } else {
        stdout
    };

    Ok(RunOutput {
        output,
        error_kind: None,
    })
}

/// Drop the lines of `stderr` that contain a benign pattern
pub fn significant_stderr(stderr: &str, benign: &[String]) -> String {
    stderr
        .lines()
        .filter(|line| !benign.iter().any(|pattern| line.contains(pattern.as_str())))
        .collect::<Vec<_>>()
        .join("\n")
}
