//! Code runner for runjs
//!
//! Ties the pipeline together: extract dependencies, lock and prepare the
//! flavor's workspace, install what is missing, run the code and read the
//! manifest back.

use std::time::Duration;

use thiserror::Error;
use tracing::{debug, info, instrument};

pub use crate::runner::execute::{
    ERROR_PREFIX, Executor, NO_OUTPUT, NodeExecutor, RunOutput, classify, significant_stderr,
};
pub use crate::runner::install::ensure_installed;

mod execute;
mod install;

use crate::config::Config;
use crate::extract::extract_packages;
use crate::types::{ErrorKind, ExecutionRequest, ExecutionResult, InstalledPackage};
use crate::workspace::{
    InstallError, Npm, PackageManager, ProcessError, WorkspaceError, WorkspaceStore,
};

/// Errors that occur while running the submission itself
#[derive(Debug, Error)]
pub enum ExecuteError {
    #[error("execution timed out after {:.1}s", .0.as_secs_f64())]
    TimedOut(Duration),

    #[error("node exited with code {exit_code:?} and no error output")]
    Exited { exit_code: Option<i32> },

    #[error("failed to run node: {0}")]
    Process(#[source] ProcessError),

    #[error("workspace error: {0}")]
    Workspace(#[from] WorkspaceError),
}

/// Errors that abort a run
///
/// Failures inside the submitted code are not errors; they are reported in
/// [`ExecutionResult::output`].
#[derive(Debug, Error)]
pub enum RunError {
    #[error("workspace error: {0}")]
    Workspace(#[from] WorkspaceError),

    #[error("failed to install packages: {0}")]
    Install(#[from] InstallError),

    #[error("execution failed: {0}")]
    Execute(#[from] ExecuteError),
}

impl RunError {
    pub fn kind(&self) -> ErrorKind {
        match self {
            RunError::Workspace(_) | RunError::Execute(ExecuteError::Workspace(_)) => {
                ErrorKind::WorkspaceError
            }
            RunError::Install(_) => ErrorKind::InstallError,
            RunError::Execute(ExecuteError::TimedOut(_)) => ErrorKind::Timeout,
            RunError::Execute(ExecuteError::Exited { .. } | ExecuteError::Process(_)) => {
                ErrorKind::ProcessError
            }
        }
    }
}

/// High-level runner for code execution
#[derive(Debug)]
pub struct Runner<P = Npm, E = NodeExecutor> {
    store: WorkspaceStore,
    package_manager: P,
    executor: E,
}

impl Runner {
    /// Create a runner that uses npm and node as configured
    pub fn new(config: &Config) -> Self {
        Self::with_parts(
            WorkspaceStore::new(&config.workspace_root),
            Npm::from_config(config),
            NodeExecutor::from_config(config),
        )
    }
}

impl<P: PackageManager, E: Executor> Runner<P, E> {
    pub fn with_parts(store: WorkspaceStore, package_manager: P, executor: E) -> Self {
        Self {
            store,
            package_manager,
            executor,
        }
    }

    pub fn store(&self) -> &WorkspaceStore {
        &self.store
    }

    pub fn package_manager(&self) -> &P {
        &self.package_manager
    }

    /// Run one submission end to end.
    ///
    /// The flavor's workspace stays locked from preparation until the
    /// manifest has been read back, so concurrent submissions of the same
    /// flavor run one at a time.
    #[instrument(skip_all, fields(flavor = %request.flavor))]
    pub async fn execute(&self, request: &ExecutionRequest) -> Result<ExecutionResult, RunError> {
        let packages = extract_packages(&request.source);
        debug!(?packages, "extracted packages");

        let workspace = self
            .store
            .acquire(request.flavor, &self.package_manager)
            .await?;

        let outcome = ensure_installed(&workspace, &packages, &self.package_manager).await?;
        if outcome.invoked_package_manager() {
            debug!(output = %outcome.raw_output, "package manager output");
        }

        let run = self.executor.run(&workspace, &request.source).await?;
        let installed_packages = workspace.installed_packages().await?;

        info!(
            installed = outcome.newly_installed.len(),
            error_kind = ?run.error_kind,
            "execution complete"
        );

        Ok(ExecutionResult {
            output: run.output,
            installed_packages,
            flavor: request.flavor,
            error_kind: run.error_kind,
        })
    }

    /// Dependencies across every workspace
    pub async fn installed_packages(&self) -> Vec<InstalledPackage> {
        self.store.installed_packages().await
    }
}
