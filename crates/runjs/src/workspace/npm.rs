//! Package manager invocation
//!
//! Builds npm command lines and runs them inside a workspace directory.

use std::fmt;
use std::future::Future;
use std::path::{Path, PathBuf};
use std::time::Duration;

use tokio::process::Command;
use tracing::{debug, info, instrument, warn};

use crate::config::Config;
use crate::types::PackageSet;
use crate::workspace::process::{ProcessError, run_captured};
use crate::workspace::InstallError;

/// Installs and removes packages in a workspace directory.
///
/// Implementations record changes in the workspace's `package.json`.
/// Both operations return the package manager's combined output.
pub trait PackageManager: Send + Sync {
    fn install(
        &self,
        dir: &Path,
        packages: &PackageSet,
    ) -> impl Future<Output = Result<String, InstallError>> + Send;

    fn uninstall(
        &self,
        dir: &Path,
        packages: &PackageSet,
    ) -> impl Future<Output = Result<String, InstallError>> + Send;
}

/// Builder for npm command-line arguments
#[derive(Debug)]
pub struct NpmCommand {
    /// Path to npm binary
    npm_path: PathBuf,
    action: NpmAction,
    packages: Vec<String>,
    /// --no-audit
    audit: bool,
    /// --no-fund
    fund: bool,
}

impl NpmCommand {
    pub fn new(npm_path: impl Into<PathBuf>) -> Self {
        Self {
            npm_path: npm_path.into(),
            action: NpmAction::Install,
            packages: Vec::new(),
            audit: false,
            fund: false,
        }
    }

    pub fn action(mut self, action: NpmAction) -> Self {
        self.action = action;
        self
    }

    pub fn packages(mut self, packages: impl IntoIterator<Item = impl Into<String>>) -> Self {
        self.packages.extend(packages.into_iter().map(Into::into));
        self
    }

    /// Let npm run its security audit after installing
    pub fn audit(mut self, enable: bool) -> Self {
        self.audit = enable;
        self
    }

    /// Let npm print funding notices
    pub fn fund(mut self, enable: bool) -> Self {
        self.fund = enable;
        self
    }

    /// Build the command-line arguments
    pub fn build(self) -> Vec<String> {
        let mut args = vec![
            self.npm_path.to_string_lossy().into_owned(),
            self.action.subcommand().to_string(),
        ];

        if !self.audit {
            args.push("--no-audit".to_string());
        }
        if !self.fund {
            args.push("--no-fund".to_string());
        }

        args.extend(self.packages);
        args
    }
}

#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub enum NpmAction {
    Install,
    Uninstall,
}

impl NpmAction {
    fn subcommand(self) -> &'static str {
        match self {
            NpmAction::Install => "install",
            NpmAction::Uninstall => "uninstall",
        }
    }
}

impl fmt::Display for NpmAction {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        write!(f, "npm {}", self.subcommand())
    }
}

/// The npm CLI
#[derive(Debug, Clone)]
pub struct Npm {
    npm_path: PathBuf,
    timeout: Option<Duration>,
    max_output: Option<usize>,
}

impl Npm {
    pub fn new(npm_path: impl Into<PathBuf>) -> Self {
        Self {
            npm_path: npm_path.into(),
            timeout: None,
            max_output: None,
        }
    }

    pub fn from_config(config: &Config) -> Self {
        Self {
            npm_path: config.npm_binary(),
            timeout: config.limits.install_timeout(),
            max_output: config.limits.max_output(),
        }
    }

    #[instrument(skip_all, fields(dir = %dir.display(), ?action))]
    async fn run(
        &self,
        action: NpmAction,
        dir: &Path,
        packages: &PackageSet,
    ) -> Result<String, InstallError> {
        let args = NpmCommand::new(&self.npm_path)
            .action(action)
            .packages(packages.iter().cloned())
            .build();

        info!(?packages, "running package manager");
        debug!(?args, "npm command");

        let (program, rest) = args.split_first().ok_or_else(|| InstallError::Failed {
            action,
            exit_code: None,
            output: "empty command arguments".to_string(),
        })?;
        let mut command = Command::new(program);
        command.args(rest).current_dir(dir);

        let output = run_captured(&mut command, self.timeout, self.max_output)
            .await
            .map_err(|e| match e {
                ProcessError::TimedOut { limit, .. } => InstallError::TimedOut { action, limit },
                other => InstallError::Process(other),
            })?;

        let combined = output.combined();
        if !output.success() {
            warn!(exit_code = ?output.exit_code(), "package manager failed");
            return Err(InstallError::Failed {
                action,
                exit_code: output.exit_code(),
                output: combined,
            });
        }

        Ok(combined)
    }
}

impl PackageManager for Npm {
    async fn install(&self, dir: &Path, packages: &PackageSet) -> Result<String, InstallError> {
        self.run(NpmAction::Install, dir, packages).await
    }

    async fn uninstall(&self, dir: &Path, packages: &PackageSet) -> Result<String, InstallError> {
        self.run(NpmAction::Uninstall, dir, packages).await
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn test_install_command() {
        let args = NpmCommand::new("npm")
            .action(NpmAction::Install)
            .packages(["axios", "left-pad"])
            .build();
        assert_eq!(
            args,
            vec!["npm", "install", "--no-audit", "--no-fund", "axios", "left-pad"]
        );
    }

    #[test]
    fn test_uninstall_command() {
        let args = NpmCommand::new("/usr/bin/npm")
            .action(NpmAction::Uninstall)
            .packages(["lodash"])
            .build();
        assert_eq!(
            args,
            vec!["/usr/bin/npm", "uninstall", "--no-audit", "--no-fund", "lodash"]
        );
    }

    #[test]
    fn test_audit_and_fund_enabled() {
        let args = NpmCommand::new("npm").audit(true).fund(true).build();
        assert_eq!(args, vec!["npm", "install"]);
    }

    #[test]
    fn test_scoped_package_passed_whole() {
        let args = NpmCommand::new("npm").packages(["@scope/pkg"]).build();
        assert_eq!(args.last().map(String::as_str), Some("@scope/pkg"));
    }

    #[test]
    fn test_action_display() {
        assert_eq!(NpmAction::Install.to_string(), "npm install");
        assert_eq!(NpmAction::Uninstall.to_string(), "npm uninstall");
    }

    #[tokio::test]
    async fn test_missing_binary_is_process_error() {
        let dir = tempfile::tempdir().unwrap();
        let npm = Npm::new("/nonexistent/npm");
        let packages = PackageSet::from(["left-pad".to_string()]);

        let result = npm.install(dir.path(), &packages).await;
        assert!(matches!(result, Err(InstallError::Process(_))));
    }

    #[cfg(unix)]
    #[tokio::test]
    async fn test_failing_binary_is_failed() {
        let dir = tempfile::tempdir().unwrap();
        let npm = Npm::new("false");
        let packages = PackageSet::from(["left-pad".to_string()]);

        let result = npm.install(dir.path(), &packages).await;
        assert!(matches!(
            result,
            Err(InstallError::Failed {
                action: NpmAction::Install,
                ..
            })
        ));
    }
}
