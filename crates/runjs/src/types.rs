use std::collections::BTreeSet;
use std::fmt;

use serde::{Deserialize, Serialize};

use crate::config::ModuleFlavor;

/// Base names of the external packages a submission references.
///
/// Ordered so that installs and logs are deterministic.
pub type PackageSet = BTreeSet<String>;

/// A submission to run
#[derive(Debug, Clone)]
pub struct ExecutionRequest {
    /// JavaScript source text, written verbatim to the workspace
    pub source: String,

    /// Module system the source is written in
    pub flavor: ModuleFlavor,
}

impl ExecutionRequest {
    pub fn new(source: impl Into<String>, flavor: ModuleFlavor) -> Self {
        Self {
            source: source.into(),
            flavor,
        }
    }
}

/// A dependency entry of a workspace manifest
#[derive(Debug, Clone, PartialEq, Eq, Serialize, Deserialize)]
pub struct InstalledPackage {
    pub name: String,

    /// Version range as recorded by the package manager (e.g. `^1.3.0`)
    pub version: String,
}

/// What the installer did for one submission. Diagnostic only.
#[derive(Debug, Clone, Default)]
pub struct InstallationOutcome {
    /// Requested packages the manifest already listed
    pub already_satisfied: PackageSet,

    /// Packages handed to the package manager
    pub newly_installed: PackageSet,

    /// Combined stdout/stderr of the package manager (empty on the fast path)
    pub raw_output: String,
}

impl InstallationOutcome {
    /// Whether the package manager was invoked
    #[must_use]
    pub fn invoked_package_manager(&self) -> bool {
        !self.newly_installed.is_empty()
    }
}

/// Classification of a failed or degraded run
#[derive(Debug, Clone, Copy, PartialEq, Eq, Serialize, Deserialize)]
pub enum ErrorKind {
    /// Filesystem failure while preparing the workspace
    WorkspaceError,

    /// The package manager exited unsuccessfully
    InstallError,

    /// The submitted code raised or wrote to stderr; reported inside the output
    RuntimeError,

    /// The runtime could not be spawned or exited abnormally without stderr
    ProcessError,

    /// The run exceeded its wall clock limit and was killed
    Timeout,

    /// Rejected by the rate limiter before any work was done
    RateLimited,
}

impl fmt::Display for ErrorKind {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        let name = match self {
            ErrorKind::WorkspaceError => "workspace error",
            ErrorKind::InstallError => "install error",
            ErrorKind::RuntimeError => "runtime error",
            ErrorKind::ProcessError => "process error",
            ErrorKind::Timeout => "timeout",
            ErrorKind::RateLimited => "rate limited",
        };
        f.write_str(name)
    }
}

/// Result of running one submission
#[derive(Debug, Clone)]
pub struct ExecutionResult {
    /// Captured console output, `"Error: ..."` for runtime errors, or
    /// `"No output"`
    pub output: String,

    /// Manifest dependencies after the run, in manifest order
    pub installed_packages: Vec<InstalledPackage>,

    pub flavor: ModuleFlavor,

    /// Set when the submitted code failed
    pub error_kind: Option<ErrorKind>,
}

impl ExecutionResult {
    /// Check if the code ran without a runtime error
    #[must_use]
    pub fn is_success(&self) -> bool {
        self.error_kind.is_none()
    }
}
