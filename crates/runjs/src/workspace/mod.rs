//! Per-flavor workspaces
//!
//! This module owns the on-disk directories code runs in: one per module
//! flavor, each with an npm manifest (`package.json`), a `node_modules`
//! tree maintained by the package manager, and the bootstrap wrapper that
//! captures console output.

use std::path::PathBuf;
use std::time::Duration;

use thiserror::Error;

pub use crate::workspace::manifest::{MANIFEST_FILE, Manifest};
pub use crate::workspace::npm::{Npm, NpmAction, NpmCommand, PackageManager};
pub use crate::workspace::process::{
    CapturedOutput, ProcessError, TRUNCATION_MARKER, run_captured,
};
pub use crate::workspace::store::{Workspace, WorkspaceLease, WorkspaceStore};

mod manifest;
mod npm;
mod process;
mod store;

/// Errors that occur while preparing or reading a workspace
#[derive(Debug, Error)]
pub enum WorkspaceError {
    #[error("failed to create workspace directory {path}: {source}")]
    CreateDir {
        path: PathBuf,
        #[source]
        source: std::io::Error,
    },

    #[error("failed to parse manifest {path}: {source}")]
    ManifestParse {
        path: PathBuf,
        #[source]
        source: serde_json::Error,
    },

    #[error("failed to serialize manifest: {0}")]
    ManifestSerialize(#[source] serde_json::Error),

    #[error("failed to reinstall dependencies after module type change: {0}")]
    Reinstall(#[source] InstallError),

    #[error("invalid path: {0}")]
    InvalidPath(String),

    #[error("I/O error: {0}")]
    Io(#[from] std::io::Error),
}

/// Errors from the package manager
#[derive(Debug, Error)]
pub enum InstallError {
    #[error("{action} exited with code {exit_code:?}: {output}")]
    Failed {
        action: NpmAction,
        exit_code: Option<i32>,
        output: String,
    },

    #[error("{action} timed out after {:.1}s", limit.as_secs_f64())]
    TimedOut { action: NpmAction, limit: Duration },

    #[error("failed to run package manager: {0}")]
    Process(#[source] ProcessError),
}
