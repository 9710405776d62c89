//! A library for running JavaScript snippets with on-demand npm dependencies.
//!
//! runjs accepts source text in either ES module or CommonJS form, installs
//! the npm packages it references into a persistent per-flavor workspace,
//! runs it under node with console output captured, and serves all of this
//! over HTTP behind a fixed-window rate limiter.
//!
//! # Features
//!
//! - **Dependency extraction**: `require`, `import`, dynamic `import()` and re-exports, scoped packages kept whole.
//! - **Incremental installs**: Only packages missing from the workspace manifest reach npm.
//! - **Per-flavor workspaces**: Separate ES module and CommonJS directories, serialized per flavor.
//! - **Console capture**: A wrapper collects `console.log` output and reports load-time errors.
//! - **Rate limiting**: Global and per-client windows with probabilistic sweeping.
//! - **Package reclamation**: A janitor that periodically uninstalls accumulated packages.
//!
//! Submitted code runs with the privileges of the host process. There is no
//! sandboxing.

pub use config::{Config, ConfigError, EXAMPLE_CONFIG, ModuleFlavor};
pub use extract::{extract_packages, package_root};
pub use ratelimit::{Admission, RateLimiter};
pub use runner::{ExecuteError, Executor, NodeExecutor, RunError, Runner};
pub use server::{ApiError, AppState, ServerError, create_router, run_server};
pub use types::{
    ErrorKind, ExecutionRequest, ExecutionResult, InstallationOutcome, InstalledPackage,
    PackageSet,
};
pub use workspace::{
    InstallError, Npm, PackageManager, Workspace, WorkspaceError, WorkspaceStore,
};

pub mod config;
pub mod extract;
pub mod janitor;
pub mod ratelimit;
pub mod runner;
pub mod server;
pub mod types;
pub mod workspace;
