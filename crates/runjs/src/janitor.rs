//! Periodic dependency cleanup
//!
//! Uninstalls every dependency a workspace has accumulated so disk usage
//! does not grow without bound. Each workspace is cleaned under its flavor
//! lock, so a cleanup never interleaves with a run.

use std::time::Duration;

use tracing::{error, info, instrument};

use crate::config::ModuleFlavor;
use crate::runner::RunError;
use crate::types::PackageSet;
use crate::workspace::{PackageManager, WorkspaceStore};

/// What one cleanup pass did for one workspace
#[derive(Debug)]
pub struct CleanupReport {
    pub flavor: ModuleFlavor,

    /// Packages handed to the package manager for removal
    pub removed: PackageSet,

    pub error: Option<RunError>,
}

impl CleanupReport {
    #[must_use]
    pub fn is_success(&self) -> bool {
        self.error.is_none()
    }
}

/// Remove every dependency of one flavor's workspace.
///
/// A workspace without a manifest or without dependencies is left alone.
#[instrument(skip(store, package_manager))]
pub async fn clean_workspace<P: PackageManager>(
    store: &WorkspaceStore,
    package_manager: &P,
    flavor: ModuleFlavor,
) -> Result<PackageSet, RunError> {
    let workspace = store.lock(flavor).await;

    let Some(manifest) = workspace.manifest().await? else {
        return Ok(PackageSet::new());
    };
    let dependencies = manifest.dependency_names();
    if dependencies.is_empty() {
        return Ok(dependencies);
    }

    info!(packages = ?dependencies, "removing packages");
    package_manager
        .uninstall(workspace.root(), &dependencies)
        .await?;
    Ok(dependencies)
}

/// Clean every workspace once.
///
/// A failure in one workspace is logged and does not stop the others.
pub async fn run_once<P: PackageManager>(
    store: &WorkspaceStore,
    package_manager: &P,
) -> Vec<CleanupReport> {
    let mut reports = Vec::with_capacity(ModuleFlavor::ALL.len());

    for flavor in ModuleFlavor::ALL {
        let report = match clean_workspace(store, package_manager, flavor).await {
            Ok(removed) => CleanupReport {
                flavor,
                removed,
                error: None,
            },
            Err(e) => {
                error!(%flavor, error = %e, "cleanup failed");
                CleanupReport {
                    flavor,
                    removed: PackageSet::new(),
                    error: Some(e),
                }
            }
        };
        reports.push(report);
    }

    reports
}

/// Clean every workspace now and then once per `interval`, forever
pub async fn run_periodic<P: PackageManager>(
    store: &WorkspaceStore,
    package_manager: &P,
    interval: Duration,
) {
    let mut ticker = tokio::time::interval(interval);
    ticker.set_missed_tick_behavior(tokio::time::MissedTickBehavior::Delay);

    loop {
        ticker.tick().await;
        let reports = run_once(store, package_manager).await;
        let removed: usize = reports.iter().map(|r| r.removed.len()).sum();
        let failed = reports.iter().filter(|r| !r.is_success()).count();
        info!(removed, failed, "cleanup pass complete");
    }
}
