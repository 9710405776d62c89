//! Installation step for code running
//!
//! Brings a workspace's dependencies up to the set a submission needs,
//! invoking the package manager only for what is missing.

use tracing::{debug, info, instrument, warn};

use crate::runner::RunError;
use crate::types::{InstallationOutcome, PackageSet};
use crate::workspace::{PackageManager, Workspace};

/// Install the packages of `packages` that the workspace manifest does not
/// list yet.
///
/// Presence in the manifest is the only check: a listed package is never
/// reinstalled or upgraded.
#[instrument(skip_all, fields(flavor = %workspace.flavor(), requested = packages.len()))]
pub async fn ensure_installed<P: PackageManager>(
    workspace: &Workspace,
    packages: &PackageSet,
    package_manager: &P,
) -> Result<InstallationOutcome, RunError> {
    if packages.is_empty() {
        return Ok(InstallationOutcome::default());
    }

    let listed = workspace
        .manifest()
        .await?
        .map(|manifest| manifest.dependency_names())
        .unwrap_or_default();

    let (already_satisfied, missing): (PackageSet, PackageSet) = packages
        .iter()
        .cloned()
        .partition(|name| listed.contains(name));

    if missing.is_empty() {
        debug!("all packages already installed");
        return Ok(InstallationOutcome {
            already_satisfied,
            ..Default::default()
        });
    }

    info!(packages = ?missing, "installing missing packages");
    let raw_output = package_manager.install(workspace.root(), &missing).await?;

    if let Some(manifest) = workspace.manifest().await? {
        let recorded = manifest.dependency_names();
        let unrecorded: Vec<_> = missing.difference(&recorded).collect();
        if !unrecorded.is_empty() {
            warn!(packages = ?unrecorded, "installed packages missing from manifest");
        }
    }

    Ok(InstallationOutcome {
        already_satisfied,
        newly_installed: missing,
        raw_output,
    })
}
