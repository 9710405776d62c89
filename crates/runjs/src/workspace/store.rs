//! Workspace lifecycle
//!
//! A [`WorkspaceStore`] hands out one directory per module flavor. Access
//! to a flavor's directory is serialized: [`WorkspaceStore::acquire`] waits
//! for the flavor's lock and returns a [`WorkspaceLease`] that holds it
//! until dropped.

use std::ops::Deref;
use std::path::{Path, PathBuf};
use std::sync::Arc;

use tokio::sync::{Mutex, OwnedMutexGuard};
use tracing::{debug, info, instrument, warn};

use crate::config::ModuleFlavor;
use crate::types::InstalledPackage;
use crate::workspace::manifest::{MANIFEST_FILE, Manifest};
use crate::workspace::npm::PackageManager;
use crate::workspace::WorkspaceError;

const NODE_MODULES: &str = "node_modules";

/// One flavor's directory
#[derive(Debug, Clone)]
pub struct Workspace {
    flavor: ModuleFlavor,
    root: PathBuf,
}

impl Workspace {
    pub fn new(root: impl Into<PathBuf>, flavor: ModuleFlavor) -> Self {
        Self {
            flavor,
            root: root.into(),
        }
    }

    pub fn flavor(&self) -> ModuleFlavor {
        self.flavor
    }

    /// Get the workspace directory
    pub fn root(&self) -> &Path {
        &self.root
    }

    pub fn manifest_path(&self) -> PathBuf {
        self.root.join(MANIFEST_FILE)
    }

    /// Directory the package manager installs into, used as `NODE_PATH`
    pub fn node_modules(&self) -> PathBuf {
        self.root.join(NODE_MODULES)
    }

    /// Get the path to a file inside the workspace
    ///
    /// Returns an error if the path contains path traversal attempts.
    pub fn file_path(&self, name: &str) -> Result<PathBuf, WorkspaceError> {
        if name.is_empty() || name.contains("..") || name.starts_with('/') {
            return Err(WorkspaceError::InvalidPath(format!(
                "path traversal not allowed: {name}"
            )));
        }
        Ok(self.root.join(name))
    }

    /// Write a file into the workspace, replacing any previous content
    #[instrument(skip(self, content), fields(flavor = %self.flavor))]
    pub async fn write_file(&self, name: &str, content: &[u8]) -> Result<(), WorkspaceError> {
        let path = self.file_path(name)?;
        tokio::fs::write(&path, content).await?;
        debug!(?path, len = content.len(), "wrote workspace file");
        Ok(())
    }

    pub async fn file_exists(&self, name: &str) -> Result<bool, WorkspaceError> {
        let path = self.file_path(name)?;
        Ok(tokio::fs::try_exists(&path).await?)
    }

    /// Write the console-capturing wrapper for this flavor
    pub async fn write_bootstrap(&self) -> Result<(), WorkspaceError> {
        self.write_file(
            &self.flavor.bootstrap_file(),
            self.flavor.bootstrap_script().as_bytes(),
        )
        .await
    }

    /// Read the manifest, `None` if it does not exist yet
    pub async fn manifest(&self) -> Result<Option<Manifest>, WorkspaceError> {
        Manifest::load(&self.manifest_path()).await
    }

    /// Dependencies recorded in the manifest. A missing manifest has none.
    pub async fn installed_packages(&self) -> Result<Vec<InstalledPackage>, WorkspaceError> {
        Ok(self
            .manifest()
            .await?
            .map(|manifest| manifest.installed_packages())
            .unwrap_or_default())
    }

    /// Create the directory and bring the manifest in line with the flavor.
    ///
    /// A manifest whose module type marker disagrees with the flavor is
    /// rewritten, and its dependencies reinstalled. A corrupt manifest is
    /// replaced by a fresh one.
    #[instrument(skip_all, fields(flavor = %self.flavor, root = %self.root.display()))]
    pub async fn prepare<P: PackageManager>(
        &self,
        package_manager: &P,
    ) -> Result<(), WorkspaceError> {
        tokio::fs::create_dir_all(&self.root)
            .await
            .map_err(|source| WorkspaceError::CreateDir {
                path: self.root.clone(),
                source,
            })?;

        let manifest_path = self.manifest_path();
        match self.manifest().await {
            Ok(Some(mut manifest)) => {
                if manifest.flavor() != self.flavor {
                    info!(
                        from = %manifest.flavor(),
                        to = %self.flavor,
                        "manifest module type mismatch, rewriting"
                    );
                    manifest.set_flavor(self.flavor);
                    manifest.save(&manifest_path).await?;

                    let dependencies = manifest.dependency_names();
                    if !dependencies.is_empty() {
                        package_manager
                            .install(&self.root, &dependencies)
                            .await
                            .map_err(WorkspaceError::Reinstall)?;
                    }
                }
            }
            Ok(None) => {
                debug!("creating manifest");
                Manifest::new(self.flavor).save(&manifest_path).await?;
            }
            Err(WorkspaceError::ManifestParse { path, source }) => {
                warn!(path = %path.display(), error = %source, "corrupt manifest, reinitializing");
                Manifest::new(self.flavor).save(&manifest_path).await?;
            }
            Err(e) => return Err(e),
        }

        self.write_bootstrap().await
    }
}

/// Exclusive access to a workspace, released on drop
#[derive(Debug)]
pub struct WorkspaceLease {
    workspace: Workspace,
    _guard: OwnedMutexGuard<()>,
}

impl Deref for WorkspaceLease {
    type Target = Workspace;

    fn deref(&self) -> &Workspace {
        &self.workspace
    }
}

/// The set of per-flavor workspaces under one root directory
#[derive(Debug)]
pub struct WorkspaceStore {
    root: PathBuf,
    esm_lock: Arc<Mutex<()>>,
    cjs_lock: Arc<Mutex<()>>,
}

impl WorkspaceStore {
    /// A relative `root` is resolved against the current directory here,
    /// since node runs with the workspace as its working directory and
    /// would otherwise resolve `NODE_PATH` from the wrong place.
    pub fn new(root: impl Into<PathBuf>) -> Self {
        let root = root.into();
        let root = match std::path::absolute(&root) {
            Ok(absolute) => absolute,
            Err(e) => {
                warn!(root = %root.display(), error = %e, "cannot resolve workspace root");
                root
            }
        };
        Self {
            root,
            esm_lock: Arc::new(Mutex::new(())),
            cjs_lock: Arc::new(Mutex::new(())),
        }
    }

    pub fn root(&self) -> &Path {
        &self.root
    }

    /// An unlocked handle, for reads that tolerate concurrent writers
    pub fn workspace(&self, flavor: ModuleFlavor) -> Workspace {
        Workspace::new(self.root.join(flavor.dir_name()), flavor)
    }

    fn flavor_lock(&self, flavor: ModuleFlavor) -> Arc<Mutex<()>> {
        match flavor {
            ModuleFlavor::Esm => Arc::clone(&self.esm_lock),
            ModuleFlavor::CommonJs => Arc::clone(&self.cjs_lock),
        }
    }

    /// Wait for exclusive access to a flavor's workspace without preparing it
    pub async fn lock(&self, flavor: ModuleFlavor) -> WorkspaceLease {
        let guard = self.flavor_lock(flavor).lock_owned().await;
        debug!(%flavor, "workspace locked");
        WorkspaceLease {
            workspace: self.workspace(flavor),
            _guard: guard,
        }
    }

    /// Lock a flavor's workspace and make it ready to run code in
    #[instrument(skip(self, package_manager))]
    pub async fn acquire<P: PackageManager>(
        &self,
        flavor: ModuleFlavor,
        package_manager: &P,
    ) -> Result<WorkspaceLease, WorkspaceError> {
        let lease = self.lock(flavor).await;
        lease.prepare(package_manager).await?;
        Ok(lease)
    }

    /// Dependencies across every flavor, later flavors overriding earlier
    /// ones on a name clash.
    ///
    /// Missing or unreadable manifests contribute nothing.
    pub async fn installed_packages(&self) -> Vec<InstalledPackage> {
        let mut merged: Vec<InstalledPackage> = Vec::new();

        for flavor in ModuleFlavor::ALL {
            let packages = match self.workspace(flavor).installed_packages().await {
                Ok(packages) => packages,
                Err(e) => {
                    warn!(%flavor, error = %e, "skipping unreadable manifest");
                    continue;
                }
            };

            for package in packages {
                match merged.iter_mut().find(|p| p.name == package.name) {
                    Some(existing) => existing.version = package.version,
                    None => merged.push(package),
                }
            }
        }

        merged
    }
}
