//! npm manifest (`package.json`) handling

use std::collections::BTreeMap;
use std::path::Path;

use serde::{Deserialize, Serialize};
use serde_json::Value;
use tracing::debug;

use crate::config::ModuleFlavor;
use crate::types::{InstalledPackage, PackageSet};
use crate::workspace::WorkspaceError;

pub const MANIFEST_FILE: &str = "package.json";

const MODULE_TYPE: &str = "module";

/// The subset of `package.json` a workspace cares about.
///
/// Fields the package manager adds are preserved through `extra`.
#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
pub struct Manifest {
    #[serde(default)]
    pub name: String,

    #[serde(default)]
    pub version: String,

    #[serde(default)]
    pub private: bool,

    /// `"module"` for ES modules, absent for CommonJS
    #[serde(rename = "type", default, skip_serializing_if = "Option::is_none")]
    pub module_type: Option<String>,

    #[serde(default)]
    pub dependencies: BTreeMap<String, String>,

    #[serde(flatten)]
    pub extra: serde_json::Map<String, Value>,
}

impl Manifest {
    /// A fresh manifest with no dependencies
    pub fn new(flavor: ModuleFlavor) -> Self {
        Self {
            name: flavor.manifest_name(),
            version: "1.0.0".to_string(),
            private: true,
            module_type: flavor.manifest_type().map(str::to_string),
            dependencies: BTreeMap::new(),
            extra: serde_json::Map::new(),
        }
    }

    pub fn parse(content: &str) -> Result<Self, serde_json::Error> {
        serde_json::from_str(content)
    }

    /// Pretty-printed JSON with a trailing newline, as npm writes it
    pub fn to_json(&self) -> Result<String, serde_json::Error> {
        let mut json = serde_json::to_string_pretty(self)?;
        json.push('\n');
        Ok(json)
    }

    /// The flavor this manifest's module type marker selects
    pub fn flavor(&self) -> ModuleFlavor {
        if self.module_type.as_deref() == Some(MODULE_TYPE) {
            ModuleFlavor::Esm
        } else {
            ModuleFlavor::CommonJs
        }
    }

    pub fn set_flavor(&mut self, flavor: ModuleFlavor) {
        self.module_type = flavor.manifest_type().map(str::to_string);
    }

    pub fn dependency_names(&self) -> PackageSet {
        self.dependencies.keys().cloned().collect()
    }

    pub fn installed_packages(&self) -> Vec<InstalledPackage> {
        self.dependencies
            .iter()
            .map(|(name, version)| InstalledPackage {
                name: name.clone(),
                version: version.clone(),
            })
            .collect()
    }

    /// Read a manifest, returning `None` if the file does not exist
    pub async fn load(path: &Path) -> Result<Option<Self>, WorkspaceError> {
        let content = match tokio::fs::read_to_string(path).await {
            Ok(content) => content,
            Err(e) if e.kind() == std::io::ErrorKind::NotFound => return Ok(None),
            Err(e) => return Err(e.into()),
        };

        Self::parse(&content)
            .map(Some)
            .map_err(|source| WorkspaceError::ManifestParse {
                path: path.to_path_buf(),
                source,
            })
    }

    /// Write the manifest, replacing the file atomically
    pub async fn save(&self, path: &Path) -> Result<(), WorkspaceError> {
        let json = self.to_json().map_err(WorkspaceError::ManifestSerialize)?;
        let staging = path.with_extension("json.tmp");

        tokio::fs::write(&staging, json).await?;
        tokio::fs::rename(&staging, path).await?;
        debug!(path = %path.display(), module_type = ?self.module_type, "saved manifest");
        Ok(())
    }
}
