use std::fmt;
use std::str::FromStr;

use serde::{Deserialize, Serialize};

use crate::config::ConfigError;

/// Wrapper that captures `console.log` around an ES module import.
const ESM_BOOTSTRAP: &str = r#"let output = '';
const originalLog = console.log;
const format = (arg) => {
  if (typeof arg === 'object') {
    try {
      return JSON.stringify(arg, null, 2);
    } catch {
      return String(arg);
    }
  }
  return String(arg);
};
console.log = (...args) => {
  output += args.map(format).join(' ') + '\n';
};

try {
  await import('./code.mjs');
} catch (error) {
  console.log('Error:', error && error.message !== undefined ? error.message : String(error));
}

console.log = originalLog;
process.stdout.write(output);
"#;

/// Wrapper that captures `console.log` around a CommonJS require.
const CJS_BOOTSTRAP: &str = r#"let output = '';
const originalLog = console.log;
const format = (arg) => {
  if (typeof arg === 'object') {
    try {
      return JSON.stringify(arg, null, 2);
    } catch {
      return String(arg);
    }
  }
  return String(arg);
};
console.log = (...args) => {
  output += args.map(format).join(' ') + '\n';
};

try {
  require('./code.cjs');
} catch (error) {
  console.log('Error:', error && error.message !== undefined ? error.message : String(error));
}

console.log = originalLog;
process.stdout.write(output);
"#;

/// Module system a submission is written in.
///
/// Determines file extensions, whether the workspace manifest carries the
/// `"type": "module"` marker, and which wrapper runs the code.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Hash, PartialOrd, Ord, Default, Serialize, Deserialize)]
pub enum ModuleFlavor {
    /// ECMAScript modules (`import`/`export`)
    #[default]
    #[serde(rename = "esm", alias = "mjs")]
    Esm,

    /// CommonJS (`require`/`module.exports`)
    #[serde(rename = "commonjs", alias = "cjs")]
    CommonJs,
}

impl ModuleFlavor {
    /// Every flavor, in the order workspaces are reported
    pub const ALL: [ModuleFlavor; 2] = [ModuleFlavor::Esm, ModuleFlavor::CommonJs];

    /// Name used on the wire (`moduleType`)
    pub fn as_str(self) -> &'static str {
        match self {
            ModuleFlavor::Esm => "esm",
            ModuleFlavor::CommonJs => "commonjs",
        }
    }

    /// Directory name of this flavor's workspace under the workspace root
    pub fn dir_name(self) -> &'static str {
        match self {
            ModuleFlavor::Esm => "esm",
            ModuleFlavor::CommonJs => "cjs",
        }
    }

    /// File extension without dot
    pub fn extension(self) -> &'static str {
        match self {
            ModuleFlavor::Esm => "mjs",
            ModuleFlavor::CommonJs => "cjs",
        }
    }

    /// File the submitted source is written to
    pub fn code_file(self) -> String {
        format!("code.{}", self.extension())
    }

    /// File the bootstrap wrapper is written to
    pub fn bootstrap_file(self) -> String {
        format!("setup.{}", self.extension())
    }

    /// Bootstrap wrapper script content
    pub fn bootstrap_script(self) -> &'static str {
        match self {
            ModuleFlavor::Esm => ESM_BOOTSTRAP,
            ModuleFlavor::CommonJs => CJS_BOOTSTRAP,
        }
    }

    /// Value of the manifest `type` field for this flavor
    pub fn manifest_type(self) -> Option<&'static str> {
        match self {
            ModuleFlavor::Esm => Some("module"),
            ModuleFlavor::CommonJs => None,
        }
    }

    /// Package name written into a fresh manifest
    pub fn manifest_name(self) -> String {
        format!("runjs-temp-{}", self.dir_name())
    }
}

impl fmt::Display for ModuleFlavor {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        f.write_str(self.as_str())
    }
}

impl FromStr for ModuleFlavor {
    type Err = ConfigError;

    fn from_str(s: &str) -> Result<Self, Self::Err> {
        match s {
            "esm" | "mjs" => Ok(ModuleFlavor::Esm),
            "commonjs" | "cjs" => Ok(ModuleFlavor::CommonJs),
            other => Err(ConfigError::UnknownModuleType(other.to_string())),
        }
    }
}
