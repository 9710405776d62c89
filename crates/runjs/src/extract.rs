//! Dependency extraction
//!
//! Scans source text for module specifiers and reduces them to the npm
//! packages that would have to be installed. This is a textual heuristic,
//! not a parser: anything that looks like `require('x')` or an `import`
//! counts, including occurrences in comments or strings, and unparseable
//! text simply yields fewer matches.

use std::sync::LazyLock;

use regex::Regex;

use crate::types::PackageSet;

/// `require('x')` / `require("x")`
static REQUIRE_REGEX: LazyLock<Regex> = LazyLock::new(|| {
    Regex::new(r#"\brequire\s*\(\s*['"]([^'"\s]+)['"]\s*\)"#)
        .expect("valid require regex (verified by tests)")
});

/// Default, named, namespace and side-effect-only imports
static IMPORT_REGEX: LazyLock<Regex> = LazyLock::new(|| {
    Regex::new(r#"\bimport\s*(?:[\w*\s{},$]*?\s*\bfrom\s*)?['"]([^'"\s]+)['"]"#)
        .expect("valid import regex (verified by tests)")
});

/// `import('x')`
static DYNAMIC_IMPORT_REGEX: LazyLock<Regex> = LazyLock::new(|| {
    Regex::new(r#"\bimport\s*\(\s*['"]([^'"\s]+)['"]\s*\)"#)
        .expect("valid dynamic import regex (verified by tests)")
});

/// `export * from 'x'` / `export { a } from 'x'`
static REEXPORT_REGEX: LazyLock<Regex> = LazyLock::new(|| {
    Regex::new(r#"\bexport\s*(?:\*(?:\s+as\s+[\w$]+)?|\{[^}]*\})\s*from\s*['"]([^'"\s]+)['"]"#)
        .expect("valid re-export regex (verified by tests)")
});

/// npm package name, optionally scoped. Legacy mixed-case names are allowed;
/// a leading `-` is not, since npm would read it as a flag.
static PACKAGE_NAME_REGEX: LazyLock<Regex> = LazyLock::new(|| {
    Regex::new(r"^(?:@[A-Za-z0-9~][A-Za-z0-9._~-]*/)?[A-Za-z0-9~][A-Za-z0-9._~-]*$")
        .expect("valid package name regex (verified by tests)")
});

const MAX_PACKAGE_NAME_LEN: usize = 214;

/// Node.js core modules, never installed from the registry
const BUILTIN_MODULES: &[&str] = &[
    "assert",
    "async_hooks",
    "buffer",
    "child_process",
    "cluster",
    "console",
    "constants",
    "crypto",
    "dgram",
    "diagnostics_channel",
    "dns",
    "domain",
    "events",
    "fs",
    "http",
    "http2",
    "https",
    "inspector",
    "module",
    "net",
    "os",
    "path",
    "perf_hooks",
    "process",
    "punycode",
    "querystring",
    "readline",
    "repl",
    "stream",
    "string_decoder",
    "sys",
    "timers",
    "tls",
    "trace_events",
    "tty",
    "url",
    "util",
    "v8",
    "vm",
    "wasi",
    "worker_threads",
    "zlib",
];

/// Extract the external packages referenced by `source`.
///
/// Both CommonJS and ES module patterns are scanned, so the result depends
/// only on the text and never on the flavor it is submitted as.
pub fn extract_packages(source: &str) -> PackageSet {
    [
        &*REQUIRE_REGEX,
        &*IMPORT_REGEX,
        &*DYNAMIC_IMPORT_REGEX,
        &*REEXPORT_REGEX,
    ]
    .into_iter()
    .flat_map(|regex| regex.captures_iter(source))
    .filter_map(|captures| captures.get(1))
    .filter_map(|specifier| package_root(specifier.as_str()))
    .map(str::to_owned)
    .collect()
}

/// Reduce a module specifier to the package that provides it.
///
/// `lodash/fp` becomes `lodash` and `@scope/pkg/sub` becomes `@scope/pkg`.
/// Relative and absolute paths, `node:` specifiers, core modules and
/// strings that are not valid package names yield `None`.
pub fn package_root(specifier: &str) -> Option<&str> {
    if specifier.starts_with('.') || specifier.starts_with('/') || specifier.starts_with("node:")
    {
        return None;
    }

    let root = if specifier.starts_with('@') {
        let mut segments = specifier.splitn(3, '/');
        let scope = segments.next()?;
        let name = segments.next().filter(|name| !name.is_empty())?;
        specifier.get(..scope.len() + 1 + name.len())?
    } else {
        specifier.split('/').next()?
    };

    if root.len() > MAX_PACKAGE_NAME_LEN
        || !PACKAGE_NAME_REGEX.is_match(root)
        || BUILTIN_MODULES.contains(&root)
    {
        return None;
    }

    Some(root)
}
