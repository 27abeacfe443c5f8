//! Compilation units and module fingerprints.
//!
//! The bundler itself is external. Kiln only needs to know when a bundle's
//! output would change, which it approximates by fingerprinting every module
//! the bundle is built from. A unit's compilation hash is derived from its
//! sorted `(module, fingerprint)` pairs.

use std::collections::{BTreeMap, BTreeSet};
use std::fmt;
use std::path::{Path, PathBuf};

use rayon::prelude::*;
use serde::{Deserialize, Serialize};

use crate::error::BuildError;
use crate::fingerprint::Fingerprint;

/// Length of a compilation hash in hex digits.
const COMPILATION_HASH_LEN: usize = 20;

/// Which bundle a compilation unit produces.
#[derive(Clone, Copy, Debug, PartialEq, Eq, PartialOrd, Ord, Hash, Serialize, Deserialize)]
#[serde(rename_all = "lowercase")]
pub enum BundleKind {
    /// Client-side JavaScript loaded by every page.
    Browser,
    /// Server-side rendering bundle.
    Ssr,
}

impl BundleKind {
    /// Lowercase name.
    #[must_use]
    pub fn as_str(self) -> &'static str {
        match self {
            Self::Browser => "browser",
            Self::Ssr => "ssr",
        }
    }
}

impl fmt::Display for BundleKind {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        f.write_str(self.as_str())
    }
}

/// One bundle's inputs and the hash derived from them.
#[derive(Clone, Debug, PartialEq, Eq, Serialize, Deserialize)]
pub struct CompilationUnit {
    /// Bundle produced.
    pub kind: BundleKind,
    /// Hash over the sorted input fingerprints.
    pub compilation_hash: String,
    /// Module path (relative to the site root) to content fingerprint.
    pub input_fingerprints: BTreeMap<String, Fingerprint>,
}

impl CompilationUnit {
    /// Build a unit from already fingerprinted inputs.
    #[must_use]
    pub fn from_inputs(kind: BundleKind, input_fingerprints: BTreeMap<String, Fingerprint>) -> Self {
        let combined = Fingerprint::combine(
            input_fingerprints
                .iter()
                .map(|(module, fingerprint)| (module.as_str(), fingerprint)),
        );
        Self {
            kind,
            compilation_hash: combined.as_str()[..COMPILATION_HASH_LEN].to_owned(),
            input_fingerprints,
        }
    }

    /// Fingerprint every module matching `patterns` under `root`.
    ///
    /// # Errors
    ///
    /// Returns [`BuildError::Pattern`] for a malformed pattern and
    /// [`BuildError::Io`] if a matched module cannot be read.
    pub fn collect(kind: BundleKind, root: &Path, patterns: &[String]) -> Result<Self, BuildError> {
        let modules = expand_patterns(root, patterns)?;
        let inputs = fingerprint_modules(root, &modules)?;
        tracing::debug!(bundle = %kind, modules = inputs.len(), "fingerprinted bundle inputs");
        Ok(Self::from_inputs(kind, inputs))
    }
}

/// Expand glob patterns relative to `root` into module paths.
///
/// Returned paths are relative to `root` with `/` separators. Directories are
/// skipped.
///
/// # Errors
///
/// Returns [`BuildError::Pattern`] for a malformed pattern.
pub fn expand_patterns(root: &Path, patterns: &[String]) -> Result<BTreeSet<String>, BuildError> {
    let base = glob::Pattern::escape(&root.to_string_lossy());
    let mut modules = BTreeSet::new();

    for pattern in patterns {
        let full = format!("{base}/{pattern}");
        let paths = glob::glob(&full).map_err(|source| BuildError::Pattern {
            pattern: pattern.clone(),
            source,
        })?;

        for entry in paths {
            match entry {
                Ok(path) if path.is_file() => {
                    modules.insert(module_key(root, &path));
                }
                Ok(_) => {}
                Err(e) => tracing::warn!(error = %e, pattern, "skipping unreadable path"),
            }
        }
    }

    Ok(modules)
}

/// Fingerprint module files in parallel.
///
/// # Errors
///
/// Returns [`BuildError::Io`] naming the first module that cannot be read.
pub fn fingerprint_modules(
    root: &Path,
    modules: &BTreeSet<String>,
) -> Result<BTreeMap<String, Fingerprint>, BuildError> {
    modules
        .par_iter()
        .map(|module| {
            let path: PathBuf = root.join(module);
            match Fingerprint::of_file(&path) {
                Ok(fingerprint) => Ok((module.clone(), fingerprint)),
                Err(source) => Err(BuildError::Io { path, source }),
            }
        })
        .collect()
}

fn module_key(root: &Path, path: &Path) -> String {
    path.strip_prefix(root)
        .unwrap_or(path)
        .components()
        .map(|c| c.as_os_str().to_string_lossy())
        .collect::<Vec<_>>()
        .join("/")
}
