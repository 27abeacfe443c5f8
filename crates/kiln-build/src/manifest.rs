//! Build manifest publication.
//!
//! Every build publishes `build-manifest.json` describing what it did, plus
//! `newPages.txt` and `deletedPages.txt` listing the generated and removed
//! page paths one per line. All three files are replaced atomically; a
//! failed write leaves the previous file intact.

use std::fs::{self, File, OpenOptions};
use std::io::Write;
use std::path::{Path, PathBuf};

use serde::{Deserialize, Serialize};

use crate::error::ManifestError;

/// Manifest file name.
pub const MANIFEST_FILE: &str = "build-manifest.json";

/// Generated pages side file name.
pub const NEW_PAGES_FILE: &str = "newPages.txt";

/// Removed pages side file name.
pub const DELETED_PAGES_FILE: &str = "deletedPages.txt";

/// Sentinel for an unchanged compilation hash.
const NOT_CHANGED: &str = "not-changed";

/// Whether a bundle's compilation hash changed in a build.
///
/// Serialized as the new hash, or as `"not-changed"`.
#[derive(Clone, Debug, PartialEq, Eq, Serialize, Deserialize)]
#[serde(from = "String", into = "String")]
pub enum CompilationHashChange {
    /// Hash identical to the previous build.
    NotChanged,
    /// Hash changed to this value.
    Changed(String),
}

impl CompilationHashChange {
    /// `Changed` for `Some(hash)`, `NotChanged` for `None`.
    #[must_use]
    pub fn from_option(hash: Option<String>) -> Self {
        hash.map_or(Self::NotChanged, Self::Changed)
    }

    /// Whether the hash changed.
    #[must_use]
    pub fn is_changed(&self) -> bool {
        matches!(self, Self::Changed(_))
    }
}

impl From<String> for CompilationHashChange {
    fn from(value: String) -> Self {
        if value == NOT_CHANGED {
            Self::NotChanged
        } else {
            Self::Changed(value)
        }
    }
}

impl From<CompilationHashChange> for String {
    fn from(value: CompilationHashChange) -> Self {
        match value {
            CompilationHashChange::NotChanged => NOT_CHANGED.to_owned(),
            CompilationHashChange::Changed(hash) => hash,
        }
    }
}

/// Summary of one build. Immutable once written.
#[derive(Clone, Debug, PartialEq, Eq, Serialize, Deserialize)]
#[serde(rename_all = "camelCase")]
pub struct BuildManifest {
    /// Pages rendered, in discovery order.
    pub generated: Vec<String>,
    /// Pages deleted, sorted.
    pub removed: Vec<String>,
    /// Every page of the site, in discovery order.
    pub all_pages: Vec<String>,
    /// Browser bundle hash change.
    pub changed_browser_compilation_hash: CompilationHashChange,
    /// SSR bundle hash change.
    pub changed_ssr_compilation_hash: CompilationHashChange,
}

/// Publishes manifests into a directory.
pub struct ManifestWriter {
    dir: PathBuf,
}

impl ManifestWriter {
    /// Writer publishing into `dir`.
    #[must_use]
    pub fn new(dir: impl Into<PathBuf>) -> Self {
        Self { dir: dir.into() }
    }

    /// Path of the manifest file.
    #[must_use]
    pub fn manifest_path(&self) -> PathBuf {
        self.dir.join(MANIFEST_FILE)
    }

    /// Publish `manifest` and its side files.
    ///
    /// The side files are written first, so a reader that sees the new
    /// manifest also sees matching side files.
    ///
    /// # Errors
    ///
    /// Returns [`ManifestError::Write`] naming the file that failed.
    pub fn write(&self, manifest: &BuildManifest) -> Result<PathBuf, ManifestError> {
        let json = serde_json::to_vec_pretty(manifest)?;

        self.publish(NEW_PAGES_FILE, lines(&manifest.generated).as_bytes())?;
        self.publish(DELETED_PAGES_FILE, lines(&manifest.removed).as_bytes())?;
        let path = self.publish(MANIFEST_FILE, &json)?;

        tracing::info!(
            path = %path.display(),
            generated = manifest.generated.len(),
            removed = manifest.removed.len(),
            "published build manifest"
        );
        Ok(path)
    }

    fn publish(&self, name: &str, data: &[u8]) -> Result<PathBuf, ManifestError> {
        let path = self.dir.join(name);
        atomic_write(&path, data).map_err(|source| ManifestError::Write {
            path: path.clone(),
            source,
        })?;
        Ok(path)
    }
}

/// Reads published manifests.
pub struct ManifestReader;

impl ManifestReader {
    /// Read the manifest at `path`.
    ///
    /// Returns `None` if the file is missing or cannot be parsed.
    #[must_use]
    pub fn read(path: &Path) -> Option<BuildManifest> {
        let content = fs::read(path).ok()?;
        match serde_json::from_slice(&content) {
            Ok(manifest) => Some(manifest),
            Err(e) => {
                tracing::warn!(path = %path.display(), error = %e, "ignoring unreadable manifest");
                None
            }
        }
    }
}

fn lines(paths: &[String]) -> String {
    let mut out = String::new();
    for path in paths {
        out.push_str(path);
        out.push('\n');
    }
    out
}

/// Write `data` to a sibling temp file, fsync it, and rename it over `path`.
pub(crate) fn atomic_write(path: &Path, data: &[u8]) -> std::io::Result<()> {
    if let Some(parent) = path.parent() {
        fs::create_dir_all(parent)?;
    }

    let mut temp_name = path.file_name().unwrap_or_default().to_os_string();
    temp_name.push(".tmp");
    let temp_path = path.with_file_name(temp_name);

    if let Err(e) = write_synced(&temp_path, data).and_then(|()| fs::rename(&temp_path, path)) {
        let _ = fs::remove_file(&temp_path);
        return Err(e);
    }

    // Directory entry durability is best effort
    if let Some(parent) = path.parent()
        && let Ok(dir) = File::open(parent)
    {
        let _ = dir.sync_all();
    }
    Ok(())
}

fn write_synced(path: &Path, data: &[u8]) -> std::io::Result<()> {
    let mut file = OpenOptions::new()
        .write(true)
        .create(true)
        .truncate(true)
        .open(path)?;
    file.write_all(data)?;
    file.sync_all()
}

#[cfg(test)]
mod tests {
    use super::*;
    use pretty_assertions::assert_eq;
    use serde_json::json;

    fn manifest() -> BuildManifest {
        BuildManifest {
            generated: vec!["/b".to_owned()],
            removed: vec!["/old".to_owned()],
            all_pages: vec!["/a".to_owned(), "/b".to_owned()],
            changed_browser_compilation_hash: CompilationHashChange::NotChanged,
            changed_ssr_compilation_hash: CompilationHashChange::Changed("abc123".to_owned()),
        }
    }

    #[test]
    fn test_wire_format() {
        let value = serde_json::to_value(manifest()).unwrap();
        assert_eq!(
            value,
            json!({
                "generated": ["/b"],
                "removed": ["/old"],
                "allPages": ["/a", "/b"],
                "changedBrowserCompilationHash": "not-changed",
                "changedSsrCompilationHash": "abc123"
            })
        );
    }

    #[test]
    fn test_write_publishes_side_files() {
        let temp = tempfile::tempdir().unwrap();
        let writer = ManifestWriter::new(temp.path().join("cache"));

        let path = writer.write(&manifest()).unwrap();
        assert_eq!(path, writer.manifest_path());
        assert_eq!(ManifestReader::read(&path), Some(manifest()));
        assert_eq!(
            fs::read_to_string(temp.path().join("cache").join(NEW_PAGES_FILE)).unwrap(),
            "/b\n"
        );
        assert_eq!(
            fs::read_to_string(temp.path().join("cache").join(DELETED_PAGES_FILE)).unwrap(),
            "/old\n"
        );
        assert!(!temp.path().join("cache").join("build-manifest.json.tmp").exists());
    }

    #[test]
    fn test_empty_lists_give_empty_side_files() {
        let temp = tempfile::tempdir().unwrap();
        let writer = ManifestWriter::new(temp.path());
        let mut empty = manifest();
        empty.generated.clear();
        empty.removed.clear();

        writer.write(&empty).unwrap();
        assert_eq!(fs::read_to_string(temp.path().join(NEW_PAGES_FILE)).unwrap(), "");
    }

    #[test]
    fn test_failed_write_keeps_previous_manifest() {
        let temp = tempfile::tempdir().unwrap();
        let writer = ManifestWriter::new(temp.path());
        writer.write(&manifest()).unwrap();

        // A directory in place of the temp file makes the next write fail
        fs::create_dir(temp.path().join("build-manifest.json.tmp")).unwrap();
        let mut next = manifest();
        next.generated = vec!["/a".to_owned(), "/b".to_owned()];

        let err = writer.write(&next).unwrap_err();
        assert!(
            matches!(&err, ManifestError::Write { path, .. } if path.ends_with(MANIFEST_FILE)),
            "{err:?}"
        );
        assert_eq!(ManifestReader::read(&writer.manifest_path()), Some(manifest()));
    }

    #[test]
    fn test_read_missing_or_corrupt() {
        let temp = tempfile::tempdir().unwrap();
        let path = temp.path().join(MANIFEST_FILE);
        assert_eq!(ManifestReader::read(&path), None);

        fs::write(&path, "{ truncated").unwrap();
        assert_eq!(ManifestReader::read(&path), None);
    }

    #[test]
    fn test_hash_change_sentinel() {
        assert_eq!(
            CompilationHashChange::from("not-changed".to_owned()),
            CompilationHashChange::NotChanged
        );
        assert!(CompilationHashChange::from_option(Some("x".to_owned())).is_changed());
        assert!(!CompilationHashChange::from_option(None).is_changed());
    }
}
