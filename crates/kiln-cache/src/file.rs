//! File-based cache implementation.
//!
//! [`FileCache`] stores cache entries as files on disk, organized into buckets
//! (subdirectories). Each entry is a single file with a binary header followed
//! by the data:
//!
//! ```text
//! [etag_len: u32 LE][etag bytes][data bytes]
//! ```
//!
//! On read, only the header is read first to validate the etag. The full data
//! is read only on cache hit, avoiding unnecessary I/O on mismatch.
//!
//! Entries are written to a sibling `.tmp` file, synced, and renamed into
//! place, so a reader never observes a half-written entry.
//!
//! On construction, [`FileCache`] validates a `VERSION` file in the cache root.
//! If the version mismatches or is missing, the entire cache directory is wiped
//! and recreated. A deleted cache directory therefore simply starts empty.

use std::fs::{self, File};
use std::io::{self, Read, Write};
use std::path::{Path, PathBuf};

use crate::{Cache, CacheBucket};

/// File-based [`Cache`] rooted at a directory on disk.
///
/// Directory layout:
/// ```text
/// {root}/
/// +-- VERSION            # contains the cache version string
/// +-- fingerprints/      # bucket "fingerprints"
/// |   +-- build-state    # cache entry
/// +-- ...
/// ```
pub struct FileCache {
    root: PathBuf,
}

impl FileCache {
    /// Create a new file-based cache at `root`, validating the cache version.
    ///
    /// If the `VERSION` file inside `root` does not match `version`, the entire
    /// cache directory is removed and recreated with the new version. Errors
    /// during validation are logged but never fatal.
    #[must_use]
    pub fn new(root: PathBuf, version: &str) -> Self {
        validate_version(&root, version);
        Self { root }
    }

    /// Cache root directory.
    #[must_use]
    pub fn root(&self) -> &Path {
        &self.root
    }
}

impl Cache for FileCache {
    fn bucket(&self, name: &str) -> Box<dyn CacheBucket> {
        Box::new(FileCacheBucket {
            dir: self.root.join(name),
        })
    }
}

/// A single bucket backed by a directory on disk.
struct FileCacheBucket {
    dir: PathBuf,
}

impl CacheBucket for FileCacheBucket {
    fn get(&self, key: &str, etag: &str) -> Option<Vec<u8>> {
        let mut file = File::open(self.dir.join(key)).ok()?;
        let stored_etag = read_header(&mut file)?;

        if !etag.is_empty() && stored_etag != etag.as_bytes() {
            tracing::debug!(key, "cache etag mismatch");
            return None;
        }

        let mut data = Vec::new();
        file.read_to_end(&mut data).ok()?;
        Some(data)
    }

    fn set(&self, key: &str, etag: &str, value: &[u8]) {
        if let Err(e) = write_entry(&self.dir.join(key), etag, value) {
            tracing::warn!(key, error = %e, "failed to write cache entry");
        }
    }

    fn remove(&self, key: &str) {
        match fs::remove_file(self.dir.join(key)) {
            Ok(()) => {}
            Err(e) if e.kind() == io::ErrorKind::NotFound => {}
            Err(e) => tracing::warn!(key, error = %e, "failed to remove cache entry"),
        }
    }

    fn clear(&self) {
        match fs::remove_dir_all(&self.dir) {
            Ok(()) => {}
            Err(e) if e.kind() == io::ErrorKind::NotFound => {}
            Err(e) => {
                tracing::warn!(dir = %self.dir.display(), error = %e, "failed to clear cache bucket");
            }
        }
    }
}

/// Read the etag header, leaving `file` positioned at the data.
fn read_header(file: &mut File) -> Option<Vec<u8>> {
    let mut len_buf = [0u8; 4];
    file.read_exact(&mut len_buf).ok()?;
    let etag_len = usize::try_from(u32::from_le_bytes(len_buf)).ok()?;

    let mut etag = vec![0u8; etag_len];
    file.read_exact(&mut etag).ok()?;
    Some(etag)
}

/// Write an entry through a synced sibling temp file.
fn write_entry(path: &Path, etag: &str, value: &[u8]) -> io::Result<()> {
    if let Some(parent) = path.parent() {
        fs::create_dir_all(parent)?;
    }

    let tmp = tmp_path(path);
    let written = write_synced(&tmp, etag, value).and_then(|()| fs::rename(&tmp, path));
    if written.is_err() {
        let _ = fs::remove_file(&tmp);
    }
    written
}

fn write_synced(path: &Path, etag: &str, value: &[u8]) -> io::Result<()> {
    let etag_len = u32::try_from(etag.len())
        .map_err(|_| io::Error::new(io::ErrorKind::InvalidInput, "etag too long"))?;

    let mut file = File::create(path)?;
    file.write_all(&etag_len.to_le_bytes())?;
    file.write_all(etag.as_bytes())?;
    file.write_all(value)?;
    file.sync_all()
}

fn tmp_path(path: &Path) -> PathBuf {
    let mut name = path.file_name().unwrap_or_default().to_os_string();
    name.push(".tmp");
    path.with_file_name(name)
}

/// Validate the cache version, wiping the directory on mismatch.
fn validate_version(root: &Path, version: &str) {
    let version_file = root.join("VERSION");

    match fs::read_to_string(&version_file) {
        Ok(stored) if stored == version => {
            tracing::debug!("cache version matches: {version}");
            return;
        }
        Ok(stored) => {
            tracing::info!(
                "cache version mismatch (stored={stored}, current={version}), wiping cache"
            );
        }
        Err(_) => {
            tracing::info!("no cache VERSION file found, initializing cache");
        }
    }

    if root.exists()
        && let Err(e) = fs::remove_dir_all(root)
    {
        tracing::warn!("failed to remove cache directory: {e}");
    }
    if let Err(e) = fs::create_dir_all(root) {
        tracing::warn!("failed to create cache directory: {e}");
        return;
    }
    if let Err(e) = fs::write(&version_file, version) {
        tracing::warn!("failed to write cache VERSION file: {e}");
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use tempfile::TempDir;

    #[test]
    fn test_file_bucket_set_and_get() {
        let tmp = TempDir::new().unwrap();
        let cache = FileCache::new(tmp.path().join("cache"), "v1");
        let bucket = cache.bucket("fingerprints");

        bucket.set("created-node-ids", "1", b"[\"a\"]");
        assert_eq!(
            bucket.get("created-node-ids", "1"),
            Some(b"[\"a\"]".to_vec())
        );
    }

    #[test]
    fn test_file_bucket_etag_match() {
        let tmp = TempDir::new().unwrap();
        let cache = FileCache::new(tmp.path().join("cache"), "v1");
        let bucket = cache.bucket("fingerprints");

        bucket.set("key", "correct-etag", b"data");

        assert_eq!(bucket.get("key", "correct-etag"), Some(b"data".to_vec()));
        assert_eq!(bucket.get("key", "wrong-etag"), None);
        assert_eq!(bucket.get("key", ""), Some(b"data".to_vec()));
    }

    #[test]
    fn test_file_bucket_get_nonexistent_key() {
        let tmp = TempDir::new().unwrap();
        let cache = FileCache::new(tmp.path().join("cache"), "v1");
        let bucket = cache.bucket("fingerprints");

        assert_eq!(bucket.get("nonexistent", "etag"), None);
    }

    #[test]
    fn test_file_bucket_overwrite_leaves_no_tmp_file() {
        let tmp = TempDir::new().unwrap();
        let root = tmp.path().join("cache");
        let cache = FileCache::new(root.clone(), "v1");
        let bucket = cache.bucket("fingerprints");

        bucket.set("key", "etag1", b"first");
        bucket.set("key", "etag2", b"second");

        assert_eq!(bucket.get("key", "etag1"), None);
        assert_eq!(bucket.get("key", "etag2"), Some(b"second".to_vec()));
        assert!(!root.join("fingerprints/key.tmp").exists());
    }

    #[test]
    fn test_file_bucket_truncated_entry_misses() {
        let tmp = TempDir::new().unwrap();
        let root = tmp.path().join("cache");
        let cache = FileCache::new(root.clone(), "v1");
        let bucket = cache.bucket("fingerprints");

        fs::create_dir_all(root.join("fingerprints")).unwrap();
        fs::write(root.join("fingerprints/broken"), [0xFF, 0xFF]).unwrap();

        assert_eq!(bucket.get("broken", ""), None);
    }

    #[test]
    fn test_file_bucket_remove() {
        let tmp = TempDir::new().unwrap();
        let cache = FileCache::new(tmp.path().join("cache"), "v1");
        let bucket = cache.bucket("fingerprints");

        bucket.set("key", "", b"data");
        bucket.remove("key");
        assert_eq!(bucket.get("key", ""), None);

        // Removing again is not an error
        bucket.remove("key");
    }

    #[test]
    fn test_file_bucket_clear_only_affects_bucket() {
        let tmp = TempDir::new().unwrap();
        let cache = FileCache::new(tmp.path().join("cache"), "v1");
        let alpha = cache.bucket("alpha");
        let beta = cache.bucket("beta");

        alpha.set("key", "", b"alpha-data");
        beta.set("key", "", b"beta-data");

        alpha.clear();
        assert_eq!(alpha.get("key", ""), None);
        assert_eq!(beta.get("key", ""), Some(b"beta-data".to_vec()));
    }

    #[test]
    fn test_version_match_keeps_cache() {
        let tmp = TempDir::new().unwrap();
        let root = tmp.path().join("cache");

        let cache = FileCache::new(root.clone(), "v1");
        cache.bucket("fingerprints").set("key", "etag1", b"preserved");

        let cache2 = FileCache::new(root, "v1");
        assert_eq!(
            cache2.bucket("fingerprints").get("key", "etag1"),
            Some(b"preserved".to_vec())
        );
    }

    #[test]
    fn test_version_mismatch_wipes_cache() {
        let tmp = TempDir::new().unwrap();
        let root = tmp.path().join("cache");

        let cache = FileCache::new(root.clone(), "v1");
        cache.bucket("fingerprints").set("key", "etag1", b"will-be-wiped");

        let cache2 = FileCache::new(root.clone(), "v2");
        assert_eq!(cache2.bucket("fingerprints").get("key", "etag1"), None);

        let version = fs::read_to_string(root.join("VERSION")).unwrap();
        assert_eq!(version, "v2");
    }

    #[test]
    fn test_deleted_cache_dir_starts_empty() {
        let tmp = TempDir::new().unwrap();
        let root = tmp.path().join("cache");

        let cache = FileCache::new(root.clone(), "v1");
        cache.bucket("fingerprints").set("key", "", b"data");
        fs::remove_dir_all(&root).unwrap();

        let cache2 = FileCache::new(root.clone(), "v1");
        assert_eq!(cache2.bucket("fingerprints").get("key", ""), None);
        assert!(root.join("VERSION").exists());
    }
}
