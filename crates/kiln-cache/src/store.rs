//! Typed fingerprint store on top of a cache bucket.

use serde::Serialize;
use serde::de::DeserializeOwned;

use crate::{Cache, CacheBucket, CacheBucketExt};

/// Bucket holding every persisted fingerprint.
const BUCKET: &str = "fingerprints";

/// Entry format version, stored as the etag of every entry.
///
/// Entries written under another format read as absent.
const FORMAT: &str = "1";

/// Persistent key-value store for build fingerprints.
///
/// Values are JSON-encoded. A missing key, an entry from another format
/// version, and an entry that fails to decode all read as `None`: callers
/// treat that as "no prior fingerprint" and assume the input changed.
pub struct FingerprintStore {
    bucket: Box<dyn CacheBucket>,
}

impl FingerprintStore {
    /// Open the fingerprint bucket of `cache`.
    #[must_use]
    pub fn open(cache: &dyn Cache) -> Self {
        Self {
            bucket: cache.bucket(BUCKET),
        }
    }

    /// Read the value stored under `key`.
    pub fn get<T: DeserializeOwned>(&self, key: &str) -> Option<T> {
        let value = self.bucket.get_json(key, FORMAT);
        if value.is_none() {
            tracing::debug!(key, "no stored fingerprint");
        }
        value
    }

    /// Overwrite the value stored under `key`.
    pub fn set<T: Serialize + ?Sized>(&self, key: &str, value: &T) {
        self.bucket.set_json(key, FORMAT, value);
    }

    /// Forget `key`.
    pub fn remove(&self, key: &str) {
        self.bucket.remove(key);
    }

    /// Forget every stored fingerprint.
    pub fn clear(&self) {
        self.bucket.clear();
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use crate::{MemoryCache, NullCache};
    use std::collections::BTreeSet;

    #[test]
    fn test_get_missing_is_none() {
        let store = FingerprintStore::open(&MemoryCache::new());
        assert_eq!(store.get::<String>("created-node-ids"), None);
    }

    #[test]
    fn test_set_then_get() {
        let cache = MemoryCache::new();
        let store = FingerprintStore::open(&cache);
        let ids: BTreeSet<String> = ["a", "b"].iter().map(|s| (*s).to_owned()).collect();

        store.set("created-node-ids", &ids);

        // A second handle over the same cache sees the value
        let reopened = FingerprintStore::open(&cache);
        assert_eq!(reopened.get::<BTreeSet<String>>("created-node-ids"), Some(ids));
    }

    #[test]
    fn test_remove_does_not_retain_value() {
        let store = FingerprintStore::open(&MemoryCache::new());
        store.set("build-snapshot", "abc");
        store.remove("build-snapshot");
        assert_eq!(store.get::<String>("build-snapshot"), None);
    }

    #[test]
    fn test_clear_forgets_everything() {
        let store = FingerprintStore::open(&MemoryCache::new());
        store.set("a", &1);
        store.set("b", &2);
        store.clear();
        assert_eq!(store.get::<i32>("a"), None);
        assert_eq!(store.get::<i32>("b"), None);
    }

    #[test]
    fn test_unparsable_entry_reads_as_absent() {
        let cache = MemoryCache::new();
        cache.bucket(BUCKET).set("created-node-ids", FORMAT, b"not json at all");

        let store = FingerprintStore::open(&cache);
        assert_eq!(store.get::<BTreeSet<String>>("created-node-ids"), None);
    }

    #[test]
    fn test_other_format_reads_as_absent() {
        let cache = MemoryCache::new();
        cache.bucket(BUCKET).set("created-node-ids", "0", b"[\"a\"]");

        let store = FingerprintStore::open(&cache);
        assert_eq!(store.get::<Vec<String>>("created-node-ids"), None);
    }

    #[test]
    fn test_null_cache_never_remembers() {
        let store = FingerprintStore::open(&NullCache);
        store.set("a", &1);
        assert_eq!(store.get::<i32>("a"), None);
    }
}
