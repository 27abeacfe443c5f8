//! Extension trait for [`CacheBucket`] with typed convenience methods.

use serde::Serialize;
use serde::de::DeserializeOwned;

use crate::CacheBucket;

/// Typed convenience methods for [`CacheBucket`].
///
/// Provides `get_json`/`set_json` for serde-serializable types as default
/// methods, so [`CacheBucket`] stays object-safe and implementors only handle
/// raw bytes.
///
/// # Example
///
/// ```
/// use kiln_cache::{Cache, CacheBucketExt, MemoryCache};
///
/// let cache = MemoryCache::new();
/// let bucket = cache.bucket("fingerprints");
///
/// bucket.set_json("created-node-ids", "1", &vec!["a", "b"]);
/// let ids: Option<Vec<String>> = bucket.get_json("created-node-ids", "1");
/// assert_eq!(ids, Some(vec!["a".to_owned(), "b".to_owned()]));
/// ```
pub trait CacheBucketExt: CacheBucket {
    /// Retrieve a JSON-deserialized value from the cache.
    ///
    /// Returns `None` on cache miss, etag mismatch, or deserialization failure.
    /// An entry that exists but cannot be decoded is logged and reported as a
    /// miss, so callers fall back to recomputing.
    fn get_json<T: DeserializeOwned>(&self, key: &str, etag: &str) -> Option<T> {
        let bytes = self.get(key, etag)?;
        match serde_json::from_slice(&bytes) {
            Ok(value) => Some(value),
            Err(e) => {
                tracing::warn!(key, error = %e, "corrupt cache entry, treating as absent");
                None
            }
        }
    }

    /// Store a value as JSON in the cache.
    ///
    /// Silently does nothing if serialization fails.
    fn set_json<T: Serialize + ?Sized>(&self, key: &str, etag: &str, value: &T) {
        match serde_json::to_vec(value) {
            Ok(bytes) => self.set(key, etag, &bytes),
            Err(e) => tracing::warn!(key, error = %e, "failed to serialize cache entry"),
        }
    }
}

impl<B: CacheBucket + ?Sized> CacheBucketExt for B {}
