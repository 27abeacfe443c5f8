//! Key-value cache abstraction for Kiln.
//!
//! This crate decouples build-state consumers from the storage that survives
//! between build invocations. Two traits form the core API:
//!
//! - [`Cache`]: Factory for named cache buckets
//! - [`CacheBucket`]: Key-value store with etag-based invalidation
//!
//! # Implementations
//!
//! - [`NullCache`] / [`NullCacheBucket`]: No-op implementations (always miss)
//! - [`MemoryCache`]: In-process implementation, shared between bucket handles
//! - [`FileCache`]: File-based implementation with version validation
//!
//! [`FingerprintStore`] layers typed JSON entries over a bucket and is what the
//! build pipeline reads and writes between runs.
//!
//! An absent key is never an error: every consumer treats a miss as "no
//! prior value" and falls back to recomputing.
//!
//! # Example
//!
//! ```
//! use kiln_cache::{Cache, MemoryCache};
//!
//! let cache = MemoryCache::new();
//! let bucket = cache.bucket("fingerprints");
//! bucket.set("created-node-ids", "v1", b"[\"a\",\"b\"]");
//! assert!(bucket.get("created-node-ids", "v1").is_some());
//!
//! bucket.remove("created-node-ids");
//! assert_eq!(bucket.get("created-node-ids", "v1"), None);
//! ```

mod ext;
mod file;
mod memory;
mod store;

pub use ext::CacheBucketExt;
pub use file::FileCache;
pub use memory::MemoryCache;
pub use store::FingerprintStore;

/// A named partition within a [`Cache`].
///
/// Each bucket stores key-value pairs where values are invalidated by an etag.
/// The etag is an opaque string chosen by the caller (e.g., a format version or
/// content hash). A cache hit occurs only when both the key and etag match.
pub trait CacheBucket: Send + Sync {
    /// Retrieve a cached value.
    ///
    /// Returns `Some(value)` if the key exists **and** was stored with the same
    /// `etag`. Returns `None` on cache miss or etag mismatch.
    ///
    /// If `etag` is an empty string, etag validation is skipped and the cached
    /// data is returned regardless of the stored etag.
    fn get(&self, key: &str, etag: &str) -> Option<Vec<u8>>;

    /// Store a value in the cache.
    ///
    /// Overwrites any existing entry for the same key, regardless of the
    /// previous etag.
    fn set(&self, key: &str, etag: &str, value: &[u8]);

    /// Remove a single entry.
    ///
    /// A later `get` for the same key must miss.
    fn remove(&self, key: &str);

    /// Remove every entry in this bucket.
    fn clear(&self);
}

/// Factory for named cache [`CacheBucket`]s.
///
/// A `Cache` produces buckets that are logically isolated from each other.
/// For example, a file-based cache stores each bucket in a separate
/// subdirectory.
pub trait Cache: Send + Sync {
    /// Open or create a named bucket.
    ///
    /// Calling `bucket` multiple times with the same name may return
    /// independent handles that share the same underlying storage.
    fn bucket(&self, name: &str) -> Box<dyn CacheBucket>;
}

/// No-op [`CacheBucket`] that never stores or retrieves data.
///
/// Every `get` returns `None`; every `set` is silently discarded.
pub struct NullCacheBucket;

impl CacheBucket for NullCacheBucket {
    fn get(&self, _key: &str, _etag: &str) -> Option<Vec<u8>> {
        None
    }

    fn set(&self, _key: &str, _etag: &str, _value: &[u8]) {}

    fn remove(&self, _key: &str) {}

    fn clear(&self) {}
}

/// No-op [`Cache`] that always returns [`NullCacheBucket`]s.
///
/// Use when caching is disabled: every build then behaves like the first one.
pub struct NullCache;

impl Cache for NullCache {
    fn bucket(&self, _name: &str) -> Box<dyn CacheBucket> {
        Box::new(NullCacheBucket)
    }
}
