//! In-process cache implementation.

use std::collections::HashMap;
use std::sync::{Arc, RwLock};

use crate::{Cache, CacheBucket};

type Entries = HashMap<String, (String, Vec<u8>)>;

/// In-memory [`Cache`].
///
/// Buckets opened under the same name share storage, so a value written
/// through one handle is visible through every other handle. Cloning the
/// cache clones the handle, not the data.
#[derive(Clone, Default)]
pub struct MemoryCache {
    buckets: Arc<RwLock<HashMap<String, Arc<RwLock<Entries>>>>>,
}

impl MemoryCache {
    /// Create an empty cache.
    #[must_use]
    pub fn new() -> Self {
        Self::default()
    }

    /// Drop every bucket, as if the cache directory had been deleted.
    pub fn wipe(&self) {
        self.buckets
            .write()
            .unwrap_or_else(std::sync::PoisonError::into_inner)
            .clear();
    }
}

impl Cache for MemoryCache {
    fn bucket(&self, name: &str) -> Box<dyn CacheBucket> {
        let mut buckets = self
            .buckets
            .write()
            .unwrap_or_else(std::sync::PoisonError::into_inner);
        let entries = Arc::clone(buckets.entry(name.to_owned()).or_default());
        Box::new(MemoryCacheBucket { entries })
    }
}

struct MemoryCacheBucket {
    entries: Arc<RwLock<Entries>>,
}

impl CacheBucket for MemoryCacheBucket {
    fn get(&self, key: &str, etag: &str) -> Option<Vec<u8>> {
        let entries = self
            .entries
            .read()
            .unwrap_or_else(std::sync::PoisonError::into_inner);
        let (stored_etag, value) = entries.get(key)?;
        if !etag.is_empty() && stored_etag != etag {
            return None;
        }
        Some(value.clone())
    }

    fn set(&self, key: &str, etag: &str, value: &[u8]) {
        self.entries
            .write()
            .unwrap_or_else(std::sync::PoisonError::into_inner)
            .insert(key.to_owned(), (etag.to_owned(), value.to_vec()));
    }

    fn remove(&self, key: &str) {
        self.entries
            .write()
            .unwrap_or_else(std::sync::PoisonError::into_inner)
            .remove(key);
    }

    fn clear(&self) {
        self.entries
            .write()
            .unwrap_or_else(std::sync::PoisonError::into_inner)
            .clear();
    }
}
