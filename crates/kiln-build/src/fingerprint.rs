//! Content fingerprints.
//!
//! A [`Fingerprint`] is the SHA-256 hex digest of some input. Persisted
//! fingerprints live in a [`FingerprintStore`]; comparing the stored value
//! with a freshly computed one tells whether an input changed.

use std::fmt;
use std::fs;
use std::path::Path;

use serde::{Deserialize, Serialize};
use sha2::{Digest, Sha256};

pub use kiln_cache::FingerprintStore;

/// Content hash of one input.
#[derive(Clone, Debug, PartialEq, Eq, PartialOrd, Ord, Hash, Serialize, Deserialize)]
#[serde(transparent)]
pub struct Fingerprint(String);

impl Fingerprint {
    /// Fingerprint raw bytes.
    #[must_use]
    pub fn of_bytes(bytes: &[u8]) -> Self {
        let mut hasher = Sha256::new();
        hasher.update(bytes);
        Self(hex::encode(hasher.finalize()))
    }

    /// Fingerprint a JSON value through its canonical serialization.
    ///
    /// `serde_json` keeps object keys sorted unless `preserve_order` is on, so
    /// equal values hash equally.
    #[must_use]
    pub fn of_json(value: &serde_json::Value) -> Self {
        Self::of_bytes(value.to_string().as_bytes())
    }

    /// Fingerprint the contents of a file.
    pub fn of_file(path: &Path) -> std::io::Result<Self> {
        Ok(Self::of_bytes(&fs::read(path)?))
    }

    /// Fingerprint an ordered sequence of `(name, fingerprint)` pairs.
    ///
    /// Changes iff any pair changes, or a pair is added or removed.
    pub fn combine<'a, I>(parts: I) -> Self
    where
        I: IntoIterator<Item = (&'a str, &'a Fingerprint)>,
    {
        let mut hasher = Sha256::new();
        for (name, fingerprint) in parts {
            hasher.update(name.as_bytes());
            hasher.update(b"\0");
            hasher.update(fingerprint.0.as_bytes());
            hasher.update(b"\n");
        }
        Self(hex::encode(hasher.finalize()))
    }

    /// Hex digest.
    #[must_use]
    pub fn as_str(&self) -> &str {
        &self.0
    }
}

impl fmt::Display for Fingerprint {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        f.write_str(&self.0)
    }
}
