//! Incremental build core for Kiln.
//!
//! This crate decides what a build has to do and does it:
//!
//! - [`SiteBuilder`]: Full builds and interval refetch passes
//! - [`DiffEngine`]: Page statuses from fingerprints and the previous snapshot
//! - [`DependencyTracker`]: Page to entity dependency graph
//! - [`CompilationUnit`]: Browser and SSR bundle compilation hashes
//! - [`ManifestWriter`]: Atomic `build-manifest.json` publication
//! - [`OutputDir`]: Rendered pages and page data on disk
//! - [`BuildLock`]: One writer per cache directory
//!
//! # Quick Start
//!
//! ```no_run
//! # async fn run() -> Result<(), Box<dyn std::error::Error>> {
//! use kiln_build::{BuildOptions, SiteBuilder};
//! use kiln_cache::FileCache;
//! use kiln_config::Config;
//! use kiln_source::HttpSource;
//!
//! let config = Config::load(None, None)?;
//! let source = HttpSource::new(&config.require_source()?.url);
//! let cache = FileCache::new(config.site_resolved.cache_dir.join("store"), "1");
//!
//! let builder = SiteBuilder::new(BuildOptions::from_config(&config), source, Box::new(cache));
//! let report = builder.build().await?;
//! println!("{} pages rendered", report.manifest.generated.len());
//! # Ok(())
//! # }
//! ```

mod builder;
mod bundle;
mod deps;
mod diff;
mod error;
mod fingerprint;
mod lock;
mod manifest;
mod output;
mod page;
mod query;
mod snapshot;

pub use builder::{BuildOptions, BuildReport, SiteBuilder};
pub use bundle::{BundleKind, CompilationUnit, expand_patterns, fingerprint_modules};
pub use deps::{DependencyTracker, entity};
pub use diff::{BuildInputs, BuildPlan, DiffEngine};
pub use error::{BuildError, ManifestError, OutputError, RenderError};
pub use fingerprint::{Fingerprint, FingerprintStore};
pub use lock::{BuildLock, LOCK_FILE};
pub use manifest::{
    BuildManifest, CompilationHashChange, DELETED_PAGES_FILE, MANIFEST_FILE, ManifestReader,
    ManifestWriter, NEW_PAGES_FILE,
};
pub use output::{BasicRenderer, OutputDir, PageData, PageRenderer, RenderContext};
pub use page::{Page, PageSpec, PageStatus, is_valid_page_path, load_pages};
pub use query::{hash_query, murmurhash2, strip_ignored_characters};
pub use snapshot::{BuildSnapshot, BuildState, PageRecord, STATE_KEY};
