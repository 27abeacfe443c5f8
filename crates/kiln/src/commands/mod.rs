//! CLI command implementations.

pub(crate) mod build;
pub(crate) mod clean;
pub(crate) mod manifest;
pub(crate) mod refetch;

use std::time::Duration;

use kiln_build::{BuildOptions, BuildReport, SiteBuilder};
use kiln_cache::{Cache, FileCache, NullCache};
use kiln_config::Config;
use kiln_source::{HttpSource, TracingObserver};

pub(crate) use build::BuildArgs;
pub(crate) use clean::CleanArgs;
pub(crate) use manifest::ManifestArgs;
pub(crate) use refetch::RefetchArgs;

use crate::error::CliError;
use crate::output::Output;

/// Cache subdirectory holding the fingerprint store.
const STORE_DIR: &str = "store";

/// Builder over the configured HTTP source and cache.
fn site_builder(config: &Config, version: &str) -> Result<SiteBuilder<HttpSource>, CliError> {
    let source_config = config.require_source()?;
    let source = HttpSource::with_options(
        &source_config.url,
        Some(&source_config.token),
        source_config.per_page,
        Duration::from_secs(source_config.timeout_secs),
    );

    let site = &config.site_resolved;
    let cache: Box<dyn Cache> = if site.cache_enabled {
        Box::new(FileCache::new(site.cache_dir.join(STORE_DIR), version))
    } else {
        Box::new(NullCache)
    };

    Ok(
        SiteBuilder::new(BuildOptions::from_config(config), source, cache)
            .with_observer(Box::new(TracingObserver::new())),
    )
}

fn print_report(output: &Output, report: &BuildReport) {
    let manifest = &report.manifest;
    output.success(&format!(
        "Built {} of {} pages ({} removed)",
        manifest.generated.len(),
        manifest.all_pages.len(),
        manifest.removed.len()
    ));
    for path in &manifest.generated {
        output.item(&format!("+ {path}"));
    }
    for path in &manifest.removed {
        output.item(&format!("- {path}"));
    }
    if manifest.changed_browser_compilation_hash.is_changed() {
        output.info("Browser bundle changed");
    }
    if manifest.changed_ssr_compilation_hash.is_changed() {
        output.info("SSR bundle changed");
    }
    output.info(&format!("Manifest: {}", report.manifest_path.display()));
}
