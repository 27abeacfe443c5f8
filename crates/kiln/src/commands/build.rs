//! `kiln build` command implementation.

use std::path::PathBuf;

use clap::Args;
use kiln_config::{CliSettings, Config};

use crate::error::CliError;
use crate::output::Output;

/// Arguments for the build command.
#[derive(Args)]
pub(crate) struct BuildArgs {
    /// Path to configuration file (default: auto-discover kiln.toml).
    #[arg(short, long)]
    config: Option<PathBuf>,

    /// Output directory (overrides config).
    #[arg(short, long)]
    output_dir: Option<PathBuf>,

    /// Content source URL (overrides config).
    #[arg(long, env = "KILN_SOURCE_URL")]
    source_url: Option<String>,

    /// Disable the fingerprint cache (every build becomes a full build).
    #[arg(long)]
    no_cache: bool,

    /// Enable verbose output (phase timings and build plan logs).
    #[arg(short, long)]
    pub verbose: bool,
}

impl BuildArgs {
    /// Execute the build command.
    ///
    /// # Errors
    ///
    /// Returns an error if configuration fails or the build fails.
    pub(crate) async fn execute(self, version: &str) -> Result<(), CliError> {
        let output = Output::new();

        let cli_settings = CliSettings {
            output_dir: self.output_dir,
            cache_enabled: self.no_cache.then_some(false),
            source_url: self.source_url,
            ..Default::default()
        };
        let config = Config::load(self.config.as_deref(), Some(&cli_settings))?;

        let site = &config.site_resolved;
        output.info(&format!("Pages: {}", site.pages_file.display()));
        output.info(&format!("Output directory: {}", site.output_dir.display()));
        if site.cache_enabled {
            output.info(&format!("Cache directory: {}", site.cache_dir.display()));
        } else {
            output.warning("Cache: disabled, building everything");
        }

        let builder = super::site_builder(&config, version)?;
        let report = builder.build().await?;
        super::print_report(&output, &report);
        Ok(())
    }
}
