//! `kiln manifest` command implementation.

use std::path::PathBuf;

use clap::Args;
use kiln_build::ManifestReader;
use kiln_config::Config;

use crate::error::CliError;
use crate::output::Output;

/// Arguments for the manifest command.
#[derive(Args)]
pub(crate) struct ManifestArgs {
    /// Path to configuration file (default: auto-discover kiln.toml).
    #[arg(short, long)]
    config: Option<PathBuf>,
}

impl ManifestArgs {
    /// Execute the manifest command.
    ///
    /// # Errors
    ///
    /// Returns an error if configuration fails or no manifest was published.
    pub(crate) fn execute(self) -> Result<(), CliError> {
        let output = Output::new();
        let config = Config::load(self.config.as_deref(), None)?;

        let path = config.site_resolved.manifest_path();
        let manifest = ManifestReader::read(&path).ok_or_else(|| {
            CliError::Validation(format!(
                "no build manifest at {} (run `kiln build` first)",
                path.display()
            ))
        })?;

        output.data(&serde_json::to_string_pretty(&manifest)?)?;
        Ok(())
    }
}
