//! `kiln clean` command implementation.

use std::fs;
use std::path::{Path, PathBuf};

use clap::Args;
use kiln_build::BuildLock;
use kiln_config::Config;

use crate::error::CliError;
use crate::output::Output;

/// Arguments for the clean command.
#[derive(Args)]
pub(crate) struct CleanArgs {
    /// Path to configuration file (default: auto-discover kiln.toml).
    #[arg(short, long)]
    config: Option<PathBuf>,

    /// Remove the cache even if a build lock is present.
    #[arg(long)]
    force: bool,
}

impl CleanArgs {
    /// Execute the clean command.
    ///
    /// # Errors
    ///
    /// Returns an error if a build holds the lock (without `--force`) or the
    /// directory cannot be removed.
    pub(crate) fn execute(self) -> Result<(), CliError> {
        let output = Output::new();
        let config = Config::load(self.config.as_deref(), None)?;
        let cache_dir = &config.site_resolved.cache_dir;

        if clean_cache_dir(cache_dir, self.force)? {
            output.success(&format!("Removed {}", cache_dir.display()));
        } else {
            output.info("Nothing to clean");
        }
        Ok(())
    }
}

/// Remove `cache_dir`. Returns whether anything was removed.
fn clean_cache_dir(cache_dir: &Path, force: bool) -> Result<bool, CliError> {
    if !cache_dir.exists() {
        return Ok(false);
    }
    if BuildLock::is_held(cache_dir) && !force {
        return Err(CliError::Validation(format!(
            "build lock present in {}; use --force if no build is running",
            cache_dir.display()
        )));
    }
    fs::remove_dir_all(cache_dir)?;
    Ok(true)
}
