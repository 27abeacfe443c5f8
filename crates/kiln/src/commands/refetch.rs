//! `kiln refetch` command implementation.

use std::path::PathBuf;
use std::time::Duration;

use clap::Args;
use kiln_config::{CliSettings, Config};

use crate::error::CliError;
use crate::output::Output;

/// Arguments for the refetch command.
#[derive(Args)]
pub(crate) struct RefetchArgs {
    /// Path to configuration file (default: auto-discover kiln.toml).
    #[arg(short, long)]
    config: Option<PathBuf>,

    /// Seconds between polls (overrides config).
    #[arg(short, long)]
    interval: Option<u64>,

    /// Poll once and exit.
    #[arg(long)]
    once: bool,

    /// Enable verbose output.
    #[arg(short, long)]
    pub verbose: bool,
}

impl RefetchArgs {
    /// Execute the refetch command.
    ///
    /// Polls the source every interval. When a poll reports changes, a full
    /// incremental build follows. A failed poll or build is reported and the
    /// loop keeps going, except with `--once`.
    ///
    /// # Errors
    ///
    /// Returns an error if configuration fails, or if the single pass of
    /// `--once` fails.
    pub(crate) async fn execute(self, version: &str) -> Result<(), CliError> {
        let output = Output::new();

        let cli_settings = CliSettings {
            refetch_interval_secs: self.interval,
            ..Default::default()
        };
        let config = Config::load(self.config.as_deref(), Some(&cli_settings))?;
        let builder = super::site_builder(&config, version)?;
        let interval = Duration::from_secs(config.refetch.interval_secs);

        if !self.once {
            output.info(&format!(
                "Polling {} every {}s",
                config.require_source()?.url,
                interval.as_secs()
            ));
        }

        loop {
            let pass = async {
                if builder.refetch().await? {
                    let report = builder.build().await?;
                    super::print_report(&output, &report);
                } else if self.once {
                    output.info("No changes");
                }
                Ok::<(), CliError>(())
            };

            match pass.await {
                Ok(()) => {}
                Err(e) if self.once => return Err(e),
                Err(e) => {
                    tracing::warn!(error = %e, "refetch pass failed");
                    output.warning(&format!("Refetch failed: {e}"));
                }
            }

            if self.once {
                return Ok(());
            }
            tokio::time::sleep(interval).await;
        }
    }
}
