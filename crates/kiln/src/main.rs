//! Kiln CLI - incremental static-site builds.
//!
//! Provides commands for:
//! - `build`: Reconcile content and build the site incrementally
//! - `refetch`: Poll the content source and rebuild on changes
//! - `manifest`: Print the last published build manifest
//! - `clean`: Wipe the cache directory

mod commands;
mod error;
mod output;

use clap::{Parser, Subcommand};
use tracing_subscriber::EnvFilter;

use commands::{BuildArgs, CleanArgs, ManifestArgs, RefetchArgs};
use output::Output;

/// Application version from Cargo.toml.
const VERSION: &str = env!("CARGO_PKG_VERSION");

/// Kiln - incremental static-site builds.
#[derive(Parser)]
#[command(name = "kiln", version, about)]
struct Cli {
    #[command(subcommand)]
    command: Commands,
}

#[derive(Subcommand)]
enum Commands {
    /// Build the site, regenerating only what changed.
    Build(BuildArgs),
    /// Poll the content source and rebuild when it reports changes.
    Refetch(RefetchArgs),
    /// Print the last published build manifest.
    Manifest(ManifestArgs),
    /// Remove the cache directory.
    Clean(CleanArgs),
}

fn main() {
    let cli = Cli::parse();
    let output = Output::new();

    let verbose = match &cli.command {
        Commands::Build(args) => args.verbose,
        Commands::Refetch(args) => args.verbose,
        Commands::Manifest(_) | Commands::Clean(_) => false,
    };

    // --verbose enables INFO level, otherwise use RUST_LOG or default to WARN
    let filter = if verbose {
        EnvFilter::new("info")
    } else {
        EnvFilter::from_default_env()
    };
    tracing_subscriber::fmt()
        .with_env_filter(filter)
        .with_writer(std::io::stderr)
        .init();

    let result = match cli.command {
        Commands::Build(args) => run_async(|| args.execute(VERSION)),
        Commands::Refetch(args) => run_async(|| args.execute(VERSION)),
        Commands::Manifest(args) => args.execute(),
        Commands::Clean(args) => args.execute(),
    };

    if let Err(err) = result {
        output.error(&format!("Error: {err}"));
        std::process::exit(1);
    }
}

fn run_async<F, Fut>(command: F) -> Result<(), error::CliError>
where
    F: FnOnce() -> Fut,
    Fut: Future<Output = Result<(), error::CliError>>,
{
    let rt = tokio::runtime::Runtime::new()?;
    rt.block_on(command())
}
