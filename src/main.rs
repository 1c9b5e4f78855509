mod cli;
mod engine;
mod error;
mod log_bus;
mod metrics;
mod model;
mod orchestrator;
mod sequencer;
mod settings;
mod storage;
mod text_summary;
mod tracker;

use anyhow::Result;
use clap::Parser;
use tracing_subscriber::EnvFilter;

/// Diagnostics go to stderr so stdout stays clean for `--json`.
fn init_logging(verbose: bool) {
    let default = if verbose { "info" } else { "warn" };
    tracing_subscriber::fmt()
        .with_env_filter(
            EnvFilter::try_from_default_env().unwrap_or_else(|_| EnvFilter::new(default)),
        )
        .with_writer(std::io::stderr)
        .with_target(false)
        .init();
}

#[tokio::main]
async fn main() -> Result<()> {
    let args = cli::Cli::parse();
    init_logging(args.verbose);

    match cli::run(args).await {
        Ok(true) => Ok(()),
        // The failure was already reported on the event stream.
        Ok(false) => std::process::exit(1),
        Err(e) => Err(e),
    }
}
