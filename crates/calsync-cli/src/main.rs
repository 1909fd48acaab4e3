//! calsync CLI entry point.

use std::process::ExitCode;

use clap::Parser;

use calsync_cli::Cli;
use calsync_core::{init_tracing, TracingConfig};

#[tokio::main]
async fn main() -> ExitCode {
    let cli = Cli::parse();

    let tracing_config = if cli.debug_enabled() {
        TracingConfig::cli_debug()
    } else {
        TracingConfig::cli()
    };
    if let Err(e) = init_tracing(tracing_config) {
        eprintln!("warning: {}", e);
    }

    match calsync_cli::run::run(&cli).await {
        Ok(()) => ExitCode::SUCCESS,
        Err(e) => {
            tracing::error!(error = %e, transient = e.is_transient(), "calsync failed");
            ExitCode::FAILURE
        }
    }
}
