//! sandbox-dispatch - trigger named tests inside a browser/WASM sandbox
//!
//! Spawns the sandbox host, activates the requested test triggers and
//! reports each outcome as pass, fail or timeout.

use std::path::PathBuf;

use clap::Parser;
use sandbox_dispatch::commands::Commands;
use sandbox_dispatch::common::{config::Config, logging};
use sandbox_dispatch::cli;

#[derive(Parser)]
#[command(name = "sandbox-dispatch", about = "Dispatch tests into a WASM sandbox")]
#[command(version, long_about = None)]
struct Cli {
    /// Configuration file (default: platform config dir)
    #[arg(long, global = true)]
    config: Option<PathBuf>,

    #[command(subcommand)]
    command: Commands,
}

#[tokio::main]
async fn main() {
    let cli = Cli::parse();

    if matches!(cli.command, Commands::Suite { .. }) {
        if let Some(path) = logging::init_suite() {
            tracing::debug!(log = %path.display(), "Suite log file");
        }
    } else {
        logging::init_cli();
    }

    let config = match &cli.config {
        Some(path) => Config::load_from(path),
        None => Config::load(),
    };

    let result = match config {
        Ok(config) => cli::dispatch(cli.command, &config).await,
        Err(e) => Err(e),
    };

    match result {
        Ok(true) => {}
        Ok(false) => std::process::exit(1),
        Err(e) => {
            eprintln!("Error: {e}");
            std::process::exit(2);
        }
    }
}
