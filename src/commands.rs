//! CLI command definitions
//!
//! Defines the clap commands for the dispatch CLI.

use clap::Subcommand;
use std::path::PathBuf;

#[derive(Subcommand)]
pub enum Commands {
    /// Trigger one named test in the sandbox and wait for it
    Run {
        /// Test name (the trigger's name in the sandbox)
        name: String,

        /// Deadline in milliseconds; 0 or omitted uses the configured default
        #[arg(long, allow_hyphen_values = true)]
        timeout_ms: Option<i64>,
    },

    /// Run every test in a YAML suite file, one after another
    Suite {
        /// Path to the suite file
        file: PathBuf,

        /// Only run tests whose name contains this string
        #[arg(long)]
        filter: Option<String>,

        /// Print the report as JSON instead of colored text
        #[arg(long)]
        json: bool,

        /// Show host details and per-test deadlines
        #[arg(long, short)]
        verbose: bool,
    },

    /// List the test triggers the sandbox exposes
    List,
}
