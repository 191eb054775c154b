//! CLI command handling
//!
//! Starts the sandbox host for one-shot commands and formats their output.

use std::sync::Arc;

use colored::Colorize;

use crate::commands::Commands;
use crate::common::config::Config;
use crate::common::Result;
use crate::dispatch::{CompletionChannels, CompletionSignal, Controller};
use crate::host::HostClient;
use crate::testing::{self, SuiteOptions};

/// Dispatch a CLI command
///
/// Returns whether the command's checks passed; errors are for failures of
/// the harness itself.
pub async fn dispatch(command: Commands, config: &Config) -> Result<bool> {
    match command {
        Commands::Run { name, timeout_ms } => {
            let channels = CompletionChannels::new();
            let host = start_host(config, channels.clone()).await?;
            let controller = Controller::new(host.clone(), channels, &config.timeouts);

            let deadline = controller.effective_timeout(timeout_ms);
            let result = controller.run(&name, timeout_ms).await;
            host.shutdown().await?;

            let signal = result?;
            print_signal(&name, &signal, deadline.as_millis() as u64);
            Ok(signal.is_success())
        }

        Commands::Suite {
            file,
            filter,
            json,
            verbose,
        } => {
            let options = SuiteOptions {
                verbose,
                filter,
                quiet: json,
            };
            let report = testing::run_suite(&file, config, &options).await?;

            if json {
                println!("{}", serde_json::to_string_pretty(&report)?);
            }
            Ok(report.passed())
        }

        Commands::List => {
            let host = start_host(config, CompletionChannels::new()).await?;
            let controls = host.controls().await;
            host.shutdown().await?;

            let controls = controls?;
            if controls.is_empty() {
                println!("No test triggers found");
            } else {
                println!("Test triggers:");
                for control in &controls {
                    if control.enabled {
                        println!("  {}", control.name);
                    } else {
                        println!("  {} {}", control.name, "(disabled)".dimmed());
                    }
                }
            }
            Ok(true)
        }
    }
}

/// Spawn the configured host and wait until its sandbox is loaded
async fn start_host(config: &Config, channels: CompletionChannels) -> Result<Arc<HostClient>> {
    let path = config.resolve_host()?;
    let host = HostClient::spawn(&path, &config.host.args, &config.timeouts, channels).await?;

    if let Err(e) = host.wait_ready().await {
        let _ = host.shutdown().await;
        return Err(e);
    }
    Ok(Arc::new(host))
}

fn print_signal(name: &str, signal: &CompletionSignal, deadline_ms: u64) {
    match signal {
        CompletionSignal::Success => {
            println!("{} {} passed", "✓".green(), name);
        }
        CompletionSignal::Failure { reason } => {
            println!("{} {} failed: {}", "✗".red(), name, reason);
        }
        CompletionSignal::TimedOut => {
            println!(
                "{} {} timed out after {} ms. The routine may still be running in the sandbox",
                "⏱".yellow(),
                name,
                deadline_ms
            );
        }
    }
}
