//! Suite runner implementation
//!
//! Starts the sandbox host once, then dispatches every selected test in
//! order and waits for each one before starting the next.

use std::path::Path;
use std::sync::Arc;
use std::time::Instant;

use colored::Colorize;
use serde::Serialize;

use crate::common::config::{resolve_host_path, Config};
use crate::common::{Error, Result};
use crate::dispatch::{CompletionChannels, CompletionSignal, Controller};
use crate::host::HostClient;

use super::config::{TestDescriptor, TestSuite};

/// How a single test ended, as reported to the user
#[derive(Debug, Clone, PartialEq, Eq, Serialize)]
#[serde(tag = "status", rename_all = "snake_case")]
pub enum TestOutcome {
    Passed,
    Failed { reason: String },
    TimedOut,
    /// The test never started (unknown trigger, activation refused, host gone)
    DispatchError { message: String },
}

impl TestOutcome {
    fn from_run(result: Result<CompletionSignal>) -> Self {
        match result {
            Ok(CompletionSignal::Success) => Self::Passed,
            Ok(CompletionSignal::Failure { reason }) => Self::Failed { reason },
            Ok(CompletionSignal::TimedOut) => Self::TimedOut,
            Err(e) => Self::DispatchError {
                message: e.to_string(),
            },
        }
    }
}

/// One line of the suite report
#[derive(Debug, Clone, Serialize)]
pub struct TestRecord {
    pub name: String,
    #[serde(skip_serializing_if = "Option::is_none")]
    pub title: Option<String>,
    #[serde(flatten)]
    pub outcome: TestOutcome,
    pub elapsed_ms: u64,
    pub timeout_ms: u64,
}

/// Result of a suite run
#[derive(Debug, Clone, Serialize)]
pub struct SuiteReport {
    pub name: String,
    pub records: Vec<TestRecord>,
}

impl SuiteReport {
    /// True when every test passed
    pub fn passed(&self) -> bool {
        self.records
            .iter()
            .all(|r| r.outcome == TestOutcome::Passed)
    }

    /// (passed, failed, timed out, dispatch errors)
    pub fn counts(&self) -> (usize, usize, usize, usize) {
        self.records.iter().fold((0, 0, 0, 0), |(p, f, t, d), r| match r.outcome {
            TestOutcome::Passed => (p + 1, f, t, d),
            TestOutcome::Failed { .. } => (p, f + 1, t, d),
            TestOutcome::TimedOut => (p, f, t + 1, d),
            TestOutcome::DispatchError { .. } => (p, f, t, d + 1),
        })
    }
}

/// Options for a suite run
#[derive(Debug, Default, Clone)]
pub struct SuiteOptions {
    /// Print host details and per-test deadlines
    pub verbose: bool,
    /// Only run tests whose name contains this
    pub filter: Option<String>,
    /// Suppress human-readable output (the caller prints the report itself)
    pub quiet: bool,
}

/// Run a test suite from a YAML file
pub async fn run_suite(path: &Path, config: &Config, options: &SuiteOptions) -> Result<SuiteReport> {
    let suite = TestSuite::load(path)?;
    let suite_dir = path.parent().unwrap_or(Path::new("."));
    let (host_config, timeouts) = suite.effective_host(&config.host, &config.timeouts, suite_dir);
    let host_path = resolve_host_path(&host_config.path)?;

    let selected: Vec<&TestDescriptor> = suite.selected(options.filter.as_deref()).collect();
    if selected.is_empty() {
        return Err(Error::Config(format!(
            "No tests in '{}' match filter '{}'",
            suite.name,
            options.filter.as_deref().unwrap_or("")
        )));
    }

    if !options.quiet {
        println!(
            "\n{} {}",
            "Running Suite:".blue().bold(),
            suite.name.white().bold()
        );
        if let Some(desc) = &suite.description {
            println!("  {}", desc.dimmed());
        }
        if options.verbose {
            println!("  Host: {}", host_path.display().to_string().dimmed());
        }
    }

    tracing::info!(suite = %suite.name, tests = selected.len(), host = %host_path.display(), "Starting suite");

    let channels = CompletionChannels::new();
    let host = Arc::new(
        HostClient::spawn(&host_path, &host_config.args, &timeouts, channels.clone()).await?,
    );

    if let Err(e) = host.wait_ready().await {
        let _ = host.shutdown().await;
        return Err(e);
    }

    let controller = Controller::new(host.clone(), channels, &timeouts);
    let records = run_tests(&controller, selected, options).await;

    host.shutdown().await?;

    let report = SuiteReport {
        name: suite.name,
        records,
    };

    if !options.quiet {
        print_summary(&report);
    }

    Ok(report)
}

/// Dispatch each test in turn and collect one record per test
///
/// Dispatch errors are recorded and the suite moves on; nothing is retried.
pub async fn run_tests<'a, I>(controller: &Controller, tests: I, options: &SuiteOptions) -> Vec<TestRecord>
where
    I: IntoIterator<Item = &'a TestDescriptor>,
{
    if !options.quiet {
        println!("\n{}", "Tests:".cyan());
    }

    let mut records = Vec::new();
    for test in tests {
        let requested = test.timeout_ms.map(|ms| i64::try_from(ms).unwrap_or(i64::MAX));
        let timeout_ms = controller.effective_timeout(requested).as_millis() as u64;

        if options.verbose && !options.quiet {
            println!(
                "  {} {} {}",
                "…".dimmed(),
                test.display_name(),
                format!("(deadline {} ms)", timeout_ms).dimmed()
            );
        }

        let started = Instant::now();
        let outcome = TestOutcome::from_run(controller.run(&test.name, requested).await);
        let record = TestRecord {
            name: test.name.clone(),
            title: test.title.clone(),
            outcome,
            elapsed_ms: started.elapsed().as_millis() as u64,
            timeout_ms,
        };

        if !options.quiet {
            print_record(&record, test.display_name());
        }
        records.push(record);
    }
    records
}

fn print_record(record: &TestRecord, display_name: &str) {
    let elapsed = format!("({} ms)", record.elapsed_ms).dimmed();
    match &record.outcome {
        TestOutcome::Passed => {
            println!("  {} {} {}", "✓".green(), display_name, elapsed);
        }
        TestOutcome::Failed { reason } => {
            println!("  {} {} {}", "✗".red(), display_name, elapsed);
            println!("      {}", reason.red());
        }
        TestOutcome::TimedOut => {
            println!("  {} {}", "⏱".yellow(), display_name);
            println!(
                "      {}",
                format!(
                    "timed out after {} ms, the routine may still be running in the sandbox",
                    record.timeout_ms
                )
                .yellow()
            );
        }
        TestOutcome::DispatchError { message } => {
            println!("  {} {}", "!".red().bold(), display_name);
            println!("      {}", format!("not started: {}", message).red());
        }
    }
}

fn print_summary(report: &SuiteReport) {
    let (passed, failed, timed_out, errors) = report.counts();
    let line = format!(
        "{} passed, {} failed, {} timed out, {} not started",
        passed, failed, timed_out, errors
    );

    if report.passed() {
        println!("\n{} {}\n", "✓".green().bold(), line.green().bold());
    } else {
        println!("\n{} {}\n", "✗".red().bold(), line.red().bold());
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    fn record(outcome: TestOutcome) -> TestRecord {
        TestRecord {
            name: "t".to_string(),
            title: None,
            outcome,
            elapsed_ms: 1,
            timeout_ms: 1000,
        }
    }

    #[test]
    fn test_outcome_mapping() {
        assert_eq!(
            TestOutcome::from_run(Ok(CompletionSignal::Success)),
            TestOutcome::Passed
        );
        assert_eq!(
            TestOutcome::from_run(Ok(CompletionSignal::failure("R"))),
            TestOutcome::Failed {
                reason: "R".to_string()
            }
        );
        assert_eq!(
            TestOutcome::from_run(Ok(CompletionSignal::TimedOut)),
            TestOutcome::TimedOut
        );
        assert!(matches!(
            TestOutcome::from_run(Err(Error::not_found("ghost"))),
            TestOutcome::DispatchError { message } if message.contains("ghost")
        ));
    }

    #[test]
    fn test_report_counts_and_verdict() {
        let report = SuiteReport {
            name: "s".to_string(),
            records: vec![
                record(TestOutcome::Passed),
                record(TestOutcome::TimedOut),
                record(TestOutcome::Failed {
                    reason: "x".to_string(),
                }),
                record(TestOutcome::Passed),
            ],
        };
        assert_eq!(report.counts(), (2, 1, 1, 0));
        assert!(!report.passed());

        let all_green = SuiteReport {
            name: "s".to_string(),
            records: vec![record(TestOutcome::Passed)],
        };
        assert!(all_green.passed());
    }

    #[test]
    fn test_record_json_is_flat() {
        let json = serde_json::to_value(record(TestOutcome::TimedOut)).unwrap();
        assert_eq!(
            json,
            serde_json::json!({
                "name": "t",
                "status": "timed_out",
                "elapsed_ms": 1,
                "timeout_ms": 1000
            })
        );
    }
}
