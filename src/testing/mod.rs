//! Suite runner
//!
//! Reads a YAML list of test descriptors and dispatches each one into the
//! sandbox through the [`Controller`](crate::dispatch::Controller), turning
//! every invocation into one pass/fail/timeout record.

mod config;
mod runner;

pub use config::*;
pub use runner::{run_suite, run_tests, SuiteOptions, SuiteReport, TestOutcome, TestRecord};
