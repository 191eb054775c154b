//! sandbox-dispatch - test dispatch harness for browser/WASM sandboxes
//!
//! A driver process outside the sandbox triggers named test routines inside
//! it and awaits their completion, failure or timeout.

pub mod cli;
pub mod commands;
pub mod common;
pub mod dispatch;
pub mod host;
pub mod testing;

// Re-export commonly used types for tests
pub use common::{Error, Result};
pub use dispatch::{CompletionChannels, CompletionSignal, Controller, TriggerBinding};
