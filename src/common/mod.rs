//! Common utilities shared by the CLI, the suite runner and the host bridge

pub mod config;
pub mod error;
pub mod logging;
pub mod paths;

pub use error::{Error, Result};
