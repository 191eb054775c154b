//! Error types for the dispatch harness
//!
//! Dispatch errors (`NotFound`, `Activation`) are kept apart from everything
//! else: they mean the test never started, as opposed to a test that ran and
//! failed. A failing or timed-out test is not an error at all, it is a
//! [`CompletionSignal`](crate::dispatch::CompletionSignal) value.

use std::io;
use thiserror::Error;

/// Result type alias using our Error type
pub type Result<T> = std::result::Result<T, Error>;

/// Main error type for the dispatch harness
#[derive(Error, Debug)]
pub enum Error {
    // === Dispatch Errors ===
    #[error("No trigger named '{name}' in the sandbox. Is the page loaded? Use 'sandbox-dispatch list' to see available controls")]
    NotFound { name: String },

    #[error("Trigger '{name}' could not be activated: {reason}")]
    Activation { name: String, reason: String },

    // === Host Errors ===
    #[error("Sandbox host '{name}' not found. Searched: {searched}")]
    HostNotFound { name: String, searched: String },

    #[error("Sandbox host failed to start: {0}")]
    HostStartFailed(String),

    #[error("Sandbox host exited unexpectedly")]
    HostCrashed,

    #[error("Sandbox host protocol error: {0}")]
    HostProtocol(String),

    #[error("Sandbox host request '{command}' failed: {message}")]
    HostRequestFailed { command: String, message: String },

    #[error("Sandbox host did not report ready within {0} ms. Check that the page and WASM module load")]
    HostReadyTimeout(u64),

    // === Timeout Errors ===
    #[error("Host request timed out after {0} ms")]
    Timeout(u64),

    // === Configuration Errors ===
    #[error("Configuration error: {0}")]
    Config(String),

    #[error("Invalid configuration file: {0}")]
    ConfigParse(String),

    // === IO Errors ===
    #[error("IO error: {0}")]
    Io(#[from] io::Error),

    #[error("Failed to read file '{path}': {error}")]
    FileRead { path: String, error: String },

    // === Serialization Errors ===
    #[error("JSON error: {0}")]
    Json(#[from] serde_json::Error),
}

impl Error {
    /// Create a trigger-not-found error
    pub fn not_found(name: &str) -> Self {
        Self::NotFound {
            name: name.to_string(),
        }
    }

    /// Create an activation error
    pub fn activation(name: &str, reason: &str) -> Self {
        Self::Activation {
            name: name.to_string(),
            reason: reason.to_string(),
        }
    }

    /// Create a host not found error with search paths
    pub fn host_not_found<S: AsRef<str>>(name: &str, paths: &[S]) -> Self {
        Self::HostNotFound {
            name: name.to_string(),
            searched: paths.iter().map(|s| s.as_ref()).collect::<Vec<_>>().join(", "),
        }
    }

    /// Create a host request failed error
    pub fn host_request_failed(command: &str, message: &str) -> Self {
        Self::HostRequestFailed {
            command: command.to_string(),
            message: message.to_string(),
        }
    }

    /// Whether this error happened before any test routine started
    pub fn is_dispatch_error(&self) -> bool {
        matches!(self, Self::NotFound { .. } | Self::Activation { .. })
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn test_dispatch_errors_are_classified() {
        assert!(Error::not_found("x").is_dispatch_error());
        assert!(Error::activation("x", "disabled").is_dispatch_error());
        assert!(!Error::HostCrashed.is_dispatch_error());
        assert!(!Error::Timeout(10).is_dispatch_error());
    }

    #[test]
    fn test_activation_message_keeps_reason() {
        let err = Error::activation("slowTest", "control is disabled");
        assert_eq!(
            err.to_string(),
            "Trigger 'slowTest' could not be activated: control is disabled"
        );
    }
}
