//! Core dispatch types

use serde::{Deserialize, Serialize};
use std::fmt;

/// Identity of one invocation
///
/// Completion channels are keyed by this, never by test name, so two runs of
/// the same test cannot see each other's notifications.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Hash, PartialOrd, Ord, Serialize, Deserialize)]
#[serde(transparent)]
pub struct RunId(pub u64);

impl fmt::Display for RunId {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        write!(f, "run#{}", self.0)
    }
}

/// Opaque reference to one activatable control inside the sandbox
///
/// Produced by [`TriggerBinding::resolve`](super::TriggerBinding::resolve) and
/// only ever borrowed afterwards.
#[derive(Debug, PartialEq, Eq)]
pub struct TriggerHandle {
    name: String,
    locator: String,
}

impl TriggerHandle {
    pub fn new(name: impl Into<String>, locator: impl Into<String>) -> Self {
        Self {
            name: name.into(),
            locator: locator.into(),
        }
    }

    /// Test name this handle was resolved from
    pub fn name(&self) -> &str {
        &self.name
    }

    /// Environment-specific locator (e.g. a DOM selector)
    pub fn locator(&self) -> &str {
        &self.locator
    }
}

/// Terminal outcome of one dispatched test
#[derive(Debug, Clone, PartialEq, Eq, Serialize, Deserialize)]
#[serde(tag = "status", rename_all = "snake_case")]
pub enum CompletionSignal {
    Success,
    /// The routine reported failure; `reason` is passed through verbatim
    Failure { reason: String },
    /// No terminal notification arrived before the deadline
    TimedOut,
}

impl CompletionSignal {
    pub fn failure(reason: impl Into<String>) -> Self {
        Self::Failure {
            reason: reason.into(),
        }
    }

    pub fn is_success(&self) -> bool {
        matches!(self, Self::Success)
    }
}

impl fmt::Display for CompletionSignal {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        match self {
            Self::Success => write!(f, "success"),
            Self::Failure { reason } => write!(f, "failure: {}", reason),
            Self::TimedOut => write!(f, "timed out"),
        }
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn test_signal_json_shape() {
        let json = serde_json::to_value(CompletionSignal::failure("proof verification failed"))
            .unwrap();
        assert_eq!(
            json,
            serde_json::json!({"status": "failure", "reason": "proof verification failed"})
        );
        let json = serde_json::to_value(CompletionSignal::TimedOut).unwrap();
        assert_eq!(json, serde_json::json!({"status": "timed_out"}));
    }

    #[test]
    fn test_handle_accessors() {
        let handle = TriggerHandle::new("slowTest", "#slowTest");
        assert_eq!(handle.name(), "slowTest");
        assert_eq!(handle.locator(), "#slowTest");
    }
}
