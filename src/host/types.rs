//! Host protocol message types
//!
//! The harness sends requests (`resolve`, `activate`, `controls`,
//! `shutdown`); the host answers with responses and pushes events
//! (`ready`, `completed`, `log`).

use serde::{Deserialize, Serialize};
use serde_json::Value;

use crate::dispatch::{CompletionSignal, RunId};

// === Base Protocol Messages ===

/// Request message, harness to host
#[derive(Debug, Clone, Serialize, Deserialize)]
pub struct RequestMessage {
    pub seq: i64,
    #[serde(rename = "type")]
    pub message_type: String,
    pub command: String,
    #[serde(skip_serializing_if = "Option::is_none")]
    pub arguments: Option<Value>,
}

impl RequestMessage {
    pub fn new(seq: i64, command: &str, arguments: Option<Value>) -> Self {
        Self {
            seq,
            message_type: "request".to_string(),
            command: command.to_string(),
            arguments,
        }
    }
}

/// Response message, host to harness
#[derive(Debug, Clone, Serialize, Deserialize)]
pub struct ResponseMessage {
    pub seq: i64,
    pub request_seq: i64,
    pub success: bool,
    pub command: String,
    #[serde(skip_serializing_if = "Option::is_none")]
    pub message: Option<String>,
    #[serde(skip_serializing_if = "Option::is_none")]
    pub body: Option<Value>,
}

/// Event message, host to harness
#[derive(Debug, Clone, Serialize, Deserialize)]
pub struct EventMessage {
    pub seq: i64,
    pub event: String,
    #[serde(skip_serializing_if = "Option::is_none")]
    pub body: Option<Value>,
}

/// Any message the host may send
#[derive(Debug, Clone, Deserialize)]
#[serde(tag = "type", rename_all = "lowercase")]
pub enum HostMessage {
    Response(ResponseMessage),
    Event(EventMessage),
}

// === Request Arguments and Response Bodies ===

#[derive(Debug, Clone, Serialize, Deserialize)]
pub struct ResolveArguments {
    pub name: String,
}

#[derive(Debug, Clone, Serialize, Deserialize)]
pub struct ResolveResponseBody {
    /// Host-side locator for the control, e.g. `#compactPublicKeyZeroKnowledge`
    pub handle: String,
}

#[derive(Debug, Clone, Serialize, Deserialize)]
pub struct ActivateArguments {
    pub handle: String,
    pub run: RunId,
}

#[derive(Debug, Clone, Serialize, Deserialize)]
pub struct ControlInfo {
    pub name: String,
    #[serde(default = "default_true")]
    pub enabled: bool,
}

fn default_true() -> bool {
    true
}

#[derive(Debug, Clone, Serialize, Deserialize)]
pub struct ControlsResponseBody {
    #[serde(default)]
    pub controls: Vec<ControlInfo>,
}

// === Events ===

/// Terminal notification for one run
#[derive(Debug, Clone, Serialize, Deserialize)]
pub struct CompletedEventBody {
    pub run: RunId,
    pub success: bool,
    #[serde(default, skip_serializing_if = "Option::is_none")]
    pub reason: Option<String>,
}

impl CompletedEventBody {
    pub fn into_signal(self) -> CompletionSignal {
        if self.success {
            CompletionSignal::Success
        } else {
            CompletionSignal::failure(
                self.reason
                    .unwrap_or_else(|| "test reported failure without a reason".to_string()),
            )
        }
    }
}

/// Sandbox console output forwarded by the host
#[derive(Debug, Clone, Serialize, Deserialize)]
pub struct LogEventBody {
    #[serde(default)]
    pub level: Option<String>,
    pub message: String,
}

/// Parsed host event
#[derive(Debug, Clone)]
pub enum HostEvent {
    Ready,
    Completed(CompletedEventBody),
    /// `completed` body that failed to parse; `run` is set when it could still be read
    MalformedCompleted { run: Option<RunId>, error: String },
    Log(LogEventBody),
    Unknown(String),
}

impl HostEvent {
    pub fn from_message(msg: &EventMessage) -> Self {
        let body = msg.body.clone().unwrap_or(Value::Null);
        match msg.event.as_str() {
            "ready" => HostEvent::Ready,
            "completed" => match serde_json::from_value::<CompletedEventBody>(body.clone()) {
                Ok(completed) => HostEvent::Completed(completed),
                Err(e) => HostEvent::MalformedCompleted {
                    run: body
                        .get("run")
                        .and_then(|run| serde_json::from_value(run.clone()).ok()),
                    error: e.to_string(),
                },
            },
            "log" => serde_json::from_value(body)
                .map(HostEvent::Log)
                .unwrap_or_else(|_| HostEvent::Unknown("log".to_string())),
            other => HostEvent::Unknown(other.to_string()),
        }
    }
}
