//! Mock sandbox host for integration testing
//!
//! Speaks the host protocol on stdio and plays back a JSON script instead of
//! driving a real browser page. The script path is the first argument:
//!
//! ```json
//! {
//!   "ready_delay_ms": 0,
//!   "controls": {
//!     "quickTest": { "delay_ms": 50 },
//!     "brokenTest": { "delay_ms": 20, "outcome": "failure", "reason": "proof verification failed" },
//!     "slowTest": { "outcome": "silent" },
//!     "disabledTest": { "enabled": false }
//!   }
//! }
//! ```

use serde::Deserialize;
use serde_json::{json, Value};
use std::collections::BTreeMap;
use std::io::{BufRead, BufReader, Read, Write};
use std::sync::atomic::{AtomicI64, Ordering};
use std::sync::{Arc, Mutex};
use std::time::Duration;

#[derive(Deserialize, Default)]
struct Script {
    #[serde(default)]
    ready_delay_ms: u64,
    /// Never send `ready`, to exercise the ready timeout
    #[serde(default)]
    skip_ready: bool,
    #[serde(default)]
    controls: BTreeMap<String, ControlScript>,
}

#[derive(Deserialize, Clone)]
struct ControlScript {
    #[serde(default)]
    delay_ms: u64,
    #[serde(default)]
    outcome: Outcome,
    reason: Option<String>,
    #[serde(default = "default_true")]
    enabled: bool,
    #[serde(default)]
    detached: bool,
    /// Report completion a second time, with the opposite result
    #[serde(default)]
    duplicate: bool,
    /// Report completion before answering the `activate` request
    #[serde(default)]
    early: bool,
}

fn default_true() -> bool {
    true
}

#[derive(Deserialize, Clone, Copy, Default, PartialEq)]
#[serde(rename_all = "snake_case")]
enum Outcome {
    #[default]
    Success,
    Failure,
    /// Never report anything
    Silent,
    /// Exit the whole host after the delay
    Crash,
    /// Report completion with a body that does not parse
    Malformed,
}

/// Writes framed messages; shared with the timer threads
#[derive(Clone)]
struct Outbox {
    out: Arc<Mutex<std::io::Stdout>>,
    seq: Arc<AtomicI64>,
}

impl Outbox {
    fn send(&self, mut message: Value) {
        message["seq"] = json!(self.seq.fetch_add(1, Ordering::SeqCst));
        let body = serde_json::to_string(&message).unwrap();
        let header = format!("Content-Length: {}\r\n\r\n", body.len());

        let out = self.out.lock().unwrap();
        let mut writer = out.lock();
        writer.write_all(header.as_bytes()).ok();
        writer.write_all(body.as_bytes()).ok();
        writer.flush().ok();
    }

    fn event(&self, event: &str, body: Value) {
        self.send(json!({"type": "event", "event": event, "body": body}));
    }

    fn respond(&self, request: &Value, success: bool, message: Option<&str>, body: Value) {
        let mut response = json!({
            "type": "response",
            "request_seq": request["seq"],
            "command": request["command"],
            "success": success,
            "body": body,
        });
        if let Some(message) = message {
            response["message"] = json!(message);
        }
        self.send(response);
    }
}

fn main() {
    let script: Script = match std::env::args().nth(1) {
        Some(path) => {
            let content = std::fs::read_to_string(&path).expect("Failed to read mock host script");
            serde_json::from_str(&content).expect("Invalid mock host script")
        }
        None => Script::default(),
    };

    let outbox = Outbox {
        out: Arc::new(Mutex::new(std::io::stdout())),
        seq: Arc::new(AtomicI64::new(1)),
    };

    if !script.skip_ready {
        let outbox = outbox.clone();
        let delay = Duration::from_millis(script.ready_delay_ms);
        std::thread::spawn(move || {
            std::thread::sleep(delay);
            outbox.event("ready", json!({}));
        });
    }

    let stdin = std::io::stdin();
    let mut reader = BufReader::new(stdin.lock());

    loop {
        let mut header_line = String::new();
        if reader.read_line(&mut header_line).unwrap_or(0) == 0 {
            break; // EOF
        }

        if !header_line.starts_with("Content-Length:") {
            continue;
        }

        let content_length: usize = header_line
            .trim_start_matches("Content-Length:")
            .trim()
            .parse()
            .unwrap_or(0);

        let mut empty_line = String::new();
        reader.read_line(&mut empty_line).ok();

        let mut body = vec![0u8; content_length];
        if reader.read_exact(&mut body).is_err() {
            break;
        }

        let request: Value = match serde_json::from_slice(&body) {
            Ok(v) => v,
            Err(_) => continue,
        };

        if !handle_request(&script, &outbox, &request) {
            break;
        }
    }
}

/// Returns false when the host should exit
fn handle_request(script: &Script, outbox: &Outbox, request: &Value) -> bool {
    let command = request["command"].as_str().unwrap_or("");
    let args = &request["arguments"];

    match command {
        "resolve" => {
            let name = args["name"].as_str().unwrap_or("");
            if script.controls.contains_key(name) {
                outbox.respond(request, true, None, json!({"handle": format!("#{}", name)}));
            } else {
                let message = format!("no element matches #{}", name);
                outbox.respond(request, false, Some(&message), Value::Null);
            }
        }
        "activate" => {
            let handle = args["handle"].as_str().unwrap_or("");
            let name = handle.trim_start_matches('#');
            let run = args["run"].clone();

            let Some(control) = script.controls.get(name).cloned() else {
                outbox.respond(request, false, Some("control is detached from the document"), Value::Null);
                return true;
            };

            if !control.enabled {
                outbox.respond(request, false, Some("control is disabled"), Value::Null);
                return true;
            }
            if control.detached {
                outbox.respond(request, false, Some("control is detached from the document"), Value::Null);
                return true;
            }

            if control.early {
                complete(outbox.clone(), control, run);
                outbox.respond(request, true, None, json!({}));
                return true;
            }

            outbox.respond(request, true, None, json!({}));
            outbox.event("log", json!({"level": "info", "message": format!("{} started", name)}));

            let outbox = outbox.clone();
            std::thread::spawn(move || complete(outbox, control, run));
        }
        "controls" => {
            let controls: Vec<Value> = script
                .controls
                .iter()
                .map(|(name, c)| json!({"name": name, "enabled": c.enabled && !c.detached}))
                .collect();
            outbox.respond(request, true, None, json!({"controls": controls}));
        }
        "shutdown" => return false,
        _ => {
            let message = format!("unknown command '{}'", command);
            outbox.respond(request, false, Some(&message), Value::Null);
        }
    }
    true
}

fn complete(outbox: Outbox, control: ControlScript, run: Value) {
    std::thread::sleep(Duration::from_millis(control.delay_ms));

    let reason = control
        .reason
        .clone()
        .unwrap_or_else(|| "test failed".to_string());

    match control.outcome {
        Outcome::Success => {
            outbox.event("completed", json!({"run": run, "success": true}));
            if control.duplicate {
                outbox.event("completed", json!({"run": run, "success": false, "reason": reason}));
            }
        }
        Outcome::Failure => {
            outbox.event("completed", json!({"run": run, "success": false, "reason": reason}));
            if control.duplicate {
                outbox.event("completed", json!({"run": run, "success": true}));
            }
        }
        Outcome::Silent => {}
        Outcome::Malformed => {
            outbox.event("completed", json!({"run": run, "success": "no"}));
        }
        Outcome::Crash => {
            outbox.event("log", json!({"level": "error", "message": "sandbox aborted"}));
            std::process::exit(3);
        }
    }
}
