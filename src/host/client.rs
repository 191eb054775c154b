//! Client for the sandbox host process
//!
//! The host owns the sandbox (for example a headless browser page with the
//! compiled WASM module loaded). A background task reads everything the
//! host writes: responses go back to the request that is waiting for them,
//! `completed` events go to the completion channels, console output goes to
//! tracing.

use std::collections::HashMap;
use std::path::Path;
use std::process::Stdio;
use std::sync::atomic::{AtomicI64, Ordering};
use std::sync::{Arc, Mutex};
use std::time::Duration;

use async_trait::async_trait;
use serde_json::Value;
use tokio::io::{BufReader, BufWriter};
use tokio::process::{Child, ChildStdin, ChildStdout, Command};
use tokio::sync::{oneshot, watch};
use tokio::task::JoinHandle;

use crate::common::config::Timeouts;
use crate::common::{Error, Result};
use crate::dispatch::{CompletionChannels, CompletionSignal, RunId, TriggerBinding, TriggerHandle};

use super::codec;
use super::types::*;

type PendingMap = Arc<Mutex<HashMap<i64, oneshot::Sender<ResponseMessage>>>>;

/// Lifecycle of the host process as seen by the reader task
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub enum HostState {
    Starting,
    Ready,
    Closed,
}

/// Connection to a running sandbox host
pub struct HostClient {
    /// Host subprocess
    child: tokio::sync::Mutex<Child>,
    /// Buffered writer for host stdin
    writer: tokio::sync::Mutex<BufWriter<ChildStdin>>,
    /// Sequence number for requests
    seq: AtomicI64,
    /// Requests waiting for a response
    pending: PendingMap,
    /// Updated by the reader task
    state: watch::Receiver<HostState>,
    reader_task: JoinHandle<()>,
    request_timeout: Duration,
    ready_timeout: Duration,
}

impl HostClient {
    /// Spawn the host and start reading its output
    ///
    /// `channels` receives every `completed` event the host emits.
    pub async fn spawn(
        host_path: &Path,
        args: &[String],
        timeouts: &Timeouts,
        channels: CompletionChannels,
    ) -> Result<Self> {
        let mut cmd = Command::new(host_path);
        cmd.args(args)
            .stdin(Stdio::piped())
            .stdout(Stdio::piped())
            .stderr(Stdio::inherit());

        let mut child = cmd.spawn().map_err(|e| {
            Error::HostStartFailed(format!("Failed to start {}: {}", host_path.display(), e))
        })?;

        let stdin = child
            .stdin
            .take()
            .ok_or_else(|| Error::HostStartFailed("Failed to get host stdin".to_string()))?;
        let stdout = child
            .stdout
            .take()
            .ok_or_else(|| Error::HostStartFailed("Failed to get host stdout".to_string()))?;

        tracing::debug!(host = %host_path.display(), pid = ?child.id(), "Sandbox host spawned");

        let pending: PendingMap = Arc::new(Mutex::new(HashMap::new()));
        let (state_tx, state_rx) = watch::channel(HostState::Starting);

        let reader_task = tokio::spawn(read_loop(
            BufReader::new(stdout),
            pending.clone(),
            channels,
            state_tx,
        ));

        Ok(Self {
            child: tokio::sync::Mutex::new(child),
            writer: tokio::sync::Mutex::new(BufWriter::new(stdin)),
            seq: AtomicI64::new(1),
            pending,
            state: state_rx,
            reader_task,
            request_timeout: timeouts.request(),
            ready_timeout: timeouts.host_ready(),
        })
    }

    /// Current host state
    pub fn state(&self) -> HostState {
        *self.state.borrow()
    }

    /// Wait until the host reports that the sandbox is loaded
    pub async fn wait_ready(&self) -> Result<()> {
        let mut state = self.state.clone();
        let waited = tokio::time::timeout(
            self.ready_timeout,
            state.wait_for(|s| *s != HostState::Starting),
        )
        .await;

        match waited {
            Ok(Ok(s)) if *s == HostState::Ready => Ok(()),
            Ok(_) => Err(Error::HostCrashed),
            Err(_) => Err(Error::HostReadyTimeout(self.ready_timeout.as_millis() as u64)),
        }
    }

    fn next_seq(&self) -> i64 {
        self.seq.fetch_add(1, Ordering::SeqCst)
    }

    fn lock_pending(&self) -> std::sync::MutexGuard<'_, HashMap<i64, oneshot::Sender<ResponseMessage>>> {
        self.pending.lock().unwrap_or_else(|e| e.into_inner())
    }

    async fn write_request(&self, seq: i64, command: &str, arguments: Option<Value>) -> Result<()> {
        let json = serde_json::to_string(&RequestMessage::new(seq, command, arguments))?;
        tracing::trace!("Host request: {}", json);

        let mut writer = self.writer.lock().await;
        codec::write_message(&mut *writer, &json).await
    }

    /// Send a request and wait for the matching response
    async fn send_request(&self, command: &str, arguments: Option<Value>) -> Result<ResponseMessage> {
        let seq = self.next_seq();
        let rx = register_pending(&self.pending, &self.state, seq)?;

        if let Err(e) = self.write_request(seq, command, arguments).await {
            self.lock_pending().remove(&seq);
            return Err(e);
        }

        match tokio::time::timeout(self.request_timeout, rx).await {
            Ok(Ok(response)) => Ok(response),
            Ok(Err(_)) => Err(Error::HostCrashed),
            Err(_) => {
                self.lock_pending().remove(&seq);
                Err(Error::Timeout(self.request_timeout.as_millis() as u64))
            }
        }
    }

    /// Send a request and decode a successful response body
    async fn request<T: serde::de::DeserializeOwned>(
        &self,
        command: &str,
        arguments: Option<Value>,
    ) -> Result<T> {
        let response = self.send_request(command, arguments).await?;

        if !response.success {
            return Err(Error::host_request_failed(
                command,
                response.message.as_deref().unwrap_or("Unknown error"),
            ));
        }

        let body = response.body.unwrap_or(Value::Null);
        serde_json::from_value(body)
            .map_err(|e| Error::HostProtocol(format!("Failed to parse {} response: {}", command, e)))
    }

    /// List the controls the sandbox currently exposes
    pub async fn controls(&self) -> Result<Vec<ControlInfo>> {
        let body: ControlsResponseBody = self.request("controls", None).await?;
        Ok(body.controls)
    }

    /// Ask the host to exit, then make sure it does
    pub async fn shutdown(&self) -> Result<()> {
        if self.state() != HostState::Closed {
            // The host may exit before answering
            let seq = self.next_seq();
            let _ = self.write_request(seq, "shutdown", None).await;
        }

        let mut child = self.child.lock().await;
        let exited = tokio::time::timeout(Duration::from_millis(500), child.wait()).await;
        if exited.is_err() {
            tracing::debug!("Sandbox host did not exit after shutdown, killing it");
            let _ = child.kill().await;
        }

        Ok(())
    }
}

#[async_trait]
impl TriggerBinding for HostClient {
    async fn resolve(&self, name: &str) -> Result<TriggerHandle> {
        let args = ResolveArguments {
            name: name.to_string(),
        };
        let response = self
            .send_request("resolve", Some(serde_json::to_value(&args)?))
            .await?;

        if !response.success {
            tracing::debug!(name, message = ?response.message, "Trigger not found");
            return Err(Error::not_found(name));
        }

        let body: ResolveResponseBody =
            serde_json::from_value(response.body.unwrap_or(Value::Null)).map_err(|e| {
                Error::HostProtocol(format!("Failed to parse resolve response: {}", e))
            })?;

        Ok(TriggerHandle::new(name, body.handle))
    }

    async fn activate(&self, handle: &TriggerHandle, run: RunId) -> Result<()> {
        let args = ActivateArguments {
            handle: handle.locator().to_string(),
            run,
        };
        let response = self
            .send_request("activate", Some(serde_json::to_value(&args)?))
            .await?;

        if !response.success {
            return Err(Error::activation(
                handle.name(),
                response.message.as_deref().unwrap_or("activation rejected"),
            ));
        }

        Ok(())
    }
}

impl Drop for HostClient {
    fn drop(&mut self) {
        // Best-effort since we can't await in drop
        let _ = self.child.get_mut().start_kill();
        self.reader_task.abort();
    }
}

/// Route host output until the host closes its stdout
async fn read_loop(
    mut reader: BufReader<ChildStdout>,
    pending: PendingMap,
    channels: CompletionChannels,
    state: watch::Sender<HostState>,
) {
    loop {
        let json = match codec::read_message(&mut reader).await {
            Ok(json) => json,
            Err(Error::HostCrashed) => {
                tracing::debug!("Sandbox host closed its output");
                break;
            }
            Err(e) => {
                tracing::error!("Failed to read from sandbox host: {}", e);
                break;
            }
        };
        tracing::trace!("Host message: {}", json);

        let message: HostMessage = match serde_json::from_str(&json) {
            Ok(message) => message,
            Err(e) => {
                tracing::warn!("Ignoring malformed host message: {}", e);
                continue;
            }
        };

        match message {
            HostMessage::Response(response) => {
                let waiter = pending
                    .lock()
                    .unwrap_or_else(|e| e.into_inner())
                    .remove(&response.request_seq);
                match waiter {
                    Some(tx) => {
                        let _ = tx.send(response);
                    }
                    None => tracing::debug!(
                        request_seq = response.request_seq,
                        "Dropping response nobody is waiting for"
                    ),
                }
            }
            HostMessage::Event(event) => match HostEvent::from_message(&event) {
                HostEvent::Ready => {
                    tracing::info!("Sandbox host ready");
                    state.send_replace(HostState::Ready);
                }
                HostEvent::Completed(body) => {
                    let run = body.run;
                    if !channels.publish(run, body.into_signal()) {
                        tracing::debug!(%run, "Completion arrived after the run stopped waiting");
                    }
                }
                HostEvent::MalformedCompleted { run: Some(run), error } => {
                    tracing::warn!(%run, %error, "Malformed completion notification");
                    let signal = CompletionSignal::failure(format!(
                        "malformed completion notification: {}",
                        error
                    ));
                    if !channels.publish(run, signal) {
                        tracing::debug!(%run, "Completion arrived after the run stopped waiting");
                    }
                }
                HostEvent::MalformedCompleted { run: None, error } => {
                    tracing::warn!(%error, "Dropping completion notification without a readable run id");
                }
                HostEvent::Log(log) => forward_log(&log),
                HostEvent::Unknown(name) => {
                    tracing::debug!(event = %name, "Ignoring unknown host event");
                }
            },
        }
    }

    state.send_replace(HostState::Closed);
    pending.lock().unwrap_or_else(|e| e.into_inner()).clear();
    channels.close_all();
}

/// Register a response waiter for `seq`
///
/// The reader marks the host closed before clearing `pending`, so checking
/// the state after inserting catches an entry that missed that clear.
fn register_pending(
    pending: &PendingMap,
    state: &watch::Receiver<HostState>,
    seq: i64,
) -> Result<oneshot::Receiver<ResponseMessage>> {
    let (tx, rx) = oneshot::channel();
    pending.lock().unwrap_or_else(|e| e.into_inner()).insert(seq, tx);

    if *state.borrow() == HostState::Closed {
        pending.lock().unwrap_or_else(|e| e.into_inner()).remove(&seq);
        return Err(Error::HostCrashed);
    }
    Ok(rx)
}

fn forward_log(log: &LogEventBody) {
    let message = log.message.as_str();
    match log.level.as_deref() {
        Some("error") => tracing::error!(target: "sandbox_dispatch::sandbox", "{}", message),
        Some("warn") | Some("warning") => {
            tracing::warn!(target: "sandbox_dispatch::sandbox", "{}", message)
        }
        Some("debug") | Some("trace") => {
            tracing::debug!(target: "sandbox_dispatch::sandbox", "{}", message)
        }
        _ => tracing::info!(target: "sandbox_dispatch::sandbox", "{}", message),
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    fn pending_map() -> PendingMap {
        Arc::new(Mutex::new(HashMap::new()))
    }

    #[test]
    fn test_register_after_close_reports_crash() {
        // Reader already marked the host closed and cleared the map
        let pending = pending_map();
        let (_tx, state) = watch::channel(HostState::Closed);

        let result = register_pending(&pending, &state, 4);

        assert!(matches!(result, Err(Error::HostCrashed)));
        assert!(pending.lock().unwrap().is_empty());
    }

    #[tokio::test]
    async fn test_register_before_close_sees_dropped_sender() {
        let pending = pending_map();
        let (tx, state) = watch::channel(HostState::Ready);

        let rx = register_pending(&pending, &state, 1).unwrap();
        assert_eq!(pending.lock().unwrap().len(), 1);

        // Same order the reader uses on EOF
        tx.send_replace(HostState::Closed);
        pending.lock().unwrap().clear();

        assert!(rx.await.is_err());
    }
}
