//! Await-completion controller
//!
//! One invocation goes `Idle -> Dispatched -> {Succeeded | Failed | TimedOut}`.
//! Dispatch errors (unknown trigger, failed activation) are returned before
//! the `Dispatched` state and never produce a signal.

use std::sync::Arc;
use std::time::Duration;

use tokio::time::Instant;

use crate::common::config::Timeouts;
use crate::common::Result;

use super::binding::TriggerBinding;
use super::channel::CompletionChannels;
use super::types::CompletionSignal;

/// Runs named tests inside the sandbox and waits for their outcome
pub struct Controller {
    binding: Arc<dyn TriggerBinding>,
    channels: CompletionChannels,
    default_timeout: Duration,
}

impl Controller {
    /// `channels` must be the same registry the binding's sandbox publishes to
    pub fn new(
        binding: Arc<dyn TriggerBinding>,
        channels: CompletionChannels,
        timeouts: &Timeouts,
    ) -> Self {
        Self {
            binding,
            channels,
            default_timeout: timeouts.default_timeout(),
        }
    }

    /// Deadline applied for a requested timeout
    ///
    /// `None`, zero and negative values mean the configured default, never "wait forever".
    pub fn effective_timeout(&self, timeout_ms: Option<i64>) -> Duration {
        match timeout_ms {
            Some(ms) if ms > 0 => Duration::from_millis(ms as u64),
            _ => self.default_timeout,
        }
    }

    pub fn default_timeout(&self) -> Duration {
        self.default_timeout
    }

    /// Trigger `name` and wait for its terminal signal
    ///
    /// A failing or timed-out test is returned as `Ok`. `Err` is reserved for
    /// dispatch errors and means the test never started.
    #[tracing::instrument(skip(self), fields(run = tracing::field::Empty))]
    pub async fn run(&self, name: &str, timeout_ms: Option<i64>) -> Result<CompletionSignal> {
        let timeout = self.effective_timeout(timeout_ms);

        let handle = self.binding.resolve(name).await?;

        // Listen before activating so a fast routine cannot complete unseen
        let mut listener = self.channels.open();
        let run = listener.run_id();
        tracing::Span::current().record("run", tracing::field::display(run));

        self.binding.activate(&handle, run).await?;

        let started = Instant::now();
        tracing::debug!(timeout_ms = timeout.as_millis() as u64, "Dispatched");

        let notified = tokio::select! {
            biased;
            signal = listener.recv() => Some(signal),
            _ = tokio::time::sleep(timeout) => None,
        };

        let signal = match notified {
            Some(signal) => signal,
            None => {
                // A notification racing the deadline in the same tick still wins
                tokio::task::yield_now().await;
                listener.try_recv().unwrap_or(CompletionSignal::TimedOut)
            }
        };
        drop(listener);

        let elapsed_ms = started.elapsed().as_millis() as u64;
        match &signal {
            CompletionSignal::Success => {
                tracing::info!(elapsed_ms, "Test succeeded");
            }
            CompletionSignal::Failure { reason } => {
                tracing::info!(elapsed_ms, %reason, "Test failed");
            }
            CompletionSignal::TimedOut => {
                tracing::warn!(
                    timeout_ms = timeout.as_millis() as u64,
                    "Test timed out, the routine may still be running in the sandbox"
                );
            }
        }

        Ok(signal)
    }
}
