//! One-shot completion channels keyed by invocation
//!
//! The sandbox side holds a [`CompletionChannels`] clone and calls
//! [`publish`](CompletionChannels::publish); the controller holds the
//! [`Listener`]. Dropping a listener deregisters it, which is how every exit
//! path (success, failure, timeout, activation error) releases the channel.

use std::collections::HashMap;
use std::sync::atomic::{AtomicU64, Ordering};
use std::sync::{Arc, Mutex, MutexGuard};

use tokio::sync::oneshot;

use super::types::{CompletionSignal, RunId};

/// Reason reported when the producer side disappears without publishing
pub const CHANNEL_CLOSED_REASON: &str = "sandbox closed the notification channel before reporting completion";

#[derive(Default)]
struct Registry {
    senders: HashMap<RunId, oneshot::Sender<CompletionSignal>>,
}

/// Registry of in-flight completion channels
#[derive(Clone, Default)]
pub struct CompletionChannels {
    registry: Arc<Mutex<Registry>>,
    next_run: Arc<AtomicU64>,
}

impl CompletionChannels {
    pub fn new() -> Self {
        Self::default()
    }

    fn lock(&self) -> MutexGuard<'_, Registry> {
        self.registry.lock().unwrap_or_else(|e| e.into_inner())
    }

    /// Allocate a run id and register a listener for it
    pub fn open(&self) -> Listener {
        let run = RunId(self.next_run.fetch_add(1, Ordering::SeqCst) + 1);
        let (tx, rx) = oneshot::channel();
        self.lock().senders.insert(run, tx);
        tracing::trace!(%run, "Completion channel opened");

        Listener {
            run,
            rx,
            channels: self.clone(),
        }
    }

    /// Deliver the terminal signal for `run`
    ///
    /// Returns false if nobody is listening: the run already timed out, was
    /// already completed, or never existed.
    pub fn publish(&self, run: RunId, signal: CompletionSignal) -> bool {
        let sender = self.lock().senders.remove(&run);
        match sender {
            Some(tx) => {
                let delivered = tx.send(signal).is_ok();
                tracing::trace!(%run, delivered, "Completion published");
                delivered
            }
            None => {
                tracing::debug!(%run, ?signal, "Ignoring notification with no listener");
                false
            }
        }
    }

    /// Number of listeners currently registered
    pub fn pending(&self) -> usize {
        self.lock().senders.len()
    }

    /// Drop every registered sender; waiting listeners resolve to a failure
    pub fn close_all(&self) {
        let dropped = std::mem::take(&mut self.lock().senders);
        if !dropped.is_empty() {
            tracing::warn!(count = dropped.len(), "Closing in-flight completion channels");
        }
    }

    fn release(&self, run: RunId) {
        if self.lock().senders.remove(&run).is_some() {
            tracing::trace!(%run, "Completion channel released");
        }
    }
}

/// Consumer side of one completion channel
pub struct Listener {
    run: RunId,
    rx: oneshot::Receiver<CompletionSignal>,
    channels: CompletionChannels,
}

impl Listener {
    pub fn run_id(&self) -> RunId {
        self.run
    }

    /// Wait for the terminal signal
    pub async fn recv(&mut self) -> CompletionSignal {
        match (&mut self.rx).await {
            Ok(signal) => signal,
            Err(_) => CompletionSignal::failure(CHANNEL_CLOSED_REASON),
        }
    }

    /// Take the signal if it has already been published
    pub fn try_recv(&mut self) -> Option<CompletionSignal> {
        match self.rx.try_recv() {
            Ok(signal) => Some(signal),
            Err(oneshot::error::TryRecvError::Empty) => None,
            Err(oneshot::error::TryRecvError::Closed) => {
                Some(CompletionSignal::failure(CHANNEL_CLOSED_REASON))
            }
        }
    }
}

impl Drop for Listener {
    fn drop(&mut self) {
        self.channels.release(self.run);
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    #[tokio::test]
    async fn test_publish_reaches_listener() {
        let channels = CompletionChannels::new();
        let mut listener = channels.open();

        assert!(channels.publish(listener.run_id(), CompletionSignal::Success));
        assert_eq!(listener.recv().await, CompletionSignal::Success);
        assert_eq!(channels.pending(), 0);
    }

    #[test]
    fn test_run_ids_are_unique() {
        let channels = CompletionChannels::new();
        let a = channels.open();
        let b = channels.open();
        assert_ne!(a.run_id(), b.run_id());
        assert_eq!(channels.pending(), 2);
    }

    #[test]
    fn test_drop_releases_listener() {
        let channels = CompletionChannels::new();
        let listener = channels.open();
        let run = listener.run_id();
        drop(listener);

        assert_eq!(channels.pending(), 0);
        assert!(!channels.publish(run, CompletionSignal::Success));
    }

    #[tokio::test]
    async fn test_second_publish_is_ignored() {
        let channels = CompletionChannels::new();
        let mut listener = channels.open();
        let run = listener.run_id();

        assert!(channels.publish(run, CompletionSignal::failure("first")));
        assert!(!channels.publish(run, CompletionSignal::Success));
        assert_eq!(listener.recv().await, CompletionSignal::failure("first"));
    }

    #[tokio::test]
    async fn test_close_all_fails_waiters() {
        let channels = CompletionChannels::new();
        let mut listener = channels.open();
        channels.close_all();

        assert_eq!(
            listener.recv().await,
            CompletionSignal::failure(CHANNEL_CLOSED_REASON)
        );
    }

    #[test]
    fn test_try_recv_empty_then_ready() {
        let channels = CompletionChannels::new();
        let mut listener = channels.open();
        assert_eq!(listener.try_recv(), None);

        channels.publish(listener.run_id(), CompletionSignal::Success);
        assert_eq!(listener.try_recv(), Some(CompletionSignal::Success));
    }
}
