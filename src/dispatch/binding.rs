//! Trigger binding: test name to activatable control

use async_trait::async_trait;

use crate::common::Result;

use super::types::{RunId, TriggerHandle};

/// Maps test names to the controls that start them inside the sandbox
///
/// Implementations must deliver exactly one terminal notification for every
/// successful [`activate`](TriggerBinding::activate), tagged with the `run`
/// they were given.
#[async_trait]
pub trait TriggerBinding: Send + Sync {
    /// Look up the control for `name`
    ///
    /// Fails with [`Error::NotFound`](crate::Error::NotFound) if the sandbox
    /// has no such control. Has no side effects.
    async fn resolve(&self, name: &str) -> Result<TriggerHandle>;

    /// Activate the control, starting the routine asynchronously
    ///
    /// Returns as soon as the sandbox accepted the activation. Fails with
    /// [`Error::Activation`](crate::Error::Activation) if the control is
    /// disabled or detached.
    async fn activate(&self, handle: &TriggerHandle, run: RunId) -> Result<()>;
}
