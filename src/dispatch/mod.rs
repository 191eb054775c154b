//! Dispatch-and-await core
//!
//! [`Controller::run`] resolves a test name through a [`TriggerBinding`],
//! opens a completion channel, activates the trigger and waits for the
//! sandbox's terminal notification or the deadline.

pub mod binding;
pub mod channel;
pub mod controller;
pub mod types;

pub use binding::TriggerBinding;
pub use channel::{CompletionChannels, Listener};
pub use controller::Controller;
pub use types::{CompletionSignal, RunId, TriggerHandle};
