//! Bridge to the out-of-process sandbox host
//!
//! The host speaks Content-Length framed JSON over stdio and implements the
//! trigger side of the dispatch protocol for a real sandbox.

pub mod client;
pub mod codec;
pub mod types;

pub use client::{HostClient, HostState};
pub use types::ControlInfo;
