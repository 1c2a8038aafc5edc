//! ---
//! gdm_section: "02-gateway-bus"
//! gdm_subsection: "module"
//! gdm_type: "source"
//! gdm_scope: "code"
//! gdm_description: "Gateway bus abstraction and typed sensor access."
//! gdm_version: "v0.1.0"
//! gdm_owner: "tbd"
//! ---
use std::time::Duration;

use thiserror::Error;

pub type Result<T> = std::result::Result<T, BusError>;

/// Failures surfaced by the gateway bus.
///
/// All variants are recoverable from the control loop's point of view;
/// the loop substitutes fallbacks and keeps running.
#[derive(Debug, Error)]
pub enum BusError {
    /// The operation did not complete within the configured bound.
    #[error("bus operation timed out after {0:?}")]
    Timeout(Duration),
    /// No publisher exists for the topic on this bus.
    #[error("topic {0} is not published on the bus")]
    MissingTopic(String),
    /// The topic carries a value of an unexpected type.
    #[error("topic {topic} does not carry a {expected} value")]
    WrongType {
        topic: String,
        expected: &'static str,
    },
    /// The transport reported a failure of its own.
    #[error("bus backend failure: {0}")]
    Backend(String),
    /// Raised when a transport is not yet implemented.
    #[error("bus transport not yet implemented: {0}")]
    Unimplemented(&'static str),
}
