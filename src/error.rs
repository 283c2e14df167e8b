//! Crate-level error type.
//!
//! Only construction and bind-time failures surface as [`GamepadError`]. Everything
//! that happens while a session is bound (focus, dispatch, frame messaging) is
//! recovered locally and logged, so the host page keeps running.

use crate::config::ConfigError;
use crate::dom::{DomError, NodeId};

/// Errors surfaced by [`GamepadSession`](crate::gamepad::GamepadSession)
#[derive(Debug, thiserror::Error)]
pub enum GamepadError {
    /// The target node is missing, discarded, or cannot host children and events
    #[error("Invalid target node {0:?}: {1}")]
    InvalidTarget(NodeId, String),

    /// The listening override cannot receive dispatched events
    #[error("Invalid listening node {0:?}: {1}")]
    InvalidListener(NodeId, String),

    /// Another live session already relocated this target
    #[error("Target node {0:?} is already bound by another session")]
    TargetInUse(NodeId),

    /// The supplied configuration is unusable
    #[error("Configuration error: {0}")]
    Config(#[from] ConfigError),

    /// Building the overlay tree failed
    #[error("Document error: {0}")]
    Dom(#[from] DomError),
}
