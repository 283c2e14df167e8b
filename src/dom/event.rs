//! Event payloads carried by the document model

use chrono::{DateTime, Local};
use serde::{Deserialize, Serialize};
use std::fmt;

/// Keyboard event type as named by the page (`keydown` / `keyup`)
#[derive(Clone, Copy, Debug, PartialEq, Eq, Hash, Serialize, Deserialize)]
#[serde(rename_all = "lowercase")]
pub enum KeyEventType {
    KeyDown,
    KeyUp,
}

impl KeyEventType {
    pub fn as_str(&self) -> &'static str {
        match self {
            KeyEventType::KeyDown => "keydown",
            KeyEventType::KeyUp => "keyup",
        }
    }
}

impl fmt::Display for KeyEventType {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        f.write_str(self.as_str())
    }
}

/// Synthetic keyboard event delivered through the document's propagation path
#[derive(Clone, Debug)]
pub struct KeyboardEvent {
    pub event_type: KeyEventType,
    /// Dispatched key name, e.g. `ArrowUp`, `A` or `" "`
    pub key: String,
    /// Whether ancestors of the dispatch node see the event too
    pub bubbles: bool,
    pub time_stamp: DateTime<Local>,
}

impl KeyboardEvent {
    pub fn new(event_type: KeyEventType, key: impl Into<String>) -> Self {
        Self {
            event_type,
            key: key.into(),
            bubbles: true,
            time_stamp: Local::now(),
        }
    }
}

/// A message received by an embedded frame's content window
#[derive(Clone, Debug, PartialEq)]
pub struct PostedMessage {
    /// Origin the sender addressed the message to
    pub target_origin: String,
    pub data: serde_json::Value,
}
