//! Wire contract for key events crossing into an embedded frame
//!
//! A cooperating receiver inside the frame expects exactly:
//!
//! ```json
//! { "type": "keyboardEvent", "payload": { "eventType": "keydown", "key": "ArrowUp" } }
//! ```

use crate::dom::KeyEventType;
use serde::{Deserialize, Serialize};

#[derive(Clone, Debug, PartialEq, Eq, Serialize, Deserialize)]
pub struct KeyboardPayload {
    #[serde(rename = "eventType")]
    pub event_type: KeyEventType,
    pub key: String,
}

/// Messages sent to a frame's content window
#[derive(Clone, Debug, PartialEq, Eq, Serialize, Deserialize)]
#[serde(tag = "type", content = "payload")]
pub enum FrameMessage {
    #[serde(rename = "keyboardEvent")]
    KeyboardEvent(KeyboardPayload),
}

impl FrameMessage {
    pub fn keyboard(event_type: KeyEventType, key: impl Into<String>) -> Self {
        FrameMessage::KeyboardEvent(KeyboardPayload {
            event_type,
            key: key.into(),
        })
    }

    pub fn to_value(&self) -> serde_json::Result<serde_json::Value> {
        serde_json::to_value(self)
    }
}
