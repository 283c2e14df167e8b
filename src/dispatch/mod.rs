//! Synthetic key event delivery
//!
//! The dispatcher turns a key [`Transition`] into a `keydown`/`keyup` event and
//! routes it:
//!
//! ```text
//!                    ┌─ target is an embedded frame ─► post FrameMessage to frame origin
//! Transition ──► ────┤
//!                    └─ otherwise ──► focus listener ──► dispatch KeyboardEvent (bubbles)
//! ```
//!
//! Delivery failures never propagate past [`TransitionSink::emit`]: they are
//! logged and the event counts as delivered but ineffective.

pub mod message;

pub use message::{FrameMessage, KeyboardPayload};

use crate::dom::{
    resolve_origin, Document, DocumentHandle, DomError, KeyEventType, KeyboardEvent, NodeId,
};
use crate::gamepad::keys::LogicalKey;
use crate::input::{Transition, TransitionSink};
use tracing::{debug, error, warn};

#[derive(Debug, thiserror::Error)]
pub enum DispatchError {
    #[error("Cannot resolve frame origin: {0}")]
    FrameOrigin(#[source] DomError),

    #[error("Cannot reach frame content window: {0}")]
    FrameUnavailable(#[source] DomError),

    #[error("Cannot encode frame message: {0}")]
    Encode(#[from] serde_json::Error),

    #[error("Dispatch to {node:?} failed: {source}")]
    Dispatch {
        node: NodeId,
        #[source]
        source: DomError,
    },
}

/// Where an event ended up
#[derive(Clone, Debug, PartialEq, Eq)]
pub enum Delivery {
    Local { node: NodeId, listeners: usize },
    Posted { origin: String, accepted: bool },
}

pub struct EventDispatcher {
    document: DocumentHandle,
    target: NodeId,
    listener: Option<NodeId>,
}

impl EventDispatcher {
    pub fn new(document: DocumentHandle, target: NodeId, listener: Option<NodeId>) -> Self {
        Self {
            document,
            target,
            listener,
        }
    }

    /// Node that receives local dispatches
    pub fn dispatch_node(&self) -> NodeId {
        self.listener.unwrap_or(self.target)
    }

    pub fn dispatch(
        &self,
        transition: Transition,
        key: &LogicalKey,
    ) -> Result<Delivery, DispatchError> {
        let event_type = match transition {
            Transition::Press => KeyEventType::KeyDown,
            Transition::Release => KeyEventType::KeyUp,
        };
        let event = KeyboardEvent::new(event_type, key.dispatch_name());

        self.document.with(|doc| match doc.frame_src(self.target) {
            Some(src) => self.post_to_frame(doc, &src, &event),
            None => self.dispatch_locally(doc, &event),
        })
    }

    fn post_to_frame(
        &self,
        doc: &mut Document,
        src: &str,
        event: &KeyboardEvent,
    ) -> Result<Delivery, DispatchError> {
        let origin = resolve_origin(doc.location(), src).map_err(DispatchError::FrameOrigin)?;
        let data = FrameMessage::keyboard(event.event_type, event.key.clone()).to_value()?;

        let accepted = doc
            .post_message(self.target, data, &origin)
            .map_err(DispatchError::FrameUnavailable)?;
        debug!(
            "Posted {} {:?} to frame at {} (accepted: {})",
            event.event_type, event.key, origin, accepted
        );
        Ok(Delivery::Posted { origin, accepted })
    }

    fn dispatch_locally(
        &self,
        doc: &mut Document,
        event: &KeyboardEvent,
    ) -> Result<Delivery, DispatchError> {
        let node = self.dispatch_node();
        if let Err(e) = doc.focus(node) {
            warn!("Unable to focus {:?} before dispatch: {}", node, e);
        }

        let listeners = doc
            .dispatch_key_event(node, event)
            .map_err(|source| DispatchError::Dispatch { node, source })?;
        debug!(
            "Dispatched {} {:?} on {:?} ({} listeners)",
            event.event_type, event.key, node, listeners
        );
        Ok(Delivery::Local { node, listeners })
    }
}

impl TransitionSink for EventDispatcher {
    fn emit(&self, transition: Transition, key: &LogicalKey) {
        match self.dispatch(transition, key) {
            Ok(_) => {}
            Err(e @ DispatchError::FrameUnavailable(_)) => {
                warn!("Key {} not delivered: {}", key, e);
            }
            Err(e) => {
                error!("Key {} not delivered: {}", key, e);
            }
        }
    }
}
