//! Gamepad session: the bind/unbind lifecycle around one target node
//!
//! A [`GamepadSession`] decorates a target (typically a game canvas or an
//! embedded frame) with touch controls and turns touches on those controls into
//! synthetic keyboard input for the target.
//!
//! # Architecture
//!
//! ```text
//! PointerInput ──► InputSurface ──► EventDispatcher ──► target / listener
//!                  (per key)        (Transition)        or frame message
//!
//! bind()   : Overlay<Detached> ──attach──► Overlay<Attached>
//! unbind() : Overlay<Attached> ──detach──► Overlay<Detached> ──► "unbind" callbacks
//! ```
//!
//! Only construction can fail loudly. Once a session exists, `bind`, `unbind`
//! and pointer handling degrade gracefully and log instead of erroring, since the
//! host page's own input loop must keep running.

pub mod callbacks;
pub mod keys;
pub mod overlay;
pub mod render;

pub use callbacks::{CallbackId, CallbackRegistry, LifecycleEvent};
pub use keys::{BoundKeys, Direction, KeyCategory, LogicalKey};
pub use overlay::{Overlay, OverlayState, Placement};
pub use render::{ControlRole, Renderer, StyledRenderer};

use crate::config::GamepadConfig;
use crate::dispatch::EventDispatcher;
use crate::dom::{Document, DocumentHandle, NodeId};
use crate::error::GamepadError;
use crate::input::{PointerEngagement, PointerInput};
use color_eyre::Result;
use overlay::{AttachContext, Attached, Detached};
use std::sync::Arc;
use tracing::{debug, error, info};

enum Binding {
    Unbound(Overlay<Detached>),
    Bound(Overlay<Attached>),
}

pub struct GamepadSession {
    document: DocumentHandle,
    target: NodeId,
    listener: Option<NodeId>,
    keys: BoundKeys,
    config: GamepadConfig,
    renderer: Option<Arc<dyn Renderer>>,
    dispatcher: Arc<EventDispatcher>,
    callbacks: CallbackRegistry,
    binding: Binding,
}

impl GamepadSession {
    /// Creates an unbound session for `target`
    ///
    /// `keys` are normalised (see [`LogicalKey`]). `listener` overrides the node
    /// that receives locally dispatched events; it defaults to the target.
    ///
    /// # Errors
    ///
    /// * [`GamepadError::InvalidTarget`] - target missing, discarded, or unable
    ///   to host children and events
    /// * [`GamepadError::InvalidListener`] - listener cannot receive events
    pub fn new<I, S>(
        document: DocumentHandle,
        target: NodeId,
        keys: I,
        listener: Option<NodeId>,
    ) -> Result<Self, GamepadError>
    where
        I: IntoIterator<Item = S>,
        S: AsRef<str>,
    {
        document.with(|doc| validate(doc, target, listener))?;

        let keys = BoundKeys::new(keys);
        info!(
            "Creating gamepad session for {:?} with {} bound keys",
            target,
            keys.len()
        );

        let dispatcher = Arc::new(EventDispatcher::new(document.clone(), target, listener));
        Ok(Self {
            document,
            target,
            listener,
            keys,
            config: GamepadConfig::default(),
            renderer: None,
            dispatcher,
            callbacks: CallbackRegistry::new(),
            binding: Binding::Unbound(Overlay::create()),
        })
    }

    /// Replaces the default configuration; takes effect on the next bind
    pub fn with_config(mut self, config: GamepadConfig) -> Result<Self, GamepadError> {
        config.validate()?;
        self.config = config;
        Ok(self)
    }

    /// Replaces the default [`StyledRenderer`]; takes effect on the next bind
    pub fn with_renderer(mut self, renderer: Arc<dyn Renderer>) -> Self {
        self.renderer = Some(renderer);
        self
    }

    pub fn target(&self) -> NodeId {
        self.target
    }

    pub fn listener(&self) -> Option<NodeId> {
        self.listener
    }

    pub fn bound_keys(&self) -> &BoundKeys {
        &self.keys
    }

    pub fn config(&self) -> &GamepadConfig {
        &self.config
    }

    pub fn document(&self) -> &DocumentHandle {
        &self.document
    }

    pub fn is_bound(&self) -> bool {
        matches!(self.binding, Binding::Bound(_))
    }

    /// Node rendered for `role`, only while bound
    pub fn overlay_node(&self, role: ControlRole) -> Option<NodeId> {
        match &self.binding {
            Binding::Bound(overlay) => overlay.node(role),
            Binding::Unbound(_) => None,
        }
    }

    /// Saved original placement of the target, only while bound
    pub fn placement(&self) -> Option<&Placement> {
        match &self.binding {
            Binding::Bound(overlay) => overlay.placement(),
            Binding::Unbound(_) => None,
        }
    }

    /// Whether pointer input on `node` drives a key
    pub fn is_interactive(&self, node: NodeId) -> bool {
        match &self.binding {
            Binding::Bound(overlay) => overlay.surface(node).is_some(),
            Binding::Unbound(_) => false,
        }
    }

    pub fn is_pressed(&self, key: &LogicalKey) -> bool {
        match &self.binding {
            Binding::Bound(overlay) => overlay
                .surface_for_key(key)
                .is_some_and(|surface| surface.is_pressed()),
            Binding::Unbound(_) => false,
        }
    }

    /// Registers a lifecycle observer; chainable
    pub fn on<F>(&mut self, event: LifecycleEvent, callback: F) -> &mut Self
    where
        F: FnMut() -> Result<()> + Send + 'static,
    {
        self.callbacks.on(event, callback);
        self
    }

    /// Registers a lifecycle observer and returns a handle for [`off`](Self::off)
    pub fn subscribe<F>(&mut self, event: LifecycleEvent, callback: F) -> CallbackId
    where
        F: FnMut() -> Result<()> + Send + 'static,
    {
        self.callbacks.subscribe(event, callback)
    }

    /// Drops a registration made with [`subscribe`](Self::subscribe)
    pub fn off(&mut self, id: CallbackId) -> bool {
        self.callbacks.off(id)
    }

    /// Registers a lifecycle observer by event name; unknown names are ignored
    /// with a warning
    pub fn on_named<F>(&mut self, name: &str, callback: F) -> &mut Self
    where
        F: FnMut() -> Result<()> + Send + 'static,
    {
        self.callbacks.on_named(name, callback);
        self
    }

    /// Shows the overlay; a no-op while bound. Failures are logged and leave the
    /// session unbound.
    pub fn bind(&mut self) {
        if let Err(e) = self.try_bind() {
            error!("Failed to bind gamepad to {:?}: {}", self.target, e);
        }
    }

    /// Like [`bind`](Self::bind) but reports why binding failed
    pub fn try_bind(&mut self) -> Result<(), GamepadError> {
        let overlay = match std::mem::replace(&mut self.binding, Binding::Unbound(Overlay::create()))
        {
            Binding::Bound(attached) => {
                debug!("Gamepad already bound to {:?}", self.target);
                self.binding = Binding::Bound(attached);
                return Ok(());
            }
            Binding::Unbound(detached) => detached,
        };

        let renderer: Arc<dyn Renderer> = match &self.renderer {
            Some(renderer) => Arc::clone(renderer),
            None => Arc::new(StyledRenderer::new(self.config.theme.clone())),
        };
        let ctx = AttachContext {
            document: &self.document,
            target: self.target,
            keys: &self.keys,
            config: &self.config,
            renderer: &renderer,
            dispatcher: &self.dispatcher,
        };

        let attached = overlay.attach(&ctx)?;
        self.binding = Binding::Bound(attached);
        info!("Gamepad bound to {:?}", self.target);
        Ok(())
    }

    /// Tears the overlay down and restores the target; a no-op while unbound
    ///
    /// Held keys are cancelled without a key-up. The `unbind` callbacks run
    /// after teardown and are cleared afterwards.
    pub fn unbind(&mut self) {
        let overlay = match std::mem::replace(&mut self.binding, Binding::Unbound(Overlay::create()))
        {
            Binding::Unbound(detached) => {
                debug!("Gamepad for {:?} is not bound", self.target);
                self.binding = Binding::Unbound(detached);
                return;
            }
            Binding::Bound(attached) => attached,
        };

        let detached = overlay.detach(&self.document, self.target, &self.config);
        info!("Gamepad unbound from {:?}", self.target);

        let failures = self.callbacks.trigger(LifecycleEvent::Unbind);
        if failures > 0 {
            debug!("{} unbind callbacks failed", failures);
        }
        self.callbacks.clear();
        self.binding = Binding::Unbound(detached);
    }

    /// Routes pointer input that landed on `node`
    ///
    /// Returns whether the host should suppress its default handling. A click
    /// on the close button unbinds the session.
    pub fn handle_pointer(&mut self, node: NodeId, input: PointerInput) -> bool {
        let Binding::Bound(overlay) = &self.binding else {
            return false;
        };

        if overlay.node(ControlRole::CloseButton) == Some(node) {
            if input == PointerInput::Click {
                self.unbind();
            }
            return false;
        }

        overlay
            .surface(node)
            .map(|surface| surface.handle(input))
            .unwrap_or(false)
    }

    /// Drives the control bound to `key` directly, bypassing pointer routing
    pub fn engage(&self, key: &LogicalKey, engagement: PointerEngagement) -> bool {
        match &self.binding {
            Binding::Bound(overlay) => match overlay.surface_for_key(key) {
                Some(surface) => {
                    surface.engage(engagement);
                    true
                }
                None => false,
            },
            Binding::Unbound(_) => false,
        }
    }
}

impl Drop for GamepadSession {
    fn drop(&mut self) {
        if self.is_bound() {
            debug!("Dropping bound gamepad session for {:?}", self.target);
            self.unbind();
        }
    }
}

fn validate(doc: &Document, target: NodeId, listener: Option<NodeId>) -> Result<(), GamepadError> {
    if !doc.is_alive(target) {
        return Err(GamepadError::InvalidTarget(
            target,
            "node does not exist or was discarded".to_string(),
        ));
    }
    if !doc.can_have_children(target) || !doc.accepts_events(target) {
        return Err(GamepadError::InvalidTarget(
            target,
            "node cannot host children, focus and events".to_string(),
        ));
    }

    if let Some(listener) = listener {
        if !doc.accepts_events(listener) {
            return Err(GamepadError::InvalidListener(
                listener,
                "node does not accept events".to_string(),
            ));
        }
    }
    Ok(())
}
