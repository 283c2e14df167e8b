//! Overlay tree with statum typestate
//!
//! # State Machine
//!
//! ```text
//! Detached ──attach()──► Attached ──detach()──► Detached
//!    ▲                                             │
//!    └──────────── (reused for the next bind) ─────┘
//! ```
//!
//! `attach` either completes or rolls back everything it touched, so a failed
//! bind leaves the page exactly as it found it.

use crate::config::{GamepadConfig, ScrollLockConfig};
use crate::dispatch::EventDispatcher;
use crate::dom::{Document, DocumentHandle, DomError, NodeId};
use crate::error::GamepadError;
use crate::gamepad::keys::{BoundKeys, Direction, LogicalKey};
use crate::gamepad::render::{ControlRole, Renderer};
use crate::input::{Feedback, InputSurface, TransitionSink};
use statum::{machine, state};
use std::collections::HashMap;
use std::sync::Arc;
use tracing::{debug, error, info, warn};

/// States of the overlay lifecycle using statum
#[state]
#[derive(Debug, Clone)]
pub enum OverlayState {
    Detached, // Nothing inserted into the page
    Attached, // Overlay visible, target relocated, surfaces live
}

/// Where the target lived before it was moved into the overlay
#[derive(Clone, Debug, PartialEq, Eq)]
pub struct Placement {
    pub parent: Option<NodeId>,
    pub next_sibling: Option<NodeId>,
    /// Inline `display` value, `None` if unset
    pub display: Option<String>,
}

/// Everything `attach` needs from the owning session
pub(crate) struct AttachContext<'a> {
    pub document: &'a DocumentHandle,
    pub target: NodeId,
    pub keys: &'a BoundKeys,
    pub config: &'a GamepadConfig,
    pub renderer: &'a Arc<dyn Renderer>,
    pub dispatcher: &'a Arc<EventDispatcher>,
}

#[machine]
pub struct Overlay<S: OverlayState> {
    nodes: HashMap<ControlRole, NodeId>,
    surfaces: HashMap<NodeId, InputSurface>,
    placement: Option<Placement>,
    scroll_locked: bool,
    claimed: Option<NodeId>,
}

impl<S: OverlayState> Overlay<S> {
    pub fn node(&self, role: ControlRole) -> Option<NodeId> {
        self.nodes.get(&role).copied()
    }

    pub fn placement(&self) -> Option<&Placement> {
        self.placement.as_ref()
    }

    pub fn surface(&self, node: NodeId) -> Option<&InputSurface> {
        self.surfaces.get(&node)
    }

    pub fn surface_for_key(&self, key: &LogicalKey) -> Option<&InputSurface> {
        self.surfaces.values().find(|surface| surface.key() == key)
    }

    /// Undoes whatever part of the overlay exists
    ///
    /// Surfaces are stopped before the document is locked: stopping a held key
    /// reverts its visual feedback, which needs the document itself. Every node
    /// the overlay rendered is discarded once the target is back in place.
    fn release(&mut self, document: &DocumentHandle, target: NodeId, config: &GamepadConfig) {
        for surface in self.surfaces.values() {
            surface.stop();
        }
        self.surfaces.clear();

        let nodes = std::mem::take(&mut self.nodes);
        let placement = self.placement.take();
        let scroll_locked = std::mem::replace(&mut self.scroll_locked, false);
        let claimed = self.claimed.take();

        document.with(|doc| {
            if let Some(placement) = &placement {
                restore_target(doc, target, placement);
            }

            if scroll_locked {
                release_scroll_lock(doc, &config.scroll_lock);
            }

            for (role, node) in &nodes {
                discard_logged(doc, *role, *node);
            }
            debug!("Discarded {} overlay nodes", nodes.len());

            if let Some(node) = claimed {
                doc.release_claim(node);
            }
        });
    }
}

impl Overlay<Detached> {
    pub fn create() -> Self {
        Self::new(HashMap::new(), HashMap::new(), None, false, None)
    }

    /// Builds the overlay, relocates the target and wires one surface per control
    pub(crate) fn attach(
        mut self,
        ctx: &AttachContext<'_>,
    ) -> Result<Overlay<Attached>, GamepadError> {
        info!("Attaching overlay for target {:?}", ctx.target);

        let built = ctx.document.with(|doc| self.build(doc, ctx));
        match built {
            Ok(()) => {
                info!(
                    "Overlay attached with {} interactive controls",
                    self.surfaces.len()
                );
                Ok(self.transition())
            }
            Err(e) => {
                error!("Failed to attach overlay, rolling back: {}", e);
                self.release(ctx.document, ctx.target, ctx.config);
                Err(e)
            }
        }
    }

    fn build(&mut self, doc: &mut Document, ctx: &AttachContext<'_>) -> Result<(), GamepadError> {
        if !doc.claim(ctx.target) {
            return Err(GamepadError::TargetInUse(ctx.target));
        }
        self.claimed = Some(ctx.target);

        let overlay = self.render(doc, ctx, ControlRole::Overlay, "")?;
        let body = doc.body();
        doc.append_child(body, overlay)?;

        acquire_scroll_lock(doc, &ctx.config.scroll_lock)?;
        self.scroll_locked = true;

        let wrapper = self.render(doc, ctx, ControlRole::TargetWrapper, "")?;
        doc.append_child(overlay, wrapper)?;

        let placement = Placement {
            parent: doc.parent(ctx.target),
            next_sibling: doc.next_sibling(ctx.target),
            display: doc.style_property(ctx.target, "display"),
        };
        doc.append_child(wrapper, ctx.target)?;
        debug!("Moved target {:?} out of {:?}", ctx.target, placement);
        self.placement = Some(placement);

        let close = self.render(doc, ctx, ControlRole::CloseButton, "X")?;
        doc.append_child(overlay, close)?;

        if ctx.keys.has_any_direction() {
            let dpad = self.render(doc, ctx, ControlRole::DpadContainer, "")?;
            for direction in Direction::ALL {
                if ctx.keys.has_direction(direction) {
                    let button = self.render(
                        doc,
                        ctx,
                        ControlRole::DpadButton(direction),
                        direction.symbol(),
                    )?;
                    doc.append_child(dpad, button)?;
                    self.add_surface(ctx, button, direction.key());
                } else {
                    let placeholder =
                        self.render(doc, ctx, ControlRole::DpadPlaceholder(direction), "")?;
                    doc.append_child(dpad, placeholder)?;
                }
            }
            doc.append_child(overlay, dpad)?;
        }

        if ctx.keys.has_space() {
            let space = self.render(doc, ctx, ControlRole::SpaceButton, "SPACE")?;
            self.add_surface(ctx, space, LogicalKey::new(LogicalKey::SPACE));
            doc.append_child(overlay, space)?;
        }

        let letters = ctx.keys.letters();
        if !letters.is_empty() {
            let actions = self.render(doc, ctx, ControlRole::ActionContainer, "")?;
            for letter in letters {
                let label = letter.to_string();
                let button = self.render(doc, ctx, ControlRole::ActionButton(letter), &label)?;
                self.add_surface(ctx, button, LogicalKey::new(&label));
                doc.append_child(actions, button)?;
            }
            doc.append_child(overlay, actions)?;
        }

        for key in ctx.keys.unrecognized() {
            warn!("Key {} has no on-screen control and will never fire", key);
        }
        Ok(())
    }

    fn render(
        &mut self,
        doc: &mut Document,
        ctx: &AttachContext<'_>,
        role: ControlRole,
        content: &str,
    ) -> Result<NodeId, DomError> {
        let node = ctx.renderer.render(doc, role, content)?;
        self.nodes.insert(role, node);
        Ok(node)
    }

    fn add_surface(&mut self, ctx: &AttachContext<'_>, node: NodeId, key: LogicalKey) {
        let document = ctx.document.clone();
        let renderer = Arc::clone(ctx.renderer);
        let feedback: Feedback = Arc::new(move |pressed| {
            document.with(|doc| {
                if let Err(e) = renderer.set_pressed(doc, node, pressed) {
                    warn!("Unable to update pressed state of {:?}: {}", node, e);
                }
            })
        });

        let sink: Arc<dyn TransitionSink> = ctx.dispatcher.clone();
        let surface =
            InputSurface::new(key, sink, ctx.config.repeat_interval()).with_feedback(feedback);
        self.surfaces.insert(node, surface);
    }
}

impl Overlay<Attached> {
    /// Stops every surface, removes the overlay and puts the target back
    pub fn detach(
        mut self,
        document: &DocumentHandle,
        target: NodeId,
        config: &GamepadConfig,
    ) -> Overlay<Detached> {
        info!("Detaching overlay from target {:?}", target);
        self.release(document, target, config);
        self.transition()
    }
}

fn discard_logged(doc: &mut Document, role: ControlRole, node: NodeId) {
    // a page script may already have thrown the node away
    if !doc.is_alive(node) {
        return;
    }
    if let Err(e) = doc.discard(node) {
        warn!("Unable to discard overlay {:?} node {:?}: {}", role, node, e);
    }
}

fn restore_target(doc: &mut Document, target: NodeId, placement: &Placement) {
    let restored = match placement.parent.filter(|parent| doc.is_alive(*parent)) {
        Some(parent) => {
            let sibling = placement
                .next_sibling
                .filter(|sibling| doc.parent(*sibling) == Some(parent));
            if placement.next_sibling.is_some() && sibling.is_none() {
                warn!(
                    "Original next sibling of {:?} moved, appending to its original parent",
                    target
                );
            }
            doc.insert_before(parent, target, sibling).or_else(|e| {
                warn!(
                    "Unable to reinsert {:?} into {:?} ({}), appending to body",
                    target, parent, e
                );
                let body = doc.body();
                doc.append_child(body, target)
            })
        }
        None => {
            warn!("Original parent of {:?} is gone, appending to body", target);
            let body = doc.body();
            doc.append_child(body, target)
        }
    };
    if let Err(e) = restored {
        error!("Failed to restore target {:?}: {}", target, e);
    }

    let display = match &placement.display {
        Some(display) => doc.set_style_property(target, "display", display),
        None => doc.remove_style_property(target, "display"),
    };
    if let Err(e) = display {
        warn!("Unable to restore display style of {:?}: {}", target, e);
    }
}

fn scroll_lock_lease(lock: &ScrollLockConfig) -> String {
    format!("scroll-lock:{}", lock.class_name)
}

/// Injects the lock rule once per document and marks `html`/`body` as locked
fn acquire_scroll_lock(doc: &mut Document, lock: &ScrollLockConfig) -> Result<(), DomError> {
    if doc.element_by_id(&lock.style_id).is_none() {
        let style = doc.create_element("style");
        doc.set_id(style, &lock.style_id)?;
        doc.set_content(style, &lock.rule())?;
        let head = doc.head();
        doc.append_child(head, style)?;
        debug!("Injected scroll lock rule #{}", lock.style_id);
    }

    let html = doc.document_element();
    let body = doc.body();
    doc.add_class(html, &lock.class_name)?;
    doc.add_class(body, &lock.class_name)?;

    let holders = doc.acquire_lease(&scroll_lock_lease(lock));
    debug!("Scroll lock held by {} sessions", holders);
    Ok(())
}

/// Drops one hold on the scroll lock; the last holder unlocks the page
fn release_scroll_lock(doc: &mut Document, lock: &ScrollLockConfig) {
    let remaining = doc.release_lease(&scroll_lock_lease(lock));
    if remaining > 0 {
        debug!("Scroll lock still held by {} sessions", remaining);
        return;
    }

    let html = doc.document_element();
    let body = doc.body();
    for node in [html, body] {
        if let Err(e) = doc.remove_class(node, &lock.class_name) {
            warn!("Unable to remove scroll lock class from {:?}: {}", node, e);
        }
    }
}
