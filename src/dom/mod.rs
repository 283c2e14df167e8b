//! In-memory page model hosting the overlay
//!
//! The gamepad never owns the page it decorates. It only needs a small set of
//! capabilities from its host: a node tree it can insert into and restore,
//! inline styles and class lists, focus, keyboard event dispatch with bubbling,
//! and embedded frames that accept origin-addressed messages. [`Document`]
//! provides exactly that surface as a node arena.
//!
//! # Sharing
//!
//! ```text
//! GamepadSession ─┐
//! InputSurface ───┼──► DocumentHandle (Arc<Mutex<Document>>)
//! EventDispatcher ┘
//! ```
//!
//! Several sessions may decorate the same document. Shared resources (the
//! scroll lock) are reference counted through named leases, and targets are
//! claimed so that a node is relocated by at most one session at a time.

pub mod event;

pub use event::{KeyEventType, KeyboardEvent, PostedMessage};

use slotmap::{new_key_type, SlotMap};
use std::collections::{BTreeMap, BTreeSet, HashMap, HashSet};
use std::sync::{Arc, Mutex, PoisonError};
use tokio::sync::mpsc;
use tracing::debug;
use url::Url;

new_key_type! {
    /// Handle to a node in a [`Document`]
    ///
    /// Handles are generational: once a node is discarded its slot may be
    /// reused, but the old handle never resolves to the new node.
    pub struct NodeId;
}

/// Errors raised by tree, focus, dispatch and frame operations
#[derive(Debug, Clone, PartialEq, Eq, thiserror::Error)]
pub enum DomError {
    #[error("Unknown or discarded node {0:?}")]
    UnknownNode(NodeId),

    #[error("Node {child:?} is not a child of {parent:?}")]
    NotAChild { parent: NodeId, child: NodeId },

    #[error("Cannot insert {child:?} into {parent:?}: the new parent is inside the child")]
    HierarchyRequest { parent: NodeId, child: NodeId },

    #[error("Node {0:?} cannot have children")]
    NoChildren(NodeId),

    #[error("Node {0:?} cannot receive focus")]
    NotFocusable(NodeId),

    #[error("Node {0:?} is disabled")]
    Disabled(NodeId),

    #[error("Node {0:?} does not accept events")]
    EventsNotSupported(NodeId),

    #[error("Node {0:?} is not an embedded frame")]
    NotAFrame(NodeId),

    #[error("Frame {0:?} has no content window")]
    NoContentWindow(NodeId),

    #[error("Invalid frame source {src:?}: {reason}")]
    InvalidSource { src: String, reason: String },
}

#[derive(Debug)]
enum NodeKind {
    Element,
    Frame(FrameState),
    Text,
}

#[derive(Debug)]
struct FrameState {
    src: String,
    window: Option<ContentWindow>,
}

#[derive(Debug)]
struct ContentWindow {
    origin: String,
    inbox: mpsc::UnboundedSender<PostedMessage>,
}

#[derive(Debug)]
struct Node {
    tag: String,
    kind: NodeKind,
    id: Option<String>,
    classes: BTreeSet<String>,
    style: BTreeMap<String, String>,
    attributes: BTreeMap<String, String>,
    content: String,
    parent: Option<NodeId>,
    children: Vec<NodeId>,
    key_listeners: Vec<mpsc::UnboundedSender<KeyboardEvent>>,
}

impl Node {
    fn new(tag: &str, kind: NodeKind) -> Self {
        Self {
            tag: tag.to_string(),
            kind,
            id: None,
            classes: BTreeSet::new(),
            style: BTreeMap::new(),
            attributes: BTreeMap::new(),
            content: String::new(),
            parent: None,
            children: Vec::new(),
            key_listeners: Vec::new(),
        }
    }
}

/// Resolves the origin (`scheme://host[:port]`) of `src` relative to `base`
///
/// Opaque origins (e.g. `data:` URLs) cannot be addressed and are rejected.
pub fn resolve_origin(base: &Url, src: &str) -> Result<String, DomError> {
    let resolved = base.join(src).map_err(|e| DomError::InvalidSource {
        src: src.to_string(),
        reason: e.to_string(),
    })?;

    let origin = resolved.origin();
    if !origin.is_tuple() {
        return Err(DomError::InvalidSource {
            src: src.to_string(),
            reason: "source has an opaque origin".to_string(),
        });
    }
    Ok(origin.ascii_serialization())
}

/// Node arena for one page
#[derive(Debug)]
pub struct Document {
    nodes: SlotMap<NodeId, Node>,
    document_element: NodeId,
    head: NodeId,
    body: NodeId,
    location: Url,
    focused: Option<NodeId>,
    leases: HashMap<String, usize>,
    claims: HashSet<NodeId>,
}

impl Default for Document {
    fn default() -> Self {
        Self::new()
    }
}

impl Document {
    /// Creates an empty `about:blank` page with `html`, `head` and `body`
    pub fn new() -> Self {
        let location = Url::parse("about:blank").expect("about:blank is a valid URL");
        Self::with_location(location)
    }

    pub fn with_location(location: Url) -> Self {
        let mut document = Self {
            nodes: SlotMap::with_key(),
            document_element: NodeId::default(),
            head: NodeId::default(),
            body: NodeId::default(),
            location,
            focused: None,
            leases: HashMap::new(),
            claims: HashSet::new(),
        };

        let html = document.push(Node::new("html", NodeKind::Element));
        let head = document.push(Node::new("head", NodeKind::Element));
        let body = document.push(Node::new("body", NodeKind::Element));
        document.nodes[head].parent = Some(html);
        document.nodes[body].parent = Some(html);
        document.nodes[html].children = vec![head, body];

        document.document_element = html;
        document.head = head;
        document.body = body;
        document
    }

    fn push(&mut self, node: Node) -> NodeId {
        self.nodes.insert(node)
    }

    fn node(&self, id: NodeId) -> Result<&Node, DomError> {
        self.nodes.get(id).ok_or(DomError::UnknownNode(id))
    }

    fn node_mut(&mut self, id: NodeId) -> Result<&mut Node, DomError> {
        self.nodes.get_mut(id).ok_or(DomError::UnknownNode(id))
    }

    pub fn location(&self) -> &Url {
        &self.location
    }

    pub fn document_element(&self) -> NodeId {
        self.document_element
    }

    pub fn head(&self) -> NodeId {
        self.head
    }

    pub fn body(&self) -> NodeId {
        self.body
    }

    // ---- Creation ----

    pub fn create_element(&mut self, tag: &str) -> NodeId {
        self.push(Node::new(&tag.to_ascii_lowercase(), NodeKind::Element))
    }

    pub fn create_text(&mut self, content: &str) -> NodeId {
        let mut node = Node::new("#text", NodeKind::Text);
        node.content = content.to_string();
        self.push(node)
    }

    /// Creates an `iframe` whose content window is not loaded yet
    pub fn create_frame(&mut self, src: &str) -> NodeId {
        let mut node = Node::new(
            "iframe",
            NodeKind::Frame(FrameState {
                src: src.to_string(),
                window: None,
            }),
        );
        node.attributes.insert("src".to_string(), src.to_string());
        self.push(node)
    }

    // ---- Capabilities ----

    /// Number of live nodes, attached or not
    pub fn node_count(&self) -> usize {
        self.nodes.len()
    }

    pub fn is_alive(&self, id: NodeId) -> bool {
        self.node(id).is_ok()
    }

    pub fn tag(&self, id: NodeId) -> Option<&str> {
        self.node(id).ok().map(|node| node.tag.as_str())
    }

    pub fn can_have_children(&self, id: NodeId) -> bool {
        matches!(self.node(id), Ok(node) if !matches!(node.kind, NodeKind::Text))
    }

    pub fn accepts_events(&self, id: NodeId) -> bool {
        matches!(self.node(id), Ok(node) if !matches!(node.kind, NodeKind::Text))
    }

    // ---- Tree ----

    pub fn parent(&self, id: NodeId) -> Option<NodeId> {
        self.node(id).ok().and_then(|node| node.parent)
    }

    pub fn children(&self, id: NodeId) -> Vec<NodeId> {
        self.node(id)
            .map(|node| node.children.clone())
            .unwrap_or_default()
    }

    pub fn next_sibling(&self, id: NodeId) -> Option<NodeId> {
        let parent = self.parent(id)?;
        let siblings = &self.nodes[parent].children;
        let index = siblings.iter().position(|child| *child == id)?;
        siblings.get(index + 1).copied()
    }

    /// True if `ancestor` is `id` or one of its ancestors
    pub fn is_inclusive_ancestor(&self, ancestor: NodeId, id: NodeId) -> bool {
        let mut current = Some(id);
        while let Some(node) = current {
            if node == ancestor {
                return true;
            }
            current = self.parent(node);
        }
        false
    }

    /// True if the node is reachable from the document element
    pub fn is_connected(&self, id: NodeId) -> bool {
        self.is_alive(id) && self.is_inclusive_ancestor(self.document_element, id)
    }

    pub fn append_child(&mut self, parent: NodeId, child: NodeId) -> Result<(), DomError> {
        self.insert_before(parent, child, None)
    }

    /// Inserts `child` into `parent` before `reference`, or last if `reference` is `None`
    ///
    /// `child` is detached from its previous parent first.
    pub fn insert_before(
        &mut self,
        parent: NodeId,
        child: NodeId,
        reference: Option<NodeId>,
    ) -> Result<(), DomError> {
        self.node(child)?;
        if !self.can_have_children(parent) {
            self.node(parent)?;
            return Err(DomError::NoChildren(parent));
        }
        if self.is_inclusive_ancestor(child, parent) {
            return Err(DomError::HierarchyRequest { parent, child });
        }

        let reference = match reference {
            Some(r) if r == child => self.next_sibling(child),
            other => other,
        };
        if let Some(r) = reference {
            if self.parent(r) != Some(parent) {
                return Err(DomError::NotAChild { parent, child: r });
            }
        }

        self.detach(child);

        let siblings = &mut self.nodes[parent].children;
        let index = reference
            .and_then(|r| siblings.iter().position(|sibling| *sibling == r))
            .unwrap_or(siblings.len());
        siblings.insert(index, child);
        self.nodes[child].parent = Some(parent);
        Ok(())
    }

    fn detach(&mut self, id: NodeId) {
        if let Some(parent) = self.nodes[id].parent.take() {
            self.nodes[parent].children.retain(|child| *child != id);
        }
    }

    /// Detaches the node from its parent; the node stays usable
    pub fn remove(&mut self, id: NodeId) -> Result<(), DomError> {
        self.node(id)?;
        self.detach(id);
        Ok(())
    }

    /// Detaches the node and frees its slot; its children become parentless
    pub fn discard(&mut self, id: NodeId) -> Result<(), DomError> {
        self.node(id)?;
        self.detach(id);

        if let Some(node) = self.nodes.remove(id) {
            for child in node.children {
                self.nodes[child].parent = None;
            }
        }
        self.claims.remove(&id);
        if self.focused == Some(id) {
            self.focused = None;
        }
        Ok(())
    }

    /// Finds a connected node by its `id` attribute
    pub fn element_by_id(&self, element_id: &str) -> Option<NodeId> {
        self.nodes
            .iter()
            .find(|(id, node)| node.id.as_deref() == Some(element_id) && self.is_connected(*id))
            .map(|(id, _)| id)
    }

    // ---- Attributes, classes, styles, content ----

    pub fn set_id(&mut self, id: NodeId, element_id: &str) -> Result<(), DomError> {
        self.node_mut(id)?.id = Some(element_id.to_string());
        Ok(())
    }

    pub fn set_attribute(&mut self, id: NodeId, name: &str, value: &str) -> Result<(), DomError> {
        self.node_mut(id)?
            .attributes
            .insert(name.to_string(), value.to_string());
        Ok(())
    }

    pub fn remove_attribute(&mut self, id: NodeId, name: &str) -> Result<(), DomError> {
        self.node_mut(id)?.attributes.remove(name);
        Ok(())
    }

    pub fn attribute(&self, id: NodeId, name: &str) -> Option<String> {
        self.node(id).ok()?.attributes.get(name).cloned()
    }

    pub fn add_class(&mut self, id: NodeId, class: &str) -> Result<(), DomError> {
        self.node_mut(id)?.classes.insert(class.to_string());
        Ok(())
    }

    pub fn remove_class(&mut self, id: NodeId, class: &str) -> Result<(), DomError> {
        self.node_mut(id)?.classes.remove(class);
        Ok(())
    }

    pub fn has_class(&self, id: NodeId, class: &str) -> bool {
        self.node(id)
            .map(|node| node.classes.contains(class))
            .unwrap_or(false)
    }

    /// Replaces the inline style with the `name: value;` pairs in `css`
    pub fn set_css_text(&mut self, id: NodeId, css: &str) -> Result<(), DomError> {
        let node = self.node_mut(id)?;
        node.style.clear();
        for declaration in css.split(';') {
            if let Some((name, value)) = declaration.split_once(':') {
                let name = name.trim();
                let value = value.trim();
                if !name.is_empty() && !value.is_empty() {
                    node.style.insert(name.to_ascii_lowercase(), value.to_string());
                }
            }
        }
        Ok(())
    }

    pub fn set_style_property(
        &mut self,
        id: NodeId,
        name: &str,
        value: &str,
    ) -> Result<(), DomError> {
        self.node_mut(id)?
            .style
            .insert(name.to_ascii_lowercase(), value.to_string());
        Ok(())
    }

    pub fn remove_style_property(&mut self, id: NodeId, name: &str) -> Result<(), DomError> {
        self.node_mut(id)?.style.remove(&name.to_ascii_lowercase());
        Ok(())
    }

    pub fn style_property(&self, id: NodeId, name: &str) -> Option<String> {
        self.node(id)
            .ok()?
            .style
            .get(&name.to_ascii_lowercase())
            .cloned()
    }

    /// Full inline style, ordered by property name
    pub fn style(&self, id: NodeId) -> BTreeMap<String, String> {
        self.node(id)
            .map(|node| node.style.clone())
            .unwrap_or_default()
    }

    pub fn set_content(&mut self, id: NodeId, content: &str) -> Result<(), DomError> {
        self.node_mut(id)?.content = content.to_string();
        Ok(())
    }

    pub fn content(&self, id: NodeId) -> Option<&str> {
        self.node(id).ok().map(|node| node.content.as_str())
    }

    // ---- Focus ----

    pub fn focus(&mut self, id: NodeId) -> Result<(), DomError> {
        let node = self.node(id)?;
        if matches!(node.kind, NodeKind::Text) {
            return Err(DomError::NotFocusable(id));
        }
        if node.attributes.contains_key("disabled") {
            return Err(DomError::Disabled(id));
        }
        self.focused = Some(id);
        Ok(())
    }

    pub fn focused(&self) -> Option<NodeId> {
        self.focused
    }

    // ---- Keyboard events ----

    /// Subscribes to keyboard events reaching `id`, directly or by bubbling
    pub fn add_key_listener(
        &mut self,
        id: NodeId,
    ) -> Result<mpsc::UnboundedReceiver<KeyboardEvent>, DomError> {
        if !self.accepts_events(id) {
            self.node(id)?;
            return Err(DomError::EventsNotSupported(id));
        }
        let (tx, rx) = mpsc::unbounded_channel();
        self.nodes[id].key_listeners.push(tx);
        Ok(rx)
    }

    /// Dispatches `event` on `id` and returns the number of listeners reached
    pub fn dispatch_key_event(
        &mut self,
        id: NodeId,
        event: &KeyboardEvent,
    ) -> Result<usize, DomError> {
        if !self.accepts_events(id) {
            self.node(id)?;
            return Err(DomError::EventsNotSupported(id));
        }

        let mut path = vec![id];
        if event.bubbles {
            let mut current = self.parent(id);
            while let Some(node) = current {
                path.push(node);
                current = self.parent(node);
            }
        }

        let mut reached = 0;
        for node in path {
            let listeners = &mut self.nodes[node].key_listeners;
            listeners.retain(|listener| !listener.is_closed());
            for listener in listeners.iter() {
                if listener.send(event.clone()).is_ok() {
                    reached += 1;
                }
            }
        }
        Ok(reached)
    }

    // ---- Frames ----

    pub fn frame_src(&self, id: NodeId) -> Option<String> {
        match &self.node(id).ok()?.kind {
            NodeKind::Frame(frame) => Some(frame.src.clone()),
            _ => None,
        }
    }

    /// Loads the frame's content window and returns its message inbox
    ///
    /// The content origin is the frame source resolved against the page location.
    pub fn load_frame(
        &mut self,
        id: NodeId,
    ) -> Result<mpsc::UnboundedReceiver<PostedMessage>, DomError> {
        let src = self.frame_src(id).ok_or(DomError::NotAFrame(id))?;
        let origin = resolve_origin(&self.location, &src)?;
        let (tx, rx) = mpsc::unbounded_channel();

        if let NodeKind::Frame(frame) = &mut self.node_mut(id)?.kind {
            frame.window = Some(ContentWindow { origin, inbox: tx });
        }
        Ok(rx)
    }

    /// Posts `data` to the frame's content window
    ///
    /// Returns `Ok(false)` when the message was dropped because `target_origin`
    /// does not match the content origin or the receiver has gone away.
    pub fn post_message(
        &mut self,
        id: NodeId,
        data: serde_json::Value,
        target_origin: &str,
    ) -> Result<bool, DomError> {
        let window = match &self.node(id)?.kind {
            NodeKind::Frame(FrameState {
                window: Some(window),
                ..
            }) => window,
            NodeKind::Frame(_) => return Err(DomError::NoContentWindow(id)),
            _ => return Err(DomError::NotAFrame(id)),
        };

        if window.origin != target_origin {
            debug!(
                "Dropping message for {}: frame origin is {}",
                target_origin, window.origin
            );
            return Ok(false);
        }

        let message = PostedMessage {
            target_origin: target_origin.to_string(),
            data,
        };
        Ok(window.inbox.send(message).is_ok())
    }

    // ---- Shared resources ----

    /// Increments the named lease and returns the new holder count
    pub fn acquire_lease(&mut self, name: &str) -> usize {
        let count = self.leases.entry(name.to_string()).or_insert(0);
        *count += 1;
        *count
    }

    /// Decrements the named lease and returns the remaining holder count
    pub fn release_lease(&mut self, name: &str) -> usize {
        match self.leases.get_mut(name) {
            Some(count) if *count > 1 => {
                *count -= 1;
                *count
            }
            _ => {
                self.leases.remove(name);
                0
            }
        }
    }

    pub fn lease_count(&self, name: &str) -> usize {
        self.leases.get(name).copied().unwrap_or(0)
    }

    /// Marks the node as relocated by a session; false if already claimed
    pub fn claim(&mut self, id: NodeId) -> bool {
        self.claims.insert(id)
    }

    pub fn release_claim(&mut self, id: NodeId) {
        self.claims.remove(&id);
    }

    pub fn is_claimed(&self, id: NodeId) -> bool {
        self.claims.contains(&id)
    }
}

/// Shared, lockable reference to a [`Document`]
#[derive(Clone, Debug, Default)]
pub struct DocumentHandle {
    inner: Arc<Mutex<Document>>,
}

impl DocumentHandle {
    pub fn new(document: Document) -> Self {
        Self {
            inner: Arc::new(Mutex::new(document)),
        }
    }

    /// Runs `f` with exclusive access to the document
    ///
    /// A poisoned lock is recovered: the tree stays structurally valid after a
    /// panic in another holder.
    pub fn with<R>(&self, f: impl FnOnce(&mut Document) -> R) -> R {
        let mut guard = self.inner.lock().unwrap_or_else(PoisonError::into_inner);
        f(&mut guard)
    }
}
