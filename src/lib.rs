//! Touch-operable virtual gamepad overlay
//!
//! Overlays a directional pad, lettered action buttons and a space bar onto a
//! page and translates touches on them into synthetic keyboard input for a
//! target node, including targets that live in an embedded frame.
//!
//! 1. [`gamepad`] - session lifecycle (bind/unbind), overlay tree, key model
//! 2. [`input`] - per-key pressed state and key repeat
//! 3. [`dispatch`] - event construction and local / cross-frame delivery
//! 4. [`dom`] - the page model the overlay decorates
//!
//! ```rust
//! use virtual_gamepad::dom::DocumentHandle;
//! use virtual_gamepad::gamepad::{ControlRole, Direction, GamepadSession};
//!
//! let document = DocumentHandle::default();
//! let canvas = document.with(|doc| {
//!     let canvas = doc.create_element("canvas");
//!     let body = doc.body();
//!     doc.append_child(body, canvas).unwrap();
//!     canvas
//! });
//!
//! let mut session = GamepadSession::new(document, canvas, ["ArrowUp", "A"], None).unwrap();
//! session.bind();
//! assert!(session.overlay_node(ControlRole::DpadButton(Direction::Up)).is_some());
//! session.unbind();
//! ```

pub mod config;
pub mod dispatch;
pub mod dom;
pub mod error;
pub mod gamepad;
pub mod input;

pub use config::GamepadConfig;
pub use error::GamepadError;
pub use gamepad::{GamepadSession, LifecycleEvent};
