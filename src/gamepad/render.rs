//! Renderer seam: turns a control role into an attachable node
//!
//! Visual styling is not part of the session's state machine. The session only
//! asks a [`Renderer`] for nodes and for pressed/idle feedback.

use crate::config::ThemeConfig;
use crate::dom::{Document, DomError, NodeId};
use crate::gamepad::keys::Direction;

/// Role of a node inside the overlay tree
#[derive(Clone, Copy, Debug, PartialEq, Eq, Hash)]
pub enum ControlRole {
    Overlay,
    TargetWrapper,
    CloseButton,
    DpadContainer,
    DpadButton(Direction),
    /// Keeps the d-pad grid intact for an unbound direction
    DpadPlaceholder(Direction),
    SpaceButton,
    ActionContainer,
    ActionButton(char),
}

impl ControlRole {
    pub fn tag(&self) -> &'static str {
        match self {
            ControlRole::CloseButton
            | ControlRole::DpadButton(_)
            | ControlRole::SpaceButton
            | ControlRole::ActionButton(_) => "button",
            _ => "div",
        }
    }

    /// Whether pointer input on this role drives a key
    pub fn is_interactive(&self) -> bool {
        matches!(
            self,
            ControlRole::DpadButton(_) | ControlRole::SpaceButton | ControlRole::ActionButton(_)
        )
    }
}

pub trait Renderer: Send + Sync {
    /// Creates a detached node for `role` showing `content`
    fn render(
        &self,
        doc: &mut Document,
        role: ControlRole,
        content: &str,
    ) -> Result<NodeId, DomError>;

    /// Applies or reverts the pressed look of a control
    fn set_pressed(&self, doc: &mut Document, node: NodeId, pressed: bool) -> Result<(), DomError>;
}

/// Fixed-position layout: d-pad bottom left, action buttons bottom right,
/// space bar bottom centre
#[derive(Clone, Debug, Default)]
pub struct StyledRenderer {
    theme: ThemeConfig,
}

impl StyledRenderer {
    pub fn new(theme: ThemeConfig) -> Self {
        Self { theme }
    }

    pub fn style_for(&self, role: ControlRole) -> String {
        let t = &self.theme;
        match role {
            ControlRole::Overlay => format!(
                "position: fixed; top: 0; left: 0; width: 100vw; height: 100vh; \
                 background-color: {}; z-index: 9990; display: flex; flex-direction: column; \
                 justify-content: flex-end; align-items: center; padding-bottom: 20px; \
                 box-sizing: border-box; pointer-events: none;",
                t.overlay_color
            ),
            ControlRole::TargetWrapper => "position: relative; display: flex; \
                 justify-content: center; align-items: center; width: 100%; max-width: 100vw; \
                 flex-grow: 1; margin-bottom: 150px; pointer-events: auto;"
                .to_string(),
            ControlRole::CloseButton => format!(
                "position: absolute; top: 15px; right: 15px; width: 30px; height: 30px; \
                 background-color: {}; color: black; border: none; border-radius: 50%; \
                 font-size: 18px; font-weight: bold; cursor: pointer; z-index: 9999; \
                 user-select: none; pointer-events: auto;",
                t.close_color
            ),
            ControlRole::DpadContainer => "display: grid; \
                 grid-template-areas: '. up .' 'left . right' '. down .'; gap: 5px; \
                 width: 150px; height: 150px; position: absolute; left: 20px; bottom: 80px; \
                 z-index: 9998; pointer-events: auto;"
                .to_string(),
            ControlRole::DpadButton(direction) => format!(
                "width: 50px; height: 50px; background-color: {}; \
                 border: 1px solid rgba(0, 0, 0, 0.5); border-radius: 8px; font-size: 24px; \
                 user-select: none; cursor: pointer; pointer-events: auto; grid-area: {};",
                t.idle_color,
                direction.grid_area()
            ),
            ControlRole::DpadPlaceholder(direction) => format!(
                "grid-area: {}; pointer-events: none;",
                direction.grid_area()
            ),
            ControlRole::SpaceButton => format!(
                "height: 50px; width: 180px; max-width: 40%; background-color: {}; \
                 border: 1px solid rgba(0, 0, 0, 0.5); border-radius: 10px; user-select: none; \
                 cursor: pointer; text-align: center; line-height: 50px; font-size: 16px; \
                 position: absolute; bottom: 20px; left: 50%; transform: translateX(-50%); \
                 z-index: 9997; pointer-events: auto;",
                t.idle_color
            ),
            ControlRole::ActionContainer => "display: flex; flex-wrap: wrap; gap: 15px; \
                 width: 130px; justify-content: center; align-items: center; position: absolute; \
                 right: 20px; bottom: 80px; z-index: 9998; pointer-events: auto;"
                .to_string(),
            ControlRole::ActionButton(_) => format!(
                "width: 50px; height: 50px; background-color: {}; \
                 border: 1px solid rgba(0, 0, 0, 0.5); border-radius: 50%; font-size: 18px; \
                 font-weight: bold; user-select: none; cursor: pointer; pointer-events: auto;",
                t.idle_color
            ),
        }
    }
}

impl Renderer for StyledRenderer {
    fn render(
        &self,
        doc: &mut Document,
        role: ControlRole,
        content: &str,
    ) -> Result<NodeId, DomError> {
        let node = doc.create_element(role.tag());
        doc.set_css_text(node, &self.style_for(role))?;
        doc.set_content(node, content)?;
        Ok(node)
    }

    fn set_pressed(&self, doc: &mut Document, node: NodeId, pressed: bool) -> Result<(), DomError> {
        let color = if pressed {
            &self.theme.pressed_color
        } else {
            &self.theme.idle_color
        };
        doc.set_style_property(node, "background-color", color)
    }
}
