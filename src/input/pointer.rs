//! Adapters from concrete input sources to a single engagement contract
//!
//! ```text
//! TouchPhase ─┐
//!             ├──► PointerEngagement { Begin, MoveAway, End } ──► InputSurface
//! MousePhase ─┘
//! ```

/// What a pointer did to a control
#[derive(Clone, Copy, Debug, PartialEq, Eq)]
pub enum PointerEngagement {
    /// Pointer went down on the control
    Begin,
    /// Pointer left the control while possibly still down
    MoveAway,
    /// Pointer was lifted or the interaction was cancelled
    End,
}

#[derive(Clone, Copy, Debug, PartialEq, Eq)]
pub enum TouchPhase {
    Start,
    Move,
    End,
    Cancel,
}

#[derive(Clone, Copy, Debug, PartialEq, Eq)]
pub enum MousePhase {
    Down,
    Move,
    Up,
    Leave,
}

/// Raw pointer input routed to an overlay node
#[derive(Clone, Copy, Debug, PartialEq, Eq)]
pub enum PointerInput {
    Touch(TouchPhase),
    Mouse(MousePhase),
    Click,
}

impl PointerInput {
    pub fn engagement(&self) -> Option<PointerEngagement> {
        match self {
            PointerInput::Touch(TouchPhase::Start) => Some(PointerEngagement::Begin),
            PointerInput::Touch(TouchPhase::End | TouchPhase::Cancel) => {
                Some(PointerEngagement::End)
            }
            PointerInput::Mouse(MousePhase::Down) => Some(PointerEngagement::Begin),
            PointerInput::Mouse(MousePhase::Up) => Some(PointerEngagement::End),
            PointerInput::Mouse(MousePhase::Leave) => Some(PointerEngagement::MoveAway),
            PointerInput::Touch(TouchPhase::Move)
            | PointerInput::Mouse(MousePhase::Move)
            | PointerInput::Click => None,
        }
    }

    /// Whether the host should suppress its default handling (scrolling,
    /// text selection, synthesized mouse events)
    pub fn prevents_default(&self) -> bool {
        matches!(
            self,
            PointerInput::Touch(TouchPhase::Start | TouchPhase::End | TouchPhase::Cancel)
                | PointerInput::Mouse(MousePhase::Down | MousePhase::Up)
        )
    }
}
