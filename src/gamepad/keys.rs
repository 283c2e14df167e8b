//! Logical key names and the fixed control categories
//!
//! Keys are normalised once, at construction: upper-cased, with the single space
//! kept literally. Arrow keys travel internally as `ARROWUP`..`ARROWRIGHT` and only
//! regain their mixed-case names (`ArrowUp`) when an event is dispatched.

use std::collections::BTreeSet;
use std::fmt;

/// One of the four d-pad directions, in grid order
#[derive(Clone, Copy, Debug, PartialEq, Eq, Hash, PartialOrd, Ord)]
pub enum Direction {
    Up,
    Down,
    Left,
    Right,
}

impl Direction {
    pub const ALL: [Direction; 4] = [
        Direction::Up,
        Direction::Down,
        Direction::Left,
        Direction::Right,
    ];

    /// Normalised key name
    pub fn key_name(&self) -> &'static str {
        match self {
            Direction::Up => "ARROWUP",
            Direction::Down => "ARROWDOWN",
            Direction::Left => "ARROWLEFT",
            Direction::Right => "ARROWRIGHT",
        }
    }

    /// Key name as seen by the receiving page
    pub fn dispatch_name(&self) -> &'static str {
        match self {
            Direction::Up => "ArrowUp",
            Direction::Down => "ArrowDown",
            Direction::Left => "ArrowLeft",
            Direction::Right => "ArrowRight",
        }
    }

    pub fn grid_area(&self) -> &'static str {
        match self {
            Direction::Up => "up",
            Direction::Down => "down",
            Direction::Left => "left",
            Direction::Right => "right",
        }
    }

    pub fn symbol(&self) -> &'static str {
        match self {
            Direction::Up => "▲",
            Direction::Down => "▼",
            Direction::Left => "◀",
            Direction::Right => "▶",
        }
    }

    pub fn key(&self) -> LogicalKey {
        LogicalKey(self.key_name().to_string())
    }
}

/// Which kind of control a key maps to
#[derive(Clone, Copy, Debug, PartialEq, Eq)]
pub enum KeyCategory {
    Direction(Direction),
    Space,
    Letter(char),
    /// Accepted but rendered without a control
    Other,
}

/// A normalised key name
#[derive(Clone, Debug, PartialEq, Eq, Hash, PartialOrd, Ord)]
pub struct LogicalKey(String);

impl LogicalKey {
    pub const SPACE: &'static str = " ";

    pub fn new(raw: &str) -> Self {
        if raw == Self::SPACE {
            return Self(raw.to_string());
        }

        let upper = raw.to_uppercase();
        let normalized = match upper.as_str() {
            "UP" => Direction::Up.key_name(),
            "DOWN" => Direction::Down.key_name(),
            "LEFT" => Direction::Left.key_name(),
            "RIGHT" => Direction::Right.key_name(),
            "SPACE" | "SPACEBAR" => Self::SPACE,
            _ => return Self(upper),
        };
        Self(normalized.to_string())
    }

    pub fn as_str(&self) -> &str {
        &self.0
    }

    pub fn category(&self) -> KeyCategory {
        if self.0 == Self::SPACE {
            return KeyCategory::Space;
        }
        if let Some(direction) = Direction::ALL
            .iter()
            .find(|direction| direction.key_name() == self.0)
        {
            return KeyCategory::Direction(*direction);
        }

        let mut chars = self.0.chars();
        match (chars.next(), chars.next()) {
            (Some(c), None) if c.is_ascii_uppercase() => KeyCategory::Letter(c),
            _ => KeyCategory::Other,
        }
    }

    /// Name carried by dispatched events
    pub fn dispatch_name(&self) -> &str {
        match self.category() {
            KeyCategory::Direction(direction) => direction.dispatch_name(),
            _ => &self.0,
        }
    }
}

impl From<&str> for LogicalKey {
    fn from(raw: &str) -> Self {
        Self::new(raw)
    }
}

impl fmt::Display for LogicalKey {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        write!(f, "{:?}", self.dispatch_name())
    }
}

/// The immutable, deduplicated set of keys a session binds
#[derive(Clone, Debug, Default, PartialEq, Eq)]
pub struct BoundKeys {
    keys: BTreeSet<LogicalKey>,
}

impl BoundKeys {
    pub fn new<I, S>(keys: I) -> Self
    where
        I: IntoIterator<Item = S>,
        S: AsRef<str>,
    {
        Self {
            keys: keys
                .into_iter()
                .map(|key| LogicalKey::new(key.as_ref()))
                .collect(),
        }
    }

    pub fn contains(&self, key: &LogicalKey) -> bool {
        self.keys.contains(key)
    }

    pub fn len(&self) -> usize {
        self.keys.len()
    }

    pub fn is_empty(&self) -> bool {
        self.keys.is_empty()
    }

    pub fn iter(&self) -> impl Iterator<Item = &LogicalKey> {
        self.keys.iter()
    }

    pub fn has_direction(&self, direction: Direction) -> bool {
        self.keys.contains(&direction.key())
    }

    pub fn has_any_direction(&self) -> bool {
        Direction::ALL.iter().any(|d| self.has_direction(*d))
    }

    pub fn has_space(&self) -> bool {
        self.keys.contains(&LogicalKey::new(LogicalKey::SPACE))
    }

    /// Lettered action keys in lexicographic order
    pub fn letters(&self) -> Vec<char> {
        // BTreeSet iteration is already sorted
        self.keys
            .iter()
            .filter_map(|key| match key.category() {
                KeyCategory::Letter(c) => Some(c),
                _ => None,
            })
            .collect()
    }

    /// Keys outside the arrow, space and letter categories
    pub fn unrecognized(&self) -> Vec<&LogicalKey> {
        self.keys
            .iter()
            .filter(|key| key.category() == KeyCategory::Other)
            .collect()
    }
}
