use serde::{Deserialize, Serialize};
use std::fmt;

/// Integer grid coordinate on a map.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Hash, PartialOrd, Ord, Serialize, Deserialize)]
pub struct Position {
    pub x: i32,
    pub y: i32,
}

impl Position {
    pub const fn new(x: i32, y: i32) -> Self {
        Self { x, y }
    }

    pub fn offset(&self, dx: i32, dy: i32) -> Self {
        Self::new(self.x + dx, self.y + dy)
    }

    pub fn add(&self, other: Position) -> Self {
        self.offset(other.x, other.y)
    }

    /// Number of king moves between two tiles.
    pub fn chebyshev_distance(&self, other: Position) -> u32 {
        let dx = (self.x - other.x).unsigned_abs();
        let dy = (self.y - other.y).unsigned_abs();
        dx.max(dy)
    }

    /// True when `other` is this tile or one of its eight neighbours.
    pub fn is_adjacent_or_same(&self, other: Position) -> bool {
        self.chebyshev_distance(other) <= 1
    }
}

impl fmt::Display for Position {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        write!(f, "({}, {})", self.x, self.y)
    }
}
