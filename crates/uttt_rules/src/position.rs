//! Coordinates on the two-level board.
//!
//! A [`SubCoordinate`] addresses one cell of any 3x3 grid; a [`Coordinate`]
//! pairs two of them to address one of the 81 playable squares. Both carry
//! signed components so that out-of-range input survives deserialization and
//! is rejected by the engine rather than by the wire format.

use serde::{Deserialize, Serialize};
use tracing::instrument;

use crate::RuleError;

/// A cell within one 3x3 grid, 1-based. `x` is the column, `y` the row.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Hash, PartialOrd, Ord, Serialize, Deserialize)]
pub struct SubCoordinate {
    /// Column, 1 through 3.
    pub x: i32,
    /// Row, 1 through 3.
    pub y: i32,
}

impl SubCoordinate {
    /// Creates a sub-coordinate without validating it.
    pub const fn new(x: i32, y: i32) -> Self {
        Self { x, y }
    }

    /// All nine in-range sub-coordinates in row-major order.
    pub const ALL: [SubCoordinate; 9] = [
        SubCoordinate::new(1, 1),
        SubCoordinate::new(2, 1),
        SubCoordinate::new(3, 1),
        SubCoordinate::new(1, 2),
        SubCoordinate::new(2, 2),
        SubCoordinate::new(3, 2),
        SubCoordinate::new(1, 3),
        SubCoordinate::new(2, 3),
        SubCoordinate::new(3, 3),
    ];

    /// Returns true if both components are within 1..=3.
    pub fn is_valid(self) -> bool {
        (1..=3).contains(&self.x) && (1..=3).contains(&self.y)
    }

    /// Converts to a row-major grid index (0-8).
    ///
    /// # Errors
    ///
    /// Returns [`RuleError::InvalidCoordinate`] if either component is out of range.
    #[instrument]
    pub fn index(self) -> Result<usize, RuleError> {
        if !self.is_valid() {
            return Err(RuleError::InvalidCoordinate);
        }
        Ok(((self.y - 1) * 3 + (self.x - 1)) as usize)
    }

    /// Creates a sub-coordinate from a row-major grid index.
    pub fn from_index(index: usize) -> Option<Self> {
        Self::ALL.get(index).copied()
    }
}

impl std::fmt::Display for SubCoordinate {
    fn fmt(&self, f: &mut std::fmt::Formatter<'_>) -> std::fmt::Result {
        write!(f, "({}, {})", self.x, self.y)
    }
}

/// One playable square: a sub-board selected by `game_square`, and a cell
/// within it selected by `subgrid_square`.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Hash, PartialOrd, Ord, Serialize, Deserialize)]
#[serde(rename_all = "camelCase")]
pub struct Coordinate {
    /// The sub-board on the meta-board.
    pub game_square: SubCoordinate,
    /// The cell within that sub-board.
    pub subgrid_square: SubCoordinate,
}

impl Coordinate {
    /// Creates a coordinate from four 1-based components.
    pub const fn new(game_x: i32, game_y: i32, sub_x: i32, sub_y: i32) -> Self {
        Self {
            game_square: SubCoordinate::new(game_x, game_y),
            subgrid_square: SubCoordinate::new(sub_x, sub_y),
        }
    }

    /// Returns true if both halves are in range.
    pub fn is_valid(self) -> bool {
        self.game_square.is_valid() && self.subgrid_square.is_valid()
    }

    /// Converts to a `(block, cell)` index pair.
    ///
    /// # Errors
    ///
    /// Returns [`RuleError::InvalidCoordinate`] if any component is out of range.
    pub fn indices(self) -> Result<(usize, usize), RuleError> {
        Ok((self.game_square.index()?, self.subgrid_square.index()?))
    }

    /// Iterates all 81 coordinates in board-string order: meta-row, cell-row,
    /// meta-column, cell-column.
    pub fn all() -> impl Iterator<Item = Coordinate> {
        (1..=3).flat_map(|game_y| {
            (1..=3).flat_map(move |sub_y| {
                (1..=3).flat_map(move |game_x| {
                    (1..=3).map(move |sub_x| Coordinate::new(game_x, game_y, sub_x, sub_y))
                })
            })
        })
    }
}

impl std::fmt::Display for Coordinate {
    fn fmt(&self, f: &mut std::fmt::Formatter<'_>) -> std::fmt::Result {
        write!(f, "{} / {}", self.game_square, self.subgrid_square)
    }
}
