//! Core domain types for ultimate tic-tac-toe.

use serde::{Deserialize, Serialize};

/// Player id reported for a sub-board or game that ended in a tie.
pub const TIE_PLAYER: &str = "tie";

/// One of the two sides.
#[derive(
    Debug, Clone, Copy, PartialEq, Eq, Hash, Serialize, Deserialize, strum::Display, strum::EnumIter,
)]
pub enum Mark {
    /// Moves first.
    X,
    /// Moves second.
    O,
}

impl Mark {
    /// Returns the other side.
    pub fn opponent(self) -> Self {
        match self {
            Mark::X => Mark::O,
            Mark::O => Mark::X,
        }
    }

    /// Character used for this mark in a board string.
    pub fn symbol(self) -> char {
        match self {
            Mark::X => 'X',
            Mark::O => 'O',
        }
    }
}

/// State of a cell, a sub-board, or the whole game.
///
/// Once a state leaves `InProgress` it never changes.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Hash, Default, Serialize, Deserialize)]
pub enum SquareState {
    /// Unplayed cell, or an undecided grid.
    #[default]
    InProgress,
    /// Grid filled without a line.
    Tie,
    /// Played by, or won by, a side.
    Owned(Mark),
}

impl SquareState {
    /// Returns true unless the state is `InProgress`.
    pub fn is_decided(self) -> bool {
        self != SquareState::InProgress
    }

    /// Returns the owning mark, if any.
    pub fn mark(self) -> Option<Mark> {
        match self {
            SquareState::Owned(mark) => Some(mark),
            _ => None,
        }
    }
}

/// Result of an ownership query, translated to player identity.
#[derive(Debug, Clone, PartialEq, Eq, Hash, Serialize, Deserialize)]
pub enum Owner {
    /// Nobody owns it yet.
    Undecided,
    /// Decided without a winner.
    Tie,
    /// Owned by the player with this id.
    Player(String),
}

impl Owner {
    /// Returns the wire form: `""` when undecided, [`TIE_PLAYER`] for a tie,
    /// otherwise the player's id.
    pub fn as_id(&self) -> &str {
        match self {
            Owner::Undecided => "",
            Owner::Tie => TIE_PLAYER,
            Owner::Player(id) => id,
        }
    }

    /// Returns the wire form, or `None` when undecided.
    pub fn to_option(&self) -> Option<String> {
        match self {
            Owner::Undecided => None,
            other => Some(other.as_id().to_string()),
        }
    }

    /// Returns true unless undecided.
    pub fn is_decided(&self) -> bool {
        !matches!(self, Owner::Undecided)
    }
}

impl std::fmt::Display for Owner {
    fn fmt(&self, f: &mut std::fmt::Formatter<'_>) -> std::fmt::Result {
        match self {
            Owner::Undecided => write!(f, "(undecided)"),
            other => write!(f, "{}", other.as_id()),
        }
    }
}
