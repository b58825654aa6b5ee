//! Moves and the errors produced when validating them.

use serde::{Deserialize, Serialize};
use tracing::instrument;

use crate::Coordinate;

/// A player's request to claim a square.
#[derive(Debug, Clone, PartialEq, Eq, Hash, Serialize, Deserialize)]
pub struct Move {
    /// Id of the player making the move.
    #[serde(rename = "playerID")]
    pub player_id: String,
    /// The square being claimed.
    pub coordinate: Coordinate,
}

impl Move {
    /// Creates a new move.
    #[instrument(skip(player_id))]
    pub fn new(player_id: impl Into<String>, coordinate: Coordinate) -> Self {
        Self {
            player_id: player_id.into(),
            coordinate,
        }
    }
}

impl std::fmt::Display for Move {
    fn fmt(&self, f: &mut std::fmt::Formatter<'_>) -> std::fmt::Result {
        write!(f, "{} -> {}", self.player_id, self.coordinate)
    }
}

/// A rule violation. Every variant is an expected, recoverable outcome of
/// validating caller input.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Hash, derive_more::Display, derive_more::Error)]
pub enum RuleError {
    /// The player id matches neither side, or both sides share one id.
    #[display("invalid player id")]
    InvalidPlayer,

    /// A coordinate component is outside 1..=3.
    #[display("coordinate out of bounds")]
    InvalidCoordinate,

    /// It is the other side's turn.
    #[display("not this player's turn")]
    WrongTurn,

    /// The target sub-board is not the one the previous move dictates, or it
    /// is already decided.
    #[display("incorrect subgrid")]
    WrongSubgrid,

    /// The target square is already taken.
    #[display("square already played")]
    SquarePlayed,

    /// A saved board string is malformed.
    #[display("invalid game state")]
    InvalidInput,

    /// A saved last move points at an unplayed square.
    #[display("invalid lastMove")]
    InvalidLastMove,

    /// The game already has a winner or ended in a tie.
    #[display("game already completed")]
    GameCompleted,
}

