//! Pure ultimate tic-tac-toe rules.
//!
//! Nine 3x3 sub-boards sit on a 3x3 meta-board. The cell a player claims
//! decides which sub-board the opponent must play in next, unless that
//! sub-board is already decided. Winning a sub-board claims the matching
//! meta-board square; three claimed meta-squares in a line win the game.
//!
//! [`Game`] is a single-threaded state machine with no I/O. Concurrency and
//! persistence live in the server crate.
//!
//! # Example
//!
//! ```
//! use uttt_rules::{Coordinate, Game, Move, RuleError};
//!
//! let mut game = Game::new("alice", "bob")?;
//! game.play_move(&Move::new("alice", Coordinate::new(1, 1, 2, 2)))?;
//!
//! // Bob is sent to sub-board (2, 2).
//! let wrong = game.play_move(&Move::new("bob", Coordinate::new(1, 1, 1, 1)));
//! assert_eq!(wrong, Err(RuleError::WrongSubgrid));
//! # Ok::<(), RuleError>(())
//! ```

#![warn(missing_docs)]

mod action;
mod board;
mod position;
mod rules;
mod types;

pub use action::{Move, RuleError};
pub use position::{Coordinate, SubCoordinate};
pub use rules::{BOARD_SQUARES, Game, SavedGame};
pub use types::{Mark, Owner, SquareState, TIE_PLAYER};
