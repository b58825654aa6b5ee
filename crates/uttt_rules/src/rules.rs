//! Game logic and rules for ultimate tic-tac-toe.

use serde::{Deserialize, Serialize};
use tracing::{debug, instrument};

use crate::board::Board;
use crate::{Coordinate, Mark, Move, Owner, RuleError, SquareState, SubCoordinate};

/// Number of squares on the full board.
pub const BOARD_SQUARES: usize = 81;

/// Everything needed to restore a game exactly.
#[derive(Debug, Clone, PartialEq, Eq, Serialize, Deserialize)]
#[serde(rename_all = "camelCase")]
pub struct SavedGame {
    /// Id of the player moving first.
    pub player_x: String,
    /// Id of the player moving second.
    pub player_o: String,
    /// 81 characters over `_XO` laid out as the visual 9x9 board.
    pub board: String,
    /// The most recent move, if any move has been made.
    pub last_move: Option<Coordinate>,
}

/// The previous move together with the side that made it.
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
struct LastMove {
    coordinate: Coordinate,
    mark: Mark,
}

/// Ultimate tic-tac-toe game engine.
#[derive(Debug, Clone, PartialEq, Eq)]
pub struct Game {
    player_x: String,
    player_o: String,
    last_move: Option<LastMove>,
    board: Board,
}

impl Game {
    /// Creates a game with an empty board.
    ///
    /// # Errors
    ///
    /// Returns [`RuleError::InvalidPlayer`] if both ids are equal.
    #[instrument(skip(player_x, player_o))]
    pub fn new(player_x: impl Into<String>, player_o: impl Into<String>) -> Result<Self, RuleError> {
        let player_x = player_x.into();
        let player_o = player_o.into();
        if player_x == player_o {
            return Err(RuleError::InvalidPlayer);
        }

        Ok(Self {
            player_x,
            player_o,
            last_move: None,
            board: Board::default(),
        })
    }

    /// Restores a game from a board string and optional last move.
    ///
    /// Characters other than `_`, `X` and `O` are stripped first, so boards may
    /// be written as nine indented lines. Cells are written directly (not
    /// replayed as moves) and every grid is then recomputed bottom-up.
    ///
    /// # Errors
    ///
    /// - [`RuleError::InvalidInput`] if the stripped board is not 81 characters.
    /// - [`RuleError::InvalidPlayer`] if both ids are equal.
    /// - [`RuleError::InvalidCoordinate`] if `last_move` is out of range.
    /// - [`RuleError::InvalidLastMove`] if `last_move` points at an unplayed square.
    #[instrument(skip(player_x, player_o, board))]
    pub fn load(
        player_x: impl Into<String>,
        player_o: impl Into<String>,
        board: &str,
        last_move: Option<Coordinate>,
    ) -> Result<Self, RuleError> {
        let symbols: Vec<char> = board
            .chars()
            .filter(|c| matches!(c, '_' | 'X' | 'O'))
            .collect();
        if symbols.len() != BOARD_SQUARES {
            debug!(len = symbols.len(), "Board string has wrong length");
            return Err(RuleError::InvalidInput);
        }

        let mut game = Self::new(player_x, player_o)?;

        for (coordinate, symbol) in Coordinate::all().zip(symbols) {
            let state = match symbol {
                'X' => SquareState::Owned(Mark::X),
                'O' => SquareState::Owned(Mark::O),
                _ => continue,
            };
            let (block, cell) = coordinate.indices()?;
            game.board.blocks[block].cells[cell] = state;
        }
        game.board.recompute();

        if let Some(coordinate) = last_move {
            let (block, cell) = coordinate.indices()?;
            let mark = game
                .board
                .cell(block, cell)
                .mark()
                .ok_or(RuleError::InvalidLastMove)?;
            game.last_move = Some(LastMove { coordinate, mark });
        }

        Ok(game)
    }

    /// Restores a game from [`Game::save`] output.
    ///
    /// # Errors
    ///
    /// See [`Game::load`].
    pub fn from_saved(saved: &SavedGame) -> Result<Self, RuleError> {
        Self::load(
            saved.player_x.clone(),
            saved.player_o.clone(),
            &saved.board,
            saved.last_move,
        )
    }

    /// Serializes the game for an exact round-trip through [`Game::load`].
    pub fn save(&self) -> SavedGame {
        SavedGame {
            player_x: self.player_x.clone(),
            player_o: self.player_o.clone(),
            board: self.board_string(),
            last_move: self.last_move.map(|last| last.coordinate),
        }
    }

    /// Applies a move after validating it.
    ///
    /// # Errors
    ///
    /// Checks run in order and the first failure is returned:
    /// [`RuleError::InvalidPlayer`], [`RuleError::GameCompleted`],
    /// [`RuleError::WrongTurn`], [`RuleError::InvalidCoordinate`],
    /// [`RuleError::WrongSubgrid`] (forced sub-board, then decided target),
    /// [`RuleError::SquarePlayed`]. A failed move leaves the game unchanged.
    #[instrument(skip(self, mv), fields(player = %mv.player_id, coordinate = %mv.coordinate))]
    pub fn play_move(&mut self, mv: &Move) -> Result<(), RuleError> {
        let mark = self.mark_of(&mv.player_id).ok_or(RuleError::InvalidPlayer)?;
        let (block, cell) = self.verify(mark, mv.coordinate)?;

        self.board.blocks[block].cells[cell] = SquareState::Owned(mark);
        self.last_move = Some(LastMove {
            coordinate: mv.coordinate,
            mark,
        });

        self.board.blocks[block].refresh();
        self.board.refresh();

        debug!(
            block_state = ?self.board.blocks[block].state,
            game_state = ?self.board.state,
            "Move applied"
        );
        Ok(())
    }

    /// Every coordinate at which `player_id` could legally move right now.
    ///
    /// Returns an empty list for an unknown player.
    #[instrument(skip(self))]
    pub fn valid_moves(&self, player_id: &str) -> Vec<Coordinate> {
        let Some(mark) = self.mark_of(player_id) else {
            return Vec::new();
        };
        Coordinate::all()
            .filter(|coordinate| self.verify(mark, *coordinate).is_ok())
            .collect()
    }

    /// Owner of the sub-board at `block`.
    ///
    /// # Errors
    ///
    /// Returns [`RuleError::InvalidCoordinate`] if out of range.
    pub fn block_winner(&self, block: SubCoordinate) -> Result<Owner, RuleError> {
        let index = block.index()?;
        Ok(self.owner(self.board.blocks[index].state))
    }

    /// Owner of a single square.
    ///
    /// # Errors
    ///
    /// Returns [`RuleError::InvalidCoordinate`] if out of range.
    pub fn square_owner(&self, coordinate: Coordinate) -> Result<Owner, RuleError> {
        let (block, cell) = coordinate.indices()?;
        Ok(self.owner(self.board.cell(block, cell)))
    }

    /// Owner of the whole game.
    pub fn game_winner(&self) -> Owner {
        self.owner(self.board.state)
    }

    /// Returns true once the game has been won or tied.
    pub fn is_completed(&self) -> bool {
        self.board.state.is_decided()
    }

    /// Resolves a player id to its side. `None` means the id is not part of
    /// this game.
    pub fn mark_of(&self, player_id: &str) -> Option<Mark> {
        if player_id == self.player_x {
            Some(Mark::X)
        } else if player_id == self.player_o {
            Some(Mark::O)
        } else {
            None
        }
    }

    /// Id of the player moving first.
    pub fn player_x(&self) -> &str {
        &self.player_x
    }

    /// Id of the player moving second.
    pub fn player_o(&self) -> &str {
        &self.player_o
    }

    /// Id of the player holding `mark`.
    pub fn player_id(&self, mark: Mark) -> &str {
        match mark {
            Mark::X => &self.player_x,
            Mark::O => &self.player_o,
        }
    }

    /// The most recent move's coordinate.
    pub fn last_move(&self) -> Option<Coordinate> {
        self.last_move.map(|last| last.coordinate)
    }

    /// The side to move, or `None` once the game is over.
    pub fn to_move(&self) -> Option<Mark> {
        if self.is_completed() {
            return None;
        }
        Some(self.last_move.map_or(Mark::X, |last| last.mark.opponent()))
    }

    /// Validates a move for `mark` and returns the target `(block, cell)`.
    fn verify(&self, mark: Mark, coordinate: Coordinate) -> Result<(usize, usize), RuleError> {
        if self.is_completed() {
            return Err(RuleError::GameCompleted);
        }

        let expected = self.last_move.map_or(Mark::X, |last| last.mark.opponent());
        if mark != expected {
            return Err(RuleError::WrongTurn);
        }

        let (block, cell) = coordinate.indices()?;

        // The previous cell picks the sub-board, unless that one is decided.
        if let Some(last) = self.last_move {
            let forced = last.coordinate.subgrid_square;
            let forced_index = forced.index()?;
            if !self.board.blocks[forced_index].state.is_decided()
                && forced != coordinate.game_square
            {
                return Err(RuleError::WrongSubgrid);
            }
        }

        if self.board.blocks[block].state.is_decided() {
            return Err(RuleError::WrongSubgrid);
        }

        if self.board.cell(block, cell).is_decided() {
            return Err(RuleError::SquarePlayed);
        }

        Ok((block, cell))
    }

    fn owner(&self, state: SquareState) -> Owner {
        match state {
            SquareState::InProgress => Owner::Undecided,
            SquareState::Tie => Owner::Tie,
            SquareState::Owned(mark) => Owner::Player(self.player_id(mark).to_string()),
        }
    }

    fn board_string(&self) -> String {
        Coordinate::all()
            .map(|coordinate| {
                // Coordinate::all only yields in-range coordinates.
                let state = coordinate
                    .indices()
                    .map(|(block, cell)| self.board.cell(block, cell))
                    .unwrap_or_default();
                match state.mark() {
                    Some(mark) => mark.symbol(),
                    None => '_',
                }
            })
            .collect()
    }
}

impl std::fmt::Display for Game {
    fn fmt(&self, f: &mut std::fmt::Formatter<'_>) -> std::fmt::Result {
        let board = self.board_string();
        let chars: Vec<char> = board.chars().collect();
        for (row, line) in chars.chunks(9).enumerate() {
            if row > 0 && row % 3 == 0 {
                writeln!(f, "---+---+---")?;
            }
            for (col, symbol) in line.iter().enumerate() {
                if col > 0 && col % 3 == 0 {
                    write!(f, "|")?;
                }
                write!(f, "{}", symbol)?;
            }
            writeln!(f)?;
        }
        Ok(())
    }
}
