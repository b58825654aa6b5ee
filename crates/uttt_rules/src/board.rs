//! The fixed two-level board: a meta-board of nine sub-boards of nine cells.

use crate::SquareState;

/// Winning lines of a 3x3 grid as row-major indices.
const LINES: [[usize; 3]; 8] = [
    // Rows
    [0, 1, 2],
    [3, 4, 5],
    [6, 7, 8],
    // Columns
    [0, 3, 6],
    [1, 4, 7],
    [2, 5, 8],
    // Diagonals
    [0, 4, 8],
    [2, 4, 6],
];

/// Summarizes nine states the way a grid is decided: the first line of three
/// identical decided states wins, a grid with no open state left is a tie,
/// and anything else is still in progress.
///
/// The same rule applies to cells within a sub-board and to sub-boards within
/// the meta-board.
pub(crate) fn summarize(states: &[SquareState; 9]) -> SquareState {
    for [a, b, c] in LINES {
        let first = states[a];
        if first.is_decided() && first == states[b] && first == states[c] {
            return first;
        }
    }

    if states.iter().all(|s| s.is_decided()) {
        SquareState::Tie
    } else {
        SquareState::InProgress
    }
}

/// One sub-board: its own state plus nine cells.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Default)]
pub(crate) struct Block {
    pub(crate) state: SquareState,
    pub(crate) cells: [SquareState; 9],
}

impl Block {
    /// Re-derives this block's state unless it is already decided.
    pub(crate) fn refresh(&mut self) {
        if !self.state.is_decided() {
            self.state = summarize(&self.cells);
        }
    }
}

/// The meta-board: the game's own state plus nine blocks.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Default)]
pub(crate) struct Board {
    pub(crate) state: SquareState,
    pub(crate) blocks: [Block; 9],
}

impl Board {
    /// Re-derives the game state from the blocks unless already decided.
    pub(crate) fn refresh(&mut self) {
        if !self.state.is_decided() {
            let block_states = self.blocks.map(|block| block.state);
            self.state = summarize(&block_states);
        }
    }

    /// Recomputes every grid bottom-up from the cells alone.
    pub(crate) fn recompute(&mut self) {
        for block in &mut self.blocks {
            block.state = SquareState::InProgress;
            block.refresh();
        }
        self.state = SquareState::InProgress;
        self.refresh();
    }

    pub(crate) fn cell(&self, block: usize, cell: usize) -> SquareState {
        self.blocks[block].cells[cell]
    }
}
