//! Command-line interface for the `uttt` admin tool.

use std::path::PathBuf;

use clap::{Parser, Subcommand};

/// Ultimate tic-tac-toe server administration
#[derive(Parser, Debug)]
#[command(name = "uttt")]
#[command(about = "Manage ultimate tic-tac-toe players and games", long_about = None)]
#[command(version)]
pub struct Cli {
    /// Configuration file (overrides UTTT_CONFIG_FILE)
    #[arg(short, long, global = true)]
    pub config: Option<PathBuf>,

    /// Subcommand to run
    #[command(subcommand)]
    pub command: Command,
}

/// Available commands
#[derive(Subcommand, Debug)]
pub enum Command {
    /// Create or migrate the database
    Init,

    /// Look up a player by login identity, creating them if new
    Player {
        /// Login identity
        identity: String,
    },

    /// List a player's game ids
    Games {
        /// Player id
        player_id: String,
    },

    /// Create a game and print its id
    NewGame {
        /// Id of the player moving first
        player_x: String,
        /// Id of the player moving second
        player_o: String,
    },

    /// Print a game's board and view
    Show {
        /// Game id
        game_id: i32,

        /// Player whose legal moves to mark (defaults to X)
        #[arg(long)]
        viewer: Option<String>,
    },

    /// Play one move and persist it
    Play {
        /// Game id
        game_id: i32,
        /// Player id making the move
        player_id: String,
        /// Sub-board column (1-3)
        game_x: i32,
        /// Sub-board row (1-3)
        game_y: i32,
        /// Cell column within the sub-board (1-3)
        sub_x: i32,
        /// Cell row within the sub-board (1-3)
        sub_y: i32,
    },
}
