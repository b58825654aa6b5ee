//! Ultimate tic-tac-toe session server.
//!
//! The rules live in [`uttt_rules`]. This crate keeps live games shared
//! between any number of connections and persists them.
//!
//! # Architecture
//!
//! - **Session**: one live game behind a lock, broadcasting changes
//! - **SessionManager**: registry of resident sessions with reference counts,
//!   load-on-demand, idle flushing and eviction
//! - **FanIn**: per-connection task merging many subscriptions into one stream
//! - **PlayerConnection**: the driver a transport wraps around all of the above
//! - **GameStore**: persistence contract, with SQLite and in-memory stores
//!
//! # Example
//!
//! ```no_run
//! use std::sync::Arc;
//! use uttt::{Coordinate, MemoryStore, PlayerConnection, SessionManager};
//!
//! # async fn example() -> anyhow::Result<()> {
//! let manager = SessionManager::new(Arc::new(MemoryStore::new()), uttt::DEFAULT_FLUSH_INTERVAL);
//! let alice = manager.lookup_or_create_player("alice").await?;
//! let bob = manager.lookup_or_create_player("bob").await?;
//! let game_id = manager.create_game(alice.id(), bob.id()).await?;
//!
//! let mut connection = PlayerConnection::open(manager.clone(), alice.id()).await?;
//! connection.play_move(game_id, Coordinate::new(2, 2, 2, 2)).await?;
//! let update = connection.next_event().await?;
//! connection.close().await?;
//! # let _ = update;
//! # Ok(())
//! # }
//! ```

#![warn(missing_docs)]
#![forbid(unsafe_code)]

mod config;
mod connection;
mod db;
mod error;
mod fanin;
mod manager;
mod session;

pub use config::{CONFIG_FILE_ENV, ConfigError, ServerConfig};
pub use connection::{ConnectionEvent, PlayerConnection};
pub use db::{
    GameId, GameRepository, GameStore, MIGRATIONS, MatchRecord, MatchUpdate, MemoryStore,
    NewMatch, NewUser, PlayerProfile, SqliteStore, StoreError, User,
};
pub use error::SessionError;
pub use fanin::{Detached, FanIn, FanInEvent};
pub use manager::{DEFAULT_FLUSH_INTERVAL, NewGame, NewGameReceiver, OpenGames, SessionManager};
pub use session::{
    GameView, GridView, PlayerView, Session, SquareView, Subscription, SubscriptionId,
};

pub use uttt_rules::{Coordinate, Game, Mark, Move, Owner, RuleError, SavedGame, SubCoordinate};
