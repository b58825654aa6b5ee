//! Persistence for players and games.

mod error;
mod memory;
mod models;
mod repository;
mod schema;
mod sqlite;
mod store;

pub use error::StoreError;
pub use memory::MemoryStore;
pub use models::{MatchRecord, MatchUpdate, NewMatch, NewUser, User};
pub use repository::{GameRepository, MIGRATIONS};
pub use sqlite::SqliteStore;
pub use store::{GameId, GameStore, PlayerProfile};
