//! The persistence contract the session manager depends on.

use derive_getters::Getters;
use derive_new::new;
use serde::{Deserialize, Serialize};
use uttt_rules::SavedGame;

use crate::db::StoreError;

/// Id assigned to a game by the store.
pub type GameId = i32;

/// A player's stable profile.
#[derive(Debug, Clone, PartialEq, Eq, Hash, Serialize, Deserialize, Getters, new)]
pub struct PlayerProfile {
    /// Opaque player id used in moves and game records.
    id: String,
    /// Display name.
    username: String,
    /// External login identity the profile was created for.
    identity: String,
}

/// Storage for players and games.
///
/// Implementations must be safe to share between tasks. Every failure is
/// returned to the caller.
#[async_trait::async_trait]
pub trait GameStore: Send + Sync + std::fmt::Debug {
    /// Returns the profile for a login identity, creating it on first use.
    async fn lookup_or_create_player(&self, identity: &str) -> Result<PlayerProfile, StoreError>;

    /// Looks up a profile by player id.
    async fn find_player(&self, player_id: &str) -> Result<Option<PlayerProfile>, StoreError>;

    /// Looks up a profile by username.
    async fn find_player_by_username(
        &self,
        username: &str,
    ) -> Result<Option<PlayerProfile>, StoreError>;

    /// Ids of every game the player takes part in, oldest first.
    async fn list_game_ids(&self, player_id: &str) -> Result<Vec<GameId>, StoreError>;

    /// Loads a game. Fails if the id is unknown.
    async fn load_game(&self, game_id: GameId) -> Result<SavedGame, StoreError>;

    /// Overwrites a game. Fails if the id is unknown.
    async fn save_game(&self, game_id: GameId, game: &SavedGame) -> Result<(), StoreError>;

    /// Creates a game record with no moves and returns its new id.
    async fn create_game_record(
        &self,
        player_x: &str,
        player_o: &str,
        board: &str,
    ) -> Result<GameId, StoreError>;
}
