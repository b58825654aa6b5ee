//! In-memory [`GameStore`] for tests and embedding.

use std::collections::BTreeMap;

use tokio::sync::Mutex;
use tracing::{debug, instrument};
use uttt_rules::{Game, SavedGame};

use crate::db::{GameId, GameStore, PlayerProfile, StoreError};

#[derive(Debug, Clone)]
struct StoredGame {
    game: SavedGame,
    saves: usize,
}

#[derive(Debug, Default)]
struct MemoryState {
    players: Vec<PlayerProfile>,
    games: BTreeMap<GameId, StoredGame>,
    last_id: GameId,
}

/// [`GameStore`] that keeps everything in process memory.
///
/// Counts saves per game so callers can observe flush behaviour.
#[derive(Debug, Default)]
pub struct MemoryStore {
    state: Mutex<MemoryState>,
}

impl MemoryStore {
    /// Creates an empty store.
    pub fn new() -> Self {
        Self::default()
    }

    /// Number of times `save_game` succeeded for this game.
    pub async fn save_count(&self, game_id: GameId) -> usize {
        let state = self.state.lock().await;
        state.games.get(&game_id).map_or(0, |stored| stored.saves)
    }

    /// The stored copy of a game, as last written.
    pub async fn stored_game(&self, game_id: GameId) -> Option<SavedGame> {
        let state = self.state.lock().await;
        state.games.get(&game_id).map(|stored| stored.game.clone())
    }
}

#[async_trait::async_trait]
impl GameStore for MemoryStore {
    #[instrument(skip(self))]
    async fn lookup_or_create_player(&self, identity: &str) -> Result<PlayerProfile, StoreError> {
        let mut state = self.state.lock().await;
        if let Some(profile) = state.players.iter().find(|p| p.identity() == identity) {
            return Ok(profile.clone());
        }

        let profile = PlayerProfile::new(
            uuid::Uuid::new_v4().to_string(),
            identity.to_string(),
            identity.to_string(),
        );
        debug!(player_id = %profile.id(), "Player created");
        state.players.push(profile.clone());
        Ok(profile)
    }

    async fn find_player(&self, player_id: &str) -> Result<Option<PlayerProfile>, StoreError> {
        let state = self.state.lock().await;
        Ok(state.players.iter().find(|p| p.id() == player_id).cloned())
    }

    async fn find_player_by_username(
        &self,
        username: &str,
    ) -> Result<Option<PlayerProfile>, StoreError> {
        let state = self.state.lock().await;
        Ok(state
            .players
            .iter()
            .find(|p| p.username() == username)
            .cloned())
    }

    async fn list_game_ids(&self, player_id: &str) -> Result<Vec<GameId>, StoreError> {
        let state = self.state.lock().await;
        Ok(state
            .games
            .iter()
            .filter(|(_, stored)| {
                stored.game.player_x == player_id || stored.game.player_o == player_id
            })
            .map(|(id, _)| *id)
            .collect())
    }

    async fn load_game(&self, game_id: GameId) -> Result<SavedGame, StoreError> {
        let state = self.state.lock().await;
        state
            .games
            .get(&game_id)
            .map(|stored| stored.game.clone())
            .ok_or_else(|| StoreError::new(format!("Game {} not found", game_id)))
    }

    #[instrument(skip(self, game))]
    async fn save_game(&self, game_id: GameId, game: &SavedGame) -> Result<(), StoreError> {
        // Reject what the SQLite store would reject.
        Game::from_saved(game)?;

        let mut state = self.state.lock().await;
        let stored = state
            .games
            .get_mut(&game_id)
            .ok_or_else(|| StoreError::new(format!("Game {} not found", game_id)))?;
        stored.game = game.clone();
        stored.saves += 1;
        debug!(saves = stored.saves, "Game saved");
        Ok(())
    }

    #[instrument(skip(self, board))]
    async fn create_game_record(
        &self,
        player_x: &str,
        player_o: &str,
        board: &str,
    ) -> Result<GameId, StoreError> {
        let mut state = self.state.lock().await;
        state.last_id += 1;
        let game_id = state.last_id;
        state.games.insert(
            game_id,
            StoredGame {
                game: SavedGame {
                    player_x: player_x.to_string(),
                    player_o: player_o.to_string(),
                    board: board.to_string(),
                    last_move: None,
                },
                saves: 0,
            },
        );
        Ok(game_id)
    }
}
