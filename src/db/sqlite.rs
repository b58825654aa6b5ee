//! SQLite-backed [`GameStore`].

use tracing::{info, instrument};
use uttt_rules::SavedGame;

use crate::db::{
    GameId, GameRepository, GameStore, MatchUpdate, NewMatch, PlayerProfile, StoreError,
};

/// [`GameStore`] over a SQLite file.
///
/// Diesel is synchronous, so every call runs on the blocking pool.
#[derive(Debug, Clone)]
pub struct SqliteStore {
    repository: GameRepository,
}

impl SqliteStore {
    /// Opens the database at `db_path`, creating and migrating it as needed.
    ///
    /// # Errors
    ///
    /// Returns [`StoreError`] if the database cannot be opened or migrated.
    #[instrument(skip(db_path))]
    pub async fn open(db_path: impl Into<String>) -> Result<Self, StoreError> {
        let repository = GameRepository::new(db_path.into())?;
        let store = Self { repository };
        store.run(|repo| repo.run_migrations()).await?;
        info!("SQLite store ready");
        Ok(store)
    }

    async fn run<T, F>(&self, f: F) -> Result<T, StoreError>
    where
        T: Send + 'static,
        F: FnOnce(&GameRepository) -> Result<T, StoreError> + Send + 'static,
    {
        let repository = self.repository.clone();
        tokio::task::spawn_blocking(move || f(&repository)).await?
    }
}

#[async_trait::async_trait]
impl GameStore for SqliteStore {
    async fn lookup_or_create_player(&self, identity: &str) -> Result<PlayerProfile, StoreError> {
        let identity = identity.to_string();
        let user = self
            .run(move |repo| repo.lookup_or_create_user(&identity))
            .await?;
        Ok(user.into())
    }

    async fn find_player(&self, player_id: &str) -> Result<Option<PlayerProfile>, StoreError> {
        let player_id = player_id.to_string();
        let user = self.run(move |repo| repo.get_user(&player_id)).await?;
        Ok(user.map(PlayerProfile::from))
    }

    async fn find_player_by_username(
        &self,
        username: &str,
    ) -> Result<Option<PlayerProfile>, StoreError> {
        let username = username.to_string();
        let user = self
            .run(move |repo| repo.get_user_by_username(&username))
            .await?;
        Ok(user.map(PlayerProfile::from))
    }

    async fn list_game_ids(&self, player_id: &str) -> Result<Vec<GameId>, StoreError> {
        let player_id = player_id.to_string();
        self.run(move |repo| repo.list_match_ids(&player_id)).await
    }

    async fn load_game(&self, game_id: GameId) -> Result<SavedGame, StoreError> {
        let record = self.run(move |repo| repo.get_match(game_id)).await?;
        match record {
            Some(record) => record.to_saved(),
            None => Err(StoreError::new(format!("Game {} not found", game_id))),
        }
    }

    async fn save_game(&self, game_id: GameId, game: &SavedGame) -> Result<(), StoreError> {
        let update = MatchUpdate::from_saved(game)?;
        self.run(move |repo| repo.update_match(game_id, update))
            .await
    }

    async fn create_game_record(
        &self,
        player_x: &str,
        player_o: &str,
        board: &str,
    ) -> Result<GameId, StoreError> {
        let new_match = NewMatch::new(board.to_string(), player_x.to_string(), player_o.to_string());
        let record = self.run(move |repo| repo.create_match(new_match)).await?;
        Ok(*record.id())
    }
}
