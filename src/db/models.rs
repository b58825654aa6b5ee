//! Database models and their conversions to game types.

use chrono::NaiveDateTime;
use derive_getters::Getters;
use derive_new::new;
use diesel::prelude::*;
use tracing::instrument;
use uttt_rules::{Coordinate, Game, SavedGame};

use crate::db::{PlayerProfile, StoreError, schema};

/// Player row.
#[derive(Debug, Clone, Queryable, Identifiable, Selectable, Getters)]
#[diesel(table_name = schema::users)]
pub struct User {
    id: String,
    username: String,
    identity: String,
    created_at: NaiveDateTime,
}

impl From<User> for PlayerProfile {
    fn from(user: User) -> Self {
        PlayerProfile::new(user.id, user.username, user.identity)
    }
}

/// Insertable player row.
#[derive(Debug, Clone, Insertable, new)]
#[diesel(table_name = schema::users)]
pub struct NewUser {
    id: String,
    username: String,
    identity: String,
}

/// Game row.
#[derive(Debug, Clone, Queryable, Identifiable, Selectable, Getters)]
#[diesel(table_name = schema::matches)]
pub struct MatchRecord {
    id: i32,
    game_data: String,
    user_x: String,
    user_o: String,
    victor: Option<String>,
    last_move_game_x: Option<i32>,
    last_move_game_y: Option<i32>,
    last_move_subgrid_x: Option<i32>,
    last_move_subgrid_y: Option<i32>,
    finished: bool,
    created_at: NaiveDateTime,
    updated_at: NaiveDateTime,
}

impl MatchRecord {
    /// Reassembles the last move from its four columns.
    ///
    /// # Errors
    ///
    /// Returns [`StoreError`] if only some of the columns are set.
    #[instrument(skip(self), fields(match_id = self.id))]
    pub fn last_move(&self) -> Result<Option<Coordinate>, StoreError> {
        match (
            self.last_move_game_x,
            self.last_move_game_y,
            self.last_move_subgrid_x,
            self.last_move_subgrid_y,
        ) {
            (Some(gx), Some(gy), Some(sx), Some(sy)) => Ok(Some(Coordinate::new(gx, gy, sx, sy))),
            (None, None, None, None) => Ok(None),
            _ => Err(StoreError::new(format!(
                "Match {} has a partial last move",
                self.id
            ))),
        }
    }

    /// Converts the row into a restorable game.
    ///
    /// # Errors
    ///
    /// Returns [`StoreError`] if the last move columns are inconsistent.
    pub fn to_saved(&self) -> Result<SavedGame, StoreError> {
        Ok(SavedGame {
            player_x: self.user_x.clone(),
            player_o: self.user_o.clone(),
            board: self.game_data.clone(),
            last_move: self.last_move()?,
        })
    }
}

/// Insertable game row.
#[derive(Debug, Clone, Insertable, new, Getters)]
#[diesel(table_name = schema::matches)]
pub struct NewMatch {
    game_data: String,
    user_x: String,
    user_o: String,
}

/// Full update of a game row, including the derived `victor` and `finished`.
#[derive(Debug, Clone, AsChangeset, Getters)]
#[diesel(table_name = schema::matches, treat_none_as_null = true)]
pub struct MatchUpdate {
    game_data: String,
    user_x: String,
    user_o: String,
    victor: Option<String>,
    last_move_game_x: Option<i32>,
    last_move_game_y: Option<i32>,
    last_move_subgrid_x: Option<i32>,
    last_move_subgrid_y: Option<i32>,
    finished: bool,
    updated_at: NaiveDateTime,
}

impl MatchUpdate {
    /// Builds an update from a saved game, deriving the victor by loading it.
    ///
    /// # Errors
    ///
    /// Returns [`StoreError`] if the saved game does not load.
    #[instrument(skip(saved), fields(player_x = %saved.player_x, player_o = %saved.player_o))]
    pub fn from_saved(saved: &SavedGame) -> Result<Self, StoreError> {
        let game = Game::from_saved(saved)?;
        let last = saved.last_move;

        Ok(Self {
            game_data: saved.board.clone(),
            user_x: saved.player_x.clone(),
            user_o: saved.player_o.clone(),
            victor: game.game_winner().to_option(),
            last_move_game_x: last.map(|c| c.game_square.x),
            last_move_game_y: last.map(|c| c.game_square.y),
            last_move_subgrid_x: last.map(|c| c.subgrid_square.x),
            last_move_subgrid_y: last.map(|c| c.subgrid_square.y),
            finished: game.is_completed(),
            updated_at: chrono::Utc::now().naive_utc(),
        })
    }
}
