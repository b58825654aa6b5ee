//! Synchronous database repository for players and games.

use diesel::prelude::*;
use diesel_migrations::{EmbeddedMigrations, MigrationHarness, embed_migrations};
use tracing::{debug, info, instrument};

use crate::db::{MatchRecord, MatchUpdate, NewMatch, NewUser, StoreError, User, schema};

/// Migrations compiled into the binary.
pub const MIGRATIONS: EmbeddedMigrations = embed_migrations!("migrations");

/// Database repository for player and game operations.
///
/// Each call opens its own connection, so the path must name a file. An
/// in-memory database would vanish between calls.
#[derive(Debug, Clone)]
pub struct GameRepository {
    db_path: String,
}

impl GameRepository {
    /// Creates a new repository for the database at the given path.
    ///
    /// # Errors
    ///
    /// Returns [`StoreError`] if the path is empty.
    #[instrument(skip(db_path), fields(db_path = %db_path))]
    pub fn new(db_path: String) -> Result<Self, StoreError> {
        if db_path.is_empty() {
            return Err(StoreError::new("Database path is empty"));
        }
        info!(path = %db_path, "Creating GameRepository");
        Ok(Self { db_path })
    }

    /// Establishes a database connection.
    #[instrument(skip(self))]
    fn connection(&self) -> Result<SqliteConnection, StoreError> {
        debug!(path = %self.db_path, "Establishing connection");
        SqliteConnection::establish(&self.db_path).map_err(|e| {
            StoreError::new(format!("Failed to connect to '{}': {}", self.db_path, e))
        })
    }

    /// Applies any migrations not yet run against this database.
    ///
    /// # Errors
    ///
    /// Returns [`StoreError`] if a migration fails.
    #[instrument(skip(self))]
    pub fn run_migrations(&self) -> Result<(), StoreError> {
        let mut conn = self.connection()?;
        let applied = conn
            .run_pending_migrations(MIGRATIONS)
            .map_err(|e| StoreError::new(format!("Migration failed: {}", e)))?;
        info!(count = applied.len(), "Migrations applied");
        Ok(())
    }

    /// Returns the player with this login identity, creating one if needed.
    ///
    /// New players get a random id and a username equal to their identity.
    ///
    /// # Errors
    ///
    /// Returns [`StoreError`] if a database error occurs.
    #[instrument(skip(self))]
    pub fn lookup_or_create_user(&self, identity: &str) -> Result<User, StoreError> {
        let mut conn = self.connection()?;

        let user = conn.immediate_transaction(|conn| {
            let existing = schema::users::table
                .filter(schema::users::identity.eq(identity))
                .select(User::as_select())
                .first(conn)
                .optional()?;
            if let Some(user) = existing {
                debug!(user_id = %user.id(), "User found");
                return Ok::<_, diesel::result::Error>(user);
            }

            let new_user = NewUser::new(
                uuid::Uuid::new_v4().to_string(),
                identity.to_string(),
                identity.to_string(),
            );
            let user = diesel::insert_into(schema::users::table)
                .values(&new_user)
                .returning(User::as_returning())
                .get_result(conn)?;
            info!(user_id = %user.id(), username = %user.username(), "User created");
            Ok(user)
        })?;

        Ok(user)
    }

    /// Gets a player by id. Returns `None` if not found.
    ///
    /// # Errors
    ///
    /// Returns [`StoreError`] if a database error occurs.
    #[instrument(skip(self))]
    pub fn get_user(&self, user_id: &str) -> Result<Option<User>, StoreError> {
        let mut conn = self.connection()?;
        let user = schema::users::table
            .find(user_id)
            .select(User::as_select())
            .first(&mut conn)
            .optional()?;
        Ok(user)
    }

    /// Gets a player by username. Returns `None` if not found.
    ///
    /// # Errors
    ///
    /// Returns [`StoreError`] if a database error occurs.
    #[instrument(skip(self))]
    pub fn get_user_by_username(&self, username: &str) -> Result<Option<User>, StoreError> {
        let mut conn = self.connection()?;
        let user = schema::users::table
            .filter(schema::users::username.eq(username))
            .select(User::as_select())
            .first(&mut conn)
            .optional()?;
        Ok(user)
    }

    /// Lists the ids of every game the player takes part in, oldest first.
    ///
    /// # Errors
    ///
    /// Returns [`StoreError`] if a database error occurs.
    #[instrument(skip(self))]
    pub fn list_match_ids(&self, user_id: &str) -> Result<Vec<i32>, StoreError> {
        let mut conn = self.connection()?;
        let ids = schema::matches::table
            .filter(
                schema::matches::user_x
                    .eq(user_id)
                    .or(schema::matches::user_o.eq(user_id)),
            )
            .order(schema::matches::id.asc())
            .select(schema::matches::id)
            .load::<i32>(&mut conn)?;
        debug!(count = ids.len(), "Match ids loaded");
        Ok(ids)
    }

    /// Gets a game row by id. Returns `None` if not found.
    ///
    /// # Errors
    ///
    /// Returns [`StoreError`] if a database error occurs.
    #[instrument(skip(self))]
    pub fn get_match(&self, match_id: i32) -> Result<Option<MatchRecord>, StoreError> {
        let mut conn = self.connection()?;
        let record = schema::matches::table
            .find(match_id)
            .select(MatchRecord::as_select())
            .first(&mut conn)
            .optional()?;
        Ok(record)
    }

    /// Inserts a game row and returns it with its assigned id.
    ///
    /// # Errors
    ///
    /// Returns [`StoreError`] if a database error occurs.
    #[instrument(skip(self, new_match), fields(user_x = %new_match.user_x(), user_o = %new_match.user_o()))]
    pub fn create_match(&self, new_match: NewMatch) -> Result<MatchRecord, StoreError> {
        let mut conn = self.connection()?;
        let record = diesel::insert_into(schema::matches::table)
            .values(&new_match)
            .returning(MatchRecord::as_returning())
            .get_result(&mut conn)?;
        info!(match_id = record.id(), "Match created");
        Ok(record)
    }

    /// Overwrites a game row.
    ///
    /// # Errors
    ///
    /// Returns [`StoreError`] if the row does not exist or a database error occurs.
    #[instrument(skip(self, update), fields(finished = update.finished()))]
    pub fn update_match(&self, match_id: i32, update: MatchUpdate) -> Result<(), StoreError> {
        let mut conn = self.connection()?;
        let rows = diesel::update(schema::matches::table.find(match_id))
            .set(&update)
            .execute(&mut conn)?;
        if rows == 0 {
            return Err(StoreError::new(format!("Match {} not found", match_id)));
        }
        debug!(match_id, "Match updated");
        Ok(())
    }
}
