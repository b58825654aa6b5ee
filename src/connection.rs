//! Transport-facing driver for one player's connection.

use std::collections::{HashMap, VecDeque};
use std::sync::Arc;

use tracing::{debug, info, instrument, warn};
use uttt_rules::{Coordinate, Move};

use crate::SessionError;
use crate::db::GameId;
use crate::fanin::{Detached, FanIn, FanInEvent};
use crate::manager::{NewGame, SessionManager};
use crate::session::{GameView, Session, SubscriptionId};

/// Something to send to the client.
#[derive(Debug, Clone, PartialEq, Eq)]
pub enum ConnectionEvent {
    /// Fresh state of a game the connection holds.
    Update(GameView),
}

#[derive(Debug)]
struct HeldGame {
    session: Arc<Session>,
    subscription_id: SubscriptionId,
}

/// One player's open games, merged into a single event stream.
///
/// Call [`PlayerConnection::close`] when the transport goes away; dropping
/// the connection leaves its handles counted until the manager reclaims them.
#[derive(Debug)]
pub struct PlayerConnection {
    manager: SessionManager,
    player_id: String,
    games: HashMap<GameId, HeldGame>,
    pending: VecDeque<GameView>,
    fanin: FanIn,
}

impl PlayerConnection {
    /// Opens every game the player takes part in.
    ///
    /// The first events are one update per opened game.
    ///
    /// # Errors
    ///
    /// Returns [`SessionError::Store`] if the games cannot be opened.
    #[instrument(skip(manager, player_id), fields(player_id = %player_id.as_ref()))]
    pub async fn open(
        manager: SessionManager,
        player_id: impl AsRef<str>,
    ) -> Result<Self, SessionError> {
        let player_id = player_id.as_ref().to_string();
        let opened = manager.open_for_player(&player_id).await?;

        let mut connection = Self {
            manager,
            player_id,
            games: HashMap::new(),
            pending: VecDeque::new(),
            fanin: FanIn::new(),
        };

        for (session, subscription) in opened.games {
            let subscription_id = subscription.id();
            if let Err(subscription) = connection.fanin.add(subscription) {
                connection.manager.close(&session, subscription).await?;
                return Err(SessionError::FanInStopped);
            }
            connection
                .pending
                .push_back(session.view(&connection.player_id).await);
            connection.games.insert(
                session.game_id(),
                HeldGame {
                    session,
                    subscription_id,
                },
            );
        }

        if let Err(mut new_games) = connection.fanin.watch_new_games(opened.new_games) {
            new_games.close();
            while let Ok(NewGame {
                session,
                subscription,
            }) = new_games.try_recv()
            {
                connection.manager.close(&session, subscription).await?;
            }
            return Err(SessionError::FanInStopped);
        }

        info!(games = connection.games.len(), "Connection opened");
        Ok(connection)
    }

    /// The player this connection acts for.
    pub fn player_id(&self) -> &str {
        &self.player_id
    }

    /// Ids of the games this connection holds, ascending.
    pub fn game_ids(&self) -> Vec<GameId> {
        let mut ids: Vec<GameId> = self.games.keys().copied().collect();
        ids.sort_unstable();
        ids
    }

    /// Current view of a held game.
    ///
    /// # Errors
    ///
    /// Returns [`SessionError::UnknownGame`] if the game is not held.
    pub async fn view(&self, game_id: GameId) -> Result<GameView, SessionError> {
        let held = self
            .games
            .get(&game_id)
            .ok_or(SessionError::UnknownGame(game_id))?;
        Ok(held.session.view(&self.player_id).await)
    }

    /// Waits for the next thing to tell the client.
    ///
    /// # Errors
    ///
    /// Returns [`SessionError::FanInStopped`] if the fan-in task is gone, or
    /// a close error while discarding a duplicate handle.
    pub async fn next_event(&mut self) -> Result<ConnectionEvent, SessionError> {
        if let Some(view) = self.pending.pop_front() {
            return Ok(ConnectionEvent::Update(view));
        }

        loop {
            let event = self.fanin.next().await.ok_or(SessionError::FanInStopped)?;
            match event {
                FanInEvent::GameChanged(game_id) => {
                    if let Some(held) = self.games.get(&game_id) {
                        debug!(game_id, "Game changed");
                        let view = held.session.view(&self.player_id).await;
                        return Ok(ConnectionEvent::Update(view));
                    }
                    debug!(game_id, "Change for a game no longer held");
                }
                FanInEvent::GameOpened {
                    session,
                    subscription_id,
                } => {
                    let game_id = session.game_id();
                    if self.games.contains_key(&game_id) {
                        // Created while this connection was opening.
                        debug!(game_id, "Discarding duplicate handle");
                        if let Some(subscription) = self.fanin.remove(subscription_id).await? {
                            self.manager.close(&session, subscription).await?;
                        }
                        continue;
                    }

                    info!(game_id, "New game opened");
                    let view = session.view(&self.player_id).await;
                    self.games.insert(
                        game_id,
                        HeldGame {
                            session,
                            subscription_id,
                        },
                    );
                    return Ok(ConnectionEvent::Update(view));
                }
            }
        }
    }

    /// Plays a move in a held game as this connection's player.
    ///
    /// # Errors
    ///
    /// - [`SessionError::UnknownGame`] if the game is not held.
    /// - [`SessionError::Rule`] if the move is rejected.
    #[instrument(skip(self), fields(player_id = %self.player_id))]
    pub async fn play_move(
        &self,
        game_id: GameId,
        coordinate: Coordinate,
    ) -> Result<(), SessionError> {
        let held = self.games.get(&game_id).ok_or_else(|| {
            warn!(game_id, "Move for a game not held");
            SessionError::UnknownGame(game_id)
        })?;
        held.session
            .play_move(&Move::new(self.player_id.as_str(), coordinate))
            .await?;
        Ok(())
    }

    /// Creates a game with this player as X. It arrives as an update once the
    /// fan-in picks it up.
    ///
    /// # Errors
    ///
    /// See [`SessionManager::create_game`].
    #[instrument(skip(self), fields(player_id = %self.player_id))]
    pub async fn create_game(&self, opponent_id: &str) -> Result<GameId, SessionError> {
        self.manager.create_game(&self.player_id, opponent_id).await
    }

    /// Releases every handle the connection holds, including handles that
    /// arrived but were never delivered.
    ///
    /// Every handle is attempted even if one fails.
    ///
    /// # Errors
    ///
    /// Returns the first close error encountered.
    #[instrument(skip(self), fields(player_id = %self.player_id))]
    pub async fn close(self) -> Result<(), SessionError> {
        let Self {
            manager,
            games,
            fanin,
            ..
        } = self;

        let Detached {
            subscriptions,
            new_games,
            undelivered,
        } = fanin.shutdown().await;

        let mut sessions: HashMap<SubscriptionId, Arc<Session>> = games
            .into_values()
            .map(|held| (held.subscription_id, held.session))
            .collect();
        for event in undelivered {
            if let FanInEvent::GameOpened {
                session,
                subscription_id,
            } = event
            {
                sessions.insert(subscription_id, session);
            }
        }

        let mut first_error = None;

        for subscription in subscriptions {
            match sessions.get(&subscription.id()) {
                Some(session) => {
                    if let Err(err) = manager.close(session, subscription).await {
                        first_error.get_or_insert(err);
                    }
                }
                None => {
                    // Resolve through the registry so the handle is still released.
                    warn!(subscription = %subscription.id(), game_id = subscription.game_id(), "Held handle without a session");
                    let result = match manager.resident_session(subscription.game_id()).await {
                        Some(session) => manager.close(&session, subscription).await,
                        None => Err(SessionError::InvalidHandle),
                    };
                    if let Err(err) = result {
                        first_error.get_or_insert(err);
                    }
                }
            }
        }

        for mut receiver in new_games {
            receiver.close();
            while let Ok(NewGame {
                session,
                subscription,
            }) = receiver.try_recv()
            {
                if let Err(err) = manager.close(&session, subscription).await {
                    first_error.get_or_insert(err);
                }
            }
        }

        info!("Connection closed");
        match first_error {
            Some(err) => Err(err),
            None => Ok(()),
        }
    }
}

#[cfg(test)]
mod tests {
    use std::time::Duration;

    use super::*;
    use crate::db::MemoryStore;

    #[tokio::test]
    async fn test_close_releases_handles_missing_from_the_game_table() {
        let manager = SessionManager::new(Arc::new(MemoryStore::new()), Duration::from_secs(3600));
        let game_id = manager
            .create_game("alice", "bob")
            .await
            .expect("Create failed");
        let connection = PlayerConnection::open(manager.clone(), "alice")
            .await
            .expect("Open failed");

        // A second handle on the same game that the game table knows nothing about.
        let mut extra = manager.open_for_player("alice").await.expect("Open failed");
        let (_session, subscription) = extra.games.pop().expect("No game");
        extra.new_games.close();
        connection
            .fanin
            .add(subscription)
            .expect("Fan-in rejected handle");
        assert_eq!(manager.ref_count(game_id).await, Some(2));

        connection.close().await.expect("Close failed");
        assert!(!manager.is_resident(game_id).await);
    }
}
