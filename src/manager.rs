//! Registry of resident sessions.
//!
//! The registry lock guards membership and reference counts. It is never held
//! across storage I/O, and no code path takes it while holding a session lock.
//! Session locks taken under it are only ever held for in-memory work.

use std::collections::HashMap;
use std::collections::hash_map::Entry as MapEntry;
use std::sync::Arc;
use std::time::Duration;

use tokio::sync::{Mutex, mpsc};
use tokio_util::sync::{CancellationToken, DropGuard};
use tracing::{Instrument, debug, info, info_span, instrument, warn};
use uttt_rules::Game;

use crate::SessionError;
use crate::db::{GameId, GameStore, PlayerProfile, StoreError};
use crate::session::{Session, Subscription};

/// Interval between background flushes when none is configured.
pub const DEFAULT_FLUSH_INTERVAL: Duration = Duration::from_secs(60);

/// A subscriber handle for a game created after the player's games were opened.
#[derive(Debug)]
pub struct NewGame {
    /// The new game's session.
    pub session: Arc<Session>,
    /// A handle already counted against the session.
    pub subscription: Subscription,
}

/// Receives [`NewGame`]s for one connection.
///
/// Every queued [`NewGame`] holds a counted handle, so a receiver that is
/// done should be closed and drained through [`SessionManager::close`].
pub type NewGameReceiver = mpsc::UnboundedReceiver<NewGame>;

/// Everything [`SessionManager::open_for_player`] hands to a connection.
#[derive(Debug)]
pub struct OpenGames {
    /// One session and handle per game the player takes part in.
    pub games: Vec<(Arc<Session>, Subscription)>,
    /// Games created from now on.
    pub new_games: NewGameReceiver,
}

#[derive(Debug)]
struct Entry {
    refs: usize,
    session: Arc<Session>,
    // Stops the idle timer when the entry is removed.
    _flush_timer: DropGuard,
}

#[derive(Debug, Default)]
struct Registry {
    sessions: HashMap<GameId, Entry>,
    new_game_channels: HashMap<String, Vec<mpsc::UnboundedSender<NewGame>>>,
    evictions: u64,
}

#[derive(Debug)]
pub(crate) struct ManagerShared {
    store: Arc<dyn GameStore>,
    flush_interval: Duration,
    registry: Mutex<Registry>,
}

/// Owns every resident [`Session`], keyed by game id.
///
/// Cheap to clone; clones share one registry.
#[derive(Debug, Clone)]
pub struct SessionManager {
    shared: Arc<ManagerShared>,
}

impl SessionManager {
    /// Creates a manager over `store` that flushes resident sessions every
    /// `flush_interval`.
    #[instrument(skip(store))]
    pub fn new(store: Arc<dyn GameStore>, flush_interval: Duration) -> Self {
        info!("Creating session manager");
        Self {
            shared: Arc::new(ManagerShared {
                store,
                flush_interval,
                registry: Mutex::new(Registry::default()),
            }),
        }
    }

    pub(crate) fn from_shared(shared: Arc<ManagerShared>) -> Self {
        Self { shared }
    }

    /// The backing store.
    pub fn store(&self) -> &Arc<dyn GameStore> {
        &self.shared.store
    }

    /// Returns the profile for a login identity, creating it on first use.
    ///
    /// # Errors
    ///
    /// Returns [`SessionError::Store`] if the store fails.
    #[instrument(skip(self))]
    pub async fn lookup_or_create_player(&self, identity: &str) -> Result<PlayerProfile, SessionError> {
        Ok(self.shared.store.lookup_or_create_player(identity).await?)
    }

    /// Looks up a profile by username.
    ///
    /// # Errors
    ///
    /// Returns [`SessionError::Store`] if the store fails.
    #[instrument(skip(self))]
    pub async fn find_player_by_username(
        &self,
        username: &str,
    ) -> Result<Option<PlayerProfile>, SessionError> {
        Ok(self.shared.store.find_player_by_username(username).await?)
    }

    /// Opens every game `player_id` takes part in.
    ///
    /// Each game yields its session and a fresh handle counted against it.
    /// The returned channel delivers games created after this call.
    ///
    /// # Errors
    ///
    /// Returns [`SessionError::Store`] if listing or loading fails. Handles
    /// acquired before the failure are released.
    #[instrument(skip(self))]
    pub async fn open_for_player(&self, player_id: &str) -> Result<OpenGames, SessionError> {
        // Register first so a game created during the listing is not missed.
        let (sender, new_games) = mpsc::unbounded_channel();
        {
            let mut registry = self.shared.registry.lock().await;
            let channels = registry
                .new_game_channels
                .entry(player_id.to_string())
                .or_default();
            channels.retain(|channel| !channel.is_closed());
            channels.push(sender);
            debug!(channels = channels.len(), "New-game channel registered");
        }

        let game_ids = self.shared.store.list_game_ids(player_id).await?;

        let mut games = Vec::with_capacity(game_ids.len());
        for game_id in game_ids {
            match self.acquire(game_id).await {
                Ok(pair) => games.push(pair),
                Err(err) => {
                    warn!(game_id, error = %err, "Open failed, releasing acquired handles");
                    for (session, subscription) in games {
                        if let Err(close_err) = self.close(&session, subscription).await {
                            warn!(game_id = session.game_id(), error = %close_err, "Release failed");
                        }
                    }
                    return Err(err);
                }
            }
        }

        info!(count = games.len(), "Games opened");
        Ok(OpenGames { games, new_games })
    }

    /// Creates a game, persists it and hands a handle to every open
    /// new-game channel of either player. Returns the new game's id.
    ///
    /// The session stays resident only if at least one handle was delivered;
    /// otherwise it loads from storage on first open.
    ///
    /// # Errors
    ///
    /// - [`SessionError::Rule`] if the players are the same.
    /// - [`SessionError::Store`] if the record cannot be created.
    #[instrument(skip(self))]
    pub async fn create_game(&self, player_x: &str, player_o: &str) -> Result<GameId, SessionError> {
        let game = Game::new(player_x, player_o)?;
        let saved = game.save();
        let game_id = self
            .shared
            .store
            .create_game_record(&saved.player_x, &saved.player_o, &saved.board)
            .await?;
        let names = self.display_names(&game).await?;

        let mut registry = self.shared.registry.lock().await;
        // An open that listed the new record may already have loaded it.
        let session = match registry.sessions.get(&game_id) {
            Some(entry) => {
                debug!(game_id, refs = entry.refs, "Game already resident");
                Arc::clone(&entry.session)
            }
            None => Arc::new(Session::resident(
                game_id,
                game,
                names,
                Arc::downgrade(&self.shared),
            )),
        };

        let mut delivered = 0;
        for player in [player_x, player_o] {
            let Some(channels) = registry.new_game_channels.get_mut(player) else {
                continue;
            };
            channels.retain(|channel| !channel.is_closed());
            for channel in channels.iter() {
                let subscription = session.subscribe().await;
                let offer = NewGame {
                    session: Arc::clone(&session),
                    subscription,
                };
                match channel.send(offer) {
                    Ok(()) => delivered += 1,
                    Err(returned) => {
                        debug!(player, "New-game receiver closed during delivery");
                        if let Err(err) = session.unsubscribe(returned.0.subscription).await {
                            warn!(error = %err, "Undelivered handle was already gone");
                        }
                    }
                }
            }
        }
        registry
            .new_game_channels
            .retain(|_, channels| !channels.is_empty());

        if delivered > 0 {
            match registry.sessions.entry(game_id) {
                MapEntry::Occupied(mut occupied) => {
                    occupied.get_mut().refs += delivered;
                }
                MapEntry::Vacant(vacant) => {
                    let timer = self.start_flush_timer(&session);
                    vacant.insert(Entry {
                        refs: delivered,
                        session,
                        _flush_timer: timer,
                    });
                }
            }
            info!(game_id, delivered, "Game created");
        } else {
            info!(game_id, "Game created with no open channels");
        }
        Ok(game_id)
    }

    /// Releases one handle. When the last handle goes, the session is flushed
    /// and evicted.
    ///
    /// # Errors
    ///
    /// - [`SessionError::InvalidHandle`] if the handle is not registered.
    /// - [`SessionError::Store`] if the eviction flush fails. The session then
    ///   stays resident and the idle timer keeps retrying. A session this
    ///   manager does not hold is flushed on every close and surfaces the
    ///   same error.
    #[instrument(skip(self, session, subscription), fields(game_id = session.game_id(), subscription = %subscription.id()))]
    pub async fn close(
        &self,
        session: &Arc<Session>,
        subscription: Subscription,
    ) -> Result<(), SessionError> {
        session.unsubscribe(subscription).await?;
        let game_id = session.game_id();

        let remaining = {
            let mut registry = self.shared.registry.lock().await;
            match registry.sessions.get_mut(&game_id) {
                Some(entry) if Arc::ptr_eq(&entry.session, session) => {
                    entry.refs = entry.refs.saturating_sub(1);
                    Some(entry.refs)
                }
                _ => None,
            }
        };

        let Some(remaining) = remaining else {
            // Nothing else will persist this session, so write it now.
            warn!("Closed a handle on a session this manager does not hold");
            session.flush(self.shared.store.as_ref()).await?;
            return Ok(());
        };

        if remaining > 0 {
            debug!(refs = remaining, "Handle closed");
            return Ok(());
        }

        session.flush(self.shared.store.as_ref()).await?;
        self.evict_if_idle(game_id).await;
        Ok(())
    }

    /// Returns true if the game is resident.
    pub async fn is_resident(&self, game_id: GameId) -> bool {
        self.shared.registry.lock().await.sessions.contains_key(&game_id)
    }

    /// The resident session for a game, if any.
    pub(crate) async fn resident_session(&self, game_id: GameId) -> Option<Arc<Session>> {
        let registry = self.shared.registry.lock().await;
        registry
            .sessions
            .get(&game_id)
            .map(|entry| Arc::clone(&entry.session))
    }

    /// Outstanding handles on a resident game.
    pub async fn ref_count(&self, game_id: GameId) -> Option<usize> {
        let registry = self.shared.registry.lock().await;
        registry.sessions.get(&game_id).map(|entry| entry.refs)
    }

    /// Ids of every resident game, ascending.
    pub async fn resident_games(&self) -> Vec<GameId> {
        let registry = self.shared.registry.lock().await;
        let mut ids: Vec<GameId> = registry.sessions.keys().copied().collect();
        ids.sort_unstable();
        ids
    }

    /// Flushes every resident session and returns how many were written.
    ///
    /// Every session is attempted even if one fails.
    ///
    /// # Errors
    ///
    /// Returns the first [`SessionError::Store`] encountered.
    #[instrument(skip(self))]
    pub async fn flush_all(&self) -> Result<usize, SessionError> {
        let sessions: Vec<Arc<Session>> = {
            let registry = self.shared.registry.lock().await;
            registry
                .sessions
                .values()
                .map(|entry| Arc::clone(&entry.session))
                .collect()
        };

        let mut written = 0;
        let mut first_error = None;
        for session in sessions {
            match session.flush(self.shared.store.as_ref()).await {
                Ok(true) => written += 1,
                Ok(false) => {}
                Err(err) => {
                    first_error.get_or_insert(err);
                }
            }
        }

        info!(written, "Resident sessions flushed");
        match first_error {
            Some(err) => Err(err.into()),
            None => Ok(written),
        }
    }

    /// Returns the resident session with a new handle, loading it if needed.
    async fn acquire(&self, game_id: GameId) -> Result<(Arc<Session>, Subscription), SessionError> {
        loop {
            let evictions = {
                let mut registry = self.shared.registry.lock().await;
                if let Some(entry) = registry.sessions.get_mut(&game_id) {
                    entry.refs += 1;
                    debug!(game_id, refs = entry.refs, "Session reused");
                    let subscription = entry.session.subscribe().await;
                    return Ok((Arc::clone(&entry.session), subscription));
                }
                registry.evictions
            };

            let loaded = self.load_session(game_id).await?;

            let mut registry = self.shared.registry.lock().await;
            // An eviction during the load may have written newer state.
            if !registry.sessions.contains_key(&game_id) && registry.evictions != evictions {
                debug!(game_id, "Eviction raced with load, reloading");
                continue;
            }

            let entry = match registry.sessions.entry(game_id) {
                MapEntry::Occupied(occupied) => occupied.into_mut(),
                MapEntry::Vacant(vacant) => {
                    let timer = self.start_flush_timer(&loaded);
                    info!(game_id, "Session loaded");
                    vacant.insert(Entry {
                        refs: 0,
                        session: loaded,
                        _flush_timer: timer,
                    })
                }
            };
            entry.refs += 1;
            let subscription = entry.session.subscribe().await;
            return Ok((Arc::clone(&entry.session), subscription));
        }
    }

    async fn load_session(&self, game_id: GameId) -> Result<Arc<Session>, SessionError> {
        let saved = self.shared.store.load_game(game_id).await?;
        let game = Game::from_saved(&saved).map_err(StoreError::from)?;
        let names = self.display_names(&game).await?;
        Ok(Arc::new(Session::resident(
            game_id,
            game,
            names,
            Arc::downgrade(&self.shared),
        )))
    }

    async fn display_names(&self, game: &Game) -> Result<(String, String), StoreError> {
        let x = self.display_name(game.player_x()).await?;
        let o = self.display_name(game.player_o()).await?;
        Ok((x, o))
    }

    async fn display_name(&self, player_id: &str) -> Result<String, StoreError> {
        let profile = self.shared.store.find_player(player_id).await?;
        Ok(profile.map_or_else(|| player_id.to_string(), |p| p.username().clone()))
    }

    fn start_flush_timer(&self, session: &Arc<Session>) -> DropGuard {
        let token = CancellationToken::new();
        let cancelled = token.clone();
        let session = Arc::clone(session);
        let interval = self.shared.flush_interval;
        let span = info_span!("flush_timer", game_id = session.game_id());

        tokio::spawn(
            async move {
                loop {
                    tokio::select! {
                        _ = cancelled.cancelled() => break,
                        _ = tokio::time::sleep(interval) => {}
                    }
                    let Some(manager) = session.manager() else {
                        debug!("Manager gone, stopping timer");
                        break;
                    };
                    manager.idle_tick(&session).await;
                }
            }
            .instrument(span),
        );

        token.drop_guard()
    }

    /// One timer tick: reclaim dropped handles, flush if dirty, evict if idle.
    async fn idle_tick(&self, session: &Arc<Session>) {
        let game_id = session.game_id();

        let dropped = session.prune_dropped().await;
        if dropped > 0 {
            let mut registry = self.shared.registry.lock().await;
            if let Some(entry) = registry.sessions.get_mut(&game_id) {
                entry.refs = entry.refs.saturating_sub(dropped);
                warn!(game_id, dropped, refs = entry.refs, "Reclaimed handles dropped without closing");
            }
        }

        if let Err(err) = session.flush(self.shared.store.as_ref()).await {
            warn!(game_id, error = %err, "Periodic flush failed, retrying next interval");
            return;
        }
        self.evict_if_idle(game_id).await;
    }

    /// Removes the session if nothing holds it and storage is current.
    async fn evict_if_idle(&self, game_id: GameId) -> bool {
        let mut registry = self.shared.registry.lock().await;
        let Some(entry) = registry.sessions.get(&game_id) else {
            return false;
        };
        if entry.refs > 0 {
            debug!(game_id, refs = entry.refs, "Session revived, not evicting");
            return false;
        }
        if !entry.session.is_clean().await {
            debug!(game_id, "Session dirty, not evicting");
            return false;
        }

        registry.sessions.remove(&game_id);
        registry.evictions += 1;
        info!(game_id, "Session evicted");
        true
    }
}
