//! One live game shared by every connection that has it open.
//!
//! A [`Session`] owns a rules engine behind a reader/writer lock together with
//! the senders of its subscribers. Mutation happens under the write lock; the
//! subscriber list is snapshotted there and notifications go out after the
//! lock is released, so a slow subscriber never holds up a move.

use std::collections::HashSet;
use std::sync::atomic::{AtomicU64, Ordering};
use std::sync::Weak;
use std::task::{Context, Poll};

use serde::{Deserialize, Serialize};
use tokio::sync::mpsc::error::TrySendError;
use tokio::sync::{Mutex, RwLock, mpsc};
use tracing::{debug, error, instrument, warn};
use uttt_rules::{Coordinate, Game, Move, RuleError, SavedGame, SubCoordinate};

use crate::SessionError;
use crate::db::{GameId, GameStore, StoreError};
use crate::manager::{ManagerShared, SessionManager};

static NEXT_SUBSCRIPTION: AtomicU64 = AtomicU64::new(1);

/// Identifies one subscriber handle. Unique within the process.
#[derive(
    Debug, Clone, Copy, PartialEq, Eq, Hash, PartialOrd, Ord, Serialize, Deserialize, derive_more::Display,
)]
#[display("sub-{}", _0)]
pub struct SubscriptionId(u64);

impl SubscriptionId {
    fn next() -> Self {
        Self(NEXT_SUBSCRIPTION.fetch_add(1, Ordering::Relaxed))
    }
}

/// Receiving end of one session's change notifications.
///
/// At most one notification is ever pending. Further changes made before it
/// is taken coalesce into it.
#[derive(Debug)]
pub struct Subscription {
    id: SubscriptionId,
    game_id: GameId,
    receiver: mpsc::Receiver<()>,
}

impl Subscription {
    /// The handle's id.
    pub fn id(&self) -> SubscriptionId {
        self.id
    }

    /// The game this handle observes.
    pub fn game_id(&self) -> GameId {
        self.game_id
    }

    /// Waits for the next change.
    ///
    /// Returns `false` once the handle has been unsubscribed and drained.
    pub async fn changed(&mut self) -> bool {
        self.receiver.recv().await.is_some()
    }

    /// Takes a pending change without waiting.
    pub fn try_changed(&mut self) -> bool {
        self.receiver.try_recv().is_ok()
    }

    pub(crate) fn poll_changed(&mut self, cx: &mut Context<'_>) -> Poll<Option<()>> {
        self.receiver.poll_recv(cx)
    }
}

#[derive(Debug)]
struct SessionState {
    game: Game,
    subscribers: Vec<(SubscriptionId, mpsc::Sender<()>)>,
    revision: u64,
    persisted_revision: u64,
}

/// A live, lockable, subscribable game.
#[derive(Debug)]
pub struct Session {
    game_id: GameId,
    player_x_name: String,
    player_o_name: String,
    state: RwLock<SessionState>,
    flush_lock: Mutex<()>,
    manager: Weak<ManagerShared>,
}

impl Session {
    /// Creates a session that no manager owns. Display names default to the
    /// player ids.
    pub fn new(game_id: GameId, game: Game) -> Self {
        let player_x_name = game.player_x().to_string();
        let player_o_name = game.player_o().to_string();
        Self::resident(game_id, game, (player_x_name, player_o_name), Weak::new())
    }

    pub(crate) fn resident(
        game_id: GameId,
        game: Game,
        (player_x_name, player_o_name): (String, String),
        manager: Weak<ManagerShared>,
    ) -> Self {
        Self {
            game_id,
            player_x_name,
            player_o_name,
            state: RwLock::new(SessionState {
                game,
                subscribers: Vec::new(),
                revision: 0,
                persisted_revision: 0,
            }),
            flush_lock: Mutex::new(()),
            manager,
        }
    }

    /// The game's id.
    pub fn game_id(&self) -> GameId {
        self.game_id
    }

    /// The owning manager, if it is still alive.
    pub fn manager(&self) -> Option<SessionManager> {
        self.manager.upgrade().map(SessionManager::from_shared)
    }

    /// Validates and applies a move, then notifies every subscriber.
    ///
    /// Returns once the move is applied. Delivery never waits on a subscriber.
    ///
    /// # Errors
    ///
    /// Returns the [`RuleError`] if the move is rejected; nothing changes and
    /// nobody is notified.
    #[instrument(skip(self, mv), fields(game_id = self.game_id, player = %mv.player_id, coordinate = %mv.coordinate))]
    pub async fn play_move(&self, mv: &Move) -> Result<(), RuleError> {
        let subscribers = {
            let mut state = self.state.write().await;
            if let Err(err) = state.game.play_move(mv) {
                warn!(error = %err, "Move rejected");
                return Err(err);
            }
            state.revision += 1;
            debug!(revision = state.revision, "Move applied");
            state.subscribers.clone()
        };

        for (id, sender) in subscribers {
            match sender.try_send(()) {
                Ok(()) => debug!(subscription = %id, "Change delivered"),
                Err(TrySendError::Full(())) => debug!(subscription = %id, "Change coalesced"),
                Err(TrySendError::Closed(())) => {
                    warn!(subscription = %id, "Subscriber dropped without closing")
                }
            }
        }
        Ok(())
    }

    /// Registers a new subscriber handle.
    #[instrument(skip(self), fields(game_id = self.game_id))]
    pub async fn subscribe(&self) -> Subscription {
        let (sender, receiver) = mpsc::channel(1);
        let id = SubscriptionId::next();

        let mut state = self.state.write().await;
        state.subscribers.push((id, sender));
        debug!(subscription = %id, count = state.subscribers.len(), "Subscribed");

        Subscription {
            id,
            game_id: self.game_id,
            receiver,
        }
    }

    /// Removes and closes a subscriber handle.
    ///
    /// # Errors
    ///
    /// Returns [`SessionError::InvalidHandle`] if the handle is not registered
    /// on this session.
    #[instrument(skip(self, subscription), fields(game_id = self.game_id, subscription = %subscription.id))]
    pub async fn unsubscribe(&self, subscription: Subscription) -> Result<(), SessionError> {
        if subscription.game_id != self.game_id {
            warn!(handle_game = subscription.game_id, "Handle belongs to another game");
            return Err(SessionError::InvalidHandle);
        }

        let mut state = self.state.write().await;
        let Some(position) = state
            .subscribers
            .iter()
            .position(|(id, _)| *id == subscription.id)
        else {
            warn!("Handle is not registered");
            return Err(SessionError::InvalidHandle);
        };
        state.subscribers.remove(position);
        debug!(count = state.subscribers.len(), "Unsubscribed");
        Ok(())
    }

    /// Drops subscribers whose handles were discarded without being closed
    /// and returns how many were removed.
    pub(crate) async fn prune_dropped(&self) -> usize {
        let mut state = self.state.write().await;
        let before = state.subscribers.len();
        state.subscribers.retain(|(_, sender)| !sender.is_closed());
        before - state.subscribers.len()
    }

    /// Number of registered subscriber handles.
    pub async fn subscriber_count(&self) -> usize {
        self.state.read().await.subscribers.len()
    }

    /// Number of moves applied since the session became resident.
    pub async fn revision(&self) -> u64 {
        self.state.read().await.revision
    }

    /// Returns true when storage holds the latest state.
    pub async fn is_clean(&self) -> bool {
        let state = self.state.read().await;
        state.revision == state.persisted_revision
    }

    /// Current state in saved form.
    pub async fn snapshot(&self) -> SavedGame {
        self.state.read().await.game.save()
    }

    /// Runs a read-only query against the game.
    pub async fn with_game<R>(&self, query: impl FnOnce(&Game) -> R) -> R {
        let state = self.state.read().await;
        query(&state.game)
    }

    /// Builds the projection shown to `viewer_id`.
    #[instrument(skip(self), fields(game_id = self.game_id))]
    pub async fn view(&self, viewer_id: &str) -> GameView {
        let state = self.state.read().await;
        GameView::build(self, &state, viewer_id)
    }

    /// Writes the current state to `store` if it changed since the last
    /// flush. Returns whether anything was written.
    ///
    /// Flushes of one session are serialized, so writes land in the order
    /// their snapshots were taken.
    ///
    /// # Errors
    ///
    /// Returns [`StoreError`] if the write fails. The session stays dirty.
    #[instrument(skip(self, store), fields(game_id = self.game_id))]
    pub async fn flush(&self, store: &dyn GameStore) -> Result<bool, StoreError> {
        let _serial = self.flush_lock.lock().await;

        let (saved, revision) = {
            let state = self.state.read().await;
            if state.revision == state.persisted_revision {
                debug!(revision = state.revision, "Already persisted");
                return Ok(false);
            }
            (state.game.save(), state.revision)
        };

        if let Err(err) = store.save_game(self.game_id, &saved).await {
            error!(error = %err, revision, "Flush failed");
            return Err(err);
        }

        let mut state = self.state.write().await;
        state.persisted_revision = state.persisted_revision.max(revision);
        debug!(revision, "Flushed");
        Ok(true)
    }
}

/// One player as shown in a [`GameView`].
#[derive(Debug, Clone, PartialEq, Eq, Serialize, Deserialize)]
pub struct PlayerView {
    /// Player id.
    pub id: String,
    /// Display name.
    pub name: String,
}

/// One square as shown in a [`GameView`].
#[derive(Debug, Clone, PartialEq, Eq, Serialize, Deserialize)]
#[serde(rename_all = "camelCase")]
pub struct SquareView {
    /// Owning player id, `"tie"`, or `None` while unplayed.
    pub owner: Option<String>,
    /// Whether the viewer may move here right now.
    pub playable: bool,
    /// Where the square is.
    pub coordinate: Coordinate,
}

/// One sub-board as shown in a [`GameView`], squares indexed `[row][col]`.
#[derive(Debug, Clone, PartialEq, Eq, Serialize, Deserialize)]
pub struct GridView {
    /// Owning player id, `"tie"`, or `None` while undecided.
    pub owner: Option<String>,
    /// The nine squares.
    pub squares: [[SquareView; 3]; 3],
}

/// Read-only projection of a game for one viewer.
#[derive(Debug, Clone, PartialEq, Eq, Serialize, Deserialize)]
#[serde(rename_all = "camelCase")]
pub struct GameView {
    /// The game's id.
    pub game_id: GameId,
    /// Moves applied since the session became resident.
    pub revision: u64,
    /// The player moving first.
    pub player_x: PlayerView,
    /// The player moving second.
    pub player_o: PlayerView,
    /// Winner's id, `"tie"`, or `None` while the game is on.
    pub victor: Option<String>,
    /// Id of the player to move, `None` once the game is over.
    pub to_move: Option<String>,
    /// The previous move.
    pub last_move: Option<Coordinate>,
    /// The nine sub-boards indexed `[row][col]`.
    pub grids: [[GridView; 3]; 3],
}

impl GameView {
    fn build(session: &Session, state: &SessionState, viewer_id: &str) -> Self {
        let game = &state.game;
        let playable: HashSet<Coordinate> = game.valid_moves(viewer_id).into_iter().collect();

        // Every coordinate built here is in range, so the lookups cannot fail.
        let grids = std::array::from_fn(|row| {
            std::array::from_fn(|col| {
                let block = SubCoordinate::new(col as i32 + 1, row as i32 + 1);
                GridView {
                    owner: game
                        .block_winner(block)
                        .map(|owner| owner.to_option())
                        .unwrap_or_default(),
                    squares: std::array::from_fn(|cell_row| {
                        std::array::from_fn(|cell_col| {
                            let coordinate = Coordinate {
                                game_square: block,
                                subgrid_square: SubCoordinate::new(
                                    cell_col as i32 + 1,
                                    cell_row as i32 + 1,
                                ),
                            };
                            SquareView {
                                owner: game
                                    .square_owner(coordinate)
                                    .map(|owner| owner.to_option())
                                    .unwrap_or_default(),
                                playable: playable.contains(&coordinate),
                                coordinate,
                            }
                        })
                    }),
                }
            })
        });

        Self {
            game_id: session.game_id,
            revision: state.revision,
            player_x: PlayerView {
                id: game.player_x().to_string(),
                name: session.player_x_name.clone(),
            },
            player_o: PlayerView {
                id: game.player_o().to_string(),
                name: session.player_o_name.clone(),
            },
            victor: game.game_winner().to_option(),
            to_move: game.to_move().map(|mark| game.player_id(mark).to_string()),
            last_move: game.last_move(),
            grids,
        }
    }

    /// Every square the viewer may move to.
    pub fn playable(&self) -> Vec<Coordinate> {
        self.grids
            .iter()
            .flatten()
            .flat_map(|grid| grid.squares.iter().flatten())
            .filter(|square| square.playable)
            .map(|square| square.coordinate)
            .collect()
    }
}
