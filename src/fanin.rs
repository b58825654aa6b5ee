//! Per-connection fan-in over a changing set of subscriptions.
//!
//! A single task owns the subscription table. Sources are added and removed
//! through a control channel between wait iterations, so a wait is always in
//! flight over the current table and no rebuild window exists.

use std::collections::VecDeque;
use std::future::poll_fn;
use std::sync::Arc;
use std::task::{Context, Poll};

use tokio::sync::{mpsc, oneshot};
use tokio::task::JoinHandle;
use tokio_util::sync::CancellationToken;
use tracing::{Instrument, debug, error, info_span, instrument};

use crate::SessionError;
use crate::db::GameId;
use crate::manager::{NewGame, NewGameReceiver};
use crate::session::{Session, Subscription, SubscriptionId};

/// Something a connection should react to.
#[derive(Debug)]
pub enum FanInEvent {
    /// A held game changed. Coalesced: at most one is queued per game.
    GameChanged(GameId),
    /// A new game arrived; its handle is now in the table.
    GameOpened {
        /// The new game's session.
        session: Arc<Session>,
        /// The handle the fan-in now holds for it.
        subscription_id: SubscriptionId,
    },
}

/// What [`FanIn::shutdown`] hands back so nothing leaks.
#[derive(Debug, Default)]
pub struct Detached {
    /// Every handle the task still held.
    pub subscriptions: Vec<Subscription>,
    /// New-game receivers the task was watching.
    pub new_games: Vec<NewGameReceiver>,
    /// Events produced but never taken by the consumer, oldest first.
    pub undelivered: Vec<FanInEvent>,
}

enum Control {
    Add(Subscription),
    Remove(SubscriptionId, oneshot::Sender<Option<Subscription>>),
    WatchNewGames(NewGameReceiver),
}

enum Source {
    Changed(usize),
    Closed(usize),
}

/// Merges many subscriptions into one event stream.
#[derive(Debug)]
pub struct FanIn {
    control: mpsc::UnboundedSender<Control>,
    events: mpsc::Receiver<FanInEvent>,
    cancel: CancellationToken,
    task: JoinHandle<Detached>,
}

impl FanIn {
    /// Starts an empty fan-in task.
    #[instrument]
    pub fn new() -> Self {
        let (control, control_rx) = mpsc::unbounded_channel();
        let (output, events) = mpsc::channel(1);
        let cancel = CancellationToken::new();

        let worker = Worker {
            subscriptions: Vec::new(),
            new_games: Vec::new(),
            outbox: VecDeque::new(),
            cursor: 0,
            output,
            control: control_rx,
            cancel: cancel.clone(),
        };
        let task = tokio::spawn(worker.run().instrument(info_span!("fan_in")));

        Self {
            control,
            events,
            cancel,
            task,
        }
    }

    /// Adds a handle to the table.
    ///
    /// # Errors
    ///
    /// Hands the subscription back if the task has stopped.
    pub fn add(&self, subscription: Subscription) -> Result<(), Subscription> {
        match self.control.send(Control::Add(subscription)) {
            Err(mpsc::error::SendError(Control::Add(subscription))) => Err(subscription),
            _ => Ok(()),
        }
    }

    /// Takes a handle back out of the table. `None` if it is not there.
    ///
    /// # Errors
    ///
    /// Returns [`SessionError::FanInStopped`] if the task has stopped.
    pub async fn remove(&self, id: SubscriptionId) -> Result<Option<Subscription>, SessionError> {
        let (reply, response) = oneshot::channel();
        self.control
            .send(Control::Remove(id, reply))
            .map_err(|_| SessionError::FanInStopped)?;
        response.await.map_err(|_| SessionError::FanInStopped)
    }

    /// Starts watching a new-game channel.
    ///
    /// # Errors
    ///
    /// Hands the receiver back if the task has stopped.
    pub fn watch_new_games(&self, new_games: NewGameReceiver) -> Result<(), NewGameReceiver> {
        match self.control.send(Control::WatchNewGames(new_games)) {
            Err(mpsc::error::SendError(Control::WatchNewGames(new_games))) => Err(new_games),
            _ => Ok(()),
        }
    }

    /// Waits for the next event. `None` once the task has stopped.
    pub async fn next(&mut self) -> Option<FanInEvent> {
        self.events.recv().await
    }

    /// Stops the task and returns everything it held.
    #[instrument(skip(self))]
    pub async fn shutdown(mut self) -> Detached {
        self.cancel.cancel();

        let mut detached = match (&mut self.task).await {
            Ok(detached) => detached,
            Err(err) => {
                error!(error = %err, "Fan-in task failed");
                Detached::default()
            }
        };

        // Anything sitting in the output slot predates the outbox.
        self.events.close();
        let mut pending = Vec::new();
        while let Ok(event) = self.events.try_recv() {
            pending.push(event);
        }
        pending.append(&mut detached.undelivered);
        detached.undelivered = pending;

        debug!(
            subscriptions = detached.subscriptions.len(),
            undelivered = detached.undelivered.len(),
            "Fan-in detached"
        );
        detached
    }
}

impl Default for FanIn {
    fn default() -> Self {
        Self::new()
    }
}

struct Worker {
    subscriptions: Vec<Subscription>,
    new_games: Vec<NewGameReceiver>,
    outbox: VecDeque<FanInEvent>,
    cursor: usize,
    output: mpsc::Sender<FanInEvent>,
    control: mpsc::UnboundedReceiver<Control>,
    cancel: CancellationToken,
}

impl Worker {
    async fn run(mut self) -> Detached {
        loop {
            let has_outbox = !self.outbox.is_empty();
            // The permit borrows this clone, leaving `self` free for the arms.
            let output = self.output.clone();
            tokio::select! {
                biased;

                _ = self.cancel.cancelled() => break,

                control = self.control.recv() => match control {
                    Some(control) => self.apply(control),
                    None => {
                        debug!("Fan-in handle dropped");
                        break;
                    }
                },

                new_game = poll_fn(|cx| poll_new_games(&mut self.new_games, cx)) => {
                    self.on_new_game(new_game);
                }

                permit = output.reserve(), if has_outbox => match permit {
                    Ok(permit) => {
                        if let Some(event) = self.outbox.pop_front() {
                            permit.send(event);
                        }
                    }
                    Err(_) => {
                        debug!("Fan-in consumer gone");
                        break;
                    }
                },

                source = poll_fn(|cx| poll_sources(&mut self.subscriptions, &mut self.cursor, cx)) => {
                    self.on_source(source);
                }
            }
        }

        self.detach()
    }

    fn apply(&mut self, control: Control) {
        match control {
            Control::Add(subscription) => {
                debug!(subscription = %subscription.id(), game_id = subscription.game_id(), "Source added");
                self.subscriptions.push(subscription);
            }
            Control::Remove(id, reply) => {
                let taken = self
                    .subscriptions
                    .iter()
                    .position(|s| s.id() == id)
                    .map(|index| self.subscriptions.remove(index));
                debug!(subscription = %id, found = taken.is_some(), "Source removed");
                // Keep the handle if nobody is waiting for it.
                if let Err(Some(subscription)) = reply.send(taken) {
                    self.subscriptions.push(subscription);
                }
            }
            Control::WatchNewGames(new_games) => {
                debug!(watched = self.new_games.len() + 1, "Watching new-game channel");
                self.new_games.push(new_games);
            }
        }
    }

    fn on_new_game(&mut self, new_game: NewGame) {
        let NewGame {
            session,
            subscription,
        } = new_game;
        let subscription_id = subscription.id();
        debug!(game_id = session.game_id(), subscription = %subscription_id, "New game arrived");
        self.subscriptions.push(subscription);
        self.outbox.push_back(FanInEvent::GameOpened {
            session,
            subscription_id,
        });
    }

    fn on_source(&mut self, source: Source) {
        match source {
            Source::Changed(index) => {
                let game_id = self.subscriptions[index].game_id();
                let queued = self
                    .outbox
                    .iter()
                    .any(|event| matches!(event, FanInEvent::GameChanged(id) if *id == game_id));
                if queued {
                    debug!(game_id, "Change coalesced");
                } else {
                    self.outbox.push_back(FanInEvent::GameChanged(game_id));
                }
            }
            Source::Closed(index) => {
                let subscription = self.subscriptions.remove(index);
                debug!(subscription = %subscription.id(), game_id = subscription.game_id(), "Source closed");
            }
        }
    }

    fn detach(mut self) -> Detached {
        // Controls sent before the cancel still carry handles.
        self.control.close();
        while let Ok(control) = self.control.try_recv() {
            self.apply(control);
        }

        Detached {
            subscriptions: self.subscriptions,
            new_games: self.new_games,
            undelivered: self.outbox.into_iter().collect(),
        }
    }
}

/// Polls every source once, starting after the last one that fired.
fn poll_sources(
    subscriptions: &mut [Subscription],
    cursor: &mut usize,
    cx: &mut Context<'_>,
) -> Poll<Source> {
    let len = subscriptions.len();
    for offset in 0..len {
        let index = (*cursor + offset) % len;
        match subscriptions[index].poll_changed(cx) {
            Poll::Ready(Some(())) => {
                *cursor = (index + 1) % len;
                return Poll::Ready(Source::Changed(index));
            }
            Poll::Ready(None) => return Poll::Ready(Source::Closed(index)),
            Poll::Pending => {}
        }
    }
    Poll::Pending
}

/// Polls every new-game receiver, dropping those whose senders are all gone.
fn poll_new_games(receivers: &mut Vec<NewGameReceiver>, cx: &mut Context<'_>) -> Poll<NewGame> {
    let mut index = 0;
    while index < receivers.len() {
        match receivers[index].poll_recv(cx) {
            Poll::Ready(Some(new_game)) => return Poll::Ready(new_game),
            Poll::Ready(None) => {
                debug!("New-game channel closed");
                receivers.remove(index);
            }
            Poll::Pending => index += 1,
        }
    }
    Poll::Pending
}
