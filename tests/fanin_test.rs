//! Tests for merging subscriptions into one event stream.

use std::sync::Arc;
use std::time::Duration;

use uttt::{Coordinate, FanIn, FanInEvent, Game, Move, NewGame, Session};

const WAIT: Duration = Duration::from_secs(2);

fn session(game_id: i32) -> Arc<Session> {
    Arc::new(Session::new(
        game_id,
        Game::new("x", "o").expect("New game failed"),
    ))
}

async fn next_event(fanin: &mut FanIn) -> FanInEvent {
    tokio::time::timeout(WAIT, fanin.next())
        .await
        .expect("Timed out waiting for event")
        .expect("Fan-in stopped")
}

async fn no_event_within(fanin: &mut FanIn, wait: Duration) -> bool {
    tokio::time::timeout(wait, fanin.next()).await.is_err()
}

#[tokio::test]
async fn test_change_is_reported_with_game_id() {
    let game = session(3);
    let mut fanin = FanIn::new();
    fanin
        .add(game.subscribe().await)
        .expect("Fan-in rejected handle");

    game.play_move(&Move::new("x", Coordinate::new(1, 1, 1, 1)))
        .await
        .expect("Move failed");

    match next_event(&mut fanin).await {
        FanInEvent::GameChanged(game_id) => assert_eq!(game_id, 3),
        other => panic!("Unexpected event {:?}", other),
    }
}

#[tokio::test]
async fn test_rapid_changes_coalesce() {
    let game = session(1);
    let mut fanin = FanIn::new();
    fanin
        .add(game.subscribe().await)
        .expect("Fan-in rejected handle");

    let moves = [
        Coordinate::new(1, 1, 1, 1),
        Coordinate::new(1, 1, 2, 2),
        Coordinate::new(2, 2, 1, 1),
        Coordinate::new(1, 1, 3, 3),
    ];
    for (turn, coordinate) in moves.into_iter().enumerate() {
        let player = if turn % 2 == 0 { "x" } else { "o" };
        game.play_move(&Move::new(player, coordinate))
            .await
            .expect("Move failed");
    }

    let mut seen = 0;
    while let Ok(Some(event)) = tokio::time::timeout(Duration::from_millis(200), fanin.next()).await
    {
        assert!(matches!(event, FanInEvent::GameChanged(1)));
        seen += 1;
    }
    assert!(seen >= 1, "At least one change must be reported");
    assert!(seen <= moves.len(), "Changes must not multiply");
}

#[tokio::test]
async fn test_sources_added_later_are_watched() {
    let first = session(1);
    let second = session(2);
    let mut fanin = FanIn::new();
    fanin
        .add(first.subscribe().await)
        .expect("Fan-in rejected handle");

    // The fan-in is already waiting on the first source.
    tokio::task::yield_now().await;
    fanin
        .add(second.subscribe().await)
        .expect("Fan-in rejected handle");

    second
        .play_move(&Move::new("x", Coordinate::new(2, 2, 2, 2)))
        .await
        .expect("Move failed");
    assert!(matches!(
        next_event(&mut fanin).await,
        FanInEvent::GameChanged(2)
    ));

    first
        .play_move(&Move::new("x", Coordinate::new(3, 3, 3, 3)))
        .await
        .expect("Move failed");
    assert!(matches!(
        next_event(&mut fanin).await,
        FanInEvent::GameChanged(1)
    ));
}

#[tokio::test]
async fn test_removed_source_is_returned_and_silent() {
    let game = session(1);
    let mut fanin = FanIn::new();
    let subscription = game.subscribe().await;
    let id = subscription.id();
    fanin.add(subscription).expect("Fan-in rejected handle");

    let removed = fanin.remove(id).await.expect("Fan-in stopped");
    let removed = removed.expect("Handle should be returned");
    assert_eq!(removed.id(), id);
    assert!(fanin.remove(id).await.expect("Fan-in stopped").is_none());

    game.play_move(&Move::new("x", Coordinate::new(1, 1, 1, 1)))
        .await
        .expect("Move failed");
    assert!(no_event_within(&mut fanin, Duration::from_millis(100)).await);

    game.unsubscribe(removed).await.expect("Unsubscribe failed");
}

#[tokio::test]
async fn test_new_game_is_opened_then_watched() {
    let game = session(9);
    let mut fanin = FanIn::new();
    let (sender, receiver) = tokio::sync::mpsc::unbounded_channel();
    fanin
        .watch_new_games(receiver)
        .expect("Fan-in rejected receiver");

    let subscription = game.subscribe().await;
    let expected_id = subscription.id();
    sender
        .send(NewGame {
            session: Arc::clone(&game),
            subscription,
        })
        .expect("Receiver dropped");

    match next_event(&mut fanin).await {
        FanInEvent::GameOpened {
            session,
            subscription_id,
        } => {
            assert_eq!(session.game_id(), 9);
            assert_eq!(subscription_id, expected_id);
        }
        other => panic!("Unexpected event {:?}", other),
    }

    game.play_move(&Move::new("x", Coordinate::new(1, 1, 1, 1)))
        .await
        .expect("Move failed");
    assert!(matches!(
        next_event(&mut fanin).await,
        FanInEvent::GameChanged(9)
    ));
}

#[tokio::test]
async fn test_shutdown_returns_every_handle() {
    let games: Vec<Arc<Session>> = (1..=3).map(session).collect();
    let fanin = FanIn::new();
    let (sender, receiver) = tokio::sync::mpsc::unbounded_channel();

    fanin
        .add(games[0].subscribe().await)
        .expect("Fan-in rejected handle");
    fanin
        .watch_new_games(receiver)
        .expect("Fan-in rejected receiver");
    for game in &games[1..] {
        sender
            .send(NewGame {
                session: Arc::clone(game),
                subscription: game.subscribe().await,
            })
            .expect("Receiver dropped");
    }

    let detached = fanin.shutdown().await;

    let mut queued = 0;
    for mut receiver in detached.new_games {
        receiver.close();
        while receiver.try_recv().is_ok() {
            queued += 1;
        }
    }
    assert_eq!(detached.subscriptions.len() + queued, games.len());

    let opened = detached
        .undelivered
        .iter()
        .filter(|event| matches!(event, FanInEvent::GameOpened { .. }))
        .count();
    assert_eq!(opened, detached.subscriptions.len() - 1);
}

#[tokio::test]
async fn test_dropped_session_source_is_removed() {
    let game = session(1);
    let mut fanin = FanIn::new();
    let subscription = game.subscribe().await;
    let id = subscription.id();
    fanin.add(subscription).expect("Fan-in rejected handle");

    drop(game);
    tokio::time::sleep(Duration::from_millis(50)).await;

    assert!(fanin.remove(id).await.expect("Fan-in stopped").is_none());
    assert!(no_event_within(&mut fanin, Duration::from_millis(50)).await);
}
