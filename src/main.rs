//! `uttt` - ultimate tic-tac-toe server administration.

#![warn(missing_docs)]

mod cli;

use std::sync::Arc;

use anyhow::Result;
use clap::Parser;
use cli::{Cli, Command};
use tracing::{info, instrument, warn};
use tracing_subscriber::EnvFilter;
use uttt::{Coordinate, Game, GameId, GameStore, Move, ServerConfig, Session, SessionManager, SqliteStore};

#[tokio::main]
async fn main() -> Result<()> {
    // Load .env file
    dotenvy::dotenv().ok();

    let cli = Cli::parse();

    let config = match &cli.config {
        Some(path) => ServerConfig::from_file(path)?,
        None => ServerConfig::load()?,
    };

    tracing_subscriber::fmt()
        .with_env_filter(
            EnvFilter::try_from_default_env()
                .unwrap_or_else(|_| EnvFilter::new(config.log_filter())),
        )
        .with_writer(std::io::stderr)
        .init();

    let store = Arc::new(SqliteStore::open(config.database_path().clone()).await?);
    let manager = SessionManager::new(store.clone(), config.flush_interval());

    match cli.command {
        Command::Init => {
            info!(path = %config.database_path(), "Database initialized");
            println!("Database ready at {}", config.database_path());
        }
        Command::Player { identity } => {
            let profile = manager.lookup_or_create_player(&identity).await?;
            println!("{}", serde_json::to_string_pretty(&profile)?);
        }
        Command::Games { player_id } => {
            for game_id in store.list_game_ids(&player_id).await? {
                println!("{}", game_id);
            }
        }
        Command::NewGame { player_x, player_o } => {
            let game_id = manager.create_game(&player_x, &player_o).await?;
            println!("{}", game_id);
        }
        Command::Show { game_id, viewer } => show(store.as_ref(), game_id, viewer).await?,
        Command::Play {
            game_id,
            player_id,
            game_x,
            game_y,
            sub_x,
            sub_y,
        } => {
            let coordinate = Coordinate::new(game_x, game_y, sub_x, sub_y);
            play(&manager, game_id, &player_id, coordinate).await?;
            show(store.as_ref(), game_id, Some(player_id)).await?;
        }
    }

    Ok(())
}

/// Prints the board and the JSON view of a stored game.
#[instrument(skip(store))]
async fn show(store: &dyn GameStore, game_id: GameId, viewer: Option<String>) -> Result<()> {
    let saved = store.load_game(game_id).await?;
    let game = Game::from_saved(&saved)?;
    let viewer = viewer.unwrap_or_else(|| game.player_x().to_string());

    println!("{}", game);
    match game.to_move() {
        Some(mark) => println!("{} ({}) to move", game.player_id(mark), mark),
        None => println!("Winner: {}", game.game_winner()),
    }

    let view = Session::new(game_id, game).view(&viewer).await;
    println!("{}", serde_json::to_string_pretty(&view)?);
    Ok(())
}

/// Opens the player's games, plays one move, then closes every handle so the
/// game is flushed.
#[instrument(skip(manager))]
async fn play(
    manager: &SessionManager,
    game_id: GameId,
    player_id: &str,
    coordinate: Coordinate,
) -> Result<()> {
    let mut opened = manager.open_for_player(player_id).await?;

    let result = match opened
        .games
        .iter()
        .find(|(session, _)| session.game_id() == game_id)
    {
        Some((session, _)) => session
            .play_move(&Move::new(player_id, coordinate))
            .await
            .map_err(anyhow::Error::from),
        None => Err(anyhow::anyhow!(
            "player {} is not in game {}",
            player_id,
            game_id
        )),
    };

    for (session, subscription) in opened.games {
        manager.close(&session, subscription).await?;
    }
    opened.new_games.close();
    while let Ok(new_game) = opened.new_games.try_recv() {
        manager.close(&new_game.session, new_game.subscription).await?;
    }

    if let Err(err) = result {
        warn!(error = %err, "Move not played");
        return Err(err);
    }
    info!(game_id, "Move played");
    Ok(())
}
