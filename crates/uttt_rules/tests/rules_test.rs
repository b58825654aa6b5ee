//! Tests for ultimate tic-tac-toe move validation and win propagation.

use uttt_rules::{
    BOARD_SQUARES, Coordinate, Game, Move, Owner, RuleError, SubCoordinate, TIE_PLAYER,
};

const EMPTY_BOARD: &str = "
    ___    ___    ___
    ___    ___    ___
    ___    ___    ___

    ___    ___    ___
    ___    ___    ___
    ___    ___    ___

    ___    ___    ___
    ___    ___    ___
    ___    ___    ___";

/// X to move; sub-boards (1,1), (2,1) and (3,2) are decided.
const DECIDED_BLOCKS_BOARD: &str = "
    XXX    O__    ___
    ___    _O_    XX_
    ___    __O    ___

    ___    ___    ___
    ___    ___    OOO
    ___    ___    ___

    ___    ___    ___
    ___    ___    _O_
    ___    ___    ___";

fn mv(player: &str, gx: i32, gy: i32, sx: i32, sy: i32) -> Move {
    Move::new(player, Coordinate::new(gx, gy, sx, sy))
}

fn owner_id(owner: Owner) -> String {
    owner.as_id().to_string()
}

fn block(game: &Game, x: i32, y: i32) -> String {
    owner_id(
        game.block_winner(SubCoordinate::new(x, y))
            .expect("Block lookup failed"),
    )
}

fn decided_blocks_game() -> Game {
    Game::load(
        "X",
        "O",
        DECIDED_BLOCKS_BOARD,
        Some(Coordinate::new(2, 1, 1, 1)),
    )
    .expect("Load failed")
}

#[test]
fn test_new_game_rejects_identical_players() {
    assert_eq!(Game::new("same", "same"), Err(RuleError::InvalidPlayer));
}

#[test]
fn test_new_game_is_empty() {
    let game = Game::new("X", "O").expect("New game failed");
    for coordinate in Coordinate::all() {
        let owner = game.square_owner(coordinate).expect("Lookup failed");
        assert_eq!(owner, Owner::Undecided);
    }
    assert_eq!(game.game_winner(), Owner::Undecided);
    assert!(!game.is_completed());
    assert_eq!(game.last_move(), None);
    assert_eq!(Coordinate::all().count(), BOARD_SQUARES);
}

#[test]
fn test_unknown_player_fails_and_leaves_board_unchanged() {
    let mut game = Game::new("X", "O").expect("New game failed");
    let before = game.clone();
    assert_eq!(
        game.play_move(&mv("A", 1, 1, 1, 1)),
        Err(RuleError::InvalidPlayer)
    );
    assert_eq!(game, before);
}

#[test]
fn test_out_of_range_coordinates_fail() {
    let mut game = Game::new("X", "O").expect("New game failed");
    assert_eq!(
        game.play_move(&mv("X", 0, 1, 1, 1)),
        Err(RuleError::InvalidCoordinate)
    );
    assert_eq!(
        game.play_move(&mv("X", 1, 1, 1, 4)),
        Err(RuleError::InvalidCoordinate)
    );
    assert_eq!(
        game.square_owner(Coordinate::new(4, 1, 1, 1)),
        Err(RuleError::InvalidCoordinate)
    );
    assert_eq!(
        game.block_winner(SubCoordinate::new(1, -1)),
        Err(RuleError::InvalidCoordinate)
    );
}

#[test]
fn test_o_cannot_open_and_x_can_open_anywhere() {
    for coordinate in Coordinate::all() {
        let mut game = Game::new("X", "O").expect("New game failed");
        assert_eq!(
            game.play_move(&Move::new("O", coordinate)),
            Err(RuleError::WrongTurn)
        );
        game.play_move(&Move::new("X", coordinate))
            .expect("Opening move failed");
        assert_eq!(
            owner_id(game.square_owner(coordinate).expect("Lookup failed")),
            "X"
        );
    }
}

#[test]
fn test_moves_alternate_and_follow_forced_subgrid() {
    let mut game = Game::new("X", "O").expect("New game failed");
    game.play_move(&mv("X", 1, 1, 1, 1)).expect("X1111 failed");
    game.play_move(&mv("O", 1, 1, 2, 1)).expect("O1121 failed");
    game.play_move(&mv("X", 2, 1, 1, 1)).expect("X2111 failed");
    game.play_move(&mv("O", 1, 1, 1, 3)).expect("O1113 failed");

    assert_eq!(
        game.play_move(&mv("O", 1, 1, 3, 1)),
        Err(RuleError::WrongTurn)
    );
    // Previous cell (1,3) sends X to sub-board (1,3).
    assert_eq!(
        game.play_move(&mv("X", 3, 3, 3, 1)),
        Err(RuleError::WrongSubgrid)
    );
    game.play_move(&mv("X", 1, 3, 3, 1)).expect("X1331 failed");
}

#[test]
fn test_forced_subgrid_after_corner_opening() {
    let mut game = Game::new("X", "O").expect("New game failed");
    game.play_move(&mv("X", 1, 1, 1, 1)).expect("Opening failed");
    assert_eq!(
        game.play_move(&mv("O", 2, 2, 1, 1)),
        Err(RuleError::WrongSubgrid)
    );

    let valid = game.valid_moves("O");
    assert_eq!(valid.len(), 8);
    assert!(
        valid
            .iter()
            .all(|c| c.game_square == SubCoordinate::new(1, 1))
    );
    assert!(game.valid_moves("X").is_empty());
}

#[test]
fn test_occupied_square_fails() {
    let mut game = Game::new("X", "O").expect("New game failed");
    game.play_move(&mv("X", 2, 2, 2, 2)).expect("Opening failed");
    assert_eq!(
        game.play_move(&mv("O", 2, 2, 2, 2)),
        Err(RuleError::SquarePlayed)
    );
}

#[test]
fn test_connect_three_wins_block() {
    let mut game = Game::load(
        "X",
        "O",
        "
        XX_    O__    ___
        ___    ___    ___
        ___    ___    ___

        ___    ___    ___
        ___    ___    ___
        ___    ___    ___

        ___    ___    ___
        ___    ___    ___
        ___    ___    ___",
        Some(Coordinate::new(2, 1, 1, 1)),
    )
    .expect("Load failed");

    assert_eq!(block(&game, 1, 1), "");
    game.play_move(&mv("X", 1, 1, 3, 1)).expect("Winning move failed");
    assert_eq!(block(&game, 1, 1), "X");
    assert_eq!(game.game_winner(), Owner::Undecided);
}

#[test]
fn test_sent_to_decided_block_may_play_any_open_block() {
    let cases = [
        (mv("X", 1, 1, 2, 3), Err(RuleError::WrongSubgrid)),
        (mv("X", 1, 1, 1, 1), Err(RuleError::WrongSubgrid)),
        (mv("X", 2, 1, 2, 2), Err(RuleError::WrongSubgrid)),
        (mv("X", 3, 1, 2, 3), Ok(())),
        (mv("X", 3, 1, 2, 2), Err(RuleError::SquarePlayed)),
        (mv("X", 3, 2, 2, 2), Err(RuleError::WrongSubgrid)),
        (mv("X", 3, 3, 2, 2), Err(RuleError::SquarePlayed)),
        (mv("X", 2, 3, 2, 2), Ok(())),
        (mv("X", 2, 2, 2, 2), Ok(())),
        (mv("X", 1, 3, 2, 2), Ok(())),
        (mv("X", 1, 2, 2, 2), Ok(())),
        (mv("O", 1, 2, 2, 2), Err(RuleError::WrongTurn)),
    ];

    for (m, expected) in cases {
        let mut game = decided_blocks_game();
        assert_eq!(game.play_move(&m), expected, "move {}", m);
    }
}

#[test]
fn test_valid_moves_match_play_move() {
    let game = decided_blocks_game();
    let valid = game.valid_moves("X");
    assert!(!valid.is_empty());

    for coordinate in Coordinate::all() {
        let mut probe = game.clone();
        let legal = probe.play_move(&Move::new("X", coordinate)).is_ok();
        assert_eq!(legal, valid.contains(&coordinate), "at {}", coordinate);
    }
    assert!(game.valid_moves("nobody").is_empty());
}

#[test]
fn test_load_first_row_xxx_wins_block_without_moves() {
    let board = format!("XXX{}", "_".repeat(78));
    let game = Game::load("alice", "bob", &board, None).expect("Load failed");
    assert_eq!(
        game.block_winner(SubCoordinate::new(1, 1))
            .expect("Lookup failed"),
        Owner::Player("alice".to_string())
    );
    assert_eq!(game.last_move(), None);
}

#[test]
fn test_load_rejects_wrong_length() {
    assert_eq!(
        Game::load("X", "O", "XO_", None),
        Err(RuleError::InvalidInput)
    );
    let too_long = format!("{}_", EMPTY_BOARD);
    assert_eq!(
        Game::load("X", "O", &too_long, None),
        Err(RuleError::InvalidInput)
    );
}

#[test]
fn test_load_rejects_bad_last_move() {
    assert_eq!(
        Game::load("X", "O", EMPTY_BOARD, Some(Coordinate::new(1, 1, 1, 1))),
        Err(RuleError::InvalidLastMove)
    );
    assert_eq!(
        Game::load("X", "O", EMPTY_BOARD, Some(Coordinate::new(1, 1, 1, 0))),
        Err(RuleError::InvalidCoordinate)
    );
}

#[test]
fn test_load_empty_board_lets_x_open_anywhere() {
    let game = Game::load("X", "O", EMPTY_BOARD, None).expect("Load failed");
    assert_eq!(game.valid_moves("X").len(), BOARD_SQUARES);
    assert!(game.valid_moves("O").is_empty());
}

#[test]
fn test_calculate_victor_in_progress() {
    let game = Game::load(
        "X",
        "O",
        "
        XX_    OX_    X_O
        X__    _X_    _O_
        ___    _X_    O_X

        _O_    ___    X__
        OOO    _X_    _O_
        _OX    ___    __X

        ___    ___    XOX
        XXX    ___    OOX
        ___    OOO    XXO",
        Some(Coordinate::new(2, 1, 1, 1)),
    )
    .expect("Load failed");

    assert_eq!(block(&game, 1, 1), "");
    assert_eq!(block(&game, 2, 1), "X");
    assert_eq!(block(&game, 3, 1), "O");
    assert_eq!(block(&game, 1, 2), "O");
    assert_eq!(block(&game, 2, 2), "");
    assert_eq!(block(&game, 3, 2), "");
    assert_eq!(block(&game, 1, 3), "X");
    assert_eq!(block(&game, 2, 3), "O");
    assert_eq!(block(&game, 3, 3), TIE_PLAYER);
    assert_eq!(game.game_winner(), Owner::Undecided);
    assert!(!game.is_completed());
}

#[test]
fn test_calculate_victor_row_win() {
    let mut game = Game::load(
        "X",
        "O",
        "
        XXX    OX_    X_O
        X__    _X_    _X_
        ___    _X_    O_X

        _O_    ___    X__
        OOO    _X_    _O_
        _OX    ___    __X

        ___    ___    XOX
        XXX    ___    OOX
        ___    OOO    XXO",
        Some(Coordinate::new(2, 1, 1, 1)),
    )
    .expect("Load failed");

    assert_eq!(block(&game, 1, 1), "X");
    assert_eq!(block(&game, 3, 1), "X");
    assert_eq!(owner_id(game.game_winner()), "X");
    assert!(game.is_completed());
    assert_eq!(game.to_move(), None);

    assert!(game.valid_moves("X").is_empty());
    assert_eq!(
        game.play_move(&mv("X", 2, 2, 1, 1)),
        Err(RuleError::GameCompleted)
    );
}

#[test]
fn test_calculate_victor_tie() {
    let game = Game::load(
        "X",
        "O",
        "
        OXO    OX_    X_O
        XXO    _X_    _X_
        __O    _X_    O_X

        XO_    __X    X_O
        OXO    _XX    _O_
        _OX    __X    O_X

        OOO    ___    XOO
        XXO    ___    OXX
        ___    OOO    XXO",
        Some(Coordinate::new(2, 1, 1, 1)),
    )
    .expect("Load failed");

    assert_eq!(block(&game, 1, 1), "O");
    assert_eq!(block(&game, 2, 2), "X");
    assert_eq!(block(&game, 3, 2), "O");
    assert_eq!(block(&game, 3, 3), TIE_PLAYER);
    assert_eq!(game.game_winner(), Owner::Tie);
    assert_eq!(owner_id(game.game_winner()), TIE_PLAYER);
}

#[test]
fn test_calculate_victor_column_win() {
    let game = Game::load(
        "X",
        "O",
        "
        OOO    OX_    X_O
        X__    _X_    _X_
        ___    _X_    O_X

        _O_    ___    X__
        OOO    _X_    _O_
        _OX    ___    __X

        OOO    ___    XOX
        XXO    ___    OOX
        ___    OOO    XXO",
        Some(Coordinate::new(2, 1, 1, 1)),
    )
    .expect("Load failed");

    assert_eq!(block(&game, 1, 1), "O");
    assert_eq!(block(&game, 1, 2), "O");
    assert_eq!(block(&game, 1, 3), "O");
    assert_eq!(owner_id(game.game_winner()), "O");
}

/// Plays a deterministic pseudo-random game to completion, returning every
/// intermediate state.
fn scripted_game(seed: u64) -> Vec<Game> {
    let mut game = Game::new("X", "O").expect("New game failed");
    let mut states = vec![game.clone()];
    let mut rng = seed;

    while let Some(mark) = game.to_move() {
        let player = game.player_id(mark).to_string();
        let moves = game.valid_moves(&player);
        if moves.is_empty() {
            break;
        }
        rng = rng
            .wrapping_mul(6364136223846793005)
            .wrapping_add(1442695040888963407);
        let pick = moves[((rng >> 33) as usize) % moves.len()];
        game.play_move(&Move::new(player, pick)).expect("Scripted move failed");
        states.push(game.clone());
    }

    states
}

#[test]
fn test_owners_never_change_once_decided() {
    for seed in [1, 7, 42, 1234, 99999] {
        let states = scripted_game(seed);
        for pair in states.windows(2) {
            let (before, after) = (&pair[0], &pair[1]);
            for sub in SubCoordinate::ALL {
                let was = before.block_winner(sub).expect("Lookup failed");
                let now = after.block_winner(sub).expect("Lookup failed");
                if was.is_decided() {
                    assert_eq!(was, now, "block {} changed (seed {})", sub, seed);
                }
            }
            if before.game_winner().is_decided() {
                assert_eq!(before.game_winner(), after.game_winner());
            }
        }
    }
}

#[test]
fn test_save_load_round_trip_preserves_moves_and_owners() {
    for seed in [3, 11, 2024] {
        for game in scripted_game(seed) {
            let restored = Game::from_saved(&game.save()).expect("Reload failed");
            for player in ["X", "O"] {
                assert_eq!(restored.valid_moves(player), game.valid_moves(player));
            }
            for coordinate in Coordinate::all() {
                assert_eq!(
                    restored.square_owner(coordinate),
                    game.square_owner(coordinate)
                );
            }
            for sub in SubCoordinate::ALL {
                assert_eq!(restored.block_winner(sub), game.block_winner(sub));
            }
            assert_eq!(restored.game_winner(), game.game_winner());
            assert_eq!(restored.last_move(), game.last_move());
        }
    }
}

#[test]
fn test_saved_board_uses_visual_layout() {
    let mut game = Game::new("X", "O").expect("New game failed");
    // Top-right cell of the top-right sub-board is the ninth character.
    game.play_move(&mv("X", 3, 1, 3, 1)).expect("Move failed");
    let saved = game.save();
    assert_eq!(saved.board.len(), BOARD_SQUARES);
    assert_eq!(saved.board.find('X'), Some(8));

    // Centre of the centre sub-board is the 41st character.
    let mut game = Game::new("X", "O").expect("New game failed");
    game.play_move(&mv("X", 2, 2, 2, 2)).expect("Move failed");
    assert_eq!(game.save().board.find('X'), Some(40));
}

#[test]
fn test_move_wire_format() {
    let json = r#"{"playerID":"p1","coordinate":{"gameSquare":{"x":1,"y":2},"subgridSquare":{"x":3,"y":1}}}"#;
    let parsed: Move = serde_json::from_str(json).expect("Parse failed");
    assert_eq!(parsed, mv("p1", 1, 2, 3, 1));
    let back = serde_json::to_string(&parsed).expect("Serialize failed");
    assert_eq!(back, json);
}
