use std::time::Duration;

use gridduel_core::{
    CellCoord, Command, EndOfMatch, EndReason, Event, GameConfig, GamePhase, PlayerId,
    SessionId, UnitId, ValidationErrorKind,
};
use gridduel_world::{self as world, query, GridField, World};

const PLAYER1_MELEE: UnitId = UnitId::new(6);
const PLAYER1_MELEE_AT: CellCoord = CellCoord::new(2, 2);

fn started_world(config: GameConfig) -> World {
    let field = GridField::open(&config).expect("open field");
    let mut world = World::with_field(config, field);
    let mut events = Vec::new();
    for session in [1, 2] {
        world::apply(
            &mut world,
            Command::ConnectPlayer {
                session: SessionId::new(session),
            },
            &mut events,
        );
    }
    assert_eq!(query::state(&world).phase, GamePhase::Playing);
    world
}

fn run(world: &mut World, command: Command) -> Vec<Event> {
    let mut events = Vec::new();
    world::apply(world, command, &mut events);
    events
}

fn pause(world: &mut World) {
    let _ = run(
        world,
        Command::Tick {
            dt: Duration::from_millis(1_100),
        },
    );
}

fn end_turn(world: &mut World, player: PlayerId) -> Vec<Event> {
    pause(world);
    run(world, Command::RequestEndTurn { player })
}

fn rejection(events: &[Event]) -> Option<ValidationErrorKind> {
    events.iter().find_map(|event| match event {
        Event::CommandRejected { outcome, .. } => Some(outcome.error_kind()),
        _ => None,
    })
}

fn match_end(events: &[Event]) -> Option<EndOfMatch> {
    events.iter().find_map(|event| match event {
        Event::MatchEnded(end) => Some(*end),
        _ => None,
    })
}

fn move_command(player: PlayerId, unit_id: UnitId, target: CellCoord) -> Command {
    Command::RequestMove {
        player,
        unit_id,
        target,
        claimed_travel_secs: None,
    }
}

#[test]
fn diagonal_move_within_budget_is_accepted_once_per_turn() {
    let mut world = started_world(GameConfig::default());
    let unit = query::unit(&world, PLAYER1_MELEE).expect("melee unit");
    assert_eq!(unit.position, PLAYER1_MELEE_AT);
    assert_eq!(unit.speed, 4);

    let events = run(
        &mut world,
        move_command(PlayerId::Player1, PLAYER1_MELEE, CellCoord::new(5, 5)),
    );
    assert_eq!(rejection(&events), None, "unexpected rejection: {events:?}");
    assert!(events.contains(&Event::UnitMoved {
        player: PlayerId::Player1,
        unit_id: PLAYER1_MELEE,
        from: PLAYER1_MELEE_AT,
        to: CellCoord::new(5, 5),
        waypoints: vec![PLAYER1_MELEE_AT, CellCoord::new(5, 5)],
    }));

    let unit = query::unit(&world, PLAYER1_MELEE).expect("melee unit");
    assert_eq!(unit.position, CellCoord::new(5, 5));
    assert!(unit.has_moved_this_turn);
    assert!(!query::can_unit_move(&world, PLAYER1_MELEE));
    assert!(query::can_unit_attack(&world, PLAYER1_MELEE));

    let events = run(
        &mut world,
        move_command(PlayerId::Player1, PLAYER1_MELEE, CellCoord::new(6, 6)),
    );
    assert_eq!(rejection(&events), Some(ValidationErrorKind::ActionNotAvailable));
    assert_eq!(
        query::unit(&world, PLAYER1_MELEE).map(|unit| unit.position),
        Some(CellCoord::new(5, 5))
    );
}

#[test]
fn move_budget_resets_at_owners_next_turn() {
    let mut world = started_world(GameConfig::default());
    let _ = run(
        &mut world,
        move_command(PlayerId::Player1, PLAYER1_MELEE, CellCoord::new(5, 5)),
    );
    assert!(!query::can_unit_move(&world, PLAYER1_MELEE));

    let _ = end_turn(&mut world, PlayerId::Player1);
    assert!(!query::can_unit_move(&world, PLAYER1_MELEE));
    let _ = end_turn(&mut world, PlayerId::Player2);

    assert!(query::can_unit_move(&world, PLAYER1_MELEE));
    let unit = query::unit(&world, PLAYER1_MELEE).expect("melee unit");
    assert!(!unit.has_moved_this_turn);
}

#[test]
fn distant_target_is_too_long_for_budget() {
    let mut world = started_world(GameConfig::default());
    let events = run(
        &mut world,
        move_command(PlayerId::Player1, PLAYER1_MELEE, CellCoord::new(9, 2)),
    );
    assert_eq!(rejection(&events), Some(ValidationErrorKind::PathTooLong));
    assert!(query::can_unit_move(&world, PLAYER1_MELEE));
}

#[test]
fn occupied_target_is_blocked() {
    let mut world = started_world(GameConfig::default());
    let events = run(
        &mut world,
        move_command(PlayerId::Player1, PLAYER1_MELEE, CellCoord::new(1, 2)),
    );
    assert_eq!(rejection(&events), Some(ValidationErrorKind::ObstacleBlocking));
}

#[test]
fn unknown_unit_is_reported() {
    let mut world = started_world(GameConfig::default());
    let events = run(
        &mut world,
        move_command(PlayerId::Player1, UnitId::new(99), CellCoord::new(3, 3)),
    );
    assert_eq!(rejection(&events), Some(ValidationErrorKind::UnitNotFound));
}

#[test]
fn end_turn_alternates_and_counts_rounds() {
    let mut world = started_world(GameConfig::default());
    let mut observed = Vec::new();
    for _ in 0..4 {
        let active = query::state(&world).active_player.expect("active player");
        let events = end_turn(&mut world, active);
        assert_eq!(rejection(&events), None);
        let state = query::state(&world);
        observed.push((state.active_player, state.turn_number));
    }

    assert_eq!(
        observed,
        vec![
            (Some(PlayerId::Player2), 1),
            (Some(PlayerId::Player1), 2),
            (Some(PlayerId::Player2), 2),
            (Some(PlayerId::Player1), 3),
        ]
    );
}

#[test]
fn end_turn_from_waiting_player_is_rejected() {
    let mut world = started_world(GameConfig::default());
    let before = query::state(&world).clone();
    let events = end_turn(&mut world, PlayerId::Player2);

    assert_eq!(rejection(&events), Some(ValidationErrorKind::NotYourTurn));
    assert_eq!(query::state(&world).active_player, before.active_player);
    assert_eq!(query::state(&world).turn_number, before.turn_number);
}

#[test]
fn expiry_after_manual_end_turn_does_not_skip_a_turn() {
    let mut world = started_world(GameConfig::default());
    let _ = end_turn(&mut world, PlayerId::Player1);
    let events = run(
        &mut world,
        Command::Tick {
            dt: Duration::from_secs(30),
        },
    );

    assert!(!events
        .iter()
        .any(|event| matches!(event, Event::TurnChanged { .. })));
    assert_eq!(query::state(&world).active_player, Some(PlayerId::Player2));
    assert!(query::turn_stats(&world).remaining > 0.0);
}

#[test]
fn exhausted_countdown_refuses_actions_until_the_next_tick() {
    let mut world = started_world(GameConfig {
        turn_duration_secs: 0.0,
        ..GameConfig::default()
    });
    assert_eq!(query::state(&world).turn_time_left, 0.0);

    let events = run(
        &mut world,
        move_command(PlayerId::Player1, PLAYER1_MELEE, CellCoord::new(3, 3)),
    );
    assert_eq!(rejection(&events), Some(ValidationErrorKind::TimeExpired));
    assert_eq!(
        query::unit(&world, PLAYER1_MELEE).map(|unit| unit.position),
        Some(PLAYER1_MELEE_AT)
    );

    pause(&mut world);
    assert_eq!(query::state(&world).active_player, Some(PlayerId::Player2));
}

fn teleport_config() -> GameConfig {
    GameConfig {
        field_width: 10,
        field_height: 10,
        units_per_type: 1,
        validate_movement: false,
        ..GameConfig::default()
    }
}

#[test]
fn destroying_last_enemy_unit_ends_match() {
    // Player one: ranged 1 at (1, 1), melee 2 at (2, 1).
    // Player two: ranged 3 at (8, 8), melee 4 at (7, 8).
    let mut world = started_world(teleport_config());
    let melee = UnitId::new(2);

    let _ = run(
        &mut world,
        move_command(PlayerId::Player1, melee, CellCoord::new(7, 7)),
    );
    assert_eq!(query::targets_in_range(&world, melee), vec![UnitId::new(4)]);
    let events = run(
        &mut world,
        Command::RequestAttack {
            player: PlayerId::Player1,
            attacker_id: melee,
            target_id: UnitId::new(4),
        },
    );
    assert!(events.contains(&Event::UnitDestroyed {
        unit_id: UnitId::new(4),
        owner: PlayerId::Player2,
    }));
    assert_eq!(
        query::state(&world).active_player,
        Some(PlayerId::Player2),
        "both actions spent, turn should pass automatically"
    );

    let _ = end_turn(&mut world, PlayerId::Player2);
    pause(&mut world);
    let _ = run(
        &mut world,
        move_command(PlayerId::Player1, melee, CellCoord::new(8, 7)),
    );
    let events = run(
        &mut world,
        Command::RequestAttack {
            player: PlayerId::Player1,
            attacker_id: melee,
            target_id: UnitId::new(3),
        },
    );

    assert_eq!(
        match_end(&events),
        Some(EndOfMatch {
            winner: Some(PlayerId::Player1),
            reason: EndReason::AllEnemyUnitsDestroyed,
            final_turn: 2,
        })
    );
    assert_eq!(query::state(&world).phase, GamePhase::GameOver);
    assert_eq!(query::count_of(&world, PlayerId::Player2), 0);
}

#[test]
fn attack_out_of_range_is_rejected() {
    let mut world = started_world(GameConfig::default());
    let events = run(
        &mut world,
        Command::RequestAttack {
            player: PlayerId::Player1,
            attacker_id: UnitId::new(1),
            target_id: UnitId::new(3),
        },
    );
    assert_eq!(rejection(&events), Some(ValidationErrorKind::TargetOutOfRange));
    assert_eq!(query::count_of(&world, PlayerId::Player2), 4);
}

#[test]
fn obstacle_blocks_line_of_sight_for_attacks() {
    let config = teleport_config();
    let mut field = GridField::open(&config).expect("open field");
    assert!(field.add_obstacle(CellCoord::new(3, 1)));
    let mut world = World::with_field(config, field);
    for session in [1, 2] {
        let _ = run(
            &mut world,
            Command::ConnectPlayer {
                session: SessionId::new(session),
            },
        );
    }

    let _ = end_turn(&mut world, PlayerId::Player1);
    let _ = run(
        &mut world,
        move_command(PlayerId::Player2, UnitId::new(3), CellCoord::new(5, 1)),
    );
    let _ = end_turn(&mut world, PlayerId::Player2);

    assert!(query::targets_in_range(&world, UnitId::new(1)).is_empty());
    let events = run(
        &mut world,
        Command::RequestAttack {
            player: PlayerId::Player1,
            attacker_id: UnitId::new(1),
            target_id: UnitId::new(3),
        },
    );
    assert_eq!(rejection(&events), Some(ValidationErrorKind::ObstacleBlocking));
}

#[test]
fn draw_resolution_activates_infinite_speed_on_level_counts() {
    let config = GameConfig {
        draw_turn: 5,
        ..GameConfig::default()
    };
    let mut world = started_world(config);
    let mut activated = Vec::new();
    while query::state(&world).turn_number < 5 {
        let active = query::state(&world).active_player.expect("active player");
        activated.extend(end_turn(&mut world, active).into_iter().filter_map(
            |event| match event {
                Event::InfiniteSpeedActivated { turn_number } => Some(turn_number),
                _ => None,
            },
        ));
    }

    assert_eq!(activated, vec![5]);
    let state = query::state(&world);
    assert!(state.infinite_speed_enabled);
    assert_eq!(state.phase, GamePhase::Playing);
    assert_eq!(state.turn_time_left, 120.0);
    assert_eq!(query::movement_budget(&world, PLAYER1_MELEE), None);

    let events = run(
        &mut world,
        move_command(PlayerId::Player1, PLAYER1_MELEE, CellCoord::new(12, 2)),
    );
    assert_eq!(rejection(&events), None, "uncapped move rejected: {events:?}");
}

#[test]
fn draw_resolution_awards_unit_advantage() {
    let config = GameConfig {
        draw_turn: 5,
        ..teleport_config()
    };
    let mut world = started_world(config);
    let melee = UnitId::new(2);
    let _ = run(
        &mut world,
        move_command(PlayerId::Player1, melee, CellCoord::new(7, 7)),
    );
    let _ = run(
        &mut world,
        Command::RequestAttack {
            player: PlayerId::Player1,
            attacker_id: melee,
            target_id: UnitId::new(4),
        },
    );

    let mut ended = None;
    while ended.is_none() {
        let active = query::state(&world).active_player.expect("active player");
        ended = match_end(&end_turn(&mut world, active));
    }

    assert_eq!(
        ended,
        Some(EndOfMatch {
            winner: Some(PlayerId::Player1),
            reason: EndReason::UnitCountAdvantage,
            final_turn: 5,
        })
    );
}

#[test]
fn disconnect_during_play_awards_remaining_player() {
    let mut world = started_world(GameConfig::default());
    let events = run(
        &mut world,
        Command::DisconnectPlayer {
            session: SessionId::new(1),
        },
    );

    assert_eq!(
        match_end(&events),
        Some(EndOfMatch {
            winner: Some(PlayerId::Player2),
            reason: EndReason::PlayerDisconnected,
            final_turn: 1,
        })
    );
    assert_eq!(query::end_of_match(&world), match_end(&events));
    assert!(events.contains(&Event::PlayerDisconnected {
        session: SessionId::new(1),
        player: PlayerId::Player1,
    }));

    let events = end_turn(&mut world, PlayerId::Player1);
    assert_eq!(rejection(&events), Some(ValidationErrorKind::General));
}

#[test]
fn declared_cheater_forfeits() {
    let mut world = started_world(GameConfig::default());
    let events = run(
        &mut world,
        Command::DeclareCheater {
            player: PlayerId::Player2,
        },
    );

    assert_eq!(
        match_end(&events),
        Some(EndOfMatch {
            winner: Some(PlayerId::Player1),
            reason: EndReason::CheatDetected,
            final_turn: 1,
        })
    );
}

#[test]
fn third_connection_is_ignored() {
    let mut world = started_world(GameConfig::default());
    let events = run(
        &mut world,
        Command::ConnectPlayer {
            session: SessionId::new(3),
        },
    );
    assert!(events.is_empty());
    assert_eq!(query::player_for_session(&world, SessionId::new(3)), None);
}
