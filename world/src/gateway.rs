//! Validation and execution of player commands against the canonical state.

use std::{collections::HashSet, time::Duration};

use gridduel_core::{
    ActionKind, CellCoord, CheatKind, EndOfMatch, EndReason, Event, GamePhase, GameState,
    PlayerId, SessionId, UnitId, UnitKind, UnitRecord, ValidationErrorKind, ValidationOutcome,
};

use crate::{
    anticheat::ActionRecord,
    navigation::{calculate_path_length, optimize_path, PathPlanner},
    rules::Verdict,
    World,
};

const INFINITE_SPEED_FACTOR: u32 = 2;

pub(crate) fn connect(world: &mut World, session: SessionId, out_events: &mut Vec<Event>) {
    if world.sessions.contains(&Some(session)) {
        tracing::debug!(session = session.get(), "session already seated");
        return;
    }
    if world.store.state().phase != GamePhase::WaitingForPlayers {
        tracing::warn!(session = session.get(), "connection refused, match already running");
        return;
    }

    let Some(seat) = world.sessions.iter().position(Option::is_none) else {
        return;
    };
    world.sessions[seat] = Some(session);
    let player = PlayerId::ALL[seat];
    tracing::info!(session = session.get(), ?player, "player connected");
    out_events.push(Event::PlayerConnected { session, player });

    if world.sessions.iter().all(Option::is_some) {
        start_match(world, out_events);
    }
}

pub(crate) fn disconnect(world: &mut World, session: SessionId, out_events: &mut Vec<Event>) {
    let Some(seat) = world
        .sessions
        .iter()
        .position(|seated| *seated == Some(session))
    else {
        return;
    };
    world.sessions[seat] = None;
    let player = PlayerId::ALL[seat];
    tracing::info!(session = session.get(), ?player, "player disconnected");
    out_events.push(Event::PlayerDisconnected { session, player });

    if world.store.state().phase == GamePhase::Playing {
        finish_match(
            world,
            Some(player.opponent()),
            EndReason::PlayerDisconnected,
            out_events,
        );
    }
}

pub(crate) fn declare_cheater(world: &mut World, player: PlayerId, out_events: &mut Vec<Event>) {
    if world.store.state().phase != GamePhase::Playing {
        return;
    }
    tracing::warn!(?player, "player declared a cheater");
    finish_match(
        world,
        Some(player.opponent()),
        EndReason::CheatDetected,
        out_events,
    );
}

pub(crate) fn tick(world: &mut World, dt: Duration, out_events: &mut Vec<Event>) {
    if !world.turns.tick(&mut world.store, dt) {
        return;
    }
    if let Some(player) = world.store.state().active_player {
        advance_turn(world, player, out_events);
    }
}

pub(crate) fn request_move(
    world: &mut World,
    player: PlayerId,
    unit_id: UnitId,
    target: CellCoord,
    claimed_travel_secs: Option<f32>,
    out_events: &mut Vec<Event>,
) {
    let record = ActionRecord {
        kind: ActionKind::Move,
        timestamp: world.elapsed,
        position: Some(target),
        unit_id: Some(unit_id),
        target_id: None,
    };
    if let Err(outcome) = admit_turn_action(world, player, record, out_events) {
        reject(player, ActionKind::Move, outcome, out_events);
        return;
    }

    match validate_move(world, player, unit_id, target, claimed_travel_secs, out_events) {
        Ok((unit, path)) => execute_move(world, unit, target, &path, out_events),
        Err(outcome) => reject(player, ActionKind::Move, outcome, out_events),
    }
}

pub(crate) fn request_attack(
    world: &mut World,
    player: PlayerId,
    attacker_id: UnitId,
    target_id: UnitId,
    out_events: &mut Vec<Event>,
) {
    let record = ActionRecord {
        kind: ActionKind::Attack,
        timestamp: world.elapsed,
        position: None,
        unit_id: Some(attacker_id),
        target_id: Some(target_id),
    };
    if let Err(outcome) = admit_turn_action(world, player, record, out_events) {
        reject(player, ActionKind::Attack, outcome, out_events);
        return;
    }

    match validate_attack(world, player, attacker_id, target_id, out_events) {
        Ok((attacker, target)) => execute_attack(world, attacker, target, out_events),
        Err(outcome) => reject(player, ActionKind::Attack, outcome, out_events),
    }
}

pub(crate) fn request_end_turn(world: &mut World, player: PlayerId, out_events: &mut Vec<Event>) {
    let record = ActionRecord {
        kind: ActionKind::EndTurn,
        timestamp: world.elapsed,
        position: None,
        unit_id: None,
        target_id: None,
    };
    if let Err(outcome) = admit_action(world, player, record, out_events) {
        reject(player, ActionKind::EndTurn, outcome, out_events);
        return;
    }

    match world.turns.end_turn(&mut world.store, player) {
        Ok(handoff) => {
            tracing::debug!(?player, "turn ended on request");
            resolve_handoff(world, handoff.next_player, handoff.round_started, out_events);
        }
        Err(outcome) => reject(player, ActionKind::EndTurn, outcome, out_events),
    }
}

/// Whether `unit_id` may still move during the running turn.
pub(crate) fn can_unit_move(world: &World, unit_id: UnitId) -> bool {
    let state = world.store.state();
    world.store.unit(unit_id).is_some_and(|unit| {
        owns_turn(state, unit.owner) && state.can_move && !unit.has_moved_this_turn
    })
}

/// Whether `unit_id` may still attack during the running turn.
pub(crate) fn can_unit_attack(world: &World, unit_id: UnitId) -> bool {
    let state = world.store.state();
    world.store.unit(unit_id).is_some_and(|unit| {
        owns_turn(state, unit.owner) && state.can_attack && !unit.has_attacked_this_turn
    })
}

/// Enemy units the attacker could legally hit, in ascending id order.
pub(crate) fn targets_in_range(world: &World, attacker_id: UnitId) -> Vec<UnitId> {
    let Some(attacker) = world.store.unit(attacker_id) else {
        return Vec::new();
    };
    let planner = PathPlanner::new(&world.field);
    world
        .store
        .units_of(attacker.owner.opponent())
        .filter(|target| {
            attacker.position.euclidean_distance(target.position) <= attacker.attack_range as f32
        })
        .filter(|target| {
            !world.config.validate_line_of_sight
                || planner.has_line_of_sight(attacker.position, target.position)
        })
        .map(|target| target.id)
        .collect()
}

/// Movement budget of the unit under the current escalation state.
pub(crate) fn movement_budget(world: &World, unit: &UnitRecord) -> Option<u32> {
    if world.store.state().infinite_speed_enabled {
        None
    } else {
        Some(unit.speed)
    }
}

/// Cells held by every unit except `mover`.
pub(crate) fn occupied_cells(world: &World, mover: Option<UnitId>) -> HashSet<CellCoord> {
    world
        .store
        .units()
        .filter(|unit| Some(unit.id) != mover)
        .map(|unit| unit.position)
        .collect()
}

fn start_match(world: &mut World, out_events: &mut Vec<Event>) {
    world.store.replace_state(GameState {
        turn_number: 1,
        phase: GamePhase::Playing,
        infinite_speed_enabled: false,
        ..GameState::default()
    });
    out_events.push(Event::MatchStarted {
        width: world.field.width(),
        height: world.field.height(),
    });
    tracing::info!(
        width = world.field.width(),
        height = world.field.height(),
        obstacles = world.field.obstacle_count(),
        "match started"
    );

    let player1 = world.field.spawn_points(PlayerId::Player1).to_vec();
    let player2 = world.field.spawn_points(PlayerId::Player2).to_vec();
    for (ours, theirs) in player1.chunks(2).zip(player2.chunks(2)) {
        for (owner, spawns) in [(PlayerId::Player1, ours), (PlayerId::Player2, theirs)] {
            for spawn in spawns {
                spawn_unit(world, owner, spawn.kind(), spawn.cell(), out_events);
            }
        }
    }

    world.turns.start_turn(&mut world.store, PlayerId::Player1, out_events);
}

fn spawn_unit(
    world: &mut World,
    owner: PlayerId,
    kind: UnitKind,
    cell: CellCoord,
    out_events: &mut Vec<Event>,
) {
    world.next_unit_id += 1;
    let unit = UnitRecord::spawn(
        UnitId::new(world.next_unit_id),
        owner,
        kind,
        cell,
        &world.config,
    );
    world.store.add_unit(unit.clone());
    out_events.push(Event::UnitSpawned { unit });
}

/// Rate check shared by every player action.
fn admit_action(
    world: &mut World,
    player: PlayerId,
    record: ActionRecord,
    out_events: &mut Vec<Event>,
) -> Result<(), ValidationOutcome> {
    if world.store.state().phase != GamePhase::Playing {
        return Err(ValidationOutcome::rejected(
            ValidationErrorKind::General,
            "match is not in progress",
        ));
    }

    world.history.admit(player, record).map_err(|details| {
        report_cheat(player, CheatKind::ActionSpam, details, out_events);
        ValidationOutcome::rejected(ValidationErrorKind::Spam, "too many actions")
    })
}

/// Rate check plus the turn ownership and countdown checks of unit actions.
fn admit_turn_action(
    world: &mut World,
    player: PlayerId,
    record: ActionRecord,
    out_events: &mut Vec<Event>,
) -> Result<(), ValidationOutcome> {
    admit_action(world, player, record, out_events)?;

    let state = world.store.state();
    if state.active_player != Some(player) {
        return Err(ValidationOutcome::rejected(
            ValidationErrorKind::NotYourTurn,
            "it is not your turn",
        ));
    }
    if state.turn_time_left <= 0.0 {
        return Err(ValidationOutcome::rejected(
            ValidationErrorKind::TimeExpired,
            "turn time expired",
        ));
    }
    Ok(())
}

fn validate_move(
    world: &World,
    player: PlayerId,
    unit_id: UnitId,
    target: CellCoord,
    claimed_travel_secs: Option<f32>,
    out_events: &mut Vec<Event>,
) -> Result<(UnitRecord, Vec<CellCoord>), ValidationOutcome> {
    let unit = world.store.unit(unit_id).cloned().ok_or_else(|| {
        ValidationOutcome::rejected(ValidationErrorKind::UnitNotFound, "unit does not exist")
    })?;
    if unit.owner != player {
        flag_cheat(
            world,
            player,
            CheatKind::InvalidMove,
            format!("attempted to move unit {} owned by the opponent", unit_id.get()),
            out_events,
        );
        return Err(ValidationOutcome::rejected(
            ValidationErrorKind::NotYourTurn,
            "unit belongs to the opponent",
        ));
    }
    if !world.store.state().can_move || unit.has_moved_this_turn {
        return Err(ValidationOutcome::rejected(
            ValidationErrorKind::ActionNotAvailable,
            "move already used this turn",
        ));
    }
    if !world.field.is_valid_position(target) {
        return Err(ValidationOutcome::rejected(
            ValidationErrorKind::General,
            "target lies outside the field",
        ));
    }
    if target == unit.position {
        return Err(ValidationOutcome::rejected(
            ValidationErrorKind::General,
            "unit already stands on the target",
        ));
    }

    let occupied = occupied_cells(world, Some(unit.id));
    let planner = PathPlanner::with_occupied(&world.field, &occupied);
    if !planner.is_walkable(target) {
        return Err(ValidationOutcome::rejected(
            ValidationErrorKind::ObstacleBlocking,
            "target cell is blocked",
        ));
    }

    if !world.config.validate_movement {
        let from = unit.position;
        return Ok((unit, vec![from, target]));
    }

    let budget = movement_budget(world, &unit);
    let path = match planner.find_path(unit.position, target, budget) {
        Some(path) => path,
        None if planner.find_path(unit.position, target, None).is_some() => {
            return Err(ValidationOutcome::rejected(
                ValidationErrorKind::PathTooLong,
                "target is beyond the unit's movement range",
            ));
        }
        None => {
            // Units only block for this turn; the field itself must be sealed.
            if PathPlanner::new(&world.field)
                .find_path(unit.position, target, None)
                .is_none()
            {
                flag_cheat(
                    world,
                    player,
                    CheatKind::InvalidMove,
                    format!("no legal path from {:?} to {:?}", unit.position, target),
                    out_events,
                );
            }
            return Err(ValidationOutcome::rejected(
                ValidationErrorKind::ObstacleBlocking,
                "no path to target",
            ));
        }
    };

    let length = calculate_path_length(&path).unwrap_or(u32::MAX);
    if budget.is_some_and(|speed| length > speed) {
        return Err(ValidationOutcome::rejected(
            ValidationErrorKind::PathTooLong,
            "target is beyond the unit's movement range",
        ));
    }

    if let Some(claimed) = claimed_travel_secs {
        let effective_speed = if budget.is_none() {
            unit.speed.saturating_mul(INFINITE_SPEED_FACTOR)
        } else {
            unit.speed
        };
        if let Some(details) = world
            .history
            .travel_time_violation(length, effective_speed, claimed)
        {
            report_cheat(player, CheatKind::TimeManipulation, details, out_events);
            return Err(ValidationOutcome::rejected(
                ValidationErrorKind::General,
                "claimed travel time is implausible",
            ));
        }
    }

    Ok((unit, path))
}

fn execute_move(
    world: &mut World,
    mut unit: UnitRecord,
    target: CellCoord,
    path: &[CellCoord],
    out_events: &mut Vec<Event>,
) {
    let from = unit.position;
    unit.position = target;
    unit.has_moved_this_turn = true;
    let player = unit.owner;
    let unit_id = unit.id;
    world.store.update_unit(unit);
    let exhausted = world.turns.consume_action(&mut world.store, ActionKind::Move);

    tracing::debug!(
        unit_id = unit_id.get(),
        ?from,
        to = ?target,
        steps = path.len().saturating_sub(1),
        "unit moved"
    );
    out_events.push(Event::UnitMoved {
        player,
        unit_id,
        from,
        to: target,
        waypoints: optimize_path(path),
    });
    out_events.push(Event::StateChanged {
        state: world.store.state().clone(),
    });

    if exhausted {
        advance_turn(world, player, out_events);
    }
}

fn validate_attack(
    world: &World,
    player: PlayerId,
    attacker_id: UnitId,
    target_id: UnitId,
    out_events: &mut Vec<Event>,
) -> Result<(UnitRecord, UnitRecord), ValidationOutcome> {
    let attacker = world.store.unit(attacker_id).cloned().ok_or_else(|| {
        ValidationOutcome::rejected(ValidationErrorKind::UnitNotFound, "attacker does not exist")
    })?;
    if attacker.owner != player {
        flag_cheat(
            world,
            player,
            CheatKind::InvalidAttack,
            format!(
                "attempted to attack with unit {} owned by the opponent",
                attacker_id.get()
            ),
            out_events,
        );
        return Err(ValidationOutcome::rejected(
            ValidationErrorKind::NotYourTurn,
            "attacker belongs to the opponent",
        ));
    }
    let target = world.store.unit(target_id).cloned().ok_or_else(|| {
        ValidationOutcome::rejected(ValidationErrorKind::UnitNotFound, "target does not exist")
    })?;
    if target.owner == player {
        return Err(ValidationOutcome::rejected(
            ValidationErrorKind::General,
            "cannot attack a friendly unit",
        ));
    }
    if !world.store.state().can_attack || attacker.has_attacked_this_turn {
        return Err(ValidationOutcome::rejected(
            ValidationErrorKind::ActionNotAvailable,
            "attack already used this turn",
        ));
    }

    let distance = attacker.position.euclidean_distance(target.position);
    if distance > attacker.attack_range as f32 {
        return Err(ValidationOutcome::rejected(
            ValidationErrorKind::TargetOutOfRange,
            format!(
                "target is {distance:.2} cells away, range is {}",
                attacker.attack_range
            ),
        ));
    }
    if world.config.validate_line_of_sight
        && !PathPlanner::new(&world.field).has_line_of_sight(attacker.position, target.position)
    {
        return Err(ValidationOutcome::rejected(
            ValidationErrorKind::ObstacleBlocking,
            "line of sight is blocked",
        ));
    }

    Ok((attacker, target))
}

fn execute_attack(
    world: &mut World,
    mut attacker: UnitRecord,
    target: UnitRecord,
    out_events: &mut Vec<Event>,
) {
    let player = attacker.owner;
    attacker.has_attacked_this_turn = true;
    let attacker_id = attacker.id;
    let attacker_position = attacker.position;
    world.store.update_unit(attacker);
    let _ = world.store.remove_unit(target.id);
    let exhausted = world
        .turns
        .consume_action(&mut world.store, ActionKind::Attack);

    tracing::debug!(
        attacker_id = attacker_id.get(),
        target_id = target.id.get(),
        "unit destroyed"
    );
    out_events.push(Event::UnitAttacked {
        player,
        attacker_id,
        target_id: target.id,
        attacker_position,
        target_position: target.position,
    });
    out_events.push(Event::UnitDestroyed {
        unit_id: target.id,
        owner: target.owner,
    });
    out_events.push(Event::StateChanged {
        state: world.store.state().clone(),
    });

    if let Verdict::Winner(winner, reason) = world.rules.check_end_conditions(&world.store) {
        finish_match(world, Some(winner), reason, out_events);
        return;
    }
    if exhausted {
        advance_turn(world, player, out_events);
    }
}

/// Ends `player`'s turn on the server's behalf and starts the next one.
fn advance_turn(world: &mut World, player: PlayerId, out_events: &mut Vec<Event>) {
    match world.turns.end_turn(&mut world.store, player) {
        Ok(handoff) => {
            resolve_handoff(world, handoff.next_player, handoff.round_started, out_events);
        }
        Err(outcome) => {
            tracing::warn!(?player, reason = outcome.message(), "automatic end turn refused");
        }
    }
}

fn resolve_handoff(
    world: &mut World,
    next_player: PlayerId,
    round_started: bool,
    out_events: &mut Vec<Event>,
) {
    let state = world.store.state().clone();
    if round_started && !state.infinite_speed_enabled {
        match world.rules.determine_winner(state.turn_number, &world.store) {
            Verdict::Winner(winner, reason) => {
                finish_match(world, Some(winner), reason, out_events);
                return;
            }
            Verdict::ActivateInfiniteSpeed => {
                tracing::info!(turn_number = state.turn_number, "infinite speed activated");
                world.store.replace_state(GameState {
                    infinite_speed_enabled: true,
                    ..state.clone()
                });
                out_events.push(Event::InfiniteSpeedActivated {
                    turn_number: state.turn_number,
                });
            }
            Verdict::Continue => {}
        }
    }

    world
        .turns
        .start_turn(&mut world.store, next_player, out_events);
}

fn finish_match(
    world: &mut World,
    winner: Option<PlayerId>,
    reason: EndReason,
    out_events: &mut Vec<Event>,
) {
    let state = world.store.state().clone();
    if state.phase == GamePhase::GameOver {
        return;
    }

    let end = EndOfMatch {
        winner,
        reason,
        final_turn: state.turn_number,
    };
    let state = GameState {
        phase: GamePhase::GameOver,
        can_move: false,
        can_attack: false,
        turn_time_left: 0.0,
        ..state
    };
    world.store.replace_state(state.clone());
    world.end_of_match = Some(end);

    tracing::info!(?winner, ?reason, final_turn = end.final_turn, "match ended");
    out_events.push(Event::StateChanged { state });
    out_events.push(Event::MatchEnded(end));
}

/// Reports a violation when anti-cheat checks are active.
fn flag_cheat(
    world: &World,
    player: PlayerId,
    kind: CheatKind,
    details: String,
    out_events: &mut Vec<Event>,
) {
    if world.history.enabled() {
        report_cheat(player, kind, details, out_events);
    }
}

fn report_cheat(player: PlayerId, kind: CheatKind, details: String, out_events: &mut Vec<Event>) {
    tracing::warn!(?player, ?kind, %details, "cheat detected");
    out_events.push(Event::CheatDetected {
        player,
        kind,
        details,
    });
}

fn reject(
    player: PlayerId,
    action: ActionKind,
    outcome: ValidationOutcome,
    out_events: &mut Vec<Event>,
) {
    tracing::warn!(
        ?player,
        ?action,
        kind = ?outcome.error_kind(),
        reason = outcome.message(),
        "command rejected"
    );
    out_events.push(Event::CommandRejected {
        player,
        action,
        outcome,
    });
}

fn owns_turn(state: &GameState, owner: PlayerId) -> bool {
    state.phase == GamePhase::Playing && state.active_player == Some(owner)
}
