#![deny(
    unsafe_code,
    missing_docs,
    dead_code,
    unused_results,
    non_snake_case,
    unreachable_pub
)]

//! Authoritative world state management for Grid Duel.
//!
//! The [`World`] is the single writer of match truth. Adapters feed it
//! [`Command`] values through [`apply`] and observe the resulting [`Event`]
//! stream; read-only access goes through the [`query`] module.

use std::time::Duration;

use gridduel_core::{Command, EndOfMatch, Event, GameConfig, SessionId, WELCOME_BANNER};

mod anticheat;
mod field;
mod gateway;
mod navigation;
mod rules;
mod store;
mod turn;

pub use anticheat::{ActionHistory, ActionRecord};
pub use field::{FieldError, FieldStats, GridField, SpawnPoint};
pub use navigation::{
    bresenham_line, calculate_path_length, octile_distance, optimize_path, path_cost,
    PathPlanner, DIAGONAL_STEP_COST, STRAIGHT_STEP_COST,
};
pub use rules::{RulesEngine, Verdict};
pub use store::{GameStateStore, StoreChange, SubscriptionId};
pub use turn::{TurnController, TurnHandoff, TurnStats};

/// Represents the authoritative Grid Duel match.
#[derive(Debug)]
pub struct World {
    banner: &'static str,
    config: GameConfig,
    field: GridField,
    store: GameStateStore,
    turns: TurnController,
    rules: RulesEngine,
    history: ActionHistory,
    sessions: [Option<SessionId>; 2],
    next_unit_id: u32,
    elapsed: Duration,
    end_of_match: Option<EndOfMatch>,
}

impl World {
    /// Creates a match whose field is generated from `config`.
    ///
    /// # Errors
    ///
    /// Returns [`FieldError`] when the configured field cannot host the spawns.
    pub fn new(config: GameConfig) -> Result<Self, FieldError> {
        let field = GridField::generate(&config)?;
        Ok(Self::with_field(config, field))
    }

    /// Creates a match on a prepared field.
    #[must_use]
    pub fn with_field(config: GameConfig, field: GridField) -> Self {
        Self {
            banner: WELCOME_BANNER,
            turns: TurnController::new(config.turn_duration_secs),
            rules: RulesEngine::new(config.draw_turn, config.infinite_speed_rule_enabled),
            history: ActionHistory::new(&config),
            store: GameStateStore::new(),
            sessions: [None, None],
            next_unit_id: 0,
            elapsed: Duration::ZERO,
            end_of_match: None,
            field,
            config,
        }
    }

    /// Registers a callback invoked synchronously after every store mutation.
    pub fn subscribe<F>(&mut self, callback: F) -> SubscriptionId
    where
        F: FnMut(&StoreChange) + Send + 'static,
    {
        self.store.subscribe(callback)
    }

    /// Drops a callback registered through [`World::subscribe`].
    pub fn unsubscribe(&mut self, id: SubscriptionId) -> bool {
        self.store.unsubscribe(id)
    }
}

/// Applies the provided command to the world, mutating state deterministically.
///
/// Commands are processed one at a time and run to completion. Rejected
/// commands leave the canonical state untouched and surface as
/// [`Event::CommandRejected`].
pub fn apply(world: &mut World, command: Command, out_events: &mut Vec<Event>) {
    match command {
        Command::ConnectPlayer { session } => gateway::connect(world, session, out_events),
        Command::DisconnectPlayer { session } => gateway::disconnect(world, session, out_events),
        Command::RequestMove {
            player,
            unit_id,
            target,
            claimed_travel_secs,
        } => gateway::request_move(
            world,
            player,
            unit_id,
            target,
            claimed_travel_secs,
            out_events,
        ),
        Command::RequestAttack {
            player,
            attacker_id,
            target_id,
        } => gateway::request_attack(world, player, attacker_id, target_id, out_events),
        Command::RequestEndTurn { player } => gateway::request_end_turn(world, player, out_events),
        Command::Tick { dt } => {
            world.elapsed = world.elapsed.saturating_add(dt);
            out_events.push(Event::TimeAdvanced { dt });
            gateway::tick(world, dt, out_events);
        }
        Command::DeclareCheater { player } => gateway::declare_cheater(world, player, out_events),
    }
}

/// Query functions that provide read-only access to the world state.
pub mod query {
    use std::{collections::HashSet, time::Duration};

    use gridduel_core::{
        CellCoord, EndOfMatch, GameConfig, GameState, PlayerId, SessionId, UnitId, UnitRecord,
    };

    use super::{gateway, FieldStats, GridField, PathPlanner, TurnStats, World};
    use crate::anticheat::ActionRecord;

    /// Retrieves the welcome banner that adapters may display to players.
    #[must_use]
    pub fn welcome_banner(world: &World) -> &'static str {
        world.banner
    }

    /// Configuration the match was created with.
    #[must_use]
    pub fn config(world: &World) -> &GameConfig {
        &world.config
    }

    /// Provides read-only access to the combat field.
    #[must_use]
    pub fn field(world: &World) -> &GridField {
        &world.field
    }

    /// Obstacle coverage and spawn connectivity of the field.
    #[must_use]
    pub fn field_stats(world: &World) -> FieldStats {
        world.field.stats()
    }

    /// Current canonical game state.
    #[must_use]
    pub fn state(world: &World) -> &GameState {
        world.store.state()
    }

    /// Version stamp of the store, incremented on every mutation.
    #[must_use]
    pub fn version(world: &World) -> u64 {
        world.store.version()
    }

    /// Counters of the running turn.
    #[must_use]
    pub fn turn_stats(world: &World) -> TurnStats {
        world.turns.stats(&world.store)
    }

    /// Match clock accumulated from ticks.
    #[must_use]
    pub fn elapsed(world: &World) -> Duration {
        world.elapsed
    }

    /// End-of-match signal, once the match is over.
    #[must_use]
    pub fn end_of_match(world: &World) -> Option<EndOfMatch> {
        world.end_of_match
    }

    /// Seat held by the provided session, if any.
    #[must_use]
    pub fn player_for_session(world: &World, session: SessionId) -> Option<PlayerId> {
        world
            .sessions
            .iter()
            .position(|seated| *seated == Some(session))
            .map(|seat| PlayerId::ALL[seat])
    }

    /// Looks up a unit by id.
    #[must_use]
    pub fn unit(world: &World, unit_id: UnitId) -> Option<&UnitRecord> {
        world.store.unit(unit_id)
    }

    /// Iterates over every unit in ascending id order.
    pub fn units(world: &World) -> impl Iterator<Item = &UnitRecord> {
        world.store.units()
    }

    /// Iterates over the units owned by `player` in ascending id order.
    pub fn units_of(world: &World, player: PlayerId) -> impl Iterator<Item = &UnitRecord> {
        world.store.units_of(player)
    }

    /// Number of units owned by `player`.
    #[must_use]
    pub fn count_of(world: &World, player: PlayerId) -> usize {
        world.store.count_of(player)
    }

    /// Reports whether the unit may still move during the running turn.
    #[must_use]
    pub fn can_unit_move(world: &World, unit_id: UnitId) -> bool {
        gateway::can_unit_move(world, unit_id)
    }

    /// Reports whether the unit may still attack during the running turn.
    #[must_use]
    pub fn can_unit_attack(world: &World, unit_id: UnitId) -> bool {
        gateway::can_unit_attack(world, unit_id)
    }

    /// Enemy units the provided unit could legally attack.
    #[must_use]
    pub fn targets_in_range(world: &World, unit_id: UnitId) -> Vec<UnitId> {
        gateway::targets_in_range(world, unit_id)
    }

    /// Plans the path the server would accept for moving the unit to `target`.
    #[must_use]
    pub fn find_path_for_unit(
        world: &World,
        unit_id: UnitId,
        target: CellCoord,
    ) -> Option<Vec<CellCoord>> {
        let unit = world.store.unit(unit_id)?;
        let occupied = gateway::occupied_cells(world, Some(unit_id));
        PathPlanner::with_occupied(&world.field, &occupied).find_path(
            unit.position,
            target,
            gateway::movement_budget(world, unit),
        )
    }

    /// Movement budget of the unit, or `None` while movement is uncapped.
    #[must_use]
    pub fn movement_budget(world: &World, unit_id: UnitId) -> Option<u32> {
        world
            .store
            .unit(unit_id)
            .and_then(|unit| gateway::movement_budget(world, unit))
    }

    /// Cells held by units other than `except`.
    #[must_use]
    pub fn occupied_cells(world: &World, except: Option<UnitId>) -> HashSet<CellCoord> {
        gateway::occupied_cells(world, except)
    }

    /// Recent actions of `player` still inside the rate-limiting window.
    pub fn recent_actions(world: &World, player: PlayerId) -> impl Iterator<Item = &ActionRecord> {
        world.history.recent(player)
    }
}
