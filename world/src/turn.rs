//! Turn life-cycle: countdown, per-turn action budget and hand-off.

use std::time::Duration;

use gridduel_core::{
    ActionKind, Event, GamePhase, GameState, PlayerId, ValidationErrorKind, ValidationOutcome,
};

use crate::store::GameStateStore;

const INFINITE_SPEED_TIME_FACTOR: f32 = 2.0;

/// Snapshot of the running turn for adapters and diagnostics.
#[derive(Clone, Copy, Debug, PartialEq)]
pub struct TurnStats {
    /// Player who owns the turn, if any.
    pub active_player: Option<PlayerId>,
    /// Current round counter.
    pub turn_number: u32,
    /// Seconds left on the countdown.
    pub remaining: f32,
    /// Whether the move action was consumed.
    pub move_used: bool,
    /// Whether the attack action was consumed.
    pub attack_used: bool,
}

/// Outcome of a successful end of turn.
#[derive(Clone, Copy, Debug, PartialEq, Eq)]
pub struct TurnHandoff {
    /// Player whose turn should start next.
    pub next_player: PlayerId,
    /// Round counter after the hand-off.
    pub turn_number: u32,
    /// Whether the hand-off opened a new round.
    pub round_started: bool,
}

/// Drives the active turn. Owns no state besides the countdown guard; the
/// canonical values live in the [`GameStateStore`].
#[derive(Clone, Debug)]
pub struct TurnController {
    turn_duration_secs: f32,
    expiry_fired: bool,
}

impl TurnController {
    /// Creates a controller granting `turn_duration_secs` per turn.
    #[must_use]
    pub const fn new(turn_duration_secs: f32) -> Self {
        Self {
            turn_duration_secs,
            expiry_fired: false,
        }
    }

    /// Begins `player`'s turn: resets action flags and restarts the countdown.
    pub fn start_turn(
        &mut self,
        store: &mut GameStateStore,
        player: PlayerId,
        out_events: &mut Vec<Event>,
    ) {
        let refreshed: Vec<_> = store
            .units_of(player)
            .filter(|unit| unit.has_moved_this_turn || unit.has_attacked_this_turn)
            .cloned()
            .collect();
        for mut unit in refreshed {
            unit.has_moved_this_turn = false;
            unit.has_attacked_this_turn = false;
            store.update_unit(unit);
        }

        let previous = store.state().clone();
        let duration = if previous.infinite_speed_enabled {
            self.turn_duration_secs * INFINITE_SPEED_TIME_FACTOR
        } else {
            self.turn_duration_secs
        };
        let state = GameState {
            active_player: Some(player),
            can_move: true,
            can_attack: true,
            turn_time_left: duration,
            ..previous
        };
        self.expiry_fired = false;
        store.replace_state(state.clone());

        tracing::info!(
            ?player,
            turn_number = state.turn_number,
            duration,
            "turn started"
        );
        out_events.push(Event::StateChanged {
            state: state.clone(),
        });
        out_events.push(Event::TurnChanged {
            player,
            turn_number: state.turn_number,
            turn_time_left: duration,
        });
    }

    /// Advances the countdown by `dt`.
    ///
    /// Returns `true` exactly once per turn, when the countdown first reaches
    /// zero. The caller must then end the active turn.
    pub fn tick(&mut self, store: &mut GameStateStore, dt: Duration) -> bool {
        let state = store.state().clone();
        if state.phase != GamePhase::Playing || state.active_player.is_none() {
            return false;
        }
        if self.expiry_fired {
            return false;
        }

        let remaining = (state.turn_time_left - dt.as_secs_f32()).max(0.0);
        store.replace_state(GameState {
            turn_time_left: remaining,
            ..state
        });

        if remaining <= 0.0 {
            self.expiry_fired = true;
            tracing::info!(player = ?store.state().active_player, "turn timer expired");
            return true;
        }
        false
    }

    /// Closes the active turn on behalf of `requester`.
    ///
    /// # Errors
    ///
    /// Rejects with [`ValidationErrorKind::NotYourTurn`] when `requester` does
    /// not own the turn, leaving the state untouched.
    pub fn end_turn(
        &mut self,
        store: &mut GameStateStore,
        requester: PlayerId,
    ) -> Result<TurnHandoff, ValidationOutcome> {
        let state = store.state().clone();
        if state.phase != GamePhase::Playing {
            return Err(ValidationOutcome::rejected(
                ValidationErrorKind::General,
                "match is not in progress",
            ));
        }
        if state.active_player != Some(requester) {
            tracing::warn!(?requester, "end turn requested out of turn");
            return Err(ValidationOutcome::rejected(
                ValidationErrorKind::NotYourTurn,
                "it is not your turn",
            ));
        }

        let next_player = requester.opponent();
        let round_started = next_player == PlayerId::Player1;
        let turn_number = if round_started {
            state.turn_number.saturating_add(1)
        } else {
            state.turn_number
        };
        self.expiry_fired = true;
        store.replace_state(GameState {
            turn_number,
            active_player: Some(next_player),
            can_move: false,
            can_attack: false,
            turn_time_left: 0.0,
            ..state
        });

        Ok(TurnHandoff {
            next_player,
            turn_number,
            round_started,
        })
    }

    /// Marks `action` as consumed for the running turn.
    ///
    /// Returns `true` when both actions are now spent and the turn should end.
    pub fn consume_action(&mut self, store: &mut GameStateStore, action: ActionKind) -> bool {
        let mut state = store.state().clone();
        match action {
            ActionKind::Move => state.can_move = false,
            ActionKind::Attack => state.can_attack = false,
            ActionKind::EndTurn => {}
        }
        let exhausted = !state.can_move && !state.can_attack;
        store.replace_state(state);
        exhausted
    }

    /// Captures the running turn's counters.
    #[must_use]
    pub fn stats(&self, store: &GameStateStore) -> TurnStats {
        let state = store.state();
        TurnStats {
            active_player: state.active_player,
            turn_number: state.turn_number,
            remaining: state.turn_time_left,
            move_used: !state.can_move,
            attack_used: !state.can_attack,
        }
    }
}
