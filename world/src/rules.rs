//! End-of-match and draw-resolution rules.

use gridduel_core::{EndReason, PlayerId};

use crate::store::GameStateStore;

/// Verdict of a rules evaluation.
#[derive(Clone, Copy, Debug, PartialEq, Eq)]
pub enum Verdict {
    /// Play continues unchanged.
    Continue,
    /// The match ends with the provided winner and reason.
    Winner(PlayerId, EndReason),
    /// The sides are level, so movement caps are lifted.
    ActivateInfiniteSpeed,
}

/// Stateless rule evaluation over the current roster.
#[derive(Clone, Copy, Debug)]
pub struct RulesEngine {
    draw_turn: u32,
    infinite_speed_rule_enabled: bool,
}

impl RulesEngine {
    /// Creates an engine keyed to the draw-resolution round.
    #[must_use]
    pub const fn new(draw_turn: u32, infinite_speed_rule_enabled: bool) -> Self {
        Self {
            draw_turn,
            infinite_speed_rule_enabled,
        }
    }

    /// Declares a winner once either side has no units left.
    #[must_use]
    pub fn check_end_conditions(&self, store: &GameStateStore) -> Verdict {
        let player1 = store.count_of(PlayerId::Player1);
        let player2 = store.count_of(PlayerId::Player2);
        match (player1, player2) {
            (0, 0) => Verdict::Continue,
            (0, _) => Verdict::Winner(PlayerId::Player2, EndReason::AllEnemyUnitsDestroyed),
            (_, 0) => Verdict::Winner(PlayerId::Player1, EndReason::AllEnemyUnitsDestroyed),
            _ => Verdict::Continue,
        }
    }

    /// Reports whether the stalemate rule applies at `turn` for the given unit counts.
    #[must_use]
    pub const fn should_activate_infinite_speed(
        &self,
        turn: u32,
        player1_units: usize,
        player2_units: usize,
    ) -> bool {
        turn >= self.draw_turn && player1_units >= 1 && player2_units >= 1
    }

    /// Resolves a stalemate at or after the draw-resolution round.
    ///
    /// A strict unit-count lead wins the match. Level counts lift movement
    /// caps instead, or continue play when that rule is disabled.
    #[must_use]
    pub fn determine_winner(&self, turn: u32, store: &GameStateStore) -> Verdict {
        let player1 = store.count_of(PlayerId::Player1);
        let player2 = store.count_of(PlayerId::Player2);
        if !self.should_activate_infinite_speed(turn, player1, player2) {
            return Verdict::Continue;
        }

        if player1 > player2 {
            Verdict::Winner(PlayerId::Player1, EndReason::UnitCountAdvantage)
        } else if player2 > player1 {
            Verdict::Winner(PlayerId::Player2, EndReason::UnitCountAdvantage)
        } else if self.infinite_speed_rule_enabled {
            Verdict::ActivateInfiniteSpeed
        } else {
            Verdict::Continue
        }
    }
}
