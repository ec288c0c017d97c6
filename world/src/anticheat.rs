//! Per-player action bookkeeping backing the anti-cheat checks.

use std::{
    collections::{BTreeMap, VecDeque},
    time::Duration,
};

use gridduel_core::{ActionKind, CellCoord, GameConfig, PlayerId, UnitId, SPAM_DETECTION_WINDOW};

/// Entry of a player's rolling action log.
#[derive(Clone, Debug, PartialEq)]
pub struct ActionRecord {
    /// Kind of action attempted.
    pub kind: ActionKind,
    /// Match clock reading when the action arrived.
    pub timestamp: Duration,
    /// Cell targeted by the action, if any.
    pub position: Option<CellCoord>,
    /// Unit performing the action, if any.
    pub unit_id: Option<UnitId>,
    /// Unit receiving the action, if any.
    pub target_id: Option<UnitId>,
}

/// Rolling per-player action history with rate and travel-time checks.
#[derive(Clone, Debug)]
pub struct ActionHistory {
    enabled: bool,
    max_actions_per_second: u32,
    tolerance_secs: f32,
    records: BTreeMap<PlayerId, VecDeque<ActionRecord>>,
}

impl ActionHistory {
    /// Creates an empty history using the anti-cheat settings of `config`.
    #[must_use]
    pub fn new(config: &GameConfig) -> Self {
        Self {
            enabled: config.anti_cheat_enabled,
            max_actions_per_second: config.max_actions_per_second,
            tolerance_secs: config.time_validation_tolerance_secs,
            records: BTreeMap::new(),
        }
    }

    /// Reports whether checks are active.
    #[must_use]
    pub const fn enabled(&self) -> bool {
        self.enabled
    }

    /// Appends `record` to the player's log, unless the player already spent
    /// the permitted actions within the trailing window.
    ///
    /// # Errors
    ///
    /// Returns a description of the violation when the rate is exceeded. The
    /// offending attempt is not recorded.
    pub fn admit(&mut self, player: PlayerId, record: ActionRecord) -> Result<(), String> {
        let now = record.timestamp;
        let log = self.records.entry(player).or_default();
        while log
            .front()
            .is_some_and(|oldest| oldest.timestamp + SPAM_DETECTION_WINDOW <= now)
        {
            let _ = log.pop_front();
        }

        if self.enabled && log.len() >= self.max_actions_per_second as usize {
            return Err(format!(
                "{} actions within {:?}, limit is {}",
                log.len() + 1,
                SPAM_DETECTION_WINDOW,
                self.max_actions_per_second
            ));
        }

        log.push_back(record);
        Ok(())
    }

    /// Compares a client-claimed travel time with the time the path requires.
    ///
    /// Returns a description when the claim undercuts the expected time by
    /// more than the configured tolerance.
    #[must_use]
    pub fn travel_time_violation(
        &self,
        path_length: u32,
        effective_speed: u32,
        claimed_secs: f32,
    ) -> Option<String> {
        if !self.enabled || effective_speed == 0 {
            return None;
        }
        let expected = path_length as f32 / effective_speed as f32;
        (claimed_secs < expected - self.tolerance_secs).then(|| {
            format!(
                "claimed {claimed_secs:.2}s for a path of length {path_length}, expected at least {expected:.2}s"
            )
        })
    }

    /// Actions still inside the trailing window for `player`, oldest first.
    pub fn recent(&self, player: PlayerId) -> impl Iterator<Item = &ActionRecord> {
        self.records.get(&player).into_iter().flatten()
    }
}
