//! Canonical match state and unit roster.

use std::{collections::BTreeMap, fmt};

use gridduel_core::{GameState, PlayerId, UnitId, UnitRecord};

/// Change applied to the store, delivered to subscribers after it took effect.
#[derive(Clone, Debug, PartialEq)]
pub enum StoreChange {
    /// The game state value was replaced.
    State(GameState),
    /// A unit entered the roster.
    UnitAdded(UnitRecord),
    /// A unit record was overwritten.
    UnitUpdated(UnitRecord),
    /// A unit left the roster.
    UnitRemoved(UnitId),
}

/// Handle returned by [`GameStateStore::subscribe`].
#[derive(Clone, Copy, Debug, PartialEq, Eq, Hash, PartialOrd, Ord)]
pub struct SubscriptionId(u64);

type Subscriber = Box<dyn FnMut(&StoreChange) + Send>;

/// Single-writer owner of the game state and the unit roster.
///
/// Every mutation bumps a monotonically increasing version and synchronously
/// notifies subscribers before returning.
pub struct GameStateStore {
    state: GameState,
    units: BTreeMap<UnitId, UnitRecord>,
    version: u64,
    subscribers: Vec<(SubscriptionId, Subscriber)>,
    next_subscription: u64,
}

impl fmt::Debug for GameStateStore {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        f.debug_struct("GameStateStore")
            .field("state", &self.state)
            .field("units", &self.units)
            .field("version", &self.version)
            .field("subscribers", &self.subscribers.len())
            .finish()
    }
}

impl Default for GameStateStore {
    fn default() -> Self {
        Self::new()
    }
}

impl GameStateStore {
    /// Creates a store holding the initial state and an empty roster.
    #[must_use]
    pub fn new() -> Self {
        Self {
            state: GameState::default(),
            units: BTreeMap::new(),
            version: 0,
            subscribers: Vec::new(),
            next_subscription: 0,
        }
    }

    /// Current game state.
    #[must_use]
    pub const fn state(&self) -> &GameState {
        &self.state
    }

    /// Version stamp incremented on every mutation.
    #[must_use]
    pub const fn version(&self) -> u64 {
        self.version
    }

    /// Replaces the game state wholesale.
    pub fn replace_state(&mut self, state: GameState) {
        self.state = state.clone();
        self.publish(&StoreChange::State(state));
    }

    /// Inserts a unit, overwriting any record that shares its id.
    pub fn add_unit(&mut self, unit: UnitRecord) {
        let _ = self.units.insert(unit.id, unit.clone());
        self.publish(&StoreChange::UnitAdded(unit));
    }

    /// Overwrites an existing unit record. Unknown ids are logged and ignored.
    pub fn update_unit(&mut self, unit: UnitRecord) {
        match self.units.get_mut(&unit.id) {
            Some(slot) => {
                *slot = unit.clone();
                self.publish(&StoreChange::UnitUpdated(unit));
            }
            None => {
                tracing::warn!(unit_id = unit.id.get(), "update ignored for unknown unit");
            }
        }
    }

    /// Removes a unit and returns its final record. Unknown ids are logged.
    pub fn remove_unit(&mut self, unit_id: UnitId) -> Option<UnitRecord> {
        let removed = self.units.remove(&unit_id);
        if removed.is_some() {
            self.publish(&StoreChange::UnitRemoved(unit_id));
        } else {
            tracing::warn!(unit_id = unit_id.get(), "removal ignored for unknown unit");
        }
        removed
    }

    /// Looks up a unit by id.
    #[must_use]
    pub fn unit(&self, unit_id: UnitId) -> Option<&UnitRecord> {
        self.units.get(&unit_id)
    }

    /// Iterates over every unit in ascending id order.
    pub fn units(&self) -> impl Iterator<Item = &UnitRecord> {
        self.units.values()
    }

    /// Iterates over the units owned by `player` in ascending id order.
    pub fn units_of(&self, player: PlayerId) -> impl Iterator<Item = &UnitRecord> {
        self.units.values().filter(move |unit| unit.owner == player)
    }

    /// Number of units owned by `player`.
    #[must_use]
    pub fn count_of(&self, player: PlayerId) -> usize {
        self.units_of(player).count()
    }

    /// Registers a callback invoked after every mutation.
    pub fn subscribe<F>(&mut self, callback: F) -> SubscriptionId
    where
        F: FnMut(&StoreChange) + Send + 'static,
    {
        let id = SubscriptionId(self.next_subscription);
        self.next_subscription += 1;
        self.subscribers.push((id, Box::new(callback)));
        id
    }

    /// Drops a previously registered callback. Returns `false` if it was unknown.
    pub fn unsubscribe(&mut self, id: SubscriptionId) -> bool {
        let before = self.subscribers.len();
        self.subscribers.retain(|(candidate, _)| *candidate != id);
        self.subscribers.len() != before
    }

    fn publish(&mut self, change: &StoreChange) {
        self.version += 1;
        for (_, subscriber) in &mut self.subscribers {
            subscriber(change);
        }
    }
}
