#![deny(
    unsafe_code,
    missing_docs,
    dead_code,
    unused_results,
    non_snake_case,
    unreachable_pub
)]

//! State replication between the authoritative world and connected clients.
//!
//! The server side keeps one baseline per connected session and emits a full
//! snapshot the first time a session is seen, followed by deltas against the
//! last message it sent. Clients hold a read-only [`Replica`] that only ever
//! changes by applying those messages.

use std::collections::BTreeMap;

use gridduel_core::{Event, GameState, PlayerId, SessionId, UnitId, UnitRecord};
use serde::{Deserialize, Serialize};
use thiserror::Error;

/// Errors raised while moving state messages across the wire.
#[derive(Debug, Error)]
pub enum WireError {
    /// The message could not be serialised.
    #[error("failed to encode state message")]
    Encode(#[source] bincode::Error),
    /// The payload could not be deserialised.
    #[error("failed to decode state message")]
    Decode(#[source] bincode::Error),
    /// A delta was built against a version the replica does not hold.
    #[error("delta expects version {expected}, replica holds {held}")]
    VersionGap {
        /// Version the delta was computed against.
        expected: u64,
        /// Version currently held by the replica.
        held: u64,
    },
}

/// Complete copy of the replicated state.
#[derive(Clone, Debug, PartialEq, Serialize, Deserialize)]
pub struct Snapshot {
    /// Store version the snapshot reflects.
    pub version: u64,
    /// Game state at that version.
    pub state: GameState,
    /// Full roster in ascending id order.
    pub units: Vec<UnitRecord>,
}

/// Changes between two replicated versions.
#[derive(Clone, Debug, PartialEq, Serialize, Deserialize)]
pub struct Delta {
    /// Version the delta applies to.
    pub base_version: u64,
    /// Version reached after applying the delta.
    pub version: u64,
    /// Replacement game state, when it changed.
    pub state: Option<GameState>,
    /// Units that were added or changed.
    pub upserted: Vec<UnitRecord>,
    /// Units that left the roster.
    pub removed: Vec<UnitId>,
}

/// Message sent from the server to a single client.
#[derive(Clone, Debug, PartialEq, Serialize, Deserialize)]
pub enum StateMessage {
    /// Full state for a newly connected client.
    Snapshot(Snapshot),
    /// Incremental update against the previous message.
    Delta(Delta),
}

impl StateMessage {
    /// Version the client holds after applying the message.
    #[must_use]
    pub const fn version(&self) -> u64 {
        match self {
            Self::Snapshot(snapshot) => snapshot.version,
            Self::Delta(delta) => delta.version,
        }
    }
}

/// Serialises a state message for transport.
///
/// # Errors
///
/// Returns [`WireError::Encode`] when serialisation fails.
pub fn encode(message: &StateMessage) -> Result<Vec<u8>, WireError> {
    bincode::serialize(message).map_err(WireError::Encode)
}

/// Deserialises a state message received from transport.
///
/// # Errors
///
/// Returns [`WireError::Decode`] when the payload is malformed.
pub fn decode(bytes: &[u8]) -> Result<StateMessage, WireError> {
    bincode::deserialize(bytes).map_err(WireError::Decode)
}

/// Message addressed to one session.
#[derive(Clone, Debug, PartialEq)]
pub struct Outbound {
    /// Recipient session.
    pub session: SessionId,
    /// Message to deliver.
    pub message: StateMessage,
}

/// Immutable view of the authoritative state to replicate.
#[derive(Clone, Copy, Debug)]
pub struct ReplicationView<'a> {
    /// Store version stamp.
    pub version: u64,
    /// Current game state.
    pub state: &'a GameState,
    /// Full roster in ascending id order.
    pub units: &'a [UnitRecord],
}

#[derive(Debug)]
struct Baseline {
    version: u64,
    state: GameState,
    units: BTreeMap<UnitId, UnitRecord>,
}

impl Baseline {
    fn capture(view: ReplicationView<'_>) -> Self {
        Self {
            version: view.version,
            state: view.state.clone(),
            units: view
                .units
                .iter()
                .map(|unit| (unit.id, unit.clone()))
                .collect(),
        }
    }
}

/// Pure system that turns world changes into per-client state messages.
#[derive(Debug, Default)]
pub struct Replication {
    clients: BTreeMap<SessionId, Option<Baseline>>,
}

impl Replication {
    /// Consumes world events and the current state, emitting a message for
    /// every client whose baseline is out of date.
    pub fn handle(&mut self, events: &[Event], view: ReplicationView<'_>, out: &mut Vec<Outbound>) {
        for event in events {
            match event {
                Event::PlayerConnected { session, .. } => {
                    let _ = self.clients.entry(*session).or_insert(None);
                }
                Event::PlayerDisconnected { session, .. } => {
                    let _ = self.forget(*session);
                }
                _ => {}
            }
        }

        for (session, baseline) in &mut self.clients {
            let message = match baseline {
                None => StateMessage::Snapshot(Snapshot {
                    version: view.version,
                    state: view.state.clone(),
                    units: view.units.to_vec(),
                }),
                Some(previous) if previous.version < view.version => {
                    StateMessage::Delta(diff(previous, view))
                }
                Some(_) => continue,
            };

            tracing::trace!(
                session = session.get(),
                version = view.version,
                "replicating state"
            );
            *baseline = Some(Baseline::capture(view));
            out.push(Outbound {
                session: *session,
                message,
            });
        }
    }

    /// Stops replicating to `session`. Returns `false` if it was unknown.
    pub fn forget(&mut self, session: SessionId) -> bool {
        self.clients.remove(&session).is_some()
    }

    /// Sessions currently receiving state.
    pub fn sessions(&self) -> impl Iterator<Item = SessionId> + '_ {
        self.clients.keys().copied()
    }
}

fn diff(previous: &Baseline, view: ReplicationView<'_>) -> Delta {
    let upserted = view
        .units
        .iter()
        .filter(|unit| previous.units.get(&unit.id) != Some(*unit))
        .cloned()
        .collect();
    let removed = previous
        .units
        .keys()
        .filter(|id| !view.units.iter().any(|unit| unit.id == **id))
        .copied()
        .collect();

    Delta {
        base_version: previous.version,
        version: view.version,
        state: (previous.state != *view.state).then(|| view.state.clone()),
        upserted,
        removed,
    }
}

/// Client-side read-only copy of the replicated state.
#[derive(Clone, Debug, Default)]
pub struct Replica {
    version: u64,
    state: GameState,
    units: BTreeMap<UnitId, UnitRecord>,
}

impl Replica {
    /// Creates an empty replica awaiting its first snapshot.
    #[must_use]
    pub fn new() -> Self {
        Self::default()
    }

    /// Applies a message received from the server.
    ///
    /// # Errors
    ///
    /// Returns [`WireError::VersionGap`] when a delta does not build on the
    /// version currently held. The replica is left untouched in that case.
    pub fn apply(&mut self, message: StateMessage) -> Result<(), WireError> {
        match message {
            StateMessage::Snapshot(snapshot) => {
                self.version = snapshot.version;
                self.state = snapshot.state;
                self.units = snapshot
                    .units
                    .into_iter()
                    .map(|unit| (unit.id, unit))
                    .collect();
            }
            StateMessage::Delta(delta) => {
                if delta.base_version != self.version {
                    return Err(WireError::VersionGap {
                        expected: delta.base_version,
                        held: self.version,
                    });
                }
                if let Some(state) = delta.state {
                    self.state = state;
                }
                for unit in delta.upserted {
                    let _ = self.units.insert(unit.id, unit);
                }
                for unit_id in delta.removed {
                    let _ = self.units.remove(&unit_id);
                }
                self.version = delta.version;
            }
        }
        Ok(())
    }

    /// Version of the last applied message.
    #[must_use]
    pub const fn version(&self) -> u64 {
        self.version
    }

    /// Replicated game state.
    #[must_use]
    pub const fn state(&self) -> &GameState {
        &self.state
    }

    /// Looks up a replicated unit.
    #[must_use]
    pub fn unit(&self, unit_id: UnitId) -> Option<&UnitRecord> {
        self.units.get(&unit_id)
    }

    /// Iterates over replicated units in ascending id order.
    pub fn units(&self) -> impl Iterator<Item = &UnitRecord> {
        self.units.values()
    }

    /// Number of replicated units owned by `player`.
    #[must_use]
    pub fn count_of(&self, player: PlayerId) -> usize {
        self.units.values().filter(|unit| unit.owner == player).count()
    }
}
