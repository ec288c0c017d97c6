#![deny(
    unsafe_code,
    missing_docs,
    dead_code,
    unused_results,
    non_snake_case,
    unreachable_pub
)]

//! Core contracts shared across the Grid Duel engine.
//!
//! This crate defines the message surface that connects adapters, the
//! authoritative world, and pure systems. Adapters submit [`Command`] values
//! describing requested mutations, the world validates and executes those
//! commands via its `apply` entry point, and then broadcasts [`Event`] values
//! for systems and clients to react to. Clients never compute authoritative
//! outcomes themselves; they only observe events and replicated snapshots.

use std::time::Duration;

use serde::{Deserialize, Serialize};

mod config;

pub use config::{ConfigError, GameConfig};

/// Canonical banner emitted when a match server boots.
pub const WELCOME_BANNER: &str = "Welcome to Grid Duel.";

/// Health assigned to every unit. Any successful attack destroys its target.
pub const UNIT_HEALTH: u32 = 1;

/// Footprint diameter of a unit used for geometric queries.
pub const UNIT_SIZE: f32 = 1.0;

/// Vision radius of ranged units measured in cells.
pub const RANGED_VISION_RANGE: u32 = 5;

/// Vision radius of melee units measured in cells.
pub const MELEE_VISION_RANGE: u32 = 3;

/// Trailing window over which the action rate of a player is measured.
pub const SPAM_DETECTION_WINDOW: Duration = Duration::from_secs(1);

/// Commands that express all permissible world mutations.
#[derive(Clone, Debug, PartialEq, Serialize, Deserialize)]
pub enum Command {
    /// Announces that a transport session finished connecting.
    ConnectPlayer {
        /// Transport session that connected.
        session: SessionId,
    },
    /// Announces that a transport session dropped.
    DisconnectPlayer {
        /// Transport session that disconnected.
        session: SessionId,
    },
    /// Requests that a unit travel to the provided cell.
    RequestMove {
        /// Player issuing the request.
        player: PlayerId,
        /// Unit that should move.
        unit_id: UnitId,
        /// Destination cell requested by the client.
        target: CellCoord,
        /// Travel time observed by the client, used only for speed-hack checks.
        claimed_travel_secs: Option<f32>,
    },
    /// Requests that a unit attack an enemy unit.
    RequestAttack {
        /// Player issuing the request.
        player: PlayerId,
        /// Unit performing the attack.
        attacker_id: UnitId,
        /// Unit receiving the attack.
        target_id: UnitId,
    },
    /// Requests that the active turn ends immediately.
    RequestEndTurn {
        /// Player issuing the request.
        player: PlayerId,
    },
    /// Advances the match clock by the provided wall-clock delta.
    Tick {
        /// Duration that elapsed since the previous tick.
        dt: Duration,
    },
    /// Ends a running match because the named player was caught cheating.
    DeclareCheater {
        /// Player found guilty of cheating.
        player: PlayerId,
    },
}

/// Events broadcast by the world after processing commands.
#[derive(Clone, Debug, PartialEq, Serialize, Deserialize)]
pub enum Event {
    /// Indicates that the match clock advanced.
    TimeAdvanced {
        /// Duration that elapsed in the tick.
        dt: Duration,
    },
    /// Confirms that a session was seated as a player.
    PlayerConnected {
        /// Session that connected.
        session: SessionId,
        /// Seat assigned to the session.
        player: PlayerId,
    },
    /// Reports that a seated session dropped.
    PlayerDisconnected {
        /// Session that left.
        session: SessionId,
        /// Seat the session held.
        player: PlayerId,
    },
    /// Announces that both players are seated and play has begun.
    MatchStarted {
        /// Width of the field in cells.
        width: u32,
        /// Height of the field in cells.
        height: u32,
    },
    /// Confirms that a unit entered the roster.
    UnitSpawned {
        /// Full record of the spawned unit.
        unit: UnitRecord,
    },
    /// Carries the canonical game state after it was replaced.
    StateChanged {
        /// Game state value that became current.
        state: GameState,
    },
    /// Announces the start of a new turn.
    TurnChanged {
        /// Player who now owns the turn.
        player: PlayerId,
        /// Round counter of the new turn.
        turn_number: u32,
        /// Seconds available to the active player.
        turn_time_left: f32,
    },
    /// Confirms that a unit moved.
    UnitMoved {
        /// Player owning the unit.
        player: PlayerId,
        /// Unit that moved.
        unit_id: UnitId,
        /// Cell occupied before the move.
        from: CellCoord,
        /// Cell occupied after the move.
        to: CellCoord,
        /// Simplified waypoints traversed between `from` and `to`.
        waypoints: Vec<CellCoord>,
    },
    /// Confirms that a unit attacked an enemy.
    UnitAttacked {
        /// Player owning the attacker.
        player: PlayerId,
        /// Unit that performed the attack.
        attacker_id: UnitId,
        /// Unit that received the attack.
        target_id: UnitId,
        /// Cell occupied by the attacker.
        attacker_position: CellCoord,
        /// Cell occupied by the target.
        target_position: CellCoord,
    },
    /// Confirms that a unit was permanently removed from the roster.
    UnitDestroyed {
        /// Unit that was destroyed.
        unit_id: UnitId,
        /// Player that owned the destroyed unit.
        owner: PlayerId,
    },
    /// Announces that the stalemate-breaking movement rule became active.
    InfiniteSpeedActivated {
        /// Round at which the rule activated.
        turn_number: u32,
    },
    /// Reports that a command was rejected without changing canonical state.
    CommandRejected {
        /// Player that issued the command.
        player: PlayerId,
        /// Kind of action that was attempted.
        action: ActionKind,
        /// Typed reason for the rejection.
        outcome: ValidationOutcome,
    },
    /// Reports suspicious activity so the surrounding system can react.
    CheatDetected {
        /// Player suspected of cheating.
        player: PlayerId,
        /// Category of the detected violation.
        kind: CheatKind,
        /// Human readable description of the evidence.
        details: String,
    },
    /// Announces the end of the match.
    MatchEnded(EndOfMatch),
}

/// Seat occupied by one of the two players.
#[derive(Clone, Copy, Debug, PartialEq, Eq, Hash, PartialOrd, Ord, Serialize, Deserialize)]
pub enum PlayerId {
    /// First seat; opens the match.
    Player1,
    /// Second seat.
    Player2,
}

impl PlayerId {
    /// Returns the seat of the opposing player.
    #[must_use]
    pub const fn opponent(self) -> Self {
        match self {
            Self::Player1 => Self::Player2,
            Self::Player2 => Self::Player1,
        }
    }

    /// Both seats in turn order.
    pub const ALL: [PlayerId; 2] = [PlayerId::Player1, PlayerId::Player2];
}

/// Identifier of a transport session assigned by the connection layer.
#[derive(Clone, Copy, Debug, PartialEq, Eq, Hash, PartialOrd, Ord, Serialize, Deserialize)]
pub struct SessionId(u64);

impl SessionId {
    /// Creates a new session identifier with the provided numeric value.
    #[must_use]
    pub const fn new(value: u64) -> Self {
        Self(value)
    }

    /// Retrieves the numeric representation of the identifier.
    #[must_use]
    pub const fn get(&self) -> u64 {
        self.0
    }
}

/// Unique identifier assigned to a unit. Never reused within a match.
#[derive(Clone, Copy, Debug, PartialEq, Eq, Hash, PartialOrd, Ord, Serialize, Deserialize)]
pub struct UnitId(u32);

impl UnitId {
    /// Creates a new unit identifier with the provided numeric value.
    #[must_use]
    pub const fn new(value: u32) -> Self {
        Self(value)
    }

    /// Retrieves the numeric representation of the identifier.
    #[must_use]
    pub const fn get(&self) -> u32 {
        self.0
    }
}

/// Location of a single grid cell expressed as column and row coordinates.
#[derive(Clone, Copy, Debug, PartialEq, Eq, Hash, PartialOrd, Ord, Serialize, Deserialize)]
pub struct CellCoord {
    column: u32,
    row: u32,
}

impl CellCoord {
    /// Creates a new grid cell coordinate.
    #[must_use]
    pub const fn new(column: u32, row: u32) -> Self {
        Self { column, row }
    }

    /// Zero-based column index of the cell.
    #[must_use]
    pub const fn column(&self) -> u32 {
        self.column
    }

    /// Zero-based row index of the cell.
    #[must_use]
    pub const fn row(&self) -> u32 {
        self.row
    }

    /// Computes the straight-line distance between two cell centres.
    #[must_use]
    pub fn euclidean_distance(self, other: CellCoord) -> f32 {
        let dx = self.column.abs_diff(other.column) as f32;
        let dy = self.row.abs_diff(other.row) as f32;
        dx.hypot(dy)
    }

    /// Reports whether the other cell is one of the eight surrounding cells.
    #[must_use]
    pub fn is_adjacent_to(self, other: CellCoord) -> bool {
        let dx = self.column.abs_diff(other.column);
        let dy = self.row.abs_diff(other.row);
        dx <= 1 && dy <= 1 && dx + dy > 0
    }
}

/// Combat archetype of a unit.
#[derive(Clone, Copy, Debug, PartialEq, Eq, Hash, Serialize, Deserialize)]
pub enum UnitKind {
    /// Slow unit with a long attack reach.
    Ranged,
    /// Fast unit with a short attack reach.
    Melee,
}

impl UnitKind {
    /// Vision radius of the archetype measured in cells.
    #[must_use]
    pub const fn vision_range(self) -> u32 {
        match self {
            Self::Ranged => RANGED_VISION_RANGE,
            Self::Melee => MELEE_VISION_RANGE,
        }
    }
}

/// Life-cycle phase of a match.
#[derive(Clone, Copy, Debug, PartialEq, Eq, Hash, Serialize, Deserialize)]
pub enum GamePhase {
    /// Fewer than two players are seated.
    WaitingForPlayers,
    /// Turns are being played.
    Playing,
    /// The match finished. Terminal.
    GameOver,
}

/// Canonical match state. Replaced wholesale on every update.
#[derive(Clone, Debug, PartialEq, Serialize, Deserialize)]
pub struct GameState {
    /// Round counter, incremented each time player one's turn begins.
    pub turn_number: u32,
    /// Player who owns the current turn, if any.
    pub active_player: Option<PlayerId>,
    /// Whether the move action of the current turn is still available.
    pub can_move: bool,
    /// Whether the attack action of the current turn is still available.
    pub can_attack: bool,
    /// Seconds left before the current turn auto-advances.
    pub turn_time_left: f32,
    /// Life-cycle phase of the match.
    pub phase: GamePhase,
    /// Whether movement range caps have been lifted.
    pub infinite_speed_enabled: bool,
}

impl Default for GameState {
    fn default() -> Self {
        Self {
            turn_number: 1,
            active_player: None,
            can_move: false,
            can_attack: false,
            turn_time_left: 0.0,
            phase: GamePhase::WaitingForPlayers,
            infinite_speed_enabled: false,
        }
    }
}

/// Authoritative record of a single unit.
#[derive(Clone, Debug, PartialEq, Serialize, Deserialize)]
pub struct UnitRecord {
    /// Unique identifier of the unit.
    pub id: UnitId,
    /// Player controlling the unit.
    pub owner: PlayerId,
    /// Combat archetype of the unit.
    pub kind: UnitKind,
    /// Cell currently occupied by the unit.
    pub position: CellCoord,
    /// Remaining health; always [`UNIT_HEALTH`] while the unit exists.
    pub health: u32,
    /// Movement budget per turn in rounded path-cost units.
    pub speed: u32,
    /// Maximum straight-line attack distance in cells.
    pub attack_range: u32,
    /// Footprint diameter used for geometric queries.
    pub size: f32,
    /// Vision radius in cells.
    pub vision_range: u32,
    /// Whether the unit already moved during the current turn.
    pub has_moved_this_turn: bool,
    /// Whether the unit already attacked during the current turn.
    pub has_attacked_this_turn: bool,
}

impl UnitRecord {
    /// Creates a fresh unit using the archetype statistics from `config`.
    #[must_use]
    pub fn spawn(
        id: UnitId,
        owner: PlayerId,
        kind: UnitKind,
        position: CellCoord,
        config: &GameConfig,
    ) -> Self {
        let (speed, attack_range) = match kind {
            UnitKind::Ranged => (config.ranged_speed, config.ranged_attack_range),
            UnitKind::Melee => (config.melee_speed, config.melee_attack_range),
        };

        Self {
            id,
            owner,
            kind,
            position,
            health: UNIT_HEALTH,
            speed,
            attack_range,
            size: UNIT_SIZE,
            vision_range: kind.vision_range(),
            has_moved_this_turn: false,
            has_attacked_this_turn: false,
        }
    }
}

/// Kind of player action tracked by validation and anti-cheat bookkeeping.
#[derive(Clone, Copy, Debug, PartialEq, Eq, Hash, Serialize, Deserialize)]
pub enum ActionKind {
    /// Unit movement.
    Move,
    /// Unit attack.
    Attack,
    /// Voluntary end of turn.
    EndTurn,
}

/// Category of a rejected command.
#[derive(Clone, Copy, Debug, PartialEq, Eq, Hash, Serialize, Deserialize)]
pub enum ValidationErrorKind {
    /// Malformed request or a request that does not fit the match phase.
    General,
    /// Referenced unit does not exist.
    UnitNotFound,
    /// Requester does not own the current turn or the unit.
    NotYourTurn,
    /// The action was already consumed this turn.
    ActionNotAvailable,
    /// The path to the destination exceeds the movement budget.
    PathTooLong,
    /// The target lies beyond the attacker's reach.
    TargetOutOfRange,
    /// An obstacle blocks the path or the sightline.
    ObstacleBlocking,
    /// The turn countdown already ran out.
    TimeExpired,
    /// The player exceeded the permitted action rate.
    Spam,
}

/// Result value describing whether a command passed validation.
#[derive(Clone, Debug, PartialEq, Eq, Serialize, Deserialize)]
pub struct ValidationOutcome {
    ok: bool,
    error_kind: ValidationErrorKind,
    message: String,
}

impl ValidationOutcome {
    /// Creates an outcome describing an accepted command.
    #[must_use]
    pub fn accepted() -> Self {
        Self {
            ok: true,
            error_kind: ValidationErrorKind::General,
            message: String::new(),
        }
    }

    /// Creates an outcome describing a rejected command.
    #[must_use]
    pub fn rejected(error_kind: ValidationErrorKind, message: impl Into<String>) -> Self {
        Self {
            ok: false,
            error_kind,
            message: message.into(),
        }
    }

    /// Reports whether the command was accepted.
    #[must_use]
    pub const fn is_ok(&self) -> bool {
        self.ok
    }

    /// Category of the failure. Meaningless when [`Self::is_ok`] holds.
    #[must_use]
    pub const fn error_kind(&self) -> ValidationErrorKind {
        self.error_kind
    }

    /// Human readable description of the failure.
    #[must_use]
    pub fn message(&self) -> &str {
        &self.message
    }
}

/// Category of suspicious activity reported by anti-cheat checks.
#[derive(Clone, Copy, Debug, PartialEq, Eq, Hash, Serialize, Deserialize)]
pub enum CheatKind {
    /// Movement that no legal path can explain.
    InvalidMove,
    /// Attack that the attacker could not have performed.
    InvalidAttack,
    /// Action rate above the configured ceiling.
    ActionSpam,
    /// Claimed travel time faster than the unit can move.
    TimeManipulation,
}

/// Reason a match ended.
#[derive(Clone, Copy, Debug, PartialEq, Eq, Hash, Serialize, Deserialize)]
pub enum EndReason {
    /// One side lost every unit.
    AllEnemyUnitsDestroyed,
    /// The draw-resolution round found one side with more units.
    UnitCountAdvantage,
    /// A player dropped while the match was running.
    PlayerDisconnected,
    /// A player was declared a cheater.
    CheatDetected,
}

/// End-of-match signal consumed by the surrounding system.
#[derive(Clone, Copy, Debug, PartialEq, Eq, Serialize, Deserialize)]
pub struct EndOfMatch {
    /// Winning player, if any.
    pub winner: Option<PlayerId>,
    /// Reason the match ended.
    pub reason: EndReason,
    /// Round counter at the moment the match ended.
    pub final_turn: u32,
}
