#![deny(
    unsafe_code,
    missing_docs,
    dead_code,
    unused_results,
    non_snake_case,
    unreachable_pub
)]

//! Deterministic autopilot that plays one side of a match.
//!
//! The autopilot never touches the world directly. It reacts to turn events,
//! inspects immutable views of the roster and the field, and proposes
//! commands that the authoritative world validates like any client request.

use std::collections::HashSet;

use gridduel_core::{CellCoord, Command, Event, GamePhase, GameState, PlayerId, UnitId, UnitRecord};
use gridduel_world::{calculate_path_length, GridField, PathPlanner};

/// Immutable inputs the autopilot plans against.
#[derive(Clone, Copy, Debug)]
pub struct MatchView<'a> {
    /// Current game state.
    pub state: &'a GameState,
    /// Every unit on the field.
    pub units: &'a [UnitRecord],
    /// Combat field with its obstacles.
    pub field: &'a GridField,
    /// Whether attacks require an unobstructed sightline.
    pub line_of_sight_required: bool,
}

/// Pure system that plans a full turn whenever its side becomes active.
#[derive(Debug)]
pub struct Autopilot {
    player: PlayerId,
}

impl Autopilot {
    /// Creates an autopilot controlling `player`.
    #[must_use]
    pub const fn new(player: PlayerId) -> Self {
        Self { player }
    }

    /// Consumes world events and emits the commands for the autopilot's turn.
    pub fn handle(&mut self, events: &[Event], view: MatchView<'_>, out: &mut Vec<Command>) {
        if view.state.phase != GamePhase::Playing || view.state.active_player != Some(self.player)
        {
            return;
        }
        let turn_started = events.iter().any(|event| {
            matches!(event, Event::TurnChanged { player, .. } if *player == self.player)
        });
        if !turn_started {
            // A refused command leaves the turn open; hand it over instead of idling.
            let refused = events.iter().any(|event| {
                matches!(event, Event::CommandRejected { player, .. } if *player == self.player)
            });
            if refused {
                out.push(Command::RequestEndTurn {
                    player: self.player,
                });
            }
            return;
        }

        let mut units = view.units.to_vec();
        let mut attacked = false;
        let mut moved = false;

        if view.state.can_attack {
            if let Some((attacker, target)) = self.find_attack(&units, view) {
                out.push(Command::RequestAttack {
                    player: self.player,
                    attacker_id: attacker,
                    target_id: target,
                });
                units.retain(|unit| unit.id != target);
                attacked = true;
                if units.iter().all(|unit| unit.owner == self.player) {
                    return;
                }
            }
        }

        if view.state.can_move {
            if let Some((unit_id, target)) = self.find_advance(&units, view) {
                out.push(Command::RequestMove {
                    player: self.player,
                    unit_id,
                    target,
                    claimed_travel_secs: None,
                });
                if let Some(unit) = units.iter_mut().find(|unit| unit.id == unit_id) {
                    unit.position = target;
                }
                moved = true;
            }
        }

        if moved && !attacked && view.state.can_attack {
            if let Some((attacker, target)) = self.find_attack(&units, view) {
                out.push(Command::RequestAttack {
                    player: self.player,
                    attacker_id: attacker,
                    target_id: target,
                });
                attacked = true;
            }
        }

        tracing::debug!(player = ?self.player, moved, attacked, "autopilot planned turn");
        if !(moved && attacked) {
            out.push(Command::RequestEndTurn {
                player: self.player,
            });
        }
    }

    fn find_attack(&self, units: &[UnitRecord], view: MatchView<'_>) -> Option<(UnitId, UnitId)> {
        let planner = PathPlanner::new(view.field);
        units
            .iter()
            .filter(|unit| unit.owner == self.player && !unit.has_attacked_this_turn)
            .find_map(|attacker| {
                units
                    .iter()
                    .filter(|target| target.owner != self.player)
                    .filter(|target| {
                        attacker.position.euclidean_distance(target.position)
                            <= attacker.attack_range as f32
                    })
                    .find(|target| {
                        !view.line_of_sight_required
                            || planner.has_line_of_sight(attacker.position, target.position)
                    })
                    .map(|target| (attacker.id, target.id))
            })
    }

    /// Picks the unit closest to an enemy and the furthest affordable cell
    /// along its path toward a cell from which that enemy can be attacked.
    fn find_advance(
        &self,
        units: &[UnitRecord],
        view: MatchView<'_>,
    ) -> Option<(UnitId, CellCoord)> {
        let enemies: Vec<&UnitRecord> = units
            .iter()
            .filter(|unit| unit.owner != self.player)
            .collect();

        let mut candidates: Vec<(f32, &UnitRecord, &UnitRecord)> = units
            .iter()
            .filter(|unit| unit.owner == self.player && !unit.has_moved_this_turn)
            .filter_map(|unit| {
                enemies
                    .iter()
                    .map(|enemy| (unit.position.euclidean_distance(enemy.position), *enemy))
                    .min_by(|a, b| a.0.total_cmp(&b.0))
                    .map(|(distance, enemy)| (distance, unit, enemy))
            })
            .collect();
        candidates.sort_by(|a, b| a.0.total_cmp(&b.0).then_with(|| a.1.id.cmp(&b.1.id)));

        candidates.into_iter().find_map(|(_, unit, enemy)| {
            let blocked: HashSet<CellCoord> = units
                .iter()
                .filter(|other| other.id != unit.id)
                .map(|other| other.position)
                .collect();
            let planner = PathPlanner::with_occupied(view.field, &blocked);
            let path = firing_positions(unit, enemy, &planner, view)
                .into_iter()
                .find_map(|goal| planner.find_path(unit.position, goal, None))?;
            let budget = (!view.state.infinite_speed_enabled).then_some(unit.speed);
            let reachable = furthest_affordable(&path, budget)?;
            (reachable != unit.position).then_some((unit.id, reachable))
        })
    }
}

/// Walkable cells from which `unit` could hit `enemy`, nearest to `unit` first.
fn firing_positions(
    unit: &UnitRecord,
    enemy: &UnitRecord,
    planner: &PathPlanner<'_>,
    view: MatchView<'_>,
) -> Vec<CellCoord> {
    let reach = unit.attack_range;
    let center = enemy.position;
    let mut cells: Vec<CellCoord> = (center.column().saturating_sub(reach)
        ..=center.column().saturating_add(reach))
        .flat_map(|column| {
            (center.row().saturating_sub(reach)..=center.row().saturating_add(reach))
                .map(move |row| CellCoord::new(column, row))
        })
        .filter(|cell| cell.euclidean_distance(center) <= reach as f32)
        .filter(|cell| *cell == unit.position || planner.is_walkable(*cell))
        .filter(|cell| !view.line_of_sight_required || planner.has_line_of_sight(*cell, center))
        .collect();
    cells.sort_by(|a, b| {
        a.euclidean_distance(unit.position)
            .total_cmp(&b.euclidean_distance(unit.position))
            .then_with(|| a.cmp(b))
    });
    cells
}

fn furthest_affordable(path: &[CellCoord], budget: Option<u32>) -> Option<CellCoord> {
    (1..=path.len())
        .rev()
        .map(|len| &path[..len])
        .find(|prefix| {
            budget.map_or(true, |limit| {
                calculate_path_length(prefix).is_some_and(|length| length <= limit)
            })
        })
        .and_then(|prefix| prefix.last().copied())
}
