//! Field dimensions, spawn layout and obstacle placement.

use gridduel_core::{CellCoord, GameConfig, PlayerId, UnitKind};
use rand::{Rng, SeedableRng};
use rand_chacha::ChaCha8Rng;
use thiserror::Error;

use crate::navigation::{path_cost, PathPlanner};

const MIN_FIELD_DIMENSION: u32 = 5;
const FORBIDDEN_RADIUS: u32 = 2;
const MAX_DETOUR_FACTOR: f64 = 2.5;
const ATTEMPTS_PER_OBSTACLE: usize = 3;

/// Errors raised while laying out a field.
#[derive(Debug, Error, PartialEq, Eq)]
pub enum FieldError {
    /// The requested dimensions cannot host two spawn clusters.
    #[error("field of {width}x{height} cells is too small")]
    TooSmall {
        /// Requested width.
        width: u32,
        /// Requested height.
        height: u32,
    },
    /// A spawn cell would fall outside the field.
    #[error("spawn cell ({column}, {row}) lies outside the field")]
    SpawnOutOfBounds {
        /// Column of the offending spawn.
        column: i64,
        /// Row of the offending spawn.
        row: i64,
    },
}

/// Cell where a unit of a given archetype enters the match.
#[derive(Clone, Copy, Debug, PartialEq, Eq)]
pub struct SpawnPoint {
    kind: UnitKind,
    cell: CellCoord,
}

impl SpawnPoint {
    /// Archetype spawned at this point.
    #[must_use]
    pub const fn kind(&self) -> UnitKind {
        self.kind
    }

    /// Cell occupied by the spawned unit.
    #[must_use]
    pub const fn cell(&self) -> CellCoord {
        self.cell
    }
}

/// Summary of the obstacle layout of a field.
#[derive(Clone, Copy, Debug, PartialEq)]
pub struct FieldStats {
    /// Field width in cells.
    pub width: u32,
    /// Field height in cells.
    pub height: u32,
    /// Number of obstacle cells.
    pub obstacle_count: usize,
    /// Share of the field covered by obstacles.
    pub coverage: f32,
    /// Cost of the shortest path between the spawn centroids, if any.
    pub centroid_path_cost: Option<f64>,
}

impl FieldStats {
    /// Reports whether the spawn clusters are joined by walkable cells.
    #[must_use]
    pub const fn spawns_connected(&self) -> bool {
        self.centroid_path_cost.is_some()
    }
}

/// Rectangular combat field. Dimensions and spawns are fixed after layout.
#[derive(Clone, Debug)]
pub struct GridField {
    width: u32,
    height: u32,
    player1_spawns: Vec<SpawnPoint>,
    player2_spawns: Vec<SpawnPoint>,
    obstacles: Vec<bool>,
    obstacle_count: usize,
}

impl GridField {
    /// Lays out the spawn clusters described by `config` without obstacles.
    ///
    /// # Errors
    ///
    /// Returns [`FieldError`] when the dimensions cannot host the spawns.
    pub fn open(config: &GameConfig) -> Result<Self, FieldError> {
        let width = config.field_width;
        let height = config.field_height;
        if width < MIN_FIELD_DIMENSION || height < MIN_FIELD_DIMENSION {
            return Err(FieldError::TooSmall { width, height });
        }

        let (w, h) = (i64::from(width), i64::from(height));
        let mut player1_spawns = Vec::new();
        let mut player2_spawns = Vec::new();
        for i in 0..i64::from(config.units_per_type) {
            player1_spawns.push(spawn(UnitKind::Ranged, 1, 1 + i, width, height)?);
            player1_spawns.push(spawn(UnitKind::Melee, 2, 1 + i, width, height)?);
            player2_spawns.push(spawn(UnitKind::Ranged, w - 2, h - 2 - i, width, height)?);
            player2_spawns.push(spawn(UnitKind::Melee, w - 3, h - 2 - i, width, height)?);
        }

        let cell_count = width as usize * height as usize;
        Ok(Self {
            width,
            height,
            player1_spawns,
            player2_spawns,
            obstacles: vec![false; cell_count],
            obstacle_count: 0,
        })
    }

    /// Lays out spawns and scatters obstacles using the configured seed.
    ///
    /// Each candidate obstacle is kept only if the spawn centroids stay
    /// connected by a path no longer than 2.5 times their straight-line
    /// distance. Attempts are capped at three times the obstacle target.
    ///
    /// # Errors
    ///
    /// Returns [`FieldError`] when the dimensions cannot host the spawns.
    pub fn generate(config: &GameConfig) -> Result<Self, FieldError> {
        let mut field = Self::open(config)?;
        let mut rng = ChaCha8Rng::seed_from_u64(config.field_seed);
        field.scatter_obstacles(config.obstacle_ratio, &mut rng);
        Ok(field)
    }

    fn scatter_obstacles(&mut self, ratio: f32, rng: &mut ChaCha8Rng) {
        let cell_count = self.width as usize * self.height as usize;
        let target = (cell_count as f64 * f64::from(ratio)).round() as usize;
        let max_attempts = target.saturating_mul(ATTEMPTS_PER_OBSTACLE);
        let forbidden = self.forbidden_mask();
        let from = self.spawn_centroid(PlayerId::Player1);
        let to = self.spawn_centroid(PlayerId::Player2);
        let max_cost = from.euclidean_distance(to) as f64 * MAX_DETOUR_FACTOR;

        let mut placed = 0;
        let mut attempts = 0;
        while placed < target && attempts < max_attempts {
            attempts += 1;
            let cell = CellCoord::new(
                rng.gen_range(1..self.width - 1),
                rng.gen_range(1..self.height - 1),
            );
            let Some(slot) = self.index(cell) else {
                continue;
            };
            if forbidden[slot] || self.obstacles[slot] {
                continue;
            }

            self.set_obstacle(slot, true);
            let cost = PathPlanner::new(self)
                .find_path(from, to, None)
                .and_then(|path| path_cost(&path));
            if cost.is_some_and(|cost| cost <= max_cost) {
                placed += 1;
            } else {
                self.set_obstacle(slot, false);
            }
        }

        tracing::debug!(
            placed,
            target,
            attempts,
            "scattered obstacles over the field"
        );
    }

    fn forbidden_mask(&self) -> Vec<bool> {
        let mut mask = vec![false; self.obstacles.len()];
        let centers = self
            .player1_spawns
            .iter()
            .chain(self.player2_spawns.iter())
            .map(SpawnPoint::cell)
            .chain(std::iter::once(self.center()));

        for center in centers {
            let min_column = center.column().saturating_sub(FORBIDDEN_RADIUS);
            let min_row = center.row().saturating_sub(FORBIDDEN_RADIUS);
            for column in min_column..=center.column() + FORBIDDEN_RADIUS {
                for row in min_row..=center.row() + FORBIDDEN_RADIUS {
                    if let Some(slot) = self.index(CellCoord::new(column, row)) {
                        mask[slot] = true;
                    }
                }
            }
        }
        mask
    }

    /// Width of the field in cells.
    #[must_use]
    pub const fn width(&self) -> u32 {
        self.width
    }

    /// Height of the field in cells.
    #[must_use]
    pub const fn height(&self) -> u32 {
        self.height
    }

    /// Central cell of the field.
    #[must_use]
    pub const fn center(&self) -> CellCoord {
        CellCoord::new(self.width / 2, self.height / 2)
    }

    /// Reports whether the cell lies within the field.
    #[must_use]
    pub const fn is_valid_position(&self, cell: CellCoord) -> bool {
        cell.column() < self.width && cell.row() < self.height
    }

    /// Reports whether the cell carries an obstacle.
    #[must_use]
    pub fn is_obstacle(&self, cell: CellCoord) -> bool {
        self.index(cell)
            .is_some_and(|slot| self.obstacles[slot])
    }

    /// Places an obstacle, refusing cells outside the field or under a spawn.
    ///
    /// Returns `true` when the obstacle set changed.
    pub fn add_obstacle(&mut self, cell: CellCoord) -> bool {
        if self.is_spawn(cell) {
            return false;
        }
        match self.index(cell) {
            Some(slot) if !self.obstacles[slot] => {
                self.set_obstacle(slot, true);
                true
            }
            _ => false,
        }
    }

    /// Clears an obstacle. Returns `true` when the obstacle set changed.
    pub fn remove_obstacle(&mut self, cell: CellCoord) -> bool {
        match self.index(cell) {
            Some(slot) if self.obstacles[slot] => {
                self.set_obstacle(slot, false);
                true
            }
            _ => false,
        }
    }

    /// Iterates over obstacle cells in row-major order.
    pub fn obstacles(&self) -> impl Iterator<Item = CellCoord> + '_ {
        let width = self.width as usize;
        self.obstacles
            .iter()
            .enumerate()
            .filter(|(_, blocked)| **blocked)
            .map(move |(slot, _)| CellCoord::new((slot % width) as u32, (slot / width) as u32))
    }

    /// Number of obstacle cells.
    #[must_use]
    pub const fn obstacle_count(&self) -> usize {
        self.obstacle_count
    }

    /// Spawn points of the provided player in unit creation order.
    #[must_use]
    pub fn spawn_points(&self, player: PlayerId) -> &[SpawnPoint] {
        match player {
            PlayerId::Player1 => &self.player1_spawns,
            PlayerId::Player2 => &self.player2_spawns,
        }
    }

    /// Average position of the player's spawn cells, rounding halves to even.
    #[must_use]
    pub fn spawn_centroid(&self, player: PlayerId) -> CellCoord {
        let spawns = self.spawn_points(player);
        if spawns.is_empty() {
            return self.center();
        }
        let count = spawns.len() as f64;
        let (columns, rows) = spawns.iter().fold((0.0, 0.0), |(c, r), spawn| {
            (
                c + f64::from(spawn.cell.column()),
                r + f64::from(spawn.cell.row()),
            )
        });
        CellCoord::new(
            (columns / count).round_ties_even() as u32,
            (rows / count).round_ties_even() as u32,
        )
    }

    /// Computes obstacle coverage and spawn connectivity.
    #[must_use]
    pub fn stats(&self) -> FieldStats {
        let cell_count = self.obstacles.len().max(1);
        let centroid_path_cost = PathPlanner::new(self)
            .find_path(
                self.spawn_centroid(PlayerId::Player1),
                self.spawn_centroid(PlayerId::Player2),
                None,
            )
            .and_then(|path| path_cost(&path));

        FieldStats {
            width: self.width,
            height: self.height,
            obstacle_count: self.obstacle_count,
            coverage: self.obstacle_count as f32 / cell_count as f32,
            centroid_path_cost,
        }
    }

    fn is_spawn(&self, cell: CellCoord) -> bool {
        self.player1_spawns
            .iter()
            .chain(self.player2_spawns.iter())
            .any(|spawn| spawn.cell == cell)
    }

    fn set_obstacle(&mut self, slot: usize, blocked: bool) {
        if self.obstacles[slot] != blocked {
            self.obstacles[slot] = blocked;
            if blocked {
                self.obstacle_count += 1;
            } else {
                self.obstacle_count -= 1;
            }
        }
    }

    fn index(&self, cell: CellCoord) -> Option<usize> {
        if !self.is_valid_position(cell) {
            return None;
        }
        Some(cell.row() as usize * self.width as usize + cell.column() as usize)
    }
}

fn spawn(
    kind: UnitKind,
    column: i64,
    row: i64,
    width: u32,
    height: u32,
) -> Result<SpawnPoint, FieldError> {
    let cell = u32::try_from(column)
        .ok()
        .zip(u32::try_from(row).ok())
        .map(|(column, row)| CellCoord::new(column, row))
        .filter(|cell| cell.column() < width && cell.row() < height)
        .ok_or(FieldError::SpawnOutOfBounds { column, row })?;
    Ok(SpawnPoint { kind, cell })
}

#[cfg(test)]
mod tests {
    use super::*;

    fn config(width: u32, height: u32, seed: u64) -> GameConfig {
        GameConfig {
            field_width: width,
            field_height: height,
            field_seed: seed,
            ..GameConfig::default()
        }
    }

    #[test]
    fn spawns_mirror_each_other() {
        let field = GridField::open(&config(20, 20, 0)).expect("open field");
        let cells = |player| {
            field
                .spawn_points(player)
                .iter()
                .map(|spawn| (spawn.kind(), spawn.cell()))
                .collect::<Vec<_>>()
        };

        assert_eq!(
            cells(PlayerId::Player1),
            vec![
                (UnitKind::Ranged, CellCoord::new(1, 1)),
                (UnitKind::Melee, CellCoord::new(2, 1)),
                (UnitKind::Ranged, CellCoord::new(1, 2)),
                (UnitKind::Melee, CellCoord::new(2, 2)),
            ]
        );
        assert_eq!(
            cells(PlayerId::Player2),
            vec![
                (UnitKind::Ranged, CellCoord::new(18, 18)),
                (UnitKind::Melee, CellCoord::new(17, 18)),
                (UnitKind::Ranged, CellCoord::new(18, 17)),
                (UnitKind::Melee, CellCoord::new(17, 17)),
            ]
        );
        assert_eq!(field.spawn_centroid(PlayerId::Player1), CellCoord::new(2, 2));
        assert_eq!(field.spawn_centroid(PlayerId::Player2), CellCoord::new(18, 18));
    }

    #[test]
    fn tiny_field_is_rejected() {
        assert_eq!(
            GridField::open(&config(4, 12, 0)).err(),
            Some(FieldError::TooSmall {
                width: 4,
                height: 12
            })
        );
    }

    #[test]
    fn generated_obstacles_avoid_forbidden_zones() {
        let field = GridField::generate(&config(20, 20, 7)).expect("generate field");
        assert!(field.obstacle_count() > 0);

        let center = field.center();
        for obstacle in field.obstacles() {
            assert!(
                obstacle.column().abs_diff(center.column()) > FORBIDDEN_RADIUS
                    || obstacle.row().abs_diff(center.row()) > FORBIDDEN_RADIUS,
                "obstacle {obstacle:?} inside the centre buffer"
            );
            for player in PlayerId::ALL {
                for spawn in field.spawn_points(player) {
                    assert!(
                        obstacle.column().abs_diff(spawn.cell().column()) > FORBIDDEN_RADIUS
                            || obstacle.row().abs_diff(spawn.cell().row()) > FORBIDDEN_RADIUS,
                        "obstacle {obstacle:?} inside a spawn buffer"
                    );
                }
            }
        }
    }

    #[test]
    fn generation_is_deterministic_per_seed() {
        let first: Vec<_> = GridField::generate(&config(20, 20, 11))
            .expect("generate")
            .obstacles()
            .collect();
        let second: Vec<_> = GridField::generate(&config(20, 20, 11))
            .expect("generate")
            .obstacles()
            .collect();
        assert_eq!(first, second);
    }

    #[test]
    fn obstacle_mutation_refuses_spawns_and_out_of_bounds() {
        let mut field = GridField::open(&config(10, 10, 0)).expect("open field");
        assert!(!field.add_obstacle(CellCoord::new(1, 1)));
        assert!(!field.add_obstacle(CellCoord::new(10, 3)));
        assert!(field.add_obstacle(CellCoord::new(5, 3)));
        assert!(!field.add_obstacle(CellCoord::new(5, 3)));
        assert_eq!(field.obstacle_count(), 1);
        assert!(field.remove_obstacle(CellCoord::new(5, 3)));
        assert!(!field.remove_obstacle(CellCoord::new(5, 3)));
        assert!(!field.is_obstacle(CellCoord::new(5, 3)));
    }

    #[test]
    fn stats_report_coverage_and_connectivity() {
        let field = GridField::generate(&config(20, 20, 3)).expect("generate field");
        let stats = field.stats();
        assert!(stats.spawns_connected());
        assert_eq!(stats.obstacle_count, field.obstacle_count());
        assert!(stats.coverage > 0.0 && stats.coverage <= 0.15 + f32::EPSILON);
    }

    #[test]
    fn centroid_rounds_halves_to_even() {
        let field = GridField::open(&GameConfig {
            units_per_type: 4,
            ..config(20, 20, 0)
        })
        .expect("open field");

        assert_eq!(field.spawn_centroid(PlayerId::Player1), CellCoord::new(2, 2));
        assert_eq!(field.spawn_centroid(PlayerId::Player2), CellCoord::new(18, 16));
    }
}
