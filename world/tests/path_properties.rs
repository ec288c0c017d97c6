use std::{cmp::Ordering, collections::BinaryHeap};

use gridduel_core::{CellCoord, GameConfig, PlayerId};
use gridduel_world::{
    optimize_path, path_cost, GridField, PathPlanner, DIAGONAL_STEP_COST, STRAIGHT_STEP_COST,
};
use proptest::prelude::*;

const COST_EPSILON: f64 = 1e-9;

#[derive(Clone, Copy, PartialEq)]
struct Frontier {
    cost: f64,
    cell: CellCoord,
}

impl Eq for Frontier {}

impl Ord for Frontier {
    fn cmp(&self, other: &Self) -> Ordering {
        other
            .cost
            .total_cmp(&self.cost)
            .then_with(|| self.cell.cmp(&other.cell))
    }
}

impl PartialOrd for Frontier {
    fn partial_cmp(&self, other: &Self) -> Option<Ordering> {
        Some(self.cmp(other))
    }
}

/// Exhaustive Dijkstra used as the reference for optimal costs.
fn reference_cost(field: &GridField, start: CellCoord, goal: CellCoord) -> Option<f64> {
    let width = field.width() as usize;
    let mut best = vec![f64::INFINITY; width * field.height() as usize];
    let slot = |cell: CellCoord| cell.row() as usize * width + cell.column() as usize;
    let mut heap = BinaryHeap::new();
    best[slot(start)] = 0.0;
    heap.push(Frontier {
        cost: 0.0,
        cell: start,
    });

    while let Some(Frontier { cost, cell }) = heap.pop() {
        if cell == goal {
            return Some(cost);
        }
        if cost > best[slot(cell)] {
            continue;
        }
        for dx in -1_i64..=1 {
            for dy in -1_i64..=1 {
                if dx == 0 && dy == 0 {
                    continue;
                }
                let column = i64::from(cell.column()) + dx;
                let row = i64::from(cell.row()) + dy;
                let (Ok(column), Ok(row)) = (u32::try_from(column), u32::try_from(row)) else {
                    continue;
                };
                let next = CellCoord::new(column, row);
                if !field.is_valid_position(next) || field.is_obstacle(next) {
                    continue;
                }
                let step = if dx != 0 && dy != 0 {
                    DIAGONAL_STEP_COST
                } else {
                    STRAIGHT_STEP_COST
                };
                let candidate = cost + step;
                if candidate < best[slot(next)] {
                    best[slot(next)] = candidate;
                    heap.push(Frontier {
                        cost: candidate,
                        cell: next,
                    });
                }
            }
        }
    }
    None
}

fn scenario() -> impl Strategy<Value = (GridField, CellCoord, CellCoord)> {
    (5_u32..=9, 5_u32..=9).prop_flat_map(|(width, height)| {
        let cells = (0..width, 0..height).prop_map(|(column, row)| CellCoord::new(column, row));
        (
            Just((width, height)),
            prop::collection::vec(cells.clone(), 0..20),
            cells.clone(),
            cells,
        )
            .prop_map(|((width, height), obstacles, start, goal)| {
                let config = GameConfig {
                    field_width: width,
                    field_height: height,
                    units_per_type: 1,
                    ..GameConfig::default()
                };
                let mut field = GridField::open(&config).expect("open field");
                for obstacle in obstacles {
                    if obstacle != start && obstacle != goal {
                        let _ = field.add_obstacle(obstacle);
                    }
                }
                (field, start, goal)
            })
    })
}

proptest! {
    #[test]
    fn planner_matches_reference_costs((field, start, goal) in scenario()) {
        let planner = PathPlanner::new(&field);
        let path = planner.find_path(start, goal, None);
        let expected = reference_cost(&field, start, goal);

        match (path, expected) {
            (Some(path), Some(expected)) => {
                prop_assert_eq!(path.first(), Some(&start));
                prop_assert_eq!(path.last(), Some(&goal));
                let cost = path_cost(&path).expect("contiguous path");
                prop_assert!((cost - expected).abs() < COST_EPSILON,
                    "planner cost {} differs from reference {}", cost, expected);
            }
            (None, None) => {}
            (path, expected) => prop_assert!(false,
                "planner returned {:?}, reference cost {:?}", path, expected),
        }
    }

    #[test]
    fn bounded_search_honours_the_budget(
        (field, start, goal) in scenario(),
        budget in 0_u32..12,
    ) {
        let planner = PathPlanner::new(&field);
        let path = planner.find_path(start, goal, Some(budget));
        let expected = reference_cost(&field, start, goal)
            .filter(|cost| cost.round() <= f64::from(budget));

        match (path, expected) {
            (Some(path), Some(expected)) => {
                prop_assert_eq!(path.first(), Some(&start));
                prop_assert_eq!(path.last(), Some(&goal));
                let cost = path_cost(&path).expect("contiguous path");
                prop_assert!((cost - expected).abs() < COST_EPSILON,
                    "bounded cost {} differs from reference {}", cost, expected);
                prop_assert!(planner.is_path_valid(&path, Some(budget)));
            }
            (None, None) => {}
            (path, expected) => prop_assert!(false,
                "budget {}: planner returned {:?}, reference cost {:?}", budget, path, expected),
        }
    }

    #[test]
    fn simplified_paths_stay_valid((field, start, goal) in scenario(), budget in 0_u32..12) {
        let planner = PathPlanner::new(&field);
        if let Some(path) = planner.find_path(start, goal, None) {
            let optimized = optimize_path(&path);
            prop_assert_eq!(optimized.first(), path.first());
            prop_assert_eq!(optimized.last(), path.last());
            prop_assert!(planner.is_path_valid(&optimized, None));
            if planner.is_path_valid(&path, Some(budget)) {
                prop_assert!(planner.is_path_valid(&optimized, Some(budget)));
            }
        }
    }

    #[test]
    fn generated_fields_keep_spawns_connected(
        width in 10_u32..=24,
        height in 10_u32..=24,
        seed in any::<u64>(),
    ) {
        let config = GameConfig {
            field_width: width,
            field_height: height,
            field_seed: seed,
            ..GameConfig::default()
        };
        let field = GridField::generate(&config).expect("generate field");
        let from = field.spawn_centroid(PlayerId::Player1);
        let to = field.spawn_centroid(PlayerId::Player2);
        prop_assert!(PathPlanner::new(&field).find_path(from, to, None).is_some());
        prop_assert!(field.stats().spawns_connected());
    }
}
