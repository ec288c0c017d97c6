//! Shortest-path planning over the 8-connected combat grid.

use std::{cmp::Ordering, collections::HashSet, f64::consts::SQRT_2};

use gridduel_core::CellCoord;

use crate::field::GridField;

/// Cost of moving to an orthogonally adjacent cell.
pub const STRAIGHT_STEP_COST: f64 = 1.0;

/// Cost of moving to a diagonally adjacent cell.
pub const DIAGONAL_STEP_COST: f64 = SQRT_2;

const DIRECTION_EPSILON: f64 = 0.01;

/// Neighbour offsets in clockwise order starting north.
const NEIGHBOR_OFFSETS: [(i64, i64); 8] = [
    (0, 1),
    (1, 1),
    (1, 0),
    (1, -1),
    (0, -1),
    (-1, -1),
    (-1, 0),
    (-1, 1),
];

const NOT_QUEUED: usize = usize::MAX;

/// Read-only path planner bound to a field and an optional set of occupied cells.
///
/// A cell is walkable when it lies within the field, carries no obstacle and
/// is not part of the occupied set. The planner never mutates the field; live
/// unit positions are layered on top through [`PathPlanner::with_occupied`].
#[derive(Clone, Copy, Debug)]
pub struct PathPlanner<'a> {
    field: &'a GridField,
    occupied: Option<&'a HashSet<CellCoord>>,
}

impl<'a> PathPlanner<'a> {
    /// Creates a planner that only honours static obstacles.
    #[must_use]
    pub const fn new(field: &'a GridField) -> Self {
        Self {
            field,
            occupied: None,
        }
    }

    /// Creates a planner that also treats the provided cells as blocked.
    #[must_use]
    pub const fn with_occupied(field: &'a GridField, occupied: &'a HashSet<CellCoord>) -> Self {
        Self {
            field,
            occupied: Some(occupied),
        }
    }

    /// Reports whether a unit may stand on the provided cell.
    #[must_use]
    pub fn is_walkable(&self, cell: CellCoord) -> bool {
        self.field.is_valid_position(cell)
            && !self.field.is_obstacle(cell)
            && !self.occupied.is_some_and(|occupied| occupied.contains(&cell))
    }

    /// Computes the cheapest path from `start` to `goal`, both inclusive.
    ///
    /// Nodes whose accumulated cost rounds above `max_cost` are pruned. `None`
    /// lifts the bound entirely.
    #[must_use]
    pub fn find_path(
        &self,
        start: CellCoord,
        goal: CellCoord,
        max_cost: Option<u32>,
    ) -> Option<Vec<CellCoord>> {
        self.search(start, goal, max_cost, None)
    }

    /// Computes the cheapest unbounded path while also avoiding `extra_blocked`.
    #[must_use]
    pub fn find_path_avoiding_units(
        &self,
        start: CellCoord,
        goal: CellCoord,
        extra_blocked: &HashSet<CellCoord>,
    ) -> Option<Vec<CellCoord>> {
        self.search(start, goal, None, Some(extra_blocked))
    }

    /// Reports whether the path can be travelled within `max_cost`.
    ///
    /// Consecutive cells may be neighbours or the ends of a straight
    /// horizontal, vertical or diagonal run, so simplified waypoint lists
    /// validate the same as the raw paths they came from. Every cell of the
    /// path after the first, including the cells a run passes over, must be
    /// walkable.
    #[must_use]
    pub fn is_path_valid(&self, path: &[CellCoord], max_cost: Option<u32>) -> bool {
        let Some((&first, _)) = path.split_first() else {
            return false;
        };

        if !self.field.is_valid_position(first) {
            return false;
        }

        for pair in path.windows(2) {
            let Some(cells) = straight_run(pair[0], pair[1]) else {
                return false;
            };
            if !cells.into_iter().all(|cell| self.is_walkable(cell)) {
                return false;
            }
        }

        match max_cost {
            Some(limit) => calculate_path_length(path).is_some_and(|length| length <= limit),
            None => true,
        }
    }

    /// Reports whether no obstacle interrupts the sightline between two cells.
    ///
    /// Both endpoints are ignored so units standing on them never block.
    #[must_use]
    pub fn has_line_of_sight(&self, from: CellCoord, to: CellCoord) -> bool {
        let line = bresenham_line(from, to);
        let interior = line.len().saturating_sub(1);
        line.iter()
            .take(interior)
            .skip(1)
            .all(|cell| !self.field.is_obstacle(*cell))
    }

    fn search(
        &self,
        start: CellCoord,
        goal: CellCoord,
        max_cost: Option<u32>,
        extra_blocked: Option<&HashSet<CellCoord>>,
    ) -> Option<Vec<CellCoord>> {
        let width = self.field.width();
        let height = self.field.height();
        let start_index = index(width, height, start)?;
        let goal_index = index(width, height, goal)?;

        if start == goal {
            return Some(vec![start]);
        }

        let walkable = |cell: CellCoord| {
            self.is_walkable(cell) && !extra_blocked.is_some_and(|extra| extra.contains(&cell))
        };

        if !walkable(goal) {
            return None;
        }

        let cell_count = width as usize * height as usize;
        let mut g_score = vec![f64::INFINITY; cell_count];
        let mut keys = vec![SearchKey::UNSEEN; cell_count];
        let mut came_from = vec![NOT_QUEUED; cell_count];
        let mut closed = vec![false; cell_count];
        let mut open = OpenSet::with_capacity(cell_count);

        g_score[start_index] = 0.0;
        let start_h = octile_distance(start, goal);
        keys[start_index] = SearchKey {
            f: start_h,
            h: start_h,
        };
        open.push_or_update(start_index, &keys);

        while let Some(current_index) = open.pop(&keys) {
            if current_index == goal_index {
                return Some(reconstruct(&came_from, current_index, width));
            }
            closed[current_index] = true;

            let current = cell_at(width, current_index);
            for (neighbor, step_cost) in neighbors(current, width, height) {
                let Some(neighbor_index) = index(width, height, neighbor) else {
                    continue;
                };
                if closed[neighbor_index] || !walkable(neighbor) {
                    continue;
                }

                let tentative = g_score[current_index] + step_cost;
                if max_cost.is_some_and(|limit| tentative.round() > f64::from(limit)) {
                    continue;
                }
                if tentative >= g_score[neighbor_index] {
                    continue;
                }

                g_score[neighbor_index] = tentative;
                came_from[neighbor_index] = current_index;
                let h = octile_distance(neighbor, goal);
                keys[neighbor_index] = SearchKey {
                    f: tentative + h,
                    h,
                };
                open.push_or_update(neighbor_index, &keys);
            }
        }

        None
    }
}

/// Admissible distance estimate for 8-connected movement.
#[must_use]
pub fn octile_distance(from: CellCoord, to: CellCoord) -> f64 {
    let dx = from.column().abs_diff(to.column());
    let dy = from.row().abs_diff(to.row());
    let diagonal = dx.min(dy);
    let straight = dx.max(dy) - diagonal;
    f64::from(straight) * STRAIGHT_STEP_COST + f64::from(diagonal) * DIAGONAL_STEP_COST
}

/// Exact travel cost of a path, or `None` when two consecutive cells are not
/// joined by a straight run.
#[must_use]
pub fn path_cost(path: &[CellCoord]) -> Option<f64> {
    let mut straight = 0_u64;
    let mut diagonal = 0_u64;
    for pair in path.windows(2) {
        let dx = pair[0].column().abs_diff(pair[1].column());
        let dy = pair[0].row().abs_diff(pair[1].row());
        if dx != 0 && dy != 0 && dx != dy {
            return None;
        }
        if dx == dy {
            diagonal += u64::from(dx);
        } else {
            straight += u64::from(dx.max(dy));
        }
    }
    Some(straight as f64 * STRAIGHT_STEP_COST + diagonal as f64 * DIAGONAL_STEP_COST)
}

/// Travel cost of a path rounded to the integral movement budget scale.
#[must_use]
pub fn calculate_path_length(path: &[CellCoord]) -> Option<u32> {
    path_cost(path).map(|cost| cost.round() as u32)
}

/// Removes interior points that continue in the same direction as the previous step.
#[must_use]
pub fn optimize_path(path: &[CellCoord]) -> Vec<CellCoord> {
    if path.len() <= 2 {
        return path.to_vec();
    }

    let mut optimized = Vec::with_capacity(path.len());
    optimized.push(path[0]);
    for window in path.windows(3) {
        let incoming = normalized_direction(window[0], window[1]);
        let outgoing = normalized_direction(window[1], window[2]);
        let dx = incoming.0 - outgoing.0;
        let dy = incoming.1 - outgoing.1;
        if dx.hypot(dy) >= DIRECTION_EPSILON {
            optimized.push(window[1]);
        }
    }
    if let Some(&last) = path.last() {
        optimized.push(last);
    }
    optimized
}

/// Rasterises the segment between two cells, endpoints included.
#[must_use]
pub fn bresenham_line(from: CellCoord, to: CellCoord) -> Vec<CellCoord> {
    let (mut x, mut y) = (i64::from(from.column()), i64::from(from.row()));
    let (end_x, end_y) = (i64::from(to.column()), i64::from(to.row()));
    let dx = (end_x - x).abs();
    let dy = (end_y - y).abs();
    let step_x = if x < end_x { 1 } else { -1 };
    let step_y = if y < end_y { 1 } else { -1 };
    let mut error = dx - dy;
    let mut cells = Vec::with_capacity(dx.max(dy) as usize + 1);

    loop {
        if let Some(cell) = to_cell(x, y) {
            cells.push(cell);
        }
        if x == end_x && y == end_y {
            break;
        }
        let doubled = 2 * error;
        if doubled > -dy {
            error -= dy;
            x += step_x;
        }
        if doubled < dx {
            error += dx;
            y += step_y;
        }
    }

    cells
}

fn normalized_direction(from: CellCoord, to: CellCoord) -> (f64, f64) {
    let dx = f64::from(to.column()) - f64::from(from.column());
    let dy = f64::from(to.row()) - f64::from(from.row());
    let length = dx.hypot(dy);
    if length == 0.0 {
        (0.0, 0.0)
    } else {
        (dx / length, dy / length)
    }
}

/// Cells entered when travelling a straight run, excluding `from`.
fn straight_run(from: CellCoord, to: CellCoord) -> Option<Vec<CellCoord>> {
    let dx = i64::from(to.column()) - i64::from(from.column());
    let dy = i64::from(to.row()) - i64::from(from.row());
    if dx != 0 && dy != 0 && dx.abs() != dy.abs() {
        return None;
    }

    let steps = dx.abs().max(dy.abs());
    let (step_x, step_y) = (dx.signum(), dy.signum());
    (1..=steps)
        .map(|step| {
            to_cell(
                i64::from(from.column()) + step_x * step,
                i64::from(from.row()) + step_y * step,
            )
        })
        .collect()
}

fn neighbors(
    cell: CellCoord,
    width: u32,
    height: u32,
) -> impl Iterator<Item = (CellCoord, f64)> {
    NEIGHBOR_OFFSETS.into_iter().filter_map(move |(dx, dy)| {
        let neighbor = to_cell(i64::from(cell.column()) + dx, i64::from(cell.row()) + dy)?;
        if neighbor.column() >= width || neighbor.row() >= height {
            return None;
        }
        let cost = if dx != 0 && dy != 0 {
            DIAGONAL_STEP_COST
        } else {
            STRAIGHT_STEP_COST
        };
        Some((neighbor, cost))
    })
}

fn to_cell(column: i64, row: i64) -> Option<CellCoord> {
    Some(CellCoord::new(
        u32::try_from(column).ok()?,
        u32::try_from(row).ok()?,
    ))
}

fn index(width: u32, height: u32, cell: CellCoord) -> Option<usize> {
    if cell.column() >= width || cell.row() >= height {
        return None;
    }
    let column = usize::try_from(cell.column()).ok()?;
    let row = usize::try_from(cell.row()).ok()?;
    row.checked_mul(usize::try_from(width).ok()?)?
        .checked_add(column)
}

fn cell_at(width: u32, index: usize) -> CellCoord {
    let width = width as usize;
    CellCoord::new((index % width) as u32, (index / width) as u32)
}

fn reconstruct(came_from: &[usize], goal_index: usize, width: u32) -> Vec<CellCoord> {
    let mut path = vec![cell_at(width, goal_index)];
    let mut current = goal_index;
    while came_from[current] != NOT_QUEUED {
        current = came_from[current];
        path.push(cell_at(width, current));
    }
    path.reverse();
    path
}

#[derive(Clone, Copy, Debug)]
struct SearchKey {
    f: f64,
    h: f64,
}

impl SearchKey {
    const UNSEEN: Self = Self {
        f: f64::INFINITY,
        h: f64::INFINITY,
    };
}

/// Binary min-heap over cell indices that supports in-place priority updates.
#[derive(Debug)]
struct OpenSet {
    heap: Vec<usize>,
    slots: Vec<usize>,
}

impl OpenSet {
    fn with_capacity(cell_count: usize) -> Self {
        Self {
            heap: Vec::new(),
            slots: vec![NOT_QUEUED; cell_count],
        }
    }

    fn push_or_update(&mut self, node: usize, keys: &[SearchKey]) {
        let slot = match self.slots[node] {
            NOT_QUEUED => {
                self.heap.push(node);
                let slot = self.heap.len() - 1;
                self.slots[node] = slot;
                slot
            }
            slot => slot,
        };
        self.sift_up(slot, keys);
    }

    fn pop(&mut self, keys: &[SearchKey]) -> Option<usize> {
        if self.heap.is_empty() {
            return None;
        }
        let last = self.heap.len() - 1;
        self.swap(0, last);
        let node = self.heap.pop()?;
        self.slots[node] = NOT_QUEUED;
        if !self.heap.is_empty() {
            self.sift_down(0, keys);
        }
        Some(node)
    }

    fn sift_up(&mut self, mut slot: usize, keys: &[SearchKey]) {
        while slot > 0 {
            let parent = (slot - 1) / 2;
            if precedes(self.heap[slot], self.heap[parent], keys) {
                self.swap(slot, parent);
                slot = parent;
            } else {
                break;
            }
        }
    }

    fn sift_down(&mut self, mut slot: usize, keys: &[SearchKey]) {
        loop {
            let left = 2 * slot + 1;
            let right = left + 1;
            let mut smallest = slot;
            if left < self.heap.len() && precedes(self.heap[left], self.heap[smallest], keys) {
                smallest = left;
            }
            if right < self.heap.len() && precedes(self.heap[right], self.heap[smallest], keys) {
                smallest = right;
            }
            if smallest == slot {
                break;
            }
            self.swap(slot, smallest);
            slot = smallest;
        }
    }

    fn swap(&mut self, a: usize, b: usize) {
        self.heap.swap(a, b);
        self.slots[self.heap[a]] = a;
        self.slots[self.heap[b]] = b;
    }
}

fn precedes(a: usize, b: usize, keys: &[SearchKey]) -> bool {
    keys[a]
        .f
        .total_cmp(&keys[b].f)
        .then_with(|| keys[a].h.total_cmp(&keys[b].h))
        .then_with(|| a.cmp(&b))
        == Ordering::Less
}

#[cfg(test)]
mod tests {
    use super::*;
    use gridduel_core::GameConfig;

    fn open_field(width: u32, height: u32) -> GridField {
        let config = GameConfig {
            field_width: width,
            field_height: height,
            units_per_type: 1,
            ..GameConfig::default()
        };
        GridField::open(&config).expect("open field")
    }

    #[test]
    fn diagonal_path_rounds_to_integral_budget() {
        let field = open_field(20, 20);
        let planner = PathPlanner::new(&field);
        let path = planner
            .find_path(CellCoord::new(2, 2), CellCoord::new(5, 5), Some(4))
            .expect("path within budget");

        assert_eq!(path.first(), Some(&CellCoord::new(2, 2)));
        assert_eq!(path.last(), Some(&CellCoord::new(5, 5)));
        assert_eq!(path.len(), 4);
        assert_eq!(calculate_path_length(&path), Some(4));
    }

    #[test]
    fn bounded_search_prunes_distant_goals() {
        let field = open_field(20, 20);
        let planner = PathPlanner::new(&field);
        assert!(planner
            .find_path(CellCoord::new(2, 2), CellCoord::new(9, 2), Some(4))
            .is_none());
        assert!(planner
            .find_path(CellCoord::new(2, 2), CellCoord::new(9, 2), None)
            .is_some());
    }

    #[test]
    fn path_detours_around_wall() {
        let mut field = open_field(12, 12);
        for row in 3..9 {
            assert!(field.add_obstacle(CellCoord::new(6, row)));
        }
        let planner = PathPlanner::new(&field);
        let path = planner
            .find_path(CellCoord::new(4, 5), CellCoord::new(8, 5), None)
            .expect("detour exists");

        assert!(path.iter().all(|cell| !field.is_obstacle(*cell)));
        assert!(planner.is_path_valid(&path, None));
        assert!(path_cost(&path).expect("cost") > 4.0);
    }

    #[test]
    fn start_equal_to_goal_yields_single_cell() {
        let field = open_field(10, 10);
        let planner = PathPlanner::new(&field);
        let cell = CellCoord::new(4, 4);
        assert_eq!(planner.find_path(cell, cell, Some(0)), Some(vec![cell]));
    }

    #[test]
    fn blocked_goal_has_no_path() {
        let mut field = open_field(10, 10);
        assert!(field.add_obstacle(CellCoord::new(5, 5)));
        let planner = PathPlanner::new(&field);
        assert!(planner
            .find_path(CellCoord::new(4, 4), CellCoord::new(5, 5), None)
            .is_none());
        assert!(planner
            .find_path(CellCoord::new(4, 4), CellCoord::new(50, 5), None)
            .is_none());
    }

    #[test]
    fn occupied_cells_are_avoided() {
        let field = open_field(10, 10);
        let blocked: HashSet<CellCoord> = [CellCoord::new(5, 4), CellCoord::new(5, 5)]
            .into_iter()
            .collect();
        let planner = PathPlanner::new(&field);
        let path = planner
            .find_path_avoiding_units(CellCoord::new(4, 4), CellCoord::new(6, 4), &blocked)
            .expect("path around units");
        assert!(path.iter().all(|cell| !blocked.contains(cell)));

        let live = PathPlanner::with_occupied(&field, &blocked);
        assert!(!live.is_walkable(CellCoord::new(5, 5)));
        assert!(live.is_walkable(CellCoord::new(6, 6)));
    }

    #[test]
    fn optimize_path_keeps_corners_only() {
        let path = vec![
            CellCoord::new(0, 0),
            CellCoord::new(1, 1),
            CellCoord::new(2, 2),
            CellCoord::new(3, 2),
            CellCoord::new(4, 2),
        ];
        assert_eq!(
            optimize_path(&path),
            vec![
                CellCoord::new(0, 0),
                CellCoord::new(2, 2),
                CellCoord::new(4, 2)
            ]
        );
        assert_eq!(path_cost(&optimize_path(&path)), path_cost(&path));
    }

    #[test]
    fn path_validity_rejects_gaps_and_obstacles() {
        let mut field = open_field(10, 10);
        let planner_before = PathPlanner::new(&field);
        assert!(!planner_before.is_path_valid(&[], None));
        assert!(!planner_before
            .is_path_valid(&[CellCoord::new(1, 1), CellCoord::new(3, 2)], None));
        assert!(planner_before.is_path_valid(&[CellCoord::new(1, 1), CellCoord::new(4, 4)], Some(4)));
        assert!(!planner_before.is_path_valid(&[CellCoord::new(1, 1), CellCoord::new(4, 4)], Some(3)));

        assert!(field.add_obstacle(CellCoord::new(2, 2)));
        let planner = PathPlanner::new(&field);
        assert!(!planner.is_path_valid(&[CellCoord::new(1, 1), CellCoord::new(4, 4)], None));
    }

    #[test]
    fn bresenham_includes_both_endpoints() {
        let line = bresenham_line(CellCoord::new(0, 0), CellCoord::new(4, 2));
        assert_eq!(line.first(), Some(&CellCoord::new(0, 0)));
        assert_eq!(line.last(), Some(&CellCoord::new(4, 2)));
        assert_eq!(line.len(), 5);
    }

    #[test]
    fn line_of_sight_ignores_endpoints() {
        let mut field = open_field(10, 10);
        assert!(field.add_obstacle(CellCoord::new(3, 1)));
        let planner = PathPlanner::new(&field);
        assert!(!planner.has_line_of_sight(CellCoord::new(1, 1), CellCoord::new(5, 1)));
        assert!(planner.has_line_of_sight(CellCoord::new(1, 1), CellCoord::new(3, 1)));
        assert!(planner.has_line_of_sight(CellCoord::new(1, 2), CellCoord::new(5, 2)));
    }

    #[test]
    fn open_set_pops_in_priority_order_after_updates() {
        let mut keys = vec![SearchKey::UNSEEN; 4];
        let mut open = OpenSet::with_capacity(4);
        for (node, f) in [(0, 5.0), (1, 3.0), (2, 4.0), (3, 6.0)] {
            keys[node] = SearchKey { f, h: 0.0 };
            open.push_or_update(node, &keys);
        }
        keys[3] = SearchKey { f: 1.0, h: 0.0 };
        open.push_or_update(3, &keys);

        let order: Vec<usize> = std::iter::from_fn(|| open.pop(&keys)).collect();
        assert_eq!(order, vec![3, 1, 2, 0]);
    }
}
