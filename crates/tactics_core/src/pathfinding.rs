//! Grid-based pathfinding using the A* algorithm.
//!
//! Movement is 4-directional with unit step cost, so the Manhattan distance
//! is an exact lower bound. Walkability is evaluated lazily per node against
//! the live occupancy table, which means the result reflects the grid at the
//! moment of the search.
//!
//! Ties on `f = g + h` are broken by discovery order, so the same grid always
//! yields the same path.

use std::cmp::Ordering;
use std::collections::{BinaryHeap, HashMap};

use crate::map::{BattleMap, GridPos};
use crate::tile::Tiles;

/// A node in the A* open set priority queue.
#[derive(Debug, Clone, Copy, Eq, PartialEq)]
struct AStarNode {
    pos: GridPos,
    /// g_score + heuristic.
    f_score: u32,
    /// Discovery sequence number; lower was discovered first.
    seq: u64,
}

impl Ord for AStarNode {
    fn cmp(&self, other: &Self) -> Ordering {
        // BinaryHeap is a max-heap: reverse both keys for min-heap behaviour.
        match other.f_score.cmp(&self.f_score) {
            Ordering::Equal => other.seq.cmp(&self.seq),
            ord => ord,
        }
    }
}

impl PartialOrd for AStarNode {
    fn partial_cmp(&self, other: &Self) -> Option<Ordering> {
        Some(self.cmp(other))
    }
}

/// Find a path from `from` to `to` for a unit that can stand on `tile_mask`.
///
/// The returned path excludes the start cell and holds at most `max_steps`
/// cells. If the shortest path is longer than the budget it is cut to its
/// first `max_steps` cells; callers that need to arrive must check the
/// budget themselves.
///
/// Returns `None` if no path exists, if the goal cell is not walkable, if
/// `from == to`, or if `max_steps` is zero. Absence is an ordinary outcome.
#[must_use]
pub fn find_path(
    map: &BattleMap,
    from: GridPos,
    to: GridPos,
    max_steps: u32,
    tile_mask: Tiles,
) -> Option<Vec<GridPos>> {
    if max_steps == 0 || from == to || !map.in_bounds(from) || !map.is_spare(to, tile_mask) {
        return None;
    }

    let mut path = search(map, from, to, tile_mask)?;
    path.truncate(max_steps as usize);
    Some(path)
}

/// Internal A* returning the full path without the start cell.
fn search(map: &BattleMap, from: GridPos, to: GridPos, tile_mask: Tiles) -> Option<Vec<GridPos>> {
    let mut open_set: BinaryHeap<AStarNode> = BinaryHeap::new();
    let mut came_from: HashMap<GridPos, GridPos> = HashMap::new();
    let mut g_score: HashMap<GridPos, u32> = HashMap::new();
    let mut seq = 0_u64;

    g_score.insert(from, 0);
    open_set.push(AStarNode {
        pos: from,
        f_score: from.manhattan(to),
        seq,
    });

    while let Some(current) = open_set.pop() {
        if current.pos == to {
            return Some(reconstruct_path(&came_from, from, to));
        }

        let current_g = g_score.get(&current.pos).copied().unwrap_or(u32::MAX);

        // Stale heap entry superseded by a cheaper route.
        if current.f_score > current_g.saturating_add(current.pos.manhattan(to)) {
            continue;
        }

        for neighbor in current.pos.neighbors() {
            if !map.is_spare(neighbor, tile_mask) {
                continue;
            }

            let tentative_g = current_g + 1;
            let neighbor_g = g_score.get(&neighbor).copied().unwrap_or(u32::MAX);

            if tentative_g < neighbor_g {
                came_from.insert(neighbor, current.pos);
                g_score.insert(neighbor, tentative_g);

                seq += 1;
                open_set.push(AStarNode {
                    pos: neighbor,
                    f_score: tentative_g + neighbor.manhattan(to),
                    seq,
                });
            }
        }
    }

    None
}

/// Reconstruct the path from the came_from map, dropping the start cell.
fn reconstruct_path(
    came_from: &HashMap<GridPos, GridPos>,
    from: GridPos,
    to: GridPos,
) -> Vec<GridPos> {
    let mut path = vec![to];
    let mut current = to;

    while let Some(&prev) = came_from.get(&current) {
        if prev == from {
            break;
        }
        path.push(prev);
        current = prev;
    }

    path.reverse();
    path
}

/// Cells reachable from `from` within `max_steps` steps, in discovery order.
///
/// Used to present move ranges; the start cell is not included.
#[must_use]
pub fn reachable_cells(map: &BattleMap, from: GridPos, max_steps: u32, tile_mask: Tiles) -> Vec<GridPos> {
    let mut seen: HashMap<GridPos, u32> = HashMap::new();
    let mut frontier = std::collections::VecDeque::new();
    let mut out = Vec::new();

    seen.insert(from, 0);
    frontier.push_back(from);

    while let Some(pos) = frontier.pop_front() {
        let steps = seen[&pos];
        if steps == max_steps {
            continue;
        }
        for neighbor in pos.neighbors() {
            if seen.contains_key(&neighbor) || !map.is_spare(neighbor, tile_mask) {
                continue;
            }
            seen.insert(neighbor, steps + 1);
            out.push(neighbor);
            frontier.push_back(neighbor);
        }
    }

    out
}

#[cfg(test)]
mod tests {
    use super::*;
    use crate::map::OccupantKind;

    fn pos(x: i32, y: i32) -> GridPos {
        GridPos::new(x, y)
    }

    fn wall(map: &mut BattleMap, x: i32, ys: std::ops::Range<i32>) {
        for y in ys {
            map.spawn(pos(x, y), OccupantKind::Prop, true).unwrap();
        }
    }

    #[test]
    fn test_simple_path() {
        let map = BattleMap::new(10, 10);
        let path = find_path(&map, pos(0, 0), pos(3, 2), 20, Tiles::LAND).unwrap();

        assert_eq!(path.len(), 5);
        assert_eq!(*path.last().unwrap(), pos(3, 2));
        assert!(!path.contains(&pos(0, 0)), "start cell is excluded");
    }

    #[test]
    fn test_path_is_4_connected() {
        let map = BattleMap::new(10, 10);
        let path = find_path(&map, pos(1, 1), pos(7, 5), 20, Tiles::LAND).unwrap();

        let mut prev = pos(1, 1);
        for step in &path {
            assert!(prev.is_adjacent(*step), "{prev} -> {step} is not a single step");
            prev = *step;
        }
    }

    #[test]
    fn test_path_around_obstacle() {
        let mut map = BattleMap::new(10, 10);
        wall(&mut map, 5, 2..8);

        let path = find_path(&map, pos(2, 5), pos(8, 5), 30, Tiles::LAND).unwrap();

        assert_eq!(*path.last().unwrap(), pos(8, 5));
        for cell in &path {
            assert!(map.is_spare(*cell, Tiles::LAND), "path goes through blocked cell {cell}");
        }
    }

    #[test]
    fn test_non_obstacle_occupants_still_block() {
        let mut map = BattleMap::new(3, 1);
        map.spawn(pos(1, 0), OccupantKind::Prop, false).unwrap();

        assert!(find_path(&map, pos(0, 0), pos(2, 0), 5, Tiles::LAND).is_none());
        assert!(find_path(&map, pos(0, 0), pos(1, 0), 5, Tiles::LAND).is_none(), "occupied goal");
    }

    #[test]
    fn test_no_path_exists() {
        let mut map = BattleMap::new(10, 10);
        wall(&mut map, 5, 0..10);

        assert!(find_path(&map, pos(2, 5), pos(8, 5), 50, Tiles::LAND).is_none());
    }

    #[test]
    fn test_terrain_mask_blocks() {
        let map = BattleMap::with_tiles(5, 1, |x, _| if x == 2 { Tiles::WATER } else { Tiles::GRASS });

        assert!(find_path(&map, pos(0, 0), pos(4, 0), 10, Tiles::LAND).is_none());
        assert!(find_path(&map, pos(0, 0), pos(4, 0), 10, Tiles::LAND | Tiles::WATER).is_some());
    }

    #[test]
    fn test_budget_truncates() {
        let map = BattleMap::new(10, 1);
        let path = find_path(&map, pos(0, 0), pos(9, 0), 3, Tiles::LAND).unwrap();
        assert_eq!(path, vec![pos(1, 0), pos(2, 0), pos(3, 0)]);
    }

    #[test]
    fn test_zero_budget_and_same_cell() {
        let map = BattleMap::new(5, 5);
        assert!(find_path(&map, pos(0, 0), pos(1, 0), 0, Tiles::LAND).is_none());
        assert!(find_path(&map, pos(2, 2), pos(2, 2), 5, Tiles::LAND).is_none());
    }

    #[test]
    fn test_occupied_goal_is_unreachable() {
        let mut map = BattleMap::new(5, 5);
        map.spawn(pos(3, 3), OccupantKind::Warrior(crate::warrior::UnitId(0)), true)
            .unwrap();
        assert!(find_path(&map, pos(0, 0), pos(3, 3), 10, Tiles::LAND).is_none());
    }

    #[test]
    fn test_start_cell_may_be_occupied() {
        let mut map = BattleMap::new(5, 5);
        map.spawn(pos(0, 0), OccupantKind::Warrior(crate::warrior::UnitId(0)), true)
            .unwrap();
        assert!(find_path(&map, pos(0, 0), pos(2, 0), 10, Tiles::LAND).is_some());
    }

    #[test]
    fn test_determinism() {
        let mut map = BattleMap::new(20, 20);
        wall(&mut map, 10, 5..15);

        let path1 = find_path(&map, pos(5, 10), pos(15, 10), 40, Tiles::LAND);
        let path2 = find_path(&map, pos(5, 10), pos(15, 10), 40, Tiles::LAND);
        let path3 = find_path(&map, pos(5, 10), pos(15, 10), 40, Tiles::LAND);

        assert_eq!(path1, path2);
        assert_eq!(path2, path3);
    }

    #[test]
    fn test_reachable_cells_respects_budget() {
        let map = BattleMap::new(5, 5);
        let cells = reachable_cells(&map, pos(2, 2), 1, Tiles::LAND);
        assert_eq!(cells.len(), 4);
        assert!(cells.iter().all(|c| c.manhattan(pos(2, 2)) == 1));

        let cells = reachable_cells(&map, pos(0, 0), 2, Tiles::LAND);
        assert!(cells.iter().all(|c| c.manhattan(pos(0, 0)) <= 2));
        assert_eq!(cells.len(), 5);
    }
}
