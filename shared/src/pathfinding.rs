// A* pathfinding over grid maps.
//
// The search is seeded at the destination and expands toward the mover. A
// click on a tile the player has not found a route to yet then fails fast
// around the destination instead of flooding the whole map from the mover.
// The mover's own tile is impassable (it is standing there), so it is
// admitted as a neighbour by positional equality alone.
//
// Open set is a `BinaryHeap` with reversed ordering (min-heap) and lazy
// deletion; scores and predecessor links live in `HashMap`s keyed by
// position, so the nodes only exist for the duration of one call.
//
// See also: `model.rs` for `MainMap`, the grid both sessions search.

use crate::position::Position;
use log::debug;
use std::cmp::Ordering;
use std::collections::{BinaryHeap, HashMap, HashSet};

/// Cost reported for tiles nothing can enter.
pub const IMPASSABLE_COST: u32 = u32::MAX;

/// A grid the pathfinder can search.
///
/// `heuristic` must be admissible: it may never overestimate the real cost
/// of reaching `to` from `from`.
pub trait PathMap {
    fn is_passable(&self, pos: Position) -> bool;

    fn pass_cost(&self, pos: Position) -> u32;

    fn neighbors(&self, pos: Position) -> Vec<Position>;

    fn heuristic(&self, from: Position, to: Position) -> u32;

    /// Shortest path for a unit standing on `mover` to `destination`.
    ///
    /// The result starts with the first step away from `mover` and ends on
    /// `destination`. Empty when the destination is impassable or
    /// unreachable.
    fn find_path(&self, mover: Position, destination: Position) -> Vec<Position> {
        astar(self, mover, destination)
    }

    /// Sum of the per-tile costs of entering every tile of `path`.
    fn path_cost(&self, path: &[Position]) -> u64 {
        path.iter().map(|pos| u64::from(self.pass_cost(*pos))).sum()
    }

    /// Longest prefix of `path` whose cumulative cost fits in `budget`.
    fn truncate_to_budget(&self, path: &[Position], budget: u32) -> Vec<Position> {
        let mut remaining = i64::from(budget);
        let mut legal = Vec::with_capacity(path.len());
        for step in path {
            remaining -= i64::from(self.pass_cost(*step));
            if remaining < 0 {
                break;
            }
            legal.push(*step);
        }
        legal
    }
}

/// Entry in the open set (min-heap via reversed ordering).
struct OpenEntry {
    pos: Position,
    f_score: u64,
}

impl PartialEq for OpenEntry {
    fn eq(&self, other: &Self) -> bool {
        self.f_score == other.f_score && self.pos == other.pos
    }
}

impl Eq for OpenEntry {}

impl PartialOrd for OpenEntry {
    fn partial_cmp(&self, other: &Self) -> Option<Ordering> {
        Some(self.cmp(other))
    }
}

impl Ord for OpenEntry {
    fn cmp(&self, other: &Self) -> Ordering {
        // Reversed: smallest f_score is "greatest".
        other
            .f_score
            .cmp(&self.f_score)
            .then_with(|| other.pos.cmp(&self.pos))
    }
}

/// Runs A* from `destination` back to `mover`. See [`PathMap::find_path`].
pub fn astar<M: PathMap + ?Sized>(map: &M, mover: Position, destination: Position) -> Vec<Position> {
    if !map.is_passable(destination) {
        return Vec::new();
    }

    let root = destination;
    let target = mover;

    let mut g_score: HashMap<Position, u64> = HashMap::new();
    let mut came_from: HashMap<Position, Position> = HashMap::new();
    let mut closed: HashSet<Position> = HashSet::new();
    let mut open = BinaryHeap::new();

    let root_g = u64::from(map.pass_cost(root));
    g_score.insert(root, root_g);
    open.push(OpenEntry {
        pos: root,
        f_score: root_g + u64::from(map.heuristic(root, target)),
    });

    while let Some(current) = open.pop() {
        let pos = current.pos;

        if pos == target {
            return reconstruct_path(&came_from, target);
        }

        if !closed.insert(pos) {
            continue;
        }

        let current_g = g_score[&pos];

        for neighbor in map.neighbors(pos) {
            if closed.contains(&neighbor) {
                continue;
            }
            if !map.is_passable(neighbor) && neighbor != target {
                continue;
            }

            let tentative_g = current_g + u64::from(map.pass_cost(neighbor));
            let known_g = g_score.get(&neighbor).copied().unwrap_or(u64::MAX);
            if tentative_g < known_g {
                g_score.insert(neighbor, tentative_g);
                came_from.insert(neighbor, pos);
                open.push(OpenEntry {
                    pos: neighbor,
                    f_score: tentative_g + u64::from(map.heuristic(neighbor, target)),
                });
            }
        }
    }

    debug!("No path from {} to {}", mover, destination);
    Vec::new()
}

/// Walks predecessor links from the mover back to the root and drops the
/// mover's own tile.
fn reconstruct_path(came_from: &HashMap<Position, Position>, target: Position) -> Vec<Position> {
    let mut path = Vec::new();
    let mut current = target;
    while let Some(&previous) = came_from.get(&current) {
        path.push(previous);
        current = previous;
    }
    path
}
