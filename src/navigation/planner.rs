//! Shortest-path search over the navigation mesh

use super::mesh::GridMesh;
use crate::common::TileCoord;
use crate::config::SearchKind;
use crate::error::{NavError, Result};
use std::cmp::Reverse;
use std::collections::{BinaryHeap, HashMap, HashSet};
use tracing::trace;

/// Trait for tile route search algorithms
pub trait PathPlanner: Send + Sync {
    /// Minimum-cost tile sequence from `start` to `goal`, both included
    fn find_route(
        &self,
        mesh: &GridMesh,
        start: TileCoord,
        goal: TileCoord,
    ) -> Result<Vec<TileCoord>>;

    fn name(&self) -> &str;
}

/// A* with the Manhattan distance heuristic
#[derive(Debug, Default)]
pub struct AStarPlanner;

/// Uniform-cost (Dijkstra) search
#[derive(Debug, Default)]
pub struct UniformCostPlanner;

impl PathPlanner for AStarPlanner {
    fn find_route(
        &self,
        mesh: &GridMesh,
        start: TileCoord,
        goal: TileCoord,
    ) -> Result<Vec<TileCoord>> {
        search(mesh, start, goal, |t| t.manhattan(&goal))
    }

    fn name(&self) -> &str {
        "astar"
    }
}

impl PathPlanner for UniformCostPlanner {
    fn find_route(
        &self,
        mesh: &GridMesh,
        start: TileCoord,
        goal: TileCoord,
    ) -> Result<Vec<TileCoord>> {
        search(mesh, start, goal, |_| 0)
    }

    fn name(&self) -> &str {
        "uniform_cost"
    }
}

/// Planner selected by configuration
pub fn create_planner(kind: SearchKind) -> Box<dyn PathPlanner> {
    match kind {
        SearchKind::Astar => Box::new(AStarPlanner),
        SearchKind::UniformCost => Box::new(UniformCostPlanner),
    }
}

// Unit edge costs. Ties on f are broken by push order, so results only
// depend on the mesh's neighbour order.
fn search<H>(
    mesh: &GridMesh,
    start: TileCoord,
    goal: TileCoord,
    heuristic: H,
) -> Result<Vec<TileCoord>>
where
    H: Fn(TileCoord) -> u32,
{
    if !mesh.contains(start) {
        return Err(NavError::StartNotOnMesh { x: start.x, y: start.y });
    }
    if !mesh.contains(goal) {
        return Err(NavError::DestinationUnreachable { x: goal.x, y: goal.y });
    }

    let mut open = BinaryHeap::new();
    let mut closed = HashSet::new();
    let mut came_from: HashMap<TileCoord, TileCoord> = HashMap::new();
    let mut g_scores: HashMap<TileCoord, u32> = HashMap::new();
    let mut seq = 0u64;

    g_scores.insert(start, 0);
    open.push(Reverse((heuristic(start), seq, start)));

    while let Some(Reverse((_, _, current))) = open.pop() {
        if current == goal {
            return Ok(reconstruct(&came_from, goal));
        }
        if !closed.insert(current) {
            continue;
        }
        let g = g_scores[&current];
        for neighbor in mesh.neighbors(current) {
            if closed.contains(&neighbor) {
                continue;
            }
            let tentative = g + 1;
            if tentative < g_scores.get(&neighbor).copied().unwrap_or(u32::MAX) {
                came_from.insert(neighbor, current);
                g_scores.insert(neighbor, tentative);
                seq += 1;
                open.push(Reverse((tentative + heuristic(neighbor), seq, neighbor)));
            }
        }
    }

    trace!("no route from {} to {} after closing {} tiles", start, goal, closed.len());
    Err(NavError::DestinationUnreachable { x: goal.x, y: goal.y })
}

fn reconstruct(came_from: &HashMap<TileCoord, TileCoord>, goal: TileCoord) -> Vec<TileCoord> {
    let mut route = vec![goal];
    let mut current = goal;
    while let Some(&prev) = came_from.get(&current) {
        route.push(prev);
        current = prev;
    }
    route.reverse();
    route
}
