//! Navigation mesh over free tiles
//!
//! Nodes are free tiles, edges join tiles one step apart on a single axis.
//! Keeping the mesh 4-connected means every planned leg is axis-aligned,
//! which the line-crossing drift correction relies on.

use crate::common::TileCoord;
use super::grid_map::GridMap;
use std::collections::HashMap;

/// Grid graph rebuilt from the map on demand
#[derive(Debug, Clone, Default)]
pub struct GridMesh {
    nodes: Vec<TileCoord>,
    index: HashMap<TileCoord, usize>,
    neighbors: Vec<Vec<usize>>,
    map_revision: u64,
}

impl GridMesh {
    pub fn from_map(map: &GridMap) -> Self {
        let mut mesh = GridMesh::default();
        mesh.regenerate(map);
        mesh
    }

    /// Drop every node and rebuild from the current map contents
    pub fn regenerate(&mut self, map: &GridMap) {
        self.nodes.clear();
        self.index.clear();
        self.neighbors.clear();
        for tile in map.free_tiles() {
            self.add_node(tile);
        }
        self.map_revision = map.revision();
    }

    /// Add a node and connect it to the already present 4-neighbours.
    /// Returns the number of connections made.
    pub fn add_node(&mut self, tile: TileCoord) -> usize {
        if self.index.contains_key(&tile) {
            return 0;
        }
        let id = self.nodes.len();
        self.nodes.push(tile);
        self.index.insert(tile, id);
        self.neighbors.push(Vec::new());

        let mut connected = 0;
        for (dx, dy) in [(-1, 0), (0, -1), (0, 1), (1, 0)] {
            let other = TileCoord::new(tile.x + dx, tile.y + dy);
            if let Some(&other_id) = self.index.get(&other) {
                self.neighbors[id].push(other_id);
                self.neighbors[other_id].push(id);
                connected += 1;
            }
        }
        connected
    }

    /// Remove a node and all of its edges
    pub fn remove_node(&mut self, tile: TileCoord) -> bool {
        let Some(id) = self.index.remove(&tile) else {
            return false;
        };
        let last = self.nodes.len() - 1;
        for n in std::mem::take(&mut self.neighbors[id]) {
            self.neighbors[n].retain(|&m| m != id);
        }
        self.nodes.swap_remove(id);
        self.neighbors.swap_remove(id);
        if id != last {
            // The former last node now lives at `id`.
            let moved = self.nodes[id];
            self.index.insert(moved, id);
            for n in self.neighbors[id].clone() {
                for m in self.neighbors[n].iter_mut() {
                    if *m == last {
                        *m = id;
                    }
                }
            }
        }
        true
    }

    pub fn contains(&self, tile: TileCoord) -> bool {
        self.index.contains_key(&tile)
    }

    pub fn len(&self) -> usize {
        self.nodes.len()
    }

    pub fn is_empty(&self) -> bool {
        self.nodes.is_empty()
    }

    /// Map revision this mesh was built from
    pub fn map_revision(&self) -> u64 {
        self.map_revision
    }

    /// Neighbours of `tile` in insertion order (empty when not a node)
    pub fn neighbors(&self, tile: TileCoord) -> impl Iterator<Item = TileCoord> + '_ {
        self.index
            .get(&tile)
            .into_iter()
            .flat_map(move |&id| self.neighbors[id].iter().map(move |&n| self.nodes[n]))
    }

    pub fn is_connected(&self, a: TileCoord, b: TileCoord) -> bool {
        self.neighbors(a).any(|n| n == b)
    }

    pub fn nodes(&self) -> &[TileCoord] {
        &self.nodes
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn free_tiles_become_nodes() {
        let map = GridMap::from_rows(&["#...", "..##", "....", ".#.."]).unwrap();
        let mesh = GridMesh::from_map(&map);
        assert_eq!(mesh.len(), map.free_count());
        assert!(!mesh.contains(TileCoord::new(1, 0)));
        assert!(mesh.contains(TileCoord::new(0, 0)));
    }

    #[test]
    fn only_axis_neighbours_are_connected() {
        let mesh = GridMesh::from_map(&GridMap::new(4));
        let t = TileCoord::new(1, 1);
        assert!(mesh.is_connected(t, TileCoord::new(1, 2)));
        assert!(mesh.is_connected(t, TileCoord::new(2, 1)));
        assert!(mesh.is_connected(TileCoord::new(0, 1), t));
        assert!(!mesh.is_connected(t, TileCoord::new(2, 2)));
        assert!(!mesh.is_connected(t, TileCoord::new(1, 3)));
        assert!(!mesh.is_connected(t, TileCoord::new(3, 1)));
        assert_eq!(mesh.neighbors(t).count(), 4);
        assert_eq!(mesh.neighbors(TileCoord::new(0, 0)).count(), 2);
    }

    #[test]
    fn blocked_tiles_cut_edges() {
        let map = GridMap::from_rows(&["...", ".#.", "..."]).unwrap();
        let mesh = GridMesh::from_map(&map);
        assert!(!mesh.is_connected(TileCoord::new(1, 0), TileCoord::new(1, 1)));
        assert_eq!(mesh.neighbors(TileCoord::new(1, 0)).count(), 2);
        assert_eq!(mesh.neighbors(TileCoord::new(1, 1)).count(), 0);
    }

    #[test]
    fn remove_node_keeps_mesh_consistent() {
        let mut mesh = GridMesh::from_map(&GridMap::new(3));
        assert!(mesh.remove_node(TileCoord::new(0, 0)));
        assert!(!mesh.remove_node(TileCoord::new(0, 0)));
        assert_eq!(mesh.len(), 8);
        assert!(!mesh.is_connected(TileCoord::new(0, 1), TileCoord::new(0, 0)));
        // the node swapped into the freed slot keeps its own edges
        assert!(mesh.is_connected(TileCoord::new(2, 2), TileCoord::new(2, 1)));
        assert!(mesh.is_connected(TileCoord::new(2, 1), TileCoord::new(2, 2)));
        assert!(mesh.is_connected(TileCoord::new(1, 2), TileCoord::new(2, 2)));
        for &tile in mesh.nodes() {
            for n in mesh.neighbors(tile) {
                assert!(mesh.is_connected(n, tile));
                assert!(tile.is_adjacent(&n));
            }
        }
    }

    #[test]
    fn regenerate_tracks_map_edits() {
        let mut map = GridMap::new(3);
        let mut mesh = GridMesh::from_map(&map);
        map.set_blocked(TileCoord::new(1, 1), true).unwrap();
        assert_ne!(mesh.map_revision(), map.revision());
        assert!(mesh.contains(TileCoord::new(1, 1)));
        mesh.regenerate(&map);
        assert_eq!(mesh.map_revision(), map.revision());
        assert!(!mesh.contains(TileCoord::new(1, 1)));
    }
}
