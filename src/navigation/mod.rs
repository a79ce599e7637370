//! Navigation module: map, mesh, route search and movement
pub mod grid_map;
pub mod mesh;
pub mod movement;
pub mod path;
pub mod planner;

use self::grid_map::SharedMap;
use self::mesh::GridMesh;
use self::path::Path;
use self::planner::{create_planner, PathPlanner};
use crate::common::TileCoord;
use crate::config::NavConfig;
use crate::error::Result;
use tracing::{debug, warn};

/// Path planner: the navigation mesh plus a route search
pub struct NavigationStack {
    map: SharedMap,
    mesh: GridMesh,
    planner: Box<dyn PathPlanner>,
    tile_width: f64,
}

impl NavigationStack {
    pub fn new(map: SharedMap, config: &NavConfig) -> Result<Self> {
        let mesh = GridMesh::from_map(&*map.read()?);
        Ok(NavigationStack {
            map,
            mesh,
            planner: create_planner(config.planner.search),
            tile_width: config.grid.tile_width_mm,
        })
    }

    /// Swap the route search
    pub fn set_planner<P: PathPlanner + 'static>(&mut self, planner: P) {
        self.planner = Box::new(planner);
    }

    pub fn planner_name(&self) -> &str {
        self.planner.name()
    }

    /// Plan a route between two tiles.
    ///
    /// Uses the mesh as of the last `regenerate()`; after a map edit the
    /// caller must regenerate first. A start tile inside a closed pickup
    /// zone is joined to the mesh for this search only, so the robot can
    /// always drive out of the zone.
    pub fn plan(
        &self,
        from: TileCoord,
        to: TileCoord,
        final_heading: Option<f64>,
    ) -> Result<Path> {
        let (revision, in_zone) = {
            let map = self.map.read()?;
            let in_zone = map.pickup_zone().is_some_and(|zone| zone.contains(&from));
            (map.revision(), in_zone)
        };
        if revision != self.mesh.map_revision() {
            warn!(
                "planning on a stale mesh (mesh revision {}, map revision {}); \
                 call regenerate() after map edits",
                self.mesh.map_revision(),
                revision
            );
        }

        let route = if in_zone && !self.mesh.contains(from) {
            debug!("leaving closed pickup zone from {}", from);
            let mut mesh = self.mesh.clone();
            mesh.add_node(from);
            self.planner.find_route(&mesh, from, to)?
        } else {
            self.planner.find_route(&self.mesh, from, to)?
        };
        debug!(
            "{} route {} -> {}: {} moves",
            self.planner.name(),
            from,
            to,
            route.len() - 1
        );
        Ok(Path::from_tiles(&route, self.tile_width, final_heading))
    }

    /// Rebuild the mesh from the current map
    pub fn regenerate(&mut self) -> Result<()> {
        let map = self.map.read()?;
        self.mesh.regenerate(&map);
        debug!("regenerated navigation mesh: {} nodes", self.mesh.len());
        Ok(())
    }

    /// Block the pickup zone on the map. Follow with `regenerate()`.
    pub fn block_pickup_zone(&self) -> Result<()> {
        self.map.write()?.block_pickup_zone()
    }

    /// Unblock the pickup zone on the map. Follow with `regenerate()`.
    pub fn unblock_pickup_zone(&self) -> Result<()> {
        self.map.write()?.unblock_pickup_zone()
    }

    pub fn mesh(&self) -> &GridMesh {
        &self.mesh
    }

    pub fn map(&self) -> &SharedMap {
        &self.map
    }

    pub fn tile_width(&self) -> f64 {
        self.tile_width
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use crate::error::NavError;
    use crate::navigation::grid_map::GridMap;
    use crate::navigation::planner::UniformCostPlanner;

    fn stack(rows: &[&str], zone: [TileCoord; 2]) -> NavigationStack {
        let mut map = GridMap::from_rows(rows).unwrap();
        map.set_pickup_zone(zone).unwrap();
        NavigationStack::new(SharedMap::new(map), &NavConfig::default()).unwrap()
    }

    #[test]
    fn pickup_zone_toggle_changes_routes_after_regenerate() {
        // Corridor along y = 0 with the pickup zone in the middle.
        let mut nav = stack(
            &["....", ".##.", ".##.", "...."],
            [TileCoord::new(1, 0), TileCoord::new(2, 0)],
        );
        let from = TileCoord::new(0, 0);
        let to = TileCoord::new(3, 0);
        assert_eq!(nav.plan(from, to, None).unwrap().moves(), 3);

        nav.block_pickup_zone().unwrap();
        nav.regenerate().unwrap();
        let around = nav.plan(from, to, None).unwrap();
        assert_eq!(around.moves(), 9);
        assert!(around.tiles().all(|t| t.y != 0 || t.x == 0 || t.x == 3));

        nav.unblock_pickup_zone().unwrap();
        nav.regenerate().unwrap();
        assert_eq!(nav.plan(from, to, None).unwrap().moves(), 3);
    }

    #[test]
    fn sealed_pickup_zone_makes_goal_unreachable() {
        let mut nav = stack(
            &["####", "####", "####", "...."],
            [TileCoord::new(1, 0), TileCoord::new(2, 0)],
        );
        let from = TileCoord::new(3, 0);
        let to = TileCoord::new(0, 0);
        assert_eq!(nav.plan(from, to, None).unwrap().moves(), 3);
        nav.block_pickup_zone().unwrap();
        nav.regenerate().unwrap();
        let err = nav.plan(from, to, None).unwrap_err();
        assert!(matches!(err, NavError::DestinationUnreachable { x: 0, y: 0 }));
    }

    #[test]
    fn start_inside_closed_zone_can_leave_it() {
        let mut nav = stack(
            &["#...", "..##", "....", ".#.."],
            [TileCoord::new(2, 0), TileCoord::new(3, 0)],
        );
        nav.block_pickup_zone().unwrap();
        nav.regenerate().unwrap();
        assert!(!nav.mesh().contains(TileCoord::new(2, 0)));

        let path = nav.plan(TileCoord::new(2, 0), TileCoord::new(0, 0), None).unwrap();
        let tiles: Vec<_> = path.tiles().collect();
        assert_eq!(tiles.first(), Some(&TileCoord::new(2, 0)));
        assert_eq!(tiles.last(), Some(&TileCoord::new(0, 0)));
        assert_eq!(path.moves(), 4);
        // The other zone tile stays closed and the shared mesh is untouched
        assert!(!tiles.contains(&TileCoord::new(3, 0)));
        assert!(!nav.mesh().contains(TileCoord::new(2, 0)));

        // Outside the zone an off-mesh start is still an error
        let err = nav.plan(TileCoord::new(1, 0), TileCoord::new(0, 0), None).unwrap_err();
        assert!(matches!(err, NavError::StartNotOnMesh { x: 1, y: 0 }));
    }

    #[test]
    fn planner_can_be_swapped() {
        let mut nav = stack(&["..", ".."], [TileCoord::new(0, 0), TileCoord::new(1, 0)]);
        assert_eq!(nav.planner_name(), "astar");
        nav.set_planner(UniformCostPlanner);
        assert_eq!(nav.planner_name(), "uniform_cost");
        let path = nav.plan(TileCoord::new(0, 0), TileCoord::new(1, 1), Some(90.0)).unwrap();
        assert_eq!(path.moves(), 2);
        assert_eq!(path.destination().unwrap().heading, Some(90.0));
    }
}
