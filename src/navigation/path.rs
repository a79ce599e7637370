//! Planned routes as tile-centred waypoints

use crate::common::TileCoord;

/// A single planned stopping point at a tile centre
#[derive(Debug, Clone, Copy, PartialEq)]
pub struct Waypoint {
    pub tile: TileCoord,
    pub x: f64,
    pub y: f64,
    /// Heading to turn to on arrival, in degrees
    pub heading: Option<f64>,
}

/// An immutable, ordered route. Re-planning builds a new `Path`.
#[derive(Debug, Clone, PartialEq)]
pub struct Path {
    waypoints: Vec<Waypoint>,
}

impl Path {
    /// Build a path through the centres of `tiles`; `final_heading` is
    /// attached to the last waypoint.
    pub fn from_tiles(tiles: &[TileCoord], tile_width: f64, final_heading: Option<f64>) -> Self {
        let last = tiles.len().saturating_sub(1);
        let waypoints = tiles
            .iter()
            .enumerate()
            .map(|(i, &tile)| {
                let (x, y) = tile.center(tile_width);
                Waypoint {
                    tile,
                    x,
                    y,
                    heading: if i == last { final_heading } else { None },
                }
            })
            .collect();
        Path { waypoints }
    }

    pub fn waypoints(&self) -> &[Waypoint] {
        &self.waypoints
    }

    pub fn tiles(&self) -> impl Iterator<Item = TileCoord> + '_ {
        self.waypoints.iter().map(|w| w.tile)
    }

    pub fn len(&self) -> usize {
        self.waypoints.len()
    }

    pub fn is_empty(&self) -> bool {
        self.waypoints.is_empty()
    }

    /// Number of one-tile moves along the path
    pub fn moves(&self) -> usize {
        self.waypoints.len().saturating_sub(1)
    }

    pub fn start(&self) -> Option<&Waypoint> {
        self.waypoints.first()
    }

    pub fn destination(&self) -> Option<&Waypoint> {
        self.waypoints.last()
    }
}

impl<'a> IntoIterator for &'a Path {
    type Item = &'a Waypoint;
    type IntoIter = std::slice::Iter<'a, Waypoint>;

    fn into_iter(self) -> Self::IntoIter {
        self.waypoints.iter()
    }
}
