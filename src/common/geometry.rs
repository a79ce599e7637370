//! Poses, tile coordinates and the metric <-> tile conversions

use nalgebra::Vector2;
use std::fmt;

use super::Direction;

/// Continuous robot pose: position in millimetres, heading in degrees
/// (counter-clockwise, 0 along +x).
#[derive(Debug, Clone, Copy, PartialEq, Default)]
pub struct Pose {
    pub x: f64,
    pub y: f64,
    pub heading: f64,
}

impl Pose {
    pub fn new(x: f64, y: f64, heading: f64) -> Self {
        Pose { x, y, heading }
    }

    pub fn position(&self) -> Vector2<f64> {
        Vector2::new(self.x, self.y)
    }

    /// Straight-line distance between the two positions (heading ignored)
    pub fn distance_to(&self, other: &Pose) -> f64 {
        (self.position() - other.position()).norm()
    }

    /// Heading normalized to (-180, 180]
    pub fn normalized(self) -> Self {
        Pose {
            heading: normalize_degrees(self.heading),
            ..self
        }
    }

    /// Tile this pose currently lies on
    pub fn tile(&self, tile_width: f64) -> TileCoord {
        TileCoord::new(
            metric_to_tile(self.x, tile_width),
            metric_to_tile(self.y, tile_width),
        )
    }
}

impl fmt::Display for Pose {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        write!(f, "({:.1}, {:.1}, {:.1}°)", self.x, self.y, self.heading)
    }
}

/// Integer tile index pair
#[derive(Debug, Clone, Copy, PartialEq, Eq, Hash, PartialOrd, Ord)]
pub struct TileCoord {
    pub x: i32,
    pub y: i32,
}

impl TileCoord {
    pub fn new(x: i32, y: i32) -> Self {
        TileCoord { x, y }
    }

    pub fn manhattan(&self, other: &TileCoord) -> u32 {
        self.x.abs_diff(other.x) + self.y.abs_diff(other.y)
    }

    /// The adjacent tile one step in `dir`
    pub fn step(&self, dir: Direction) -> TileCoord {
        let (dx, dy) = dir.step();
        TileCoord::new(self.x + dx, self.y + dy)
    }

    /// True iff the two tiles differ by exactly one unit on exactly one axis
    pub fn is_adjacent(&self, other: &TileCoord) -> bool {
        self.manhattan(other) == 1
    }

    /// Metric centre of this tile
    pub fn center(&self, tile_width: f64) -> (f64, f64) {
        (tile_to_metric(self.x, tile_width), tile_to_metric(self.y, tile_width))
    }
}

impl fmt::Display for TileCoord {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        write!(f, "({}, {})", self.x, self.y)
    }
}

/// Metric coordinate of the centre of tile index `index`
pub fn tile_to_metric(index: i32, tile_width: f64) -> f64 {
    (index as f64 + 0.5) * tile_width
}

/// Tile index containing the metric coordinate `coord`
pub fn metric_to_tile(coord: f64, tile_width: f64) -> i32 {
    (coord / tile_width).floor() as i32
}

/// Normalize an angle in degrees to (-180, 180]
pub fn normalize_degrees(angle: f64) -> f64 {
    let a = angle.rem_euclid(360.0);
    if a > 180.0 {
        a - 360.0
    } else {
        a
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use approx::assert_relative_eq;

    #[test]
    fn tile_centres_round_trip() {
        let w = 304.8;
        for i in -3..6 {
            let c = tile_to_metric(i, w);
            assert_eq!(metric_to_tile(c, w), i);
        }
        assert_relative_eq!(tile_to_metric(0, w), 152.4);
        assert_eq!(metric_to_tile(-0.1, w), -1);
    }

    #[test]
    fn normalize_keeps_half_open_range() {
        assert_relative_eq!(normalize_degrees(190.0), -170.0);
        assert_relative_eq!(normalize_degrees(-190.0), 170.0);
        assert_relative_eq!(normalize_degrees(180.0), 180.0);
        assert_relative_eq!(normalize_degrees(-180.0), 180.0);
        assert_relative_eq!(normalize_degrees(720.0 + 45.0), 45.0);
    }

    #[test]
    fn adjacency_is_four_connected() {
        let t = TileCoord::new(2, 2);
        assert!(t.is_adjacent(&TileCoord::new(2, 3)));
        assert!(t.is_adjacent(&TileCoord::new(1, 2)));
        assert!(!t.is_adjacent(&TileCoord::new(3, 3)));
        assert!(!t.is_adjacent(&TileCoord::new(2, 4)));
        assert!(!t.is_adjacent(&t));
        assert_eq!(t.step(Direction::Left), TileCoord::new(1, 2));
    }

    #[test]
    fn pose_distance_ignores_heading() {
        let a = Pose::new(0.0, 0.0, 10.0);
        let b = Pose::new(3.0, 4.0, -80.0);
        assert_relative_eq!(a.distance_to(&b), 5.0);
        assert_eq!(b.tile(2.0), TileCoord::new(1, 2));
    }
}
