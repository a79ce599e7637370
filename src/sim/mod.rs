//! Hardware-free simulation of the robot on its tile grid
//!
//! The world keeps the robot's true pose. The simulated drive moves the
//! true pose with configurable scale error while dead-reckoning the
//! commanded motion into the pose store, so the two drift apart the way a
//! real robot's odometry does. Sensors read the true pose.

mod drive;
mod sensors;

pub use self::drive::{SimulatedDrive, StepHook};
pub use self::sensors::{SimLineSensor, SimProximitySensor};

use crate::common::{metric_to_tile, Pose, TileCoord};
use crate::navigation::grid_map::GridMap;
use std::sync::{Arc, Mutex, MutexGuard};

/// Ray-cast resolution
const RAY_STEP_MM: f64 = 5.0;

/// Light reading over bare floor
pub const FLOOR_LIGHT: i32 = 600;
/// Light reading over a grid line
pub const LINE_LIGHT: i32 = 300;

/// Ground truth for a simulated mission
#[derive(Debug)]
pub struct SimWorld {
    map: GridMap,
    tile_width: f64,
    line_half_width: f64,
    true_pose: Mutex<Pose>,
}

impl SimWorld {
    pub fn new(map: GridMap, tile_width: f64, start: Pose) -> Arc<Self> {
        Self::with_line_width(map, tile_width, start, 3.0)
    }

    /// World whose grid lines are `2 * line_half_width` wide
    pub fn with_line_width(
        map: GridMap,
        tile_width: f64,
        start: Pose,
        line_half_width: f64,
    ) -> Arc<Self> {
        Arc::new(SimWorld {
            map,
            tile_width,
            line_half_width,
            true_pose: Mutex::new(start.normalized()),
        })
    }

    pub fn map(&self) -> &GridMap {
        &self.map
    }

    pub fn tile_width(&self) -> f64 {
        self.tile_width
    }

    pub fn true_pose(&self) -> Pose {
        *self.lock()
    }

    pub fn set_true_pose(&self, pose: Pose) {
        *self.lock() = pose.normalized();
    }

    pub(crate) fn update_true_pose<F: FnOnce(Pose) -> Pose>(&self, f: F) {
        let mut pose = self.lock();
        *pose = f(*pose).normalized();
    }

    /// Tile the robot really stands on
    pub fn true_tile(&self) -> TileCoord {
        self.true_pose().tile(self.tile_width)
    }

    /// Distance from `(x, y)` along `heading_deg` to the first blocked or
    /// off-map tile, capped at `max_range`.
    pub fn ray_distance(&self, x: f64, y: f64, heading_deg: f64, max_range: f64) -> f64 {
        let (sin, cos) = heading_deg.to_radians().sin_cos();
        let mut d = 0.0;
        while d < max_range {
            let tile = TileCoord::new(
                metric_to_tile(x + d * cos, self.tile_width),
                metric_to_tile(y + d * sin, self.tile_width),
            );
            if self.map.blocked(tile) {
                return d;
            }
            d += RAY_STEP_MM;
        }
        max_range
    }

    /// Light reading at a floor point
    pub fn light_at(&self, x: f64, y: f64) -> i32 {
        if self.near_line(x) || self.near_line(y) {
            LINE_LIGHT
        } else {
            FLOOR_LIGHT
        }
    }

    fn near_line(&self, coord: f64) -> bool {
        let nearest = (coord / self.tile_width).round() * self.tile_width;
        (coord - nearest).abs() <= self.line_half_width
    }

    fn lock(&self) -> MutexGuard<'_, Pose> {
        self.true_pose.lock().unwrap_or_else(|poisoned| poisoned.into_inner())
    }
}
