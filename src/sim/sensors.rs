//! Simulated proximity and line sensors

use super::SimWorld;
use crate::config::CorrectionConfig;
use crate::perception::drift_correction::{sensor_offset, LineSide};
use crate::perception::sensors::{LineSensor, ProximitySensor};
use std::sync::Arc;

/// Forward range sensor ray-cast from the robot's true pose
pub struct SimProximitySensor {
    world: Arc<SimWorld>,
    max_range: f64,
}

impl SimProximitySensor {
    pub fn new(world: Arc<SimWorld>, max_range: f64) -> Self {
        SimProximitySensor { world, max_range }
    }
}

impl ProximitySensor for SimProximitySensor {
    fn distance_mm(&mut self) -> f64 {
        let pose = self.world.true_pose();
        // Real sensors report "nothing" past their range
        let d = self.world.ray_distance(pose.x, pose.y, pose.heading, self.max_range);
        if d >= self.max_range {
            f64::INFINITY
        } else {
            d
        }
    }
}

/// Line sensor mounted at a fixed offset from the turning axis
pub struct SimLineSensor {
    world: Arc<SimWorld>,
    forward: f64,
    lateral: f64,
}

impl SimLineSensor {
    /// Sensor on `side`, mounted as described by the correction settings
    pub fn new(world: Arc<SimWorld>, side: LineSide, config: &CorrectionConfig) -> Self {
        let lateral = match side {
            LineSide::Left => config.sensor_x_offset_mm,
            LineSide::Right => -config.sensor_x_offset_mm,
        };
        SimLineSensor {
            world,
            forward: config.sensor_y_offset_mm,
            lateral,
        }
    }

    /// Left and right sensor pair
    pub fn pair(world: &Arc<SimWorld>, config: &CorrectionConfig) -> (Self, Self) {
        (
            Self::new(Arc::clone(world), LineSide::Left, config),
            Self::new(Arc::clone(world), LineSide::Right, config),
        )
    }
}

impl LineSensor for SimLineSensor {
    fn light_value(&mut self) -> i32 {
        let pose = self.world.true_pose();
        let at = pose.position() + sensor_offset(pose.heading, self.forward, self.lateral);
        self.world.light_at(at.x, at.y)
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use crate::common::Pose;
    use crate::navigation::grid_map::GridMap;
    use crate::sim::{FLOOR_LIGHT, LINE_LIGHT};

    #[test]
    fn proximity_reports_nothing_past_range() {
        let world = SimWorld::new(GridMap::new(4), 304.8, Pose::new(152.4, 152.4, 90.0));
        let mut sensor = SimProximitySensor::new(Arc::clone(&world), 500.0);
        assert!(sensor.distance_mm().is_infinite());

        world.set_true_pose(Pose::new(152.4, 152.4, 180.0));
        assert!(sensor.distance_mm() < 160.0);
    }

    #[test]
    fn line_sensors_see_the_line_at_their_own_offset() {
        let config = CorrectionConfig::default();
        // Facing up with the forward offset right on y = 304.8
        let world = SimWorld::new(GridMap::new(4), 304.8, Pose::new(152.4, 304.8 - 32.5, 90.0));
        let (mut left, mut right) = SimLineSensor::pair(&world, &config);
        assert_eq!(left.light_value(), LINE_LIGHT);
        assert_eq!(right.light_value(), LINE_LIGHT);

        // Turned slightly clockwise: the left sensor is now ahead of the line
        world.set_true_pose(Pose::new(152.4, 304.8 - 32.5, 80.0));
        assert_eq!(left.light_value(), FLOOR_LIGHT);
    }
}
