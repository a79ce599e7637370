//! Waypoint controller for differential drive robots
//!
//! Breaks "go to (x, y)" into the in-place turn and straight travel a
//! differential drive executes as primitive moves.

use crate::common::{normalize_degrees, Pose};
use nalgebra::Vector2;

/// Primitive moves that take the robot from one pose to a target point
#[derive(Debug, Clone, Copy, PartialEq)]
pub struct GoToPlan {
    /// Turn before travelling, degrees
    pub rotate_deg: f64,
    /// Straight travel after the turn, millimetres
    pub travel_mm: f64,
}

#[derive(Debug, Clone)]
pub struct WaypointController {
    /// Targets closer than this are treated as reached
    arrival_tolerance_mm: f64,
}

impl Default for WaypointController {
    fn default() -> Self {
        WaypointController {
            arrival_tolerance_mm: 1.0,
        }
    }
}

impl WaypointController {
    pub fn new(arrival_tolerance_mm: f64) -> Self {
        WaypointController {
            arrival_tolerance_mm,
        }
    }

    /// Turn-then-travel needed to reach `(x, y)` from `current`
    pub fn go_to(&self, current: Pose, x: f64, y: f64) -> GoToPlan {
        let delta = Vector2::new(x, y) - current.position();
        let distance = delta.norm();

        if distance < self.arrival_tolerance_mm {
            return GoToPlan {
                rotate_deg: 0.0,
                travel_mm: 0.0,
            };
        }

        let target_angle = delta.y.atan2(delta.x).to_degrees();
        GoToPlan {
            rotate_deg: normalize_degrees(target_angle - current.heading),
            travel_mm: distance,
        }
    }

    /// Turn needed to face `heading` from `current`
    pub fn rotate_to(&self, current: Pose, heading: f64) -> f64 {
        normalize_degrees(heading - current.heading)
    }
}
