//! Control module: the drive abstraction the navigation core commands
pub mod controllers;

use crate::common::Pose;
use crate::error::Result;
use std::thread;
use std::time::Duration;

/// Low-level differential drive with its own dead reckoning.
///
/// Motion calls block until the motion completes unless stated otherwise.
/// Distances are millimetres, angles degrees (counter-clockwise positive).
pub trait Drive: Send + Sync {
    /// Drive straight; negative distances reverse
    fn travel(&self, distance_mm: f64) -> Result<()>;

    /// Turn in place. With `immediate_return` the call returns as soon as
    /// the turn has started; use `wait_for_stop` to block on it.
    fn rotate(&self, angle_deg: f64, immediate_return: bool) -> Result<()>;

    /// Drive along an arc of the given radius through `angle_deg`
    fn arc(&self, radius_mm: f64, angle_deg: f64) -> Result<()>;

    fn is_moving(&self) -> bool;

    fn stop(&self);

    /// Dead-reckoned pose
    fn current_pose(&self) -> Pose;

    fn set_pose(&self, pose: Pose);

    /// Block until the drive reports it has stopped
    fn wait_for_stop(&self) {
        while self.is_moving() {
            thread::sleep(Duration::from_millis(5));
        }
    }
}
