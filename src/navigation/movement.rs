//! Movement controller: executes planned routes on the drive

use super::path::{Path, Waypoint};
use super::NavigationStack;
use crate::common::TileCoord;
use crate::control::controllers::WaypointController;
use crate::control::Drive;
use crate::error::Result;
use crate::perception::drift_correction::DriftCorrectorHandle;
use crate::perception::pose_store::PoseStore;
use std::sync::Arc;
use tracing::{debug, info};

/// Waypoints closer than this are treated as reached
const ARRIVAL_TOLERANCE_MM: f64 = 10.0;
/// Heading errors below this are not worth a turn
const HEADING_TOLERANCE_DEG: f64 = 0.05;

/// Drives the robot tile by tile along planned paths.
///
/// Every waypoint is reached with a turn (drift correction suspended)
/// followed by a straight travel. Once the drive has stopped, the drift
/// corrector's pending correction is applied before the next command.
pub struct MovementController {
    navigation: NavigationStack,
    drive: Arc<dyn Drive>,
    pose_store: Arc<PoseStore>,
    corrector: Option<DriftCorrectorHandle>,
    waypoints: WaypointController,
}

impl MovementController {
    pub fn new(
        navigation: NavigationStack,
        drive: Arc<dyn Drive>,
        pose_store: Arc<PoseStore>,
    ) -> Self {
        MovementController {
            navigation,
            drive,
            pose_store,
            corrector: None,
            waypoints: WaypointController::new(ARRIVAL_TOLERANCE_MM),
        }
    }

    pub fn with_corrector(mut self, corrector: DriftCorrectorHandle) -> Self {
        self.corrector = Some(corrector);
        self
    }

    pub fn navigation(&self) -> &NavigationStack {
        &self.navigation
    }

    pub fn navigation_mut(&mut self) -> &mut NavigationStack {
        &mut self.navigation
    }

    pub fn drive(&self) -> &dyn Drive {
        self.drive.as_ref()
    }

    pub fn corrector(&self) -> Option<&DriftCorrectorHandle> {
        self.corrector.as_ref()
    }

    /// Tile under the current pose estimate
    pub fn current_tile(&self) -> TileCoord {
        self.pose_store.get().tile(self.navigation.tile_width())
    }

    /// Plan from the current tile to `(x, y)` and drive there, optionally
    /// turning to `heading` (degrees) on arrival.
    ///
    /// Fails with `DestinationUnreachable` before any motion when no route
    /// exists.
    pub fn travel_to_tile(&self, x: i32, y: i32, heading: Option<f64>) -> Result<()> {
        let from = self.current_tile();
        let path = self.navigation.plan(from, TileCoord::new(x, y), heading)?;
        info!("travelling {} -> ({}, {}): {} moves", from, x, y, path.moves());
        self.follow(&path)?;
        info!("arrived at ({}, {}): {}", x, y, self.pose_store.get());
        Ok(())
    }

    /// Drive along `path`. The corrector's enabled state is restored
    /// afterwards, also on error.
    pub fn follow(&self, path: &Path) -> Result<()> {
        let was_enabled = self.corrector.as_ref().is_some_and(|c| c.is_enabled());
        let result = self.follow_waypoints(path, was_enabled);
        if let Some(corrector) = &self.corrector {
            corrector.set_enabled(was_enabled);
        }
        result
    }

    fn follow_waypoints(&self, path: &Path, correct_travel: bool) -> Result<()> {
        for waypoint in path {
            self.go_to(waypoint, correct_travel)?;
        }
        if let Some(heading) = path.destination().and_then(|w| w.heading) {
            let angle = self.waypoints.rotate_to(self.pose_store.get(), heading);
            self.rotate(angle)?;
        }
        Ok(())
    }

    fn go_to(&self, waypoint: &Waypoint, correct_travel: bool) -> Result<()> {
        let plan = self.waypoints.go_to(self.pose_store.get(), waypoint.x, waypoint.y);
        if plan.travel_mm > 0.0 {
            self.rotate(plan.rotate_deg)?;
            if let Some(corrector) = &self.corrector {
                corrector.set_enabled(correct_travel);
            }
            self.drive.travel(plan.travel_mm)?;
        }
        self.drive.wait_for_stop();

        // The drive is stopped: safe to touch up the pose
        if let Some(corrector) = &self.corrector {
            corrector.apply_pending();
        }
        debug!("reached waypoint {}: {}", waypoint.tile, self.pose_store.get());
        Ok(())
    }

    fn rotate(&self, angle: f64) -> Result<()> {
        if angle.abs() < HEADING_TOLERANCE_DEG {
            return Ok(());
        }
        if let Some(corrector) = &self.corrector {
            corrector.disable();
        }
        self.drive.rotate(angle, false)?;
        self.drive.wait_for_stop();
        Ok(())
    }
}
