//! Discrete localization by hypothesis elimination
//!
//! Every free tile facing every direction is a candidate starting state.
//! The robot observes whether the tile ahead is blocked, turns and moves
//! in its own relative frame, and discards every candidate that would have
//! predicted a different observation. When one candidate is left, the
//! robot's current absolute tile and heading follow from it.

use super::drift_correction::DriftCorrectorHandle;
use super::pose_store::PoseStore;
use super::sensors::ObstacleObserver;
use crate::common::{tile_to_metric, Direction, Pose, TileCoord};
use crate::config::NavConfig;
use crate::control::controllers::WaypointController;
use crate::control::Drive;
use crate::error::{NavError, Result};
use crate::navigation::grid_map::GridMap;
use std::sync::Arc;
use tracing::{debug, info, warn};

/// A candidate absolute starting state
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub struct Hypothesis {
    pub tile: TileCoord,
    pub dir: Direction,
    /// Whether the tile ahead of `tile` in `dir` is blocked
    pub forward_blocked: bool,
}

impl Hypothesis {
    /// Absolute tile and direction the robot would have now, had it started
    /// in this state and moved through `frame`.
    pub fn implied(&self, frame: &RelativeFrame) -> (TileCoord, Direction) {
        let (fx, fy) = self.dir.step();
        let (rx, ry) = self.dir.rotate_right().step();
        let o = frame.offset;
        let tile = TileCoord::new(
            self.tile.x + o.x * rx + o.y * fx,
            self.tile.y + o.x * ry + o.y * fy,
        );
        (tile, self.dir.compose(frame.heading))
    }

    /// Whether this hypothesis predicts `observed_blocked` in `frame`
    pub fn consistent(&self, map: &GridMap, frame: &RelativeFrame, observed_blocked: bool) -> bool {
        if frame.is_origin() {
            return self.forward_blocked == observed_blocked;
        }
        let (tile, dir) = self.implied(frame);
        !map.blocked(tile) && map.blocked_towards(tile, dir) == observed_blocked
    }
}

/// Displacement and heading relative to where localization started.
/// Relative `Up` is the unknown starting direction.
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub struct RelativeFrame {
    pub offset: TileCoord,
    pub heading: Direction,
}

impl Default for RelativeFrame {
    fn default() -> Self {
        RelativeFrame {
            offset: TileCoord::new(0, 0),
            heading: Direction::Up,
        }
    }
}

impl RelativeFrame {
    pub fn is_origin(&self) -> bool {
        *self == RelativeFrame::default()
    }

    pub fn turn_right(&mut self) {
        self.heading = self.heading.rotate_right();
    }

    /// Move one tile in the current relative heading
    pub fn advance(&mut self) {
        self.offset = self.offset.step(self.heading);
    }
}

/// The surviving candidates of one localization attempt
#[derive(Debug, Clone)]
pub struct HypothesisSet {
    hypotheses: Vec<Hypothesis>,
}

impl HypothesisSet {
    /// One hypothesis per free tile and direction
    pub fn generate(map: &GridMap) -> Self {
        let hypotheses = map
            .free_tiles()
            .flat_map(|tile| {
                Direction::ALL.into_iter().map(move |dir| Hypothesis {
                    tile,
                    dir,
                    forward_blocked: map.blocked_towards(tile, dir),
                })
            })
            .collect();
        HypothesisSet { hypotheses }
    }

    pub fn len(&self) -> usize {
        self.hypotheses.len()
    }

    pub fn is_empty(&self) -> bool {
        self.hypotheses.is_empty()
    }

    pub fn iter(&self) -> impl Iterator<Item = &Hypothesis> {
        self.hypotheses.iter()
    }

    /// Drop every hypothesis that disagrees with the observation
    pub fn retain_consistent(
        &mut self,
        map: &GridMap,
        frame: &RelativeFrame,
        observed_blocked: bool,
    ) {
        self.hypotheses
            .retain(|h| h.consistent(map, frame, observed_blocked));
    }

    /// The remaining hypothesis, if exactly one is left
    pub fn single(&self) -> Option<&Hypothesis> {
        match self.hypotheses.as_slice() {
            [only] => Some(only),
            _ => None,
        }
    }
}

/// Finds the robot's absolute pose on a known map
pub struct DiscreteLocalizer {
    map: GridMap,
    drive: Arc<dyn Drive>,
    observer: ObstacleObserver,
    pose_store: Arc<PoseStore>,
    corrector: Option<DriftCorrectorHandle>,
    waypoints: WaypointController,
    max_attempts: u32,
    max_observations: u32,
    tile_width: f64,
}

impl DiscreteLocalizer {
    pub fn new(
        map: GridMap,
        drive: Arc<dyn Drive>,
        observer: ObstacleObserver,
        pose_store: Arc<PoseStore>,
        config: &NavConfig,
    ) -> Self {
        DiscreteLocalizer {
            map,
            drive,
            observer,
            pose_store,
            corrector: None,
            waypoints: WaypointController::default(),
            max_attempts: config.localization.max_attempts,
            max_observations: config.localization.max_observations,
            tile_width: config.grid.tile_width_mm,
        }
    }

    /// Apply line-crossing corrections after every advance
    pub fn with_corrector(mut self, corrector: DriftCorrectorHandle) -> Self {
        self.corrector = Some(corrector);
        self
    }

    /// Localize the robot and write its absolute pose to the pose store.
    ///
    /// Returns the number of observations the successful attempt took.
    pub fn localize(&mut self) -> Result<u32> {
        if self.map.free_count() == 0 {
            return Err(NavError::Map("Map has no free tiles to localize on".to_string()));
        }
        for attempt in 1..=self.max_attempts {
            match self.attempt()? {
                Some(observations) => return Ok(observations),
                None => warn!(
                    "localization attempt {}/{} eliminated every hypothesis, starting over",
                    attempt, self.max_attempts
                ),
            }
        }
        Err(NavError::LocalizationFailed {
            attempts: self.max_attempts,
        })
    }

    // Ok(None) when the hypothesis set collapsed to zero
    fn attempt(&mut self) -> Result<Option<u32>> {
        let mut set = HypothesisSet::generate(&self.map);
        let mut frame = RelativeFrame::default();
        let mut observations = 0u32;
        let mut scanned = 0u8;
        let mut any_clear = false;

        // Work in the relative frame until the start is known
        let (x, y) = frame.offset.center(self.tile_width);
        self.pose_store.set(Pose::new(x, y, frame.heading.heading_degrees()));
        if let Some(corrector) = &self.corrector {
            corrector.take_pending();
        }
        debug!("localizing over {} hypotheses", set.len());

        loop {
            if observations >= self.max_observations {
                return Err(NavError::LocalizationAmbiguous {
                    remaining: set.len(),
                    observations,
                });
            }

            let blocked = self.observer.forward_blocked();
            observations += 1;
            scanned += 1;
            any_clear |= !blocked;
            set.retain_consistent(&self.map, &frame, blocked);
            debug!(
                "observation {} at {} facing {}: blocked={}, {} hypotheses left",
                observations,
                frame.offset,
                frame.heading,
                blocked,
                set.len()
            );

            if set.is_empty() {
                return Ok(None);
            }
            if let Some(&found) = set.single() {
                self.finish(found, &frame, observations);
                return Ok(Some(observations));
            }

            if scanned >= 4 && !any_clear {
                // Walled in on every side and still ambiguous: nothing more to learn
                return Err(NavError::LocalizationAmbiguous {
                    remaining: set.len(),
                    observations,
                });
            }

            if scanned < 4 || blocked {
                frame.turn_right();
                self.face(&frame)?;
            } else {
                frame.advance();
                self.advance_to(&frame)?;
                scanned = 0;
                any_clear = false;
            }
        }
    }

    fn finish(&self, found: Hypothesis, frame: &RelativeFrame, observations: u32) {
        let (tile, dir) = found.implied(frame);
        let pose = Pose::new(
            tile_to_metric(tile.x, self.tile_width),
            tile_to_metric(tile.y, self.tile_width),
            dir.heading_degrees(),
        );
        // Corrections recorded so far are in the relative frame
        if let Some(corrector) = &self.corrector {
            corrector.take_pending();
        }
        self.pose_store.set(pose);
        info!(
            "localized after {} observations: started at {} facing {}, now at {} facing {} ({})",
            observations,
            found.tile,
            found.dir.as_cardinal(),
            tile,
            dir.as_cardinal(),
            pose
        );
    }

    fn face(&self, frame: &RelativeFrame) -> Result<()> {
        let angle = self
            .waypoints
            .rotate_to(self.pose_store.get(), frame.heading.heading_degrees());
        let was_enabled = self.corrector.as_ref().map(|c| c.is_enabled());
        if let Some(corrector) = &self.corrector {
            corrector.disable();
        }
        let turned = self.drive.rotate(angle, false);
        self.drive.wait_for_stop();
        if let (Some(corrector), Some(enabled)) = (&self.corrector, was_enabled) {
            corrector.set_enabled(enabled);
        }
        turned
    }

    fn advance_to(&self, frame: &RelativeFrame) -> Result<()> {
        let (x, y) = frame.offset.center(self.tile_width);
        let plan = self.waypoints.go_to(self.pose_store.get(), x, y);
        debug!("advancing to relative tile {} ({:.1} mm)", frame.offset, plan.travel_mm);
        self.drive.travel(plan.travel_mm)?;
        self.drive.wait_for_stop();
        if let Some(corrector) = &self.corrector {
            corrector.apply_pending();
        }
        Ok(())
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use crate::common::Direction::*;
    use crate::perception::drift_correction::DriftCorrector;
    use crate::perception::sensors::{LineSensor, ProximitySensor};
    use crate::sim::{SimProximitySensor, SimWorld, SimulatedDrive, FLOOR_LIGHT, LINE_LIGHT};
    use std::sync::atomic::{AtomicI32, Ordering};
    use std::time::Instant;
    use approx::assert_relative_eq;

    const W: f64 = 304.8;

    fn lab_map() -> GridMap {
        GridMap::from_rows(&["#...", "..##", "....", ".#.."]).unwrap()
    }

    fn config(max_observations: u32) -> NavConfig {
        let mut config = NavConfig::default();
        config.localization.sample_delay_ms = 0;
        config.localization.max_observations = max_observations;
        config
    }

    fn setup(
        map: GridMap,
        start: Pose,
        proximity: Option<Box<dyn ProximitySensor>>,
        config: &NavConfig,
    ) -> (DiscreteLocalizer, Arc<SimWorld>, Arc<PoseStore>) {
        let world = SimWorld::new(map.clone(), W, start);
        let store = PoseStore::shared(Pose::default());
        let drive = SimulatedDrive::new(Arc::clone(&world), Arc::clone(&store));
        let sensor = proximity.unwrap_or_else(|| {
            Box::new(SimProximitySensor::new(
                Arc::clone(&world),
                config.localization.proximity_max_range_mm,
            ))
        });
        let observer = ObstacleObserver::new(sensor, &config.localization, W);
        let localizer =
            DiscreteLocalizer::new(map, Arc::new(drive), observer, Arc::clone(&store), config);
        (localizer, world, store)
    }

    #[test]
    fn four_hypotheses_per_free_tile() {
        let map = lab_map();
        let set = HypothesisSet::generate(&map);
        assert_eq!(map.free_count(), 12);
        assert_eq!(set.len(), 48);
        assert!(set.iter().all(|h| !map.blocked(h.tile)));

        let open = GridMap::new(3);
        assert_eq!(HypothesisSet::generate(&open).len(), 36);
    }

    #[test]
    fn implied_state_follows_start_direction() {
        let mut frame = RelativeFrame::default();
        frame.advance();
        frame.turn_right();
        frame.advance();
        assert_eq!(frame.offset, TileCoord::new(1, 1));
        assert_eq!(frame.heading, Right);

        let h = |dir| Hypothesis {
            tile: TileCoord::new(5, 5),
            dir,
            forward_blocked: false,
        };
        assert_eq!(h(Up).implied(&frame), (TileCoord::new(6, 6), Right));
        assert_eq!(h(Right).implied(&frame), (TileCoord::new(6, 4), Down));
        assert_eq!(h(Down).implied(&frame), (TileCoord::new(4, 4), Left));
        assert_eq!(h(Left).implied(&frame), (TileCoord::new(4, 6), Up));
    }

    #[test]
    fn consistency_uses_map_away_from_origin() {
        let map = lab_map();
        let h = Hypothesis {
            tile: TileCoord::new(0, 0),
            dir: Up,
            forward_blocked: false,
        };
        let origin = RelativeFrame::default();
        assert!(h.consistent(&map, &origin, false));
        assert!(!h.consistent(&map, &origin, true));

        // one tile up, facing relative right: (1, 1) is free
        let frame = RelativeFrame {
            offset: TileCoord::new(0, 1),
            heading: Right,
        };
        assert!(h.consistent(&map, &frame, false));

        // three tiles up lands on the blocked (0, 3)
        let frame = RelativeFrame {
            offset: TileCoord::new(0, 3),
            heading: Up,
        };
        assert!(!h.consistent(&map, &frame, true));
        assert!(!h.consistent(&map, &frame, false));
    }

    #[test]
    fn converges_to_true_pose() {
        // Starts in the top-right corner facing left. The only other
        // one-exit tile is (0, 0), told apart after one move.
        let start = Pose::new(tile_to_metric(3, W), tile_to_metric(3, W), 180.0);
        let config = config(64);
        let (mut localizer, world, store) = setup(lab_map(), start, None, &config);

        let observations = localizer.localize().unwrap();
        assert_eq!(observations, 7);

        let pose = store.get();
        assert_relative_eq!(pose.x, tile_to_metric(2, W), epsilon = 1e-6);
        assert_relative_eq!(pose.y, tile_to_metric(3, W), epsilon = 1e-6);
        assert_relative_eq!(pose.heading, 90.0, epsilon = 1e-6);

        let truth = world.true_pose();
        assert_eq!(truth.tile(W), pose.tile(W));
        assert_eq!(Direction::nearest(truth.heading), Up);
    }

    #[test]
    fn symmetric_map_is_reported_ambiguous() {
        // Every corner of an open 2x2 map looks the same
        let map = GridMap::new(2);
        let start = Pose::new(tile_to_metric(0, W), tile_to_metric(0, W), 90.0);
        let config = config(20);
        let (mut localizer, _, _) = setup(map, start, None, &config);

        match localizer.localize() {
            Err(NavError::LocalizationAmbiguous { remaining, observations }) => {
                assert_eq!(remaining, 4);
                assert_eq!(observations, 20);
            }
            other => panic!("expected ambiguity, got {:?}", other),
        }
    }

    struct AlwaysClose;

    impl ProximitySensor for AlwaysClose {
        fn distance_mm(&mut self) -> f64 {
            0.0
        }
    }

    #[test]
    fn inconsistent_observations_fail_after_retries() {
        // No tile on the lab map is walled in on all four sides
        let start = Pose::new(tile_to_metric(0, W), tile_to_metric(1, W), 90.0);
        let config = config(64);
        let (mut localizer, _, _) = setup(lab_map(), start, Some(Box::new(AlwaysClose)), &config);

        let err = localizer.localize().unwrap_err();
        assert!(matches!(err, NavError::LocalizationFailed { attempts: 3 }));
    }

    struct SharedLight(Arc<AtomicI32>);

    impl LineSensor for SharedLight {
        fn light_value(&mut self) -> i32 {
            self.0.load(Ordering::SeqCst)
        }
    }

    /// Polls the corrector on every proximity sample, standing in for the
    /// sensing thread running while the robot observes. The first poll
    /// sees floor, every later one a line under both sensors.
    struct PollingProximity {
        inner: SimProximitySensor,
        corrector: DriftCorrectorHandle,
        light: Arc<AtomicI32>,
    }

    impl ProximitySensor for PollingProximity {
        fn distance_mm(&mut self) -> f64 {
            self.corrector.poll_at(Instant::now());
            self.light.store(LINE_LIGHT, Ordering::SeqCst);
            self.inner.distance_mm()
        }
    }

    #[test]
    fn relative_frame_correction_is_dropped_on_convergence() {
        // (1, 0) facing up is told apart by the first four-way scan, so a
        // correction recorded while observing is never applied by a move
        let map = GridMap::from_rows(&["#.", ".."]).unwrap();
        let start = Pose::new(tile_to_metric(1, W), tile_to_metric(0, W), 90.0);
        let config = config(64);

        let world = SimWorld::new(map.clone(), W, start);
        let store = PoseStore::shared(Pose::default());
        let light = Arc::new(AtomicI32::new(FLOOR_LIGHT));
        let corrector = DriftCorrector::new(
            Box::new(SharedLight(Arc::clone(&light))),
            Box::new(SharedLight(Arc::clone(&light))),
            Arc::clone(&store),
            &config.correction,
            W,
        );
        let handle = corrector.handle();
        handle.enable();

        let proximity = PollingProximity {
            inner: SimProximitySensor::new(
                Arc::clone(&world),
                config.localization.proximity_max_range_mm,
            ),
            corrector: handle.clone(),
            light,
        };
        let observer = ObstacleObserver::new(Box::new(proximity), &config.localization, W);
        let drive = SimulatedDrive::new(Arc::clone(&world), Arc::clone(&store));
        let mut localizer =
            DiscreteLocalizer::new(map, Arc::new(drive), observer, Arc::clone(&store), &config)
                .with_corrector(handle.clone());

        assert_eq!(localizer.localize().unwrap(), 4);
        assert!(handle.take_pending().is_none());

        let pose = store.get();
        assert_relative_eq!(pose.x, tile_to_metric(1, W), epsilon = 1e-6);
        assert_relative_eq!(pose.y, tile_to_metric(0, W), epsilon = 1e-6);
        assert_relative_eq!(pose.heading, 180.0, epsilon = 1e-6);
        assert!(handle.is_enabled());
    }
}
