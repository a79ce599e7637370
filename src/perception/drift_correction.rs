//! Line-crossing drift correction
//!
//! Two line sensors are mounted symmetrically either side of the turning
//! axis. When the robot crosses a grid line perpendicular to its travel,
//! the distance driven between the first and the second sensor's edge
//! gives the heading error, and the second sensor's position pins the
//! robot's coordinate along the travel axis to the known line.
//!
//! Corrections are not written to the pose store here. The latest one is
//! kept as a [`PendingCorrection`] that the movement code takes and
//! applies once the drive has stopped.

use super::pose_store::PoseStore;
use super::sensors::LineSensor;
use crate::common::{normalize_degrees, Direction, Pose};
use crate::config::CorrectionConfig;
use crate::error::{NavError, Result};
use crate::lifecycle::{LifecycleNode, LifecycleNodeBase, State};
use nalgebra::{Rotation2, Vector2};
use std::any::Any;
use std::sync::atomic::{AtomicBool, Ordering};
use std::sync::{Arc, Mutex, MutexGuard};
use std::thread::{self, JoinHandle};
use std::time::{Duration, Instant};
use tracing::{debug, info, trace, warn};

/// Which of the two line sensors
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub enum LineSide {
    Left,
    Right,
}

impl LineSide {
    pub fn other(self) -> Self {
        match self {
            LineSide::Left => LineSide::Right,
            LineSide::Right => LineSide::Left,
        }
    }

    /// Lateral mounting offset, positive to the left
    fn lateral(self, x_offset: f64) -> f64 {
        match self {
            LineSide::Left => x_offset,
            LineSide::Right => -x_offset,
        }
    }
}

/// World axis a correction re-anchors
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub enum Axis {
    X,
    Y,
}

impl Axis {
    /// Axis travelled along when heading in `dir`
    pub fn of(dir: Direction) -> Self {
        match dir {
            Direction::Up | Direction::Down => Axis::Y,
            Direction::Left | Direction::Right => Axis::X,
        }
    }

    fn component(self, v: &Vector2<f64>) -> f64 {
        match self {
            Axis::X => v.x,
            Axis::Y => v.y,
        }
    }
}

/// Correction computed at the latest completed line crossing
#[derive(Debug, Clone, Copy, PartialEq)]
pub struct PendingCorrection {
    /// Degrees to add to the heading
    pub heading_delta: f64,
    /// Millimetres to add along `axis`
    pub distance_delta: f64,
    pub axis: Axis,
}

impl PendingCorrection {
    pub fn apply(&self, pose: Pose) -> Pose {
        let mut corrected = pose;
        corrected.heading += self.heading_delta;
        match self.axis {
            Axis::X => corrected.x += self.distance_delta,
            Axis::Y => corrected.y += self.distance_delta,
        }
        corrected.normalized()
    }
}

/// World-frame offset of a point mounted `forward` ahead of and `lateral`
/// to the left of the turning axis.
pub fn sensor_offset(heading_deg: f64, forward: f64, lateral: f64) -> Vector2<f64> {
    Rotation2::new(heading_deg.to_radians()) * Vector2::new(forward, lateral)
}

/// Sensor mounting and grid spacing
#[derive(Debug, Clone)]
pub struct CrossingGeometry {
    pub x_offset: f64,
    pub y_offset: f64,
    pub tile_width: f64,
}

impl CrossingGeometry {
    pub fn from_config(config: &CorrectionConfig, tile_width: f64) -> Self {
        CrossingGeometry {
            x_offset: config.sensor_x_offset_mm,
            y_offset: config.sensor_y_offset_mm,
            tile_width,
        }
    }

    /// Heading error in degrees for a crossing where the sensors fired `d`
    /// millimetres apart. Negative when the left sensor fired first.
    pub fn correction_angle(&self, d: f64, first: LineSide) -> f64 {
        let angle = (d / (2.0 * self.x_offset)).atan().to_degrees();
        match first {
            LineSide::Left => -angle,
            LineSide::Right => angle,
        }
    }

    /// Correction for a crossing whose first edge came from `first` at
    /// dead-reckoned pose `at_first` and whose second edge came at `at_second`.
    pub fn resolve(&self, first: LineSide, at_first: &Pose, at_second: &Pose) -> PendingCorrection {
        let d = at_first.distance_to(at_second);
        let nominal = Direction::nearest(at_second.heading);
        let axis = Axis::of(nominal);
        let corrected_heading = nominal.heading_degrees() + self.correction_angle(d, first);

        // The second sensor sits exactly on the line right now
        let offset = sensor_offset(
            corrected_heading,
            self.y_offset,
            first.other().lateral(self.x_offset),
        );
        let robot = axis.component(&at_second.position());
        let offset = axis.component(&offset);
        let line = ((robot + offset) / self.tile_width).round() * self.tile_width;

        PendingCorrection {
            heading_delta: normalize_degrees(corrected_heading - at_second.heading),
            distance_delta: line - offset - robot,
            axis,
        }
    }
}

/// Falling-edge detector for one light sensor
#[derive(Debug, Clone)]
pub struct EdgeDetector {
    threshold: i32,
    last: Option<i32>,
}

impl EdgeDetector {
    pub fn new(threshold: i32) -> Self {
        EdgeDetector { threshold, last: None }
    }

    /// Feed a sample; true when it dropped by more than the threshold
    pub fn sample(&mut self, value: i32) -> bool {
        let edge = matches!(self.last, Some(last) if last - value > self.threshold);
        self.last = Some(value);
        edge
    }

    pub fn reset(&mut self) {
        self.last = None;
    }
}

#[derive(Debug, Clone, Copy)]
struct HalfCrossing {
    side: LineSide,
    pose: Pose,
    at: Instant,
}

/// Pairs the two sensors' edges into line crossings
#[derive(Debug, Clone)]
pub struct LineCrossingDetector {
    geometry: CrossingGeometry,
    left: EdgeDetector,
    right: EdgeDetector,
    half: Option<HalfCrossing>,
    quiet_until: Option<Instant>,
    crossing_timeout: Duration,
    cooldown: Duration,
}

impl LineCrossingDetector {
    pub fn new(config: &CorrectionConfig, tile_width: f64) -> Self {
        LineCrossingDetector {
            geometry: CrossingGeometry::from_config(config, tile_width),
            left: EdgeDetector::new(config.edge_threshold),
            right: EdgeDetector::new(config.edge_threshold),
            half: None,
            quiet_until: None,
            crossing_timeout: config.crossing_timeout(),
            cooldown: config.cooldown(),
        }
    }

    pub fn geometry(&self) -> &CrossingGeometry {
        &self.geometry
    }

    /// Whether one sensor has fired and the other is awaited
    pub fn is_half_crossed(&self) -> bool {
        self.half.is_some()
    }

    /// Drop all edge and partial-crossing state
    pub fn reset(&mut self) {
        self.left.reset();
        self.right.reset();
        self.half = None;
        self.quiet_until = None;
    }

    /// Feed one pair of light samples taken at `now` with the robot at
    /// dead-reckoned `pose`. Returns a correction when this sample
    /// completes a crossing.
    pub fn observe(
        &mut self,
        now: Instant,
        left: i32,
        right: i32,
        pose: Pose,
    ) -> Option<PendingCorrection> {
        let left_edge = self.left.sample(left);
        let right_edge = self.right.sample(right);

        if let Some(half) = self.half {
            if now.duration_since(half.at) > self.crossing_timeout {
                warn!(
                    "discarding half-observed line crossing: only the {:?} sensor triggered",
                    half.side
                );
                self.half = None;
            }
        }

        if !left_edge && !right_edge {
            return None;
        }
        if let Some(until) = self.quiet_until {
            if now < until {
                trace!("line edge ignored during cooldown");
                return None;
            }
            self.quiet_until = None;
        }
        trace!("line edge: left={} right={} at {}", left_edge, right_edge, pose);

        let (first, first_pose) = match self.half.take() {
            // Both on the same sample: no measurable heading error
            None if left_edge && right_edge => (LineSide::Left, pose),
            None => {
                let side = if left_edge { LineSide::Left } else { LineSide::Right };
                self.half = Some(HalfCrossing { side, pose, at: now });
                return None;
            }
            Some(half) => {
                let other_fired = match half.side {
                    LineSide::Left => right_edge,
                    LineSide::Right => left_edge,
                };
                if !other_fired {
                    debug!("{:?} sensor triggered twice, restarting crossing", half.side);
                    self.half = Some(HalfCrossing { pose, at: now, ..half });
                    return None;
                }
                (half.side, half.pose)
            }
        };

        self.quiet_until = Some(now + self.cooldown);
        Some(self.geometry.resolve(first, &first_pose, &pose))
    }
}

struct Sensing {
    left: Box<dyn LineSensor>,
    right: Box<dyn LineSensor>,
    detector: LineCrossingDetector,
}

struct Shared {
    enabled: AtomicBool,
    reset_requested: AtomicBool,
    pending: Mutex<Option<PendingCorrection>>,
    sensing: Mutex<Sensing>,
    pose_store: Arc<PoseStore>,
}

fn lock<T>(mutex: &Mutex<T>) -> MutexGuard<'_, T> {
    mutex.lock().unwrap_or_else(|poisoned| poisoned.into_inner())
}

/// Cloneable control surface of the drift corrector
#[derive(Clone)]
pub struct DriftCorrectorHandle {
    shared: Arc<Shared>,
}

impl DriftCorrectorHandle {
    /// Start applying corrections. Any edge state from before is dropped.
    pub fn enable(&self) {
        self.shared.reset_requested.store(true, Ordering::SeqCst);
        self.shared.enabled.store(true, Ordering::SeqCst);
    }

    pub fn disable(&self) {
        self.shared.enabled.store(false, Ordering::SeqCst);
    }

    pub fn set_enabled(&self, enabled: bool) {
        if enabled {
            self.enable();
        } else {
            self.disable();
        }
    }

    pub fn is_enabled(&self) -> bool {
        self.shared.enabled.load(Ordering::SeqCst)
    }

    /// Read and reset the latest correction
    pub fn take_pending(&self) -> Option<PendingCorrection> {
        lock(&self.shared.pending).take()
    }

    /// Take the latest correction and apply it to the pose store.
    /// Only call while the drive is stopped.
    pub fn apply_pending(&self) -> Option<PendingCorrection> {
        let correction = self.take_pending()?;
        let pose = self.shared.pose_store.update(|pose| correction.apply(pose));
        debug!(
            "applied drift correction: heading {:+.2}°, {:?} {:+.1} mm -> {}",
            correction.heading_delta, correction.axis, correction.distance_delta, pose
        );
        Some(correction)
    }

    /// Sample both sensors once. Does nothing while disabled.
    pub fn poll_at(&self, now: Instant) {
        if !self.is_enabled() {
            return;
        }
        let mut sensing = lock(&self.shared.sensing);
        if self.shared.reset_requested.swap(false, Ordering::SeqCst) {
            sensing.detector.reset();
        }
        let left = sensing.left.light_value();
        let right = sensing.right.light_value();
        let pose = self.shared.pose_store.get();

        if let Some(correction) = sensing.detector.observe(now, left, right, pose) {
            debug!(
                "line crossing at {}: heading {:+.2}°, {:?} {:+.1} mm",
                pose, correction.heading_delta, correction.axis, correction.distance_delta
            );
            *lock(&self.shared.pending) = Some(correction);
        }
    }
}

/// Background drift correction service
pub struct DriftCorrector {
    base: LifecycleNodeBase,
    handle: DriftCorrectorHandle,
    poll_interval: Duration,
    running: Arc<Mutex<bool>>,
    worker: Option<JoinHandle<()>>,
}

impl DriftCorrector {
    /// Create a corrector reading the two line sensors. It starts disabled.
    pub fn new(
        left: Box<dyn LineSensor>,
        right: Box<dyn LineSensor>,
        pose_store: Arc<PoseStore>,
        config: &CorrectionConfig,
        tile_width: f64,
    ) -> Self {
        let shared = Shared {
            enabled: AtomicBool::new(false),
            reset_requested: AtomicBool::new(false),
            pending: Mutex::new(None),
            sensing: Mutex::new(Sensing {
                left,
                right,
                detector: LineCrossingDetector::new(config, tile_width),
            }),
            pose_store,
        };
        DriftCorrector {
            base: LifecycleNodeBase::new("drift_corrector"),
            handle: DriftCorrectorHandle {
                shared: Arc::new(shared),
            },
            poll_interval: config.poll_interval(),
            running: Arc::new(Mutex::new(false)),
            worker: None,
        }
    }

    pub fn handle(&self) -> DriftCorrectorHandle {
        self.handle.clone()
    }

    pub fn state(&self) -> State {
        self.base.get_state()
    }

    /// Whether the sensing thread is running
    pub fn is_running(&self) -> bool {
        self.worker.is_some()
    }

    fn stop_worker(&mut self) -> Result<()> {
        *lock(&self.running) = false;
        if let Some(worker) = self.worker.take() {
            worker
                .join()
                .map_err(|_| NavError::Lifecycle("drift corrector thread panicked".to_string()))?;
        }
        Ok(())
    }
}

impl LifecycleNode for DriftCorrector {
    fn on_configure(&mut self) -> Result<()> {
        info!("Configuring drift corrector (poll every {:?})", self.poll_interval);
        self.base.transition(State::Inactive)
    }

    fn on_activate(&mut self) -> Result<()> {
        if self.worker.is_some() || !self.base.get_state().can_transition_to(State::Active) {
            return Err(NavError::Lifecycle(format!(
                "drift corrector cannot activate while {}",
                self.base.get_state()
            )));
        }
        info!("Activating drift corrector");
        *lock(&self.running) = true;

        let handle = self.handle.clone();
        let running = Arc::clone(&self.running);
        let interval = self.poll_interval;
        let worker = thread::Builder::new()
            .name("drift-corrector".to_string())
            .spawn(move || {
                while *lock(&running) {
                    handle.poll_at(Instant::now());
                    thread::sleep(interval);
                }
            })?;

        self.worker = Some(worker);
        self.base.transition(State::Active)
    }

    fn on_deactivate(&mut self) -> Result<()> {
        info!("Deactivating drift corrector");
        self.stop_worker()?;
        self.base.transition(State::Inactive)
    }

    fn on_cleanup(&mut self) -> Result<()> {
        info!("Cleaning up drift corrector");
        self.handle.disable();
        self.handle.take_pending();
        self.base.transition(State::Unconfigured)
    }

    fn name(&self) -> &str {
        &self.base.name
    }

    fn as_any_mut(&mut self) -> &mut dyn Any {
        self
    }
}

impl Drop for DriftCorrector {
    fn drop(&mut self) {
        if let Err(e) = self.stop_worker() {
            warn!("Error stopping drift corrector: {}", e);
        }
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use approx::assert_relative_eq;
    use std::sync::atomic::AtomicI32;

    const W: f64 = 304.8;

    fn geometry() -> CrossingGeometry {
        CrossingGeometry {
            x_offset: 34.0,
            y_offset: 32.5,
            tile_width: W,
        }
    }

    fn config() -> CorrectionConfig {
        CorrectionConfig {
            crossing_timeout_ms: 1000,
            cooldown_ms: 200,
            ..CorrectionConfig::default()
        }
    }

    #[test]
    fn correction_angle_follows_first_sensor() {
        let g = geometry();
        let expected = (10.0f64 / 68.0).atan().to_degrees();
        assert_relative_eq!(g.correction_angle(10.0, LineSide::Left), -expected);
        assert_relative_eq!(g.correction_angle(10.0, LineSide::Right), expected);
        assert_relative_eq!(g.correction_angle(0.0, LineSide::Left), 0.0);
    }

    #[test]
    fn left_first_crossing_turns_heading_clockwise() {
        // Heading up; left sensor hits y = 304.8, right sensor 10 mm later
        let g = geometry();
        let at_first = Pose::new(150.0, 262.0, 90.0);
        let at_second = Pose::new(150.0, 272.0, 90.0);
        let c = g.resolve(LineSide::Left, &at_first, &at_second);

        let angle = (10.0f64 / 68.0).atan().to_degrees();
        assert_eq!(c.axis, Axis::Y);
        assert_relative_eq!(c.heading_delta, -angle, epsilon = 1e-9);

        // Right sensor sits on the line under the corrected heading
        let offset = sensor_offset(90.0 - angle, 32.5, -34.0);
        assert_relative_eq!(c.distance_delta, W - offset.y - 272.0, epsilon = 1e-9);
    }

    #[test]
    fn square_crossing_snaps_axis_only() {
        // Dead reckoning is 3.5 mm short when both sensors hit y = 304.8
        let at_line = Pose::new(152.4, 268.8, 91.0);
        let c = geometry().resolve(LineSide::Left, &at_line, &at_line);
        assert_relative_eq!(c.heading_delta, -1.0, epsilon = 1e-9);
        assert_relative_eq!(c.distance_delta, 3.5, epsilon = 1e-9);

        let corrected = c.apply(Pose::new(152.4, 400.0, 91.0));
        assert_relative_eq!(corrected.y, 403.5, epsilon = 1e-9);
        assert_relative_eq!(corrected.heading, 90.0, epsilon = 1e-9);
    }

    #[test]
    fn travelling_left_corrects_x() {
        let at = Pose::new(2.0 * W + 40.0, 152.4, 180.0);
        let c = geometry().resolve(LineSide::Right, &at, &at);
        assert_eq!(c.axis, Axis::X);
        // forward offset points towards -x
        assert_relative_eq!(c.distance_delta, 2.0 * W + 32.5 - at.x, epsilon = 1e-9);
    }

    #[test]
    fn edge_detector_only_fires_on_sharp_drops() {
        let mut edge = EdgeDetector::new(11);
        assert!(!edge.sample(600));
        assert!(!edge.sample(595));
        assert!(edge.sample(300));
        assert!(!edge.sample(300));
        assert!(!edge.sample(600));
        edge.reset();
        assert!(!edge.sample(300));
    }

    #[test]
    fn detector_pairs_edges_into_a_crossing() {
        let mut detector = LineCrossingDetector::new(&config(), W);
        let t0 = Instant::now();
        let p0 = Pose::new(152.4, 260.0, 90.0);
        let p1 = Pose::new(152.4, 270.0, 90.0);

        assert!(detector.observe(t0, 600, 600, p0).is_none());
        assert!(detector.observe(t0, 300, 600, p0).is_none());
        assert!(detector.is_half_crossed());
        let c = detector
            .observe(t0 + Duration::from_millis(50), 300, 300, p1)
            .unwrap();
        assert!(c.heading_delta < 0.0);
        assert!(!detector.is_half_crossed());
    }

    #[test]
    fn half_crossing_times_out() {
        let mut detector = LineCrossingDetector::new(&config(), W);
        let t0 = Instant::now();
        let pose = Pose::new(152.4, 270.0, 90.0);

        detector.observe(t0, 600, 600, pose);
        detector.observe(t0, 600, 300, pose);
        assert!(detector.is_half_crossed());
        detector.observe(t0 + Duration::from_millis(1500), 600, 300, pose);
        assert!(!detector.is_half_crossed());
        // A lone left edge now starts a fresh half crossing instead of pairing
        assert!(detector
            .observe(t0 + Duration::from_millis(1510), 300, 300, pose)
            .is_none());
        assert!(detector.is_half_crossed());
    }

    #[test]
    fn cooldown_suppresses_double_counting() {
        let mut detector = LineCrossingDetector::new(&config(), W);
        let t0 = Instant::now();
        let pose = Pose::new(152.4, 272.3, 90.0);

        detector.observe(t0, 600, 600, pose);
        assert!(detector.observe(t0, 300, 300, pose).is_some());
        detector.observe(t0 + Duration::from_millis(10), 600, 600, pose);
        assert!(detector
            .observe(t0 + Duration::from_millis(20), 300, 300, pose)
            .is_none());
        detector.observe(t0 + Duration::from_millis(300), 600, 600, pose);
        assert!(detector
            .observe(t0 + Duration::from_millis(310), 300, 300, pose)
            .is_some());
    }

    struct SharedLight(Arc<AtomicI32>);

    impl LineSensor for SharedLight {
        fn light_value(&mut self) -> i32 {
            self.0.load(Ordering::SeqCst)
        }
    }

    #[test]
    fn enable_drops_partial_crossing() {
        let left = Arc::new(AtomicI32::new(600));
        let right = Arc::new(AtomicI32::new(600));
        let store = PoseStore::shared(Pose::new(152.4, 268.8, 90.0));
        let corrector = DriftCorrector::new(
            Box::new(SharedLight(Arc::clone(&left))),
            Box::new(SharedLight(Arc::clone(&right))),
            Arc::clone(&store),
            &config(),
            W,
        );
        let handle = corrector.handle();
        let t0 = Instant::now();

        // Disabled: samples are ignored
        handle.poll_at(t0);
        left.store(300, Ordering::SeqCst);
        handle.poll_at(t0);
        assert!(handle.take_pending().is_none());

        handle.enable();
        left.store(600, Ordering::SeqCst);
        handle.poll_at(t0);
        left.store(300, Ordering::SeqCst);
        handle.poll_at(t0);

        // Re-enabling forgets the left edge, so the right edge alone is a new half
        handle.disable();
        handle.enable();
        handle.poll_at(t0);
        right.store(300, Ordering::SeqCst);
        handle.poll_at(t0);
        assert!(handle.take_pending().is_none());

        left.store(600, Ordering::SeqCst);
        handle.poll_at(t0);
        left.store(300, Ordering::SeqCst);
        handle.poll_at(t0);
        let applied = handle.apply_pending().unwrap();
        assert_relative_eq!(applied.distance_delta, 3.5, epsilon = 1e-9);
        assert_relative_eq!(store.get().y, 272.3, epsilon = 1e-9);
        assert!(handle.take_pending().is_none());
    }

    #[test]
    fn lifecycle_starts_and_joins_worker() {
        let store = PoseStore::shared(Pose::default());
        let light = Arc::new(AtomicI32::new(600));
        let mut corrector = DriftCorrector::new(
            Box::new(SharedLight(Arc::clone(&light))),
            Box::new(SharedLight(light)),
            store,
            &config(),
            W,
        );
        corrector.on_configure().unwrap();
        corrector.on_activate().unwrap();
        assert!(corrector.is_running());
        assert_eq!(corrector.state(), State::Active);
        assert!(corrector.on_activate().is_err());
        corrector.on_deactivate().unwrap();
        assert!(!corrector.is_running());
        corrector.on_cleanup().unwrap();
        assert_eq!(corrector.state(), State::Unconfigured);
    }
}
