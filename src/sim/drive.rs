//! Simulated differential drive

use super::SimWorld;
use crate::common::Pose;
use crate::control::Drive;
use crate::error::{NavError, Result};
use crate::perception::pose_store::PoseStore;
use std::sync::atomic::{AtomicBool, Ordering};
use std::sync::{Arc, Mutex, MutexGuard};
use std::thread::{self, JoinHandle};
use std::time::Duration;

/// Called after every simulation step
pub type StepHook = Arc<dyn Fn() + Send + Sync>;

#[derive(Debug, Clone, Copy)]
struct DriveSettings {
    /// True distance per commanded millimetre
    travel_scale: f64,
    /// True rotation per commanded degree
    rotate_scale: f64,
    step_mm: f64,
    step_deg: f64,
    step_delay: Duration,
}

impl Default for DriveSettings {
    fn default() -> Self {
        DriveSettings {
            travel_scale: 1.0,
            rotate_scale: 1.0,
            step_mm: 2.0,
            step_deg: 1.0,
            step_delay: Duration::ZERO,
        }
    }
}

#[derive(Debug, Clone, Copy)]
enum Motion {
    Travel(f64),
    Rotate(f64),
    Arc { radius: f64, angle: f64 },
}

fn advance(pose: Pose, distance: f64) -> Pose {
    let (sin, cos) = pose.heading.to_radians().sin_cos();
    Pose {
        x: pose.x + distance * cos,
        y: pose.y + distance * sin,
        ..pose
    }
}

fn turn(pose: Pose, angle: f64) -> Pose {
    Pose {
        heading: pose.heading + angle,
        ..pose
    }
}

#[derive(Clone)]
struct Actuator {
    world: Arc<SimWorld>,
    pose_store: Arc<PoseStore>,
    settings: DriveSettings,
    stop_requested: Arc<AtomicBool>,
    hook: Option<StepHook>,
}

impl Actuator {
    fn run(&self, motion: Motion) {
        let s = self.settings;
        match motion {
            Motion::Travel(distance) => {
                let steps = (distance.abs() / s.step_mm).ceil() as u32;
                let step = distance / steps.max(1) as f64;
                for _ in 0..steps {
                    if !self.step(|p| advance(p, step), |p| advance(p, step * s.travel_scale)) {
                        break;
                    }
                }
            }
            Motion::Rotate(angle) => {
                let steps = (angle.abs() / s.step_deg).ceil() as u32;
                let step = angle / steps.max(1) as f64;
                for _ in 0..steps {
                    if !self.step(|p| turn(p, step), |p| turn(p, step * s.rotate_scale)) {
                        break;
                    }
                }
            }
            Motion::Arc { radius, angle } => {
                let steps = (angle.abs() / s.step_deg).ceil() as u32;
                let dtheta = angle / steps.max(1) as f64;
                let ds = radius * dtheta.to_radians();
                // Midpoint integration: half turn, move, half turn
                let arc_step = |p: Pose, length: f64, rot: f64| {
                    turn(advance(turn(p, rot / 2.0), length), rot / 2.0)
                };
                for _ in 0..steps {
                    let moved = self.step(
                        |p| arc_step(p, ds, dtheta),
                        |p| arc_step(p, ds * s.travel_scale, dtheta * s.rotate_scale),
                    );
                    if !moved {
                        break;
                    }
                }
            }
        }
    }

    // Returns false when a stop was requested
    fn step<D, T>(&self, dead_reckoned: D, truth: T) -> bool
    where
        D: FnOnce(Pose) -> Pose,
        T: FnOnce(Pose) -> Pose,
    {
        if self.stop_requested.load(Ordering::SeqCst) {
            return false;
        }
        self.pose_store.update(dead_reckoned);
        self.world.update_true_pose(truth);
        if let Some(hook) = &self.hook {
            hook();
        }
        if !self.settings.step_delay.is_zero() {
            thread::sleep(self.settings.step_delay);
        }
        true
    }
}

/// Drive that moves the simulated robot.
///
/// Dead reckoning integrates the commanded motion into the pose store; the
/// world's true pose gets the commanded motion times the scale factors.
pub struct SimulatedDrive {
    actuator: Actuator,
    moving: Arc<AtomicBool>,
    worker: Mutex<Option<JoinHandle<()>>>,
}

impl SimulatedDrive {
    pub fn new(world: Arc<SimWorld>, pose_store: Arc<PoseStore>) -> Self {
        SimulatedDrive {
            actuator: Actuator {
                world,
                pose_store,
                settings: DriveSettings::default(),
                stop_requested: Arc::new(AtomicBool::new(false)),
                hook: None,
            },
            moving: Arc::new(AtomicBool::new(false)),
            worker: Mutex::new(None),
        }
    }

    /// Scale true travel and rotation relative to what was commanded
    pub fn with_scale_error(mut self, travel_scale: f64, rotate_scale: f64) -> Self {
        self.actuator.settings.travel_scale = travel_scale;
        self.actuator.settings.rotate_scale = rotate_scale;
        self
    }

    /// Sleep this long after every step
    pub fn with_step_delay(mut self, delay: Duration) -> Self {
        self.actuator.settings.step_delay = delay;
        self
    }

    /// Run `hook` after every step, e.g. to poll sensors in lock-step
    pub fn with_step_hook(mut self, hook: StepHook) -> Self {
        self.actuator.hook = Some(hook);
        self
    }

    pub fn world(&self) -> &Arc<SimWorld> {
        &self.actuator.world
    }

    fn worker(&self) -> MutexGuard<'_, Option<JoinHandle<()>>> {
        self.worker.lock().unwrap_or_else(|poisoned| poisoned.into_inner())
    }

    fn join_worker(&self) -> Result<()> {
        if let Some(worker) = self.worker().take() {
            worker
                .join()
                .map_err(|_| NavError::Drive("motion thread panicked".to_string()))?;
        }
        Ok(())
    }

    fn begin(&self, motion: Motion) -> Result<()> {
        let finite = match motion {
            Motion::Travel(d) | Motion::Rotate(d) => d.is_finite(),
            Motion::Arc { radius, angle } => radius.is_finite() && angle.is_finite(),
        };
        if !finite {
            return Err(NavError::Drive(format!("invalid motion command {:?}", motion)));
        }
        self.join_worker()?;
        self.actuator.stop_requested.store(false, Ordering::SeqCst);
        self.moving.store(true, Ordering::SeqCst);
        Ok(())
    }

    fn run_blocking(&self, motion: Motion) -> Result<()> {
        self.begin(motion)?;
        self.actuator.run(motion);
        self.moving.store(false, Ordering::SeqCst);
        Ok(())
    }
}

impl Drive for SimulatedDrive {
    fn travel(&self, distance_mm: f64) -> Result<()> {
        self.run_blocking(Motion::Travel(distance_mm))
    }

    fn rotate(&self, angle_deg: f64, immediate_return: bool) -> Result<()> {
        let motion = Motion::Rotate(angle_deg);
        if !immediate_return {
            return self.run_blocking(motion);
        }
        self.begin(motion)?;
        let actuator = self.actuator.clone();
        let moving = Arc::clone(&self.moving);
        let spawned = thread::Builder::new()
            .name("sim-drive".to_string())
            .spawn(move || {
                actuator.run(motion);
                moving.store(false, Ordering::SeqCst);
            });
        match spawned {
            Ok(worker) => {
                *self.worker() = Some(worker);
                Ok(())
            }
            Err(e) => {
                self.moving.store(false, Ordering::SeqCst);
                Err(e.into())
            }
        }
    }

    fn arc(&self, radius_mm: f64, angle_deg: f64) -> Result<()> {
        self.run_blocking(Motion::Arc {
            radius: radius_mm,
            angle: angle_deg,
        })
    }

    fn is_moving(&self) -> bool {
        self.moving.load(Ordering::SeqCst)
    }

    fn stop(&self) {
        self.actuator.stop_requested.store(true, Ordering::SeqCst);
    }

    fn current_pose(&self) -> Pose {
        self.actuator.pose_store.get()
    }

    fn set_pose(&self, pose: Pose) {
        self.actuator.pose_store.set(pose);
    }

    fn wait_for_stop(&self) {
        if let Err(e) = self.join_worker() {
            tracing::warn!("{}", e);
        }
        while self.is_moving() {
            thread::sleep(Duration::from_millis(1));
        }
    }
}
