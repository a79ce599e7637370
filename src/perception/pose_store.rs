//! The single shared pose estimate
//!
//! The pose is only ever exchanged as a whole value under one lock: `get`
//! returns a full snapshot, `set` replaces it and `update` performs a
//! read-modify-write without releasing the lock in between. The lock is
//! never held across a drive call.

use crate::common::Pose;
use std::sync::{Arc, Mutex, MutexGuard};

/// Shared, mutex-guarded pose.
#[derive(Debug, Default)]
pub struct PoseStore {
    pose: Mutex<Pose>,
}

impl PoseStore {
    pub fn new(pose: Pose) -> Self {
        PoseStore {
            pose: Mutex::new(pose),
        }
    }

    /// Convenience for the common `Arc` wrapping
    pub fn shared(pose: Pose) -> Arc<Self> {
        Arc::new(Self::new(pose))
    }

    /// Snapshot of the current pose
    pub fn get(&self) -> Pose {
        *self.lock()
    }

    /// Replace the pose
    pub fn set(&self, pose: Pose) {
        *self.lock() = pose.normalized();
    }

    /// Atomically transform the pose and return the new value
    pub fn update<F>(&self, f: F) -> Pose
    where
        F: FnOnce(Pose) -> Pose,
    {
        let mut guard = self.lock();
        *guard = f(*guard).normalized();
        *guard
    }

    // Pose is Copy, so a panic in another holder cannot leave it half-written.
    fn lock(&self) -> MutexGuard<'_, Pose> {
        self.pose.lock().unwrap_or_else(|poisoned| poisoned.into_inner())
    }
}
