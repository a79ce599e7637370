//! Sensor interfaces consumed by the navigation core

use super::filters::{ConsecutiveAgreement, Filter, RangeClamp};
use crate::config::LocalizationConfig;
use std::thread;
use std::time::Duration;
use tracing::{debug, trace};

/// Forward-facing range sensor
pub trait ProximitySensor: Send {
    /// Distance to the nearest obstacle ahead, in millimetres
    fn distance_mm(&mut self) -> f64;
}

/// Downward-facing light sensor used to spot grid lines
pub trait LineSensor: Send {
    /// Normalized reflected light; grid lines read darker (lower)
    fn light_value(&mut self) -> i32;
}

/// Turns proximity samples into a "tile ahead is blocked" verdict.
///
/// Readings are clamped to the configured range and a verdict is only
/// accepted once two consecutive samples agree. If no two samples agree
/// within `max_samples`, the last verdict is used.
pub struct ObstacleObserver {
    sensor: Box<dyn ProximitySensor>,
    clamp: RangeClamp,
    blocked_below_mm: f64,
    sample_delay: Duration,
    max_samples: u32,
}

impl ObstacleObserver {
    pub fn new(
        sensor: Box<dyn ProximitySensor>,
        config: &LocalizationConfig,
        tile_width: f64,
    ) -> Self {
        ObstacleObserver {
            sensor,
            clamp: RangeClamp::new(config.proximity_max_range_mm),
            blocked_below_mm: tile_width,
            sample_delay: config.sample_delay(),
            max_samples: config.max_samples.max(2),
        }
    }

    /// Whether the tile directly ahead is blocked
    pub fn forward_blocked(&mut self) -> bool {
        let mut agreement = ConsecutiveAgreement::new();
        let mut verdict = false;

        for sample in 0..self.max_samples {
            if sample > 0 && !self.sample_delay.is_zero() {
                thread::sleep(self.sample_delay);
            }
            let raw = self.sensor.distance_mm();
            let distance = self.clamp.filter(raw).unwrap_or(self.clamp.max_range());
            verdict = distance < self.blocked_below_mm;
            trace!("proximity sample {}: {:.1} mm (raw {:.1})", sample, distance, raw);

            if let Some(agreed) = agreement.filter(verdict) {
                return agreed;
            }
        }

        debug!(
            "no two proximity samples agreed in {} tries, using last verdict (blocked={})",
            self.max_samples, verdict
        );
        verdict
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use std::collections::VecDeque;

    struct Scripted(VecDeque<f64>);

    impl ProximitySensor for Scripted {
        fn distance_mm(&mut self) -> f64 {
            self.0.pop_front().unwrap_or(f64::INFINITY)
        }
    }

    fn observer(readings: &[f64], max_samples: u32) -> ObstacleObserver {
        let config = LocalizationConfig {
            sample_delay_ms: 0,
            max_samples,
            ..LocalizationConfig::default()
        };
        let sensor = Scripted(readings.iter().copied().collect());
        ObstacleObserver::new(Box::new(sensor), &config, 304.8)
    }

    #[test]
    fn single_glitch_is_ignored() {
        // one spurious short reading between two clear ones
        let mut obs = observer(&[480.0, 90.0, 2550.0, 2550.0], 8);
        assert!(!obs.forward_blocked());
    }

    #[test]
    fn two_agreeing_close_readings_mean_blocked() {
        let mut obs = observer(&[150.0, 160.0], 8);
        assert!(obs.forward_blocked());
    }

    #[test]
    fn last_verdict_used_when_samples_never_agree() {
        let mut obs = observer(&[100.0, 400.0, 100.0, 400.0, 100.0], 3);
        assert!(obs.forward_blocked());
    }
}
