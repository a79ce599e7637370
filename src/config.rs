//! Mission configuration
//!
//! Every field has a default, so an empty TOML document is a valid
//! configuration. Example:
//!
//! ```toml
//! [grid]
//! tile_width_mm = 304.8
//! num_tiles = 4
//!
//! [correction]
//! edge_threshold = 11
//!
//! [map]
//! rows = ["#...", "..##", "....", ".#.."]
//! pickup_zone = [[2, 0], [3, 0]]
//! ```

use crate::error::{NavError, Result};
use serde::Deserialize;
use std::collections::HashMap;
use std::path::Path;
use std::time::Duration;

/// Main configuration structure
#[derive(Clone, Debug, Default, Deserialize)]
pub struct NavConfig {
    #[serde(default)]
    pub grid: GridConfig,
    #[serde(default)]
    pub localization: LocalizationConfig,
    #[serde(default)]
    pub correction: CorrectionConfig,
    #[serde(default)]
    pub planner: PlannerConfig,
    #[serde(default)]
    pub map: Option<MapConfig>,
}

/// Grid geometry
#[derive(Clone, Debug, Deserialize)]
pub struct GridConfig {
    /// Side length of one tile in millimetres (default: 304.8, one foot)
    #[serde(default = "default_tile_width")]
    pub tile_width_mm: f64,

    /// Number of tiles along each side of the square map (default: 4)
    #[serde(default = "default_num_tiles")]
    pub num_tiles: usize,
}

/// Discrete localizer settings
#[derive(Clone, Debug, Deserialize)]
pub struct LocalizationConfig {
    /// Attempts with a fresh hypothesis set before giving up (default: 3)
    #[serde(default = "default_max_attempts")]
    pub max_attempts: u32,

    /// Observations allowed per attempt before declaring ambiguity (default: 64)
    #[serde(default = "default_max_observations")]
    pub max_observations: u32,

    /// Proximity readings are clamped to this range (default: 500 mm)
    #[serde(default = "default_proximity_range")]
    pub proximity_max_range_mm: f64,

    /// Delay between two proximity samples (default: 25 ms)
    #[serde(default = "default_sample_delay")]
    pub sample_delay_ms: u64,

    /// Samples taken while waiting for two agreeing verdicts (default: 8)
    #[serde(default = "default_max_samples")]
    pub max_samples: u32,
}

/// Drift corrector settings
#[derive(Clone, Debug, Deserialize)]
pub struct CorrectionConfig {
    /// Lateral offset of each line sensor from the turning axis (default: 34 mm)
    #[serde(default = "default_sensor_x_offset")]
    pub sensor_x_offset_mm: f64,

    /// Forward offset of the line sensors from the turning axis (default: 32.5 mm)
    #[serde(default = "default_sensor_y_offset")]
    pub sensor_y_offset_mm: f64,

    /// Drop between two consecutive light samples that counts as a line (default: 11)
    #[serde(default = "default_edge_threshold")]
    pub edge_threshold: i32,

    /// Light sensor polling interval (default: 10 ms)
    #[serde(default = "default_poll_interval")]
    pub poll_interval_ms: u64,

    /// Half-observed crossings older than this are discarded (default: 1500 ms)
    #[serde(default = "default_crossing_timeout")]
    pub crossing_timeout_ms: u64,

    /// Edges are ignored for this long after a completed crossing (default: 500 ms)
    #[serde(default = "default_cooldown")]
    pub cooldown_ms: u64,
}

/// Shortest-path search used over the navigation mesh
#[derive(Clone, Copy, Debug, Default, PartialEq, Eq, Deserialize)]
#[serde(rename_all = "snake_case")]
pub enum SearchKind {
    #[default]
    #[serde(alias = "a_star")]
    Astar,
    UniformCost,
}

#[derive(Clone, Debug, Default, Deserialize)]
pub struct PlannerConfig {
    #[serde(default)]
    pub search: SearchKind,
}

/// Map layout, top row first
#[derive(Clone, Debug, Deserialize)]
pub struct MapConfig {
    /// One string per row, `#` blocked and `.` free
    pub rows: Vec<String>,

    /// The two tiles of the pickup zone
    #[serde(default)]
    pub pickup_zone: Option<[[i32; 2]; 2]>,
}

impl Default for GridConfig {
    fn default() -> Self {
        Self {
            tile_width_mm: default_tile_width(),
            num_tiles: default_num_tiles(),
        }
    }
}

impl Default for LocalizationConfig {
    fn default() -> Self {
        Self {
            max_attempts: default_max_attempts(),
            max_observations: default_max_observations(),
            proximity_max_range_mm: default_proximity_range(),
            sample_delay_ms: default_sample_delay(),
            max_samples: default_max_samples(),
        }
    }
}

impl LocalizationConfig {
    pub fn sample_delay(&self) -> Duration {
        Duration::from_millis(self.sample_delay_ms)
    }
}

impl Default for CorrectionConfig {
    fn default() -> Self {
        Self {
            sensor_x_offset_mm: default_sensor_x_offset(),
            sensor_y_offset_mm: default_sensor_y_offset(),
            edge_threshold: default_edge_threshold(),
            poll_interval_ms: default_poll_interval(),
            crossing_timeout_ms: default_crossing_timeout(),
            cooldown_ms: default_cooldown(),
        }
    }
}

impl CorrectionConfig {
    pub fn poll_interval(&self) -> Duration {
        Duration::from_millis(self.poll_interval_ms)
    }

    pub fn crossing_timeout(&self) -> Duration {
        Duration::from_millis(self.crossing_timeout_ms)
    }

    pub fn cooldown(&self) -> Duration {
        Duration::from_millis(self.cooldown_ms)
    }
}

fn default_tile_width() -> f64 {
    304.8
}
fn default_num_tiles() -> usize {
    4
}
fn default_max_attempts() -> u32 {
    3
}
fn default_max_observations() -> u32 {
    64
}
fn default_proximity_range() -> f64 {
    500.0
}
fn default_sample_delay() -> u64 {
    25
}
fn default_max_samples() -> u32 {
    8
}
fn default_sensor_x_offset() -> f64 {
    34.0
}
fn default_sensor_y_offset() -> f64 {
    32.5
}
fn default_edge_threshold() -> i32 {
    11
}
fn default_poll_interval() -> u64 {
    10
}
fn default_crossing_timeout() -> u64 {
    1500
}
fn default_cooldown() -> u64 {
    500
}

impl NavConfig {
    /// Load and validate a configuration file
    pub fn load(path: &Path) -> Result<Self> {
        let content = std::fs::read_to_string(path)?;
        Self::from_toml_str(&content)
    }

    pub fn from_toml_str(content: &str) -> Result<Self> {
        let config: NavConfig = toml::from_str(content)?;
        config.validate()?;
        Ok(config)
    }

    pub fn validate(&self) -> Result<()> {
        if self.grid.tile_width_mm <= 0.0 {
            return Err(NavError::Config("Tile width must be positive".to_string()));
        }
        if self.grid.num_tiles == 0 {
            return Err(NavError::Config("Map must have at least one tile".to_string()));
        }
        if self.localization.max_attempts == 0 {
            return Err(NavError::Config("Localization needs at least one attempt".to_string()));
        }
        if self.localization.max_observations == 0 {
            return Err(NavError::Config("Observation budget must be positive".to_string()));
        }
        if self.localization.max_samples < 2 {
            return Err(NavError::Config(
                "At least two proximity samples are needed to confirm a verdict".to_string(),
            ));
        }
        if self.localization.proximity_max_range_mm <= 0.0 {
            return Err(NavError::Config("Proximity range must be positive".to_string()));
        }
        if self.correction.sensor_x_offset_mm <= 0.0 {
            return Err(NavError::Config(
                "Line sensors must be laterally offset from the turning axis".to_string(),
            ));
        }
        if self.correction.edge_threshold <= 0 {
            return Err(NavError::Config("Edge threshold must be positive".to_string()));
        }
        if self.correction.poll_interval_ms == 0 {
            return Err(NavError::Config("Poll interval must be positive".to_string()));
        }
        if let Some(map) = &self.map {
            if map.rows.len() != self.grid.num_tiles {
                return Err(NavError::Config(format!(
                    "Map has {} rows, expected {}",
                    map.rows.len(),
                    self.grid.num_tiles
                )));
            }
            if let Some(row) = map.rows.iter().find(|r| r.chars().count() != self.grid.num_tiles) {
                return Err(NavError::Config(format!(
                    "Map row {:?} does not have {} tiles",
                    row, self.grid.num_tiles
                )));
            }
        }
        Ok(())
    }

    /// Apply flat `section.key` numeric overrides, validating each value.
    pub fn apply_overrides(&mut self, params: &HashMap<String, f64>) -> Result<()> {
        for (key, &value) in params {
            match key.as_str() {
                "grid.tile_width_mm" => {
                    if value <= 0.0 {
                        return Err(NavError::Config("Tile width must be positive".to_string()));
                    }
                    self.grid.tile_width_mm = value;
                }
                "grid.num_tiles" => {
                    if value < 1.0 {
                        return Err(NavError::Config("Map must have at least one tile".to_string()));
                    }
                    self.grid.num_tiles = value as usize;
                }
                "localization.max_attempts" => {
                    if value < 1.0 {
                        return Err(NavError::Config(
                            "Localization needs at least one attempt".to_string(),
                        ));
                    }
                    self.localization.max_attempts = value as u32;
                }
                "localization.max_observations" => {
                    if value < 1.0 {
                        return Err(NavError::Config(
                            "Observation budget must be positive".to_string(),
                        ));
                    }
                    self.localization.max_observations = value as u32;
                }
                "localization.proximity_max_range_mm" => {
                    if value <= 0.0 {
                        return Err(NavError::Config(
                            "Proximity range must be positive".to_string(),
                        ));
                    }
                    self.localization.proximity_max_range_mm = value;
                }
                "localization.sample_delay_ms" => {
                    if value < 0.0 {
                        return Err(NavError::Config(
                            "Sample delay must be non-negative".to_string(),
                        ));
                    }
                    self.localization.sample_delay_ms = value as u64;
                }
                "correction.sensor_x_offset_mm" => {
                    if value <= 0.0 {
                        return Err(NavError::Config("Sensor offset must be positive".to_string()));
                    }
                    self.correction.sensor_x_offset_mm = value;
                }
                "correction.sensor_y_offset_mm" => {
                    self.correction.sensor_y_offset_mm = value;
                }
                "correction.edge_threshold" => {
                    if value <= 0.0 {
                        return Err(NavError::Config("Edge threshold must be positive".to_string()));
                    }
                    self.correction.edge_threshold = value as i32;
                }
                "correction.poll_interval_ms" => {
                    if value < 1.0 {
                        return Err(NavError::Config("Poll interval must be positive".to_string()));
                    }
                    self.correction.poll_interval_ms = value as u64;
                }
                "correction.crossing_timeout_ms" => {
                    if value < 0.0 {
                        return Err(NavError::Config(
                            "Crossing timeout must be non-negative".to_string(),
                        ));
                    }
                    self.correction.crossing_timeout_ms = value as u64;
                }
                "correction.cooldown_ms" => {
                    if value < 0.0 {
                        return Err(NavError::Config("Cooldown must be non-negative".to_string()));
                    }
                    self.correction.cooldown_ms = value as u64;
                }
                other => {
                    return Err(NavError::Config(format!("Unknown parameter '{}'", other)));
                }
            }
        }
        self.validate()
    }
}
