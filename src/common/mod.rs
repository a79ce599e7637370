//! Common types shared by localization, correction and planning

pub mod direction;
pub mod geometry;

pub use direction::Direction;
pub use geometry::{metric_to_tile, normalize_degrees, tile_to_metric, Pose, TileCoord};
