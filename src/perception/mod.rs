//! Perception: the shared pose estimate and everything that corrects it
pub mod drift_correction;
pub mod filters;
pub mod localization;
pub mod pose_store;
pub mod sensors;
