//! Error types for the navigation core

use thiserror::Error;

/// Navigation core error type
#[derive(Error, Debug)]
pub enum NavError {
    /// Every localization attempt ended with an empty hypothesis set
    #[error("localization failed after {attempts} attempt(s): no consistent starting pose")]
    LocalizationFailed { attempts: u32 },

    /// The observation budget ran out while several hypotheses were still consistent
    #[error("localization ambiguous: {remaining} hypotheses left after {observations} readings")]
    LocalizationAmbiguous { remaining: usize, observations: u32 },

    #[error("destination tile ({x}, {y}) is unreachable")]
    DestinationUnreachable { x: i32, y: i32 },

    #[error("start tile ({x}, {y}) is not a free tile of the navigation mesh")]
    StartNotOnMesh { x: i32, y: i32 },

    #[error("drive error: {0}")]
    Drive(String),

    #[error("configuration error: {0}")]
    Config(String),

    #[error("map error: {0}")]
    Map(String),

    #[error("lifecycle error: {0}")]
    Lifecycle(String),

    #[error(transparent)]
    Io(#[from] std::io::Error),

    #[error(transparent)]
    Toml(#[from] toml::de::Error),
}

pub type Result<T> = std::result::Result<T, NavError>;
