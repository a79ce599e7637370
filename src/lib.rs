pub mod behaviors;
pub mod common;
pub mod config;
pub mod control;
pub mod error;
pub mod lifecycle;
pub mod navigation;
pub mod perception;
pub mod sim;

pub use crate::error::{NavError, Result};

use crate::config::NavConfig;
use crate::control::Drive;
use crate::lifecycle::LifecycleNode;
use crate::navigation::grid_map::{GridMap, SharedMap};
use crate::navigation::movement::MovementController;
use crate::navigation::NavigationStack;
use crate::perception::drift_correction::{DriftCorrector, DriftCorrectorHandle};
use crate::perception::localization::DiscreteLocalizer;
use crate::perception::pose_store::PoseStore;
use crate::perception::sensors::{ObstacleObserver, ProximitySensor};
use std::sync::Arc;
use tracing::info;

/// Mission context: owns the pose store, the map and the long-lived
/// services, and builds the per-phase components around them.
pub struct NavigationCore {
    config: NavConfig,
    pose_store: Arc<PoseStore>,
    map: SharedMap,
    components: Vec<Box<dyn LifecycleNode>>,
}

impl NavigationCore {
    /// Create a core for `map`
    pub fn new(config: NavConfig, map: GridMap) -> Result<Self> {
        config.validate()?;
        if map.size() != config.grid.num_tiles {
            return Err(NavError::Config(format!(
                "Map is {} tiles wide, configuration says {}",
                map.size(),
                config.grid.num_tiles
            )));
        }
        Ok(NavigationCore {
            config,
            pose_store: Arc::new(PoseStore::default()),
            map: SharedMap::new(map),
            components: Vec::new(),
        })
    }

    /// Create a core from a configuration that carries its map
    pub fn from_config(config: NavConfig) -> Result<Self> {
        let map = match &config.map {
            Some(map) => GridMap::from_config(map)?,
            None => return Err(NavError::Config("Configuration has no [map] section".to_string())),
        };
        Self::new(config, map)
    }

    pub fn config(&self) -> &NavConfig {
        &self.config
    }

    pub fn pose_store(&self) -> &Arc<PoseStore> {
        &self.pose_store
    }

    pub fn map(&self) -> &SharedMap {
        &self.map
    }

    /// Register a component with the core
    pub fn register<T: LifecycleNode + 'static>(&mut self, component: T) {
        self.components.push(Box::new(component));
    }

    /// Configure and activate all registered components, in order
    pub fn init(&mut self) -> Result<()> {
        for component in &mut self.components {
            info!("Starting {}", component.name());
            component.on_configure()?;
            component.on_activate()?;
        }
        Ok(())
    }

    /// Deactivate and clean up all registered components, in reverse order
    pub fn shutdown(&mut self) -> Result<()> {
        for component in self.components.iter_mut().rev() {
            info!("Stopping {}", component.name());
            component.on_deactivate()?;
            component.on_cleanup()?;
        }
        Ok(())
    }

    /// First registered component of type `T`
    pub fn component_mut<T: 'static>(&mut self) -> Option<&mut T> {
        self.components
            .iter_mut()
            .find_map(|component| component.as_any_mut().downcast_mut::<T>())
    }

    /// Control handle of the registered drift corrector
    pub fn drift_corrector(&mut self) -> Option<DriftCorrectorHandle> {
        self.component_mut::<DriftCorrector>().map(|c| c.handle())
    }

    /// Localizer over a snapshot of the current map
    pub fn localizer(
        &mut self,
        drive: Arc<dyn Drive>,
        proximity: Box<dyn ProximitySensor>,
    ) -> Result<DiscreteLocalizer> {
        let observer = ObstacleObserver::new(
            proximity,
            &self.config.localization,
            self.config.grid.tile_width_mm,
        );
        let localizer = DiscreteLocalizer::new(
            self.map.snapshot()?,
            drive,
            observer,
            Arc::clone(&self.pose_store),
            &self.config,
        );
        Ok(match self.drift_corrector() {
            Some(handle) => localizer.with_corrector(handle),
            None => localizer,
        })
    }

    /// Movement controller planning on the shared map
    pub fn movement_controller(&mut self, drive: Arc<dyn Drive>) -> Result<MovementController> {
        let navigation = NavigationStack::new(self.map.clone(), &self.config)?;
        let mover = MovementController::new(navigation, drive, Arc::clone(&self.pose_store));
        Ok(match self.drift_corrector() {
            Some(handle) => mover.with_corrector(handle),
            None => mover,
        })
    }
}
