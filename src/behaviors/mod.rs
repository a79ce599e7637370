//! Mission behaviours layered on the movement controller

use crate::common::TileCoord;
use crate::control::Drive;
use crate::error::Result;
use crate::navigation::movement::MovementController;
use tracing::{info, warn};

/// Object retrieval run inside the pickup zone.
///
/// Implementations sequence primitive drive moves (and their end
/// effector); the robot is on the zone entry tile when `retrieve` starts.
pub trait RetrievalBehavior {
    fn name(&self) -> &str;

    fn retrieve(&mut self, drive: &dyn Drive) -> Result<()>;
}

/// Opens the pickup zone for one retrieval.
///
/// The zone tiles are normally kept blocked so routes avoid them. A run
/// unblocks them, travels to `entry`, runs the retrieval with drift
/// correction off, travels out to `exit`, then blocks the zone again. The
/// mesh is regenerated after each map edit.
#[derive(Debug, Clone, Copy)]
pub struct PickupSequence {
    pub entry: TileCoord,
    pub exit: TileCoord,
}

impl PickupSequence {
    pub fn new(entry: TileCoord, exit: TileCoord) -> Self {
        PickupSequence { entry, exit }
    }

    pub fn run<B>(&self, mover: &mut MovementController, behavior: &mut B) -> Result<()>
    where
        B: RetrievalBehavior + ?Sized,
    {
        mover.navigation().unblock_pickup_zone()?;
        mover.navigation_mut().regenerate()?;
        info!("pickup zone open for {}", behavior.name());

        let result = self.retrieve_and_leave(mover, behavior);

        // Close the zone even when the retrieval failed
        let closed = mover
            .navigation()
            .block_pickup_zone()
            .and_then(|_| mover.navigation_mut().regenerate());
        if let Err(e) = &closed {
            warn!("failed to close pickup zone: {}", e);
        }
        result.and(closed)
    }

    fn retrieve_and_leave<B>(&self, mover: &MovementController, behavior: &mut B) -> Result<()>
    where
        B: RetrievalBehavior + ?Sized,
    {
        mover.travel_to_tile(self.entry.x, self.entry.y, None)?;

        let was_enabled = mover.corrector().is_some_and(|c| c.is_enabled());
        if let Some(corrector) = mover.corrector() {
            corrector.disable();
        }
        let retrieved = behavior.retrieve(mover.drive());
        if let Some(corrector) = mover.corrector() {
            corrector.set_enabled(was_enabled);
        }
        retrieved?;

        mover.travel_to_tile(self.exit.x, self.exit.y, None)
    }
}
