//! Static tile occupancy map
//!
//! A square grid of `size x size` tiles stored as a bitmask. Anything
//! outside the grid is blocked. The map is fixed for a mission apart from
//! the two pickup-zone tiles, which may be toggled while a retrieval is in
//! progress. Every edit bumps the map revision so a stale navigation mesh
//! can be spotted.

use crate::common::{Direction, TileCoord};
use crate::config::MapConfig;
use crate::error::{NavError, Result};
use std::sync::{Arc, RwLock, RwLockReadGuard, RwLockWriteGuard};

const WORD_BITS: usize = 64;

/// Square occupancy bitmask
#[derive(Debug, Clone, PartialEq, Eq)]
pub struct GridMap {
    size: usize,
    bits: Vec<u64>,
    pickup_zone: Option<[TileCoord; 2]>,
    revision: u64,
}

impl GridMap {
    /// An all-free map with `size` tiles per side
    pub fn new(size: usize) -> Self {
        GridMap {
            size,
            bits: vec![0; (size * size).div_ceil(WORD_BITS)],
            pickup_zone: None,
            revision: 0,
        }
    }

    /// Parse rows of `#` (blocked) and `.` (free), top row (highest y) first
    pub fn from_rows<S: AsRef<str>>(rows: &[S]) -> Result<Self> {
        let size = rows.len();
        if size == 0 {
            return Err(NavError::Map("Map needs at least one row".to_string()));
        }
        let mut map = GridMap::new(size);
        for (row_index, row) in rows.iter().enumerate() {
            let row = row.as_ref();
            if row.chars().count() != size {
                return Err(NavError::Map(format!(
                    "Row {} has {} tiles, expected {}",
                    row_index,
                    row.chars().count(),
                    size
                )));
            }
            let y = (size - 1 - row_index) as i32;
            for (x, c) in row.chars().enumerate() {
                match c {
                    '#' => map.set(TileCoord::new(x as i32, y), true),
                    '.' => {}
                    other => {
                        return Err(NavError::Map(format!("Unknown tile character '{}'", other)));
                    }
                }
            }
        }
        Ok(map)
    }

    /// Build the map described by a configuration section
    pub fn from_config(config: &MapConfig) -> Result<Self> {
        let mut map = Self::from_rows(&config.rows)?;
        if let Some([[ax, ay], [bx, by]]) = config.pickup_zone {
            map.set_pickup_zone([TileCoord::new(ax, ay), TileCoord::new(bx, by)])?;
        }
        Ok(map)
    }

    pub fn size(&self) -> usize {
        self.size
    }

    pub fn revision(&self) -> u64 {
        self.revision
    }

    pub fn contains(&self, tile: TileCoord) -> bool {
        tile.x >= 0 && tile.y >= 0 && (tile.x as usize) < self.size && (tile.y as usize) < self.size
    }

    /// True iff the tile is occupied or off the map
    pub fn blocked(&self, tile: TileCoord) -> bool {
        match self.index(tile) {
            Some(i) => self.bits[i / WORD_BITS] & (1 << (i % WORD_BITS)) != 0,
            None => true,
        }
    }

    /// Whether the tile adjacent to `tile` in direction `dir` is blocked
    pub fn blocked_towards(&self, tile: TileCoord, dir: Direction) -> bool {
        self.blocked(tile.step(dir))
    }

    pub fn set_blocked(&mut self, tile: TileCoord, blocked: bool) -> Result<()> {
        if !self.contains(tile) {
            return Err(NavError::Map(format!("Tile {} is outside the map", tile)));
        }
        self.set(tile, blocked);
        self.revision += 1;
        Ok(())
    }

    /// Free tiles in x-major, y-minor order
    pub fn free_tiles(&self) -> impl Iterator<Item = TileCoord> + '_ {
        let n = self.size as i32;
        (0..n)
            .flat_map(move |x| (0..n).map(move |y| TileCoord::new(x, y)))
            .filter(move |&t| !self.blocked(t))
    }

    pub fn free_count(&self) -> usize {
        self.free_tiles().count()
    }

    pub fn pickup_zone(&self) -> Option<[TileCoord; 2]> {
        self.pickup_zone
    }

    pub fn set_pickup_zone(&mut self, zone: [TileCoord; 2]) -> Result<()> {
        for tile in zone {
            if !self.contains(tile) {
                return Err(NavError::Map(format!("Pickup tile {} is outside the map", tile)));
            }
        }
        self.pickup_zone = Some(zone);
        Ok(())
    }

    /// Mark both pickup tiles blocked so the planner routes around them
    pub fn block_pickup_zone(&mut self) -> Result<()> {
        self.toggle_pickup_zone(true)
    }

    /// Free both pickup tiles so a retrieval can use them
    pub fn unblock_pickup_zone(&mut self) -> Result<()> {
        self.toggle_pickup_zone(false)
    }

    fn toggle_pickup_zone(&mut self, blocked: bool) -> Result<()> {
        let zone = self
            .pickup_zone
            .ok_or_else(|| NavError::Map("No pickup zone configured".to_string()))?;
        for tile in zone {
            self.set(tile, blocked);
        }
        self.revision += 1;
        Ok(())
    }

    fn set(&mut self, tile: TileCoord, blocked: bool) {
        if let Some(i) = self.index(tile) {
            let mask = 1u64 << (i % WORD_BITS);
            if blocked {
                self.bits[i / WORD_BITS] |= mask;
            } else {
                self.bits[i / WORD_BITS] &= !mask;
            }
        }
    }

    fn index(&self, tile: TileCoord) -> Option<usize> {
        if self.contains(tile) {
            Some(tile.x as usize * self.size + tile.y as usize)
        } else {
            None
        }
    }
}

/// Shared handle to the mission map
#[derive(Debug, Clone)]
pub struct SharedMap {
    inner: Arc<RwLock<GridMap>>,
}

impl SharedMap {
    pub fn new(map: GridMap) -> Self {
        SharedMap {
            inner: Arc::new(RwLock::new(map)),
        }
    }

    pub fn read(&self) -> Result<RwLockReadGuard<'_, GridMap>> {
        self.inner
            .read()
            .map_err(|_| NavError::Map("Failed to lock grid map".to_string()))
    }

    pub fn write(&self) -> Result<RwLockWriteGuard<'_, GridMap>> {
        self.inner
            .write()
            .map_err(|_| NavError::Map("Failed to lock grid map".to_string()))
    }

    /// Clone of the current map contents
    pub fn snapshot(&self) -> Result<GridMap> {
        Ok(self.read()?.clone())
    }
}
