use std::collections::{BTreeSet, VecDeque};
use std::sync::Arc;

use bevy::prelude::*;
use serde::{Deserialize, Serialize};
use slotmap::SlotMap;

use super::components::{TileAtmosphere, TileGeometry};
use super::config::AtmosConfig;
use super::constants::*;
use super::direction::{AtmosDirection, DIRECTION_COUNT};
use super::error::AtmosError;
use super::events::AtmosOutbox;
use super::excited_group::{ExcitedGroup, ExcitedGroupId};
use super::gas::{GasMixture, GasRegistry};
use super::holder::MapAtmosphere;
use super::pipe_net::{PipeNetId, PipeNetwork};
use super::processing::ProcessState;

/// Atmosphere of one grid: a flat tile arena plus the work queues of the tick pipeline.
///
/// Tiles are addressed by index (`y * width + x`); neighbours are stored as indices, never
/// as references, so the whole grid can be cloned or serialized in bulk.
#[derive(Debug, Clone)]
pub struct GridAtmosphere {
    uid: Entity,
    map: Option<Entity>,
    width: u32,
    height: u32,
    pub(crate) registry: Arc<GasRegistry>,
    /// Settings captured at the start of the current cycle.
    pub(crate) config: AtmosConfig,
    pub(crate) tiles: Vec<TileAtmosphere>,
    /// Read-only copy of the map atmosphere used for tiles without a floor.
    pub(crate) map_atmosphere: MapAtmosphere,
    pub(crate) invalidated: BTreeSet<usize>,
    pub(crate) active_tiles: BTreeSet<usize>,
    pub(crate) excited_groups: SlotMap<ExcitedGroupId, ExcitedGroup>,
    pub(crate) equalize_queue: BTreeSet<usize>,
    pub(crate) high_pressure_delta: BTreeSet<usize>,
    pub(crate) hotspot_tiles: BTreeSet<usize>,
    pub(crate) superconductivity_tiles: BTreeSet<usize>,
    pub(crate) changed_tiles: BTreeSet<usize>,
    pub(crate) pipes: PipeNetwork,
    pub(crate) outbox: AtmosOutbox,
    pub(crate) update_counter: u32,
    pub(crate) equalization_queue_cycle_control: u64,
    pub(crate) state: ProcessState,
    pub(crate) processing_paused: bool,
    pub(crate) current_run: VecDeque<usize>,
    pub(crate) current_groups: VecDeque<ExcitedGroupId>,
    pub(crate) current_nets: VecDeque<PipeNetId>,
}

/// Counters for monitoring and tests.
#[derive(Debug, Clone, Copy, Default, PartialEq, Eq)]
pub struct GridStats {
    pub active_tiles: usize,
    pub invalidated_tiles: usize,
    pub excited_groups: usize,
    pub sleeping_groups: usize,
    pub hotspots: usize,
    pub superconducting_tiles: usize,
    pub pipe_nets: usize,
}

/// Persisted per-tile state.
#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
pub struct TileData {
    pub geometry: TileGeometry,
    pub air: Option<GasMixture>,
    pub temperature: f32,
}

/// Persisted grid state, saved alongside the rest of the grid.
#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
pub struct GridAtmosphereData {
    pub width: u32,
    pub height: u32,
    pub tiles: Vec<TileData>,
}

impl GridAtmosphere {
    /// Create a grid with every tile open to space.
    pub fn new(uid: Entity, width: u32, height: u32, registry: Arc<GasRegistry>) -> Self {
        let tiles = (0..height as i32)
            .flat_map(|y| (0..width as i32).map(move |x| IVec2::new(x, y)))
            .map(|position| TileAtmosphere::new(position, TileGeometry::space()))
            .collect();

        let mut grid = Self {
            uid,
            map: None,
            width,
            height,
            registry,
            config: AtmosConfig::default(),
            tiles,
            map_atmosphere: MapAtmosphere::space(),
            invalidated: BTreeSet::new(),
            active_tiles: BTreeSet::new(),
            excited_groups: SlotMap::with_key(),
            equalize_queue: BTreeSet::new(),
            high_pressure_delta: BTreeSet::new(),
            hotspot_tiles: BTreeSet::new(),
            superconductivity_tiles: BTreeSet::new(),
            changed_tiles: BTreeSet::new(),
            pipes: PipeNetwork::default(),
            outbox: AtmosOutbox::default(),
            update_counter: 1,
            equalization_queue_cycle_control: 0,
            state: ProcessState::default(),
            processing_paused: false,
            current_run: VecDeque::new(),
            current_groups: VecDeque::new(),
            current_nets: VecDeque::new(),
        };
        grid.revalidate_all();
        grid
    }

    /// Build a grid from an ASCII layout, first row northernmost.
    ///
    /// `#` wall, `.` floor with station air, `,` floor in vacuum, `+` sealed airlock with
    /// air, space or `_` open space. Short rows are padded with space.
    pub fn from_layout(
        uid: Entity,
        rows: &[&str],
        registry: Arc<GasRegistry>,
    ) -> Result<Self, AtmosError> {
        let height = rows.len() as u32;
        let width = rows.iter().map(|row| row.chars().count()).max().unwrap_or(0) as u32;
        let mut grid = Self::new(uid, width, height, registry);

        let mut filled = Vec::new();
        for (row_index, row) in rows.iter().enumerate() {
            let y = height as i32 - 1 - row_index as i32;
            for (x, symbol) in row.chars().enumerate() {
                let position = IVec2::new(x as i32, y);
                let geometry = match symbol {
                    '#' => TileGeometry::wall(),
                    '.' => {
                        filled.push(position);
                        TileGeometry::floor()
                    }
                    ',' => TileGeometry::floor(),
                    '+' => {
                        filled.push(position);
                        TileGeometry::sealed()
                    }
                    ' ' | '_' => TileGeometry::space(),
                    other => return Err(AtmosError::InvalidLayout(other)),
                };
                grid.set_geometry(position, geometry)?;
            }
        }
        grid.revalidate_all();

        for position in filled {
            grid.fill_air(position, GasMixture::new_air(CELL_VOLUME, T20C))?;
        }
        Ok(grid)
    }

    /// Restore a grid saved with [`snapshot`](Self::snapshot).
    pub fn from_snapshot(
        uid: Entity,
        data: &GridAtmosphereData,
        registry: Arc<GasRegistry>,
    ) -> Result<Self, AtmosError> {
        let too_large = AtmosError::SnapshotTooLarge {
            width: data.width,
            height: data.height,
        };
        if i32::try_from(data.width).is_err() || i32::try_from(data.height).is_err() {
            return Err(too_large);
        }
        let expected = data
            .width
            .checked_mul(data.height)
            .and_then(|count| usize::try_from(count).ok())
            .ok_or(too_large)?;
        if data.tiles.len() != expected {
            return Err(AtmosError::SnapshotMismatch {
                expected,
                found: data.tiles.len(),
            });
        }

        let mut grid = Self::new(uid, data.width, data.height, registry);
        for (idx, tile) in data.tiles.iter().enumerate() {
            grid.tiles[idx].geometry = tile.geometry;
            grid.tiles[idx].airtight_dirty = true;
            grid.invalidated.insert(idx);
        }
        grid.revalidate_all();

        for (idx, saved) in data.tiles.iter().enumerate() {
            let tile = &mut grid.tiles[idx];
            tile.temperature = saved.temperature;
            tile.temperature_archived = saved.temperature;
            if let (Some(air), Some(saved_air)) = (tile.air.as_mut(), saved.air.as_ref()) {
                let volume = air.volume();
                *air = saved_air.clone();
                air.set_volume(volume);
            }
        }
        Ok(grid)
    }

    pub fn snapshot(&self) -> GridAtmosphereData {
        GridAtmosphereData {
            width: self.width,
            height: self.height,
            tiles: self
                .tiles
                .iter()
                .map(|tile| TileData {
                    geometry: tile.geometry,
                    air: tile.air.clone(),
                    temperature: tile.temperature,
                })
                .collect(),
        }
    }

    pub fn uid(&self) -> Entity {
        self.uid
    }

    pub fn map(&self) -> Option<Entity> {
        self.map
    }

    pub fn width(&self) -> u32 {
        self.width
    }

    pub fn height(&self) -> u32 {
        self.height
    }

    pub fn registry(&self) -> &Arc<GasRegistry> {
        &self.registry
    }

    /// Completed pipeline cycles, starting at 1.
    pub fn update_counter(&self) -> u32 {
        self.update_counter
    }

    pub fn is_processing_paused(&self) -> bool {
        self.processing_paused
    }

    pub fn map_atmosphere(&self) -> &MapAtmosphere {
        &self.map_atmosphere
    }

    /// Attach the grid to a map. Tiles without a floor pick up the new atmosphere on their
    /// next revalidation.
    pub fn set_map_atmosphere(&mut self, map: Option<Entity>, atmosphere: MapAtmosphere) {
        self.map = map;
        self.map_atmosphere = atmosphere;
        for idx in 0..self.tiles.len() {
            if !self.tiles[idx].geometry.floor {
                self.invalidated.insert(idx);
            }
        }
    }

    pub fn index_of(&self, position: IVec2) -> Option<usize> {
        if position.x < 0
            || position.y < 0
            || position.x >= self.width as i32
            || position.y >= self.height as i32
        {
            return None;
        }
        Some(position.y as usize * self.width as usize + position.x as usize)
    }

    pub fn position_of(&self, idx: usize) -> Option<IVec2> {
        self.tiles.get(idx).map(|tile| tile.position)
    }

    pub(crate) fn neighbor_index(&self, idx: usize, direction: AtmosDirection) -> Option<usize> {
        let position = self.tiles.get(idx)?.position + direction.offset();
        self.index_of(position)
    }

    pub fn tile(&self, position: IVec2) -> Option<&TileAtmosphere> {
        self.index_of(position).map(|idx| &self.tiles[idx])
    }

    pub fn tiles(&self) -> impl Iterator<Item = &TileAtmosphere> {
        self.tiles.iter()
    }

    /// Gas on a tile. Tiles open to the map report the map's read-only mixture; walls and
    /// out-of-bounds positions report nothing.
    pub fn tile_mixture(&self, position: IVec2) -> Option<&GasMixture> {
        let tile = self.tile(position)?;
        match &tile.air {
            Some(air) => Some(air),
            None if tile.map_atmosphere => Some(self.map_atmosphere.mixture()),
            None => None,
        }
    }

    /// Mutable gas on a tile. With `excite`, the tile is woken for the next tick, which also
    /// dissolves any sleeping excited group it belongs to.
    pub fn tile_mixture_mut(&mut self, position: IVec2, excite: bool) -> Option<&mut GasMixture> {
        let idx = self.index_of(position)?;
        self.tiles[idx].air.as_ref()?;
        if excite {
            self.add_active_tile(idx);
            self.changed_tiles.insert(idx);
        }
        self.tiles[idx].air.as_mut()
    }

    /// Add gas to a tile and wake it. Returns false when the tile cannot hold gas.
    pub fn merge_into_tile(&mut self, position: IVec2, source: &GasMixture) -> bool {
        let registry = Arc::clone(&self.registry);
        match self.tile_mixture_mut(position, true) {
            Some(air) => {
                air.merge(source, &registry);
                true
            }
            None => false,
        }
    }

    /// Replace a tile's gas outright, e.g. when a map is loaded.
    pub fn fill_air(&mut self, position: IVec2, mixture: GasMixture) -> Result<(), AtmosError> {
        let idx = self.index_of(position).ok_or(AtmosError::OutOfBounds(position))?;
        let Some(air) = self.tiles[idx].air.as_mut() else {
            return Ok(());
        };
        let volume = air.volume();
        *air = mixture;
        air.set_volume(volume);
        self.add_active_tile(idx);
        self.changed_tiles.insert(idx);
        Ok(())
    }

    /// `None` out of bounds.
    pub fn is_space(&self, position: IVec2) -> Option<bool> {
        self.tile(position).map(|tile| tile.space)
    }

    /// Change what stands on a tile. The change is applied by the revalidate stage.
    pub fn set_geometry(&mut self, position: IVec2, geometry: TileGeometry) -> Result<(), AtmosError> {
        let idx = self.index_of(position).ok_or(AtmosError::OutOfBounds(position))?;
        let tile = &mut self.tiles[idx];
        tile.geometry = geometry;
        tile.airtight_dirty = true;
        self.invalidated.insert(idx);
        Ok(())
    }

    /// Queue a tile for revalidation. Returns false out of bounds.
    pub fn invalidate_tile(&mut self, position: IVec2) -> bool {
        let Some(idx) = self.index_of(position) else {
            return false;
        };
        self.invalidated.insert(idx);
        true
    }

    /// Drain the invalidated queue immediately, outside the tick pipeline. With nothing
    /// queued, every tile is revalidated.
    pub fn revalidate_all(&mut self) {
        if self.invalidated.is_empty() {
            self.invalidated.extend(0..self.tiles.len());
        }
        while let Some(idx) = self.invalidated.pop_first() {
            self.revalidate_tile(idx);
        }
    }

    pub fn is_active(&self, position: IVec2) -> bool {
        self.index_of(position)
            .map_or(false, |idx| self.active_tiles.contains(&idx))
    }

    pub fn active_tile_count(&self) -> usize {
        self.active_tiles.len()
    }

    pub fn excited_group_of(&self, position: IVec2) -> Option<ExcitedGroupId> {
        self.tile(position).and_then(|tile| tile.excited_group)
    }

    pub fn excited_group(&self, id: ExcitedGroupId) -> Option<&ExcitedGroup> {
        self.excited_groups.get(id)
    }

    pub fn excited_groups(&self) -> impl Iterator<Item = (ExcitedGroupId, &ExcitedGroup)> {
        self.excited_groups.iter()
    }

    pub fn pipes(&self) -> &PipeNetwork {
        &self.pipes
    }

    pub fn pipes_mut(&mut self) -> &mut PipeNetwork {
        &mut self.pipes
    }

    /// Moles on every tile plus every pipe network.
    pub fn total_moles(&self) -> f32 {
        let tiles: f32 = self.tiles.iter().map(TileAtmosphere::total_moles).sum();
        tiles + self.pipes.total_moles()
    }

    pub fn stats(&self) -> GridStats {
        GridStats {
            active_tiles: self.active_tiles.len(),
            invalidated_tiles: self.invalidated.len(),
            excited_groups: self.excited_groups.len(),
            sleeping_groups: self
                .excited_groups
                .values()
                .filter(|group| group.is_asleep())
                .count(),
            hotspots: self.hotspot_tiles.len(),
            superconducting_tiles: self.superconductivity_tiles.len(),
            pipe_nets: self.pipes.net_count(),
        }
    }

    /// Take everything the last ticks produced for consumers.
    pub fn drain_outbox(&mut self) -> AtmosOutbox {
        let mut outbox = std::mem::take(&mut self.outbox);
        let changed = std::mem::take(&mut self.changed_tiles);
        outbox
            .changed_tiles
            .extend(changed.into_iter().map(|idx| self.tiles[idx].position));
        outbox
    }

    pub(crate) fn archive_tile(&mut self, idx: usize, fire_count: u32) {
        if self.tiles[idx].archived_cycle < fire_count {
            self.tiles[idx].archive(fire_count);
        }
    }

    /// Put a tile in the active set. Waking a member of a sleeping excited group wakes the
    /// whole group.
    pub(crate) fn add_active_tile(&mut self, idx: usize) {
        if let Some(group) = self.tiles[idx].excited_group {
            if self.excited_groups.get(group).map_or(false, ExcitedGroup::is_asleep) {
                self.wake_excited_group(group);
            }
        }

        let tile = &mut self.tiles[idx];
        if tile.air.is_none() {
            return;
        }
        tile.excited = true;
        self.active_tiles.insert(idx);
    }

    pub(crate) fn remove_active_tile(&mut self, idx: usize, dispose_group: bool) {
        let tile = &mut self.tiles[idx];
        tile.excited = false;
        self.active_tiles.remove(&idx);

        let Some(group) = tile.excited_group else {
            return;
        };
        if dispose_group {
            self.excited_group_dispose(group);
        } else {
            self.excited_group_remove_tile(group, idx);
        }
    }

    /// Whether any open neighbour's gas differs from this tile's enough to equalize.
    pub(crate) fn has_pressure_differential(&self, idx: usize) -> bool {
        let tile = &self.tiles[idx];
        let moles = tile.total_moles();
        (0..DIRECTION_COUNT).any(|i| {
            if !tile.adjacent_bits.contains(AtmosDirection::from_index(i)) {
                return false;
            }
            let Some(other) = tile.adjacent_tiles[i] else {
                return false;
            };
            let other = &self.tiles[other];
            if !other.participates() {
                return false;
            }
            let other_moles = match &other.air {
                Some(air) => air.total_moles(),
                None => self.map_atmosphere.mixture().total_moles(),
            };
            (other_moles - moles).abs() > MINIMUM_MOLES_DELTA_TO_MOVE
        })
    }
}

/// Two distinct mutable elements of one slice.
pub(crate) fn pair_mut<T>(items: &mut [T], a: usize, b: usize) -> (&mut T, &mut T) {
    debug_assert_ne!(a, b);
    if a < b {
        let (left, right) = items.split_at_mut(b);
        (&mut left[a], &mut right[0])
    } else {
        let (left, right) = items.split_at_mut(a);
        (&mut right[0], &mut left[b])
    }
}
