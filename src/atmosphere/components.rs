use bevy::prelude::*;
use serde::{Deserialize, Serialize};

use super::constants::*;
use super::direction::{AtmosDirection, DIRECTION_COUNT};
use super::excited_group::ExcitedGroupId;
use super::gas::GasMixture;

/// What the rest of the game says is standing on a tile.
///
/// Written through [`GridAtmosphere::set_geometry`](super::grid::GridAtmosphere::set_geometry);
/// the simulation only reads it back when the tile is revalidated.
#[derive(Debug, Clone, Copy, PartialEq, Serialize, Deserialize)]
pub struct TileGeometry {
    /// Without a floor the tile is open to the map atmosphere (space on a station).
    pub floor: bool,
    /// Directions gas cannot leave the tile through.
    pub blocked: AtmosDirection,
    /// Fully blocked tiles with this flag hold no gas at all (walls).
    pub no_air_when_blocked: bool,
    pub thermal_conductivity: f32,
    pub heat_capacity: f32,
}

impl TileGeometry {
    pub fn space() -> Self {
        Self {
            floor: false,
            blocked: AtmosDirection::empty(),
            no_air_when_blocked: false,
            thermal_conductivity: 0.0,
            heat_capacity: HEAT_CAPACITY_VACUUM,
        }
    }

    pub fn floor() -> Self {
        Self {
            floor: true,
            blocked: AtmosDirection::empty(),
            no_air_when_blocked: false,
            thermal_conductivity: TILE_THERMAL_CONDUCTIVITY,
            heat_capacity: TILE_HEAT_CAPACITY,
        }
    }

    pub fn wall() -> Self {
        Self {
            floor: true,
            blocked: AtmosDirection::ALL,
            no_air_when_blocked: true,
            thermal_conductivity: WALL_THERMAL_CONDUCTIVITY,
            heat_capacity: TILE_HEAT_CAPACITY,
        }
    }

    /// A sealed tile that keeps its own gas, like a closed airlock.
    pub fn sealed() -> Self {
        Self {
            blocked: AtmosDirection::ALL,
            no_air_when_blocked: false,
            ..Self::floor()
        }
    }

    pub fn holds_air(&self) -> bool {
        self.floor && !(self.blocked == AtmosDirection::ALL && self.no_air_when_blocked)
    }
}

/// Cached airtightness, refreshed from [`TileGeometry`] on revalidation.
#[derive(Debug, Clone, Copy, Default, PartialEq)]
pub struct AirtightData {
    pub blocked_directions: AtmosDirection,
    pub no_air_when_blocked: bool,
}

/// A burning volume on a tile.
#[derive(Debug, Clone, Copy, Default, PartialEq)]
pub struct Hotspot {
    pub valid: bool,
    pub skipped_first_process: bool,
    /// Burning everywhere on the tile, so it can spread.
    pub bypassing: bool,
    pub temperature: f32,
    pub volume: f32,
    /// 1 small, 2 large, 3 spreading.
    pub state: u8,
}

/// Scratch data for pressure equalization. Only meaningful while its cycle stamps are
/// current.
#[derive(Debug, Clone, Copy, Default, PartialEq)]
pub(crate) struct MonstermosInfo {
    pub last_cycle: u32,
    pub last_queue_cycle: u64,
    pub last_slow_queue_cycle: u64,
    pub mole_delta: f32,
    pub transfer_dirs: [f32; DIRECTION_COUNT],
    pub current_transfer_amount: f32,
    pub current_transfer_direction: AtmosDirection,
    pub fast_done: bool,
}

impl MonstermosInfo {
    pub fn queued(queue_cycle: u64) -> Self {
        Self {
            last_queue_cycle: queue_cycle,
            ..default()
        }
    }
}

/// Atmosphere state of one grid cell
#[derive(Debug, Clone)]
pub struct TileAtmosphere {
    pub position: IVec2,
    pub(crate) geometry: TileGeometry,
    /// `None` for walls and for tiles open to the map atmosphere.
    pub air: Option<GasMixture>,
    /// Open to a space map atmosphere.
    pub space: bool,
    /// Open to the map atmosphere, space or not.
    pub map_atmosphere: bool,
    /// Neighbour indices in N, S, E, W order; `None` off the grid edge.
    pub adjacent_tiles: [Option<usize>; DIRECTION_COUNT],
    /// Neighbours gas can currently flow to.
    pub adjacent_bits: AtmosDirection,
    /// Temperature of the solid part of the tile.
    pub temperature: f32,
    pub temperature_archived: f32,
    pub thermal_conductivity: f32,
    pub heat_capacity: f32,
    pub excited: bool,
    pub excited_group: Option<ExcitedGroupId>,
    pub airtight_dirty: bool,
    pub airtight_data: AirtightData,
    pub archived_cycle: u32,
    pub current_cycle: u32,
    /// Absolute moles moved by this tile's last share.
    pub last_share: f32,
    pub pressure_difference: f32,
    pub pressure_direction: AtmosDirection,
    pub hotspot: Hotspot,
    pub max_fire_temperature_sustained: f32,
    pub(crate) monstermos: MonstermosInfo,
}

impl TileAtmosphere {
    pub(crate) fn new(position: IVec2, geometry: TileGeometry) -> Self {
        Self {
            position,
            geometry,
            air: None,
            space: false,
            map_atmosphere: false,
            adjacent_tiles: [None; DIRECTION_COUNT],
            adjacent_bits: AtmosDirection::empty(),
            temperature: T20C,
            temperature_archived: T20C,
            thermal_conductivity: geometry.thermal_conductivity,
            heat_capacity: geometry.heat_capacity,
            excited: false,
            excited_group: None,
            airtight_dirty: true,
            airtight_data: AirtightData::default(),
            archived_cycle: 0,
            current_cycle: 0,
            last_share: 0.0,
            pressure_difference: 0.0,
            pressure_direction: AtmosDirection::empty(),
            hotspot: Hotspot::default(),
            max_fire_temperature_sustained: 0.0,
            monstermos: MonstermosInfo::default(),
        }
    }

    pub fn geometry(&self) -> TileGeometry {
        self.geometry
    }

    /// What revalidation can change about how gas moves through the tile.
    pub(crate) fn flow_state(&self) -> (AtmosDirection, bool, bool, bool) {
        (self.adjacent_bits, self.air.is_some(), self.space, self.map_atmosphere)
    }

    /// Whether gas can flow through this tile at all.
    pub fn participates(&self) -> bool {
        self.air.is_some() || self.map_atmosphere
    }

    pub fn pressure(&self) -> f32 {
        self.air.as_ref().map_or(0.0, GasMixture::pressure)
    }

    pub fn total_moles(&self) -> f32 {
        self.air.as_ref().map_or(0.0, GasMixture::total_moles)
    }

    pub(crate) fn archive(&mut self, fire_count: u32) {
        if let Some(air) = &mut self.air {
            air.archive();
        }
        self.temperature_archived = self.temperature;
        self.archived_cycle = fire_count;
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn walls_hold_no_air_but_sealed_tiles_do() {
        assert!(!TileGeometry::wall().holds_air());
        assert!(TileGeometry::sealed().holds_air());
        assert!(TileGeometry::floor().holds_air());
        assert!(!TileGeometry::space().holds_air());
    }

    #[test]
    fn archive_snapshots_both_temperatures() {
        let mut tile = TileAtmosphere::new(IVec2::ZERO, TileGeometry::floor());
        let mut air = GasMixture::new_air(CELL_VOLUME, T20C);
        air.set_temperature(350.0);
        tile.air = Some(air);
        tile.temperature = 400.0;

        tile.archive(7);

        assert_eq!(tile.archived_cycle, 7);
        assert_eq!(tile.temperature_archived, 400.0);
        assert_eq!(tile.air.as_ref().map(GasMixture::temperature_archived), Some(350.0));
    }
}
