//! Notifications the simulation publishes for gameplay consumers.
//!
//! Grids collect these in an [`AtmosOutbox`] while ticking (possibly on a worker thread);
//! the plugin forwards them to bevy's event queues afterwards.

use bevy::prelude::*;

use super::direction::AtmosDirection;

/// Tiles whose gas changed since the last publish.
#[derive(Event, Debug, Clone, PartialEq)]
pub struct GasTileChanged {
    pub grid: Entity,
    pub tiles: Vec<IVec2>,
}

/// Pressure difference strong enough to push loose objects.
#[derive(Event, Debug, Clone, Copy, PartialEq)]
pub struct SpaceWind {
    pub grid: Entity,
    pub tile: IVec2,
    /// kPa
    pub pressure_difference: f32,
    pub direction: AtmosDirection,
}

/// Reaction push on the whole grid from venting gas, in moles times direction.
#[derive(Event, Debug, Clone, Copy, PartialEq)]
pub struct GridImpulse {
    pub grid: Entity,
    pub impulse: Vec2,
}

/// Enough gas rushed over a floor tile to tear it up.
#[derive(Event, Debug, Clone, Copy, PartialEq)]
pub struct DecompressionFloorRip {
    pub grid: Entity,
    pub tile: IVec2,
    pub moles: f32,
}

/// A tile is on fire this tick.
#[derive(Event, Debug, Clone, Copy, PartialEq)]
pub struct TileFire {
    pub grid: Entity,
    pub tile: IVec2,
    pub temperature: f32,
    pub volume: f32,
}

/// Per-grid buffer of pending notifications.
#[derive(Debug, Clone, Default, PartialEq)]
pub struct AtmosOutbox {
    pub changed_tiles: Vec<IVec2>,
    pub space_wind: Vec<SpaceWind>,
    pub impulses: Vec<GridImpulse>,
    pub floor_rips: Vec<DecompressionFloorRip>,
    pub fires: Vec<TileFire>,
}

impl AtmosOutbox {
    pub fn is_empty(&self) -> bool {
        self.changed_tiles.is_empty()
            && self.space_wind.is_empty()
            && self.impulses.is_empty()
            && self.floor_rips.is_empty()
            && self.fires.is_empty()
    }
}
