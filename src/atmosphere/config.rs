use std::path::Path;
use std::time::Duration;

use bevy::prelude::Resource;
use serde::{Deserialize, Serialize};

use super::constants::*;
use super::error::AtmosError;

/// Runtime settings of the simulation. Every key is optional in TOML and falls back to its
/// default; the driver reads the resource every frame, so edits apply on the next cycle.
#[derive(Resource, Debug, Clone, PartialEq, Serialize, Deserialize)]
#[serde(default)]
pub struct AtmosConfig {
    pub simulation_enabled: bool,
    /// Atmosphere ticks per second.
    pub tick_rate: f32,
    /// Wall-clock budget for one tick over all grids, in milliseconds.
    pub max_process_time_ms: f32,
    pub space_wind: bool,
    /// Smallest pressure difference (kPa) that produces a space wind event.
    pub space_wind_min_pressure: f32,
    pub monstermos_equalization: bool,
    pub monstermos_depressurization: bool,
    pub monstermos_rip_tiles: bool,
    pub grid_impulse: bool,
    pub superconduction: bool,
    pub excited_groups: bool,
    pub excited_group_breakdown_cycles: u32,
    pub excited_group_dismantle_cycles: u32,
    pub monstermos_tile_limit: usize,
    pub monstermos_hard_tile_limit: usize,
    /// Cap on moles a single depressurization may drain from one tile per tick.
    pub depressurize_max_moles: Option<f32>,
    pub fires: bool,
}

impl Default for AtmosConfig {
    fn default() -> Self {
        Self {
            simulation_enabled: true,
            tick_rate: 15.0,
            max_process_time_ms: 2.0,
            space_wind: true,
            space_wind_min_pressure: 0.0,
            monstermos_equalization: true,
            monstermos_depressurization: true,
            monstermos_rip_tiles: true,
            grid_impulse: true,
            superconduction: true,
            excited_groups: true,
            excited_group_breakdown_cycles: EXCITED_GROUP_BREAKDOWN_CYCLES,
            excited_group_dismantle_cycles: EXCITED_GROUP_DISMANTLE_CYCLES,
            monstermos_tile_limit: MONSTERMOS_TILE_LIMIT,
            monstermos_hard_tile_limit: MONSTERMOS_HARD_TILE_LIMIT,
            depressurize_max_moles: None,
            fires: true,
        }
    }
}

impl AtmosConfig {
    pub fn from_toml_str(source: &str) -> Result<Self, AtmosError> {
        let config: Self = toml::from_str(source)?;
        config.validate()?;
        Ok(config)
    }

    pub fn load(path: impl AsRef<Path>) -> Result<Self, AtmosError> {
        let source = std::fs::read_to_string(path)?;
        Self::from_toml_str(&source)
    }

    pub fn validate(&self) -> Result<(), AtmosError> {
        if !(self.tick_rate.is_finite() && self.tick_rate > 0.0) {
            return Err(AtmosError::InvalidConfig(format!(
                "tick_rate must be positive, got {}",
                self.tick_rate
            )));
        }
        if !(self.max_process_time_ms.is_finite() && self.max_process_time_ms >= 0.0) {
            return Err(AtmosError::InvalidConfig(format!(
                "max_process_time_ms must not be negative, got {}",
                self.max_process_time_ms
            )));
        }
        if !(self.space_wind_min_pressure.is_finite() && self.space_wind_min_pressure >= 0.0) {
            return Err(AtmosError::InvalidConfig(format!(
                "space_wind_min_pressure must not be negative, got {}",
                self.space_wind_min_pressure
            )));
        }
        if self.monstermos_tile_limit == 0
            || self.monstermos_hard_tile_limit < self.monstermos_tile_limit
        {
            return Err(AtmosError::InvalidConfig(format!(
                "monstermos limits must satisfy 0 < tile_limit <= hard_tile_limit, got {} and {}",
                self.monstermos_tile_limit, self.monstermos_hard_tile_limit
            )));
        }
        if let Some(cap) = self.depressurize_max_moles {
            if !(cap.is_finite() && cap > 0.0) {
                return Err(AtmosError::InvalidConfig(format!(
                    "depressurize_max_moles must be positive, got {}",
                    cap
                )));
            }
        }
        Ok(())
    }

    pub fn max_process_time(&self) -> Duration {
        Duration::try_from_secs_f32(self.max_process_time_ms / 1000.0).unwrap_or(Duration::MAX)
    }

    pub fn tick_interval(&self) -> Duration {
        Duration::try_from_secs_f32(1.0 / self.tick_rate).unwrap_or(Duration::MAX)
    }
}
