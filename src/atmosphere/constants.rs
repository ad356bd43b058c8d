//! Physical constants and legacy tuning values for the tile atmosphere.
//!
//! Thresholds that gameplay may want to tune at runtime are mirrored in
//! [`AtmosConfig`](super::config::AtmosConfig); the values here are their defaults.

/// Ideal gas constant [J/(mol·K)], which is also kPa·L/(mol·K).
pub const R: f32 = 8.314_462_6;

/// Standard pressure [kPa]
pub const ONE_ATMOSPHERE: f32 = 101.325;

/// Cosmic microwave background temperature [K]
pub const TCMB: f32 = 2.7;

/// 0°C [K]
pub const T0C: f32 = 273.15;

/// 20°C [K]
pub const T20C: f32 = 293.15;

/// Volume of one tile [L]
pub const CELL_VOLUME: f32 = 2500.0;

/// Moles in one tile of standard air at 20°C.
pub const MOLES_CELL_STANDARD: f32 = ONE_ATMOSPHERE * CELL_VOLUME / (T20C * R);

/// Compared against a tile's heat capacity when deciding whether it superconducts.
pub const M_CELL_WITH_RATIO: f32 = MOLES_CELL_STANDARD * 0.005;

pub const OXYGEN_STANDARD: f32 = 0.21;
pub const NITROGEN_STANDARD: f32 = 0.79;

/// Anything below this many moles of a species is noise.
pub const GAS_MIN_MOLES: f32 = 0.000_000_05;

pub const MINIMUM_HEAT_CAPACITY: f32 = 0.0003;

pub const MINIMUM_AIR_RATIO_TO_SUSPEND: f32 = 0.1;
pub const MINIMUM_AIR_RATIO_TO_MOVE: f32 = 0.001;
pub const MINIMUM_AIR_TO_SUSPEND: f32 = MOLES_CELL_STANDARD * MINIMUM_AIR_RATIO_TO_SUSPEND;
pub const MINIMUM_MOLES_DELTA_TO_MOVE: f32 = MOLES_CELL_STANDARD * MINIMUM_AIR_RATIO_TO_MOVE;
pub const MINIMUM_TEMPERATURE_TO_MOVE: f32 = T20C + 100.0;
pub const MINIMUM_TEMPERATURE_DELTA_TO_SUSPEND: f32 = 4.0;
pub const MINIMUM_TEMPERATURE_DELTA_TO_CONSIDER: f32 = 0.5;
pub const MINIMUM_TEMPERATURE_FOR_SUPERCONDUCTION: f32 = T20C + 10.0;
pub const MINIMUM_TEMPERATURE_START_SUPERCONDUCTION: f32 = T20C + 200.0;

pub const OPEN_HEAT_TRANSFER_COEFFICIENT: f32 = 0.4;
pub const WINDOW_HEAT_TRANSFER_COEFFICIENT: f32 = 0.1;

/// Heat capacity reported by an empty space mixture so vacuum reads as cold.
pub const HEAT_CAPACITY_VACUUM: f32 = 7000.0;

/// Default solid properties of a floor or wall tile.
pub const TILE_THERMAL_CONDUCTIVITY: f32 = 0.05;
pub const WALL_THERMAL_CONDUCTIVITY: f32 = 0.04;
pub const TILE_HEAT_CAPACITY: f32 = 10_000.0;

pub const EXCITED_GROUP_BREAKDOWN_CYCLES: u32 = 4;
pub const EXCITED_GROUP_DISMANTLE_CYCLES: u32 = 16;

pub const MONSTERMOS_TILE_LIMIT: usize = 100;
pub const MONSTERMOS_HARD_TILE_LIMIT: usize = 2000;

/// Moles that have to rush across a tile before its floor may be torn up.
pub const MONSTERMOS_RIP_TILES_MINIMUM_MOLES: f32 = 20.0;

/// How many work items a stage processes between deadline checks.
pub const LAG_CHECK_ITERATIONS: usize = 30;

// Fire
pub const FIRE_MINIMUM_TEMPERATURE_TO_EXIST: f32 = 100.0 + T0C;
pub const FIRE_MINIMUM_TEMPERATURE_TO_SPREAD: f32 = 150.0 + T0C;
pub const FIRE_SPREAD_RADIOSITY_SCALE: f32 = 0.85;
pub const FIRE_GROWTH_RATE: f32 = 40_000.0;
pub const FIRE_PLASMA_ENERGY_RELEASED: f32 = 160_000.0;
pub const FIRE_HYDROGEN_ENERGY_RELEASED: f32 = 284_000.0;

/// Minimum moles of oxygen and of fuel a hotspot needs to stay lit.
pub const HOTSPOT_MINIMUM_MOLES: f32 = 0.5;

pub const PLASMA_MINIMUM_BURN_TEMPERATURE: f32 = 100.0 + T0C;
pub const PLASMA_UPPER_TEMPERATURE: f32 = 1370.0 + T0C;
pub const PLASMA_OXYGEN_FULLBURN: f32 = 10.0;
pub const PLASMA_BURN_RATE_DELTA: f32 = 9.0;
pub const OXYGEN_BURN_RATE_BASE: f32 = 1.4;

pub const TRITIUM_BURN_OXY_FACTOR: f32 = 100.0;
pub const TRITIUM_BURN_TRIT_FACTOR: f32 = 10.0;
pub const MINIMUM_TRITIUM_OXYBURN_ENERGY: f32 = 143_000.0;

/// Minimum moles of each reactant for a fire reaction to be considered.
pub const FIRE_MINIMUM_REACTANT_MOLES: f32 = 0.01;
