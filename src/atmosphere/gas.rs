use serde::{Deserialize, Serialize};

use super::constants::*;
use super::reactions::{standard_reactions, GasReactionPrototype};

/// Gas type enumeration
#[derive(Debug, Clone, Copy, PartialEq, Eq, PartialOrd, Ord, Hash, Serialize, Deserialize)]
#[repr(usize)]
pub enum GasType {
    Oxygen = 0,
    Nitrogen = 1,
    CarbonDioxide = 2,
    Plasma = 3,
    NitrousOxide = 4,
    WaterVapor = 5,
    Tritium = 6,
}

pub const GAS_TYPE_COUNT: usize = 7;

impl GasType {
    pub const ALL: [GasType; GAS_TYPE_COUNT] = [
        GasType::Oxygen,
        GasType::Nitrogen,
        GasType::CarbonDioxide,
        GasType::Plasma,
        GasType::NitrousOxide,
        GasType::WaterVapor,
        GasType::Tritium,
    ];

    #[inline]
    pub fn index(self) -> usize {
        self as usize
    }

    pub fn from_index(index: usize) -> Option<Self> {
        Self::ALL.get(index).copied()
    }
}

/// Static per-species data.
#[derive(Debug, Clone, PartialEq)]
pub struct GasProperties {
    pub name: &'static str,
    /// Specific heat [J/(mol·K)]
    pub specific_heat: f32,
    /// Molar mass [g/mol]
    pub molar_mass: f32,
}

/// Immutable gas species table and reaction list.
///
/// One registry is built at startup and shared by every grid, pipe network and the driver
/// through an `Arc`, so tests can inject a fixed table.
#[derive(Debug, Clone)]
pub struct GasRegistry {
    gases: [GasProperties; GAS_TYPE_COUNT],
    /// Specific heats after heat scaling, indexed by [`GasType::index`].
    specific_heats: [f32; GAS_TYPE_COUNT],
    heat_scale: f32,
    reactions: Vec<GasReactionPrototype>,
}

impl Default for GasRegistry {
    fn default() -> Self {
        Self::new(standard_gases(), standard_reactions(), 1.0)
    }
}

impl GasRegistry {
    /// Build a registry. Reactions are ordered by descending priority; `heat_scale` speeds
    /// up thermal processes by dividing every specific heat.
    pub fn new(
        gases: [GasProperties; GAS_TYPE_COUNT],
        mut reactions: Vec<GasReactionPrototype>,
        heat_scale: f32,
    ) -> Self {
        let heat_scale = if heat_scale > 0.0 { heat_scale } else { 1.0 };
        reactions.sort_by(|a, b| b.priority.cmp(&a.priority));
        let specific_heats = std::array::from_fn(|i| gases[i].specific_heat / heat_scale);
        Self {
            gases,
            specific_heats,
            heat_scale,
            reactions,
        }
    }

    pub fn properties(&self, gas: GasType) -> &GasProperties {
        &self.gases[gas.index()]
    }

    #[inline]
    pub fn specific_heat(&self, gas: GasType) -> f32 {
        self.specific_heats[gas.index()]
    }

    pub fn molar_mass(&self, gas: GasType) -> f32 {
        self.gases[gas.index()].molar_mass
    }

    pub fn heat_scale(&self) -> f32 {
        self.heat_scale
    }

    pub fn reactions(&self) -> &[GasReactionPrototype] {
        &self.reactions
    }
}

pub fn standard_gases() -> [GasProperties; GAS_TYPE_COUNT] {
    [
        GasProperties { name: "Oxygen", specific_heat: 20.0, molar_mass: 32.0 },
        GasProperties { name: "Nitrogen", specific_heat: 30.0, molar_mass: 28.0 },
        GasProperties { name: "Carbon Dioxide", specific_heat: 30.0, molar_mass: 44.0 },
        GasProperties { name: "Plasma", specific_heat: 200.0, molar_mass: 120.0 },
        GasProperties { name: "Nitrous Oxide", specific_heat: 40.0, molar_mass: 44.0 },
        GasProperties { name: "Water Vapor", specific_heat: 40.0, molar_mass: 18.0 },
        GasProperties { name: "Tritium", specific_heat: 10.0, molar_mass: 6.0 },
    ]
}

/// Result of [`GasMixture::compare`].
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub enum GasCompareResult {
    NoExchange,
    TemperatureExchange,
    /// The first species whose mole delta is worth moving.
    Gas(GasType),
}

/// What a single [`GasMixture::share`] call moved.
#[derive(Debug, Clone, Copy, Default, PartialEq)]
pub struct ShareOutcome {
    /// Pressure difference [kPa] driving space wind; zero when the exchange was trivial.
    pub pressure_difference: f32,
    /// Net moles moved from the receiver to the sharer.
    pub moved_moles: f32,
    /// Sum of absolute per-species moles moved.
    pub abs_moved_moles: f32,
}

/// Gas mixture held by a tile, a pipe network or a map.
///
/// Moles are per species in mol, temperature in K, volume in L. Pressure and heat capacity
/// are always derived, never stored.
#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
pub struct GasMixture {
    moles: [f32; GAS_TYPE_COUNT],
    temperature: f32,
    volume: f32,
    #[serde(default, skip_serializing_if = "std::ops::Not::not")]
    immutable: bool,
    #[serde(skip)]
    pub(crate) temperature_archived: f32,
    #[serde(skip)]
    moles_archived: [f32; GAS_TYPE_COUNT],
    /// Moles burned by the most recent fire reaction.
    #[serde(skip)]
    pub(crate) fire_result: f32,
}

impl Default for GasMixture {
    fn default() -> Self {
        Self::new(CELL_VOLUME, TCMB)
    }
}

impl GasMixture {
    /// Create an empty mixture
    pub fn new(volume: f32, temperature: f32) -> Self {
        Self {
            moles: [0.0; GAS_TYPE_COUNT],
            temperature: temperature.max(0.0),
            volume: volume.max(0.0),
            immutable: false,
            temperature_archived: temperature.max(0.0),
            moles_archived: [0.0; GAS_TYPE_COUNT],
            fire_result: 0.0,
        }
    }

    /// Create breathable station air at one atmosphere.
    pub fn new_air(volume: f32, temperature: f32) -> Self {
        let mut mixture = Self::new(volume, temperature);
        if temperature <= 0.0 {
            return mixture;
        }

        // n = PV / RT
        let total = ONE_ATMOSPHERE * volume / (R * temperature);
        mixture.moles[GasType::Oxygen.index()] = total * OXYGEN_STANDARD;
        mixture.moles[GasType::Nitrogen.index()] = total * NITROGEN_STANDARD;
        mixture
    }

    /// The read-only vacuum of space.
    pub fn space() -> Self {
        let mut mixture = Self::new(CELL_VOLUME, TCMB);
        mixture.immutable = true;
        mixture
    }

    pub fn with_moles(mut self, gas: GasType, moles: f32) -> Self {
        self.set_moles(gas, moles);
        self
    }

    pub fn is_immutable(&self) -> bool {
        self.immutable
    }

    /// Freeze the mixture; every later mutation is ignored.
    pub fn mark_immutable(&mut self) {
        self.immutable = true;
    }

    pub fn volume(&self) -> f32 {
        self.volume
    }

    pub fn set_volume(&mut self, volume: f32) {
        self.volume = volume.max(0.0);
    }

    pub fn temperature(&self) -> f32 {
        self.temperature
    }

    pub fn set_temperature(&mut self, temperature: f32) {
        if self.immutable || !temperature.is_finite() {
            return;
        }
        self.temperature = temperature.max(0.0);
    }

    pub fn temperature_archived(&self) -> f32 {
        self.temperature_archived
    }

    /// Moles burned by the last fire reaction on this mixture.
    pub fn fire_result(&self) -> f32 {
        self.fire_result
    }

    pub fn moles(&self) -> &[f32; GAS_TYPE_COUNT] {
        &self.moles
    }

    /// Get moles of a specific gas
    #[inline]
    pub fn get_moles(&self, gas: GasType) -> f32 {
        self.moles[gas.index()]
    }

    pub fn set_moles(&mut self, gas: GasType, moles: f32) {
        if self.immutable || !moles.is_finite() {
            return;
        }
        self.moles[gas.index()] = moles.max(0.0);
    }

    pub fn adjust_moles(&mut self, gas: GasType, delta: f32) {
        let current = self.get_moles(gas);
        self.set_moles(gas, current + delta);
    }

    /// Remove every mole of `gas` and return how much was taken.
    pub fn scrub(&mut self, gas: GasType) -> f32 {
        if self.immutable {
            return 0.0;
        }
        std::mem::take(&mut self.moles[gas.index()])
    }

    /// Calculate total moles
    pub fn total_moles(&self) -> f32 {
        self.moles.iter().sum()
    }

    /// Pressure in kPa; zero for a zero-volume sentinel.
    pub fn pressure(&self) -> f32 {
        if self.volume <= 0.0 {
            return 0.0;
        }
        self.total_moles() * R * self.temperature / self.volume
    }

    /// Heat capacity [J/K], never below [`MINIMUM_HEAT_CAPACITY`].
    pub fn heat_capacity(&self, registry: &GasRegistry) -> f32 {
        let total = self.raw_heat_capacity(registry);
        if self.immutable && total <= MINIMUM_HEAT_CAPACITY {
            return HEAT_CAPACITY_VACUUM;
        }
        total.max(MINIMUM_HEAT_CAPACITY)
    }

    pub(crate) fn raw_heat_capacity(&self, registry: &GasRegistry) -> f32 {
        GasType::ALL
            .iter()
            .map(|&gas| self.moles[gas.index()] * registry.specific_heat(gas))
            .sum()
    }

    /// Mass of the gas [g]
    pub fn mass(&self, registry: &GasRegistry) -> f32 {
        GasType::ALL
            .iter()
            .map(|&gas| self.moles[gas.index()] * registry.molar_mass(gas))
            .sum()
    }

    /// Thermal energy [J]
    pub fn thermal_energy(&self, registry: &GasRegistry) -> f32 {
        self.temperature * self.raw_heat_capacity(registry)
    }

    /// Snapshot the moles and temperature used by this tick's exchanges.
    pub fn archive(&mut self) {
        self.temperature_archived = self.temperature;
        self.moles_archived = self.moles;
    }

    pub fn moles_archived(&self) -> &[f32; GAS_TYPE_COUNT] {
        &self.moles_archived
    }

    pub fn is_finite(&self) -> bool {
        self.temperature.is_finite() && self.moles.iter().all(|m| m.is_finite())
    }

    /// Add `giver`'s moles to this mixture at the energy-weighted temperature.
    pub fn merge(&mut self, giver: &GasMixture, registry: &GasRegistry) {
        if self.immutable {
            return;
        }

        let receiver_capacity = self.raw_heat_capacity(registry);
        let giver_capacity = giver.raw_heat_capacity(registry);
        let combined = receiver_capacity + giver_capacity;
        if combined > MINIMUM_HEAT_CAPACITY {
            self.temperature = (giver.temperature * giver_capacity
                + self.temperature * receiver_capacity)
                / combined;
        }

        for (mine, theirs) in self.moles.iter_mut().zip(giver.moles.iter()) {
            *mine += theirs;
        }
    }

    /// Take `ratio` of every species out into a new mixture of the same volume.
    pub fn remove_ratio(&mut self, ratio: f32) -> GasMixture {
        let mut removed = GasMixture::new(self.volume, self.temperature);
        if !(ratio > 0.0) {
            return removed;
        }
        let ratio = ratio.min(1.0);

        for (i, moles) in self.moles.iter_mut().enumerate() {
            let mut taken = *moles * ratio;
            if taken < GAS_MIN_MOLES {
                taken = 0.0;
            }
            removed.moles[i] = taken;
            if !self.immutable {
                *moles -= taken;
                if *moles < GAS_MIN_MOLES {
                    *moles = 0.0;
                }
            }
        }
        removed
    }

    /// Take `amount` moles, spread over species by their fractions.
    pub fn remove(&mut self, amount: f32) -> GasMixture {
        let total = self.total_moles();
        if total <= 0.0 {
            return GasMixture::new(self.volume, self.temperature);
        }
        self.remove_ratio(amount / total)
    }

    pub fn remove_volume(&mut self, volume: f32) -> GasMixture {
        if self.volume <= 0.0 {
            return GasMixture::new(volume, self.temperature);
        }
        self.remove_ratio(volume / self.volume)
    }

    pub fn multiply(&mut self, factor: f32) {
        if self.immutable || !factor.is_finite() {
            return;
        }
        let factor = factor.max(0.0);
        for moles in &mut self.moles {
            *moles *= factor;
        }
    }

    pub fn clear(&mut self) {
        if self.immutable {
            return;
        }
        self.moles = [0.0; GAS_TYPE_COUNT];
    }

    /// Copy moles and temperature, keeping this mixture's volume.
    pub fn copy_from(&mut self, other: &GasMixture) {
        if self.immutable {
            return;
        }
        self.moles = other.moles;
        self.temperature = other.temperature;
    }

    /// Decide whether two mixtures differ enough to be worth exchanging.
    pub fn compare(&self, other: &GasMixture) -> GasCompareResult {
        let mut moles = 0.0;
        for gas in GasType::ALL {
            let gas_moles = self.moles[gas.index()];
            let delta = (gas_moles - other.moles[gas.index()]).abs();
            if delta > MINIMUM_MOLES_DELTA_TO_MOVE && delta > gas_moles * MINIMUM_AIR_RATIO_TO_MOVE {
                return GasCompareResult::Gas(gas);
            }
            moles += gas_moles;
        }

        if moles > MINIMUM_MOLES_DELTA_TO_MOVE
            && (self.temperature - other.temperature).abs() > MINIMUM_TEMPERATURE_DELTA_TO_SUSPEND
        {
            return GasCompareResult::TemperatureExchange;
        }

        GasCompareResult::NoExchange
    }

    /// Move `factor` of the concentration-weighted mole delta from `self` toward `sharer`,
    /// carrying the matching heat along.
    ///
    /// The delta is taken from this side's archived moles against the sharer's live moles, and
    /// heat from archived temperatures on both sides, so call [`archive`](Self::archive) at
    /// the start of the tick. Gas this side received earlier in the tick is not passed on
    /// until the next one. Immutable sides act as infinite reservoirs.
    pub fn share(
        &mut self,
        sharer: &mut GasMixture,
        factor: f32,
        registry: &GasRegistry,
    ) -> ShareOutcome {
        let total_volume = self.volume + sharer.volume;
        if total_volume <= 0.0 || !(factor > 0.0) {
            return ShareOutcome::default();
        }

        let temperature_delta = self.temperature_archived - sharer.temperature_archived;
        let consider_heat = temperature_delta.abs() > MINIMUM_TEMPERATURE_DELTA_TO_CONSIDER;

        let (old_capacity, old_sharer_capacity) = if consider_heat {
            (self.heat_capacity(registry), sharer.heat_capacity(registry))
        } else {
            (0.0, 0.0)
        };

        let mut capacity_to_sharer = 0.0;
        let mut capacity_from_sharer = 0.0;
        let mut moved_moles = 0.0;
        let mut abs_moved_moles = 0.0;

        for gas in GasType::ALL {
            let i = gas.index();
            let mut delta = factor * 2.0
                * (self.moles_archived[i] * sharer.volume - sharer.moles[i] * self.volume)
                / total_volume;
            // Never move more than the giving side holds right now.
            if delta > 0.0 && !self.immutable {
                delta = delta.min(self.moles[i]);
            } else if delta < 0.0 && !sharer.immutable {
                delta = delta.max(-sharer.moles[i]);
            }
            if !(delta.abs() >= GAS_MIN_MOLES) {
                continue;
            }

            if consider_heat {
                let gas_capacity = delta * registry.specific_heat(gas);
                if delta > 0.0 {
                    capacity_to_sharer += gas_capacity;
                } else {
                    capacity_from_sharer -= gas_capacity;
                }
            }

            if !self.immutable {
                self.moles[i] = (self.moles[i] - delta).max(0.0);
            }
            if !sharer.immutable {
                sharer.moles[i] = (sharer.moles[i] + delta).max(0.0);
            }
            moved_moles += delta;
            abs_moved_moles += delta.abs();
        }

        if consider_heat {
            let new_capacity = old_capacity + capacity_from_sharer - capacity_to_sharer;
            let new_sharer_capacity = old_sharer_capacity + capacity_to_sharer - capacity_from_sharer;

            if !self.immutable && new_capacity > MINIMUM_HEAT_CAPACITY {
                self.temperature = (old_capacity * self.temperature
                    - capacity_to_sharer * self.temperature_archived
                    + capacity_from_sharer * sharer.temperature_archived)
                    / new_capacity;
            }
            if !sharer.immutable && new_sharer_capacity > MINIMUM_HEAT_CAPACITY {
                sharer.temperature = (old_sharer_capacity * sharer.temperature
                    - capacity_from_sharer * sharer.temperature_archived
                    + capacity_to_sharer * self.temperature_archived)
                    / new_sharer_capacity;
            }

            if old_sharer_capacity.abs() > MINIMUM_HEAT_CAPACITY
                && (new_sharer_capacity / old_sharer_capacity - 1.0).abs() < 0.1
            {
                self.temperature_share(sharer, OPEN_HEAT_TRANSFER_COEFFICIENT, registry);
            }
        }

        let mut outcome = ShareOutcome {
            pressure_difference: 0.0,
            moved_moles,
            abs_moved_moles,
        };

        if !(temperature_delta > MINIMUM_TEMPERATURE_TO_MOVE)
            && !(moved_moles.abs() > MINIMUM_MOLES_DELTA_TO_MOVE)
        {
            return outcome;
        }
        if self.volume > 0.0 {
            let moles = self.total_moles();
            let their_moles = sharer.total_moles();
            outcome.pressure_difference = (self.temperature_archived * (moles + moved_moles)
                - sharer.temperature_archived * (their_moles - moved_moles))
                * R
                / self.volume;
        }
        outcome
    }

    /// Heat-only exchange between two mixtures. Returns the sharer's new temperature.
    pub fn temperature_share(
        &mut self,
        sharer: &mut GasMixture,
        coefficient: f32,
        registry: &GasRegistry,
    ) -> f32 {
        let delta = self.temperature_archived - sharer.temperature_archived;
        if delta.abs() <= MINIMUM_TEMPERATURE_DELTA_TO_CONSIDER {
            return sharer.temperature;
        }

        let capacity = self.heat_capacity(registry);
        let sharer_capacity = sharer.heat_capacity(registry);
        if capacity <= MINIMUM_HEAT_CAPACITY || sharer_capacity <= MINIMUM_HEAT_CAPACITY {
            return sharer.temperature;
        }

        let heat = coefficient * delta * (capacity * sharer_capacity / (capacity + sharer_capacity));
        if !self.immutable {
            self.temperature = (self.temperature - heat / capacity).max(TCMB);
        }
        if !sharer.immutable {
            sharer.temperature = (sharer.temperature + heat / sharer_capacity).max(TCMB);
        }
        sharer.temperature
    }

    /// Heat exchange with a solid of the given temperature and heat capacity. Returns the
    /// solid's new temperature.
    pub fn temperature_share_with_solid(
        &mut self,
        coefficient: f32,
        solid_temperature: f32,
        solid_capacity: f32,
        registry: &GasRegistry,
    ) -> f32 {
        let delta = self.temperature_archived - solid_temperature;
        if delta.abs() <= MINIMUM_TEMPERATURE_DELTA_TO_CONSIDER {
            return solid_temperature;
        }

        let capacity = self.heat_capacity(registry);
        if solid_capacity <= 0.0 || capacity <= MINIMUM_HEAT_CAPACITY {
            return solid_temperature;
        }

        let heat = coefficient * delta * (capacity * solid_capacity / (capacity + solid_capacity));
        if !self.immutable {
            self.temperature = (self.temperature - heat / capacity).max(TCMB);
        }
        (solid_temperature + heat / solid_capacity).max(TCMB)
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    fn registry() -> GasRegistry {
        GasRegistry::default()
    }

    fn assert_close(actual: f32, expected: f32, tolerance: f32, what: &str) {
        assert!(
            (actual - expected).abs() <= tolerance,
            "{}: expected {} ± {}, got {}",
            what,
            expected,
            tolerance,
            actual
        );
    }

    #[test]
    fn test_gas_mixture_pressure() {
        let mixture = GasMixture::new_air(CELL_VOLUME, T20C);
        assert_close(mixture.pressure(), ONE_ATMOSPHERE, 0.01, "standard air pressure");
        assert_close(mixture.total_moles(), MOLES_CELL_STANDARD, 0.01, "standard air moles");
    }

    #[test]
    fn test_total_moles() {
        let mut mixture = GasMixture::new(CELL_VOLUME, T20C);
        mixture.adjust_moles(GasType::Oxygen, 1.0);
        mixture.adjust_moles(GasType::Nitrogen, 2.0);

        assert_eq!(mixture.total_moles(), 3.0);
    }

    #[test]
    fn zero_volume_has_zero_pressure() {
        let mixture = GasMixture::new(0.0, T20C).with_moles(GasType::Oxygen, 10.0);
        assert_eq!(mixture.pressure(), 0.0);
    }

    #[test]
    fn mutation_clamps_at_zero() {
        let mut mixture = GasMixture::new(CELL_VOLUME, T20C).with_moles(GasType::Plasma, 1.0);
        mixture.adjust_moles(GasType::Plasma, -5.0);
        assert_eq!(mixture.get_moles(GasType::Plasma), 0.0);

        mixture.set_moles(GasType::Oxygen, f32::NAN);
        assert_eq!(mixture.get_moles(GasType::Oxygen), 0.0);

        assert_eq!(mixture.scrub(GasType::Plasma), 0.0);
    }

    #[test]
    fn merge_conserves_moles_and_energy() {
        let registry = registry();
        let mut hot = GasMixture::new(CELL_VOLUME, 500.0).with_moles(GasType::Oxygen, 20.0);
        let cold = GasMixture::new(CELL_VOLUME, 250.0)
            .with_moles(GasType::Nitrogen, 40.0)
            .with_moles(GasType::Plasma, 1.0);

        let energy_before = hot.thermal_energy(&registry) + cold.thermal_energy(&registry);
        hot.merge(&cold, &registry);

        assert_close(hot.total_moles(), 61.0, 1e-4, "merged moles");
        assert_close(hot.thermal_energy(&registry), energy_before, energy_before * 1e-5, "merged energy");
        assert_eq!(cold.total_moles(), 41.0, "merge must not drain the giver");
    }

    #[test]
    fn immutable_mixture_ignores_mutation() {
        let registry = registry();
        let mut space = GasMixture::space();
        space.merge(&GasMixture::new_air(CELL_VOLUME, T20C), &registry);
        space.adjust_moles(GasType::Oxygen, 5.0);
        space.set_temperature(500.0);

        assert_eq!(space.total_moles(), 0.0);
        assert_eq!(space.temperature(), TCMB);
        assert_eq!(space.heat_capacity(&registry), HEAT_CAPACITY_VACUUM);
    }

    #[test]
    fn share_conserves_moles_and_energy() {
        let registry = registry();
        let mut a = GasMixture::new_air(CELL_VOLUME, 400.0);
        let mut b = GasMixture::new(CELL_VOLUME, 280.0).with_moles(GasType::Nitrogen, 30.0);
        a.archive();
        b.archive();

        let moles_before = a.total_moles() + b.total_moles();
        let energy_before = a.thermal_energy(&registry) + b.thermal_energy(&registry);

        let outcome = a.share(&mut b, 0.25, &registry);

        assert!(outcome.moved_moles > 0.0, "gas should flow from the fuller side");
        assert_close(a.total_moles() + b.total_moles(), moles_before, 1e-3, "moles after share");
        assert_close(
            a.thermal_energy(&registry) + b.thermal_energy(&registry),
            energy_before,
            energy_before * 1e-4,
            "energy after share",
        );
    }

    #[test]
    fn share_moves_factor_of_delta_for_equal_volumes() {
        let registry = registry();
        let mut a = GasMixture::new(CELL_VOLUME, T20C).with_moles(GasType::Oxygen, 100.0);
        let mut b = GasMixture::new(CELL_VOLUME, T20C);
        a.archive();
        b.archive();

        let outcome = a.share(&mut b, 0.2, &registry);

        assert_close(outcome.moved_moles, 20.0, 1e-4, "moved moles");
        assert_close(a.get_moles(GasType::Oxygen), 80.0, 1e-4, "receiver left");
        assert_close(b.get_moles(GasType::Oxygen), 20.0, 1e-4, "sharer got");
        assert!(outcome.pressure_difference > 0.0);
    }

    #[test]
    fn share_passes_on_only_what_was_archived() {
        let registry = registry();
        let mut middle = GasMixture::new(CELL_VOLUME, T20C).with_moles(GasType::Oxygen, 20.0);
        let mut far = GasMixture::new(CELL_VOLUME, T20C).with_moles(GasType::Oxygen, 20.0);
        middle.archive();
        far.archive();
        middle.adjust_moles(GasType::Oxygen, 60.0);

        let outcome = middle.share(&mut far, 0.25, &registry);

        assert_eq!(outcome.abs_moved_moles, 0.0);
        assert_eq!(far.get_moles(GasType::Oxygen), 20.0);
        assert_eq!(middle.moles_archived()[GasType::Oxygen.index()], 20.0);
    }

    #[test]
    fn share_with_space_drains_without_filling_space() {
        let registry = registry();
        let mut air = GasMixture::new_air(CELL_VOLUME, T20C);
        let mut space = GasMixture::space();
        air.archive();
        space.archive();

        let before = air.total_moles();
        air.share(&mut space, 0.05, &registry);

        assert!(air.total_moles() < before);
        assert_eq!(space.total_moles(), 0.0);
        assert!(air.temperature() < T20C, "vacuum should cool the tile");
    }

    #[test]
    fn compare_detects_each_kind_of_difference() {
        let a = GasMixture::new_air(CELL_VOLUME, T20C);
        assert_eq!(a.compare(&a.clone()), GasCompareResult::NoExchange);

        let mut richer = a.clone();
        richer.adjust_moles(GasType::Plasma, 5.0);
        assert_eq!(a.compare(&richer), GasCompareResult::Gas(GasType::Plasma));

        let mut hotter = a.clone();
        hotter.set_temperature(T20C + 50.0);
        assert_eq!(a.compare(&hotter), GasCompareResult::TemperatureExchange);
    }

    #[test]
    fn remove_takes_proportional_share() {
        let mut air = GasMixture::new_air(CELL_VOLUME, T20C);
        let total = air.total_moles();

        let removed = air.remove(total / 4.0);

        assert_close(removed.total_moles(), total / 4.0, 1e-3, "removed");
        assert_close(air.total_moles(), total * 0.75, 1e-3, "left");
        assert_close(
            removed.get_moles(GasType::Oxygen) / removed.total_moles(),
            OXYGEN_STANDARD,
            1e-4,
            "oxygen fraction",
        );

        let everything = air.remove(total * 10.0);
        assert_close(everything.total_moles(), total * 0.75, 1e-3, "clamped removal");
        assert_eq!(air.total_moles(), 0.0);
    }

    #[test]
    fn temperature_share_with_solid_moves_heat_both_ways() {
        let registry = registry();
        let mut air = GasMixture::new_air(CELL_VOLUME, 600.0);
        air.archive();

        let solid = air.temperature_share_with_solid(0.5, T20C, TILE_HEAT_CAPACITY, &registry);

        assert!(solid > T20C);
        assert!(air.temperature() < 600.0);
    }

    #[test]
    fn mass_follows_molar_masses() {
        let registry = registry();
        let mixture = GasMixture::new(CELL_VOLUME, T20C)
            .with_moles(GasType::Oxygen, 2.0)
            .with_moles(GasType::WaterVapor, 1.0);
        assert_eq!(mixture.mass(&registry), 82.0);
        assert_eq!(registry.properties(GasType::Plasma).name, "Plasma");
    }

    #[test]
    fn heat_scale_divides_specific_heats() {
        let fast = GasRegistry::new(standard_gases(), Vec::new(), 4.0);
        assert_eq!(fast.specific_heat(GasType::Plasma), 50.0);
        assert_eq!(fast.heat_scale(), 4.0);
    }
}
