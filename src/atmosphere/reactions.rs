use bitflags::bitflags;

use super::constants::*;
use super::gas::{GasMixture, GasRegistry, GasType, GAS_TYPE_COUNT};

bitflags! {
    /// Outcome of one reaction pass. An empty set means nothing reacted.
    #[derive(Debug, Clone, Copy, PartialEq, Eq, Hash)]
    pub struct ReactionResult: u8 {
        const REACTING = 1 << 0;
        const STOP_REACTIONS = 1 << 1;
    }
}

/// Which kind of holder owns the mixture that is reacting.
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub enum HolderKind {
    Tile,
    PipeNet,
    Map,
    Detached,
}

/// Request to ignite a hotspot where the reacting mixture lives.
#[derive(Debug, Clone, Copy, PartialEq)]
pub struct HotspotExposure {
    pub temperature: f32,
    pub volume: f32,
}

/// Per-call state handed to reaction effects.
#[derive(Debug, Clone)]
pub struct ReactionContext {
    holder: HolderKind,
    exposure: Option<HotspotExposure>,
}

impl ReactionContext {
    pub fn new(holder: HolderKind) -> Self {
        Self {
            holder,
            exposure: None,
        }
    }

    pub fn holder(&self) -> HolderKind {
        self.holder
    }

    /// Only tiles can host a hotspot; other holders drop the request.
    pub fn expose_hotspot(&mut self, temperature: f32, volume: f32) {
        if self.holder != HolderKind::Tile {
            return;
        }
        match &mut self.exposure {
            Some(existing) if existing.temperature >= temperature => {}
            slot => *slot = Some(HotspotExposure { temperature, volume }),
        }
    }

    pub fn take_hotspot_exposure(&mut self) -> Option<HotspotExposure> {
        self.exposure.take()
    }
}

pub type ReactionEffect = fn(&mut GasMixture, &GasRegistry, &mut ReactionContext) -> ReactionResult;

/// A gas-phase reaction and the conditions it needs.
#[derive(Debug, Clone)]
pub struct GasReactionPrototype {
    pub id: &'static str,
    /// Higher priority reactions run first.
    pub priority: i32,
    pub minimum_temperature: f32,
    pub maximum_temperature: f32,
    pub minimum_energy: f32,
    /// Minimum moles per species, indexed by [`GasType::index`].
    pub minimum_requirements: [f32; GAS_TYPE_COUNT],
    pub effect: ReactionEffect,
}

impl GasReactionPrototype {
    fn applies_to(&self, mixture: &GasMixture, energy: f32) -> bool {
        let temperature = mixture.temperature();
        if energy < self.minimum_energy
            || temperature < self.minimum_temperature
            || temperature > self.maximum_temperature
        {
            return false;
        }
        mixture
            .moles()
            .iter()
            .zip(self.minimum_requirements.iter())
            .all(|(moles, required)| moles >= required)
    }
}

impl GasRegistry {
    /// Run every applicable reaction on `mixture` in priority order.
    ///
    /// The result is the union of every reaction's result, and
    /// [`fire_result`](GasMixture::fire_result) totals what all of them burned.
    pub fn react(&self, mixture: &mut GasMixture, context: &mut ReactionContext) -> ReactionResult {
        let mut result = ReactionResult::empty();
        if mixture.is_immutable() {
            return result;
        }
        mixture.fire_result = 0.0;

        let energy = mixture.thermal_energy(self);
        for reaction in self.reactions() {
            if !reaction.applies_to(mixture, energy) {
                continue;
            }
            result |= (reaction.effect)(mixture, self, context);
            if result.contains(ReactionResult::STOP_REACTIONS) {
                break;
            }
        }
        result
    }
}

pub fn standard_reactions() -> Vec<GasReactionPrototype> {
    let mut plasma = [0.0; GAS_TYPE_COUNT];
    plasma[GasType::Oxygen.index()] = FIRE_MINIMUM_REACTANT_MOLES;
    plasma[GasType::Plasma.index()] = FIRE_MINIMUM_REACTANT_MOLES;

    let mut tritium = [0.0; GAS_TYPE_COUNT];
    tritium[GasType::Oxygen.index()] = FIRE_MINIMUM_REACTANT_MOLES;
    tritium[GasType::Tritium.index()] = FIRE_MINIMUM_REACTANT_MOLES;

    vec![
        GasReactionPrototype {
            id: "PlasmaFire",
            priority: -2,
            minimum_temperature: FIRE_MINIMUM_TEMPERATURE_TO_EXIST,
            maximum_temperature: f32::MAX,
            minimum_energy: 0.0,
            minimum_requirements: plasma,
            effect: plasma_fire,
        },
        GasReactionPrototype {
            id: "TritiumFire",
            priority: -1,
            minimum_temperature: FIRE_MINIMUM_TEMPERATURE_TO_EXIST,
            maximum_temperature: f32::MAX,
            minimum_energy: 0.0,
            minimum_requirements: tritium,
            effect: tritium_fire,
        },
    ]
}

fn finish_fire(
    mixture: &mut GasMixture,
    registry: &GasRegistry,
    context: &mut ReactionContext,
    temperature: f32,
    old_capacity: f32,
    energy_released: f32,
    burned: f32,
) -> ReactionResult {
    if energy_released > 0.0 {
        let new_capacity = mixture.heat_capacity(registry);
        if new_capacity > MINIMUM_HEAT_CAPACITY {
            mixture.set_temperature((temperature * old_capacity + energy_released) / new_capacity);
        }
    }

    let temperature = mixture.temperature();
    if temperature > FIRE_MINIMUM_TEMPERATURE_TO_EXIST {
        context.expose_hotspot(temperature, mixture.volume());
    }

    if burned > 0.0 {
        mixture.fire_result += burned;
        ReactionResult::REACTING
    } else {
        ReactionResult::empty()
    }
}

/// Plasma + oxygen -> carbon dioxide. Burns faster the hotter it gets.
fn plasma_fire(
    mixture: &mut GasMixture,
    registry: &GasRegistry,
    context: &mut ReactionContext,
) -> ReactionResult {
    let old_capacity = mixture.heat_capacity(registry);
    let temperature = mixture.temperature();
    let mut energy_released = 0.0;
    let mut burned = 0.0;

    let temperature_scale = if temperature > PLASMA_UPPER_TEMPERATURE {
        1.0
    } else {
        (temperature - PLASMA_MINIMUM_BURN_TEMPERATURE)
            / (PLASMA_UPPER_TEMPERATURE - PLASMA_MINIMUM_BURN_TEMPERATURE)
    };

    if temperature_scale > 0.0 {
        let oxygen = mixture.get_moles(GasType::Oxygen);
        let plasma = mixture.get_moles(GasType::Plasma);
        let oxygen_burn_rate = OXYGEN_BURN_RATE_BASE - temperature_scale;

        let mut plasma_burn_rate = if oxygen > plasma * PLASMA_OXYGEN_FULLBURN {
            plasma * temperature_scale / PLASMA_BURN_RATE_DELTA
        } else {
            temperature_scale * (oxygen / PLASMA_OXYGEN_FULLBURN) / PLASMA_BURN_RATE_DELTA
        };

        if plasma_burn_rate > MINIMUM_HEAT_CAPACITY {
            plasma_burn_rate = plasma_burn_rate.min(plasma).min(oxygen / oxygen_burn_rate);
            mixture.set_moles(GasType::Plasma, plasma - plasma_burn_rate);
            mixture.set_moles(GasType::Oxygen, oxygen - plasma_burn_rate * oxygen_burn_rate);
            mixture.adjust_moles(GasType::CarbonDioxide, plasma_burn_rate);

            energy_released += FIRE_PLASMA_ENERGY_RELEASED * plasma_burn_rate / registry.heat_scale();
            burned = plasma_burn_rate * (1.0 + oxygen_burn_rate);
        }
    }

    finish_fire(mixture, registry, context, temperature, old_capacity, energy_released, burned)
}

/// Tritium + oxygen -> water vapour.
fn tritium_fire(
    mixture: &mut GasMixture,
    registry: &GasRegistry,
    context: &mut ReactionContext,
) -> ReactionResult {
    let old_capacity = mixture.heat_capacity(registry);
    let temperature = mixture.temperature();
    let mut energy_released = 0.0;

    let initial_tritium = mixture.get_moles(GasType::Tritium);
    let oxygen = mixture.get_moles(GasType::Oxygen);
    let burned_fuel;

    if oxygen < initial_tritium
        || MINIMUM_TRITIUM_OXYBURN_ENERGY > temperature * old_capacity * registry.heat_scale()
    {
        burned_fuel = (oxygen / TRITIUM_BURN_OXY_FACTOR).min(initial_tritium);
        mixture.adjust_moles(GasType::Tritium, -burned_fuel);
    } else {
        burned_fuel = initial_tritium;
        let remaining = initial_tritium * (1.0 - 1.0 / TRITIUM_BURN_TRIT_FACTOR);
        mixture.set_moles(GasType::Tritium, remaining);
        mixture.adjust_moles(GasType::Oxygen, -remaining);
        energy_released +=
            FIRE_HYDROGEN_ENERGY_RELEASED * burned_fuel * (TRITIUM_BURN_TRIT_FACTOR - 1.0);
    }

    if burned_fuel > 0.0 {
        energy_released += FIRE_HYDROGEN_ENERGY_RELEASED * burned_fuel;
        mixture.adjust_moles(GasType::WaterVapor, burned_fuel);
    }
    energy_released /= registry.heat_scale();

    finish_fire(mixture, registry, context, temperature, old_capacity, energy_released, burned_fuel)
}
