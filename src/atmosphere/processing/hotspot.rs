use std::sync::Arc;

use crate::atmosphere::components::Hotspot;
use crate::atmosphere::constants::*;
use crate::atmosphere::events::TileFire;
use crate::atmosphere::gas::GasType;
use crate::atmosphere::grid::GridAtmosphere;
use crate::atmosphere::reactions::{HolderKind, ReactionContext};

use super::TickBudget;

impl GridAtmosphere {
    pub(super) fn process_hotspots(&mut self, budget: &TickBudget) -> bool {
        if !self.processing_paused {
            self.current_run = self.hotspot_tiles.iter().copied().collect();
        }

        let mut processed = 0;
        while let Some(idx) = self.current_run.pop_front() {
            self.process_hotspot(idx);
            processed += 1;
            if budget.should_pause(processed) {
                return false;
            }
        }
        true
    }

    /// Ignite a tile, or feed an existing fire when `sustain` is set.
    pub(crate) fn hotspot_expose(&mut self, idx: usize, temperature: f32, volume: f32, sustain: bool) {
        let Some(air) = &self.tiles[idx].air else {
            return;
        };
        if air.get_moles(GasType::Oxygen) < HOTSPOT_MINIMUM_MOLES {
            return;
        }
        let has_fuel = air.get_moles(GasType::Plasma) > HOTSPOT_MINIMUM_MOLES
            || air.get_moles(GasType::Tritium) > HOTSPOT_MINIMUM_MOLES;

        let hotspot = &mut self.tiles[idx].hotspot;
        if hotspot.valid {
            if sustain && has_fuel {
                hotspot.temperature = hotspot.temperature.max(temperature);
                hotspot.volume = hotspot.volume.max(volume);
            }
            return;
        }

        if temperature > PLASMA_MINIMUM_BURN_TEMPERATURE && has_fuel {
            *hotspot = Hotspot {
                valid: true,
                skipped_first_process: false,
                bypassing: false,
                temperature,
                volume: volume * 25.0,
                state: 1,
            };
            self.add_active_tile(idx);
            self.hotspot_tiles.insert(idx);
        }
    }

    fn process_hotspot(&mut self, idx: usize) {
        if !self.tiles[idx].hotspot.valid {
            self.hotspot_tiles.remove(&idx);
            return;
        }
        if !self.tiles[idx].excited {
            self.add_active_tile(idx);
        }
        if !self.tiles[idx].hotspot.skipped_first_process {
            self.tiles[idx].hotspot.skipped_first_process = true;
            return;
        }
        if let Some(group) = self.tiles[idx].excited_group {
            self.excited_group_reset_cooldowns(group);
        }

        let tile = &self.tiles[idx];
        let starved = match &tile.air {
            None => true,
            Some(air) => {
                air.get_moles(GasType::Oxygen) < HOTSPOT_MINIMUM_MOLES
                    || (air.get_moles(GasType::Plasma) < HOTSPOT_MINIMUM_MOLES
                        && air.get_moles(GasType::Tritium) < HOTSPOT_MINIMUM_MOLES)
            }
        };
        if starved
            || tile.hotspot.temperature < FIRE_MINIMUM_TEMPERATURE_TO_EXIST
            || tile.hotspot.volume <= 1.0
        {
            self.tiles[idx].hotspot = Hotspot::default();
            self.hotspot_tiles.remove(&idx);
            self.changed_tiles.insert(idx);
            return;
        }

        self.perform_hotspot_exposure(idx);

        let hotspot = self.tiles[idx].hotspot;
        if hotspot.bypassing {
            self.tiles[idx].hotspot.state = 3;
            let air_temperature = self.tiles[idx].air.as_ref().map_or(0.0, |air| air.temperature());
            if air_temperature > FIRE_MINIMUM_TEMPERATURE_TO_SPREAD {
                let radiated = air_temperature * FIRE_SPREAD_RADIOSITY_SCALE;
                let neighbors = self.tiles[idx].adjacent_tiles;
                for other in neighbors.into_iter().flatten() {
                    if !self.tiles[other].hotspot.valid {
                        self.hotspot_expose(other, radiated, CELL_VOLUME / 4.0, false);
                    }
                }
            }
        } else {
            self.tiles[idx].hotspot.state = if hotspot.volume > CELL_VOLUME * 0.4 { 2 } else { 1 };
        }

        let tile = &mut self.tiles[idx];
        if tile.hotspot.temperature > tile.max_fire_temperature_sustained {
            tile.max_fire_temperature_sustained = tile.hotspot.temperature;
        }
        let fire = TileFire {
            grid: self.uid(),
            tile: self.tiles[idx].position,
            temperature: self.tiles[idx].hotspot.temperature,
            volume: self.tiles[idx].hotspot.volume,
        };
        self.outbox.fires.push(fire);
        self.changed_tiles.insert(idx);
    }

    /// Burn the part of the tile's gas the fire covers. Once the fire fills the tile it
    /// burns the whole mixture and starts spreading.
    fn perform_hotspot_exposure(&mut self, idx: usize) {
        let registry = Arc::clone(&self.registry);
        let tile = &mut self.tiles[idx];
        let Some(air) = tile.air.as_mut() else {
            return;
        };
        if !tile.hotspot.valid {
            return;
        }

        tile.hotspot.bypassing =
            tile.hotspot.skipped_first_process && tile.hotspot.volume > air.volume() * 0.95;
        if tile.hotspot.bypassing {
            tile.hotspot.volume = air.fire_result() * FIRE_GROWTH_RATE;
            tile.hotspot.temperature = air.temperature();
            return;
        }

        let mut affected = air.remove_volume(tile.hotspot.volume);
        affected.set_temperature(tile.hotspot.temperature);
        let mut context = ReactionContext::new(HolderKind::Tile);
        registry.react(&mut affected, &mut context);
        tile.hotspot.temperature = affected.temperature();
        tile.hotspot.volume = affected.fire_result() * FIRE_GROWTH_RATE;
        air.merge(&affected, &registry);
    }
}
