use std::sync::Arc;

use crate::atmosphere::constants::*;
use crate::atmosphere::direction::{AtmosDirection, DIRECTION_COUNT};
use crate::atmosphere::grid::{pair_mut, GridAtmosphere};

use super::TickBudget;

impl GridAtmosphere {
    pub(super) fn process_superconductivity(&mut self, budget: &TickBudget) -> bool {
        if !self.processing_paused {
            self.current_run = self.superconductivity_tiles.iter().copied().collect();
        }

        let mut processed = 0;
        while let Some(idx) = self.current_run.pop_front() {
            self.superconduct(idx);
            processed += 1;
            if budget.should_pause(processed) {
                return false;
            }
        }
        true
    }

    /// Start conducting heat through a hot tile's structure. Returns true when it joined the
    /// superconducting set.
    pub(crate) fn consider_superconductivity(&mut self, idx: usize, starting: bool) -> bool {
        let threshold = if starting {
            MINIMUM_TEMPERATURE_START_SUPERCONDUCTION
        } else {
            MINIMUM_TEMPERATURE_FOR_SUPERCONDUCTION
        };
        let tile = &self.tiles[idx];
        let Some(air) = &tile.air else {
            return false;
        };
        if air.temperature() < threshold || air.heat_capacity(&self.registry) < M_CELL_WITH_RATIO {
            return false;
        }
        self.join_superconduction(idx)
    }

    fn join_superconduction(&mut self, idx: usize) -> bool {
        if !self.config.superconduction || self.tiles[idx].thermal_conductivity == 0.0 {
            return false;
        }
        self.superconductivity_tiles.insert(idx);
        true
    }

    /// Directions heat leaves through: everywhere for solid tiles, the sides gas cannot pass
    /// for tiles that hold gas.
    fn conductivity_directions(&mut self, idx: usize) -> AtmosDirection {
        if self.tiles[idx].air.is_none() {
            self.archive_tile(idx, self.update_counter);
            return AtmosDirection::ALL;
        }
        AtmosDirection::ALL.difference(self.tiles[idx].adjacent_bits)
    }

    fn superconduct(&mut self, idx: usize) {
        let directions = self.conductivity_directions(idx);
        let counter = self.update_counter;

        for i in 0..DIRECTION_COUNT {
            if !directions.contains(AtmosDirection::from_index(i)) {
                continue;
            }
            let Some(other) = self.tiles[idx].adjacent_tiles[i] else {
                continue;
            };
            if self.tiles[other].thermal_conductivity == 0.0 || self.tiles[other].map_atmosphere {
                continue;
            }
            self.archive_tile(other, counter);
            self.neighbor_conduct_with_source(other, idx);
            self.join_superconduction(other);
        }

        self.radiate_to_space(idx);
        self.finish_superconduction(idx);
    }

    /// Move heat from `source` into `tile`.
    fn neighbor_conduct_with_source(&mut self, tile: usize, source: usize) {
        let registry = Arc::clone(&self.registry);
        let (target, from) = pair_mut(&mut self.tiles, tile, source);

        match (target.air.as_mut(), from.air.as_mut()) {
            (None, Some(source_air)) => {
                target.temperature = source_air.temperature_share_with_solid(
                    target.thermal_conductivity,
                    target.temperature,
                    target.heat_capacity,
                    &registry,
                );
            }
            (None, None) => {
                let delta = from.temperature_archived - target.temperature_archived;
                if delta.abs() > MINIMUM_TEMPERATURE_DELTA_TO_CONSIDER
                    && from.heat_capacity > 0.0
                    && target.heat_capacity > 0.0
                {
                    let heat = from.thermal_conductivity * delta
                        * (from.heat_capacity * target.heat_capacity
                            / (from.heat_capacity + target.heat_capacity));
                    from.temperature -= heat / from.heat_capacity;
                    target.temperature += heat / target.heat_capacity;
                }
            }
            (Some(target_air), Some(source_air)) => {
                source_air.temperature_share(target_air, WINDOW_HEAT_TRANSFER_COEFFICIENT, &registry);
            }
            (Some(target_air), None) => {
                from.temperature = target_air.temperature_share_with_solid(
                    from.thermal_conductivity,
                    from.temperature,
                    from.heat_capacity,
                    &registry,
                );
            }
        }

        if self.tiles[tile].air.is_some() {
            self.add_active_tile(tile);
        }
    }

    /// Hull tiles lose heat to space.
    fn radiate_to_space(&mut self, idx: usize) {
        let touches_space = self.tiles[idx]
            .adjacent_tiles
            .iter()
            .flatten()
            .any(|&other| self.tiles[other].space);
        let tile = &mut self.tiles[idx];
        if !touches_space || tile.temperature <= T0C || tile.heat_capacity <= 0.0 {
            return;
        }

        let delta = tile.temperature_archived - TCMB;
        if delta.abs() <= MINIMUM_TEMPERATURE_DELTA_TO_CONSIDER {
            return;
        }
        let heat = tile.thermal_conductivity * delta
            * (tile.heat_capacity * HEAT_CAPACITY_VACUUM / (tile.heat_capacity + HEAT_CAPACITY_VACUUM));
        tile.temperature = (tile.temperature - heat / tile.heat_capacity).max(TCMB);
    }

    fn finish_superconduction(&mut self, idx: usize) {
        let registry = Arc::clone(&self.registry);
        let tile = &mut self.tiles[idx];
        let temperature = match tile.air.as_mut() {
            Some(air) => {
                tile.temperature = air.temperature_share_with_solid(
                    tile.thermal_conductivity,
                    tile.temperature,
                    tile.heat_capacity,
                    &registry,
                );
                air.temperature()
            }
            None => tile.temperature,
        };
        if temperature < MINIMUM_TEMPERATURE_FOR_SUPERCONDUCTION {
            self.superconductivity_tiles.remove(&idx);
        }
    }
}
