use std::sync::Arc;

use crate::atmosphere::components::AirtightData;
use crate::atmosphere::constants::{CELL_VOLUME, T20C};
use crate::atmosphere::direction::{opposite_index, AtmosDirection, DIRECTION_COUNT};
use crate::atmosphere::gas::GasMixture;
use crate::atmosphere::grid::GridAtmosphere;

use super::TickBudget;

impl GridAtmosphere {
    pub(super) fn process_revalidate(&mut self, budget: &TickBudget) -> bool {
        let mut processed = 0;
        while let Some(idx) = self.invalidated.pop_first() {
            self.revalidate_tile(idx);
            processed += 1;
            if budget.should_pause(processed) {
                return false;
            }
        }
        true
    }

    /// Bring a tile's cached state in line with its geometry. A tile that was already
    /// consistent is left alone; only a change wakes it.
    pub(crate) fn revalidate_tile(&mut self, idx: usize) {
        let geometry = self.tiles[idx].geometry;
        let map_is_space = self.map_atmosphere.is_space();
        let before = self.tiles[idx].flow_state();

        {
            let tile = &mut self.tiles[idx];
            tile.airtight_data = AirtightData {
                blocked_directions: geometry.blocked,
                no_air_when_blocked: geometry.no_air_when_blocked,
            };
            tile.thermal_conductivity = geometry.thermal_conductivity;
            tile.heat_capacity = geometry.heat_capacity;
        }

        let mut displaced = None;
        if !geometry.floor {
            let tile = &mut self.tiles[idx];
            tile.map_atmosphere = true;
            tile.space = map_is_space;
            tile.airtight_data.blocked_directions = AtmosDirection::empty();
            tile.air = None;
            tile.hotspot = Default::default();
            self.hotspot_tiles.remove(&idx);
        } else if geometry.holds_air() {
            let tile = &mut self.tiles[idx];
            tile.map_atmosphere = false;
            tile.space = false;
            if tile.air.is_none() {
                tile.air = Some(GasMixture::new(CELL_VOLUME, T20C));
            }
        } else {
            let tile = &mut self.tiles[idx];
            tile.map_atmosphere = false;
            tile.space = false;
            tile.hotspot = Default::default();
            displaced = tile.air.take();
            self.hotspot_tiles.remove(&idx);
            self.superconductivity_tiles.remove(&idx);
        }

        self.update_adjacent(idx);

        let mut changed = before != self.tiles[idx].flow_state();
        if let Some(gas) = displaced {
            self.push_displaced_gas(idx, gas);
            changed = true;
        }
        if self.tiles[idx].air.is_none() {
            self.remove_active_tile(idx, true);
        }

        if changed {
            self.add_active_tile(idx);
            self.equalize_queue.insert(idx);
            self.changed_tiles.insert(idx);
        }
        self.tiles[idx].airtight_dirty = false;
    }

    /// Recompute which directions gas can flow through, on the tile and its neighbours.
    fn update_adjacent(&mut self, idx: usize) {
        let mut bits = AtmosDirection::empty();
        for i in 0..DIRECTION_COUNT {
            let direction = AtmosDirection::from_index(i);
            let neighbor = self.neighbor_index(idx, direction);
            self.tiles[idx].adjacent_tiles[i] = neighbor;

            let Some(other) = neighbor else {
                continue;
            };
            let open = self.can_flow(idx, other, i);
            if open {
                bits |= direction;
            }

            let back = AtmosDirection::from_index(opposite_index(i));
            let other_tile = &mut self.tiles[other];
            other_tile.adjacent_tiles[opposite_index(i)] = Some(idx);
            let previous = other_tile.adjacent_bits;
            other_tile.adjacent_bits.set(back, open);
            if other_tile.adjacent_bits != previous {
                self.add_active_tile(other);
                self.equalize_queue.insert(other);
            }
        }
        self.tiles[idx].adjacent_bits = bits;
    }

    fn can_flow(&self, from: usize, to: usize, direction_index: usize) -> bool {
        let a = &self.tiles[from];
        let b = &self.tiles[to];
        a.participates()
            && b.participates()
            && !a
                .airtight_data
                .blocked_directions
                .contains(AtmosDirection::from_index(direction_index))
            && !b
                .airtight_data
                .blocked_directions
                .contains(AtmosDirection::from_index(opposite_index(direction_index)))
    }

    /// Share gas from a tile that just stopped holding air among its neighbours that do.
    fn push_displaced_gas(&mut self, idx: usize, mut gas: GasMixture) {
        let receivers: Vec<usize> = self.tiles[idx]
            .adjacent_tiles
            .iter()
            .flatten()
            .copied()
            .filter(|&other| self.tiles[other].air.is_some())
            .collect();
        if receivers.is_empty() {
            return;
        }

        gas.multiply(1.0 / receivers.len() as f32);
        let registry = Arc::clone(&self.registry);
        for other in receivers {
            if let Some(air) = &mut self.tiles[other].air {
                air.merge(&gas, &registry);
            }
            self.add_active_tile(other);
            self.changed_tiles.insert(other);
        }
    }
}
