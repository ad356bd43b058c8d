use std::sync::Arc;

use crate::atmosphere::constants::*;
use crate::atmosphere::direction::{opposite_index, AtmosDirection, DIRECTION_COUNT};
use crate::atmosphere::gas::{GasCompareResult, ShareOutcome};
use crate::atmosphere::grid::{pair_mut, GridAtmosphere};

use super::TickBudget;

impl GridAtmosphere {
    pub(super) fn process_active_tiles(&mut self, budget: &TickBudget) -> bool {
        if !self.processing_paused {
            self.current_run = self.active_tiles.iter().copied().collect();
        }

        let fire_count = self.update_counter;
        let mut processed = 0;
        while let Some(idx) = self.current_run.pop_front() {
            self.process_cell(idx, fire_count);
            processed += 1;
            if budget.should_pause(processed) {
                return false;
            }
        }
        true
    }

    /// Share gas with every open neighbour that has not been processed this cycle.
    fn process_cell(&mut self, idx: usize, fire_count: u32) {
        if self.tiles[idx].air.is_none() {
            self.remove_active_tile(idx, true);
            return;
        }

        self.archive_tile(idx, fire_count);
        self.tiles[idx].current_cycle = fire_count;
        let adjacent_count = self.tiles[idx].adjacent_bits.bits().count_ones();
        let use_groups = self.config.excited_groups;
        let mut exchanged = false;

        for i in 0..DIRECTION_COUNT {
            let direction = AtmosDirection::from_index(i);
            if !self.tiles[idx].adjacent_bits.contains(direction) {
                continue;
            }
            let Some(other) = self.tiles[idx].adjacent_tiles[i] else {
                continue;
            };

            if self.tiles[other].air.is_none() {
                if self.tiles[other].map_atmosphere {
                    exchanged |= self.share_with_map(idx, i, adjacent_count);
                }
                continue;
            }

            if fire_count <= self.tiles[other].current_cycle {
                continue;
            }
            self.archive_tile(other, fire_count);

            let ours = self.forming_group(idx);
            let theirs = self.forming_group(other);
            let should_share = match (use_groups, ours, theirs) {
                (true, Some(ours), Some(theirs)) => {
                    if ours != theirs {
                        self.excited_group_merge(ours, theirs);
                    }
                    true
                }
                _ => {
                    if self.compare_tiles(idx, other) == GasCompareResult::NoExchange {
                        false
                    } else {
                        self.add_active_tile(other);
                        if use_groups {
                            self.join_excited_group(idx, other);
                        }
                        true
                    }
                }
            };
            if !should_share {
                continue;
            }
            exchanged = true;

            let outcome = self.share_tiles(idx, other, adjacent_count);
            self.after_share(idx, other, i, outcome);
        }

        let mut remove = true;
        let hot = self.tiles[idx]
            .air
            .as_ref()
            .map_or(false, |air| air.temperature() > MINIMUM_TEMPERATURE_START_SUPERCONDUCTION);
        if hot && self.consider_superconductivity(idx, true) {
            remove = false;
        }

        let settled = if use_groups {
            self.tiles[idx].excited_group.is_none()
        } else {
            !exchanged
        };
        if remove && settled {
            self.remove_active_tile(idx, false);
        }
    }

    fn compare_tiles(&self, a: usize, b: usize) -> GasCompareResult {
        match (&self.tiles[a].air, &self.tiles[b].air) {
            (Some(ours), Some(theirs)) => ours.compare(theirs),
            _ => GasCompareResult::NoExchange,
        }
    }

    /// Put two tiles in the same forming group, creating one if neither has it.
    fn join_excited_group(&mut self, idx: usize, other: usize) {
        let ours = self.forming_group(idx);
        let theirs = self.forming_group(other);
        let group = match ours.or(theirs) {
            Some(group) => group,
            None => self.new_excited_group(),
        };
        if ours.is_none() {
            self.excited_group_add_tile(group, idx);
        }
        if theirs.is_none() {
            self.excited_group_add_tile(group, other);
        }
    }

    fn share_tiles(&mut self, idx: usize, other: usize, adjacent_count: u32) -> ShareOutcome {
        let registry = Arc::clone(&self.registry);
        let factor = 1.0 / (adjacent_count as f32 + 1.0);
        let (tile, enemy) = pair_mut(&mut self.tiles, idx, other);
        match (tile.air.as_mut(), enemy.air.as_mut()) {
            (Some(ours), Some(theirs)) => ours.share(theirs, factor, &registry),
            _ => ShareOutcome::default(),
        }
    }

    /// Exchange with the read-only map atmosphere through a map tile.
    fn share_with_map(&mut self, idx: usize, direction_index: usize, adjacent_count: u32) -> bool {
        let mut map_air = self.map_atmosphere.mixture().clone();
        map_air.archive();

        let differs = self.tiles[idx]
            .air
            .as_ref()
            .map_or(false, |air| air.compare(&map_air) != GasCompareResult::NoExchange);
        if !differs {
            return false;
        }

        if self.config.excited_groups && self.forming_group(idx).is_none() {
            let group = self.new_excited_group();
            self.excited_group_add_tile(group, idx);
        }

        let registry = Arc::clone(&self.registry);
        let factor = 1.0 / (adjacent_count as f32 + 1.0);
        let outcome = match self.tiles[idx].air.as_mut() {
            Some(air) => air.share(&mut map_air, factor, &registry),
            None => return false,
        };

        let tile = &mut self.tiles[idx];
        tile.last_share = outcome.abs_moved_moles;
        self.changed_tiles.insert(idx);
        if !self.config.monstermos_equalization && outcome.pressure_difference > 0.0 {
            self.consider_pressure_difference(idx, direction_index, outcome.pressure_difference);
        }
        if self.config.monstermos_equalization {
            self.equalize_queue.insert(idx);
        }
        self.last_share_check(idx);
        true
    }

    fn after_share(&mut self, idx: usize, other: usize, direction_index: usize, outcome: ShareOutcome) {
        self.tiles[idx].last_share = outcome.abs_moved_moles;
        self.changed_tiles.insert(idx);
        self.changed_tiles.insert(other);

        if self.config.monstermos_equalization {
            if self.has_pressure_differential(idx) {
                self.equalize_queue.insert(idx);
            }
        } else {
            let difference = outcome.pressure_difference;
            if difference > 0.0 {
                self.consider_pressure_difference(idx, direction_index, difference);
            } else if difference < 0.0 {
                self.consider_pressure_difference(other, opposite_index(direction_index), -difference);
            }
        }
        self.last_share_check(idx);
    }

    /// Keep the tile's group from breaking down or sleeping while gas is still moving.
    fn last_share_check(&mut self, idx: usize) {
        let Some(group) = self.tiles[idx].excited_group else {
            return;
        };
        let last_share = self.tiles[idx].last_share;
        if last_share > MINIMUM_AIR_TO_SUSPEND {
            self.excited_group_reset_cooldowns(group);
        } else if last_share > MINIMUM_MOLES_DELTA_TO_MOVE {
            if let Some(excited) = self.excited_groups.get_mut(group) {
                excited.dismantle_cooldown = 0;
            }
        }
    }

    /// Remember the strongest push a tile received this cycle.
    pub(crate) fn consider_pressure_difference(
        &mut self,
        idx: usize,
        direction_index: usize,
        difference: f32,
    ) {
        if !self.config.space_wind {
            return;
        }
        self.high_pressure_delta.insert(idx);
        let tile = &mut self.tiles[idx];
        if difference > tile.pressure_difference {
            tile.pressure_difference = difference;
            tile.pressure_direction = AtmosDirection::from_index(direction_index);
        }
    }
}
