//! Fast pressure equalization.
//!
//! Instead of letting gas diffuse one neighbour per tick, a zone around an unbalanced tile
//! is flood-filled, every tile's surplus or deficit against the zone average is routed
//! along the open connections, and the gas is moved in one go. A zone that reaches space
//! is drained outright.

use std::sync::Arc;

use bevy::log::debug;
use bevy::math::Vec2;

use crate::atmosphere::components::MonstermosInfo;
use crate::atmosphere::constants::{MINIMUM_MOLES_DELTA_TO_MOVE, MONSTERMOS_RIP_TILES_MINIMUM_MOLES};
use crate::atmosphere::direction::{opposite_index, AtmosDirection, DIRECTION_COUNT};
use crate::atmosphere::events::{DecompressionFloorRip, GridImpulse};
use crate::atmosphere::gas::{GasCompareResult, GasMixture};
use crate::atmosphere::grid::GridAtmosphere;

use super::TickBudget;

impl GridAtmosphere {
    pub(super) fn process_tile_equalize(&mut self, budget: &TickBudget) -> bool {
        if !self.processing_paused {
            self.current_run = std::mem::take(&mut self.equalize_queue).into_iter().collect();
        }

        let cycle = self.update_counter;
        let mut processed = 0;
        while let Some(idx) = self.current_run.pop_front() {
            self.equalize_pressure_in_zone(idx, cycle);
            processed += 1;
            if budget.should_pause(processed) {
                return false;
            }
        }
        true
    }

    fn is_map_tile(&self, idx: usize) -> bool {
        self.tiles[idx].air.is_none() && self.tiles[idx].map_atmosphere
    }

    fn gas_at(&self, idx: usize) -> Option<&GasMixture> {
        let tile = &self.tiles[idx];
        match &tile.air {
            Some(air) => Some(air),
            None if tile.map_atmosphere => Some(self.map_atmosphere.mixture()),
            None => None,
        }
    }

    fn eq_moles(&self, idx: usize) -> f32 {
        self.gas_at(idx).map_or(0.0, GasMixture::total_moles)
    }

    /// Open neighbour through which gas can be exchanged.
    fn open_neighbor(&self, idx: usize, direction_index: usize) -> Option<usize> {
        let tile = &self.tiles[idx];
        if !tile.adjacent_bits.contains(AtmosDirection::from_index(direction_index)) {
            return None;
        }
        let other = tile.adjacent_tiles[direction_index]?;
        self.tiles[other].participates().then_some(other)
    }

    pub(crate) fn equalize_pressure_in_zone(&mut self, start: usize, cycle: u32) {
        if self.tiles[start].air.is_none() || self.tiles[start].monstermos.last_cycle >= cycle {
            return;
        }
        self.tiles[start].monstermos = MonstermosInfo::default();

        let starting_moles = self.eq_moles(start);
        let unbalanced = (0..DIRECTION_COUNT).any(|i| {
            self.open_neighbor(start, i).map_or(false, |other| {
                (self.eq_moles(other) - starting_moles).abs() > MINIMUM_MOLES_DELTA_TO_MOVE
            })
        });
        if !unbalanced {
            return;
        }

        let tile_limit = self.config.monstermos_tile_limit;
        let hard_limit = self.config.monstermos_hard_tile_limit;
        let queue_cycle = self.next_queue_cycle();
        self.tiles[start].monstermos.last_queue_cycle = queue_cycle;

        let mut zone = vec![start];
        let mut total_moles = 0.0;
        let mut i = 0;
        while i < zone.len() {
            let exploring = zone[i];
            if i < tile_limit {
                let moles = self.eq_moles(exploring);
                self.tiles[exploring].monstermos.mole_delta = moles;
                total_moles += moles;
            }
            i += 1;

            if self.is_map_tile(exploring) {
                continue;
            }
            for j in 0..DIRECTION_COUNT {
                let Some(adj) = self.open_neighbor(exploring, j) else {
                    continue;
                };
                if self.tiles[adj].monstermos.last_queue_cycle == queue_cycle {
                    continue;
                }
                if self.tiles[adj].space && self.config.monstermos_depressurization {
                    self.explosively_depressurize(start, cycle);
                    return;
                }
                if zone.len() < hard_limit {
                    self.tiles[adj].monstermos = MonstermosInfo::queued(queue_cycle);
                    zone.push(adj);
                }
            }
        }

        // Tiles past the limit wait for the next tick.
        if zone.len() > tile_limit {
            for &idx in &zone[tile_limit..] {
                self.tiles[idx].monstermos.last_queue_cycle = 0;
                self.equalize_queue.insert(idx);
            }
            zone.truncate(tile_limit);
        }

        let average = total_moles / zone.len() as f32;
        for &idx in &zone {
            let info = &mut self.tiles[idx].monstermos;
            info.last_cycle = cycle;
            info.mole_delta -= average;
        }

        let (mut givers, mut takers) = self.split_givers(&zone);
        let log_n = (zone.len() as f32).log2();
        if givers.len() as f32 > log_n && takers.len() as f32 > log_n {
            self.fast_push(&mut zone, queue_cycle);
            (givers, takers) = self.split_givers(&zone);
        }

        if givers.len() < takers.len() {
            for giver in givers {
                self.slow_push(giver, queue_cycle, true);
            }
        } else {
            for taker in takers {
                self.slow_push(taker, queue_cycle, false);
            }
        }

        for &idx in &zone {
            self.finalize_eq(idx);
        }

        for &idx in &zone {
            for j in 0..DIRECTION_COUNT {
                let Some(other) = self.open_neighbor(idx, j) else {
                    continue;
                };
                let differs = match (self.gas_at(other), self.gas_at(idx)) {
                    (Some(theirs), Some(ours)) => theirs.compare(ours) != GasCompareResult::NoExchange,
                    _ => false,
                };
                if differs {
                    self.add_active_tile(other);
                    break;
                }
            }
        }
        self.dispose_groups_of(&zone);
    }

    fn next_queue_cycle(&mut self) -> u64 {
        self.equalization_queue_cycle_control += 1;
        self.equalization_queue_cycle_control
    }

    fn split_givers(&self, zone: &[usize]) -> (Vec<usize>, Vec<usize>) {
        zone.iter()
            .copied()
            .partition(|&idx| self.tiles[idx].monstermos.mole_delta > 0.0)
    }

    /// Greedy pass that pushes surpluses outward from the largest giver. May strand gas in
    /// corners; the slow pass cleans up after it.
    fn fast_push(&mut self, zone: &mut [usize], queue_cycle: u64) {
        zone.sort_by(|&a, &b| {
            let delta_a = self.tiles[a].monstermos.mole_delta;
            let delta_b = self.tiles[b].monstermos.mole_delta;
            delta_b.total_cmp(&delta_a).then(a.cmp(&b))
        });

        for &idx in zone.iter() {
            self.tiles[idx].monstermos.fast_done = true;
            if !(self.tiles[idx].monstermos.mole_delta > 0.0) {
                continue;
            }

            let eligible: Vec<usize> = (0..DIRECTION_COUNT)
                .filter(|&j| {
                    self.open_neighbor(idx, j).map_or(false, |other| {
                        let info = &self.tiles[other].monstermos;
                        !info.fast_done && info.last_queue_cycle == queue_cycle
                    })
                })
                .collect();
            if eligible.is_empty() {
                continue;
            }

            let moles_to_move = self.tiles[idx].monstermos.mole_delta / eligible.len() as f32;
            for j in eligible {
                self.adjust_eq_movement(idx, j, moles_to_move);
                self.tiles[idx].monstermos.mole_delta -= moles_to_move;
                if let Some(other) = self.tiles[idx].adjacent_tiles[j] {
                    self.tiles[other].monstermos.mole_delta += moles_to_move;
                }
            }
        }
    }

    /// Breadth-first search from one giver (or taker) that settles its delta against the
    /// nearest tiles of opposite sign, then routes the flow back along the search tree.
    fn slow_push(&mut self, origin: usize, queue_cycle: u64, giving: bool) {
        {
            let info = &mut self.tiles[origin].monstermos;
            info.current_transfer_direction = AtmosDirection::empty();
            info.current_transfer_amount = 0.0;
        }
        let slow_cycle = self.next_queue_cycle();
        self.tiles[origin].monstermos.last_slow_queue_cycle = slow_cycle;

        let mut queue = vec![origin];
        let mut i = 0;
        'search: while i < queue.len() {
            if !self.transfer_pending(origin, giving) {
                break;
            }
            let current = queue[i];
            i += 1;
            for k in 0..DIRECTION_COUNT {
                if !self.transfer_pending(origin, giving) {
                    break 'search;
                }
                let Some(next) = self.open_neighbor(current, k) else {
                    continue;
                };
                let info = &self.tiles[next].monstermos;
                if info.last_queue_cycle != queue_cycle || info.last_slow_queue_cycle == slow_cycle {
                    continue;
                }
                queue.push(next);

                let origin_delta = self.tiles[origin].monstermos.mole_delta;
                let info = &mut self.tiles[next].monstermos;
                info.last_slow_queue_cycle = slow_cycle;
                info.current_transfer_direction = AtmosDirection::from_index(opposite_index(k));
                info.current_transfer_amount = 0.0;

                let settled = if giving {
                    if info.mole_delta >= 0.0 {
                        None
                    } else if -info.mole_delta > origin_delta {
                        info.current_transfer_amount -= origin_delta;
                        info.mole_delta += origin_delta;
                        Some(0.0)
                    } else {
                        info.current_transfer_amount += info.mole_delta;
                        let remaining = origin_delta + info.mole_delta;
                        info.mole_delta = 0.0;
                        Some(remaining)
                    }
                } else if info.mole_delta <= 0.0 {
                    None
                } else if info.mole_delta > -origin_delta {
                    info.current_transfer_amount -= origin_delta;
                    info.mole_delta += origin_delta;
                    Some(0.0)
                } else {
                    info.current_transfer_amount += info.mole_delta;
                    let remaining = origin_delta + info.mole_delta;
                    info.mole_delta = 0.0;
                    Some(remaining)
                };
                if let Some(remaining) = settled {
                    self.tiles[origin].monstermos.mole_delta = remaining;
                }
            }
        }

        for &idx in queue.iter().rev() {
            let info = self.tiles[idx].monstermos;
            let Some(direction_index) = info.current_transfer_direction.to_index() else {
                continue;
            };
            if info.current_transfer_amount == 0.0 {
                continue;
            }
            self.adjust_eq_movement(idx, direction_index, info.current_transfer_amount);
            if let Some(toward) = self.tiles[idx].adjacent_tiles[direction_index] {
                self.tiles[toward].monstermos.current_transfer_amount += info.current_transfer_amount;
            }
            self.tiles[idx].monstermos.current_transfer_amount = 0.0;
        }
    }

    fn transfer_pending(&self, origin: usize, giving: bool) -> bool {
        let delta = self.tiles[origin].monstermos.mole_delta;
        if giving {
            delta > 0.0
        } else {
            delta < 0.0
        }
    }

    fn adjust_eq_movement(&mut self, idx: usize, direction_index: usize, amount: f32) {
        self.tiles[idx].monstermos.transfer_dirs[direction_index] += amount;
        if let Some(other) = self.tiles[idx].adjacent_tiles[direction_index] {
            self.tiles[other].monstermos.transfer_dirs[opposite_index(direction_index)] -= amount;
        }
    }

    /// Move the gas the planning passes decided on. A tile that has to pass on more than
    /// it holds first pulls in what its own suppliers owe it.
    fn finalize_eq(&mut self, idx: usize) {
        let transfer = self.tiles[idx].monstermos.transfer_dirs;
        if transfer.iter().all(|&amount| amount == 0.0) {
            return;
        }
        self.tiles[idx].monstermos.transfer_dirs = [0.0; DIRECTION_COUNT];

        let registry = Arc::clone(&self.registry);
        for (i, &amount) in transfer.iter().enumerate() {
            if amount <= 0.0 {
                continue;
            }
            let Some(other) = self.open_neighbor(idx, i) else {
                continue;
            };

            if self.eq_moles(idx) < amount {
                self.finalize_eq_neighbors(idx, &transfer);
            }
            self.tiles[other].monstermos.transfer_dirs[opposite_index(i)] = 0.0;

            let moved = match self.tiles[idx].air.as_mut() {
                Some(air) => air.remove(amount),
                None => self.map_atmosphere.mixture().clone().remove(amount),
            };
            if let Some(air) = self.tiles[other].air.as_mut() {
                air.merge(&moved, &registry);
            }
            self.changed_tiles.insert(idx);
            self.changed_tiles.insert(other);
            self.consider_pressure_difference(idx, i, amount);
        }
    }

    fn finalize_eq_neighbors(&mut self, idx: usize, transfer: &[f32; DIRECTION_COUNT]) {
        for (i, &amount) in transfer.iter().enumerate() {
            if amount >= 0.0 {
                continue;
            }
            if let Some(other) = self.open_neighbor(idx, i) {
                self.finalize_eq(other);
            }
        }
    }

    fn dispose_groups_of(&mut self, tiles: &[usize]) {
        let mut groups: Vec<_> = tiles
            .iter()
            .filter_map(|&idx| self.tiles[idx].excited_group)
            .collect();
        groups.sort_unstable();
        groups.dedup();
        for group in groups {
            self.excited_group_dispose(group);
        }
    }

    /// Drain every tile connected to `start` into space, marking on each tile the direction
    /// the gas left through.
    pub(crate) fn explosively_depressurize(&mut self, start: usize, cycle: u32) {
        let hard_limit = self.config.monstermos_hard_tile_limit;
        let queue_cycle = self.next_queue_cycle();

        let mut zone = vec![start];
        let mut space_tiles = Vec::new();
        self.tiles[start].monstermos = MonstermosInfo::queued(queue_cycle);

        let mut i = 0;
        while i < zone.len() {
            let current = zone[i];
            i += 1;
            self.tiles[current].monstermos.last_cycle = cycle;
            self.tiles[current].monstermos.current_transfer_direction = AtmosDirection::empty();

            if self.is_map_tile(current) {
                if self.tiles[current].space {
                    space_tiles.push(current);
                }
            } else {
                for j in 0..DIRECTION_COUNT {
                    let Some(adj) = self.open_neighbor(current, j) else {
                        continue;
                    };
                    if self.tiles[adj].monstermos.last_queue_cycle == queue_cycle {
                        continue;
                    }
                    self.tiles[adj].monstermos = MonstermosInfo::queued(queue_cycle);
                    zone.push(adj);
                    if zone.len() >= hard_limit {
                        break;
                    }
                }
            }
            if zone.len() >= hard_limit || space_tiles.len() >= hard_limit {
                break;
            }
        }

        let slow_cycle = self.next_queue_cycle();
        let mut progression = space_tiles.clone();
        for &idx in &space_tiles {
            let info = &mut self.tiles[idx].monstermos;
            info.last_slow_queue_cycle = slow_cycle;
            info.current_transfer_direction = AtmosDirection::empty();
        }

        let mut i = 0;
        while i < progression.len() {
            let current = progression[i];
            i += 1;
            for j in 0..DIRECTION_COUNT {
                let Some(next) = self.open_neighbor(current, j) else {
                    continue;
                };
                let info = &self.tiles[next].monstermos;
                if info.last_queue_cycle != queue_cycle
                    || info.last_slow_queue_cycle == slow_cycle
                    || self.is_map_tile(next)
                {
                    continue;
                }
                let info = &mut self.tiles[next].monstermos;
                info.current_transfer_direction = AtmosDirection::from_index(opposite_index(j));
                info.current_transfer_amount = 0.0;
                info.last_slow_queue_cycle = slow_cycle;
                progression.push(next);
            }
        }

        let cap = self.config.depressurize_max_moles;
        let mut total_removed = 0.0;
        for &idx in progression.iter().rev() {
            let direction = self.tiles[idx].monstermos.current_transfer_direction;
            let Some(direction_index) = direction.to_index() else {
                continue;
            };
            if self.config.space_wind {
                self.high_pressure_delta.insert(idx);
            }
            self.add_active_tile(idx);

            let removed = match self.tiles[idx].air.as_mut() {
                Some(air) => {
                    let total = air.total_moles();
                    let amount = cap.map_or(total, |cap| total.min(cap));
                    if amount >= total {
                        air.clear();
                    } else {
                        air.remove(amount);
                    }
                    amount
                }
                None => 0.0,
            };
            total_removed += removed;

            let tile = &mut self.tiles[idx];
            tile.monstermos.current_transfer_amount += removed;
            let flow = tile.monstermos.current_transfer_amount;
            tile.pressure_difference = flow;
            tile.pressure_direction = direction;
            let position = tile.position;
            if let Some(toward) = tile.adjacent_tiles[direction_index] {
                self.tiles[toward].monstermos.current_transfer_amount += flow;
            }
            self.changed_tiles.insert(idx);

            if self.config.monstermos_rip_tiles && flow > MONSTERMOS_RIP_TILES_MINIMUM_MOLES {
                self.outbox.floor_rips.push(DecompressionFloorRip {
                    grid: self.uid(),
                    tile: position,
                    moles: flow,
                });
            }
        }

        if self.config.grid_impulse && total_removed > 0.0 {
            let origin = self.tiles[start].position;
            let outward: Vec2 = space_tiles
                .iter()
                .map(|&idx| (self.tiles[idx].position - origin).as_vec2())
                .sum();
            if let Some(outward) = outward.try_normalize() {
                self.outbox.impulses.push(GridImpulse {
                    grid: self.uid(),
                    impulse: -outward * total_removed,
                });
            }
        }

        debug!(
            "Grid {:?} depressurized {} tiles through {} breaches, venting {:.1} mol",
            self.uid(),
            progression.len() - space_tiles.len(),
            space_tiles.len(),
            total_removed
        );
        self.dispose_groups_of(&zone);
    }
}

#[cfg(test)]
mod tests {
    use std::sync::Arc;

    use bevy::prelude::{Entity, IVec2};

    use crate::atmosphere::components::TileGeometry;
    use crate::atmosphere::gas::{GasMixture, GasRegistry, GasType};
    use crate::atmosphere::grid::GridAtmosphere;

    fn build(rows: &[&str]) -> GridAtmosphere {
        GridAtmosphere::from_layout(Entity::from_raw(6), rows, Arc::new(GasRegistry::default()))
            .expect("valid layout")
    }

    fn moles_at(grid: &GridAtmosphere, x: i32, y: i32) -> f32 {
        grid.tile_mixture(IVec2::new(x, y)).map_or(0.0, GasMixture::total_moles)
    }

    #[test]
    fn uniform_zone_is_left_alone() {
        let mut grid = build(&["#####", "#...#", "#...#", "#####"]);
        grid.changed_tiles.clear();
        let start = grid.index_of(IVec2::new(2, 1)).expect("in bounds");

        grid.equalize_pressure_in_zone(start, 5);

        assert!(grid.changed_tiles.is_empty());
        assert_eq!(grid.equalization_queue_cycle_control, 0);
    }

    #[test]
    fn unbalanced_zone_levels_out_in_one_pass() {
        let mut grid = build(&["######", "#....#", "#....#", "######"]);
        grid.tile_mixture_mut(IVec2::new(1, 1), false)
            .expect("floor")
            .adjust_moles(GasType::Nitrogen, 400.0);
        let before = grid.total_moles();
        let start = grid.index_of(IVec2::new(1, 1)).expect("in bounds");

        grid.equalize_pressure_in_zone(start, 5);

        let average = before / 8.0;
        for y in 1..=2 {
            for x in 1..=4 {
                let moles = moles_at(&grid, x, y);
                assert!((moles - average).abs() < 0.5, "tile ({}, {}) holds {} instead of {}", x, y, moles, average);
            }
        }
        assert!((grid.total_moles() - before).abs() < 0.05);
    }

    #[test]
    fn truncated_zone_is_finished_on_a_later_pass() {
        let mut grid = build(&["##########", "#........#", "##########"]);
        grid.config.monstermos_tile_limit = 3;
        grid.tile_mixture_mut(IVec2::new(1, 1), false)
            .expect("floor")
            .adjust_moles(GasType::Nitrogen, 300.0);
        grid.equalize_queue.clear();
        let before = grid.total_moles();
        let start = grid.index_of(IVec2::new(1, 1)).expect("in bounds");
        let untouched = moles_at(&grid, 4, 1);

        grid.equalize_pressure_in_zone(start, 5);

        assert_eq!(moles_at(&grid, 4, 1), untouched, "only the first three tiles level out");
        assert!(moles_at(&grid, 3, 1) > untouched);
        for x in 4..=8 {
            let idx = grid.index_of(IVec2::new(x, 1)).expect("in bounds");
            assert!(grid.equalize_queue.contains(&idx), "tile ({}, 1) must be re-queued", x);
        }

        let queued: Vec<usize> = std::mem::take(&mut grid.equalize_queue).into_iter().collect();
        for idx in queued {
            grid.equalize_pressure_in_zone(idx, 6);
        }

        assert!(moles_at(&grid, 4, 1) > untouched, "the cut-off tiles get gas on the next pass");
        assert!((grid.total_moles() - before).abs() < 0.05);
    }

    #[test]
    fn breach_drains_the_room_toward_space() {
        let mut grid = build(&[
            "       ", //
            " ##### ",
            " #...# ",
            " #...# ",
            " ##### ",
            "       ",
        ]);
        grid.set_geometry(IVec2::new(1, 2), TileGeometry::space())
            .expect("in bounds");
        grid.revalidate_all();
        let start = grid.index_of(IVec2::new(2, 2)).expect("in bounds");

        grid.equalize_pressure_in_zone(start, 5);

        for (x, y) in [(2, 2), (3, 2), (4, 2), (2, 3), (3, 3), (4, 3)] {
            assert_eq!(moles_at(&grid, x, y), 0.0);
        }
        let far = grid.tile(IVec2::new(4, 3)).expect("tile");
        assert!(far.pressure_difference > 0.0);
        let next = IVec2::new(4, 3) + far.pressure_direction.offset();
        let breach = IVec2::new(1, 2);
        assert!((next - breach).abs().element_sum() < (IVec2::new(4, 3) - breach).abs().element_sum());

        let outbox = grid.drain_outbox();
        assert_eq!(outbox.impulses.len(), 1);
        assert!(outbox.impulses[0].impulse.x > 0.0, "venting west pushes the grid east");
        assert!(!outbox.floor_rips.is_empty());
    }

    #[test]
    fn drain_cap_limits_moles_removed_per_tile() {
        let mut grid = build(&["  ###", "  ..#", "  ###"]);
        grid.config.depressurize_max_moles = Some(10.0);
        let start = grid.index_of(IVec2::new(3, 1)).expect("in bounds");
        let before = moles_at(&grid, 3, 1);

        grid.explosively_depressurize(start, 5);

        assert!((moles_at(&grid, 3, 1) - (before - 10.0)).abs() < 1e-2);
    }
}
