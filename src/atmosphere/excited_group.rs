use std::sync::Arc;

use bevy::log::trace;
use slotmap::new_key_type;

use super::constants::CELL_VOLUME;
use super::gas::GasMixture;
use super::grid::GridAtmosphere;
use super::processing::TickBudget;

new_key_type! {
    /// Handle to an excited group in its grid's arena.
    pub struct ExcitedGroupId;
}

#[derive(Debug, Clone, Copy, Default, PartialEq, Eq)]
pub enum ExcitedGroupState {
    /// Members are still in the active set and share gas every tick.
    #[default]
    Forming,
    /// Members left the active set; the group only remembers who they are.
    Asleep,
}

/// Connected set of tiles that settle their gas together.
#[derive(Debug, Clone, Default)]
pub struct ExcitedGroup {
    pub(crate) tiles: Vec<usize>,
    pub breakdown_cooldown: u32,
    pub dismantle_cooldown: u32,
    pub state: ExcitedGroupState,
}

impl ExcitedGroup {
    pub fn tiles(&self) -> &[usize] {
        &self.tiles
    }

    pub fn len(&self) -> usize {
        self.tiles.len()
    }

    pub fn is_empty(&self) -> bool {
        self.tiles.is_empty()
    }

    pub fn is_asleep(&self) -> bool {
        self.state == ExcitedGroupState::Asleep
    }
}

impl GridAtmosphere {
    /// The tile's group, unless that group is asleep.
    pub(crate) fn forming_group(&self, idx: usize) -> Option<ExcitedGroupId> {
        let group = self.tiles[idx].excited_group?;
        match self.excited_groups.get(group) {
            Some(found) if !found.is_asleep() => Some(group),
            _ => None,
        }
    }

    pub(crate) fn new_excited_group(&mut self) -> ExcitedGroupId {
        self.excited_groups.insert(ExcitedGroup::default())
    }

    pub(crate) fn excited_group_add_tile(&mut self, group: ExcitedGroupId, idx: usize) {
        if self.tiles[idx].air.is_none() {
            return;
        }
        let Some(excited) = self.excited_groups.get_mut(group) else {
            return;
        };
        excited.tiles.push(idx);
        excited.breakdown_cooldown = 0;
        excited.dismantle_cooldown = 0;
        self.tiles[idx].excited_group = Some(group);
    }

    pub(crate) fn excited_group_remove_tile(&mut self, group: ExcitedGroupId, idx: usize) {
        self.tiles[idx].excited_group = None;
        if let Some(excited) = self.excited_groups.get_mut(group) {
            excited.tiles.retain(|&tile| tile != idx);
        }
    }

    /// Fold the smaller group into the larger one.
    pub(crate) fn excited_group_merge(&mut self, ours: ExcitedGroupId, theirs: ExcitedGroupId) {
        if ours == theirs {
            return;
        }
        let our_size = self.excited_groups.get(ours).map_or(0, ExcitedGroup::len);
        let their_size = self.excited_groups.get(theirs).map_or(0, ExcitedGroup::len);
        let (winner, loser) = if our_size > their_size {
            (ours, theirs)
        } else {
            (theirs, ours)
        };

        let Some(lost) = self.excited_groups.remove(loser) else {
            return;
        };
        for &idx in &lost.tiles {
            self.tiles[idx].excited_group = Some(winner);
        }
        if let Some(won) = self.excited_groups.get_mut(winner) {
            won.tiles.extend(lost.tiles);
            won.breakdown_cooldown = 0;
            won.dismantle_cooldown = 0;
        }
    }

    pub(crate) fn excited_group_reset_cooldowns(&mut self, group: ExcitedGroupId) {
        if let Some(excited) = self.excited_groups.get_mut(group) {
            excited.breakdown_cooldown = 0;
            excited.dismantle_cooldown = 0;
        }
    }

    /// Average the gas of every member.
    pub(crate) fn excited_group_self_breakdown(&mut self, group: ExcitedGroupId) {
        let registry = Arc::clone(&self.registry);
        let Some(excited) = self.excited_groups.get(group) else {
            return;
        };
        if excited.tiles.is_empty() {
            self.excited_group_dispose(group);
            return;
        }

        let mut combined = GasMixture::new(CELL_VOLUME, 0.0);
        let mut holders = 0usize;
        for &idx in &excited.tiles {
            if let Some(air) = &self.tiles[idx].air {
                combined.merge(air, &registry);
                holders += 1;
            }
        }
        if holders == 0 {
            self.excited_group_dispose(group);
            return;
        }
        combined.multiply(1.0 / holders as f32);

        let members = excited.tiles.clone();
        for idx in members {
            if let Some(air) = &mut self.tiles[idx].air {
                air.copy_from(&combined);
                self.changed_tiles.insert(idx);
            }
        }
        if let Some(excited) = self.excited_groups.get_mut(group) {
            excited.breakdown_cooldown = 0;
        }
    }

    /// Take the members out of the active set but remember the group.
    pub(crate) fn excited_group_sleep(&mut self, group: ExcitedGroupId) {
        let Some(excited) = self.excited_groups.get_mut(group) else {
            return;
        };
        excited.state = ExcitedGroupState::Asleep;
        excited.breakdown_cooldown = 0;
        excited.dismantle_cooldown = 0;
        let members = excited.tiles.clone();
        for idx in members {
            self.tiles[idx].excited = false;
            self.active_tiles.remove(&idx);
        }
        trace!("Excited group {:?} on grid {:?} went to sleep", group, self.uid());
    }

    /// Dissolve a group and put every member back in the active set.
    pub(crate) fn wake_excited_group(&mut self, group: ExcitedGroupId) {
        let Some(excited) = self.excited_groups.remove(group) else {
            return;
        };
        for idx in excited.tiles {
            self.tiles[idx].excited_group = None;
            if self.tiles[idx].air.is_some() {
                self.tiles[idx].excited = true;
                self.active_tiles.insert(idx);
            }
        }
    }

    /// Dissolve a group, leaving its members' activity as it is.
    pub(crate) fn excited_group_dispose(&mut self, group: ExcitedGroupId) {
        let Some(excited) = self.excited_groups.remove(group) else {
            return;
        };
        for idx in excited.tiles {
            self.tiles[idx].excited_group = None;
        }
    }

    pub(crate) fn process_excited_groups(&mut self, budget: &TickBudget) -> bool {
        if !self.processing_paused {
            self.current_groups = self
                .excited_groups
                .iter()
                .filter(|(_, group)| !group.is_asleep())
                .map(|(id, _)| id)
                .collect();
        }

        let breakdown_cycles = self.config.excited_group_breakdown_cycles;
        let dismantle_cycles = self.config.excited_group_dismantle_cycles;
        let mut processed = 0;
        while let Some(group) = self.current_groups.pop_front() {
            let Some(excited) = self.excited_groups.get_mut(group) else {
                continue;
            };
            excited.breakdown_cooldown += 1;
            excited.dismantle_cooldown += 1;

            if excited.breakdown_cooldown > breakdown_cycles {
                self.excited_group_self_breakdown(group);
            } else if excited.dismantle_cooldown > dismantle_cycles {
                self.excited_group_sleep(group);
            }

            processed += 1;
            if budget.should_pause(processed) {
                return false;
            }
        }
        true
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use crate::atmosphere::gas::{GasRegistry, GasType};
    use bevy::prelude::{Entity, IVec2};

    fn strip() -> GridAtmosphere {
        GridAtmosphere::from_layout(
            Entity::from_raw(3),
            &["######", "#....#", "######"],
            Arc::new(GasRegistry::default()),
        )
        .expect("valid layout")
    }

    fn idx(grid: &GridAtmosphere, x: i32, y: i32) -> usize {
        grid.index_of(IVec2::new(x, y)).expect("in bounds")
    }

    #[test]
    fn merge_keeps_the_larger_group() {
        let mut grid = strip();
        let small = grid.new_excited_group();
        let large = grid.new_excited_group();
        let (a, b, c) = (idx(&grid, 1, 1), idx(&grid, 2, 1), idx(&grid, 3, 1));
        grid.excited_group_add_tile(small, a);
        grid.excited_group_add_tile(large, b);
        grid.excited_group_add_tile(large, c);

        grid.excited_group_merge(small, large);

        assert!(grid.excited_group(small).is_none());
        assert_eq!(grid.excited_group(large).map(ExcitedGroup::len), Some(3));
        assert_eq!(grid.tiles[a].excited_group, Some(large));
    }

    #[test]
    fn breakdown_averages_gas_and_conserves_moles() {
        let mut grid = strip();
        let group = grid.new_excited_group();
        let members: Vec<usize> = (1..=4).map(|x| idx(&grid, x, 1)).collect();
        for &member in &members {
            grid.excited_group_add_tile(group, member);
        }
        grid.tiles[members[0]]
            .air
            .as_mut()
            .expect("floor air")
            .adjust_moles(GasType::Plasma, 40.0);
        let before = grid.total_moles();

        grid.excited_group_self_breakdown(group);

        assert!((grid.total_moles() - before).abs() < 1e-2);
        for &member in &members {
            let plasma = grid.tiles[member].air.as_ref().expect("air").get_moles(GasType::Plasma);
            assert!((plasma - 10.0).abs() < 1e-3, "plasma {} should be averaged", plasma);
        }
    }

    #[test]
    fn sleeping_group_wakes_as_a_whole() {
        let mut grid = strip();
        let group = grid.new_excited_group();
        let members: Vec<usize> = (1..=4).map(|x| idx(&grid, x, 1)).collect();
        for &member in &members {
            grid.add_active_tile(member);
            grid.excited_group_add_tile(group, member);
        }

        grid.excited_group_sleep(group);
        assert!(members.iter().all(|member| !grid.active_tiles.contains(member)));
        assert!(grid.excited_group(group).map_or(false, ExcitedGroup::is_asleep));

        grid.add_active_tile(members[2]);

        assert!(grid.excited_group(group).is_none());
        assert!(members.iter().all(|member| grid.active_tiles.contains(member)));
        assert!(members.iter().all(|&member| grid.tiles[member].excited_group.is_none()));
    }
}
