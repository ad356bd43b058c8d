use std::sync::Arc;

use crate::atmosphere::grid::GridAtmosphere;
use crate::atmosphere::reactions::{HolderKind, ReactionContext, ReactionResult};

use super::TickBudget;

impl GridAtmosphere {
    /// React the gas of every awake or burning tile.
    pub(super) fn process_reactions(&mut self, budget: &TickBudget) -> bool {
        if !self.processing_paused {
            self.current_run = self.active_tiles.union(&self.hotspot_tiles).copied().collect();
        }

        let mut processed = 0;
        while let Some(idx) = self.current_run.pop_front() {
            self.react_tile(idx);
            processed += 1;
            if budget.should_pause(processed) {
                return false;
            }
        }
        true
    }

    pub(crate) fn react_tile(&mut self, idx: usize) -> ReactionResult {
        let registry = Arc::clone(&self.registry);
        let mut context = ReactionContext::new(HolderKind::Tile);
        let Some(air) = self.tiles[idx].air.as_mut() else {
            return ReactionResult::empty();
        };
        let result = registry.react(air, &mut context);

        if result.contains(ReactionResult::REACTING) {
            self.changed_tiles.insert(idx);
            self.add_active_tile(idx);
        }
        if let Some(exposure) = context.take_hotspot_exposure() {
            if self.config.fires {
                self.hotspot_expose(idx, exposure.temperature, exposure.volume, false);
            }
        }
        result
    }
}
