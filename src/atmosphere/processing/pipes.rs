use std::sync::Arc;

use bevy::log::debug;

use crate::atmosphere::grid::GridAtmosphere;

use super::TickBudget;

impl GridAtmosphere {
    /// Rebuild edited pipe nets, release the gas of removed ones and react the rest.
    ///
    /// The rebuild runs in one go; the reactions are time-boxed per net.
    pub(super) fn process_pipe_nets(&mut self, budget: &TickBudget) -> bool {
        let registry = Arc::clone(&self.registry);
        if !self.processing_paused {
            self.pipes.remake_dirty(&registry);

            for (position, gas) in self.pipes.take_vented() {
                if !self.merge_into_tile(position, &gas) {
                    debug!(
                        "pipe gas vented into solid tile {}, {} mol lost",
                        position,
                        gas.total_moles()
                    );
                }
            }
            self.current_nets = self.pipes.net_ids().collect();
        }

        let mut processed = 0;
        while let Some(net) = self.current_nets.pop_front() {
            self.pipes.react_net(net, &registry);
            processed += 1;
            if budget.should_pause(processed) {
                return false;
            }
        }
        true
    }
}
