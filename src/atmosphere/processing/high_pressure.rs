use crate::atmosphere::events::SpaceWind;
use crate::atmosphere::grid::GridAtmosphere;

use super::TickBudget;

impl GridAtmosphere {
    /// Publish space wind for every tile that was pushed this cycle, then forget the push.
    /// The direction stays on the tile for consumers that poll it.
    pub(super) fn process_high_pressure_delta(&mut self, budget: &TickBudget) -> bool {
        if !self.processing_paused {
            self.current_run = std::mem::take(&mut self.high_pressure_delta).into_iter().collect();
        }

        let min_pressure = self.config.space_wind_min_pressure;
        let grid = self.uid();
        let mut processed = 0;
        while let Some(idx) = self.current_run.pop_front() {
            let tile = &mut self.tiles[idx];
            if tile.pressure_difference > min_pressure && tile.pressure_difference > 0.0 {
                self.outbox.space_wind.push(SpaceWind {
                    grid,
                    tile: tile.position,
                    pressure_difference: tile.pressure_difference,
                    direction: tile.pressure_direction,
                });
            }
            tile.pressure_difference = 0.0;

            processed += 1;
            if budget.should_pause(processed) {
                return false;
            }
        }
        true
    }
}
