//! The per-grid tick pipeline.
//!
//! Every stage is a resumable loop over a snapshot of its work queue. When the tick budget
//! runs out the grid remembers the stage and the rest of the snapshot, and the next call
//! to [`GridAtmosphere::update`] continues exactly where it stopped.

mod active_tiles;
mod high_pressure;
mod hotspot;
mod monstermos;
mod pipes;
mod react;
mod revalidate;
mod superconduction;

use std::time::Duration;

use bevy::log::trace;
use bevy::utils::Instant;

use super::config::AtmosConfig;
use super::constants::LAG_CHECK_ITERATIONS;
use super::grid::GridAtmosphere;

/// Pipeline stages in execution order.
#[derive(Debug, Clone, Copy, Default, PartialEq, Eq, Hash)]
pub enum ProcessState {
    #[default]
    Revalidate,
    ActiveTiles,
    TileEqualize,
    Reactions,
    ExcitedGroups,
    HighPressureDelta,
    Hotspots,
    Superconductivity,
    PipeNet,
}

impl ProcessState {
    pub fn next(self) -> Option<Self> {
        use ProcessState::*;
        match self {
            Revalidate => Some(ActiveTiles),
            ActiveTiles => Some(TileEqualize),
            TileEqualize => Some(Reactions),
            Reactions => Some(ExcitedGroups),
            ExcitedGroups => Some(HighPressureDelta),
            HighPressureDelta => Some(Hotspots),
            Hotspots => Some(Superconductivity),
            Superconductivity => Some(PipeNet),
            PipeNet => None,
        }
    }
}

/// Wall-clock deadline shared by every grid in one tick.
#[derive(Debug, Clone, Copy)]
pub struct TickBudget {
    started: Instant,
    max: Duration,
}

impl TickBudget {
    pub fn new(max: Duration) -> Self {
        Self {
            started: Instant::now(),
            max,
        }
    }

    pub fn unlimited() -> Self {
        Self::new(Duration::MAX)
    }

    pub fn exceeded(&self) -> bool {
        self.started.elapsed() >= self.max
    }

    /// Checked every [`LAG_CHECK_ITERATIONS`] work items.
    pub(crate) fn should_pause(&self, processed: usize) -> bool {
        processed % LAG_CHECK_ITERATIONS == 0 && self.exceeded()
    }
}

impl GridAtmosphere {
    /// Run the pipeline until the cycle completes or the budget runs out. Returns true when
    /// a full cycle finished.
    pub fn update(&mut self, config: &AtmosConfig, budget: &TickBudget) -> bool {
        if !self.processing_paused && self.state == ProcessState::Revalidate {
            self.config.clone_from(config);
            if !self.config.excited_groups && !self.excited_groups.is_empty() {
                let groups: Vec<_> = self.excited_groups.keys().collect();
                for group in groups {
                    self.wake_excited_group(group);
                }
            }
        }

        loop {
            let finished = match self.state {
                ProcessState::Revalidate => self.process_revalidate(budget),
                ProcessState::ActiveTiles => self.process_active_tiles(budget),
                ProcessState::TileEqualize => {
                    if self.config.monstermos_equalization {
                        self.process_tile_equalize(budget)
                    } else {
                        self.equalize_queue.clear();
                        true
                    }
                }
                ProcessState::Reactions => self.process_reactions(budget),
                ProcessState::ExcitedGroups => {
                    !self.config.excited_groups || self.process_excited_groups(budget)
                }
                ProcessState::HighPressureDelta => {
                    if self.config.space_wind {
                        self.process_high_pressure_delta(budget)
                    } else {
                        self.high_pressure_delta.clear();
                        true
                    }
                }
                ProcessState::Hotspots => {
                    if self.config.fires {
                        self.process_hotspots(budget)
                    } else {
                        true
                    }
                }
                ProcessState::Superconductivity => {
                    if self.config.superconduction {
                        self.process_superconductivity(budget)
                    } else {
                        self.superconductivity_tiles.clear();
                        true
                    }
                }
                ProcessState::PipeNet => self.process_pipe_nets(budget),
            };

            if !finished {
                self.processing_paused = true;
                trace!(
                    "Grid {:?} paused in {:?} with {} items left",
                    self.uid(),
                    self.state,
                    self.current_run.len() + self.current_groups.len() + self.current_nets.len()
                );
                return false;
            }
            self.processing_paused = false;

            match self.state.next() {
                Some(next) => self.state = next,
                None => {
                    self.state = ProcessState::Revalidate;
                    self.update_counter = self.update_counter.wrapping_add(1);
                    return true;
                }
            }
        }
    }
}
