use bevy::log::{debug, warn};
use bevy::prelude::*;

use super::system::AtmosphereSystem;

/// How often the conservation report is logged.
#[derive(Resource)]
pub struct MolesTracker {
    pub timer: Timer,
    last_total: Option<f32>,
}

impl Default for MolesTracker {
    fn default() -> Self {
        Self {
            timer: Timer::from_seconds(5.0, TimerMode::Repeating),
            last_total: None,
        }
    }
}

/// Snapshot of the whole simulation's bookkeeping.
#[derive(Debug, Clone, Copy, Default, PartialEq)]
pub struct MolesReport {
    pub total_moles: f32,
    pub active_tiles: usize,
    pub awake_groups: usize,
    pub sleeping_groups: usize,
    pub non_finite_tiles: usize,
}

impl MolesReport {
    pub fn collect(system: &AtmosphereSystem) -> Self {
        let mut report = Self::default();
        for grid in system.grids() {
            let stats = grid.stats();
            report.total_moles += grid.total_moles();
            report.active_tiles += stats.active_tiles;
            report.awake_groups += stats.excited_groups - stats.sleeping_groups;
            report.sleeping_groups += stats.sleeping_groups;
            report.non_finite_tiles += grid
                .tiles()
                .filter(|tile| tile.air.as_ref().map_or(false, |air| !air.is_finite()))
                .count();
        }
        report
    }
}

pub fn check_mole_conservation(
    time: Res<Time>,
    mut tracker: ResMut<MolesTracker>,
    atmosphere: Res<AtmosphereSystem>,
) {
    if !tracker.timer.tick(time.delta()).just_finished() {
        return;
    }

    let report = MolesReport::collect(&atmosphere);
    let drift = tracker
        .last_total
        .map_or(0.0, |last| report.total_moles - last);
    tracker.last_total = Some(report.total_moles);

    debug!(
        "atmos: {:.2} mol ({:+.3} since last report), {} active tiles, {} awake / {} sleeping groups",
        report.total_moles, drift, report.active_tiles, report.awake_groups, report.sleeping_groups
    );
    if report.non_finite_tiles > 0 || !report.total_moles.is_finite() {
        warn!(
            "atmos: {} tiles hold non-finite gas, total {}",
            report.non_finite_tiles, report.total_moles
        );
    }
}

#[cfg(test)]
mod tests {
    use std::sync::Arc;

    use super::*;
    use crate::atmosphere::constants::*;
    use crate::atmosphere::grid::GridAtmosphere;

    #[test]
    fn report_sums_every_grid() {
        let mut system = AtmosphereSystem::default();
        for raw in [40, 41] {
            let grid = GridAtmosphere::from_layout(
                Entity::from_raw(raw),
                &["###", "#.#", "###"],
                Arc::clone(system.registry()),
            )
            .expect("valid layout");
            system.add_grid(grid);
        }

        let report = MolesReport::collect(&system);
        assert!((report.total_moles - 2.0 * MOLES_CELL_STANDARD).abs() < 0.1);
        assert_eq!(report.non_finite_tiles, 0);
    }
}
