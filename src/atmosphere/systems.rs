use bevy::log::{info, warn};
use bevy::prelude::*;

use super::config::AtmosConfig;
use super::events::*;
use super::system::AtmosphereSystem;

/// Validate edits to [`AtmosConfig`]. Invalid values are rolled back to the last accepted
/// configuration.
pub fn apply_config_changes(mut config: ResMut<AtmosConfig>, mut accepted: Local<Option<AtmosConfig>>) {
    if !config.is_changed() {
        return;
    }
    if (*accepted).as_ref() == Some(&*config) {
        return;
    }

    match config.validate() {
        Ok(()) => {
            if accepted.is_some() {
                info!("atmosphere config reloaded: {:?}", *config);
            }
            *accepted = Some(config.clone());
        }
        Err(err) => {
            let fallback = accepted.clone().unwrap_or_default();
            warn!("{}, keeping the previous atmosphere config", err);
            *config = fallback;
        }
    }
}

pub fn run_atmosphere(
    time: Res<Time>,
    config: Res<AtmosConfig>,
    mut atmosphere: ResMut<AtmosphereSystem>,
) {
    atmosphere.update(&config, time.delta_seconds());
}

/// Forward what the grids produced to bevy's event queues.
pub fn publish_atmos_events(
    mut atmosphere: ResMut<AtmosphereSystem>,
    mut changed: EventWriter<GasTileChanged>,
    mut wind: EventWriter<SpaceWind>,
    mut impulses: EventWriter<GridImpulse>,
    mut rips: EventWriter<DecompressionFloorRip>,
    mut fires: EventWriter<TileFire>,
) {
    for (grid, outbox) in atmosphere.drain_events() {
        if !outbox.changed_tiles.is_empty() {
            changed.send(GasTileChanged {
                grid,
                tiles: outbox.changed_tiles,
            });
        }
        wind.send_batch(outbox.space_wind);
        impulses.send_batch(outbox.impulses);
        rips.send_batch(outbox.floor_rips);
        fires.send_batch(outbox.fires);
    }
}
