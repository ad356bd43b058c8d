use bevy::prelude::*;

use super::config::AtmosConfig;
use super::events::*;
use super::monitoring::{check_mole_conservation, MolesTracker};
use super::system::AtmosphereSystem;
use super::systems::*;

/// Atmospheric simulation plugin
///
/// Insert an [`AtmosConfig`] or [`AtmosphereSystem`] before adding the plugin to override
/// the defaults.
pub struct AtmospherePlugin;

impl Plugin for AtmospherePlugin {
    fn build(&self, app: &mut App) {
        app.init_resource::<AtmosConfig>()
            .init_resource::<AtmosphereSystem>()
            .init_resource::<MolesTracker>()
            .add_event::<GasTileChanged>()
            .add_event::<SpaceWind>()
            .add_event::<GridImpulse>()
            .add_event::<DecompressionFloorRip>()
            .add_event::<TileFire>()
            .add_systems(
                Update,
                (
                    apply_config_changes,
                    run_atmosphere,
                    publish_atmos_events,
                    check_mole_conservation,
                )
                    .chain(),
            );
    }
}
