use std::sync::Arc;
use std::time::Duration;

use bevy::prelude::*;
use bevy::time::TimeUpdateStrategy;
use station_atmos::atmosphere::components::TileGeometry;
use station_atmos::atmosphere::events::{GasTileChanged, GridImpulse};
use station_atmos::atmosphere::{AtmosConfig, AtmospherePlugin, AtmosphereSystem, GridAtmosphere};

#[derive(Resource, Default)]
struct Seen {
    changed_tiles: usize,
    impulses: usize,
}

fn count_events(
    mut changed: EventReader<GasTileChanged>,
    mut impulses: EventReader<GridImpulse>,
    mut seen: ResMut<Seen>,
) {
    seen.changed_tiles += changed.read().map(|event| event.tiles.len()).sum::<usize>();
    seen.impulses += impulses.read().count();
}

fn headless_app() -> (App, Entity) {
    let mut app = App::new();
    app.add_plugins(MinimalPlugins)
        .insert_resource(TimeUpdateStrategy::ManualDuration(Duration::from_millis(100)))
        .add_plugins(AtmospherePlugin)
        .init_resource::<Seen>()
        .add_systems(PostUpdate, count_events);

    let uid = app.world_mut().spawn_empty().id();
    {
        let mut system = app.world_mut().resource_mut::<AtmosphereSystem>();
        let grid = GridAtmosphere::from_layout(
            uid,
            &["       ", " ##### ", " #...# ", " #...# ", " ##### ", "       "],
            Arc::clone(system.registry()),
        )
        .expect("valid layout");
        system.add_grid(grid);
    }
    (app, uid)
}

#[test]
fn plugin_ticks_and_publishes_events() {
    let (mut app, uid) = headless_app();
    for _ in 0..4 {
        app.update();
    }

    let counter = app
        .world()
        .resource::<AtmosphereSystem>()
        .grid(uid)
        .expect("grid")
        .update_counter();
    assert!(counter > 1, "the atmosphere should have ticked");
    assert!(app.world().resource::<Seen>().changed_tiles > 0);

    app.world_mut()
        .resource_mut::<AtmosphereSystem>()
        .set_geometry(uid, IVec2::new(3, 4), TileGeometry::space())
        .expect("in bounds");
    for _ in 0..3 {
        app.update();
    }

    assert_eq!(app.world().resource::<Seen>().impulses, 1);
    let system = app.world().resource::<AtmosphereSystem>();
    let air = system.get_tile_mixture(uid, IVec2::new(2, 2)).expect("air");
    assert!(air.pressure() < 1.0);
}

#[test]
fn invalid_config_edits_are_rolled_back() {
    let (mut app, _) = headless_app();
    app.update();

    app.world_mut().resource_mut::<AtmosConfig>().tick_rate = -3.0;
    app.update();
    assert_eq!(app.world().resource::<AtmosConfig>().tick_rate, 15.0);

    app.world_mut().resource_mut::<AtmosConfig>().space_wind = false;
    app.update();
    assert!(!app.world().resource::<AtmosConfig>().space_wind);
}

#[test]
fn disabled_simulation_does_not_tick() {
    let (mut app, uid) = headless_app();
    app.world_mut().resource_mut::<AtmosConfig>().simulation_enabled = false;
    for _ in 0..4 {
        app.update();
    }
    let counter = app
        .world()
        .resource::<AtmosphereSystem>()
        .grid(uid)
        .expect("grid")
        .update_counter();
    assert_eq!(counter, 1);
}
