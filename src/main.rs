use std::sync::Arc;

use bevy::prelude::*;
use station_atmos::atmosphere::components::TileGeometry;
use station_atmos::atmosphere::constants::ONE_ATMOSPHERE;
use station_atmos::atmosphere::events::{GasTileChanged, SpaceWind};
use station_atmos::atmosphere::{AtmosConfig, AtmospherePlugin, AtmosphereSystem, GridAtmosphere};

const TILE_SIZE: f32 = 32.0;
const CONFIG_PATH: &str = "assets/config/atmos.toml";

const STATION: [&str; 14] = [
    "                    ",
    "  ################  ",
    "  #......#.......#  ",
    "  #......#.......#  ",
    "  #......+.......#  ",
    "  #......#.......#  ",
    "  ####+#####+#####  ",
    "  #......#,,,,,,,#  ",
    "  #......#,,,,,,,#  ",
    "  #......+,,,,,,,#  ",
    "  #......#,,,,,,,#  ",
    "  ################  ",
    "                    ",
    "                    ",
];

#[derive(Resource)]
struct Station(Entity);

#[derive(Component)]
struct TileVisual(IVec2);

fn main() {
    let config = match AtmosConfig::load(CONFIG_PATH) {
        Ok(config) => config,
        Err(err) => {
            eprintln!("{}, using default atmosphere config", err);
            AtmosConfig::default()
        }
    };

    App::new()
        .add_plugins(DefaultPlugins)
        .insert_resource(config)
        .add_plugins(AtmospherePlugin)
        .add_systems(Startup, setup)
        .add_systems(Update, (handle_tile_click, update_tile_visuals, log_space_wind))
        .run();
}

fn setup(mut commands: Commands, mut atmosphere: ResMut<AtmosphereSystem>) {
    commands.spawn(Camera2dBundle::default());

    let uid = commands.spawn_empty().id();
    let grid = match GridAtmosphere::from_layout(uid, &STATION, Arc::clone(atmosphere.registry())) {
        Ok(grid) => grid,
        Err(err) => {
            error!("bad station layout: {}", err);
            return;
        }
    };
    let (width, height) = (grid.width() as i32, grid.height() as i32);
    atmosphere.add_grid(grid);
    commands.insert_resource(Station(uid));

    let origin = Vec2::new(width as f32, height as f32) * TILE_SIZE * -0.5;
    for y in 0..height {
        for x in 0..width {
            let position = IVec2::new(x, y);
            commands.spawn((
                TileVisual(position),
                SpriteBundle {
                    sprite: Sprite {
                        color: Color::BLACK,
                        custom_size: Some(Vec2::splat(TILE_SIZE - 1.0)),
                        ..default()
                    },
                    transform: Transform::from_translation(
                        (origin + position.as_vec2() * TILE_SIZE).extend(0.0),
                    ),
                    ..default()
                },
            ));
        }
    }

    info!("Left click breaches a wall or floor to space; clicking space rebuilds a wall");
}

/// Breach the clicked tile to space, or rebuild a wall on space.
fn handle_tile_click(
    mouse_button: Res<ButtonInput<MouseButton>>,
    windows: Query<&Window>,
    cameras: Query<(&Camera, &GlobalTransform)>,
    tiles: Query<(&TileVisual, &Transform)>,
    station: Option<Res<Station>>,
    mut atmosphere: ResMut<AtmosphereSystem>,
) {
    if !mouse_button.just_pressed(MouseButton::Left) {
        return;
    }
    let Some(station) = station else {
        return;
    };
    let (Ok(window), Ok((camera, camera_transform))) = (windows.get_single(), cameras.get_single()) else {
        return;
    };
    let Some(world_pos) = window
        .cursor_position()
        .and_then(|cursor| camera.viewport_to_world_2d(camera_transform, cursor))
    else {
        return;
    };

    let half_size = TILE_SIZE / 2.0;
    let Some(position) = tiles.iter().find_map(|(visual, transform)| {
        let offset = (world_pos - transform.translation.truncate()).abs();
        (offset.x <= half_size && offset.y <= half_size).then_some(visual.0)
    }) else {
        return;
    };

    let is_space = atmosphere.is_tile_space(Some(station.0), None, position);
    let geometry = if is_space {
        TileGeometry::wall()
    } else {
        TileGeometry::space()
    };
    match atmosphere.set_geometry(station.0, position, geometry) {
        Ok(()) if is_space => info!("Rebuilt wall at {}", position),
        Ok(()) => info!("Breached tile {} to space", position),
        Err(err) => warn!("{}", err),
    }
}

/// Colour changed tiles by pressure: black vacuum, blue low, green normal, red high.
fn update_tile_visuals(
    mut changed: EventReader<GasTileChanged>,
    atmosphere: Res<AtmosphereSystem>,
    mut tiles: Query<(&TileVisual, &mut Sprite)>,
) {
    let mut dirty = Vec::new();
    for event in changed.read() {
        dirty.extend(event.tiles.iter().map(|tile| (event.grid, *tile)));
    }
    if dirty.is_empty() {
        return;
    }

    for (visual, mut sprite) in &mut tiles {
        let Some((grid, _)) = dirty.iter().find(|(_, tile)| *tile == visual.0) else {
            continue;
        };
        let Some(tile) = atmosphere.grid(*grid).and_then(|grid| grid.tile(visual.0)) else {
            continue;
        };
        sprite.color = match &tile.air {
            None if tile.space => Color::BLACK,
            None => Color::srgb(0.5, 0.5, 0.5),
            Some(air) => pressure_color(air.pressure()),
        };
    }
}

fn pressure_color(pressure: f32) -> Color {
    let ratio = (pressure / ONE_ATMOSPHERE).clamp(0.0, 2.0);
    if ratio < 0.05 {
        Color::srgb(0.05, 0.05, 0.1)
    } else if ratio < 1.0 {
        Color::srgb(0.0, ratio, 1.0 - ratio)
    } else {
        Color::srgb(ratio - 1.0, 2.0 - ratio, 0.0)
    }
}

fn log_space_wind(mut wind: EventReader<SpaceWind>) {
    for event in wind.read() {
        if event.pressure_difference > ONE_ATMOSPHERE * 0.5 {
            debug!(
                "space wind at {} toward {:?}: {:.1} kPa",
                event.tile, event.direction, event.pressure_difference
            );
        }
    }
}
