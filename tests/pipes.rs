use std::sync::Arc;

use bevy::prelude::{Entity, IVec2};
use station_atmos::atmosphere::constants::T20C;
use station_atmos::atmosphere::gas::{GasMixture, GasType};
use station_atmos::atmosphere::{AtmosConfig, AtmosphereSystem, GridAtmosphere};

fn system_with_grid() -> (AtmosphereSystem, Entity) {
    let mut system = AtmosphereSystem::default();
    let uid = Entity::from_raw(300);
    let grid = GridAtmosphere::from_layout(
        uid,
        &["#####", "#...#", "#####"],
        Arc::clone(system.registry()),
    )
    .expect("valid layout");
    system.add_grid(grid);
    (system, uid)
}

fn assert_close(actual: f32, expected: f32, what: &str) {
    assert!(
        (actual - expected).abs() < 1e-3 * expected.abs().max(1.0),
        "{}: expected {}, got {}",
        what,
        expected,
        actual
    );
}

#[test]
fn oxygen_in_one_segment_fills_the_net_by_volume() {
    let (mut system, uid) = system_with_grid();
    let registry = Arc::clone(system.registry());
    let grid = system.grid_mut(uid).expect("grid");
    let pipes = grid.pipes_mut();
    let a = pipes.add_pipe(IVec2::new(1, 1), 200.0);
    let b = pipes.add_pipe(IVec2::new(2, 1), 200.0);
    let c = pipes.add_pipe(IVec2::new(3, 1), 400.0);
    pipes.connect(a, b).expect("known pipes");
    pipes.connect(b, c).expect("known pipes");
    system.tick(&AtmosConfig::default());

    let oxygen = GasMixture::new(200.0, T20C).with_moles(GasType::Oxygen, 100.0);
    let pipes = system.grid_mut(uid).expect("grid").pipes_mut();
    pipes.merge_into_pipe(a, &oxygen, &registry).expect("known pipe");
    system.tick(&AtmosConfig::default());

    let pipes = system.grid(uid).expect("grid").pipes();
    assert_eq!(pipes.net_count(), 1);
    assert_close(pipes.node_moles(a).expect("moles"), 25.0, "segment a");
    assert_close(pipes.node_moles(b).expect("moles"), 25.0, "segment b");
    assert_close(pipes.node_moles(c).expect("moles"), 50.0, "segment c");
    assert_close(pipes.total_moles(), 100.0, "net total");
}

#[test]
fn severed_net_keeps_moles_and_temperature() {
    let (mut system, uid) = system_with_grid();
    let registry = Arc::clone(system.registry());
    let pipes = system.grid_mut(uid).expect("grid").pipes_mut();
    let ids: Vec<_> = [100.0, 300.0, 100.0, 100.0]
        .into_iter()
        .enumerate()
        .map(|(x, volume)| pipes.add_pipe(IVec2::new(x as i32, 1), volume))
        .collect();
    for pair in ids.windows(2) {
        pipes.connect(pair[0], pair[1]).expect("known pipes");
    }
    let hot = GasMixture::new(600.0, 420.0)
        .with_moles(GasType::Nitrogen, 60.0)
        .with_moles(GasType::CarbonDioxide, 30.0);
    pipes.merge_into_pipe(ids[0], &hot, &registry).expect("known pipe");
    let before = system.total_moles();

    let pipes = system.grid_mut(uid).expect("grid").pipes_mut();
    pipes.disconnect(ids[1], ids[2]).expect("known pipes");
    system.tick(&AtmosConfig::default());

    assert_close(system.total_moles(), before, "grid total");
    let pipes = system.grid(uid).expect("grid").pipes();
    assert_eq!(pipes.net_count(), 2);
    let left = pipes.net_air(ids[0]).expect("left");
    let right = pipes.net_air(ids[3]).expect("right");
    assert_close(left.volume(), 400.0, "left volume");
    assert_close(right.volume(), 200.0, "right volume");
    assert_close(left.total_moles() + right.total_moles(), 90.0, "pipe moles");
    assert_close(left.total_moles(), 60.0, "left share");
    assert_close(left.temperature(), 420.0, "left temperature");
    assert_close(right.temperature(), 420.0, "right temperature");

    let system_pipes = system.grid(uid).expect("grid").pipes();
    let rebuilt = system_pipes.net_of(ids[0]);
    system.tick(&AtmosConfig::default());
    assert_eq!(system.grid(uid).expect("grid").pipes().net_of(ids[0]), rebuilt, "remake is idempotent");
}

#[test]
fn removing_a_whole_net_vents_into_the_room() {
    let (mut system, uid) = system_with_grid();
    let registry = Arc::clone(system.registry());
    let pipes = system.grid_mut(uid).expect("grid").pipes_mut();
    let pipe = pipes.add_pipe(IVec2::new(2, 1), 200.0);
    pipes
        .merge_into_pipe(pipe, &GasMixture::new(200.0, T20C).with_moles(GasType::Plasma, 3.0), &registry)
        .expect("known pipe");
    let before = system.total_moles();

    system
        .grid_mut(uid)
        .expect("grid")
        .pipes_mut()
        .remove_pipe(pipe)
        .expect("known pipe");
    system.tick(&AtmosConfig::default());

    assert_close(system.total_moles(), before, "total");
    let plasma: f32 = (1..=3)
        .filter_map(|x| system.get_tile_mixture(uid, IVec2::new(x, 1)))
        .map(|air| air.get_moles(GasType::Plasma))
        .sum();
    assert_close(plasma, 3.0, "plasma in the room");
}
