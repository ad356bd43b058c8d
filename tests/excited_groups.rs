use std::sync::Arc;

use bevy::prelude::{Entity, IVec2};
use station_atmos::atmosphere::gas::GasType;
use station_atmos::atmosphere::{AtmosConfig, AtmosphereSystem, GridAtmosphere};

fn room_system() -> (AtmosphereSystem, Entity) {
    let mut system = AtmosphereSystem::default();
    let uid = Entity::from_raw(200);
    let grid = GridAtmosphere::from_layout(
        uid,
        &["######", "#....#", "#....#", "#....#", "#....#", "######"],
        Arc::clone(system.registry()),
    )
    .expect("valid layout");
    system.add_grid(grid);
    (system, uid)
}

fn diffusion_only() -> AtmosConfig {
    AtmosConfig {
        max_process_time_ms: 1000.0,
        monstermos_equalization: false,
        superconduction: false,
        ..Default::default()
    }
}

/// Tick until every group is asleep.
fn settle(system: &mut AtmosphereSystem, uid: Entity, config: &AtmosConfig) {
    for _ in 0..300 {
        system.tick(config);
        let stats = system.grid(uid).expect("grid").stats();
        if stats.sleeping_groups > 0 && stats.sleeping_groups == stats.excited_groups {
            return;
        }
    }
    panic!("excited groups never went to sleep");
}

#[test]
fn disturbed_room_forms_a_group_that_falls_asleep() {
    let (mut system, uid) = room_system();
    let config = diffusion_only();
    system
        .tile_mixture_mut(uid, IVec2::new(1, 1), true)
        .expect("floor")
        .adjust_moles(GasType::Oxygen, 80.0);

    system.tick(&config);
    assert!(system.grid(uid).expect("grid").stats().excited_groups > 0);

    settle(&mut system, uid, &config);

    let grid = system.grid(uid).expect("grid");
    let stats = grid.stats();
    assert_eq!(stats.active_tiles, 0, "sleeping members leave the active set");
    let group = grid.excited_group_of(IVec2::new(1, 1)).expect("still a member");
    assert!(grid.excited_group(group).expect("group").is_asleep());
}

#[test]
fn injection_into_a_sleeping_member_wakes_the_whole_group() {
    let (mut system, uid) = room_system();
    let config = diffusion_only();
    system
        .tile_mixture_mut(uid, IVec2::new(1, 1), true)
        .expect("floor")
        .adjust_moles(GasType::Oxygen, 80.0);
    settle(&mut system, uid, &config);

    let grid = system.grid(uid).expect("grid");
    let group = grid.excited_group_of(IVec2::new(2, 2)).expect("member");
    let members: Vec<IVec2> = grid
        .excited_group(group)
        .expect("group")
        .tiles()
        .iter()
        .filter_map(|&idx| grid.position_of(idx))
        .collect();
    assert!(members.len() > 1);

    system
        .tile_mixture_mut(uid, IVec2::new(4, 4), true)
        .expect("floor")
        .adjust_moles(GasType::CarbonDioxide, 20.0);

    let grid = system.grid(uid).expect("grid");
    assert!(grid.excited_group(group).is_none(), "the group must dissolve");
    assert!(members.iter().all(|&position| grid.is_active(position)));

    system.tick(&config);
    let grid = system.grid(uid).expect("grid");
    let spread = grid
        .tile_mixture(IVec2::new(3, 4))
        .expect("air")
        .get_moles(GasType::CarbonDioxide);
    assert!(spread > 0.0, "the woken tiles share again on the next tick");
}

#[test]
fn disabling_groups_wakes_sleepers() {
    let (mut system, uid) = room_system();
    let config = diffusion_only();
    system
        .tile_mixture_mut(uid, IVec2::new(1, 1), true)
        .expect("floor")
        .adjust_moles(GasType::Oxygen, 80.0);
    settle(&mut system, uid, &config);

    let no_groups = AtmosConfig {
        excited_groups: false,
        ..config
    };
    system.tick(&no_groups);

    assert_eq!(system.grid(uid).expect("grid").stats().excited_groups, 0);
}

#[test]
fn revalidating_a_settled_member_keeps_the_group_asleep() {
    let (mut system, uid) = room_system();
    let config = diffusion_only();
    system
        .tile_mixture_mut(uid, IVec2::new(1, 1), true)
        .expect("floor")
        .adjust_moles(GasType::Oxygen, 80.0);
    settle(&mut system, uid, &config);
    let group = system
        .grid(uid)
        .expect("grid")
        .excited_group_of(IVec2::new(2, 2))
        .expect("member");

    system.invalidate_tile(uid, IVec2::new(2, 2)).expect("known grid");
    system.tick(&config);

    let grid = system.grid(uid).expect("grid");
    assert_eq!(grid.excited_group_of(IVec2::new(2, 2)), Some(group));
    assert!(grid.excited_group(group).expect("group").is_asleep());
    assert_eq!(grid.stats().active_tiles, 0);
}
