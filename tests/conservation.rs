use std::sync::Arc;
use std::time::Duration;

use bevy::prelude::{Entity, IVec2};
use station_atmos::atmosphere::constants::*;
use station_atmos::atmosphere::gas::{GasMixture, GasRegistry, GasType};
use station_atmos::atmosphere::grid::GridAtmosphere;
use station_atmos::atmosphere::processing::TickBudget;
use station_atmos::atmosphere::AtmosConfig;

const ROOM: [&str; 8] = [
    "##########",
    "#........#",
    "#........#",
    "#........#",
    "#........#",
    "#........#",
    "#........#",
    "##########",
];

fn room(uid: u32) -> GridAtmosphere {
    GridAtmosphere::from_layout(Entity::from_raw(uid), &ROOM, Arc::new(GasRegistry::default()))
        .expect("valid layout")
}

/// Extra oxygen in one corner and hot nitrogen in another.
fn perturb(grid: &mut GridAtmosphere) {
    grid.tile_mixture_mut(IVec2::new(1, 1), true)
        .expect("floor")
        .adjust_moles(GasType::Oxygen, 300.0);
    let hot = grid.tile_mixture_mut(IVec2::new(8, 6), true).expect("floor");
    hot.adjust_moles(GasType::Nitrogen, 50.0);
    hot.set_temperature(450.0);
}

fn sealed_config() -> AtmosConfig {
    AtmosConfig {
        superconduction: false,
        fires: false,
        ..Default::default()
    }
}

fn thermal_energy(grid: &GridAtmosphere) -> f32 {
    let registry = Arc::clone(grid.registry());
    grid.tiles()
        .filter_map(|tile| tile.air.as_ref())
        .map(|air| air.thermal_energy(&registry))
        .sum()
}

fn species_moles(grid: &GridAtmosphere, gas: GasType) -> f32 {
    grid.tiles()
        .filter_map(|tile| tile.air.as_ref())
        .map(|air| air.get_moles(gas))
        .sum()
}

#[test]
fn sealed_room_conserves_moles_and_energy() {
    let mut grid = room(1);
    perturb(&mut grid);
    let config = sealed_config();
    let oxygen = species_moles(&grid, GasType::Oxygen);
    let nitrogen = species_moles(&grid, GasType::Nitrogen);
    let energy = thermal_energy(&grid);

    for _ in 0..60 {
        assert!(grid.update(&config, &TickBudget::unlimited()));
    }

    let relative = |after: f32, before: f32| ((after - before) / before).abs();
    assert!(relative(species_moles(&grid, GasType::Oxygen), oxygen) < 1e-4);
    assert!(relative(species_moles(&grid, GasType::Nitrogen), nitrogen) < 1e-4);
    assert!(relative(thermal_energy(&grid), energy) < 1e-3);
}

#[test]
fn gas_spreads_to_the_far_corner() {
    let mut grid = room(2);
    perturb(&mut grid);
    let config = AtmosConfig {
        monstermos_equalization: false,
        ..sealed_config()
    };
    let far_before = grid
        .tile_mixture(IVec2::new(8, 1))
        .map_or(0.0, |air| air.get_moles(GasType::Oxygen));

    for _ in 0..40 {
        grid.update(&config, &TickBudget::unlimited());
    }

    let corner = grid.tile_mixture(IVec2::new(1, 1)).expect("air").get_moles(GasType::Oxygen);
    let far = grid.tile_mixture(IVec2::new(8, 1)).expect("air").get_moles(GasType::Oxygen);
    assert!(far > far_before, "oxygen should reach the far side");
    assert!(corner - far < 300.0 / 2.0, "the spike should flatten");
}

#[test]
fn identical_runs_are_bit_for_bit_identical() {
    let config = sealed_config();
    let run = |uid| {
        let mut grid = room(uid);
        perturb(&mut grid);
        for tick in 0..30 {
            if tick == 10 {
                let injected = GasMixture::new(CELL_VOLUME, 600.0).with_moles(GasType::CarbonDioxide, 40.0);
                grid.merge_into_tile(IVec2::new(4, 3), &injected);
            }
            grid.update(&config, &TickBudget::unlimited());
        }
        grid.snapshot()
    };

    assert_eq!(run(3), run(4));
}

#[test]
fn time_boxed_grid_resumes_to_the_same_state() {
    let config = sealed_config();
    let cycles = 12;

    let mut unlimited = room(5);
    perturb(&mut unlimited);
    for _ in 0..cycles {
        assert!(unlimited.update(&config, &TickBudget::unlimited()));
    }

    let mut boxed = room(6);
    perturb(&mut boxed);
    let mut completed = 0;
    let mut pauses = 0;
    let mut calls = 0;
    while completed < cycles {
        calls += 1;
        assert!(calls < 10_000, "time-boxed grid made no progress");
        if boxed.update(&config, &TickBudget::new(Duration::ZERO)) {
            completed += 1;
        } else {
            assert!(boxed.is_processing_paused());
            pauses += 1;
        }
    }

    assert!(pauses > 0, "a zero budget has to split the work");
    assert_eq!(boxed.update_counter(), unlimited.update_counter());
    assert_eq!(boxed.snapshot(), unlimited.snapshot());
}

#[test]
fn settled_room_stays_untouched() {
    let mut grid = room(7);
    let config = AtmosConfig::default();
    for _ in 0..3 {
        grid.update(&config, &TickBudget::unlimited());
    }
    grid.drain_outbox();
    let before = grid.snapshot();

    for _ in 0..5 {
        grid.update(&config, &TickBudget::unlimited());
    }

    let outbox = grid.drain_outbox();
    assert!(outbox.is_empty(), "nothing should be re-flagged: {:?}", outbox);
    assert_eq!(grid.stats().excited_groups, 0);
    assert_eq!(grid.stats().active_tiles, 0);
    assert_eq!(grid.snapshot(), before);
}

#[test]
fn diffusion_does_not_depend_on_tile_order() {
    let config = AtmosConfig {
        monstermos_equalization: false,
        max_process_time_ms: 1000.0,
        ..sealed_config()
    };
    let spiked_run = |spike: IVec2| {
        let mut grid = GridAtmosphere::from_layout(
            Entity::from_raw(8),
            &["#####", "#...#", "#####"],
            Arc::new(GasRegistry::default()),
        )
        .expect("valid layout");
        grid.tile_mixture_mut(spike, true)
            .expect("floor")
            .adjust_moles(GasType::Oxygen, 100.0);
        grid.update(&config, &TickBudget::unlimited());
        grid
    };
    let baseline = GasMixture::new_air(CELL_VOLUME, T20C).get_moles(GasType::Oxygen);

    let west = spiked_run(IVec2::new(1, 1));
    let east = spiked_run(IVec2::new(3, 1));

    let oxygen = |grid: &GridAtmosphere, x: i32| {
        grid.tile_mixture(IVec2::new(x, 1))
            .expect("air")
            .get_moles(GasType::Oxygen)
    };
    assert!(oxygen(&west, 2) > baseline, "the middle tile takes from the west spike");
    assert!(oxygen(&east, 2) > baseline, "the middle tile takes from the east spike");
    assert!((oxygen(&west, 3) - baseline).abs() < 1e-4, "the west spike reached the east end in one tick");
    assert!((oxygen(&east, 1) - baseline).abs() < 1e-4, "the east spike reached the west end in one tick");
    assert!((oxygen(&west, 3) - oxygen(&east, 1)).abs() < 1e-4);
}
