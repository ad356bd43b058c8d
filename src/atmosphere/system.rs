use std::collections::BTreeMap;
use std::sync::Arc;

use bevy::log::{info, trace};
use bevy::prelude::*;
use bevy::utils::Instant;
use rayon::prelude::*;

use super::components::TileGeometry;
use super::config::AtmosConfig;
use super::error::AtmosError;
use super::events::AtmosOutbox;
use super::gas::{GasMixture, GasRegistry};
use super::grid::GridAtmosphere;
use super::holder::{GasMixtureHolder, MapAtmosphere};
use super::processing::TickBudget;
use super::reactions::{HolderKind, ReactionContext, ReactionResult};

/// Entry point for everything outside the simulation: owns every grid and map atmosphere
/// and drives their ticks.
#[derive(Resource)]
pub struct AtmosphereSystem {
    registry: Arc<GasRegistry>,
    grids: BTreeMap<Entity, GridAtmosphere>,
    maps: BTreeMap<Entity, MapAtmosphere>,
    accumulator: f32,
}

impl Default for AtmosphereSystem {
    fn default() -> Self {
        Self::new(Arc::new(GasRegistry::default()))
    }
}

impl AtmosphereSystem {
    pub fn new(registry: Arc<GasRegistry>) -> Self {
        Self {
            registry,
            grids: BTreeMap::new(),
            maps: BTreeMap::new(),
            accumulator: 0.0,
        }
    }

    /// Shared gas and reaction table. Grids added to this system should be built with it.
    pub fn registry(&self) -> &Arc<GasRegistry> {
        &self.registry
    }

    /// Register a grid, replacing any previous atmosphere with the same uid. A grid that
    /// already names a known map picks up that map's atmosphere.
    pub fn add_grid(&mut self, mut grid: GridAtmosphere) -> Option<GridAtmosphere> {
        if let Some(map) = grid.map() {
            if let Some(atmosphere) = self.maps.get(&map) {
                grid.set_map_atmosphere(Some(map), atmosphere.clone());
            }
        }
        info!(
            "atmosphere added for grid {:?} ({}x{})",
            grid.uid(),
            grid.width(),
            grid.height()
        );
        self.grids.insert(grid.uid(), grid)
    }

    pub fn remove_grid(&mut self, uid: Entity) -> Option<GridAtmosphere> {
        let removed = self.grids.remove(&uid);
        if removed.is_some() {
            info!("atmosphere removed for grid {:?}", uid);
        }
        removed
    }

    pub fn grid(&self, uid: Entity) -> Option<&GridAtmosphere> {
        self.grids.get(&uid)
    }

    pub fn grid_mut(&mut self, uid: Entity) -> Option<&mut GridAtmosphere> {
        self.grids.get_mut(&uid)
    }

    pub fn grids(&self) -> impl Iterator<Item = &GridAtmosphere> {
        self.grids.values()
    }

    /// Set a map's atmosphere and push a read-only copy to every grid on it.
    pub fn set_map_atmosphere(&mut self, map: Entity, atmosphere: MapAtmosphere) {
        for grid in self.grids.values_mut() {
            if grid.map() == Some(map) {
                grid.set_map_atmosphere(Some(map), atmosphere.clone());
            }
        }
        self.maps.insert(map, atmosphere);
    }

    pub fn map_atmosphere(&self, map: Entity) -> Option<&MapAtmosphere> {
        self.maps.get(&map)
    }

    /// Place a grid on a registered map.
    pub fn attach_grid_to_map(&mut self, grid: Entity, map: Entity) -> Result<(), AtmosError> {
        let atmosphere = self.maps.get(&map).ok_or(AtmosError::UnknownMap(map))?.clone();
        self.grids
            .get_mut(&grid)
            .ok_or(AtmosError::UnknownGrid(grid))?
            .set_map_atmosphere(Some(map), atmosphere);
        Ok(())
    }

    pub fn get_tile_mixture(&self, grid: Entity, position: IVec2) -> Option<&GasMixture> {
        self.grids.get(&grid)?.tile_mixture(position)
    }

    pub fn tile_mixture_mut(
        &mut self,
        grid: Entity,
        position: IVec2,
        excite: bool,
    ) -> Option<&mut GasMixture> {
        self.grids.get_mut(&grid)?.tile_mixture_mut(position, excite)
    }

    /// Gas surrounding something at `position`: the tile's gas when it stands on a grid,
    /// otherwise the map's atmosphere.
    pub fn containing_mixture(
        &self,
        grid: Option<Entity>,
        map: Option<Entity>,
        position: IVec2,
    ) -> Option<&GasMixture> {
        if let Some(grid) = grid.and_then(|uid| self.grids.get(&uid)) {
            if grid.index_of(position).is_some() {
                return grid.tile_mixture(position);
            }
        }
        map.and_then(|uid| self.maps.get(&uid)).map(MapAtmosphere::mixture)
    }

    /// Whether a position is open to space. Unknown grids and maps count as space.
    pub fn is_tile_space(&self, grid: Option<Entity>, map: Option<Entity>, position: IVec2) -> bool {
        if let Some(space) = grid
            .and_then(|uid| self.grids.get(&uid))
            .and_then(|grid| grid.is_space(position))
        {
            return space;
        }
        map.and_then(|uid| self.maps.get(&uid))
            .map_or(true, MapAtmosphere::is_space)
    }

    /// Inject gas into a standalone mixture.
    pub fn merge(&self, target: &mut GasMixture, source: &GasMixture) {
        target.merge(source, &self.registry);
    }

    /// Inject gas into a tile and wake it. `Ok(false)` when the tile holds no gas.
    pub fn merge_into_tile(
        &mut self,
        grid: Entity,
        position: IVec2,
        source: &GasMixture,
    ) -> Result<bool, AtmosError> {
        let grid = self.grids.get_mut(&grid).ok_or(AtmosError::UnknownGrid(grid))?;
        if grid.index_of(position).is_none() {
            return Err(AtmosError::OutOfBounds(position));
        }
        Ok(grid.merge_into_tile(position, source))
    }

    pub fn set_geometry(
        &mut self,
        grid: Entity,
        position: IVec2,
        geometry: TileGeometry,
    ) -> Result<(), AtmosError> {
        self.grids
            .get_mut(&grid)
            .ok_or(AtmosError::UnknownGrid(grid))?
            .set_geometry(position, geometry)
    }

    /// Queue a tile for revalidation on the next tick.
    pub fn invalidate_tile(&mut self, grid: Entity, position: IVec2) -> Result<(), AtmosError> {
        let grid = self.grids.get_mut(&grid).ok_or(AtmosError::UnknownGrid(grid))?;
        if grid.invalidate_tile(position) {
            Ok(())
        } else {
            Err(AtmosError::OutOfBounds(position))
        }
    }

    /// React a standalone mixture, e.g. a gas tank.
    pub fn react(&self, mixture: &mut GasMixture, holder: HolderKind) -> ReactionResult {
        let mut context = ReactionContext::new(holder);
        self.registry.react(mixture, &mut context)
    }

    /// React whatever gas a holder exposes. Read-only holders never react.
    pub fn react_holder(&self, holder: &mut dyn GasMixtureHolder) -> ReactionResult {
        let kind = holder.holder_kind();
        match holder.air_mut() {
            Some(air) => self.react(air, kind),
            None => ReactionResult::empty(),
        }
    }

    /// Moles on every registered grid, pipes included.
    pub fn total_moles(&self) -> f32 {
        self.grids.values().map(GridAtmosphere::total_moles).sum()
    }

    /// Run one budgeted tick on every grid in parallel. Returns true when every grid
    /// finished its cycle.
    pub fn tick(&mut self, config: &AtmosConfig) -> bool {
        let budget = TickBudget::new(config.max_process_time());
        let started = Instant::now();

        let paused = self
            .grids
            .par_iter_mut()
            .map(|(_, grid)| grid.update(config, &budget))
            .filter(|finished| !finished)
            .count();

        trace!(
            "atmos tick over {} grids took {:?}, {} paused",
            self.grids.len(),
            started.elapsed(),
            paused
        );
        paused == 0
    }

    /// Advance the tick clock by `delta_seconds` and run at most one tick when it is due.
    /// Returns whether a tick ran.
    pub fn update(&mut self, config: &AtmosConfig, delta_seconds: f32) -> bool {
        if !config.simulation_enabled {
            return false;
        }
        let interval = config.tick_interval().as_secs_f32();
        self.accumulator += delta_seconds.max(0.0);
        if self.accumulator < interval {
            return false;
        }
        // Never owe more than one extra tick after a stall.
        self.accumulator = (self.accumulator - interval).min(interval);
        self.tick(config);
        true
    }

    /// Everything the grids produced since the last call, per grid.
    pub fn drain_events(&mut self) -> Vec<(Entity, AtmosOutbox)> {
        self.grids
            .iter_mut()
            .map(|(uid, grid)| (*uid, grid.drain_outbox()))
            .filter(|(_, outbox)| !outbox.is_empty())
            .collect()
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use crate::atmosphere::constants::*;
    use crate::atmosphere::gas::GasType;

    fn system_with_room() -> (AtmosphereSystem, Entity) {
        let mut system = AtmosphereSystem::default();
        let uid = Entity::from_raw(20);
        let grid = GridAtmosphere::from_layout(
            uid,
            &["#####", "#...#", "#####"],
            Arc::clone(system.registry()),
        )
        .expect("valid layout");
        system.add_grid(grid);
        (system, uid)
    }

    #[test]
    fn reads_fail_soft_for_unknown_grids_and_tiles() {
        let (system, uid) = system_with_room();
        assert!(system.get_tile_mixture(Entity::from_raw(99), IVec2::ONE).is_none());
        assert!(system.get_tile_mixture(uid, IVec2::new(40, 40)).is_none());
        assert!(system.get_tile_mixture(uid, IVec2::new(2, 1)).is_some());
        assert!(system.is_tile_space(Some(Entity::from_raw(99)), None, IVec2::ZERO));
        assert!(!system.is_tile_space(Some(uid), None, IVec2::new(2, 1)));
    }

    #[test]
    fn writes_report_unknown_grids() {
        let (mut system, uid) = system_with_room();
        let gas = GasMixture::new(CELL_VOLUME, T20C).with_moles(GasType::Oxygen, 1.0);
        let ghost = Entity::from_raw(99);

        assert!(matches!(
            system.merge_into_tile(ghost, IVec2::ONE, &gas),
            Err(AtmosError::UnknownGrid(_))
        ));
        assert!(matches!(
            system.merge_into_tile(uid, IVec2::new(-1, 0), &gas),
            Err(AtmosError::OutOfBounds(_))
        ));
        assert!(matches!(system.merge_into_tile(uid, IVec2::new(0, 0), &gas), Ok(false)));
        assert!(matches!(system.merge_into_tile(uid, IVec2::new(1, 1), &gas), Ok(true)));
        assert!(matches!(
            system.attach_grid_to_map(uid, Entity::from_raw(5)),
            Err(AtmosError::UnknownMap(_))
        ));
    }

    #[test]
    fn planet_map_feeds_grids_and_containing_mixture() {
        let mut system = AtmosphereSystem::default();
        let map = Entity::from_raw(30);
        let uid = Entity::from_raw(31);
        system.set_map_atmosphere(map, MapAtmosphere::planet(GasMixture::new_air(CELL_VOLUME, T20C)));
        let grid = GridAtmosphere::from_layout(uid, &["#.#", "# #"], Arc::clone(system.registry()))
            .expect("valid layout");
        system.add_grid(grid);
        system.attach_grid_to_map(uid, map).expect("known grid and map");
        system
            .grid_mut(uid)
            .expect("grid")
            .revalidate_all();

        assert!(!system.is_tile_space(Some(uid), Some(map), IVec2::new(1, 0)));
        let outside = system
            .containing_mixture(Some(uid), Some(map), IVec2::new(50, 50))
            .expect("map air");
        assert!((outside.pressure() - ONE_ATMOSPHERE).abs() < 0.5);
        assert!(system.containing_mixture(None, None, IVec2::ZERO).is_none());
    }

    #[test]
    fn update_runs_one_tick_per_interval() {
        let (mut system, uid) = system_with_room();
        let config = AtmosConfig::default();
        let interval = config.tick_interval().as_secs_f32();

        assert!(!system.update(&config, interval * 0.5));
        assert!(system.update(&config, interval * 0.6));
        assert!(!system.update(&config, interval * 0.1));
        assert!(system.grid(uid).expect("grid").update_counter() > 1);

        let disabled = AtmosConfig {
            simulation_enabled: false,
            ..Default::default()
        };
        assert!(!system.update(&disabled, interval * 10.0));
    }

    #[test]
    fn react_holder_skips_read_only_holders() {
        let system = AtmosphereSystem::default();
        let mut planet = MapAtmosphere::planet(
            GasMixture::new_air(CELL_VOLUME, 2000.0).with_moles(GasType::Plasma, 50.0),
        );
        assert!(system.react_holder(&mut planet).is_empty());

        let mut tank = GasMixture::new_air(CELL_VOLUME, 2000.0).with_moles(GasType::Plasma, 50.0);
        let result = system.react(&mut tank, HolderKind::Detached);
        assert!(result.contains(ReactionResult::REACTING));
        assert!(tank.get_moles(GasType::Plasma) < 50.0);
    }
}
