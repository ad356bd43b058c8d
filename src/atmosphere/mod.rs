/// Atmospheric simulation module for tile-based gas simulation
pub mod components;
pub mod config;
pub mod constants;
pub mod direction;
pub mod error;
pub mod events;
pub mod excited_group;
pub mod gas;
pub mod grid;
pub mod holder;
pub mod monitoring;
pub mod pipe_net;
pub mod plugin;
pub mod processing;
pub mod reactions;
pub mod system;
pub mod systems;

pub use config::AtmosConfig;
pub use error::AtmosError;
pub use gas::{GasMixture, GasRegistry, GasType};
pub use grid::GridAtmosphere;
pub use plugin::AtmospherePlugin;
pub use system::AtmosphereSystem;
