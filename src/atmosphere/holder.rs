use super::components::TileAtmosphere;
use super::gas::GasMixture;
use super::reactions::HolderKind;

/// Anything that owns a gas mixture: a tile, a pipe network or a map.
pub trait GasMixtureHolder {
    fn holder_kind(&self) -> HolderKind;

    fn air(&self) -> Option<&GasMixture>;

    /// Mutable access; read-only holders return `None`.
    fn air_mut(&mut self) -> Option<&mut GasMixture>;
}

impl GasMixtureHolder for TileAtmosphere {
    fn holder_kind(&self) -> HolderKind {
        HolderKind::Tile
    }

    fn air(&self) -> Option<&GasMixture> {
        self.air.as_ref()
    }

    fn air_mut(&mut self) -> Option<&mut GasMixture> {
        self.air.as_mut()
    }
}

/// Map-wide atmosphere every grid on the map is exposed to where it has no floor.
///
/// Grids only ever see a read-only copy of it.
#[derive(Debug, Clone, PartialEq)]
pub struct MapAtmosphere {
    mixture: GasMixture,
    space: bool,
}

impl Default for MapAtmosphere {
    fn default() -> Self {
        Self::space()
    }
}

impl MapAtmosphere {
    pub fn space() -> Self {
        Self {
            mixture: GasMixture::space(),
            space: true,
        }
    }

    /// A breathable or toxic planet atmosphere.
    pub fn planet(mut mixture: GasMixture) -> Self {
        mixture.mark_immutable();
        Self {
            mixture,
            space: false,
        }
    }

    pub fn is_space(&self) -> bool {
        self.space
    }

    pub fn mixture(&self) -> &GasMixture {
        &self.mixture
    }
}

impl GasMixtureHolder for MapAtmosphere {
    fn holder_kind(&self) -> HolderKind {
        HolderKind::Map
    }

    fn air(&self) -> Option<&GasMixture> {
        Some(&self.mixture)
    }

    fn air_mut(&mut self) -> Option<&mut GasMixture> {
        None
    }
}
