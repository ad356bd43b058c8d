use bevy::prelude::{Entity, IVec2};
use thiserror::Error;

use super::pipe_net::PipeNodeId;

#[derive(Debug, Error)]
pub enum AtmosError {
    #[error("failed to read atmosphere config: {0}")]
    Io(#[from] std::io::Error),

    #[error("failed to parse atmosphere config: {0}")]
    ConfigParse(#[from] toml::de::Error),

    #[error("invalid atmosphere config: {0}")]
    InvalidConfig(String),

    #[error("grid {0:?} has no atmosphere")]
    UnknownGrid(Entity),

    #[error("map {0:?} has no atmosphere")]
    UnknownMap(Entity),

    #[error("unknown pipe node {0:?}")]
    UnknownPipeNode(PipeNodeId),

    #[error("tile {0} is outside the grid")]
    OutOfBounds(IVec2),

    #[error("snapshot holds {found} tiles, grid needs {expected}")]
    SnapshotMismatch { expected: usize, found: usize },

    #[error("snapshot dimensions {width}x{height} are too large")]
    SnapshotTooLarge { width: u32, height: u32 },

    #[error("unknown layout symbol {0:?}")]
    InvalidLayout(char),
}
