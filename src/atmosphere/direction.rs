use bevy::math::{IVec2, Vec2};
use bitflags::bitflags;
use serde::{Deserialize, Serialize};

bitflags! {
    /// Set of cardinal directions. Bit order is also the processing order: N, S, E, W.
    #[derive(Debug, Clone, Copy, PartialEq, Eq, Hash, Serialize, Deserialize)]
    pub struct AtmosDirection: u8 {
        const NORTH = 1 << 0;
        const SOUTH = 1 << 1;
        const EAST = 1 << 2;
        const WEST = 1 << 3;
        const ALL = Self::NORTH.bits() | Self::SOUTH.bits() | Self::EAST.bits() | Self::WEST.bits();
    }
}

pub const DIRECTION_COUNT: usize = 4;

impl Default for AtmosDirection {
    fn default() -> Self {
        Self::empty()
    }
}

impl AtmosDirection {
    pub const CARDINALS: [AtmosDirection; DIRECTION_COUNT] = [
        AtmosDirection::NORTH,
        AtmosDirection::SOUTH,
        AtmosDirection::EAST,
        AtmosDirection::WEST,
    ];

    #[inline]
    pub fn from_index(index: usize) -> Self {
        Self::from_bits_truncate(1 << (index % DIRECTION_COUNT))
    }

    /// Index of a single direction; `None` for empty or combined sets.
    pub fn to_index(self) -> Option<usize> {
        if self.bits().count_ones() != 1 {
            return None;
        }
        Some(self.bits().trailing_zeros() as usize)
    }

    /// Mirror every direction in the set.
    pub fn opposite(self) -> Self {
        let bits = self.bits();
        Self::from_bits_truncate(((bits & 0b0101) << 1) | ((bits & 0b1010) >> 1))
    }

    /// Grid step for a single direction. Y grows northwards.
    pub fn offset(self) -> IVec2 {
        match self {
            d if d == Self::NORTH => IVec2::Y,
            d if d == Self::SOUTH => IVec2::NEG_Y,
            d if d == Self::EAST => IVec2::X,
            d if d == Self::WEST => IVec2::NEG_X,
            _ => IVec2::ZERO,
        }
    }

    pub fn to_vec2(self) -> Vec2 {
        self.offset().as_vec2()
    }
}

#[inline]
pub(crate) fn opposite_index(index: usize) -> usize {
    index ^ 1
}
