//! Terrain classification.
//!
//! Every cell holds exactly one terrain class. Units carry a mask of the
//! classes they can stand on, and walkability is the intersection of the two.

use bitflags::bitflags;

bitflags! {
    /// Terrain classes, composable into masks.
    ///
    /// A single cell uses exactly one flag; a unit's standable mask may combine
    /// several. [`Tiles::empty()`] is the "no terrain" value and matches nothing.
    #[derive(Clone, Copy, Debug, PartialEq, Eq, Hash, PartialOrd, Ord, serde::Serialize, serde::Deserialize)]
    pub struct Tiles: u16 {
        /// Water.
        const WATER = 0x01;
        /// Lava.
        const LAVA  = 0x02;
        /// Grass.
        const GRASS = 0x04;
        /// Rock.
        const ROCK  = 0x08;
        /// Soil.
        const SOIL  = 0x10;
        /// Hill.
        const HILL  = 0x20;
        /// Any land a regular foot unit can stand on.
        const LAND  = Self::GRASS.bits() | Self::SOIL.bits() | Self::HILL.bits();
    }
}

impl Tiles {
    /// Returns true if a unit with `mask` may stand on this terrain.
    #[must_use]
    pub const fn accepts(self, mask: Tiles) -> bool {
        self.intersects(mask)
    }
}

impl Default for Tiles {
    fn default() -> Self {
        Self::GRASS
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn test_mask_intersection() {
        assert!(Tiles::GRASS.accepts(Tiles::LAND));
        assert!(!Tiles::WATER.accepts(Tiles::LAND));
        assert!(Tiles::WATER.accepts(Tiles::all()));
        assert!(!Tiles::GRASS.accepts(Tiles::empty()));
    }

    #[test]
    fn test_ron_roundtrip_uses_flag_names() {
        let text = ron::to_string(&(Tiles::GRASS | Tiles::HILL)).unwrap();
        let parsed: Tiles = ron::from_str(&text).unwrap();
        assert_eq!(parsed, Tiles::GRASS | Tiles::HILL);
    }
}
