//! Battle grid and occupancy table.
//!
//! The map owns one terrain tile and one occupancy slot per cell. Positions
//! are never cached on the objects themselves: an object's position is
//! always derived by locating it in the occupancy table, so code that moves
//! objects cannot leave a stale coordinate behind.
//!
//! All scans run in row-major order (left to right, top to bottom), which
//! keeps "first match" queries reproducible.

use std::fmt;
use std::ops::ControlFlow;

use serde::{Deserialize, Serialize};

use crate::error::{BattleError, Result};
use crate::tile::Tiles;
use crate::warrior::UnitId;

/// A cell coordinate. Signed so that neighbour arithmetic can step off the
/// map and be rejected by bounds checks.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Hash, PartialOrd, Ord, Serialize, Deserialize)]
pub struct GridPos {
    /// Column.
    pub x: i32,
    /// Row.
    pub y: i32,
}

impl GridPos {
    /// Create a new grid position.
    #[must_use]
    pub const fn new(x: i32, y: i32) -> Self {
        Self { x, y }
    }

    /// Manhattan distance to another cell.
    #[must_use]
    pub const fn manhattan(self, other: GridPos) -> u32 {
        self.x.abs_diff(other.x) + self.y.abs_diff(other.y)
    }

    /// The four orthogonal neighbours, in a fixed order (E, S, W, N).
    #[must_use]
    pub const fn neighbors(self) -> [GridPos; 4] {
        [
            GridPos::new(self.x + 1, self.y),
            GridPos::new(self.x, self.y + 1),
            GridPos::new(self.x - 1, self.y),
            GridPos::new(self.x, self.y - 1),
        ]
    }

    /// Returns true if `other` is one orthogonal step away.
    #[must_use]
    pub const fn is_adjacent(self, other: GridPos) -> bool {
        self.manhattan(other) == 1
    }
}

impl fmt::Display for GridPos {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        write!(f, "({}, {})", self.x, self.y)
    }
}

/// Map-scoped identity of a positioned object, assigned sequentially by the
/// map when the object is first placed.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Hash, PartialOrd, Ord, Serialize, Deserialize)]
pub struct ObjId(pub u32);

impl fmt::Display for ObjId {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        write!(f, "obj#{}", self.0)
    }
}

/// What a positioned object is.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Hash, Serialize, Deserialize)]
pub enum OccupantKind {
    /// A combat unit, indexing the battle's warrior arena.
    Warrior(UnitId),
    /// Scenery such as rocks or tree trunks.
    Prop,
}

/// A positioned entity resident in an occupancy slot.
///
/// Holds identity only. The warrior itself lives in the battle's arena and
/// is referenced here by index.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Hash, Serialize, Deserialize)]
pub struct Occupant {
    /// Map-scoped id.
    pub id: ObjId,
    /// Obstacle flag carried from setup. Blocking is decided by occupancy
    /// alone, so a non-obstacle still fills its cell.
    pub obstacle: bool,
    /// What the object is.
    pub kind: OccupantKind,
}

impl Occupant {
    /// The warrior this occupant stands for, if any.
    #[must_use]
    pub const fn unit(&self) -> Option<UnitId> {
        match self.kind {
            OccupantKind::Warrior(unit) => Some(unit),
            OccupantKind::Prop => None,
        }
    }
}

/// Fixed-size battle grid with terrain and single-occupant slots.
#[derive(Debug, Clone, PartialEq, Eq, Hash, Serialize, Deserialize)]
pub struct BattleMap {
    /// Grid width in cells.
    width: u32,
    /// Grid height in cells.
    height: u32,
    /// Terrain in row-major order.
    tiles: Vec<Tiles>,
    /// Occupancy in row-major order.
    slots: Vec<Option<Occupant>>,
    /// Last id handed out.
    last_obj_id: u32,
}

impl BattleMap {
    /// Create a map filled with the default terrain.
    ///
    /// # Panics
    ///
    /// Panics if `width` or `height` is zero.
    #[must_use]
    pub fn new(width: u32, height: u32) -> Self {
        Self::with_tiles(width, height, |_, _| Tiles::default())
    }

    /// Create a map whose terrain is produced by a pure generator.
    ///
    /// # Panics
    ///
    /// Panics if `width` or `height` is zero.
    #[must_use]
    pub fn with_tiles(width: u32, height: u32, generator: impl FnMut(i32, i32) -> Tiles) -> Self {
        assert!(width > 0, "BattleMap width must be positive");
        assert!(height > 0, "BattleMap height must be positive");

        let cell_count = (width as usize) * (height as usize);
        let mut map = Self {
            width,
            height,
            tiles: vec![Tiles::default(); cell_count],
            slots: vec![None; cell_count],
            last_obj_id: 0,
        };
        map.reset_tiles(generator);
        map
    }

    /// Create a map from an explicit row-major tile vector.
    pub fn from_tiles(width: u32, height: u32, tiles: Vec<Tiles>) -> Result<Self> {
        if width == 0 || height == 0 {
            return Err(BattleError::InvalidSetup(format!(
                "map must not be empty ({width}x{height})"
            )));
        }
        let cell_count = (width as usize) * (height as usize);
        if tiles.len() != cell_count {
            return Err(BattleError::InvalidSetup(format!(
                "expected {cell_count} tiles for a {width}x{height} map, got {}",
                tiles.len()
            )));
        }
        Ok(Self {
            width,
            height,
            tiles,
            slots: vec![None; cell_count],
            last_obj_id: 0,
        })
    }

    /// Grid width in cells.
    #[must_use]
    pub const fn width(&self) -> u32 {
        self.width
    }

    /// Grid height in cells.
    #[must_use]
    pub const fn height(&self) -> u32 {
        self.height
    }

    /// Check if a position is within grid bounds.
    #[must_use]
    pub fn in_bounds(&self, pos: GridPos) -> bool {
        pos.x >= 0 && pos.y >= 0 && (pos.x as u32) < self.width && (pos.y as u32) < self.height
    }

    #[inline]
    fn index(&self, pos: GridPos) -> Option<usize> {
        self.in_bounds(pos)
            .then(|| (pos.y as usize) * (self.width as usize) + (pos.x as usize))
    }

    #[inline]
    fn pos_of(&self, index: usize) -> GridPos {
        let width = self.width as usize;
        GridPos::new((index % width) as i32, (index / width) as i32)
    }

    fn checked_index(&self, pos: GridPos) -> Result<usize> {
        self.index(pos).ok_or(BattleError::OutOfBounds(pos))
    }

    /// Terrain at a position, `None` if out of bounds.
    #[must_use]
    pub fn tile(&self, pos: GridPos) -> Option<Tiles> {
        self.index(pos).map(|i| self.tiles[i])
    }

    /// Regenerate all terrain from a generator, in row-major order.
    pub fn reset_tiles(&mut self, mut generator: impl FnMut(i32, i32) -> Tiles) {
        for (i, tile) in self.tiles.iter_mut().enumerate() {
            let width = self.width as usize;
            *tile = generator((i % width) as i32, (i / width) as i32);
        }
    }

    /// All terrain in row-major order.
    #[must_use]
    pub fn tiles(&self) -> &[Tiles] {
        &self.tiles
    }

    /// Create a new positioned object at `pos`, assigning it the next id.
    ///
    /// Returns the new id and whatever occupant had to be evicted.
    pub fn spawn(
        &mut self,
        pos: GridPos,
        kind: OccupantKind,
        obstacle: bool,
    ) -> Result<(ObjId, Option<Occupant>)> {
        self.checked_index(pos)?;
        self.last_obj_id += 1;
        let id = ObjId(self.last_obj_id);
        let evicted = self.place(pos, Occupant { id, obstacle, kind })?;
        Ok((id, evicted))
    }

    /// Put an occupant into a cell.
    ///
    /// If the occupant is already elsewhere on the grid it is moved. If the
    /// cell holds a different occupant, that one is evicted (removed from the
    /// grid, not destroyed) and returned.
    pub fn place(&mut self, pos: GridPos, occupant: Occupant) -> Result<Option<Occupant>> {
        let target = self.checked_index(pos)?;

        if self.slots[target].is_some_and(|o| o.id == occupant.id) {
            return Ok(None);
        }

        if let Some(current) = self.slot_index_of(occupant.id) {
            self.slots[current] = None;
        }

        Ok(self.slots[target].replace(occupant))
    }

    /// Remove an object from the grid, returning where it was.
    pub fn remove(&mut self, id: ObjId) -> Result<(GridPos, Occupant)> {
        let index = self.slot_index_of(id).ok_or(BattleError::NotOnGrid(id))?;
        let occupant = self.slots[index]
            .take()
            .ok_or(BattleError::NotOnGrid(id))?;
        Ok((self.pos_of(index), occupant))
    }

    /// Swap the contents of two cells. Either may be empty.
    pub fn exchange(&mut self, a: GridPos, b: GridPos) -> Result<()> {
        let ia = self.checked_index(a)?;
        let ib = self.checked_index(b)?;
        self.slots.swap(ia, ib);
        Ok(())
    }

    fn slot_index_of(&self, id: ObjId) -> Option<usize> {
        self.slots
            .iter()
            .position(|slot| slot.is_some_and(|o| o.id == id))
    }

    /// Find where an object currently is.
    ///
    /// # Errors
    ///
    /// Returns [`BattleError::NotOnGrid`] if the object is absent. Callers
    /// only locate objects they know are placed, so this is a contract
    /// violation rather than a lookup miss.
    pub fn locate(&self, id: ObjId) -> Result<GridPos> {
        self.slot_index_of(id)
            .map(|i| self.pos_of(i))
            .ok_or(BattleError::NotOnGrid(id))
    }

    /// Find where a warrior currently stands, `None` if off the grid.
    #[must_use]
    pub fn position_of(&self, unit: UnitId) -> Option<GridPos> {
        self.occupants()
            .find(|(_, o)| o.unit() == Some(unit))
            .map(|(pos, _)| pos)
    }

    /// Like [`position_of`](Self::position_of) but for units that must be placed.
    pub fn locate_unit(&self, unit: UnitId) -> Result<GridPos> {
        self.position_of(unit)
            .ok_or(BattleError::UnitNotOnGrid(unit))
    }

    /// The occupant of a cell. Out-of-bounds cells are simply empty.
    #[must_use]
    pub fn at(&self, pos: GridPos) -> Option<&Occupant> {
        self.index(pos).and_then(|i| self.slots[i].as_ref())
    }

    /// The warrior standing in a cell, if any.
    #[must_use]
    pub fn unit_at(&self, pos: GridPos) -> Option<UnitId> {
        self.at(pos).and_then(Occupant::unit)
    }

    /// Find an object by its map id.
    #[must_use]
    pub fn find_by_id(&self, id: ObjId) -> Option<(GridPos, &Occupant)> {
        self.occupants().find(|(_, o)| o.id == id)
    }

    /// True if the cell cannot be entered by a unit with `tile_mask`: it is
    /// out of bounds, occupied, or its terrain is not in the mask.
    #[must_use]
    pub fn blocked(&self, pos: GridPos, tile_mask: Tiles) -> bool {
        match self.index(pos) {
            None => true,
            Some(i) => self.slots[i].is_some() || !self.tiles[i].accepts(tile_mask),
        }
    }

    /// Walkability predicate used by the pathfinder.
    #[must_use]
    pub fn is_spare(&self, pos: GridPos, tile_mask: Tiles) -> bool {
        !self.blocked(pos, tile_mask)
    }

    /// Iterate over all occupied cells in row-major order.
    pub fn occupants(&self) -> impl Iterator<Item = (GridPos, &Occupant)> + '_ {
        self.slots
            .iter()
            .enumerate()
            .filter_map(move |(i, slot)| slot.as_ref().map(|o| (self.pos_of(i), o)))
    }

    /// Visit occupied cells in row-major order until the visitor breaks.
    ///
    /// Returns the break value, or `None` if the scan ran to completion.
    pub fn scan<B>(&self, mut visit: impl FnMut(GridPos, &Occupant) -> ControlFlow<B>) -> Option<B> {
        for (pos, occupant) in self.occupants() {
            if let ControlFlow::Break(value) = visit(pos, occupant) {
                return Some(value);
            }
        }
        None
    }

    /// Number of occupied cells.
    #[must_use]
    pub fn occupied_count(&self) -> usize {
        self.slots.iter().filter(|s| s.is_some()).count()
    }

    /// Verify that no object id appears in more than one slot.
    #[cfg(any(test, feature = "debug-validation"))]
    #[must_use]
    pub fn ids_are_unique(&self) -> bool {
        let mut ids: Vec<u32> = self.occupants().map(|(_, o)| o.id.0).collect();
        let total = ids.len();
        ids.sort_unstable();
        ids.dedup();
        ids.len() == total
    }
}

impl Default for BattleMap {
    /// A 10x6 grass field, the size of the standard skirmish board.
    fn default() -> Self {
        Self::new(10, 6)
    }
}
