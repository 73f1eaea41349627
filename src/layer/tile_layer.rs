use std::collections::BTreeSet;

use macroquad::math::IVec2;

use super::{diff_cells, LayerBase, Transform};
use crate::geom::{Region, TileRect};
use crate::tileset::{TileRef, TilesetId};

/// Dense, row-major grid of optional tile references.
#[derive(Debug, Clone, PartialEq)]
pub struct TileLayer {
    pub(crate) base: LayerBase,
    cells: Vec<Option<TileRef>>,
}

impl TileLayer {
    /// Empty layer covering `bounds`.
    pub fn new(name: impl Into<String>, bounds: TileRect) -> Self {
        Self::from_base(LayerBase::new(name, bounds))
    }

    pub(crate) fn from_base(base: LayerBase) -> Self {
        Self {
            cells: vec![None; base.bounds.area()],
            base,
        }
    }

    /// Layer rectangle in map cells.
    pub fn bounds(&self) -> TileRect {
        self.base.bounds
    }

    /// Display name.
    pub fn name(&self) -> &str {
        &self.base.name
    }

    /// True when the layer refuses edits.
    pub fn is_locked(&self) -> bool {
        self.base.locked
    }

    #[inline]
    fn index(&self, x: i32, y: i32) -> Option<usize> {
        let b = self.base.bounds;
        b.contains(x, y)
            .then(|| ((y - b.y) * b.width + (x - b.x)) as usize)
    }

    /// Tile at a map cell; `None` when empty or outside the layer.
    pub fn tile_at(&self, x: i32, y: i32) -> Option<TileRef> {
        self.index(x, y).and_then(|i| self.cells[i])
    }

    /// Stores `tile` at a map cell. Returns whether the cell changed; cells
    /// outside the layer are ignored.
    pub fn set_tile_at(&mut self, x: i32, y: i32, tile: Option<TileRef>) -> bool {
        match self.index(x, y) {
            Some(i) if self.cells[i] != tile => {
                self.cells[i] = tile;
                true
            }
            _ => false,
        }
    }

    /// Non-empty cells in row-major order.
    pub fn tiles(&self) -> impl Iterator<Item = (IVec2, TileRef)> + '_ {
        self.base
            .bounds
            .cells()
            .zip(self.cells.iter())
            .filter_map(|(pos, cell)| cell.map(|t| (pos, t)))
    }

    /// Whether any cell references the tileset.
    pub fn uses_tileset(&self, tileset: TilesetId) -> bool {
        self.cells.iter().flatten().any(|t| t.tileset == tileset)
    }

    /// Local ids of the tileset referenced by this layer.
    pub fn used_tile_ids(&self, tileset: TilesetId) -> BTreeSet<u32> {
        self.cells
            .iter()
            .flatten()
            .filter(|t| t.tileset == tileset)
            .map(|t| t.id)
            .collect()
    }

    /// Empties every cell referencing the tileset; returns how many.
    pub fn clear_tileset(&mut self, tileset: TilesetId) -> usize {
        let mut cleared = 0;
        for cell in self.cells.iter_mut() {
            if matches!(cell, Some(t) if t.tileset == tileset) {
                *cell = None;
                cleared += 1;
            }
        }
        cleared
    }

    pub(crate) fn transform(&mut self, t: Transform) {
        let b = self.base.bounds;
        let (nw, nh) = if t.swaps_axes() {
            (b.height, b.width)
        } else {
            (b.width, b.height)
        };
        let mut out = vec![None; self.cells.len()];
        for y in 0..b.height {
            for x in 0..b.width {
                let to = t.map_cell(x, y, b.width, b.height);
                out[(to.y * nw + to.x) as usize] = self.cells[(y * b.width + x) as usize];
            }
        }
        self.cells = out;
        self.base.bounds = TileRect::new(b.x, b.y, nw, nh);
    }

    pub(crate) fn copy_from(&mut self, other: &TileLayer) {
        let Some(area) = self.bounds().intersection(&other.bounds()) else {
            return;
        };
        for c in area.cells() {
            self.set_tile_at(c.x, c.y, other.tile_at(c.x, c.y));
        }
    }

    pub(crate) fn masked_copy_from(&mut self, source: &TileLayer, mask: &Region) {
        for c in mask.iter() {
            self.set_tile_at(c.x, c.y, source.tile_at(c.x, c.y));
        }
    }

    pub(crate) fn merge_onto(&self, target: &mut TileLayer) {
        for (pos, tile) in self.tiles() {
            target.set_tile_at(pos.x, pos.y, Some(tile));
        }
    }

    pub(crate) fn create_diff(&self, other: &TileLayer) -> Option<TileLayer> {
        let changed = diff_cells(
            self.bounds(),
            other.bounds(),
            |x, y| self.tile_at(x, y),
            |x, y| other.tile_at(x, y),
        );
        let area = changed.bounds()?;
        let mut diff = TileLayer::from_base(self.base.with_bounds(area));
        for c in changed.iter() {
            diff.set_tile_at(c.x, c.y, other.tile_at(c.x, c.y));
        }
        Some(diff)
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn cells_are_addressed_in_map_space() {
        let mut layer = TileLayer::new("l", TileRect::new(10, 5, 2, 2));
        let t = Some(TileRef::new(TilesetId(1), 3));
        assert!(layer.set_tile_at(11, 6, t));
        assert!(!layer.set_tile_at(11, 6, t));
        assert!(!layer.set_tile_at(0, 0, t));
        assert_eq!(layer.tile_at(11, 6), t);
        assert_eq!(layer.tile_at(0, 0), None);
    }

    #[test]
    fn clear_tileset_only_touches_matching_refs() {
        let mut layer = TileLayer::new("l", TileRect::new(0, 0, 3, 1));
        layer.set_tile_at(0, 0, Some(TileRef::new(TilesetId(1), 0)));
        layer.set_tile_at(1, 0, Some(TileRef::new(TilesetId(2), 0)));
        layer.set_tile_at(2, 0, Some(TileRef::new(TilesetId(1), 4)));

        assert_eq!(
            layer.used_tile_ids(TilesetId(1)).into_iter().collect::<Vec<_>>(),
            [0, 4]
        );
        assert_eq!(layer.clear_tileset(TilesetId(1)), 2);
        assert!(!layer.uses_tileset(TilesetId(1)));
        assert!(layer.uses_tileset(TilesetId(2)));
    }
}
