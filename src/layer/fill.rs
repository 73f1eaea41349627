use super::TileLayer;
use crate::geom::{Region, TileRect};
use crate::tileset::TileRef;

impl TileLayer {
    /// Pour fill starting at `(x, y)`, replacing `old` with `new`.
    ///
    /// With a non-empty `mask` the fill ignores connectivity: if the start
    /// cell is inside the mask, every masked cell of the layer becomes `new`,
    /// otherwise nothing happens. Without one, the 4-connected area of `old`
    /// around the start cell is replaced.
    ///
    /// Returns the rectangle that may have changed, `None` for a no-op.
    pub fn pour(
        &mut self,
        x: i32,
        y: i32,
        old: Option<TileRef>,
        new: Option<TileRef>,
        mask: Option<&Region>,
    ) -> Option<TileRect> {
        if old == new || self.is_locked() || !self.bounds().contains(x, y) {
            return None;
        }
        match mask.filter(|m| !m.is_empty()) {
            Some(mask) => self.fill_mask(x, y, new, mask),
            None => self.flood(x, y, old, new),
        }
    }

    fn fill_mask(&mut self, x: i32, y: i32, new: Option<TileRef>, mask: &Region) -> Option<TileRect> {
        if !mask.contains(x, y) {
            return None;
        }
        let area = mask.bounds()?.intersection(&self.bounds())?;
        for c in mask.iter() {
            self.set_tile_at(c.x, c.y, new);
        }
        Some(area)
    }

    fn flood(&mut self, x: i32, y: i32, old: Option<TileRef>, new: Option<TileRef>) -> Option<TileRect> {
        if self.tile_at(x, y) != old {
            return None;
        }
        let mut area: Option<TileRect> = None;
        let mut stack = vec![(x, y)];
        while let Some((cx, cy)) = stack.pop() {
            if !self.bounds().contains(cx, cy) || self.tile_at(cx, cy) != old {
                continue;
            }
            self.set_tile_at(cx, cy, new);
            let cell = TileRect::new(cx, cy, 1, 1);
            area = Some(area.map_or(cell, |a| a.union(&cell)));
            stack.extend([(cx, cy - 1), (cx, cy + 1), (cx - 1, cy), (cx + 1, cy)]);
        }
        area
    }
}
