use super::{diff_cells, LayerBase, Transform};
use crate::geom::{Region, TileRect};

/// Highlighted set of cells, clipped to the layer rectangle.
#[derive(Debug, Clone, PartialEq)]
pub struct SelectionLayer {
    pub(crate) base: LayerBase,
    area: Region,
}

impl SelectionLayer {
    /// Empty selection over a `width`×`height` map.
    pub fn new(width: i32, height: i32) -> Self {
        Self::from_base(LayerBase::new("Selection", TileRect::new(0, 0, width, height)))
    }

    pub(crate) fn from_base(base: LayerBase) -> Self {
        Self {
            base,
            area: Region::new(),
        }
    }

    /// Selection rectangle.
    pub fn bounds(&self) -> TileRect {
        self.base.bounds
    }

    /// Selected cells.
    pub fn selected_area(&self) -> &Region {
        &self.area
    }

    /// Bounding box of the selected cells.
    pub fn selected_bounds(&self) -> Option<TileRect> {
        self.area.bounds()
    }

    /// True when nothing is selected.
    pub fn is_empty(&self) -> bool {
        self.area.is_empty()
    }

    /// Whether the cell is selected.
    pub fn is_selected(&self, x: i32, y: i32) -> bool {
        self.area.contains(x, y)
    }

    fn clipped(&self, region: &Region) -> Region {
        region
            .iter()
            .filter(|c| self.base.bounds.contains(c.x, c.y))
            .collect()
    }

    /// Replaces the selection.
    pub fn select(&mut self, region: &Region) {
        self.area = self.clipped(region);
    }

    /// Replaces the selection with a rectangle.
    pub fn select_rect(&mut self, rect: TileRect) {
        self.select(&Region::from_rect(rect));
    }

    /// Adds cells to the selection.
    pub fn add(&mut self, region: &Region) {
        let extra = self.clipped(region);
        self.area.add(&extra);
    }

    /// Removes cells from the selection.
    pub fn subtract(&mut self, region: &Region) {
        self.area.subtract(region);
    }

    /// Keeps only cells also in `region`.
    pub fn intersect(&mut self, region: &Region) {
        self.area.intersect(region);
    }

    /// Complements the selection within the layer rectangle.
    pub fn invert(&mut self) {
        self.area.invert_within(self.base.bounds);
    }

    /// Deselects everything.
    pub fn clear(&mut self) {
        self.area = Region::new();
    }

    pub(crate) fn translate_area(&mut self, dx: i32, dy: i32) {
        self.area = self.area.translated(dx, dy);
    }

    pub(crate) fn transform(&mut self, t: Transform) {
        let b = self.base.bounds;
        self.area = self
            .area
            .iter()
            .map(|c| {
                let to = t.map_cell(c.x - b.x, c.y - b.y, b.width, b.height);
                to + macroquad::math::ivec2(b.x, b.y)
            })
            .collect();
        if t.swaps_axes() {
            self.base.bounds = TileRect::new(b.x, b.y, b.height, b.width);
        }
    }

    fn set_cell(&mut self, x: i32, y: i32, on: bool) {
        if on {
            self.area.insert(x, y);
        } else {
            self.area.remove(x, y);
        }
    }

    pub(crate) fn copy_from(&mut self, other: &SelectionLayer) {
        let Some(area) = self.bounds().intersection(&other.bounds()) else {
            return;
        };
        for c in area.cells() {
            self.set_cell(c.x, c.y, other.is_selected(c.x, c.y));
        }
    }

    pub(crate) fn masked_copy_from(&mut self, source: &SelectionLayer, mask: &Region) {
        for c in mask.iter() {
            self.set_cell(c.x, c.y, source.is_selected(c.x, c.y));
        }
    }

    pub(crate) fn merge_onto(&self, target: &mut SelectionLayer) {
        target.add(&self.area);
    }

    pub(crate) fn create_diff(&self, other: &SelectionLayer) -> Option<SelectionLayer> {
        let changed = diff_cells(
            self.bounds(),
            other.bounds(),
            |x, y| self.is_selected(x, y),
            |x, y| other.is_selected(x, y),
        );
        let bounds = changed.bounds()?;
        let mut diff = SelectionLayer::from_base(self.base.with_bounds(bounds));
        for c in changed.iter() {
            diff.set_cell(c.x, c.y, other.is_selected(c.x, c.y));
        }
        Some(diff)
    }
}
