//! Read-only views of a plane for rendering.
//!
//! A snapshot holds the layer versions that were current when it was taken.
//! Later edits swap new versions into the plane and never touch these.

use std::sync::Arc;

use macroquad::math::IVec2;

use crate::geom::TileRect;
use crate::layer::MapLayer;
use crate::plane::MultilayerPlane;
use crate::tileset::TileRef;

/// Side of a culling chunk, in cells.
pub const CHUNK_SIZE: i32 = 16;

/// Chunk grid coordinate.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Hash, PartialOrd, Ord)]
pub struct ChunkCoord {
    /// Chunk column.
    pub x: i32,
    /// Chunk row.
    pub y: i32,
}

#[inline]
fn cell_to_chunk(x: i32, y: i32) -> ChunkCoord {
    ChunkCoord {
        x: x.div_euclid(CHUNK_SIZE),
        y: y.div_euclid(CHUNK_SIZE),
    }
}

impl ChunkCoord {
    /// Cells covered by the chunk.
    pub fn rect(self) -> TileRect {
        TileRect::new(
            self.x * CHUNK_SIZE,
            self.y * CHUNK_SIZE,
            CHUNK_SIZE,
            CHUNK_SIZE,
        )
    }
}

/// Chunks touching `view`, row by row.
pub fn chunks_in_rect(view: TileRect) -> Vec<ChunkCoord> {
    if view.is_empty() {
        return Vec::new();
    }
    let min = cell_to_chunk(view.x, view.y);
    let max = cell_to_chunk(view.right() - 1, view.bottom() - 1);

    let mut coords = Vec::new();
    for cy in min.y..=max.y {
        for cx in min.x..=max.x {
            coords.push(ChunkCoord { x: cx, y: cy });
        }
    }
    coords
}

/// One painted cell returned by [`PlaneSnapshot::visible_cells`].
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub struct VisibleCell {
    /// Stack position of the layer, bottom first.
    pub layer: usize,
    /// Map cell.
    pub cell: IVec2,
    /// Tile painted there.
    pub tile: TileRef,
}

/// Frozen layer stack.
#[derive(Debug, Clone)]
pub struct PlaneSnapshot {
    width: i32,
    height: i32,
    layers: Vec<Arc<MapLayer>>,
}

impl PlaneSnapshot {
    /// Captures the current layer versions of `plane`.
    pub fn capture(plane: &MultilayerPlane) -> Self {
        Self {
            width: plane.width(),
            height: plane.height(),
            layers: plane.snapshot_layers(),
        }
    }

    /// Plane size at capture time.
    pub fn size(&self) -> (i32, i32) {
        (self.width, self.height)
    }

    /// Captured layers, bottom first.
    pub fn layers(&self) -> &[Arc<MapLayer>] {
        &self.layers
    }

    /// Non-empty cells of visible tile layers inside `view`.
    ///
    /// Ordered by layer, then chunk row and column, then cell row and
    /// column inside the chunk.
    pub fn visible_cells(&self, view: TileRect) -> Vec<VisibleCell> {
        let mut out = Vec::new();
        for (index, layer) in self.layers.iter().enumerate() {
            if !layer.is_visible() {
                continue;
            }
            let Some(tiles) = layer.as_tiles() else {
                continue;
            };
            let Some(area) = view.intersection(&tiles.bounds()) else {
                continue;
            };
            for chunk in chunks_in_rect(area) {
                let Some(part) = chunk.rect().intersection(&area) else {
                    continue;
                };
                for cell in part.cells() {
                    if let Some(tile) = tiles.tile_at(cell.x, cell.y) {
                        out.push(VisibleCell {
                            layer: index,
                            cell,
                            tile,
                        });
                    }
                }
            }
        }
        out
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use crate::layer::TileLayer;
    use crate::tileset::TilesetId;
    use macroquad::math::ivec2;

    fn t(id: u32) -> Option<TileRef> {
        Some(TileRef {
            tileset: TilesetId(1),
            id,
        })
    }

    #[test]
    fn chunks_come_back_row_major() {
        let coords = chunks_in_rect(TileRect::new(-1, 0, 40, 20));
        assert_eq!(coords.first(), Some(&ChunkCoord { x: -1, y: 0 }));
        assert!(coords
            .windows(2)
            .all(|w| (w[0].y, w[0].x) < (w[1].y, w[1].x)));
        assert_eq!(coords.len(), 4 * 2);
        assert!(chunks_in_rect(TileRect::default()).is_empty());
    }

    #[test]
    fn visible_cells_are_ordered_by_layer_then_chunk() {
        let mut plane = MultilayerPlane::new(40, 40);
        let mut a = TileLayer::new("a", plane.bounds());
        a.set_tile_at(20, 0, t(1)); // chunk (1,0)
        a.set_tile_at(3, 17, t(2)); // chunk (0,1)
        a.set_tile_at(2, 2, t(3)); // chunk (0,0)
        let mut b = TileLayer::new("b", plane.bounds());
        b.set_tile_at(0, 0, t(4));
        plane.add_layer(a);
        plane.add_layer(b);

        let snap = PlaneSnapshot::capture(&plane);
        let ids: Vec<(usize, u32)> = snap
            .visible_cells(plane.bounds())
            .iter()
            .map(|c| (c.layer, c.tile.id))
            .collect();
        assert_eq!(ids, vec![(0, 3), (0, 1), (0, 2), (1, 4)]);
    }

    #[test]
    fn invisible_layers_and_outside_view_are_skipped() {
        let mut plane = MultilayerPlane::new(10, 10);
        let mut a = TileLayer::new("a", plane.bounds());
        a.set_tile_at(1, 1, t(1));
        a.set_tile_at(8, 8, t(2));
        let mut hidden = TileLayer::new("hidden", plane.bounds());
        hidden.set_tile_at(1, 1, t(3));
        hidden.base.visible = false;
        plane.add_layer(a);
        plane.add_layer(hidden);

        let cells = PlaneSnapshot::capture(&plane).visible_cells(TileRect::new(0, 0, 5, 5));
        assert_eq!(cells.len(), 1);
        assert_eq!(cells[0].cell, ivec2(1, 1));
    }

    #[test]
    fn snapshot_is_unaffected_by_later_edits() {
        let mut plane = MultilayerPlane::new(4, 4);
        let layer = MapLayer::from(TileLayer::new("a", plane.bounds()));
        let layer_id = layer.id();
        plane.add_layer(layer);

        let snap = PlaneSnapshot::capture(&plane);
        plane
            .modify_layer(layer_id, |l| {
                l.tiles_for("paint")?.set_tile_at(0, 0, t(9));
                Ok(())
            })
            .unwrap();

        assert!(snap.visible_cells(TileRect::new(0, 0, 4, 4)).is_empty());
        assert_eq!(PlaneSnapshot::capture(&plane).visible_cells(TileRect::new(0, 0, 4, 4)).len(), 1);
    }
}
