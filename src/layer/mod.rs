//! Map layers: tile grids, object groups and selection masks.
//!
//! Every layer is a [`MapLayer`] variant sharing a [`LayerBase`]. Operations
//! that only make sense for one variant return
//! [`MapError::NotApplicable`] on the others.

mod fill;
mod object_group;
mod selection;
mod tile_layer;

use std::sync::atomic::{AtomicU64, Ordering};

use macroquad::math::{ivec2, IVec2};

pub use object_group::{MapObject, ObjectGroup};
pub use selection::SelectionLayer;
pub use tile_layer::TileLayer;

use crate::error::{MapError, Result};
use crate::geom::{Region, TileRect};
use crate::properties::Properties;

static NEXT_LAYER_ID: AtomicU64 = AtomicU64::new(1);

/// Process-unique identity of a layer. Copy-on-write versions of a layer
/// share it; [`MapLayer::duplicate`] mints a new one.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Hash, PartialOrd, Ord)]
pub struct LayerId(pub u64);

impl LayerId {
    fn next() -> Self {
        LayerId(NEXT_LAYER_ID.fetch_add(1, Ordering::Relaxed))
    }
}

/// Clockwise rotation steps.
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub enum Rotation {
    /// 90 degrees clockwise.
    Cw90,
    /// 180 degrees.
    Cw180,
    /// 270 degrees clockwise (90 counter-clockwise).
    Cw270,
}

/// Mirror axis.
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub enum Mirror {
    /// Flip left/right.
    Horizontal,
    /// Flip top/bottom.
    Vertical,
}

/// Geometric transform applied to layer content.
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub enum Transform {
    /// Rotation.
    Rotate(Rotation),
    /// Mirror.
    Mirror(Mirror),
}

impl Transform {
    /// Label used for the history entry.
    pub fn label(&self) -> &'static str {
        match self {
            Transform::Rotate(_) => "Rotate",
            Transform::Mirror(Mirror::Horizontal) => "Horizontal Flip",
            Transform::Mirror(Mirror::Vertical) => "Vertical Flip",
        }
    }

    /// Whether width and height trade places.
    pub fn swaps_axes(&self) -> bool {
        matches!(self, Transform::Rotate(Rotation::Cw90 | Rotation::Cw270))
    }

    /// Where the cell at `(x, y)` of a `w`×`h` grid ends up.
    pub(crate) fn map_cell(&self, x: i32, y: i32, w: i32, h: i32) -> IVec2 {
        match self {
            Transform::Rotate(Rotation::Cw90) => ivec2(h - 1 - y, x),
            Transform::Rotate(Rotation::Cw180) => ivec2(w - 1 - x, h - 1 - y),
            Transform::Rotate(Rotation::Cw270) => ivec2(y, w - 1 - x),
            Transform::Mirror(Mirror::Horizontal) => ivec2(w - 1 - x, y),
            Transform::Mirror(Mirror::Vertical) => ivec2(x, h - 1 - y),
        }
    }
}

/// Attributes shared by every layer kind.
#[derive(Debug, Clone, PartialEq)]
pub struct LayerBase {
    pub(crate) id: LayerId,
    pub(crate) name: String,
    pub(crate) bounds: TileRect,
    pub(crate) visible: bool,
    pub(crate) locked: bool,
    pub(crate) opacity: f32,
    pub(crate) properties: Properties,
}

impl LayerBase {
    pub(crate) fn new(name: impl Into<String>, bounds: TileRect) -> Self {
        Self {
            id: LayerId::next(),
            name: name.into(),
            bounds,
            visible: true,
            locked: false,
            opacity: 1.0,
            properties: Properties::new(),
        }
    }

    /// Same attributes over other bounds, same identity.
    pub(crate) fn with_bounds(&self, bounds: TileRect) -> Self {
        Self {
            bounds,
            ..self.clone()
        }
    }
}

/// A layer of the plane.
#[derive(Debug, Clone, PartialEq)]
pub enum MapLayer {
    /// Dense grid of tile references.
    Tiles(TileLayer),
    /// Free-form objects.
    Objects(ObjectGroup),
    /// Transient region selection.
    Selection(SelectionLayer),
}

impl From<TileLayer> for MapLayer {
    fn from(layer: TileLayer) -> Self {
        MapLayer::Tiles(layer)
    }
}

impl From<ObjectGroup> for MapLayer {
    fn from(layer: ObjectGroup) -> Self {
        MapLayer::Objects(layer)
    }
}

impl From<SelectionLayer> for MapLayer {
    fn from(layer: SelectionLayer) -> Self {
        MapLayer::Selection(layer)
    }
}

impl MapLayer {
    fn base(&self) -> &LayerBase {
        match self {
            MapLayer::Tiles(l) => &l.base,
            MapLayer::Objects(l) => &l.base,
            MapLayer::Selection(l) => &l.base,
        }
    }

    fn base_mut(&mut self) -> &mut LayerBase {
        match self {
            MapLayer::Tiles(l) => &mut l.base,
            MapLayer::Objects(l) => &mut l.base,
            MapLayer::Selection(l) => &mut l.base,
        }
    }

    /// Short kind name used in errors and logs.
    pub fn kind_name(&self) -> &'static str {
        match self {
            MapLayer::Tiles(_) => "tile",
            MapLayer::Objects(_) => "object",
            MapLayer::Selection(_) => "selection",
        }
    }

    /// Layer identity.
    pub fn id(&self) -> LayerId {
        self.base().id
    }

    /// Display name.
    pub fn name(&self) -> &str {
        &self.base().name
    }

    /// Renames the layer.
    pub fn set_name(&mut self, name: impl Into<String>) {
        self.base_mut().name = name.into();
    }

    /// Rectangle in map cells.
    pub fn bounds(&self) -> TileRect {
        self.base().bounds
    }

    /// Width in cells.
    pub fn width(&self) -> i32 {
        self.base().bounds.width
    }

    /// Height in cells.
    pub fn height(&self) -> i32 {
        self.base().bounds.height
    }

    /// Whether the cell lies inside the layer.
    pub fn contains(&self, x: i32, y: i32) -> bool {
        self.base().bounds.contains(x, y)
    }

    /// Visibility flag.
    pub fn is_visible(&self) -> bool {
        self.base().visible
    }

    /// Shows or hides the layer.
    pub fn set_visible(&mut self, visible: bool) {
        self.base_mut().visible = visible;
    }

    /// Lock flag.
    pub fn is_locked(&self) -> bool {
        self.base().locked
    }

    /// Locks or unlocks the layer.
    pub fn set_locked(&mut self, locked: bool) {
        self.base_mut().locked = locked;
    }

    /// Hidden layers cannot be edited either.
    pub fn is_editable(&self) -> bool {
        !self.base().locked && self.base().visible
    }

    /// Opacity in `[0, 1]`.
    pub fn opacity(&self) -> f32 {
        self.base().opacity
    }

    /// Sets opacity, clamped to `[0, 1]`.
    pub fn set_opacity(&mut self, opacity: f32) {
        self.base_mut().opacity = opacity.clamp(0.0, 1.0);
    }

    /// Layer properties.
    pub fn properties(&self) -> &Properties {
        &self.base().properties
    }

    /// Mutable layer properties.
    pub fn properties_mut(&mut self) -> &mut Properties {
        &mut self.base_mut().properties
    }

    /// Tile grid view, if this is a tile layer.
    pub fn as_tiles(&self) -> Option<&TileLayer> {
        match self {
            MapLayer::Tiles(l) => Some(l),
            _ => None,
        }
    }

    /// Mutable tile grid view.
    pub fn as_tiles_mut(&mut self) -> Option<&mut TileLayer> {
        match self {
            MapLayer::Tiles(l) => Some(l),
            _ => None,
        }
    }

    /// Object group view.
    pub fn as_objects(&self) -> Option<&ObjectGroup> {
        match self {
            MapLayer::Objects(l) => Some(l),
            _ => None,
        }
    }

    /// Mutable object group view.
    pub fn as_objects_mut(&mut self) -> Option<&mut ObjectGroup> {
        match self {
            MapLayer::Objects(l) => Some(l),
            _ => None,
        }
    }

    /// Selection view.
    pub fn as_selection(&self) -> Option<&SelectionLayer> {
        match self {
            MapLayer::Selection(l) => Some(l),
            _ => None,
        }
    }

    /// Tile grid or a typed "not applicable" error.
    pub fn tiles_for(&mut self, operation: &'static str) -> Result<&mut TileLayer> {
        let kind = self.kind_name();
        self.as_tiles_mut()
            .ok_or(MapError::NotApplicable { operation, kind })
    }

    /// Whether both layers carry the same attributes, bounds aside.
    pub(crate) fn same_attributes(&self, other: &MapLayer) -> bool {
        self.base().with_bounds(other.bounds()) == *other.base()
    }

    /// Copy with a fresh identity.
    pub fn duplicate(&self) -> MapLayer {
        let mut copy = self.clone();
        copy.base_mut().id = LayerId::next();
        copy
    }

    /// Empty layer of the same kind and identity covering `bounds`.
    pub fn empty_like(&self, bounds: TileRect) -> MapLayer {
        let base = self.base().with_bounds(bounds);
        match self {
            MapLayer::Tiles(_) => TileLayer::from_base(base).into(),
            MapLayer::Objects(_) => ObjectGroup::from_base(base).into(),
            MapLayer::Selection(_) => SelectionLayer::from_base(base).into(),
        }
    }

    /// Shifts the layer offset; content is not touched.
    pub fn translate(&mut self, dx: i32, dy: i32) {
        let base = self.base_mut();
        base.bounds = base.bounds.translated(dx, dy);
        if let MapLayer::Selection(sel) = self {
            sel.translate_area(dx, dy);
        }
    }

    /// Rotates the content in place; width and height trade places for
    /// quarter turns while the offset is kept.
    pub fn rotate(&mut self, rotation: Rotation) {
        self.transform(Transform::Rotate(rotation));
    }

    /// Mirrors the content in place.
    pub fn mirror(&mut self, mirror: Mirror) {
        self.transform(Transform::Mirror(mirror));
    }

    /// Applies `t` to the layer content.
    pub fn transform(&mut self, t: Transform) {
        match self {
            MapLayer::Tiles(l) => l.transform(t),
            MapLayer::Objects(l) => l.transform(t),
            MapLayer::Selection(l) => l.transform(t),
        }
    }

    fn check_kind(&self, other: &MapLayer) -> Result<()> {
        if std::mem::discriminant(self) == std::mem::discriminant(other) {
            Ok(())
        } else {
            Err(MapError::KindMismatch {
                expected: self.kind_name(),
                found: other.kind_name(),
            })
        }
    }

    /// Copies every cell (empty ones included) of `other` that falls inside
    /// both layers.
    pub fn copy_from(&mut self, other: &MapLayer) -> Result<()> {
        self.check_kind(other)?;
        match (self, other) {
            (MapLayer::Tiles(a), MapLayer::Tiles(b)) => a.copy_from(b),
            (MapLayer::Objects(a), MapLayer::Objects(b)) => a.copy_from(b),
            (MapLayer::Selection(a), MapLayer::Selection(b)) => a.copy_from(b),
            _ => unreachable!("kinds checked above"),
        }
        Ok(())
    }

    /// Copies the cells of `source` that lie inside `mask`.
    ///
    /// The receiver must cover the mask's bounding rectangle.
    pub fn masked_copy_from(&mut self, source: &MapLayer, mask: &Region) -> Result<()> {
        self.check_kind(source)?;
        let Some(area) = mask.bounds() else {
            return Ok(());
        };
        if !self.bounds().contains_rect(&area) {
            return Err(MapError::MaskOutsideLayer);
        }
        match (self, source) {
            (MapLayer::Tiles(a), MapLayer::Tiles(b)) => a.masked_copy_from(b, mask),
            (MapLayer::Objects(a), MapLayer::Objects(b)) => a.masked_copy_from(b, mask),
            (MapLayer::Selection(a), MapLayer::Selection(b)) => a.masked_copy_from(b, mask),
            _ => unreachable!("kinds checked above"),
        }
        Ok(())
    }

    /// Composites the non-empty content of this layer onto `target`.
    pub fn merge_onto(&self, target: &mut MapLayer) -> Result<()> {
        self.check_kind(target)?;
        match (self, target) {
            (MapLayer::Tiles(a), MapLayer::Tiles(b)) => a.merge_onto(b),
            (MapLayer::Objects(a), MapLayer::Objects(b)) => a.merge_onto(b),
            (MapLayer::Selection(a), MapLayer::Selection(b)) => a.merge_onto(b),
            _ => unreachable!("kinds checked above"),
        }
        Ok(())
    }

    /// Layer holding the cells of `other` that differ from this layer,
    /// bounded by the tight box of the differences; `None` when identical.
    ///
    /// Layers of unequal bounds are compared over the union of both
    /// rectangles, a cell outside a layer counting as empty.
    pub fn create_diff(&self, other: &MapLayer) -> Result<Option<MapLayer>> {
        self.check_kind(other)?;
        Ok(match (self, other) {
            (MapLayer::Tiles(a), MapLayer::Tiles(b)) => a.create_diff(b).map(MapLayer::from),
            (MapLayer::Objects(a), MapLayer::Objects(b)) => a.create_diff(b).map(MapLayer::from),
            (MapLayer::Selection(a), MapLayer::Selection(b)) => {
                a.create_diff(b).map(MapLayer::from)
            }
            _ => unreachable!("kinds checked above"),
        })
    }

    /// Empties the content under `mask`: cells are cleared, objects
    /// anchored there removed, selected cells deselected.
    pub fn clear_masked(&mut self, mask: &Region) {
        match self {
            MapLayer::Tiles(l) => {
                for c in mask.iter() {
                    l.set_tile_at(c.x, c.y, None);
                }
            }
            MapLayer::Objects(l) => {
                l.remove_masked(mask);
            }
            MapLayer::Selection(l) => l.subtract(mask),
        }
    }

    /// Copy restricted to `rect ∩ bounds`, same identity.
    pub fn crop(&self, rect: TileRect) -> MapLayer {
        let area = self
            .bounds()
            .intersection(&rect)
            .unwrap_or(TileRect::new(rect.x, rect.y, 0, 0));
        let base = self.base().with_bounds(area);
        match self {
            MapLayer::Tiles(l) => {
                let mut out = TileLayer::from_base(base);
                out.copy_from(l);
                out.into()
            }
            MapLayer::Objects(l) => {
                let mut out = ObjectGroup::from_base(base);
                out.copy_from(l);
                out.into()
            }
            MapLayer::Selection(l) => {
                let mut out = SelectionLayer::from_base(base);
                out.copy_from(l);
                out.into()
            }
        }
    }
}

/// Cells at which two optional values differ, over the union of both
/// rectangles.
pub(crate) fn diff_cells<T: PartialEq>(
    a: TileRect,
    b: TileRect,
    at_a: impl Fn(i32, i32) -> T,
    at_b: impl Fn(i32, i32) -> T,
) -> Region {
    a.union(&b)
        .cells()
        .filter(|c| at_a(c.x, c.y) != at_b(c.x, c.y))
        .collect()
}
