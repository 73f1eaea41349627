use macroquad::math::{vec2, Vec2};

use super::{LayerBase, Mirror, Rotation, Transform};
use crate::geom::{Region, TileRect};
use crate::properties::Properties;

/// Free-form object placed on an object group.
#[derive(Debug, Clone, PartialEq)]
pub struct MapObject {
    /// Position relative to the group origin.
    pub position: Vec2,
    /// Width, zero when unset.
    pub width: f32,
    /// Height, zero when unset.
    pub height: f32,
    /// User-defined type tag.
    pub object_type: String,
    /// Optional name.
    pub name: Option<String>,
    /// Optional image or template reference.
    pub source: Option<String>,
    /// Free-form properties.
    pub properties: Properties,
}

impl MapObject {
    /// Object of the given type at `position`.
    pub fn new(position: Vec2, object_type: impl Into<String>) -> Self {
        Self {
            position,
            width: 0.0,
            height: 0.0,
            object_type: object_type.into(),
            name: None,
            source: None,
            properties: Properties::new(),
        }
    }

    fn cell(&self, origin: TileRect) -> (i32, i32) {
        (
            (self.position.x.floor() as i32) + origin.x,
            (self.position.y.floor() as i32) + origin.y,
        )
    }
}

/// Layer of objects.
#[derive(Debug, Clone, PartialEq)]
pub struct ObjectGroup {
    pub(crate) base: LayerBase,
    objects: Vec<MapObject>,
}

impl ObjectGroup {
    /// Empty group covering `bounds`.
    pub fn new(name: impl Into<String>, bounds: TileRect) -> Self {
        Self::from_base(LayerBase::new(name, bounds))
    }

    pub(crate) fn from_base(base: LayerBase) -> Self {
        Self {
            base,
            objects: Vec::new(),
        }
    }

    /// Group rectangle.
    pub fn bounds(&self) -> TileRect {
        self.base.bounds
    }

    /// Objects in insertion order.
    pub fn objects(&self) -> &[MapObject] {
        &self.objects
    }

    /// Appends an object.
    pub fn add_object(&mut self, object: MapObject) {
        self.objects.push(object);
    }

    /// Removes the object at `index`.
    pub fn remove_object(&mut self, index: usize) -> Option<MapObject> {
        (index < self.objects.len()).then(|| self.objects.remove(index))
    }

    /// Topmost object covering the map-space point, as an index.
    ///
    /// Objects without a size are hit on their own cell.
    pub fn object_at(&self, x: f32, y: f32) -> Option<usize> {
        let origin = self.base.bounds;
        let p = vec2(x - origin.x as f32, y - origin.y as f32);
        self.objects.iter().rposition(|o| {
            let (w, h) = (o.width.max(1.0), o.height.max(1.0));
            p.x >= o.position.x && p.y >= o.position.y && p.x < o.position.x + w && p.y < o.position.y + h
        })
    }

    /// Moves one object by `(dx, dy)`.
    pub fn translate_object(&mut self, index: usize, dx: f32, dy: f32) -> bool {
        match self.objects.get_mut(index) {
            Some(o) => {
                o.position += vec2(dx, dy);
                true
            }
            None => false,
        }
    }

    /// Object positions move about the group rectangle the way cells do.
    pub(crate) fn transform(&mut self, t: Transform) {
        let b = self.base.bounds;
        let (w, h) = (b.width as f32, b.height as f32);
        for o in &mut self.objects {
            let Vec2 { x, y } = o.position;
            let (ow, oh) = (o.width, o.height);
            o.position = match t {
                Transform::Rotate(Rotation::Cw90) => vec2(h - y - oh, x),
                Transform::Rotate(Rotation::Cw180) => vec2(w - x - ow, h - y - oh),
                Transform::Rotate(Rotation::Cw270) => vec2(y, w - x - ow),
                Transform::Mirror(Mirror::Horizontal) => vec2(w - x - ow, y),
                Transform::Mirror(Mirror::Vertical) => vec2(x, h - y - oh),
            };
            if t.swaps_axes() {
                std::mem::swap(&mut o.width, &mut o.height);
            }
        }
        if t.swaps_axes() {
            self.base.bounds = TileRect::new(b.x, b.y, b.height, b.width);
        }
    }

    fn rebased(&self, object: &MapObject, onto: TileRect) -> MapObject {
        let shift = vec2(
            (self.base.bounds.x - onto.x) as f32,
            (self.base.bounds.y - onto.y) as f32,
        );
        MapObject {
            position: object.position + shift,
            ..object.clone()
        }
    }

    /// Replaces the objects lying in the shared area with those of `other`.
    pub(crate) fn copy_from(&mut self, other: &ObjectGroup) {
        let Some(area) = self.bounds().intersection(&other.bounds()) else {
            return;
        };
        let own = self.bounds();
        self.objects.retain(|o| {
            let (cx, cy) = o.cell(own);
            !area.contains(cx, cy)
        });
        let incoming: Vec<_> = other
            .objects
            .iter()
            .filter(|o| {
                let (cx, cy) = o.cell(other.bounds());
                area.contains(cx, cy)
            })
            .map(|o| other.rebased(o, own))
            .collect();
        self.objects.extend(incoming);
    }

    pub(crate) fn masked_copy_from(&mut self, source: &ObjectGroup, mask: &Region) {
        let own = self.bounds();
        let picked: Vec<_> = source
            .objects
            .iter()
            .filter(|o| {
                let (cx, cy) = o.cell(source.bounds());
                mask.contains(cx, cy)
            })
            .map(|o| source.rebased(o, own))
            .collect();
        self.objects.extend(picked);
    }

    /// Drops the objects whose anchor cell lies inside `mask`.
    pub(crate) fn remove_masked(&mut self, mask: &Region) -> usize {
        let own = self.bounds();
        let before = self.objects.len();
        self.objects.retain(|o| {
            let (cx, cy) = o.cell(own);
            !mask.contains(cx, cy)
        });
        before - self.objects.len()
    }

    pub(crate) fn merge_onto(&self, target: &mut ObjectGroup) {
        let onto = target.bounds();
        target
            .objects
            .extend(self.objects.iter().map(|o| self.rebased(o, onto)));
    }

    /// Objects are compared as a whole.
    pub(crate) fn create_diff(&self, other: &ObjectGroup) -> Option<ObjectGroup> {
        (self.objects != other.objects || self.bounds() != other.bounds()).then(|| other.clone())
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn quarter_turn_matches_cell_rotation_for_unit_objects() {
        let mut group = ObjectGroup::new("o", TileRect::new(0, 0, 4, 2));
        let mut obj = MapObject::new(vec2(3.0, 0.0), "spawn");
        obj.width = 1.0;
        obj.height = 1.0;
        group.add_object(obj);

        group.transform(Transform::Rotate(Rotation::Cw90));
        // cell (3,0) of a 4x2 grid goes to (h-1-0, 3) = (1, 3)
        assert_eq!(group.objects()[0].position, vec2(1.0, 3.0));
        assert_eq!(group.bounds(), TileRect::new(0, 0, 2, 4));
    }

    #[test]
    fn hit_test_prefers_topmost() {
        let mut group = ObjectGroup::new("o", TileRect::new(10, 0, 8, 8));
        let mut big = MapObject::new(vec2(0.0, 0.0), "area");
        big.width = 4.0;
        big.height = 4.0;
        group.add_object(big);
        group.add_object(MapObject::new(vec2(1.0, 1.0), "coin"));

        assert_eq!(group.object_at(11.5, 1.5), Some(1));
        assert_eq!(group.object_at(13.0, 3.0), Some(0));
        assert_eq!(group.object_at(1.0, 1.0), None);

        assert!(group.translate_object(1, 2.0, 0.0));
        assert_eq!(group.object_at(11.5, 1.5), Some(0));
    }

    #[test]
    fn merge_rebases_positions() {
        let mut top = ObjectGroup::new("a", TileRect::new(2, 2, 4, 4));
        top.add_object(MapObject::new(vec2(1.0, 1.0), "coin"));
        let mut bottom = ObjectGroup::new("b", TileRect::new(0, 0, 8, 8));
        top.merge_onto(&mut bottom);
        assert_eq!(bottom.objects()[0].position, vec2(3.0, 3.0));
    }

    #[test]
    fn masked_copy_picks_objects_by_cell() {
        let mut source = ObjectGroup::new("s", TileRect::new(0, 0, 4, 4));
        source.add_object(MapObject::new(vec2(0.5, 0.5), "in"));
        source.add_object(MapObject::new(vec2(3.0, 3.0), "out"));
        let mut target = ObjectGroup::new("t", TileRect::new(0, 0, 2, 2));
        target.masked_copy_from(&source, &Region::from_rect(TileRect::new(0, 0, 2, 2)));
        assert_eq!(target.objects().len(), 1);
        assert_eq!(target.objects()[0].object_type, "in");
    }
}
