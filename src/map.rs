use std::collections::BTreeSet;
use std::fmt;
use std::path::PathBuf;
use std::str::FromStr;

use crate::error::{MapError, Result};
use crate::layer::{ObjectGroup, TileLayer};
use crate::plane::MultilayerPlane;
use crate::properties::Properties;
use crate::registry::GidRegistry;
use crate::tile::Tile;
use crate::tileset::{TileRef, Tileset, TilesetId};

/// Projection of the map grid.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Default)]
pub enum Orientation {
    /// Square grid.
    #[default]
    Orthogonal,
    /// Diamond grid.
    Isometric,
    /// Sheared grid.
    Oblique,
    /// Hexagonal grid.
    Hexagonal,
    /// Staggered isometric grid.
    Shifted,
}

impl Orientation {
    /// Token used in documents.
    pub fn as_str(&self) -> &'static str {
        match self {
            Orientation::Orthogonal => "orthogonal",
            Orientation::Isometric => "isometric",
            Orientation::Oblique => "oblique",
            Orientation::Hexagonal => "hexagonal",
            Orientation::Shifted => "shifted",
        }
    }
}

impl fmt::Display for Orientation {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        f.write_str(self.as_str())
    }
}

impl FromStr for Orientation {
    type Err = MapError;

    fn from_str(s: &str) -> Result<Self> {
        Ok(match s {
            "orthogonal" => Orientation::Orthogonal,
            "isometric" => Orientation::Isometric,
            "oblique" => Orientation::Oblique,
            "hexagonal" => Orientation::Hexagonal,
            "shifted" => Orientation::Shifted,
            other => return Err(MapError::UnknownOrientation(other.to_owned())),
        })
    }
}

/// A map document: layer plane, attached tilesets and map attributes.
#[derive(Debug, Clone, PartialEq)]
pub struct Map {
    /// Grid projection.
    pub orientation: Orientation,
    /// Cell width in pixels.
    pub tile_width: u32,
    /// Cell height in pixels.
    pub tile_height: u32,
    /// Map properties, kept in insertion order.
    pub properties: Properties,
    /// File the map was last read from or written to.
    pub filename: Option<PathBuf>,
    plane: MultilayerPlane,
    tilesets: Vec<Tileset>,
}

impl Map {
    /// Empty orthogonal map of `width`×`height` cells.
    pub fn new(width: i32, height: i32, tile_width: u32, tile_height: u32) -> Self {
        Self {
            orientation: Orientation::Orthogonal,
            tile_width,
            tile_height,
            properties: Properties::new(),
            filename: None,
            plane: MultilayerPlane::new(width, height),
            tilesets: Vec::new(),
        }
    }

    /// Width in cells.
    pub fn width(&self) -> i32 {
        self.plane.width()
    }

    /// Height in cells.
    pub fn height(&self) -> i32 {
        self.plane.height()
    }

    /// Layer stack.
    pub fn plane(&self) -> &MultilayerPlane {
        &self.plane
    }

    /// Mutable layer stack.
    pub fn plane_mut(&mut self) -> &mut MultilayerPlane {
        &mut self.plane
    }

    /// Empty tile layer covering the whole map.
    pub fn new_tile_layer(&self, name: impl Into<String>) -> TileLayer {
        TileLayer::new(name, self.plane.bounds())
    }

    /// Empty object group covering the whole map.
    pub fn new_object_group(&self, name: impl Into<String>) -> ObjectGroup {
        ObjectGroup::new(name, self.plane.bounds())
    }

    /// Attached tilesets, in attachment order.
    pub fn tilesets(&self) -> &[Tileset] {
        &self.tilesets
    }

    /// Attaches a tileset; attaching the same identity twice is a no-op.
    pub fn add_tileset(&mut self, tileset: Tileset) -> TilesetId {
        let id = tileset.id();
        if self.tileset(id).is_none() {
            self.tilesets.push(tileset);
        }
        id
    }

    /// Tileset by identity.
    pub fn tileset(&self, id: TilesetId) -> Option<&Tileset> {
        self.tilesets.iter().find(|t| t.id() == id)
    }

    /// Mutable tileset by identity.
    pub fn tileset_mut(&mut self, id: TilesetId) -> Option<&mut Tileset> {
        self.tilesets.iter_mut().find(|t| t.id() == id)
    }

    /// Tile a cell value points at.
    pub fn tile(&self, tile: TileRef) -> Option<&Tile> {
        self.tileset(tile.tileset)?.tile(tile.id)
    }

    /// Number of distinct tiles of the tileset used across all layers.
    pub fn tileset_usage(&self, id: TilesetId) -> usize {
        let used: BTreeSet<u32> = self
            .plane
            .layers()
            .filter_map(|l| l.as_tiles())
            .flat_map(|l| l.used_tile_ids(id))
            .collect();
        used.len()
    }

    /// Detaches a tileset and empties every cell that referenced it.
    pub fn remove_tileset(&mut self, id: TilesetId) -> Result<Tileset> {
        let pos = self
            .tilesets
            .iter()
            .position(|t| t.id() == id)
            .ok_or(MapError::TilesetNotFound(id.0))?;
        let mut cleared = 0;
        for layer in self.plane.layers_mut() {
            if let Some(tiles) = layer.as_tiles_mut() {
                cleared += tiles.clear_tileset(id);
            }
        }
        log::debug!("removed tileset {} and cleared {cleared} cells", id.0);
        Ok(self.tilesets.remove(pos))
    }

    /// Recomputes first gids in attachment order and stores them on the
    /// tilesets.
    pub fn assign_first_gids(&mut self) -> GidRegistry {
        let registry = GidRegistry::assign(&self.tilesets);
        for set in &mut self.tilesets {
            if let Some(first) = registry.first_gid(set.id()) {
                set.first_gid = first;
            }
        }
        registry
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use pretty_assertions::assert_eq;

    #[test]
    fn orientation_tokens_round_trip() {
        for token in ["orthogonal", "isometric", "oblique", "hexagonal", "shifted"] {
            let o: Orientation = token.parse().unwrap();
            assert_eq!(o.to_string(), token);
        }
        assert!(matches!(
            "hexagon".parse::<Orientation>(),
            Err(MapError::UnknownOrientation(_))
        ));
    }

    #[test]
    fn removing_a_tileset_clears_its_cells() {
        let mut map = Map::new(3, 1, 16, 16);
        let mut a = Tileset::new("a", 16, 16);
        a.add_new_tile();
        a.add_new_tile();
        let mut b = Tileset::new("b", 16, 16);
        b.add_new_tile();
        let (ia, ib) = (map.add_tileset(a), map.add_tileset(b));

        let mut layer = map.new_tile_layer("ground");
        layer.set_tile_at(0, 0, Some(TileRef::new(ia, 0)));
        layer.set_tile_at(1, 0, Some(TileRef::new(ia, 1)));
        layer.set_tile_at(2, 0, Some(TileRef::new(ib, 0)));
        map.plane_mut().add_layer(layer);

        assert_eq!(map.tileset_usage(ia), 2);
        map.remove_tileset(ia).unwrap();
        assert_eq!(map.tilesets().len(), 1);
        let tiles = map.plane().layer(0).unwrap().as_tiles().unwrap();
        assert_eq!(tiles.tiles().count(), 1);
        assert!(map.remove_tileset(ia).is_err());
    }

    #[test]
    fn first_gids_follow_attachment_order() {
        let mut map = Map::new(1, 1, 8, 8);
        let mut a = Tileset::new("a", 8, 8);
        for _ in 0..3 {
            a.add_new_tile();
        }
        let b = Tileset::new("b", 8, 8);
        map.add_tileset(a);
        map.add_tileset(b);
        map.assign_first_gids();
        let firsts: Vec<u32> = map.tilesets().iter().map(|t| t.first_gid).collect();
        assert_eq!(firsts, [1, 4]);
    }
}
