use std::collections::BTreeMap;
use std::path::PathBuf;
use std::sync::atomic::{AtomicU32, Ordering};

use macroquad::color::Color;

use crate::tile::{Tile, TileImage};

/// Upper bound on tiles a reader creates from ids found in a document.
pub(crate) const MAX_IMPLICIT_TILES: u32 = 1 << 18;

static NEXT_TILESET_ID: AtomicU32 = AtomicU32::new(1);

/// Process-unique identity of a tileset.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Hash, PartialOrd, Ord)]
pub struct TilesetId(pub u32);

impl TilesetId {
    fn next() -> Self {
        TilesetId(NEXT_TILESET_ID.fetch_add(1, Ordering::Relaxed))
    }
}

/// Reference to a tile stored in a layer cell.
///
/// Global ids only exist in serialized form; in memory a cell names the
/// tileset and the local id directly.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Hash)]
pub struct TileRef {
    /// Owning tileset.
    pub tileset: TilesetId,
    /// Local tile id.
    pub id: u32,
}

impl TileRef {
    /// Reference to local tile `id` of `tileset`.
    pub const fn new(tileset: TilesetId, id: u32) -> Self {
        Self { tileset, id }
    }
}

/// Ordered, dense-by-id collection of tiles.
#[derive(Debug, Clone, PartialEq)]
pub struct Tileset {
    id: TilesetId,
    /// Display name.
    pub name: Option<String>,
    tiles: Vec<Option<Tile>>,
    images: BTreeMap<u32, TileImage>,
    /// Tile width in pixels.
    pub tile_width: u32,
    /// Tile height in pixels.
    pub tile_height: u32,
    /// Pixels between tiles in the shared bitmap.
    pub spacing: u32,
    /// Shared bitmap the tiles were cut from.
    pub image_source: Option<PathBuf>,
    /// Colour treated as transparent in the shared bitmap.
    pub transparent_color: Option<Color>,
    /// External `.tsx` file; when set the tileset is written as a reference.
    pub source: Option<PathBuf>,
    /// Base directory hint kept for round-tripping.
    pub base_dir: Option<String>,
    /// Global id offset assigned by the last serialization pass.
    pub first_gid: u32,
}

impl Tileset {
    /// Empty tileset.
    pub fn new(name: impl Into<String>, tile_width: u32, tile_height: u32) -> Self {
        Self {
            id: TilesetId::next(),
            name: Some(name.into()),
            tiles: Vec::new(),
            images: BTreeMap::new(),
            tile_width,
            tile_height,
            spacing: 0,
            image_source: None,
            transparent_color: None,
            source: None,
            base_dir: None,
            first_gid: 1,
        }
    }

    /// Cuts `bitmap` into tiles, one image-set entry per tile.
    ///
    /// Tiles are read left to right, top to bottom, `spacing` pixels apart.
    /// Pixels matching `transparent` lose their alpha.
    pub fn from_tile_bitmap(
        name: impl Into<String>,
        image_source: impl Into<PathBuf>,
        bitmap: &TileImage,
        tile_width: u32,
        tile_height: u32,
        spacing: u32,
        transparent: Option<Color>,
    ) -> Self {
        let mut set = Self::new(name, tile_width, tile_height);
        set.spacing = spacing;
        set.image_source = Some(image_source.into());
        set.transparent_color = transparent;
        set.import_tile_bitmap(bitmap);
        set
    }

    pub(crate) fn import_tile_bitmap(&mut self, bitmap: &TileImage) {
        if self.tile_width == 0 || self.tile_height == 0 {
            return;
        }
        let key = self.transparent_color.map(color_to_rgb);
        let fits = |pos: u32, size: u32, limit: u16| {
            pos.checked_add(size).is_some_and(|end| end <= u32::from(limit))
        };
        let step_x = self.tile_width.saturating_add(self.spacing);
        let step_y = self.tile_height.saturating_add(self.spacing);
        let mut y = 0u32;
        while fits(y, self.tile_height, bitmap.height()) {
            let mut x = 0u32;
            while fits(x, self.tile_width, bitmap.width()) {
                // both fit in the bitmap, so they fit in u16
                if let Some(mut img) = bitmap.sub_image(
                    x as u16,
                    y as u16,
                    self.tile_width as u16,
                    self.tile_height as u16,
                ) {
                    if let Some(key) = key {
                        img.apply_color_key(key);
                    }
                    let image_id = self.add_image(img);
                    let mut tile = Tile::new();
                    tile.image_id = Some(image_id);
                    self.add_tile(tile);
                }
                let Some(next) = x.checked_add(step_x) else { break };
                x = next;
            }
            let Some(next) = y.checked_add(step_y) else { break };
            y = next;
        }
    }

    /// Identity of this tileset.
    pub fn id(&self) -> TilesetId {
        self.id
    }

    /// Copy of this tileset under a fresh identity.
    pub fn duplicate(&self) -> Self {
        Self {
            id: TilesetId::next(),
            ..self.clone()
        }
    }

    /// True when the tileset lives in its own file.
    pub fn is_external(&self) -> bool {
        self.source.is_some()
    }

    /// Stores the tileset inline in the map from now on.
    pub fn embed(&mut self) {
        self.source = None;
    }

    /// Adds a tile. A tile whose id is unset (or already taken) gets the
    /// next free id; otherwise it is placed at its own id.
    pub fn add_tile(&mut self, mut tile: Tile) -> u32 {
        let wanted = tile.id as usize;
        let free = tile.id != u32::MAX
            && self.tiles.get(wanted).map_or(true, |slot| slot.is_none());
        let id = if free { wanted } else { self.tiles.len() };
        if id >= self.tiles.len() {
            self.tiles.resize_with(id + 1, || None);
        }
        tile.id = id as u32;
        self.tiles[id] = Some(tile);
        id as u32
    }

    /// Appends an empty tile and returns its id.
    pub fn add_new_tile(&mut self) -> u32 {
        self.add_tile(Tile::new())
    }

    /// Removes a tile, leaving a hole in the id space.
    pub fn remove_tile(&mut self, id: u32) -> Option<Tile> {
        let removed = self.tiles.get_mut(id as usize)?.take();
        while matches!(self.tiles.last(), Some(None)) {
            self.tiles.pop();
        }
        removed
    }

    /// Tile by local id.
    pub fn tile(&self, id: u32) -> Option<&Tile> {
        self.tiles.get(id as usize)?.as_ref()
    }

    /// Mutable tile by local id.
    pub fn tile_mut(&mut self, id: u32) -> Option<&mut Tile> {
        self.tiles.get_mut(id as usize)?.as_mut()
    }

    /// Creates an empty tile at `id` when none exists yet.
    pub fn ensure_tile(&mut self, id: u32) -> &mut Tile {
        let idx = id as usize;
        if idx >= self.tiles.len() {
            self.tiles.resize_with(idx + 1, || None);
        }
        self.tiles[idx].get_or_insert_with(|| Tile::with_id(id))
    }

    /// Like [`Tileset::ensure_tile`], but refuses to grow the id space to
    /// `MAX_IMPLICIT_TILES` or beyond. Used for ids read from documents.
    pub(crate) fn ensure_declared_tile(&mut self, id: u32) -> Option<&mut Tile> {
        if id >= MAX_IMPLICIT_TILES && self.tile(id).is_none() {
            return None;
        }
        Some(self.ensure_tile(id))
    }

    /// Highest local id in use, `None` for an empty tileset.
    pub fn max_tile_id(&self) -> Option<u32> {
        self.tiles.iter().rposition(Option::is_some).map(|i| i as u32)
    }

    /// Number of tiles.
    pub fn tile_count(&self) -> usize {
        self.tiles.iter().flatten().count()
    }

    /// Tiles in id order.
    pub fn tiles(&self) -> impl Iterator<Item = &Tile> {
        self.tiles.iter().flatten()
    }

    /// Adds an entry to the shared image set.
    pub fn add_image(&mut self, image: TileImage) -> u32 {
        let id = self.images.keys().next_back().map_or(0, |last| last + 1);
        self.images.insert(id, image);
        id
    }

    /// Stores an image-set entry under an explicit id.
    pub fn insert_image(&mut self, id: u32, image: TileImage) {
        self.images.insert(id, image);
    }

    /// Image-set entry by id.
    pub fn image(&self, id: u32) -> Option<&TileImage> {
        self.images.get(&id)
    }

    /// Image-set entries in id order.
    pub fn images(&self) -> impl Iterator<Item = (u32, &TileImage)> {
        self.images.iter().map(|(id, img)| (*id, img))
    }

    /// Pixels to show for a tile: its own image, else its image-set entry.
    pub fn tile_image(&self, id: u32) -> Option<&TileImage> {
        let tile = self.tile(id)?;
        tile.image
            .as_ref()
            .or_else(|| tile.image_id.and_then(|i| self.image(i)))
    }

    /// True when every tile uses the image-set entry that shares its id.
    pub fn is_one_for_one(&self) -> bool {
        self.tiles().all(|t| t.image.is_none() && t.image_id == Some(t.id))
    }
}

/// RGB bytes of a colour.
pub(crate) fn color_to_rgb(c: Color) -> [u8; 3] {
    let to_u8 = |v: f32| (v.clamp(0.0, 1.0) * 255.0).round() as u8;
    [to_u8(c.r), to_u8(c.g), to_u8(c.b)]
}
