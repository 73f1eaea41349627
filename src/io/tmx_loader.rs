use std::path::Path;
use std::sync::Arc;

use base64::{engine::general_purpose::STANDARD, Engine as _};
use macroquad::color::Color;
use macroquad::math::vec2;

use super::image_codec::{ImageCodec, PngCodec};
use super::paths::parent_dir;
use super::xml_tree::XmlElement;
use super::{gunzip, has_suffix, inflate_zlib, is_gzip, MapReader};
use crate::error::{MapError, Result};
use crate::geom::TileRect;
use crate::layer::{LayerBase, MapLayer, MapObject, ObjectGroup, TileLayer};
use crate::map::Map;
use crate::registry::GidRegistry;
use crate::tile::{Animation, KeyFrame, Tile, TileImage};
use crate::tileset::{Tileset, TilesetId};

/// Flip flags some editors store in the high bits of a gid.
pub(crate) const GID_MASK: u32 = 0x1FFF_FFFF;

/// Reads `.tmx` / `.tmx.gz` maps and `.tsx` tilesets.
#[derive(Clone)]
pub struct TmxReader {
    codec: Arc<dyn ImageCodec>,
}

impl Default for TmxReader {
    fn default() -> Self {
        Self::new()
    }
}

/// Animation frames kept as gids until every tileset is known.
struct PendingAnimation {
    tileset: TilesetId,
    tile: u32,
    keyframes: Vec<(String, Vec<u32>)>,
}

fn read_file(path: &Path) -> Result<Vec<u8>> {
    let bytes = std::fs::read(path).map_err(|e| MapError::io(path, e))?;
    if is_gzip(&bytes) {
        gunzip(&bytes)
    } else {
        Ok(bytes)
    }
}

impl TmxReader {
    /// Reader decoding images as PNG.
    pub fn new() -> Self {
        Self::with_codec(Arc::new(PngCodec))
    }

    /// Reader using another image codec.
    pub fn with_codec(codec: Arc<dyn ImageCodec>) -> Self {
        Self { codec }
    }

    /// Parses a map document; `path` locates external files.
    pub fn map_from_bytes(&self, bytes: &[u8], path: &Path) -> Result<Map> {
        let unpacked;
        let bytes = if is_gzip(bytes) {
            unpacked = gunzip(bytes)?;
            &unpacked[..]
        } else {
            bytes
        };
        let root = XmlElement::parse(bytes)?;
        if root.name != "map" {
            return Err(MapError::InvalidMap(format!(
                "expected <map> root, found <{}>",
                root.name
            )));
        }
        let dir = parent_dir(path);

        let mut map = Map::new(
            root.parse_required("width")?,
            root.parse_required("height")?,
            root.parse_required("tilewidth")?,
            root.parse_required("tileheight")?,
        );
        if let Some(o) = root.attr("orientation") {
            map.orientation = o.parse()?;
        }
        map.properties = root.properties();
        map.filename = Some(path.to_path_buf());

        // tilesets first, so layers can resolve gids in any document order
        let mut firsts = Vec::new();
        let mut pending = Vec::new();
        for el in root.children_named("tileset") {
            let first_gid: u32 = el.parse_required("firstgid")?;
            let mut set = match el.attr("source") {
                Some(source) => {
                    let file = dir.join(source);
                    let mut set = self.read_tileset_file(&file)?;
                    set.source = Some(file);
                    set
                }
                None => {
                    let (set, anims) = self.parse_tileset(el, &dir)?;
                    pending.extend(anims);
                    set
                }
            };
            if let Some(base) = el.attr("basedir") {
                set.base_dir = Some(base.to_owned());
            }
            set.first_gid = first_gid;
            firsts.push((set.id(), first_gid));
            map.add_tileset(set);
        }
        let registry = GidRegistry::from_first_gids(firsts);
        resolve_animations(&mut map, pending, &registry)?;

        for el in &root.children {
            let layer: MapLayer = match el.name.as_str() {
                "layer" => read_tile_layer(el, &registry, &mut map)?.into(),
                "objectgroup" => read_object_group(el)?.into(),
                "properties" | "tileset" => continue,
                other => {
                    log::debug!("skipping <{other}> in {}", path.display());
                    continue;
                }
            };
            map.plane_mut().add_layer(layer);
        }

        log::info!(
            "loaded map {} ({} layers, {} tilesets)",
            path.display(),
            map.plane().len(),
            map.tilesets().len()
        );
        Ok(map)
    }

    /// Reads a standalone `.tsx` document.
    pub fn read_tileset_file(&self, path: &Path) -> Result<Tileset> {
        let bytes = read_file(path)?;
        let root = XmlElement::parse(&bytes)?;
        if root.name != "tileset" {
            return Err(MapError::InvalidMap(format!(
                "expected <tileset> root in {}, found <{}>",
                path.display(),
                root.name
            )));
        }
        let (mut set, anims) = self.parse_tileset(&root, &parent_dir(path))?;
        // frames of a standalone set are numbered from 1
        let registry = GidRegistry::from_first_gids([(set.id(), 1)]);
        for anim in anims {
            let animation = anim_from_gids(anim.keyframes, &registry, &path.display().to_string())?;
            set.ensure_tile(anim.tile).animation = Some(animation);
        }
        set.source = Some(path.to_path_buf());
        Ok(set)
    }

    fn decode_embedded(&self, image: &XmlElement) -> Result<Option<TileImage>> {
        let Some(data) = image.child("data") else {
            return Ok(None);
        };
        match data.attr("encoding") {
            Some("base64") => {}
            other => {
                return Err(MapError::UnsupportedEncoding(
                    other.unwrap_or("none").to_owned(),
                ))
            }
        }
        let bytes = STANDARD.decode(strip_ws(&data.text))?;
        self.codec.decode(&bytes).map(Some)
    }

    fn load_image_file(&self, file: &Path) -> Option<TileImage> {
        let decoded = std::fs::read(file)
            .map_err(|e| MapError::io(file, e))
            .and_then(|bytes| self.codec.decode(&bytes));
        match decoded {
            Ok(img) => Some(img),
            Err(e) => {
                log::warn!("could not load image {}: {e}", file.display());
                None
            }
        }
    }

    fn parse_tileset(&self, el: &XmlElement, dir: &Path) -> Result<(Tileset, Vec<PendingAnimation>)> {
        let mut set = Tileset::new(
            "",
            el.parse_attr("tilewidth")?.unwrap_or(0),
            el.parse_attr("tileheight")?.unwrap_or(0),
        );
        set.name = el.attr("name").map(str::to_owned);
        set.spacing = el.parse_attr("spacing")?.unwrap_or(0);

        let mut pending = Vec::new();
        let mut saw_tiles = false;
        for child in &el.children {
            match child.name.as_str() {
                "image" => {
                    if let Some(source) = child.attr("source") {
                        let file = dir.join(source);
                        set.transparent_color = child.attr("trans").map(parse_color).transpose()?;
                        if let Some(bitmap) = self.load_image_file(&file) {
                            set.import_tile_bitmap(&bitmap);
                        }
                        set.image_source = Some(file);
                    } else if let Some(id) = child.parse_attr::<u32>("id")? {
                        if let Some(img) = self.decode_embedded(child)? {
                            set.insert_image(id, img);
                        }
                    }
                }
                "tile" => {
                    saw_tiles = true;
                    let id: u32 = child.parse_required("id")?;
                    let tile = self.read_tile(child, dir)?;
                    let slot = set
                        .ensure_declared_tile(id)
                        .ok_or_else(|| MapError::invalid("tile", "id", &id.to_string()))?;
                    slot.properties = tile.properties;
                    if tile.image.is_some() {
                        slot.image = tile.image;
                    }
                    if tile.image_id.is_some() {
                        slot.image_id = tile.image_id;
                    }
                    if let Some(anim) = child.child("animation") {
                        pending.push(PendingAnimation {
                            tileset: set.id(),
                            tile: id,
                            keyframes: read_keyframes(anim)?,
                        });
                    }
                }
                other => log::debug!("skipping <{other}> in tileset"),
            }
        }

        // image-set entries without tile elements map one for one
        if !saw_tiles && set.image_source.is_none() {
            let ids: Vec<u32> = set.images().map(|(id, _)| id).collect();
            for id in ids {
                set.ensure_declared_tile(id)
                    .ok_or_else(|| MapError::invalid("image", "id", &id.to_string()))?
                    .image_id = Some(id);
            }
        }
        Ok((set, pending))
    }

    fn read_tile(&self, el: &XmlElement, dir: &Path) -> Result<Tile> {
        let mut tile = Tile::new();
        tile.properties = el.properties();
        if let Some(image) = el.child("image") {
            if let Some(id) = image.parse_attr::<u32>("id")? {
                tile.image_id = Some(id);
            } else if let Some(img) = self.decode_embedded(image)? {
                tile.image = Some(img);
            } else if let Some(source) = image.attr("source") {
                tile.image = self.load_image_file(&dir.join(source));
            }
        }
        Ok(tile)
    }
}

impl MapReader for TmxReader {
    fn name(&self) -> &str {
        "Tiled TMX"
    }

    fn filter(&self) -> &str {
        "*.tmx,*.tmx.gz,*.tsx"
    }

    fn accepts(&self, path: &Path) -> bool {
        has_suffix(path, &[".tmx", ".tmx.gz", ".tsx"])
    }

    fn read_map(&self, path: &Path) -> Result<Map> {
        let bytes = std::fs::read(path).map_err(|e| MapError::io(path, e))?;
        self.map_from_bytes(&bytes, path)
    }

    fn read_tileset(&self, path: &Path) -> Result<Tileset> {
        self.read_tileset_file(path)
    }
}

fn strip_ws(text: &str) -> String {
    text.chars().filter(|c| !c.is_whitespace()).collect()
}

fn parse_color(hex: &str) -> Result<Color> {
    let hex = hex.trim_start_matches('#');
    let bad = || MapError::invalid("image", "trans", hex);
    if hex.len() != 6 {
        return Err(bad());
    }
    let channel = |i: usize| u8::from_str_radix(&hex[i..i + 2], 16).map_err(|_| bad());
    Ok(Color::from_rgba(channel(0)?, channel(2)?, channel(4)?, 255))
}

fn read_keyframes(anim: &XmlElement) -> Result<Vec<(String, Vec<u32>)>> {
    anim.children_named("keyframe")
        .map(|key| -> Result<(String, Vec<u32>)> {
            let frames = key
                .children_named("tile")
                .map(|t| t.parse_required::<u32>("gid"))
                .collect::<Result<Vec<_>>>()?;
            Ok((key.attr("name").unwrap_or_default().to_owned(), frames))
        })
        .collect()
}

fn anim_from_gids(keyframes: Vec<(String, Vec<u32>)>, registry: &GidRegistry, context: &str) -> Result<Animation> {
    let mut animation = Animation::default();
    for (name, gids) in keyframes {
        let frames = gids
            .into_iter()
            .filter_map(|gid| registry.resolve_in(gid, context).transpose())
            .collect::<Result<Vec<_>>>()?;
        animation.keyframes.push(KeyFrame { name, frames });
    }
    Ok(animation)
}

fn resolve_animations(map: &mut Map, pending: Vec<PendingAnimation>, registry: &GidRegistry) -> Result<()> {
    for anim in pending {
        let animation = anim_from_gids(anim.keyframes, registry, "animation")?;
        if let Some(set) = map.tileset_mut(anim.tileset) {
            set.ensure_tile(anim.tile).animation = Some(animation);
        }
    }
    Ok(())
}

fn layer_base(el: &XmlElement) -> Result<LayerBase> {
    let size = |attribute: &str| -> Result<i32> {
        let value: i32 = el.parse_required(attribute)?;
        if value < 0 {
            return Err(MapError::invalid(&el.name, attribute, &value.to_string()));
        }
        Ok(value)
    };
    let bounds = TileRect::new(
        el.parse_attr("xoffset")?.unwrap_or(0),
        el.parse_attr("yoffset")?.unwrap_or(0),
        size("width")?,
        size("height")?,
    );
    let mut base = LayerBase::new(el.attr("name").unwrap_or_default(), bounds);
    base.visible = el.attr("visible") != Some("0");
    base.opacity = el.parse_attr::<f32>("opacity")?.unwrap_or(1.0).clamp(0.0, 1.0);
    base.properties = el.properties();
    Ok(base)
}

fn decode_gids(data: &XmlElement, layer: &str) -> Result<Vec<u32>> {
    match data.attr("encoding") {
        Some("base64") => {
            let raw = STANDARD.decode(strip_ws(&data.text))?;
            let raw = match data.attr("compression") {
                None => raw,
                Some("gzip") => gunzip(&raw)?,
                Some("zlib") => inflate_zlib(&raw)?,
                Some(other) => return Err(MapError::UnsupportedCompression(other.to_owned())),
            };
            if raw.len() % 4 != 0 {
                return Err(MapError::InvalidMap(format!(
                    "layer '{layer}' data is {} bytes, not a whole number of tile ids",
                    raw.len()
                )));
            }
            Ok(raw
                .chunks_exact(4)
                .map(|b| u32::from_le_bytes([b[0], b[1], b[2], b[3]]))
                .collect())
        }
        Some("csv") => data
            .text
            .split(',')
            .map(str::trim)
            .filter(|t| !t.is_empty())
            .map(|t| t.parse().map_err(|_| MapError::invalid("data", "csv", t)))
            .collect(),
        None => data
            .children_named("tile")
            .map(|t| t.parse_attr("gid").map(|g| g.unwrap_or(0)))
            .collect(),
        Some(other) => Err(MapError::UnsupportedEncoding(other.to_owned())),
    }
}

fn read_tile_layer(el: &XmlElement, registry: &GidRegistry, map: &mut Map) -> Result<TileLayer> {
    let base = layer_base(el)?;
    let gids = match el.child("data") {
        Some(data) => decode_gids(data, &base.name)?,
        None => Vec::new(),
    };
    // checked before the grid is allocated
    let bounds = base.bounds;
    let expected = (bounds.width as usize).checked_mul(bounds.height as usize);
    if expected != Some(gids.len()) {
        return Err(MapError::InvalidLayerData {
            layer: base.name.clone(),
            expected: expected.unwrap_or(usize::MAX),
            found: gids.len(),
        });
    }
    let mut layer = TileLayer::from_base(base);
    let context = layer.name().to_owned();
    for (cell, gid) in bounds.cells().zip(gids) {
        let gid = gid & GID_MASK;
        let tile = registry.resolve_in(gid, &context)?;
        if let Some(t) = tile {
            if let Some(set) = map.tileset_mut(t.tileset) {
                if set.ensure_declared_tile(t.id).is_none() {
                    return Err(MapError::InvalidTileGid { context, gid });
                }
            }
        }
        layer.set_tile_at(cell.x, cell.y, tile);
    }
    Ok(layer)
}

fn read_object_group(el: &XmlElement) -> Result<ObjectGroup> {
    let mut group = ObjectGroup::from_base(layer_base(el)?);
    let origin = group.bounds();
    for o in el.children_named("object") {
        let x: f32 = o.parse_attr("x")?.unwrap_or(0.0);
        let y: f32 = o.parse_attr("y")?.unwrap_or(0.0);
        let mut obj = MapObject::new(
            vec2(x - origin.x as f32, y - origin.y as f32),
            o.attr("type").unwrap_or_default(),
        );
        obj.name = o.attr("name").map(str::to_owned);
        obj.source = o.attr("source").map(str::to_owned);
        obj.width = o.parse_attr("width")?.unwrap_or(0.0);
        obj.height = o.parse_attr("height")?.unwrap_or(0.0);
        obj.properties = o.properties();
        group.add_object(obj);
    }
    Ok(group)
}

#[cfg(test)]
mod tests {
    use super::*;
    use crate::tileset::{TileRef, MAX_IMPLICIT_TILES};

    const HEADER: &str = r#"<?xml version="1.0" encoding="UTF-8"?>"#;

    fn read(doc: &str) -> Result<Map> {
        TmxReader::new().map_from_bytes(doc.as_bytes(), Path::new("/nowhere/m.tmx"))
    }

    fn inline_set(n: u32) -> String {
        let tiles: String = (0..n).map(|i| format!(r#"<tile id="{i}"/>"#)).collect();
        format!(r#"<tileset name="s" firstgid="1">{tiles}</tileset>"#)
    }

    #[test]
    fn csv_and_tile_element_encodings() {
        let doc = format!(
            r#"{HEADER}<map version="0.99a" orientation="isometric" width="2" height="2" tilewidth="8" tileheight="8">
              {set}
              <layer name="a" width="2" height="2"><data encoding="csv">1,0,
              0,3</data></layer>
              <layer name="b" width="2" height="1" yoffset="1"><data><tile gid="2"/><tile/></data></layer>
            </map>"#,
            set = inline_set(3)
        );
        let map = read(&doc).unwrap();
        assert_eq!(map.orientation, crate::map::Orientation::Isometric);
        let set = map.tilesets()[0].id();
        let a = map.plane().layer(0).unwrap().as_tiles().unwrap();
        assert_eq!(a.tile_at(0, 0), Some(TileRef::new(set, 0)));
        assert_eq!(a.tile_at(1, 1), Some(TileRef::new(set, 2)));
        let b = map.plane().layer(1).unwrap().as_tiles().unwrap();
        assert_eq!(b.bounds(), TileRect::new(0, 1, 2, 1));
        assert_eq!(b.tile_at(0, 1), Some(TileRef::new(set, 1)));
        assert_eq!(b.tile_at(1, 1), None);
    }

    #[test]
    fn unknown_elements_and_selection_are_skipped() {
        let doc = format!(
            r#"{HEADER}<map orientation="orthogonal" width="1" height="1" tilewidth="8" tileheight="8">
              <editorsettings><chunksize width="16"/></editorsettings>
              <selection name="Selection" width="1" height="1"/>
              <objectgroup name="o" width="1" height="1"><object x="0.5" y="0" type="t"><unknown/></object></objectgroup>
            </map>"#
        );
        let map = read(&doc).unwrap();
        assert_eq!(map.plane().len(), 1);
        assert_eq!(map.plane().layer(0).unwrap().as_objects().unwrap().objects().len(), 1);
    }

    #[test]
    fn short_layer_data_is_rejected() {
        let doc = format!(
            r#"{HEADER}<map width="2" height="1" tilewidth="8" tileheight="8">
              {set}<layer name="bad" width="2" height="1"><data encoding="csv">1</data></layer></map>"#,
            set = inline_set(1)
        );
        match read(&doc) {
            Err(MapError::InvalidLayerData { layer, expected, found }) => {
                assert_eq!((layer.as_str(), expected, found), ("bad", 2, 1));
            }
            other => panic!("unexpected {other:?}"),
        }
    }

    #[test]
    fn huge_layer_header_is_rejected_before_allocating() {
        let doc = format!(
            r#"{HEADER}<map width="2" height="1" tilewidth="8" tileheight="8">
              {set}<layer name="big" width="1073741824" height="1073741824"><data encoding="csv">0</data></layer></map>"#,
            set = inline_set(1)
        );
        match read(&doc) {
            Err(MapError::InvalidLayerData { layer, found, .. }) => {
                assert_eq!((layer.as_str(), found), ("big", 1));
            }
            other => panic!("unexpected {other:?}"),
        }

        let doc = format!(
            r#"{HEADER}<map width="2" height="1" tilewidth="8" tileheight="8">
              <layer name="neg" width="-2" height="1"/></map>"#
        );
        assert!(matches!(read(&doc), Err(MapError::InvalidAttribute { .. })));
    }

    #[test]
    fn partial_base64_word_is_rejected() {
        let payload = STANDARD.encode([1u8, 0, 0, 0, 1, 0, 0, 0, 7]);
        let doc = format!(
            r#"{HEADER}<map width="2" height="1" tilewidth="8" tileheight="8">
              {set}<layer name="l" width="2" height="1"><data encoding="base64">{payload}</data></layer></map>"#,
            set = inline_set(1)
        );
        assert!(matches!(read(&doc), Err(MapError::InvalidMap(_))));
    }

    #[test]
    fn far_out_tile_ids_are_not_created() {
        let doc = format!(
            r#"{HEADER}<map width="1" height="1" tilewidth="8" tileheight="8">
              <tileset name="s" firstgid="1"/>
              <layer name="l" width="1" height="1"><data encoding="csv">400000000</data></layer></map>"#
        );
        assert!(matches!(
            read(&doc),
            Err(MapError::InvalidTileGid { gid: 400_000_000, .. })
        ));

        let doc = format!(
            r#"{HEADER}<map width="1" height="1" tilewidth="8" tileheight="8">
              <tileset name="s" firstgid="1"><tile id="{MAX_IMPLICIT_TILES}"/></tileset></map>"#
        );
        assert!(matches!(read(&doc), Err(MapError::InvalidAttribute { .. })));
    }

    #[test]
    fn gid_below_every_tileset_is_rejected() {
        let doc = format!(
            r#"{HEADER}<map width="1" height="1" tilewidth="8" tileheight="8">
              <layer name="l" width="1" height="1"><data encoding="csv">5</data></layer></map>"#
        );
        assert!(matches!(read(&doc), Err(MapError::InvalidTileGid { gid: 5, .. })));
    }

    #[test]
    fn unknown_orientation_and_encoding_are_typed_errors() {
        let doc = format!(r#"{HEADER}<map orientation="round" width="1" height="1" tilewidth="8" tileheight="8"/>"#);
        assert!(matches!(read(&doc), Err(MapError::UnknownOrientation(_))));

        let doc = format!(
            r#"{HEADER}<map width="1" height="1" tilewidth="8" tileheight="8">
              <layer name="l" width="1" height="1"><data encoding="hex">00</data></layer></map>"#
        );
        assert!(matches!(read(&doc), Err(MapError::UnsupportedEncoding(_))));
    }

    #[test]
    fn malformed_xml_is_a_format_error() {
        assert!(matches!(read("<map width="), Err(MapError::Xml(_)) | Err(MapError::InvalidMap(_))));
    }

    #[test]
    fn missing_tiles_are_created_on_reference() {
        let doc = format!(
            r#"{HEADER}<map width="1" height="1" tilewidth="8" tileheight="8">
              <tileset name="s" firstgid="1"/>
              <layer name="l" width="1" height="1"><data encoding="csv">4</data></layer></map>"#
        );
        let map = read(&doc).unwrap();
        assert_eq!(map.tilesets()[0].max_tile_id(), Some(3));
    }

    #[test]
    fn trans_colour_parses_hex() {
        let c = parse_color("ff8000").unwrap();
        assert_eq!(crate::tileset::color_to_rgb(c), [255, 128, 0]);
        assert!(parse_color("ff80").is_err());
    }
}
