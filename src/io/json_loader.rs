// src/io/json_loader.rs
use std::path::Path;
use std::sync::Arc;

use macroquad::math::vec2;
use serde::Deserialize;
use serde_json::Value as JsonValue;

use super::image_codec::{ImageCodec, PngCodec};
use super::paths::parent_dir;
use super::tmx_loader::GID_MASK;
use super::{has_suffix, MapReader};
use crate::error::{MapError, Result};
use crate::geom::TileRect;
use crate::layer::{MapObject, ObjectGroup, TileLayer};
use crate::map::Map;
use crate::properties::Properties;
use crate::registry::GidRegistry;
use crate::tileset::{Tileset, MAX_IMPLICIT_TILES};

#[derive(Deserialize)]
struct JsonLayer {
    #[serde(default)]
    data: Vec<u32>,
    #[serde(default)]
    width: i32,
    #[serde(default)]
    height: i32,
    #[serde(default = "default_true")]
    visible: bool,
    #[serde(default = "one")]
    opacity: f32,
    #[serde(default)]
    offsetx: f32,
    #[serde(default)]
    offsety: f32,
    #[serde(default)]
    name: String,
    #[serde(rename = "type")]
    kind: Option<String>, // "tilelayer" expected here
    #[serde(default)]
    properties: Vec<JsonProperty>,
    #[serde(default)]
    objects: Vec<JsonObject>,
}

fn default_true() -> bool {
    true
}
fn one() -> f32 {
    1.0
}

#[derive(Deserialize)]
struct JsonTilesetRef {
    firstgid: u32,
    source: String,
}

#[derive(Deserialize)]
struct JsonMap {
    #[serde(default)]
    orientation: Option<String>,
    #[serde(default)]
    width: i32,
    #[serde(default)]
    height: i32,
    tilewidth: u32,
    tileheight: u32,
    layers: Vec<JsonLayer>,
    tilesets: Vec<JsonTilesetRef>,
    #[serde(default)]
    properties: Vec<JsonProperty>,
}

#[derive(Deserialize)]
struct ExternalTileset {
    #[serde(default)]
    name: Option<String>,
    tilewidth: u32,
    tileheight: u32,
    tilecount: u32,
    image: String,
    #[serde(default)]
    spacing: u32,
    #[serde(default)]
    tiles: Vec<JsonTile>,
}

#[derive(Deserialize)]
struct JsonProperty {
    name: String,
    #[serde(default, rename = "type")]
    kind: Option<String>,
    value: JsonValue,
}

#[derive(Deserialize)]
struct JsonObject {
    #[serde(default)]
    name: String,
    #[serde(default, rename = "type")]
    kind: String,
    #[serde(default)]
    class: String,
    #[serde(default)]
    x: f32,
    #[serde(default)]
    y: f32,
    #[serde(default)]
    width: f32,
    #[serde(default)]
    height: f32,
    #[serde(default)]
    properties: Vec<JsonProperty>,
}

#[derive(Deserialize)]
struct JsonTile {
    id: u32,
    #[serde(default)]
    properties: Vec<JsonProperty>,
}

/// Typed JSON property flattened to its string form.
fn json_property_to_string(prop: JsonProperty) -> Result<Option<(String, String)>> {
    let JsonProperty { name, kind, value } = prop;

    let parsed = match kind.as_deref() {
        Some("bool") => value.as_bool().map(|b| b.to_string()),
        Some("int") | Some("object") => value.as_i64().map(|n| n.to_string()),
        Some("float") => value.as_f64().map(|n| n.to_string()),
        Some("string") | Some("file") | Some("color") | Some("class") => {
            value.as_str().map(str::to_owned)
        }
        Some(other) => {
            return Err(MapError::UnsupportedPropertyType {
                name,
                kind: other.to_owned(),
            });
        }
        None => match &value {
            JsonValue::String(s) => Some(s.clone()),
            JsonValue::Bool(_) | JsonValue::Number(_) => Some(value.to_string()),
            _ => None,
        },
    };

    Ok(parsed.map(|value| (name, value)))
}

fn properties_from_json(props: Vec<JsonProperty>) -> Result<Properties> {
    let mut out = Properties::new();
    for p in props {
        if let Some((name, value)) = json_property_to_string(p)? {
            out.insert(name, value);
        }
    }
    Ok(out)
}

/// Reads Tiled JSON maps with external JSON tilesets.
///
/// Pixel offsets and object coordinates are converted to cells.
#[derive(Clone)]
pub struct JsonMapReader {
    codec: Arc<dyn ImageCodec>,
}

impl Default for JsonMapReader {
    fn default() -> Self {
        Self::new()
    }
}

impl JsonMapReader {
    /// Reader decoding tileset images as PNG.
    pub fn new() -> Self {
        Self {
            codec: Arc::new(PngCodec),
        }
    }

    fn load_tileset(&self, map_dir: &Path, source: &str) -> Result<Tileset> {
        if !source.ends_with(".json") {
            return Err(MapError::InvalidMap(format!(
                "External tileset must be JSON: {source}"
            )));
        }
        let ts_path = map_dir.join(source);
        let ext_txt = std::fs::read_to_string(&ts_path).map_err(|source| MapError::Io {
            path: ts_path.clone(),
            source,
        })?;
        let ext: ExternalTileset =
            serde_json::from_str(&ext_txt).map_err(|source| MapError::Json {
                path: ts_path.clone(),
                source,
            })?;

        let mut set = Tileset::new("", ext.tilewidth, ext.tileheight);
        set.name = ext.name;
        set.spacing = ext.spacing;
        let image_path = map_dir.join(&ext.image);
        match std::fs::read(&image_path)
            .map_err(|e| MapError::io(&image_path, e))
            .and_then(|bytes| self.codec.decode(&bytes))
        {
            Ok(bitmap) => set.import_tile_bitmap(&bitmap),
            Err(e) => log::warn!("tileset image {} not loaded: {e}", image_path.display()),
        }
        set.image_source = Some(image_path);
        if ext.tilecount > MAX_IMPLICIT_TILES {
            return Err(MapError::invalid("tileset", "tilecount", &ext.tilecount.to_string()));
        }
        for id in 0..ext.tilecount {
            set.ensure_tile(id);
        }
        for tile in ext.tiles {
            set.ensure_declared_tile(tile.id)
                .ok_or_else(|| MapError::invalid("tile", "id", &tile.id.to_string()))?
                .properties = properties_from_json(tile.properties)?;
        }
        // imported, not linked: saving writes it inline
        set.source = None;
        Ok(set)
    }
}

impl MapReader for JsonMapReader {
    fn name(&self) -> &str {
        "Tiled JSON"
    }

    fn filter(&self) -> &str {
        "*.json"
    }

    fn accepts(&self, path: &Path) -> bool {
        has_suffix(path, &[".json"])
    }

    fn read_map(&self, p: &Path) -> Result<Map> {
        if p.extension().and_then(|e| e.to_str()) != Some("json") {
            return Err(MapError::InvalidMap(format!(
                "Map file must be a JSON file: {}",
                p.display()
            )));
        }

        let txt = std::fs::read_to_string(p).map_err(|source| MapError::Io {
            path: p.to_path_buf(),
            source,
        })?;
        let j: JsonMap = serde_json::from_str(&txt).map_err(|source| MapError::Json {
            path: p.to_path_buf(),
            source,
        })?;
        let map_dir = parent_dir(p);

        let (width, height) = if j.width > 0 && j.height > 0 {
            (j.width, j.height)
        } else {
            j.layers.iter().fold((0, 0), |(w, h), l| (w.max(l.width), h.max(l.height)))
        };
        let mut map = Map::new(width, height, j.tilewidth, j.tileheight);
        if let Some(o) = &j.orientation {
            map.orientation = o.parse()?;
        }
        map.properties = properties_from_json(j.properties)?;
        map.filename = Some(p.to_path_buf());

        let mut firsts = Vec::with_capacity(j.tilesets.len());
        for ts in &j.tilesets {
            let mut set = self.load_tileset(&map_dir, &ts.source)?;
            set.first_gid = ts.firstgid;
            firsts.push((set.id(), ts.firstgid));
            map.add_tileset(set);
        }
        let registry = GidRegistry::from_first_gids(firsts);

        let (tw, th) = (j.tilewidth.max(1) as f32, j.tileheight.max(1) as f32);
        for l in j.layers {
            let layer_name = l.name.clone();
            let offset = (
                (l.offsetx / tw).round() as i32,
                (l.offsety / th).round() as i32,
            );
            match l.kind.as_deref().unwrap_or("tilelayer") {
                "tilelayer" => {
                    let bounds = TileRect::new(offset.0, offset.1, l.width, l.height);
                    if l.data.len() != bounds.area() {
                        return Err(MapError::InvalidLayerData {
                            layer: layer_name,
                            expected: bounds.area(),
                            found: l.data.len(),
                        });
                    }
                    let mut layer = TileLayer::new(l.name, bounds);
                    for (cell, &raw_gid) in bounds.cells().zip(&l.data) {
                        let gid = raw_gid & GID_MASK;
                        let tile = registry.resolve_in(gid, &layer_name)?;
                        if let Some(t) = tile {
                            let known = map.tileset(t.tileset).and_then(|s| s.tile(t.id)).is_some();
                            if !known {
                                return Err(MapError::InvalidTileGid {
                                    context: layer_name.clone(),
                                    gid,
                                });
                            }
                        }
                        layer.set_tile_at(cell.x, cell.y, tile);
                    }
                    layer.base.visible = l.visible;
                    layer.base.opacity = l.opacity.clamp(0.0, 1.0);
                    layer.base.properties = properties_from_json(l.properties)?;
                    map.plane_mut().add_layer(layer);
                }
                "objectgroup" => {
                    let mut group = ObjectGroup::new(l.name, map.plane().bounds().translated(offset.0, offset.1));
                    for obj in l.objects {
                        let object_type = if !obj.class.is_empty() { obj.class } else { obj.kind };
                        let mut o = MapObject::new(vec2(obj.x / tw, obj.y / th), object_type);
                        o.width = obj.width / tw;
                        o.height = obj.height / th;
                        o.name = (!obj.name.is_empty()).then_some(obj.name);
                        o.properties = properties_from_json(obj.properties)?;
                        group.add_object(o);
                    }
                    group.base.visible = l.visible;
                    group.base.opacity = l.opacity.clamp(0.0, 1.0);
                    group.base.properties = properties_from_json(l.properties)?;
                    map.plane_mut().add_layer(group);
                }
                other => log::warn!("skipping JSON layer '{layer_name}' of type '{other}'"),
            }
        }

        log::info!("loaded map {}", p.display());
        Ok(map)
    }
}
