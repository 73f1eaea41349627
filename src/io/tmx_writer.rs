use std::path::Path;
use std::sync::Arc;

use base64::{engine::general_purpose::STANDARD, Engine as _};

use super::image_codec::{ImageCodec, PngCodec};
use super::paths::{file_name_of, parent_dir, relative_path};
use super::xml_tree::XmlOut;
use super::{gzip, has_suffix, write_atomically, MapWriter, SaveOptions};
use crate::error::Result;
use crate::layer::{MapLayer, ObjectGroup, TileLayer};
use crate::map::Map;
use crate::registry::GidRegistry;
use crate::tile::Tile;
use crate::tileset::{color_to_rgb, Tileset};

/// Format version written on the root element.
pub const TMX_VERSION: &str = "0.99a";

/// Writes `.tmx` / `.tmx.gz` maps and `.tsx` tilesets.
#[derive(Clone)]
pub struct TmxWriter {
    codec: Arc<dyn ImageCodec>,
}

impl Default for TmxWriter {
    fn default() -> Self {
        Self::new()
    }
}

/// Per-document write state.
struct Ctx<'a> {
    out: XmlOut,
    registry: GidRegistry,
    /// Document being written; references are relative to it.
    path: &'a Path,
    options: &'a SaveOptions,
    codec: &'a dyn ImageCodec,
}

impl TmxWriter {
    /// Writer embedding images as PNG.
    pub fn new() -> Self {
        Self::with_codec(Arc::new(PngCodec))
    }

    /// Writer using another image codec.
    pub fn with_codec(codec: Arc<dyn ImageCodec>) -> Self {
        Self { codec }
    }

    /// Serialises a map. Tile images that are neither embedded nor shared are
    /// written as files beside `path`.
    pub fn map_to_bytes(&self, map: &mut Map, path: &Path, options: &SaveOptions) -> Result<Vec<u8>> {
        let registry = map.assign_first_gids();
        let mut ctx = Ctx {
            out: XmlOut::new()?,
            registry,
            path,
            options,
            codec: self.codec.as_ref(),
        };

        ctx.out.start(
            "map",
            &[
                ("version", TMX_VERSION.to_owned()),
                ("orientation", map.orientation.to_string()),
                ("width", map.width().to_string()),
                ("height", map.height().to_string()),
                ("tilewidth", map.tile_width.to_string()),
                ("tileheight", map.tile_height.to_string()),
            ],
        )?;
        ctx.out.properties(&map.properties)?;

        for set in map.tilesets() {
            match &set.source {
                Some(source) => {
                    let mut attrs = vec![
                        ("firstgid", set.first_gid.to_string()),
                        ("source", file_name_of(&source.to_string_lossy()).to_owned()),
                    ];
                    if let Some(base) = &set.base_dir {
                        attrs.push(("basedir", base.clone()));
                    }
                    ctx.out.empty("tileset", &attrs)?;
                }
                None => write_tileset(&mut ctx, set, Some(set.first_gid))?,
            }
        }

        for layer in map.plane().layers() {
            write_layer(&mut ctx, layer)?;
        }

        ctx.out.end("map")?;
        Ok(ctx.out.into_bytes())
    }

    /// Serialises a standalone tileset document.
    pub fn tileset_to_bytes(&self, set: &Tileset, path: &Path, options: &SaveOptions) -> Result<Vec<u8>> {
        let mut ctx = Ctx {
            out: XmlOut::new()?,
            registry: GidRegistry::from_first_gids([(set.id(), 1)]),
            path,
            options,
            codec: self.codec.as_ref(),
        };
        write_tileset(&mut ctx, set, None)?;
        Ok(ctx.out.into_bytes())
    }
}

impl MapWriter for TmxWriter {
    fn name(&self) -> &str {
        "Tiled TMX"
    }

    fn filter(&self) -> &str {
        "*.tmx,*.tmx.gz,*.tsx"
    }

    fn accepts(&self, path: &Path) -> bool {
        has_suffix(path, &[".tmx", ".tmx.gz", ".tsx"])
    }

    fn write_map(&self, map: &mut Map, path: &Path, options: &SaveOptions) -> Result<()> {
        let mut bytes = self.map_to_bytes(map, path, options)?;
        if has_suffix(path, &[".gz"]) {
            bytes = gzip(&bytes)?;
        }
        write_atomically(path, &bytes)?;
        log::info!("wrote map {}", path.display());
        Ok(())
    }

    fn write_tileset(&self, tileset: &Tileset, path: &Path, options: &SaveOptions) -> Result<()> {
        let bytes = self.tileset_to_bytes(tileset, path, options)?;
        write_atomically(path, &bytes)?;
        log::info!("wrote tileset {}", path.display());
        Ok(())
    }
}

fn has_extras(tile: &Tile) -> bool {
    !tile.properties.is_empty() || tile.animation.is_some()
}

/// Whether tiles need their own elements.
fn needs_tile_elements(set: &Tileset, options: &SaveOptions) -> bool {
    options.embed_images
        || !set.is_one_for_one()
        || set.tiles().any(has_extras)
        || (!options.tileset_images && set.tiles().any(|t| set.tile_image(t.id()).is_some()))
}

fn write_tileset(ctx: &mut Ctx<'_>, set: &Tileset, first_gid: Option<u32>) -> Result<()> {
    let mut attrs = Vec::new();
    if let Some(name) = &set.name {
        attrs.push(("name", name.clone()));
    }
    if let Some(first) = first_gid {
        attrs.push(("firstgid", first.to_string()));
    }
    let shared = set.image_source.as_ref();
    if shared.is_some() {
        attrs.push(("tilewidth", set.tile_width.to_string()));
        attrs.push(("tileheight", set.tile_height.to_string()));
        if set.spacing != 0 {
            attrs.push(("spacing", set.spacing.to_string()));
        }
    }
    if let Some(base) = &set.base_dir {
        attrs.push(("basedir", base.clone()));
    }
    ctx.out.start("tileset", &attrs)?;

    if let Some(bitmap) = shared {
        let mut image_attrs = vec![("source", relative_path(ctx.path, bitmap))];
        if let Some(color) = set.transparent_color {
            let [r, g, b] = color_to_rgb(color);
            image_attrs.push(("trans", format!("{r:02x}{g:02x}{b:02x}")));
        }
        ctx.out.empty("image", &image_attrs)?;
        // pixels come from the bitmap, only metadata goes per tile
        for tile in set.tiles().filter(|t| has_extras(t)) {
            write_tile(ctx, set, tile, false)?;
        }
    } else {
        if ctx.options.tileset_images {
            for (id, image) in set.images() {
                let encoded = STANDARD.encode(ctx.codec.encode(image)?);
                ctx.out.start(
                    "image",
                    &[("format", ctx.codec.format().to_owned()), ("id", id.to_string())],
                )?;
                ctx.out.start("data", &[("encoding", "base64".to_owned())])?;
                ctx.out.text(&encoded)?;
                ctx.out.end("data")?;
                ctx.out.end("image")?;
            }
        }
        if needs_tile_elements(set, ctx.options) {
            for tile in set.tiles() {
                write_tile(ctx, set, tile, true)?;
            }
        }
    }

    ctx.out.end("tileset")
}

fn write_tile(ctx: &mut Ctx<'_>, set: &Tileset, tile: &Tile, with_image: bool) -> Result<()> {
    ctx.out.start("tile", &[("id", tile.id().to_string())])?;
    ctx.out.properties(&tile.properties)?;

    if with_image {
        if ctx.options.tileset_images && tile.image.is_none() {
            if let Some(image_id) = tile.image_id {
                ctx.out.empty("image", &[("id", image_id.to_string())])?;
            }
        } else if let Some(pixels) = set.tile_image(tile.id()) {
            let encoded = ctx.codec.encode(pixels)?;
            if ctx.options.embed_images || ctx.options.tileset_images {
                ctx.out
                    .start("image", &[("format", ctx.codec.format().to_owned())])?;
                ctx.out.start("data", &[("encoding", "base64".to_owned())])?;
                ctx.out.text(&STANDARD.encode(encoded))?;
                ctx.out.end("data")?;
                ctx.out.end("image")?;
            } else {
                let gid = set.first_gid + tile.id();
                let file = format!("{}{gid}.{}", ctx.options.tile_image_prefix, ctx.codec.format());
                write_atomically(&parent_dir(ctx.path).join(&file), &encoded)?;
                ctx.out.empty("image", &[("source", file)])?;
            }
        }
    }

    if let Some(animation) = &tile.animation {
        ctx.out.start("animation", &[])?;
        for key in &animation.keyframes {
            ctx.out.start("keyframe", &[("name", key.name.clone())])?;
            for frame in &key.frames {
                let gid = ctx.registry.gid_of(Some(*frame))?;
                ctx.out.empty("tile", &[("gid", gid.to_string())])?;
            }
            ctx.out.end("keyframe")?;
        }
        ctx.out.end("animation")?;
    }

    ctx.out.end("tile")
}

fn layer_attrs(layer: &MapLayer) -> Vec<(&'static str, String)> {
    let b = layer.bounds();
    let mut attrs = vec![
        ("name", layer.name().to_owned()),
        ("width", b.width.to_string()),
        ("height", b.height.to_string()),
    ];
    if b.x != 0 {
        attrs.push(("xoffset", b.x.to_string()));
    }
    if b.y != 0 {
        attrs.push(("yoffset", b.y.to_string()));
    }
    if !layer.is_visible() {
        attrs.push(("visible", "0".to_owned()));
    }
    if layer.opacity() < 1.0 {
        attrs.push(("opacity", layer.opacity().to_string()));
    }
    attrs
}

fn write_layer(ctx: &mut Ctx<'_>, layer: &MapLayer) -> Result<()> {
    let element = match layer {
        MapLayer::Tiles(_) => "layer",
        MapLayer::Objects(_) => "objectgroup",
        MapLayer::Selection(_) => "selection",
    };
    ctx.out.start(element, &layer_attrs(layer))?;
    ctx.out.properties(layer.properties())?;
    match layer {
        MapLayer::Tiles(tiles) => write_tile_data(ctx, tiles)?,
        MapLayer::Objects(group) => write_objects(ctx, group)?,
        MapLayer::Selection(_) => {}
    }
    ctx.out.end(element)
}

fn write_tile_data(ctx: &mut Ctx<'_>, layer: &TileLayer) -> Result<()> {
    let cells = layer.bounds().cells();
    if ctx.options.encode_layer_data {
        let mut raw = Vec::with_capacity(layer.bounds().area() * 4);
        for c in cells {
            let gid = ctx.registry.gid_of(layer.tile_at(c.x, c.y))?;
            raw.extend_from_slice(&gid.to_le_bytes());
        }
        let mut attrs = vec![("encoding", "base64".to_owned())];
        if ctx.options.layer_compression {
            raw = gzip(&raw)?;
            attrs.push(("compression", "gzip".to_owned()));
        }
        ctx.out.start("data", &attrs)?;
        ctx.out.text(&STANDARD.encode(raw))?;
        ctx.out.end("data")
    } else {
        ctx.out.start("data", &[])?;
        for c in cells {
            let gid = ctx.registry.gid_of(layer.tile_at(c.x, c.y))?;
            ctx.out.empty("tile", &[("gid", gid.to_string())])?;
        }
        ctx.out.end("data")
    }
}

fn write_objects(ctx: &mut Ctx<'_>, group: &ObjectGroup) -> Result<()> {
    let origin = group.bounds();
    for obj in group.objects() {
        let mut attrs = vec![
            ("x", (obj.position.x + origin.x as f32).to_string()),
            ("y", (obj.position.y + origin.y as f32).to_string()),
            ("type", obj.object_type.clone()),
        ];
        if let Some(name) = &obj.name {
            attrs.push(("name", name.clone()));
        }
        if obj.width != 0.0 {
            attrs.push(("width", obj.width.to_string()));
        }
        if obj.height != 0.0 {
            attrs.push(("height", obj.height.to_string()));
        }
        if let Some(source) = &obj.source {
            attrs.push(("source", source.clone()));
        }
        if obj.properties.is_empty() {
            ctx.out.empty("object", &attrs)?;
        } else {
            ctx.out.start("object", &attrs)?;
            ctx.out.properties(&obj.properties)?;
            ctx.out.end("object")?;
        }
    }
    Ok(())
}
