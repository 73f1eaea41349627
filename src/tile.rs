use std::fmt;

use macroquad::texture::Image;

use crate::error::{MapError, Result};
use crate::properties::Properties;
use crate::tileset::TileRef;

/// RGBA8 pixel payload of a tile or of a tileset image-set entry.
#[derive(Clone)]
pub struct TileImage(Image);

impl TileImage {
    /// Wraps tightly packed RGBA8 pixels.
    pub fn from_rgba(width: u16, height: u16, bytes: Vec<u8>) -> Result<Self> {
        let expected = width as usize * height as usize * 4;
        if bytes.len() != expected {
            return Err(MapError::Image(format!(
                "expected {expected} bytes for {width}x{height} RGBA, got {}",
                bytes.len()
            )));
        }
        Ok(Self(Image {
            bytes,
            width,
            height,
        }))
    }

    /// Width in pixels.
    pub fn width(&self) -> u16 {
        self.0.width
    }

    /// Height in pixels.
    pub fn height(&self) -> u16 {
        self.0.height
    }

    /// Row-major RGBA8 pixels.
    pub fn rgba(&self) -> &[u8] {
        &self.0.bytes
    }

    /// Copy of the `w`×`h` block whose top-left pixel is `(x, y)`.
    pub fn sub_image(&self, x: u16, y: u16, w: u16, h: u16) -> Option<TileImage> {
        if x as u32 + w as u32 > self.0.width as u32 || y as u32 + h as u32 > self.0.height as u32 {
            return None;
        }
        let stride = self.0.width as usize * 4;
        let mut bytes = Vec::with_capacity(w as usize * h as usize * 4);
        for row in y as usize..(y + h) as usize {
            let start = row * stride + x as usize * 4;
            bytes.extend_from_slice(&self.0.bytes[start..start + w as usize * 4]);
        }
        Some(Self(Image {
            bytes,
            width: w,
            height: h,
        }))
    }

    /// Clears alpha on every pixel whose RGB equals `key`.
    pub fn apply_color_key(&mut self, key: [u8; 3]) {
        for px in self.0.bytes.chunks_exact_mut(4) {
            if px[..3] == key {
                px[3] = 0;
            }
        }
    }

    /// Underlying macroquad image, ready for texture upload by a renderer.
    pub fn as_image(&self) -> &Image {
        &self.0
    }
}

impl fmt::Debug for TileImage {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        write!(f, "TileImage({}x{})", self.0.width, self.0.height)
    }
}

impl PartialEq for TileImage {
    fn eq(&self, other: &Self) -> bool {
        self.0.width == other.0.width
            && self.0.height == other.0.height
            && self.0.bytes == other.0.bytes
    }
}

/// Named step of a tile animation.
#[derive(Debug, Clone, PartialEq)]
pub struct KeyFrame {
    /// Display name.
    pub name: String,
    /// Frames in playback order.
    pub frames: Vec<TileRef>,
}

/// Keyframed tile animation.
#[derive(Debug, Clone, Default, PartialEq)]
pub struct Animation {
    /// Keyframes in order.
    pub keyframes: Vec<KeyFrame>,
}

/// A tile, owned by its tileset and addressed by a local id.
#[derive(Debug, Clone, PartialEq)]
pub struct Tile {
    pub(crate) id: u32,
    /// Own pixel payload.
    pub image: Option<TileImage>,
    /// Entry of the tileset's shared image set used instead of `image`.
    pub image_id: Option<u32>,
    /// Optional animation.
    pub animation: Option<Animation>,
    /// Free-form properties.
    pub properties: Properties,
}

impl Tile {
    /// Tile with no payload. The id is assigned by [`crate::Tileset::add_tile`].
    pub fn new() -> Self {
        Self::with_id(u32::MAX)
    }

    pub(crate) fn with_id(id: u32) -> Self {
        Self {
            id,
            image: None,
            image_id: None,
            animation: None,
            properties: Properties::new(),
        }
    }

    /// Tile carrying its own image.
    pub fn with_image(image: TileImage) -> Self {
        Self {
            image: Some(image),
            ..Self::new()
        }
    }

    /// Local id inside the owning tileset.
    pub fn id(&self) -> u32 {
        self.id
    }
}

impl Default for Tile {
    fn default() -> Self {
        Self::new()
    }
}
