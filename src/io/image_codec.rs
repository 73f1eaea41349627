use std::io::Cursor;

use crate::error::{MapError, Result};
use crate::tile::TileImage;

/// Raw RGBA pixels to and from a compressed image format.
pub trait ImageCodec: Send + Sync {
    /// Format token written in `format` attributes.
    fn format(&self) -> &str;

    /// Compresses pixels.
    fn encode(&self, image: &TileImage) -> Result<Vec<u8>>;

    /// Decompresses an image to RGBA8.
    fn decode(&self, bytes: &[u8]) -> Result<TileImage>;
}

/// PNG codec backed by the `png` crate.
#[derive(Debug, Clone, Copy, Default)]
pub struct PngCodec;

fn image_err(e: impl std::fmt::Display) -> MapError {
    MapError::Image(e.to_string())
}

impl ImageCodec for PngCodec {
    fn format(&self) -> &str {
        "png"
    }

    fn encode(&self, image: &TileImage) -> Result<Vec<u8>> {
        let mut out = Vec::new();
        {
            let mut encoder =
                png::Encoder::new(&mut out, image.width() as u32, image.height() as u32);
            encoder.set_color(png::ColorType::Rgba);
            encoder.set_depth(png::BitDepth::Eight);
            let mut writer = encoder.write_header().map_err(image_err)?;
            writer.write_image_data(image.rgba()).map_err(image_err)?;
            writer.finish().map_err(image_err)?;
        }
        Ok(out)
    }

    fn decode(&self, bytes: &[u8]) -> Result<TileImage> {
        let mut decoder = png::Decoder::new(Cursor::new(bytes));
        decoder.set_transformations(png::Transformations::normalize_to_color8());
        let mut reader = decoder.read_info().map_err(image_err)?;
        let size = reader
            .output_buffer_size()
            .ok_or_else(|| MapError::Image("image too large".to_owned()))?;
        let mut buf = vec![0; size];
        let info = reader.next_frame(&mut buf).map_err(image_err)?;
        buf.truncate(info.buffer_size());

        let rgba: Vec<u8> = match info.color_type {
            png::ColorType::Rgba => buf,
            png::ColorType::Rgb => buf
                .chunks_exact(3)
                .flat_map(|p| [p[0], p[1], p[2], 255])
                .collect(),
            png::ColorType::GrayscaleAlpha => buf
                .chunks_exact(2)
                .flat_map(|p| [p[0], p[0], p[0], p[1]])
                .collect(),
            png::ColorType::Grayscale => buf.iter().flat_map(|&g| [g, g, g, 255]).collect(),
            png::ColorType::Indexed => {
                return Err(MapError::Image("palette was not expanded".to_owned()))
            }
        };
        let (w, h) = (
            u16::try_from(info.width).map_err(image_err)?,
            u16::try_from(info.height).map_err(image_err)?,
        );
        TileImage::from_rgba(w, h, rgba)
    }
}
