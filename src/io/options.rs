use std::path::Path;

use serde::{Deserialize, Serialize};

use crate::error::{MapError, Result};

/// Save-time switches threaded into the writers.
#[derive(Debug, Clone, PartialEq, Eq, Serialize, Deserialize)]
#[serde(default)]
pub struct SaveOptions {
    /// Write tile images inline as base64 PNG.
    pub embed_images: bool,
    /// Write images once per tileset and let tiles refer to them by id.
    pub tileset_images: bool,
    /// Write layer data as base64 bytes instead of one element per cell.
    pub encode_layer_data: bool,
    /// Gzip layer data before base64 encoding.
    pub layer_compression: bool,
    /// File name prefix for tile images written beside the map.
    pub tile_image_prefix: String,
}

impl Default for SaveOptions {
    fn default() -> Self {
        Self {
            embed_images: true,
            tileset_images: false,
            encode_layer_data: true,
            layer_compression: true,
            tile_image_prefix: "tile".to_owned(),
        }
    }
}

impl SaveOptions {
    /// Parses options from JSON; missing fields keep their defaults.
    pub fn from_json_str(json: &str) -> std::result::Result<Self, serde_json::Error> {
        serde_json::from_str(json)
    }

    /// Reads options from a JSON file.
    pub fn load(path: impl AsRef<Path>) -> Result<Self> {
        let path = path.as_ref();
        let txt = std::fs::read_to_string(path).map_err(|source| MapError::io(path, source))?;
        Self::from_json_str(&txt).map_err(|source| MapError::Json {
            path: path.to_path_buf(),
            source,
        })
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn missing_fields_keep_defaults() {
        let opts = SaveOptions::from_json_str(r#"{ "layer_compression": false }"#).unwrap();
        assert!(!opts.layer_compression);
        assert!(opts.embed_images);
        assert_eq!(opts.tile_image_prefix, "tile");
    }

    #[test]
    fn missing_file_is_an_io_error() {
        let err = SaveOptions::load("/definitely/not/here.json").unwrap_err();
        assert!(matches!(err, MapError::Io { .. }));
    }
}
