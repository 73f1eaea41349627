//! Map file formats.
//!
//! Readers and writers are looked up by file name through a
//! [`FormatRegistry`]; TMX is the native format.

mod image_codec;
mod json_loader;
mod options;
mod paths;
mod tmx_loader;
mod tmx_writer;
mod xml_tree;

use std::io::{Read, Write};
use std::path::Path;

use flate2::read::{GzDecoder, ZlibDecoder};
use flate2::write::GzEncoder;
use flate2::Compression;

pub use image_codec::{ImageCodec, PngCodec};
pub use json_loader::JsonMapReader;
pub use options::SaveOptions;
pub use paths::{file_name_of, relative_path};
pub use tmx_loader::TmxReader;
pub use tmx_writer::TmxWriter;

use crate::error::{MapError, Result};
use crate::map::Map;
use crate::tileset::Tileset;

/// Loads maps from one file format.
pub trait MapReader {
    /// Human-readable format name.
    fn name(&self) -> &str;

    /// File dialog filter, e.g. `*.tmx`.
    fn filter(&self) -> &str;

    /// Whether the file name looks like this format.
    fn accepts(&self, path: &Path) -> bool;

    /// Reads a whole map.
    fn read_map(&self, path: &Path) -> Result<Map>;

    /// Reads a standalone tileset.
    fn read_tileset(&self, path: &Path) -> Result<Tileset> {
        Err(MapError::UnsupportedFormat(path.display().to_string()))
    }
}

/// Saves maps in one file format.
pub trait MapWriter {
    /// Human-readable format name.
    fn name(&self) -> &str;

    /// File dialog filter.
    fn filter(&self) -> &str;

    /// Whether the file name looks like this format.
    fn accepts(&self, path: &Path) -> bool;

    /// Writes a whole map. First gids are recomputed and stored on the
    /// map's tilesets.
    fn write_map(&self, map: &mut Map, path: &Path, options: &SaveOptions) -> Result<()>;

    /// Writes a standalone tileset.
    fn write_tileset(&self, tileset: &Tileset, path: &Path, options: &SaveOptions) -> Result<()> {
        let _ = (tileset, options);
        Err(MapError::UnsupportedFormat(path.display().to_string()))
    }
}

/// Readers and writers keyed by file name.
#[derive(Default)]
pub struct FormatRegistry {
    readers: Vec<Box<dyn MapReader>>,
    writers: Vec<Box<dyn MapWriter>>,
}

impl FormatRegistry {
    /// Registry without any format.
    pub fn new() -> Self {
        Self::default()
    }

    /// TMX reader and writer plus the Tiled JSON reader.
    pub fn with_defaults() -> Self {
        let mut registry = Self::new();
        registry.register_reader(TmxReader::new());
        registry.register_reader(JsonMapReader::new());
        registry.register_writer(TmxWriter::new());
        registry
    }

    /// Adds a reader; later registrations are tried last.
    pub fn register_reader(&mut self, reader: impl MapReader + 'static) {
        self.readers.push(Box::new(reader));
    }

    /// Adds a writer.
    pub fn register_writer(&mut self, writer: impl MapWriter + 'static) {
        self.writers.push(Box::new(writer));
    }

    /// First reader accepting the file.
    pub fn reader_for(&self, path: &Path) -> Result<&dyn MapReader> {
        self.readers
            .iter()
            .find(|r| r.accepts(path))
            .map(|r| r.as_ref())
            .ok_or_else(|| MapError::UnsupportedFormat(path.display().to_string()))
    }

    /// First writer accepting the file.
    pub fn writer_for(&self, path: &Path) -> Result<&dyn MapWriter> {
        self.writers
            .iter()
            .find(|w| w.accepts(path))
            .map(|w| w.as_ref())
            .ok_or_else(|| MapError::UnsupportedFormat(path.display().to_string()))
    }

    /// Reader filters, for open dialogs.
    pub fn reader_filters(&self) -> impl Iterator<Item = (&str, &str)> {
        self.readers.iter().map(|r| (r.name(), r.filter()))
    }

    /// Writer filters, for save dialogs.
    pub fn writer_filters(&self) -> impl Iterator<Item = (&str, &str)> {
        self.writers.iter().map(|w| (w.name(), w.filter()))
    }

    /// Reads a map with the matching reader.
    pub fn read_map(&self, path: &Path) -> Result<Map> {
        self.reader_for(path)?.read_map(path)
    }

    /// Writes a map with the matching writer.
    pub fn write_map(&self, map: &mut Map, path: &Path, options: &SaveOptions) -> Result<()> {
        self.writer_for(path)?.write_map(map, path, options)
    }
}

/// Case-insensitive suffix test on the file name.
pub(crate) fn has_suffix(path: &Path, suffixes: &[&str]) -> bool {
    let name = path
        .file_name()
        .map(|n| n.to_string_lossy().to_ascii_lowercase())
        .unwrap_or_default();
    suffixes.iter().any(|s| name.ends_with(s))
}

/// Writes `bytes` to a temporary file next to `path`, then renames it
/// over `path`. On failure the previous file is left as it was.
pub fn write_atomically(path: &Path, bytes: &[u8]) -> Result<()> {
    let dir = paths::parent_dir(path);
    let mut tmp = tempfile::NamedTempFile::new_in(&dir).map_err(|e| MapError::io(&dir, e))?;
    tmp.write_all(bytes).map_err(|e| MapError::io(path, e))?;
    tmp.as_file().sync_all().map_err(|e| MapError::io(path, e))?;
    tmp.persist(path).map_err(|e| MapError::io(path, e.error))?;
    Ok(())
}

pub(crate) fn gzip(bytes: &[u8]) -> Result<Vec<u8>> {
    let mut enc = GzEncoder::new(Vec::new(), Compression::default());
    enc.write_all(bytes)?;
    Ok(enc.finish()?)
}

pub(crate) fn gunzip(bytes: &[u8]) -> Result<Vec<u8>> {
    let mut out = Vec::new();
    GzDecoder::new(bytes).read_to_end(&mut out)?;
    Ok(out)
}

pub(crate) fn inflate_zlib(bytes: &[u8]) -> Result<Vec<u8>> {
    let mut out = Vec::new();
    ZlibDecoder::new(bytes).read_to_end(&mut out)?;
    Ok(out)
}

pub(crate) fn is_gzip(bytes: &[u8]) -> bool {
    bytes.starts_with(&[0x1f, 0x8b])
}

#[cfg(test)]
mod tests {
    use super::*;
    use std::fs;
    use std::path::PathBuf;
    use std::time::{SystemTime, UNIX_EPOCH};

    fn temp_dir() -> PathBuf {
        let nanos = SystemTime::now()
            .duration_since(UNIX_EPOCH)
            .expect("clock went backwards")
            .as_nanos();
        let dir = std::env::temp_dir().join(format!("tiled_core_io_{nanos}"));
        fs::create_dir_all(&dir).expect("failed to create temp dir");
        dir
    }

    #[test]
    fn atomic_write_replaces_whole_file() {
        let dir = temp_dir();
        let path = dir.join("out.tmx");
        fs::write(&path, "old contents that are longer").unwrap();
        write_atomically(&path, b"new").unwrap();
        assert_eq!(fs::read(&path).unwrap(), b"new");
        // no stray temp files
        assert_eq!(fs::read_dir(&dir).unwrap().count(), 1);
    }

    #[test]
    fn atomic_write_into_missing_dir_fails_with_path() {
        let path = Path::new("/definitely/not/here/map.tmx");
        assert!(matches!(write_atomically(path, b"x"), Err(MapError::Io { .. })));
    }

    #[test]
    fn registry_picks_format_by_suffix() {
        let registry = FormatRegistry::with_defaults();
        assert_eq!(registry.reader_for(Path::new("a/B.TMX")).unwrap().name(), "Tiled TMX");
        assert_eq!(registry.reader_for(Path::new("m.tmx.gz")).unwrap().name(), "Tiled TMX");
        assert_eq!(registry.reader_for(Path::new("m.json")).unwrap().name(), "Tiled JSON");
        assert!(registry.writer_for(Path::new("m.json")).is_err());
        assert!(matches!(
            registry.reader_for(Path::new("m.png")),
            Err(MapError::UnsupportedFormat(_))
        ));
    }

    #[test]
    fn gzip_round_trip_and_magic() {
        let packed = gzip(b"hello hello hello").unwrap();
        assert!(is_gzip(&packed));
        assert_eq!(gunzip(&packed).unwrap(), b"hello hello hello");
    }
}
