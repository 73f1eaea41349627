use std::io;
use std::path::PathBuf;

use thiserror::Error;

/// Errors produced by the map model, the edit log and the map codecs.
#[derive(Debug, Error)]
pub enum MapError {
    // === I/O ===
    /// File I/O error with the offending path.
    #[error("I/O error on '{path}': {source}")]
    Io {
        /// File that failed.
        path: PathBuf,
        /// Underlying error.
        source: io::Error,
    },

    /// File I/O error on an in-memory stream.
    #[error("I/O error: {0}")]
    Stream(#[from] io::Error),

    // === Format errors ===
    /// Malformed XML.
    #[error("XML error: {0}")]
    Xml(#[from] quick_xml::Error),

    /// Malformed JSON.
    #[error("JSON error in '{path}': {source}")]
    Json {
        /// File that failed.
        path: PathBuf,
        /// Underlying error.
        source: serde_json::Error,
    },

    /// A required attribute is absent.
    #[error("<{element}> is missing attribute '{attribute}'")]
    MissingAttribute {
        /// Element name.
        element: String,
        /// Attribute name.
        attribute: String,
    },

    /// An attribute carries a value that cannot be interpreted.
    #[error("<{element}> has invalid {attribute}=\"{value}\"")]
    InvalidAttribute {
        /// Element name.
        element: String,
        /// Attribute name.
        attribute: String,
        /// Raw attribute value.
        value: String,
    },

    /// Orientation token outside the five known values.
    #[error("unknown orientation '{0}'")]
    UnknownOrientation(String),

    /// Layer data encoding that the reader does not understand.
    #[error("unsupported layer data encoding '{0}'")]
    UnsupportedEncoding(String),

    /// Layer data compression that the reader does not understand.
    #[error("unsupported layer data compression '{0}'")]
    UnsupportedCompression(String),

    /// Base64 payload could not be decoded.
    #[error("invalid base64 payload: {0}")]
    Base64(#[from] base64::DecodeError),

    /// Decoded layer data does not cover width * height cells.
    #[error("layer '{layer}' has {found} cells of data, expected {expected}")]
    InvalidLayerData {
        /// Layer name.
        layer: String,
        /// width * height
        expected: usize,
        /// Cells actually decoded.
        found: usize,
    },

    /// A global tile id that no tileset covers.
    #[error("global tile id {gid} in '{context}' is not covered by any tileset")]
    InvalidTileGid {
        /// Where the id was found.
        context: String,
        /// The offending id.
        gid: u32,
    },

    /// JSON property with a type the reader does not know.
    #[error("property '{name}' has unsupported type '{kind}'")]
    UnsupportedPropertyType {
        /// Property name.
        name: String,
        /// Declared type.
        kind: String,
    },

    /// The document is structurally wrong.
    #[error("invalid map: {0}")]
    InvalidMap(String),

    /// Image encoding or decoding failed.
    #[error("image codec error: {0}")]
    Image(String),

    /// No registered reader or writer accepts the file.
    #[error("unsupported file format: {0}")]
    UnsupportedFormat(String),

    // === Invariant violations ===
    /// Operation between two layers of different kinds.
    #[error("layer kind mismatch: {expected} vs {found}")]
    KindMismatch {
        /// Kind of the receiver.
        expected: &'static str,
        /// Kind of the argument.
        found: &'static str,
    },

    /// Operation that the layer kind does not support.
    #[error("'{operation}' is not applicable to a {kind} layer")]
    NotApplicable {
        /// Operation name.
        operation: &'static str,
        /// Layer kind.
        kind: &'static str,
    },

    /// No layer carries the given identity.
    #[error("layer {0} is not part of the plane")]
    LayerNotFound(u64),

    /// Layer index outside the layer stack.
    #[error("layer index {index} out of range (len {len})")]
    LayerIndexOutOfRange {
        /// Requested index.
        index: usize,
        /// Stack length.
        len: usize,
    },

    /// No tileset carries the given identity.
    #[error("tileset {0} is not attached to the map")]
    TilesetNotFound(u32),

    /// A cell references a tile that its tileset does not contain.
    #[error("tile {id} does not exist in tileset {tileset}")]
    InvalidTileRef {
        /// Tileset identity.
        tileset: u32,
        /// Local tile id.
        id: u32,
    },

    /// Masked copy whose mask leaves the receiving layer.
    #[error("mask bounds exceed the receiving layer")]
    MaskOutsideLayer,

    /// `begin` called while another edit is pending.
    #[error("an edit is already in progress")]
    EditInProgress,

    /// `end` called without a pending edit.
    #[error("no edit in progress")]
    NoEditInProgress,
}

/// Convenience alias used throughout the crate.
pub type Result<T> = std::result::Result<T, MapError>;

impl MapError {
    pub(crate) fn io(path: impl Into<PathBuf>, source: io::Error) -> Self {
        MapError::Io {
            path: path.into(),
            source,
        }
    }

    pub(crate) fn missing(element: &str, attribute: &str) -> Self {
        MapError::MissingAttribute {
            element: element.to_owned(),
            attribute: attribute.to_owned(),
        }
    }

    pub(crate) fn invalid(element: &str, attribute: &str, value: &str) -> Self {
        MapError::InvalidAttribute {
            element: element.to_owned(),
            attribute: attribute.to_owned(),
            value: value.to_owned(),
        }
    }
}

impl From<quick_xml::events::attributes::AttrError> for MapError {
    fn from(err: quick_xml::events::attributes::AttrError) -> Self {
        MapError::Xml(err.into())
    }
}
