#![warn(missing_docs)]

//! Document core of a Tiled-style tile map editor.
//!
//! A [`Map`] owns a stack of layers ([`MultilayerPlane`]) and the tilesets
//! their cells refer to. Edits go through an [`UndoStack`] that keeps only
//! the rectangle each edit changed. Maps are read from and written to TMX
//! (plain or gzipped) through the [`io`] module; Tiled JSON maps can be
//! read as well. [`Editor`] ties it together for a UI.

mod editor;
mod error;
mod geom;
mod history;
pub mod io;
mod layer;
mod map;
mod plane;
mod properties;
mod registry;
mod snapshot;
mod tile;
mod tileset;

pub use editor::{Editor, MapEvent, MapListener};
pub use error::{MapError, Result};
pub use geom::{Region, TileRect};
pub use history::{Change, Edit, EditState, UndoStack};
pub use layer::{
    LayerId, MapLayer, MapObject, Mirror, ObjectGroup, Rotation, SelectionLayer, TileLayer,
    Transform,
};
pub use map::{Map, Orientation};
pub use plane::MultilayerPlane;
pub use properties::Properties;
pub use registry::GidRegistry;
pub use snapshot::{chunks_in_rect, ChunkCoord, PlaneSnapshot, VisibleCell, CHUNK_SIZE};
pub use tile::{Animation, KeyFrame, Tile, TileImage};
pub use tileset::{TileRef, Tileset, TilesetId};
