//! Ordered layer stack sharing one coordinate space.
//!
//! Layers are held behind [`Arc`] so a renderer or the edit log can keep
//! an old version alive while the plane swaps in a new one.

use std::sync::Arc;

use crate::error::{MapError, Result};
use crate::geom::TileRect;
use crate::layer::{LayerId, MapLayer};

/// Stack of layers, bottom first.
#[derive(Debug, Clone, Default, PartialEq)]
pub struct MultilayerPlane {
    width: i32,
    height: i32,
    layers: Vec<Arc<MapLayer>>,
}

impl MultilayerPlane {
    /// Empty plane of `width`×`height` cells.
    pub fn new(width: i32, height: i32) -> Self {
        Self {
            width,
            height,
            layers: Vec::new(),
        }
    }

    /// Plane width in cells.
    pub fn width(&self) -> i32 {
        self.width
    }

    /// Plane height in cells.
    pub fn height(&self) -> i32 {
        self.height
    }

    /// Rectangle covered by the plane.
    pub fn bounds(&self) -> TileRect {
        TileRect::new(0, 0, self.width, self.height)
    }

    /// Number of layers.
    pub fn len(&self) -> usize {
        self.layers.len()
    }

    /// True when the plane has no layer.
    pub fn is_empty(&self) -> bool {
        self.layers.is_empty()
    }

    /// Layers, bottom first.
    pub fn layers(&self) -> impl Iterator<Item = &MapLayer> {
        self.layers.iter().map(|l| l.as_ref())
    }

    /// Layer at a stack position.
    pub fn layer(&self, index: usize) -> Option<&MapLayer> {
        self.layers.get(index).map(|l| l.as_ref())
    }

    /// Stack position of a layer.
    pub fn index_of(&self, id: LayerId) -> Option<usize> {
        self.layers.iter().position(|l| l.id() == id)
    }

    /// Layer by identity.
    pub fn layer_by_id(&self, id: LayerId) -> Option<&MapLayer> {
        self.index_of(id).map(|i| self.layers[i].as_ref())
    }

    fn check_index(&self, index: usize, len: usize) -> Result<()> {
        if index < len {
            Ok(())
        } else {
            Err(MapError::LayerIndexOutOfRange {
                index,
                len: self.layers.len(),
            })
        }
    }

    fn position(&self, id: LayerId) -> Result<usize> {
        self.index_of(id).ok_or(MapError::LayerNotFound(id.0))
    }

    /// Pushes a layer on top and returns its position.
    pub fn add_layer(&mut self, layer: impl Into<MapLayer>) -> usize {
        self.layers.push(Arc::new(layer.into()));
        self.layers.len() - 1
    }

    /// Inserts a layer at `index` (`len` appends).
    pub fn insert_layer(&mut self, index: usize, layer: impl Into<MapLayer>) -> Result<()> {
        self.check_index(index, self.layers.len() + 1)?;
        self.layers.insert(index, Arc::new(layer.into()));
        Ok(())
    }

    /// Removes and returns the layer at `index`.
    pub fn remove_layer(&mut self, index: usize) -> Result<Arc<MapLayer>> {
        self.check_index(index, self.layers.len())?;
        Ok(self.layers.remove(index))
    }

    /// Inserts a fresh-identity copy above the layer and returns its
    /// position.
    pub fn duplicate_layer(&mut self, index: usize) -> Result<usize> {
        self.check_index(index, self.layers.len())?;
        let mut copy = self.layers[index].duplicate();
        copy.set_name(format!("{} copy", copy.name()));
        self.layers.insert(index + 1, Arc::new(copy));
        Ok(index + 1)
    }

    /// Moves a layer from one stack position to another.
    pub fn move_layer(&mut self, from: usize, to: usize) -> Result<()> {
        self.check_index(from, self.layers.len())?;
        self.check_index(to, self.layers.len())?;
        let layer = self.layers.remove(from);
        self.layers.insert(to, layer);
        Ok(())
    }

    /// Swaps the layer with the one above; no-op at the top.
    pub fn raise_layer(&mut self, index: usize) -> Result<usize> {
        self.check_index(index, self.layers.len())?;
        if index + 1 < self.layers.len() {
            self.layers.swap(index, index + 1);
            Ok(index + 1)
        } else {
            Ok(index)
        }
    }

    /// Swaps the layer with the one below; no-op at the bottom.
    pub fn lower_layer(&mut self, index: usize) -> Result<usize> {
        self.check_index(index, self.layers.len())?;
        if index > 0 {
            self.layers.swap(index, index - 1);
            Ok(index - 1)
        } else {
            Ok(index)
        }
    }

    /// Composites the layer at `index` onto the one below and removes it.
    ///
    /// The lower layer is rebuilt and swapped in, so old versions held
    /// elsewhere stay intact.
    pub fn merge_down(&mut self, index: usize) -> Result<()> {
        self.check_index(index, self.layers.len())?;
        if index == 0 {
            return Err(MapError::LayerIndexOutOfRange {
                index: 0,
                len: self.layers.len(),
            });
        }
        let mut below = (*self.layers[index - 1]).clone();
        self.layers[index].merge_onto(&mut below)?;
        self.layers[index - 1] = Arc::new(below);
        self.layers.remove(index);
        Ok(())
    }

    /// Swaps in a new version of a layer, matched by identity.
    pub fn replace_layer(&mut self, layer: Arc<MapLayer>) -> Result<Arc<MapLayer>> {
        let i = self.position(layer.id())?;
        Ok(std::mem::replace(&mut self.layers[i], layer))
    }

    /// Builds a modified copy of a layer and swaps it in; on error the plane
    /// is left untouched.
    pub fn modify_layer<T>(
        &mut self,
        id: LayerId,
        f: impl FnOnce(&mut MapLayer) -> Result<T>,
    ) -> Result<T> {
        let i = self.position(id)?;
        let mut next = (*self.layers[i]).clone();
        let out = f(&mut next)?;
        self.layers[i] = Arc::new(next);
        Ok(out)
    }

    /// Copy-on-write access to one layer. The layer is cloned only while
    /// another handle still shares it.
    pub fn layer_mut(&mut self, id: LayerId) -> Result<&mut MapLayer> {
        let i = self.position(id)?;
        Ok(Arc::make_mut(&mut self.layers[i]))
    }

    /// Shared handle on the current version of a layer.
    pub fn layer_handle(&self, id: LayerId) -> Option<Arc<MapLayer>> {
        self.index_of(id).map(|i| Arc::clone(&self.layers[i]))
    }

    /// Handles on every layer, bottom first.
    pub fn snapshot_layers(&self) -> Vec<Arc<MapLayer>> {
        self.layers.clone()
    }

    /// Replaces the whole stack.
    pub fn restore_layers(&mut self, layers: Vec<Arc<MapLayer>>) {
        self.layers = layers;
    }

    /// Mutable access through copy-on-write, for bulk edits outside the
    /// edit log.
    pub fn layers_mut(&mut self) -> impl Iterator<Item = &mut MapLayer> {
        self.layers.iter_mut().map(Arc::make_mut)
    }
}
