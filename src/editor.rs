//! Editing session over one map document.
//!
//! The [`Editor`] is what a UI talks to: it routes every mutation through
//! the edit log, keeps the current layer and tile, owns the marquee
//! selection and the clipboard, and tells listeners what changed.

use std::path::{Path, PathBuf};
use std::sync::Arc;

use anyhow::{bail, Context};

use crate::error::{MapError, Result};
use crate::geom::{Region, TileRect};
use crate::history::UndoStack;
use crate::io::{FormatRegistry, SaveOptions};
use crate::layer::{LayerId, MapLayer, SelectionLayer, Transform};
use crate::map::Map;
use crate::plane::MultilayerPlane;
use crate::snapshot::PlaneSnapshot;
use crate::tileset::{TileRef, Tileset, TilesetId};

/// Change notification sent to [`MapListener`]s.
#[derive(Debug, Clone, PartialEq)]
pub enum MapEvent {
    /// Cells or objects of one layer changed; `area` is `None` when the
    /// whole layer may differ.
    LayerContentChanged {
        /// Changed layer.
        layer: LayerId,
        /// Changed rectangle, if known.
        area: Option<TileRect>,
    },
    /// Layers were added, removed, reordered or had attributes changed.
    LayersChanged,
    /// The marquee selection changed.
    SelectionChanged,
    /// Tilesets were added, removed or modified.
    TilesetsChanged,
    /// The undo stack or its cursor moved.
    HistoryChanged,
    /// The document was written to disk.
    Saved,
}

/// Observer of an [`Editor`].
pub trait MapListener {
    /// Called after each change, in order.
    fn map_changed(&mut self, event: &MapEvent);
}

/// One open map with its history, selection and clipboard.
pub struct Editor {
    map: Map,
    history: UndoStack,
    current_layer: Option<usize>,
    current_tile: Option<TileRef>,
    marquee: SelectionLayer,
    clipboard: Option<MapLayer>,
    listeners: Vec<Box<dyn MapListener>>,
    formats: FormatRegistry,
    options: SaveOptions,
    path: Option<PathBuf>,
    // changes made outside the edit log since the last save
    untracked_changes: bool,
}

impl Editor {
    /// Session over an in-memory map, not yet saved anywhere.
    pub fn new(map: Map) -> Self {
        let current_layer = (!map.plane().is_empty()).then_some(0);
        let marquee = SelectionLayer::new(map.width(), map.height());
        Self {
            path: map.filename.clone(),
            map,
            history: UndoStack::new(),
            current_layer,
            current_tile: None,
            marquee,
            clipboard: None,
            listeners: Vec::new(),
            formats: FormatRegistry::with_defaults(),
            options: SaveOptions::default(),
            untracked_changes: false,
        }
    }

    /// Opens a map with the reader registered for its file name.
    pub fn open(path: impl AsRef<Path>) -> anyhow::Result<Self> {
        let path = path.as_ref();
        let formats = FormatRegistry::with_defaults();
        let map = formats
            .read_map(path)
            .with_context(|| format!("Opening map {}", path.display()))?;
        let mut editor = Self::new(map);
        editor.formats = formats;
        editor.path = Some(path.to_path_buf());
        log::info!("opened {}", path.display());
        Ok(editor)
    }

    /// Saves to the file the map came from or was last saved to.
    pub fn save(&mut self) -> anyhow::Result<()> {
        let Some(path) = self.path.clone() else {
            bail!("map has no file name yet");
        };
        self.save_as(path)
    }

    /// Saves to `path`, which becomes the document's file.
    pub fn save_as(&mut self, path: impl AsRef<Path>) -> anyhow::Result<()> {
        let path = path.as_ref();
        if self.history.is_pending() {
            bail!("cannot save {} while an edit is in progress", path.display());
        }
        self.formats
            .write_map(&mut self.map, path, &self.options)
            .with_context(|| format!("Saving map {}", path.display()))?;
        self.map.filename = Some(path.to_path_buf());
        self.path = Some(path.to_path_buf());
        self.history.mark_all_saved();
        self.untracked_changes = false;
        self.emit(MapEvent::Saved);
        Ok(())
    }

    /// The document.
    pub fn map(&self) -> &Map {
        &self.map
    }

    /// The edit log.
    pub fn history(&self) -> &UndoStack {
        &self.history
    }

    /// File the document is bound to.
    pub fn path(&self) -> Option<&Path> {
        self.path.as_deref()
    }

    /// Options used by the next save.
    pub fn options(&self) -> &SaveOptions {
        &self.options
    }

    /// Replaces the save options.
    pub fn set_options(&mut self, options: SaveOptions) {
        self.options = options;
    }

    /// Format registry, for plugging in extra readers and writers.
    pub fn formats_mut(&mut self) -> &mut FormatRegistry {
        &mut self.formats
    }

    /// Registers an observer.
    pub fn add_listener(&mut self, listener: Box<dyn MapListener>) {
        self.listeners.push(listener);
    }

    fn emit(&mut self, event: MapEvent) {
        for listener in &mut self.listeners {
            listener.map_changed(&event);
        }
    }

    /// Frozen view of the layer stack for a renderer.
    pub fn snapshot(&self) -> PlaneSnapshot {
        PlaneSnapshot::capture(self.map.plane())
    }

    // --- current layer and tile ---

    /// Position of the layer being edited.
    pub fn current_layer_index(&self) -> Option<usize> {
        self.current_layer
    }

    /// The layer being edited.
    pub fn current_layer(&self) -> Option<&MapLayer> {
        self.current_layer.and_then(|i| self.map.plane().layer(i))
    }

    /// Selects the layer being edited.
    pub fn set_current_layer(&mut self, index: usize) -> Result<()> {
        let len = self.map.plane().len();
        if index >= len {
            return Err(MapError::LayerIndexOutOfRange { index, len });
        }
        self.current_layer = Some(index);
        Ok(())
    }

    /// Tile used by paint and fill; `None` erases.
    pub fn current_tile(&self) -> Option<TileRef> {
        self.current_tile
    }

    /// Sets the tile used by paint and fill.
    pub fn set_current_tile(&mut self, tile: Option<TileRef>) {
        self.current_tile = tile;
    }

    fn current_id(&self) -> Result<LayerId> {
        let len = self.map.plane().len();
        let index = self.current_layer.unwrap_or(len);
        self.map
            .plane()
            .layer(index)
            .map(MapLayer::id)
            .ok_or(MapError::LayerIndexOutOfRange { index, len })
    }

    fn handle(&self, id: LayerId) -> Result<Arc<MapLayer>> {
        self.map
            .plane()
            .layer_handle(id)
            .ok_or(MapError::LayerNotFound(id.0))
    }

    fn clamp_current(&mut self) {
        let len = self.map.plane().len();
        self.current_layer = match (self.current_layer, len) {
            (_, 0) => None,
            (Some(i), _) => Some(i.min(len - 1)),
            (None, _) => Some(len - 1),
        };
    }

    /// `Ok(false)` for a locked or hidden layer, an error for a layer that
    /// holds no tiles.
    fn editable_tiles(&self, id: LayerId, operation: &'static str) -> Result<bool> {
        let layer = self.handle(id)?;
        if layer.as_tiles().is_none() {
            return Err(MapError::NotApplicable {
                operation,
                kind: layer.kind_name(),
            });
        }
        Ok(layer.is_editable())
    }

    /// Runs `f` on a copy of the layer, swaps it in and records the
    /// difference. Nothing changes when `f` fails.
    fn content_edit<T>(
        &mut self,
        label: &str,
        id: LayerId,
        f: impl FnOnce(&mut MapLayer) -> Result<T>,
    ) -> Result<T> {
        self.recorded_edit(label, id, f).map(|(out, _)| out)
    }

    /// Like `content_edit`, also telling whether an edit was recorded.
    fn recorded_edit<T>(
        &mut self,
        label: &str,
        id: LayerId,
        f: impl FnOnce(&mut MapLayer) -> Result<T>,
    ) -> Result<(T, bool)> {
        let before = self.handle(id)?;
        self.history.begin(label, before)?;
        let out = match self.map.plane_mut().modify_layer(id, f) {
            Ok(out) => out,
            Err(e) => {
                self.history.cancel();
                return Err(e);
            }
        };
        let after = self.handle(id)?;
        let recorded = self.history.end(after)?;
        if recorded {
            self.emit(MapEvent::HistoryChanged);
        }
        Ok((out, recorded))
    }

    /// Runs a structural change and records the layer list on both sides.
    fn layer_list_edit<T>(
        &mut self,
        label: &str,
        f: impl FnOnce(&mut MultilayerPlane) -> Result<T>,
    ) -> Result<T> {
        if self.history.is_pending() {
            return Err(MapError::EditInProgress);
        }
        let before = self.map.plane().snapshot_layers();
        let out = f(self.map.plane_mut())?;
        let after = self.map.plane().snapshot_layers();
        let recorded = self.history.record_layer_list(label, before, after);
        self.clamp_current();
        self.emit(MapEvent::LayersChanged);
        if recorded {
            self.emit(MapEvent::HistoryChanged);
        }
        Ok(out)
    }

    // --- painting ---

    /// Opens a paint stroke on the current layer. Cells painted until
    /// [`end_stroke`](Self::end_stroke) form one edit.
    pub fn begin_stroke(&mut self, label: &str) -> Result<()> {
        let layer = self.handle(self.current_id()?)?;
        self.history.begin(label, layer)
    }

    /// Closes the stroke; returns whether anything was recorded.
    pub fn end_stroke(&mut self) -> Result<bool> {
        let id = self
            .history
            .pending_layer()
            .ok_or(MapError::NoEditInProgress)?;
        let after = self.handle(id)?;
        let recorded = self.history.end(after)?;
        if recorded {
            self.emit(MapEvent::HistoryChanged);
        }
        Ok(recorded)
    }

    /// Abandons the stroke and puts the layer back as it was.
    pub fn cancel_stroke(&mut self) -> Result<()> {
        if let Some(before) = self.history.cancel() {
            let id = before.id();
            self.map.plane_mut().replace_layer(before)?;
            self.emit(MapEvent::LayerContentChanged {
                layer: id,
                area: None,
            });
        }
        Ok(())
    }

    fn put(&mut self, label: &str, x: i32, y: i32, tile: Option<TileRef>) -> Result<bool> {
        let stroke = self.history.pending_layer();
        let id = match stroke {
            Some(id) => id,
            None => self.current_id()?,
        };
        if !self.editable_tiles(id, "paint")? {
            return Ok(false);
        }
        let changed = if stroke.is_none() {
            self.content_edit(label, id, |layer| {
                Ok(layer.tiles_for("paint")?.set_tile_at(x, y, tile))
            })?
        } else {
            self.map
                .plane_mut()
                .layer_mut(id)?
                .tiles_for("paint")?
                .set_tile_at(x, y, tile)
        };
        if changed {
            self.emit(MapEvent::LayerContentChanged {
                layer: id,
                area: Some(TileRect::new(x, y, 1, 1)),
            });
        }
        Ok(changed)
    }

    /// Paints the current tile at `(x, y)`. Outside a stroke this is a
    /// single-cell edit of its own.
    pub fn paint(&mut self, x: i32, y: i32) -> Result<bool> {
        let tile = self.current_tile;
        self.put("Paint", x, y, tile)
    }

    /// Clears the cell at `(x, y)`.
    pub fn erase(&mut self, x: i32, y: i32) -> Result<bool> {
        self.put("Erase", x, y, None)
    }

    /// Puts `tile` at `(x, y)` as one edit.
    pub fn set_tile(&mut self, x: i32, y: i32, tile: Option<TileRef>) -> Result<bool> {
        self.put("Paint", x, y, tile)
    }

    /// Eyedropper: makes the tile under `(x, y)` current.
    pub fn pick(&mut self, x: i32, y: i32) -> Option<TileRef> {
        let tile = self
            .current_layer()
            .and_then(MapLayer::as_tiles)
            .and_then(|l| l.tile_at(x, y))?;
        self.current_tile = Some(tile);
        Some(tile)
    }

    /// Pour fill with the current tile from `(x, y)`. A non-empty marquee
    /// switches to filling the selected cells.
    pub fn fill(&mut self, x: i32, y: i32) -> Result<bool> {
        let id = self.current_id()?;
        if !self.editable_tiles(id, "fill")? {
            return Ok(false);
        }
        let new = self.current_tile;
        let mask = (!self.marquee.is_empty()).then(|| self.marquee.selected_area().clone());
        let area = self.content_edit("Fill", id, |layer| {
            let tiles = layer.tiles_for("fill")?;
            let old = tiles.tile_at(x, y);
            Ok(tiles.pour(x, y, old, new, mask.as_ref()))
        })?;
        if let Some(area) = area {
            self.emit(MapEvent::LayerContentChanged {
                layer: id,
                area: Some(area),
            });
        }
        Ok(area.is_some())
    }

    // --- whole-layer edits ---

    /// Rotates or mirrors the current layer. With a marquee only the
    /// selected part is lifted, transformed in place and dropped back; the
    /// marquee follows it.
    pub fn transform_layer(&mut self, t: Transform) -> Result<bool> {
        let id = self.current_id()?;
        if !self.handle(id)?.is_editable() {
            return Ok(false);
        }
        let selected = self
            .marquee
            .selected_bounds()
            .map(|bounds| (bounds, self.marquee.selected_area().clone()));

        let recorded = match selected {
            None => {
                self.recorded_edit(t.label(), id, |layer| {
                    layer.transform(t);
                    Ok(())
                })?
                .1
            }
            Some((bounds, mask)) => {
                let ((), recorded) = self.recorded_edit(t.label(), id, |layer| {
                    let mut floating = layer.empty_like(bounds);
                    floating.masked_copy_from(layer, &mask)?;
                    layer.clear_masked(&mask);
                    floating.transform(t);
                    floating.merge_onto(layer)
                })?;
                if recorded {
                    let mut moved = MapLayer::from(self.marquee.clone()).crop(bounds);
                    moved.transform(t);
                    if let Some(sel) = moved.as_selection() {
                        let area = sel.selected_area().clone();
                        self.marquee.select(&area);
                        self.emit(MapEvent::SelectionChanged);
                    }
                }
                recorded
            }
        };
        if recorded {
            self.emit(MapEvent::LayerContentChanged {
                layer: id,
                area: None,
            });
        }
        Ok(recorded)
    }

    /// Shifts the current layer by whole cells.
    pub fn translate_layer(&mut self, dx: i32, dy: i32) -> Result<bool> {
        let id = self.current_id()?;
        if self.history.is_pending() {
            return Err(MapError::EditInProgress);
        }
        if !self.handle(id)?.is_editable() || (dx == 0 && dy == 0) {
            return Ok(false);
        }
        self.map.plane_mut().modify_layer(id, |layer| {
            layer.translate(dx, dy);
            Ok(())
        })?;
        self.history.record_move(id, dx, dy);
        self.emit(MapEvent::LayerContentChanged {
            layer: id,
            area: None,
        });
        self.emit(MapEvent::HistoryChanged);
        Ok(true)
    }

    // --- marquee ---

    /// The marquee selection.
    pub fn selection(&self) -> &SelectionLayer {
        &self.marquee
    }

    fn selection_changed(&mut self) {
        self.emit(MapEvent::SelectionChanged);
    }

    /// Replaces the marquee with `rect`.
    pub fn select(&mut self, rect: TileRect) {
        self.marquee.select_rect(rect);
        self.selection_changed();
    }

    /// Adds `rect` to the marquee.
    pub fn add_to_selection(&mut self, rect: TileRect) {
        self.marquee.add(&Region::from_rect(rect));
        self.selection_changed();
    }

    /// Removes `rect` from the marquee.
    pub fn subtract_from_selection(&mut self, rect: TileRect) {
        self.marquee.subtract(&Region::from_rect(rect));
        self.selection_changed();
    }

    /// Selects the whole map.
    pub fn select_all(&mut self) {
        let all = self.map.plane().bounds();
        self.marquee.select_rect(all);
        self.selection_changed();
    }

    /// Selects exactly the unselected cells.
    pub fn invert_selection(&mut self) {
        self.marquee.invert();
        self.selection_changed();
    }

    /// Drops the marquee.
    pub fn clear_selection(&mut self) {
        self.marquee.clear();
        self.selection_changed();
    }

    // --- clipboard ---

    /// Layer held by the clipboard.
    pub fn clipboard(&self) -> Option<&MapLayer> {
        self.clipboard.as_ref()
    }

    /// Copies the selected part of the current layer; `false` without a
    /// selection.
    pub fn copy(&mut self) -> Result<bool> {
        let Some(bounds) = self.marquee.selected_bounds() else {
            return Ok(false);
        };
        let layer = self.handle(self.current_id()?)?;
        let mut clip = layer.empty_like(bounds);
        clip.masked_copy_from(&layer, self.marquee.selected_area())?;
        self.clipboard = Some(clip);
        Ok(true)
    }

    /// Copies the selection, then clears it on the current layer.
    pub fn cut(&mut self) -> Result<bool> {
        if !self.copy()? {
            return Ok(false);
        }
        let id = self.current_id()?;
        if !self.handle(id)?.is_editable() {
            return Ok(true);
        }
        let mask = self.marquee.selected_area().clone();
        self.content_edit("Cut", id, |layer| {
            layer.clear_masked(&mask);
            Ok(())
        })?;
        self.emit(MapEvent::LayerContentChanged {
            layer: id,
            area: mask.bounds(),
        });
        Ok(true)
    }

    /// Pastes the clipboard as a new layer above the current one and
    /// makes it current.
    pub fn paste(&mut self) -> Result<Option<usize>> {
        let Some(clip) = &self.clipboard else {
            return Ok(None);
        };
        let mut layer = clip.duplicate();
        layer.set_name(format!("Layer {}", self.map.plane().len() + 1));
        layer.set_visible(true);
        layer.set_locked(false);
        let at = self.current_layer.map_or(self.map.plane().len(), |i| i + 1);
        self.layer_list_edit("Paste Selection", |plane| plane.insert_layer(at, layer))?;
        self.current_layer = Some(at);
        Ok(Some(at))
    }

    // --- layer list ---

    /// Adds an empty tile layer on top covering the map.
    pub fn add_tile_layer(&mut self, name: &str) -> Result<usize> {
        let layer = self.map.new_tile_layer(name);
        let index = self.layer_list_edit("Add Layer", |plane| Ok(plane.add_layer(layer)))?;
        self.current_layer = Some(index);
        Ok(index)
    }

    /// Adds an empty object group on top.
    pub fn add_object_group(&mut self, name: &str) -> Result<usize> {
        let layer = self.map.new_object_group(name);
        let index = self.layer_list_edit("Add Object Layer", |plane| Ok(plane.add_layer(layer)))?;
        self.current_layer = Some(index);
        Ok(index)
    }

    /// Removes the layer at `index`.
    pub fn remove_layer(&mut self, index: usize) -> Result<()> {
        self.layer_list_edit("Remove Layer", |plane| plane.remove_layer(index).map(drop))
    }

    /// Copies the layer at `index` right above it and makes the copy
    /// current.
    pub fn duplicate_layer(&mut self, index: usize) -> Result<usize> {
        let at = self.layer_list_edit("Duplicate Layer", |plane| plane.duplicate_layer(index))?;
        self.current_layer = Some(at);
        Ok(at)
    }

    /// Moves the layer one step up the stack.
    pub fn raise_layer(&mut self, index: usize) -> Result<usize> {
        let at = self.layer_list_edit("Raise Layer", |plane| plane.raise_layer(index))?;
        self.current_layer = Some(at);
        Ok(at)
    }

    /// Moves the layer one step down the stack.
    pub fn lower_layer(&mut self, index: usize) -> Result<usize> {
        let at = self.layer_list_edit("Lower Layer", |plane| plane.lower_layer(index))?;
        self.current_layer = Some(at);
        Ok(at)
    }

    /// Moves a layer to another stack position.
    pub fn move_layer(&mut self, from: usize, to: usize) -> Result<()> {
        self.layer_list_edit("Move Layer", |plane| plane.move_layer(from, to))?;
        self.current_layer = Some(to);
        Ok(())
    }

    /// Merges the layer at `index` onto the one below.
    pub fn merge_layer_down(&mut self, index: usize) -> Result<()> {
        self.layer_list_edit("Merge Layer Down", |plane| plane.merge_down(index))?;
        self.current_layer = Some(index - 1);
        Ok(())
    }

    fn layer_attribute(
        &mut self,
        label: &str,
        index: usize,
        f: impl FnOnce(&mut MapLayer),
    ) -> Result<()> {
        let len = self.map.plane().len();
        let id = self
            .map
            .plane()
            .layer(index)
            .map(MapLayer::id)
            .ok_or(MapError::LayerIndexOutOfRange { index, len })?;
        self.content_edit(label, id, |layer| {
            f(layer);
            Ok(())
        })?;
        self.emit(MapEvent::LayersChanged);
        Ok(())
    }

    /// Renames a layer.
    pub fn set_layer_name(&mut self, index: usize, name: &str) -> Result<()> {
        self.layer_attribute("Rename Layer", index, |l| l.set_name(name))
    }

    /// Shows or hides a layer.
    pub fn set_layer_visible(&mut self, index: usize, visible: bool) -> Result<()> {
        self.layer_attribute("Layer Visibility", index, |l| l.set_visible(visible))
    }

    /// Locks or unlocks a layer.
    pub fn set_layer_locked(&mut self, index: usize, locked: bool) -> Result<()> {
        self.layer_attribute("Lock Layer", index, |l| l.set_locked(locked))
    }

    /// Sets a layer's opacity, clamped to `[0, 1]`.
    pub fn set_layer_opacity(&mut self, index: usize, opacity: f32) -> Result<()> {
        self.layer_attribute("Layer Opacity", index, |l| l.set_opacity(opacity))
    }

    // --- history ---

    /// Reverts the last edit; `false` when there is nothing to undo.
    pub fn undo(&mut self) -> Result<bool> {
        if self.history.is_pending() {
            return Err(MapError::EditInProgress);
        }
        let undone = self.history.undo(self.map.plane_mut())?;
        if undone {
            self.clamp_current();
            self.emit(MapEvent::LayersChanged);
            self.emit(MapEvent::HistoryChanged);
        }
        Ok(undone)
    }

    /// Re-applies the last undone edit.
    pub fn redo(&mut self) -> Result<bool> {
        if self.history.is_pending() {
            return Err(MapError::EditInProgress);
        }
        let redone = self.history.redo(self.map.plane_mut())?;
        if redone {
            self.clamp_current();
            self.emit(MapEvent::LayersChanged);
            self.emit(MapEvent::HistoryChanged);
        }
        Ok(redone)
    }

    /// Whether the document differs from what was last saved.
    pub fn has_unsaved_changes(&self) -> bool {
        self.untracked_changes || self.history.has_unsaved_changes()
    }

    /// Window title: file name or `Untitled`, with a trailing `*` while
    /// there are unsaved changes.
    pub fn title(&self) -> String {
        let name = self
            .path
            .as_deref()
            .and_then(Path::file_name)
            .map(|n| n.to_string_lossy().into_owned())
            .unwrap_or_else(|| "Untitled".to_owned());
        if self.has_unsaved_changes() {
            format!("{name}*")
        } else {
            name
        }
    }

    // --- tilesets ---

    fn tilesets_changed(&mut self) {
        self.untracked_changes = true;
        self.emit(MapEvent::TilesetsChanged);
    }

    /// Attaches a tileset to the map.
    pub fn add_tileset(&mut self, tileset: Tileset) -> TilesetId {
        let id = self.map.add_tileset(tileset);
        self.tilesets_changed();
        id
    }

    /// Reads a standalone tileset file and attaches it.
    pub fn load_tileset(&mut self, path: impl AsRef<Path>) -> anyhow::Result<TilesetId> {
        let path = path.as_ref();
        let set = self
            .formats
            .reader_for(path)
            .and_then(|r| r.read_tileset(path))
            .with_context(|| format!("Loading tileset {}", path.display()))?;
        Ok(self.add_tileset(set))
    }

    /// Number of distinct tiles of the set in use.
    pub fn tileset_usage(&self, id: TilesetId) -> usize {
        self.map.tileset_usage(id)
    }

    /// Detaches a tileset and clears every cell using it.
    ///
    /// Edits recorded so far may refer to its tiles, so the history is
    /// dropped and the document counts as modified until saved.
    pub fn remove_tileset(&mut self, id: TilesetId) -> Result<Tileset> {
        if self.history.is_pending() {
            return Err(MapError::EditInProgress);
        }
        let removed = self.map.remove_tileset(id)?;
        if self.current_tile.is_some_and(|t| t.tileset == id) {
            self.current_tile = None;
        }
        self.clipboard = None;
        self.history.clear();
        self.tilesets_changed();
        self.emit(MapEvent::LayersChanged);
        self.emit(MapEvent::HistoryChanged);
        Ok(removed)
    }

    /// Stores an external tileset inline in the map from now on.
    pub fn embed_tileset(&mut self, id: TilesetId) -> Result<()> {
        self.map
            .tileset_mut(id)
            .ok_or(MapError::TilesetNotFound(id.0))?
            .embed();
        self.tilesets_changed();
        Ok(())
    }

    /// Writes the tileset to its own file and references it from the map.
    pub fn save_tileset(&mut self, id: TilesetId, path: impl AsRef<Path>) -> anyhow::Result<()> {
        let path = path.as_ref();
        let set = self
            .map
            .tileset(id)
            .ok_or(MapError::TilesetNotFound(id.0))?;
        self.formats
            .writer_for(path)
            .and_then(|w| w.write_tileset(set, path, &self.options))
            .with_context(|| format!("Saving tileset {}", path.display()))?;
        if let Some(set) = self.map.tileset_mut(id) {
            set.source = Some(path.to_path_buf());
        }
        self.tilesets_changed();
        Ok(())
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use crate::layer::{Mirror, Rotation};
    use std::cell::RefCell;
    use std::rc::Rc;

    struct Recorder(Rc<RefCell<Vec<MapEvent>>>);

    impl MapListener for Recorder {
        fn map_changed(&mut self, event: &MapEvent) {
            self.0.borrow_mut().push(event.clone());
        }
    }

    fn tile(id: u32) -> Option<TileRef> {
        Some(TileRef {
            tileset: TilesetId(7),
            id,
        })
    }

    fn editor() -> Editor {
        let mut map = Map::new(5, 5, 16, 16);
        let layer = map.new_tile_layer("Ground");
        map.plane_mut().add_layer(layer);
        Editor::new(map)
    }

    fn cell(editor: &Editor, x: i32, y: i32) -> Option<TileRef> {
        editor.current_layer().unwrap().as_tiles().unwrap().tile_at(x, y)
    }

    #[test]
    fn stroke_is_one_undo_step() {
        let mut ed = editor();
        ed.set_current_tile(tile(1));
        ed.begin_stroke("Paint").unwrap();
        for x in 0..3 {
            assert!(ed.paint(x, 0).unwrap());
        }
        assert!(ed.end_stroke().unwrap());
        assert_eq!(ed.history().len(), 1);

        assert!(ed.undo().unwrap());
        assert_eq!(cell(&ed, 1, 0), None);
        assert!(ed.redo().unwrap());
        assert_eq!(cell(&ed, 2, 0), tile(1));
    }

    #[test]
    fn paint_outside_stroke_records_single_edit() {
        let mut ed = editor();
        ed.set_current_tile(tile(2));
        ed.paint(4, 4).unwrap();
        ed.erase(4, 4).unwrap();
        assert_eq!(ed.history().len(), 2);
        assert_eq!(ed.history().undo_label(), Some("Erase"));
        // repainting the same value changes nothing
        assert!(!ed.set_tile(0, 0, None).unwrap());
        assert_eq!(ed.history().len(), 2);
    }

    #[test]
    fn cancelled_stroke_restores_layer() {
        let mut ed = editor();
        ed.set_current_tile(tile(1));
        ed.begin_stroke("Paint").unwrap();
        ed.paint(1, 1).unwrap();
        ed.cancel_stroke().unwrap();
        assert_eq!(cell(&ed, 1, 1), None);
        assert!(ed.history().is_empty());
    }

    #[test]
    fn locked_or_hidden_layer_is_not_painted() {
        let mut ed = editor();
        ed.set_current_tile(tile(1));
        ed.set_layer_locked(0, true).unwrap();
        assert!(!ed.paint(0, 0).unwrap());
        ed.set_layer_locked(0, false).unwrap();
        ed.set_layer_visible(0, false).unwrap();
        assert!(!ed.fill(0, 0).unwrap());
        assert_eq!(cell(&ed, 0, 0), None);
    }

    #[test]
    fn fill_respects_marquee() {
        let mut ed = editor();
        ed.set_current_tile(tile(3));
        ed.select(TileRect::new(1, 1, 2, 2));
        assert!(ed.fill(1, 1).unwrap());
        assert_eq!(cell(&ed, 2, 2), tile(3));
        assert_eq!(cell(&ed, 0, 0), None);

        ed.clear_selection();
        ed.set_current_tile(tile(4));
        assert!(ed.fill(0, 0).unwrap());
        assert_eq!(cell(&ed, 4, 4), tile(4));
        assert_eq!(cell(&ed, 1, 1), tile(3));
        assert_eq!(ed.history().len(), 2);
    }

    #[test]
    fn fill_with_same_tile_records_nothing() {
        let mut map = Map::new(1, 1, 16, 16);
        let layer = map.new_tile_layer("Only");
        map.plane_mut().add_layer(layer);
        let mut ed = Editor::new(map);

        assert!(!ed.fill(0, 0).unwrap());
        assert!(ed.history().is_empty());
        assert!(!ed.has_unsaved_changes());

        ed.set_tile(0, 0, tile(1)).unwrap();
        ed.set_current_tile(tile(1));
        assert!(!ed.fill(0, 0).unwrap());
        assert_eq!(ed.history().len(), 1);
    }

    #[test]
    fn transform_of_empty_selection_changes_nothing() {
        let mut ed = editor();
        ed.set_tile(4, 4, tile(5)).unwrap();
        ed.select(TileRect::new(0, 0, 2, 1));
        let events = Rc::new(RefCell::new(Vec::new()));
        ed.add_listener(Box::new(Recorder(Rc::clone(&events))));

        assert!(!ed.transform_layer(Transform::Rotate(Rotation::Cw90)).unwrap());
        assert_eq!(ed.history().len(), 1);
        assert!(ed.selection().is_selected(1, 0));
        assert!(!ed.selection().is_selected(0, 1));
        assert!(events.borrow().is_empty());
    }

    #[test]
    fn pick_sets_current_tile() {
        let mut ed = editor();
        ed.set_tile(2, 3, tile(9)).unwrap();
        assert_eq!(ed.pick(2, 3), tile(9));
        assert_eq!(ed.current_tile(), tile(9));
        assert_eq!(ed.pick(0, 0), None);
        assert_eq!(ed.current_tile(), tile(9));
    }

    #[test]
    fn transform_of_selection_only_moves_selected_cells() {
        let mut ed = editor();
        ed.set_tile(0, 0, tile(1)).unwrap();
        ed.set_tile(1, 0, tile(2)).unwrap();
        ed.set_tile(4, 4, tile(5)).unwrap();
        ed.select(TileRect::new(0, 0, 2, 1));
        assert!(ed.transform_layer(Transform::Mirror(Mirror::Horizontal)).unwrap());
        assert_eq!(cell(&ed, 0, 0), tile(2));
        assert_eq!(cell(&ed, 1, 0), tile(1));
        assert_eq!(cell(&ed, 4, 4), tile(5));

        ed.select(TileRect::new(0, 0, 2, 1));
        ed.transform_layer(Transform::Rotate(Rotation::Cw90)).unwrap();
        assert_eq!(cell(&ed, 0, 0), tile(2));
        assert_eq!(cell(&ed, 0, 1), tile(1));
        assert_eq!(cell(&ed, 1, 0), None);
        assert!(ed.selection().is_selected(0, 1));
        assert!(!ed.selection().is_selected(1, 0));

        assert!(ed.undo().unwrap());
        assert_eq!(cell(&ed, 1, 0), tile(1));
    }

    #[test]
    fn whole_layer_rotation_and_move_are_undoable() {
        let mut ed = editor();
        ed.set_tile(0, 0, tile(1)).unwrap();
        ed.transform_layer(Transform::Rotate(Rotation::Cw180)).unwrap();
        assert_eq!(cell(&ed, 4, 4), tile(1));
        assert!(ed.translate_layer(1, 2).unwrap());
        assert!(!ed.translate_layer(0, 0).unwrap());
        assert_eq!(ed.current_layer().unwrap().bounds(), TileRect::new(1, 2, 5, 5));
        ed.undo().unwrap();
        assert_eq!(ed.current_layer().unwrap().bounds(), TileRect::new(0, 0, 5, 5));
        ed.undo().unwrap();
        assert_eq!(cell(&ed, 0, 0), tile(1));
    }

    #[test]
    fn cut_and_paste_make_new_layer() {
        let mut ed = editor();
        ed.set_tile(1, 1, tile(1)).unwrap();
        ed.set_tile(2, 1, tile(2)).unwrap();
        assert!(!ed.copy().unwrap());

        ed.select(TileRect::new(1, 1, 1, 1));
        assert!(ed.cut().unwrap());
        assert_eq!(cell(&ed, 1, 1), None);
        assert_eq!(cell(&ed, 2, 1), tile(2));

        let at = ed.paste().unwrap().unwrap();
        assert_eq!(at, 1);
        let pasted = ed.current_layer().unwrap();
        assert_eq!(pasted.name(), "Layer 2");
        assert_eq!(pasted.bounds(), TileRect::new(1, 1, 1, 1));
        assert_eq!(pasted.as_tiles().unwrap().tile_at(1, 1), tile(1));
        assert_eq!(ed.history().undo_label(), Some("Paste Selection"));

        ed.undo().unwrap();
        assert_eq!(ed.map().plane().len(), 1);
        assert_eq!(ed.current_layer_index(), Some(0));
    }

    #[test]
    fn layer_list_edits_round_trip() {
        let mut ed = editor();
        ed.add_tile_layer("Top").unwrap();
        ed.add_object_group("Things").unwrap();
        assert_eq!(ed.current_layer_index(), Some(2));
        ed.lower_layer(2).unwrap();
        assert_eq!(ed.map().plane().layer(1).unwrap().name(), "Things");
        assert!(matches!(
            ed.merge_layer_down(1),
            Err(MapError::KindMismatch { .. })
        ));
        ed.remove_layer(1).unwrap();
        assert_eq!(ed.map().plane().len(), 2);

        while ed.undo().unwrap() {}
        assert_eq!(ed.map().plane().len(), 1);
        assert_eq!(ed.current_layer_index(), Some(0));
    }

    #[test]
    fn title_and_unsaved_state() {
        let mut ed = editor();
        assert_eq!(ed.title(), "Untitled");
        ed.set_tile(0, 0, tile(1)).unwrap();
        assert_eq!(ed.title(), "Untitled*");
        ed.undo().unwrap();
        assert!(!ed.has_unsaved_changes());
    }

    #[test]
    fn removing_tileset_clears_history_and_marks_dirty() {
        let mut ed = editor();
        let set = Tileset::new("t", 16, 16);
        let id = ed.add_tileset(set);
        ed.set_tile(0, 0, Some(TileRef { tileset: id, id: 0 })).unwrap();
        assert_eq!(ed.tileset_usage(id), 1);
        ed.remove_tileset(id).unwrap();
        assert_eq!(cell(&ed, 0, 0), None);
        assert!(ed.history().is_empty());
        assert!(ed.has_unsaved_changes());
        assert!(matches!(ed.remove_tileset(id), Err(MapError::TilesetNotFound(_))));
    }

    #[test]
    fn listeners_hear_changes_in_order() {
        let events = Rc::new(RefCell::new(Vec::new()));
        let mut ed = editor();
        ed.add_listener(Box::new(Recorder(Rc::clone(&events))));
        ed.set_current_tile(tile(1));
        ed.paint(0, 0).unwrap();
        ed.select_all();
        ed.add_tile_layer("x").unwrap();

        let layer = ed.map().plane().layer(0).unwrap().id();
        assert_eq!(
            *events.borrow(),
            vec![
                MapEvent::HistoryChanged,
                MapEvent::LayerContentChanged {
                    layer,
                    area: Some(TileRect::new(0, 0, 1, 1)),
                },
                MapEvent::SelectionChanged,
                MapEvent::LayersChanged,
                MapEvent::HistoryChanged,
            ]
        );
    }

    #[test]
    fn painting_object_group_is_rejected() {
        let mut ed = editor();
        ed.add_object_group("o").unwrap();
        assert!(matches!(ed.paint(0, 0), Err(MapError::NotApplicable { .. })));
        assert!(!ed.history().is_pending());
    }
}
