//! Linear undo/redo log.
//!
//! Content edits keep only the rectangle that changed when the layer kept
//! its bounds and attributes; any other change stores whole layer versions.
//! Structural edits store the complete ordered layer list on both sides.

use std::sync::Arc;

use crate::error::{MapError, Result};
use crate::geom::TileRect;
use crate::layer::{LayerId, MapLayer};
use crate::plane::MultilayerPlane;

/// Recorded change.
#[derive(Debug, Clone)]
pub enum Change {
    /// Content of one layer. With `area` set, `before`/`after` are crops
    /// of that rectangle; otherwise they are whole layer versions.
    LayerContent {
        /// Edited layer.
        layer: LayerId,
        /// Changed rectangle for partial snapshots.
        area: Option<TileRect>,
        /// State to restore on undo.
        before: Arc<MapLayer>,
        /// State to restore on redo.
        after: Arc<MapLayer>,
    },
    /// The ordered layer list.
    LayerList {
        /// Stack before the operation.
        before: Vec<Arc<MapLayer>>,
        /// Stack after the operation.
        after: Vec<Arc<MapLayer>>,
    },
    /// Layer offset shift.
    MoveLayer {
        /// Moved layer.
        layer: LayerId,
        /// Horizontal shift in cells.
        dx: i32,
        /// Vertical shift in cells.
        dy: i32,
    },
}

/// History entry.
#[derive(Debug, Clone)]
pub struct Edit {
    /// Label for history UI.
    pub label: String,
    /// What changed.
    pub change: Change,
}

impl Edit {
    fn apply(&self, plane: &mut MultilayerPlane, forward: bool) -> Result<()> {
        match &self.change {
            Change::LayerContent {
                layer,
                area,
                before,
                after,
            } => {
                let state = if forward { after } else { before };
                match area {
                    Some(_) => plane.modify_layer(*layer, |l| l.copy_from(state)),
                    None => plane.replace_layer(Arc::clone(state)).map(|_| ()),
                }
            }
            Change::LayerList { before, after } => {
                plane.restore_layers(if forward { after } else { before }.clone());
                Ok(())
            }
            Change::MoveLayer { layer, dx, dy } => {
                let (dx, dy) = if forward { (*dx, *dy) } else { (-dx, -dy) };
                plane.modify_layer(*layer, |l| {
                    l.translate(dx, dy);
                    Ok(())
                })
            }
        }
    }
}

/// Lifecycle of a history slot.
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub enum EditState {
    /// Pushed and applied.
    Committed,
    /// Reverted by undo.
    Undone,
    /// Re-applied by redo.
    Redone,
}

#[derive(Debug, Clone)]
struct Slot {
    edit: Edit,
    state: EditState,
}

#[derive(Debug, Clone)]
struct Pending {
    label: String,
    before: Arc<MapLayer>,
}

/// Undo stack with a cursor and a saved-state marker.
#[derive(Debug, Clone)]
pub struct UndoStack {
    slots: Vec<Slot>,
    /// Number of applied edits.
    cursor: usize,
    saved: Option<usize>,
    pending: Option<Pending>,
}

impl Default for UndoStack {
    fn default() -> Self {
        Self::new()
    }
}

impl UndoStack {
    /// Empty history, considered saved.
    pub fn new() -> Self {
        Self {
            slots: Vec::new(),
            cursor: 0,
            saved: Some(0),
            pending: None,
        }
    }

    /// Starts a content edit by keeping the current version of `layer`.
    pub fn begin(&mut self, label: impl Into<String>, layer: Arc<MapLayer>) -> Result<()> {
        if self.pending.is_some() {
            return Err(MapError::EditInProgress);
        }
        self.pending = Some(Pending {
            label: label.into(),
            before: layer,
        });
        Ok(())
    }

    /// True between `begin` and `end`.
    pub fn is_pending(&self) -> bool {
        self.pending.is_some()
    }

    /// Identity of the layer being edited.
    pub fn pending_layer(&self) -> Option<LayerId> {
        self.pending.as_ref().map(|p| p.before.id())
    }

    /// Drops the pending edit without recording it and hands back the
    /// version kept by `begin`.
    pub fn cancel(&mut self) -> Option<Arc<MapLayer>> {
        self.pending.take().map(|p| p.before)
    }

    /// Pairs the pending snapshot with the layer's new version and commits
    /// the difference. Returns whether an edit was recorded.
    pub fn end(&mut self, after: Arc<MapLayer>) -> Result<bool> {
        let Pending { label, before } = self.pending.take().ok_or(MapError::NoEditInProgress)?;
        if before.id() != after.id() {
            return Err(MapError::LayerNotFound(after.id().0));
        }
        let partial = before.bounds() == after.bounds()
            && before.same_attributes(&after)
            && after.as_objects().is_none();

        let change = if partial {
            let Some(diff) = before.create_diff(&after)? else {
                log::debug!("'{label}' changed nothing");
                return Ok(false);
            };
            let area = diff.bounds();
            Change::LayerContent {
                layer: after.id(),
                area: Some(area),
                before: Arc::new(before.crop(area)),
                after: Arc::new(after.crop(area)),
            }
        } else {
            if before == after {
                log::debug!("'{label}' changed nothing");
                return Ok(false);
            }
            Change::LayerContent {
                layer: after.id(),
                area: None,
                before,
                after,
            }
        };
        self.push(Edit { label, change });
        Ok(true)
    }

    /// Records a structural edit; identical lists record nothing.
    pub fn record_layer_list(
        &mut self,
        label: impl Into<String>,
        before: Vec<Arc<MapLayer>>,
        after: Vec<Arc<MapLayer>>,
    ) -> bool {
        let same = before.len() == after.len()
            && before.iter().zip(&after).all(|(a, b)| Arc::ptr_eq(a, b));
        if same {
            return false;
        }
        self.push(Edit {
            label: label.into(),
            change: Change::LayerList { before, after },
        });
        true
    }

    /// Records a layer move; a zero shift records nothing.
    pub fn record_move(&mut self, layer: LayerId, dx: i32, dy: i32) -> bool {
        if dx == 0 && dy == 0 {
            return false;
        }
        self.push(Edit {
            label: "Move Layer".to_owned(),
            change: Change::MoveLayer { layer, dx, dy },
        });
        true
    }

    /// Appends an edit, discarding the redo tail.
    pub fn push(&mut self, edit: Edit) {
        self.slots.truncate(self.cursor);
        if self.saved.is_some_and(|s| s > self.cursor) {
            self.saved = None;
        }
        log::debug!("commit '{}'", edit.label);
        self.slots.push(Slot {
            edit,
            state: EditState::Committed,
        });
        self.cursor = self.slots.len();
    }

    /// Reverts the edit below the cursor; `false` at the bottom.
    pub fn undo(&mut self, plane: &mut MultilayerPlane) -> Result<bool> {
        if self.cursor == 0 {
            return Ok(false);
        }
        let slot = &mut self.slots[self.cursor - 1];
        slot.edit.apply(plane, false)?;
        slot.state = EditState::Undone;
        log::debug!("undo '{}'", slot.edit.label);
        self.cursor -= 1;
        Ok(true)
    }

    /// Re-applies the edit above the cursor; `false` at the top.
    pub fn redo(&mut self, plane: &mut MultilayerPlane) -> Result<bool> {
        let Some(slot) = self.slots.get_mut(self.cursor) else {
            return Ok(false);
        };
        slot.edit.apply(plane, true)?;
        slot.state = EditState::Redone;
        log::debug!("redo '{}'", slot.edit.label);
        self.cursor += 1;
        Ok(true)
    }

    /// Whether an edit can be undone.
    pub fn can_undo(&self) -> bool {
        self.cursor > 0
    }

    /// Whether an edit can be redone.
    pub fn can_redo(&self) -> bool {
        self.cursor < self.slots.len()
    }

    /// Label of the edit `undo` would revert.
    pub fn undo_label(&self) -> Option<&str> {
        self.cursor
            .checked_sub(1)
            .map(|i| self.slots[i].edit.label.as_str())
    }

    /// Label of the edit `redo` would re-apply.
    pub fn redo_label(&self) -> Option<&str> {
        self.slots.get(self.cursor).map(|s| s.edit.label.as_str())
    }

    /// Entries oldest first with their state.
    pub fn entries(&self) -> impl Iterator<Item = (&Edit, EditState)> {
        self.slots.iter().map(|s| (&s.edit, s.state))
    }

    /// Number of applied edits.
    pub fn cursor(&self) -> usize {
        self.cursor
    }

    /// Number of recorded edits.
    pub fn len(&self) -> usize {
        self.slots.len()
    }

    /// True when nothing has been recorded.
    pub fn is_empty(&self) -> bool {
        self.slots.is_empty()
    }

    /// Tags the current position as saved.
    pub fn mark_all_saved(&mut self) {
        self.saved = Some(self.cursor);
    }

    /// Whether the current position is the saved one.
    pub fn is_all_saved(&self) -> bool {
        self.saved == Some(self.cursor)
    }

    /// Edits exist and the cursor is away from the saved position.
    pub fn has_unsaved_changes(&self) -> bool {
        !self.slots.is_empty() && !self.is_all_saved()
    }

    /// Forgets every edit.
    pub fn clear(&mut self) {
        *self = Self::new();
    }
}
