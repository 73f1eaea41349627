// tests/history_tests.rs

use std::sync::Arc;

use pretty_assertions::assert_eq;
use tiled_editor_core::{
    EditState, LayerId, MapLayer, Mirror, MultilayerPlane, Rotation, TileLayer, TileRect,
    TileRef, TilesetId, Transform, UndoStack,
};

/// Small deterministic generator so failures reproduce.
struct Lcg(u64);

impl Lcg {
    fn next(&mut self, bound: u32) -> u32 {
        self.0 = self
            .0
            .wrapping_mul(6364136223846793005)
            .wrapping_add(1442695040888963407);
        ((self.0 >> 33) % bound as u64) as u32
    }
}

fn tile(id: u32) -> Option<TileRef> {
    Some(TileRef {
        tileset: TilesetId(1),
        id,
    })
}

fn plane_with_layer(w: i32, h: i32) -> (MultilayerPlane, LayerId) {
    let mut plane = MultilayerPlane::new(w, h);
    let layer = MapLayer::from(TileLayer::new("base", plane.bounds()));
    let id = layer.id();
    plane.add_layer(layer);
    (plane, id)
}

/// Runs one random content edit through begin/end.
fn random_edit(rng: &mut Lcg, plane: &mut MultilayerPlane, id: LayerId, stack: &mut UndoStack) {
    let before = plane.layer_handle(id).unwrap();
    stack.begin("random", before).unwrap();
    plane
        .modify_layer(id, |layer| {
            match rng.next(4) {
                0 => {
                    let tiles = layer.tiles_for("paint")?;
                    for _ in 0..rng.next(6) + 1 {
                        let (x, y) = (rng.next(8) as i32, rng.next(8) as i32);
                        tiles.set_tile_at(x, y, tile(rng.next(3)));
                    }
                }
                1 => {
                    let tiles = layer.tiles_for("fill")?;
                    let (x, y) = (rng.next(8) as i32, rng.next(8) as i32);
                    let old = tiles.tile_at(x, y);
                    tiles.pour(x, y, old, tile(rng.next(3)), None);
                }
                2 => layer.transform(Transform::Rotate(Rotation::Cw180)),
                _ => layer.transform(Transform::Mirror(Mirror::Vertical)),
            }
            Ok(())
        })
        .unwrap();
    stack.end(plane.layer_handle(id).unwrap()).unwrap();
}

fn paint(plane: &mut MultilayerPlane, id: LayerId, stack: &mut UndoStack, x: i32, t: Option<TileRef>) {
    stack.begin("Paint", plane.layer_handle(id).unwrap()).unwrap();
    plane
        .modify_layer(id, |l| {
            l.tiles_for("paint")?.set_tile_at(x, 0, t);
            Ok(())
        })
        .unwrap();
    stack.end(plane.layer_handle(id).unwrap()).unwrap();
}

#[test]
fn undo_all_then_redo_all_restores_both_ends() {
    for seed in [1u64, 7, 42, 1234] {
        let mut rng = Lcg(seed);
        let (mut plane, id) = plane_with_layer(8, 8);
        let mut stack = UndoStack::new();
        let initial = plane.clone();

        for _ in 0..25 {
            random_edit(&mut rng, &mut plane, id, &mut stack);
        }
        let last = plane.clone();

        while stack.undo(&mut plane).unwrap() {}
        assert_eq!(plane, initial, "seed {seed}");
        while stack.redo(&mut plane).unwrap() {}
        assert_eq!(plane, last, "seed {seed}");
    }
}

#[test]
fn partial_edits_store_only_the_changed_rectangle() {
    let (mut plane, id) = plane_with_layer(20, 20);
    let mut stack = UndoStack::new();
    stack.begin("Paint", plane.layer_handle(id).unwrap()).unwrap();
    plane
        .modify_layer(id, |l| {
            let t = l.tiles_for("paint")?;
            t.set_tile_at(3, 4, tile(1));
            t.set_tile_at(5, 6, tile(2));
            Ok(())
        })
        .unwrap();
    assert!(stack.end(plane.layer_handle(id).unwrap()).unwrap());

    let (edit, state) = stack.entries().next().unwrap();
    assert_eq!(state, EditState::Committed);
    match &edit.change {
        tiled_editor_core::Change::LayerContent { area, before, after, .. } => {
            assert_eq!(*area, Some(TileRect::new(3, 4, 3, 3)));
            assert_eq!(before.bounds(), TileRect::new(3, 4, 3, 3));
            assert_eq!(after.as_tiles().unwrap().tile_at(5, 6), tile(2));
        }
        other => panic!("unexpected change {other:?}"),
    }
}

#[test]
fn layer_list_edits_restore_order_and_identity() {
    let (mut plane, base) = plane_with_layer(4, 4);
    let mut stack = UndoStack::new();

    let before = plane.snapshot_layers();
    plane.add_layer(TileLayer::new("top", plane.bounds()));
    plane.duplicate_layer(0).unwrap();
    let after = plane.snapshot_layers();
    assert!(stack.record_layer_list("Add Layers", before, after));
    assert_eq!(plane.len(), 3);

    assert!(stack.undo(&mut plane).unwrap());
    assert_eq!(plane.len(), 1);
    assert_eq!(plane.index_of(base), Some(0));

    assert!(stack.redo(&mut plane).unwrap());
    let names: Vec<&str> = plane.layers().map(MapLayer::name).collect();
    assert_eq!(names, vec!["base", "base copy", "top"]);

    // same handles on both sides: nothing to record
    let same = plane.snapshot_layers();
    assert!(!stack.record_layer_list("Nothing", same.clone(), same));
}

#[test]
fn saved_marker_tracks_cursor() {
    let (mut plane, id) = plane_with_layer(4, 4);
    let mut stack = UndoStack::new();
    assert!(!stack.has_unsaved_changes());

    paint(&mut plane, id, &mut stack, 0, tile(1));
    paint(&mut plane, id, &mut stack, 1, tile(2));
    assert_eq!(stack.len(), 2);
    stack.mark_all_saved();
    assert!(!stack.has_unsaved_changes());

    stack.undo(&mut plane).unwrap();
    assert!(stack.has_unsaved_changes());
    stack.redo(&mut plane).unwrap();
    assert!(stack.is_all_saved());

    // a new edit after undo drops the saved state for good
    stack.undo(&mut plane).unwrap();
    stack.record_move(id, 1, 0);
    plane
        .modify_layer(id, |l| {
            l.translate(1, 0);
            Ok(())
        })
        .unwrap();
    while stack.undo(&mut plane).unwrap() {}
    while stack.redo(&mut plane).unwrap() {}
    assert!(stack.has_unsaved_changes());
}

#[test]
fn old_handles_are_untouched_by_undo() {
    let (mut plane, id) = plane_with_layer(4, 4);
    let mut stack = UndoStack::new();
    paint(&mut plane, id, &mut stack, 0, tile(1));

    let painted: Arc<MapLayer> = plane.layer_handle(id).unwrap();
    stack.undo(&mut plane).unwrap();
    assert_eq!(painted.as_tiles().unwrap().tile_at(0, 0), tile(1));
    assert_eq!(
        plane.layer_by_id(id).unwrap().as_tiles().unwrap().tile_at(0, 0),
        None
    );
}
