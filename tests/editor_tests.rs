// tests/editor_tests.rs

use std::fs;
use std::path::PathBuf;
use std::time::{SystemTime, UNIX_EPOCH};

use tiled_editor_core::io::SaveOptions;
use tiled_editor_core::{Editor, Map, Tile, TileImage, TileRect, TileRef, Tileset};

fn temp_dir(tag: &str) -> PathBuf {
    let nanos = SystemTime::now()
        .duration_since(UNIX_EPOCH)
        .expect("clock went backwards")
        .as_nanos();
    let dir = std::env::temp_dir().join(format!("tiled_core_{tag}_{nanos}"));
    fs::create_dir_all(&dir).expect("failed to create temp dir");
    dir
}

fn new_editor() -> Editor {
    let mut map = Map::new(6, 4, 8, 8);
    let ground = map.new_tile_layer("Ground");
    map.plane_mut().add_layer(ground);
    let mut editor = Editor::new(map);
    let mut set = Tileset::new("colours", 1, 1);
    for v in [10u8, 20, 30] {
        set.add_tile(Tile::with_image(
            TileImage::from_rgba(1, 1, vec![v, v, v, 255]).unwrap(),
        ));
    }
    editor.add_tileset(set);
    editor
}

fn first_tile(editor: &Editor, id: u32) -> Option<TileRef> {
    Some(TileRef {
        tileset: editor.map().tilesets()[0].id(),
        id,
    })
}

#[test]
fn edit_save_reopen_keeps_cells() -> anyhow::Result<()> {
    let dir = temp_dir("editor");
    let path = dir.join("session.tmx");

    let mut editor = new_editor();
    assert!(editor.save().is_err(), "no file name yet");
    editor.set_current_tile(first_tile(&editor, 2));
    editor.begin_stroke("Paint")?;
    for x in 0..6 {
        editor.paint(x, 1)?;
    }
    editor.end_stroke()?;
    editor.select(TileRect::new(0, 1, 2, 1));
    editor.copy()?;
    editor.paste()?;
    assert_eq!(editor.title(), "Untitled*");

    editor.save_as(&path)?;
    assert_eq!(editor.title(), "session.tmx");
    assert!(!editor.has_unsaved_changes());

    let reopened = Editor::open(&path)?;
    assert_eq!(reopened.map().plane().len(), 2);
    assert_eq!(reopened.current_layer_index(), Some(0));
    let ground = reopened.map().plane().layer(0).unwrap().as_tiles().unwrap();
    assert_eq!(ground.tile_at(5, 1).map(|t| t.id), Some(2));
    assert_eq!(ground.tile_at(5, 0), None);
    let pasted = reopened.map().plane().layer(1).unwrap();
    assert_eq!(pasted.name(), "Layer 2");
    assert_eq!(pasted.bounds(), TileRect::new(0, 1, 2, 1));
    Ok(())
}

#[test]
fn undo_after_save_marks_document_dirty_again() -> anyhow::Result<()> {
    let dir = temp_dir("dirty");
    let mut editor = new_editor();
    editor.set_tile(0, 0, first_tile(&editor, 0))?;
    editor.save_as(dir.join("m.tmx"))?;

    editor.undo()?;
    assert_eq!(editor.title(), "m.tmx*");
    editor.redo()?;
    assert_eq!(editor.title(), "m.tmx");
    Ok(())
}

#[test]
fn open_reports_the_path_that_failed() {
    let err = match Editor::open("/definitely/missing/map.tmx") {
        Ok(_) => panic!("opening a missing file should fail"),
        Err(e) => e,
    };
    let message = format!("{err:#}");
    assert!(message.contains("Opening map /definitely/missing/map.tmx"), "{message}");

    let err = match Editor::open("notes.txt") {
        Ok(_) => panic!("no reader for .txt"),
        Err(e) => e,
    };
    assert!(format!("{err:#}").contains("notes.txt"));
}

#[test]
fn save_tileset_makes_it_external() -> anyhow::Result<()> {
    let dir = temp_dir("tsx");
    let mut editor = new_editor();
    let id = editor.map().tilesets()[0].id();
    editor.set_tile(1, 1, first_tile(&editor, 1))?;
    editor.save_tileset(id, dir.join("colours.tsx"))?;
    assert!(editor.map().tilesets()[0].is_external());

    let path = dir.join("m.tmx");
    editor.save_as(&path)?;
    let text = fs::read_to_string(&path)?;
    assert!(text.contains(r#"<tileset firstgid="1" source="colours.tsx"/>"#), "{text}");

    let mut reopened = Editor::open(&path)?;
    let id = reopened.map().tilesets()[0].id();
    assert_eq!(reopened.tileset_usage(id), 1);
    reopened.embed_tileset(id)?;
    assert!(!reopened.map().tilesets()[0].is_external());
    assert!(reopened.has_unsaved_changes());
    Ok(())
}

#[test]
fn load_tileset_attaches_standalone_file() -> anyhow::Result<()> {
    let dir = temp_dir("loadtsx");
    let mut editor = new_editor();
    let id = editor.map().tilesets()[0].id();
    let tsx = dir.join("shared.tsx");
    editor.save_tileset(id, &tsx)?;

    let mut other = Editor::new(Map::new(2, 2, 1, 1));
    let loaded = other.load_tileset(&tsx)?;
    let set = other.map().tileset(loaded).unwrap();
    assert_eq!(set.tile_count(), 3);
    assert_eq!(set.name.as_deref(), Some("colours"));
    Ok(())
}

#[test]
fn save_options_come_from_json() -> anyhow::Result<()> {
    let dir = temp_dir("opts");
    let mut editor = new_editor();
    editor.set_tile(0, 0, first_tile(&editor, 0))?;
    editor.set_options(SaveOptions::from_json_str(
        r#"{ "encode_layer_data": false }"#,
    )?);
    let path = dir.join("m.tmx");
    editor.save_as(&path)?;
    let text = fs::read_to_string(&path)?;
    assert!(text.contains(r#"<tile gid="1"/>"#));
    Ok(())
}

#[test]
fn snapshot_is_stable_while_editing() -> anyhow::Result<()> {
    let mut editor = new_editor();
    editor.set_tile(0, 0, first_tile(&editor, 0))?;
    let snap = editor.snapshot();
    editor.set_tile(1, 0, first_tile(&editor, 1))?;

    let view = TileRect::new(0, 0, 6, 4);
    assert_eq!(snap.visible_cells(view).len(), 1);
    assert_eq!(editor.snapshot().visible_cells(view).len(), 2);
    Ok(())
}
