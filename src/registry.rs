//! Global tile id assignment.
//!
//! Cells hold [`TileRef`]s; global ids are only minted when a map is written
//! and resolved back when it is read.

use crate::error::{MapError, Result};
use crate::tileset::{TileRef, Tileset, TilesetId};

#[derive(Debug, Clone, Copy, PartialEq, Eq)]
struct Span {
    tileset: TilesetId,
    first_gid: u32,
    /// Number of ids reserved, `max local id + 1`.
    len: u32,
}

/// Mapping between `(tileset, local id)` and global ids for one ordered
/// list of tilesets.
#[derive(Debug, Clone, Default, PartialEq, Eq)]
pub struct GidRegistry {
    spans: Vec<Span>,
}

impl GidRegistry {
    /// Lays tilesets out back to back starting at gid 1. Each set reserves
    /// `max local id + 1` ids; an empty set reserves none.
    pub fn assign(tilesets: &[Tileset]) -> Self {
        let mut spans = Vec::with_capacity(tilesets.len());
        let mut next = 1u32;
        for set in tilesets {
            let len = set.max_tile_id().map_or(0, |m| m + 1);
            spans.push(Span {
                tileset: set.id(),
                first_gid: next,
                len,
            });
            next += len;
        }
        Self { spans }
    }

    /// Registry from explicit first gids, as found in a file. Spans are
    /// open-ended up to the next tileset.
    pub fn from_first_gids(entries: impl IntoIterator<Item = (TilesetId, u32)>) -> Self {
        let mut spans: Vec<Span> = entries
            .into_iter()
            .map(|(tileset, first_gid)| Span {
                tileset,
                first_gid,
                len: u32::MAX,
            })
            .collect();
        spans.sort_by_key(|s| s.first_gid);
        for i in 1..spans.len() {
            let next_first = spans[i].first_gid;
            let prev = &mut spans[i - 1];
            prev.len = next_first - prev.first_gid;
        }
        if let Some(last) = spans.last_mut() {
            last.len = u32::MAX - last.first_gid;
        }
        Self { spans }
    }

    /// First gid of a tileset.
    pub fn first_gid(&self, tileset: TilesetId) -> Option<u32> {
        self.spans
            .iter()
            .find(|s| s.tileset == tileset)
            .map(|s| s.first_gid)
    }

    /// Global id of a cell value; `0` for empty.
    pub fn gid_of(&self, tile: Option<TileRef>) -> Result<u32> {
        let Some(tile) = tile else {
            return Ok(0);
        };
        self.spans
            .iter()
            .find(|s| s.tileset == tile.tileset && tile.id < s.len)
            .map(|s| s.first_gid + tile.id)
            .ok_or(MapError::InvalidTileRef {
                tileset: tile.tileset.0,
                id: tile.id,
            })
    }

    /// Cell value for a global id. `0` is empty; the owner is the tileset
    /// with the largest first gid not above `gid`.
    pub fn resolve(&self, gid: u32) -> Option<Option<TileRef>> {
        if gid == 0 {
            return Some(None);
        }
        let idx = self.spans.partition_point(|s| s.first_gid <= gid);
        let span = self.spans[..idx].iter().rev().find(|s| s.len > 0)?;
        let local = gid - span.first_gid;
        (local < span.len).then_some(Some(TileRef::new(span.tileset, local)))
    }

    /// Like [`GidRegistry::resolve`] with a typed error naming `context`.
    pub fn resolve_in(&self, gid: u32, context: &str) -> Result<Option<TileRef>> {
        self.resolve(gid).ok_or_else(|| MapError::InvalidTileGid {
            context: context.to_owned(),
            gid,
        })
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    fn set_with(n: u32) -> Tileset {
        let mut set = Tileset::new("s", 16, 16);
        for _ in 0..n {
            set.add_new_tile();
        }
        set
    }

    #[test]
    fn sets_are_packed_from_one() {
        let sets = [set_with(4), set_with(0), set_with(2)];
        let reg = GidRegistry::assign(&sets);
        assert_eq!(reg.first_gid(sets[0].id()), Some(1));
        assert_eq!(reg.first_gid(sets[1].id()), Some(5));
        assert_eq!(reg.first_gid(sets[2].id()), Some(5));

        let t = TileRef::new(sets[2].id(), 1);
        assert_eq!(reg.gid_of(Some(t)).unwrap(), 6);
        assert_eq!(reg.resolve(6), Some(Some(t)));
    }

    #[test]
    fn every_tile_round_trips() {
        let sets = [set_with(3), set_with(5)];
        let reg = GidRegistry::assign(&sets);
        for set in &sets {
            for tile in set.tiles() {
                let r = TileRef::new(set.id(), tile.id());
                let gid = reg.gid_of(Some(r)).unwrap();
                assert_eq!(reg.resolve(gid), Some(Some(r)));
            }
        }
        assert_eq!(reg.gid_of(None).unwrap(), 0);
        assert_eq!(reg.resolve(0), Some(None));
        assert_eq!(reg.resolve(9), None);
    }

    #[test]
    fn unknown_tile_is_an_error() {
        let sets = [set_with(1)];
        let reg = GidRegistry::assign(&sets);
        let bad = TileRef::new(sets[0].id(), 7);
        assert!(matches!(reg.gid_of(Some(bad)), Err(MapError::InvalidTileRef { id: 7, .. })));
    }

    #[test]
    fn file_gids_pick_largest_first_gid_below() {
        let reg = GidRegistry::from_first_gids([(TilesetId(10), 1), (TilesetId(11), 50)]);
        assert_eq!(reg.resolve(49), Some(Some(TileRef::new(TilesetId(10), 48))));
        assert_eq!(reg.resolve(50), Some(Some(TileRef::new(TilesetId(11), 0))));
    }
}
