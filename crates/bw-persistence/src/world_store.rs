use bw_types::{BlockParams, BlockPos};
use bw_world::{BlockManager, Layer, World, WorldMeta};
use rusqlite::{params, Connection, OptionalExtension};

use crate::PersistError;

/// Hashes a world's string ID down to the 32-bit key `worlds.id` is keyed
/// by. Preserved verbatim from the reference's `stupid_worldid_hash`
/// (rolling XOR-shift, no attempt at a stronger hash) — collisions are a
/// known, accepted risk rather than something this port silently fixes.
fn stupid_worldid_hash(id: &str) -> i64 {
    let mut v: u32 = 0;
    for byte in id.bytes() {
        v ^= (v << 3).wrapping_add(byte as u32);
    }
    v as i64
}

/// SQLite-backed store for world grids, keyed by [`stupid_worldid_hash`].
/// One connection per process; `save`/`load` each wrap their write in an
/// explicit transaction so a crash mid-save can't leave a half-written
/// blob visible to the next load.
pub struct WorldStore {
    conn: Connection,
}

impl WorldStore {
    pub fn open(path: &str) -> Result<Self, PersistError> {
        let conn = Connection::open(path)?;
        conn.execute(
            "CREATE TABLE IF NOT EXISTS worlds (
                id     INTEGER UNIQUE,
                width  INTEGER,
                height INTEGER,
                owner  TEXT,
                plays  INTEGER,
                data   BLOB,
                PRIMARY KEY(id)
            )",
            [],
        )?;
        Ok(Self { conn })
    }

    pub fn open_in_memory() -> Result<Self, PersistError> {
        Self::open(":memory:")
    }

    /// Loads a world previously saved under `world_id`. Returns `Ok(None)`
    /// when no row matches the hash, distinguishing "not found" from a
    /// hard I/O error the way `?` would otherwise collapse them.
    pub fn load(&self, world_id: &str, owner_override: Option<&str>, blocks: &BlockManager) -> Result<Option<World>, PersistError> {
        let key = stupid_worldid_hash(world_id);
        let row: Option<(u16, u16, String, u32, Vec<u8>)> = self
            .conn
            .query_row(
                "SELECT width, height, owner, plays, data FROM worlds WHERE id = ?1",
                params![key],
                |row| Ok((row.get(0)?, row.get(1)?, row.get(2)?, row.get(3)?, row.get(4)?)),
            )
            .optional()?;

        let Some((width, height, owner, plays, data)) = row else {
            return Ok(None);
        };

        let mut meta = WorldMeta::new(world_id, owner_override.unwrap_or(&owner));
        meta.total_plays = plays;
        let mut world = World::create_empty(width, height, meta)?;
        decode_grid(&mut world, &data, blocks)?;
        world.mark_all_modified(0);
        Ok(Some(world))
    }

    /// Persists `world`'s grid and metadata. `REPLACE INTO` matches the
    /// reference's write statement: a world is either newly inserted or
    /// wholesale overwritten, never patched field-by-field.
    pub fn save(&mut self, world: &World) -> Result<(), PersistError> {
        let tx = self.conn.transaction()?;
        let key = stupid_worldid_hash(&world.meta.id);
        let data = encode_grid(world);
        tx.execute(
            "REPLACE INTO worlds (id, width, height, owner, plays, data) VALUES (?1, ?2, ?3, ?4, ?5, ?6)",
            params![key, world.width(), world.height(), world.meta.owner, world.meta.total_plays, data],
        )?;
        tx.commit()?;
        Ok(())
    }

    pub fn run_custom_query(&self, query: &str) -> Result<(), PersistError> {
        self.conn.execute_batch(query)?;
        Ok(())
    }
}

const PARAM_TAG_NONE: u8 = 0;
const PARAM_TAG_U8: u8 = 1;
const PARAM_TAG_STR16: u8 = 2;
const PARAM_TAG_TELEPORTER: u8 = 3;

/// Flattens the two-layer grid plus sparse params map into a single blob:
/// `version(1) | width(u16) | height(u16) | cells...`, each cell being
/// `fg_id(u16) fg_tile(u8) bg_id(u16) bg_tile(u8) param_tag(u8) param...`.
/// Rows are stored in `y`-major order to match `World`'s own indexing.
fn encode_grid(world: &World) -> Vec<u8> {
    let mut out = vec![1u8];
    out.extend_from_slice(&world.width().to_le_bytes());
    out.extend_from_slice(&world.height().to_le_bytes());
    for y in 0..world.height() {
        for x in 0..world.width() {
            let pos = BlockPos::new(x, y);
            let fg = world.get_block(pos, Layer::Foreground).unwrap_or_default();
            let bg = world.get_block(pos, Layer::Background).unwrap_or_default();
            out.extend_from_slice(&fg.id.to_le_bytes());
            out.push(fg.tile());
            out.extend_from_slice(&bg.id.to_le_bytes());
            out.push(bg.tile());
            encode_params(&world.get_params(pos), &mut out);
        }
    }
    out
}

fn encode_params(params: &BlockParams, out: &mut Vec<u8>) {
    match params {
        BlockParams::None => out.push(PARAM_TAG_NONE),
        BlockParams::U8(v) => {
            out.push(PARAM_TAG_U8);
            out.push(*v);
        }
        BlockParams::Str16(s) => {
            out.push(PARAM_TAG_STR16);
            out.extend_from_slice(&(s.len() as u16).to_le_bytes());
            out.extend_from_slice(s.as_bytes());
        }
        BlockParams::Teleporter { rotation, id, dst_id } => {
            out.push(PARAM_TAG_TELEPORTER);
            out.extend_from_slice(&[*rotation, *id, *dst_id]);
        }
    }
}

fn decode_grid(world: &mut World, data: &[u8], blocks: &BlockManager) -> Result<(), PersistError> {
    if data.first() != Some(&1) || data.len() < 5 {
        return Err(PersistError::CorruptBlob);
    }
    let width = u16::from_le_bytes(data[1..3].try_into().unwrap());
    let height = u16::from_le_bytes(data[3..5].try_into().unwrap());
    if width != world.width() || height != world.height() {
        return Err(PersistError::CorruptBlob);
    }

    let mut cursor = 5usize;
    for y in 0..height {
        for x in 0..width {
            let pos = BlockPos::new(x, y);
            let (fg_id, fg_tile, bg_id, bg_tile, param) = decode_cell(data, &mut cursor)?;

            world
                .update_block(pos, Layer::Foreground, fg_id, fg_tile, param, 0, blocks)
                .map_err(|_| PersistError::CorruptBlob)?;
            world
                .update_block(pos, Layer::Background, bg_id, bg_tile, BlockParams::None, 0, blocks)
                .map_err(|_| PersistError::CorruptBlob)?;
        }
    }
    world.drain_queue();
    Ok(())
}

fn decode_cell(data: &[u8], cursor: &mut usize) -> Result<(u16, u8, u16, u8, BlockParams), PersistError> {
    let need = |n: usize, cursor: usize| -> Result<(), PersistError> {
        if cursor + n > data.len() {
            Err(PersistError::CorruptBlob)
        } else {
            Ok(())
        }
    };

    need(6, *cursor)?;
    let fg_id = u16::from_le_bytes(data[*cursor..*cursor + 2].try_into().unwrap());
    let fg_tile = data[*cursor + 2];
    let bg_id = u16::from_le_bytes(data[*cursor + 3..*cursor + 5].try_into().unwrap());
    let bg_tile = data[*cursor + 5];
    *cursor += 6;

    need(1, *cursor)?;
    let tag = data[*cursor];
    *cursor += 1;
    let param = match tag {
        PARAM_TAG_NONE => BlockParams::None,
        PARAM_TAG_U8 => {
            need(1, *cursor)?;
            let v = data[*cursor];
            *cursor += 1;
            BlockParams::U8(v)
        }
        PARAM_TAG_STR16 => {
            need(2, *cursor)?;
            let len = u16::from_le_bytes(data[*cursor..*cursor + 2].try_into().unwrap()) as usize;
            *cursor += 2;
            need(len, *cursor)?;
            let s = String::from_utf8_lossy(&data[*cursor..*cursor + len]).to_string();
            *cursor += len;
            BlockParams::Str16(s)
        }
        PARAM_TAG_TELEPORTER => {
            need(3, *cursor)?;
            let rotation = data[*cursor];
            let id = data[*cursor + 1];
            let dst_id = data[*cursor + 2];
            *cursor += 3;
            BlockParams::Teleporter { rotation, id, dst_id }
        }
        _ => return Err(PersistError::CorruptBlob),
    };

    Ok((fg_id, fg_tile, bg_id, bg_tile, param))
}

#[cfg(test)]
mod tests {
    use super::*;

    fn blocks() -> BlockManager {
        BlockManager::new()
    }

    #[test]
    fn saving_then_loading_round_trips_the_grid() {
        let mgr = blocks();
        let mut world = World::create_empty(10, 10, WorldMeta::new("Ptest", "alice")).unwrap();
        world
            .update_block(BlockPos::new(2, 2), Layer::Foreground, 1, 3, BlockParams::None, 0, &mgr)
            .unwrap();
        world.drain_queue();

        let mut store = WorldStore::open_in_memory().unwrap();
        store.save(&world).unwrap();

        let loaded = store.load("Ptest", None, &mgr).unwrap().expect("world must be found");
        assert_eq!(loaded.get_block(BlockPos::new(2, 2), Layer::Foreground).unwrap().id, 1);
        assert_eq!(loaded.get_block(BlockPos::new(2, 2), Layer::Foreground).unwrap().tile(), 3);
        assert_eq!(loaded.width(), 10);
        assert_eq!(loaded.height(), 10);
    }

    #[test]
    fn loading_an_unknown_world_id_returns_none() {
        let mgr = blocks();
        let store = WorldStore::open_in_memory().unwrap();
        assert!(store.load("Pnever-saved", None, &mgr).unwrap().is_none());
    }

    #[test]
    fn teleporter_params_survive_a_round_trip() {
        let mgr = blocks();
        let mut world = World::create_empty(5, 5, WorldMeta::new("Ptp", "bob")).unwrap();
        world
            .update_block(
                BlockPos::new(1, 1),
                Layer::Foreground,
                bw_types::ids::TELEPORTER,
                0,
                BlockParams::Teleporter { rotation: 1, id: 2, dst_id: 3 },
                0,
                &mgr,
            )
            .unwrap();

        let mut store = WorldStore::open_in_memory().unwrap();
        store.save(&world).unwrap();
        let loaded = store.load("Ptp", None, &mgr).unwrap().unwrap();
        assert_eq!(
            loaded.get_params(BlockPos::new(1, 1)),
            BlockParams::Teleporter { rotation: 1, id: 2, dst_id: 3 }
        );
    }

    #[test]
    fn world_id_hash_is_order_sensitive() {
        assert_ne!(stupid_worldid_hash("Pabc"), stupid_worldid_hash("Pcba"));
    }
}
