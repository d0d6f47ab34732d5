use std::collections::{HashMap, VecDeque};

use bw_types::{Block, BlockId, BlockParams, BlockPos, ParamType, PlayerFlags};
use thiserror::Error;

use crate::block_manager::BlockManager;

pub const MIN_SIZE: u16 = 3;
pub const MAX_SIZE: u16 = 300;

/// Which of a position's two layers a block update targets.
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub enum Layer {
    Foreground = 0,
    Background = 1,
}

#[derive(Debug, Error, PartialEq, Eq)]
pub enum WorldError {
    #[error("position out of bounds")]
    OutOfBounds,
    #[error("unknown block id {0}")]
    UnknownBlock(BlockId),
    #[error("block id {0} cannot be placed on {1:?}")]
    WrongLayer(BlockId, Layer),
    #[error("invalid world size {0}x{1}, must be {MIN_SIZE}..={MAX_SIZE}")]
    InvalidSize(u16, u16),
}

/// A pending write collapsed into the per-world update queue. One entry
/// per position; a later write to the same position within a tick
/// overwrites the earlier one, matching the reference's "at-most-one
/// authoritative block state" guarantee.
#[derive(Debug, Clone, PartialEq)]
pub struct BlockUpdate {
    pub pos: BlockPos,
    pub layer: Layer,
    pub id: BlockId,
    pub tile: u8,
    pub params: BlockParams,
    /// Peer that caused the update, if any (0 for server-initiated writes
    /// such as `/clear` or EELVL import). Carried through to the broadcast
    /// `PlaceBlock` packet's `peer_id` field.
    pub placer: u32,
}

/// A region selector for bulk operations (`setBlockTiles`, `get_blocks_in_range`).
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub enum PositionRange {
    OneBlock(BlockPos),
    Area(BlockPos, BlockPos),
    Circle(BlockPos, u16),
    EntireWorld,
}

/// Draw/persistence classification of a world, derived from the leading
/// character of its ID (`T`mp, `P`ersistent, `I`mport/readonly).
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub enum WorldDrawType {
    TmpSimple,
    TmpDraw,
    Persistent,
    Readonly,
}

impl WorldDrawType {
    /// Parses the leading type-tag character of a world ID. Returns `None`
    /// for an unrecognised tag, which the Join handler rejects outright.
    pub fn from_id(world_id: &str) -> Option<Self> {
        match world_id.chars().next()? {
            'P' => Some(WorldDrawType::Persistent),
            'I' => Some(WorldDrawType::Readonly),
            'T' => Some(WorldDrawType::TmpDraw),
            _ => None,
        }
    }
}

/// Coloured key-gate timer state. `None` means the gate is shut (default).
#[derive(Debug, Clone, Copy, Default, PartialEq, Eq)]
pub struct KeyTimer {
    pub open_until_tick: Option<u64>,
}

/// World-level metadata: everything about a world that isn't the block
/// grid itself.
#[derive(Debug, Clone)]
pub struct WorldMeta {
    pub id: String,
    pub title: String,
    pub owner: String,
    pub is_public: bool,
    pub draw_type: WorldDrawType,
    pub edit_code: Option<String>,
    pub spawn_index: u16,
    pub online: u32,
    pub total_plays: u32,
    /// Red/green/blue key-gate timers (§3).
    pub key_timers: [KeyTimer; 3],
    pub switch_state: bool,
    chat_history: VecDeque<String>,
    chat_history_cap: usize,
    /// Keyed by case-folded player name, matching `Player.name`.
    player_flags: HashMap<String, PlayerFlags>,
}

impl WorldMeta {
    pub fn new(id: impl Into<String>, owner: impl Into<String>) -> Self {
        let id = id.into();
        let draw_type = WorldDrawType::from_id(&id).unwrap_or(WorldDrawType::TmpDraw);
        Self {
            id,
            title: String::new(),
            owner: owner.into(),
            is_public: true,
            draw_type,
            edit_code: None,
            spawn_index: 0,
            online: 0,
            total_plays: 0,
            key_timers: Default::default(),
            switch_state: false,
            chat_history: VecDeque::new(),
            chat_history_cap: 50,
            player_flags: HashMap::new(),
        }
    }

    pub fn push_chat(&mut self, line: String) {
        if self.chat_history.len() >= self.chat_history_cap {
            self.chat_history.pop_front();
        }
        self.chat_history.push_back(line);
    }

    pub fn chat_history(&self) -> impl Iterator<Item = &String> {
        self.chat_history.iter()
    }

    pub fn get_player_flags(&self, name: &str) -> PlayerFlags {
        self.player_flags
            .get(&name.to_lowercase())
            .copied()
            .unwrap_or_default()
    }

    pub fn set_player_flags(&mut self, name: &str, flags: PlayerFlags) {
        self.player_flags.insert(name.to_lowercase(), flags);
    }

    /// Clears every temporary grant (`/code`-issued edit/godmode, temp
    /// mute) across all known players, used by `/setcode -f`.
    pub fn revoke_all_temp_flags(&mut self) {
        for flags in self.player_flags.values_mut() {
            flags.set(0, PlayerFlags::PF_MASK_TMP);
        }
    }

    /// Serialises the flag table to a small versioned binary form for
    /// persistence. Version `1`: `u32 count`, then per entry
    /// `u16 name_len, name bytes, u32 flags`.
    pub fn write_player_flags(&self) -> Vec<u8> {
        let mut out = vec![1u8];
        out.extend_from_slice(&(self.player_flags.len() as u32).to_le_bytes());
        for (name, flags) in &self.player_flags {
            let bytes = name.as_bytes();
            out.extend_from_slice(&(bytes.len() as u16).to_le_bytes());
            out.extend_from_slice(bytes);
            out.extend_from_slice(&flags.flags.to_le_bytes());
        }
        out
    }

    pub fn read_player_flags(data: &[u8]) -> HashMap<String, PlayerFlags> {
        let mut out = HashMap::new();
        if data.first() != Some(&1) || data.len() < 5 {
            return out;
        }
        let count = u32::from_le_bytes(data[1..5].try_into().unwrap()) as usize;
        let mut cursor = 5usize;
        for _ in 0..count {
            if cursor + 2 > data.len() {
                break;
            }
            let name_len = u16::from_le_bytes(data[cursor..cursor + 2].try_into().unwrap()) as usize;
            cursor += 2;
            if cursor + name_len + 4 > data.len() {
                break;
            }
            let name = String::from_utf8_lossy(&data[cursor..cursor + name_len]).to_string();
            cursor += name_len;
            let flags = u32::from_le_bytes(data[cursor..cursor + 4].try_into().unwrap());
            cursor += 4;
            out.insert(name, PlayerFlags::new(flags));
        }
        out
    }

    pub fn load_player_flags(&mut self, data: &[u8]) {
        self.player_flags = Self::read_player_flags(data);
    }
}

/// Two-layer rectangular block grid plus metadata and the pending update
/// queue. Dimensions are fixed at construction (§3's immutable-after-
/// creation invariant).
pub struct World {
    width: u16,
    height: u16,
    blocks: Vec<Block>,
    params: HashMap<BlockPos, BlockParams>,
    pub meta: WorldMeta,
    proc_queue: HashMap<BlockPos, BlockUpdate>,
}

impl World {
    pub fn create_empty(width: u16, height: u16, meta: WorldMeta) -> Result<Self, WorldError> {
        if !(MIN_SIZE..=MAX_SIZE).contains(&width) || !(MIN_SIZE..=MAX_SIZE).contains(&height) {
            return Err(WorldError::InvalidSize(width, height));
        }
        Ok(Self {
            width,
            height,
            blocks: vec![Block::air(); 2 * width as usize * height as usize],
            params: HashMap::new(),
            meta,
            proc_queue: HashMap::new(),
        })
    }

    /// Like `create_empty` but fills a one-block-thick solid border, for
    /// test fixtures and the reference's "dummy" Join fallback.
    pub fn create_dummy(width: u16, height: u16, meta: WorldMeta, border_id: BlockId) -> Result<Self, WorldError> {
        let mut world = Self::create_empty(width, height, meta)?;
        for x in 0..width {
            let _ = world.set_block_unchecked(BlockPos::new(x, 0), Block::new(border_id), Layer::Foreground);
            let _ = world.set_block_unchecked(BlockPos::new(x, height - 1), Block::new(border_id), Layer::Foreground);
        }
        for y in 0..height {
            let _ = world.set_block_unchecked(BlockPos::new(0, y), Block::new(border_id), Layer::Foreground);
            let _ = world.set_block_unchecked(BlockPos::new(width - 1, y), Block::new(border_id), Layer::Foreground);
        }
        Ok(world)
    }

    pub fn width(&self) -> u16 {
        self.width
    }

    pub fn height(&self) -> u16 {
        self.height
    }

    pub fn in_bounds(&self, pos: BlockPos) -> bool {
        pos.x < self.width && pos.y < self.height
    }

    fn index(&self, pos: BlockPos, layer: Layer) -> usize {
        layer as usize * self.width as usize * self.height as usize
            + pos.y as usize * self.width as usize
            + pos.x as usize
    }

    pub fn get_block(&self, pos: BlockPos, layer: Layer) -> Option<Block> {
        if !self.in_bounds(pos) {
            return None;
        }
        Some(self.blocks[self.index(pos, layer)])
    }

    /// Unchecked internal helper used by construction/import paths that
    /// already validated bounds and block IDs.
    fn set_block_unchecked(&mut self, pos: BlockPos, block: Block, layer: Layer) -> bool {
        if !self.in_bounds(pos) {
            return false;
        }
        let idx = self.index(pos, layer);
        self.blocks[idx] = block;
        true
    }

    /// Validated single-block write, matching §4.5's `setBlock` contract:
    /// rejects out-of-grid positions, unknown block IDs, and a block
    /// placed on the wrong layer for its declared draw type.
    pub fn set_block(
        &mut self,
        pos: BlockPos,
        block: Block,
        layer: Layer,
        blocks: &BlockManager,
    ) -> Result<(), WorldError> {
        if !self.in_bounds(pos) {
            return Err(WorldError::OutOfBounds);
        }
        if block.id != 0 {
            let props = blocks
                .getprops(block.id)
                .ok_or(WorldError::UnknownBlock(block.id))?;
            if layer == Layer::Background && props.draw_type != crate::block_manager::DrawType::Background {
                return Err(WorldError::WrongLayer(block.id, layer));
            }
            if layer == Layer::Foreground && props.draw_type == crate::block_manager::DrawType::Background {
                return Err(WorldError::WrongLayer(block.id, layer));
            }
        }
        self.set_block_unchecked(pos, block, layer);
        Ok(())
    }

    pub fn get_params(&self, pos: BlockPos) -> BlockParams {
        self.params.get(&pos).cloned().unwrap_or(BlockParams::None)
    }

    pub fn get_params_ptr(&mut self, pos: BlockPos) -> &mut BlockParams {
        self.params.entry(pos).or_insert(BlockParams::None)
    }

    /// Validates and writes a block update, updates its parameters if the
    /// block's declared parameter type permits them, and inserts the
    /// result into `proc_queue`. An existing queued entry for the same
    /// position is overwritten.
    pub fn update_block(
        &mut self,
        pos: BlockPos,
        layer: Layer,
        id: BlockId,
        tile: u8,
        params: BlockParams,
        placer: u32,
        blocks: &BlockManager,
    ) -> Result<Block, WorldError> {
        if !self.in_bounds(pos) {
            return Err(WorldError::OutOfBounds);
        }
        if id != 0 {
            let props = blocks.getprops(id).ok_or(WorldError::UnknownBlock(id))?;
            let wrong_layer = (layer == Layer::Background
                && props.draw_type != crate::block_manager::DrawType::Background)
                || (layer == Layer::Foreground && props.draw_type == crate::block_manager::DrawType::Background);
            if wrong_layer {
                return Err(WorldError::WrongLayer(id, layer));
            }
        }

        let mut block = Block::new(id);
        block.set_tile(tile);
        self.set_block_unchecked(pos, block, layer);

        let param_type = blocks.getprops(id).map(|p| p.param_type).unwrap_or(ParamType::None);
        if param_type != ParamType::None && params.param_type() == param_type {
            self.params.insert(pos, params.clone());
        } else if id == 0 {
            self.params.remove(&pos);
        }

        self.proc_queue.insert(
            pos,
            BlockUpdate {
                pos,
                layer,
                id,
                tile,
                params,
                placer,
            },
        );
        Ok(block)
    }

    /// Drains every queued update. Called once per tick by the server's
    /// broadcast step (§4.7.3); the returned order is insertion order,
    /// which for a `HashMap` is not the write order — callers that need
    /// strict within-tick ordering should track it themselves at the
    /// call site (the server does, by sequencing `update_block` calls and
    /// broadcasting before the next tick starts).
    pub fn drain_queue(&mut self) -> Vec<BlockUpdate> {
        self.proc_queue.drain().map(|(_, v)| v).collect()
    }

    pub fn queue_len(&self) -> usize {
        self.proc_queue.len()
    }

    /// Forces every block back through the update queue (used after a
    /// world load/import, so the first broadcast sends the whole grid).
    pub fn mark_all_modified(&mut self, placer: u32) {
        for y in 0..self.height {
            for x in 0..self.width {
                let pos = BlockPos::new(x, y);
                let fg = self.get_block(pos, Layer::Foreground).unwrap_or_default();
                self.proc_queue.insert(
                    pos,
                    BlockUpdate {
                        pos,
                        layer: Layer::Foreground,
                        id: fg.id,
                        tile: fg.tile(),
                        params: self.get_params(pos),
                        placer,
                    },
                );
            }
        }
    }

    pub fn get_blocks(&self, id: BlockId) -> Vec<BlockPos> {
        let mut out = Vec::new();
        for y in 0..self.height {
            for x in 0..self.width {
                let pos = BlockPos::new(x, y);
                if self.get_block(pos, Layer::Foreground).map(|b| b.id) == Some(id) {
                    out.push(pos);
                }
            }
        }
        out
    }

    pub fn set_block_tiles(&mut self, range: PositionRange, block_id: BlockId, tile: u8) {
        for pos in self.iter_range(range) {
            if let Some(mut b) = self.get_block(pos, Layer::Foreground) {
                if b.id == block_id {
                    b.set_tile(tile);
                    self.set_block_unchecked(pos, b, Layer::Foreground);
                }
            }
        }
    }

    /// Iterates the positions selected by `range`, clipped to the grid.
    /// Replaces the reference's `iteratorStart`/`iteratorNext` pair with a
    /// real Rust `Iterator`.
    pub fn iter_range(&self, range: PositionRange) -> PositionRangeIter {
        PositionRangeIter::new(self.width, self.height, range)
    }
}

pub struct PositionRangeIter {
    width: u16,
    height: u16,
    range: PositionRange,
    cursor: Option<BlockPos>,
    done: bool,
}

impl PositionRangeIter {
    fn new(width: u16, height: u16, range: PositionRange) -> Self {
        let start = match range {
            PositionRange::OneBlock(p) => Some(p),
            PositionRange::Area(min, _) => Some(min),
            PositionRange::Circle(center, radius) => {
                let min_x = center.x.saturating_sub(radius);
                let min_y = center.y.saturating_sub(radius);
                Some(BlockPos::new(min_x, min_y))
            }
            PositionRange::EntireWorld => Some(BlockPos::new(0, 0)),
        };
        Self {
            width,
            height,
            range,
            cursor: start,
            done: start.is_none() || width == 0 || height == 0,
        }
    }

    fn bounds(&self) -> (BlockPos, BlockPos) {
        match self.range {
            PositionRange::OneBlock(p) => (p, p),
            PositionRange::Area(min, max) => (min, max),
            PositionRange::Circle(center, radius) => (
                BlockPos::new(center.x.saturating_sub(radius), center.y.saturating_sub(radius)),
                BlockPos::new(
                    (center.x + radius).min(self.width.saturating_sub(1)),
                    (center.y + radius).min(self.height.saturating_sub(1)),
                ),
            ),
            PositionRange::EntireWorld => (
                BlockPos::new(0, 0),
                BlockPos::new(self.width.saturating_sub(1), self.height.saturating_sub(1)),
            ),
        }
    }

    fn passes_filter(&self, pos: BlockPos) -> bool {
        if pos.x >= self.width || pos.y >= self.height {
            return false;
        }
        if let PositionRange::Circle(center, radius) = self.range {
            let dx = pos.x as i64 - center.x as i64;
            let dy = pos.y as i64 - center.y as i64;
            return dx * dx + dy * dy <= (radius as i64) * (radius as i64);
        }
        true
    }
}

impl Iterator for PositionRangeIter {
    type Item = BlockPos;

    fn next(&mut self) -> Option<BlockPos> {
        if self.done {
            return None;
        }
        let (min, max) = self.bounds();
        loop {
            let pos = self.cursor?;
            let mut next_x = pos.x + 1;
            let mut next_y = pos.y;
            if next_x > max.x {
                next_x = min.x;
                next_y += 1;
            }
            self.cursor = if next_y > max.y || pos.x > max.x || pos.y > max.y {
                None
            } else {
                Some(BlockPos::new(next_x, next_y))
            };
            if self.cursor.is_none() {
                self.done = true;
            }
            if pos.x <= max.x && pos.y <= max.y && self.passes_filter(pos) {
                return Some(pos);
            }
            if self.done {
                return None;
            }
        }
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    fn mgr() -> BlockManager {
        BlockManager::new()
    }

    #[test]
    fn set_then_get_round_trips_inside_grid() {
        let mut world = World::create_empty(10, 10, WorldMeta::new("Ttest", "alice")).unwrap();
        let blocks = mgr();
        world
            .set_block(BlockPos::new(2, 2), Block::new(1), Layer::Foreground, &blocks)
            .unwrap();
        assert_eq!(world.get_block(BlockPos::new(2, 2), Layer::Foreground).unwrap().id, 1);
    }

    #[test]
    fn out_of_bounds_is_rejected() {
        let mut world = World::create_empty(10, 10, WorldMeta::new("Ttest", "alice")).unwrap();
        let blocks = mgr();
        assert_eq!(
            world.set_block(BlockPos::new(50, 50), Block::new(1), Layer::Foreground, &blocks),
            Err(WorldError::OutOfBounds)
        );
        assert!(world.get_block(BlockPos::new(50, 50), Layer::Foreground).is_none());
    }

    #[test]
    fn unknown_block_id_is_rejected() {
        let mut world = World::create_empty(10, 10, WorldMeta::new("Ttest", "alice")).unwrap();
        let blocks = mgr();
        assert_eq!(
            world.set_block(BlockPos::new(1, 1), Block::new(9999), Layer::Foreground, &blocks),
            Err(WorldError::UnknownBlock(9999))
        );
    }

    #[test]
    fn update_block_overwrites_same_position_in_queue() {
        let mut world = World::create_empty(10, 10, WorldMeta::new("Ttest", "alice")).unwrap();
        let blocks = mgr();
        let pos = BlockPos::new(3, 3);
        world
            .update_block(pos, Layer::Foreground, 1, 0, BlockParams::None, 7, &blocks)
            .unwrap();
        world
            .update_block(pos, Layer::Foreground, 2, 0, BlockParams::None, 7, &blocks)
            .unwrap();
        assert_eq!(world.queue_len(), 1);
        let drained = world.drain_queue();
        assert_eq!(drained[0].id, 2);
    }

    #[test]
    fn world_size_bounds_are_enforced() {
        assert!(World::create_empty(2, 10, WorldMeta::new("Tx", "a")).is_err());
        assert!(World::create_empty(301, 10, WorldMeta::new("Tx", "a")).is_err());
        assert!(World::create_empty(3, 300, WorldMeta::new("Tx", "a")).is_ok());
    }

    #[test]
    fn circle_range_clips_and_filters() {
        let world = World::create_empty(20, 20, WorldMeta::new("Tx", "a")).unwrap();
        let positions: Vec<_> = world
            .iter_range(PositionRange::Circle(BlockPos::new(10, 10), 2))
            .collect();
        assert!(positions.contains(&BlockPos::new(10, 10)));
        assert!(!positions.contains(&BlockPos::new(10, 14)));
        for p in &positions {
            let dx = p.x as i64 - 10;
            let dy = p.y as i64 - 10;
            assert!(dx * dx + dy * dy <= 4);
        }
    }

    #[test]
    fn entire_world_range_covers_every_position() {
        let world = World::create_empty(4, 3, WorldMeta::new("Tx", "a")).unwrap();
        let positions: Vec<_> = world.iter_range(PositionRange::EntireWorld).collect();
        assert_eq!(positions.len(), 12);
    }

    #[test]
    fn player_flags_round_trip_through_serialisation() {
        let mut meta = WorldMeta::new("Ttest", "alice");
        meta.set_player_flags("Bob", PlayerFlags::new(PlayerFlags::PF_EDIT));
        let bytes = meta.write_player_flags();
        let loaded = WorldMeta::read_player_flags(&bytes);
        assert_eq!(loaded.get("bob").unwrap().flags, PlayerFlags::PF_EDIT);
    }
}
