use serde::{Deserialize, Serialize};

/// Foreground block ID. `0` is air; IDs above 8000 are never registered.
pub type BlockId = u16;

/// Sentinel for "no such position" (used by range iterators at end-of-range).
pub const BLOCKPOS_INVALID: u16 = u16::MAX;

/// A position in the two-layer block grid. Both axes are `u16`, matching
/// the world size bound of `3..=300`.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Hash, PartialOrd, Ord, Serialize, Deserialize)]
pub struct BlockPos {
    pub x: u16,
    pub y: u16,
}

impl BlockPos {
    pub fn new(x: u16, y: u16) -> Self {
        Self { x, y }
    }

    pub fn is_invalid(&self) -> bool {
        self.x == BLOCKPOS_INVALID || self.y == BLOCKPOS_INVALID
    }
}

/// A single grid cell: a foreground ID, a 3-bit tile discriminator used
/// for rendering/animation (and, for blocks that declare
/// `tile_dependent_physics`, for physics), and a background ID.
///
/// The reference packs `id`/`tile` into 16 bits; we keep them as separate
/// fields since Rust has no portable bitfield syntax, but `tile` is only
/// ever read and written through [`Block::tile`]/[`Block::set_tile`] so the
/// 3-bit invariant is enforced in one place.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Serialize, Deserialize)]
pub struct Block {
    pub id: BlockId,
    tile: u8,
    pub bg: BlockId,
}

impl Block {
    pub const ID_INVALID: BlockId = BlockId::MAX;

    pub fn new(id: BlockId) -> Self {
        Self { id, tile: 0, bg: 0 }
    }

    pub fn air() -> Self {
        Self::new(0)
    }

    pub fn tile(&self) -> u8 {
        self.tile
    }

    pub fn set_tile(&mut self, tile: u8) {
        self.tile = tile & 0x7;
    }
}

impl Default for Block {
    fn default() -> Self {
        Self::air()
    }
}

/// Well-known block IDs referenced directly by physics/script host logic
/// (teleporters, coin doors, spikes, …). Mirrors the reference's
/// `Block::BlockIDs` enum.
pub mod ids {
    use super::BlockId;

    pub const KEY_R: BlockId = 6;
    pub const KEY_G: BlockId = 7;
    pub const KEY_B: BlockId = 8;
    pub const DOOR_R: BlockId = 23;
    pub const DOOR_G: BlockId = 24;
    pub const DOOR_B: BlockId = 25;
    pub const GATE_R: BlockId = 26;
    pub const GATE_G: BlockId = 27;
    pub const GATE_B: BlockId = 28;
    pub const COINDOOR: BlockId = 43;
    pub const COINGATE: BlockId = 165;
    pub const SECRET: BlockId = 50;
    pub const COIN: BlockId = 100;
    pub const TELEPORTER: BlockId = 242;
    pub const SPAWN: BlockId = 255;
    pub const CHECKPOINT: BlockId = 360;
    pub const SPIKES: BlockId = 361;
    pub const TEXT: BlockId = 1000;
}
