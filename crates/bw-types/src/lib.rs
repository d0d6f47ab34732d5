//! Shared value types for the block-world server: positions, blocks,
//! tagged block parameters, and the player permission bitfield.
//!
//! These types carry no I/O or behaviour of their own; they are the
//! vocabulary that the protocol, world, and scripting crates all speak.

mod block;
mod flags;
mod params;
mod vec2;

pub use block::{ids, Block, BlockId, BlockPos, BLOCKPOS_INVALID};
pub use flags::{PlayerFlags, Role};
pub use params::{BlockParams, ParamType};
pub use vec2::{sign, Vec2f};

/// Current protocol version implemented by this server.
pub const PROTOCOL_VERSION: u16 = 4;
/// Oldest protocol version this server will still talk to.
pub const PROTOCOL_VERSION_MIN: u16 = 4;

/// Horizontal/vertical/jump input state sent by the client each `Move`.
#[derive(Debug, Clone, Copy, Default, PartialEq, Eq, serde::Serialize, serde::Deserialize)]
pub struct Controls {
    pub dir_x: i8,
    pub dir_y: i8,
    pub jump: bool,
}
