//! Wire protocol: the packet cursor, the connection state lattice, and the
//! typed client↔server payload enums. No transport or dispatch logic lives
//! here — see `bw-net` and `bw-server` for those.

pub mod codec;
pub mod packets;
pub mod state;

pub use codec::{CodecError, CodecResult, Packet, Scalar, STR16_MAX_LEN};
pub use packets::{
    BlockPlacement, EventArg, LobbyEntry, MediaEntry, Packet2Client, Packet2Server, PeerPhysics,
    Physics, ScriptEventEntry, Server2ClientAction, Server2ServerAction,
};
pub use state::ConnectionState;
