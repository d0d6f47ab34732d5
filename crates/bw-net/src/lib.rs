//! Channelled UDP transport: peer bookkeeping, reliable/unreliable framing,
//! and a receive loop that decodes frames into [`bw_protocol::Packet`]s and
//! forwards them to whatever owns the simulation, over a channel.
//!
//! No packet semantics live here — only the framing needed to emulate the
//! reference's ENet-shaped channels (broadcast/unreliable flag bits, two
//! channels per peer) on top of plain UDP.

pub mod flags;
pub mod transport;

pub use flags::{channel_of, is_broadcast, is_unreliable, CHANNEL_BULK, CHANNEL_EVENTS, FLAG_BROADCAST, FLAG_UNRELIABLE};
pub use transport::{PeerId, Transport, TransportEvent, CHANNEL_DEFAULTS, DEFAULT_PORT};
