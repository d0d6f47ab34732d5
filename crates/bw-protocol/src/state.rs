/// Per-peer connection state lattice. A peer only ever moves forward on a
/// successful `Hello`/`Join` and snaps back to `Idle` on `Leave` or a world
/// swap; it never skips a rung.
#[derive(Debug, Clone, Copy, PartialEq, Eq, PartialOrd, Ord, Hash)]
pub enum ConnectionState {
    /// Freshly accepted; no `Hello` received yet.
    Invalid,
    /// Authenticated (or authentication not required) and in the lobby.
    Idle,
    /// `Join` accepted, `WorldData` sent, world membership not yet
    /// acknowledged by further gameplay packets.
    WorldJoin,
    /// Fully in-world: physics, chat, and block edits are live.
    WorldPlay,
}

impl ConnectionState {
    /// Whether a packet whose declared minimum state is `required` may be
    /// dispatched while the peer is in `self`.
    pub fn satisfies(self, required: ConnectionState) -> bool {
        self >= required
    }
}

impl Default for ConnectionState {
    fn default() -> Self {
        ConnectionState::Invalid
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn lattice_is_monotonic() {
        assert!(ConnectionState::WorldPlay.satisfies(ConnectionState::Idle));
        assert!(!ConnectionState::Idle.satisfies(ConnectionState::WorldPlay));
        assert!(ConnectionState::Idle.satisfies(ConnectionState::Idle));
    }
}
