use std::collections::HashMap;
use std::sync::{Arc, Mutex};

use bw_net::{PeerId, Transport};
use bw_persistence::{Account, AuthStore, WorldStore};
use bw_protocol::ConnectionState;
use tokio::sync::mpsc;

use crate::config::ServerConfig;
use crate::media::MediaIndex;
use crate::world_worker::WorldCommand;

/// Per-connection bookkeeping the dispatcher needs before (and alongside)
/// the world it's playing in. Mirrors §3's Player fields that live above
/// the world boundary: identity, state, and the auth handshake in flight.
pub struct PeerSession {
    pub state: ConnectionState,
    pub data_version: u16,
    pub name: Option<String>,
    pub world_id: Option<String>,
    pub account: Option<Account>,
    pub auth_challenge: Option<Vec<u8>>,
}

impl PeerSession {
    fn new() -> Self {
        Self {
            state: ConnectionState::Invalid,
            data_version: bw_types::PROTOCOL_VERSION,
            name: None,
            world_id: None,
            account: None,
            auth_challenge: None,
        }
    }
}

/// The handles every world worker thread needs, bundled so spawning one
/// doesn't require threading eight separate Arcs through every call site.
/// Deliberately excludes the world registry itself: a world thread has no
/// business discovering or addressing its siblings except through a
/// `GetLobby` query routed back through the dispatcher.
pub struct SharedEnv {
    pub config: Arc<ServerConfig>,
    pub transport: Arc<Transport>,
    pub auth: Arc<Mutex<AuthStore>>,
    pub world_store: Arc<Mutex<WorldStore>>,
    pub players: Arc<Mutex<HashMap<PeerId, PeerSession>>>,
    pub media: Arc<MediaIndex>,
}

struct WorldWorkerHandle {
    tx: mpsc::UnboundedSender<WorldCommand>,
    #[allow(dead_code)]
    thread: std::thread::JoinHandle<()>,
}

/// Owns the connection + player map and the registry of live worlds.
/// `players_lock` (here, `shared.players`) is held across packet dispatch
/// per §5; a world mutex is never taken while holding it, only the other
/// way around (the world threads take their own lock on `players` after
/// finishing their own work, never while the dispatcher is mid-lookup).
pub struct Environment {
    pub shared: Arc<SharedEnv>,
    worlds: Mutex<HashMap<String, WorldWorkerHandle>>,
}

impl Environment {
    pub fn new(shared: Arc<SharedEnv>) -> Self {
        Self {
            shared,
            worlds: Mutex::new(HashMap::new()),
        }
    }

    pub fn register_peer(&self, peer_id: PeerId) {
        self.shared
            .players
            .lock()
            .unwrap()
            .insert(peer_id, PeerSession::new());
    }

    pub fn remove_peer(&self, peer_id: PeerId) -> Option<PeerSession> {
        self.shared.players.lock().unwrap().remove(&peer_id)
    }

    pub fn is_name_online(&self, name: &str) -> bool {
        self.shared
            .players
            .lock()
            .unwrap()
            .values()
            .any(|p| p.name.as_deref().is_some_and(|n| n.eq_ignore_ascii_case(name)))
    }

    /// Looks up a loaded world's command channel, spawning a fresh worker
    /// thread for it if this is the first join. One OS thread + a
    /// current-thread Tokio runtime per world, per §5: the script host is
    /// "never Send across tasks", so the World/ScriptRuntime pair is
    /// pinned to a single thread and reached only by forwarding commands
    /// over a channel.
    pub fn world_channel(&self, world_id: &str) -> mpsc::UnboundedSender<WorldCommand> {
        let mut worlds = self.worlds.lock().unwrap();
        if let Some(handle) = worlds.get(world_id) {
            return handle.tx.clone();
        }
        let (tx, thread) = crate::world_worker::spawn(world_id.to_string(), self.shared.clone());
        worlds.insert(world_id.to_string(), WorldWorkerHandle { tx: tx.clone(), thread });
        tx
    }

    pub fn loaded_world_ids(&self) -> Vec<String> {
        self.worlds.lock().unwrap().keys().cloned().collect()
    }

    pub fn shutdown(&self) {
        let worlds = self.worlds.lock().unwrap();
        for handle in worlds.values() {
            let _ = handle.tx.send(WorldCommand::Shutdown);
        }
    }
}

/// In-memory `SharedEnv` construction for unit tests elsewhere in this
/// crate that need a `CommandContext` or similar but don't care about real
/// storage or a reachable peer.
#[cfg(test)]
pub mod test_support {
    use super::*;

    pub fn in_memory_shared_env() -> Arc<SharedEnv> {
        let rt = tokio::runtime::Runtime::new().unwrap();
        let transport = rt.block_on(async {
            Transport::bind("127.0.0.1:0".parse().unwrap()).await.unwrap()
        });
        let media_dir = tempfile::tempdir().unwrap();
        let media = MediaIndex::build(media_dir.path(), 7).unwrap();
        Arc::new(SharedEnv {
            config: Arc::new(ServerConfig::default()),
            transport,
            auth: Arc::new(Mutex::new(AuthStore::open_in_memory().unwrap())),
            world_store: Arc::new(Mutex::new(WorldStore::open_in_memory().unwrap())),
            players: Arc::new(Mutex::new(HashMap::new())),
            media: Arc::new(media),
        })
    }
}
