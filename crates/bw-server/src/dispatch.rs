//! Connection-level packet dispatch (§4.7): everything below the
//! WorldJoin/WorldPlay tier, which is handled here directly rather than
//! being forwarded to a world worker — `Hello`, `Auth`, `GetLobby`, `Join`,
//! `FriendAction`, `MediaRequest`, plus `Leave` and peer connect/disconnect
//! bookkeeping. Packets at or above WorldJoin are translated into a
//! `WorldCommand` and handed to whichever world worker owns that peer.

use std::sync::Arc;

use bw_net::{PeerId, Transport, TransportEvent};
use bw_protocol::{ConnectionState, Packet, Packet2Client, Packet2Server, Server2ServerAction};
use bw_types::{PROTOCOL_VERSION, PROTOCOL_VERSION_MIN};
use rand::RngCore;
use tokio::sync::{mpsc, oneshot};
use tracing::{debug, info, warn};

/// Length of the server-issued challenge in `Packet2Client::Auth`, per
/// §4.9's "server sends random 20 bytes".
const AUTH_CHALLENGE_LEN: usize = 20;

use crate::environment::Environment;
use crate::world_worker::WorldCommand;

/// Drives the dispatcher off a `Transport`'s event stream until the
/// channel closes (on shutdown). Owns no state of its own beyond what
/// `Environment` already holds.
pub async fn run(env: Arc<Environment>, mut events: mpsc::UnboundedReceiver<TransportEvent>) {
    while let Some(event) = events.recv().await {
        match event {
            TransportEvent::PeerConnected(peer_id) => {
                info!(peer_id, "peer connected");
                env.register_peer(peer_id);
            }
            TransportEvent::PeerDisconnected(peer_id) => {
                handle_disconnect(&env, peer_id).await;
            }
            TransportEvent::Packet(peer_id, mut packet) => {
                if let Err(e) = handle_packet(&env, peer_id, &mut packet).await {
                    warn!(peer_id, error = %e, "failed to decode inbound packet");
                }
            }
        }
    }
}

async fn handle_disconnect(env: &Arc<Environment>, peer_id: PeerId) {
    info!(peer_id, "peer disconnected");
    if let Some(session) = env.remove_peer(peer_id) {
        if let Some(world_id) = session.world_id {
            let tx = env.world_channel(&world_id);
            let _ = tx.send(WorldCommand::Leave { peer_id });
        }
    }
}

async fn handle_packet(
    env: &Arc<Environment>,
    peer_id: PeerId,
    packet: &mut Packet,
) -> bw_protocol::CodecResult<()> {
    let code: u16 = packet.read()?;
    let Some(action) = Server2ServerAction::from_code(code) else {
        warn!(peer_id, code, "unknown action code");
        return Ok(());
    };

    let required = Packet2Server::min_state(action);
    let state = {
        let players = env.shared.players.lock().unwrap();
        players.get(&peer_id).map(|s| s.state)
    };
    let Some(state) = state else {
        debug!(peer_id, "packet from unregistered peer, dropping");
        return Ok(());
    };
    if !state.satisfies(required) {
        debug!(peer_id, ?action, ?state, ?required, "packet below required state, dropping");
        return Ok(());
    }

    let msg = Packet2Server::decode(action, packet)?;
    match msg {
        Packet2Server::Quack => {}
        Packet2Server::Hello { proto_ver, proto_min, nickname } => {
            handle_hello(env, peer_id, proto_ver, proto_min, nickname).await;
        }
        Packet2Server::Auth { response } => {
            handle_auth(env, peer_id, response).await;
        }
        Packet2Server::GetLobby => {
            handle_get_lobby(env, peer_id).await;
        }
        Packet2Server::Join { world_id } => {
            handle_join(env, peer_id, world_id).await;
        }
        Packet2Server::Leave => {
            handle_leave(env, peer_id).await;
        }
        Packet2Server::Move { physics } => {
            forward(env, peer_id, |peer_id| WorldCommand::Move { peer_id, physics }).await;
        }
        Packet2Server::Chat { text } => {
            forward(env, peer_id, |peer_id| WorldCommand::Chat { peer_id, text }).await;
        }
        Packet2Server::PlaceBlock { placements } => {
            forward(env, peer_id, |peer_id| WorldCommand::PlaceBlock { peer_id, placements }).await;
        }
        Packet2Server::OnTouchBlock { x, y } => {
            forward(env, peer_id, |peer_id| WorldCommand::OnTouchBlock { peer_id, x, y }).await;
        }
        Packet2Server::GodMode { enabled } => {
            forward(env, peer_id, |peer_id| WorldCommand::GodMode { peer_id, enabled }).await;
        }
        Packet2Server::Smiley { smiley_id } => {
            forward(env, peer_id, |peer_id| WorldCommand::Smiley { peer_id, smiley_id }).await;
        }
        Packet2Server::FriendAction { .. } => {
            // Friends lists live client-side in the reference; the server
            // only needs to accept the packet so older clients don't stall.
        }
        Packet2Server::MediaRequest { names } => {
            handle_media_request(env, peer_id, names).await;
        }
    }
    Ok(())
}

/// Routes a WorldJoin/WorldPlay-tier command to whichever world the peer
/// is currently in. Silently drops it if the peer has no recorded world
/// (a race with a `Leave` that's already in flight).
async fn forward(env: &Arc<Environment>, peer_id: PeerId, make: impl FnOnce(PeerId) -> WorldCommand) {
    let world_id = {
        let players = env.shared.players.lock().unwrap();
        players.get(&peer_id).and_then(|s| s.world_id.clone())
    };
    if let Some(world_id) = world_id {
        let tx = env.world_channel(&world_id);
        let _ = tx.send(make(peer_id));
    }
}

async fn handle_hello(env: &Arc<Environment>, peer_id: PeerId, proto_ver: u16, proto_min: u16, nickname: String) {
    let effective = proto_ver.min(PROTOCOL_VERSION);
    let required_min = proto_min.max(PROTOCOL_VERSION_MIN);
    if effective < required_min {
        warn!(peer_id, proto_ver, proto_min, "client protocol version incompatible");
        send(env, peer_id, Packet2Client::Message { text: "incompatible client version".into() }).await;
        disconnect(env, peer_id).await;
        return;
    }
    if nickname.trim().is_empty() || env.is_name_online(&nickname) {
        send(env, peer_id, Packet2Client::Message { text: "nickname unavailable".into() }).await;
        disconnect(env, peer_id).await;
        return;
    }

    let has_account = env.shared.auth.lock().unwrap().load(&nickname).ok().flatten().is_some();

    {
        let mut players = env.shared.players.lock().unwrap();
        if let Some(session) = players.get_mut(&peer_id) {
            session.state = ConnectionState::Idle;
            session.data_version = effective;
            session.name = Some(nickname);
        }
    }
    send(env, peer_id, Packet2Client::Hello { effective_ver: effective, peer_id }).await;

    // A registered account gets a login challenge; an unrecognised name
    // just plays as a guest with whatever flags the world assigns by
    // default (§4.9's `Auth::status` Guest/Unregistered cases).
    if has_account {
        let mut challenge = vec![0u8; AUTH_CHALLENGE_LEN];
        rand::thread_rng().fill_bytes(&mut challenge);
        {
            let mut players = env.shared.players.lock().unwrap();
            if let Some(session) = players.get_mut(&peer_id) {
                session.auth_challenge = Some(challenge.clone());
            }
        }
        send(env, peer_id, Packet2Client::Auth { challenge }).await;
    }
}

/// Verifies a login attempt against whatever challenge `handle_hello`
/// issued. A mismatch or an attempt with no outstanding challenge is
/// treated as a bad-password failure per §7: log, send `Message`, and
/// disconnect rather than silently leaving the peer half-authenticated.
async fn handle_auth(env: &Arc<Environment>, peer_id: PeerId, response: Vec<u8>) {
    let (name, challenge) = {
        let players = env.shared.players.lock().unwrap();
        let Some(session) = players.get(&peer_id) else { return };
        (session.name.clone(), session.auth_challenge.clone())
    };
    let (Some(name), Some(challenge)) = (name, challenge) else {
        warn!(peer_id, "auth response with no outstanding challenge");
        send(env, peer_id, Packet2Client::Message { text: "not expecting a login response".into() }).await;
        disconnect(env, peer_id).await;
        return;
    };

    let account = env.shared.auth.lock().unwrap().load(&name).ok().flatten();
    let Some(account) = account else {
        warn!(peer_id, %name, "auth challenge outstanding but account vanished");
        disconnect(env, peer_id).await;
        return;
    };

    let expected = bw_persistence::auth_store::challenge_response(&account.password, &challenge);
    if expected != response {
        warn!(peer_id, %name, "auth response did not match challenge");
        send(env, peer_id, Packet2Client::Message { text: "login failed".into() }).await;
        disconnect(env, peer_id).await;
        return;
    }

    let mut players = env.shared.players.lock().unwrap();
    if let Some(session) = players.get_mut(&peer_id) {
        session.account = Some(account);
        session.auth_challenge = None;
    }
    info!(peer_id, %name, "player authenticated");
}

async fn handle_get_lobby(env: &Arc<Environment>, peer_id: PeerId) {
    let world_ids = env.loaded_world_ids();
    let mut worlds = Vec::with_capacity(world_ids.len());
    for world_id in world_ids {
        let tx = env.world_channel(&world_id);
        let (respond, rx) = oneshot::channel();
        if tx.send(WorldCommand::Describe { respond }).is_err() {
            continue;
        }
        if let Ok(Some(entry)) = rx.await {
            worlds.push(entry);
        }
    }
    send(env, peer_id, Packet2Client::Lobby { worlds }).await;
}

async fn handle_join(env: &Arc<Environment>, peer_id: PeerId, world_id: String) {
    let name = {
        let players = env.shared.players.lock().unwrap();
        players.get(&peer_id).and_then(|s| s.name.clone())
    };
    let Some(name) = name else {
        return;
    };

    {
        let mut players = env.shared.players.lock().unwrap();
        if let Some(session) = players.get_mut(&peer_id) {
            session.state = ConnectionState::WorldJoin;
            session.world_id = Some(world_id.clone());
        }
    }

    let tx = env.world_channel(&world_id);
    let _ = tx.send(WorldCommand::Join { peer_id, name });
}

async fn handle_leave(env: &Arc<Environment>, peer_id: PeerId) {
    let world_id = {
        let mut players = env.shared.players.lock().unwrap();
        let world_id = players.get(&peer_id).and_then(|s| s.world_id.clone());
        if let Some(session) = players.get_mut(&peer_id) {
            session.state = ConnectionState::Idle;
            session.world_id = None;
        }
        world_id
    };
    if let Some(world_id) = world_id {
        let tx = env.world_channel(&world_id);
        let _ = tx.send(WorldCommand::Leave { peer_id });
    }
}

async fn handle_media_request(env: &Arc<Environment>, peer_id: PeerId, names: Vec<String>) {
    if names.is_empty() {
        let entries = env.shared.media.list();
        send(env, peer_id, Packet2Client::MediaList { entries }).await;
        return;
    }
    for name in names {
        if let Some(chunk) = env.shared.media.read(&name) {
            send(env, peer_id, Packet2Client::MediaReceive { name, chunk }).await;
        }
    }
}

async fn send(env: &Arc<Environment>, peer_id: PeerId, msg: Packet2Client) {
    let mut packet = Packet::new();
    if let Err(e) = msg.encode(&mut packet) {
        warn!(peer_id, error = %e, "failed to encode outbound packet");
        return;
    }
    let transport: Arc<Transport> = env.shared.transport.clone();
    if let Err(e) = transport.send(peer_id, bw_net::CHANNEL_EVENTS as u32, &packet).await {
        debug!(peer_id, error = %e, "send failed, peer likely gone");
    }
}

async fn disconnect(env: &Arc<Environment>, peer_id: PeerId) {
    env.shared.transport.disconnect(peer_id).await;
}
