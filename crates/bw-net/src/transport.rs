use std::collections::HashMap;
use std::net::SocketAddr;
use std::sync::atomic::{AtomicU32, Ordering};
use std::sync::Arc;
use std::time::{Duration, Instant};

use anyhow::Context;
use bw_protocol::Packet;
use bytes::BytesMut;
use tokio::net::UdpSocket;
use tokio::sync::{mpsc, Mutex};
use tracing::{debug, trace, warn};

use crate::flags::{self, CHANNEL_BULK, CHANNEL_EVENTS};

pub type PeerId = u32;

/// The default port the reference binds when none is configured.
pub const DEFAULT_PORT: u16 = 0xC014;

/// Transport-level frame kinds. These sit below the application's packet
/// action codes (§6.1) and exist only so a bare UDP socket can emulate the
/// reference's ENet connect/disconnect/channel/ack semantics.
#[repr(u8)]
enum FrameKind {
    Connect = 0,
    ConnectAck = 1,
    Unreliable = 2,
    Reliable = 3,
    Ack = 4,
    Disconnect = 5,
}

const RETRANSMIT_INTERVAL: Duration = Duration::from_millis(200);
const MAX_RETRIES: u32 = 15;
/// Target MTU from §6.1; frames above this are still sent (UDP doesn't
/// enforce it) but the server-side batching logic keeps under it.
pub const MTU: usize = 1200;

/// Event delivered by the receive loop to whatever owns the simulation.
/// Takes the place of the reference's `PacketProcessor` callback interface:
/// rather than an object with virtual methods, the receive task forwards
/// these over a channel into the single task that owns World/Player state.
pub enum TransportEvent {
    PeerConnected(PeerId),
    PeerDisconnected(PeerId),
    Packet(PeerId, Packet),
}

struct PendingAck {
    data: Vec<u8>,
    addr: SocketAddr,
    attempts: u32,
    last_sent: Instant,
}

struct PeerState {
    addr: SocketAddr,
    next_seq: HashMap<u8, u32>,
}

/// A UDP-backed multi-channel transport. Only the server role is wired
/// into `bw-server` (the client is an external collaborator per §1/§6.3);
/// the type stays role-symmetric per §4.2's contract so a future client
/// binary can reuse it.
pub struct Transport {
    socket: Arc<UdpSocket>,
    peers: Mutex<HashMap<PeerId, PeerState>>,
    addr_to_peer: Mutex<HashMap<SocketAddr, PeerId>>,
    next_peer_id: AtomicU32,
    pending_acks: Mutex<HashMap<(PeerId, u8, u32), PendingAck>>,
}

impl Transport {
    /// Binds a server-role transport. Accepts connections from any peer
    /// that sends a `Connect` frame.
    pub async fn bind(addr: SocketAddr) -> anyhow::Result<Arc<Self>> {
        let socket = UdpSocket::bind(addr)
            .await
            .with_context(|| format!("binding transport to {addr}"))?;
        Ok(Arc::new(Self {
            socket: Arc::new(socket),
            peers: Mutex::new(HashMap::new()),
            addr_to_peer: Mutex::new(HashMap::new()),
            next_peer_id: AtomicU32::new(1),
            pending_acks: Mutex::new(HashMap::new()),
        }))
    }

    pub fn local_addr(&self) -> std::io::Result<SocketAddr> {
        self.socket.local_addr()
    }

    /// Spawns the receive loop and the reliable-channel retransmit loop.
    /// Mirrors `listenAsync`: a dedicated task polls the socket and pushes
    /// connect/receive/disconnect events to `event_tx`; catches and logs
    /// decode failures instead of tearing down the connection.
    pub fn listen(self: &Arc<Self>, event_tx: mpsc::UnboundedSender<TransportEvent>) {
        let recv_transport = self.clone();
        tokio::spawn(async move { recv_transport.recv_loop(event_tx).await });

        let retransmit_transport = self.clone();
        tokio::spawn(async move { retransmit_transport.retransmit_loop().await });
    }

    async fn recv_loop(self: Arc<Self>, event_tx: mpsc::UnboundedSender<TransportEvent>) {
        let mut buf = vec![0u8; 64 * 1024];
        loop {
            let (n, addr) = match self.socket.recv_from(&mut buf).await {
                Ok(v) => v,
                Err(e) => {
                    warn!("transport recv error: {e}");
                    continue;
                }
            };
            if n == 0 {
                continue;
            }
            if let Err(e) = self.handle_datagram(&buf[..n], addr, &event_tx).await {
                warn!("dropping malformed datagram from {addr}: {e}");
            }
        }
    }

    async fn handle_datagram(
        &self,
        data: &[u8],
        addr: SocketAddr,
        event_tx: &mpsc::UnboundedSender<TransportEvent>,
    ) -> anyhow::Result<()> {
        let kind = *data.first().context("empty frame")?;
        let body = &data[1..];

        if kind == FrameKind::Connect as u8 {
            let peer_id = self.accept_peer(addr).await;
            self.send_raw(addr, &[FrameKind::ConnectAck as u8], &peer_id.to_le_bytes())
                .await;
            let _ = event_tx.send(TransportEvent::PeerConnected(peer_id));
            return Ok(());
        }

        let peer_id = {
            let map = self.addr_to_peer.lock().await;
            match map.get(&addr) {
                Some(id) => *id,
                None => {
                    trace!("datagram from unknown peer {addr}, ignoring");
                    return Ok(());
                }
            }
        };

        if kind == FrameKind::Disconnect as u8 {
            self.remove_peer(peer_id).await;
            let _ = event_tx.send(TransportEvent::PeerDisconnected(peer_id));
            return Ok(());
        }

        if kind == FrameKind::Ack as u8 {
            if body.len() >= 5 {
                let channel = body[0];
                let seq = u32::from_le_bytes(body[1..5].try_into().unwrap());
                self.pending_acks
                    .lock()
                    .await
                    .remove(&(peer_id, channel, seq));
            }
            return Ok(());
        }

        if kind == FrameKind::Reliable as u8 {
            if body.len() < 5 {
                anyhow::bail!("reliable frame too short");
            }
            let channel = body[0];
            let seq = u32::from_le_bytes(body[1..5].try_into().unwrap());
            let mut ack = vec![FrameKind::Ack as u8, channel];
            ack.extend_from_slice(&seq.to_le_bytes());
            self.send_raw(addr, &[], &ack).await;
            let packet = Packet::from_bytes(BytesMut::from(&body[5..]));
            let _ = event_tx.send(TransportEvent::Packet(peer_id, packet));
            return Ok(());
        }

        if kind == FrameKind::Unreliable as u8 {
            let packet = Packet::from_bytes(BytesMut::from(body));
            let _ = event_tx.send(TransportEvent::Packet(peer_id, packet));
            return Ok(());
        }

        anyhow::bail!("unknown frame kind {kind}")
    }

    async fn accept_peer(&self, addr: SocketAddr) -> PeerId {
        let mut addr_map = self.addr_to_peer.lock().await;
        if let Some(existing) = addr_map.get(&addr) {
            return *existing;
        }
        let peer_id = self.next_peer_id.fetch_add(1, Ordering::Relaxed);
        addr_map.insert(addr, peer_id);
        drop(addr_map);
        self.peers.lock().await.insert(
            peer_id,
            PeerState {
                addr,
                next_seq: HashMap::new(),
            },
        );
        debug!("peer {peer_id} connected from {addr}");
        peer_id
    }

    async fn remove_peer(&self, peer_id: PeerId) {
        if let Some(state) = self.peers.lock().await.remove(&peer_id) {
            self.addr_to_peer.lock().await.remove(&state.addr);
        }
        self.pending_acks
            .lock()
            .await
            .retain(|(id, _, _), _| *id != peer_id);
        debug!("peer {peer_id} disconnected");
    }

    pub async fn disconnect(&self, peer_id: PeerId) {
        if let Some(addr) = self.peer_addr(peer_id).await {
            self.send_raw(addr, &[FrameKind::Disconnect as u8], &[]).await;
        }
        self.remove_peer(peer_id).await;
    }

    /// Best-effort close: disconnects every connected peer. The reference
    /// disconnects all peers on drop; Rust's `Drop` cannot run async I/O,
    /// so this is realized as an explicit call from the shutdown path
    /// instead (see `bw-server`'s `main`).
    pub async fn shutdown(&self) {
        let ids: Vec<PeerId> = self.peers.lock().await.keys().copied().collect();
        for id in ids {
            self.disconnect(id).await;
        }
    }

    pub async fn peer_addr(&self, peer_id: PeerId) -> Option<SocketAddr> {
        self.peers.lock().await.get(&peer_id).map(|s| s.addr)
    }

    pub async fn connected_peers(&self) -> Vec<PeerId> {
        self.peers.lock().await.keys().copied().collect()
    }

    /// Encodes `flags` (channel in the low byte, `FLAG_BROADCAST` /
    /// `FLAG_UNRELIABLE` above it per §4.2) and sends `packet` accordingly.
    pub async fn send(&self, peer_id: PeerId, send_flags: u32, packet: &Packet) -> anyhow::Result<()> {
        if flags::is_broadcast(send_flags) {
            let ids = self.connected_peers().await;
            for id in ids {
                self.send_to_one(id, send_flags, packet).await?;
            }
            Ok(())
        } else {
            self.send_to_one(peer_id, send_flags, packet).await
        }
    }

    async fn send_to_one(
        &self,
        peer_id: PeerId,
        send_flags: u32,
        packet: &Packet,
    ) -> anyhow::Result<()> {
        let Some(addr) = self.peer_addr(peer_id).await else {
            return Ok(());
        };
        let channel = flags::channel_of(send_flags);
        let body = packet.as_bytes();

        if flags::is_unreliable(send_flags) {
            let mut frame = Vec::with_capacity(1 + body.len());
            frame.push(FrameKind::Unreliable as u8);
            frame.extend_from_slice(body);
            self.send_raw(addr, &[], &frame).await;
            return Ok(());
        }

        let seq = self.next_seq(peer_id, channel).await;
        let mut frame = Vec::with_capacity(6 + body.len());
        frame.push(FrameKind::Reliable as u8);
        frame.push(channel);
        frame.extend_from_slice(&seq.to_le_bytes());
        frame.extend_from_slice(body);

        self.socket
            .send_to(&frame, addr)
            .await
            .with_context(|| format!("sending to peer {peer_id}"))?;
        self.pending_acks.lock().await.insert(
            (peer_id, channel, seq),
            PendingAck {
                data: frame,
                addr,
                attempts: 0,
                last_sent: Instant::now(),
            },
        );
        Ok(())
    }

    async fn next_seq(&self, peer_id: PeerId, channel: u8) -> u32 {
        let mut peers = self.peers.lock().await;
        let Some(state) = peers.get_mut(&peer_id) else {
            return 0;
        };
        let entry = state.next_seq.entry(channel).or_insert(0);
        let seq = *entry;
        *entry = entry.wrapping_add(1);
        seq
    }

    async fn send_raw(&self, addr: SocketAddr, prefix: &[u8], rest: &[u8]) {
        if prefix.is_empty() {
            let _ = self.socket.send_to(rest, addr).await;
            return;
        }
        let mut frame = Vec::with_capacity(prefix.len() + rest.len());
        frame.extend_from_slice(prefix);
        frame.extend_from_slice(rest);
        let _ = self.socket.send_to(&frame, addr).await;
    }

    async fn retransmit_loop(self: Arc<Self>) {
        let mut ticker = tokio::time::interval(RETRANSMIT_INTERVAL);
        loop {
            ticker.tick().await;
            let now = Instant::now();
            let mut to_drop = Vec::new();
            let mut to_resend = Vec::new();
            {
                let mut pending = self.pending_acks.lock().await;
                for (key, ack) in pending.iter_mut() {
                    if now.duration_since(ack.last_sent) < RETRANSMIT_INTERVAL {
                        continue;
                    }
                    if ack.attempts >= MAX_RETRIES {
                        to_drop.push(key.0);
                        continue;
                    }
                    ack.attempts += 1;
                    ack.last_sent = now;
                    to_resend.push((ack.addr, ack.data.clone()));
                }
                pending.retain(|_, ack| ack.attempts < MAX_RETRIES);
            }
            for (addr, data) in to_resend {
                let _ = self.socket.send_to(&data, addr).await;
            }
            for peer_id in to_drop {
                warn!("peer {peer_id} exceeded retry budget, disconnecting");
                self.remove_peer(peer_id).await;
            }
        }
    }
}

pub const CHANNEL_DEFAULTS: [u8; 2] = [CHANNEL_EVENTS, CHANNEL_BULK];

#[cfg(test)]
mod tests {
    use super::*;
    use bw_protocol::Packet;
    use tokio::net::UdpSocket as RawSocket;

    #[tokio::test]
    async fn connect_and_exchange_reliable_packet() {
        let transport = Transport::bind("127.0.0.1:0".parse().unwrap()).await.unwrap();
        let server_addr = transport.local_addr().unwrap();
        let (tx, mut rx) = mpsc::unbounded_channel();
        transport.listen(tx);

        let client = RawSocket::bind("127.0.0.1:0".parse().unwrap()).await.unwrap();
        client.connect(server_addr).await.unwrap();
        client.send(&[FrameKind::Connect as u8]).await.unwrap();

        let event = rx.recv().await.unwrap();
        let peer_id = match event {
            TransportEvent::PeerConnected(id) => id,
            _ => panic!("expected PeerConnected"),
        };

        let mut ack_buf = [0u8; 16];
        let n = client.recv(&mut ack_buf).await.unwrap();
        assert_eq!(ack_buf[0], FrameKind::ConnectAck as u8);
        assert_eq!(n, 5);

        let mut reliable_frame = vec![FrameKind::Reliable as u8, CHANNEL_EVENTS];
        reliable_frame.extend_from_slice(&0u32.to_le_bytes());
        reliable_frame.extend_from_slice(b"hello");
        client.send(&reliable_frame).await.unwrap();

        let event = rx.recv().await.unwrap();
        match event {
            TransportEvent::Packet(id, packet) => {
                assert_eq!(id, peer_id);
                assert_eq!(packet.as_bytes(), b"hello");
            }
            _ => panic!("expected Packet"),
        }

        let mut ack_frame = [0u8; 16];
        let n = client.recv(&mut ack_frame).await.unwrap();
        assert_eq!(ack_frame[0], FrameKind::Ack as u8);
        let _ = n;
    }

    #[tokio::test]
    async fn send_broadcasts_to_all_connected_peers() {
        let transport = Transport::bind("127.0.0.1:0".parse().unwrap()).await.unwrap();
        let server_addr = transport.local_addr().unwrap();
        let (tx, mut rx) = mpsc::unbounded_channel();
        transport.listen(tx);

        let mut clients = Vec::new();
        for _ in 0..3 {
            let c = RawSocket::bind("127.0.0.1:0".parse().unwrap()).await.unwrap();
            c.connect(server_addr).await.unwrap();
            c.send(&[FrameKind::Connect as u8]).await.unwrap();
            let _ = rx.recv().await.unwrap();
            let mut buf = [0u8; 16];
            let _ = c.recv(&mut buf).await.unwrap();
            clients.push(c);
        }

        let mut pkt = Packet::new();
        pkt.write::<u16>(42);
        transport
            .send(0, flags::FLAG_BROADCAST | flags::FLAG_UNRELIABLE, &pkt)
            .await
            .unwrap();

        for c in &clients {
            let mut buf = [0u8; 16];
            let n = c.recv(&mut buf).await.unwrap();
            assert_eq!(buf[0], FrameKind::Unreliable as u8);
            assert_eq!(&buf[1..n], pkt.as_bytes());
        }
    }
}
