use bw_types::{Block, BlockId};

use crate::codec::{CodecError, CodecResult, Packet};
use crate::state::ConnectionState;

/// A player's full kinematic state as carried on `Join`/`Move` packets.
#[derive(Debug, Clone, Copy, PartialEq, Default)]
pub struct Physics {
    pub px: f32,
    pub py: f32,
    pub vx: f32,
    pub vy: f32,
    pub ax: f32,
    pub ay: f32,
}

impl Physics {
    fn read(p: &mut Packet) -> CodecResult<Self> {
        Ok(Self {
            px: p.read()?,
            py: p.read()?,
            vx: p.read()?,
            vy: p.read()?,
            ax: p.read()?,
            ay: p.read()?,
        })
    }

    fn write(&self, p: &mut Packet) {
        p.write(self.px);
        p.write(self.py);
        p.write(self.vx);
        p.write(self.vy);
        p.write(self.ax);
        p.write(self.ay);
    }
}

/// One entry in a batched `PlaceBlock` packet.
#[derive(Debug, Clone, PartialEq)]
pub struct BlockPlacement {
    pub peer_id: u32,
    pub x: u16,
    pub y: u16,
    pub id: BlockId,
    pub param1: u8,
}

/// One entry in a batched `Move` packet.
#[derive(Debug, Clone, Copy, PartialEq)]
pub struct PeerPhysics {
    pub peer_id: u32,
    pub physics: Physics,
}

/// One entry in a `Lobby` packet.
#[derive(Debug, Clone, PartialEq)]
pub struct LobbyEntry {
    pub world_id: String,
    pub width: u16,
    pub height: u16,
    pub title: String,
    pub owner: String,
    pub online: u16,
    pub plays: u32,
}

/// One `(name, size, hash64)` entry in a `MediaList` packet.
#[derive(Debug, Clone, PartialEq)]
pub struct MediaEntry {
    pub name: String,
    pub size: u32,
    pub hash64: u64,
}

/// A single typed argument of a script event, tagged for wire transit.
/// Mirrors `bw_events::ArgType`'s three shapes without pulling in that
/// crate's validation machinery — this layer only moves bytes.
#[derive(Debug, Clone, PartialEq)]
pub enum EventArg {
    U8(u8),
    Str16(String),
    U8x3([u8; 3]),
}

impl EventArg {
    fn tag(&self) -> u8 {
        match self {
            EventArg::U8(_) => 0,
            EventArg::Str16(_) => 1,
            EventArg::U8x3(_) => 2,
        }
    }

    fn read(p: &mut Packet) -> CodecResult<Self> {
        let tag: u8 = p.read()?;
        Ok(match tag {
            0 => EventArg::U8(p.read()?),
            1 => EventArg::Str16(p.read_str16()?),
            2 => EventArg::U8x3([p.read()?, p.read()?, p.read()?]),
            _ => {
                return Err(CodecError::OutOfRange {
                    wanted: 2,
                    remaining: tag as usize,
                })
            }
        })
    }

    fn write(&self, p: &mut Packet) {
        p.write(self.tag());
        match self {
            EventArg::U8(v) => p.write(*v),
            EventArg::Str16(s) => {
                // Event argument strings are validated against the
                // declared arity before this is reached; length overflow
                // here would indicate a script bug, not a wire error.
                let _ = p.write_str16(s);
            }
            EventArg::U8x3(vs) => {
                p.write(vs[0]);
                p.write(vs[1]);
                p.write(vs[2]);
            }
        }
    }
}

/// One batched script event, delivered to a recipient peer's
/// `env.event_handlers[event_id]` on the client.
#[derive(Debug, Clone, PartialEq)]
pub struct ScriptEventEntry {
    pub event_id: u16,
    pub actor: Option<u32>,
    pub args: Vec<EventArg>,
}

impl ScriptEventEntry {
    fn read(p: &mut Packet) -> CodecResult<Self> {
        let event_id: u16 = p.read()?;
        let has_actor: u8 = p.read()?;
        let actor = if has_actor == 1 {
            Some(p.read()?)
        } else {
            None
        };
        let arg_count: u8 = p.read()?;
        let mut args = Vec::with_capacity(arg_count as usize);
        for _ in 0..arg_count {
            args.push(EventArg::read(p)?);
        }
        Ok(Self {
            event_id,
            actor,
            args,
        })
    }

    fn write(&self, p: &mut Packet) {
        p.write(self.event_id);
        match self.actor {
            Some(peer_id) => {
                p.write::<u8>(1);
                p.write(peer_id);
            }
            None => p.write::<u8>(0),
        }
        p.write(self.args.len() as u8);
        for arg in &self.args {
            arg.write(p);
        }
    }
}

macro_rules! action_enum {
    ($name:ident { $($variant:ident = $code:expr),* $(,)? }) => {
        #[derive(Debug, Clone, Copy, PartialEq, Eq, Hash)]
        #[repr(u16)]
        pub enum $name {
            $($variant = $code),*
        }

        impl $name {
            pub fn from_code(code: u16) -> Option<Self> {
                match code {
                    $($code => Some(Self::$variant),)*
                    _ => None,
                }
            }

            pub fn code(self) -> u16 {
                self as u16
            }
        }
    };
}

// Action codes kept in sync with the server/client packet handler dispatch
// tables: index position is the wire value, never reordered.
action_enum!(Server2ServerAction {
    Quack = 0,
    Hello = 1,
    Auth = 2,
    GetLobby = 3,
    Join = 4,
    Leave = 5,
    Move = 6,
    Chat = 7,
    PlaceBlock = 8,
    OnTouchBlock = 9,
    GodMode = 10,
    Smiley = 11,
    FriendAction = 12,
    MediaRequest = 13,
});

action_enum!(Server2ClientAction {
    Quack = 0,
    Hello = 1,
    Message = 2,
    Auth = 3,
    Lobby = 4,
    WorldData = 5,
    Join = 6,
    Leave = 7,
    SetPosition = 8,
    Move = 9,
    Chat = 10,
    PlaceBlock = 11,
    Key = 12,
    GodMode = 13,
    Smiley = 14,
    PlayerFlags = 15,
    WorldMeta = 16,
    ChatReplay = 17,
    MediaList = 18,
    MediaReceive = 19,
    ScriptEvent = 20,
});

/// A packet sent from client to server, decoded to its typed payload.
#[derive(Debug, Clone, PartialEq)]
pub enum Packet2Server {
    Quack,
    Hello {
        proto_ver: u16,
        proto_min: u16,
        nickname: String,
    },
    Auth {
        response: Vec<u8>,
    },
    GetLobby,
    Join {
        world_id: String,
    },
    Leave,
    Move {
        physics: Physics,
    },
    Chat {
        text: String,
    },
    PlaceBlock {
        placements: Vec<(u16, u16, BlockId, u8)>,
    },
    OnTouchBlock {
        x: u16,
        y: u16,
    },
    GodMode {
        enabled: bool,
    },
    Smiley {
        smiley_id: u8,
    },
    FriendAction {
        action: u8,
        target: String,
    },
    MediaRequest {
        names: Vec<String>,
    },
}

impl Packet2Server {
    /// The connection state a peer must be at or past for this packet to
    /// be dispatched. Packets below this mark are logged and discarded.
    pub fn min_state(action: Server2ServerAction) -> ConnectionState {
        use ConnectionState::*;
        use Server2ServerAction::*;
        match action {
            Quack | Hello | MediaRequest => Invalid,
            Auth | GetLobby | Join | FriendAction => Idle,
            Leave => WorldJoin,
            Move | Chat | PlaceBlock | OnTouchBlock | GodMode | Smiley => WorldPlay,
        }
    }

    pub fn action(&self) -> Server2ServerAction {
        use Server2ServerAction as A;
        match self {
            Packet2Server::Quack => A::Quack,
            Packet2Server::Hello { .. } => A::Hello,
            Packet2Server::Auth { .. } => A::Auth,
            Packet2Server::GetLobby => A::GetLobby,
            Packet2Server::Join { .. } => A::Join,
            Packet2Server::Leave => A::Leave,
            Packet2Server::Move { .. } => A::Move,
            Packet2Server::Chat { .. } => A::Chat,
            Packet2Server::PlaceBlock { .. } => A::PlaceBlock,
            Packet2Server::OnTouchBlock { .. } => A::OnTouchBlock,
            Packet2Server::GodMode { .. } => A::GodMode,
            Packet2Server::Smiley { .. } => A::Smiley,
            Packet2Server::FriendAction { .. } => A::FriendAction,
            Packet2Server::MediaRequest { .. } => A::MediaRequest,
        }
    }

    pub fn decode(action: Server2ServerAction, p: &mut Packet) -> CodecResult<Self> {
        use Server2ServerAction as A;
        Ok(match action {
            A::Quack => Packet2Server::Quack,
            A::Hello => Packet2Server::Hello {
                proto_ver: p.read()?,
                proto_min: p.read()?,
                nickname: p.read_str16()?,
            },
            A::Auth => {
                let len: u16 = p.read()?;
                Packet2Server::Auth {
                    response: p.read_raw(len as usize)?,
                }
            }
            A::GetLobby => Packet2Server::GetLobby,
            A::Join => Packet2Server::Join {
                world_id: p.read_str16()?,
            },
            A::Leave => Packet2Server::Leave,
            A::Move => Packet2Server::Move {
                physics: Physics::read(p)?,
            },
            A::Chat => Packet2Server::Chat {
                text: p.read_str16()?,
            },
            A::PlaceBlock => {
                let mut placements = Vec::new();
                while p.read::<u8>()? == 1 {
                    let x: u16 = p.read()?;
                    let y: u16 = p.read()?;
                    let id: BlockId = p.read()?;
                    let param1: u8 = p.read()?;
                    placements.push((x, y, id, param1));
                }
                Packet2Server::PlaceBlock { placements }
            }
            A::OnTouchBlock => Packet2Server::OnTouchBlock {
                x: p.read()?,
                y: p.read()?,
            },
            A::GodMode => Packet2Server::GodMode {
                enabled: p.read()?,
            },
            A::Smiley => Packet2Server::Smiley {
                smiley_id: p.read()?,
            },
            A::FriendAction => Packet2Server::FriendAction {
                action: p.read()?,
                target: p.read_str16()?,
            },
            A::MediaRequest => {
                let mut names = Vec::new();
                loop {
                    let name = p.read_str16()?;
                    if name.is_empty() {
                        break;
                    }
                    names.push(name);
                }
                Packet2Server::MediaRequest { names }
            }
        })
    }

    pub fn encode(&self, p: &mut Packet) -> CodecResult<()> {
        p.write(self.action().code());
        match self {
            Packet2Server::Quack | Packet2Server::GetLobby | Packet2Server::Leave => {}
            Packet2Server::Hello {
                proto_ver,
                proto_min,
                nickname,
            } => {
                p.write(*proto_ver);
                p.write(*proto_min);
                p.write_str16(nickname)?;
            }
            Packet2Server::Auth { response } => {
                p.write(response.len() as u16);
                p.write_raw(response);
            }
            Packet2Server::Join { world_id } => p.write_str16(world_id)?,
            Packet2Server::Move { physics } => physics.write(p),
            Packet2Server::Chat { text } => p.write_str16(text)?,
            Packet2Server::PlaceBlock { placements } => {
                for (x, y, id, param1) in placements {
                    p.write::<u8>(1);
                    p.write(*x);
                    p.write(*y);
                    p.write(*id);
                    p.write(*param1);
                }
                p.write::<u8>(0);
            }
            Packet2Server::OnTouchBlock { x, y } => {
                p.write(*x);
                p.write(*y);
            }
            Packet2Server::GodMode { enabled } => p.write(*enabled),
            Packet2Server::Smiley { smiley_id } => p.write(*smiley_id),
            Packet2Server::FriendAction { action, target } => {
                p.write(*action);
                p.write_str16(target)?;
            }
            Packet2Server::MediaRequest { names } => {
                for name in names {
                    p.write_str16(name)?;
                }
                p.write_str16("")?;
            }
        }
        Ok(())
    }
}

/// A packet sent from server to client, decoded to its typed payload.
#[derive(Debug, Clone, PartialEq)]
pub enum Packet2Client {
    Quack,
    Hello {
        effective_ver: u16,
        peer_id: u32,
    },
    Message {
        text: String,
    },
    Auth {
        challenge: Vec<u8>,
    },
    Lobby {
        worlds: Vec<LobbyEntry>,
    },
    WorldData {
        width: u16,
        height: u16,
        blocks: Vec<Block>,
    },
    WorldReset,
    Join {
        peer_id: u32,
        name: String,
        physics: Physics,
    },
    Leave {
        peer_id: u32,
    },
    SetPosition {
        physics: Physics,
    },
    Move {
        peers: Vec<PeerPhysics>,
    },
    Chat {
        peer_id: u32,
        text: String,
    },
    PlaceBlock {
        placements: Vec<BlockPlacement>,
    },
    Key {
        peer_id: u32,
        key_id: u8,
        enabled: bool,
    },
    GodMode {
        peer_id: u32,
        enabled: bool,
    },
    Smiley {
        peer_id: u32,
        smiley_id: u8,
    },
    PlayerFlags {
        new_flags: u32,
        mask: u32,
    },
    WorldMeta {
        title: String,
        owner: String,
        is_public: bool,
    },
    ChatReplay {
        lines: Vec<String>,
    },
    MediaList {
        entries: Vec<MediaEntry>,
    },
    MediaReceive {
        name: String,
        chunk: Vec<u8>,
    },
    /// Batched script events, drained from the world's per-peer outbox
    /// once per tick and delivered alongside the rest of the step loop.
    ScriptEvent {
        events: Vec<ScriptEventEntry>,
    },
}

impl Packet2Client {
    pub fn action(&self) -> Server2ClientAction {
        use Server2ClientAction as A;
        match self {
            Packet2Client::Quack => A::Quack,
            Packet2Client::Hello { .. } => A::Hello,
            Packet2Client::Message { .. } => A::Message,
            Packet2Client::Auth { .. } => A::Auth,
            Packet2Client::Lobby { .. } => A::Lobby,
            Packet2Client::WorldData { .. } | Packet2Client::WorldReset => A::WorldData,
            Packet2Client::Join { .. } => A::Join,
            Packet2Client::Leave { .. } => A::Leave,
            Packet2Client::SetPosition { .. } => A::SetPosition,
            Packet2Client::Move { .. } => A::Move,
            Packet2Client::Chat { .. } => A::Chat,
            Packet2Client::PlaceBlock { .. } => A::PlaceBlock,
            Packet2Client::Key { .. } => A::Key,
            Packet2Client::GodMode { .. } => A::GodMode,
            Packet2Client::Smiley { .. } => A::Smiley,
            Packet2Client::PlayerFlags { .. } => A::PlayerFlags,
            Packet2Client::WorldMeta { .. } => A::WorldMeta,
            Packet2Client::ChatReplay { .. } => A::ChatReplay,
            Packet2Client::MediaList { .. } => A::MediaList,
            Packet2Client::MediaReceive { .. } => A::MediaReceive,
            Packet2Client::ScriptEvent { .. } => A::ScriptEvent,
        }
    }

    pub fn encode(&self, p: &mut Packet) -> CodecResult<()> {
        p.write(self.action().code());
        match self {
            Packet2Client::Quack => {}
            Packet2Client::Hello {
                effective_ver,
                peer_id,
            } => {
                p.write(*effective_ver);
                p.write(*peer_id);
            }
            Packet2Client::Message { text } => p.write_str16(text)?,
            Packet2Client::Auth { challenge } => {
                p.write(challenge.len() as u16);
                p.write_raw(challenge);
            }
            Packet2Client::Lobby { worlds } => {
                for w in worlds {
                    p.write::<u8>(1);
                    p.write_str16(&w.world_id)?;
                    p.write(w.width);
                    p.write(w.height);
                    p.write_str16(&w.title)?;
                    p.write_str16(&w.owner)?;
                    p.write(w.online);
                    p.write(w.plays);
                }
                p.write::<u8>(0);
            }
            Packet2Client::WorldData {
                width,
                height,
                blocks,
            } => {
                p.write::<u8>(1);
                p.write(*width);
                p.write(*height);
                for b in blocks {
                    p.write(b.id);
                }
                p.write::<u8>(0xF8);
            }
            Packet2Client::WorldReset => p.write::<u8>(0),
            Packet2Client::Join {
                peer_id,
                name,
                physics,
            } => {
                p.write(*peer_id);
                p.write_str16(name)?;
                physics.write(p);
            }
            Packet2Client::Leave { peer_id } => p.write(*peer_id),
            Packet2Client::SetPosition { physics } => physics.write(p),
            Packet2Client::Move { peers } => {
                for pp in peers {
                    p.write::<u8>(1);
                    p.write(pp.peer_id);
                    pp.physics.write(p);
                }
                p.write::<u8>(0);
            }
            Packet2Client::Chat { peer_id, text } => {
                p.write(*peer_id);
                p.write_str16(text)?;
            }
            Packet2Client::PlaceBlock { placements } => {
                for bp in placements {
                    p.write::<u8>(1);
                    p.write(bp.peer_id);
                    p.write(bp.x);
                    p.write(bp.y);
                    p.write(bp.id);
                    p.write(bp.param1);
                }
                p.write::<u8>(0);
            }
            Packet2Client::Key {
                peer_id,
                key_id,
                enabled,
            } => {
                p.write(*peer_id);
                p.write(*key_id);
                p.write(*enabled);
            }
            Packet2Client::GodMode { peer_id, enabled } => {
                p.write(*peer_id);
                p.write(*enabled);
            }
            Packet2Client::Smiley { peer_id, smiley_id } => {
                p.write(*peer_id);
                p.write(*smiley_id);
            }
            Packet2Client::PlayerFlags { new_flags, mask } => {
                p.write(*new_flags);
                p.write(*mask);
            }
            Packet2Client::WorldMeta {
                title,
                owner,
                is_public,
            } => {
                p.write_str16(title)?;
                p.write_str16(owner)?;
                p.write(*is_public);
            }
            Packet2Client::ChatReplay { lines } => {
                for line in lines {
                    p.write_str16(line)?;
                }
                p.write_str16("")?;
            }
            Packet2Client::MediaList { entries } => {
                for e in entries {
                    p.write_str16(&e.name)?;
                    p.write(e.size);
                    p.write(e.hash64);
                }
                p.write_str16("")?;
            }
            Packet2Client::MediaReceive { name, chunk } => {
                p.write_str16(name)?;
                p.write(chunk.len() as u32);
                p.write_raw(chunk);
            }
            Packet2Client::ScriptEvent { events } => {
                for event in events {
                    p.write::<u8>(1);
                    event.write(p);
                }
                p.write::<u8>(0);
            }
        }
        Ok(())
    }

    pub fn decode(action: Server2ClientAction, p: &mut Packet) -> CodecResult<Self> {
        use Server2ClientAction as A;
        Ok(match action {
            A::Quack => Packet2Client::Quack,
            A::Hello => Packet2Client::Hello {
                effective_ver: p.read()?,
                peer_id: p.read()?,
            },
            A::Message => Packet2Client::Message {
                text: p.read_str16()?,
            },
            A::Auth => {
                let len: u16 = p.read()?;
                Packet2Client::Auth {
                    challenge: p.read_raw(len as usize)?,
                }
            }
            A::Lobby => {
                let mut worlds = Vec::new();
                while p.read::<u8>()? == 1 {
                    worlds.push(LobbyEntry {
                        world_id: p.read_str16()?,
                        width: p.read()?,
                        height: p.read()?,
                        title: p.read_str16()?,
                        owner: p.read_str16()?,
                        online: p.read()?,
                        plays: p.read()?,
                    });
                }
                Packet2Client::Lobby { worlds }
            }
            A::WorldData => {
                if p.read::<u8>()? == 0 {
                    Packet2Client::WorldReset
                } else {
                    let width: u16 = p.read()?;
                    let height: u16 = p.read()?;
                    let mut blocks = Vec::with_capacity(width as usize * height as usize);
                    for _ in 0..(width as usize * height as usize) {
                        blocks.push(Block::new(p.read()?));
                    }
                    let terminator: u8 = p.read()?;
                    if terminator != 0xF8 {
                        return Err(CodecError::OutOfRange {
                            wanted: 0xF8,
                            remaining: terminator as usize,
                        });
                    }
                    Packet2Client::WorldData {
                        width,
                        height,
                        blocks,
                    }
                }
            }
            A::Join => Packet2Client::Join {
                peer_id: p.read()?,
                name: p.read_str16()?,
                physics: Physics::read(p)?,
            },
            A::Leave => Packet2Client::Leave { peer_id: p.read()? },
            A::SetPosition => Packet2Client::SetPosition {
                physics: Physics::read(p)?,
            },
            A::Move => {
                let mut peers = Vec::new();
                while p.read::<u8>()? == 1 {
                    peers.push(PeerPhysics {
                        peer_id: p.read()?,
                        physics: Physics::read(p)?,
                    });
                }
                Packet2Client::Move { peers }
            }
            A::Chat => Packet2Client::Chat {
                peer_id: p.read()?,
                text: p.read_str16()?,
            },
            A::PlaceBlock => {
                let mut placements = Vec::new();
                while p.read::<u8>()? == 1 {
                    placements.push(BlockPlacement {
                        peer_id: p.read()?,
                        x: p.read()?,
                        y: p.read()?,
                        id: p.read()?,
                        param1: p.read()?,
                    });
                }
                Packet2Client::PlaceBlock { placements }
            }
            A::Key => Packet2Client::Key {
                peer_id: p.read()?,
                key_id: p.read()?,
                enabled: p.read()?,
            },
            A::GodMode => Packet2Client::GodMode {
                peer_id: p.read()?,
                enabled: p.read()?,
            },
            A::Smiley => Packet2Client::Smiley {
                peer_id: p.read()?,
                smiley_id: p.read()?,
            },
            A::PlayerFlags => Packet2Client::PlayerFlags {
                new_flags: p.read()?,
                mask: p.read()?,
            },
            A::WorldMeta => Packet2Client::WorldMeta {
                title: p.read_str16()?,
                owner: p.read_str16()?,
                is_public: p.read()?,
            },
            A::ChatReplay => {
                let mut lines = Vec::new();
                loop {
                    let line = p.read_str16()?;
                    if line.is_empty() {
                        break;
                    }
                    lines.push(line);
                }
                Packet2Client::ChatReplay { lines }
            }
            A::MediaList => {
                let mut entries = Vec::new();
                loop {
                    let name = p.read_str16()?;
                    if name.is_empty() {
                        break;
                    }
                    entries.push(MediaEntry {
                        name,
                        size: p.read()?,
                        hash64: p.read()?,
                    });
                }
                Packet2Client::MediaList { entries }
            }
            A::MediaReceive => {
                let name = p.read_str16()?;
                let len: u32 = p.read()?;
                Packet2Client::MediaReceive {
                    name,
                    chunk: p.read_raw(len as usize)?,
                }
            }
            A::ScriptEvent => {
                let mut events = Vec::new();
                while p.read::<u8>()? == 1 {
                    events.push(ScriptEventEntry::read(p)?);
                }
                Packet2Client::ScriptEvent { events }
            }
        })
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn hello_roundtrip() {
        let pkt = Packet2Server::Hello {
            proto_ver: 4,
            proto_min: 4,
            nickname: "noodle".into(),
        };
        let mut buf = Packet::new();
        pkt.encode(&mut buf).unwrap();
        let code: u16 = buf.read().unwrap();
        let action = Server2ServerAction::from_code(code).unwrap();
        assert_eq!(action, Server2ServerAction::Hello);
        assert_eq!(Packet2Server::decode(action, &mut buf).unwrap(), pkt);
    }

    #[test]
    fn place_block_batch_roundtrip() {
        let pkt = Packet2Server::PlaceBlock {
            placements: vec![(1, 2, 9, 0), (3, 4, 0, 0)],
        };
        let mut buf = Packet::new();
        pkt.encode(&mut buf).unwrap();
        let code: u16 = buf.read().unwrap();
        let action = Server2ServerAction::from_code(code).unwrap();
        assert_eq!(Packet2Server::decode(action, &mut buf).unwrap(), pkt);
    }

    #[test]
    fn world_data_roundtrip() {
        let pkt = Packet2Client::WorldData {
            width: 2,
            height: 1,
            blocks: vec![Block::air(), Block::new(9)],
        };
        let mut buf = Packet::new();
        pkt.encode(&mut buf).unwrap();
        let code: u16 = buf.read().unwrap();
        let action = Server2ClientAction::from_code(code).unwrap();
        assert_eq!(Packet2Client::decode(action, &mut buf).unwrap(), pkt);
    }

    #[test]
    fn script_event_batch_roundtrip() {
        let pkt = Packet2Client::ScriptEvent {
            events: vec![
                ScriptEventEntry {
                    event_id: 3,
                    actor: Some(7),
                    args: vec![EventArg::U8(9), EventArg::Str16("hi".into())],
                },
                ScriptEventEntry {
                    event_id: 4,
                    actor: None,
                    args: vec![EventArg::U8x3([1, 2, 3])],
                },
            ],
        };
        let mut buf = Packet::new();
        pkt.encode(&mut buf).unwrap();
        let code: u16 = buf.read().unwrap();
        let action = Server2ClientAction::from_code(code).unwrap();
        assert_eq!(Packet2Client::decode(action, &mut buf).unwrap(), pkt);
    }

    #[test]
    fn min_state_gates_gameplay_packets() {
        assert_eq!(
            Packet2Server::min_state(Server2ServerAction::Move),
            ConnectionState::WorldPlay
        );
        assert_eq!(
            Packet2Server::min_state(Server2ServerAction::Hello),
            ConnectionState::Invalid
        );
    }
}
