//! Per-world simulation worker (§5): one OS thread and a current-thread
//! Tokio runtime per loaded world, since the Lua VM backing a world's
//! scripts is `!Send`. Reached only through a `WorldCommand` channel handed
//! out by `Environment::world_channel`; nothing outside this module ever
//! touches a `World` or a `ScriptRuntime` directly.

use std::cell::RefCell;
use std::collections::HashMap;
use std::rc::Rc;
use std::sync::Arc;
use std::time::Duration;

use bw_net::{PeerId, CHANNEL_BULK, CHANNEL_EVENTS, FLAG_UNRELIABLE};
use bw_protocol::{
    BlockPlacement, EventArg, LobbyEntry, Packet, Packet2Client, PeerPhysics, Physics,
    ScriptEventEntry,
};
use bw_scripting::{LuaScriptHost, ScriptRuntime};
use bw_types::{Block, BlockId, BlockParams, BlockPos, PlayerFlags, Vec2f};
use bw_world::{
    BlockManager, DrawType, Layer, NullHooks, Player, ScriptHooks, World, WorldDrawType, WorldMeta,
};
use tokio::sync::{mpsc, oneshot};
use tracing::{debug, error, info, warn};

use crate::commands::{self, CommandContext, CommandOutcome};
use crate::environment::SharedEnv;
use crate::media::MediaAssetSource;
use crate::ratelimit::TokenBucket;

/// Entrypoint asset every world's script host tries to load at startup,
/// matching the reference's `assets/scripts/main.lua` convention. A world
/// with no such asset simply runs unscripted past the hardcoded packs.
const ENTRYPOINT_SCRIPT: &str = "main.lua";

/// Fallback block ID used as the solid border of a world that could not be
/// loaded from any source, matching the `9` the EELVL remap table already
/// treats as "plain solid" (§4.11).
const FALLBACK_BORDER_BLOCK: BlockId = 9;
const FALLBACK_WIDTH: u16 = 50;
const FALLBACK_HEIGHT: u16 = 50;

/// A request routed to a specific world's simulation loop. Built directly
/// from a decoded `Packet2Server` variant at the WorldJoin/WorldPlay tier,
/// plus the lobby/shutdown control messages the environment needs.
pub enum WorldCommand {
    Join {
        peer_id: PeerId,
        name: String,
    },
    Leave {
        peer_id: PeerId,
    },
    Move {
        peer_id: PeerId,
        physics: Physics,
    },
    Chat {
        peer_id: PeerId,
        text: String,
    },
    PlaceBlock {
        peer_id: PeerId,
        placements: Vec<(u16, u16, BlockId, u8)>,
    },
    OnTouchBlock {
        peer_id: PeerId,
        x: u16,
        y: u16,
    },
    GodMode {
        peer_id: PeerId,
        enabled: bool,
    },
    Smiley {
        peer_id: PeerId,
        smiley_id: u8,
    },
    /// Answers a `GetLobby` request with this world's lobby-row snapshot.
    Describe {
        respond: oneshot::Sender<Option<LobbyEntry>>,
    },
    Shutdown,
}

struct RateLimits {
    blocks: TokenBucket,
    chat: TokenBucket,
    events: TokenBucket,
}

struct Session {
    player: Player,
    limits: RateLimits,
}

/// Spawns the worker thread for `world_id` and returns the channel handle
/// plus its join handle. The thread owns a current-thread Tokio runtime so
/// the tick loop can still `select!` between the command channel and a
/// tick interval without pulling the script host across threads.
pub fn spawn(world_id: String, shared: Arc<SharedEnv>) -> (mpsc::UnboundedSender<WorldCommand>, std::thread::JoinHandle<()>) {
    let (tx, rx) = mpsc::unbounded_channel();
    let thread = std::thread::Builder::new()
        .name(format!("world-{world_id}"))
        .spawn(move || {
            let runtime = tokio::runtime::Builder::new_current_thread()
                .enable_all()
                .build()
                .expect("failed to build per-world tokio runtime");
            runtime.block_on(run(world_id, shared, rx));
        })
        .expect("failed to spawn world worker thread");
    (tx, thread)
}

async fn run(world_id: String, shared: Arc<SharedEnv>, mut rx: mpsc::UnboundedReceiver<WorldCommand>) {
    let blocks = Rc::new(RefCell::new(BlockManager::new()));
    let script = match ScriptRuntime::new(blocks.clone()) {
        Ok(rt) => {
            rt.set_asset_source(Rc::new(MediaAssetSource(shared.media.clone())));
            if let Some(bytes) = shared.media.read(ENTRYPOINT_SCRIPT) {
                let source = String::from_utf8_lossy(&bytes).into_owned();
                if let Err(e) = rt.load_script(&source, ENTRYPOINT_SCRIPT) {
                    error!(world = %world_id, error = %e, "world entrypoint script failed to load");
                }
            } else {
                debug!(world = %world_id, entrypoint = ENTRYPOINT_SCRIPT, "no entrypoint asset, world runs unscripted beyond hardcoded packs");
            }
            Some(Rc::new(rt))
        }
        Err(e) => {
            warn!(world = %world_id, error = %e, "script runtime failed to start, world runs unscripted");
            None
        }
    };
    let mut host: Box<dyn ScriptHooks> = match &script {
        Some(rt) => Box::new(LuaScriptHost::new(rt.clone())),
        None => Box::new(NullHooks),
    };

    let mut world = load_world(&world_id, &shared, &blocks.borrow());
    world.mark_all_modified(0);

    let mut sessions: HashMap<PeerId, Session> = HashMap::new();
    let tick_rate = shared.config.tick_rate.max(1);
    let mut ticker = tokio::time::interval(Duration::from_secs_f64(1.0 / tick_rate as f64));
    ticker.set_missed_tick_behavior(tokio::time::MissedTickBehavior::Delay);

    info!(world = %world_id, "world worker started");

    loop {
        tokio::select! {
            _ = ticker.tick() => {
                tick(&world_id, &shared, &mut world, &blocks.borrow(), host.as_mut(), script.as_ref(), &mut sessions, 1.0 / tick_rate as f64).await;
            }
            cmd = rx.recv() => {
                match cmd {
                    Some(WorldCommand::Shutdown) | None => break,
                    Some(cmd) => {
                        handle_command(&world_id, &shared, &mut world, &blocks.borrow(), host.as_mut(), &mut sessions, cmd).await;
                    }
                }
            }
        }
    }

    if matches!(world.meta.draw_type, bw_world::WorldDrawType::Persistent) {
        let mut store = shared.world_store.lock().unwrap();
        if let Err(e) = store.save(&world) {
            error!(world = %world_id, error = %e, "failed to save world on shutdown");
        }
    }
    info!(world = %world_id, "world worker stopped");
}

fn load_world(world_id: &str, shared: &SharedEnv, blocks: &BlockManager) -> World {
    let draw_type = WorldDrawType::from_id(world_id).unwrap_or(WorldDrawType::TmpDraw);

    if matches!(draw_type, WorldDrawType::Persistent) {
        let store = shared.world_store.lock().unwrap();
        match store.load(world_id, None, blocks) {
            Ok(Some(world)) => return world,
            Ok(None) => debug!(world = %world_id, "no stored row, starting fresh"),
            Err(e) => error!(world = %world_id, error = %e, "world store load failed"),
        }
    }

    if matches!(draw_type, WorldDrawType::Readonly) {
        let import_dir = std::path::Path::new(&shared.config.import_dir);
        if let Some(path) = bw_eelvl::find_world_path(import_dir, world_id) {
            match std::fs::read(&path) {
                Ok(bytes) => match bw_eelvl::import_file(&bytes, world_id, None, blocks) {
                    Ok(world) => return world,
                    Err(e) => error!(world = %world_id, error = %e, "eelvl import failed"),
                },
                Err(e) => error!(world = %world_id, path = %path.display(), error = %e, "failed to read eelvl file"),
            }
        } else {
            warn!(world = %world_id, "no eelvl file found for readonly world");
        }
    }

    let meta = WorldMeta::new(world_id.to_string(), "server");
    World::create_dummy(FALLBACK_WIDTH, FALLBACK_HEIGHT, meta.clone(), FALLBACK_BORDER_BLOCK)
        .unwrap_or_else(|_| World::create_empty(FALLBACK_WIDTH, FALLBACK_HEIGHT, meta).expect("fallback world size is always valid"))
}

async fn handle_command(
    world_id: &str,
    shared: &Arc<SharedEnv>,
    world: &mut World,
    blocks: &BlockManager,
    hooks: &mut dyn ScriptHooks,
    sessions: &mut HashMap<PeerId, Session>,
    cmd: WorldCommand,
) {
    match cmd {
        WorldCommand::Join { peer_id, name } => join(world_id, shared, world, sessions, peer_id, name).await,
        WorldCommand::Leave { peer_id } => leave(world_id, shared, world, sessions, peer_id).await,
        WorldCommand::Move { peer_id, physics } => on_move(shared, world, blocks, hooks, sessions, peer_id, physics),
        WorldCommand::Chat { peer_id, text } => on_chat(world_id, shared, world, blocks, sessions, peer_id, text).await,
        WorldCommand::PlaceBlock { peer_id, placements } => {
            on_place_block(world_id, shared, world, blocks, hooks, sessions, peer_id, placements).await
        }
        WorldCommand::OnTouchBlock { peer_id, x, y } => on_touch_block(world, sessions, peer_id, x, y),
        WorldCommand::GodMode { peer_id, enabled } => on_godmode(world_id, shared, sessions, peer_id, enabled).await,
        WorldCommand::Smiley { peer_id, smiley_id } => on_smiley(world_id, shared, sessions, peer_id, smiley_id).await,
        WorldCommand::Describe { respond } => {
            let _ = respond.send(Some(describe(world_id, world)));
        }
        WorldCommand::Shutdown => unreachable!("handled by the select loop before reaching here"),
    }
}

fn describe(world_id: &str, world: &World) -> LobbyEntry {
    LobbyEntry {
        world_id: world_id.to_string(),
        width: world.width(),
        height: world.height(),
        title: world.meta.title.clone(),
        owner: world.meta.owner.clone(),
        online: world.meta.online.min(u32::from(u16::MAX)) as u16,
        plays: world.meta.total_plays,
    }
}

async fn join(
    world_id: &str,
    shared: &Arc<SharedEnv>,
    world: &mut World,
    sessions: &mut HashMap<PeerId, Session>,
    peer_id: PeerId,
    name: String,
) {
    let spawn = Vec2f::new(f32::from(world.width()) / 2.0, f32::from(world.height()) / 2.0);
    let flags = world.meta.get_player_flags(&name);
    let player = Player::new(peer_id, name.clone(), world_id.to_string(), spawn);
    let physics = physics_of(&player);

    // Tell the joiner about every peer already here before it learns about
    // itself, then broadcast its own arrival to the rest of the world.
    for (other_id, session) in sessions.iter() {
        let msg = Packet2Client::Join {
            peer_id: *other_id,
            name: session.player.name.clone(),
            physics: physics_of(&session.player),
        };
        send_reliable_events(shared, peer_id, &msg);
    }

    let world_data = Packet2Client::WorldData {
        width: world.width(),
        height: world.height(),
        blocks: world_blocks(world),
    };
    send_reliable_events(shared, peer_id, &world_data);

    let meta_msg = Packet2Client::WorldMeta {
        title: world.meta.title.clone(),
        owner: world.meta.owner.clone(),
        is_public: world.meta.is_public,
    };
    send_reliable_events(shared, peer_id, &meta_msg);

    let flags_msg = Packet2Client::PlayerFlags {
        new_flags: flags.flags,
        mask: u32::MAX,
    };
    send_reliable_events(shared, peer_id, &flags_msg);

    let replay = Packet2Client::ChatReplay {
        lines: world.meta.chat_history().cloned().collect(),
    };
    send_reliable_events(shared, peer_id, &replay);

    let join_msg = Packet2Client::Join { peer_id, name: name.clone(), physics };
    broadcast_reliable_events(shared, sessions.keys().copied(), &join_msg);

    sessions.insert(
        peer_id,
        Session {
            player,
            limits: RateLimits {
                blocks: TokenBucket::new(shared.config.rate_blocks_per_sec, shared.config.rate_blocks_burst),
                chat: TokenBucket::new(shared.config.rate_chat_per_sec, shared.config.rate_chat_burst),
                events: TokenBucket::new(shared.config.rate_events_per_sec, shared.config.rate_events_burst),
            },
        },
    );
    world.meta.online = sessions.len() as u32;
    world.meta.total_plays += 1;

    if let Some(session) = shared.players.lock().unwrap().get_mut(&peer_id) {
        session.state = bw_protocol::ConnectionState::WorldPlay;
        session.world_id = Some(world_id.to_string());
    }

    info!(world = %world_id, %peer_id, %name, "player joined");
}

async fn leave(world_id: &str, shared: &Arc<SharedEnv>, world: &mut World, sessions: &mut HashMap<PeerId, Session>, peer_id: PeerId) {
    if sessions.remove(&peer_id).is_none() {
        return;
    }
    world.meta.online = sessions.len() as u32;
    let msg = Packet2Client::Leave { peer_id };
    broadcast_reliable_events(shared, sessions.keys().copied(), &msg);
    info!(world = %world_id, %peer_id, "player left");
}

fn on_move(
    shared: &Arc<SharedEnv>,
    world: &mut World,
    blocks: &BlockManager,
    hooks: &mut dyn ScriptHooks,
    sessions: &mut HashMap<PeerId, Session>,
    peer_id: PeerId,
    physics: Physics,
) {
    let Some(session) = sessions.get_mut(&peer_id) else { return };
    let before = session.player.snapshot();
    let reported = bw_world::KinematicSnapshot {
        pos: Vec2f::new(physics.px, physics.py),
        vel: Vec2f::new(physics.vx, physics.vy),
        acc: Vec2f::new(physics.ax, physics.ay),
    };
    let dtime = 1.0 / shared.config.tick_rate.max(1) as f32;
    let score = session.player.anticheat_replay(before, reported, dtime, world, blocks, hooks);
    session.player.cheat_score += score;

    if session.player.cheat_score > shared.config.anticheat_kick {
        warn!(%peer_id, score = session.player.cheat_score, "anti-cheat score exceeded kick threshold");
        let transport = shared.transport.clone();
        tokio::spawn(async move { transport.disconnect(peer_id).await });
        return;
    }
    if session.player.cheat_score > shared.config.anticheat_teleport_back {
        session.player.pos = before.pos;
        session.player.vel = Vec2f::zero();
        let correction = Packet2Client::SetPosition { physics: physics_of(&session.player) };
        send_reliable_events(shared, peer_id, &correction);
    } else {
        session.player.pos = reported.pos;
        session.player.vel = reported.vel;
        session.player.acc = reported.acc;
    }
}

async fn on_chat(
    world_id: &str,
    shared: &Arc<SharedEnv>,
    world: &mut World,
    blocks: &BlockManager,
    sessions: &mut HashMap<PeerId, Session>,
    peer_id: PeerId,
    text: String,
) {
    if text.chars().any(|c| (c as u32) < 0x20) {
        send_reliable_events(shared, peer_id, &Packet2Client::Message { text: "chat message contains control characters".into() });
        return;
    }
    let Some(limits_ok) = sessions.get_mut(&peer_id).map(|s| s.limits.chat.take()) else { return };
    if !limits_ok {
        return;
    }

    if let Some(rest) = text.strip_prefix('/') {
        let (name, flags) = {
            let session = &sessions[&peer_id];
            (session.player.name.clone(), session.player.flags)
        };
        let mut ctx = CommandContext {
            world,
            blocks,
            shared,
            world_id,
            peer_id,
            actor_name: name,
            actor_flags: flags,
        };
        let outcome = commands::dispatch(&mut ctx, rest);
        match outcome {
            CommandOutcome::Reply(msg) => {
                send_reliable_events(shared, peer_id, &Packet2Client::Message { text: msg });
            }
            CommandOutcome::Broadcast(msg) => {
                let wrapped = Packet2Client::Message { text: msg };
                broadcast_reliable_events(shared, sessions.keys().copied(), &wrapped);
            }
            CommandOutcome::SetFlags { peer_id: target_peer, flags: new_flags } => {
                if let Some(session) = sessions.get_mut(&target_peer) {
                    session.player.flags = new_flags;
                }
                let msg = Packet2Client::PlayerFlags { new_flags: new_flags.flags, mask: u32::MAX };
                send_reliable_events(shared, target_peer, &msg);
            }
            CommandOutcome::Respawn => {
                if let Some(session) = sessions.get_mut(&peer_id) {
                    let spawn = Vec2f::new(f32::from(world.width()) / 2.0, f32::from(world.height()) / 2.0);
                    session.player.pos = spawn;
                    session.player.vel = Vec2f::zero();
                    session.player.acc = Vec2f::zero();
                    let msg = Packet2Client::SetPosition { physics: physics_of(&session.player) };
                    send_reliable_events(shared, peer_id, &msg);
                }
            }
            CommandOutcome::None => {}
        }
        return;
    }

    let name = sessions[&peer_id].player.name.clone();
    if sessions[&peer_id].player.flags.check(PlayerFlags::PF_TMP_MUTED) {
        return;
    }
    world.meta.push_chat(format!("{name}: {text}"));
    let msg = Packet2Client::Chat { peer_id, text };
    broadcast_bulk(shared, sessions.keys().copied(), &msg);
}

async fn on_place_block(
    world_id: &str,
    shared: &Arc<SharedEnv>,
    world: &mut World,
    blocks: &BlockManager,
    hooks: &mut dyn ScriptHooks,
    sessions: &mut HashMap<PeerId, Session>,
    peer_id: PeerId,
    placements: Vec<(u16, u16, BlockId, u8)>,
) {
    let Some(session) = sessions.get(&peer_id) else { return };
    if !session.player.flags.check(PlayerFlags::PF_MASK_EDIT) {
        return;
    }
    for (x, y, id, param1) in placements {
        if !sessions.get_mut(&peer_id).map(|s| s.limits.blocks.take()).unwrap_or(false) {
            continue;
        }
        let pos = BlockPos::new(x, y);
        let layer = blocks
            .getprops(id)
            .map(|p| if p.draw_type == DrawType::Background { Layer::Background } else { Layer::Foreground })
            .unwrap_or(Layer::Foreground);
        let params = if param1 == 0 { BlockParams::None } else { BlockParams::U8(param1) };
        match world.update_block(pos, layer, id, 0, params, peer_id, blocks) {
            Ok(_) => {
                if let Some(props) = blocks.getprops(id) {
                    if let Some(cb) = props.callbacks.on_placed {
                        hooks.on_block_placed(cb, id, pos);
                    }
                }
            }
            Err(e) => warn!(world = %world_id, %peer_id, %x, %y, error = %e, "rejected block placement"),
        }
    }
}

fn on_touch_block(world: &mut World, sessions: &mut HashMap<PeerId, Session>, peer_id: PeerId, x: u16, y: u16) {
    let Some(_session) = sessions.get(&peer_id) else { return };
    let _ = world.get_block(BlockPos::new(x, y), Layer::Foreground);
    // Key/kill triggers run through the normal physics step's block-step
    // callbacks; an explicit client-reported touch is only a hint used for
    // client-side prediction reconciliation and carries no further effect
    // of its own.
}

async fn on_godmode(world_id: &str, shared: &Arc<SharedEnv>, sessions: &mut HashMap<PeerId, Session>, peer_id: PeerId, enabled: bool) {
    let Some(session) = sessions.get_mut(&peer_id) else { return };
    if enabled && !session.player.flags.check(PlayerFlags::PF_MASK_GODMODE) {
        debug!(world = %world_id, %peer_id, "godmode request denied, missing flag");
        return;
    }
    session.player.godmode = enabled;
    let msg = Packet2Client::GodMode { peer_id, enabled };
    broadcast_reliable_events(shared, sessions.keys().copied(), &msg);
}

async fn on_smiley(world_id: &str, shared: &Arc<SharedEnv>, sessions: &mut HashMap<PeerId, Session>, peer_id: PeerId, smiley_id: u8) {
    let Some(session) = sessions.get_mut(&peer_id) else { return };
    session.player.smiley_id = u16::from(smiley_id);
    debug!(world = %world_id, %peer_id, %smiley_id, "smiley changed");
    let msg = Packet2Client::Smiley { peer_id, smiley_id };
    broadcast_reliable_events(shared, sessions.keys().copied(), &msg);
}

/// One tick: steps every player's physics, drains the block queue, drains
/// pending script events, and broadcasts the results to this world's
/// roster. Never uses the transport's global broadcast flag (§4.7.3) —
/// only peers actually in `sessions` hear about this world's updates.
async fn tick(
    world_id: &str,
    shared: &Arc<SharedEnv>,
    world: &mut World,
    blocks: &BlockManager,
    hooks: &mut dyn ScriptHooks,
    script: Option<&Rc<ScriptRuntime>>,
    sessions: &mut HashMap<PeerId, Session>,
    dtime: f64,
) {
    if sessions.is_empty() {
        let _ = world.drain_queue();
        return;
    }

    let mut peer_physics = Vec::with_capacity(sessions.len());
    for session in sessions.values_mut() {
        session.player.step(dtime as f32, world, blocks, hooks);
        peer_physics.push(PeerPhysics { peer_id: session.player.peer_id, physics: physics_of(&session.player) });
    }
    let move_msg = Packet2Client::Move { peers: peer_physics };
    broadcast_unreliable(shared, sessions.keys().copied(), &move_msg);

    let updates = world.drain_queue();
    if !updates.is_empty() {
        let placements = updates
            .into_iter()
            .map(|u| BlockPlacement { peer_id: u.placer, x: u.pos.x, y: u.pos.y, id: u.id, param1: param_as_u8(&u.params) })
            .collect();
        let msg = Packet2Client::PlaceBlock { placements };
        broadcast_reliable_events(shared, sessions.keys().copied(), &msg);
    }

    drain_script_events(shared, script, sessions);
}

/// Drains this tick's script-queued events straight out of the script
/// host's `EventOutbox` (targeted sends per peer, plus recipient-less
/// broadcasts fanned out to the whole roster) and forwards each batch as
/// a `ScriptEvent` packet. A world that failed to start its script host
/// has no outbox and never calls this with `Some`.
fn drain_script_events(shared: &Arc<SharedEnv>, script: Option<&Rc<ScriptRuntime>>, sessions: &HashMap<PeerId, Session>) {
    let Some(script) = script else {
        return;
    };
    let mut outbox = script.outbox().borrow_mut();
    if outbox.is_empty() {
        return;
    }

    for peer_id in sessions.keys().copied() {
        let pending = outbox.drain_for(peer_id);
        if pending.is_empty() {
            continue;
        }
        let events = pending.into_iter().map(convert_event).collect();
        send_reliable_events(shared, peer_id, &Packet2Client::ScriptEvent { events });
    }

    let broadcasts = outbox.drain_broadcasts();
    if !broadcasts.is_empty() {
        let events = broadcasts.into_iter().map(convert_event).collect();
        broadcast_reliable_events(shared, sessions.keys().copied(), &Packet2Client::ScriptEvent { events });
    }
}

fn convert_event(pending: bw_events::PendingEvent) -> ScriptEventEntry {
    ScriptEventEntry {
        event_id: pending.id,
        actor: pending.actor,
        args: pending.args.into_iter().map(convert_arg).collect(),
    }
}

fn convert_arg(arg: bw_events::ArgValue) -> EventArg {
    match arg {
        bw_events::ArgValue::U8(v) => EventArg::U8(v),
        bw_events::ArgValue::Str16(s) => EventArg::Str16(s),
        bw_events::ArgValue::U8x3(a) => EventArg::U8x3(a),
    }
}

fn param_as_u8(params: &BlockParams) -> u8 {
    match params {
        BlockParams::U8(v) => *v,
        _ => 0,
    }
}

fn world_blocks(world: &World) -> Vec<Block> {
    let mut out = Vec::with_capacity(world.width() as usize * world.height() as usize);
    for y in 0..world.height() {
        for x in 0..world.width() {
            out.push(world.get_block(BlockPos::new(x, y), Layer::Foreground).unwrap_or_default());
        }
    }
    out
}

fn physics_of(player: &Player) -> Physics {
    Physics {
        px: player.pos.x,
        py: player.pos.y,
        vx: player.vel.x,
        vy: player.vel.y,
        ax: player.acc.x,
        ay: player.acc.y,
    }
}

fn send_reliable_events(shared: &Arc<SharedEnv>, peer_id: PeerId, msg: &Packet2Client) {
    send_one(shared, peer_id, CHANNEL_EVENTS, false, msg);
}

fn broadcast_reliable_events(shared: &Arc<SharedEnv>, peers: impl Iterator<Item = PeerId>, msg: &Packet2Client) {
    for peer_id in peers {
        send_one(shared, peer_id, CHANNEL_EVENTS, false, msg);
    }
}

fn broadcast_bulk(shared: &Arc<SharedEnv>, peers: impl Iterator<Item = PeerId>, msg: &Packet2Client) {
    for peer_id in peers {
        send_one(shared, peer_id, CHANNEL_BULK, false, msg);
    }
}

fn broadcast_unreliable(shared: &Arc<SharedEnv>, peers: impl Iterator<Item = PeerId>, msg: &Packet2Client) {
    for peer_id in peers {
        send_one(shared, peer_id, CHANNEL_EVENTS, true, msg);
    }
}

fn send_one(shared: &Arc<SharedEnv>, peer_id: PeerId, channel: u8, unreliable: bool, msg: &Packet2Client) {
    let mut packet = Packet::new();
    if let Err(e) = msg.encode(&mut packet) {
        error!(%peer_id, error = %e, "failed to encode outgoing packet");
        return;
    }
    let mut flags = u32::from(channel);
    if unreliable {
        flags |= FLAG_UNRELIABLE;
    }
    let transport = shared.transport.clone();
    tokio::spawn(async move {
        if let Err(e) = transport.send(peer_id, flags, &packet).await {
            debug!(%peer_id, error = %e, "send failed, peer likely disconnected");
        }
    });
}
