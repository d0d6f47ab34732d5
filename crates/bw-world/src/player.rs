use bw_types::{ids, sign, BlockPos, Controls, PlayerFlags, Vec2f};

use crate::block_manager::BlockManager;
use crate::hooks::{CollisionType, ScriptHooks};
use crate::world::{Layer, World};

/// Largest single-step travel distance before `step` recurses on a split
/// `dtime`, preserving collision resolution at high speed (§4.6 step 1).
pub const DISTANCE_STEP: f32 = 0.3;

const NEWTON_DAMPING: f32 = 0.05;
const STOKES_DAMPING: f32 = 0.1;
const FRICTION_ACCEL: f32 = 50.0;
const CONTROL_ACCEL: f32 = 10.0;
const GRAVITY_ACCEL: f32 = 5.0;

/// `dtime` is clamped to this before integration; prevents a stalled
/// connection's backlog from producing a single absurd physics step.
pub const MAX_DTIME: f32 = 2.0;

const ANTICHEAT_BLOCK_MISMATCH: f32 = 10.0;
const ANTICHEAT_ACC_DELTA_SQ: f32 = 1.21;
const ANTICHEAT_ACC_PENALTY: f32 = 50.0;
const ANTICHEAT_VEL_DELTA_SQ: f32 = 1.21;
const ANTICHEAT_VEL_PENALTY: f32 = 25.0;

/// A pseudo-random sequence used for teleporter destination selection,
/// matching the reference's `next_prn`: a small xorshift-style counter,
/// not cryptographic, reseeded per player on join.
#[derive(Debug, Clone, Copy)]
pub struct Prn(u32);

impl Prn {
    pub fn new(seed: u32) -> Self {
        Self(if seed == 0 { 0x9E3779B9 } else { seed })
    }

    pub fn next(&mut self) -> u32 {
        let mut x = self.0;
        x ^= x << 13;
        x ^= x >> 17;
        x ^= x << 5;
        self.0 = x;
        x
    }
}

/// Snapshot of kinematic state used by the anti-cheat replay check: the
/// client's self-reported `(pos, vel, acc)` at the time a `Move` packet
/// arrived.
#[derive(Debug, Clone, Copy, PartialEq)]
pub struct KinematicSnapshot {
    pub pos: Vec2f,
    pub vel: Vec2f,
    pub acc: Vec2f,
}

/// Authoritative per-player state: identity, kinematics, and the
/// bookkeeping physics/anti-cheat need across ticks.
pub struct Player {
    pub peer_id: u32,
    pub name: String,
    pub world_id: String,
    pub pos: Vec2f,
    pub vel: Vec2f,
    pub acc: Vec2f,
    pub controls: Controls,
    pub smiley_id: u16,
    pub coins: u32,
    pub flags: PlayerFlags,
    pub godmode: bool,
    pub collision_this_step: bool,
    prn: Prn,
    /// Anti-cheat probability score. Decays over time, accumulates on a
    /// detected replay mismatch. Thresholds (teleport-back, kick) are
    /// server policy, applied by whoever owns this player's connection.
    pub cheat_score: f32,
}

impl Player {
    pub fn new(peer_id: u32, name: impl Into<String>, world_id: impl Into<String>, spawn: Vec2f) -> Self {
        Self {
            peer_id,
            name: name.into(),
            world_id: world_id.into(),
            pos: spawn,
            vel: Vec2f::zero(),
            acc: Vec2f::new(0.0, GRAVITY_ACCEL),
            controls: Controls::default(),
            smiley_id: 0,
            coins: 0,
            flags: PlayerFlags::default(),
            godmode: false,
            collision_this_step: false,
            prn: Prn::new(peer_id ^ 0xDEAD_BEEF),
            cheat_score: 0.0,
        }
    }

    pub fn next_prn(&mut self) -> u32 {
        self.prn.next()
    }

    pub fn block_pos(&self) -> BlockPos {
        BlockPos::new(self.pos.x.max(0.0) as u16, self.pos.y.max(0.0) as u16)
    }

    pub fn snapshot(&self) -> KinematicSnapshot {
        KinematicSnapshot {
            pos: self.pos,
            vel: self.vel,
            acc: self.acc,
        }
    }

    /// Integrates one physics tick against `world`, recursing on
    /// `DISTANCE_STEP` overruns and invoking `hooks` for any scripted
    /// block callback encountered. `dtime` is not clamped here; callers
    /// (the Move handler, the anti-cheat replay) clamp as appropriate for
    /// their own semantics.
    pub fn step(&mut self, dtime: f32, world: &mut World, blocks: &BlockManager, hooks: &mut dyn ScriptHooks) {
        if dtime <= 0.0 {
            return;
        }

        let travel = (self.acc * 0.5 * dtime + self.vel) * dtime;
        if travel.length() > DISTANCE_STEP {
            let half = dtime * 0.5;
            self.step(half, world, blocks, hooks);
            self.step(half, world, blocks, hooks);
            return;
        }

        self.collision_this_step = false;

        self.pos += travel;
        self.vel += self.acc * dtime;
        self.acc = Vec2f::zero();

        self.acc.x += self.controls.dir_x as f32 * CONTROL_ACCEL;
        self.acc.y += self.controls.dir_y as f32 * CONTROL_ACCEL;

        self.apply_damping_axis(true);
        self.apply_damping_axis(false);
        self.acc.x -= sign(self.vel.x) * dtime * FRICTION_ACCEL;
        self.acc.y -= sign(self.vel.y) * dtime * FRICTION_ACCEL;

        self.clip_to_world(world);

        self.run_block_step(world, blocks, hooks);
        self.resolve_collisions(world, blocks, hooks);

        self.acc.y += GRAVITY_ACCEL;
        self.snap_near_rest();
    }

    fn apply_damping_axis(&mut self, is_x: bool) {
        let v = if is_x { self.vel.x } else { self.vel.y };
        let s = sign(v);
        let newton = NEWTON_DAMPING * v * v * s;
        let stokes = STOKES_DAMPING * v.abs() * s;
        let damping = newton + stokes;
        if is_x {
            self.acc.x -= damping;
        } else {
            self.acc.y -= damping;
        }
    }

    fn clip_to_world(&mut self, world: &World) {
        let max_x = (world.width() as f32 - 1.0).max(0.0);
        let max_y = (world.height() as f32 - 1.0).max(0.0);
        if self.pos.x < 0.0 {
            self.pos.x = 0.0;
            self.vel.x = 0.0;
        } else if self.pos.x > max_x {
            self.pos.x = max_x;
            self.vel.x = 0.0;
        }
        if self.pos.y < 0.0 {
            self.pos.y = 0.0;
            self.vel.y = 0.0;
        } else if self.pos.y > max_y {
            self.pos.y = max_y;
            self.vel.y = 0.0;
        }
    }

    /// Snaps position to the nearest grid line on an axis that has
    /// slowed to near rest, matching the reference's step 9 (avoids a
    /// player resting at a fractional offset visually jittering).
    fn snap_near_rest(&mut self) {
        if self.vel.x.abs() < 0.01 {
            self.pos.x = self.pos.x.round();
        }
        if self.vel.y.abs() < 0.01 {
            self.pos.y = self.pos.y.round();
        }
    }

    /// Invokes the containing block's `step`/`onIntersect` callback, and
    /// the builtin handlers for IDs with hardcoded engine behaviour
    /// (teleporter, coin, spikes, checkpoint) that aren't routed through
    /// the script host at all.
    fn run_block_step(&mut self, world: &mut World, blocks: &BlockManager, hooks: &mut dyn ScriptHooks) {
        let pos = self.block_pos();
        let Some(block) = world.get_block(pos, Layer::Foreground) else {
            return;
        };
        if block.id == 0 {
            return;
        }

        match block.id {
            ids::COIN => {
                self.coins += 1;
                let _ = world.update_block(pos, Layer::Foreground, 0, 0, Default::default(), 0, blocks);
            }
            ids::TELEPORTER => self.run_teleporter(pos, world, blocks),
            ids::SPIKES if !self.godmode => {
                self.vel = Vec2f::zero();
                self.pos = self.respawn_position(world);
            }
            _ => {}
        }

        if let Some(props) = blocks.getprops(block.id) {
            if let Some(cb) = props.callbacks.on_intersect {
                let effect = hooks.on_intersect(cb, block.id, pos, self.peer_id);
                if let Some(a) = effect.set_acceleration {
                    self.acc = a;
                }
                if let Some(v) = effect.set_velocity {
                    self.vel = v;
                }
                if effect.suppress_gravity {
                    self.acc.y -= GRAVITY_ACCEL;
                }
                if let Some(dst) = effect.teleport_to {
                    self.pos = dst;
                    self.vel = Vec2f::zero();
                }
            }
            if let Some(cb) = props.callbacks.on_intersect_once {
                hooks.on_intersect_once(cb, block.id, pos, self.peer_id);
            }
        }
    }

    /// Finds every teleporter sharing this one's `dst_id`, picks one by
    /// `next_prn() % count`, and rotates velocity by the facing delta
    /// (§4.6's teleporter semantics).
    fn run_teleporter(&mut self, pos: BlockPos, world: &mut World, blocks: &BlockManager) {
        let bw_types::BlockParams::Teleporter { rotation: src_rot, dst_id, .. } = world.get_params(pos) else {
            return;
        };

        let mut candidates: Vec<(BlockPos, u8)> = Vec::new();
        for candidate in world.get_blocks(ids::TELEPORTER) {
            if candidate == pos {
                continue;
            }
            if let bw_types::BlockParams::Teleporter { rotation, id, .. } = world.get_params(candidate) {
                if id == dst_id {
                    candidates.push((candidate, rotation));
                }
            }
        }
        if candidates.is_empty() {
            return;
        }

        let _ = blocks;
        let idx = (self.next_prn() as usize) % candidates.len();
        let (dst_pos, dst_rot) = candidates[idx];
        self.pos = Vec2f::new(dst_pos.x as f32, dst_pos.y as f32);

        let turns = ((dst_rot as i32 - src_rot as i32).rem_euclid(4)) as u32;
        for _ in 0..turns {
            let (x, y) = (self.vel.x, self.vel.y);
            self.vel = Vec2f::new(-y, x);
        }
    }

    fn respawn_position(&self, world: &World) -> Vec2f {
        let spawns = world.get_blocks(ids::SPAWN);
        let chosen = spawns.first().copied().unwrap_or_else(|| BlockPos::new(world.width() / 2, world.height() / 2));
        Vec2f::new(chosen.x as f32, chosen.y as f32)
    }

    /// Scans the 3x3 neighbourhood around the player in the direction of
    /// travel and resolves collisions against solid blocks, per §4.6
    /// step 7.
    fn resolve_collisions(&mut self, world: &mut World, blocks: &BlockManager, hooks: &mut dyn ScriptHooks) {
        let center = self.block_pos();
        let dir_x = sign(self.vel.x) as i32;
        let dir_y = sign(self.vel.y) as i32;

        for dy in -1..=1i32 {
            for dx in -1..=1i32 {
                if dx == 0 && dy == 0 {
                    continue;
                }
                if (dir_x != 0 && dx != 0 && dx != dir_x) || (dir_y != 0 && dy != 0 && dy != dir_y) {
                    continue;
                }
                let nx = center.x as i32 + dx;
                let ny = center.y as i32 + dy;
                if nx < 0 || ny < 0 {
                    continue;
                }
                let npos = BlockPos::new(nx as u16, ny as u16);
                self.collide_with(npos, world, blocks, hooks);
            }
        }
    }

    fn collide_with(&mut self, pos: BlockPos, world: &mut World, blocks: &BlockManager, hooks: &mut dyn ScriptHooks) {
        let Some(block) = world.get_block(pos, Layer::Foreground) else {
            return;
        };
        if block.id == 0 || self.godmode {
            return;
        }
        let Some(props) = blocks.getprops(block.id) else {
            return;
        };
        if !props.is_solid() {
            return;
        }

        let overlap_x = 1.0 - (self.pos.x - pos.x as f32).abs();
        let overlap_y = 1.0 - (self.pos.y - pos.y as f32).abs();
        if overlap_x <= 0.0 || overlap_y <= 0.0 {
            return;
        }
        let is_x = overlap_x < overlap_y;

        let verdict = if let Some(cb) = props.callbacks.on_collide {
            hooks.on_collide(cb, block.id, pos, self.peer_id, is_x)
        } else {
            CollisionType::Position
        };

        match verdict {
            CollisionType::None => {}
            CollisionType::Velocity => {
                if is_x {
                    self.vel.x = 0.0;
                } else {
                    self.vel.y = 0.0;
                }
                self.collision_this_step = true;
            }
            CollisionType::Position => {
                if is_x {
                    self.vel.x = 0.0;
                    self.pos.x = if self.pos.x < pos.x as f32 { pos.x as f32 - 1.0 } else { pos.x as f32 + 1.0 };
                } else {
                    self.vel.y = 0.0;
                    self.pos.y = if self.pos.y < pos.y as f32 { pos.y as f32 - 1.0 } else { pos.y as f32 + 1.0 };
                }
                self.collision_this_step = true;
            }
        }
    }

    /// Anti-cheat replay: re-simulates the physics for `dtime` (capped at
    /// `MAX_DTIME`) from `snapshot` and compares the result to what the
    /// client reported. Returns the score delta to add to
    /// `self.cheat_score` (negative values decay the running score).
    pub fn anticheat_replay(
        &self,
        snapshot: KinematicSnapshot,
        reported: KinematicSnapshot,
        dtime: f32,
        world: &mut World,
        blocks: &BlockManager,
        hooks: &mut dyn ScriptHooks,
    ) -> f32 {
        let dtime = dtime.min(MAX_DTIME);
        let mut shadow = Player::new(self.peer_id, &self.name, &self.world_id, snapshot.pos);
        shadow.vel = snapshot.vel;
        shadow.acc = snapshot.acc;
        shadow.controls = self.controls;
        shadow.godmode = self.godmode;
        shadow.step(dtime, world, blocks, hooks);

        let mut score = -dtime;
        if shadow.block_pos() != BlockPos::new(reported.pos.x as u16, reported.pos.y as u16) {
            score += ANTICHEAT_BLOCK_MISMATCH * dtime;
        }
        let dacc = shadow.acc - reported.acc;
        if dacc.length_squared() > ANTICHEAT_ACC_DELTA_SQ {
            score += ANTICHEAT_ACC_PENALTY * dtime;
        }
        let dvel = shadow.vel - reported.vel;
        if dvel.length_squared() > ANTICHEAT_VEL_DELTA_SQ {
            score += ANTICHEAT_VEL_PENALTY * dtime;
        }
        score
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use crate::hooks::NullHooks;
    use crate::world::WorldMeta;

    fn empty_world() -> World {
        World::create_empty(30, 30, WorldMeta::new("Ttest", "alice")).unwrap()
    }

    #[test]
    fn gravity_accelerates_player_downward_over_time() {
        let mut world = empty_world();
        let blocks = BlockManager::new();
        let mut hooks = NullHooks;
        let mut player = Player::new(1, "bob", "Ttest", Vec2f::new(15.0, 5.0));
        let start_y = player.pos.y;
        for _ in 0..20 {
            player.step(0.05, &mut world, &blocks, &mut hooks);
        }
        assert!(player.pos.y > start_y);
    }

    #[test]
    fn player_cannot_leave_world_bounds() {
        let mut world = empty_world();
        let blocks = BlockManager::new();
        let mut hooks = NullHooks;
        let mut player = Player::new(1, "bob", "Ttest", Vec2f::new(0.0, 15.0));
        player.vel = Vec2f::new(-50.0, 0.0);
        for _ in 0..10 {
            player.step(0.1, &mut world, &blocks, &mut hooks);
        }
        assert!(player.pos.x >= 0.0);
        assert_eq!(player.vel.x, 0.0);
    }

    #[test]
    fn solid_block_stops_horizontal_motion() {
        let mut world = empty_world();
        let blocks = BlockManager::new();
        let mut hooks = NullHooks;
        world
            .set_block(BlockPos::new(10, 10), bw_types::Block::new(1), Layer::Foreground, &blocks)
            .unwrap();
        let mut player = Player::new(1, "bob", "Ttest", Vec2f::new(8.0, 10.0));
        player.vel = Vec2f::new(5.0, 0.0);
        for _ in 0..50 {
            player.step(0.05, &mut world, &blocks, &mut hooks);
        }
        assert!(player.pos.x < 10.0);
    }

    #[test]
    fn walking_into_coin_increments_count_and_clears_block() {
        let mut world = empty_world();
        let blocks = BlockManager::new();
        let mut hooks = NullHooks;
        world
            .update_block(BlockPos::new(5, 5), Layer::Foreground, ids::COIN, 0, Default::default(), 0, &blocks)
            .unwrap();
        world.drain_queue();
        let mut player = Player::new(1, "bob", "Ttest", Vec2f::new(5.0, 5.0));
        player.step(0.001, &mut world, &blocks, &mut hooks);
        assert_eq!(player.coins, 1);
        assert_eq!(world.get_block(BlockPos::new(5, 5), Layer::Foreground).unwrap().id, 0);
    }

    #[test]
    fn prn_sequence_is_deterministic_for_a_given_seed() {
        let mut a = Prn::new(42);
        let mut b = Prn::new(42);
        for _ in 0..5 {
            assert_eq!(a.next(), b.next());
        }
    }

    #[test]
    fn anticheat_replay_scores_zero_for_consistent_report() {
        let mut world = empty_world();
        let blocks = BlockManager::new();
        let mut hooks = NullHooks;
        let player = Player::new(1, "bob", "Ttest", Vec2f::new(15.0, 15.0));
        let snapshot = player.snapshot();

        let mut shadow_world = empty_world();
        let mut shadow = Player::new(1, "bob", "Ttest", snapshot.pos);
        shadow.vel = snapshot.vel;
        shadow.acc = snapshot.acc;
        shadow.step(0.05, &mut shadow_world, &blocks, &mut hooks);
        let reported = shadow.snapshot();

        let score = player.anticheat_replay(snapshot, reported, 0.05, &mut world, &blocks, &mut hooks);
        assert!(score < 1.0);
    }

    #[test]
    fn anticheat_replay_flags_a_large_velocity_mismatch() {
        let mut world = empty_world();
        let blocks = BlockManager::new();
        let mut hooks = NullHooks;
        let player = Player::new(1, "bob", "Ttest", Vec2f::new(15.0, 15.0));
        let snapshot = player.snapshot();
        let mut reported = snapshot;
        reported.vel = Vec2f::new(999.0, 999.0);

        let score = player.anticheat_replay(snapshot, reported, 0.05, &mut world, &blocks, &mut hooks);
        assert!(score > 0.0);
    }
}
