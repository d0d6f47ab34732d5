use bw_types::{BlockId, BlockParams, BlockPos, Vec2f};

use crate::block_manager::CallbackRef;

/// How a `onCollide` callback (hardcoded or scripted) wants the engine to
/// resolve a candidate collision. Mirrors the reference's `CollisionType`;
/// `None` means "ignore this collision" (one-way gates, a coin gate the
/// player has enough coins for, decorations).
#[derive(Debug, Clone, Copy, PartialEq)]
pub enum CollisionType {
    None,
    Velocity,
    Position,
}

/// What a scripted `step` callback asked the engine to do to the invoking
/// player's kinematic state. A callback observes and may overwrite
/// acceleration/velocity (arrow acceleration, boosts, freeze) or request a
/// teleport; anything else is left untouched.
#[derive(Debug, Clone, Copy, Default, PartialEq)]
pub struct StepEffect {
    pub set_acceleration: Option<Vec2f>,
    pub set_velocity: Option<Vec2f>,
    pub teleport_to: Option<Vec2f>,
    pub suppress_gravity: bool,
}

/// Callback surface the script host implements so `bw-world`'s physics and
/// block-update code can invoke scripted blocks without depending on
/// `bw-scripting` (and, transitively, `mlua`). Per §9's redesign note, this
/// is passed in explicitly rather than reached through a global singleton;
/// `bw-server` is the only place that owns a concrete implementation.
pub trait ScriptHooks {
    fn on_block_placed(&mut self, callback: CallbackRef, id: BlockId, pos: BlockPos);

    fn on_intersect(&mut self, callback: CallbackRef, id: BlockId, pos: BlockPos, peer_id: u32) -> StepEffect;

    fn on_intersect_once(
        &mut self,
        callback: CallbackRef,
        id: BlockId,
        pos: BlockPos,
        peer_id: u32,
    );

    fn on_collide(
        &mut self,
        callback: CallbackRef,
        id: BlockId,
        pos: BlockPos,
        peer_id: u32,
        is_x: bool,
    ) -> CollisionType;

    fn on_block_place(&mut self, callback: CallbackRef, id: BlockId, pos: BlockPos, params: &BlockParams) -> bool;
}

/// A hook set that does nothing; used by tests and by worlds with no
/// scripts loaded, so every caller can assume a hook set exists.
pub struct NullHooks;

impl ScriptHooks for NullHooks {
    fn on_block_placed(&mut self, _callback: CallbackRef, _id: BlockId, _pos: BlockPos) {}

    fn on_intersect(&mut self, _callback: CallbackRef, _id: BlockId, _pos: BlockPos, _peer_id: u32) -> StepEffect {
        StepEffect::default()
    }

    fn on_intersect_once(&mut self, _callback: CallbackRef, _id: BlockId, _pos: BlockPos, _peer_id: u32) {}

    fn on_collide(
        &mut self,
        _callback: CallbackRef,
        _id: BlockId,
        _pos: BlockPos,
        _peer_id: u32,
        _is_x: bool,
    ) -> CollisionType {
        CollisionType::None
    }

    fn on_block_place(&mut self, _callback: CallbackRef, _id: BlockId, _pos: BlockPos, _params: &BlockParams) -> bool {
        true
    }
}
