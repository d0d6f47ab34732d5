use std::rc::Rc;

use bw_types::{BlockId, BlockParams, BlockPos};
use bw_world::{CallbackRef, CollisionType, ScriptHooks, StepEffect};
use tracing::error;

use crate::runtime::{param_to_lua_tuple, ScriptRuntime};

/// Concrete [`ScriptHooks`] implementation that dispatches through the
/// Lua functions `env.change_block` registered. Owns no world state of
/// its own; whoever drives physics is responsible for wrapping the call
/// in [`ScriptRuntime::with_game`] first if the invoked callback is
/// expected to touch `env.world.*`.
pub struct LuaScriptHost {
    runtime: Rc<ScriptRuntime>,
}

impl LuaScriptHost {
    pub fn new(runtime: Rc<ScriptRuntime>) -> Self {
        Self { runtime }
    }

    fn function(&self, callback: CallbackRef) -> Option<mlua::Function> {
        match self.runtime.callback_function(callback) {
            Ok(func) => Some(func),
            Err(e) => {
                error!("missing script callback {callback}: {e}");
                None
            }
        }
    }
}

impl ScriptHooks for LuaScriptHost {
    fn on_block_placed(&mut self, callback: CallbackRef, id: BlockId, pos: BlockPos) {
        let Some(func) = self.function(callback) else { return };
        if let Err(e) = func.call::<()>((id, pos.x, pos.y)) {
            error!("on_placed callback for block {id} at ({}, {}) failed: {e}", pos.x, pos.y);
        }
    }

    fn on_intersect(&mut self, callback: CallbackRef, id: BlockId, pos: BlockPos, peer_id: u32) -> StepEffect {
        let Some(func) = self.function(callback) else { return StepEffect::default() };
        let result: mlua::Result<Option<mlua::Table>> = func.call((peer_id, id, pos.x, pos.y));
        match result {
            Ok(Some(table)) => table_to_step_effect(&table).unwrap_or_default(),
            Ok(None) => StepEffect::default(),
            Err(e) => {
                error!("on_intersect callback for block {id} failed: {e}");
                StepEffect::default()
            }
        }
    }

    fn on_intersect_once(&mut self, callback: CallbackRef, id: BlockId, pos: BlockPos, peer_id: u32) {
        let Some(func) = self.function(callback) else { return };
        if let Err(e) = func.call::<()>((peer_id, id, pos.x, pos.y)) {
            error!("on_intersect_once callback for block {id} failed: {e}");
        }
    }

    fn on_collide(&mut self, callback: CallbackRef, id: BlockId, pos: BlockPos, peer_id: u32, is_x: bool) -> CollisionType {
        let Some(func) = self.function(callback) else { return CollisionType::Position };
        let result: mlua::Result<String> = func.call((peer_id, id, pos.x, pos.y, is_x));
        match result.as_deref() {
            Ok("none") => CollisionType::None,
            Ok("velocity") => CollisionType::Velocity,
            Ok("position") => CollisionType::Position,
            Ok(other) => {
                error!("on_collide callback for block {id} returned unrecognised verdict '{other}'");
                CollisionType::Position
            }
            Err(e) => {
                error!("on_collide callback for block {id} failed: {e}");
                CollisionType::Position
            }
        }
    }

    fn on_block_place(&mut self, callback: CallbackRef, id: BlockId, pos: BlockPos, params: &BlockParams) -> bool {
        let Some(func) = self.function(callback) else { return true };
        let (tag, a, b, s) = param_to_lua_tuple(params.clone());
        let result: mlua::Result<bool> = func.call((id, pos.x, pos.y, tag, a, b, s));
        result.unwrap_or_else(|e| {
            error!("on_placed (place-permission) callback for block {id} failed: {e}");
            true
        })
    }
}

/// Reads the optional fields a scripted `on_intersect` handler may set on
/// its returned table: `acc = {x,y}`, `vel = {x,y}`, `teleport = {x,y}`,
/// `suppress_gravity = bool`.
fn table_to_step_effect(table: &mlua::Table) -> mlua::Result<StepEffect> {
    let mut effect = StepEffect::default();
    if let Some(acc) = table.get::<Option<mlua::Table>>("acc")? {
        effect.set_acceleration = Some(bw_types::Vec2f::new(acc.get("x")?, acc.get("y")?));
    }
    if let Some(vel) = table.get::<Option<mlua::Table>>("vel")? {
        effect.set_velocity = Some(bw_types::Vec2f::new(vel.get("x")?, vel.get("y")?));
    }
    if let Some(teleport) = table.get::<Option<mlua::Table>>("teleport")? {
        effect.teleport_to = Some(bw_types::Vec2f::new(teleport.get("x")?, teleport.get("y")?));
    }
    effect.suppress_gravity = table.get::<Option<bool>>("suppress_gravity")?.unwrap_or(false);
    Ok(effect)
}

#[cfg(test)]
mod tests {
    use std::cell::RefCell;

    use bw_world::BlockManager;

    use super::*;

    /// Loads a one-block script pack whose `change_block` body is `body`,
    /// then reads back the callback ref `change_block` stored for
    /// whichever hook the test body sets.
    fn host_with_script(id: BlockId, body: &str, hook: impl Fn(&bw_world::BlockCallbacks) -> Option<CallbackRef>) -> (LuaScriptHost, CallbackRef) {
        let runtime = Rc::new(ScriptRuntime::new(Rc::new(RefCell::new(BlockManager::new()))).unwrap());
        runtime
            .load_script(
                &format!(
                    "env.register_pack({{name='hosttest', default_type='action', blocks={{{id}}}}})
                     env.change_block({id}, {{ {body} }})",
                ),
                "host-test",
            )
            .unwrap();
        let callback = hook(&runtime.blocks().borrow().getprops(id).unwrap().callbacks).expect("callback registered");
        (LuaScriptHost::new(runtime), callback)
    }

    #[test]
    fn on_collide_maps_lua_strings_to_collision_type() {
        let (mut host, callback) = host_with_script(
            9500,
            "on_collide = function(peer, id, x, y, is_x) return 'velocity' end",
            |cb| cb.on_collide,
        );
        let verdict = host.on_collide(callback, 9500, BlockPos::new(1, 1), 7, true);
        assert_eq!(verdict, CollisionType::Velocity);
    }

    #[test]
    fn on_intersect_parses_returned_acceleration_table() {
        let (mut host, callback) = host_with_script(
            9501,
            "on_intersect = function(peer, id, x, y) return {acc = {x = 1.0, y = -2.0}} end",
            |cb| cb.on_intersect,
        );
        let effect = host.on_intersect(callback, 9501, BlockPos::new(1, 1), 7);
        assert_eq!(effect.set_acceleration, Some(bw_types::Vec2f::new(1.0, -2.0)));
    }

    #[test]
    fn missing_callback_ref_falls_back_to_default_effect() {
        let runtime = Rc::new(ScriptRuntime::new(Rc::new(RefCell::new(BlockManager::new()))).unwrap());
        let mut host = LuaScriptHost::new(runtime);
        let effect = host.on_intersect(9999, 1, BlockPos::new(0, 0), 1);
        assert_eq!(effect, StepEffect::default());
    }
}
