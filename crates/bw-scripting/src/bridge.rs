use bw_world::{BlockManager, World};

/// Raw pointers to the world/block-registry state a Lua API function
/// needs while a script callback is running. Set immediately before a
/// synchronous Lua call and cleared immediately after; never retained
/// across a `yield` or stored beyond the call that installed it.
///
/// Safety: the script host and the world it drives run on the same task,
/// and every call through the host is synchronous, so the pointed-to
/// `World`/`BlockManager` are guaranteed to outlive the call. Only
/// accessed from that task.
pub struct LuaGameContext {
    pub world_ptr: *mut World,
    pub blocks_ptr: *const BlockManager,
}

unsafe impl Send for LuaGameContext {}
unsafe impl Sync for LuaGameContext {}

fn context(lua: &mlua::Lua) -> mlua::Result<mlua::AppDataRef<'_, LuaGameContext>> {
    lua.app_data_ref::<LuaGameContext>()
        .ok_or_else(|| mlua::Error::RuntimeError("world API not available outside a script callback".into()))
}

pub fn with_world<F, R>(lua: &mlua::Lua, f: F) -> mlua::Result<R>
where
    F: FnOnce(&mut World) -> R,
{
    let ctx = context(lua)?;
    let world = unsafe { &mut *ctx.world_ptr };
    Ok(f(world))
}

pub fn with_world_and_blocks<F, R>(lua: &mlua::Lua, f: F) -> mlua::Result<R>
where
    F: FnOnce(&mut World, &BlockManager) -> R,
{
    let ctx = context(lua)?;
    let world = unsafe { &mut *ctx.world_ptr };
    let blocks = unsafe { &*ctx.blocks_ptr };
    Ok(f(world, blocks))
}
