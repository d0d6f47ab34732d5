use std::cell::{Cell, RefCell};
use std::collections::HashMap;
use std::rc::Rc;

use bw_events::{ArgType, ArgValue, EventId, EventOutbox, EventRegistry};
use bw_world::{BlockManager, BlockPack, CallbackRef, DrawType, Layer, PositionRange, World};
use bw_types::{BlockId, BlockParams, BlockPos};
use mlua::{Lua, RegistryKey};
use tracing::{error, info};

use crate::bridge::{self, LuaGameContext};
use crate::sandbox;

fn lua_err(e: mlua::Error) -> anyhow::Error {
    anyhow::anyhow!("{}", e)
}

/// Supplies `env.include`'s script text. Implemented in `bw-server` against
/// the media index so this crate never has to know where assets live on
/// disk; a `ScriptRuntime` with no source installed just logs and no-ops on
/// `include`, same as a world with no script host at all.
pub trait AssetSource {
    fn read_script(&self, name: &str) -> Option<String>;
}

/// Per-world Lua host: owns the VM, the stored callback registry keys
/// `env.change_block` hands out, and the typed event registry/outbox
/// pair scripts declare and fill through `register_event`/`send_event`.
///
/// One `ScriptRuntime` per world, not a process-wide singleton (§9's
/// redesign note: script state is local and owned, not reached through
/// a global).
pub struct ScriptRuntime {
    lua: Lua,
    blocks: Rc<RefCell<BlockManager>>,
    events: Rc<RefCell<EventRegistry>>,
    outbox: Rc<RefCell<EventOutbox>>,
    callbacks: Rc<RefCell<HashMap<CallbackRef, RegistryKey>>>,
    next_callback_id: Rc<Cell<CallbackRef>>,
    /// Peer id of whoever is driving the currently executing callback,
    /// if any. `send_event` with no explicit recipient attaches this as
    /// the event's actor, per §4.8.
    current_actor: Rc<Cell<Option<u32>>>,
    assets: Rc<RefCell<Option<Rc<dyn AssetSource>>>>,
}

impl ScriptRuntime {
    pub fn new(blocks: Rc<RefCell<BlockManager>>) -> anyhow::Result<Self> {
        let lua = Lua::new();
        sandbox::install(&lua).map_err(lua_err)?;

        let events = Rc::new(RefCell::new(EventRegistry::new()));
        let outbox = Rc::new(RefCell::new(EventOutbox::new()));
        let callbacks = Rc::new(RefCell::new(HashMap::new()));
        let next_callback_id = Rc::new(Cell::new(1u32));
        let current_actor = Rc::new(Cell::new(None));
        let assets = Rc::new(RefCell::new(None));

        let runtime = Self {
            lua,
            blocks,
            events,
            outbox,
            callbacks,
            next_callback_id,
            current_actor,
            assets,
        };
        runtime.install_env()?;
        Ok(runtime)
    }

    pub fn lua(&self) -> &Lua {
        &self.lua
    }

    pub fn events(&self) -> &Rc<RefCell<EventRegistry>> {
        &self.events
    }

    pub fn blocks(&self) -> &Rc<RefCell<BlockManager>> {
        &self.blocks
    }

    pub fn outbox(&self) -> &Rc<RefCell<EventOutbox>> {
        &self.outbox
    }

    /// Wires `env.include`/`env.require_asset` up to a real asset source.
    /// Called once by whoever owns this world's media directory, before
    /// the world's main script is loaded; a runtime with none set still
    /// runs, it just can't resolve includes.
    pub fn set_asset_source(&self, source: Rc<dyn AssetSource>) {
        *self.assets.borrow_mut() = Some(source);
    }

    /// Executes `source` as the world's script, rejecting bytecode per
    /// the sandbox discipline. Called once at world load.
    pub fn load_script(&self, source: &str, chunk_name: &str) -> anyhow::Result<()> {
        sandbox::exec_source(&self.lua, source, chunk_name).map_err(lua_err)
    }

    /// Installs `LuaGameContext` app-data for the duration of `f`, then
    /// removes it. `world` is handed to the closure rather than captured
    /// independently, so there is exactly one live `&mut World` borrow
    /// for the whole call; the raw pointer stashed in app-data is only
    /// ever read back out through [`crate::bridge`] while that borrow is
    /// active. Callers (the physics/hook dispatch in [`crate::host`])
    /// wrap every synchronous Lua call that might touch the world API in
    /// this.
    pub fn with_game<F, R>(&self, world: &mut World, f: F) -> R
    where
        F: FnOnce(&mut World) -> R,
    {
        let blocks_ptr: *const BlockManager = &*self.blocks.borrow();
        self.lua.set_app_data(LuaGameContext {
            world_ptr: world as *mut World,
            blocks_ptr,
        });
        let result = f(world);
        self.lua.remove_app_data::<LuaGameContext>();
        result
    }

    pub fn callback_function(&self, callback: CallbackRef) -> mlua::Result<mlua::Function> {
        let callbacks = self.callbacks.borrow();
        let key = callbacks
            .get(&callback)
            .ok_or_else(|| mlua::Error::RuntimeError(format!("unknown callback ref {callback}")))?;
        self.lua.registry_value(key)
    }

    fn install_env(&self) -> anyhow::Result<()> {
        let env = self.lua.create_table().map_err(lua_err)?;

        let log_fn = self.lua.create_function(|_, msg: String| {
            info!("[script] {}", msg);
            Ok(())
        }).map_err(lua_err)?;
        env.set("log", log_fn).map_err(lua_err)?;

        self.install_register_pack(&env)?;
        self.install_change_block(&env)?;
        self.install_include(&env)?;
        self.install_events(&env)?;
        self.install_world(&env)?;

        self.lua.globals().set("env", env).map_err(lua_err)?;
        Ok(())
    }

    fn install_register_pack(&self, env: &mlua::Table) -> anyhow::Result<()> {
        let blocks = self.blocks.clone();
        let f = self
            .lua
            .create_function(move |_, opts: mlua::Table| {
                let name: String = opts.get("name")?;
                let default_type: String = opts.get("default_type")?;
                let ids: Vec<BlockId> = opts.get("blocks")?;
                let draw_type = parse_draw_type(&default_type)
                    .ok_or_else(|| mlua::Error::RuntimeError(format!("unknown default_type '{default_type}'")))?;
                blocks
                    .borrow_mut()
                    .register_pack(BlockPack {
                        name,
                        default_type: draw_type,
                        image_asset: String::new(),
                        blocks: ids,
                    })
                    .map_err(|e| mlua::Error::RuntimeError(e.to_string()))
            })
            .map_err(lua_err)?;
        env.set("register_pack", f).map_err(lua_err)?;
        Ok(())
    }

    fn install_change_block(&self, env: &mlua::Table) -> anyhow::Result<()> {
        let blocks = self.blocks.clone();
        let callbacks = self.callbacks.clone();
        let next_id = self.next_callback_id.clone();
        let f = self
            .lua
            .create_function(move |lua, (id, opts): (BlockId, mlua::Table)| {
                let mut store = |func_opt: Option<mlua::Function>| -> mlua::Result<Option<CallbackRef>> {
                    match func_opt {
                        Some(func) => {
                            let key = lua.create_registry_value(func)?;
                            let cb_id = next_id.get();
                            next_id.set(cb_id + 1);
                            callbacks.borrow_mut().insert(cb_id, key);
                            Ok(Some(cb_id))
                        }
                        None => Ok(None),
                    }
                };

                let on_placed: Option<mlua::Function> = opts.get("on_placed")?;
                let on_intersect: Option<mlua::Function> = opts.get("on_intersect")?;
                let on_collide: Option<mlua::Function> = opts.get("on_collide")?;

                let on_placed = store(on_placed)?;
                let on_intersect = store(on_intersect)?;
                let on_collide = store(on_collide)?;

                let mut blocks = blocks.borrow_mut();
                let props = blocks
                    .getprops_for_modification(id)
                    .ok_or_else(|| mlua::Error::RuntimeError(format!("unregistered block id {id}")))?;

                if let Some(cb) = on_placed {
                    props.callbacks.on_placed = Some(cb);
                }
                if let Some(cb) = on_intersect {
                    props.callbacks.on_intersect = Some(cb);
                }
                if let Some(cb) = on_collide {
                    props.callbacks.on_collide = Some(cb);
                }
                if let Some(viscosity) = opts.get::<Option<f32>>("viscosity")? {
                    props.viscosity = viscosity;
                }
                if let Some(tdp) = opts.get::<Option<bool>>("tile_dependent_physics")? {
                    props.tile_dependent_physics = tdp;
                }
                if let Some(color) = opts.get::<Option<u32>>("minimap_color")? {
                    props.minimap_color = color;
                }
                Ok(())
            })
            .map_err(lua_err)?;
        env.set("change_block", f).map_err(lua_err)?;
        Ok(())
    }

    fn install_include(&self, env: &mlua::Table) -> anyhow::Result<()> {
        let assets = self.assets.clone();
        let lua = self.lua.clone();
        let f = self
            .lua
            .create_function(move |_, (asset_name, _visibility): (String, Option<String>)| {
                let source = assets.borrow().as_ref().and_then(|a| a.read_script(&asset_name));
                let Some(source) = source else {
                    tracing::warn!(asset = %asset_name, "env.include: asset not found, skipping");
                    return Ok(());
                };
                sandbox::exec_source(&lua, &source, &asset_name)
                    .map_err(|e| mlua::Error::RuntimeError(e.to_string()))
            })
            .map_err(lua_err)?;
        env.set("include", f).map_err(lua_err)?;

        let require_asset = self.lua.create_function(|_, _name: String| Ok(())).map_err(lua_err)?;
        env.set("require_asset", require_asset).map_err(lua_err)?;
        Ok(())
    }

    fn install_events(&self, env: &mlua::Table) -> anyhow::Result<()> {
        let events = self.events.clone();
        let register_event = self
            .lua
            .create_function(move |_, (id, types): (EventId, Vec<String>)| {
                let arg_types = types
                    .iter()
                    .map(|t| parse_arg_type(t))
                    .collect::<Option<Vec<_>>>()
                    .ok_or_else(|| mlua::Error::RuntimeError("unknown event argument type".into()))?;
                events
                    .borrow_mut()
                    .register(id, arg_types)
                    .map_err(|e| mlua::Error::RuntimeError(e.to_string()))
            })
            .map_err(lua_err)?;
        env.set("register_event", register_event).map_err(lua_err)?;

        let events = self.events.clone();
        let outbox = self.outbox.clone();
        let actor = self.current_actor.clone();
        let send_event = self
            .lua
            .create_function(move |_, (id, args): (EventId, mlua::Variadic<mlua::Value>)| {
                let decl = events
                    .borrow()
                    .get(id)
                    .ok_or_else(|| mlua::Error::RuntimeError(format!("unknown event id {id}")))?
                    .clone();
                if decl.arg_types.len() != args.len() {
                    return Err(mlua::Error::RuntimeError(format!(
                        "event {id} expects {} args, got {}",
                        decl.arg_types.len(),
                        args.len()
                    )));
                }
                let mut values = Vec::with_capacity(args.len());
                for (declared, value) in decl.arg_types.iter().zip(args.iter()) {
                    values.push(lua_value_to_arg(declared, value)?);
                }
                outbox
                    .borrow_mut()
                    .queue_broadcast(&events.borrow(), id, values, actor.get())
                    .map_err(|e| mlua::Error::RuntimeError(e.to_string()))
            })
            .map_err(lua_err)?;
        env.set("send_event", send_event).map_err(lua_err)?;
        Ok(())
    }

    fn install_world(&self, env: &mlua::Table) -> anyhow::Result<()> {
        let world_table = self.lua.create_table().map_err(lua_err)?;

        let get_block = self
            .lua
            .create_function(|lua, (x, y): (u16, u16)| {
                bridge::with_world(lua, |world| {
                    let block = world.get_block(BlockPos::new(x, y), Layer::Foreground);
                    block.map(|b| (b.id, b.tile(), b.bg)).unwrap_or((0, 0, 0))
                })
            })
            .map_err(lua_err)?;
        world_table.set("get_block", get_block).map_err(lua_err)?;

        let get_params = self
            .lua
            .create_function(|lua, (x, y): (u16, u16)| {
                bridge::with_world(lua, |world| param_to_lua_tuple(world.get_params(BlockPos::new(x, y))))
            })
            .map_err(lua_err)?;
        world_table.set("get_params", get_params).map_err(lua_err)?;

        let set_block = self
            .lua
            .create_function(|lua, (x, y, id, tile): (u16, u16, BlockId, u8)| {
                bridge::with_world_and_blocks(lua, |world, blocks| {
                    world
                        .update_block(BlockPos::new(x, y), Layer::Foreground, id, tile, BlockParams::None, 0, blocks)
                        .map(|_| ())
                        .map_err(|e| mlua::Error::RuntimeError(e.to_string()))
                })?
            })
            .map_err(lua_err)?;
        world_table.set("set_block", set_block).map_err(lua_err)?;

        let get_blocks_in_range = self
            .lua
            .create_function(
                |lua, (tag, ax, ay, bx, by): (u8, i64, i64, i64, i64)| {
                    bridge::with_world(lua, |world| {
                        let range = decode_range(tag, ax, ay, bx, by);
                        let positions: Vec<BlockPos> = world.iter_range(range).collect();
                        let out = positions
                            .into_iter()
                            .filter_map(|pos| world.get_block(pos, Layer::Foreground).map(|b| (pos, b)))
                            .collect::<Vec<_>>();
                        out
                    })
                    .map(|pairs| {
                        pairs
                            .into_iter()
                            .map(|(pos, b)| (pos.x, pos.y, b.id))
                            .collect::<Vec<_>>()
                    })
                },
            )
            .map_err(lua_err)?;
        world_table.set("get_blocks_in_range", get_blocks_in_range).map_err(lua_err)?;

        env.set("world", world_table).map_err(lua_err)?;
        Ok(())
    }
}

fn parse_draw_type(s: &str) -> Option<DrawType> {
    match s {
        "background" => Some(DrawType::Background),
        "solid" => Some(DrawType::Solid),
        "action" => Some(DrawType::Action),
        "decoration" => Some(DrawType::Decoration),
        _ => None,
    }
}

fn parse_arg_type(s: &str) -> Option<ArgType> {
    match s {
        "U8" => Some(ArgType::U8),
        "STR16" => Some(ArgType::Str16),
        "U8x3" | "U8X3" => Some(ArgType::U8x3),
        _ => None,
    }
}

fn lua_value_to_arg(declared: &ArgType, value: &mlua::Value) -> mlua::Result<ArgValue> {
    match (declared, value) {
        (ArgType::U8, mlua::Value::Integer(n)) => Ok(ArgValue::U8(*n as u8)),
        (ArgType::U8, mlua::Value::Number(n)) => Ok(ArgValue::U8(*n as u8)),
        (ArgType::Str16, mlua::Value::String(s)) => Ok(ArgValue::Str16(s.to_str()?.to_string())),
        (ArgType::U8x3, mlua::Value::Table(t)) => {
            let a: u8 = t.get(1)?;
            let b: u8 = t.get(2)?;
            let c: u8 = t.get(3)?;
            Ok(ArgValue::U8x3([a, b, c]))
        }
        _ => Err(mlua::Error::RuntimeError(format!("argument does not match declared type {declared:?}"))),
    }
}

pub(crate) fn param_to_lua_tuple(params: BlockParams) -> (u8, u8, u8, String) {
    match params {
        BlockParams::None => (0, 0, 0, String::new()),
        BlockParams::U8(v) => (1, v, 0, String::new()),
        BlockParams::Str16(s) => (2, 0, 0, s),
        BlockParams::Teleporter { rotation, id, dst_id } => (3, rotation, id, dst_id.to_string()),
    }
}

/// Decodes the packed `(tag, coords...)` form scripts pass for a
/// `PositionRange`: `0`=one block `(ax,ay)`, `1`=area `(ax,ay)-(bx,by)`,
/// `2`=circle centred `(ax,ay)` radius `bx`, `3`=entire world (all
/// coordinates ignored).
fn decode_range(tag: u8, ax: i64, ay: i64, bx: i64, by: i64) -> PositionRange {
    match tag {
        0 => PositionRange::OneBlock(BlockPos::new(ax.max(0) as u16, ay.max(0) as u16)),
        1 => PositionRange::Area(
            BlockPos::new(ax.max(0) as u16, ay.max(0) as u16),
            BlockPos::new(bx.max(0) as u16, by.max(0) as u16),
        ),
        2 => PositionRange::Circle(BlockPos::new(ax.max(0) as u16, ay.max(0) as u16), bx.max(0) as u16),
        _ => PositionRange::EntireWorld,
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    fn new_runtime() -> ScriptRuntime {
        ScriptRuntime::new(Rc::new(RefCell::new(BlockManager::new()))).unwrap()
    }

    #[test]
    fn register_event_then_send_event_round_trips() {
        let runtime = new_runtime();
        runtime
            .load_script("env.register_event(1, 'U8', 'STR16')", "test")
            .unwrap();
        runtime
            .load_script("env.send_event(1, 3, 'hi')", "test2")
            .unwrap();
        let mut outbox = runtime.outbox().borrow_mut();
        let pending = outbox.drain_broadcasts();
        assert_eq!(pending.len(), 1);
        assert_eq!(pending[0].args, vec![ArgValue::U8(3), ArgValue::Str16("hi".into())]);
    }

    #[test]
    fn register_pack_adds_blocks_to_shared_manager() {
        let blocks = Rc::new(RefCell::new(BlockManager::new()));
        let runtime = ScriptRuntime::new(blocks.clone()).unwrap();
        runtime
            .load_script(
                "env.register_pack({name='custom', default_type='solid', blocks={9000, 9001}})",
                "test",
            )
            .unwrap();
        assert!(blocks.borrow().is_registered(9000));
        assert!(blocks.borrow().is_registered(9001));
    }

    #[test]
    fn change_block_stores_callback_and_updates_props() {
        let runtime = new_runtime();
        runtime
            .load_script(
                "env.register_pack({name='test_pack', default_type='solid', blocks={9100}})
                 env.change_block(9100, {viscosity=0.5, on_intersect=function() end})",
                "test",
            )
            .unwrap();
        let blocks = runtime.blocks.borrow();
        let props = blocks.getprops(9100).unwrap();
        assert_eq!(props.viscosity, 0.5);
        assert!(props.callbacks.on_intersect.is_some());
    }

    #[test]
    fn world_api_is_unavailable_outside_a_callback() {
        let runtime = new_runtime();
        let err = runtime.load_script("env.world.get_block(1, 1)", "test");
        assert!(err.is_err());
    }

    struct FakeAssets(HashMap<String, String>);

    impl AssetSource for FakeAssets {
        fn read_script(&self, name: &str) -> Option<String> {
            self.0.get(name).cloned()
        }
    }

    #[test]
    fn include_runs_the_resolved_asset() {
        let runtime = new_runtime();
        let mut assets = HashMap::new();
        assets.insert("lib.lua".to_string(), "included = true".to_string());
        runtime.set_asset_source(Rc::new(FakeAssets(assets)));
        runtime.load_script("env.include('lib.lua')", "test").unwrap();
        let included: bool = runtime.lua().globals().get("included").unwrap();
        assert!(included);
    }

    #[test]
    fn include_of_unknown_asset_is_a_quiet_no_op() {
        let runtime = new_runtime();
        runtime.set_asset_source(Rc::new(FakeAssets(HashMap::new())));
        runtime.load_script("env.include('missing.lua')", "test").unwrap();
    }

    #[test]
    fn world_api_reads_and_writes_inside_with_game() {
        let runtime = new_runtime();
        let mut world = World::create_empty(10, 10, bw_world::WorldMeta::new("Ttest", "alice")).unwrap();
        runtime
            .load_script("function place() env.world.set_block(3, 3, 1, 0) end", "test")
            .unwrap();
        runtime.with_game(&mut world, |_world| {
            let place: mlua::Function = runtime.lua().globals().get("place").unwrap();
            place.call::<()>(()).unwrap();
        });
        assert_eq!(world.get_block(BlockPos::new(3, 3), Layer::Foreground).unwrap().id, 1);
    }
}
