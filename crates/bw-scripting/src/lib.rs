//! Sandboxed Lua script host for per-world block behaviour and events.
//!
//! `bw-world` defines what a scripted block callback *is* through the
//! [`bw_world::ScriptHooks`] trait; this crate supplies the only concrete
//! implementation, backed by an `mlua::Lua` VM with the globals pruned
//! down in [`sandbox`]. [`runtime::ScriptRuntime`] owns the VM and the
//! `env` table scripts see; [`host::LuaScriptHost`] adapts it to
//! `ScriptHooks` so `bw-world`'s physics never has to know Lua exists.

pub mod bridge;
pub mod host;
pub mod runtime;
pub mod sandbox;

pub use host::LuaScriptHost;
pub use runtime::{AssetSource, ScriptRuntime};
