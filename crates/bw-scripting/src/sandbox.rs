use mlua::Lua;

/// Global names left reachable after [`install`]. Matches the whitelist
/// named in the script host's sandbox discipline: everything else a
/// fresh `Lua::new()` exposes (`os`, `io`, `require`, `load`, …) is
/// stripped, since a per-world script must not be able to touch the
/// filesystem or spawn processes.
const GLOBAL_WHITELIST: &[&str] = &[
    "assert", "pairs", "ipairs", "next", "pcall", "xpcall", "select", "tonumber", "tostring",
    "type", "unpack", "math", "table", "string",
];

/// `string` keeps only the members named in the whitelist; `format`/`rep`
/// are useful for chat text, `find`/`sub`/`byte`/`char` for simple
/// parsing, and nothing else (no `string.dump`, no `string.load`-adjacent
/// surface).
const STRING_WHITELIST: &[&str] = &["byte", "char", "find", "format", "rep", "sub"];

/// Strips the global table down to `GLOBAL_WHITELIST`, prunes `string` to
/// `STRING_WHITELIST`, and rejects loading precompiled bytecode (a
/// bytecode chunk can trivially escape a source-level sandbox). Must run
/// once, immediately after `Lua::new()`, before any script is loaded.
pub fn install(lua: &Lua) -> mlua::Result<()> {
    let globals = lua.globals();

    let mut to_remove = Vec::new();
    for pair in globals.pairs::<mlua::Value, mlua::Value>() {
        let (key, _) = pair?;
        if let mlua::Value::String(s) = &key {
            let name = s.to_str()?.to_string();
            if !GLOBAL_WHITELIST.contains(&name.as_str()) {
                to_remove.push(name);
            }
        }
    }
    for name in to_remove {
        globals.set(name, mlua::Value::Nil)?;
    }

    if let Ok(string_table) = globals.get::<mlua::Table>("string") {
        let mut drop_members = Vec::new();
        for pair in string_table.pairs::<mlua::Value, mlua::Value>() {
            let (key, _) = pair?;
            if let mlua::Value::String(s) = &key {
                let name = s.to_str()?.to_string();
                if !STRING_WHITELIST.contains(&name.as_str()) {
                    drop_members.push(name);
                }
            }
        }
        for name in drop_members {
            string_table.set(name, mlua::Value::Nil)?;
        }
    }

    Ok(())
}

/// Loads and executes `source` as a named chunk, rejecting it outright if
/// it looks like precompiled Lua bytecode (`\x1bLua` header) rather than
/// source text. `mlua`'s `Lua::load` would happily execute bytecode
/// otherwise, bypassing every source-level sandbox restriction above.
pub fn exec_source(lua: &Lua, source: &str, chunk_name: &str) -> mlua::Result<()> {
    if source.as_bytes().starts_with(&[0x1b, b'L', b'u', b'a']) {
        return Err(mlua::Error::RuntimeError(format!(
            "refusing to load precompiled bytecode for chunk '{chunk_name}'"
        )));
    }
    lua.load(source).set_name(chunk_name).exec()
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn os_and_io_are_removed() {
        let lua = Lua::new();
        install(&lua).unwrap();
        assert!(lua.globals().get::<mlua::Value>("os").unwrap().is_nil());
        assert!(lua.globals().get::<mlua::Value>("io").unwrap().is_nil());
        assert!(lua.globals().get::<mlua::Value>("require").unwrap().is_nil());
    }

    #[test]
    fn whitelisted_globals_survive() {
        let lua = Lua::new();
        install(&lua).unwrap();
        assert!(!lua.globals().get::<mlua::Value>("math").unwrap().is_nil());
        assert!(!lua.globals().get::<mlua::Value>("pcall").unwrap().is_nil());
    }

    #[test]
    fn string_table_is_pruned_to_whitelist() {
        let lua = Lua::new();
        install(&lua).unwrap();
        let string_table: mlua::Table = lua.globals().get("string").unwrap();
        assert!(!string_table.get::<mlua::Value>("format").unwrap().is_nil());
        assert!(string_table.get::<mlua::Value>("dump").unwrap().is_nil());
    }

    #[test]
    fn bytecode_header_is_rejected() {
        let lua = Lua::new();
        install(&lua).unwrap();
        let err = exec_source(&lua, "\u{1b}Lua\u{0}fake", "evil");
        assert!(err.is_err());
    }

    #[test]
    fn ordinary_source_executes_fine() {
        let lua = Lua::new();
        install(&lua).unwrap();
        exec_source(&lua, "x = 1 + 1", "test-chunk").unwrap();
        let value: i64 = lua.globals().get("x").unwrap();
        assert_eq!(value, 2);
    }
}
