//! Chat-command trie (§4.12). Commands arrive as the remainder of a chat
//! message once the leading `/` has been stripped by the caller; `dispatch`
//! takes the first whitespace-delimited token as the command name and the
//! rest as its argument string, mirroring the reference's `run(player, msg)`.
//!
//! Denied commands always produce a reply, never a disconnect — permission
//! failures are a normal chat message, not a protocol error.

use std::path::Path;
use std::sync::Arc;
use std::time::{SystemTime, UNIX_EPOCH};

use bw_net::PeerId;
use bw_persistence::{Account, AccountLevel, BanEntry};
use bw_types::PlayerFlags;
use bw_world::{BlockManager, World, MAX_SIZE, MIN_SIZE};

use crate::environment::SharedEnv;

pub struct CommandContext<'a> {
    pub world: &'a mut World,
    pub blocks: &'a BlockManager,
    pub shared: &'a Arc<SharedEnv>,
    pub world_id: &'a str,
    pub peer_id: PeerId,
    pub actor_name: String,
    pub actor_flags: PlayerFlags,
}

/// What the world worker should do after a command finishes. Flag and
/// respawn effects are reported back rather than applied here directly,
/// since the live `Player`/`Session` map lives in `world_worker`, not in
/// this module. `SetFlags` only ever targets the issuing peer — this
/// module has no way to resolve another player's name to a live peer id,
/// so flag changes aimed at someone else land in the persisted
/// `WorldMeta` table and take effect next time that player joins.
pub enum CommandOutcome {
    Reply(String),
    Broadcast(String),
    SetFlags { peer_id: PeerId, flags: PlayerFlags },
    Respawn,
    None,
}

fn deny() -> CommandOutcome {
    CommandOutcome::Reply("you don't have permission to do that".into())
}

pub fn dispatch(ctx: &mut CommandContext, line: &str) -> CommandOutcome {
    let line = line.trim();
    let (cmd, rest) = match line.split_once(char::is_whitespace) {
        Some((cmd, rest)) => (cmd, rest.trim_start()),
        None => (line, ""),
    };
    match cmd {
        "help" => cmd_help(),
        "respawn" => cmd_respawn(),
        "setpass" => cmd_setpass(ctx, rest),
        "setcode" => cmd_setcode(ctx, rest),
        "code" => cmd_code(ctx, rest),
        "flags" => cmd_flags(ctx, rest),
        "ffilter" => cmd_ffilter(ctx, rest),
        "fset" => cmd_fset(ctx, rest),
        "fdel" => cmd_fdel(ctx, rest),
        "clear" => cmd_clear(ctx, rest),
        "import" => cmd_import(ctx, rest),
        "load" => cmd_load(ctx),
        "save" => cmd_save(ctx),
        "title" => cmd_title(ctx, rest),
        "" => CommandOutcome::None,
        _ => CommandOutcome::Reply(format!("unknown command /{cmd} (try /help)")),
    }
}

fn cmd_help() -> CommandOutcome {
    CommandOutcome::Reply(
        "commands: /help /respawn /setpass /setcode /code /flags /ffilter /fset /fdel /clear /import /load /save /title".into(),
    )
}

fn cmd_respawn() -> CommandOutcome {
    CommandOutcome::Respawn
}

fn cmd_setpass(ctx: &mut CommandContext, rest: &str) -> CommandOutcome {
    let tokens: Vec<&str> = rest.split_whitespace().collect();
    let (target, new_pw, confirm) = match tokens.as_slice() {
        [new, confirm] => (ctx.actor_name.clone(), *new, *confirm),
        [target, new, confirm] => (target.to_string(), *new, *confirm),
        _ => return CommandOutcome::Reply("usage: /setpass [target] <new> <new>".into()),
    };
    if new_pw != confirm {
        return CommandOutcome::Reply("passwords do not match".into());
    }

    let mut auth = ctx.shared.auth.lock().unwrap();
    let acting_level = auth
        .load(&ctx.actor_name)
        .ok()
        .flatten()
        .map(|a| a.level)
        .unwrap_or(AccountLevel::Invalid);

    if !target.eq_ignore_ascii_case(&ctx.actor_name) {
        let target_level = auth.load(&target).ok().flatten().map(|a| a.level).unwrap_or(AccountLevel::Invalid);
        if !(acting_level >= AccountLevel::Moderator && acting_level >= target_level) {
            return deny();
        }
    }

    let mut account = match auth.load(&target) {
        Ok(Some(account)) => account,
        Ok(None) => Account::new(target.clone(), String::new(), new_pw),
        Err(e) => return CommandOutcome::Reply(format!("lookup failed: {e}")),
    };
    account.password = bw_persistence::auth_store::hash_password(new_pw);
    match auth.save(&account) {
        Ok(()) => CommandOutcome::Reply(format!("password updated for {target}")),
        Err(e) => CommandOutcome::Reply(format!("failed to save account: {e}")),
    }
}

fn cmd_setcode(ctx: &mut CommandContext, rest: &str) -> CommandOutcome {
    if !ctx.actor_flags.check(PlayerFlags::PF_COOWNER) {
        return deny();
    }
    let mut tokens = rest.split_whitespace();
    let mut force = false;
    let mut next = tokens.next();
    if next == Some("-f") {
        force = true;
        next = tokens.next();
    }
    let code = next.map(|s| s.to_string());
    ctx.world.meta.edit_code = code.clone();
    if force {
        ctx.world.meta.revoke_all_temp_flags();
    }
    match code {
        Some(c) => CommandOutcome::Reply(format!("edit code set to {c}")),
        None => CommandOutcome::Reply("edit code cleared".into()),
    }
}

fn cmd_code(ctx: &mut CommandContext, rest: &str) -> CommandOutcome {
    let code = rest.trim();
    let matches = ctx.world.meta.edit_code.as_deref() == Some(code) && !code.is_empty();
    if !matches {
        return CommandOutcome::Reply("incorrect code".into());
    }
    let grant = PlayerFlags::PF_TMP_EDIT_DRAW | PlayerFlags::PF_TMP_GODMODE;
    let mut flags = ctx.actor_flags;
    flags.set(grant, grant);
    ctx.world.meta.set_player_flags(&ctx.actor_name, flags);
    CommandOutcome::SetFlags { peer_id: ctx.peer_id, flags }
}

fn cmd_flags(ctx: &mut CommandContext, rest: &str) -> CommandOutcome {
    let target = if rest.is_empty() {
        ctx.actor_name.clone()
    } else {
        rest.split_whitespace().next().unwrap_or_default().to_string()
    };
    let flags = if target.eq_ignore_ascii_case(&ctx.actor_name) {
        ctx.actor_flags
    } else {
        ctx.world.meta.get_player_flags(&target)
    };
    CommandOutcome::Reply(format!("{target}: {}", flags.to_human_readable()))
}

fn cmd_ffilter(ctx: &mut CommandContext, rest: &str) -> CommandOutcome {
    if rest.is_empty() {
        return CommandOutcome::Reply(format!("known flags: {}", PlayerFlags::flag_list()));
    }
    let matched: Vec<&str> = rest
        .split_whitespace()
        .filter(|name| {
            PlayerFlags::string_to_flags(name)
                .map(|bits| ctx.actor_flags.check(bits))
                .unwrap_or(false)
        })
        .collect();
    CommandOutcome::Reply(format!("you have: {}", matched.join(" ")))
}

fn parse_flag_mask(rest: &str) -> Result<(String, u32), String> {
    let mut tokens = rest.split_whitespace();
    let target = tokens.next().ok_or_else(|| "usage: <target> <flag>...".to_string())?.to_string();
    let mut mask = 0u32;
    for tok in tokens {
        match PlayerFlags::string_to_flags(tok) {
            Some(bits) => mask |= bits,
            None => return Err(format!("unknown flag {tok} (known: {})", PlayerFlags::flag_list())),
        }
    }
    if mask == 0 {
        return Err("no flags given".to_string());
    }
    Ok((target, mask))
}

fn cmd_fset(ctx: &mut CommandContext, rest: &str) -> CommandOutcome {
    let (target, mask) = match parse_flag_mask(rest) {
        Ok(v) => v,
        Err(e) => return CommandOutcome::Reply(e),
    };
    let mut target_flags = ctx.world.meta.get_player_flags(&target);
    let allowed = ctx.actor_flags.may_manipulate(target_flags, mask);
    if allowed == 0 {
        return deny();
    }
    target_flags.set(allowed, allowed);
    ctx.world.meta.set_player_flags(&target, target_flags);
    reply_or_apply(ctx, target, target_flags, "granted")
}

fn cmd_fdel(ctx: &mut CommandContext, rest: &str) -> CommandOutcome {
    let (target, mask) = match parse_flag_mask(rest) {
        Ok(v) => v,
        Err(e) => return CommandOutcome::Reply(e),
    };
    let mut target_flags = ctx.world.meta.get_player_flags(&target);
    let allowed = ctx.actor_flags.may_manipulate(target_flags, mask);
    if allowed == 0 {
        return deny();
    }
    target_flags.set(0, allowed);
    ctx.world.meta.set_player_flags(&target, target_flags);
    reply_or_apply(ctx, target, target_flags, "revoked")
}

/// Self-targeted flag changes take effect immediately via `SetFlags`;
/// changes aimed at someone else are already persisted by the caller and
/// just get acknowledged here, since this module has no peer id to send
/// them to.
fn reply_or_apply(ctx: &CommandContext, target: String, flags: PlayerFlags, verb: &str) -> CommandOutcome {
    if target.eq_ignore_ascii_case(&ctx.actor_name) {
        CommandOutcome::SetFlags { peer_id: ctx.peer_id, flags }
    } else {
        CommandOutcome::Reply(format!("{verb} flags for {target}: {}", flags.to_human_readable()))
    }
}

fn cmd_clear(ctx: &mut CommandContext, rest: &str) -> CommandOutcome {
    if !ctx.actor_flags.check(PlayerFlags::PF_MASK_EDIT_DRAW) {
        return deny();
    }
    let mut tokens = rest.split_whitespace();
    let width = tokens.next().and_then(|s| s.parse().ok()).unwrap_or_else(|| ctx.world.width());
    let height = tokens.next().and_then(|s| s.parse().ok()).unwrap_or_else(|| ctx.world.height());
    if !(MIN_SIZE..=MAX_SIZE).contains(&width) || !(MIN_SIZE..=MAX_SIZE).contains(&height) {
        return CommandOutcome::Reply(format!("size must be between {MIN_SIZE} and {MAX_SIZE}"));
    }
    let meta = ctx.world.meta.clone();
    match World::create_empty(width, height, meta) {
        Ok(mut fresh) => {
            fresh.mark_all_modified(ctx.peer_id);
            *ctx.world = fresh;
            CommandOutcome::Broadcast(format!("{} cleared the world to {width}x{height}", ctx.actor_name))
        }
        Err(e) => CommandOutcome::Reply(format!("clear failed: {e}")),
    }
}

fn cmd_import(ctx: &mut CommandContext, rest: &str) -> CommandOutcome {
    if !ctx.actor_flags.check(PlayerFlags::PF_MASK_EDIT_DRAW) {
        return deny();
    }
    let file = rest.trim();
    if file.is_empty() {
        return CommandOutcome::Reply("usage: /import <file>".into());
    }
    let path = Path::new(&ctx.shared.config.import_dir).join(file);
    let bytes = match std::fs::read(&path) {
        Ok(bytes) => bytes,
        Err(e) => return CommandOutcome::Reply(format!("could not read {file}: {e}")),
    };
    let owner = ctx.world.meta.owner.clone();
    match bw_eelvl::import_file(&bytes, ctx.world_id, Some(&owner), ctx.blocks) {
        Ok(mut imported) => {
            imported.mark_all_modified(ctx.peer_id);
            *ctx.world = imported;
            CommandOutcome::Broadcast(format!("{} imported {file}", ctx.actor_name))
        }
        Err(e) => CommandOutcome::Reply(format!("import failed: {e}")),
    }
}

fn cmd_load(ctx: &mut CommandContext) -> CommandOutcome {
    if !ctx.actor_flags.check(PlayerFlags::PF_COOWNER) {
        return deny();
    }
    let mut store = ctx.shared.world_store.lock().unwrap();
    match store.load(ctx.world_id, None, ctx.blocks) {
        Ok(Some(mut fresh)) => {
            fresh.mark_all_modified(0);
            *ctx.world = fresh;
            CommandOutcome::Broadcast("world reloaded from storage".into())
        }
        Ok(None) => CommandOutcome::Reply("this world has no saved copy yet".into()),
        Err(e) => CommandOutcome::Reply(format!("load failed: {e}")),
    }
}

/// Rate-limited via the auth store's ban table (§4.9's reuse trick): a
/// short-lived ban under context `"world.save"` keyed by world ID gates
/// how often this world can be saved, independent of which player asks.
fn cmd_save(ctx: &mut CommandContext) -> CommandOutcome {
    if !ctx.actor_flags.check(PlayerFlags::PF_COOWNER) {
        return deny();
    }
    let mut auth = ctx.shared.auth.lock().unwrap();
    match auth.get_ban(ctx.world_id, "world.save") {
        Ok(Some(_)) => return CommandOutcome::Reply("this world was just saved, try again shortly".into()),
        Ok(None) => {}
        Err(e) => return CommandOutcome::Reply(format!("rate-limit check failed: {e}")),
    }
    let mut store = ctx.shared.world_store.lock().unwrap();
    match store.save(ctx.world) {
        Ok(()) => {
            let expiry = SystemTime::now().duration_since(UNIX_EPOCH).unwrap().as_secs() as i64 + 10;
            let _ = auth.ban(&BanEntry {
                affected: ctx.world_id.to_string(),
                context: "world.save".into(),
                expiry,
                comment: "save rate limit".into(),
            });
            CommandOutcome::Reply("world saved".into())
        }
        Err(e) => CommandOutcome::Reply(format!("save failed: {e}")),
    }
}

fn cmd_title(ctx: &mut CommandContext, rest: &str) -> CommandOutcome {
    if !ctx.actor_flags.check(PlayerFlags::PF_COOWNER) {
        return deny();
    }
    if rest.is_empty() {
        return CommandOutcome::Reply("usage: /title <text>".into());
    }
    ctx.world.meta.title = rest.to_string();
    CommandOutcome::Broadcast(format!("{} renamed the world to \"{rest}\"", ctx.actor_name))
}

#[cfg(test)]
mod tests {
    use super::*;
    use bw_world::WorldMeta;

    fn ctx_world() -> World {
        World::create_empty(10, 10, WorldMeta::new("Tdemo", "owner")).unwrap()
    }

    #[test]
    fn unprivileged_clear_is_denied() {
        let mut world = ctx_world();
        let blocks = BlockManager::new();
        let shared = test_shared_env();
        let mut ctx = CommandContext {
            world: &mut world,
            blocks: &blocks,
            shared: &shared,
            world_id: "Tdemo",
            peer_id: 1,
            actor_name: "alice".into(),
            actor_flags: PlayerFlags::default(),
        };
        let outcome = dispatch(&mut ctx, "clear 20 20");
        assert!(matches!(outcome, CommandOutcome::Reply(_)));
    }

    #[test]
    fn fset_without_authority_grants_nothing() {
        let mut world = ctx_world();
        let blocks = BlockManager::new();
        let shared = test_shared_env();
        let mut ctx = CommandContext {
            world: &mut world,
            blocks: &blocks,
            shared: &shared,
            world_id: "Tdemo",
            peer_id: 1,
            actor_name: "alice".into(),
            actor_flags: PlayerFlags::default(),
        };
        let outcome = dispatch(&mut ctx, "fset bob owner");
        assert!(matches!(outcome, CommandOutcome::Reply(_)));
    }

    fn test_shared_env() -> Arc<SharedEnv> {
        crate::environment::test_support::in_memory_shared_env()
    }
}
