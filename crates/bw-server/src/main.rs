mod commands;
mod config;
mod dispatch;
mod environment;
mod media;
mod ratelimit;
mod world_worker;

use std::collections::HashMap;
use std::path::Path;
use std::sync::{Arc, Mutex};

use bw_net::Transport;
use bw_persistence::{AuthStore, WorldStore};
use bw_types::PlayerFlags;
use bw_world::BlockManager;
use config::ServerConfig;
use environment::{Environment, SharedEnv};
use media::MediaIndex;
use tracing::{error, info};

#[tokio::main]
async fn main() -> anyhow::Result<()> {
    tracing_subscriber::fmt()
        .with_env_filter(
            tracing_subscriber::EnvFilter::try_from_default_env()
                .unwrap_or_else(|_| tracing_subscriber::EnvFilter::new("info")),
        )
        .init();

    let mut args = std::env::args().skip(1);
    if args.any(|a| a == "--unittest") {
        return run_self_test();
    }

    info!("starting server");

    let config = Arc::new(ServerConfig::load(Path::new("server.toml"))?);
    info!(bind = %config.bind, port = config.port, max_peers = config.max_peers, "config loaded");

    std::fs::create_dir_all(&config.import_dir)?;
    std::fs::create_dir_all(&config.export_dir)?;
    std::fs::create_dir_all(&config.assets_dir)?;

    let media = MediaIndex::build(Path::new(&config.assets_dir), config.media_cache_days)?;
    let auth = AuthStore::open(&config.auth_db)?;
    let world_store = WorldStore::open(&config.world_db)?;

    let addr = format!("{}:{}", config.bind, config.port).parse()?;
    let transport = Transport::bind(addr).await?;
    info!(addr = %transport.local_addr()?, "transport bound");

    let shared = Arc::new(SharedEnv {
        config: config.clone(),
        transport: transport.clone(),
        auth: Arc::new(Mutex::new(auth)),
        world_store: Arc::new(Mutex::new(world_store)),
        players: Arc::new(Mutex::new(HashMap::new())),
        media: Arc::new(media),
    });
    let env = Arc::new(Environment::new(shared));

    let (event_tx, event_rx) = tokio::sync::mpsc::unbounded_channel();
    transport.listen(event_tx);

    let (shutdown_tx, mut shutdown_rx) = tokio::sync::watch::channel(false);
    tokio::spawn(async move {
        let _ = tokio::signal::ctrl_c().await;
        info!("received shutdown signal");
        let _ = shutdown_tx.send(true);
    });

    tokio::select! {
        _ = dispatch::run(env.clone(), event_rx) => {
            error!("dispatch loop exited unexpectedly");
        }
        _ = shutdown_rx.changed() => {
            info!("shutting down");
        }
    }

    env.shutdown();
    transport.shutdown().await;
    Ok(())
}

/// `--unittest` (§6.3): a lightweight in-process smoke test rather than a
/// `cargo test` re-invocation, so a deployed binary can self-check without
/// needing the dev toolchain. Exits non-zero on the first failed check.
fn run_self_test() -> anyhow::Result<()> {
    info!("running built-in self-test");

    let blocks = BlockManager::new();
    anyhow::ensure!(blocks.is_registered(0), "air block must be registered");
    anyhow::ensure!(!blocks.packs().is_empty(), "default block packs must be registered");

    let mut flags = PlayerFlags::default();
    flags.set(PlayerFlags::PF_OWNER, PlayerFlags::PF_OWNER);
    anyhow::ensure!(flags.check(PlayerFlags::PF_MASK_EDIT_DRAW), "owner flag must imply edit-draw");

    let config = ServerConfig::default();
    anyhow::ensure!(config.port == bw_net::DEFAULT_PORT, "default config must use the default port");

    info!("self-test passed");
    Ok(())
}
