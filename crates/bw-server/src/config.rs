use std::path::Path;

use serde::Deserialize;

/// Server-wide configuration, loaded from `server.toml` with every field
/// falling back to a documented default when the file is missing or a key
/// is absent — mirrors the teacher's `ServerConfig::load`.
#[derive(Debug, Clone, Deserialize)]
pub struct ServerConfig {
    #[serde(default = "default_bind")]
    pub bind: String,
    #[serde(default = "default_port")]
    pub port: u16,
    #[serde(default = "default_max_peers")]
    pub max_peers: u32,
    #[serde(default = "default_tick_rate")]
    pub tick_rate: u32,

    #[serde(default = "default_assets_dir")]
    pub assets_dir: String,
    #[serde(default = "default_import_dir")]
    pub import_dir: String,
    #[serde(default = "default_export_dir")]
    pub export_dir: String,
    #[serde(default = "default_world_db")]
    pub world_db: String,
    #[serde(default = "default_auth_db")]
    pub auth_db: String,

    /// Distance (world units) an anti-cheat replay mismatch can accrue
    /// before the player is corrected. Policy, not protocol — see
    /// DESIGN.md Open Question 2.
    #[serde(default = "default_anticheat_teleport_back")]
    pub anticheat_teleport_back: f32,
    /// Cheat-score threshold past which a player is kicked outright.
    #[serde(default = "default_anticheat_kick")]
    pub anticheat_kick: f32,

    #[serde(default = "default_rate_blocks_per_sec")]
    pub rate_blocks_per_sec: f32,
    #[serde(default = "default_rate_blocks_burst")]
    pub rate_blocks_burst: f32,
    #[serde(default = "default_rate_chat_per_sec")]
    pub rate_chat_per_sec: f32,
    #[serde(default = "default_rate_chat_burst")]
    pub rate_chat_burst: f32,
    #[serde(default = "default_rate_events_per_sec")]
    pub rate_events_per_sec: f32,
    #[serde(default = "default_rate_events_burst")]
    pub rate_events_burst: f32,

    #[serde(default = "default_chat_history_cap")]
    pub chat_history_cap: usize,
    #[serde(default = "default_media_cache_days")]
    pub media_cache_days: u64,
}

fn default_bind() -> String {
    "0.0.0.0".into()
}
fn default_port() -> u16 {
    bw_net::DEFAULT_PORT
}
fn default_max_peers() -> u32 {
    256
}
fn default_tick_rate() -> u32 {
    30
}
fn default_assets_dir() -> String {
    "assets".into()
}
fn default_import_dir() -> String {
    "worlds/imports".into()
}
fn default_export_dir() -> String {
    "worlds/exports".into()
}
fn default_world_db() -> String {
    "worlds.sqlite".into()
}
fn default_auth_db() -> String {
    "auth.sqlite".into()
}
fn default_anticheat_teleport_back() -> f32 {
    200.0
}
fn default_anticheat_kick() -> f32 {
    600.0
}
fn default_rate_blocks_per_sec() -> f32 {
    70.0
}
fn default_rate_blocks_burst() -> f32 {
    140.0
}
fn default_rate_chat_per_sec() -> f32 {
    0.8
}
fn default_rate_chat_burst() -> f32 {
    2.4
}
fn default_rate_events_per_sec() -> f32 {
    20.0
}
fn default_rate_events_burst() -> f32 {
    40.0
}
fn default_chat_history_cap() -> usize {
    50
}
fn default_media_cache_days() -> u64 {
    60
}

impl Default for ServerConfig {
    fn default() -> Self {
        Self {
            bind: default_bind(),
            port: default_port(),
            max_peers: default_max_peers(),
            tick_rate: default_tick_rate(),
            assets_dir: default_assets_dir(),
            import_dir: default_import_dir(),
            export_dir: default_export_dir(),
            world_db: default_world_db(),
            auth_db: default_auth_db(),
            anticheat_teleport_back: default_anticheat_teleport_back(),
            anticheat_kick: default_anticheat_kick(),
            rate_blocks_per_sec: default_rate_blocks_per_sec(),
            rate_blocks_burst: default_rate_blocks_burst(),
            rate_chat_per_sec: default_rate_chat_per_sec(),
            rate_chat_burst: default_rate_chat_burst(),
            rate_events_per_sec: default_rate_events_per_sec(),
            rate_events_burst: default_rate_events_burst(),
            chat_history_cap: default_chat_history_cap(),
            media_cache_days: default_media_cache_days(),
        }
    }
}

impl ServerConfig {
    pub fn load(path: &Path) -> anyhow::Result<Self> {
        if path.exists() {
            let contents = std::fs::read_to_string(path)?;
            let config: ServerConfig = toml::from_str(&contents)?;
            Ok(config)
        } else {
            tracing::info!("no config file found at {}, using defaults", path.display());
            Ok(Self::default())
        }
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn missing_file_falls_back_to_defaults() {
        let config = ServerConfig::load(Path::new("/nonexistent/server.toml")).unwrap();
        assert_eq!(config.port, bw_net::DEFAULT_PORT);
        assert_eq!(config.max_peers, 256);
    }

    #[test]
    fn partial_toml_fills_the_rest_from_defaults() {
        let dir = tempfile::tempdir().unwrap();
        let path = dir.path().join("server.toml");
        std::fs::write(&path, "port = 9999\n").unwrap();
        let config = ServerConfig::load(&path).unwrap();
        assert_eq!(config.port, 9999);
        assert_eq!(config.bind, default_bind());
    }
}
