use std::collections::HashMap;
use std::path::{Path, PathBuf};
use std::sync::Arc;
use std::time::{Duration, SystemTime};

use bw_protocol::MediaEntry;
use bw_scripting::AssetSource;
use sha3::{Digest, Sha3_256};
use tracing::{info, warn};

struct Asset {
    path: PathBuf,
    size: u32,
    hash64: u64,
}

/// Name → on-disk asset, built once from a recursive scan of `assets_dir`
/// at startup. Content hash is the low 64 bits of SHA3-256, matching the
/// disk-cache key the client derives for its own copy.
pub struct MediaIndex {
    assets: HashMap<String, Asset>,
}

const SCAN_EXTENSIONS: &[&str] = &["png", "lua", "mp3"];

impl MediaIndex {
    pub fn build(assets_dir: &Path, cache_days: u64) -> std::io::Result<Self> {
        let mut assets = HashMap::new();
        let mut stale = 0usize;
        if assets_dir.is_dir() {
            let max_age = Duration::from_secs(cache_days.saturating_mul(86_400));
            scan_dir(assets_dir, assets_dir, max_age, &mut assets, &mut stale)?;
        } else {
            warn!(dir = %assets_dir.display(), "assets directory does not exist, media index empty");
        }
        info!(
            count = assets.len(),
            stale_excluded = stale,
            "media index built"
        );
        Ok(Self { assets })
    }

    pub fn list(&self) -> Vec<MediaEntry> {
        self.assets
            .iter()
            .map(|(name, asset)| MediaEntry {
                name: name.clone(),
                size: asset.size,
                hash64: asset.hash64,
            })
            .collect()
    }

    pub fn path_of(&self, name: &str) -> Option<&Path> {
        self.assets.get(name).map(|a| a.path.as_path())
    }

    pub fn read(&self, name: &str) -> Option<Vec<u8>> {
        let asset = self.assets.get(name)?;
        std::fs::read(&asset.path).ok()
    }
}

/// Adapts the media index to `env.include`'s asset source (§4.13): a
/// script asking for `foo.lua` gets back whatever `assets/foo.lua` scanned
/// to, decoded lossily since Lua source is expected to be UTF-8 text.
pub struct MediaAssetSource(pub Arc<MediaIndex>);

impl AssetSource for MediaAssetSource {
    fn read_script(&self, name: &str) -> Option<String> {
        let bytes = self.0.read(name)?;
        Some(String::from_utf8_lossy(&bytes).into_owned())
    }
}

fn scan_dir(
    root: &Path,
    dir: &Path,
    max_age: Duration,
    out: &mut HashMap<String, Asset>,
    stale: &mut usize,
) -> std::io::Result<()> {
    for entry in std::fs::read_dir(dir)? {
        let entry = entry?;
        let path = entry.path();
        if path.is_dir() {
            scan_dir(root, &path, max_age, out, stale)?;
            continue;
        }
        let ext = path
            .extension()
            .and_then(|e| e.to_str())
            .unwrap_or_default();
        if !SCAN_EXTENSIONS.contains(&ext) {
            continue;
        }
        let metadata = entry.metadata()?;
        if let Ok(modified) = metadata.modified() {
            if SystemTime::now()
                .duration_since(modified)
                .map(|age| age > max_age)
                .unwrap_or(false)
            {
                *stale += 1;
                continue;
            }
        }
        let data = std::fs::read(&path)?;
        let mut hasher = Sha3_256::new();
        hasher.update(&data);
        let digest = hasher.finalize();
        let hash64 = u64::from_be_bytes(digest[0..8].try_into().unwrap());
        let name = path
            .strip_prefix(root)
            .unwrap_or(&path)
            .to_string_lossy()
            .replace('\\', "/");
        out.insert(
            name,
            Asset {
                path,
                size: data.len() as u32,
                hash64,
            },
        );
    }
    Ok(())
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn scans_and_hashes_assets() {
        let dir = tempfile::tempdir().unwrap();
        std::fs::write(dir.path().join("a.lua"), b"-- hi").unwrap();
        std::fs::write(dir.path().join("ignore.txt"), b"nope").unwrap();
        let index = MediaIndex::build(dir.path(), 60).unwrap();
        let entries = index.list();
        assert_eq!(entries.len(), 1);
        assert_eq!(entries[0].name, "a.lua");
        assert!(index.read("a.lua").is_some());
        assert!(index.read("ignore.txt").is_none());
    }

    #[test]
    fn missing_dir_yields_empty_index() {
        let index = MediaIndex::build(Path::new("/nonexistent/assets"), 60).unwrap();
        assert!(index.list().is_empty());
    }

    #[test]
    fn asset_source_reads_scripts_by_name() {
        let dir = tempfile::tempdir().unwrap();
        std::fs::write(dir.path().join("main.lua"), b"-- entrypoint").unwrap();
        let index = Arc::new(MediaIndex::build(dir.path(), 60).unwrap());
        let source = MediaAssetSource(index);
        assert_eq!(source.read_script("main.lua").as_deref(), Some("-- entrypoint"));
        assert!(source.read_script("nope.lua").is_none());
    }
}
