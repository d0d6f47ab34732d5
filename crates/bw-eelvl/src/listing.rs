use std::collections::hash_map::DefaultHasher;
use std::fs;
use std::hash::{Hash, Hasher};
use std::path::{Path, PathBuf};

use bw_protocol::Packet;
use bytes::BytesMut;
use tracing::debug;

use crate::deflate;
use crate::error::EelvlError;
use crate::format::{self, WorldHeader};

/// Deterministically derives an `I`-prefixed world ID from a file's path,
/// matching the reference's `path_to_worldid` (`std::hash<string>`
/// formatted as `I%08x`). Two different files always get different IDs as
/// long as the hash doesn't collide; this is a listing convenience, not a
/// persistence key, so an occasional collision across a huge import
/// directory is an accepted risk rather than something worth a stronger
/// hash for.
pub fn path_to_world_id(path: &Path) -> String {
    let mut hasher = DefaultHasher::new();
    path.to_string_lossy().hash(&mut hasher);
    format!("I{:08x}", hasher.finish() as u32)
}

fn is_path_ok(path: &Path) -> bool {
    if !path.is_file() {
        return false;
    }
    if path.extension().and_then(|e| e.to_str()) != Some("eelvl") {
        return false;
    }
    !path
        .components()
        .any(|c| c.as_os_str().to_string_lossy().starts_with('.'))
}

fn read_header_only(bytes: &[u8]) -> Result<WorldHeader, EelvlError> {
    let raw = deflate::decompress_barebone(bytes)?;
    let mut p = Packet::from_bytes(BytesMut::from(&raw[..])).big_endian();
    format::read_header(&mut p).map_err(EelvlError::from)
}

/// Recursively scans `import_dir` for `.eelvl` files, reading just each
/// one's header. Unreadable files are logged and skipped rather than
/// failing the whole scan, mirroring the reference's `listImportableWorlds`.
pub fn list_importable_worlds(import_dir: &Path) -> Vec<(PathBuf, WorldHeader)> {
    let mut out = Vec::new();
    let Ok(entries) = fs::read_dir(import_dir) else {
        return out;
    };
    for entry in entries.flatten() {
        let path = entry.path();
        if path.is_dir() {
            out.extend(list_importable_worlds(&path));
            continue;
        }
        if !is_path_ok(&path) {
            continue;
        }
        match fs::read(&path).and_then(|bytes| {
            read_header_only(&bytes).map_err(|e| std::io::Error::new(std::io::ErrorKind::InvalidData, e.to_string()))
        }) {
            Ok(header) => out.push((path, header)),
            Err(e) => debug!("skipping unreadable world file {}: {e}", path.display()),
        }
    }
    out
}

/// Reverse-scans `import_dir` for the file whose [`path_to_world_id`]
/// matches `world_id`. Returns `None` rather than an error when nothing
/// matches, since "world not found" is routine (a stale Join request) not
/// a fault.
pub fn find_world_path(import_dir: &Path, world_id: &str) -> Option<PathBuf> {
    fn scan(dir: &Path, world_id: &str) -> Option<PathBuf> {
        let entries = fs::read_dir(dir).ok()?;
        for entry in entries.flatten() {
            let path = entry.path();
            if path.is_dir() {
                if let Some(found) = scan(&path, world_id) {
                    return Some(found);
                }
                continue;
            }
            if is_path_ok(&path) && path_to_world_id(&path) == world_id {
                return Some(path);
            }
        }
        None
    }
    scan(import_dir, world_id)
}

#[cfg(test)]
mod tests {
    use super::*;
    use crate::codec::export_world;
    use bw_world::{World, WorldMeta};

    #[test]
    fn listing_finds_eelvl_files_and_skips_others() {
        let dir = tempfile::tempdir().unwrap();
        let world = World::create_empty(5, 5, WorldMeta::new("Ptest", "alice")).unwrap();
        let bytes = export_world(&world).unwrap();
        fs::write(dir.path().join("one.eelvl"), &bytes).unwrap();
        fs::write(dir.path().join("notes.txt"), b"irrelevant").unwrap();

        let found = list_importable_worlds(dir.path());
        assert_eq!(found.len(), 1);
        assert_eq!(found[0].0.file_name().unwrap(), "one.eelvl");
        assert_eq!(found[0].1.owner, "alice");
    }

    #[test]
    fn find_world_path_resolves_the_same_id_listing_reports() {
        let dir = tempfile::tempdir().unwrap();
        let world = World::create_empty(5, 5, WorldMeta::new("Ptest", "bob")).unwrap();
        let bytes = export_world(&world).unwrap();
        let path = dir.path().join("bobs-world.eelvl");
        fs::write(&path, &bytes).unwrap();

        let id = path_to_world_id(&path);
        let resolved = find_world_path(dir.path(), &id).unwrap();
        assert_eq!(resolved, path);
    }

    #[test]
    fn unknown_world_id_resolves_to_none() {
        let dir = tempfile::tempdir().unwrap();
        assert!(find_world_path(dir.path(), "Inever").is_none());
    }
}
