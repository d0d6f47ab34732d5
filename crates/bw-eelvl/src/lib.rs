//! `.eelvl` world file import/export: barebone-DEFLATE framing, the legacy
//! block-ID/param layout, and directory listing helpers for the import
//! folder a running server serves `/import` and `/load` commands from.

mod codec;
mod deflate;
mod error;
mod format;
mod listing;
mod remap;

pub use codec::{export_world, import_file};
pub use error::EelvlError;
pub use format::WorldHeader;
pub use listing::{find_world_path, list_importable_worlds, path_to_world_id};
