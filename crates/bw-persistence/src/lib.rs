//! SQLite-backed persistence: world grids keyed by a legacy string-ID
//! hash, and the account/log/ban/config tables the auth flow needs.
//!
//! Both stores are thin wrappers around a `rusqlite::Connection` —
//! no ORM, no migrations framework, matching the reference's
//! hand-rolled `sqlite3_prepare_v2` statement style translated into
//! `rusqlite`'s safer parameter-binding API.

pub mod auth_store;
pub mod world_store;

pub use auth_store::{Account, AccountLevel, AuthStore, BanEntry};
pub use world_store::WorldStore;

use thiserror::Error;

#[derive(Debug, Error)]
pub enum PersistError {
    #[error("sqlite error: {0}")]
    Sqlite(#[from] rusqlite::Error),
    #[error("stored world blob is corrupt or does not match the requested size")]
    CorruptBlob,
    #[error("world error: {0}")]
    World(#[from] bw_world::WorldError),
}
