use thiserror::Error;

#[derive(Debug, Error)]
pub enum EelvlError {
    #[error("I/O error: {0}")]
    Io(#[from] std::io::Error),
    #[error("codec error: {0}")]
    Codec(#[from] bw_protocol::CodecError),
    #[error("world error: {0}")]
    World(#[from] bw_world::WorldError),
    #[error("unsupported layer tag {0}, expected 0 (foreground) or 1 (background)")]
    InvalidLayer(i32),
}
