use serde::{Deserialize, Serialize};

/// Per-block-ID parameter type tag. Fixed per block ID (see `BlockProperties`
/// in `bw-world`), so the tag never needs to travel with every value on the
/// wire — only the type-erased payload does.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Serialize, Deserialize)]
pub enum ParamType {
    None,
    U8,
    Str16,
    Teleporter,
}

/// A tagged union over the four parameter shapes a block position can
/// carry. Order matches the reference's `BlockParams::Type` enum, which is
/// saved to disk and must not be reordered.
#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
pub enum BlockParams {
    None,
    U8(u8),
    Str16(String),
    /// `(rotation, id, dst_id)` — a teleporter's own facing, its own
    /// teleporter-group ID, and the group ID of its destination.
    Teleporter { rotation: u8, id: u8, dst_id: u8 },
}

impl BlockParams {
    pub fn param_type(&self) -> ParamType {
        match self {
            BlockParams::None => ParamType::None,
            BlockParams::U8(_) => ParamType::U8,
            BlockParams::Str16(_) => ParamType::Str16,
            BlockParams::Teleporter { .. } => ParamType::Teleporter,
        }
    }
}

impl Default for BlockParams {
    fn default() -> Self {
        BlockParams::None
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn param_type_matches_variant() {
        assert_eq!(BlockParams::None.param_type(), ParamType::None);
        assert_eq!(BlockParams::U8(3).param_type(), ParamType::U8);
        assert_eq!(
            BlockParams::Str16("hi".into()).param_type(),
            ParamType::Str16
        );
        assert_eq!(
            BlockParams::Teleporter { rotation: 0, id: 1, dst_id: 2 }.param_type(),
            ParamType::Teleporter
        );
    }
}
