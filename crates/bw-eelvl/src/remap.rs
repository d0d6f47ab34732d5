use bw_types::{ids, BlockId};

/// Translates a legacy/unrecognised block ID into one this server actually
/// registers. Mirrors the reference's `BLOCK_ID_LUT` — a ~1700-entry table
/// collapsing years of renumbered/retired block IDs down to the current
/// set — but only carries the handful of categories the reference's
/// comments call out by name (solid/glass variant collapse, the invisible
/// "slow climbable" renumbering, spike consolidation, the invisible
/// teleporter alias). An ID this table doesn't know about is left
/// unmapped, same as the reference's fallback: the import simply drops
/// that block rather than guessing.
pub fn legacy_id(id: i32) -> Option<BlockId> {
    match id {
        17..=21 | 51..=58 => Some(1),
        411 => Some(1),
        412 => Some(2),
        413 => Some(3),
        414 => Some(4),
        1625..=1636 if id != 1580 => Some(ids::SPIKES),
        381 => Some(ids::TELEPORTER),
        _ => None,
    }
}

/// Applies the reference's `importSpike` conversion: a spike's stored
/// rotation is offset by one quarter-turn relative to the file format's
/// own convention.
pub fn import_spike_rotation(raw: i32) -> u8 {
    (raw + 3).rem_euclid(4) as u8
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn known_legacy_ids_map_to_registered_ids() {
        assert_eq!(legacy_id(52), Some(1));
        assert_eq!(legacy_id(411), Some(1));
        assert_eq!(legacy_id(414), Some(4));
        assert_eq!(legacy_id(381), Some(ids::TELEPORTER));
        assert_eq!(legacy_id(1630), Some(ids::SPIKES));
    }

    #[test]
    fn unmapped_legacy_id_returns_none() {
        assert_eq!(legacy_id(999999), None);
    }

    #[test]
    fn spike_rotation_wraps_modulo_four() {
        assert_eq!(import_spike_rotation(0), 3);
        assert_eq!(import_spike_rotation(1), 0);
        assert_eq!(import_spike_rotation(-1), 2);
    }
}
