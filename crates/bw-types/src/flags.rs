use serde::{Deserialize, Serialize};

/// Per-world (and, for the top two bits, server-wide) player permission
/// bitfield. Mirrors the reference's `PlayerFlags`, unified from its two
/// in-tree drafts (a simple edit/god/owner/banned set, and a richer
/// admin/moderator/owner/co-owner/collaborator role ladder) into the single
/// superset the spec's data model names: banned, edit, edit-draw, godmode,
/// helper, owner, coowner, collab, muted, temporary variants, and
/// server-level admin/moderator.
pub type PlayerFlagsRaw = u32;

#[derive(Debug, Clone, Copy, PartialEq, Eq, Default, Serialize, Deserialize)]
pub struct PlayerFlags {
    pub flags: PlayerFlagsRaw,
}

#[allow(non_upper_case_globals)]
impl PlayerFlags {
    pub const PF_BANNED: PlayerFlagsRaw = 0x0000_0001;
    pub const PF_MUTED: PlayerFlagsRaw = 0x0000_0002;
    pub const PF_EDIT: PlayerFlagsRaw = 0x0000_0004;
    pub const PF_EDIT_DRAW: PlayerFlagsRaw = 0x0000_0008 | Self::PF_EDIT;
    pub const PF_GODMODE: PlayerFlagsRaw = 0x0000_0010;
    pub const PF_COLLAB: PlayerFlagsRaw = 0x0000_0020 | Self::PF_EDIT_DRAW | Self::PF_GODMODE;
    pub const PF_COOWNER: PlayerFlagsRaw = 0x0000_0040 | Self::PF_COLLAB;
    pub const PF_HELPER: PlayerFlagsRaw = 0x0000_0080 | Self::PF_EDIT_DRAW | Self::PF_GODMODE;
    pub const PF_OWNER: PlayerFlagsRaw = 0x0000_0100 | Self::PF_COOWNER | Self::PF_HELPER;

    pub const PF_MODERATOR: PlayerFlagsRaw = 0x0001_0000;
    pub const PF_ADMIN: PlayerFlagsRaw = 0x0002_0000;

    pub const PF_TMP_MUTED: PlayerFlagsRaw = 0x0010_0000;
    pub const PF_TMP_HEAVYKICK: PlayerFlagsRaw = 0x0020_0000;
    pub const PF_TMP_EDIT: PlayerFlagsRaw = 0x0100_0000;
    pub const PF_TMP_EDIT_DRAW: PlayerFlagsRaw = 0x0200_0000 | Self::PF_TMP_EDIT;
    pub const PF_TMP_GODMODE: PlayerFlagsRaw = 0x0400_0000;

    pub const PF_MASK_EDIT: PlayerFlagsRaw = Self::PF_EDIT | Self::PF_TMP_EDIT;
    pub const PF_MASK_EDIT_DRAW: PlayerFlagsRaw = Self::PF_EDIT_DRAW | Self::PF_TMP_EDIT_DRAW;
    pub const PF_MASK_GODMODE: PlayerFlagsRaw = Self::PF_GODMODE | Self::PF_TMP_GODMODE;
    pub const PF_MASK_TMP: PlayerFlagsRaw = Self::PF_TMP_MUTED
        | Self::PF_TMP_HEAVYKICK
        | Self::PF_TMP_EDIT
        | Self::PF_TMP_EDIT_DRAW
        | Self::PF_TMP_GODMODE;
    pub const PF_MASK_SERVER: PlayerFlagsRaw = Self::PF_ADMIN | Self::PF_MODERATOR;

    pub const PF_CNG_MASK_HELPER: PlayerFlagsRaw =
        Self::PF_TMP_HEAVYKICK | Self::PF_TMP_MUTED | Self::PF_MASK_EDIT_DRAW | Self::PF_MASK_GODMODE;
    pub const PF_CNG_MASK_COOWNER: PlayerFlagsRaw =
        Self::PF_CNG_MASK_HELPER | Self::PF_HELPER | Self::PF_COLLAB | Self::PF_BANNED;
    pub const PF_CNG_MASK_OWNER: PlayerFlagsRaw =
        Self::PF_CNG_MASK_COOWNER | Self::PF_COOWNER | Self::PF_OWNER;

    /// Flags persisted to the world store.
    pub const PF_MASK_WORLD: PlayerFlagsRaw = Self::PF_BANNED
        | Self::PF_MUTED
        | Self::PF_OWNER
        | Self::PF_COOWNER
        | Self::PF_COLLAB
        | Self::PF_HELPER;
    /// Flags sent to clients for a single player (world flags plus
    /// currently-active temporary grants).
    pub const PF_MASK_SEND_PLAYER: PlayerFlagsRaw =
        Self::PF_MASK_WORLD | Self::PF_TMP_MUTED | Self::PF_TMP_EDIT_DRAW | Self::PF_TMP_GODMODE;

    pub fn new(flags: PlayerFlagsRaw) -> Self {
        Self { flags }
    }

    pub fn check(&self, mask: PlayerFlagsRaw) -> bool {
        (self.flags & mask) == mask
    }

    pub fn set(&mut self, new_flags: PlayerFlagsRaw, mask: PlayerFlagsRaw) {
        self.flags = (self.flags & !mask) | new_flags;
    }

    /// Returns the subset of `mask` that `self` (the acting player) is
    /// permitted to toggle on `target`. Zero means no permission at all.
    /// Mirrors the reference: the actor must have a change-mask that is a
    /// strict superset of the target's, or every bit in `mask` is denied.
    pub fn may_manipulate(&self, target: PlayerFlags, mask: PlayerFlagsRaw) -> PlayerFlagsRaw {
        let role_self = Role::of(self.flags);
        let role_target = Role::of(target.flags);
        if role_self.allowed_to_change & !role_target.allowed_to_change & mask != 0 {
            role_self.allowed_to_change & mask
        } else {
            0
        }
    }

    /// Applies the current role's default flags on top of the existing
    /// bitfield (used after loading a world-owner record that predates a
    /// flag addition).
    pub fn repair(&mut self) {
        self.flags |= Role::of(self.flags).default_flags;
    }

    pub fn role(&self) -> Role {
        Role::of(self.flags)
    }

    pub fn color(&self) -> u32 {
        Role::of(self.flags).color
    }

    pub fn to_human_readable(&self) -> String {
        let role = Role::of(self.flags);
        let mut out = String::new();
        if !role.name.is_empty() {
            out.push_str("[Role: ");
            out.push_str(role.name);
            out.push_str("] ");
        }
        if self.check(Self::PF_MUTED) {
            out.push_str("MUTED ");
        }
        if role.name.is_empty() {
            if self.check(Self::PF_EDIT_DRAW) {
                out.push_str("edit-draw ");
            } else if self.check(Self::PF_EDIT) {
                out.push_str("edit-simple ");
            }
            if self.check(Self::PF_GODMODE) {
                out.push_str("godmode ");
            }
        }
        out.trim_end().to_string()
    }

    pub fn flag_list() -> &'static str {
        "muted edit-simple edit-draw godmode helper collaborator co-owner owner"
    }

    pub fn string_to_flags(input: &str) -> Option<PlayerFlagsRaw> {
        STRING_TO_FLAGS_LUT
            .iter()
            .find(|(name, _)| *name == input)
            .map(|(_, flags)| *flags)
    }
}

const STRING_TO_FLAGS_LUT: &[(&str, PlayerFlagsRaw)] = &[
    ("muted", PlayerFlags::PF_MUTED),
    ("edit-simple", PlayerFlags::PF_EDIT),
    ("edit-draw", PlayerFlags::PF_EDIT_DRAW),
    ("godmode", PlayerFlags::PF_GODMODE),
    ("helper", PlayerFlags::PF_HELPER),
    ("collaborator", PlayerFlags::PF_COLLAB),
    ("co-owner", PlayerFlags::PF_COOWNER),
    ("owner", PlayerFlags::PF_OWNER),
];

/// A rung on the role ladder used to compute display name/colour and
/// change-permission masks. Roles are checked highest-to-lowest; the first
/// whose `main` bit is set in a flag set wins.
#[derive(Debug, Clone, Copy)]
pub struct Role {
    pub name: &'static str,
    main: PlayerFlagsRaw,
    default_flags: PlayerFlagsRaw,
    allowed_to_change: PlayerFlagsRaw,
    pub color: u32,
}

const ROLES: &[Role] = &[
    Role {
        name: "Admin",
        main: PlayerFlags::PF_ADMIN,
        default_flags: 0,
        allowed_to_change: PlayerFlags::PF_MASK_SERVER | PlayerFlags::PF_CNG_MASK_OWNER,
        color: 0xFFFF_FF00,
    },
    Role {
        name: "Moderator",
        main: PlayerFlags::PF_MODERATOR,
        default_flags: 0,
        allowed_to_change: PlayerFlags::PF_CNG_MASK_OWNER,
        color: 0xFFFF_5500,
    },
    Role {
        name: "Owner",
        main: PlayerFlags::PF_OWNER,
        default_flags: PlayerFlags::PF_COOWNER | PlayerFlags::PF_HELPER,
        allowed_to_change: PlayerFlags::PF_CNG_MASK_OWNER,
        color: 0xFF77_AAFF,
    },
    Role {
        name: "Co-owner",
        main: PlayerFlags::PF_COOWNER,
        default_flags: PlayerFlags::PF_COLLAB,
        allowed_to_change: PlayerFlags::PF_CNG_MASK_COOWNER,
        color: 0xFF00_88EE,
    },
    Role {
        name: "Helper",
        main: PlayerFlags::PF_HELPER,
        default_flags: PlayerFlags::PF_EDIT_DRAW | PlayerFlags::PF_GODMODE,
        allowed_to_change: PlayerFlags::PF_CNG_MASK_HELPER,
        color: 0xFF33_CCAA,
    },
    Role {
        name: "Collaborator",
        main: PlayerFlags::PF_COLLAB,
        default_flags: PlayerFlags::PF_EDIT_DRAW | PlayerFlags::PF_GODMODE,
        allowed_to_change: 0,
        color: 0xFF00_EECC,
    },
    // Termination entry: `main == 0` always matches, so this is the
    // fallback for a plain player.
    Role {
        name: "",
        main: 0,
        default_flags: 0,
        allowed_to_change: 0,
        color: 0xFFBB_BBBB,
    },
];

impl Role {
    fn of(flags: PlayerFlagsRaw) -> Role {
        for role in ROLES {
            if role.main == 0 || (flags & role.main) == role.main {
                return *role;
            }
        }
        unreachable!("ROLES always ends in a zero-main fallback entry")
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn normal_player_has_no_role_name() {
        let pf = PlayerFlags::new(0);
        assert_eq!(pf.role().name, "");
        assert!(pf.to_human_readable().is_empty());
    }

    #[test]
    fn owner_outranks_helper_for_manipulation() {
        let owner = PlayerFlags::new(PlayerFlags::PF_OWNER);
        let helper = PlayerFlags::new(PlayerFlags::PF_HELPER);
        let allowed = owner.may_manipulate(helper, PlayerFlags::PF_BANNED);
        assert_eq!(allowed, PlayerFlags::PF_BANNED);
    }

    #[test]
    fn collaborator_cannot_manipulate_anyone() {
        let collab = PlayerFlags::new(PlayerFlags::PF_COLLAB);
        let normal = PlayerFlags::new(0);
        assert_eq!(collab.may_manipulate(normal, PlayerFlags::PF_MUTED), 0);
    }

    #[test]
    fn string_roundtrip_covers_every_listed_flag() {
        for name in PlayerFlags::flag_list().split(' ') {
            assert!(PlayerFlags::string_to_flags(name).is_some(), "{name}");
        }
        assert!(PlayerFlags::string_to_flags("bogus").is_none());
    }

    #[test]
    fn set_replaces_only_masked_bits() {
        let mut pf = PlayerFlags::new(PlayerFlags::PF_MUTED | PlayerFlags::PF_EDIT);
        pf.set(0, PlayerFlags::PF_MUTED);
        assert!(!pf.check(PlayerFlags::PF_MUTED));
        assert!(pf.check(PlayerFlags::PF_EDIT));
    }
}
