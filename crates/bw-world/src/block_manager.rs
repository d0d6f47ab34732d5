use std::collections::HashMap;

use bw_types::{ids, BlockId, ParamType};
use thiserror::Error;

/// Collision/layering class of a block. Determines whether physics treats
/// a foreground block as solid.
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub enum DrawType {
    Background,
    Solid,
    Action,
    Decoration,
}

/// An opaque handle into the script host's callback table. `None` means the
/// slot is either unused or handled by hardcoded engine logic (see
/// `crate::physics::builtin_step`/`builtin_collide`); blocks registered via
/// `env.change_block` fill these in with a registry key the script host
/// resolves through the [`crate::hooks::ScriptHooks`] trait.
pub type CallbackRef = u32;

#[derive(Debug, Clone, Copy, Default)]
pub struct BlockCallbacks {
    pub on_placed: Option<CallbackRef>,
    pub on_intersect: Option<CallbackRef>,
    pub on_intersect_once: Option<CallbackRef>,
    pub on_collide: Option<CallbackRef>,
    pub get_visuals: Option<CallbackRef>,
    pub gui_def: Option<CallbackRef>,
}

/// Per-block-ID registration record. Owned by the `BlockManager`; never
/// mutated outside `registerPack`/`change_block`-equivalent APIs.
#[derive(Debug, Clone)]
pub struct BlockProperties {
    pub id: BlockId,
    pub draw_type: DrawType,
    pub minimap_color: u32,
    pub param_type: ParamType,
    pub tile_visuals: bool,
    pub tile_dependent_physics: bool,
    pub viscosity: f32,
    pub pack: String,
    pub callbacks: BlockCallbacks,
}

impl BlockProperties {
    pub fn is_solid(&self) -> bool {
        self.draw_type == DrawType::Solid
    }
}

#[derive(Debug, Clone)]
pub struct BlockPack {
    pub name: String,
    pub default_type: DrawType,
    pub image_asset: String,
    pub blocks: Vec<BlockId>,
}

#[derive(Debug, Error)]
pub enum BlockManagerError {
    #[error("pack name already registered: {0}")]
    DuplicatePack(String),
    #[error("block id already registered: {0}")]
    DuplicateBlock(BlockId),
}

/// Catalogue of block IDs to properties. Process-wide in the reference
/// (`g_blockmanager`); here it's an ordinary value injected into `World`
/// and `Player` at construction (§9's "inject via context object" note).
pub struct BlockManager {
    props: HashMap<BlockId, BlockProperties>,
    packs: Vec<BlockPack>,
}

impl BlockManager {
    pub fn new() -> Self {
        let mut mgr = Self {
            props: HashMap::new(),
            packs: Vec::new(),
        };
        mgr.register_air();
        mgr.do_pack_registration();
        mgr
    }

    fn register_air(&mut self) {
        self.props.insert(
            0,
            BlockProperties {
                id: 0,
                draw_type: DrawType::Background,
                minimap_color: 0,
                param_type: ParamType::None,
                tile_visuals: false,
                tile_dependent_physics: false,
                viscosity: 0.0,
                pack: "air".to_string(),
                callbacks: BlockCallbacks::default(),
            },
        );
    }

    pub fn register_pack(&mut self, pack: BlockPack) -> Result<(), BlockManagerError> {
        if self.packs.iter().any(|p| p.name == pack.name) {
            return Err(BlockManagerError::DuplicatePack(pack.name.to_string()));
        }
        for &id in &pack.blocks {
            if self.props.contains_key(&id) {
                return Err(BlockManagerError::DuplicateBlock(id));
            }
        }
        for &id in &pack.blocks {
            self.props.insert(
                id,
                BlockProperties {
                    id,
                    draw_type: pack.default_type,
                    minimap_color: 0xFF808080,
                    param_type: ParamType::None,
                    tile_visuals: false,
                    tile_dependent_physics: false,
                    viscosity: 0.0,
                    pack: pack.name.clone(),
                    callbacks: BlockCallbacks::default(),
                },
            );
        }
        self.packs.push(pack);
        Ok(())
    }

    pub fn getprops(&self, id: BlockId) -> Option<&BlockProperties> {
        self.props.get(&id)
    }

    /// Script-only accessor. Mirrors the reference's
    /// `getPropsForModification`, which is reserved for `change_block`.
    pub fn getprops_for_modification(&mut self, id: BlockId) -> Option<&mut BlockProperties> {
        self.props.get_mut(&id)
    }

    pub fn is_registered(&self, id: BlockId) -> bool {
        self.props.contains_key(&id)
    }

    pub fn packs(&self) -> &[BlockPack] {
        &self.packs
    }

    /// Installs the hard-coded default packs named in §4.4. Block-ID
    /// assignments follow `bw_types::ids` for the wells-known IDs that
    /// physics/scripting reference directly; everything else is a
    /// contiguous run reserved for that pack.
    fn do_pack_registration(&mut self) {
        let packs = [
            BlockPack {
                name: "basic".into(),
                default_type: DrawType::Solid,
                image_asset: "basic.png".into(),
                blocks: (1..=5).collect(),
            },
            BlockPack {
                name: "simple_backgrounds".into(),
                default_type: DrawType::Background,
                image_asset: "bg_simple.png".into(),
                blocks: (200..=210).collect(),
            },
            BlockPack {
                name: "keys".into(),
                default_type: DrawType::Action,
                image_asset: "keys.png".into(),
                blocks: vec![ids::KEY_R, ids::KEY_G, ids::KEY_B],
            },
            BlockPack {
                name: "doors".into(),
                default_type: DrawType::Solid,
                image_asset: "doors.png".into(),
                blocks: vec![ids::DOOR_R, ids::DOOR_G, ids::DOOR_B],
            },
            BlockPack {
                name: "timed_gates".into(),
                default_type: DrawType::Solid,
                image_asset: "gates.png".into(),
                blocks: vec![ids::GATE_R, ids::GATE_G, ids::GATE_B],
            },
            BlockPack {
                name: "coins".into(),
                default_type: DrawType::Decoration,
                image_asset: "coins.png".into(),
                blocks: vec![ids::COIN],
            },
            BlockPack {
                name: "action".into(),
                default_type: DrawType::Action,
                image_asset: "action.png".into(),
                blocks: vec![ids::COINDOOR, ids::COINGATE, ids::SECRET],
            },
            BlockPack {
                name: "boost".into(),
                default_type: DrawType::Action,
                image_asset: "boost.png".into(),
                blocks: (70..=79).collect(),
            },
            BlockPack {
                name: "factory".into(),
                default_type: DrawType::Solid,
                image_asset: "factory.png".into(),
                blocks: (110..=130).collect(),
            },
            BlockPack {
                name: "candy".into(),
                default_type: DrawType::Solid,
                image_asset: "candy.png".into(),
                blocks: (140..=160).collect(),
            },
            BlockPack {
                name: "spike".into(),
                default_type: DrawType::Action,
                image_asset: "spike.png".into(),
                blocks: vec![ids::SPIKES],
            },
            BlockPack {
                name: "hidden".into(),
                default_type: DrawType::Decoration,
                image_asset: "hidden.png".into(),
                blocks: (170..=175).collect(),
            },
            BlockPack {
                name: "owner".into(),
                default_type: DrawType::Solid,
                image_asset: "owner.png".into(),
                blocks: (180..=185).collect(),
            },
            BlockPack {
                name: "beta".into(),
                default_type: DrawType::Solid,
                image_asset: "beta.png".into(),
                blocks: (220..=235).collect(),
            },
            BlockPack {
                name: "teleporter".into(),
                default_type: DrawType::Action,
                image_asset: "teleporter.png".into(),
                blocks: vec![ids::TELEPORTER],
            },
            BlockPack {
                name: "music".into(),
                default_type: DrawType::Action,
                image_asset: "music.png".into(),
                blocks: (250..=254).collect(),
            },
            BlockPack {
                name: "spring".into(),
                default_type: DrawType::Action,
                image_asset: "spring.png".into(),
                blocks: (300..=305).collect(),
            },
            BlockPack {
                name: "checkpoint".into(),
                default_type: DrawType::Action,
                image_asset: "checkpoint.png".into(),
                blocks: vec![ids::CHECKPOINT],
            },
            BlockPack {
                name: "text".into(),
                default_type: DrawType::Decoration,
                image_asset: "text.png".into(),
                blocks: vec![ids::TEXT],
            },
        ];
        for pack in packs {
            self.register_pack(pack)
                .expect("hard-coded default packs must not collide");
        }
        self.do_pack_postprocess();
    }

    /// Patches derived properties after every default pack is in. Mirrors
    /// the reference's `doPackPostprocess`, which e.g. copies tile arrays
    /// between related IDs; here it fixes up parameter types and
    /// tile-dependent-physics/viscosity for the IDs whose semantics the
    /// spec calls out by name, since the generic pack loop above only
    /// assigns a uniform default per pack.
    fn do_pack_postprocess(&mut self) {
        let u8_param_ids = [ids::COINDOOR, ids::COINGATE, ids::SPIKES];
        for id in u8_param_ids {
            if let Some(p) = self.props.get_mut(&id) {
                p.param_type = ParamType::U8;
            }
        }
        if let Some(p) = self.props.get_mut(&ids::TELEPORTER) {
            p.param_type = ParamType::Teleporter;
        }
        if let Some(p) = self.props.get_mut(&ids::TEXT) {
            p.param_type = ParamType::Str16;
        }
        for id in [ids::SPIKES] {
            if let Some(p) = self.props.get_mut(&id) {
                p.tile_dependent_physics = true;
            }
        }
        for id in 70..=79u16 {
            if let Some(p) = self.props.get_mut(&id) {
                p.viscosity = 0.0;
            }
        }
    }
}

impl Default for BlockManager {
    fn default() -> Self {
        Self::new()
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn every_registered_id_shares_its_pack_pointer() {
        let mgr = BlockManager::new();
        for pack in mgr.packs() {
            for &id in &pack.blocks {
                let props = mgr.getprops(id).expect("registered id must have props");
                assert_eq!(props.pack, pack.name);
            }
        }
    }

    #[test]
    fn air_is_always_registered() {
        let mgr = BlockManager::new();
        assert!(mgr.is_registered(0));
        assert!(!mgr.getprops(0).unwrap().is_solid());
    }

    #[test]
    fn unregistered_id_returns_none() {
        let mgr = BlockManager::new();
        assert!(mgr.getprops(9999).is_none());
    }

    #[test]
    fn duplicate_pack_name_is_rejected() {
        let mut mgr = BlockManager::new();
        let err = mgr
            .register_pack(BlockPack {
                name: "basic".into(),
                default_type: DrawType::Solid,
                image_asset: "x.png".into(),
                blocks: vec![5000],
            })
            .unwrap_err();
        assert!(matches!(err, BlockManagerError::DuplicatePack(_)));
    }

    #[test]
    fn duplicate_block_id_is_rejected() {
        let mut mgr = BlockManager::new();
        let err = mgr
            .register_pack(BlockPack {
                name: "clashing".into(),
                default_type: DrawType::Solid,
                image_asset: "x.png".into(),
                blocks: vec![1],
            })
            .unwrap_err();
        assert!(matches!(err, BlockManagerError::DuplicateBlock(1)));
    }

    #[test]
    fn teleporter_has_teleporter_param_type() {
        let mgr = BlockManager::new();
        assert_eq!(
            mgr.getprops(ids::TELEPORTER).unwrap().param_type,
            ParamType::Teleporter
        );
    }
}
