//! Versioned memory layout of the target process
//!
//! Everything this crate knows about the foreign process lives here: the code
//! signature for the root pointer, every pointer chain, the field offsets and
//! the boss table. They describe one game build and must be replaced together
//! when the game is patched.

use std::fs;
use std::path::Path;

use serde::{Deserialize, Serialize};

use crate::entity::{BossCatalog, ResourceKind};
use crate::error::{Error, Result};
use crate::memory::PointerChain;
use crate::memory::layout::{
    LAYOUT_VERSION, PROCESS_NAME, behavior, bosses, chr_set, modules, physics, stats,
    world_chr_man,
};
use crate::offset::{CodeSignature, parse_pattern};

#[derive(Debug, Clone, Copy, PartialEq, Eq, Serialize, Deserialize)]
pub struct ResourceOffsets {
    pub current: u64,
    pub max: u64,
}

#[derive(Debug, Clone, Copy, PartialEq, Eq, Serialize, Deserialize)]
pub struct PositionOffsets {
    pub x: u64,
    pub y: u64,
    pub z: u64,
}

#[derive(Debug, Clone, Copy, PartialEq, Eq, Serialize, Deserialize)]
pub struct AnimationOffsets {
    pub code: u64,
    pub time: u64,
    pub length: u64,
    pub name: u64,
    pub name_len: usize,
}

/// Where the fields of one character record live, relative to its ChrModules
/// address.
#[derive(Debug, Clone, PartialEq, Eq, Serialize, Deserialize)]
pub struct EntityLayout {
    pub stats: PointerChain,
    pub position: PointerChain,
    pub animation: PointerChain,
    pub health: ResourceOffsets,
    pub focus: ResourceOffsets,
    pub stamina: ResourceOffsets,
    pub coordinates: PositionOffsets,
    pub animation_fields: AnimationOffsets,
}

impl EntityLayout {
    pub fn resource(&self, kind: ResourceKind) -> ResourceOffsets {
        match kind {
            ResourceKind::Health => self.health,
            ResourceKind::Focus => self.focus,
            ResourceKind::Stamina => self.stamina,
        }
    }
}

/// How loaded character slots are found from the root pointer.
#[derive(Debug, Clone, PartialEq, Eq, Serialize, Deserialize)]
pub struct CatalogLayout {
    /// Root -> structure holding the slot count
    pub count: PointerChain,
    pub count_offset: u64,
    /// Root -> first slot
    pub slots: PointerChain,
    pub stride: u64,
    /// Slot -> record (ChrModules)
    pub record: PointerChain,
}

#[derive(Debug, Clone, PartialEq, Eq, Serialize, Deserialize)]
pub struct GameLayout {
    pub version: String,
    pub process_name: String,
    pub module_name: String,
    pub root: CodeSignature,
    /// Root -> player record (ChrModules)
    pub player: PointerChain,
    pub catalog: CatalogLayout,
    pub entity: EntityLayout,
    pub bosses: BossCatalog,
}

impl GameLayout {
    /// Layout for the supported DARK SOULS III build.
    pub fn builtin() -> Self {
        Self {
            version: LAYOUT_VERSION.to_string(),
            process_name: PROCESS_NAME.to_string(),
            module_name: PROCESS_NAME.to_string(),
            root: CodeSignature {
                pattern: world_chr_man::PATTERN.to_string(),
                instr_offset: 0,
                disp_offset: world_chr_man::DISP_OFFSET,
                instr_len: world_chr_man::INSTR_LEN,
                deref: true,
                addend: 0,
            },
            player: PointerChain::from(&world_chr_man::PLAYER_CHAIN[..]),
            catalog: CatalogLayout {
                count: PointerChain::from(&chr_set::COUNT_CHAIN[..]),
                count_offset: chr_set::COUNT_OFFSET,
                slots: PointerChain::from(&chr_set::SLOTS_CHAIN[..]),
                stride: chr_set::SLOT_STRIDE,
                record: PointerChain::from(&chr_set::RECORD_CHAIN[..]),
            },
            entity: EntityLayout {
                stats: PointerChain::from(&modules::STATS_CHAIN[..]),
                position: PointerChain::from(&modules::PHYSICS_CHAIN[..]),
                animation: PointerChain::from(&modules::BEHAVIOR_CHAIN[..]),
                health: ResourceOffsets {
                    current: stats::HEALTH,
                    max: stats::MAX_HEALTH,
                },
                focus: ResourceOffsets {
                    current: stats::FOCUS,
                    max: stats::MAX_FOCUS,
                },
                stamina: ResourceOffsets {
                    current: stats::STAMINA,
                    max: stats::MAX_STAMINA,
                },
                coordinates: PositionOffsets {
                    x: physics::POSITION_X,
                    y: physics::POSITION_Y,
                    z: physics::POSITION_Z,
                },
                animation_fields: AnimationOffsets {
                    code: behavior::ANIMATION_ID,
                    time: behavior::ANIMATION_TIME,
                    length: behavior::ANIMATION_LENGTH,
                    name: behavior::ANIMATION_NAME,
                    name_len: behavior::ANIMATION_NAME_LEN,
                },
            },
            bosses: BossCatalog::from_entries([bosses::IUDEX_GUNDYR]),
        }
    }

    /// Reject layouts that cannot work regardless of the target process.
    pub fn validate(&self) -> Result<()> {
        parse_pattern(&self.root.pattern)?;

        if self.root.disp_offset + 4 > self.root.instr_len {
            return Err(Error::InvalidLayout(format!(
                "displacement at +{} does not fit in a {}-byte instruction",
                self.root.disp_offset, self.root.instr_len
            )));
        }
        if self.catalog.stride == 0 {
            return Err(Error::InvalidLayout(
                "catalog slot stride must be non-zero".to_string(),
            ));
        }
        let name_len = self.entity.animation_fields.name_len;
        if name_len == 0 || name_len % 2 != 0 {
            return Err(Error::InvalidLayout(format!(
                "animation name length {name_len} is not a positive UTF-16 length"
            )));
        }
        Ok(())
    }
}

impl Default for GameLayout {
    fn default() -> Self {
        Self::builtin()
    }
}

pub fn load_layout<P: AsRef<Path>>(path: P) -> Result<GameLayout> {
    let content = fs::read_to_string(&path)?;
    let layout: GameLayout = serde_json::from_str(&content)?;
    layout.validate()?;
    Ok(layout)
}

pub fn save_layout<P: AsRef<Path>>(path: P, layout: &GameLayout) -> Result<()> {
    let content = serde_json::to_string_pretty(layout)?;
    fs::write(path, content)?;
    Ok(())
}
