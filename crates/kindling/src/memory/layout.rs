//! Memory layout constants for DARK SOULS III data structures
//!
//! Offsets for the 1.15 executable. They describe one layout and change
//! together: a game patch that moves one of them usually moves the others.
//! [`crate::offset::GameLayout::builtin`] bundles them into a versioned set.
//!
//! ```text
//!   WorldChrMan ──0x80──► PlayerIns ──0x1F90──► ChrModules ─┬─0x18──► stats
//!        │                                                  ├─0x68──► physics
//!        │                                                  └─0x80──► behavior
//!        └─0x1D0──► ChrSet ─┬─0x0──► slot count (i32)
//!                           └─0x8──► slot array ──i*0x38──► ChrIns ──0x1F90──► ChrModules
//! ```

/// Executable and main module name
pub const PROCESS_NAME: &str = "DarkSoulsIII.exe";

/// Layout version these constants were taken from
pub const LAYOUT_VERSION: &str = "1.15";

/// Code signature locating the WorldChrMan global
pub mod world_chr_man {
    /// `mov rbx, [rip+disp32]` followed by a null check of rbx
    pub const PATTERN: &str =
        "48 8B 1D ?? ?? ?? 04 48 8B F9 48 85 DB ?? ?? 8B 11 85 D2 ?? ?? 8D";
    pub const DISP_OFFSET: usize = 3;
    pub const INSTR_LEN: usize = 7;

    /// WorldChrMan -> PlayerIns -> ChrModules
    pub const PLAYER_CHAIN: [i64; 2] = [0x80, 0x1F90];
}

/// Loaded character slots hanging off WorldChrMan
pub mod chr_set {
    /// WorldChrMan -> ChrSet; the slot count is the first i32 of ChrSet
    pub const COUNT_CHAIN: [i64; 1] = [0x1D0];
    pub const COUNT_OFFSET: u64 = 0;

    /// WorldChrMan -> ChrSet -> slot array
    pub const SLOTS_CHAIN: [i64; 2] = [0x1D0, 0x8];
    pub const SLOT_STRIDE: u64 = 0x38;

    /// Slot entry -> ChrIns -> ChrModules
    pub const RECORD_CHAIN: [i64; 2] = [0x0, 0x1F90];
}

/// Sub-modules of ChrModules
pub mod modules {
    pub const STATS_CHAIN: [i64; 1] = [0x18];
    pub const PHYSICS_CHAIN: [i64; 1] = [0x68];
    pub const BEHAVIOR_CHAIN: [i64; 1] = [0x80];
}

/// SprjChrDataModule fields (all i32)
pub mod stats {
    pub const HEALTH: u64 = 0xD8;
    pub const MAX_HEALTH: u64 = 0xDC;
    pub const FOCUS: u64 = 0xE4;
    pub const MAX_FOCUS: u64 = 0xE8;
    pub const STAMINA: u64 = 0xF0;
    pub const MAX_STAMINA: u64 = 0xF4;
}

/// ChrPhysicsModule world position (f32)
pub mod physics {
    pub const POSITION_X: u64 = 0x80;
    pub const POSITION_Y: u64 = 0x84;
    pub const POSITION_Z: u64 = 0x88;
}

/// ChrBehaviorModule animation state
pub mod behavior {
    /// Current animation id (i32)
    pub const ANIMATION_ID: u64 = 0xC8;
    /// Elapsed time in the current animation (f32)
    pub const ANIMATION_TIME: u64 = 0xD0;
    /// Total length of the current animation (f32)
    pub const ANIMATION_LENGTH: u64 = 0xD4;
    /// NUL-padded UTF-16LE animation name
    pub const ANIMATION_NAME: u64 = 0x100;
    pub const ANIMATION_NAME_LEN: usize = 0x40;
}

/// Known bosses and their max HP (discriminator)
pub mod bosses {
    pub const IUDEX_GUNDYR: (&str, i32) = ("iudex_gundyr", 1037);
}
