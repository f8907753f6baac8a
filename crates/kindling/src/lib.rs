//! # kindling
//!
//! Live memory introspection for a running DARK SOULS III process.
//!
//! This crate provides:
//! - Process discovery and read-only handles (Windows)
//! - Root pointer resolution via wildcard signature scanning
//! - Pointer chain walking that tolerates transient bad hops
//! - Live views of the player and boss (HP, FP, SP, position, animation)
//! - An attach state machine that survives game crashes and restarts

pub mod config;
pub mod entity;
pub mod error;
pub mod memory;
pub mod offset;
pub mod process;
pub mod reader;
pub mod session;

pub use entity::{
    AnimationClass, AnimationName, BossCatalog, CollisionPolicy, Discriminator, Entity,
    EntityCatalog, EntityRecord, MaxHpDiscriminator, Position, ResourceKind, SlotInfo,
};
pub use error::{Error, Result};
pub use memory::{
    AttachedProcess, ChainWalk, HopFailure, PointerChain, ProcessHandle, ProcessInfo,
    ProcessProvider, ReadMemory, SystemProcesses, walk,
};
pub use offset::{
    CatalogLayout, CodeSignature, EntityLayout, GameLayout, format_pattern, load_layout,
    parse_pattern, resolve_signature, save_layout, scan, scan_module,
};
pub use process::CommandRelauncher;
pub use reader::{GameReader, ReaderConfig, ReaderConfigBuilder};
pub use session::{
    AttachConfig, AttachState, Attacher, ProcessSession, RelaunchCooldown, Relauncher,
};
