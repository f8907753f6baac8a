//! Live views over character records in the game process
//!
//! An [`EntityRecord`] is what survives between reads: the resolved sub-module
//! addresses and the max values, which never change for the lifetime of a
//! character. Binding a record to a reader yields an [`Entity`], whose
//! accessors read the current values straight from foreign memory on every
//! call.

mod animation;
pub mod catalog;

use serde::{Deserialize, Serialize};
use strum::{Display, EnumIter, IntoStaticStr};
use tracing::debug;

use crate::error::{Error, Result};
use crate::memory::ReadMemory;
use crate::offset::EntityLayout;

pub use animation::{AnimationClass, AnimationName};
pub use catalog::{
    BossCatalog, CollisionPolicy, Discriminator, EntityCatalog, MaxHpDiscriminator, SlotInfo,
};

/// Character resources stored in the stats block.
#[derive(
    Debug,
    Clone,
    Copy,
    PartialEq,
    Eq,
    Hash,
    Display,
    EnumIter,
    IntoStaticStr,
    Serialize,
    Deserialize,
)]
#[strum(serialize_all = "snake_case")]
#[serde(rename_all = "snake_case")]
pub enum ResourceKind {
    Health,
    Focus,
    Stamina,
}

/// World position in game units.
#[derive(Debug, Clone, Copy, PartialEq, Default, Serialize, Deserialize)]
pub struct Position {
    pub x: f32,
    pub y: f32,
    pub z: f32,
}

impl Position {
    pub fn distance_to(&self, other: &Position) -> f32 {
        let dx = self.x - other.x;
        let dy = self.y - other.y;
        let dz = self.z - other.z;
        (dx * dx + dy * dy + dz * dz).sqrt()
    }
}

/// Max values cached at construction.
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
struct Maxima {
    health: i32,
    focus: i32,
    stamina: i32,
}

impl Maxima {
    fn get(&self, kind: ResourceKind) -> i32 {
        match kind {
            ResourceKind::Health => self.health,
            ResourceKind::Focus => self.focus,
            ResourceKind::Stamina => self.stamina,
        }
    }
}

/// Resolved addresses of one character record.
#[derive(Debug, Clone, PartialEq, Eq)]
pub struct EntityRecord {
    base: u64,
    stats: u64,
    position: u64,
    animation: u64,
    maxima: Maxima,
}

impl EntityRecord {
    /// Resolve the sub-modules of the record at `base` and cache its max values.
    pub fn resolve<R: ReadMemory + ?Sized>(
        reader: &R,
        base: u64,
        layout: &EntityLayout,
    ) -> Result<Self> {
        let stats = layout.stats.walk(reader, base);
        let position = layout.position.walk(reader, base);
        let animation = layout.animation.walk(reader, base);
        for (block, walk) in [("stats", &stats), ("position", &position), ("animation", &animation)]
        {
            if !walk.is_clean() {
                debug!(
                    "Entity 0x{:X}: {} block resolved with {} failed hop(s)",
                    base,
                    block,
                    walk.failures.len()
                );
            }
        }

        let read_max = |kind: ResourceKind| -> Result<i32> {
            let offset = layout.resource(kind).max;
            reader
                .read_i32(stats.address.wrapping_add(offset))
                .map_err(|e| Error::field(kind.into(), format!("max value: {e}")))
        };

        Ok(Self {
            base,
            stats: stats.address,
            position: position.address,
            animation: animation.address,
            maxima: Maxima {
                health: read_max(ResourceKind::Health)?,
                focus: read_max(ResourceKind::Focus)?,
                stamina: read_max(ResourceKind::Stamina)?,
            },
        })
    }

    /// Record (ChrModules) address this snapshot was built from.
    pub fn base(&self) -> u64 {
        self.base
    }

    pub fn stats_address(&self) -> u64 {
        self.stats
    }

    pub fn position_address(&self) -> u64 {
        self.position
    }

    pub fn animation_address(&self) -> u64 {
        self.animation
    }

    /// Attach this record to a reader for live reads.
    pub fn bind<'a, R: ReadMemory + ?Sized>(
        &'a self,
        reader: &'a R,
        layout: &'a EntityLayout,
    ) -> Entity<'a, R> {
        Entity {
            reader,
            layout,
            record: self,
        }
    }
}

/// Read-only live view of a character.
pub struct Entity<'a, R: ReadMemory + ?Sized> {
    reader: &'a R,
    layout: &'a EntityLayout,
    record: &'a EntityRecord,
}

impl<'a, R: ReadMemory + ?Sized> Entity<'a, R> {
    pub fn record(&self) -> &EntityRecord {
        self.record
    }

    /// Current value, read live.
    pub fn current(&self, kind: ResourceKind) -> Result<i32> {
        let offset = self.layout.resource(kind).current;
        self.reader
            .read_i32(self.record.stats.wrapping_add(offset))
            .map_err(|e| Error::field(kind.into(), e.to_string()))
    }

    /// Max value cached when the record was resolved.
    pub fn max(&self, kind: ResourceKind) -> i32 {
        self.record.maxima.get(kind)
    }

    /// `current / max`. A non-positive cached max is an error, never 0 or NaN.
    pub fn normalized(&self, kind: ResourceKind) -> Result<f32> {
        let max = self.max(kind);
        if max <= 0 {
            return Err(Error::field(
                kind.into(),
                format!("undefined ratio, max {kind} is {max}"),
            ));
        }
        let current = self.current(kind)?;
        Ok(current as f32 / max as f32)
    }

    pub fn health(&self) -> Result<i32> {
        self.current(ResourceKind::Health)
    }

    pub fn stamina(&self) -> Result<i32> {
        self.current(ResourceKind::Stamina)
    }

    pub fn focus(&self) -> Result<i32> {
        self.current(ResourceKind::Focus)
    }

    /// Three independent reads; the character may move between them.
    pub fn position(&self) -> Result<Position> {
        let offsets = self.layout.coordinates;
        let read = |offset: u64| {
            self.reader
                .read_f32(self.record.position.wrapping_add(offset))
                .map_err(|e| Error::field("position", e.to_string()))
        };
        Ok(Position {
            x: read(offsets.x)?,
            y: read(offsets.y)?,
            z: read(offsets.z)?,
        })
    }

    pub fn distance_to<S: ReadMemory + ?Sized>(&self, other: &Entity<'_, S>) -> Result<f32> {
        Ok(self.position()?.distance_to(&other.position()?))
    }

    pub fn animation_code(&self) -> Result<i32> {
        let offset = self.layout.animation_fields.code;
        self.reader
            .read_i32(self.record.animation.wrapping_add(offset))
            .map_err(|e| Error::field("animation_code", e.to_string()))
    }

    pub fn animation_class(&self) -> Result<Option<AnimationClass>> {
        Ok(AnimationClass::classify(self.animation_code()?))
    }

    /// Name of the current animation. A failed read is an error; bytes that
    /// were read but do not decode come back as [`AnimationName::Unreadable`].
    pub fn animation_name(&self) -> Result<AnimationName> {
        let fields = self.layout.animation_fields;
        let bytes = self
            .reader
            .read_bytes(self.record.animation.wrapping_add(fields.name), fields.name_len)
            .map_err(|e| Error::field("animation_name", e.to_string()))?;
        Ok(AnimationName::decode(&bytes, fields.name_len))
    }

    /// Elapsed fraction of the current animation.
    pub fn animation_progress(&self) -> Result<f32> {
        let fields = self.layout.animation_fields;
        let read = |offset: u64| {
            self.reader
                .read_f32(self.record.animation.wrapping_add(offset))
                .map_err(|e| Error::field("animation_progress", e.to_string()))
        };
        let length = read(fields.length)?;
        if !length.is_finite() || length <= 0.0 {
            return Err(Error::field(
                "animation_progress",
                format!("undefined ratio, animation length is {length}"),
            ));
        }
        Ok(read(fields.time)? / length)
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use crate::memory::{MockMemoryBuilder, MockMemoryReader};
    use crate::offset::GameLayout;

    const RECORD: u64 = 0x7FF4_0000_1000;
    const STATS: u64 = 0x7FF4_0001_0000;
    const PHYSICS: u64 = 0x7FF4_0002_0000;
    const BEHAVIOR: u64 = 0x7FF4_0003_0000;

    /// Record at `RECORD` with the given HP and stamina maxima.
    fn record_memory(builder: MockMemoryBuilder, max_hp: i32, max_sp: i32) -> MockMemoryBuilder {
        let layout = GameLayout::builtin().entity;
        builder
            .u64(RECORD + 0x18, STATS)
            .u64(RECORD + 0x68, PHYSICS)
            .u64(RECORD + 0x80, BEHAVIOR)
            .i32(STATS + layout.health.current, max_hp)
            .i32(STATS + layout.health.max, max_hp)
            .i32(STATS + layout.focus.current, 80)
            .i32(STATS + layout.focus.max, 100)
            .i32(STATS + layout.stamina.current, max_sp)
            .i32(STATS + layout.stamina.max, max_sp)
            .f32(PHYSICS + layout.coordinates.x, 1.0)
            .f32(PHYSICS + layout.coordinates.y, 2.0)
            .f32(PHYSICS + layout.coordinates.z, 3.0)
            .i32(BEHAVIOR + layout.animation_fields.code, 0)
            .f32(BEHAVIOR + layout.animation_fields.time, 0.5)
            .f32(BEHAVIOR + layout.animation_fields.length, 2.0)
    }

    fn setup() -> (MockMemoryReader, EntityLayout, EntityRecord) {
        let layout = GameLayout::builtin().entity;
        let memory = record_memory(MockMemoryBuilder::new(), 454, 93).build();
        let record = EntityRecord::resolve(&memory, RECORD, &layout).unwrap();
        (memory, layout, record)
    }

    #[test]
    fn test_resolve_caches_max_values() {
        let (memory, layout, record) = setup();
        assert_eq!(record.stats_address(), STATS);
        assert_eq!(record.position_address(), PHYSICS);
        assert_eq!(record.animation_address(), BEHAVIOR);

        let entity = record.bind(&memory, &layout);
        memory.poke_i32(STATS + layout.health.max, 9999);
        assert_eq!(entity.max(ResourceKind::Health), 454);
        assert_eq!(entity.max(ResourceKind::Stamina), 93);
        assert_eq!(entity.max(ResourceKind::Focus), 100);
    }

    #[test]
    fn test_current_values_are_live() {
        let (memory, layout, record) = setup();
        let entity = record.bind(&memory, &layout);

        assert_eq!(entity.health().unwrap(), 454);
        memory.poke_i32(STATS + layout.health.current, 200);
        assert_eq!(entity.health().unwrap(), 200);
        assert_eq!(entity.focus().unwrap(), 80);
        assert!((entity.normalized(ResourceKind::Focus).unwrap() - 0.8).abs() < 1e-6);
    }

    #[test]
    fn test_normalized_with_zero_max_is_an_error() {
        let layout = GameLayout::builtin().entity;
        let memory = record_memory(MockMemoryBuilder::new(), 0, 93).build();
        let record = EntityRecord::resolve(&memory, RECORD, &layout).unwrap();
        let entity = record.bind(&memory, &layout);

        let err = entity.normalized(ResourceKind::Health).unwrap_err();
        assert!(matches!(err, Error::FieldRead { field: "health", .. }));
        assert!((entity.normalized(ResourceKind::Stamina).unwrap() - 1.0).abs() < 1e-6);
    }

    #[test]
    fn test_failed_read_is_not_coerced_to_zero() {
        let (memory, layout, record) = setup();
        let entity = record.bind(&memory, &layout);
        memory.unmap(STATS + layout.health.current, 4);

        assert!(matches!(
            entity.health(),
            Err(Error::FieldRead { field: "health", .. })
        ));
        assert!(entity.normalized(ResourceKind::Health).is_err());
        // Other fields are unaffected
        assert_eq!(entity.stamina().unwrap(), 93);
    }

    #[test]
    fn test_position_and_distance() {
        let (memory, layout, record) = setup();
        let entity = record.bind(&memory, &layout);
        let position = entity.position().unwrap();
        assert_eq!(position, Position { x: 1.0, y: 2.0, z: 3.0 });

        let origin = Position::default();
        assert!((position.distance_to(&origin) - 14f32.sqrt()).abs() < 1e-6);
        assert_eq!(entity.distance_to(&entity).unwrap(), 0.0);

        memory.unmap(PHYSICS + layout.coordinates.z, 4);
        assert!(entity.position().is_err());
    }

    #[test]
    fn test_animation_fields() {
        let (memory, layout, record) = setup();
        let entity = record.bind(&memory, &layout);

        assert_eq!(entity.animation_code().unwrap(), 0);
        assert_eq!(entity.animation_class().unwrap(), Some(AnimationClass::Idle));
        assert!((entity.animation_progress().unwrap() - 0.25).abs() < 1e-6);

        memory.poke_f32(BEHAVIOR + layout.animation_fields.length, 0.0);
        assert!(matches!(
            entity.animation_progress(),
            Err(Error::FieldRead { field: "animation_progress", .. })
        ));
    }

    #[test]
    fn test_animation_name() {
        let (memory, layout, record) = setup();
        let fields = layout.animation_fields;
        let entity = record.bind(&memory, &layout);

        // Name bytes not mapped at all: read error
        assert!(entity.animation_name().is_err());

        let mut bytes: Vec<u8> = "Attack3000"
            .encode_utf16()
            .flat_map(|u| u.to_le_bytes())
            .collect();
        bytes.resize(fields.name_len, 0);
        memory.poke(BEHAVIOR + fields.name, &bytes);
        assert_eq!(
            entity.animation_name().unwrap(),
            AnimationName::Named("Attack3000".to_string())
        );

        memory.poke(BEHAVIOR + fields.name, &vec![0u8; fields.name_len]);
        assert_eq!(entity.animation_name().unwrap(), AnimationName::Unreadable);
    }

    #[test]
    fn test_resolve_fails_when_max_unreadable() {
        let layout = GameLayout::builtin().entity;
        let memory = MockMemoryBuilder::new().build();
        let err = EntityRecord::resolve(&memory, RECORD, &layout).unwrap_err();
        assert!(matches!(err, Error::FieldRead { .. }));
    }

    #[test]
    fn test_resolve_with_wild_stats_pointer_is_a_field_error() {
        let layout = GameLayout::builtin().entity;
        let memory = record_memory(MockMemoryBuilder::new(), 454, 93)
            .u64(RECORD + 0x18, 0xFFFF_FFFF_FFFF_FF80)
            .build();
        let err = EntityRecord::resolve(&memory, RECORD, &layout).unwrap_err();
        assert!(matches!(err, Error::FieldRead { .. }));
    }
}
