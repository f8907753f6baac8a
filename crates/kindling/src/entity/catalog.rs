//! Character slot enumeration and boss identification
//!
//! The game keeps loaded characters in a slot array with no type or ID field we
//! know of, so a boss is picked out by a [`Discriminator`] (by default its max
//! HP). This is a heuristic: two characters sharing the value are
//! indistinguishable, and the [`CollisionPolicy`] decides which one wins.

use std::collections::BTreeMap;

use serde::{Deserialize, Serialize};
use tracing::{debug, warn};

use crate::config::catalog::MAX_SLOTS;
use crate::entity::ResourceKind;
use crate::error::{Error, Result};
use crate::memory::{PointerChain, ReadMemory};
use crate::offset::{CatalogLayout, EntityLayout};

/// Boss identifier to discriminator value (max HP).
#[derive(Debug, Clone, Default, PartialEq, Eq, Serialize, Deserialize)]
#[serde(transparent)]
pub struct BossCatalog(BTreeMap<String, i32>);

impl BossCatalog {
    pub fn from_entries<'a>(entries: impl IntoIterator<Item = (&'a str, i32)>) -> Self {
        Self(
            entries
                .into_iter()
                .map(|(name, max_hp)| (name.to_ascii_lowercase(), max_hp))
                .collect(),
        )
    }

    /// Max HP registered for `name`, case-insensitive.
    pub fn max_hp(&self, name: &str) -> Option<i32> {
        self.0.get(&name.to_ascii_lowercase()).copied()
    }

    pub fn insert(&mut self, name: &str, max_hp: i32) {
        self.0.insert(name.to_ascii_lowercase(), max_hp);
    }

    pub fn iter(&self) -> impl Iterator<Item = (&str, i32)> {
        self.0.iter().map(|(name, max_hp)| (name.as_str(), *max_hp))
    }

    pub fn len(&self) -> usize {
        self.0.len()
    }

    pub fn is_empty(&self) -> bool {
        self.0.is_empty()
    }
}

/// Decides whether a character record is the one being looked for.
pub trait Discriminator {
    /// Human readable description for logs and errors.
    fn describe(&self) -> String;

    /// The value this discriminator looks at, read from `record`.
    fn observe(&self, reader: &dyn ReadMemory, record: u64) -> Result<i64>;

    fn accepts(&self, observed: i64) -> bool;

    fn matches(&self, reader: &dyn ReadMemory, record: u64) -> Result<bool> {
        Ok(self.accepts(self.observe(reader, record)?))
    }
}

/// Matches records whose max HP equals a known value.
#[derive(Debug, Clone, PartialEq, Eq)]
pub struct MaxHpDiscriminator {
    max_hp: i32,
    stats: PointerChain,
    max_offset: u64,
}

impl MaxHpDiscriminator {
    pub fn new(max_hp: i32, layout: &EntityLayout) -> Self {
        Self {
            max_hp,
            stats: layout.stats.clone(),
            max_offset: layout.resource(ResourceKind::Health).max,
        }
    }

    pub fn max_hp(&self) -> i32 {
        self.max_hp
    }
}

impl Discriminator for MaxHpDiscriminator {
    fn describe(&self) -> String {
        format!("max HP {}", self.max_hp)
    }

    fn observe(&self, reader: &dyn ReadMemory, record: u64) -> Result<i64> {
        let stats = self.stats.walk(reader, record);
        if let Some(failure) = stats.failures.first() {
            return Err(Error::MemoryReadFailed {
                address: failure.address,
                message: failure.message.clone(),
            });
        }
        Ok(reader.read_i32(stats.address.wrapping_add(self.max_offset))? as i64)
    }

    fn accepts(&self, observed: i64) -> bool {
        observed == self.max_hp as i64
    }
}

/// Which record to return when several match.
#[derive(Debug, Clone, Copy, Default, PartialEq, Eq, Serialize, Deserialize)]
#[serde(rename_all = "snake_case")]
pub enum CollisionPolicy {
    /// Last matching slot wins. Kept as the default until it is confirmed
    /// which duplicate is actually the fight's boss.
    #[default]
    LastMatch,
    FirstMatch,
}

/// One enumerated character slot.
#[derive(Debug, Clone, PartialEq, Eq)]
pub struct SlotInfo {
    pub index: usize,
    pub record: u64,
    /// Discriminator value, `None` when the slot could not be read
    pub value: Option<i64>,
}

/// Walks the character slot array below the root pointer.
#[derive(Debug, Clone)]
pub struct EntityCatalog {
    layout: CatalogLayout,
    policy: CollisionPolicy,
}

impl EntityCatalog {
    pub fn new(layout: &CatalogLayout, policy: CollisionPolicy) -> Self {
        Self {
            layout: layout.clone(),
            policy,
        }
    }

    pub fn policy(&self) -> CollisionPolicy {
        self.policy
    }

    /// Number of occupied slots. Negative counts read as zero and implausibly
    /// large ones are clamped.
    pub fn slot_count(&self, reader: &dyn ReadMemory, root: u64) -> Result<usize> {
        let holder = self.layout.count.walk(reader, root);
        if let Some(failure) = holder.failures.first() {
            return Err(Error::MemoryReadFailed {
                address: failure.address,
                message: format!("slot count holder: {}", failure.message),
            });
        }
        let count = reader.read_i32(holder.address.wrapping_add(self.layout.count_offset))?;
        let count = usize::try_from(count).unwrap_or(0);
        if count > MAX_SLOTS {
            debug!("Slot count {} clamped to {}", count, MAX_SLOTS);
        }
        Ok(count.min(MAX_SLOTS))
    }

    /// Record address of slot `index`, or `None` when a hop failed.
    fn slot_record(&self, reader: &dyn ReadMemory, slots: u64, index: usize) -> Option<u64> {
        let shift = (index as u64).wrapping_mul(self.layout.stride) as i64;
        let mut offsets = self.layout.record.offsets().to_vec();
        let Some(first) = offsets.first_mut() else {
            return Some(slots.wrapping_add_signed(shift));
        };
        *first = first.wrapping_add(shift);

        let walk = crate::memory::walk(reader, slots, &offsets);
        if walk.is_clean() {
            Some(walk.address)
        } else {
            debug!("Slot {} skipped: {} failed hop(s)", index, walk.failures.len());
            None
        }
    }

    fn slots_base(&self, reader: &dyn ReadMemory, root: u64) -> Result<u64> {
        let slots = self.layout.slots.walk(reader, root);
        if let Some(failure) = slots.failures.first() {
            return Err(Error::MemoryReadFailed {
                address: failure.address,
                message: format!("slot array: {}", failure.message),
            });
        }
        Ok(slots.address)
    }

    /// Enumerate all slots with their discriminator values.
    pub fn list_slots(
        &self,
        reader: &dyn ReadMemory,
        root: u64,
        discriminator: &dyn Discriminator,
    ) -> Result<Vec<SlotInfo>> {
        let count = self.slot_count(reader, root)?;
        let slots = self.slots_base(reader, root)?;
        debug!("Enumerating {} slots at 0x{:X}", count, slots);

        Ok((0..count)
            .filter_map(|index| {
                let record = self.slot_record(reader, slots, index)?;
                let value = match discriminator.observe(reader, record) {
                    Ok(value) => Some(value),
                    Err(e) => {
                        debug!("Slot {} at 0x{:X} unreadable: {}", index, record, e);
                        None
                    }
                };
                Some(SlotInfo {
                    index,
                    record,
                    value,
                })
            })
            .collect())
    }

    /// Record address of the character selected by `discriminator`.
    pub fn find_entity(
        &self,
        reader: &dyn ReadMemory,
        root: u64,
        discriminator: &dyn Discriminator,
    ) -> Result<u64> {
        let candidates: Vec<SlotInfo> = self
            .list_slots(reader, root, discriminator)?
            .into_iter()
            .filter(|slot| slot.value.is_some_and(|value| discriminator.accepts(value)))
            .collect();

        if candidates.len() > 1 {
            let list = candidates
                .iter()
                .map(|slot| format!("#{} @ 0x{:X}", slot.index, slot.record))
                .collect::<Vec<_>>()
                .join(", ");
            warn!(
                "{} slots match {} ({}), using {:?}",
                candidates.len(),
                discriminator.describe(),
                list,
                self.policy
            );
        }

        let chosen = match self.policy {
            CollisionPolicy::LastMatch => candidates.last(),
            CollisionPolicy::FirstMatch => candidates.first(),
        };
        chosen
            .map(|slot| slot.record)
            .ok_or_else(|| Error::EntityNotFound(discriminator.describe()))
    }
}

#[cfg(test)]
pub(crate) mod tests {
    use super::*;
    use crate::memory::MockMemoryBuilder;
    use crate::offset::GameLayout;

    pub const ROOT: u64 = 0x7FF4_1000_0000;
    const CHR_SET: u64 = 0x7FF4_2000_0000;
    const SLOTS: u64 = 0x7FF4_3000_0000;

    /// Character set below `ROOT` holding one slot per `(record, max_hp)`.
    ///
    /// Each slot points at a ChrIns whose +0x1F90 is the record; each record's
    /// stats block sits 0x1000 past the record itself.
    pub fn world(mut builder: MockMemoryBuilder, records: &[(u64, i32)]) -> MockMemoryBuilder {
        let layout = GameLayout::builtin();
        let max_offset = layout.entity.health.max;

        builder = builder
            .u64(ROOT + 0x1D0, CHR_SET)
            .i32(CHR_SET, records.len() as i32)
            .u64(CHR_SET + 0x8, SLOTS);
        for (i, (record, max_hp)) in records.iter().enumerate() {
            let chr_ins = 0x7FF4_4000_0000 + i as u64 * 0x1_0000;
            let stats = record + 0x1000;
            builder = builder
                .u64(SLOTS + i as u64 * 0x38, chr_ins)
                .u64(chr_ins + 0x1F90, *record)
                .u64(record + 0x18, stats)
                .i32(stats + max_offset, *max_hp);
        }
        builder
    }

    fn discriminator(max_hp: i32) -> MaxHpDiscriminator {
        MaxHpDiscriminator::new(max_hp, &GameLayout::builtin().entity)
    }

    fn catalog(policy: CollisionPolicy) -> EntityCatalog {
        EntityCatalog::new(&GameLayout::builtin().catalog, policy)
    }

    #[test]
    fn test_boss_catalog_lookup_is_case_insensitive() {
        let mut bosses = BossCatalog::from_entries([("Iudex_Gundyr", 1037)]);
        bosses.insert("VORDT", 2000);
        assert_eq!(bosses.max_hp("iudex_gundyr"), Some(1037));
        assert_eq!(bosses.max_hp("Vordt"), Some(2000));
        assert_eq!(bosses.max_hp("nameless_king"), None);
        assert_eq!(bosses.len(), 2);
    }

    #[test]
    fn test_find_single_match() {
        let memory = world(
            MockMemoryBuilder::new(),
            &[(0x7FF5_0000_0000, 454), (0x7FF5_1000_0000, 1037), (0x7FF5_2000_0000, 300)],
        )
        .build();

        let found = catalog(CollisionPolicy::default())
            .find_entity(&memory, ROOT, &discriminator(1037))
            .unwrap();
        assert_eq!(found, 0x7FF5_1000_0000);
    }

    #[test]
    fn test_find_zero_matches_is_entity_not_found() {
        let memory = world(MockMemoryBuilder::new(), &[(0x7FF5_0000_0000, 454)]).build();

        let err = catalog(CollisionPolicy::default())
            .find_entity(&memory, ROOT, &discriminator(1037))
            .unwrap_err();
        assert!(matches!(err, Error::EntityNotFound(_)));
        assert!(err.is_retryable());
    }

    #[test]
    fn test_two_matches_last_wins_by_default() {
        let memory = world(
            MockMemoryBuilder::new(),
            &[(0x7FF5_0000_0000, 1037), (0x7FF5_1000_0000, 454), (0x7FF5_2000_0000, 1037)],
        )
        .build();

        let last = catalog(CollisionPolicy::LastMatch)
            .find_entity(&memory, ROOT, &discriminator(1037))
            .unwrap();
        assert_eq!(last, 0x7FF5_2000_0000);

        let first = catalog(CollisionPolicy::FirstMatch)
            .find_entity(&memory, ROOT, &discriminator(1037))
            .unwrap();
        assert_eq!(first, 0x7FF5_0000_0000);
    }

    #[test]
    fn test_unreadable_slot_is_skipped() {
        let memory = world(
            MockMemoryBuilder::new(),
            &[(0x7FF5_0000_0000, 1037), (0x7FF5_1000_0000, 454)],
        )
        .build();
        // Break the first slot's pointer
        memory.unmap(SLOTS, 8);

        let slots = catalog(CollisionPolicy::default())
            .list_slots(&memory, ROOT, &discriminator(1037))
            .unwrap();
        assert_eq!(slots.len(), 1);
        assert_eq!(slots[0].index, 1);
        assert_eq!(slots[0].value, Some(454));
    }

    #[test]
    fn test_wild_stats_pointer_leaves_slot_unvalued() {
        let memory = world(
            MockMemoryBuilder::new(),
            &[(0x7FF5_0000_0000, 1037), (0x7FF5_1000_0000, 1037)],
        )
        .build();
        memory.poke(0x7FF5_1000_0000 + 0x18, &0xFFFF_FFFF_FFFF_FF80u64.to_le_bytes());

        let catalog = catalog(CollisionPolicy::LastMatch);
        let slots = catalog
            .list_slots(&memory, ROOT, &discriminator(1037))
            .unwrap();
        assert_eq!(slots.len(), 2);
        assert_eq!(slots[1].record, 0x7FF5_1000_0000);
        assert_eq!(slots[1].value, None);

        let found = catalog
            .find_entity(&memory, ROOT, &discriminator(1037))
            .unwrap();
        assert_eq!(found, 0x7FF5_0000_0000);
    }

    #[test]
    fn test_slot_count_is_clamped() {
        let memory = world(MockMemoryBuilder::new(), &[]).build();
        let catalog = catalog(CollisionPolicy::default());

        memory.poke_i32(CHR_SET, -5);
        assert_eq!(catalog.slot_count(&memory, ROOT).unwrap(), 0);
        memory.poke_i32(CHR_SET, i32::MAX);
        assert_eq!(catalog.slot_count(&memory, ROOT).unwrap(), MAX_SLOTS);
    }

    #[test]
    fn test_missing_character_set_is_a_read_error() {
        let memory = MockMemoryBuilder::new().build();
        let err = catalog(CollisionPolicy::default())
            .find_entity(&memory, ROOT, &discriminator(1037))
            .unwrap_err();
        assert!(matches!(err, Error::MemoryReadFailed { .. }));
    }
}
