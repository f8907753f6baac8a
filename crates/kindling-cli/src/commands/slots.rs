//! Slots command implementation.

use anyhow::{Context, Result};
use kindling::{BossCatalog, GameLayout, GameReader, ReaderConfig, resolve_signature};

/// Name registered for `max_hp` in the boss table, if any.
fn boss_name(bosses: &BossCatalog, max_hp: i64) -> Option<&str> {
    bosses
        .iter()
        .find(|(_, value)| *value as i64 == max_hp)
        .map(|(name, _)| name)
}

/// Print every loaded character slot with its max HP.
pub fn run(layout: GameLayout, config: ReaderConfig) -> Result<()> {
    let mut reader = GameReader::new(layout, config)?;
    reader.attach()?;

    let session = reader.session().context("attach returned without a session")?;
    let info = session.info();
    let root = resolve_signature(
        session,
        info.base_address,
        info.module_size,
        &reader.layout().root,
    )?;

    let slots = reader
        .catalog()
        .list_slots(session, root, reader.discriminator())?;
    println!("{} slots (root 0x{:X})", slots.len(), root);
    println!("{:>5}  {:<18}  {:>8}  boss", "slot", "record", "max hp");
    for slot in slots {
        let value = slot
            .value
            .map(|v| v.to_string())
            .unwrap_or_else(|| "?".to_string());
        let name = slot
            .value
            .and_then(|v| boss_name(&reader.layout().bosses, v))
            .unwrap_or("");
        println!(
            "{:>5}  0x{:<16X}  {:>8}  {}",
            slot.index, slot.record, value, name
        );
    }
    Ok(())
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn test_boss_name_lookup() {
        let bosses = BossCatalog::from_entries([("iudex_gundyr", 1037), ("vordt", 2000)]);
        assert_eq!(boss_name(&bosses, 1037), Some("iudex_gundyr"));
        assert_eq!(boss_name(&bosses, 454), None);
    }
}
