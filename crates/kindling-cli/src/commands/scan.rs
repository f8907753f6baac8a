//! Scan command implementation.

use anyhow::{Context, Result};
use kindling::{GameLayout, GameReader, ReaderConfig};

/// Attach, resolve the root pointer and print what was found.
pub fn run(layout: GameLayout, config: ReaderConfig) -> Result<()> {
    let mut reader = GameReader::new(layout, config)?;
    reader.attach()?;

    let session = reader.session().context("attach returned without a session")?;
    let info = session.info();
    println!("Process:     {} (PID {})", reader.layout().process_name, info.pid);
    println!("Alive:       {}", session.process().is_alive());
    println!("Module base: 0x{:X}", info.base_address);
    println!("Module size: 0x{:X}", info.module_size);
    println!("Layout:      {}", reader.layout().version);

    reader.refresh()?;
    if let Some(root) = reader.root_pointer() {
        println!("Root:        0x{:X}", root);
    }
    println!("Player:      0x{:X}", reader.player()?.record().base());
    match reader.boss() {
        Ok(boss) => println!(
            "Boss:        0x{:X} ({})",
            boss.record().base(),
            reader.config().boss
        ),
        Err(e) => println!("Boss:        {}", e),
    }
    Ok(())
}
