//! Layout command implementation.

use std::path::Path;

use anyhow::Result;
use kindling::{GameLayout, save_layout};

/// Write the built-in layout to `output`, or print it.
pub fn run(output: Option<&Path>) -> Result<()> {
    let layout = GameLayout::builtin();
    match output {
        Some(path) => {
            save_layout(path, &layout)?;
            println!("Layout {} written to {}", layout.version, path.display());
        }
        None => println!("{}", serde_json::to_string_pretty(&layout)?),
    }
    Ok(())
}
