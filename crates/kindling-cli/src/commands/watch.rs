//! Watch command implementation.

use std::io::{Write, stdout};
use std::path::PathBuf;
use std::sync::Arc;
use std::time::Duration;

use anyhow::Result;
use crossterm::{cursor, execute, terminal};
use kindling::{
    CommandRelauncher, Entity, GameLayout, GameReader, ReadMemory, ReaderConfig, ResourceKind,
};
use owo_colors::OwoColorize;
use tracing::{debug, info, warn};

use crate::shutdown::ShutdownSignal;

const BAR_WIDTH: usize = 30;

/// Launch command used when the game is not running.
pub struct Relaunch {
    pub program: PathBuf,
    pub args: Vec<String>,
    pub working_dir: Option<PathBuf>,
}

/// `[#####-----]` for a ratio in `0..=1`, clamped.
fn bar(ratio: f32, width: usize) -> String {
    let filled = ((ratio.clamp(0.0, 1.0) * width as f32).round() as usize).min(width);
    format!("[{}{}]", "#".repeat(filled), "-".repeat(width - filled))
}

fn resource_line<R: ReadMemory + ?Sized>(entity: &Entity<'_, R>, kind: ResourceKind) -> String {
    let label = match kind {
        ResourceKind::Health => "HP",
        ResourceKind::Focus => "FP",
        ResourceKind::Stamina => "SP",
    };
    let max = entity.max(kind);
    match (entity.current(kind), entity.normalized(kind)) {
        (Ok(current), Ok(ratio)) => {
            let bar = bar(ratio, BAR_WIDTH);
            let bar = match kind {
                ResourceKind::Health if ratio < 0.3 => bar.red().to_string(),
                ResourceKind::Health => bar.green().to_string(),
                ResourceKind::Focus => bar.blue().to_string(),
                ResourceKind::Stamina => bar.yellow().to_string(),
            };
            format!("  {label} {bar} {current:>5}/{max:<5}")
        }
        (Err(e), _) | (_, Err(e)) => format!("  {label} {}", e.dimmed()),
    }
}

fn entity_lines<R: ReadMemory + ?Sized>(title: &str, entity: &Entity<'_, R>) -> Vec<String> {
    let mut lines = vec![title.bold().to_string()];
    for kind in [ResourceKind::Health, ResourceKind::Focus, ResourceKind::Stamina] {
        lines.push(resource_line(entity, kind));
    }

    lines.push(match entity.position() {
        Ok(p) => format!("  pos ({:>9.2}, {:>9.2}, {:>9.2})", p.x, p.y, p.z),
        Err(e) => format!("  pos {}", e.dimmed()),
    });

    let code = entity
        .animation_code()
        .map(|code| code.to_string())
        .unwrap_or_else(|_| "?".to_string());
    let class = entity
        .animation_class()
        .ok()
        .flatten()
        .map(|class| class.to_string())
        .unwrap_or_default();
    let name = entity
        .animation_name()
        .ok()
        .and_then(|name| name.as_str().map(str::to_string))
        .unwrap_or_else(|| "?".to_string());
    let progress = entity
        .animation_progress()
        .map(|p| format!("{:>3.0}%", p * 100.0))
        .unwrap_or_else(|_| "  -".to_string());
    lines.push(format!("  anim {code} {name} {progress} {}", class.cyan()));
    lines
}

/// One screen of output for the current state.
fn frame(reader: &GameReader) -> Vec<String> {
    let mut lines = Vec::new();
    if let Some(session) = reader.session() {
        lines.push(format!(
            "{} PID {}  {}",
            reader.layout().process_name,
            session.pid(),
            reader.state()
        ));
    }

    match reader.player() {
        Ok(player) => {
            lines.extend(entity_lines("Player", &player));
            match reader.boss() {
                Ok(boss) => {
                    lines.extend(entity_lines(&reader.config().boss, &boss));
                    if let Ok(distance) = player.distance_to(&boss) {
                        lines.push(format!("Distance {:.2}", distance));
                    }
                }
                Err(e) => lines.push(format!("{} {}", reader.config().boss, e.dimmed())),
            }
        }
        Err(e) => lines.push(e.to_string().dimmed().to_string()),
    }
    lines
}

fn draw(lines: &[String]) -> Result<()> {
    let mut out = stdout();
    execute!(
        out,
        cursor::MoveTo(0, 0),
        terminal::Clear(terminal::ClearType::All)
    )?;
    for line in lines {
        writeln!(out, "{line}")?;
    }
    out.flush()?;
    Ok(())
}

/// Run the live display until Ctrl-C.
pub fn run(
    layout: GameLayout,
    config: ReaderConfig,
    relaunch: Option<Relaunch>,
    interval: Duration,
) -> Result<()> {
    let shutdown = Arc::new(ShutdownSignal::new());
    let shutdown_ctrlc = Arc::clone(&shutdown);
    ctrlc::set_handler(move || {
        info!("Received shutdown signal, stopping...");
        shutdown_ctrlc.trigger();
    })?;

    let process_name = config
        .process_name
        .clone()
        .unwrap_or_else(|| layout.process_name.clone());
    let mut reader = GameReader::new(layout, config)?;
    if let Some(relaunch) = relaunch {
        let mut relauncher =
            CommandRelauncher::new(&process_name, relaunch.program).args(relaunch.args);
        if let Some(dir) = relaunch.working_dir {
            relauncher = relauncher.working_dir(dir);
        }
        reader = reader.with_relauncher(relauncher);
    }

    while !shutdown.is_shutdown() {
        match reader.refresh_if_stale() {
            Ok(_) => draw(&frame(&reader))?,
            Err(e) if e.is_retryable() => {
                debug!("Not ready: {}", e);
                draw(&[format!("Waiting: {}", e).dimmed().to_string()])?;
            }
            Err(e) => {
                warn!("Giving up: {}", e);
                return Err(e.into());
            }
        }

        if shutdown.wait(interval) {
            break;
        }
    }

    reader.detach();
    Ok(())
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn test_bar() {
        assert_eq!(bar(0.5, 10), "[#####-----]");
        assert_eq!(bar(0.0, 4), "[----]");
        assert_eq!(bar(1.0, 4), "[####]");
        assert_eq!(bar(1.7, 4), "[####]");
        assert_eq!(bar(-0.3, 4), "[----]");
    }
}
