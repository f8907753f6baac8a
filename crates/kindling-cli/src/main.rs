use std::path::{Path, PathBuf};
use std::time::Duration;

use anyhow::Result;
use clap::{Parser, Subcommand};
use kindling::{CollisionPolicy, GameLayout, ReaderConfig};
use tracing::info;
use tracing_subscriber::EnvFilter;

mod commands;
mod shutdown;

#[derive(Parser)]
#[command(name = "kindling")]
#[command(about = "Live DARK SOULS III memory reader")]
#[command(version)]
struct Cli {
    /// Memory layout JSON (defaults to the built-in layout)
    #[arg(short, long, global = true, env = "KINDLING_LAYOUT")]
    layout: Option<PathBuf>,

    /// Boss to track, as named in the layout's boss table
    #[arg(short, long, global = true, env = "KINDLING_BOSS", default_value = "iudex_gundyr")]
    boss: String,

    /// Pick the first of several matching boss slots instead of the last
    #[arg(long, global = true)]
    first_match: bool,

    /// Seconds to wait for the game process
    #[arg(long, global = true, default_value_t = 120)]
    attach_timeout: u64,

    #[command(subcommand)]
    command: Command,
}

#[derive(Subcommand)]
enum Command {
    /// Continuously display player and boss state
    Watch {
        /// Refresh interval in milliseconds
        #[arg(short, long, default_value_t = 200)]
        interval: u64,

        /// Command that starts the game when it is not running
        #[arg(long, env = "KINDLING_RELAUNCH")]
        relaunch: Option<PathBuf>,

        /// Argument passed to the relaunch command (repeatable)
        #[arg(long = "relaunch-arg", requires = "relaunch")]
        relaunch_args: Vec<String>,

        /// Working directory for the relaunch command
        #[arg(long, requires = "relaunch")]
        relaunch_dir: Option<PathBuf>,
    },
    /// Attach once and print module info and the root pointer
    Scan,
    /// List character slots with their max HP
    Slots,
    /// Write the built-in layout as JSON
    Layout {
        /// Output file (stdout if omitted)
        #[arg(short, long)]
        output: Option<PathBuf>,
    },
}

fn load_layout(path: Option<&Path>) -> Result<GameLayout> {
    match path {
        Some(path) => {
            let layout = kindling::load_layout(path)?;
            info!("Loaded layout {} from {}", layout.version, path.display());
            Ok(layout)
        }
        None => Ok(GameLayout::builtin()),
    }
}

fn main() -> Result<()> {
    tracing_subscriber::fmt()
        .with_env_filter(EnvFilter::from_default_env().add_directive("kindling=info".parse()?))
        .with_writer(std::io::stderr)
        .init();

    let cli = Cli::parse();

    let policy = if cli.first_match {
        CollisionPolicy::FirstMatch
    } else {
        CollisionPolicy::LastMatch
    };
    let config = ReaderConfig::builder()
        .boss(&cli.boss)
        .collision_policy(policy)
        .attach_timeout(Duration::from_secs(cli.attach_timeout));

    match cli.command {
        Command::Watch {
            interval,
            relaunch,
            relaunch_args,
            relaunch_dir,
        } => {
            let layout = load_layout(cli.layout.as_deref())?;
            let relaunch = relaunch.map(|program| commands::watch::Relaunch {
                program,
                args: relaunch_args,
                working_dir: relaunch_dir,
            });
            let config = config.allow_relaunch(relaunch.is_some()).build();
            commands::watch::run(layout, config, relaunch, Duration::from_millis(interval))
        }
        Command::Scan => commands::scan::run(load_layout(cli.layout.as_deref())?, config.build()),
        Command::Slots => {
            commands::slots::run(load_layout(cli.layout.as_deref())?, config.build())
        }
        Command::Layout { output } => commands::layout::run(output.as_deref()),
    }
}
