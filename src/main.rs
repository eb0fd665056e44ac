use std::io;
use std::path::PathBuf;

use clap::Parser;
use env_logger::Env;
use log::info;

mod config;
mod deploy;
mod engine;
mod env;
mod installer;
mod locator;
mod logging;
mod networking;
mod process;
mod ui;
mod util;
mod validation;

use crate::config::PatcherConfig;
use crate::engine::PatcherEngine;
use crate::locator::HttpLocator;
use crate::ui::Console;

#[derive(Parser, Debug)]
#[command(
    name = "Valheim BepInEx Patcher",
    author,
    version,
    about = "Keeps BepInEx patch files current and overlays them onto a Valheim install"
)]
struct Cli {
    /// Load settings from this JSON file instead of `patcher.json` next to the executable.
    #[arg(long, value_name = "PATH")]
    config: Option<PathBuf>,
    /// Patch this Valheim installation instead of the configured one.
    #[arg(long, value_name = "PATH")]
    target_dir: Option<PathBuf>,
    /// Print the resolved settings and exit.
    #[arg(long)]
    print_config: bool,
    /// Print patcher version and exit without starting the menu.
    #[arg(long)]
    version_only: bool,
}

#[tokio::main(flavor = "current_thread")]
async fn main() {
    let cli = Cli::parse();
    if cli.version_only {
        println!("Valheim BepInEx Patcher {}", env!("CARGO_PKG_VERSION"));
        return;
    }

    let mut config = match PatcherConfig::load(cli.config.as_deref()) {
        Ok(config) => config,
        Err(err) => {
            eprintln!("Unable to load configuration: {err}");
            return;
        }
    };
    if let Some(target_dir) = cli.target_dir {
        config.target_dir = target_dir;
    }
    if cli.print_config {
        print!("{config}");
        return;
    }

    if let Err(err) = env::ensure_base_dirs(&config) {
        eprintln!("Unable to create patcher folders: {err}");
        return;
    }
    if let Err(err) = logging::init(&config.logging) {
        eprintln!("{err}; logging to stderr instead");
        let _ = env_logger::Builder::from_env(Env::default().default_filter_or("info")).try_init();
    }
    logging::session_start();
    info!("config: target {}", config.target_dir.display());

    let mut engine = PatcherEngine::new(config, HttpLocator::new());
    let mut console = Console::new(io::stdin().lock(), io::stdout(), ui::keys::detect());
    ui::run(&mut engine, &mut console).await;
    logging::session_end();
}
