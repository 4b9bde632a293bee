pub mod analysis;
pub mod bridge;
pub mod cli;
pub mod db;
pub mod error;
pub mod models;
pub mod recorder;
pub mod replay;
pub mod sensing;
pub mod settings;
pub mod store;
mod utils;

use std::path::Path;
use std::sync::Arc;

use anyhow::{Context, Result};
use clap::Parser;
use log::info;

use bridge::X11Bridge;
use cli::{Cli, Commands};
use recorder::{commands, RecorderController};
use settings::{resolve_data_dir, SettingsStore};

pub const SCREENSHOTS_DIR: &str = "screenshots";

fn init_logging(verbose: bool) {
    let default_level = if verbose { "debug" } else { "info" };
    env_logger::Builder::from_env(env_logger::Env::default().default_filter_or(default_level))
        .init();
}

fn build_controller(data_dir: &Path) -> Result<RecorderController> {
    std::fs::create_dir_all(data_dir)
        .with_context(|| format!("failed to create data directory {}", data_dir.display()))?;

    let settings_store = SettingsStore::in_data_dir(data_dir)?;
    if settings_store.write_if_missing()? {
        info!("Wrote default settings to {}", data_dir.join(settings::SETTINGS_FILE).display());
    }
    let settings = settings_store.snapshot();
    let store = store::open_store(settings.storage.backend, data_dir)?;
    let bridge = Arc::new(X11Bridge::new(data_dir.join(SCREENSHOTS_DIR)));

    Ok(RecorderController::new(
        bridge.clone(),
        bridge,
        store,
        settings,
    ))
}

async fn dispatch(cli: Cli) -> Result<()> {
    let data_dir = resolve_data_dir(cli.data_dir);
    info!("Using data directory {}", data_dir.display());
    let controller = build_controller(&data_dir)?;

    match cli.command {
        Commands::Record { kind, duration } => {
            commands::record(&controller, kind.into(), duration).await
        }
        Commands::Replay { id, speed } => commands::replay(&controller, &id, speed).await,
        Commands::List => commands::list(&controller).await,
        Commands::Click { x, y, button } => {
            commands::click(&controller, x, y, button.into()).await
        }
        Commands::Type { text } => commands::type_text(&controller, &text).await,
        Commands::Key { name } => commands::key(&controller, &name).await,
        Commands::Screenshot => commands::screenshot(&controller).await,
        Commands::ScreenInfo => commands::screen_info(&controller).await,
    }
}

pub fn run() -> Result<()> {
    let cli = Cli::parse();
    init_logging(cli.verbose);

    let runtime = tokio::runtime::Builder::new_multi_thread()
        .enable_all()
        .build()
        .context("failed to start async runtime")?;
    runtime.block_on(dispatch(cli))
}
