// melodytail - console music player over a remote catalog
// The player controller owns the audio device and runs on the main task;
// the console runs beside it and talks to it over a command channel.

use anyhow::Result;
use clap::Parser;
use melodytail::catalog::CatalogClient;
use melodytail::config::Config;
use melodytail::library::LikedTracksStore;
use melodytail::logging::init_logging;
use melodytail::playback::{ControllerSettings, PlayerCommand, PlayerController, QueueEngine, RodioDevice};
use melodytail::ui::{App, EventHandler};
use std::path::PathBuf;
use std::sync::Arc;
use tokio::sync::mpsc;
use tracing::{info, warn};

#[derive(Parser)]
#[command(name = "melodytail")]
#[command(about = "A console music player streaming from an online catalog")]
struct Args {
    /// Enable developer logging (stderr + debug output)
    #[arg(long)]
    dev: bool,

    /// Read settings from this file instead of the default location
    #[arg(long, value_name = "PATH")]
    config: Option<PathBuf>,

    /// Start with an empty queue instead of a random popular page
    #[arg(long)]
    no_autoload: bool,
}

#[tokio::main]
async fn main() -> Result<()> {
    let args = Args::parse();

    let config = match &args.config {
        Some(path) => Config::load_from(path)?,
        None => Config::load()?,
    };
    let _log_guard = init_logging(&config.log_dir, args.dev)?;
    info!("melodytail starting up");

    if config.catalog.client_id.is_empty() {
        warn!("No catalog client id configured; catalog requests will be rejected");
        println!("No catalog client id set - add one to the config or set JAMENDO_CLIENT_ID");
    }

    let catalog = CatalogClient::new(config.catalog.base_url.clone(), config.catalog.client_id.clone());
    let liked = LikedTracksStore::open(&config.library.liked_tracks_path);

    let mut engine = QueueEngine::new();
    engine.set_volume(config.playback.default_volume);
    let device = RodioDevice::new(config.playback.default_volume)?;
    let settings = ControllerSettings {
        page_size: config.catalog.page_size,
        prefetch_threshold: config.playback.prefetch_threshold,
        ready_timeout: config.playback.ready_timeout(),
    };
    let mut controller = PlayerController::new(device, Arc::new(catalog.clone()), settings, engine);

    let (command_tx, command_rx) = mpsc::unbounded_channel();
    if !args.no_autoload {
        command_tx.send(PlayerCommand::LoadInitial)?;
    }

    let app = App::new(catalog, liked, command_tx, controller.subscribe(), config.catalog.page_size);
    let console = tokio::spawn(app.run(EventHandler::new()));

    controller.run(command_rx).await;
    console.await??;

    info!("melodytail shut down");
    Ok(())
}
