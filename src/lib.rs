mod utils;

pub mod app;
pub mod bridge;
pub mod error;
pub mod metrics;
pub mod models;
pub mod sensing;
pub mod settings;
pub mod tagger;

use std::time::Duration;

use anyhow::{Context, Result};

use app::HunterApp;
use bridge::Collaborators;
use settings::HunterSettings;

/// Grace period for blocking capture/OCR calls still running at exit.
const RUNTIME_SHUTDOWN_GRACE: Duration = Duration::from_secs(2);

pub fn run() {
    // RUST_LOG still wins over the default level.
    let level = if settings::debug_enabled() {
        log::LevelFilter::Debug
    } else {
        log::LevelFilter::Info
    };
    env_logger::Builder::new()
        .filter_level(level)
        .parse_default_env()
        .init();

    if let Err(err) = run_app() {
        log::error!("Character hunter failed: {err:#}");
        std::process::exit(1);
    }
}

fn run_app() -> Result<()> {
    let settings = HunterSettings::from_env()?;
    log::info!(
        "Watching '{}' for searches; saving to {}",
        settings.target_app,
        settings.dataset_dir.display()
    );

    let runtime = tokio::runtime::Builder::new_multi_thread()
        .enable_all()
        .build()
        .context("failed to build tokio runtime")?;

    let result = runtime.block_on(async move {
        let collaborators = Collaborators::desktop(&settings);
        let mut app = HunterApp::new(settings, collaborators)?;
        app.start().await.context("failed to start monitors")?;
        log::info!("Press Ctrl+C to stop");

        tokio::signal::ctrl_c()
            .await
            .context("failed to listen for Ctrl+C")?;
        log::info!("Shutting down");
        app.stop().await
    });

    runtime.shutdown_timeout(RUNTIME_SHUTDOWN_GRACE);
    result
}
