//! Wave-Tester: diagnostic console for the WaveService sensor-data service.

mod app;
mod config;
mod console_command;
mod error;

pub(crate) use {
    app::App,
    console_command::ConsoleCommand,
    error::{AppError, Result as AppResult},
};

use crate::config::Config;

use std::time::Duration;

use tracing::error;
use tracing_subscriber::EnvFilter;
use wave_tester_core::SimulatedWaveService;

const DEFAULT_LOG_FILTER: &str = "wave_tester=debug,wave_tester_core=debug";

/// Application entry point.
fn main() {
    // Logs go to stderr so they do not interleave with console output.
    tracing_subscriber::fmt()
        .with_env_filter(
            EnvFilter::try_from_default_env().unwrap_or_else(|_| EnvFilter::new(DEFAULT_LOG_FILTER)),
        )
        .with_writer(std::io::stderr)
        .init();

    let config = match Config::load() {
        Ok(c) => c,
        Err(e) => {
            error!("Failed to load config: {:?}", e);
            std::process::exit(1);
        }
    };

    if let Err(e) = config.validate() {
        error!("Config validation failed: {:?}", e);
        std::process::exit(1);
    }

    let rt = match tokio::runtime::Runtime::new() {
        Ok(rt) => rt,
        Err(e) => {
            error!("Failed to create tokio runtime: {:?}", e);
            std::process::exit(1);
        }
    };

    let result = rt.block_on(run(config));

    // The stdin reader blocks a runtime thread until the next line arrives.
    rt.shutdown_timeout(Duration::from_millis(200));

    if let Err(e) = result {
        error!(error = ?e, "App error");
        std::process::exit(1);
    }
}

async fn run(config: Config) -> AppResult<()> {
    let service = SimulatedWaveService::new(config.simulator.settings());
    App::new(&config, service).run().await
}
