pub mod alerts;
pub mod audio;
pub mod commands;
pub mod error;
pub mod history;
pub mod models;
pub mod sensing;
pub mod session;
pub mod settings;
pub mod transport;
pub mod utils;

use anyhow::Context;
use clap::Parser;

pub use history::{aggregate, aggregate_at, Aggregation, HistoryService, HistoryView, Series, SeriesPoint};
pub use session::{ControllerConfig, SessionController, SessionSnapshot, StopOutcome};

/// CLI entry point: logging, settings, runtime, then the chosen command.
pub fn run() -> anyhow::Result<()> {
    let cli = commands::Cli::parse();

    utils::logging::init(settings::debug_requested());
    log::info!("EyeCare starting up...");

    let runtime = tokio::runtime::Builder::new_multi_thread()
        .enable_all()
        .build()
        .context("failed to start the async runtime")?;

    runtime.block_on(commands::dispatch(cli))
}
