mod app;
mod cli;
mod config;
mod error;
mod http;
mod logging;
mod paths;
mod state;

use anyhow::{Context, Result};
use clap::Parser;

use crate::config::Config;

fn main() -> Result<()> {
    let cli = cli::Cli::parse();
    let (config, sources) =
        Config::load(cli.config.as_deref()).context("failed to load configuration")?;
    let _log_guard = logging::init(&config.log);

    tracing::info!(
        files = ?sources.files,
        env_overrides = ?sources.env_overrides,
        "configuration loaded"
    );
    app::run(cli, &config)
}
