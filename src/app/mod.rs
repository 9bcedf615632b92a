pub(crate) mod catalog;
pub(crate) mod cycle;
pub(crate) mod fetch;
pub(crate) mod player;
mod signal;


use anyhow::{Context, Result};
use chrono::{DateTime, Local, Utc};
use tracing::info;

use crate::cli::{Cli, Command};
use crate::config::Config;
use crate::state::{StateRead, StateStore, next_index};

use self::catalog::{Asset, CatalogSource, VimeoCatalog};
use self::cycle::Orchestrator;
use self::fetch::MediaDir;
use self::player::PlaybackSupervisor;

pub fn run(cli: Cli, config: &Config) -> Result<()> {
    match cli.command.unwrap_or(Command::Run) {
        Command::Run => run_forever(config)?,
        Command::Catalog => run_catalog(config)?,
        Command::Status => run_status(config)?,
    }

    Ok(())
}

/// Returns only after a termination signal; cycle failures never end the loop.
fn run_forever(config: &Config) -> Result<()> {
    signal::install_shutdown_handlers()?;

    let catalog = VimeoCatalog::from_config(config).context("invalid catalog configuration")?;
    let storage = MediaDir::from_config(config);
    let player = PlaybackSupervisor::from_config(&config.player);
    let state_store = StateStore::new(&config.storage.state_file);

    info!(
        project = %config.api.project_id,
        target_secs = config.cycle.target_seconds,
        media_dir = %config.storage.media_dir.display(),
        state_file = %config.storage.state_file.display(),
        player = %config.player.program,
        "starting playback cycle"
    );

    let mut orchestrator = Orchestrator::new(
        catalog,
        storage,
        player,
        state_store,
        config.target_cycle_duration(),
    );
    orchestrator.run_until(signal::shutdown_requested);
    info!("stopped");
    Ok(())
}

fn run_catalog(config: &Config) -> Result<()> {
    let catalog = VimeoCatalog::from_config(config).context("invalid catalog configuration")?;
    let assets = catalog
        .fetch_ordered_assets()
        .context("failed to fetch catalog")?;
    if assets.is_empty() {
        println!("No playable videos in project {}.", config.api.project_id);
        return Ok(());
    }

    let state = StateStore::new(&config.storage.state_file).load().state;
    let upcoming = next_index(state.last_played_index, assets.len());
    for line in catalog_lines(&assets, upcoming) {
        println!("{line}");
    }
    Ok(())
}

/// Header plus one row per asset; `upcoming` is marked with `>`.
pub(crate) fn catalog_lines(assets: &[Asset], upcoming: Option<usize>) -> Vec<String> {
    let mut lines = Vec::with_capacity(assets.len() + 1);
    lines.push(format!(
        "{:<2} {:<5} {:<14} {:<40} {:<9} {:<10} {:>8}",
        "", "IDX", "ID", "NAME", "SOURCE", "QUALITY", "LENGTH"
    ));
    for (idx, asset) in assets.iter().enumerate() {
        let marker = if Some(idx) == upcoming { ">" } else { "" };
        lines.push(format!(
            "{:<2} {:<5} {:<14} {:<40} {:<9} {:<10} {:>8}",
            marker,
            idx,
            truncate(&asset.identifier, 14),
            truncate(&asset.display_name, 40),
            asset.link_source,
            asset.quality.as_deref().unwrap_or("-"),
            asset
                .duration_secs
                .map(format_length)
                .unwrap_or_else(|| "-".to_string())
        ));
    }
    lines
}

fn run_status(config: &Config) -> Result<()> {
    let store = StateStore::new(&config.storage.state_file);
    let read = store.load();
    for line in status_lines(config, &read) {
        println!("{line}");
    }
    Ok(())
}

pub(crate) fn status_lines(config: &Config, read: &StateRead) -> Vec<String> {
    let mut lines: Vec<String> = read
        .warnings
        .iter()
        .map(|warning| format!("Warning: {warning}"))
        .collect();

    lines.push(format!(
        "State file:      {}",
        config.storage.state_file.display()
    ));
    lines.push(format!(
        "Media directory: {}",
        config.storage.media_dir.display()
    ));
    lines.push(format!("Cycle length:    {}s", config.cycle.target_seconds));
    lines.push(if read.state.last_played_index < 0 {
        "Last played:     nothing yet".to_string()
    } else {
        format!("Last played:     index {}", read.state.last_played_index)
    });
    lines.push(format!(
        "Last cycle:      {}",
        read.state
            .last_cycle_started_at
            .map(format_timestamp)
            .unwrap_or_else(|| "never".to_string())
    ));
    lines
}

pub(crate) fn format_length(secs: u64) -> String {
    format!("{}:{:02}", secs / 60, secs % 60)
}

pub(crate) fn format_timestamp(at: DateTime<Utc>) -> String {
    at.with_timezone(&Local)
        .format("%Y-%m-%d %H:%M:%S %:z")
        .to_string()
}

pub(crate) fn truncate(s: &str, max: usize) -> String {
    let mut out = s.to_string();
    if out.chars().count() > max {
        out = out.chars().take(max.saturating_sub(3)).collect::<String>() + "...";
    }
    out
}
