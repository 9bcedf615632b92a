//! The fixed-cadence cycle loop.
//!
//! Each cycle stops the old player, clears local media, resolves the
//! catalog, downloads the next asset, records progress and launches the
//! new player. Cycle start instants are spaced `target` apart: the sleep at
//! the end of a cycle is whatever remains of `target` after the work, and
//! zero when the work overran.

use std::path::PathBuf;
use std::thread;
use std::time::{Duration, Instant};

use chrono::Utc;
use tracing::{debug, error, info, warn};

use super::catalog::CatalogSource;
use super::fetch::AssetStore;
use super::player::Player;
use crate::state::{CycleState, StateStore};

const SLEEP_SLICE: Duration = Duration::from_millis(250);

#[derive(Debug, Clone, PartialEq, Eq)]
pub enum CycleOutcome {
    Played {
        index: usize,
        asset_id: String,
        path: PathBuf,
    },
    NoContent,
    CatalogFailed,
    DownloadFailed {
        index: usize,
        asset_id: String,
    },
    /// The asset was downloaded and progress recorded, but no player started.
    LaunchFailed {
        index: usize,
        asset_id: String,
    },
}

#[derive(Debug, Clone)]
pub struct CycleReport {
    pub number: u64,
    pub outcome: CycleOutcome,
    pub elapsed: Duration,
    pub sleep: Duration,
}

pub fn sleep_duration(target: Duration, elapsed: Duration) -> Duration {
    target.saturating_sub(elapsed)
}

pub struct Orchestrator<C, S, P> {
    catalog: C,
    storage: S,
    player: P,
    state_store: StateStore,
    target: Duration,
    cycles: u64,
}

impl<C, S, P> Orchestrator<C, S, P>
where
    C: CatalogSource,
    S: AssetStore,
    P: Player,
{
    pub fn new(
        catalog: C,
        storage: S,
        player: P,
        state_store: StateStore,
        target: Duration,
    ) -> Self {
        Self {
            catalog,
            storage,
            player,
            state_store,
            target,
            cycles: 0,
        }
    }

    /// Loops until `should_stop` returns true, then stops the player.
    /// `should_stop` is polled before every cycle and throughout the sleep.
    pub fn run_until<F>(&mut self, mut should_stop: F)
    where
        F: FnMut() -> bool,
    {
        while !should_stop() {
            let cycle_start = Instant::now();
            let report = self.run_once(cycle_start);
            info!(
                cycle = report.number,
                outcome = ?report.outcome,
                elapsed_ms = report.elapsed.as_millis() as u64,
                sleep_ms = report.sleep.as_millis() as u64,
                "cycle finished"
            );
            sleep_until(cycle_start.checked_add(self.target), &mut should_stop);
        }

        info!("shutdown requested; stopping player");
        self.player.stop_if_running();
    }

    /// One cycle: reads the persisted state, runs the step, and reports how
    /// long the caller should sleep to keep the cadence.
    pub fn run_once(&mut self, cycle_start: Instant) -> CycleReport {
        self.cycles += 1;
        info!(cycle = self.cycles, started_at = %Utc::now().to_rfc3339(), "starting cycle");

        let read = self.state_store.load();
        for warning in &read.warnings {
            warn!("{warning}");
        }
        let (_, outcome) = self.run_cycle(read.state);

        let elapsed = cycle_start.elapsed();
        CycleReport {
            number: self.cycles,
            outcome,
            elapsed,
            sleep: sleep_duration(self.target, elapsed),
        }
    }

    /// Takes the current state by value and hands back the state that is now
    /// persisted. Every failure here is logged and degrades to "no new
    /// playback this cycle".
    pub fn run_cycle(&mut self, state: CycleState) -> (CycleState, CycleOutcome) {
        let started_at = Utc::now();

        let stopped = self.player.stop_if_running();
        debug!(?stopped, "previous player handled");

        if let Err(err) = self.storage.clear() {
            warn!(stage = "clear", error = %err, "could not clear media directory; continuing");
        }

        let assets = match self.catalog.fetch_ordered_assets() {
            Ok(assets) => assets,
            Err(err) => {
                error!(stage = "catalog", error = %err, "catalog fetch failed; skipping playback");
                return (state, CycleOutcome::CatalogFailed);
            }
        };
        let Some(index) = state.next_index(assets.len()) else {
            warn!(stage = "catalog", "catalog is empty; nothing to play this cycle");
            return (state, CycleOutcome::NoContent);
        };
        let asset = &assets[index];
        info!(
            index,
            of = assets.len(),
            id = %asset.identifier,
            name = %asset.display_name,
            source = %asset.link_source,
            quality = asset.quality.as_deref().unwrap_or("n/a"),
            "selected next asset"
        );

        let path = match self.storage.download(asset) {
            Ok(path) => path,
            Err(err) => {
                error!(
                    stage = "download",
                    id = %asset.identifier,
                    url = %asset.download_url,
                    error = %err,
                    "download failed; progress unchanged"
                );
                return (
                    state,
                    CycleOutcome::DownloadFailed {
                        index,
                        asset_id: asset.identifier.clone(),
                    },
                );
            }
        };

        let next_state = state.advanced(index, started_at);
        if let Err(err) = self.state_store.save(&next_state) {
            error!(
                stage = "state",
                path = %self.state_store.path().display(),
                error = %err,
                "could not persist progress"
            );
        }

        let outcome = match self.player.launch(&path) {
            Ok(()) => CycleOutcome::Played {
                index,
                asset_id: asset.identifier.clone(),
                path,
            },
            Err(err) => {
                error!(
                    stage = "launch",
                    id = %asset.identifier,
                    error = %err,
                    "player launch failed"
                );
                CycleOutcome::LaunchFailed {
                    index,
                    asset_id: asset.identifier.clone(),
                }
            }
        };
        (next_state, outcome)
    }
}

/// A `None` deadline lies beyond what `Instant` can represent; only
/// `should_stop` ends that sleep.
fn sleep_until<F>(deadline: Option<Instant>, should_stop: &mut F)
where
    F: FnMut() -> bool,
{
    loop {
        if should_stop() {
            return;
        }
        let slice = match deadline {
            Some(deadline) => {
                let now = Instant::now();
                if now >= deadline {
                    return;
                }
                SLEEP_SLICE.min(deadline - now)
            }
            None => SLEEP_SLICE,
        };
        thread::sleep(slice);
    }
}
