//! Phase-aware countdown for scheduled tutoring sessions.
//!
//! A [`SessionPhaseTimer`] walks a [`SessionSchedule`] through
//! not-started, preparation, live session, overtime and ended, renders the
//! remaining time into a [`DisplaySink`], keeps a [`TimerSnapshot`] in a
//! key-value store across restarts, and checks the local clock against a
//! server-time endpoint.

mod error;
pub mod models;
pub mod settings;
pub mod store;
pub mod sync;
pub mod timer;
mod utils;

use std::{path::PathBuf, sync::Arc};

use anyhow::{anyhow, Context, Result};
use log::info;

pub use error::{TimerError, TimerResult};
pub use models::{Phase, PhaseInfo, ScheduleBounds, SessionSchedule, TimerSnapshot};
pub use settings::TimerConfig;
pub use store::{KeyValueStore, MemoryStore, SnapshotStore, SqliteStore};
pub use sync::{ClockSyncClient, HttpTimeSource, ServerTimeSource, SyncError};
pub use timer::{
    compute_timing, format_time, Clock, ConsoleDisplay, DisplaySink, LockableDisplay, ManualClock,
    NullDisplay, SessionPhaseTimer, SystemClock, TimerCallbacks, TimerOptions, TimingSample,
    Visibility,
};

const DATA_DIR_ENV: &str = "SESSION_TIMER_DATA_DIR";
const STORE_FILE: &str = "session_timer.sqlite3";

/// Entry point for the `session-timer` binary: runs one timer from a JSON
/// config file until the session ends or the process is interrupted.
pub fn run() -> Result<()> {
    // Reads RUST_LOG, defaults to info.
    env_logger::Builder::from_env(env_logger::Env::default().default_filter_or("info")).init();

    let config_path = std::env::args_os()
        .nth(1)
        .map(PathBuf::from)
        .ok_or_else(|| anyhow!("usage: session-timer <config.json>"))?;
    let config = TimerConfig::load(&config_path)?;

    info!("Session timer starting for {}", config.session_id);

    let runtime = tokio::runtime::Builder::new_multi_thread()
        .enable_all()
        .build()
        .context("failed to build tokio runtime")?;

    runtime.block_on(run_timer(config))
}

async fn run_timer(config: TimerConfig) -> Result<()> {
    let data_dir = config
        .data_dir
        .clone()
        .or_else(|| std::env::var_os(DATA_DIR_ENV).map(PathBuf::from))
        .unwrap_or_else(|| PathBuf::from("."));
    let store = SqliteStore::open(data_dir.join(STORE_FILE))?;

    let (ended_tx, mut ended_rx) = tokio::sync::watch::channel(false);
    let callbacks = TimerCallbacks::new().on_phase_change(move |new, old| {
        info!(
            "Session phase: {} -> {}",
            old.map(|phase| phase.info().label).unwrap_or("-"),
            new.info().label
        );
        if new == Phase::Ended {
            let _ = ended_tx.send(true);
        }
    });

    let display = Arc::new(ConsoleDisplay::from_config(&config));
    let timer = SessionPhaseTimer::from_config(
        &config,
        callbacks,
        display,
        SnapshotStore::new(Arc::new(store)),
    )
    .await?;

    if !timer.is_completed() {
        tokio::select! {
            _ = ended_rx.wait_for(|ended| *ended) => {}
            signal = tokio::signal::ctrl_c() => {
                signal.context("failed to listen for ctrl-c")?;
                info!("Interrupted; snapshot kept for the next run");
                timer.stop();
            }
        }
    }

    let timing = timer.get_current_timing();
    info!(
        "Timer finished in phase {} with {} remaining",
        timing.phase,
        format_time(i64::try_from(timing.display_seconds()).unwrap_or(i64::MAX))
    );
    if let Some(sync) = timer.sync_client() {
        if sync.consecutive_failures() > 0 {
            info!(
                "Server time unreachable for the last {} attempts; local clock was used",
                sync.consecutive_failures()
            );
        }
    }

    Ok(())
}
