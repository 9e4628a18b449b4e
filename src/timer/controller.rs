use std::{
    sync::{Arc, Mutex, MutexGuard},
    time::Duration,
};

use anyhow::Context;
use tokio::{
    task::JoinHandle,
    time::{self, Instant, MissedTickBehavior},
};
use tokio_util::sync::CancellationToken;

use crate::{
    error::{TimerError, TimerResult},
    models::{Phase, SessionSchedule, TimerSnapshot},
    settings::TimerConfig,
    store::SnapshotStore,
    sync::{ClockSyncClient, HttpTimeSource},
};

use super::{
    calculator::{compute_timing, format_time, TimingSample},
    clock::{Clock, SystemClock},
    display::DisplaySink,
    state::{TickOutcome, TimerState},
};

const ENABLE_LOGS: bool = true;

use crate::{log_debug, log_error, log_info};

pub type PhaseChangeCallback = Arc<dyn Fn(Phase, Option<Phase>) + Send + Sync>;
pub type TickCallback = Arc<dyn Fn(&TimingSample) + Send + Sync>;

/// Caller hooks. `on_phase_change` receives `(new, old)`; `old` is `None` on
/// the first evaluation when no snapshot was restored.
#[derive(Clone, Default)]
pub struct TimerCallbacks {
    on_phase_change: Option<PhaseChangeCallback>,
    on_tick: Option<TickCallback>,
}

impl TimerCallbacks {
    pub fn new() -> Self {
        Self::default()
    }

    pub fn on_phase_change<F>(mut self, callback: F) -> Self
    where
        F: Fn(Phase, Option<Phase>) + Send + Sync + 'static,
    {
        self.on_phase_change = Some(Arc::new(callback));
        self
    }

    pub fn on_tick<F>(mut self, callback: F) -> Self
    where
        F: Fn(&TimingSample) + Send + Sync + 'static,
    {
        self.on_tick = Some(Arc::new(callback));
        self
    }

    fn phase_changed(&self, new: Phase, old: Option<Phase>) {
        if let Some(callback) = &self.on_phase_change {
            callback(new, old);
        }
    }

    fn ticked(&self, sample: &TimingSample) {
        if let Some(callback) = &self.on_tick {
            callback(sample);
        }
    }
}

pub struct TimerOptions {
    pub store: SnapshotStore,
    pub clock: Arc<dyn Clock>,
    pub sync: Option<Arc<ClockSyncClient>>,
    pub tick_interval: Duration,
    pub persist_interval: Duration,
    pub sync_interval: Duration,
}

impl Default for TimerOptions {
    fn default() -> Self {
        Self {
            store: SnapshotStore::in_memory(),
            clock: Arc::new(SystemClock),
            sync: None,
            tick_interval: Duration::from_secs(1),
            persist_interval: Duration::from_secs(5),
            sync_interval: Duration::from_secs(300),
        }
    }
}

#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub enum Visibility {
    Visible,
    Hidden,
}

#[derive(Debug, Clone, Copy, PartialEq, Eq)]
enum Trigger {
    Construction,
    Tick,
}

struct Ticker {
    handle: JoinHandle<()>,
    cancel: CancellationToken,
}

#[derive(Clone, Copy)]
struct Intervals {
    tick: Duration,
    persist: Duration,
    sync: Duration,
}

/// Drives a [`SessionSchedule`] through its phases on a tokio runtime.
///
/// Cloning yields another handle to the same timer.
#[derive(Clone)]
pub struct SessionPhaseTimer {
    schedule: Arc<SessionSchedule>,
    state: Arc<Mutex<TimerState>>,
    callbacks: TimerCallbacks,
    display: Arc<dyn DisplaySink>,
    store: SnapshotStore,
    clock: Arc<dyn Clock>,
    sync: Option<Arc<ClockSyncClient>>,
    intervals: Intervals,
    ticker: Arc<Mutex<Option<Ticker>>>,
}

impl SessionPhaseTimer {
    /// Builds the timer, renders the current phase immediately and, unless the
    /// session is already over, starts ticking. Must run inside a tokio runtime.
    pub async fn new(
        schedule: SessionSchedule,
        callbacks: TimerCallbacks,
        display: Arc<dyn DisplaySink>,
        options: TimerOptions,
    ) -> Self {
        log_info!(
            "Session timer for {} scheduled at {} ({}m session, {}m preparation, {}m buffer)",
            schedule.session_id(),
            schedule.scheduled_at_iso(),
            schedule.duration_minutes(),
            schedule.preparation_minutes(),
            schedule.ending_buffer_minutes()
        );

        let timer = Self {
            schedule: Arc::new(schedule),
            state: Arc::new(Mutex::new(TimerState::new())),
            callbacks,
            display,
            store: options.store,
            clock: options.clock,
            sync: options.sync,
            intervals: Intervals {
                tick: options.tick_interval,
                persist: options.persist_interval,
                sync: options.sync_interval,
            },
            ticker: Arc::new(Mutex::new(None)),
        };

        timer.restore_previous_phase().await;

        let (outcome, sample) = timer.evaluate();
        timer.dispatch(outcome, sample, Trigger::Construction).await;

        if timer.is_completed() {
            log_info!("Session {} already ended; showing 00:00", timer.schedule.session_id());
        } else {
            timer.start();
        }

        timer
    }

    /// Validates `config` and builds a timer on the system clock, syncing
    /// against `serverTimeUrl` when one is configured.
    pub async fn from_config(
        config: &TimerConfig,
        callbacks: TimerCallbacks,
        display: Arc<dyn DisplaySink>,
        store: SnapshotStore,
    ) -> TimerResult<Self> {
        let schedule = config.schedule()?;
        let clock: Arc<dyn Clock> = Arc::new(SystemClock);

        let sync = match &config.server_time_url {
            Some(url) => {
                let source = HttpTimeSource::new(url.clone(), &config.sync_headers)
                    .with_context(|| format!("Failed to set up server time source {url}"))
                    .map_err(TimerError::Config)?;
                Some(Arc::new(ClockSyncClient::new(Arc::new(source), clock.clone())))
            }
            None => None,
        };

        let options = TimerOptions {
            store,
            clock,
            sync,
            tick_interval: config.tick_interval(),
            persist_interval: config.persist_interval(),
            sync_interval: config.sync_interval(),
        };

        Ok(Self::new(schedule, callbacks, display, options).await)
    }

    /// Starts the tick loop and fires one clock sync. No-op when already
    /// running or when the session has ended.
    pub fn start(&self) {
        if !self.lock_state().mark_running() {
            return;
        }

        let cancel = CancellationToken::new();
        let handle = self.spawn_loop(cancel.clone());
        if let Some(previous) = self.lock_ticker().replace(Ticker { handle, cancel }) {
            previous.cancel.cancel();
        }

        self.spawn_sync();
        log_info!("Timer started for session {}", self.schedule.session_id());
    }

    /// Cancels the tick loop. Persisted state is kept.
    pub fn stop(&self) {
        let _ = self.halt();
    }

    /// Stops the timer and deletes its snapshot.
    pub async fn destroy(&self) {
        if let Some(handle) = self.halt() {
            if let Err(err) = handle.await {
                if !err.is_cancelled() {
                    log_error!("Timer loop for {} failed: {err}", self.schedule.session_id());
                }
            }
        }
        self.store.clear(self.schedule.session_id()).await;
        log_info!("Timer destroyed for session {}", self.schedule.session_id());
    }

    /// One evaluation of the schedule against the clock. The tick loop calls
    /// this every interval; it is a no-op once stopped or ended.
    pub async fn tick(&self) {
        let (outcome, sample) = self.evaluate();
        self.dispatch(outcome, sample, Trigger::Tick).await;
    }

    /// Host visibility hook. Coming back to the foreground resyncs the clock
    /// and refreshes the display without waiting for the next tick.
    pub async fn handle_visibility_change(&self, visibility: Visibility) {
        if visibility != Visibility::Visible || !self.is_running() {
            return;
        }
        log_debug!("Host visible again; resyncing session {}", self.schedule.session_id());
        self.spawn_sync();
        self.tick().await;
    }

    /// Freshly computed timing for this instant. Once ended, stays ended.
    pub fn get_current_timing(&self) -> TimingSample {
        let now = self.clock.now();
        let at = if self.is_completed() {
            now.max(self.schedule.bounds().final_end)
        } else {
            now
        };
        compute_timing(at, &self.schedule)
    }

    pub fn get_time_remaining(&self) -> u64 {
        self.get_current_timing().time_remaining
    }

    pub fn is_in_phase(&self, phase: Phase) -> bool {
        self.lock_state().current_phase == Some(phase)
    }

    pub fn current_phase(&self) -> Option<Phase> {
        self.lock_state().current_phase
    }

    pub fn is_running(&self) -> bool {
        self.lock_state().is_running()
    }

    pub fn is_completed(&self) -> bool {
        self.lock_state().is_completed()
    }

    /// The sample most recently handed to the display.
    pub fn last_sample(&self) -> Option<TimingSample> {
        self.lock_state().last_sample.clone()
    }

    pub fn schedule(&self) -> &SessionSchedule {
        &self.schedule
    }

    pub fn sync_client(&self) -> Option<&Arc<ClockSyncClient>> {
        self.sync.as_ref()
    }

    async fn restore_previous_phase(&self) {
        let Some(snapshot) = self.store.restore(self.schedule.session_id()).await else {
            return;
        };

        if !snapshot.matches(&self.schedule) {
            log_info!(
                "Ignoring stored snapshot for {} (scheduled {}, expected {})",
                snapshot.session_id,
                snapshot.scheduled_at,
                self.schedule.scheduled_at_iso()
            );
            return;
        }

        if let Some(phase) = snapshot.current_phase {
            log_info!("Restored timer phase {phase} for session {}", snapshot.session_id);
            self.lock_state().seed_phase(phase);
        }
    }

    /// Reads the clock and applies the sample under one lock, so concurrent
    /// ticks are applied in clock order.
    fn evaluate(&self) -> (TickOutcome, TimingSample) {
        let mut state = self.lock_state();
        let sample = compute_timing(self.clock.now(), &self.schedule);
        let outcome = state.apply(&sample);
        (outcome, sample)
    }

    async fn dispatch(&self, outcome: TickOutcome, sample: TimingSample, trigger: Trigger) {
        match outcome {
            TickOutcome::Skipped => {}
            TickOutcome::Ended { previous, announce } => {
                let _ = self.halt();
                let shown = sample.ended();
                log_info!("Session {} ended; timer latched", self.schedule.session_id());
                if announce {
                    self.callbacks.phase_changed(Phase::Ended, previous);
                }
                if announce || trigger == Trigger::Construction {
                    self.display.set_phase_style(Phase::Ended);
                }
                if announce {
                    self.persist().await;
                }
                self.render(&shown);
            }
            TickOutcome::Changed { previous } => {
                log_info!(
                    "Phase changed: {} -> {}",
                    previous.map(|p| p.as_str()).unwrap_or("none"),
                    sample.phase
                );
                self.callbacks.phase_changed(sample.phase, previous);
                self.display.set_phase_style(sample.phase);
                self.persist().await;
                self.render(&sample);
                if trigger == Trigger::Tick {
                    self.callbacks.ticked(&sample);
                }
            }
            TickOutcome::Unchanged => {
                if trigger == Trigger::Construction {
                    self.display.set_phase_style(sample.phase);
                }
                self.render(&sample);
                if trigger == Trigger::Tick {
                    self.callbacks.ticked(&sample);
                }
            }
        }
    }

    fn render(&self, sample: &TimingSample) {
        if self.display.is_locked() {
            return;
        }
        let seconds = i64::try_from(sample.display_seconds()).unwrap_or(i64::MAX);
        self.display.render_time(&format_time(seconds));
        self.display.render_phase_label(sample.phase.info().label);
        self.display.render_progress(sample.percentage);
    }

    async fn persist(&self) {
        let phase = self.current_phase();
        let snapshot = TimerSnapshot::capture(&self.schedule, phase, self.clock.now());
        self.store.save(&snapshot).await;
    }

    fn spawn_sync(&self) {
        if let Some(sync) = &self.sync {
            let sync = sync.clone();
            tokio::spawn(async move {
                sync.sync().await;
            });
        }
    }

    fn spawn_loop(&self, cancel: CancellationToken) -> JoinHandle<()> {
        let timer = self.clone();
        let intervals = self.intervals;

        tokio::spawn(async move {
            let started = Instant::now();
            let mut tick = every(started, intervals.tick);
            let mut persist = every(started, intervals.persist);
            let mut sync = every(started, intervals.sync);

            loop {
                tokio::select! {
                    biased;
                    _ = cancel.cancelled() => break,
                    _ = tick.tick() => {
                        timer.tick().await;
                        if timer.is_completed() {
                            break;
                        }
                    }
                    _ = persist.tick() => timer.persist().await,
                    _ = sync.tick() => timer.spawn_sync(),
                }
            }

            log_debug!("Timer loop exited for session {}", timer.schedule.session_id());
        })
    }

    /// Cancels the loop and hands back its task for callers that want to wait.
    fn halt(&self) -> Option<JoinHandle<()>> {
        if self.lock_state().stop() {
            log_info!("Timer stopped for session {}", self.schedule.session_id());
        }
        self.lock_ticker().take().map(|ticker| {
            ticker.cancel.cancel();
            ticker.handle
        })
    }

    fn lock_state(&self) -> MutexGuard<'_, TimerState> {
        match self.state.lock() {
            Ok(guard) => guard,
            Err(poisoned) => poisoned.into_inner(),
        }
    }

    fn lock_ticker(&self) -> MutexGuard<'_, Option<Ticker>> {
        match self.ticker.lock() {
            Ok(guard) => guard,
            Err(poisoned) => poisoned.into_inner(),
        }
    }
}

/// Repeating interval whose first tick is one period out.
fn every(start: Instant, period: Duration) -> time::Interval {
    let period = period.max(Duration::from_millis(1));
    let mut interval = time::interval_at(start + period, period);
    interval.set_missed_tick_behavior(MissedTickBehavior::Delay);
    interval
}
