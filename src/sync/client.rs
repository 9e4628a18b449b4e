use std::sync::{
    atomic::{AtomicBool, AtomicI64, AtomicU32, Ordering},
    Arc, Mutex,
};

use chrono::{DateTime, Utc};

use crate::timer::Clock;

use super::source::ServerTimeSource;

const ENABLE_LOGS: bool = true;

use crate::{log_debug, log_info, log_warn};

/// Drift beyond this is reported.
pub const DRIFT_WARN_THRESHOLD_MS: i64 = 5_000;

/// Measures how far the local clock is from the server's.
///
/// Drift is observed and exposed, never applied to a schedule.
pub struct ClockSyncClient {
    source: Arc<dyn ServerTimeSource>,
    clock: Arc<dyn Clock>,
    in_flight: AtomicBool,
    last_drift_ms: AtomicI64,
    has_drift: AtomicBool,
    consecutive_failures: AtomicU32,
    last_synced_at: Mutex<Option<DateTime<Utc>>>,
}

/// Clears the in-flight flag however `sync` exits.
struct InFlight<'a>(&'a AtomicBool);

impl Drop for InFlight<'_> {
    fn drop(&mut self) {
        self.0.store(false, Ordering::Release);
    }
}

impl ClockSyncClient {
    pub fn new(source: Arc<dyn ServerTimeSource>, clock: Arc<dyn Clock>) -> Self {
        Self {
            source,
            clock,
            in_flight: AtomicBool::new(false),
            last_drift_ms: AtomicI64::new(0),
            has_drift: AtomicBool::new(false),
            consecutive_failures: AtomicU32::new(0),
            last_synced_at: Mutex::new(None),
        }
    }

    /// Fetches server time once and returns `server - local` in milliseconds.
    ///
    /// Returns `None` when the fetch fails or another sync is still running.
    pub async fn sync(&self) -> Option<i64> {
        if self
            .in_flight
            .compare_exchange(false, true, Ordering::AcqRel, Ordering::Acquire)
            .is_err()
        {
            log_debug!("Clock sync already in flight; skipping");
            return None;
        }
        let _guard = InFlight(&self.in_flight);

        match self.source.fetch_server_time().await {
            Ok(server_time) => {
                let local_time = self.clock.now();
                let drift = (server_time - local_time).num_milliseconds();

                self.last_drift_ms.store(drift, Ordering::Release);
                self.has_drift.store(true, Ordering::Release);
                self.consecutive_failures.store(0, Ordering::Release);
                *self.synced_at_slot() = Some(local_time);

                if drift.abs() > DRIFT_WARN_THRESHOLD_MS {
                    log_warn!("Clock drift detected: {drift}ms (server {server_time}, local {local_time})");
                } else {
                    log_debug!("Clock in sync, drift {drift}ms");
                }
                Some(drift)
            }
            Err(err) => {
                let failures = self.consecutive_failures.fetch_add(1, Ordering::AcqRel) + 1;
                log_warn!("Failed to sync with server time ({failures} in a row): {err}");
                if failures == 1 {
                    log_info!("Falling back to local clock until server time is reachable");
                }
                None
            }
        }
    }

    pub fn last_drift_ms(&self) -> Option<i64> {
        self.has_drift
            .load(Ordering::Acquire)
            .then(|| self.last_drift_ms.load(Ordering::Acquire))
    }

    /// Sync failures since the last success. A rising count means the timer is
    /// running on the local clock alone.
    pub fn consecutive_failures(&self) -> u32 {
        self.consecutive_failures.load(Ordering::Acquire)
    }

    pub fn last_synced_at(&self) -> Option<DateTime<Utc>> {
        *self.synced_at_slot()
    }

    pub fn is_in_flight(&self) -> bool {
        self.in_flight.load(Ordering::Acquire)
    }

    fn synced_at_slot(&self) -> std::sync::MutexGuard<'_, Option<DateTime<Utc>>> {
        match self.last_synced_at.lock() {
            Ok(guard) => guard,
            Err(poisoned) => poisoned.into_inner(),
        }
    }
}
