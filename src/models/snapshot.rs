use chrono::{DateTime, Utc};
use serde::{Deserialize, Serialize};

use super::{Phase, SessionSchedule};

/// Persisted point-in-time record of a timer, used for display continuity
/// across reloads. Never the source of truth for the current phase.
#[derive(Debug, Clone, PartialEq, Eq, Serialize, Deserialize)]
#[serde(rename_all = "camelCase")]
pub struct TimerSnapshot {
    pub session_id: String,
    pub current_phase: Option<Phase>,
    /// Epoch milliseconds of the write.
    #[serde(rename = "lastUpdate")]
    pub last_update_timestamp: i64,
    pub scheduled_at: String,
    pub duration_minutes: u32,
    pub preparation_minutes: u32,
}

impl TimerSnapshot {
    pub fn capture(schedule: &SessionSchedule, phase: Option<Phase>, now: DateTime<Utc>) -> Self {
        Self {
            session_id: schedule.session_id().to_string(),
            current_phase: phase,
            last_update_timestamp: now.timestamp_millis(),
            scheduled_at: schedule.scheduled_at_iso(),
            duration_minutes: schedule.duration_minutes(),
            preparation_minutes: schedule.preparation_minutes(),
        }
    }

    /// A snapshot only belongs to a schedule when both the session id and the
    /// scheduled start match exactly.
    pub fn matches(&self, schedule: &SessionSchedule) -> bool {
        self.session_id == schedule.session_id() && self.scheduled_at == schedule.scheduled_at_iso()
    }
}
