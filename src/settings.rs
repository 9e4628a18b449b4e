use std::{collections::BTreeMap, fs, path::Path, path::PathBuf, time::Duration};

use anyhow::{Context, Result};
use serde::{Deserialize, Serialize};

use crate::error::TimerResult;
use crate::models::{parse_scheduled_at, SessionSchedule};

const DEFAULT_DURATION_MINUTES: i64 = 30;
const DEFAULT_PREPARATION_MINUTES: i64 = 15;
const DEFAULT_ENDING_BUFFER_MINUTES: i64 = 5;

/// Construction parameters for a session timer, as passed by the host page.
#[derive(Debug, Clone, Serialize, Deserialize)]
#[serde(rename_all = "camelCase")]
pub struct TimerConfig {
    pub session_id: String,
    pub scheduled_at: String,
    #[serde(default = "default_duration")]
    pub duration_minutes: i64,
    #[serde(default = "default_preparation")]
    pub preparation_minutes: i64,
    #[serde(default = "default_ending_buffer")]
    pub ending_buffer_minutes: i64,

    #[serde(default = "default_timer_element")]
    pub timer_element_id: String,
    #[serde(default = "default_phase_element")]
    pub phase_element_id: String,
    #[serde(default = "default_display_element")]
    pub display_element_id: String,

    /// Endpoint returning `{"timestamp": ...}`. No clock sync when absent.
    #[serde(default)]
    pub server_time_url: Option<String>,
    /// Extra headers attached to every sync request (CSRF token and friends).
    #[serde(default)]
    pub sync_headers: BTreeMap<String, String>,

    #[serde(default = "default_tick_interval_ms")]
    pub tick_interval_ms: u64,
    #[serde(default = "default_persist_interval_ms")]
    pub persist_interval_ms: u64,
    #[serde(default = "default_sync_interval_secs")]
    pub sync_interval_secs: u64,

    /// Where the runner keeps its snapshot database.
    #[serde(default)]
    pub data_dir: Option<PathBuf>,
}

fn default_duration() -> i64 {
    DEFAULT_DURATION_MINUTES
}

fn default_preparation() -> i64 {
    DEFAULT_PREPARATION_MINUTES
}

fn default_ending_buffer() -> i64 {
    DEFAULT_ENDING_BUFFER_MINUTES
}

fn default_timer_element() -> String {
    "session-timer".into()
}

fn default_phase_element() -> String {
    "timer-phase".into()
}

fn default_display_element() -> String {
    "time-display".into()
}

fn default_tick_interval_ms() -> u64 {
    1_000
}

fn default_persist_interval_ms() -> u64 {
    5_000
}

fn default_sync_interval_secs() -> u64 {
    300
}

impl TimerConfig {
    pub fn new(session_id: impl Into<String>, scheduled_at: impl Into<String>) -> Self {
        Self {
            session_id: session_id.into(),
            scheduled_at: scheduled_at.into(),
            duration_minutes: DEFAULT_DURATION_MINUTES,
            preparation_minutes: DEFAULT_PREPARATION_MINUTES,
            ending_buffer_minutes: DEFAULT_ENDING_BUFFER_MINUTES,
            timer_element_id: default_timer_element(),
            phase_element_id: default_phase_element(),
            display_element_id: default_display_element(),
            server_time_url: None,
            sync_headers: BTreeMap::new(),
            tick_interval_ms: default_tick_interval_ms(),
            persist_interval_ms: default_persist_interval_ms(),
            sync_interval_secs: default_sync_interval_secs(),
            data_dir: None,
        }
    }

    pub fn load(path: &Path) -> Result<Self> {
        let contents = fs::read_to_string(path)
            .with_context(|| format!("Failed to read timer config from {}", path.display()))?;
        serde_json::from_str(&contents)
            .with_context(|| format!("Failed to parse timer config {}", path.display()))
    }

    pub fn schedule(&self) -> TimerResult<SessionSchedule> {
        SessionSchedule::new(
            self.session_id.clone(),
            parse_scheduled_at(&self.scheduled_at)?,
            self.duration_minutes,
            self.preparation_minutes,
            self.ending_buffer_minutes,
        )
    }

    pub fn tick_interval(&self) -> Duration {
        Duration::from_millis(self.tick_interval_ms.max(1))
    }

    pub fn persist_interval(&self) -> Duration {
        Duration::from_millis(self.persist_interval_ms.max(1))
    }

    pub fn sync_interval(&self) -> Duration {
        Duration::from_secs(self.sync_interval_secs.max(1))
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use crate::error::TimerError;
    use std::io::Write;

    #[test]
    fn fills_defaults_for_missing_keys() {
        let config: TimerConfig = serde_json::from_str(
            r#"{"sessionId": "academic-7", "scheduledAt": "2025-03-01T16:00:00Z"}"#,
        )
        .unwrap();

        assert_eq!(config.duration_minutes, 30);
        assert_eq!(config.preparation_minutes, 15);
        assert_eq!(config.ending_buffer_minutes, 5);
        assert_eq!(config.timer_element_id, "session-timer");
        assert_eq!(config.phase_element_id, "timer-phase");
        assert_eq!(config.display_element_id, "time-display");
        assert_eq!(config.tick_interval(), Duration::from_secs(1));
        assert_eq!(config.persist_interval(), Duration::from_secs(5));
        assert!(config.server_time_url.is_none());
    }

    #[test]
    fn explicit_zero_duration_is_rejected() {
        let config: TimerConfig = serde_json::from_str(
            r#"{"sessionId": "academic-7", "scheduledAt": "2025-03-01T16:00:00Z", "durationMinutes": 0}"#,
        )
        .unwrap();

        assert!(matches!(config.schedule(), Err(TimerError::InvalidSchedule(_))));
    }

    #[test]
    fn unparsable_start_is_an_invalid_schedule() {
        let config = TimerConfig::new("academic-7", "tomorrow");
        assert!(matches!(config.schedule(), Err(TimerError::InvalidSchedule(_))));
    }

    #[test]
    fn overflowing_schedule_is_an_invalid_schedule() {
        let mut config = TimerConfig::new("academic-7", "+262000-01-01T00:00:00");
        config.duration_minutes = i64::from(u32::MAX);
        assert!(matches!(config.schedule(), Err(TimerError::InvalidSchedule(_))));
    }

    #[test]
    fn loads_from_file() {
        let mut file = tempfile::NamedTempFile::new().unwrap();
        write!(
            file,
            r#"{{
                "sessionId": "quran-1",
                "scheduledAt": "2025-03-01 16:00:00",
                "durationMinutes": 45,
                "serverTimeUrl": "https://academy.test/api/server-time",
                "syncHeaders": {{"X-CSRF-TOKEN": "abc"}}
            }}"#
        )
        .unwrap();

        let config = TimerConfig::load(file.path()).unwrap();
        let schedule = config.schedule().unwrap();
        assert_eq!(schedule.duration_minutes(), 45);
        assert_eq!(schedule.scheduled_at_iso(), "2025-03-01T16:00:00.000Z");
        assert_eq!(config.sync_headers.get("X-CSRF-TOKEN").map(String::as_str), Some("abc"));
    }

    #[test]
    fn missing_file_reports_path() {
        let err = TimerConfig::load(Path::new("/nonexistent/timer.json")).unwrap_err();
        assert!(format!("{err:#}").contains("/nonexistent/timer.json"));
    }
}
