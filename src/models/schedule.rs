//! Session schedule and the phase boundaries derived from it.

use chrono::{DateTime, Duration, NaiveDateTime, SecondsFormat, Utc};

use crate::error::{TimerError, TimerResult};

const NAIVE_FORMATS: [&str; 3] = ["%Y-%m-%dT%H:%M:%S%.f", "%Y-%m-%dT%H:%M:%S", "%Y-%m-%d %H:%M:%S"];

/// Immutable description of one scheduled session.
///
/// Only constructible through [`SessionSchedule::new`], so the phase bounds
/// are always representable.
#[derive(Debug, Clone, PartialEq, Eq)]
pub struct SessionSchedule {
    session_id: String,
    scheduled_at: DateTime<Utc>,
    duration_minutes: u32,
    preparation_minutes: u32,
    ending_buffer_minutes: u32,
    bounds: ScheduleBounds,
}

/// The four absolute instants that split the timeline into phases.
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub struct ScheduleBounds {
    pub preparation_start: DateTime<Utc>,
    pub session_start: DateTime<Utc>,
    pub session_end: DateTime<Utc>,
    pub final_end: DateTime<Utc>,
}

impl SessionSchedule {
    pub fn new(
        session_id: impl Into<String>,
        scheduled_at: DateTime<Utc>,
        duration_minutes: i64,
        preparation_minutes: i64,
        ending_buffer_minutes: i64,
    ) -> TimerResult<Self> {
        let session_id = session_id.into();
        if session_id.trim().is_empty() {
            return Err(TimerError::InvalidSchedule("session id must not be empty".into()));
        }
        if duration_minutes <= 0 {
            return Err(TimerError::InvalidSchedule(format!(
                "duration must be positive, got {duration_minutes} minutes"
            )));
        }
        if preparation_minutes < 0 {
            return Err(TimerError::InvalidSchedule(format!(
                "preparation must not be negative, got {preparation_minutes} minutes"
            )));
        }
        if ending_buffer_minutes < 0 {
            return Err(TimerError::InvalidSchedule(format!(
                "ending buffer must not be negative, got {ending_buffer_minutes} minutes"
            )));
        }

        let duration_minutes = to_minutes(duration_minutes, "duration")?;
        let preparation_minutes = to_minutes(preparation_minutes, "preparation")?;
        let ending_buffer_minutes = to_minutes(ending_buffer_minutes, "ending buffer")?;
        let bounds = ScheduleBounds::derive(
            scheduled_at,
            duration_minutes,
            preparation_minutes,
            ending_buffer_minutes,
        )
        .ok_or_else(|| {
            TimerError::InvalidSchedule(format!(
                "phase boundaries around {scheduled_at} fall outside the representable time range"
            ))
        })?;

        Ok(Self {
            session_id,
            scheduled_at,
            duration_minutes,
            preparation_minutes,
            ending_buffer_minutes,
            bounds,
        })
    }

    pub fn session_id(&self) -> &str {
        &self.session_id
    }

    pub fn scheduled_at(&self) -> DateTime<Utc> {
        self.scheduled_at
    }

    /// `scheduled_at` in the canonical ISO-8601 form used by snapshots
    /// (millisecond precision, `Z` suffix).
    pub fn scheduled_at_iso(&self) -> String {
        self.scheduled_at.to_rfc3339_opts(SecondsFormat::Millis, true)
    }

    pub fn duration_minutes(&self) -> u32 {
        self.duration_minutes
    }

    pub fn preparation_minutes(&self) -> u32 {
        self.preparation_minutes
    }

    pub fn ending_buffer_minutes(&self) -> u32 {
        self.ending_buffer_minutes
    }

    pub fn bounds(&self) -> ScheduleBounds {
        self.bounds
    }
}

impl ScheduleBounds {
    fn derive(
        session_start: DateTime<Utc>,
        duration_minutes: u32,
        preparation_minutes: u32,
        ending_buffer_minutes: u32,
    ) -> Option<Self> {
        let preparation_start =
            session_start.checked_sub_signed(Duration::minutes(preparation_minutes.into()))?;
        let session_end = session_start.checked_add_signed(Duration::minutes(duration_minutes.into()))?;
        let final_end = session_end.checked_add_signed(Duration::minutes(ending_buffer_minutes.into()))?;

        Some(Self {
            preparation_start,
            session_start,
            session_end,
            final_end,
        })
    }
}

fn to_minutes(value: i64, field: &str) -> TimerResult<u32> {
    u32::try_from(value)
        .map_err(|_| TimerError::InvalidSchedule(format!("{field} of {value} minutes is out of range")))
}

/// Parses a schedule timestamp. RFC 3339 strings keep their offset; naive
/// timestamps without an offset are read as UTC.
pub fn parse_scheduled_at(value: &str) -> TimerResult<DateTime<Utc>> {
    let value = value.trim();
    if let Ok(parsed) = DateTime::parse_from_rfc3339(value) {
        return Ok(parsed.with_timezone(&Utc));
    }

    NAIVE_FORMATS
        .iter()
        .find_map(|format| NaiveDateTime::parse_from_str(value, format).ok())
        .map(|naive| naive.and_utc())
        .ok_or_else(|| TimerError::InvalidSchedule(format!("invalid scheduledAt '{value}'")))
}
