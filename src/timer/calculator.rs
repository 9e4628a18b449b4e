//! Pure mapping from `(now, schedule)` to the timing shown on screen.

use chrono::{DateTime, Utc};
use serde::Serialize;

use crate::models::{Phase, SessionSchedule};

#[derive(Debug, Clone, PartialEq, Serialize)]
#[serde(rename_all = "camelCase")]
pub struct TimingSample {
    pub phase: Phase,
    /// Whole seconds left in the current phase.
    pub time_remaining: u64,
    /// Whole seconds spent in the current phase (since session start once ended).
    pub time_elapsed: u64,
    pub total_duration: u64,
    /// 0..=100
    pub percentage: f64,
    pub now: DateTime<Utc>,
}

impl TimingSample {
    /// Seconds to put on the display for this sample.
    pub fn display_seconds(&self) -> u64 {
        if self.phase.info().counts_down {
            self.time_remaining
        } else {
            0
        }
    }

    /// The frozen sample rendered once the session has ended.
    pub fn ended(mut self) -> Self {
        self.phase = Phase::Ended;
        self.time_remaining = 0;
        self.time_elapsed = 0;
        self
    }
}

pub fn compute_timing(now: DateTime<Utc>, schedule: &SessionSchedule) -> TimingSample {
    let bounds = schedule.bounds();
    let minutes_to_secs = |minutes: u32| u64::from(minutes) * 60;

    let (phase, remaining, elapsed, total) = if now < bounds.preparation_start {
        let until_preparation = whole_seconds(now, bounds.preparation_start);
        (Phase::NotStarted, until_preparation, 0, until_preparation)
    } else if now < bounds.session_start {
        (
            Phase::Preparation,
            whole_seconds(now, bounds.session_start),
            whole_seconds(bounds.preparation_start, now),
            minutes_to_secs(schedule.preparation_minutes()),
        )
    } else if now < bounds.session_end {
        (
            Phase::Session,
            whole_seconds(now, bounds.session_end),
            whole_seconds(bounds.session_start, now),
            minutes_to_secs(schedule.duration_minutes()),
        )
    } else if now < bounds.final_end {
        (
            Phase::Overtime,
            whole_seconds(now, bounds.final_end),
            whole_seconds(bounds.session_end, now),
            minutes_to_secs(schedule.ending_buffer_minutes()),
        )
    } else {
        (
            Phase::Ended,
            0,
            whole_seconds(bounds.session_start, now),
            minutes_to_secs(schedule.duration_minutes()),
        )
    };

    let percentage = match phase {
        Phase::NotStarted => 0.0,
        _ => percentage(elapsed, total),
    };

    TimingSample {
        phase,
        time_remaining: remaining,
        time_elapsed: elapsed,
        total_duration: total,
        percentage,
        now,
    }
}

/// Floored whole seconds from `from` to `to`, clamped at zero.
fn whole_seconds(from: DateTime<Utc>, to: DateTime<Utc>) -> u64 {
    let millis = (to - from).num_milliseconds();
    u64::try_from(millis.div_euclid(1000)).unwrap_or(0)
}

fn percentage(elapsed: u64, total: u64) -> f64 {
    if total == 0 {
        return 0.0;
    }
    (elapsed as f64 / total as f64 * 100.0).clamp(0.0, 100.0)
}

/// Formats seconds as `MM:SS`, prefixed with `-` for negative input.
/// Minutes are not wrapped, so two hours render as `120:00`.
pub fn format_time(seconds: i64) -> String {
    let sign = if seconds < 0 { "-" } else { "" };
    let magnitude = seconds.unsigned_abs();
    format!("{sign}{:02}:{:02}", magnitude / 60, magnitude % 60)
}

#[cfg(test)]
mod tests {
    use super::*;
    use chrono::{Duration, TimeZone};

    fn t() -> DateTime<Utc> {
        Utc.with_ymd_and_hms(2025, 3, 1, 16, 0, 0).unwrap()
    }

    fn schedule() -> SessionSchedule {
        SessionSchedule::new("s-1", t(), 30, 15, 5).unwrap()
    }

    fn approx(a: f64, b: f64) -> bool {
        (a - b).abs() < 0.05
    }

    #[test]
    fn before_preparation_counts_down_to_preparation() {
        let sample = compute_timing(t() - Duration::minutes(20), &schedule());
        assert_eq!(sample.phase, Phase::NotStarted);
        assert_eq!(sample.time_remaining, 300);
        assert_eq!(sample.time_elapsed, 0);
        assert_eq!(sample.total_duration, 300);
        assert_eq!(sample.percentage, 0.0);
    }

    #[test]
    fn preparation_window() {
        let sample = compute_timing(t() - Duration::minutes(10), &schedule());
        assert_eq!(sample.phase, Phase::Preparation);
        assert_eq!(sample.time_remaining, 600);
        assert_eq!(sample.time_elapsed, 300);
        assert_eq!(sample.total_duration, 900);
        assert!(approx(sample.percentage, 33.3));
    }

    #[test]
    fn live_session_window() {
        let sample = compute_timing(t() + Duration::minutes(10), &schedule());
        assert_eq!(sample.phase, Phase::Session);
        assert_eq!(sample.time_remaining, 1200);
        assert_eq!(sample.time_elapsed, 600);
        assert!(approx(sample.percentage, 33.3));
    }

    #[test]
    fn overtime_counts_down_the_buffer() {
        let sample = compute_timing(t() + Duration::minutes(32), &schedule());
        assert_eq!(sample.phase, Phase::Overtime);
        assert_eq!(sample.time_remaining, 180);
        assert_eq!(sample.time_elapsed, 120);
        assert_eq!(sample.total_duration, 300);
        assert_eq!(sample.display_seconds(), 180);
    }

    #[test]
    fn after_final_end_is_ended() {
        let sample = compute_timing(t() + Duration::minutes(40), &schedule());
        assert_eq!(sample.phase, Phase::Ended);
        assert_eq!(sample.time_remaining, 0);
        assert_eq!(sample.time_elapsed, 2400);
        assert_eq!(sample.percentage, 100.0);
        assert_eq!(format_time(sample.display_seconds() as i64), "00:00");
    }

    #[test]
    fn boundaries_are_half_open() {
        let bounds = schedule().bounds();
        assert_eq!(compute_timing(bounds.preparation_start, &schedule()).phase, Phase::Preparation);
        assert_eq!(compute_timing(bounds.session_start, &schedule()).phase, Phase::Session);
        assert_eq!(compute_timing(bounds.session_end, &schedule()).phase, Phase::Overtime);
        assert_eq!(compute_timing(bounds.final_end, &schedule()).phase, Phase::Ended);
        let just_before = bounds.session_start - Duration::milliseconds(1);
        let sample = compute_timing(just_before, &schedule());
        assert_eq!(sample.phase, Phase::Preparation);
        assert_eq!(sample.time_remaining, 0);
    }

    #[test]
    fn sub_second_offsets_floor() {
        let sample = compute_timing(t() + Duration::milliseconds(1_999), &schedule());
        assert_eq!(sample.time_elapsed, 1);
        assert_eq!(sample.time_remaining, 1798);
    }

    #[test]
    fn sweep_holds_bounds_and_order() {
        let schedules = [
            schedule(),
            SessionSchedule::new("s-2", t(), 1, 0, 0).unwrap(),
            SessionSchedule::new("s-3", t(), 90, 0, 10).unwrap(),
            SessionSchedule::new("s-4", t(), 20, 5, 0).unwrap(),
        ];

        for schedule in &schedules {
            let mut now = t() - Duration::minutes(30);
            let end = t() + Duration::minutes(150);
            let mut last_phase = Phase::NotStarted;
            let mut seen = vec![];
            while now <= end {
                let sample = compute_timing(now, schedule);
                assert!(sample.phase >= last_phase, "phase went backwards at {now}");
                assert!((0.0..=100.0).contains(&sample.percentage));
                if seen.last() != Some(&sample.phase) {
                    seen.push(sample.phase);
                }
                last_phase = sample.phase;
                now += Duration::seconds(7);
            }
            assert_eq!(seen.first(), Some(&Phase::NotStarted));
            assert_eq!(seen.last(), Some(&Phase::Ended));
            if schedule.preparation_minutes() == 0 {
                assert!(!seen.contains(&Phase::Preparation));
            }
            if schedule.ending_buffer_minutes() == 0 {
                assert!(!seen.contains(&Phase::Overtime));
            }
        }
    }

    #[test]
    fn formats_minutes_and_seconds() {
        assert_eq!(format_time(125), "02:05");
        assert_eq!(format_time(0), "00:00");
        assert_eq!(format_time(-65), "-01:05");
        assert_eq!(format_time(7200), "120:00");
    }
}
