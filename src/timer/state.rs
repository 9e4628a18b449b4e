use serde::{Deserialize, Serialize};

use crate::models::Phase;

use super::calculator::TimingSample;

#[derive(Debug, Clone, Copy, Serialize, Deserialize, PartialEq, Eq, Default)]
#[serde(rename_all = "camelCase")]
pub enum TimerStatus {
    #[default]
    Idle,
    Running,
    Stopped,
    /// Session ended. Terminal.
    Completed,
}

/// What a tick decided, computed under the state lock and acted on outside it.
#[derive(Debug, Clone, PartialEq)]
pub enum TickOutcome {
    /// Latched or stopped; nothing to do.
    Skipped,
    Ended { previous: Option<Phase>, announce: bool },
    Changed { previous: Option<Phase> },
    Unchanged,
}

#[derive(Debug, Clone, Default)]
pub struct TimerState {
    pub status: TimerStatus,
    pub current_phase: Option<Phase>,
    pub last_sample: Option<TimingSample>,
}

impl TimerState {
    pub fn new() -> Self {
        Self::default()
    }

    pub fn is_completed(&self) -> bool {
        self.status == TimerStatus::Completed
    }

    pub fn is_running(&self) -> bool {
        self.status == TimerStatus::Running
    }

    /// Seeds the phase from a restored snapshot before the first evaluation.
    pub fn seed_phase(&mut self, phase: Phase) {
        if self.current_phase.is_none() {
            self.current_phase = Some(phase);
        }
    }

    /// Returns the previous phase when `phase` differs from the current one.
    pub fn transition(&mut self, phase: Phase) -> Option<Option<Phase>> {
        if self.current_phase == Some(phase) {
            return None;
        }
        let previous = self.current_phase.replace(phase);
        Some(previous)
    }

    pub fn mark_running(&mut self) -> bool {
        match self.status {
            TimerStatus::Running | TimerStatus::Completed => false,
            TimerStatus::Idle | TimerStatus::Stopped => {
                self.status = TimerStatus::Running;
                true
            }
        }
    }

    pub fn stop(&mut self) -> bool {
        if self.status == TimerStatus::Running {
            self.status = TimerStatus::Stopped;
            true
        } else {
            false
        }
    }

    /// Latches the ENDED phase. Returns the outcome for the caller to act on.
    pub fn latch(&mut self) -> TickOutcome {
        let previous = self.current_phase;
        let announce = previous != Some(Phase::Ended);
        self.current_phase = Some(Phase::Ended);
        self.status = TimerStatus::Completed;
        TickOutcome::Ended { previous, announce }
    }

    /// Applies a freshly computed sample. `Idle` still evaluates so the
    /// construction pass can render before the loop starts.
    pub fn apply(&mut self, sample: &TimingSample) -> TickOutcome {
        if matches!(self.status, TimerStatus::Completed | TimerStatus::Stopped) {
            return TickOutcome::Skipped;
        }
        if sample.phase.is_terminal() {
            let outcome = self.latch();
            self.last_sample = Some(sample.clone().ended());
            return outcome;
        }

        self.last_sample = Some(sample.clone());
        match self.transition(sample.phase) {
            Some(previous) => TickOutcome::Changed { previous },
            None => TickOutcome::Unchanged,
        }
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use chrono::Utc;

    fn sample(phase: Phase) -> TimingSample {
        TimingSample {
            phase,
            time_remaining: 42,
            time_elapsed: 10,
            total_duration: 60,
            percentage: 16.0,
            now: Utc::now(),
        }
    }

    #[test]
    fn reports_transitions_once() {
        let mut state = TimerState::new();
        assert_eq!(state.apply(&sample(Phase::Preparation)), TickOutcome::Changed { previous: None });
        assert_eq!(state.apply(&sample(Phase::Preparation)), TickOutcome::Unchanged);
        assert_eq!(
            state.apply(&sample(Phase::Session)),
            TickOutcome::Changed {
                previous: Some(Phase::Preparation)
            }
        );
    }

    #[test]
    fn ended_latches_and_forces_zero() {
        let mut state = TimerState::new();
        state.apply(&sample(Phase::Overtime));
        assert_eq!(
            state.apply(&sample(Phase::Ended)),
            TickOutcome::Ended {
                previous: Some(Phase::Overtime),
                announce: true
            }
        );
        let shown = state.last_sample.clone().unwrap();
        assert_eq!((shown.time_remaining, shown.time_elapsed), (0, 0));
        assert!(state.is_completed());

        assert_eq!(state.apply(&sample(Phase::Session)), TickOutcome::Skipped);
        assert!(!state.mark_running());
    }

    #[test]
    fn restored_ended_phase_is_not_reannounced() {
        let mut state = TimerState::new();
        state.seed_phase(Phase::Ended);
        assert_eq!(
            state.apply(&sample(Phase::Ended)),
            TickOutcome::Ended {
                previous: Some(Phase::Ended),
                announce: false
            }
        );
    }

    #[test]
    fn stopped_timer_skips_samples() {
        let mut state = TimerState::new();
        state.apply(&sample(Phase::Preparation));
        state.mark_running();
        state.stop();

        assert_eq!(state.apply(&sample(Phase::Session)), TickOutcome::Skipped);
        assert_eq!(state.current_phase, Some(Phase::Preparation));

        state.mark_running();
        assert_eq!(
            state.apply(&sample(Phase::Session)),
            TickOutcome::Changed {
                previous: Some(Phase::Preparation)
            }
        );
    }

    #[test]
    fn start_and_stop_are_idempotent() {
        let mut state = TimerState::new();
        assert!(state.mark_running());
        assert!(!state.mark_running());
        assert!(state.stop());
        assert!(!state.stop());
        assert!(state.mark_running());
    }
}
