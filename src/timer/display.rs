//! Display sinks the timer renders into.
//!
//! The timer never owns a UI tree. It calls a `DisplaySink`, which can be a
//! web view bridge, a terminal line, or a recorder in tests.

use std::sync::atomic::{AtomicBool, Ordering};

use log::info;

use crate::models::Phase;
use crate::settings::TimerConfig;

pub trait DisplaySink: Send + Sync {
    fn render_time(&self, text: &str);
    fn render_phase_label(&self, text: &str);
    fn render_progress(&self, percentage: f64);
    fn set_phase_style(&self, phase: Phase);

    /// A locked sink receives no time/label/progress updates until unlocked.
    /// Phase styling still goes through.
    fn is_locked(&self) -> bool {
        false
    }
}

/// Discards everything.
#[derive(Debug, Default, Clone, Copy)]
pub struct NullDisplay;

impl DisplaySink for NullDisplay {
    fn render_time(&self, _text: &str) {}
    fn render_phase_label(&self, _text: &str) {}
    fn render_progress(&self, _percentage: f64) {}
    fn set_phase_style(&self, _phase: Phase) {}
}

/// Wraps another sink with a caller-controlled lock, e.g. for an overlay that
/// wants the visible number frozen while it is open.
pub struct LockableDisplay<S> {
    inner: S,
    locked: AtomicBool,
}

impl<S: DisplaySink> LockableDisplay<S> {
    pub fn new(inner: S) -> Self {
        Self {
            inner,
            locked: AtomicBool::new(false),
        }
    }

    pub fn lock(&self) {
        self.locked.store(true, Ordering::SeqCst);
    }

    pub fn unlock(&self) {
        self.locked.store(false, Ordering::SeqCst);
    }

    pub fn inner(&self) -> &S {
        &self.inner
    }
}

impl<S: DisplaySink> DisplaySink for LockableDisplay<S> {
    fn render_time(&self, text: &str) {
        self.inner.render_time(text);
    }

    fn render_phase_label(&self, text: &str) {
        self.inner.render_phase_label(text);
    }

    fn render_progress(&self, percentage: f64) {
        self.inner.render_progress(percentage);
    }

    fn set_phase_style(&self, phase: Phase) {
        self.inner.set_phase_style(phase);
    }

    fn is_locked(&self) -> bool {
        self.locked.load(Ordering::SeqCst) || self.inner.is_locked()
    }
}

/// Writes display updates to the log, tagged with the configured region ids.
pub struct ConsoleDisplay {
    timer_id: String,
    phase_id: String,
    display_id: String,
}

impl ConsoleDisplay {
    pub fn from_config(config: &TimerConfig) -> Self {
        Self {
            timer_id: config.timer_element_id.clone(),
            phase_id: config.phase_element_id.clone(),
            display_id: config.display_element_id.clone(),
        }
    }
}

impl DisplaySink for ConsoleDisplay {
    fn render_time(&self, text: &str) {
        info!("[{}] {}", self.display_id, text);
    }

    fn render_phase_label(&self, text: &str) {
        info!("[{}] {}", self.phase_id, text);
    }

    fn render_progress(&self, percentage: f64) {
        info!("[{}] progress {:.1}%", self.timer_id, percentage);
    }

    fn set_phase_style(&self, phase: Phase) {
        let info = phase.info();
        info!("[{}] {} {}", self.timer_id, info.icon, info.class_name);
    }
}
