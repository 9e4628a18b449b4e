pub mod calculator;
pub mod clock;
pub mod controller;
pub mod display;
pub mod state;

pub use calculator::{compute_timing, format_time, TimingSample};
pub use clock::{Clock, ManualClock, SystemClock};
pub use controller::{SessionPhaseTimer, TimerCallbacks, TimerOptions, Visibility};
pub use display::{ConsoleDisplay, DisplaySink, LockableDisplay, NullDisplay};
pub use state::{TimerState, TimerStatus};
