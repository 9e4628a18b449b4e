pub mod phase;
pub mod schedule;
pub mod snapshot;

pub use phase::{Phase, PhaseInfo};
pub use schedule::{parse_scheduled_at, ScheduleBounds, SessionSchedule};
pub use snapshot::TimerSnapshot;
