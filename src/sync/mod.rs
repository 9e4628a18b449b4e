pub mod client;
pub mod source;

pub use client::{ClockSyncClient, DRIFT_WARN_THRESHOLD_MS};
pub use source::{parse_server_time, HttpTimeSource, ServerTimeSource, SyncError};
