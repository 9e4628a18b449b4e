use thiserror::Error;

/// Errors surfaced to callers of the timer API.
///
/// Runtime faults inside the tick loop (sync, storage) never reach this type;
/// they are logged and swallowed where they happen.
#[derive(Debug, Error)]
pub enum TimerError {
    #[error("invalid schedule: {0}")]
    InvalidSchedule(String),

    #[error("configuration error: {0:#}")]
    Config(#[source] anyhow::Error),
}

pub type TimerResult<T> = std::result::Result<T, TimerError>;
