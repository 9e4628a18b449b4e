//! Logging macros gated by a module-level `ENABLE_LOGS` flag.
//!
//! Usage:
//! ```ignore
//! const ENABLE_LOGS: bool = true;
//!
//! use crate::{log_debug, log_info, log_warn};
//!
//! log_info!("timer started for session {}", session_id);
//! ```
//!
//! The tick loop logs every second when debug output is on, so noisy modules
//! can flip their flag off without touching `RUST_LOG` filters for the rest of
//! the crate.

/// Debug-level log, only emitted when the calling module sets `ENABLE_LOGS`.
#[macro_export]
macro_rules! log_debug {
    ($($arg:tt)*) => {
        if ENABLE_LOGS {
            log::debug!($($arg)*);
        }
    };
}

/// Info-level log, only emitted when the calling module sets `ENABLE_LOGS`.
#[macro_export]
macro_rules! log_info {
    ($($arg:tt)*) => {
        if ENABLE_LOGS {
            log::info!($($arg)*);
        }
    };
}

/// Warn-level log. Recovered runtime faults (sync, storage) go through here.
#[macro_export]
macro_rules! log_warn {
    ($($arg:tt)*) => {
        if ENABLE_LOGS {
            log::warn!($($arg)*);
        }
    };
}

#[macro_export]
macro_rules! log_error {
    ($($arg:tt)*) => {
        if ENABLE_LOGS {
            log::error!($($arg)*);
        }
    };
}
