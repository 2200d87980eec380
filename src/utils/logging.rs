//! Conditional logging macros gated on a module-level `ENABLE_LOGS` flag and
//! routed to the module's `LOG_TARGET`.
//!
//! Usage:
//! ```ignore
//! const ENABLE_LOGS: bool = true;
//! const LOG_TARGET: &str = "eyecare::session";
//!
//! use crate::{log_info, log_warn};
//!
//! log_info!("session {} started", session_id);
//! ```
//!
//! Filtering by target works with `RUST_LOG=eyecare::session=debug`.

#[macro_export]
macro_rules! log_debug {
    ($($arg:tt)*) => {
        if ENABLE_LOGS {
            log::debug!(target: LOG_TARGET, $($arg)*);
        }
    };
}

#[macro_export]
macro_rules! log_info {
    ($($arg:tt)*) => {
        if ENABLE_LOGS {
            log::info!(target: LOG_TARGET, $($arg)*);
        }
    };
}

#[macro_export]
macro_rules! log_warn {
    ($($arg:tt)*) => {
        if ENABLE_LOGS {
            log::warn!(target: LOG_TARGET, $($arg)*);
        }
    };
}

/// Errors are never gated: a module with `ENABLE_LOGS = false` still reports
/// failures.
#[macro_export]
macro_rules! log_error {
    ($($arg:tt)*) => {
        log::error!(target: LOG_TARGET, $($arg)*);
    };
}

/// Build the env_logger filter: `RUST_LOG` wins, otherwise `info`, or `debug`
/// for this crate when `debug` is set.
pub fn init(debug: bool) {
    let mut builder = env_logger::Builder::new();
    builder.filter_level(log::LevelFilter::Info);
    if debug {
        builder.filter_module("eyecare", log::LevelFilter::Debug);
        builder.filter_module("eyecare_lib", log::LevelFilter::Debug);
    }
    builder.parse_default_env();

    // A second init (tests, embedding) is harmless.
    let _ = builder.try_init();
}
