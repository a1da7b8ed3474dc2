//! Filepath: src/tracing_helpers.rs
//!
//! Logging macros for chain and table events.
//!
//! With the `tracing` feature each macro is the matching `tracing` event
//! macro, so fields such as `node_id`, `kind` and `height` land in whatever
//! subscriber the embedding program installs. Without it they expand to
//! nothing and their arguments are never evaluated.
//!
//! ```bash
//! RUST_LOG=bwtree_core::append=trace cargo test --features tracing
//! ```

#[cfg(feature = "tracing")]
mod enabled {
    macro_rules! trace_log {
        ($($arg:tt)*) => { tracing::trace!($($arg)*) };
    }

    macro_rules! debug_log {
        ($($arg:tt)*) => { tracing::debug!($($arg)*) };
    }

    macro_rules! warn_log {
        ($($arg:tt)*) => { tracing::warn!($($arg)*) };
    }

    macro_rules! error_log {
        ($($arg:tt)*) => { tracing::error!($($arg)*) };
    }

    pub(crate) use {debug_log, error_log, trace_log, warn_log};
}

#[cfg(not(feature = "tracing"))]
mod disabled {
    macro_rules! trace_log {
        ($($arg:tt)*) => {};
    }

    macro_rules! debug_log {
        ($($arg:tt)*) => {};
    }

    macro_rules! warn_log {
        ($($arg:tt)*) => {};
    }

    macro_rules! error_log {
        ($($arg:tt)*) => {};
    }

    pub(crate) use {debug_log, error_log, trace_log, warn_log};
}

#[cfg(not(feature = "tracing"))]
pub(crate) use disabled::{debug_log, error_log, trace_log, warn_log};
#[cfg(feature = "tracing")]
pub(crate) use enabled::{debug_log, error_log, trace_log, warn_log};
