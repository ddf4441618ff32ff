//! Logging facade and target conventions.
//!
//! The engine never depends on a specific logging backend: it logs through
//! the `log` crate's facade macros and leaves backend selection (e.g.
//! `env_logger`) to the binary crate. Targets are hierarchical strings under
//! `mcpmux::`, mirroring the module that emitted them, so a binary can filter
//! per-subsystem via `RUST_LOG=mcpmux::transport=debug`.

pub use log::{debug, error, info, trace, warn, Level, LevelFilter};

/// Canonical logging targets, one per major subsystem.
pub mod targets {
    /// The top-level crate target.
    pub const MCPMUX: &str = "mcpmux";
    /// The protocol engine / dispatcher.
    pub const ENGINE: &str = "mcpmux::engine";
    /// Transport implementations (stdio, HTTP, SSE, WebSocket).
    pub const TRANSPORT: &str = "mcpmux::transport";
    /// Session lifecycle and state transitions.
    pub const SESSION: &str = "mcpmux::session";
    /// Method dispatch / routing.
    pub const ROUTER: &str = "mcpmux::router";
    /// Resource manager (registry, cache, subscriptions).
    pub const RESOURCE: &str = "mcpmux::resource";
    /// Root manager (filesystem permission checks).
    pub const ROOT: &str = "mcpmux::root";
    /// Sampling manager (human-in-the-loop approval).
    pub const SAMPLING: &str = "mcpmux::sampling";
    /// Wire framing / codec.
    pub const CODEC: &str = "mcpmux::codec";
}

/// Whether `level` is enabled for `target`, per the active logger's filter.
#[must_use]
pub fn is_enabled(level: Level, target: &str) -> bool {
    log::log_enabled!(target: target, level)
}

/// Logs at the engine target.
#[macro_export]
macro_rules! log_engine {
    ($level:expr, $($arg:tt)+) => {
        log::log!(target: $crate::logging::targets::ENGINE, $level, $($arg)+)
    };
}

/// Logs at the transport target.
#[macro_export]
macro_rules! log_transport {
    ($level:expr, $($arg:tt)+) => {
        log::log!(target: $crate::logging::targets::TRANSPORT, $level, $($arg)+)
    };
}

/// Logs at the router target.
#[macro_export]
macro_rules! log_router {
    ($level:expr, $($arg:tt)+) => {
        log::log!(target: $crate::logging::targets::ROUTER, $level, $($arg)+)
    };
}

/// Logs at the session target.
#[macro_export]
macro_rules! log_session {
    ($level:expr, $($arg:tt)+) => {
        log::log!(target: $crate::logging::targets::SESSION, $level, $($arg)+)
    };
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn targets_are_hierarchical_under_mcpmux() {
        assert!(targets::ENGINE.starts_with(targets::MCPMUX));
        assert!(targets::TRANSPORT.starts_with(targets::MCPMUX));
        assert!(targets::SESSION.starts_with(targets::MCPMUX));
        assert!(targets::ROUTER.starts_with(targets::MCPMUX));
        assert!(targets::RESOURCE.starts_with(targets::MCPMUX));
        assert!(targets::ROOT.starts_with(targets::MCPMUX));
        assert!(targets::SAMPLING.starts_with(targets::MCPMUX));
        assert!(targets::CODEC.starts_with(targets::MCPMUX));
    }

    #[test]
    fn level_ordering_matches_log_crate() {
        assert!(Level::Error < Level::Warn);
        assert!(Level::Warn < Level::Info);
        assert!(Level::Info < Level::Debug);
        assert!(Level::Debug < Level::Trace);
    }

    #[test]
    fn is_enabled_does_not_panic_without_a_logger_installed() {
        let _ = is_enabled(Level::Debug, targets::ENGINE);
    }
}
