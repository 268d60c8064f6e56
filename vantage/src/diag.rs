//! Internal diagnostics for the SDK itself.
//!
//! The `sdk_debug!`, `sdk_info!`, `sdk_warn!` and `sdk_error!` macros are
//! intended for use **inside SDK components** (processors, exporters,
//! readers) to report their own health without feeding records back into the
//! telemetry pipeline. They emit through [`tracing`] when the
//! `internal-logs` feature is enabled and compile to nothing otherwise.
//!
//! The emission threshold is a process-wide atomic read from
//! `OTEL_LOG_LEVEL`; comparisons are lock-free and formatting only happens
//! for enabled levels.

use crate::config;
use std::sync::atomic::{AtomicU8, Ordering};
use std::sync::Once;

/// Severity threshold for SDK self-diagnostics.
#[derive(Clone, Copy, Debug, PartialEq, Eq, PartialOrd, Ord)]
#[repr(u8)]
pub enum DiagLevel {
    /// Finest-grained tracing of SDK internals.
    Trace = 0,
    /// Lifecycle events of background workers.
    Debug = 1,
    /// Notable but expected events.
    Info = 2,
    /// Dropped data, retries, misconfiguration fallbacks.
    Warn = 3,
    /// Failures that lose telemetry.
    Error = 4,
    /// Unrecoverable SDK state.
    Fatal = 5,
}

impl DiagLevel {
    fn from_str(s: &str) -> Option<Self> {
        match s.to_ascii_lowercase().as_str() {
            "trace" => Some(DiagLevel::Trace),
            "debug" => Some(DiagLevel::Debug),
            "info" => Some(DiagLevel::Info),
            "warn" | "warning" => Some(DiagLevel::Warn),
            "error" => Some(DiagLevel::Error),
            "fatal" => Some(DiagLevel::Fatal),
            _ => None,
        }
    }
}

const OTEL_LOG_LEVEL: &str = "OTEL_LOG_LEVEL";

static MAX_LEVEL: AtomicU8 = AtomicU8::new(DiagLevel::Info as u8);
static INIT: Once = Once::new();

/// Sets the minimum severity emitted by the diagnostic macros.
pub fn set_max_level(level: DiagLevel) {
    // Mark env initialization done so a later `enabled` call does not undo
    // an explicit override.
    INIT.call_once(|| {});
    MAX_LEVEL.store(level as u8, Ordering::Relaxed);
}

/// Returns true if diagnostics at `level` should be emitted.
#[inline]
pub fn enabled(level: DiagLevel) -> bool {
    INIT.call_once(|| {
        if let Some(configured) = config::get(OTEL_LOG_LEVEL).as_deref().and_then(DiagLevel::from_str)
        {
            MAX_LEVEL.store(configured as u8, Ordering::Relaxed);
        }
    });
    level as u8 >= MAX_LEVEL.load(Ordering::Relaxed)
}

/// Log an SDK-internal debug event.
#[macro_export]
macro_rules! sdk_debug {
    (name: $name:expr $(, $key:ident = $value:expr)* $(,)?) => {
        if $crate::diag::enabled($crate::diag::DiagLevel::Debug) {
            #[cfg(feature = "internal-logs")]
            tracing::debug!(name: $name, target: env!("CARGO_PKG_NAME"), $($key = $value,)* "");
            #[cfg(not(feature = "internal-logs"))]
            let _ = ($name, $($value),*);
        }
    };
}

/// Log an SDK-internal informational event.
#[macro_export]
macro_rules! sdk_info {
    (name: $name:expr $(, $key:ident = $value:expr)* $(,)?) => {
        if $crate::diag::enabled($crate::diag::DiagLevel::Info) {
            #[cfg(feature = "internal-logs")]
            tracing::info!(name: $name, target: env!("CARGO_PKG_NAME"), $($key = $value,)* "");
            #[cfg(not(feature = "internal-logs"))]
            let _ = ($name, $($value),*);
        }
    };
}

/// Log an SDK-internal warning.
#[macro_export]
macro_rules! sdk_warn {
    (name: $name:expr $(, $key:ident = $value:expr)* $(,)?) => {
        if $crate::diag::enabled($crate::diag::DiagLevel::Warn) {
            #[cfg(feature = "internal-logs")]
            tracing::warn!(name: $name, target: env!("CARGO_PKG_NAME"), $($key = $value,)* "");
            #[cfg(not(feature = "internal-logs"))]
            let _ = ($name, $($value),*);
        }
    };
}

/// Log an SDK-internal error.
#[macro_export]
macro_rules! sdk_error {
    (name: $name:expr $(, $key:ident = $value:expr)* $(,)?) => {
        if $crate::diag::enabled($crate::diag::DiagLevel::Error) {
            #[cfg(feature = "internal-logs")]
            tracing::error!(name: $name, target: env!("CARGO_PKG_NAME"), $($key = $value,)* "");
            #[cfg(not(feature = "internal-logs"))]
            let _ = ($name, $($value),*);
        }
    };
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn level_ordering() {
        assert!(DiagLevel::Warn > DiagLevel::Debug);
        set_max_level(DiagLevel::Warn);
        assert!(enabled(DiagLevel::Error));
        assert!(enabled(DiagLevel::Warn));
        assert!(!enabled(DiagLevel::Info));
        set_max_level(DiagLevel::Info);
    }
}
