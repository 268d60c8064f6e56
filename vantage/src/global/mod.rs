//! Process-wide provider and propagator installation.
//!
//! Libraries that emit telemetry without wiring providers through their
//! APIs read them from here. Each slot is installed exactly once:
//! installing over a running provider fails with
//! [`GlobalError::AlreadyInstalled`] rather than silently replacing it.
//! Tests can start over with [`reset_for_test`].
//!
//! ```
//! use vantage::global;
//! use vantage::trace::SdkTracerProvider;
//!
//! let provider = SdkTracerProvider::builder().build();
//! if global::set_tracer_provider(provider).is_ok() {
//!     let tracer = global::tracer("my-library");
//!     tracer.start("operation").end();
//! }
//! # global::reset_for_test();
//! ```

use crate::logs::{Logger, SdkLoggerProvider};
use crate::metrics::{Meter, SdkMeterProvider};
use crate::propagation::{self, TextMapPropagator};
use crate::trace::{Sampler, SdkTracerProvider, Tracer};
use std::borrow::Cow;
use std::sync::{Arc, OnceLock, RwLock};
use thiserror::Error;

static TRACER_PROVIDER: RwLock<Option<SdkTracerProvider>> = RwLock::new(None);
static METER_PROVIDER: RwLock<Option<SdkMeterProvider>> = RwLock::new(None);
static LOGGER_PROVIDER: RwLock<Option<SdkLoggerProvider>> = RwLock::new(None);
static PROPAGATOR: RwLock<Option<Arc<dyn TextMapPropagator>>> = RwLock::new(None);

/// Errors from global installation.
#[derive(Error, Debug, PartialEq)]
pub enum GlobalError {
    /// The slot already holds a running instance; call
    /// [`reset_for_test`] (tests) or shut the process down instead of
    /// replacing providers at runtime.
    #[error("a global {0} is already installed")]
    AlreadyInstalled(&'static str),
}

fn install<T>(slot: &RwLock<Option<T>>, value: T, what: &'static str) -> Result<(), GlobalError> {
    let mut guard = slot.write().unwrap_or_else(|e| e.into_inner());
    if guard.is_some() {
        return Err(GlobalError::AlreadyInstalled(what));
    }
    *guard = Some(value);
    Ok(())
}

/// Installs the process-wide tracer provider.
pub fn set_tracer_provider(provider: SdkTracerProvider) -> Result<(), GlobalError> {
    install(&TRACER_PROVIDER, provider, "tracer provider")
}

/// The installed tracer provider, if any.
pub fn tracer_provider() -> Option<SdkTracerProvider> {
    TRACER_PROVIDER
        .read()
        .ok()
        .and_then(|guard| guard.clone())
}

/// A tracer from the installed provider, or a non-recording fallback when
/// none is installed.
pub fn tracer(name: impl Into<Cow<'static, str>>) -> Tracer {
    tracer_provider()
        .unwrap_or_else(|| fallback_tracer_provider().clone())
        .tracer(name)
}

fn fallback_tracer_provider() -> &'static SdkTracerProvider {
    static FALLBACK: OnceLock<SdkTracerProvider> = OnceLock::new();
    FALLBACK.get_or_init(|| {
        SdkTracerProvider::builder()
            .with_sampler(Sampler::AlwaysOff)
            .build()
    })
}

/// Installs the process-wide meter provider.
pub fn set_meter_provider(provider: SdkMeterProvider) -> Result<(), GlobalError> {
    install(&METER_PROVIDER, provider, "meter provider")
}

/// The installed meter provider, if any.
pub fn meter_provider() -> Option<SdkMeterProvider> {
    METER_PROVIDER.read().ok().and_then(|guard| guard.clone())
}

/// A meter from the installed provider, or an unregistered fallback whose
/// instruments are never collected.
pub fn meter(name: impl Into<Cow<'static, str>>) -> Meter {
    meter_provider()
        .unwrap_or_else(|| fallback_meter_provider().clone())
        .meter(name)
}

fn fallback_meter_provider() -> &'static SdkMeterProvider {
    static FALLBACK: OnceLock<SdkMeterProvider> = OnceLock::new();
    FALLBACK.get_or_init(|| SdkMeterProvider::builder().build())
}

/// Installs the process-wide logger provider.
pub fn set_logger_provider(provider: SdkLoggerProvider) -> Result<(), GlobalError> {
    install(&LOGGER_PROVIDER, provider, "logger provider")
}

/// The installed logger provider, if any.
pub fn logger_provider() -> Option<SdkLoggerProvider> {
    LOGGER_PROVIDER.read().ok().and_then(|guard| guard.clone())
}

/// A logger from the installed provider, or a processorless fallback.
pub fn logger(name: impl Into<Cow<'static, str>>) -> Logger {
    logger_provider()
        .unwrap_or_else(|| fallback_logger_provider().clone())
        .logger(name)
}

fn fallback_logger_provider() -> &'static SdkLoggerProvider {
    static FALLBACK: OnceLock<SdkLoggerProvider> = OnceLock::new();
    FALLBACK.get_or_init(|| SdkLoggerProvider::builder().build())
}

/// Installs the process-wide propagator.
pub fn set_text_map_propagator<P: TextMapPropagator + 'static>(
    propagator: P,
) -> Result<(), GlobalError> {
    install(&PROPAGATOR, Arc::new(propagator), "propagator")
}

/// Runs `f` with the installed propagator, or with the
/// `OTEL_PROPAGATORS` selection (default `tracecontext,baggage`) when
/// none was installed explicitly.
pub fn get_text_map_propagator<F, R>(f: F) -> R
where
    F: FnOnce(&dyn TextMapPropagator) -> R,
{
    let installed = PROPAGATOR.read().ok().and_then(|guard| guard.clone());
    match installed {
        Some(propagator) => f(propagator.as_ref()),
        None => f(default_propagator()),
    }
}

fn default_propagator() -> &'static dyn TextMapPropagator {
    static DEFAULT: OnceLock<propagation::TextMapCompositePropagator> = OnceLock::new();
    DEFAULT.get_or_init(propagation::from_config)
}

/// Shuts down and removes every installed global, so a test can install
/// its own. Not intended for production use.
pub fn reset_for_test() {
    if let Some(provider) = TRACER_PROVIDER
        .write()
        .unwrap_or_else(|e| e.into_inner())
        .take()
    {
        let _ = provider.shutdown();
    }
    if let Some(provider) = METER_PROVIDER
        .write()
        .unwrap_or_else(|e| e.into_inner())
        .take()
    {
        let _ = provider.shutdown();
    }
    if let Some(provider) = LOGGER_PROVIDER
        .write()
        .unwrap_or_else(|e| e.into_inner())
        .take()
    {
        let _ = provider.shutdown();
    }
    PROPAGATOR.write().unwrap_or_else(|e| e.into_inner()).take();
}

#[cfg(test)]
mod tests {
    use super::*;
    use crate::propagation::TraceContextPropagator;

    // The global slots are process-wide, so exercise them from a single
    // test to avoid cross-test interference.
    #[test]
    fn install_once_then_fail_then_reset() {
        reset_for_test();

        let first = SdkTracerProvider::builder().build();
        assert!(set_tracer_provider(first).is_ok());
        assert_eq!(
            set_tracer_provider(SdkTracerProvider::builder().build()),
            Err(GlobalError::AlreadyInstalled("tracer provider"))
        );
        assert!(tracer_provider().is_some());

        assert!(set_text_map_propagator(TraceContextPropagator::new()).is_ok());
        assert!(set_text_map_propagator(TraceContextPropagator::new()).is_err());
        get_text_map_propagator(|propagator| {
            assert_eq!(propagator.fields().count(), 2);
        });

        reset_for_test();
        assert!(tracer_provider().is_none());
        assert!(set_tracer_provider(SdkTracerProvider::builder().build()).is_ok());
        reset_for_test();
    }

    #[test]
    fn fallback_tracer_records_nothing() {
        let tracer = fallback_tracer_provider().tracer("fallback");
        let span = tracer.start("noop");
        assert!(!span.is_recording());
        assert!(span.span_context().is_valid());
    }
}
