use crate::error::{SdkError, SdkResult};
use crate::logs::{LogExporter, SdkLogRecord};
use crate::{sdk_error, sdk_warn, InstrumentationScope, Resource};
use std::fmt;
use std::sync::atomic::{AtomicBool, Ordering};
use std::sync::Mutex;

/// An interface for hooks on log record emission.
///
/// `on_emit` is called synchronously on the emitting thread for every
/// record that clears the provider's severity floor, so it must not block
/// for long.
pub trait LogProcessor: Send + Sync + fmt::Debug {
    /// Called for every emitted record, with the scope of the emitting
    /// logger.
    fn on_emit(&self, record: SdkLogRecord, scope: &InstrumentationScope);

    /// Export all buffered records.
    fn force_flush(&self) -> SdkResult;

    /// Drain buffered records and shut down the exporter.
    fn shutdown(&self) -> SdkResult;

    /// Receives the provider's resource before the pipeline starts.
    fn set_resource(&mut self, _resource: &Resource) {}
}

/// A [`LogProcessor`] that exports each record synchronously on emission.
///
/// Useful where records must not be buffered (e.g. FaaS) and in tests;
/// prefer [`BatchLogProcessor`] in production.
///
/// [`BatchLogProcessor`]: crate::logs::BatchLogProcessor
pub struct SimpleLogProcessor {
    exporter: Mutex<Box<dyn LogExporter>>,
    is_shutdown: AtomicBool,
}

impl SimpleLogProcessor {
    pub(crate) fn new(exporter: Box<dyn LogExporter>) -> Self {
        SimpleLogProcessor {
            exporter: Mutex::new(exporter),
            is_shutdown: AtomicBool::new(false),
        }
    }
}

impl fmt::Debug for SimpleLogProcessor {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        f.debug_struct("SimpleLogProcessor").finish()
    }
}

impl LogProcessor for SimpleLogProcessor {
    fn on_emit(&self, record: SdkLogRecord, scope: &InstrumentationScope) {
        if self.is_shutdown.load(Ordering::Relaxed) {
            sdk_warn!(
                name: "SimpleLogProcessor.OnEmit.AfterShutdown",
                message = "log record received after shutdown, dropping"
            );
            return;
        }

        let result = self
            .exporter
            .lock()
            .map_err(|_| SdkError::InternalFailure("SimpleLogProcessor mutex poisoned".into()))
            .and_then(|exporter| exporter.export(vec![(record, scope.clone())]));
        if let Err(err) = result {
            sdk_error!(
                name: "SimpleLogProcessor.ExportError",
                error = err.to_string()
            );
        }
    }

    fn force_flush(&self) -> SdkResult {
        if let Ok(exporter) = self.exporter.lock() {
            exporter.force_flush()
        } else {
            Err(SdkError::InternalFailure(
                "SimpleLogProcessor mutex poisoned".into(),
            ))
        }
    }

    fn shutdown(&self) -> SdkResult {
        if self.is_shutdown.swap(true, Ordering::SeqCst) {
            return Ok(());
        }
        if let Ok(mut exporter) = self.exporter.lock() {
            exporter.shutdown()
        } else {
            Err(SdkError::InternalFailure(
                "SimpleLogProcessor mutex poisoned".into(),
            ))
        }
    }

    fn set_resource(&mut self, resource: &Resource) {
        if let Ok(mut exporter) = self.exporter.lock() {
            exporter.set_resource(resource);
        }
    }
}
