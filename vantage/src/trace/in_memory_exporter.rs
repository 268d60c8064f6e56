use crate::error::{SdkError, SdkResult};
use crate::trace::{SpanData, SpanExporter};
use crate::Resource;
use std::sync::{Arc, Mutex};

/// A [`SpanExporter`] that stores finished spans in memory.
///
/// Primarily useful for testing span pipelines end to end; clones share the
/// same storage.
///
/// ```
/// use vantage::trace::{InMemorySpanExporter, SdkTracerProvider};
///
/// let exporter = InMemorySpanExporter::default();
/// let provider = SdkTracerProvider::builder()
///     .with_simple_exporter(exporter.clone())
///     .build();
///
/// provider.tracer("example").start("operation").end();
/// assert_eq!(exporter.get_finished_spans().len(), 1);
/// ```
#[derive(Clone, Debug, Default)]
pub struct InMemorySpanExporter {
    spans: Arc<Mutex<Vec<SpanData>>>,
    resource: Arc<Mutex<Resource>>,
    shutdown: Arc<Mutex<bool>>,
}

/// Builder for [`InMemorySpanExporter`].
#[derive(Clone, Debug, Default)]
pub struct InMemorySpanExporterBuilder {
    _private: (),
}

impl InMemorySpanExporterBuilder {
    /// Create a new builder.
    pub fn new() -> Self {
        Self::default()
    }

    /// Build the exporter.
    pub fn build(self) -> InMemorySpanExporter {
        InMemorySpanExporter::default()
    }
}

impl InMemorySpanExporter {
    /// Returns a snapshot of every span exported so far.
    pub fn get_finished_spans(&self) -> Vec<SpanData> {
        self.spans
            .lock()
            .map(|spans| spans.clone())
            .unwrap_or_default()
    }

    /// The resource installed by the owning provider.
    pub fn resource(&self) -> Resource {
        self.resource
            .lock()
            .map(|resource| resource.clone())
            .unwrap_or_default()
    }

    /// Clears the stored spans.
    pub fn reset(&self) {
        if let Ok(mut spans) = self.spans.lock() {
            spans.clear();
        }
    }
}

impl SpanExporter for InMemorySpanExporter {
    fn export(&self, batch: Vec<SpanData>) -> SdkResult {
        if *self.shutdown.lock().unwrap_or_else(|e| e.into_inner()) {
            return Err(SdkError::AlreadyShutdown);
        }
        self.spans
            .lock()
            .map(|mut spans| spans.extend(batch))
            .map_err(|err| SdkError::InternalFailure(format!("span lock poisoned: {err}")))
    }

    fn shutdown(&mut self) -> SdkResult {
        *self.shutdown.lock().unwrap_or_else(|e| e.into_inner()) = true;
        Ok(())
    }

    fn set_resource(&mut self, resource: &Resource) {
        if let Ok(mut stored) = self.resource.lock() {
            *stored = resource.clone();
        }
    }
}
