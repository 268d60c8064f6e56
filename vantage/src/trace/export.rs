use crate::error::SdkResult;
use crate::trace::SpanData;
use crate::Resource;
use std::fmt;

/// The interface for sending batches of finished spans to a collector.
///
/// `export` is called from processor worker threads and is expected to block
/// until the batch is delivered or has definitively failed; transport-level
/// timeouts bound the call. Failures must be returned, never raised, so a
/// collector outage cannot crash the host application.
pub trait SpanExporter: Send + Sync + fmt::Debug {
    /// Exports a batch of spans.
    ///
    /// A batch is either fully delivered or dropped; items are never retried
    /// across batches.
    fn export(&self, batch: Vec<SpanData>) -> SdkResult;

    /// Shuts down the exporter. Subsequent exports fail.
    fn shutdown(&mut self) -> SdkResult {
        Ok(())
    }

    /// Flushes any buffered data.
    fn force_flush(&self) -> SdkResult {
        Ok(())
    }

    /// Sets the resource reported with every batch from this exporter.
    fn set_resource(&mut self, _resource: &Resource) {}
}
