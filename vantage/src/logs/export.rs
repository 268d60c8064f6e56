use crate::error::SdkResult;
use crate::logs::SdkLogRecord;
use crate::{InstrumentationScope, Resource};
use std::fmt;

/// A batch of log records with the scope each was emitted through.
pub type LogBatch = Vec<(SdkLogRecord, InstrumentationScope)>;

/// The interface for sending batches of log records to a collector.
///
/// `export` is called from processor worker threads and blocks until the
/// batch is delivered or has definitively failed; failures are returned,
/// never raised.
pub trait LogExporter: Send + Sync + fmt::Debug {
    /// Exports a batch of log records.
    fn export(&self, batch: LogBatch) -> SdkResult;

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
