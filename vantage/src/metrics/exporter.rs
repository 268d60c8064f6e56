use crate::error::SdkResult;
use crate::metrics::data::ResourceMetrics;
use crate::metrics::Temporality;
use std::fmt;

/// The interface for sending collected metrics to a collector.
///
/// `export` is called from reader worker threads and blocks until the
/// batch is delivered or has definitively failed; failures are returned,
/// never raised.
pub trait MetricExporter: Send + Sync + fmt::Debug {
    /// Exports one collection cycle's metrics.
    fn export(&self, metrics: &ResourceMetrics) -> SdkResult;

    /// Flushes any buffered data.
    fn force_flush(&self) -> SdkResult {
        Ok(())
    }

    /// Shuts down the exporter. Subsequent exports fail.
    fn shutdown(&mut self) -> SdkResult {
        Ok(())
    }

    /// The temporality this exporter prefers; readers default to it.
    fn temporality(&self) -> Temporality {
        Temporality::Cumulative
    }
}
