use crate::error::{SdkError, SdkResult};
use crate::metrics::data::ResourceMetrics;
use crate::metrics::{MetricExporter, Temporality};
use std::sync::{Arc, Mutex};

/// A [`MetricExporter`] that stores collected metrics in memory.
///
/// Useful for testing metric pipelines end to end; clones share the same
/// storage.
#[derive(Clone, Debug, Default)]
pub struct InMemoryMetricExporter {
    exports: Arc<Mutex<Vec<ResourceMetrics>>>,
    temporality: Option<Temporality>,
    shutdown: Arc<Mutex<bool>>,
}

impl InMemoryMetricExporter {
    /// An exporter preferring the given temporality.
    pub fn with_temporality(temporality: Temporality) -> Self {
        InMemoryMetricExporter {
            temporality: Some(temporality),
            ..Default::default()
        }
    }

    /// Returns every collection exported so far.
    pub fn get_finished_metrics(&self) -> Vec<ResourceMetrics> {
        self.exports
            .lock()
            .map(|exports| exports.clone())
            .unwrap_or_default()
    }

    /// Clears the stored collections.
    pub fn reset(&self) {
        if let Ok(mut exports) = self.exports.lock() {
            exports.clear();
        }
    }
}

impl MetricExporter for InMemoryMetricExporter {
    fn export(&self, metrics: &ResourceMetrics) -> SdkResult {
        if *self.shutdown.lock().unwrap_or_else(|e| e.into_inner()) {
            return Err(SdkError::AlreadyShutdown);
        }
        self.exports
            .lock()
            .map(|mut exports| exports.push(metrics.clone()))
            .map_err(|err| SdkError::InternalFailure(format!("metric lock poisoned: {err}")))
    }

    fn shutdown(&mut self) -> SdkResult {
        *self.shutdown.lock().unwrap_or_else(|e| e.into_inner()) = true;
        Ok(())
    }

    fn temporality(&self) -> Temporality {
        self.temporality.unwrap_or_default()
    }
}
