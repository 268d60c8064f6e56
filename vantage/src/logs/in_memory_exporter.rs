use crate::error::{SdkError, SdkResult};
use crate::logs::{LogBatch, LogExporter, SdkLogRecord};
use crate::{InstrumentationScope, Resource};
use std::sync::{Arc, Mutex};

/// A [`LogExporter`] that stores emitted records in memory.
///
/// Useful for testing log pipelines end to end; clones share the same
/// storage.
#[derive(Clone, Debug, Default)]
pub struct InMemoryLogExporter {
    logs: Arc<Mutex<Vec<(SdkLogRecord, InstrumentationScope)>>>,
    resource: Arc<Mutex<Resource>>,
    shutdown: Arc<Mutex<bool>>,
}

impl InMemoryLogExporter {
    /// Returns every record exported so far, with its scope.
    pub fn get_emitted_logs(&self) -> Vec<(SdkLogRecord, InstrumentationScope)> {
        self.logs.lock().map(|logs| logs.clone()).unwrap_or_default()
    }

    /// The resource installed by the owning provider.
    pub fn resource(&self) -> Resource {
        self.resource
            .lock()
            .map(|resource| resource.clone())
            .unwrap_or_default()
    }

    /// Clears the stored records.
    pub fn reset(&self) {
        if let Ok(mut logs) = self.logs.lock() {
            logs.clear();
        }
    }
}

impl LogExporter for InMemoryLogExporter {
    fn export(&self, batch: LogBatch) -> SdkResult {
        if *self.shutdown.lock().unwrap_or_else(|e| e.into_inner()) {
            return Err(SdkError::AlreadyShutdown);
        }
        self.logs
            .lock()
            .map(|mut logs| logs.extend(batch))
            .map_err(|err| SdkError::InternalFailure(format!("log lock poisoned: {err}")))
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
