//! # Logger Provider
//!
//! New [`Logger`] instances are always created through an
//! [`SdkLoggerProvider`], which owns the resource, the record limits, the
//! severity floor and the registered processors.

use crate::error::SdkResult;
use crate::logs::{
    BatchLogProcessor, LogExporter, LogProcessor, LogRecordLimits, Logger, SdkLogRecord,
    Severity, SimpleLogProcessor,
};
use crate::{config, sdk_debug, InstrumentationScope, Resource};
use std::borrow::Cow;
use std::fmt;
use std::sync::atomic::{AtomicBool, AtomicU8, Ordering};
use std::sync::Arc;

const DEFAULT_LOGGER_NAME: &str = "rust.vantage/sdk/logger";

/// Creates [`Logger`]s and owns the log processing pipeline.
#[derive(Clone)]
pub struct SdkLoggerProvider {
    inner: Arc<LoggerProviderInner>,
}

struct LoggerProviderInner {
    processors: Vec<Box<dyn LogProcessor>>,
    resource: Resource,
    record_limits: LogRecordLimits,
    // 0 means no floor; comparisons against it are lock-free.
    min_severity: AtomicU8,
    is_shutdown: AtomicBool,
    disabled: bool,
}

impl LoggerProviderInner {
    fn shutdown(&self) -> SdkResult {
        let mut result = Ok(());
        for processor in &self.processors {
            if let Err(err) = processor.shutdown() {
                if result.is_ok() {
                    result = Err(err);
                }
            }
        }
        result
    }
}

impl Drop for LoggerProviderInner {
    fn drop(&mut self) {
        if !self.is_shutdown.swap(true, Ordering::SeqCst) {
            sdk_debug!(name: "LoggerProvider.DroppedWithoutShutdown");
            let _ = self.shutdown();
        }
    }
}

impl fmt::Debug for SdkLoggerProvider {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        f.debug_struct("SdkLoggerProvider")
            .field("processors", &self.inner.processors.len())
            .field("resource", &self.inner.resource)
            .finish()
    }
}

impl SdkLoggerProvider {
    /// Build a provider with custom configuration.
    pub fn builder() -> LoggerProviderBuilder {
        LoggerProviderBuilder::default()
    }

    /// Returns a logger for the given component name.
    pub fn logger(&self, name: impl Into<Cow<'static, str>>) -> Logger {
        let mut name = name.into();
        if name.is_empty() {
            name = Cow::Borrowed(DEFAULT_LOGGER_NAME);
        }
        self.logger_with_scope(InstrumentationScope::builder(name).build())
    }

    /// Returns a logger with the given instrumentation scope.
    pub fn logger_with_scope(&self, scope: InstrumentationScope) -> Logger {
        Logger::new(scope, self.clone())
    }

    /// The resource log records produced under this provider inherit.
    pub fn resource(&self) -> &Resource {
        &self.inner.resource
    }

    /// Raises or lowers the severity floor at runtime; records below it
    /// are skipped before reaching any processor.
    pub fn set_min_severity(&self, severity: Option<Severity>) {
        self.inner
            .min_severity
            .store(severity.map(|s| s as u8).unwrap_or(0), Ordering::Relaxed);
    }

    pub(crate) fn log_record_limits(&self) -> LogRecordLimits {
        self.inner.record_limits
    }

    pub(crate) fn should_emit(&self, severity: Option<Severity>) -> bool {
        if self.inner.disabled || self.inner.is_shutdown.load(Ordering::Relaxed) {
            return false;
        }
        let floor = self.inner.min_severity.load(Ordering::Relaxed);
        match (floor, severity) {
            (0, _) => true,
            // A record without a severity is never filtered.
            (_, None) => true,
            (floor, Some(severity)) => severity as u8 >= floor,
        }
    }

    pub(crate) fn deliver(&self, record: SdkLogRecord, scope: &InstrumentationScope) {
        let processors = &self.inner.processors;
        if let Some((last, rest)) = processors.split_last() {
            // Per-logger emission order is preserved into each processor's
            // queue because delivery happens on the emitting thread.
            for processor in rest {
                processor.on_emit(record.clone(), scope);
            }
            last.on_emit(record, scope);
        }
    }

    /// Drains every registered processor.
    pub fn force_flush(&self) -> SdkResult {
        let mut result = Ok(());
        for processor in &self.inner.processors {
            if let Err(err) = processor.force_flush() {
                if result.is_ok() {
                    result = Err(err);
                }
            }
        }
        result
    }

    /// Shuts down the log pipeline.
    ///
    /// The first call drains processors and shuts down their exporters;
    /// subsequent calls return success immediately.
    pub fn shutdown(&self) -> SdkResult {
        if self.inner.is_shutdown.swap(true, Ordering::SeqCst) {
            return Ok(());
        }
        self.inner.shutdown()
    }
}

/// Configures an [`SdkLoggerProvider`].
#[derive(Debug, Default)]
pub struct LoggerProviderBuilder {
    processors: Vec<Box<dyn LogProcessor>>,
    resource: Option<Resource>,
    record_limits: Option<LogRecordLimits>,
    min_severity: Option<Severity>,
}

impl LoggerProviderBuilder {
    /// Adds a [`SimpleLogProcessor`] exporting synchronously to
    /// `exporter`.
    pub fn with_simple_exporter<E: LogExporter + 'static>(self, exporter: E) -> Self {
        self.with_log_processor(SimpleLogProcessor::new(Box::new(exporter)))
    }

    /// Adds a [`BatchLogProcessor`] with default batch configuration.
    pub fn with_batch_exporter<E: LogExporter + 'static>(self, exporter: E) -> Self {
        self.with_log_processor(BatchLogProcessor::builder(exporter).build())
    }

    /// Adds a custom log processor.
    pub fn with_log_processor<P: LogProcessor + 'static>(mut self, processor: P) -> Self {
        self.processors.push(Box::new(processor));
        self
    }

    /// Overrides the record limits.
    pub fn with_log_record_limits(mut self, limits: LogRecordLimits) -> Self {
        self.record_limits = Some(limits);
        self
    }

    /// Sets an initial severity floor.
    pub fn with_min_severity(mut self, severity: Severity) -> Self {
        self.min_severity = Some(severity);
        self
    }

    /// Overrides the resource.
    pub fn with_resource(mut self, resource: Resource) -> Self {
        self.resource = Some(resource);
        self
    }

    /// Builds the provider and hands its resource to every processor.
    pub fn build(self) -> SdkLoggerProvider {
        let resource = self.resource.unwrap_or_default();
        let mut processors = self.processors;
        for processor in processors.iter_mut() {
            processor.set_resource(&resource);
        }

        sdk_debug!(
            name: "LoggerProvider.Built",
            processors = processors.len()
        );

        SdkLoggerProvider {
            inner: Arc::new(LoggerProviderInner {
                processors,
                resource,
                record_limits: self.record_limits.unwrap_or_default(),
                min_severity: AtomicU8::new(self.min_severity.map(|s| s as u8).unwrap_or(0)),
                is_shutdown: AtomicBool::new(false),
                disabled: config::sdk_disabled(),
            }),
        }
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use crate::logs::{AnyValue, InMemoryLogExporter};
    use crate::trace::SdkTracerProvider;

    fn emit(provider: &SdkLoggerProvider, severity: Option<Severity>, body: &str) {
        let logger = provider.logger("lp-tests");
        let mut record = logger.create_log_record();
        if let Some(severity) = severity {
            record.set_severity_number(severity);
        }
        record.set_body(AnyValue::from(body.to_owned()));
        logger.emit(record);
    }

    #[test]
    fn severity_floor_filters_records() {
        let exporter = InMemoryLogExporter::default();
        let provider = SdkLoggerProvider::builder()
            .with_simple_exporter(exporter.clone())
            .with_min_severity(Severity::Warn)
            .build();

        emit(&provider, Some(Severity::Info), "dropped");
        emit(&provider, Some(Severity::Error), "kept");
        emit(&provider, None, "kept-no-severity");
        assert_eq!(exporter.get_emitted_logs().len(), 2);

        // The floor is dynamic.
        provider.set_min_severity(None);
        emit(&provider, Some(Severity::Trace), "now-kept");
        assert_eq!(exporter.get_emitted_logs().len(), 3);
    }

    #[test]
    fn records_are_correlated_with_active_span() {
        let exporter = InMemoryLogExporter::default();
        let provider = SdkLoggerProvider::builder()
            .with_simple_exporter(exporter.clone())
            .build();
        let tracer_provider = SdkTracerProvider::builder().build();
        let tracer = tracer_provider.tracer("correlation");

        let span = tracer.start("active");
        {
            let _guard = span.make_current();
            emit(&provider, Some(Severity::Info), "inside");
        }
        emit(&provider, Some(Severity::Info), "outside");

        let logs = exporter.get_emitted_logs();
        let inside = logs[0].0.trace_context().expect("trace context");
        assert_eq!(inside.trace_id, span.span_context().trace_id());
        assert_eq!(inside.span_id, span.span_context().span_id());
        assert!(logs[1].0.trace_context().is_none());
    }

    #[test]
    fn disabled_sdk_emits_nothing() {
        temp_env::with_var(crate::config::OTEL_SDK_DISABLED, Some("true"), || {
            let exporter = InMemoryLogExporter::default();
            let provider = SdkLoggerProvider::builder()
                .with_simple_exporter(exporter.clone())
                .build();
            emit(&provider, Some(Severity::Error), "nope");
            assert!(exporter.get_emitted_logs().is_empty());
        });
    }
}
