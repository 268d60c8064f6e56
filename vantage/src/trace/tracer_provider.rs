//! # Tracer Provider
//!
//! New [`Tracer`] instances are always created through an
//! [`SdkTracerProvider`], so that all spans share the provider's sampler,
//! id generator, span limits, resource and registered processors.

use crate::error::SdkResult;
use crate::sdk_debug;
use crate::trace::{
    BatchSpanProcessor, Config, IdGenerator, Sampler, ShouldSample, SimpleSpanProcessor, SpanExporter,
    SpanLimits, SpanProcessor, Tracer,
};
use crate::{config, InstrumentationScope, Resource};
use std::borrow::Cow;
use std::fmt;
use std::sync::atomic::{AtomicBool, Ordering};
use std::sync::Arc;

/// Default tracer name if empty string is provided.
const DEFAULT_COMPONENT_NAME: &str = "rust.vantage/sdk/tracer";

/// Creates [`Tracer`]s and owns the span processing pipeline.
///
/// Dropping the last handle shuts the pipeline down, flushing buffered
/// spans; call [`SdkTracerProvider::shutdown`] explicitly to observe the
/// result.
#[derive(Clone)]
pub struct SdkTracerProvider {
    inner: Arc<TracerProviderInner>,
}

struct TracerProviderInner {
    processors: Vec<Box<dyn SpanProcessor>>,
    config: Config,
    is_shutdown: AtomicBool,
}

impl TracerProviderInner {
    /// Shut down the processors, returning the first error encountered.
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

impl Drop for TracerProviderInner {
    fn drop(&mut self) {
        if !self.is_shutdown.swap(true, Ordering::SeqCst) {
            sdk_debug!(name: "TracerProvider.DroppedWithoutShutdown");
            let _ = self.shutdown();
        }
    }
}

impl fmt::Debug for SdkTracerProvider {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        f.debug_struct("SdkTracerProvider")
            .field("processors", &self.inner.processors.len())
            .field("config", &self.inner.config)
            .finish()
    }
}

impl SdkTracerProvider {
    /// Build a provider with custom configuration.
    pub fn builder() -> TracerProviderBuilder {
        TracerProviderBuilder::default()
    }

    /// Returns a tracer for the given component name.
    pub fn tracer(&self, name: impl Into<Cow<'static, str>>) -> Tracer {
        let mut name = name.into();
        if name.is_empty() {
            name = Cow::Borrowed(DEFAULT_COMPONENT_NAME);
        }
        self.tracer_with_scope(InstrumentationScope::builder(name).build())
    }

    /// Returns a tracer with the given instrumentation scope.
    pub fn tracer_with_scope(&self, scope: InstrumentationScope) -> Tracer {
        Tracer::new(scope, self.clone())
    }

    /// The resource spans produced under this provider inherit.
    pub fn resource(&self) -> &Resource {
        &self.inner.config.resource
    }

    pub(crate) fn config(&self) -> &Config {
        &self.inner.config
    }

    pub(crate) fn span_processors(&self) -> &[Box<dyn SpanProcessor>] {
        &self.inner.processors
    }

    pub(crate) fn is_shutdown(&self) -> bool {
        self.inner.is_shutdown.load(Ordering::Relaxed)
    }

    /// Drains every registered processor, blocking until buffered spans have
    /// been handed to their exporters or the processors' timeouts elapse.
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

    /// Shuts down the span pipeline.
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

/// Configures an [`SdkTracerProvider`].
#[derive(Debug, Default)]
pub struct TracerProviderBuilder {
    processors: Vec<Box<dyn SpanProcessor>>,
    sampler: Option<Box<dyn ShouldSample>>,
    id_generator: Option<Box<dyn IdGenerator>>,
    span_limits: Option<SpanLimits>,
    resource: Option<Resource>,
}

impl TracerProviderBuilder {
    /// Adds a [`SimpleSpanProcessor`] exporting synchronously to `exporter`.
    ///
    /// Simple processing gives strong ordering but blocks the thread ending
    /// the span; prefer [`with_batch_exporter`] in production.
    ///
    /// [`with_batch_exporter`]: TracerProviderBuilder::with_batch_exporter
    pub fn with_simple_exporter<E: SpanExporter + 'static>(self, exporter: E) -> Self {
        self.with_span_processor(SimpleSpanProcessor::new(Box::new(exporter)))
    }

    /// Adds a [`BatchSpanProcessor`] with default batch configuration.
    pub fn with_batch_exporter<E: SpanExporter + 'static>(self, exporter: E) -> Self {
        self.with_span_processor(BatchSpanProcessor::builder(exporter).build())
    }

    /// Adds a custom span processor.
    pub fn with_span_processor<P: SpanProcessor + 'static>(mut self, processor: P) -> Self {
        self.processors.push(Box::new(processor));
        self
    }

    /// Overrides the sampler (default: parent-based always-on, or the
    /// `OTEL_TRACES_SAMPLER` selection).
    pub fn with_sampler<S: ShouldSample + 'static>(mut self, sampler: S) -> Self {
        self.sampler = Some(Box::new(sampler));
        self
    }

    /// Overrides the id generator.
    pub fn with_id_generator<G: IdGenerator + 'static>(mut self, id_generator: G) -> Self {
        self.id_generator = Some(Box::new(id_generator));
        self
    }

    /// Overrides the span limits.
    pub fn with_span_limits(mut self, span_limits: SpanLimits) -> Self {
        self.span_limits = Some(span_limits);
        self
    }

    /// Overrides the resource.
    pub fn with_resource(mut self, resource: Resource) -> Self {
        self.resource = Some(resource);
        self
    }

    /// Builds the provider and hands its resource to every processor.
    pub fn build(self) -> SdkTracerProvider {
        let mut base = Config::default();
        if let Some(sampler) = self.sampler {
            base.sampler = sampler;
        }
        if let Some(id_generator) = self.id_generator {
            base.id_generator = id_generator;
        }
        if let Some(span_limits) = self.span_limits {
            base.span_limits = span_limits;
        }
        if let Some(resource) = self.resource {
            base.resource = resource;
        }

        // A disabled SDK drops every span while keeping contexts valid for
        // propagation.
        if config::sdk_disabled() {
            base.sampler = Box::new(Sampler::AlwaysOff);
        }

        let mut processors = self.processors;
        for processor in processors.iter_mut() {
            processor.set_resource(&base.resource);
        }

        sdk_debug!(
            name: "TracerProvider.Built",
            processors = processors.len(),
            sampler = base.sampler.description()
        );

        SdkTracerProvider {
            inner: Arc::new(TracerProviderInner {
                processors,
                config: base,
                is_shutdown: AtomicBool::new(false),
            }),
        }
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use crate::trace::InMemorySpanExporter;

    #[test]
    fn shutdown_is_idempotent() {
        let provider = SdkTracerProvider::builder()
            .with_simple_exporter(InMemorySpanExporter::default())
            .build();
        assert!(provider.shutdown().is_ok());
        // Second call succeeds immediately.
        assert!(provider.shutdown().is_ok());
    }

    #[test]
    fn spans_after_shutdown_are_not_recorded() {
        let exporter = InMemorySpanExporter::default();
        let provider = SdkTracerProvider::builder()
            .with_simple_exporter(exporter.clone())
            .build();
        let tracer = provider.tracer("test");
        provider.shutdown().unwrap();

        let mut span = tracer.start("late");
        assert!(!span.is_recording());
        span.end();
        assert!(exporter.get_finished_spans().is_empty());
    }

    #[test]
    fn disabled_sdk_records_nothing() {
        temp_env::with_var(crate::config::OTEL_SDK_DISABLED, Some("true"), || {
            let exporter = InMemorySpanExporter::default();
            let provider = SdkTracerProvider::builder()
                .with_simple_exporter(exporter.clone())
                .build();
            let tracer = provider.tracer("test");
            let mut span = tracer.start("noop");
            assert!(!span.is_recording());
            // The span context stays valid so propagation keeps working.
            assert!(span.span_context().is_valid());
            span.end();
            assert!(exporter.get_finished_spans().is_empty());
        });
    }
}
