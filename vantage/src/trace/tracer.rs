//! The entry point for creating spans.
//!
//! A [`Tracer`] carries the instrumentation scope of the library it was
//! created for and a handle to its provider, whose sampler, id generator
//! and processors govern every span it starts.

use crate::sdk_warn;
use crate::time;
use crate::trace::span::RecordedData;
use crate::trace::{
    Link, SamplingDecision, SdkTracerProvider, Span, SpanContext, SpanData, SpanId, SpanKind,
    Status, TraceError, TraceResult, TraceState,
};
use crate::{Context, InstrumentationScope, KeyValue};
use std::borrow::Cow;
use std::time::SystemTime;

/// Creates and manages spans for one instrumentation scope.
#[derive(Clone, Debug)]
pub struct Tracer {
    scope: InstrumentationScope,
    provider: SdkTracerProvider,
}

impl Tracer {
    pub(crate) fn new(scope: InstrumentationScope, provider: SdkTracerProvider) -> Self {
        Tracer { scope, provider }
    }

    /// The instrumentation scope of this tracer.
    pub fn scope(&self) -> &InstrumentationScope {
        &self.scope
    }

    /// The provider this tracer was created by.
    pub fn provider(&self) -> &SdkTracerProvider {
        &self.provider
    }

    /// Starts a span with the current context as parent.
    pub fn start<T>(&self, name: T) -> Span
    where
        T: Into<Cow<'static, str>>,
    {
        self.span_builder(name).start(self)
    }

    /// Starts a span using an explicit parent context.
    pub fn start_with_context<T>(&self, name: T, parent_cx: &Context) -> Span
    where
        T: Into<Cow<'static, str>>,
    {
        self.span_builder(name)
            .with_parent_context(parent_cx.clone())
            .start(self)
    }

    /// Returns a builder for configuring a span before starting it.
    pub fn span_builder<T>(&self, name: T) -> SpanBuilder
    where
        T: Into<Cow<'static, str>>,
    {
        SpanBuilder::from_name(name)
    }

    pub(crate) fn deliver_ended_span(&self, span: SpanData) {
        for processor in self.provider.span_processors() {
            processor.on_end(span.clone());
        }
    }

    fn build_span(&self, builder: SpanBuilder) -> TraceResult<Span> {
        let provider = self.provider.clone();
        let config = provider.config();
        let span_limits = config.span_limits;

        // Resolve the parent: an explicit parent span wins over an explicit
        // parent context, which wins over the calling thread's context.
        let parent_cx = match builder.parent_span_context {
            Some(span_context) => Context::new().with_span_context(span_context),
            None => builder
                .parent_context
                .clone()
                .unwrap_or_else(Context::current),
        };
        let parent = parent_cx
            .span_context()
            .filter(|span_context| span_context.is_valid())
            .cloned();

        // An explicit span context may not move the span to another trace;
        // its span id is informational and a fresh one is generated below.
        if let (Some(explicit), Some(parent)) = (&builder.span_context, &parent) {
            if explicit.trace_id() != parent.trace_id() {
                return Err(TraceError::InvalidArgument(format!(
                    "explicit span context trace id {} does not match parent trace id {}",
                    explicit.trace_id(),
                    parent.trace_id()
                )));
            }
        }

        let trace_id = parent
            .as_ref()
            .map(|parent| parent.trace_id())
            .or_else(|| {
                builder
                    .span_context
                    .as_ref()
                    .map(|explicit| explicit.trace_id())
                    .filter(|trace_id| trace_id.is_valid())
            })
            .unwrap_or_else(|| config.id_generator.new_trace_id());
        let span_id = config.id_generator.new_span_id();
        let parent_span_id = parent
            .as_ref()
            .map(|parent| parent.span_id())
            .unwrap_or(SpanId::INVALID);

        let mut attributes = builder.attributes.unwrap_or_default();
        let mut links = builder.links.unwrap_or_default();
        let name = builder.name;
        let span_kind = builder.span_kind.unwrap_or(SpanKind::Internal);

        let sampling = config.sampler.should_sample(
            Some(&parent_cx),
            trace_id,
            &name,
            &span_kind,
            &attributes,
            &links,
        );

        let mut trace_state = sampling.trace_state;
        if parent.is_none() && trace_state == TraceState::default() {
            if let Some(explicit) = &builder.span_context {
                trace_state = explicit.trace_state().clone();
            }
        }

        let trace_flags = parent
            .as_ref()
            .map(|parent| parent.trace_flags())
            .unwrap_or_default()
            .with_sampled(sampling.decision == SamplingDecision::RecordAndSample);
        let span_context = SpanContext::new(trace_id, span_id, trace_flags, false, trace_state);

        if sampling.decision == SamplingDecision::Drop || provider.is_shutdown() {
            // A dropped span records nothing but still carries a valid span
            // context for propagation.
            return Ok(Span::new(span_context, None, self.clone(), span_limits));
        }

        for attribute in sampling.attributes {
            attributes.push(attribute);
        }
        let dropped_attributes_count = super::span::enforce_attribute_limits(
            &mut attributes,
            span_limits.max_attributes_per_span,
            span_limits.max_attribute_value_length,
        );

        let mut dropped_links_count = 0;
        if links.len() > span_limits.max_links_per_span as usize {
            dropped_links_count = (links.len() - span_limits.max_links_per_span as usize) as u32;
            links.truncate(span_limits.max_links_per_span as usize);
        }
        for link in links.iter_mut() {
            link.dropped_attributes_count += super::span::enforce_attribute_limits(
                &mut link.attributes,
                span_limits.max_attributes_per_link,
                span_limits.max_attribute_value_length,
            );
        }

        let start_time = builder.start_time.unwrap_or_else(time::now);
        let mut span = Span::new(
            span_context,
            Some(RecordedData {
                parent_span_id,
                span_kind,
                name,
                start_time,
                attributes,
                dropped_attributes_count,
                events: Vec::new(),
                dropped_events_count: 0,
                links,
                dropped_links_count,
                status: Status::Unset,
            }),
            self.clone(),
            span_limits,
        );

        for processor in provider.span_processors() {
            processor.on_start(&mut span, &parent_cx);
        }
        Ok(span)
    }
}

/// Configuration for a new span, applied when it is started.
///
/// ```
/// use vantage::trace::{SdkTracerProvider, SpanKind};
///
/// let provider = SdkTracerProvider::builder().build();
/// let tracer = provider.tracer("builder-example");
/// let span = tracer
///     .span_builder("handle-request")
///     .with_kind(SpanKind::Server)
///     .start(&tracer);
/// ```
#[derive(Clone, Debug, Default)]
pub struct SpanBuilder {
    /// The span name.
    pub name: Cow<'static, str>,
    /// The span kind, `Internal` if unset.
    pub span_kind: Option<SpanKind>,
    /// Attributes recorded before the sampler runs.
    pub attributes: Option<Vec<KeyValue>>,
    /// Links recorded at creation.
    pub links: Option<Vec<Link>>,
    /// An explicit start time.
    pub start_time: Option<SystemTime>,

    parent_context: Option<Context>,
    parent_span_context: Option<SpanContext>,
    span_context: Option<SpanContext>,
}

impl SpanBuilder {
    /// Create a builder for a span with the given name.
    pub fn from_name<T: Into<Cow<'static, str>>>(name: T) -> Self {
        SpanBuilder {
            name: name.into(),
            ..Default::default()
        }
    }

    /// Set the span kind.
    pub fn with_kind(mut self, span_kind: SpanKind) -> Self {
        self.span_kind = Some(span_kind);
        self
    }

    /// Set attributes known before the span starts; the sampler sees these.
    pub fn with_attributes<I>(mut self, attributes: I) -> Self
    where
        I: IntoIterator<Item = KeyValue>,
    {
        self.attributes = Some(attributes.into_iter().collect());
        self
    }

    /// Add links to the new span.
    pub fn with_links(mut self, links: Vec<Link>) -> Self {
        self.links = Some(links);
        self
    }

    /// Set an explicit start time instead of the current time.
    pub fn with_start_time(mut self, start_time: SystemTime) -> Self {
        self.start_time = Some(start_time);
        self
    }

    /// Use `parent_cx` instead of the calling thread's current context when
    /// resolving the parent.
    pub fn with_parent_context(mut self, parent_cx: Context) -> Self {
        self.parent_context = Some(parent_cx);
        self
    }

    /// Use `span` as the parent, taking priority over any parent context.
    pub fn with_parent_span(mut self, span: &Span) -> Self {
        self.parent_span_context = Some(span.span_context().clone());
        self
    }

    /// Supply an explicit span context.
    ///
    /// Its trace id must match the resolved parent's trace id (if a parent
    /// exists); its span id is treated as informational and a fresh one is
    /// always generated.
    pub fn with_span_context(mut self, span_context: SpanContext) -> Self {
        self.span_context = Some(span_context);
        self
    }

    /// Starts the span, surfacing invalid-argument errors.
    pub fn try_start(self, tracer: &Tracer) -> TraceResult<Span> {
        tracer.build_span(self)
    }

    /// Starts the span.
    ///
    /// On invalid arguments this logs through the SDK diagnostics and
    /// returns a non-recording span, so instrumentation call sites never
    /// unwind.
    pub fn start(self, tracer: &Tracer) -> Span {
        let limits = tracer.provider.config().span_limits;
        match tracer.build_span(self) {
            Ok(span) => span,
            Err(err) => {
                sdk_warn!(
                    name: "Tracer.SpanCreationFailed",
                    error = err.to_string()
                );
                Span::new(SpanContext::NONE, None, tracer.clone(), limits)
            }
        }
    }
}
