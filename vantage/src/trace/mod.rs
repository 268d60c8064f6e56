//! Distributed tracing: span lifecycle, sampling and processing.
//!
//! Spans are created by a [`Tracer`], which is obtained from an
//! [`SdkTracerProvider`]. When a span ends, an immutable [`SpanData`]
//! snapshot is handed to every registered [`SpanProcessor`], which buffers
//! it and forwards it to a [`SpanExporter`].
//!
//! ```
//! use vantage::trace::SdkTracerProvider;
//! use vantage::KeyValue;
//!
//! let provider = SdkTracerProvider::builder().build();
//! let tracer = provider.tracer("my-component");
//!
//! let mut span = tracer.start("operation");
//! span.set_attribute(KeyValue::new("my-attribute", "my-value"));
//! span.add_event("my-event", vec![KeyValue::new("stage", 1)]);
//! span.end();
//! # provider.shutdown().unwrap();
//! ```

mod config;
mod export;
mod id_generator;
mod in_memory_exporter;
mod sampler;
mod span;
mod span_context;
mod span_limit;
mod span_processor;
mod tracer;
mod tracer_provider;

pub use config::Config;
pub use export::SpanExporter;
pub use id_generator::{IdGenerator, RandomIdGenerator, SeededIdGenerator};
pub use in_memory_exporter::{InMemorySpanExporter, InMemorySpanExporterBuilder};
pub use sampler::{
    CompositeOp, CompositeSampler, CountingSampler, OverrideCondition, ParentBasedSampler,
    RateLimitingSampler, Sampler, SamplingDecision, SamplingResult, ShouldSample,
};
pub use span::{Span, SpanData};
pub use span_context::{SpanContext, SpanId, TraceFlags, TraceId, TraceState};
pub use span_limit::SpanLimits;
pub use span_processor::{
    BatchConfig, BatchConfigBuilder, BatchSpanProcessor, BatchSpanProcessorBuilder,
    SimpleSpanProcessor, SpanProcessor,
};
pub use tracer::{SpanBuilder, Tracer};
pub use tracer_provider::{SdkTracerProvider, TracerProviderBuilder};

use crate::KeyValue;
use std::borrow::Cow;
use std::time::SystemTime;
use thiserror::Error;

/// Describe the relationship between the [`Span`], its parents, and its
/// children in a trace.
#[derive(Clone, Debug, PartialEq, Eq)]
pub enum SpanKind {
    /// The span describes a request to some remote service.
    Client,
    /// The span describes the server-side handling of a synchronous request.
    Server,
    /// The span describes the initiation of an asynchronously processed
    /// message.
    Producer,
    /// The span describes the processing of an asynchronously received
    /// message.
    Consumer,
    /// Default value.
    ///
    /// The span describes an internal operation within an application.
    Internal,
}

/// The status of a [`Span`].
///
/// `Unset` may transition to `Ok` or `Error`; both are final, except that
/// an `Error` accepts another `Error` as a description refinement.
#[derive(Clone, Debug, Default, PartialEq)]
pub enum Status {
    /// The default status.
    #[default]
    Unset,

    /// The operation contains an error.
    Error {
        /// The description of the error.
        description: Cow<'static, str>,
    },

    /// The operation has been validated by an application developer or
    /// operator to have completed successfully.
    Ok,
}

impl Status {
    /// Create an error status with the given description.
    pub fn error(description: impl Into<Cow<'static, str>>) -> Self {
        Status::Error {
            description: description.into(),
        }
    }
}

/// A timestamped annotation on a [`Span`].
#[derive(Clone, Debug, PartialEq)]
pub struct Event {
    /// The name of this event.
    pub name: Cow<'static, str>,

    /// The wall clock time at which the event occurred.
    pub timestamp: SystemTime,

    /// The attributes describing the event.
    pub attributes: Vec<KeyValue>,

    /// The number of attributes dropped because of limits.
    pub dropped_attributes_count: u32,
}

impl Event {
    /// Create a new event.
    pub fn new<T: Into<Cow<'static, str>>>(
        name: T,
        timestamp: SystemTime,
        attributes: Vec<KeyValue>,
        dropped_attributes_count: u32,
    ) -> Self {
        Event {
            name: name.into(),
            timestamp,
            attributes,
            dropped_attributes_count,
        }
    }
}

/// A causal reference from one [`Span`] to another, possibly in a different
/// trace.
#[derive(Clone, Debug, PartialEq)]
pub struct Link {
    /// The span context of the linked span.
    pub span_context: SpanContext,

    /// The attributes describing the link.
    pub attributes: Vec<KeyValue>,

    /// The number of attributes dropped because of limits.
    pub dropped_attributes_count: u32,
}

impl Link {
    /// Create a new link to the given span context.
    pub fn new(span_context: SpanContext, attributes: Vec<KeyValue>) -> Self {
        Link {
            span_context,
            attributes,
            dropped_attributes_count: 0,
        }
    }
}

/// Errors returned by the trace API.
#[derive(Error, Debug)]
#[non_exhaustive]
pub enum TraceError {
    /// A runtime misuse of the API, such as supplying an explicit span
    /// context whose trace id differs from the parent's.
    #[error("invalid argument: {0}")]
    InvalidArgument(String),

    /// A `TraceState` key, value or list entry failed validation.
    #[error("invalid tracestate: {0}")]
    InvalidTraceState(String),
}

/// A specialized `Result` for trace operations.
pub type TraceResult<T> = Result<T, TraceError>;
