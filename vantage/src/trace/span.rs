//! An operation within a trace, with a start and end time, attributes,
//! events, links and a status.
//!
//! A span is mutable only between its creation and the [`Span::end`] call.
//! Ending a span freezes it into an immutable [`SpanData`] snapshot that is
//! handed to every processor registered with the owning provider; further
//! mutation calls are silently ignored.

use crate::time;
use crate::trace::{Event, Link, SpanContext, SpanId, SpanKind, SpanLimits, Status};
use crate::{InstrumentationScope, KeyValue, Value};
use std::borrow::Cow;
use std::time::SystemTime;

/// Single operation within a trace.
#[derive(Debug)]
pub struct Span {
    span_context: SpanContext,
    data: Option<RecordedData>,
    tracer: crate::trace::Tracer,
    span_limits: SpanLimits,
}

#[derive(Clone, Debug)]
pub(crate) struct RecordedData {
    pub(crate) parent_span_id: SpanId,
    pub(crate) span_kind: SpanKind,
    pub(crate) name: Cow<'static, str>,
    pub(crate) start_time: SystemTime,
    pub(crate) attributes: Vec<KeyValue>,
    pub(crate) dropped_attributes_count: u32,
    pub(crate) events: Vec<Event>,
    pub(crate) dropped_events_count: u32,
    pub(crate) links: Vec<Link>,
    pub(crate) dropped_links_count: u32,
    pub(crate) status: Status,
}

/// The immutable snapshot of a finished span, as delivered to processors
/// and exporters.
#[derive(Clone, Debug)]
pub struct SpanData {
    /// The span's context.
    pub span_context: SpanContext,
    /// The id of the parent span, invalid (all-zero) for root spans.
    pub parent_span_id: SpanId,
    /// The kind of span.
    pub span_kind: SpanKind,
    /// The span name.
    pub name: Cow<'static, str>,
    /// The time the span started.
    pub start_time: SystemTime,
    /// The time the span ended.
    pub end_time: SystemTime,
    /// The recorded attributes.
    pub attributes: Vec<KeyValue>,
    /// Attributes dropped because of the count limit.
    pub dropped_attributes_count: u32,
    /// The recorded events.
    pub events: Vec<Event>,
    /// Events dropped because of the count limit.
    pub dropped_events_count: u32,
    /// The recorded links.
    pub links: Vec<Link>,
    /// Links dropped because of the count limit.
    pub dropped_links_count: u32,
    /// The span status.
    pub status: Status,
    /// The scope of the tracer that produced this span.
    pub instrumentation_scope: InstrumentationScope,
}

impl Span {
    pub(crate) fn new(
        span_context: SpanContext,
        data: Option<RecordedData>,
        tracer: crate::trace::Tracer,
        span_limits: SpanLimits,
    ) -> Self {
        Span {
            span_context,
            data,
            tracer,
            span_limits,
        }
    }

    /// The [`SpanContext`] of this span, valid whether or not the span is
    /// recording.
    pub fn span_context(&self) -> &SpanContext {
        &self.span_context
    }

    /// Returns true until the span has ended; non-recording spans always
    /// return false.
    pub fn is_recording(&self) -> bool {
        self.data.is_some()
    }

    /// Returns a copy of the current context with this span's context set
    /// as the active span context.
    pub fn make_current(&self) -> crate::ContextGuard {
        crate::Context::map_current(|cx| cx.with_span_context(self.span_context.clone())).attach()
    }

    fn with_data<F: FnOnce(&mut RecordedData)>(&mut self, f: F) {
        if let Some(data) = self.data.as_mut() {
            f(data);
        }
    }

    /// Records an attribute, replacing any previous value for the same key.
    ///
    /// Note that the OpenTelemetry project documents certain ["standard
    /// attributes"] that have prescribed semantic meanings.
    ///
    /// ["standard attributes"]: https://opentelemetry.io/docs/specs/semconv/
    pub fn set_attribute(&mut self, attribute: KeyValue) {
        let limits = self.span_limits;
        self.with_data(|data| {
            set_attribute_with_limits(
                &mut data.attributes,
                &mut data.dropped_attributes_count,
                attribute,
                limits.max_attributes_per_span,
                limits.max_attribute_value_length,
            );
        });
    }

    /// Records several attributes at once.
    pub fn set_attributes(&mut self, attributes: impl IntoIterator<Item = KeyValue>) {
        if self.is_recording() {
            for attribute in attributes {
                self.set_attribute(attribute);
            }
        }
    }

    /// Adds an event with the current timestamp.
    pub fn add_event<T>(&mut self, name: T, attributes: Vec<KeyValue>)
    where
        T: Into<Cow<'static, str>>,
    {
        self.add_event_with_timestamp(name, time::now(), attributes)
    }

    /// Adds an event with the given timestamp.
    pub fn add_event_with_timestamp<T>(
        &mut self,
        name: T,
        timestamp: SystemTime,
        mut attributes: Vec<KeyValue>,
    ) where
        T: Into<Cow<'static, str>>,
    {
        let limits = self.span_limits;
        self.with_data(|data| {
            if data.events.len() >= limits.max_events_per_span as usize {
                data.dropped_events_count += 1;
                return;
            }
            let dropped = enforce_attribute_limits(
                &mut attributes,
                limits.max_attributes_per_event,
                limits.max_attribute_value_length,
            );
            data.events
                .push(Event::new(name, timestamp, attributes, dropped));
        });
    }

    /// Adds a link to another span.
    pub fn add_link(&mut self, span_context: SpanContext, mut attributes: Vec<KeyValue>) {
        let limits = self.span_limits;
        self.with_data(|data| {
            if data.links.len() >= limits.max_links_per_span as usize {
                data.dropped_links_count += 1;
                return;
            }
            let dropped = enforce_attribute_limits(
                &mut attributes,
                limits.max_attributes_per_link,
                limits.max_attribute_value_length,
            );
            data.links.push(Link {
                span_context,
                attributes,
                dropped_attributes_count: dropped,
            });
        });
    }

    /// Sets the status of this span.
    ///
    /// `Ok` is final: once set, later status changes are ignored. An
    /// existing `Error` accepts only another `Error` (description
    /// refinement), and no status can return to `Unset`.
    pub fn set_status(&mut self, status: Status) {
        self.with_data(|data| {
            let allowed = matches!(
                (&data.status, &status),
                // `Unset` may move to either final state; an existing
                // `Error` accepts only description refinement. `Ok` is
                // final, and no status returns to `Unset`.
                (Status::Unset, Status::Ok | Status::Error { .. })
                    | (Status::Error { .. }, Status::Error { .. })
            );
            if allowed {
                data.status = status;
            }
        });
    }

    /// Updates the span's name, overriding sampling decisions already made
    /// with the previous name.
    pub fn update_name<T>(&mut self, new_name: T)
    where
        T: Into<Cow<'static, str>>,
    {
        let name = new_name.into();
        self.with_data(|data| data.name = name);
    }

    /// Records an error as an `exception` event and marks the span status
    /// as `Error` unless it was already set to `Ok`.
    pub fn record_exception<E>(&mut self, err: &E)
    where
        E: std::error::Error + ?Sized,
    {
        self.record_exception_inner(err, None)
    }

    /// Like [`Span::record_exception`], also recording the stacktrace.
    pub fn record_exception_with_stacktrace<E, T>(&mut self, err: &E, stacktrace: T)
    where
        E: std::error::Error + ?Sized,
        T: Into<Cow<'static, str>>,
    {
        self.record_exception_inner(err, Some(stacktrace.into()))
    }

    fn record_exception_inner<E>(&mut self, err: &E, stacktrace: Option<Cow<'static, str>>)
    where
        E: std::error::Error + ?Sized,
    {
        let message = err.to_string();
        let mut attributes = vec![
            KeyValue::new("exception.type", std::any::type_name::<E>()),
            KeyValue::new("exception.message", message.clone()),
        ];
        if let Some(stacktrace) = stacktrace {
            attributes.push(KeyValue::new(
                "exception.stacktrace",
                stacktrace.into_owned(),
            ));
        }
        self.add_event("exception", attributes);
        self.set_status(Status::error(message));
    }

    /// Finishes the span with the current time.
    pub fn end(&mut self) {
        self.end_with_timestamp(time::now());
    }

    /// Finishes the span with the given timestamp.
    pub fn end_with_timestamp(&mut self, timestamp: SystemTime) {
        self.ensure_ended_and_deliver(timestamp);
    }

    fn ensure_ended_and_deliver(&mut self, end_time: SystemTime) {
        // Skip if the span has already ended or never recorded.
        if let Some(data) = self.data.take() {
            let snapshot = SpanData {
                span_context: self.span_context.clone(),
                parent_span_id: data.parent_span_id,
                span_kind: data.span_kind,
                name: data.name,
                start_time: data.start_time,
                end_time,
                attributes: data.attributes,
                dropped_attributes_count: data.dropped_attributes_count,
                events: data.events,
                dropped_events_count: data.dropped_events_count,
                links: data.links,
                dropped_links_count: data.dropped_links_count,
                status: data.status,
                instrumentation_scope: self.tracer.scope().clone(),
            };
            self.tracer.deliver_ended_span(snapshot);
        }
    }
}

impl Drop for Span {
    /// Ends this span if it was not already ended explicitly.
    fn drop(&mut self) {
        self.ensure_ended_and_deliver(time::now());
    }
}

fn truncate_value(value: &mut Value, max_len: u32) {
    let max_len = max_len as usize;
    match value {
        Value::String(s) => {
            if s.len() > max_len {
                let mut cut = max_len;
                while cut > 0 && !s.is_char_boundary(cut) {
                    cut -= 1;
                }
                s.truncate(cut);
            }
        }
        Value::Array(crate::Array::String(items)) => {
            for s in items {
                if s.len() > max_len {
                    let mut cut = max_len;
                    while cut > 0 && !s.is_char_boundary(cut) {
                        cut -= 1;
                    }
                    s.truncate(cut);
                }
            }
        }
        _ => {}
    }
}

pub(crate) fn set_attribute_with_limits(
    attributes: &mut Vec<KeyValue>,
    dropped: &mut u32,
    mut attribute: KeyValue,
    max_count: u32,
    max_value_length: Option<u32>,
) {
    if attribute.key.as_str().is_empty() {
        *dropped += 1;
        return;
    }
    if let Some(max_len) = max_value_length {
        truncate_value(&mut attribute.value, max_len);
    }
    if let Some(existing) = attributes.iter_mut().find(|kv| kv.key == attribute.key) {
        existing.value = attribute.value;
    } else if attributes.len() < max_count as usize {
        attributes.push(attribute);
    } else {
        *dropped += 1;
    }
}

/// Applies count and value-length limits in place, returning the dropped
/// count.
pub(crate) fn enforce_attribute_limits(
    attributes: &mut Vec<KeyValue>,
    max_count: u32,
    max_value_length: Option<u32>,
) -> u32 {
    let mut dropped = 0;
    let before = attributes.len();
    attributes.retain(|kv| !kv.key.as_str().is_empty());
    dropped += (before - attributes.len()) as u32;

    if attributes.len() > max_count as usize {
        dropped += (attributes.len() - max_count as usize) as u32;
        attributes.truncate(max_count as usize);
    }
    if let Some(max_len) = max_value_length {
        for attribute in attributes.iter_mut() {
            truncate_value(&mut attribute.value, max_len);
        }
    }
    dropped
}

#[cfg(test)]
mod tests {
    use super::*;
    use crate::trace::{InMemorySpanExporter, SdkTracerProvider};

    fn test_tracer() -> (crate::trace::Tracer, InMemorySpanExporter, SdkTracerProvider) {
        let exporter = InMemorySpanExporter::default();
        let provider = SdkTracerProvider::builder()
            .with_simple_exporter(exporter.clone())
            .build();
        (provider.tracer("span-tests"), exporter, provider)
    }

    #[test]
    fn mutations_after_end_are_ignored() {
        let (tracer, exporter, _provider) = test_tracer();
        let mut span = tracer.start("op");
        span.set_attribute(KeyValue::new("before", true));
        span.end();
        span.set_attribute(KeyValue::new("after", true));
        span.add_event("late", vec![]);
        span.update_name("renamed");
        span.end();

        let spans = exporter.get_finished_spans();
        assert_eq!(spans.len(), 1);
        assert_eq!(spans[0].name, "op");
        assert_eq!(spans[0].attributes, vec![KeyValue::new("before", true)]);
        assert!(spans[0].events.is_empty());
    }

    #[test]
    fn status_transitions() {
        let (tracer, exporter, _provider) = test_tracer();
        let mut span = tracer.start("op");
        span.set_status(Status::error("first"));
        // Error accepts description refinement.
        span.set_status(Status::error("refined"));
        assert_eq!(
            {
                span.end();
                exporter.get_finished_spans()[0].status.clone()
            },
            Status::error("refined")
        );

        exporter.reset();
        let mut span = tracer.start("op2");
        span.set_status(Status::Ok);
        // Ok is final.
        span.set_status(Status::error("too late"));
        span.end();
        assert_eq!(exporter.get_finished_spans()[0].status, Status::Ok);

        exporter.reset();
        let mut span = tracer.start("op3");
        span.set_status(Status::error("stays"));
        // An error cannot be upgraded to Ok.
        span.set_status(Status::Ok);
        span.set_status(Status::Unset);
        span.end();
        assert_eq!(exporter.get_finished_spans()[0].status, Status::error("stays"));
    }

    #[test]
    fn attribute_count_limit_drops_and_counts() {
        let exporter = InMemorySpanExporter::default();
        let mut limits = SpanLimits::default();
        limits.max_attributes_per_span = 2;
        let provider = SdkTracerProvider::builder()
            .with_simple_exporter(exporter.clone())
            .with_span_limits(limits)
            .build();
        let tracer = provider.tracer("span-tests");
        let mut span = tracer.start("op");
        span.set_attribute(KeyValue::new("a", 1));
        span.set_attribute(KeyValue::new("b", 2));
        span.set_attribute(KeyValue::new("c", 3));
        // Replacing an existing key is not a drop.
        span.set_attribute(KeyValue::new("a", 10));
        span.end();

        let spans = exporter.get_finished_spans();
        assert_eq!(spans[0].attributes.len(), 2);
        assert_eq!(spans[0].dropped_attributes_count, 1);
        assert_eq!(spans[0].attributes[0], KeyValue::new("a", 10));
    }

    #[test]
    fn event_limit_and_value_truncation() {
        let exporter = InMemorySpanExporter::default();
        let mut limits = SpanLimits::default();
        limits.max_events_per_span = 1;
        limits.max_attribute_value_length = Some(3);
        let provider = SdkTracerProvider::builder()
            .with_simple_exporter(exporter.clone())
            .with_span_limits(limits)
            .build();
        let tracer = provider.tracer("span-tests");
        let mut span = tracer.start("op");
        span.add_event("first", vec![]);
        span.add_event("second", vec![]);
        span.set_attribute(KeyValue::new("k", "truncate-me"));
        span.end();

        let spans = exporter.get_finished_spans();
        assert_eq!(spans[0].events.len(), 1);
        assert_eq!(spans[0].dropped_events_count, 1);
        assert_eq!(spans[0].attributes[0], KeyValue::new("k", "tru"));
    }

    #[test]
    fn record_exception_sets_error_status() {
        let (tracer, exporter, _provider) = test_tracer();
        let err = std::io::Error::new(std::io::ErrorKind::Other, "boom");
        let mut span = tracer.start("op");
        span.record_exception(&err);
        span.end();

        let spans = exporter.get_finished_spans();
        assert_eq!(spans[0].status, Status::error("boom"));
        let event = &spans[0].events[0];
        assert_eq!(event.name, "exception");
        assert!(event
            .attributes
            .iter()
            .any(|kv| kv.key.as_str() == "exception.message" && kv.value == "boom".into()));
        assert!(event
            .attributes
            .iter()
            .any(|kv| kv.key.as_str() == "exception.type"));
    }

    #[test]
    fn span_ends_on_drop() {
        let (tracer, exporter, _provider) = test_tracer();
        {
            let _span = tracer.start("dropped");
        }
        assert_eq!(exporter.get_finished_spans().len(), 1);
    }
}
