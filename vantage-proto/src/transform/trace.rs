use crate::proto::collector::trace::v1::ExportTraceServiceRequest;
use crate::proto::trace::v1::{span, status, ResourceSpans, ScopeSpans, Span, Status};
use crate::transform::to_nanos;
use vantage::trace::{SpanData, SpanKind};
use vantage::InstrumentationScope;

impl From<&SpanKind> for span::SpanKind {
    fn from(span_kind: &SpanKind) -> Self {
        match span_kind {
            SpanKind::Client => span::SpanKind::Client,
            SpanKind::Consumer => span::SpanKind::Consumer,
            SpanKind::Internal => span::SpanKind::Internal,
            SpanKind::Producer => span::SpanKind::Producer,
            SpanKind::Server => span::SpanKind::Server,
        }
    }
}

impl From<&vantage::trace::Status> for status::StatusCode {
    fn from(status: &vantage::trace::Status) -> Self {
        match status {
            vantage::trace::Status::Ok => status::StatusCode::Ok,
            vantage::trace::Status::Unset => status::StatusCode::Unset,
            vantage::trace::Status::Error { .. } => status::StatusCode::Error,
        }
    }
}

impl From<vantage::trace::Event> for span::Event {
    fn from(event: vantage::trace::Event) -> Self {
        span::Event {
            time_unix_nano: to_nanos(event.timestamp),
            name: event.name.into_owned(),
            attributes: event.attributes.into_iter().map(Into::into).collect(),
            dropped_attributes_count: event.dropped_attributes_count,
        }
    }
}

impl From<vantage::trace::Link> for span::Link {
    fn from(link: vantage::trace::Link) -> Self {
        span::Link {
            trace_id: link.span_context.trace_id().to_bytes().to_vec(),
            span_id: link.span_context.span_id().to_bytes().to_vec(),
            trace_state: link.span_context.trace_state().header(),
            attributes: link.attributes.into_iter().map(Into::into).collect(),
            dropped_attributes_count: link.dropped_attributes_count,
        }
    }
}

impl From<SpanData> for Span {
    fn from(source_span: SpanData) -> Self {
        let span_kind: span::SpanKind = (&source_span.span_kind).into();
        Span {
            trace_id: source_span.span_context.trace_id().to_bytes().to_vec(),
            span_id: source_span.span_context.span_id().to_bytes().to_vec(),
            trace_state: source_span.span_context.trace_state().header(),
            // The all-zero parent id marks a root span; it is always
            // encoded, never omitted.
            parent_span_id: source_span.parent_span_id.to_bytes().to_vec(),
            name: source_span.name.into_owned(),
            kind: span_kind as i32,
            start_time_unix_nano: to_nanos(source_span.start_time),
            end_time_unix_nano: to_nanos(source_span.end_time),
            attributes: source_span.attributes.into_iter().map(Into::into).collect(),
            dropped_attributes_count: source_span.dropped_attributes_count,
            events: source_span.events.into_iter().map(Into::into).collect(),
            dropped_events_count: source_span.dropped_events_count,
            links: source_span.links.into_iter().map(Into::into).collect(),
            dropped_links_count: source_span.dropped_links_count,
            status: Some(Status {
                code: status::StatusCode::from(&source_span.status) as i32,
                message: match source_span.status {
                    vantage::trace::Status::Error { description } => description.into_owned(),
                    _ => Default::default(),
                },
            }),
        }
    }
}

/// Buckets finished spans by instrumentation scope under the provider's
/// resource, producing a complete export request.
pub fn group_spans(
    spans: Vec<SpanData>,
    resource: &vantage::Resource,
) -> ExportTraceServiceRequest {
    let mut scope_spans: Vec<(InstrumentationScope, Vec<Span>)> = Vec::new();
    for span in spans {
        let scope = span.instrumentation_scope.clone();
        match scope_spans.iter_mut().find(|(existing, _)| *existing == scope) {
            Some((_, bucket)) => bucket.push(span.into()),
            None => scope_spans.push((scope, vec![span.into()])),
        }
    }

    ExportTraceServiceRequest {
        resource_spans: vec![ResourceSpans {
            resource: Some(resource.into()),
            scope_spans: scope_spans
                .into_iter()
                .map(|(scope, spans)| ScopeSpans {
                    schema_url: scope.schema_url().unwrap_or_default().to_owned(),
                    scope: Some((&scope).into()),
                    spans,
                })
                .collect(),
            schema_url: resource.schema_url().unwrap_or_default().to_owned(),
        }],
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use vantage::trace::{InMemorySpanExporter, SdkTracerProvider};
    use vantage::{KeyValue, Resource};

    #[test]
    fn spans_group_by_scope() {
        let exporter = InMemorySpanExporter::default();
        let provider = SdkTracerProvider::builder()
            .with_simple_exporter(exporter.clone())
            .build();
        provider.tracer("scope-a").start("one").end();
        provider.tracer("scope-a").start("two").end();
        provider.tracer("scope-b").start("three").end();

        let resource = Resource::new([KeyValue::new("service.name", "grouping")]);
        let request = group_spans(exporter.get_finished_spans(), &resource);

        assert_eq!(request.resource_spans.len(), 1);
        let resource_spans = &request.resource_spans[0];
        assert_eq!(resource_spans.scope_spans.len(), 2);
        let total: usize = resource_spans
            .scope_spans
            .iter()
            .map(|scope_spans| scope_spans.spans.len())
            .sum();
        assert_eq!(total, 3);
        provider.shutdown().unwrap();
    }

    #[test]
    fn root_parent_id_is_zero_bytes() {
        let exporter = InMemorySpanExporter::default();
        let provider = SdkTracerProvider::builder()
            .with_simple_exporter(exporter.clone())
            .build();
        provider.tracer("roots").start("root").end();

        let request = group_spans(exporter.get_finished_spans(), &Resource::empty());
        let span = &request.resource_spans[0].scope_spans[0].spans[0];
        assert_eq!(span.parent_span_id, vec![0u8; 8]);
        assert_eq!(span.trace_id.len(), 16);
        assert_eq!(span.span_id.len(), 8);
        provider.shutdown().unwrap();
    }
}
