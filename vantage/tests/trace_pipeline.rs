//! End-to-end span pipeline behavior: sampling inheritance, record-only
//! delivery and parent/child identity.

use std::sync::atomic::{AtomicUsize, Ordering};
use std::sync::Arc;
use vantage::error::SdkResult;
use vantage::trace::{
    InMemorySpanExporter, Sampler, SamplingDecision, SamplingResult, SdkTracerProvider,
    SeededIdGenerator, ShouldSample, Span, SpanContext, SpanData, SpanId, SpanKind, SpanProcessor,
    TraceFlags, TraceId, TraceState,
};
use vantage::{Context, KeyValue};

#[test]
fn sampling_is_inherited_from_parent() {
    let exporter = InMemorySpanExporter::default();
    let provider = SdkTracerProvider::builder()
        .with_sampler(Sampler::ParentBased(Box::new(Sampler::AlwaysOn)))
        .with_simple_exporter(exporter.clone())
        .build();
    let tracer = provider.tracer("inheritance");

    let mut root = tracer.start("A");
    assert!(root.span_context().is_sampled());

    let root_cx = Context::new().with_span_context(root.span_context().clone());
    let mut child = tracer.start_with_context("B", &root_cx);
    assert_eq!(
        child.span_context().trace_id(),
        root.span_context().trace_id()
    );
    assert!(child.span_context().is_sampled());

    child.end();
    root.end();

    let spans = exporter.get_finished_spans();
    assert_eq!(spans.len(), 2);
    let b = spans.iter().find(|s| s.name == "B").unwrap();
    let a = spans.iter().find(|s| s.name == "A").unwrap();
    assert_eq!(b.parent_span_id, a.span_context.span_id());
    assert_ne!(b.span_context.span_id(), a.span_context.span_id());
    // Root spans encode the invalid parent id, never omit it.
    assert_eq!(a.parent_span_id, SpanId::INVALID);
    assert_eq!(format!("{}", a.parent_span_id), "0000000000000000");

    // A remote unsampled parent forces the child unsampled.
    let remote = SpanContext::new(
        TraceId::from_u128(0xabcd),
        SpanId::from_u64(0x1234),
        TraceFlags::NOT_SAMPLED,
        true,
        TraceState::default(),
    );
    let remote_cx = Context::new().with_remote_span_context(remote);
    let c = tracer.start_with_context("C", &remote_cx);
    assert!(!c.span_context().is_sampled());

    provider.shutdown().unwrap();
}

/// A sampler that records spans locally without setting the sampled flag.
#[derive(Clone, Debug)]
struct RecordOnlySampler;

impl ShouldSample for RecordOnlySampler {
    fn should_sample(
        &self,
        _parent_context: Option<&Context>,
        _trace_id: TraceId,
        _name: &str,
        _span_kind: &SpanKind,
        _attributes: &[KeyValue],
        _links: &[vantage::trace::Link],
    ) -> SamplingResult {
        SamplingResult {
            decision: SamplingDecision::RecordOnly,
            attributes: Vec::new(),
            trace_state: TraceState::default(),
        }
    }

    fn description(&self) -> String {
        "RecordOnly".to_owned()
    }
}

#[derive(Debug, Default)]
struct CountingProcessor {
    seen: Arc<AtomicUsize>,
}

impl SpanProcessor for CountingProcessor {
    fn on_start(&self, _span: &mut Span, _cx: &Context) {}

    fn on_end(&self, _span: SpanData) {
        self.seen.fetch_add(1, Ordering::SeqCst);
    }

    fn force_flush(&self) -> SdkResult {
        Ok(())
    }

    fn shutdown(&self) -> SdkResult {
        Ok(())
    }
}

#[test]
fn record_only_spans_reach_processors() {
    let seen = Arc::new(AtomicUsize::new(0));
    let exporter = InMemorySpanExporter::default();
    let provider = SdkTracerProvider::builder()
        .with_sampler(RecordOnlySampler)
        .with_span_processor(CountingProcessor { seen: seen.clone() })
        .with_simple_exporter(exporter.clone())
        .build();
    let tracer = provider.tracer("record-only");

    let mut span = tracer.start("ro");
    assert!(span.is_recording());
    assert!(!span.span_context().is_sampled());
    span.set_attribute(KeyValue::new("recorded", true));
    span.end();

    // Every registered processor received the snapshot, sampled flag and
    // all, so consumers downstream can tell it apart from sampled spans.
    assert_eq!(seen.load(Ordering::SeqCst), 1);
    let exported = exporter.get_finished_spans();
    assert_eq!(exported.len(), 1);
    assert!(!exported[0].span_context.is_sampled());
    assert_eq!(exported[0].attributes, vec![KeyValue::new("recorded", true)]);
    provider.shutdown().unwrap();
}

#[test]
fn dropped_spans_never_reach_processors() {
    let seen = Arc::new(AtomicUsize::new(0));
    let provider = SdkTracerProvider::builder()
        .with_sampler(Sampler::AlwaysOff)
        .with_span_processor(CountingProcessor { seen: seen.clone() })
        .build();
    let tracer = provider.tracer("dropped");

    let mut span = tracer.start("off");
    assert!(!span.is_recording());
    // The span context remains usable for propagation.
    assert!(span.span_context().is_valid());
    span.end();
    assert_eq!(seen.load(Ordering::SeqCst), 0);
    provider.shutdown().unwrap();
}

#[test]
fn explicit_span_context_must_share_the_parent_trace() {
    let provider = SdkTracerProvider::builder().build();
    let tracer = provider.tracer("explicit");

    let parent = tracer.start("parent");
    let parent_cx = Context::new().with_span_context(parent.span_context().clone());

    let conflicting = SpanContext::new(
        TraceId::from_u128(0xdead_beef),
        SpanId::from_u64(0x77),
        TraceFlags::SAMPLED,
        false,
        TraceState::default(),
    );
    let err = tracer
        .span_builder("child")
        .with_parent_context(parent_cx.clone())
        .with_span_context(conflicting)
        .try_start(&tracer);
    assert!(err.is_err());

    // A matching trace id is accepted, and the span id is regenerated.
    let matching = SpanContext::new(
        parent.span_context().trace_id(),
        SpanId::from_u64(0x77),
        TraceFlags::SAMPLED,
        false,
        TraceState::default(),
    );
    let child = tracer
        .span_builder("child")
        .with_parent_context(parent_cx)
        .with_span_context(matching)
        .try_start(&tracer)
        .unwrap();
    assert_eq!(
        child.span_context().trace_id(),
        parent.span_context().trace_id()
    );
    assert_ne!(child.span_context().span_id(), SpanId::from_u64(0x77));
    provider.shutdown().unwrap();
}

#[test]
fn seeded_id_generator_gives_reproducible_traces() {
    let spans_with_seed = |seed: u64| {
        let exporter = InMemorySpanExporter::default();
        let provider = SdkTracerProvider::builder()
            .with_id_generator(SeededIdGenerator::new(seed))
            .with_simple_exporter(exporter.clone())
            .build();
        let tracer = provider.tracer("seeded");
        tracer.start("one").end();
        tracer.start("two").end();
        provider.shutdown().unwrap();
        exporter
            .get_finished_spans()
            .iter()
            .map(|s| (s.span_context.trace_id(), s.span_context.span_id()))
            .collect::<Vec<_>>()
    };

    assert_eq!(spans_with_seed(7), spans_with_seed(7));
    assert_ne!(spans_with_seed(7), spans_with_seed(8));
}
