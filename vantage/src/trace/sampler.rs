use crate::trace::{SpanKind, TraceId, TraceState};
use crate::{Context, Key, KeyValue, Value};
use std::fmt;
use std::sync::atomic::{AtomicU64, Ordering};
use std::sync::{Arc, Mutex};
use std::time::{Duration, Instant};

use super::Link;

/// A decision about how a span should be handled, made before the span is
/// created.
#[derive(Clone, Copy, Debug, PartialEq, Eq)]
pub enum SamplingDecision {
    /// The span is not created at all; a non-recording placeholder carries
    /// the span context for propagation.
    Drop,
    /// The span is recorded and delivered to processors with its
    /// `sampled` flag unset; consumers must honor the distinction from
    /// sampled spans.
    RecordOnly,
    /// The span is recorded and the `sampled` flag is set.
    RecordAndSample,
}

/// The result of a sampling decision.
#[derive(Clone, Debug, PartialEq)]
pub struct SamplingResult {
    /// The sampling decision.
    pub decision: SamplingDecision,
    /// Extra attributes the sampler wants added to the span.
    pub attributes: Vec<KeyValue>,
    /// The trace state to use for the new span.
    pub trace_state: TraceState,
}

/// The interface consulted when a span starts.
///
/// `should_sample` can use any of the provided information to decide whether
/// the span is dropped, recorded locally, or recorded and exported. For the
/// same inputs the decision must be stable, so samplers can be consulted
/// from any thread.
pub trait ShouldSample: CloneShouldSample + Send + Sync + fmt::Debug {
    /// Returns the sampling decision for a span about to be created.
    #[allow(clippy::too_many_arguments)]
    fn should_sample(
        &self,
        parent_context: Option<&Context>,
        trace_id: TraceId,
        name: &str,
        span_kind: &SpanKind,
        attributes: &[KeyValue],
        links: &[Link],
    ) -> SamplingResult;

    /// A human readable description of the sampler configuration.
    fn description(&self) -> String;
}

/// Supporting trait enabling `Box<dyn ShouldSample>` to be cloned; use
/// [`ShouldSample`] instead.
pub trait CloneShouldSample {
    /// Clone into a fresh boxed trait object.
    fn box_clone(&self) -> Box<dyn ShouldSample>;
}

impl<T> CloneShouldSample for T
where
    T: ShouldSample + Clone + 'static,
{
    fn box_clone(&self) -> Box<dyn ShouldSample> {
        Box::new(self.clone())
    }
}

impl Clone for Box<dyn ShouldSample> {
    fn clone(&self) -> Self {
        self.box_clone()
    }
}

fn parent_trace_state(parent_context: Option<&Context>) -> TraceState {
    parent_context
        .and_then(|cx| cx.span_context())
        .map(|sc| sc.trace_state().clone())
        .unwrap_or_default()
}

/// Built-in sampling options.
///
/// For scenarios these do not cover, implement [`ShouldSample`] directly or
/// compose decisions with [`CompositeSampler`].
#[derive(Clone, Debug)]
#[non_exhaustive]
pub enum Sampler {
    /// Always sample the trace.
    AlwaysOn,
    /// Never sample the trace.
    AlwaysOff,
    /// Mirror the parent span's decision when a parent exists, otherwise
    /// delegate to the wrapped root sampler.
    ///
    /// This is shorthand for a [`ParentBasedSampler`] with the default
    /// delegate table.
    ParentBased(Box<dyn ShouldSample>),
    /// Sample a given fraction of traces, decided deterministically from the
    /// trace id so every participant of a trace reaches the same decision.
    /// Ratios >= 1 always sample, ratios <= 0 never sample.
    TraceIdRatioBased(f64),
}

impl ShouldSample for Sampler {
    fn should_sample(
        &self,
        parent_context: Option<&Context>,
        trace_id: TraceId,
        name: &str,
        span_kind: &SpanKind,
        attributes: &[KeyValue],
        links: &[Link],
    ) -> SamplingResult {
        let decision = match self {
            Sampler::AlwaysOn => SamplingDecision::RecordAndSample,
            Sampler::AlwaysOff => SamplingDecision::Drop,
            Sampler::ParentBased(root) => {
                match parent_context.and_then(|cx| cx.span_context()) {
                    Some(parent) if parent.is_valid() => {
                        if parent.is_sampled() {
                            SamplingDecision::RecordAndSample
                        } else {
                            SamplingDecision::Drop
                        }
                    }
                    _ => {
                        root.should_sample(
                            parent_context,
                            trace_id,
                            name,
                            span_kind,
                            attributes,
                            links,
                        )
                        .decision
                    }
                }
            }
            Sampler::TraceIdRatioBased(ratio) => sample_from_trace_id(*ratio, trace_id),
        };

        SamplingResult {
            decision,
            // The built-in samplers add no attributes and pass the parent
            // trace state through unchanged.
            attributes: Vec::new(),
            trace_state: parent_trace_state(parent_context),
        }
    }

    fn description(&self) -> String {
        match self {
            Sampler::AlwaysOn => "AlwaysOnSampler".to_owned(),
            Sampler::AlwaysOff => "AlwaysOffSampler".to_owned(),
            Sampler::ParentBased(root) => format!("ParentBased{{root:{}}}", root.description()),
            Sampler::TraceIdRatioBased(ratio) => format!("TraceIdRatioBased{{{ratio}}}"),
        }
    }
}

/// Deterministic ratio decision: the low 64 bits of the trace id are
/// compared against `ratio * 2^64`, so identical trace ids reach identical
/// decisions in every process.
pub(crate) fn sample_from_trace_id(ratio: f64, trace_id: TraceId) -> SamplingDecision {
    if ratio >= 1.0 {
        return SamplingDecision::RecordAndSample;
    }
    if ratio <= 0.0 {
        return SamplingDecision::Drop;
    }
    let threshold = (ratio * (u64::MAX as f64 + 1.0)) as u64;
    let low_bits = u64::from_be_bytes(trace_id.to_bytes()[8..].try_into().expect("8 bytes"));
    if low_bits < threshold {
        SamplingDecision::RecordAndSample
    } else {
        SamplingDecision::Drop
    }
}

/// A sampler that selects a delegate from the parent span's origin and
/// sampled flag.
///
/// When no parent exists, `root` decides. The remaining four delegates
/// default to `AlwaysOn` for sampled parents and `AlwaysOff` for unsampled
/// parents, which reproduces the plain parent-mirroring behavior of
/// [`Sampler::ParentBased`].
#[derive(Clone, Debug)]
pub struct ParentBasedSampler {
    root: Box<dyn ShouldSample>,
    remote_parent_sampled: Box<dyn ShouldSample>,
    remote_parent_not_sampled: Box<dyn ShouldSample>,
    local_parent_sampled: Box<dyn ShouldSample>,
    local_parent_not_sampled: Box<dyn ShouldSample>,
}

impl ParentBasedSampler {
    /// Create a parent-based sampler with the default delegate table.
    pub fn new(root: Box<dyn ShouldSample>) -> Self {
        ParentBasedSampler {
            root,
            remote_parent_sampled: Box::new(Sampler::AlwaysOn),
            remote_parent_not_sampled: Box::new(Sampler::AlwaysOff),
            local_parent_sampled: Box::new(Sampler::AlwaysOn),
            local_parent_not_sampled: Box::new(Sampler::AlwaysOff),
        }
    }

    /// Override the delegate used for sampled remote parents.
    pub fn with_remote_parent_sampled(mut self, sampler: Box<dyn ShouldSample>) -> Self {
        self.remote_parent_sampled = sampler;
        self
    }

    /// Override the delegate used for unsampled remote parents.
    pub fn with_remote_parent_not_sampled(mut self, sampler: Box<dyn ShouldSample>) -> Self {
        self.remote_parent_not_sampled = sampler;
        self
    }

    /// Override the delegate used for sampled local parents.
    pub fn with_local_parent_sampled(mut self, sampler: Box<dyn ShouldSample>) -> Self {
        self.local_parent_sampled = sampler;
        self
    }

    /// Override the delegate used for unsampled local parents.
    pub fn with_local_parent_not_sampled(mut self, sampler: Box<dyn ShouldSample>) -> Self {
        self.local_parent_not_sampled = sampler;
        self
    }
}

impl ShouldSample for ParentBasedSampler {
    fn should_sample(
        &self,
        parent_context: Option<&Context>,
        trace_id: TraceId,
        name: &str,
        span_kind: &SpanKind,
        attributes: &[KeyValue],
        links: &[Link],
    ) -> SamplingResult {
        let delegate = match parent_context.and_then(|cx| cx.span_context()) {
            Some(parent) if parent.is_valid() => {
                match (parent.is_remote(), parent.is_sampled()) {
                    (true, true) => &self.remote_parent_sampled,
                    (true, false) => &self.remote_parent_not_sampled,
                    (false, true) => &self.local_parent_sampled,
                    (false, false) => &self.local_parent_not_sampled,
                }
            }
            _ => &self.root,
        };
        delegate.should_sample(parent_context, trace_id, name, span_kind, attributes, links)
    }

    fn description(&self) -> String {
        format!("ParentBased{{root:{}}}", self.root.description())
    }
}

/// A token-bucket sampler admitting at most `max_per_window` sampled spans
/// per window; spans beyond the budget are dropped.
///
/// Clones share the same bucket, so a cloned sampler does not double the
/// budget.
#[derive(Clone, Debug)]
pub struct RateLimitingSampler {
    max_per_window: f64,
    window: Duration,
    bucket: Arc<Mutex<TokenBucket>>,
}

#[derive(Debug)]
struct TokenBucket {
    balance: f64,
    last_refill: Instant,
}

impl RateLimitingSampler {
    /// Allow `max_per_window` sampled spans per one-second window.
    pub fn new(max_per_window: u64) -> Self {
        Self::with_window(max_per_window, Duration::from_secs(1))
    }

    /// Allow `max_per_window` sampled spans per `window`.
    pub fn with_window(max_per_window: u64, window: Duration) -> Self {
        RateLimitingSampler {
            max_per_window: max_per_window as f64,
            window,
            bucket: Arc::new(Mutex::new(TokenBucket {
                balance: max_per_window as f64,
                last_refill: Instant::now(),
            })),
        }
    }

    fn try_take(&self) -> bool {
        let mut bucket = self.bucket.lock().unwrap_or_else(|e| e.into_inner());
        let elapsed = bucket.last_refill.elapsed();
        if !self.window.is_zero() {
            let refill = elapsed.as_secs_f64() / self.window.as_secs_f64() * self.max_per_window;
            bucket.balance = (bucket.balance + refill).min(self.max_per_window);
        }
        bucket.last_refill = Instant::now();
        if bucket.balance >= 1.0 {
            bucket.balance -= 1.0;
            true
        } else {
            false
        }
    }
}

impl ShouldSample for RateLimitingSampler {
    fn should_sample(
        &self,
        parent_context: Option<&Context>,
        _trace_id: TraceId,
        _name: &str,
        _span_kind: &SpanKind,
        _attributes: &[KeyValue],
        _links: &[Link],
    ) -> SamplingResult {
        let decision = if self.try_take() {
            SamplingDecision::RecordAndSample
        } else {
            SamplingDecision::Drop
        };
        SamplingResult {
            decision,
            attributes: Vec::new(),
            trace_state: parent_trace_state(parent_context),
        }
    }

    fn description(&self) -> String {
        format!(
            "RateLimiting{{{}/{:?}}}",
            self.max_per_window, self.window
        )
    }
}

/// How a [`CompositeSampler`] combines its children's decisions.
#[derive(Clone, Copy, Debug, PartialEq, Eq)]
pub enum CompositeOp {
    /// The weakest child decision wins; short-circuits on `Drop`.
    And,
    /// The strongest child decision wins; short-circuits on
    /// `RecordAndSample`.
    Or,
}

/// Combines several samplers into one decision.
///
/// Decisions are ordered `Drop < RecordOnly < RecordAndSample`; `And` takes
/// the minimum across children and `Or` the maximum, short-circuiting as
/// soon as the result can no longer change. Sampler-provided attributes are
/// merged from every consulted child.
#[derive(Clone, Debug)]
pub struct CompositeSampler {
    op: CompositeOp,
    samplers: Vec<Box<dyn ShouldSample>>,
}

impl CompositeSampler {
    /// Combine `samplers` with the given operator.
    pub fn new(op: CompositeOp, samplers: Vec<Box<dyn ShouldSample>>) -> Self {
        CompositeSampler { op, samplers }
    }
}

fn decision_rank(decision: SamplingDecision) -> u8 {
    match decision {
        SamplingDecision::Drop => 0,
        SamplingDecision::RecordOnly => 1,
        SamplingDecision::RecordAndSample => 2,
    }
}

impl ShouldSample for CompositeSampler {
    fn should_sample(
        &self,
        parent_context: Option<&Context>,
        trace_id: TraceId,
        name: &str,
        span_kind: &SpanKind,
        attributes: &[KeyValue],
        links: &[Link],
    ) -> SamplingResult {
        let mut combined = match self.op {
            CompositeOp::And => SamplingDecision::RecordAndSample,
            CompositeOp::Or => SamplingDecision::Drop,
        };
        let mut extra_attributes = Vec::new();
        let mut trace_state = parent_trace_state(parent_context);

        for sampler in &self.samplers {
            let result =
                sampler.should_sample(parent_context, trace_id, name, span_kind, attributes, links);
            extra_attributes.extend(result.attributes);
            trace_state = result.trace_state;
            combined = match self.op {
                CompositeOp::And if decision_rank(result.decision) < decision_rank(combined) => {
                    result.decision
                }
                CompositeOp::Or if decision_rank(result.decision) > decision_rank(combined) => {
                    result.decision
                }
                _ => combined,
            };
            let short_circuit = match self.op {
                CompositeOp::And => combined == SamplingDecision::Drop,
                CompositeOp::Or => combined == SamplingDecision::RecordAndSample,
            };
            if short_circuit {
                break;
            }
        }

        SamplingResult {
            decision: combined,
            attributes: extra_attributes,
            trace_state,
        }
    }

    fn description(&self) -> String {
        let children = self
            .samplers
            .iter()
            .map(|s| s.description())
            .collect::<Vec<_>>()
            .join(",");
        match self.op {
            CompositeOp::And => format!("Composite{{And,[{children}]}}"),
            CompositeOp::Or => format!("Composite{{Or,[{children}]}}"),
        }
    }
}

/// A condition that forces a [`CountingSampler`] to sample regardless of the
/// counter position.
#[derive(Clone, Debug)]
pub enum OverrideCondition {
    /// Sample when the span name contains the given fragment.
    NameContains(String),
    /// Sample when the attribute is present (any value).
    HasAttribute(Key),
    /// Sample when the attribute is present with this exact value.
    AttributeEquals(Key, Value),
    /// Sample when the conventional `error` attribute is set to `true`.
    ErrorFlag,
}

impl OverrideCondition {
    fn matches(&self, name: &str, attributes: &[KeyValue]) -> bool {
        match self {
            OverrideCondition::NameContains(fragment) => name.contains(fragment.as_str()),
            OverrideCondition::HasAttribute(key) => {
                attributes.iter().any(|kv| kv.key == *key)
            }
            OverrideCondition::AttributeEquals(key, value) => attributes
                .iter()
                .any(|kv| kv.key == *key && kv.value == *value),
            OverrideCondition::ErrorFlag => attributes
                .iter()
                .any(|kv| kv.key.as_str() == "error" && kv.value == Value::Bool(true)),
        }
    }
}

/// Samples every `n`-th span, unless an override condition forces a sample.
///
/// The counter is shared between clones, so a provider-wide instance keeps a
/// single cadence across all tracers.
#[derive(Clone, Debug)]
pub struct CountingSampler {
    every_n: u64,
    overrides: Vec<OverrideCondition>,
    count: Arc<AtomicU64>,
}

impl CountingSampler {
    /// Sample every `every_n`-th span. A value of 0 or 1 samples everything.
    pub fn new(every_n: u64) -> Self {
        CountingSampler {
            every_n: every_n.max(1),
            overrides: Vec::new(),
            count: Arc::new(AtomicU64::new(0)),
        }
    }

    /// Add an override condition that forces a sample.
    pub fn with_override(mut self, condition: OverrideCondition) -> Self {
        self.overrides.push(condition);
        self
    }
}

impl ShouldSample for CountingSampler {
    fn should_sample(
        &self,
        parent_context: Option<&Context>,
        _trace_id: TraceId,
        name: &str,
        _span_kind: &SpanKind,
        attributes: &[KeyValue],
        _links: &[Link],
    ) -> SamplingResult {
        let seen = self.count.fetch_add(1, Ordering::Relaxed);
        let forced = self.overrides.iter().any(|c| c.matches(name, attributes));
        let decision = if forced || seen % self.every_n == 0 {
            SamplingDecision::RecordAndSample
        } else {
            SamplingDecision::Drop
        };
        SamplingResult {
            decision,
            attributes: Vec::new(),
            trace_state: parent_trace_state(parent_context),
        }
    }

    fn description(&self) -> String {
        format!("Counting{{1/{}}}", self.every_n)
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use crate::trace::{SpanContext, SpanId, TraceFlags};

    fn cx_with_parent(sampled: bool, remote: bool) -> Context {
        let sc = SpanContext::new(
            TraceId::from_u128(1),
            SpanId::from_u64(1),
            if sampled {
                TraceFlags::SAMPLED
            } else {
                TraceFlags::default()
            },
            remote,
            TraceState::default(),
        );
        Context::new().with_span_context(sc)
    }

    fn decide(sampler: &dyn ShouldSample, cx: Option<&Context>, trace_id: u128) -> SamplingDecision {
        sampler
            .should_sample(
                cx,
                TraceId::from_u128(trace_id),
                "op",
                &SpanKind::Internal,
                &[],
                &[],
            )
            .decision
    }

    #[test]
    fn constant_samplers() {
        assert_eq!(
            decide(&Sampler::AlwaysOn, None, 1),
            SamplingDecision::RecordAndSample
        );
        assert_eq!(decide(&Sampler::AlwaysOff, None, 1), SamplingDecision::Drop);
    }

    #[test]
    fn ratio_is_deterministic() {
        let sampler = Sampler::TraceIdRatioBased(0.5);
        for id in [3u128, 1 << 70, u128::MAX - 5, 0x1234_5678] {
            let first = decide(&sampler, None, id);
            for _ in 0..8 {
                assert_eq!(decide(&sampler, None, id), first);
            }
        }
    }

    #[test]
    fn ratio_edges() {
        assert_eq!(
            decide(&Sampler::TraceIdRatioBased(1.0), None, u128::MAX),
            SamplingDecision::RecordAndSample
        );
        assert_eq!(
            decide(&Sampler::TraceIdRatioBased(0.0), None, 1),
            SamplingDecision::Drop
        );
        // Low bits of zero fall below every non-zero threshold.
        assert_eq!(
            decide(&Sampler::TraceIdRatioBased(0.001), None, 1 << 100),
            SamplingDecision::RecordAndSample
        );
    }

    #[test]
    fn parent_based_follows_parent() {
        let sampler = Sampler::ParentBased(Box::new(Sampler::AlwaysOff));
        assert_eq!(
            decide(&sampler, Some(&cx_with_parent(true, false)), 1),
            SamplingDecision::RecordAndSample
        );
        assert_eq!(
            decide(&sampler, Some(&cx_with_parent(false, false)), 1),
            SamplingDecision::Drop
        );
        // No parent: the root sampler decides.
        assert_eq!(decide(&sampler, None, 1), SamplingDecision::Drop);
        assert_eq!(decide(&sampler, Some(&Context::new()), 1), SamplingDecision::Drop);
    }

    #[test]
    fn parent_based_delegate_table() {
        let sampler = ParentBasedSampler::new(Box::new(Sampler::AlwaysOn))
            .with_remote_parent_sampled(Box::new(Sampler::AlwaysOff));
        // The remote-sampled delegate was overridden to AlwaysOff.
        assert_eq!(
            decide(&sampler, Some(&cx_with_parent(true, true)), 1),
            SamplingDecision::Drop
        );
        // Local sampled parent uses the default AlwaysOn delegate.
        assert_eq!(
            decide(&sampler, Some(&cx_with_parent(true, false)), 1),
            SamplingDecision::RecordAndSample
        );
    }

    #[test]
    fn rate_limiting_budget() {
        let sampler = RateLimitingSampler::with_window(2, Duration::from_secs(3600));
        assert_eq!(decide(&sampler, None, 1), SamplingDecision::RecordAndSample);
        assert_eq!(decide(&sampler, None, 2), SamplingDecision::RecordAndSample);
        assert_eq!(decide(&sampler, None, 3), SamplingDecision::Drop);

        // Clones drain the same bucket.
        let clone = sampler.clone();
        assert_eq!(decide(&clone, None, 4), SamplingDecision::Drop);
    }

    #[test]
    fn composite_and_or() {
        let and = CompositeSampler::new(
            CompositeOp::And,
            vec![Box::new(Sampler::AlwaysOn), Box::new(Sampler::AlwaysOff)],
        );
        assert_eq!(decide(&and, None, 1), SamplingDecision::Drop);

        let or = CompositeSampler::new(
            CompositeOp::Or,
            vec![Box::new(Sampler::AlwaysOff), Box::new(Sampler::AlwaysOn)],
        );
        assert_eq!(decide(&or, None, 1), SamplingDecision::RecordAndSample);
    }

    #[test]
    fn counting_with_overrides() {
        let sampler = CountingSampler::new(3)
            .with_override(OverrideCondition::NameContains("checkout".to_owned()));
        let mut sampled = 0;
        for _ in 0..9 {
            if decide(&sampler, None, 1) == SamplingDecision::RecordAndSample {
                sampled += 1;
            }
        }
        assert_eq!(sampled, 3);

        // The override forces a sample regardless of cadence.
        let forced = sampler.should_sample(
            None,
            TraceId::from_u128(1),
            "checkout.finish",
            &SpanKind::Internal,
            &[],
            &[],
        );
        assert_eq!(forced.decision, SamplingDecision::RecordAndSample);

        let error_sampler =
            CountingSampler::new(1000).with_override(OverrideCondition::ErrorFlag);
        // Burn the first slot in the cadence, then check the override alone.
        assert_eq!(decide(&error_sampler, None, 1), SamplingDecision::RecordAndSample);
        assert_eq!(decide(&error_sampler, None, 1), SamplingDecision::Drop);
        let error_forced = error_sampler.should_sample(
            None,
            TraceId::from_u128(1),
            "op",
            &SpanKind::Internal,
            &[KeyValue::new("error", true)],
            &[],
        );
        assert_eq!(error_forced.decision, SamplingDecision::RecordAndSample);
    }
}
