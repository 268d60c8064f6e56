//! Wire-format propagation of [`Context`] values.
//!
//! Propagators serialize the parts of a context that cross process
//! boundaries (the active span context, baggage) into carrier key/value
//! pairs, typically HTTP headers, and read them back on the receiving
//! side.

mod baggage;
mod trace_context;

pub use baggage::BaggagePropagator;
pub use trace_context::TraceContextPropagator;

use crate::{config, sdk_warn, Context};
use std::collections::HashMap;
use std::slice;

const OTEL_PROPAGATORS: &str = "OTEL_PROPAGATORS";

/// Injects values into a carrier of key/value pairs.
pub trait Injector {
    /// Add the key and value to the carrier.
    fn set(&mut self, key: &str, value: String);
}

/// Extracts values from a carrier of key/value pairs.
pub trait Extractor {
    /// Get the value of the given key, if present.
    fn get(&self, key: &str) -> Option<&str>;

    /// All keys available in the carrier.
    fn keys(&self) -> Vec<&str>;
}

impl<S: std::hash::BuildHasher> Injector for HashMap<String, String, S> {
    fn set(&mut self, key: &str, value: String) {
        self.insert(key.to_lowercase(), value);
    }
}

impl<S: std::hash::BuildHasher> Extractor for HashMap<String, String, S> {
    fn get(&self, key: &str) -> Option<&str> {
        self.get(&key.to_lowercase()).map(|v| v.as_str())
    }

    fn keys(&self) -> Vec<&str> {
        self.keys().map(|k| k.as_str()).collect()
    }
}

/// Serializes and deserializes context values over text carriers.
///
/// `inject` and `extract` never fail: malformed carrier entries are
/// ignored and the input context is returned unchanged.
pub trait TextMapPropagator: Send + Sync + std::fmt::Debug {
    /// Injects the current context into the carrier.
    fn inject(&self, injector: &mut dyn Injector) {
        Context::map_current(|cx| self.inject_context(cx, injector))
    }

    /// Injects the given context into the carrier.
    fn inject_context(&self, cx: &Context, injector: &mut dyn Injector);

    /// Extracts a context from the carrier, based on the current context.
    fn extract(&self, extractor: &dyn Extractor) -> Context {
        Context::map_current(|cx| self.extract_with_context(cx, extractor))
    }

    /// Extracts a context from the carrier, based on the given context.
    fn extract_with_context(&self, cx: &Context, extractor: &dyn Extractor) -> Context;

    /// The carrier keys this propagator reads and writes.
    fn fields(&self) -> FieldIter<'_>;
}

/// An iterator over the carrier fields of a propagator.
#[derive(Debug)]
pub struct FieldIter<'a>(slice::Iter<'a, String>);

impl<'a> FieldIter<'a> {
    /// Create an iterator over the given fields.
    pub fn new(fields: &'a [String]) -> Self {
        FieldIter(fields.iter())
    }
}

impl<'a> Iterator for FieldIter<'a> {
    type Item = &'a str;

    fn next(&mut self) -> Option<Self::Item> {
        self.0.next().map(|field| field.as_str())
    }
}

/// Composes propagators so several wire formats travel together.
///
/// `inject_context` invokes every propagator in order; `extract` threads
/// the context left to right, so later propagators see what earlier ones
/// extracted.
///
/// ```
/// use vantage::propagation::{
///     BaggagePropagator, TextMapCompositePropagator, TextMapPropagator, TraceContextPropagator,
/// };
/// use std::collections::HashMap;
///
/// let propagator = TextMapCompositePropagator::new(vec![
///     Box::new(TraceContextPropagator::new()),
///     Box::new(BaggagePropagator::new()),
/// ]);
///
/// let mut carrier = HashMap::new();
/// propagator.inject(&mut carrier);
/// ```
#[derive(Debug)]
pub struct TextMapCompositePropagator {
    propagators: Vec<Box<dyn TextMapPropagator>>,
    fields: Vec<String>,
}

impl TextMapCompositePropagator {
    /// Constructs a composite over the given propagators.
    pub fn new(propagators: Vec<Box<dyn TextMapPropagator>>) -> Self {
        let mut fields = Vec::new();
        for propagator in &propagators {
            for field in propagator.fields() {
                if !fields.iter().any(|existing| existing == field) {
                    fields.push(field.to_owned());
                }
            }
        }
        TextMapCompositePropagator {
            propagators,
            fields,
        }
    }
}

impl TextMapPropagator for TextMapCompositePropagator {
    fn inject_context(&self, context: &Context, injector: &mut dyn Injector) {
        for propagator in &self.propagators {
            propagator.inject_context(context, injector)
        }
    }

    fn extract_with_context(&self, cx: &Context, extractor: &dyn Extractor) -> Context {
        self.propagators
            .iter()
            .fold(cx.clone(), |current_cx, propagator| {
                propagator.extract_with_context(&current_cx, extractor)
            })
    }

    fn fields(&self) -> FieldIter<'_> {
        FieldIter::new(&self.fields)
    }
}

/// A propagator that reads and writes nothing.
#[derive(Debug, Default)]
pub struct NoopTextMapPropagator {
    _private: (),
}

impl NoopTextMapPropagator {
    /// Create a new noop propagator.
    pub fn new() -> Self {
        NoopTextMapPropagator { _private: () }
    }
}

impl TextMapPropagator for NoopTextMapPropagator {
    fn inject_context(&self, _cx: &Context, _injector: &mut dyn Injector) {
        // Ignored
    }

    fn extract_with_context(&self, cx: &Context, _extractor: &dyn Extractor) -> Context {
        cx.clone()
    }

    fn fields(&self) -> FieldIter<'_> {
        FieldIter::new(&[])
    }
}

/// Builds the propagator selected by `OTEL_PROPAGATORS`, a comma-separated
/// list of built-in names (`tracecontext`, `baggage`, `none`).
///
/// Unknown names are skipped with a diagnostic; the default selection is
/// `tracecontext,baggage`.
pub fn from_config() -> TextMapCompositePropagator {
    let selection = config::get(OTEL_PROPAGATORS).unwrap_or_else(|| "tracecontext,baggage".into());
    let mut propagators: Vec<Box<dyn TextMapPropagator>> = Vec::new();
    for name in selection.split(',') {
        match name.trim().to_ascii_lowercase().as_str() {
            "tracecontext" => propagators.push(Box::new(TraceContextPropagator::new())),
            "baggage" => propagators.push(Box::new(BaggagePropagator::new())),
            "none" | "" => {}
            unknown => {
                sdk_warn!(
                    name: "Propagation.UnknownPropagator",
                    propagator = unknown.to_string()
                );
            }
        }
    }
    TextMapCompositePropagator::new(propagators)
}

#[cfg(test)]
mod tests {
    use super::*;
    use crate::trace::{SpanContext, SpanId, TraceFlags, TraceId, TraceState};
    use crate::baggage::BaggageExt;

    #[test]
    fn composite_round_trip() {
        let propagator = TextMapCompositePropagator::new(vec![
            Box::new(TraceContextPropagator::new()),
            Box::new(BaggagePropagator::new()),
        ]);

        let sc = SpanContext::new(
            TraceId::from_u128(0xa3ce929d0e0e4736),
            SpanId::from_u64(0x00f067aa0ba902b7),
            TraceFlags::SAMPLED,
            false,
            TraceState::default(),
        );
        let cx = Context::new()
            .with_span_context(sc.clone())
            .with_baggage([crate::baggage::KeyValueMetadata::new("tenant", "acme", "")]);

        let mut carrier = HashMap::new();
        propagator.inject_context(&cx, &mut carrier);

        let extracted = propagator.extract_with_context(&Context::new(), &carrier);
        let remote = extracted.span_context().expect("span context");
        assert_eq!(remote.trace_id(), sc.trace_id());
        assert_eq!(remote.span_id(), sc.span_id());
        assert!(remote.is_remote());
        assert_eq!(extracted.baggage().get("tenant"), Some("acme"));
    }

    #[test]
    fn fields_are_deduplicated() {
        let propagator = TextMapCompositePropagator::new(vec![
            Box::new(TraceContextPropagator::new()),
            Box::new(TraceContextPropagator::new()),
        ]);
        assert_eq!(propagator.fields().count(), 2);
    }

    #[test]
    fn selection_from_config() {
        temp_env::with_var(OTEL_PROPAGATORS, Some("tracecontext"), || {
            let propagator = from_config();
            assert_eq!(propagator.fields().collect::<Vec<_>>(), ["traceparent", "tracestate"]);
        });

        temp_env::with_var(OTEL_PROPAGATORS, Some("none"), || {
            assert_eq!(from_config().fields().count(), 0);
        });

        temp_env::with_var(OTEL_PROPAGATORS, Some("baggage,bogus"), || {
            assert_eq!(from_config().fields().collect::<Vec<_>>(), ["baggage"]);
        });
    }
}
