//! # W3C Baggage Propagator
//!

use crate::baggage::{BaggageExt, KeyValueMetadata};
use crate::propagation::{Extractor, FieldIter, Injector, TextMapPropagator};
use crate::{sdk_debug, Context};
use percent_encoding::{percent_decode_str, utf8_percent_encode, AsciiSet, CONTROLS};
use std::sync::OnceLock;

const BAGGAGE_HEADER: &str = "baggage";
/// Characters percent-encoded in baggage values per the W3C specification.
const FRAGMENT: &AsciiSet = &CONTROLS
    .add(b' ')
    .add(b'"')
    .add(b';')
    .add(b',')
    .add(b'%')
    .add(b'=');

static BAGGAGE_HEADER_FIELD: OnceLock<[String; 1]> = OnceLock::new();

fn baggage_header_field() -> &'static [String; 1] {
    BAGGAGE_HEADER_FIELD.get_or_init(|| [BAGGAGE_HEADER.to_owned()])
}

/// Propagates [`Baggage`] under the `baggage` header, e.g.
/// `baggage: k1=v1,k2=v2;prop=x`.
///
/// Reserved characters in values are percent-encoded on inject and decoded
/// on extract; entry metadata travels verbatim after the first `;`.
#[derive(Debug, Default)]
pub struct BaggagePropagator {
    _private: (),
}

impl BaggagePropagator {
    /// Construct a new baggage propagator.
    pub fn new() -> Self {
        BaggagePropagator { _private: () }
    }
}

impl TextMapPropagator for BaggagePropagator {
    fn inject_context(&self, cx: &Context, injector: &mut dyn Injector) {
        let baggage = cx.baggage();
        if baggage.is_empty() {
            return;
        }
        let header_value = baggage
            .iter()
            .map(|(key, (value, metadata))| {
                let encoded_value = utf8_percent_encode(value, FRAGMENT);
                if metadata.as_str().is_empty() {
                    format!("{key}={encoded_value}")
                } else {
                    format!("{key}={encoded_value};{}", metadata.as_str())
                }
            })
            .collect::<Vec<_>>()
            .join(",");
        injector.set(BAGGAGE_HEADER, header_value);
    }

    fn extract_with_context(&self, cx: &Context, extractor: &dyn Extractor) -> Context {
        let Some(header_value) = extractor.get(BAGGAGE_HEADER).filter(|v| !v.is_empty()) else {
            return cx.clone();
        };

        let mut extracted = Vec::new();
        for entry in header_value.split(',') {
            let (kv_part, metadata) = match entry.split_once(';') {
                Some((kv, props)) => (kv, props.trim()),
                None => (entry, ""),
            };
            let Some((key, value)) = kv_part.split_once('=') else {
                sdk_debug!(
                    name: "BaggagePropagator.MalformedEntry",
                    entry = entry.to_string()
                );
                continue;
            };
            let key = key.trim();
            let value = value.trim();
            if key.is_empty() {
                continue;
            }
            match percent_decode_str(value).decode_utf8() {
                Ok(decoded) => extracted.push(KeyValueMetadata::new(
                    key.to_owned(),
                    decoded.into_owned(),
                    metadata,
                )),
                Err(_) => {
                    sdk_debug!(
                        name: "BaggagePropagator.UndecodableValue",
                        entry = entry.to_string()
                    );
                }
            }
        }

        if extracted.is_empty() {
            cx.clone()
        } else {
            cx.with_baggage(extracted)
        }
    }

    fn fields(&self) -> FieldIter<'_> {
        FieldIter::new(baggage_header_field())
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use std::collections::HashMap;

    #[test]
    fn extract_baggage() {
        let propagator = BaggagePropagator::new();
        let mut extractor = HashMap::new();
        extractor.insert(
            BAGGAGE_HEADER.to_string(),
            "key1=value1, key2 = value2, key3=value%203;prop=1".to_string(),
        );

        let cx = propagator.extract(&extractor);
        let baggage = cx.baggage();
        assert_eq!(baggage.get("key1"), Some("value1"));
        assert_eq!(baggage.get("key2"), Some("value2"));
        // Percent-encoded values are decoded, metadata preserved.
        let (value, metadata) = baggage.get_with_metadata("key3").unwrap();
        assert_eq!(value, "value 3");
        assert_eq!(metadata.as_str(), "prop=1");
    }

    #[test]
    fn extract_skips_malformed_entries() {
        let propagator = BaggagePropagator::new();
        let mut extractor = HashMap::new();
        extractor.insert(
            BAGGAGE_HEADER.to_string(),
            "ok=1,no-equals-sign,=empty-key".to_string(),
        );
        let baggage = propagator.extract(&extractor).baggage();
        assert_eq!(baggage.len(), 1);
        assert_eq!(baggage.get("ok"), Some("1"));
    }

    #[test]
    fn inject_round_trips_reserved_characters() {
        let propagator = BaggagePropagator::new();
        let cx = Context::new().with_baggage([
            KeyValueMetadata::new("plain", "abc", ""),
            KeyValueMetadata::new("spaced", "a b,c;d=e", "prop=x"),
        ]);

        let mut carrier = HashMap::new();
        propagator.inject_context(&cx, &mut carrier);

        let round_tripped = propagator
            .extract_with_context(&Context::new(), &carrier)
            .baggage();
        assert_eq!(round_tripped.get("plain"), Some("abc"));
        let (value, metadata) = round_tripped.get_with_metadata("spaced").unwrap();
        assert_eq!(value, "a b,c;d=e");
        assert_eq!(metadata.as_str(), "prop=x");
    }

    #[test]
    fn inject_nothing_without_baggage() {
        let propagator = BaggagePropagator::new();
        let mut carrier: HashMap<String, String> = HashMap::new();
        propagator.inject_context(&Context::new(), &mut carrier);
        assert!(carrier.is_empty());
    }
}
