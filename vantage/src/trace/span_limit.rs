use crate::config;

const DEFAULT_MAX_EVENT_PER_SPAN: u32 = 128;
const DEFAULT_MAX_ATTRIBUTES_PER_SPAN: u32 = 128;
const DEFAULT_MAX_LINKS_PER_SPAN: u32 = 128;
const DEFAULT_MAX_ATTRIBUTES_PER_EVENT: u32 = 128;
const DEFAULT_MAX_ATTRIBUTES_PER_LINK: u32 = 128;

const OTEL_SPAN_EVENT_COUNT_LIMIT: &str = "OTEL_SPAN_EVENT_COUNT_LIMIT";
const OTEL_SPAN_LINK_COUNT_LIMIT: &str = "OTEL_SPAN_LINK_COUNT_LIMIT";
const OTEL_SPAN_ATTRIBUTE_COUNT_LIMIT: &str = "OTEL_SPAN_ATTRIBUTE_COUNT_LIMIT";
const OTEL_ATTRIBUTE_COUNT_LIMIT: &str = "OTEL_ATTRIBUTE_COUNT_LIMIT";
const OTEL_SPAN_ATTRIBUTE_VALUE_LENGTH_LIMIT: &str = "OTEL_SPAN_ATTRIBUTE_VALUE_LENGTH_LIMIT";
const OTEL_ATTRIBUTE_VALUE_LENGTH_LIMIT: &str = "OTEL_ATTRIBUTE_VALUE_LENGTH_LIMIT";

/// Bounds on the data recorded by a single span.
///
/// Limits are enforced at insertion; anything beyond a count limit is
/// dropped and counted, string values beyond the length limit are
/// truncated. Defaults come from the `OTEL_SPAN_*` / `OTEL_ATTRIBUTE_*`
/// configuration keys; the span-specific keys win over the general ones.
#[derive(Copy, Clone, Debug, PartialEq, Eq)]
pub struct SpanLimits {
    /// The max events that can be added to a `Span`.
    pub max_events_per_span: u32,
    /// The max attributes that can be added to a `Span`.
    pub max_attributes_per_span: u32,
    /// The max links that can be added to a `Span`.
    pub max_links_per_span: u32,
    /// The max attributes that can be added to an `Event`.
    pub max_attributes_per_event: u32,
    /// The max attributes that can be added to a `Link`.
    pub max_attributes_per_link: u32,
    /// Truncation length for string attribute values; `None` leaves values
    /// untouched.
    pub max_attribute_value_length: Option<u32>,
}

impl Default for SpanLimits {
    fn default() -> Self {
        SpanLimits {
            max_events_per_span: config::get_u64(OTEL_SPAN_EVENT_COUNT_LIMIT)
                .map(|v| v as u32)
                .unwrap_or(DEFAULT_MAX_EVENT_PER_SPAN),
            max_attributes_per_span: config::get_u64(OTEL_SPAN_ATTRIBUTE_COUNT_LIMIT)
                .or_else(|| config::get_u64(OTEL_ATTRIBUTE_COUNT_LIMIT))
                .map(|v| v as u32)
                .unwrap_or(DEFAULT_MAX_ATTRIBUTES_PER_SPAN),
            max_links_per_span: config::get_u64(OTEL_SPAN_LINK_COUNT_LIMIT)
                .map(|v| v as u32)
                .unwrap_or(DEFAULT_MAX_LINKS_PER_SPAN),
            max_attributes_per_event: DEFAULT_MAX_ATTRIBUTES_PER_EVENT,
            max_attributes_per_link: DEFAULT_MAX_ATTRIBUTES_PER_LINK,
            max_attribute_value_length: config::get_u64(OTEL_SPAN_ATTRIBUTE_VALUE_LENGTH_LIMIT)
                .or_else(|| config::get_u64(OTEL_ATTRIBUTE_VALUE_LENGTH_LIMIT))
                .map(|v| v as u32),
        }
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn defaults() {
        temp_env::with_vars_unset(
            [
                OTEL_SPAN_EVENT_COUNT_LIMIT,
                OTEL_SPAN_LINK_COUNT_LIMIT,
                OTEL_SPAN_ATTRIBUTE_COUNT_LIMIT,
                OTEL_ATTRIBUTE_COUNT_LIMIT,
            ],
            || {
                let limits = SpanLimits::default();
                assert_eq!(limits.max_events_per_span, 128);
                assert_eq!(limits.max_links_per_span, 128);
                assert_eq!(limits.max_attributes_per_span, 128);
                assert_eq!(limits.max_attribute_value_length, None);
            },
        );
    }

    #[test]
    fn specific_limit_wins_over_general() {
        temp_env::with_vars(
            [
                (OTEL_ATTRIBUTE_COUNT_LIMIT, Some("10")),
                (OTEL_SPAN_ATTRIBUTE_COUNT_LIMIT, Some("5")),
                (OTEL_SPAN_EVENT_COUNT_LIMIT, Some("2")),
            ],
            || {
                let limits = SpanLimits::default();
                assert_eq!(limits.max_attributes_per_span, 5);
                assert_eq!(limits.max_events_per_span, 2);
            },
        );
    }
}
