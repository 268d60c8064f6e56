use crate::config;
use crate::time;
use crate::trace::{SpanId, TraceFlags, TraceId};
use crate::Key;
use std::borrow::Cow;
use std::time::SystemTime;

const OTEL_LOGRECORD_ATTRIBUTE_COUNT_LIMIT: &str = "OTEL_LOGRECORD_ATTRIBUTE_COUNT_LIMIT";
const OTEL_LOGRECORD_ATTRIBUTE_VALUE_LENGTH_LIMIT: &str =
    "OTEL_LOGRECORD_ATTRIBUTE_VALUE_LENGTH_LIMIT";
const DEFAULT_ATTRIBUTE_COUNT_LIMIT: u32 = 128;

/// A value in a log record's body or attributes.
///
/// Unlike span attribute values, log values may nest.
#[derive(Clone, Debug, PartialEq)]
#[non_exhaustive]
pub enum AnyValue {
    /// An integer value
    Int(i64),
    /// A double value
    Double(f64),
    /// A string value
    String(String),
    /// A boolean value
    Boolean(bool),
    /// A byte array stored as a value
    Bytes(Box<Vec<u8>>),
    /// An array of `Any` values
    ListAny(Box<Vec<AnyValue>>),
    /// A map of string keys to `Any` values, arbitrarily nested
    Map(Box<Vec<(Key, AnyValue)>>),
}

macro_rules! impl_trivial_from {
    ($t:ty, $variant:path) => {
        impl From<$t> for AnyValue {
            fn from(val: $t) -> AnyValue {
                $variant(val.into())
            }
        }
    };
}

impl_trivial_from!(i8, AnyValue::Int);
impl_trivial_from!(i16, AnyValue::Int);
impl_trivial_from!(i32, AnyValue::Int);
impl_trivial_from!(i64, AnyValue::Int);
impl_trivial_from!(u8, AnyValue::Int);
impl_trivial_from!(u16, AnyValue::Int);
impl_trivial_from!(u32, AnyValue::Int);
impl_trivial_from!(f64, AnyValue::Double);
impl_trivial_from!(f32, AnyValue::Double);
impl_trivial_from!(String, AnyValue::String);
impl_trivial_from!(&str, AnyValue::String);
impl_trivial_from!(bool, AnyValue::Boolean);

/// A syslog-style severity, 1..=24, grouped in blocks of four per level.
#[derive(Clone, Copy, Debug, PartialEq, Eq, PartialOrd, Ord)]
#[repr(u8)]
pub enum Severity {
    /// TRACE
    Trace = 1,
    /// TRACE2
    Trace2 = 2,
    /// TRACE3
    Trace3 = 3,
    /// TRACE4
    Trace4 = 4,
    /// DEBUG
    Debug = 5,
    /// DEBUG2
    Debug2 = 6,
    /// DEBUG3
    Debug3 = 7,
    /// DEBUG4
    Debug4 = 8,
    /// INFO
    Info = 9,
    /// INFO2
    Info2 = 10,
    /// INFO3
    Info3 = 11,
    /// INFO4
    Info4 = 12,
    /// WARN
    Warn = 13,
    /// WARN2
    Warn2 = 14,
    /// WARN3
    Warn3 = 15,
    /// WARN4
    Warn4 = 16,
    /// ERROR
    Error = 17,
    /// ERROR2
    Error2 = 18,
    /// ERROR3
    Error3 = 19,
    /// ERROR4
    Error4 = 20,
    /// FATAL
    Fatal = 21,
    /// FATAL2
    Fatal2 = 22,
    /// FATAL3
    Fatal3 = 23,
    /// FATAL4
    Fatal4 = 24,
}

impl Severity {
    /// The short name of this severity, e.g. `"INFO"`.
    pub const fn name(&self) -> &'static str {
        match &self {
            Severity::Trace => "TRACE",
            Severity::Trace2 => "TRACE2",
            Severity::Trace3 => "TRACE3",
            Severity::Trace4 => "TRACE4",
            Severity::Debug => "DEBUG",
            Severity::Debug2 => "DEBUG2",
            Severity::Debug3 => "DEBUG3",
            Severity::Debug4 => "DEBUG4",
            Severity::Info => "INFO",
            Severity::Info2 => "INFO2",
            Severity::Info3 => "INFO3",
            Severity::Info4 => "INFO4",
            Severity::Warn => "WARN",
            Severity::Warn2 => "WARN2",
            Severity::Warn3 => "WARN3",
            Severity::Warn4 => "WARN4",
            Severity::Error => "ERROR",
            Severity::Error2 => "ERROR2",
            Severity::Error3 => "ERROR3",
            Severity::Error4 => "ERROR4",
            Severity::Fatal => "FATAL",
            Severity::Fatal2 => "FATAL2",
            Severity::Fatal3 => "FATAL3",
            Severity::Fatal4 => "FATAL4",
        }
    }
}

/// Limits on log record attributes, read from
/// `OTEL_LOGRECORD_ATTRIBUTE_COUNT_LIMIT` (default 128) and
/// `OTEL_LOGRECORD_ATTRIBUTE_VALUE_LENGTH_LIMIT` (default unlimited).
#[derive(Clone, Copy, Debug, PartialEq, Eq)]
pub struct LogRecordLimits {
    /// Maximum number of attributes; overflow is dropped and counted.
    pub max_attributes: u32,
    /// Truncation length for string attribute values.
    pub max_attribute_value_length: Option<u32>,
}

impl Default for LogRecordLimits {
    fn default() -> Self {
        LogRecordLimits {
            max_attributes: config::get_u64(OTEL_LOGRECORD_ATTRIBUTE_COUNT_LIMIT)
                .map(|v| v as u32)
                .unwrap_or(DEFAULT_ATTRIBUTE_COUNT_LIMIT),
            max_attribute_value_length: config::get_u64(
                OTEL_LOGRECORD_ATTRIBUTE_VALUE_LENGTH_LIMIT,
            )
            .map(|v| v as u32),
        }
    }
}

/// The span identity a log record was emitted under.
#[derive(Clone, Debug, PartialEq)]
pub struct TraceContext {
    /// The trace the emitting span belongs to.
    pub trace_id: TraceId,
    /// The emitting span.
    pub span_id: SpanId,
    /// The sampling flags of the emitting span.
    pub trace_flags: Option<TraceFlags>,
}

/// A single emitted log record.
///
/// Records are filled in through the mutators below and become immutable
/// once handed to [`Logger::emit`].
///
/// [`Logger::emit`]: crate::logs::Logger::emit
#[derive(Clone, Debug, PartialEq)]
pub struct SdkLogRecord {
    pub(crate) event_name: Option<Cow<'static, str>>,
    pub(crate) timestamp: Option<SystemTime>,
    pub(crate) observed_timestamp: SystemTime,
    pub(crate) trace_context: Option<TraceContext>,
    pub(crate) severity_number: Option<Severity>,
    pub(crate) severity_text: Option<Cow<'static, str>>,
    pub(crate) body: Option<AnyValue>,
    pub(crate) attributes: Vec<(Key, AnyValue)>,
    pub(crate) dropped_attributes_count: u32,
    limits: LogRecordLimits,
}

impl SdkLogRecord {
    pub(crate) fn new(limits: LogRecordLimits) -> Self {
        SdkLogRecord {
            event_name: None,
            timestamp: None,
            observed_timestamp: time::now(),
            trace_context: None,
            severity_number: None,
            severity_text: None,
            body: None,
            attributes: Vec::new(),
            dropped_attributes_count: 0,
            limits,
        }
    }

    /// Sets the event name, identifying the class of this event.
    pub fn set_event_name(&mut self, name: impl Into<Cow<'static, str>>) {
        self.event_name = Some(name.into());
    }

    /// Sets the time the event occurred (as opposed to the time it was
    /// observed by the SDK).
    pub fn set_timestamp(&mut self, timestamp: SystemTime) {
        self.timestamp = Some(timestamp);
    }

    /// Sets the severity number.
    pub fn set_severity_number(&mut self, severity: Severity) {
        self.severity_number = Some(severity);
    }

    /// Sets the severity text.
    pub fn set_severity_text(&mut self, text: impl Into<Cow<'static, str>>) {
        self.severity_text = Some(text.into());
    }

    /// Sets the record body.
    pub fn set_body(&mut self, body: AnyValue) {
        self.body = Some(body);
    }

    /// Explicitly associates the record with a span.
    ///
    /// Records emitted while a span is current are associated
    /// automatically.
    pub fn set_trace_context(
        &mut self,
        trace_id: TraceId,
        span_id: SpanId,
        trace_flags: Option<TraceFlags>,
    ) {
        self.trace_context = Some(TraceContext {
            trace_id,
            span_id,
            trace_flags,
        });
    }

    /// Adds an attribute, enforcing the record limits: entries beyond the
    /// count limit are dropped and counted, string values are truncated to
    /// the value length limit.
    pub fn add_attribute<K, V>(&mut self, key: K, value: V)
    where
        K: Into<Key>,
        V: Into<AnyValue>,
    {
        let key = key.into();
        if key.as_str().is_empty() {
            self.dropped_attributes_count += 1;
            return;
        }
        if self.attributes.len() >= self.limits.max_attributes as usize {
            self.dropped_attributes_count += 1;
            return;
        }
        let mut value = value.into();
        if let (Some(max_len), AnyValue::String(s)) =
            (self.limits.max_attribute_value_length, &mut value)
        {
            let max_len = max_len as usize;
            if s.len() > max_len {
                let mut cut = max_len;
                while cut > 0 && !s.is_char_boundary(cut) {
                    cut -= 1;
                }
                s.truncate(cut);
            }
        }
        self.attributes.push((key, value));
    }

    /// Adds several attributes.
    pub fn add_attributes<I, K, V>(&mut self, attributes: I)
    where
        I: IntoIterator<Item = (K, V)>,
        K: Into<Key>,
        V: Into<AnyValue>,
    {
        for (key, value) in attributes {
            self.add_attribute(key, value);
        }
    }

    /// The event name, if set.
    pub fn event_name(&self) -> Option<&str> {
        self.event_name.as_deref()
    }

    /// The event timestamp, if set.
    pub fn timestamp(&self) -> Option<SystemTime> {
        self.timestamp
    }

    /// When the SDK observed the emission.
    pub fn observed_timestamp(&self) -> SystemTime {
        self.observed_timestamp
    }

    /// The associated span identity, if any.
    pub fn trace_context(&self) -> Option<&TraceContext> {
        self.trace_context.as_ref()
    }

    /// The severity number, if set.
    pub fn severity_number(&self) -> Option<Severity> {
        self.severity_number
    }

    /// The severity text, if set.
    pub fn severity_text(&self) -> Option<&str> {
        self.severity_text.as_deref()
    }

    /// The record body, if set.
    pub fn body(&self) -> Option<&AnyValue> {
        self.body.as_ref()
    }

    /// The recorded attributes.
    pub fn attributes(&self) -> impl Iterator<Item = &(Key, AnyValue)> {
        self.attributes.iter()
    }

    /// Attributes dropped because of the count limit.
    pub fn dropped_attributes_count(&self) -> u32 {
        self.dropped_attributes_count
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn severity_ordering() {
        assert!(Severity::Error > Severity::Warn);
        assert!(Severity::Debug < Severity::Info);
        assert_eq!(Severity::Fatal4 as u8, 24);
        assert_eq!(Severity::Trace as u8, 1);
        assert_eq!(Severity::Warn.name(), "WARN");
    }

    #[test]
    fn attribute_count_limit() {
        let mut record = SdkLogRecord::new(LogRecordLimits {
            max_attributes: 2,
            max_attribute_value_length: None,
        });
        record.add_attribute("a", 1);
        record.add_attribute("b", 2);
        record.add_attribute("c", 3);
        assert_eq!(record.attributes().count(), 2);
        assert_eq!(record.dropped_attributes_count(), 1);
    }

    #[test]
    fn attribute_value_truncation() {
        let mut record = SdkLogRecord::new(LogRecordLimits {
            max_attributes: 16,
            max_attribute_value_length: Some(4),
        });
        record.add_attribute("k", "truncate-me");
        let (_, value) = record.attributes().next().unwrap();
        assert_eq!(value, &AnyValue::String("trun".to_owned()));
    }

    #[test]
    fn nested_body_values() {
        let body = AnyValue::Map(Box::new(vec![
            (Key::new("code"), AnyValue::Int(500)),
            (
                Key::new("tags"),
                AnyValue::ListAny(Box::new(vec![AnyValue::from("a"), AnyValue::from("b")])),
            ),
        ]));
        let mut record = SdkLogRecord::new(LogRecordLimits::default());
        record.set_body(body.clone());
        assert_eq!(record.body(), Some(&body));
    }
}
