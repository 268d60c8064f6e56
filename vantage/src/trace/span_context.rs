use crate::trace::{TraceError, TraceResult};
use std::collections::VecDeque;
use std::fmt;
use std::num::ParseIntError;
use std::ops::{BitAnd, BitOr, Not};
use std::str::FromStr;
use thiserror::Error;

/// A 16-byte value identifying an entire trace.
///
/// The id is valid if it contains at least one non-zero byte. It is encoded
/// as 32 lowercase hex characters on the wire.
#[derive(Clone, PartialEq, Eq, Copy, Hash, PartialOrd, Ord)]
pub struct TraceId(u128);

impl TraceId {
    /// Invalid (all-zero) trace id.
    pub const INVALID: TraceId = TraceId(0);

    /// Create a trace id from its big-endian byte representation.
    pub const fn from_bytes(bytes: [u8; 16]) -> Self {
        TraceId(u128::from_be_bytes(bytes))
    }

    /// Create a trace id from a `u128`.
    pub const fn from_u128(value: u128) -> Self {
        TraceId(value)
    }

    /// Return the big-endian byte representation.
    pub const fn to_bytes(self) -> [u8; 16] {
        self.0.to_be_bytes()
    }

    /// Converts a 32-character lowercase hex string into a trace id.
    pub fn from_hex(hex: &str) -> Result<Self, ParseIntError> {
        u128::from_str_radix(hex, 16).map(TraceId)
    }

    /// Returns true if at least one byte is non-zero.
    pub const fn is_valid(&self) -> bool {
        self.0 != 0
    }
}

impl From<u128> for TraceId {
    fn from(value: u128) -> Self {
        TraceId(value)
    }
}

impl fmt::Debug for TraceId {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        f.write_fmt(format_args!("{:032x}", self.0))
    }
}

impl fmt::Display for TraceId {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        f.write_fmt(format_args!("{:032x}", self.0))
    }
}

impl fmt::LowerHex for TraceId {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        fmt::LowerHex::fmt(&self.0, f)
    }
}

/// An 8-byte value identifying a span within a trace.
///
/// The all-zero id is the canonical invalid value, also used as the parent
/// marker of root spans; it is always encoded as `0000000000000000`, never
/// omitted.
#[derive(Clone, PartialEq, Eq, Copy, Hash, PartialOrd, Ord)]
pub struct SpanId(u64);

impl SpanId {
    /// Invalid (all-zero) span id.
    pub const INVALID: SpanId = SpanId(0);

    /// Create a span id from its big-endian byte representation.
    pub const fn from_bytes(bytes: [u8; 8]) -> Self {
        SpanId(u64::from_be_bytes(bytes))
    }

    /// Create a span id from a `u64`.
    pub const fn from_u64(value: u64) -> Self {
        SpanId(value)
    }

    /// Return the big-endian byte representation.
    pub const fn to_bytes(self) -> [u8; 8] {
        self.0.to_be_bytes()
    }

    /// Converts a 16-character lowercase hex string into a span id.
    pub fn from_hex(hex: &str) -> Result<Self, ParseIntError> {
        u64::from_str_radix(hex, 16).map(SpanId)
    }

    /// Returns true if at least one byte is non-zero.
    pub const fn is_valid(&self) -> bool {
        self.0 != 0
    }
}

impl From<u64> for SpanId {
    fn from(value: u64) -> Self {
        SpanId(value)
    }
}

impl fmt::Debug for SpanId {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        f.write_fmt(format_args!("{:016x}", self.0))
    }
}

impl fmt::Display for SpanId {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        f.write_fmt(format_args!("{:016x}", self.0))
    }
}

impl fmt::LowerHex for SpanId {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        fmt::LowerHex::fmt(&self.0, f)
    }
}

/// Flags that can be set on a [`SpanContext`].
///
/// The current version of the W3C specification only supports a single flag,
/// [`TraceFlags::SAMPLED`].
#[derive(Clone, Debug, Default, PartialEq, Eq, Copy, Hash)]
pub struct TraceFlags(u8);

impl TraceFlags {
    /// Trace flags with the `sampled` flag set.
    pub const SAMPLED: TraceFlags = TraceFlags(0x01);

    /// Trace flags with the `sampled` flag cleared.
    pub const NOT_SAMPLED: TraceFlags = TraceFlags(0x00);

    /// Construct new trace flags.
    pub const fn new(flags: u8) -> Self {
        TraceFlags(flags)
    }

    /// Returns true if the `sampled` flag is set.
    pub fn is_sampled(&self) -> bool {
        (*self & TraceFlags::SAMPLED) == TraceFlags::SAMPLED
    }

    /// Returns a copy of the flags with the `sampled` flag set to `sampled`.
    pub fn with_sampled(&self, sampled: bool) -> Self {
        if sampled {
            *self | TraceFlags::SAMPLED
        } else {
            *self & !TraceFlags::SAMPLED
        }
    }

    /// Returns the flags as a `u8`.
    pub fn to_u8(self) -> u8 {
        self.0
    }
}

impl BitAnd for TraceFlags {
    type Output = Self;

    fn bitand(self, rhs: Self) -> Self::Output {
        Self(self.0 & rhs.0)
    }
}

impl BitOr for TraceFlags {
    type Output = Self;

    fn bitor(self, rhs: Self) -> Self::Output {
        Self(self.0 | rhs.0)
    }
}

impl Not for TraceFlags {
    type Output = Self;

    fn not(self) -> Self::Output {
        Self(!self.0)
    }
}

impl fmt::LowerHex for TraceFlags {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        fmt::LowerHex::fmt(&self.0, f)
    }
}

/// Vendor-specific configuration carried alongside a trace, as an ordered
/// list of up to 32 unique `key=value` pairs.
///
/// See the [W3C specification] for key and value requirements.
///
/// [W3C specification]: https://www.w3.org/TR/trace-context/#tracestate-header
#[derive(Clone, Debug, Default, Eq, PartialEq, Hash)]
pub struct TraceState(Option<VecDeque<(String, String)>>);

impl TraceState {
    /// The maximum number of list members.
    const MAX_MEMBERS: usize = 32;

    /// The default, empty `TraceState`.
    pub const NONE: TraceState = TraceState(None);

    fn valid_key(key: &str) -> bool {
        if key.is_empty() || key.len() > 256 {
            return false;
        }
        let allowed_special = |b: u8| b == b'_' || b == b'-' || b == b'*' || b == b'/';
        let mut saw_at = false;
        for (i, &b) in key.as_bytes().iter().enumerate() {
            if i == 0 && !(b.is_ascii_lowercase() || b.is_ascii_digit()) {
                return false;
            }
            if b == b'@' {
                if saw_at {
                    return false;
                }
                saw_at = true;
            } else if !(b.is_ascii_lowercase() || b.is_ascii_digit() || allowed_special(b)) {
                return false;
            }
        }
        true
    }

    fn valid_value(value: &str) -> bool {
        value.len() <= 256 && !(value.contains(',') || value.contains('='))
    }

    /// Creates a `TraceState` from the given key-value collection.
    pub fn from_key_value<T, K, V>(entries: T) -> TraceResult<Self>
    where
        T: IntoIterator<Item = (K, V)>,
        K: ToString,
        V: ToString,
    {
        let entries = entries
            .into_iter()
            .map(|(key, value)| {
                let (key, value) = (key.to_string(), value.to_string());
                if !TraceState::valid_key(&key) {
                    return Err(TraceStateError::Key(key));
                }
                if !TraceState::valid_value(&value) {
                    return Err(TraceStateError::Value(value));
                }
                Ok((key, value))
            })
            .collect::<Result<VecDeque<_>, TraceStateError>>()?;

        if entries.len() > Self::MAX_MEMBERS {
            return Err(TraceStateError::TooManyMembers.into());
        }
        if entries.is_empty() {
            Ok(TraceState(None))
        } else {
            Ok(TraceState(Some(entries)))
        }
    }

    /// Retrieves the value for the given key, if it exists.
    pub fn get(&self, key: &str) -> Option<&str> {
        self.0.as_ref().and_then(|entries| {
            entries
                .iter()
                .find(|(k, _)| k == key)
                .map(|(_, v)| v.as_str())
        })
    }

    /// Returns a new `TraceState` with the given key-value pair inserted at
    /// the front; an existing entry for the key is removed first.
    pub fn insert<K, V>(&self, key: K, value: V) -> TraceResult<TraceState>
    where
        K: Into<String>,
        V: Into<String>,
    {
        let (key, value) = (key.into(), value.into());
        if !TraceState::valid_key(&key) {
            return Err(TraceStateError::Key(key).into());
        }
        if !TraceState::valid_value(&value) {
            return Err(TraceStateError::Value(value).into());
        }

        let mut updated = self.without(&key);
        let entries = updated.0.get_or_insert_with(VecDeque::new);
        if entries.len() >= Self::MAX_MEMBERS {
            return Err(TraceStateError::TooManyMembers.into());
        }
        entries.push_front((key, value));
        Ok(updated)
    }

    /// Returns a new `TraceState` with the entry for the given key removed.
    pub fn delete<K: Into<String>>(&self, key: K) -> TraceResult<TraceState> {
        let key = key.into();
        if !TraceState::valid_key(&key) {
            return Err(TraceStateError::Key(key).into());
        }
        Ok(self.without(&key))
    }

    fn without(&self, key: &str) -> TraceState {
        let mut owned = self.clone();
        if let Some(entries) = owned.0.as_mut() {
            entries.retain(|(k, _)| k != key);
        }
        owned
    }

    /// Serializes to the `tracestate` header format.
    pub fn header(&self) -> String {
        self.0
            .as_ref()
            .map(|entries| {
                entries
                    .iter()
                    .map(|(key, value)| format!("{key}={value}"))
                    .collect::<Vec<_>>()
                    .join(",")
            })
            .unwrap_or_default()
    }
}

impl FromStr for TraceState {
    type Err = TraceError;

    fn from_str(s: &str) -> Result<Self, Self::Err> {
        let mut entries = Vec::new();
        for member in s.split_terminator(',') {
            let member = member.trim();
            if member.is_empty() {
                continue;
            }
            match member.split_once('=') {
                Some((key, value)) => entries.push((key.to_owned(), value.to_owned())),
                None => return Err(TraceStateError::List(member.to_owned()).into()),
            }
        }
        TraceState::from_key_value(entries)
    }
}

/// Error returned by `TraceState` operations.
#[derive(Error, Debug)]
enum TraceStateError {
    #[error("{0} is not a valid tracestate key, see https://www.w3.org/TR/trace-context/#key")]
    Key(String),

    #[error("{0} is not a valid tracestate value, see https://www.w3.org/TR/trace-context/#value")]
    Value(String),

    #[error("{0} is not a valid tracestate list member, see https://www.w3.org/TR/trace-context/#list")]
    List(String),

    #[error("tracestate supports at most 32 list members")]
    TooManyMembers,
}

impl From<TraceStateError> for TraceError {
    fn from(err: TraceStateError) -> Self {
        TraceError::InvalidTraceState(err.to_string())
    }
}

/// The immutable, propagatable portion of a span.
///
/// This representation conforms to the [W3C TraceContext specification].
/// Spans whose `sampled` flag is unset are ignored by most backends.
///
/// [W3C TraceContext specification]: https://www.w3.org/TR/trace-context
#[derive(Clone, Debug, PartialEq, Hash, Eq)]
pub struct SpanContext {
    trace_id: TraceId,
    span_id: SpanId,
    trace_flags: TraceFlags,
    is_remote: bool,
    trace_state: TraceState,
}

impl SpanContext {
    /// An invalid, empty span context.
    pub const NONE: SpanContext = SpanContext {
        trace_id: TraceId::INVALID,
        span_id: SpanId::INVALID,
        trace_flags: TraceFlags::NOT_SAMPLED,
        is_remote: false,
        trace_state: TraceState::NONE,
    };

    /// Create an invalid, empty span context.
    pub fn empty_context() -> Self {
        SpanContext::NONE
    }

    /// Construct a new `SpanContext`.
    pub fn new(
        trace_id: TraceId,
        span_id: SpanId,
        trace_flags: TraceFlags,
        is_remote: bool,
        trace_state: TraceState,
    ) -> Self {
        SpanContext {
            trace_id,
            span_id,
            trace_flags,
            is_remote,
            trace_state,
        }
    }

    /// The [`TraceId`] of this span context.
    pub fn trace_id(&self) -> TraceId {
        self.trace_id
    }

    /// The [`SpanId`] of this span context.
    pub fn span_id(&self) -> SpanId {
        self.span_id
    }

    /// The flags of this span context.
    pub fn trace_flags(&self) -> TraceFlags {
        self.trace_flags
    }

    /// Returns true if both the trace id and span id are valid (non-zero).
    pub fn is_valid(&self) -> bool {
        self.trace_id.is_valid() && self.span_id.is_valid()
    }

    /// Returns true if this context was propagated from a remote process.
    pub fn is_remote(&self) -> bool {
        self.is_remote
    }

    /// Returns true if the `sampled` flag is set.
    pub fn is_sampled(&self) -> bool {
        self.trace_flags.is_sampled()
    }

    /// A reference to this context's [`TraceState`].
    pub fn trace_state(&self) -> &TraceState {
        &self.trace_state
    }

    /// Returns a copy with the remote marker set to `is_remote`.
    pub fn with_remote(&self, is_remote: bool) -> Self {
        SpanContext {
            is_remote,
            ..self.clone()
        }
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn id_hex_encoding() {
        assert_eq!(TraceId::from_u128(0xface).to_string().len(), 32);
        assert_eq!(
            TraceId::from_u128(0xface).to_string(),
            "0000000000000000000000000000face"
        );
        assert_eq!(SpanId::INVALID.to_string(), "0000000000000000");
        assert_eq!(
            TraceId::from_hex("0000000000000000000000000000face").unwrap(),
            TraceId::from_u128(0xface)
        );
        assert!(SpanId::from_hex("nope").is_err());
    }

    #[test]
    fn validity() {
        assert!(!TraceId::INVALID.is_valid());
        assert!(TraceId::from_u128(1).is_valid());
        assert!(!SpanId::INVALID.is_valid());
        assert!(!SpanContext::empty_context().is_valid());
    }

    #[test]
    fn sampled_flag() {
        assert!(TraceFlags::SAMPLED.is_sampled());
        assert!(!TraceFlags::default().is_sampled());
        assert!(TraceFlags::default().with_sampled(true).is_sampled());
        assert!(!TraceFlags::SAMPLED.with_sampled(false).is_sampled());
    }

    #[test]
    fn trace_state_round_trip() {
        let state = TraceState::from_key_value([("foo", "bar"), ("apple", "banana")]).unwrap();
        assert_eq!(state.header(), "foo=bar,apple=banana");
        assert_eq!(state.get("apple"), Some("banana"));

        let updated = state.insert("apple", "pie").unwrap();
        assert_eq!(updated.header(), "apple=pie,foo=bar");
        // original is unchanged
        assert_eq!(state.get("apple"), Some("banana"));

        let removed = updated.delete("foo").unwrap();
        assert_eq!(removed.get("foo"), None);
    }

    #[test]
    fn trace_state_rejects_invalid() {
        assert!(TraceState::from_key_value([("FOO", "bar")]).is_err());
        assert!(TraceState::from_key_value([("foo", "a=b")]).is_err());
        assert!(TraceState::from_str("no-equals-sign").is_err());

        let too_many = (0..33).map(|i| (format!("k{i}"), "v".to_owned()));
        assert!(TraceState::from_key_value(too_many).is_err());
    }

    #[test]
    fn trace_state_parses_header() {
        let state = TraceState::from_str("foo=bar, baz=qux").unwrap();
        assert_eq!(state.get("foo"), Some("bar"));
        assert_eq!(state.header(), "foo=bar,baz=qux");
    }
}
