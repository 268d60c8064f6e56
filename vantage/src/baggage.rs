//! Cross-cutting name/value pairs propagated with the [`Context`].
//!
//! Baggage annotates a transaction as it fans out across services. It is
//! propagated in accordance with the [W3C Baggage] specification but is
//! never copied onto spans automatically; users attach baggage entries to
//! telemetry explicitly where they want them.
//!
//! [W3C Baggage]: https://w3c.github.io/baggage

use crate::{Context, Key, KeyValue};
use std::collections::HashMap;
use std::fmt;

const MAX_KEY_VALUE_PAIRS: usize = 64;
const MAX_LEN_OF_ALL_PAIRS: usize = 8192;

// https://datatracker.ietf.org/doc/html/rfc7230#section-3.2.6
const INVALID_ASCII_KEY_CHARS: [u8; 17] = [
    b'(', b')', b',', b'/', b':', b';', b'<', b'=', b'>', b'?', b'@', b'[', b'\\', b']', b'{',
    b'}', b'"',
];

fn valid_key(key: &str) -> bool {
    !key.is_empty()
        && key.bytes().all(|b| {
            b.is_ascii_graphic() && !INVALID_ASCII_KEY_CHARS.contains(&b)
        })
}

/// A set of name/value pairs describing user-defined properties.
///
/// ### Limits
///
/// * At most 64 name/value pairs.
/// * At most 8192 bytes of name/value/metadata content in total.
///
/// Entries beyond the limits are rejected on insert.
#[derive(Debug, Default, Clone, PartialEq)]
pub struct Baggage {
    inner: HashMap<Key, (String, BaggageMetadata)>,
    kv_content_len: usize,
}

impl Baggage {
    /// Creates an empty `Baggage`.
    pub fn new() -> Self {
        Baggage::default()
    }

    /// Returns the value associated with the given name, if any.
    pub fn get<K: AsRef<str>>(&self, key: K) -> Option<&str> {
        self.inner
            .get(key.as_ref())
            .map(|(value, _metadata)| value.as_str())
    }

    /// Returns the value and metadata associated with the given name.
    pub fn get_with_metadata<K: AsRef<str>>(&self, key: K) -> Option<&(String, BaggageMetadata)> {
        self.inner.get(key.as_ref())
    }

    /// Inserts a name/value pair, returning the previous value if the name
    /// was present.
    ///
    /// A `None` return with a fresh key means the entry was rejected by
    /// the key validation or the baggage limits.
    pub fn insert<K, V>(&mut self, key: K, value: V) -> Option<String>
    where
        K: Into<Key>,
        V: Into<String>,
    {
        self.insert_with_metadata(key, value, BaggageMetadata::default())
            .map(|(value, _metadata)| value)
    }

    /// Inserts a name/value pair with metadata, enforcing the W3C limits.
    pub fn insert_with_metadata<K, V, S>(
        &mut self,
        key: K,
        value: V,
        metadata: S,
    ) -> Option<(String, BaggageMetadata)>
    where
        K: Into<Key>,
        V: Into<String>,
        S: Into<BaggageMetadata>,
    {
        let (key, value, metadata) = (key.into(), value.into(), metadata.into());
        if !valid_key(key.as_str()) {
            return None;
        }
        let entry_len = key_value_metadata_bytes_size(key.as_str(), &value, metadata.as_str());
        let prior_len = self
            .inner
            .get(&key)
            .map(|(v, m)| key_value_metadata_bytes_size(key.as_str(), v, m.as_str()))
            .unwrap_or(0);

        if self.kv_content_len - prior_len + entry_len > MAX_LEN_OF_ALL_PAIRS {
            return None;
        }
        if prior_len == 0 && self.inner.len() >= MAX_KEY_VALUE_PAIRS {
            return None;
        }

        self.kv_content_len = self.kv_content_len - prior_len + entry_len;
        self.inner.insert(key, (value, metadata))
    }

    /// Removes the entry with the given name, returning it if present.
    pub fn remove<K: Into<Key>>(&mut self, key: K) -> Option<(String, BaggageMetadata)> {
        let key = key.into();
        let removed = self.inner.remove(&key);
        if let Some((value, metadata)) = &removed {
            self.kv_content_len -=
                key_value_metadata_bytes_size(key.as_str(), value, metadata.as_str());
        }
        removed
    }

    /// The number of entries.
    pub fn len(&self) -> usize {
        self.inner.len()
    }

    /// Returns true if there are no entries.
    pub fn is_empty(&self) -> bool {
        self.inner.is_empty()
    }

    /// Iterates over the entries.
    pub fn iter(&self) -> impl Iterator<Item = (&Key, &(String, BaggageMetadata))> {
        self.inner.iter()
    }
}

fn key_value_metadata_bytes_size(key: &str, value: &str, metadata: &str) -> usize {
    key.len() + value.len() + metadata.len()
}

impl fmt::Display for Baggage {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        let mut first = true;
        for (key, (value, metadata)) in &self.inner {
            if !first {
                write!(f, ",")?;
            }
            first = false;
            write!(f, "{key}={value}")?;
            if !metadata.as_str().is_empty() {
                write!(f, ";{}", metadata.as_str())?;
            }
        }
        Ok(())
    }
}

/// Optional properties attached to a baggage value, carried verbatim as a
/// `;`-delimited string.
#[derive(Clone, Debug, PartialEq, Eq, Default)]
pub struct BaggageMetadata(String);

impl BaggageMetadata {
    /// The raw metadata string.
    pub fn as_str(&self) -> &str {
        &self.0
    }
}

impl From<String> for BaggageMetadata {
    fn from(s: String) -> BaggageMetadata {
        BaggageMetadata(s.trim().to_owned())
    }
}

impl From<&str> for BaggageMetadata {
    fn from(s: &str) -> Self {
        BaggageMetadata(s.trim().to_owned())
    }
}

/// A baggage entry with optional metadata, used when assembling baggage in
/// bulk.
#[derive(Clone, Debug, PartialEq)]
pub struct KeyValueMetadata {
    /// The entry name.
    pub key: Key,
    /// The entry value.
    pub value: String,
    /// The entry metadata.
    pub metadata: BaggageMetadata,
}

impl KeyValueMetadata {
    /// Create an entry with metadata.
    pub fn new<K, V, S>(key: K, value: V, metadata: S) -> Self
    where
        K: Into<Key>,
        V: Into<String>,
        S: Into<BaggageMetadata>,
    {
        KeyValueMetadata {
            key: key.into(),
            value: value.into(),
            metadata: metadata.into(),
        }
    }
}

impl From<KeyValue> for KeyValueMetadata {
    fn from(kv: KeyValue) -> Self {
        KeyValueMetadata {
            key: kv.key,
            value: kv.value.as_str().into_owned(),
            metadata: BaggageMetadata::default(),
        }
    }
}

/// Methods for storing and retrieving baggage in a [`Context`].
pub trait BaggageExt {
    /// Returns a copy of this context with the given baggage entries added
    /// to the existing baggage.
    fn with_baggage<T: IntoIterator<Item = I>, I: Into<KeyValueMetadata>>(
        &self,
        baggage: T,
    ) -> Self;

    /// Returns a copy of the current context with the given baggage.
    fn current_with_baggage<T: IntoIterator<Item = I>, I: Into<KeyValueMetadata>>(
        baggage: T,
    ) -> Self;

    /// Returns a copy of this context with an empty baggage.
    fn with_cleared_baggage(&self) -> Self;

    /// The baggage of this context.
    fn baggage(&self) -> Baggage;
}

impl BaggageExt for Context {
    fn with_baggage<T: IntoIterator<Item = I>, I: Into<KeyValueMetadata>>(
        &self,
        baggage: T,
    ) -> Self {
        let mut merged = self.baggage();
        for entry in baggage {
            let entry = entry.into();
            merged.insert_with_metadata(entry.key, entry.value, entry.metadata);
        }
        self.with_value(merged)
    }

    fn current_with_baggage<T: IntoIterator<Item = I>, I: Into<KeyValueMetadata>>(
        baggage: T,
    ) -> Self {
        Context::map_current(|cx| cx.with_baggage(baggage))
    }

    fn with_cleared_baggage(&self) -> Self {
        self.with_value(Baggage::new())
    }

    fn baggage(&self) -> Baggage {
        self.get::<Baggage>().cloned().unwrap_or_default()
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn insert_get_remove() {
        let mut baggage = Baggage::new();
        assert_eq!(baggage.insert("user.id", "42"), None);
        assert_eq!(baggage.get("user.id"), Some("42"));
        assert_eq!(baggage.insert("user.id", "43"), Some("42".to_owned()));
        assert!(baggage.remove("user.id").is_some());
        assert!(baggage.is_empty());
    }

    #[test]
    fn rejects_invalid_keys() {
        let mut baggage = Baggage::new();
        assert_eq!(baggage.insert("", "x"), None);
        assert_eq!(baggage.insert("bad,key", "x"), None);
        assert_eq!(baggage.insert("bad key", "x"), None);
        assert!(baggage.is_empty());
    }

    #[test]
    fn enforces_pair_count_limit() {
        let mut baggage = Baggage::new();
        for i in 0..MAX_KEY_VALUE_PAIRS + 8 {
            baggage.insert(format!("key{i}"), "v");
        }
        assert_eq!(baggage.len(), MAX_KEY_VALUE_PAIRS);
    }

    #[test]
    fn enforces_total_length_limit() {
        let mut baggage = Baggage::new();
        let big = "x".repeat(MAX_LEN_OF_ALL_PAIRS);
        assert_eq!(baggage.insert("k", big), None);
        assert!(baggage.is_empty());

        // Replacing a value reclaims the old entry's budget.
        let fitting = "x".repeat(MAX_LEN_OF_ALL_PAIRS - 1);
        assert!(baggage.insert("k", fitting.clone()).is_none());
        assert_eq!(baggage.get("k"), Some(fitting.as_str()));
        baggage.insert("k", "small");
        assert_eq!(baggage.get("k"), Some("small"));
    }

    #[test]
    fn context_carries_baggage() {
        let cx = Context::new().with_baggage([KeyValueMetadata::new("tenant", "acme", "")]);
        assert_eq!(cx.baggage().get("tenant"), Some("acme"));

        let extended = cx.with_baggage([KeyValueMetadata::new("region", "eu", "prop=1")]);
        assert_eq!(extended.baggage().len(), 2);
        // The original context is unchanged.
        assert_eq!(cx.baggage().len(), 1);

        assert!(extended.with_cleared_baggage().baggage().is_empty());
    }
}
