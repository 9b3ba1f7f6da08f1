//! Call metadata: the string map sent alongside each attempt.

use std::collections::BTreeMap;

/// Reserved metadata key carrying the attempt number on retried attempts.
pub const RETRIES_KEY: &str = "retries";

/// Ordered string-to-string map of call metadata.
///
/// The retry controller owns one `Metadata` per logical call and mutates only
/// [`RETRIES_KEY`]; every other entry reaches each attempt as the caller supplied it.
#[derive(Debug, Clone, Default, PartialEq, Eq)]
pub struct Metadata {
    entries: BTreeMap<String, String>,
}

impl Metadata {
    pub fn new() -> Self {
        Self::default()
    }

    /// Insert or overwrite an entry, returning the previous value.
    pub fn insert(&mut self, key: impl Into<String>, value: impl Into<String>) -> Option<String> {
        self.entries.insert(key.into(), value.into())
    }

    pub fn get(&self, key: &str) -> Option<&str> {
        self.entries.get(key).map(String::as_str)
    }

    pub fn remove(&mut self, key: &str) -> Option<String> {
        self.entries.remove(key)
    }

    pub fn contains_key(&self, key: &str) -> bool {
        self.entries.contains_key(key)
    }

    pub fn len(&self) -> usize {
        self.entries.len()
    }

    pub fn is_empty(&self) -> bool {
        self.entries.is_empty()
    }

    pub fn iter(&self) -> impl Iterator<Item = (&str, &str)> {
        self.entries.iter().map(|(k, v)| (k.as_str(), v.as_str()))
    }

    /// Tag the metadata with the attempt number as a decimal string.
    pub fn set_retries(&mut self, attempt: usize) {
        self.entries.insert(RETRIES_KEY.to_string(), attempt.to_string());
    }

    /// Parsed value of [`RETRIES_KEY`], if present and numeric.
    pub fn retries(&self) -> Option<usize> {
        self.get(RETRIES_KEY).and_then(|v| v.parse().ok())
    }
}

impl<K, V> FromIterator<(K, V)> for Metadata
where
    K: Into<String>,
    V: Into<String>,
{
    fn from_iter<I: IntoIterator<Item = (K, V)>>(iter: I) -> Self {
        Self { entries: iter.into_iter().map(|(k, v)| (k.into(), v.into())).collect() }
    }
}
