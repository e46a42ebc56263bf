//! Label-sets and label filters.
//!
//! A [`LabelSet`] tags one series of a metric. Its canonical encoding is a
//! compact JSON object with sorted keys, or the literal `null` for the
//! label-less series, and that string is what the store indexes on. Two
//! label-sets built in different key orders therefore share one series.

use std::collections::{BTreeMap, HashMap};
use std::fmt;
use std::str::FromStr;

use serde::{Deserialize, Serialize};

use crate::error::{Error, Result};

/// Canonical encoding of the label-less series.
pub const NULL_LABELS: &str = "null";

/// Canonical encoding of the wildcard filter.
pub const WILDCARD: &str = "*";

/// An optional mapping of label keys to label values.
///
/// `LabelSet::null()` (also the default) is the sentinel for points recorded
/// without labels.
#[derive(Debug, Clone, Default, PartialEq, Eq, Hash, PartialOrd, Ord, Serialize, Deserialize)]
pub struct LabelSet(Option<BTreeMap<String, String>>);

impl LabelSet {
    /// The label-less series.
    pub fn null() -> Self {
        Self(None)
    }

    /// Creates a label-set from a mapping. An empty mapping is still a
    /// labeled series, distinct from [`LabelSet::null`].
    pub fn new(labels: BTreeMap<String, String>) -> Self {
        Self(Some(labels))
    }

    /// Returns a copy with `key` set to `value`, turning a null label-set into
    /// a labeled one.
    #[must_use]
    pub fn with(mut self, key: impl Into<String>, value: impl Into<String>) -> Self {
        self.0
            .get_or_insert_with(BTreeMap::new)
            .insert(key.into(), value.into());
        self
    }

    /// Returns `true` for the label-less series.
    pub fn is_null(&self) -> bool {
        self.0.is_none()
    }

    /// Returns the value stored under `key`.
    pub fn get(&self, key: &str) -> Option<&str> {
        self.0.as_ref()?.get(key).map(String::as_str)
    }

    /// Returns `true` if `key` is present.
    pub fn contains_key(&self, key: &str) -> bool {
        self.get(key).is_some()
    }

    /// Returns the underlying mapping, or `None` for the null label-set.
    pub fn as_map(&self) -> Option<&BTreeMap<String, String>> {
        self.0.as_ref()
    }

    /// Iterates over key/value pairs in key order.
    pub fn iter(&self) -> impl Iterator<Item = (&str, &str)> {
        self.0
            .iter()
            .flat_map(|map| map.iter().map(|(k, v)| (k.as_str(), v.as_str())))
    }

    /// Returns the canonical string used as the series key.
    pub fn canonical(&self) -> String {
        match &self.0 {
            None => NULL_LABELS.to_string(),
            Some(map) => encode_map(map),
        }
    }

    /// Parses a canonical string produced by [`LabelSet::canonical`].
    pub fn from_canonical(encoded: &str) -> Result<Self> {
        if encoded == NULL_LABELS {
            return Ok(Self::null());
        }
        serde_json::from_str::<BTreeMap<String, String>>(encoded)
            .map(Self::new)
            .map_err(|e| Error::invalid(format!("malformed label-set {encoded}: {e}")))
    }
}

fn encode_map(map: &BTreeMap<String, String>) -> String {
    let object: serde_json::Map<String, serde_json::Value> = map
        .iter()
        .map(|(k, v)| (k.clone(), serde_json::Value::String(v.clone())))
        .collect();
    serde_json::Value::Object(object).to_string()
}

impl fmt::Display for LabelSet {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        f.write_str(&self.canonical())
    }
}

impl From<BTreeMap<String, String>> for LabelSet {
    fn from(labels: BTreeMap<String, String>) -> Self {
        Self::new(labels)
    }
}

impl From<Option<BTreeMap<String, String>>> for LabelSet {
    fn from(labels: Option<BTreeMap<String, String>>) -> Self {
        Self(labels)
    }
}

impl From<HashMap<String, String>> for LabelSet {
    fn from(labels: HashMap<String, String>) -> Self {
        Self::new(labels.into_iter().collect())
    }
}

impl<K: Into<String>, V: Into<String>, const N: usize> From<[(K, V); N]> for LabelSet {
    fn from(pairs: [(K, V); N]) -> Self {
        pairs.into_iter().collect()
    }
}

impl<K: Into<String>, V: Into<String>> FromIterator<(K, V)> for LabelSet {
    fn from_iter<I: IntoIterator<Item = (K, V)>>(iter: I) -> Self {
        Self::new(
            iter.into_iter()
                .map(|(k, v)| (k.into(), v.into()))
                .collect(),
        )
    }
}

/// Selects which series of a metric a query covers.
#[derive(Debug, Clone, Default, PartialEq, Eq)]
pub enum LabelFilter {
    /// Every series recorded under the metric name.
    #[default]
    All,
    /// Only the label-less series.
    Null,
    /// Every series whose labels, restricted to the filter's keys, equal the
    /// filter exactly. Extra keys on the series are ignored.
    Exact(BTreeMap<String, String>),
}

impl LabelFilter {
    /// Builds an exact filter from key/value pairs.
    pub fn exact<K, V>(pairs: impl IntoIterator<Item = (K, V)>) -> Self
    where
        K: Into<String>,
        V: Into<String>,
    {
        LabelFilter::Exact(
            pairs
                .into_iter()
                .map(|(k, v)| (k.into(), v.into()))
                .collect(),
        )
    }
}

impl fmt::Display for LabelFilter {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        match self {
            LabelFilter::All => f.write_str(WILDCARD),
            LabelFilter::Null => f.write_str(NULL_LABELS),
            LabelFilter::Exact(map) => f.write_str(&encode_map(map)),
        }
    }
}

impl FromStr for LabelFilter {
    type Err = Error;

    fn from_str(s: &str) -> Result<Self> {
        if s == WILDCARD {
            Ok(LabelFilter::All)
        } else {
            Err(Error::invalid(format!(
                "label filter must be '*', a mapping or null, got '{s}'"
            )))
        }
    }
}

impl TryFrom<&str> for LabelFilter {
    type Error = Error;

    fn try_from(s: &str) -> Result<Self> {
        s.parse()
    }
}

impl From<LabelSet> for LabelFilter {
    fn from(labels: LabelSet) -> Self {
        match labels.0 {
            None => LabelFilter::Null,
            Some(map) => LabelFilter::Exact(map),
        }
    }
}

impl From<Option<BTreeMap<String, String>>> for LabelFilter {
    fn from(labels: Option<BTreeMap<String, String>>) -> Self {
        LabelSet::from(labels).into()
    }
}

impl From<BTreeMap<String, String>> for LabelFilter {
    fn from(labels: BTreeMap<String, String>) -> Self {
        LabelFilter::Exact(labels)
    }
}

impl<K: Into<String>, V: Into<String>, const N: usize> From<[(K, V); N]> for LabelFilter {
    fn from(pairs: [(K, V); N]) -> Self {
        LabelFilter::exact(pairs)
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn test_canonical_is_order_independent() {
        let a = LabelSet::from([("route", "/app1"), ("code", "200")]);
        let b = LabelSet::null().with("code", "200").with("route", "/app1");
        assert_eq!(a, b);
        assert_eq!(a.canonical(), r#"{"code":"200","route":"/app1"}"#);
    }

    #[test]
    fn test_null_canonical() {
        assert_eq!(LabelSet::null().canonical(), "null");
        assert!(LabelSet::from_canonical("null").unwrap().is_null());
    }

    #[test]
    fn test_empty_map_is_not_null() {
        let empty = LabelSet::new(BTreeMap::new());
        assert!(!empty.is_null());
        assert_eq!(empty.canonical(), "{}");
    }

    #[test]
    fn test_canonical_escapes_values() {
        let labels = LabelSet::from([("path", "a\"b")]);
        let decoded = LabelSet::from_canonical(&labels.canonical()).unwrap();
        assert_eq!(decoded, labels);
        assert_eq!(decoded.get("path"), Some("a\"b"));
    }

    #[test]
    fn test_from_canonical_rejects_garbage() {
        assert!(matches!(
            LabelSet::from_canonical("{not json"),
            Err(Error::InvalidArgument(_))
        ));
    }

    #[test]
    fn test_filter_parse() {
        assert_eq!("*".parse::<LabelFilter>().unwrap(), LabelFilter::All);
        assert!(matches!(
            LabelFilter::try_from("route"),
            Err(Error::InvalidArgument(_))
        ));
    }

    #[test]
    fn test_filter_from_label_set() {
        assert_eq!(LabelFilter::from(LabelSet::null()), LabelFilter::Null);
        assert_eq!(
            LabelFilter::from(LabelSet::from([("code", "200")])),
            LabelFilter::exact([("code", "200")])
        );
        assert_eq!(LabelFilter::exact([("code", "200")]).to_string(), r#"{"code":"200"}"#);
    }
}
