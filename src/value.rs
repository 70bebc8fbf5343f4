//! Schema-less property maps for entities and relations.
//!
//! Extractors attach arbitrary attributes to what they produce. Instead of
//! free-form dynamic access, values are a closed set of tagged variants and
//! callers go through typed accessors that return `None` on a type mismatch.

use std::collections::BTreeMap;
use std::fmt;

use serde::{Deserialize, Serialize};

/// A single property value. Serializes as the plain JSON value it wraps.
#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
#[serde(untagged)]
pub enum PropertyValue {
    Null,
    Bool(bool),
    Int(i64),
    Float(f64),
    Text(String),
    List(Vec<PropertyValue>),
    Map(BTreeMap<String, PropertyValue>),
}

impl PropertyValue {
    pub fn as_bool(&self) -> Option<bool> {
        match self {
            Self::Bool(b) => Some(*b),
            _ => None,
        }
    }

    /// Numeric view: integers widen to `f64`.
    pub fn as_f64(&self) -> Option<f64> {
        match self {
            Self::Int(i) => Some(*i as f64),
            Self::Float(f) => Some(*f),
            _ => None,
        }
    }

    pub fn as_i64(&self) -> Option<i64> {
        match self {
            Self::Int(i) => Some(*i),
            _ => None,
        }
    }

    pub fn as_str(&self) -> Option<&str> {
        match self {
            Self::Text(s) => Some(s),
            _ => None,
        }
    }

    pub fn as_list(&self) -> Option<&[PropertyValue]> {
        match self {
            Self::List(items) => Some(items),
            _ => None,
        }
    }

    pub fn as_map(&self) -> Option<&BTreeMap<String, PropertyValue>> {
        match self {
            Self::Map(m) => Some(m),
            _ => None,
        }
    }

    /// Collect a list of text values. `None` if this is not a list or any
    /// element is not text.
    pub fn as_string_list(&self) -> Option<Vec<String>> {
        self.as_list()?
            .iter()
            .map(|v| v.as_str().map(str::to_string))
            .collect()
    }
}

impl fmt::Display for PropertyValue {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        match self {
            Self::Null => write!(f, "null"),
            Self::Bool(b) => write!(f, "{b}"),
            Self::Int(i) => write!(f, "{i}"),
            Self::Float(x) => write!(f, "{x}"),
            Self::Text(s) => write!(f, "{s}"),
            Self::List(items) => {
                write!(f, "[")?;
                for (i, item) in items.iter().enumerate() {
                    if i > 0 {
                        write!(f, ", ")?;
                    }
                    write!(f, "{item}")?;
                }
                write!(f, "]")
            }
            Self::Map(m) => {
                write!(f, "{{")?;
                for (i, (k, v)) in m.iter().enumerate() {
                    if i > 0 {
                        write!(f, ", ")?;
                    }
                    write!(f, "{k}: {v}")?;
                }
                write!(f, "}}")
            }
        }
    }
}

impl From<bool> for PropertyValue {
    fn from(b: bool) -> Self {
        Self::Bool(b)
    }
}

impl From<i64> for PropertyValue {
    fn from(i: i64) -> Self {
        Self::Int(i)
    }
}

impl From<usize> for PropertyValue {
    fn from(n: usize) -> Self {
        Self::Int(i64::try_from(n).unwrap_or(i64::MAX))
    }
}

impl From<f64> for PropertyValue {
    fn from(x: f64) -> Self {
        Self::Float(x)
    }
}

impl From<&str> for PropertyValue {
    fn from(s: &str) -> Self {
        Self::Text(s.to_string())
    }
}

impl From<String> for PropertyValue {
    fn from(s: String) -> Self {
        Self::Text(s)
    }
}

impl<T: Into<PropertyValue>> From<Vec<T>> for PropertyValue {
    fn from(items: Vec<T>) -> Self {
        Self::List(items.into_iter().map(Into::into).collect())
    }
}

/// An ordered string → value map with typed accessors.
#[derive(Debug, Clone, Default, PartialEq, Serialize, Deserialize)]
#[serde(transparent)]
pub struct Properties(BTreeMap<String, PropertyValue>);

impl Properties {
    pub fn new() -> Self {
        Self(BTreeMap::new())
    }

    /// Builder-style insert.
    pub fn with(mut self, key: impl Into<String>, value: impl Into<PropertyValue>) -> Self {
        self.insert(key, value);
        self
    }

    pub fn insert(&mut self, key: impl Into<String>, value: impl Into<PropertyValue>) {
        self.0.insert(key.into(), value.into());
    }

    pub fn get(&self, key: &str) -> Option<&PropertyValue> {
        self.0.get(key)
    }

    pub fn get_bool(&self, key: &str) -> Option<bool> {
        self.get(key)?.as_bool()
    }

    pub fn get_f64(&self, key: &str) -> Option<f64> {
        self.get(key)?.as_f64()
    }

    pub fn get_i64(&self, key: &str) -> Option<i64> {
        self.get(key)?.as_i64()
    }

    pub fn get_str(&self, key: &str) -> Option<&str> {
        self.get(key)?.as_str()
    }

    pub fn get_list(&self, key: &str) -> Option<&[PropertyValue]> {
        self.get(key)?.as_list()
    }

    pub fn contains_key(&self, key: &str) -> bool {
        self.0.contains_key(key)
    }

    pub fn remove(&mut self, key: &str) -> Option<PropertyValue> {
        self.0.remove(key)
    }

    pub fn len(&self) -> usize {
        self.0.len()
    }

    pub fn is_empty(&self) -> bool {
        self.0.is_empty()
    }

    pub fn iter(&self) -> impl Iterator<Item = (&String, &PropertyValue)> {
        self.0.iter()
    }

    /// Copy every entry of `other` into `self`, overwriting on key collision.
    pub fn extend_from(&mut self, other: &Properties) {
        for (k, v) in &other.0 {
            self.0.insert(k.clone(), v.clone());
        }
    }
}

impl FromIterator<(String, PropertyValue)> for Properties {
    fn from_iter<I: IntoIterator<Item = (String, PropertyValue)>>(iter: I) -> Self {
        Self(iter.into_iter().collect())
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn typed_accessors_reject_mismatches() {
        let props = Properties::new()
            .with("inferred", true)
            .with("rule_id", "R1")
            .with("path_length", 2usize)
            .with("score", 0.5);

        assert_eq!(props.get_bool("inferred"), Some(true));
        assert_eq!(props.get_str("rule_id"), Some("R1"));
        assert_eq!(props.get_i64("path_length"), Some(2));
        assert_eq!(props.get_f64("path_length"), Some(2.0));
        assert_eq!(props.get_f64("score"), Some(0.5));
        assert_eq!(props.get_bool("rule_id"), None);
        assert_eq!(props.get_str("missing"), None);
    }

    #[test]
    fn json_shape_is_plain() {
        let props = Properties::new()
            .with("evidence", vec!["doc-1", "doc-2"])
            .with("weight", 3i64);
        let json = serde_json::to_value(&props).unwrap();
        assert_eq!(json["evidence"][1], "doc-2");
        assert_eq!(json["weight"], 3);

        let back: Properties = serde_json::from_value(json).unwrap();
        assert_eq!(back, props);
    }

    #[test]
    fn nested_maps_and_null_deserialize() {
        let back: Properties =
            serde_json::from_str(r#"{"meta": {"source": "wiki", "page": 4}, "note": null}"#)
                .unwrap();
        let meta = back.get("meta").and_then(PropertyValue::as_map).unwrap();
        assert_eq!(meta["source"], PropertyValue::Text("wiki".into()));
        assert_eq!(meta["page"], PropertyValue::Int(4));
        assert_eq!(back.get("note"), Some(&PropertyValue::Null));
    }

    #[test]
    fn string_list_requires_all_text() {
        let good = PropertyValue::from(vec!["a", "b"]);
        assert_eq!(good.as_string_list(), Some(vec!["a".to_string(), "b".to_string()]));
        let mixed = PropertyValue::List(vec![PropertyValue::Text("a".into()), PropertyValue::Int(1)]);
        assert_eq!(mixed.as_string_list(), None);
    }
}
