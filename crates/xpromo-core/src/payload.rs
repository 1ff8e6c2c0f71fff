//! Attribution payload: an insertion-ordered field map and the merge rules
//! used to assemble it.
//!
//! # Merge precedence
//!
//! Payloads are assembled from an ordered list of [`FieldSource`]s. Sources
//! are applied first to last; a later source overwrites an earlier one
//! field-by-field. An overwritten key keeps its original position so the
//! rendered query string stays stable.
//!
//! ```text
//! attribution: defaults → interstitial data → caller fields → experiment → screen view
//! base:        constants + deep-link paths + identity → base fields → subreddit fields
//! final:       base → attribution → tags (extracted ++ attribution ++ base) → utm_content folded into tags
//! ```

use serde::de::{MapAccess, Visitor};
use serde::ser::SerializeMap;
use serde::{Deserialize, Deserializer, Serialize, Serializer};
use std::fmt;

pub const TAGS: &str = "tags";
pub const UTM_CONTENT: &str = "utm_content";

/// Value of a single payload field.
#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
#[serde(untagged)]
pub enum FieldValue {
    /// Present but without a value; renders as `key=`.
    Empty,
    Bool(bool),
    Int(i64),
    Float(f64),
    Text(String),
    /// Rendered as one repeated query parameter per element.
    List(Vec<String>),
}

impl FieldValue {
    /// `Text` for `Some`, `Empty` for `None`.
    #[must_use]
    pub fn optional(value: Option<impl Into<String>>) -> Self {
        value.map_or(Self::Empty, |v| Self::Text(v.into()))
    }

    /// Scalar rendering; `None` for lists.
    #[must_use]
    pub fn as_scalar(&self) -> Option<String> {
        match self {
            Self::Empty => Some(String::new()),
            Self::Bool(b) => Some(b.to_string()),
            Self::Int(i) => Some(i.to_string()),
            Self::Float(f) => Some(f.to_string()),
            Self::Text(s) => Some(s.clone()),
            Self::List(_) => None,
        }
    }

    /// Elements of a tag list; scalars count as a single tag.
    #[must_use]
    pub fn as_tags(&self) -> Vec<String> {
        match self {
            Self::Empty => Vec::new(),
            Self::List(items) => items.clone(),
            scalar => scalar.as_scalar().into_iter().collect(),
        }
    }

    /// Whether this value is "set" in the sense of the link builder: lists
    /// always are, scalars unless empty, `false`, or zero.
    #[must_use]
    pub fn is_truthy(&self) -> bool {
        match self {
            Self::Empty => false,
            Self::Bool(b) => *b,
            Self::Int(i) => *i != 0,
            Self::Float(f) => *f != 0.0 && !f.is_nan(),
            Self::Text(s) => !s.is_empty(),
            Self::List(_) => true,
        }
    }
}

impl From<&str> for FieldValue {
    fn from(value: &str) -> Self {
        Self::Text(value.to_string())
    }
}

impl From<String> for FieldValue {
    fn from(value: String) -> Self {
        Self::Text(value)
    }
}

impl From<bool> for FieldValue {
    fn from(value: bool) -> Self {
        Self::Bool(value)
    }
}

impl From<i64> for FieldValue {
    fn from(value: i64) -> Self {
        Self::Int(value)
    }
}

impl From<Vec<String>> for FieldValue {
    fn from(value: Vec<String>) -> Self {
        Self::List(value)
    }
}

/// Insertion-ordered mapping from field names to values.
#[derive(Debug, Clone, Default, PartialEq)]
pub struct Payload {
    fields: Vec<(String, FieldValue)>,
}

impl Payload {
    #[must_use]
    pub fn new() -> Self {
        Self::default()
    }

    /// Set `key`, replacing in place if it already exists.
    pub fn set(&mut self, key: impl Into<String>, value: impl Into<FieldValue>) {
        let key = key.into();
        let value = value.into();
        if let Some(slot) = self.fields.iter_mut().find(|(k, _)| *k == key) {
            slot.1 = value;
        } else {
            self.fields.push((key, value));
        }
    }

    /// Builder-style [`Payload::set`].
    #[must_use]
    pub fn with(mut self, key: impl Into<String>, value: impl Into<FieldValue>) -> Self {
        self.set(key, value);
        self
    }

    #[must_use]
    pub fn get(&self, key: &str) -> Option<&FieldValue> {
        self.fields.iter().find(|(k, _)| k == key).map(|(_, v)| v)
    }

    /// Scalar rendering of `key`, if present and not a list.
    #[must_use]
    pub fn get_str(&self, key: &str) -> Option<String> {
        self.get(key).and_then(FieldValue::as_scalar)
    }

    #[must_use]
    pub fn contains_key(&self, key: &str) -> bool {
        self.get(key).is_some()
    }

    pub fn remove(&mut self, key: &str) -> Option<FieldValue> {
        let idx = self.fields.iter().position(|(k, _)| k == key)?;
        Some(self.fields.remove(idx).1)
    }

    /// Overlay `other` onto `self`; last-wins per field.
    pub fn merge(&mut self, other: &Payload) {
        for (k, v) in &other.fields {
            self.set(k.clone(), v.clone());
        }
    }

    /// Tag list stored under `tags`, or empty.
    #[must_use]
    pub fn tags(&self) -> Vec<String> {
        self.get(TAGS).map(FieldValue::as_tags).unwrap_or_default()
    }

    pub fn iter(&self) -> impl Iterator<Item = (&str, &FieldValue)> {
        self.fields.iter().map(|(k, v)| (k.as_str(), v))
    }

    #[must_use]
    pub fn keys(&self) -> Vec<&str> {
        self.fields.iter().map(|(k, _)| k.as_str()).collect()
    }

    #[must_use]
    pub fn len(&self) -> usize {
        self.fields.len()
    }

    #[must_use]
    pub fn is_empty(&self) -> bool {
        self.fields.is_empty()
    }
}

impl<K: Into<String>, V: Into<FieldValue>> FromIterator<(K, V)> for Payload {
    fn from_iter<T: IntoIterator<Item = (K, V)>>(iter: T) -> Self {
        let mut payload = Self::new();
        for (k, v) in iter {
            payload.set(k, v);
        }
        payload
    }
}

impl Serialize for Payload {
    fn serialize<S: Serializer>(&self, serializer: S) -> Result<S::Ok, S::Error> {
        let mut map = serializer.serialize_map(Some(self.fields.len()))?;
        for (k, v) in &self.fields {
            map.serialize_entry(k, v)?;
        }
        map.end()
    }
}

impl<'de> Deserialize<'de> for Payload {
    fn deserialize<D: Deserializer<'de>>(deserializer: D) -> Result<Self, D::Error> {
        struct PayloadVisitor;

        impl<'de> Visitor<'de> for PayloadVisitor {
            type Value = Payload;

            fn expecting(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
                f.write_str("a map of payload fields")
            }

            fn visit_map<A: MapAccess<'de>>(self, mut access: A) -> Result<Payload, A::Error> {
                let mut payload = Payload::new();
                while let Some((key, value)) = access.next_entry::<String, FieldValue>()? {
                    payload.set(key, value);
                }
                Ok(payload)
            }
        }

        deserializer.deserialize_map(PayloadVisitor)
    }
}

// =============================================================================
// Ordered merge
// =============================================================================

/// A named contribution to a payload.
#[derive(Debug, Clone)]
pub struct FieldSource {
    pub name: &'static str,
    pub fields: Payload,
}

impl FieldSource {
    #[must_use]
    pub fn new(name: &'static str, fields: Payload) -> Self {
        Self { name, fields }
    }
}

/// Apply `sources` in order, last-wins.
#[must_use]
pub fn merge_sources(sources: &[FieldSource]) -> Payload {
    let mut merged = Payload::new();
    for source in sources {
        if !source.fields.is_empty() {
            tracing::trace!(source = source.name, fields = source.fields.len(), "Merging payload source");
        }
        merged.merge(&source.fields);
    }
    merged
}

/// Concatenate tags: extracted, then caller-supplied, then base-payload.
///
/// Order and duplicates are preserved.
#[must_use]
pub fn merge_tags(extracted: &[String], caller: &[String], base: &[String]) -> Vec<String> {
    let mut tags = Vec::with_capacity(extracted.len() + caller.len() + base.len());
    tags.extend_from_slice(extracted);
    tags.extend_from_slice(caller);
    tags.extend_from_slice(base);
    tags
}

/// Combine the base payload with the caller's attribution payload.
///
/// `utm_content` never survives: when set it is removed and its value
/// appended as the final tag (the long-form link service lets `utm_content`
/// shadow `tags`).
#[must_use]
pub fn finalize_payload(base: &Payload, attribution: &Payload, extracted_tags: &[String]) -> Payload {
    let tags = merge_tags(extracted_tags, &attribution.tags(), &base.tags());

    let mut query = merge_sources(&[
        FieldSource::new("base", base.clone()),
        FieldSource::new("attribution", attribution.clone()),
    ]);
    query.set(TAGS, FieldValue::List(tags));
    fold_utm_content(&mut query);
    query
}

fn fold_utm_content(query: &mut Payload) {
    let Some(content) = query.remove(UTM_CONTENT) else {
        return;
    };
    if !content.is_truthy() {
        return;
    }
    let mut tags = query.tags();
    tags.extend(content.as_tags());
    query.set(TAGS, FieldValue::List(tags));
}
