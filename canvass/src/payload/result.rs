//! Results of a request/response exchange.

use crate::payload::fields::FieldSet;
use serde::{Deserialize, Serialize};
use std::collections::{BTreeMap, BTreeSet};

/// Identity of a responding peer: a display name and a locator URI that can
/// be used to reach that peer directly later.
#[derive(Debug, Clone, PartialEq, Eq, PartialOrd, Ord, Serialize, Deserialize)]
pub struct SourceRef {
    /// Human-readable peer name.
    pub name: String,
    /// URI for addressing the peer directly.
    pub locator: String,
}

impl SourceRef {
    /// Build a source reference.
    pub fn new(name: impl Into<String>, locator: impl Into<String>) -> Self {
        Self {
            name: name.into(),
            locator: locator.into(),
        }
    }
}

/// One decoded result record.
#[derive(Debug, Clone, Default, PartialEq, Serialize, Deserialize)]
pub struct ResultPayload {
    /// URI of the node this result is about.
    pub about: String,

    /// Type URIs of the node.
    #[serde(default, skip_serializing_if = "Vec::is_empty")]
    pub types: Vec<String>,

    /// Additional columns, keyed by field name.
    #[serde(default, skip_serializing_if = "BTreeMap::is_empty")]
    pub columns: BTreeMap<String, Vec<String>>,

    /// Named scalar annotations.
    #[serde(default, skip_serializing_if = "BTreeMap::is_empty")]
    pub flags: BTreeMap<String, serde_json::Value>,
}

impl ResultPayload {
    /// A result about `uri` with the given type URIs.
    pub fn new(uri: impl Into<String>, types: impl IntoIterator<Item = impl Into<String>>) -> Self {
        Self {
            about: uri.into(),
            types: types.into_iter().map(Into::into).collect(),
            columns: BTreeMap::new(),
            flags: BTreeMap::new(),
        }
    }

    /// Append a column value.
    pub fn add_column(&mut self, key: impl Into<String>, value: impl Into<String>) -> &mut Self {
        self.columns
            .entry(key.into())
            .or_default()
            .push(value.into());
        self
    }

    /// Re-express this result as a field-set document, for republishing it
    /// as an individual create/update notification.
    pub fn to_field_set(&self) -> FieldSet {
        let mut fields = FieldSet::about(self.about.clone());
        fields.add_type(self.types.iter().cloned());
        for (key, values) in &self.columns {
            for value in values {
                fields.add_property(key.clone(), value.clone());
            }
        }
        fields
    }
}

/// Ordered aggregate of result records plus responder provenance.
///
/// Results keep arrival order; provenance is the set of `(name, locator)`
/// pairs contributed by responders that identified themselves.
#[derive(Debug, Clone, Default, PartialEq, Serialize, Deserialize)]
pub struct ResultCollection {
    /// Result records in arrival order.
    #[serde(default)]
    pub results: Vec<ResultPayload>,

    /// Responder provenance.
    #[serde(default, skip_serializing_if = "BTreeSet::is_empty")]
    pub sources: BTreeSet<SourceRef>,
}

impl ResultCollection {
    /// An empty collection.
    pub fn new() -> Self {
        Self::default()
    }

    /// Append a single result.
    pub fn append(&mut self, result: ResultPayload) -> &mut Self {
        self.results.push(result);
        self
    }

    /// Absorb another collection: results appended in order, provenance
    /// merged.
    pub fn extend_from(&mut self, other: ResultCollection) {
        self.results.extend(other.results);
        self.sources.extend(other.sources);
    }

    /// Record a responder's identity.
    pub fn add_source(&mut self, source: SourceRef) {
        self.sources.insert(source);
    }

    /// Number of result records.
    pub fn len(&self) -> usize {
        self.results.len()
    }

    /// Whether the collection holds no results.
    pub fn is_empty(&self) -> bool {
        self.results.is_empty()
    }

    /// Iterate the result records in arrival order.
    pub fn iter(&self) -> impl Iterator<Item = &ResultPayload> {
        self.results.iter()
    }
}

impl FromIterator<ResultPayload> for ResultCollection {
    fn from_iter<I: IntoIterator<Item = ResultPayload>>(iter: I) -> Self {
        Self {
            results: iter.into_iter().collect(),
            sources: BTreeSet::new(),
        }
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn test_extend_keeps_arrival_order() {
        let mut collection = ResultCollection::new();
        collection.append(ResultPayload::new("urn:a", ["urn:type:x"]));

        let mut late = ResultCollection::new();
        late.append(ResultPayload::new("urn:b", ["urn:type:x"]));
        late.add_source(SourceRef::new("peer-2", "urn:peer:2"));

        collection.extend_from(late);

        let about: Vec<_> = collection.iter().map(|r| r.about.as_str()).collect();
        assert_eq!(about, vec!["urn:a", "urn:b"]);
        assert!(collection
            .sources
            .contains(&SourceRef::new("peer-2", "urn:peer:2")));
    }

    #[test]
    fn test_provenance_deduplicates() {
        let mut collection = ResultCollection::new();
        collection.add_source(SourceRef::new("peer", "urn:peer:1"));
        collection.add_source(SourceRef::new("peer", "urn:peer:1"));
        assert_eq!(collection.sources.len(), 1);
    }

    #[test]
    fn test_result_to_field_set() {
        let mut result = ResultPayload::new("urn:a", ["urn:type:x"]);
        result.add_column("urn:col", "v1");

        let fields = result.to_field_set();
        assert_eq!(fields.about.as_deref(), Some("urn:a"));
        assert_eq!(fields.types, vec!["urn:type:x"]);
        assert_eq!(fields.properties["urn:col"], vec!["v1"]);
    }
}
