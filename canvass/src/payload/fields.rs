//! Self-describing field-set documents.
//!
//! A [`FieldSet`] is the opaque structured payload carried by envelopes: a
//! map of named fields that preserves per-field identity, single-vs-multi
//! valuedness, and a type discriminant per field. Queries describe what they
//! are looking for with it; create/update notifications describe a node with
//! it.
//!
//! Fields come in three groups, matching their wire discriminant:
//!
//! - **properties** — string-typed columns, multi-valued
//! - **references** — URI-typed columns, multi-valued
//! - **flags** — named scalar command parameters
//!
//! plus the distinguished `about` URI and the `types` list.

use serde::{Deserialize, Serialize};
use std::collections::BTreeMap;

/// Wire type discriminant for a flag field.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Serialize, Deserialize)]
#[serde(rename_all = "kebab-case")]
pub enum WireType {
    /// Single boolean value.
    Boolean,
    /// Single text value.
    TextSingle,
    /// Multiple text values.
    ListMulti,
}

/// Definition of a flag: its wire name, type, and optional default.
///
/// Flags are declared as ordinary constants paired with this record; there
/// is no metaprogrammed enum carrying the metadata.
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub struct FlagDef {
    /// Field name on the wire.
    pub name: &'static str,
    /// Wire type discriminant.
    pub wire_type: WireType,
    /// Value used when the caller supplies none.
    pub default: Option<&'static str>,
}

/// Drop all stored data for a node before writing the new data.
pub const CLEAR_BEFORE_WRITE: FlagDef = FlagDef {
    name: "clear_node_before_write",
    wire_type: WireType::Boolean,
    default: Some("true"),
};

/// An opaque, self-describing structured document.
#[derive(Debug, Clone, Default, PartialEq, Serialize, Deserialize)]
pub struct FieldSet {
    /// URI of the node this document is about.
    #[serde(default, skip_serializing_if = "Option::is_none")]
    pub about: Option<String>,

    /// Type URIs of the node.
    #[serde(default, skip_serializing_if = "Vec::is_empty")]
    pub types: Vec<String>,

    /// String-typed columns.
    #[serde(default, skip_serializing_if = "BTreeMap::is_empty")]
    pub properties: BTreeMap<String, Vec<String>>,

    /// URI-typed columns.
    #[serde(default, skip_serializing_if = "BTreeMap::is_empty")]
    pub references: BTreeMap<String, Vec<String>>,

    /// Named scalar command parameters.
    #[serde(default, skip_serializing_if = "BTreeMap::is_empty")]
    pub flags: BTreeMap<String, serde_json::Value>,
}

impl FieldSet {
    /// An empty field set.
    pub fn new() -> Self {
        Self::default()
    }

    /// A field set about the given node URI.
    pub fn about(uri: impl Into<String>) -> Self {
        Self {
            about: Some(uri.into()),
            ..Self::default()
        }
    }

    /// Add one or more type URIs.
    pub fn add_type(&mut self, types: impl IntoIterator<Item = impl Into<String>>) -> &mut Self {
        self.types.extend(types.into_iter().map(Into::into));
        self
    }

    /// Append a value to a string-typed column.
    pub fn add_property(&mut self, key: impl Into<String>, value: impl Into<String>) -> &mut Self {
        self.properties
            .entry(key.into())
            .or_default()
            .push(value.into());
        self
    }

    /// Append a value to a URI-typed column.
    pub fn add_reference(&mut self, key: impl Into<String>, value: impl Into<String>) -> &mut Self {
        self.references
            .entry(key.into())
            .or_default()
            .push(value.into());
        self
    }

    /// Set a flag, falling back to the definition's default when no value is
    /// given. Flags with neither a value nor a default are skipped.
    pub fn add_flag(&mut self, flag: &FlagDef, value: Option<serde_json::Value>) -> &mut Self {
        let value = value.or_else(|| flag.default.map(|d| serde_json::Value::String(d.into())));
        if let Some(value) = value {
            self.flags.insert(flag.name.to_string(), value);
        }
        self
    }

    /// Look up a flag value by definition.
    pub fn flag(&self, flag: &FlagDef) -> Option<&serde_json::Value> {
        self.flags.get(flag.name)
    }

    /// Whether the field set carries no data at all.
    pub fn is_empty(&self) -> bool {
        self.about.is_none()
            && self.types.is_empty()
            && self.properties.is_empty()
            && self.references.is_empty()
            && self.flags.is_empty()
    }
}
