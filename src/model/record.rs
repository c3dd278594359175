use crate::model::{EntityKind, Id};
use serde::{Deserialize, Serialize};
use serde_json::{Map, Value};
use std::collections::BTreeMap;

/// A stored entity as returned by a record store
#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
pub struct Record {
    pub id: Id,
    #[serde(rename = "type")]
    pub kind: EntityKind,
    /// Scalar fields declared by the catalog
    pub fields: Map<String, Value>,
    /// Link field (`activity_id`) to linked record id
    #[serde(default)]
    pub links: BTreeMap<String, Id>,
    /// Free-form key/value pairs supplied by the client
    #[serde(default)]
    pub additional_properties: Map<String, Value>,
}

/// Validated record content ready to be inserted; links are attached
/// afterwards with one call each
#[derive(Debug, Clone, PartialEq)]
pub struct NewRecord {
    pub kind: EntityKind,
    pub fields: Map<String, Value>,
    pub additional_properties: Map<String, Value>,
}

impl NewRecord {
    pub fn into_record(self, id: Id) -> Record {
        Record {
            id,
            kind: self.kind,
            fields: self.fields,
            links: BTreeMap::new(),
            additional_properties: self.additional_properties,
        }
    }
}

/// Request body for save and update
///
/// Scalar fields and link ids arrive flat, e.g.
/// `{"activity": "group", "experiment_id": 3, "additional_properties": {...}}`.
#[derive(Debug, Clone, Default, PartialEq, Serialize, Deserialize)]
pub struct EntityIn {
    #[serde(default)]
    pub additional_properties: Map<String, Value>,
    #[serde(flatten)]
    pub values: Map<String, Value>,
}

impl EntityIn {
    pub fn new() -> Self {
        Self::default()
    }

    pub fn with(mut self, key: &str, value: impl Into<Value>) -> Self {
        self.values.insert(key.to_string(), value.into());
        self
    }

    pub fn with_property(mut self, key: &str, value: impl Into<Value>) -> Self {
        self.additional_properties.insert(key.to_string(), value.into());
        self
    }
}

/// Body of a relationships update: link field to new target, `null` clears
pub type RelationshipsUpdate = BTreeMap<String, Option<Id>>;

/// Response shape for every entity type
///
/// Every declared field, link id and relation is present whether or not it
/// was populated, so the response stays schema-stable across depths.
#[derive(Debug, Clone, PartialEq, Serialize)]
pub struct EntityOut {
    pub id: Id,
    #[serde(flatten)]
    pub fields: Map<String, Value>,
    pub additional_properties: Map<String, Value>,
    #[serde(flatten)]
    pub relations: BTreeMap<String, RelationValue>,
}

#[derive(Debug, Clone, PartialEq, Serialize)]
#[serde(untagged)]
pub enum RelationValue {
    Many(Vec<EntityOut>),
    Single(Option<Box<EntityOut>>),
}

impl RelationValue {
    pub fn is_empty(&self) -> bool {
        match self {
            RelationValue::Many(items) => items.is_empty(),
            RelationValue::Single(item) => item.is_none(),
        }
    }

    pub fn as_many(&self) -> Option<&[EntityOut]> {
        match self {
            RelationValue::Many(items) => Some(items),
            RelationValue::Single(_) => None,
        }
    }

    pub fn as_single(&self) -> Option<&EntityOut> {
        match self {
            RelationValue::Single(item) => item.as_deref(),
            RelationValue::Many(_) => None,
        }
    }
}

impl EntityOut {
    pub fn relation(&self, field: &str) -> Option<&RelationValue> {
        self.relations.get(field)
    }
}
