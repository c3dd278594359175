use crate::model::{EntityKind, Id, LinkDef, NewRecord, OntologyModel, Record};
use anyhow::Result;
use serde_json::{Map, Value};

/// Record store adapter shared by the relational, graph and memory backends
#[async_trait::async_trait]
pub trait RecordStore: Send + Sync {
    /// Fetch the record stored under `id`.
    ///
    /// Backends with a single id space across types (graph, memory) return
    /// whatever record owns the id; callers must check `Record::kind`.
    async fn fetch(&self, kind: EntityKind, id: Id) -> Result<Option<Record>>;
    /// All records of a type, ordered by id
    async fn list(&self, kind: EntityKind) -> Result<Vec<Record>>;
    /// Records of `kind` whose `link` points at `target_id`, ordered by id
    async fn list_by_link(
        &self,
        kind: EntityKind,
        link: &'static LinkDef,
        target_id: Id,
    ) -> Result<Vec<Record>>;
    /// Insert a record without links and return it with its assigned id
    async fn insert(&self, record: NewRecord) -> Result<Record>;
    /// Replace scalar fields and additional properties; false if no such record
    async fn update_fields(
        &self,
        kind: EntityKind,
        id: Id,
        fields: Map<String, Value>,
        additional_properties: Map<String, Value>,
    ) -> Result<bool>;
    /// Point `link` of record `id` at `target_id`, replacing any previous target
    async fn link(&self, kind: EntityKind, id: Id, link: &'static LinkDef, target_id: Id) -> Result<()>;
    /// Clear `link` of record `id`
    async fn unlink(&self, kind: EntityKind, id: Id, link: &'static LinkDef) -> Result<()>;
    /// Delete one record; false if no such record
    async fn delete(&self, kind: EntityKind, id: Id) -> Result<bool>;
}

/// Registry of ontology documents keyed by incrementing id
#[async_trait::async_trait]
pub trait ModelRegistry: Send + Sync {
    async fn create(&self, document: Value) -> Result<OntologyModel>;
    async fn get(&self, id: Id) -> Result<Option<OntologyModel>>;
    /// Remove a model, returning it if it existed
    async fn delete(&self, id: Id) -> Result<Option<OntologyModel>>;
}
