use anyhow::Result;
use parking_lot::{Mutex, RwLock};
use serde_json::{Map, Value};
use std::collections::BTreeMap;

use crate::model::{EntityKind, Id, LinkDef, NewRecord, Record};
use crate::store::traits::RecordStore;

/// One operation issued against a `MemoryStore`
#[derive(Debug, Clone, PartialEq, Eq)]
pub enum StoreCall {
    Fetch { kind: EntityKind, id: Id },
    List { kind: EntityKind },
    ListByLink { kind: EntityKind, link: &'static str, target_id: Id },
    Insert { kind: EntityKind },
    UpdateFields { kind: EntityKind, id: Id },
    Link { kind: EntityKind, id: Id, name: &'static str, target_id: Id },
    Unlink { kind: EntityKind, id: Id, name: &'static str },
    Delete { kind: EntityKind, id: Id },
}

impl StoreCall {
    pub fn is_write(&self) -> bool {
        !matches!(
            self,
            StoreCall::Fetch { .. } | StoreCall::List { .. } | StoreCall::ListByLink { .. }
        )
    }
}

#[derive(Debug)]
struct MemoryState {
    next_id: Id,
    // One id space across all types, like the graph backend
    records: BTreeMap<Id, Record>,
}

/// In-process store; also records every call it receives
#[derive(Debug)]
pub struct MemoryStore {
    state: RwLock<MemoryState>,
    calls: Mutex<Vec<StoreCall>>,
}

impl Default for MemoryStore {
    fn default() -> Self {
        Self::new()
    }
}

impl MemoryStore {
    pub fn new() -> Self {
        Self {
            state: RwLock::new(MemoryState {
                next_id: 1,
                records: BTreeMap::new(),
            }),
            calls: Mutex::new(Vec::new()),
        }
    }

    /// Calls received so far, oldest first
    pub fn calls(&self) -> Vec<StoreCall> {
        self.calls.lock().clone()
    }

    pub fn clear_calls(&self) {
        self.calls.lock().clear();
    }

    pub fn len(&self) -> usize {
        self.state.read().records.len()
    }

    pub fn is_empty(&self) -> bool {
        self.len() == 0
    }

    fn record_call(&self, call: StoreCall) {
        self.calls.lock().push(call);
    }
}

#[async_trait::async_trait]
impl RecordStore for MemoryStore {
    async fn fetch(&self, kind: EntityKind, id: Id) -> Result<Option<Record>> {
        self.record_call(StoreCall::Fetch { kind, id });
        Ok(self.state.read().records.get(&id).cloned())
    }

    async fn list(&self, kind: EntityKind) -> Result<Vec<Record>> {
        self.record_call(StoreCall::List { kind });
        let state = self.state.read();
        Ok(state
            .records
            .values()
            .filter(|r| r.kind == kind)
            .cloned()
            .collect())
    }

    async fn list_by_link(
        &self,
        kind: EntityKind,
        link: &'static LinkDef,
        target_id: Id,
    ) -> Result<Vec<Record>> {
        self.record_call(StoreCall::ListByLink {
            kind,
            link: link.field,
            target_id,
        });
        let state = self.state.read();
        Ok(state
            .records
            .values()
            .filter(|r| r.kind == kind && r.links.get(link.field) == Some(&target_id))
            .cloned()
            .collect())
    }

    async fn insert(&self, record: NewRecord) -> Result<Record> {
        self.record_call(StoreCall::Insert { kind: record.kind });
        let mut state = self.state.write();
        let id = state.next_id;
        state.next_id += 1;
        let record = record.into_record(id);
        state.records.insert(id, record.clone());
        Ok(record)
    }

    async fn update_fields(
        &self,
        kind: EntityKind,
        id: Id,
        fields: Map<String, Value>,
        additional_properties: Map<String, Value>,
    ) -> Result<bool> {
        self.record_call(StoreCall::UpdateFields { kind, id });
        let mut state = self.state.write();
        match state.records.get_mut(&id) {
            Some(record) if record.kind == kind => {
                record.fields = fields;
                record.additional_properties = additional_properties;
                Ok(true)
            }
            _ => Ok(false),
        }
    }

    async fn link(&self, kind: EntityKind, id: Id, link: &'static LinkDef, target_id: Id) -> Result<()> {
        self.record_call(StoreCall::Link {
            kind,
            id,
            name: link.name,
            target_id,
        });
        let mut state = self.state.write();
        if !state.records.contains_key(&target_id) {
            anyhow::bail!("Cannot create {}: record {} not found", link.name, target_id);
        }
        let record = state
            .records
            .get_mut(&id)
            .filter(|r| r.kind == kind)
            .ok_or_else(|| anyhow::anyhow!("Cannot create {}: record {} not found", link.name, id))?;
        record.links.insert(link.field.to_string(), target_id);
        Ok(())
    }

    async fn unlink(&self, kind: EntityKind, id: Id, link: &'static LinkDef) -> Result<()> {
        self.record_call(StoreCall::Unlink {
            kind,
            id,
            name: link.name,
        });
        let mut state = self.state.write();
        if let Some(record) = state.records.get_mut(&id).filter(|r| r.kind == kind) {
            record.links.remove(link.field);
        }
        Ok(())
    }

    async fn delete(&self, kind: EntityKind, id: Id) -> Result<bool> {
        self.record_call(StoreCall::Delete { kind, id });
        let mut state = self.state.write();
        let owned = state.records.get(&id).is_some_and(|r| r.kind == kind);
        if owned {
            state.records.remove(&id);
            // Links into the deleted record are cleared, like ON DELETE SET NULL
            for record in state.records.values_mut() {
                record.links.retain(|_, target| *target != id);
            }
        }
        Ok(owned)
    }
}
