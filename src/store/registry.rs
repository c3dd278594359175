use anyhow::Result;
use parking_lot::Mutex;
use serde_json::Value;
use std::collections::BTreeMap;

use crate::model::{Id, OntologyModel};
use crate::store::traits::ModelRegistry;

#[derive(Debug)]
struct RegistryState {
    next_id: Id,
    models: BTreeMap<Id, OntologyModel>,
}

/// Ontology models kept in memory for the lifetime of the process
#[derive(Debug)]
pub struct InMemoryModelRegistry {
    state: Mutex<RegistryState>,
}

impl Default for InMemoryModelRegistry {
    fn default() -> Self {
        Self::new()
    }
}

impl InMemoryModelRegistry {
    pub fn new() -> Self {
        Self {
            state: Mutex::new(RegistryState {
                next_id: 1,
                models: BTreeMap::new(),
            }),
        }
    }
}

#[async_trait::async_trait]
impl ModelRegistry for InMemoryModelRegistry {
    async fn create(&self, document: Value) -> Result<OntologyModel> {
        let mut state = self.state.lock();
        let id = state.next_id;
        state.next_id += 1;
        let model = OntologyModel::new(id, document);
        state.models.insert(id, model.clone());
        Ok(model)
    }

    async fn get(&self, id: Id) -> Result<Option<OntologyModel>> {
        Ok(self.state.lock().models.get(&id).cloned())
    }

    async fn delete(&self, id: Id) -> Result<Option<OntologyModel>> {
        Ok(self.state.lock().models.remove(&id))
    }
}
