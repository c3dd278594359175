use crate::model::Id;
use serde::{Deserialize, Serialize};

/// An ontology document held by the model registry
#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
pub struct OntologyModel {
    pub id: Id,
    pub document: serde_json::Value,
    pub created_at: String, // ISO 8601 timestamp
}

impl OntologyModel {
    pub fn new(id: Id, document: serde_json::Value) -> Self {
        Self {
            id,
            document,
            created_at: chrono::Utc::now().to_rfc3339(),
        }
    }
}
