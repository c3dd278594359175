use crate::model::{EntityKind, Id};

/// Failure of an entity service operation
#[derive(Debug, thiserror::Error)]
pub enum ServiceError {
    /// No record under this id, or the id belongs to another entity type
    #[error("Node not found: {kind} {id}")]
    NotFound { kind: EntityKind, id: Id },
    /// Input rejected before any write
    #[error("{0}")]
    Validation(String),
    /// The record store reported a failure
    #[error("{0:#}")]
    Store(#[from] anyhow::Error),
}

impl ServiceError {
    pub fn not_found(kind: EntityKind, id: Id) -> Self {
        ServiceError::NotFound { kind, id }
    }

    pub fn validation(message: impl Into<String>) -> Self {
        ServiceError::Validation(message.into())
    }
}
