use axum::{
    extract::{
        rejection::{JsonRejection, PathRejection, QueryRejection},
        Path, Query, State,
    },
    http::StatusCode,
    response::Json,
    Json as RequestJson,
};
use serde::Serialize;
use std::sync::Arc;

use crate::logic::{ServiceError, Services};
use crate::model::{
    EntityIn, EntityKind, EntityOut, ExpandQuery, Id, OntologyModel, RelationshipsUpdate,
};
use crate::store::traits::{ModelRegistry, RecordStore};

/// Shared state handed to every handler
pub struct AppContext<S: RecordStore> {
    pub services: Services<S>,
    pub models: Arc<dyn ModelRegistry>,
    /// Upper bound for the `depth` query parameter
    pub max_depth: u32,
}

impl<S: RecordStore> AppContext<S> {
    pub fn new(store: Arc<S>, models: Arc<dyn ModelRegistry>, max_depth: u32) -> Self {
        Self {
            services: Services::new(store),
            models,
            max_depth,
        }
    }
}

pub type AppState<S> = Arc<AppContext<S>>;

type ApiError = (StatusCode, Json<ErrorResponse>);

/// Simple health check endpoint
#[derive(Debug, Serialize)]
pub struct HealthResponse {
    pub status: String,
    pub timestamp: String,
}

pub async fn health_check() -> Json<HealthResponse> {
    Json(HealthResponse {
        status: "healthy".to_string(),
        timestamp: chrono::Utc::now().to_rfc3339(),
    })
}

#[derive(Debug, Serialize)]
pub struct ListResponse<T> {
    pub items: Vec<T>,
    pub total: usize,
}

#[derive(Debug, Serialize)]
pub struct ErrorResponse {
    pub errors: String,
}

impl ErrorResponse {
    pub fn new(message: &str) -> Self {
        Self {
            errors: message.to_string(),
        }
    }
}

fn error(status: StatusCode, message: &str) -> ApiError {
    (status, Json(ErrorResponse::new(message)))
}

fn service_error(e: ServiceError) -> ApiError {
    let message = e.to_string();
    match e {
        ServiceError::NotFound { .. } => error(StatusCode::NOT_FOUND, &message),
        ServiceError::Validation(_) => error(StatusCode::UNPROCESSABLE_ENTITY, &message),
        ServiceError::Store(_) => {
            log::warn!("Store failure: {}", message);
            error(StatusCode::UNPROCESSABLE_ENTITY, &message)
        }
    }
}

// Malformed paths, query strings and bodies keep axum's status but get the
// same `{"errors": ...}` body as every other failure
fn bad_path(rejection: PathRejection) -> ApiError {
    error(rejection.status(), &rejection.body_text())
}

fn bad_query(rejection: QueryRejection) -> ApiError {
    error(rejection.status(), &rejection.body_text())
}

fn bad_body(rejection: JsonRejection) -> ApiError {
    error(rejection.status(), &rejection.body_text())
}

fn resolve_collection(collection: &str) -> Result<EntityKind, ApiError> {
    EntityKind::from_collection(collection).ok_or_else(|| {
        error(
            StatusCode::NOT_FOUND,
            &format!("Unknown collection: {}", collection),
        )
    })
}

fn resolve_source(source: Option<&str>) -> Result<Option<EntityKind>, ApiError> {
    match source {
        None | Some("") => Ok(None),
        Some(name) => name
            .parse::<EntityKind>()
            .map(Some)
            .map_err(|e| error(StatusCode::UNPROCESSABLE_ENTITY, &e)),
    }
}

// Entity endpoints

pub async fn list_entities<S: RecordStore>(
    State(ctx): State<AppState<S>>,
    path: Result<Path<String>, PathRejection>,
) -> Result<Json<ListResponse<EntityOut>>, ApiError> {
    let Path(collection) = path.map_err(bad_path)?;
    let kind = resolve_collection(&collection)?;
    let items = ctx
        .services
        .service(kind)
        .get_all()
        .await
        .map_err(service_error)?;

    Ok(Json(ListResponse {
        total: items.len(),
        items,
    }))
}

pub async fn create_entity<S: RecordStore>(
    State(ctx): State<AppState<S>>,
    path: Result<Path<String>, PathRejection>,
    body: Result<RequestJson<EntityIn>, JsonRejection>,
) -> Result<Json<EntityOut>, ApiError> {
    let Path(collection) = path.map_err(bad_path)?;
    let kind = resolve_collection(&collection)?;
    let RequestJson(input) = body.map_err(bad_body)?;
    match ctx.services.service(kind).save(input).await {
        Ok(entity) => Ok(Json(entity)),
        Err(e) => Err(service_error(e)),
    }
}

pub async fn get_entity<S: RecordStore>(
    State(ctx): State<AppState<S>>,
    path: Result<Path<(String, Id)>, PathRejection>,
    query: Result<Query<ExpandQuery>, QueryRejection>,
) -> Result<Json<EntityOut>, ApiError> {
    let Path((collection, id)) = path.map_err(bad_path)?;
    let kind = resolve_collection(&collection)?;
    let Query(query) = query.map_err(bad_query)?;
    let source = resolve_source(query.source.as_deref())?;

    let requested = query.depth.unwrap_or(0);
    let depth = requested.min(ctx.max_depth);
    if depth < requested {
        log::debug!("Clamped depth {} to {}", requested, depth);
    }

    match ctx.services.service(kind).get(id, depth, source).await {
        Ok(entity) => Ok(Json(entity)),
        Err(e) => Err(service_error(e)),
    }
}

pub async fn update_entity<S: RecordStore>(
    State(ctx): State<AppState<S>>,
    path: Result<Path<(String, Id)>, PathRejection>,
    body: Result<RequestJson<EntityIn>, JsonRejection>,
) -> Result<Json<EntityOut>, ApiError> {
    let Path((collection, id)) = path.map_err(bad_path)?;
    let kind = resolve_collection(&collection)?;
    let RequestJson(input) = body.map_err(bad_body)?;
    match ctx.services.service(kind).update(id, input).await {
        Ok(entity) => Ok(Json(entity)),
        Err(e) => Err(service_error(e)),
    }
}

pub async fn update_relationships<S: RecordStore>(
    State(ctx): State<AppState<S>>,
    path: Result<Path<(String, Id)>, PathRejection>,
    body: Result<RequestJson<RelationshipsUpdate>, JsonRejection>,
) -> Result<Json<EntityOut>, ApiError> {
    let Path((collection, id)) = path.map_err(bad_path)?;
    let kind = resolve_collection(&collection)?;
    let RequestJson(update) = body.map_err(bad_body)?;
    match ctx
        .services
        .service(kind)
        .update_relationships(id, update)
        .await
    {
        Ok(entity) => Ok(Json(entity)),
        Err(e) => Err(service_error(e)),
    }
}

pub async fn delete_entity<S: RecordStore>(
    State(ctx): State<AppState<S>>,
    path: Result<Path<(String, Id)>, PathRejection>,
) -> Result<Json<EntityOut>, ApiError> {
    let Path((collection, id)) = path.map_err(bad_path)?;
    let kind = resolve_collection(&collection)?;
    match ctx.services.service(kind).delete(id).await {
        Ok(entity) => Ok(Json(entity)),
        Err(e) => Err(service_error(e)),
    }
}

// Ontology model endpoints

pub async fn create_model<S: RecordStore>(
    State(ctx): State<AppState<S>>,
    body: Result<RequestJson<serde_json::Value>, JsonRejection>,
) -> Result<Json<OntologyModel>, ApiError> {
    let RequestJson(document) = body.map_err(bad_body)?;
    match ctx.models.create(document).await {
        Ok(model) => {
            log::info!("Created ontology model {}", model.id);
            Ok(Json(model))
        }
        Err(e) => Err(service_error(ServiceError::Store(e))),
    }
}

pub async fn get_model<S: RecordStore>(
    State(ctx): State<AppState<S>>,
    path: Result<Path<Id>, PathRejection>,
) -> Result<Json<OntologyModel>, ApiError> {
    let Path(id) = path.map_err(bad_path)?;
    match ctx.models.get(id).await {
        Ok(Some(model)) => Ok(Json(model)),
        Ok(None) => Err(error(
            StatusCode::NOT_FOUND,
            &format!("Model not found: {}", id),
        )),
        Err(e) => Err(service_error(ServiceError::Store(e))),
    }
}

pub async fn delete_model<S: RecordStore>(
    State(ctx): State<AppState<S>>,
    path: Result<Path<Id>, PathRejection>,
) -> Result<Json<OntologyModel>, ApiError> {
    let Path(id) = path.map_err(bad_path)?;
    match ctx.models.delete(id).await {
        Ok(Some(model)) => {
            log::info!("Deleted ontology model {}", id);
            Ok(Json(model))
        }
        Ok(None) => Err(error(
            StatusCode::NOT_FOUND,
            &format!("Model not found: {}", id),
        )),
        Err(e) => Err(service_error(ServiceError::Store(e))),
    }
}
