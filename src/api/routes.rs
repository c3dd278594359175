use axum::{
    routing::{get, post, put},
    Router,
};
use tower::ServiceBuilder;
use tower_http::cors::CorsLayer;

use crate::api::handlers::{self, AppState};
use crate::store::traits::RecordStore;

pub fn create_router<S: RecordStore + 'static>() -> Router<AppState<S>> {
    Router::new()
        // Health check
        .route("/health", get(handlers::health_check))
        // Ontology models
        .route("/ontology/models", post(handlers::create_model::<S>))
        .route(
            "/ontology/models/:id",
            get(handlers::get_model::<S>).delete(handlers::delete_model::<S>),
        )
        // Entity collections: /participants, /activities, /measure_names, ...
        .route(
            "/:collection",
            get(handlers::list_entities::<S>).post(handlers::create_entity::<S>),
        )
        .route(
            "/:collection/:id",
            get(handlers::get_entity::<S>)
                .put(handlers::update_entity::<S>)
                .delete(handlers::delete_entity::<S>),
        )
        .route(
            "/:collection/:id/relationships",
            put(handlers::update_relationships::<S>),
        )
        .layer(ServiceBuilder::new().layer(CorsLayer::permissive()))
}
