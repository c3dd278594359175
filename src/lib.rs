pub mod api;
pub mod config;
pub mod logic;
pub mod model;
pub mod store;

// Export API types
pub use api::handlers::{AppContext, AppState};
pub use api::routes::create_router;

// Export logic types
pub use logic::{EntityService, ServiceError, Services};

// Export all model types
pub use model::*;

// Export store types
pub use store::{
    GraphStore, InMemoryModelRegistry, MemoryStore, ModelRegistry, PostgresStore, RecordStore,
};

use std::sync::Arc;

/// Build the application router for a store
pub fn app<S: RecordStore + 'static>(
    store: Arc<S>,
    models: Arc<dyn ModelRegistry>,
    max_depth: u32,
) -> axum::Router {
    create_router::<S>().with_state(Arc::new(AppContext::new(store, models, max_depth)))
}

/// Serve the API for `store` on the configured address until shutdown
pub async fn serve<S: RecordStore + 'static>(
    store: Arc<S>,
    config: &config::AppConfig,
) -> anyhow::Result<()> {
    use tokio::net::TcpListener;

    let models: Arc<dyn ModelRegistry> = Arc::new(InMemoryModelRegistry::new());
    let router = app(store, models, config.expansion.max_depth);

    let bind_address = config.server_address();
    let listener = TcpListener::bind(&bind_address).await?;
    log::info!("GRISERA API running on http://{}", bind_address);

    axum::serve(listener, router).await?;

    Ok(())
}

/// Load configuration, open the configured backend and serve
pub async fn run_server() -> anyhow::Result<()> {
    use crate::config::{AppConfig, StoreBackend};

    // Load environment variables from .env file if it exists
    dotenvy::dotenv().ok();

    let config = AppConfig::load()?;
    log::info!(
        "Configuration loaded: server={} backend={}",
        config.server_address(),
        config.store.backend
    );

    match config.store.backend {
        StoreBackend::Postgres => {
            let database_url = config.database_url();
            let max_connections = config.database.max_connections.unwrap_or(20);
            let postgres_store = PostgresStore::new(&database_url, max_connections).await?;
            postgres_store.migrate().await?;
            serve(Arc::new(postgres_store), &config).await
        }
        StoreBackend::Graph => {
            let graph_store = GraphStore::new(&config.graph)?;
            log::info!("Using graph database at {}", config.graph.url);
            serve(Arc::new(graph_store), &config).await
        }
        StoreBackend::Memory => {
            log::warn!("Using in-memory store; data is lost on shutdown");
            serve(Arc::new(MemoryStore::new()), &config).await
        }
    }
}
