//! REST API over the graph store.

pub mod error;
pub mod handlers;

use std::sync::Arc;

use axum::{
    routing::{get, post, put},
    Router,
};
use tower::ServiceBuilder;
use tower_http::cors::{AllowOrigin, Any, CorsLayer};
use tower_http::trace::TraceLayer;

use crate::chat::Assistant;
use crate::config::Config;
use crate::db::Db;
use crate::error::{BizgraphError, Result};

pub use error::{ApiError, ApiResult};

/// Shared by every handler
#[derive(Clone)]
pub struct AppState {
    pub db: Db,
    pub config: Arc<Config>,
    pub assistant: Arc<Assistant>,
}

impl AppState {
    pub fn new(db: Db, config: Config) -> Result<Self> {
        let assistant = Assistant::new(&config.chat)?;
        Ok(Self {
            db,
            config: Arc::new(config),
            assistant: Arc::new(assistant),
        })
    }
}

fn cors_layer(allowed_origins: &[String]) -> CorsLayer {
    if allowed_origins.is_empty() {
        return CorsLayer::new()
            .allow_origin(Any)
            .allow_methods(Any)
            .allow_headers(Any);
    }
    let origins: Vec<axum::http::HeaderValue> = allowed_origins
        .iter()
        .filter_map(|o| match o.parse() {
            Ok(v) => Some(v),
            Err(_) => {
                log::warn!("Ignoring invalid allowed origin: {}", o);
                None
            }
        })
        .collect();
    CorsLayer::new()
        .allow_origin(AllowOrigin::list(origins))
        .allow_methods(Any)
        .allow_headers(Any)
}

pub fn create_router(state: AppState) -> Router {
    let cors = cors_layer(&state.config.http_server.allowed_origins);

    Router::new()
        .route("/", get(handlers::health))
        .route("/api/stats", get(handlers::stats))
        .route("/api/db/download", get(handlers::download_db))
        .route("/api/nodes", get(handlers::list_nodes).post(handlers::create_node))
        .route(
            "/api/nodes/:id",
            get(handlers::get_node)
                .put(handlers::update_node)
                .delete(handlers::delete_node),
        )
        .route("/api/nodes/:id/chat", post(handlers::node_chat))
        .route("/api/positions", get(handlers::get_positions))
        .route("/api/positions/:id", put(handlers::update_position))
        .route(
            "/api/relationships",
            get(handlers::list_relationships).post(handlers::create_relationship),
        )
        .route(
            "/api/relationships/:id",
            get(handlers::get_relationship)
                .put(handlers::update_relationship)
                .delete(handlers::delete_relationship),
        )
        .route(
            "/api/journeys",
            get(handlers::list_journeys).post(handlers::create_journey),
        )
        .route("/api/journeys/dict", get(handlers::journeys_dict))
        .route("/api/bulk/nodes", post(handlers::bulk_nodes))
        .route("/api/bulk/relationships", post(handlers::bulk_relationships))
        .route("/api/bulk/journeys", post(handlers::bulk_journeys))
        .route("/api/admin/reload", post(handlers::reload))
        .route("/api/admin/clear", post(handlers::clear))
        .route("/api/chat", post(handlers::graph_chat))
        .layer(
            ServiceBuilder::new()
                .layer(TraceLayer::new_for_http())
                .layer(cors),
        )
        .with_state(state)
}

/// Bind the configured address and serve until the process is stopped
pub async fn serve(state: AppState) -> Result<()> {
    let addr = format!("{}:{}", state.config.http_server.host, state.config.http_server.port);
    let app = create_router(state);

    let listener = tokio::net::TcpListener::bind(&addr).await.map_err(|e| {
        BizgraphError::Io(std::io::Error::new(
            e.kind(),
            format!("Failed to bind to {}: {}", addr, e),
        ))
    })?;
    log::info!("Business graph API listening on http://{}", addr);

    axum::serve(listener, app).await.map_err(|e| {
        BizgraphError::Io(std::io::Error::new(
            std::io::ErrorKind::Other,
            format!("HTTP server error: {}", e),
        ))
    })?;

    Ok(())
}
