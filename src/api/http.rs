use crate::config::Config;
use crate::error::{RelgraphError, Result};
use crate::graph::GraphAggregator;
use crate::images::ImageStore;
use crate::store::Store;
use axum::{
    extract::DefaultBodyLimit,
    http::{HeaderValue, StatusCode},
    response::{IntoResponse, Response},
    routing::{delete, get, post},
    Json, Router,
};
use std::sync::Arc;
use tower::ServiceBuilder;
use tower_http::cors::{AllowOrigin, Any, CorsLayer};
use tower_http::services::ServeDir;
use tower_http::trace::TraceLayer;

use super::handlers;

/// Headroom for the multipart envelope around an image at the size limit.
const MULTIPART_OVERHEAD: usize = 64 * 1024;

/// Check if a port is available by attempting to bind to it
async fn check_port_available(addr: &str) -> bool {
    tokio::net::TcpListener::bind(addr).await.is_ok()
}

/// Application state shared across handlers
#[derive(Clone)]
pub struct AppState {
    pub store: Store,
    pub images: Arc<ImageStore>,
    pub graph: Arc<GraphAggregator>,
}

impl AppState {
    pub fn new(store: Store, images: ImageStore, graph: GraphAggregator) -> Self {
        Self {
            store,
            images: Arc::new(images),
            graph: Arc::new(graph),
        }
    }
}

/// HTTP server for the graph and CRUD endpoints
pub struct ApiServer {
    state: AppState,
    allowed_origins: Vec<String>,
}

impl ApiServer {
    pub fn new(store: Store, config: &Config) -> Self {
        let state = AppState::new(
            store,
            ImageStore::new(config.images.clone()),
            GraphAggregator::new(config.graph.clone()),
        );
        Self {
            state,
            allowed_origins: config.server.allowed_origins.clone(),
        }
    }

    pub fn state(&self) -> &AppState {
        &self.state
    }

    /// Bind `host:port` and serve until the process is stopped
    pub async fn run(&self, host: &str, port: u16) -> Result<()> {
        let app = self.router();
        let addr = format!("{}:{}", host, port);

        if !check_port_available(&addr).await {
            return Err(RelgraphError::Config(format!(
                "Port {} is already in use on {}. Stop the other process or set server.port in config.toml",
                port, host
            )));
        }

        let listener = tokio::net::TcpListener::bind(&addr)
            .await
            .map_err(|e| RelgraphError::Io(std::io::Error::new(
                e.kind(),
                format!("Failed to bind to {}: {}", addr, e),
            )))?;

        log::info!("Serving relgraph on http://{}", addr);
        log::info!("Graph endpoint: http://{}/api/grafo", addr);

        axum::serve(listener, app)
            .await
            .map_err(|e| RelgraphError::Io(std::io::Error::new(
                std::io::ErrorKind::Other,
                format!("HTTP server error: {}", e),
            )))?;

        Ok(())
    }

    /// Create the axum router
    pub fn router(&self) -> Router {
        let images = self.state.images.config();
        let image_route = format!("/{}", images.url_prefix.trim_matches('/'));
        let body_limit = images.max_file_size + MULTIPART_OVERHEAD;

        // No origins configured: allow any (local use). Otherwise only the listed ones.
        let cors = if self.allowed_origins.is_empty() {
            CorsLayer::new()
                .allow_origin(Any)
                .allow_methods(Any)
                .allow_headers(Any)
        } else {
            let origins: Vec<HeaderValue> = self
                .allowed_origins
                .iter()
                .filter_map(|o| o.parse().ok())
                .collect();
            CorsLayer::new()
                .allow_origin(AllowOrigin::list(origins))
                .allow_methods(Any)
                .allow_headers(Any)
        };

        Router::new()
            .route("/health", get(handlers::health))
            .route("/debug", get(handlers::debug))
            .route("/api/grafo", get(handlers::graph))
            .route("/api/posiciones", get(handlers::get_positions).post(handlers::save_positions))
            .route("/api/grupos", get(handlers::get_groups).post(handlers::update_groups))
            .route("/api/imagenes", get(handlers::list_images))
            .route("/api/personas", get(handlers::list_persons).post(handlers::create_person))
            .route(
                "/api/personas/:id",
                get(handlers::get_person)
                    .put(handlers::update_person)
                    .delete(handlers::delete_person),
            )
            .route(
                "/api/personas/:id/imagen",
                post(handlers::upload_image).delete(handlers::delete_image),
            )
            .route(
                "/api/relaciones",
                get(handlers::list_relationships).post(handlers::create_relationship),
            )
            .route("/api/relaciones/:id", delete(handlers::delete_relationship))
            .nest_service(&image_route, ServeDir::new(&images.folder))
            .layer(DefaultBodyLimit::max(body_limit))
            .layer(
                ServiceBuilder::new()
                    .layer(TraceLayer::new_for_http())
                    .layer(cors),
            )
            .with_state(self.state.clone())
    }
}

impl IntoResponse for RelgraphError {
    fn into_response(self) -> Response {
        let status = match &self {
            RelgraphError::Validation(_)
            | RelgraphError::DuplicateName(_)
            | RelgraphError::DuplicateRelationship(..)
            | RelgraphError::ImageProcessing(_) => StatusCode::BAD_REQUEST,
            RelgraphError::NotFound(_) => StatusCode::NOT_FOUND,
            _ => StatusCode::INTERNAL_SERVER_ERROR,
        };

        if status.is_server_error() {
            log::error!("Request failed: {}", self);
        } else {
            log::debug!("Rejected request: {}", self);
        }

        (status, Json(serde_json::json!({ "error": self.to_string() }))).into_response()
    }
}
