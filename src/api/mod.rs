//! HTTP API server for the voice gateway

pub mod health;
pub mod stream;

use std::sync::Arc;
use std::time::Instant;

use axum::routing::get;
use axum::Router;
use tokio::net::TcpListener;
use tower_http::cors::{Any, CorsLayer};
use tower_http::trace::TraceLayer;

use crate::call::CallRegistry;
use crate::crm::CrmClient;
use crate::{Config, Result};

/// Shared state for API handlers
#[derive(Clone)]
pub struct ApiState {
    pub config: Arc<Config>,
    pub registry: CallRegistry,
    pub crm: CrmClient,
    pub started_at: Instant,
}

impl ApiState {
    #[must_use]
    pub fn new(config: Config) -> Self {
        let crm = CrmClient::new(&config.crm);
        Self {
            config: Arc::new(config),
            registry: CallRegistry::new(),
            crm,
            started_at: Instant::now(),
        }
    }
}

/// Assemble the gateway router
pub fn router(state: ApiState) -> Router {
    let cors = CorsLayer::new()
        .allow_origin(Any)
        .allow_methods(Any)
        .allow_headers(Any);

    Router::new()
        .route("/health", get(health::health))
        .route("/media-stream", get(stream::media_stream))
        .with_state(state)
        .layer(cors)
        .layer(TraceLayer::new_for_http())
}

/// Serve the API until the process shuts down
///
/// # Errors
///
/// Returns an error when the server fails to accept connections.
pub async fn serve(listener: TcpListener, state: ApiState) -> Result<()> {
    axum::serve(listener, router(state)).await?;
    Ok(())
}
