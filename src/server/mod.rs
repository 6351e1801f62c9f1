/// HTTP API for the vault.
///
/// The server is a thin layer over the core: handlers authenticate the
/// caller, fetch rows through the `Store` trait, invoke the envelope
/// operations and map errors to status codes. Plaintext exists in a
/// handler only between decrypt and response serialization.
pub mod auth;
pub mod routes;

use std::sync::Arc;

use axum::Router;
use tower_http::compression::CompressionLayer;
use tower_http::cors::{Any, CorsLayer};
use tower_http::trace::TraceLayer;

use crate::state::Store;

/// Shared application state available to all handlers.
#[derive(Clone)]
pub struct AppState {
    /// Persistence backend.
    pub store: Arc<dyn Store>,
}

/// Build the Axum application with all routes and middleware.
pub fn build_app(state: AppState) -> Router {
    let cors = CorsLayer::new()
        .allow_origin(Any)
        .allow_methods(Any)
        .allow_headers(Any);

    Router::new()
        .merge(routes::vault_routes())
        .merge(routes::secret_routes())
        .with_state(Arc::new(state))
        .layer(CompressionLayer::new())
        .layer(cors)
        .layer(TraceLayer::new_for_http())
}

/// Start the API server.
pub async fn serve(state: AppState, addr: &str) -> crate::error::Result<()> {
    let app = build_app(state);

    let listener = tokio::net::TcpListener::bind(addr)
        .await
        .map_err(crate::error::VaultError::Io)?;

    tracing::info!("vault API server listening on {addr}");

    axum::serve(listener, app)
        .await
        .map_err(crate::error::VaultError::Io)?;

    Ok(())
}
