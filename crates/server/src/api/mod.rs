pub mod handle;
pub mod health;

use std::sync::Arc;

use axum::Router;
use axum::routing::{get, post};
use tower_http::trace::TraceLayer;

use rowgate_gateway::Dispatcher;

/// Shared application state passed to all handlers.
#[derive(Clone)]
pub struct AppState {
    pub dispatcher: Arc<Dispatcher>,
}

/// Build the router: batch requests are posted to `/`.
pub fn router(state: AppState) -> Router {
    Router::new()
        .route("/", post(handle::handle))
        .route("/health", get(health::health))
        .with_state(state)
        .layer(TraceLayer::new_for_http())
}
