//! Route table and middleware stack.

use super::{handlers, state::AppState};
use axum::{
    routing::{get, post},
    Router,
};
use tower_http::{cors::CorsLayer, trace::TraceLayer};

/// Creates the Axum router with all the application routes.
///
/// CORS is wide open: the expected callers are browser readers on
/// arbitrary origins, and nothing here is cookie-authenticated.
pub fn create_router(app_state: AppState) -> Router {
    Router::new()
        .route("/health", get(handlers::health_check))
        .route("/index", post(handlers::trigger_index_handler))
        .route("/detect", post(handlers::detect_page_handler))
        .route("/books/{book_id}/index", get(handlers::book_index_handler))
        .with_state(app_state)
        .layer(CorsLayer::permissive())
        .layer(TraceLayer::new_for_http())
}
