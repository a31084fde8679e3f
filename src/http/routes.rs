use super::handlers;
use super::state::AppState;
use axum::{
    routing::{get, post},
    Router,
};
use tower_http::cors::CorsLayer;
use tower_http::trace::TraceLayer;

/// Create the HTTP router with all routes
pub fn create_router(state: AppState) -> Router {
    Router::new()
        // Health check
        .route("/health", get(handlers::health_check))
        // Realtime session setup
        .route("/api/realtime/token", post(handlers::create_token))
        .route("/api/realtime", post(handlers::exchange_sdp))
        // Generation
        .route("/api/compile-prompt", post(handlers::compile_prompt))
        .route("/api/generate-image", post(handlers::generate_image))
        // Add tracing middleware for request logging
        .layer(TraceLayer::new_for_http())
        .layer(CorsLayer::permissive())
        .with_state(state)
}
