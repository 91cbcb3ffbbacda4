pub mod search;
pub mod ws;

use axum::{Router, routing::get};
use tower_http::{
    compression::CompressionLayer,
    cors::{Any, CorsLayer},
    trace::TraceLayer,
};

use crate::state::AppState;

pub fn build_router(state: AppState) -> Router {
    let api = Router::new()
        .route("/health", get(health))
        .route(
            "/search",
            get(search::current_search)
                .post(search::submit_search)
                .delete(search::cancel_search),
        );

    // CORS: in production, restrict `allow_origin` to your domain
    let cors = CorsLayer::new()
        .allow_origin(Any)
        .allow_methods(Any)
        .allow_headers(Any);

    Router::new()
        // WebSocket endpoint (outside /api)
        .route("/ws", get(ws::ws_handler))
        .nest("/api", api)
        .layer(cors)
        .layer(CompressionLayer::new())
        .layer(TraceLayer::new_for_http())
        .with_state(state)
}

/// GET /api/health
async fn health() -> &'static str {
    "ok"
}
