use {
    crate::state::AppState,
    axum::{
        response::IntoResponse,
        routing::get,
        Json,
        Router,
    },
    clap::crate_version,
    serde_json::json,
    std::sync::Arc,
};

pub mod messages;
pub mod ws;

async fn root() -> String {
    format!("Gavel Auction Server {}", crate_version!())
}

async fn health() -> impl IntoResponse {
    Json(json!({"status": "ok", "service": "auction-websocket"}))
}

pub fn routes(state: Arc<AppState>) -> Router {
    Router::new()
        .route("/", get(root))
        .route("/health", get(health))
        .route("/ws", get(ws::ws_route_handler))
        .with_state(state)
}
