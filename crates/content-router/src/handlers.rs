//! HTTP and WebSocket endpoints

use crate::config::AppState;
use crate::models::{HistoryReply, Identifier};
use crate::stats::StatsSnapshot;
use crate::transport::ws::serve_peer;
use axum::{
    extract::{ws::WebSocketUpgrade, Path, State},
    http::StatusCode,
    response::{IntoResponse, Json},
    routing::get,
    Router,
};
use serde::Serialize;
use tracing::{error, info};

pub fn router(state: AppState) -> Router {
    Router::new()
        .route("/health", get(health_check))
        .route("/history", get(get_history))
        .route("/stats", get(get_stats))
        .route("/ws/{client_id}", get(ws_connect))
        .with_state(state)
        .layer(tower_http::cors::CorsLayer::permissive())
        .layer(tower_http::trace::TraceLayer::new_for_http())
}

async fn health_check() -> &'static str {
    "OK - Content Router"
}

/// GET /history
async fn get_history(State(state): State<AppState>) -> Result<Json<HistoryReply>, StatusCode> {
    let threads = state.router.get_all_messages().await.map_err(|e| {
        error!("Failed to read history: {}", e);
        StatusCode::INTERNAL_SERVER_ERROR
    })?;
    Ok(Json(HistoryReply::new(threads)))
}

#[derive(Serialize)]
struct StatsResponse {
    channel: String,
    subscribers: usize,
    peers: Vec<Identifier>,
    #[serde(flatten)]
    routing: StatsSnapshot,
}

/// GET /stats
async fn get_stats(State(state): State<AppState>) -> Json<StatsResponse> {
    Json(StatsResponse {
        channel: state.router.channel().to_string(),
        subscribers: state.router.subscriber_count(),
        peers: state.hub.connected(),
        routing: state.router.stats(),
    })
}

/// GET /ws/:client_id
async fn ws_connect(
    ws: WebSocketUpgrade,
    Path(client_id): Path<String>,
    State(state): State<AppState>,
) -> impl IntoResponse {
    info!("WebSocket upgrade for {}", client_id);
    let hub = state.hub.clone();
    ws.on_upgrade(move |socket| serve_peer(socket, Identifier::from(client_id), hub))
}
