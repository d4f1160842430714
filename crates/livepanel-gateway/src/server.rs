//! Axum routes served by the worker.

use std::sync::atomic::Ordering;
use std::sync::Arc;

use axum::{
    extract::{State, WebSocketUpgrade},
    response::IntoResponse,
    routing::get,
    Router,
};
use serde_json::json;
use tokio::sync::mpsc;
use tokio_util::sync::CancellationToken;
use tower_http::trace::TraceLayer;

use crate::connection::handle_ws_connection;
use crate::events::{WorkerEvent, WorkerStats};
use crate::SessionBridge;

/// State shared by every route handler.
pub struct ServerState {
    pub events: mpsc::UnboundedSender<WorkerEvent>,
    pub cancel: CancellationToken,
    pub bridge: Arc<dyn SessionBridge>,
    pub stats: Arc<WorkerStats>,
}

pub fn router(state: Arc<ServerState>) -> Router {
    Router::new()
        .route("/ws", get(ws_handler))
        .route("/health", get(health_handler))
        .layer(TraceLayer::new_for_http())
        .with_state(state)
}

async fn ws_handler(
    ws: WebSocketUpgrade,
    State(state): State<Arc<ServerState>>,
) -> impl IntoResponse {
    ws.on_upgrade(move |socket| handle_ws_connection(state, socket))
}

async fn health_handler(State(state): State<Arc<ServerState>>) -> impl IntoResponse {
    axum::Json(json!({
        "status": "ok",
        "version": env!("CARGO_PKG_VERSION"),
        "connections": state.stats.connections.load(Ordering::SeqCst),
        "items": state.bridge.item_count(),
    }))
}
