use crate::fanout::ConnectionHub;
use crate::relay::Relay;
use crate::session::SessionHandler;
use axum::{
    extract::{
        ws::{WebSocket, WebSocketUpgrade},
        State,
    },
    response::Response,
    routing::get,
    Router,
};
use std::sync::Arc;
use tracing::debug;

/// Shared application state for WebSocket handler
#[derive(Clone)]
pub struct WsAppState {
    pub relay: Arc<Relay>,
    pub hub: Arc<ConnectionHub>,
}

/// GET {ws_path} - WebSocket upgrade handler
pub async fn ws_handler(ws: WebSocketUpgrade, State(state): State<Arc<WsAppState>>) -> Response {
    debug!("WebSocket upgrade request received");
    ws.on_upgrade(|socket| handle_socket(socket, state))
}

/// Create WebSocket router serving upgrades at `path`
pub fn create_ws_router(state: Arc<WsAppState>, path: &str) -> Router {
    Router::new()
        .route(path, get(ws_handler))
        .with_state(state)
}

/// Handle WebSocket connection
async fn handle_socket(socket: WebSocket, state: Arc<WsAppState>) {
    let (connection, outbound) = state.hub.register();

    SessionHandler::new(connection, Arc::clone(&state.relay))
        .handle(socket, outbound)
        .await;

    state.hub.unregister(connection);
}
