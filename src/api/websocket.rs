//! WebSocket handler for the push channel

use axum::{
    extract::{
        State, WebSocketUpgrade,
        ws::{Message, WebSocket},
    },
    response::Response,
};
use futures::{SinkExt, future, stream::StreamExt};
use tracing::{debug, info};

use crate::api::state::ApiState;
use crate::broadcaster::{SessionInput, run_session};

/// WebSocket upgrade handler
///
/// GET /api/v1/stream
pub async fn websocket_handler(ws: WebSocketUpgrade, State(state): State<ApiState>) -> Response {
    ws.on_upgrade(|socket| handle_websocket(socket, state))
}

fn session_input(message: Result<Message, axum::Error>) -> Option<SessionInput> {
    match message {
        Ok(Message::Text(text)) => Some(SessionInput::Text(text)),
        Ok(Message::Close(_)) => Some(SessionInput::Close),
        // protocol level ping/pong is answered by axum
        Ok(_) => None,
        Err(e) => {
            debug!("WebSocket receive failed: {}", e);
            Some(SessionInput::Close)
        }
    }
}

async fn handle_websocket(socket: WebSocket, state: ApiState) {
    // subscribe before anything else so no update published after the upgrade is missed
    let updates = state.broadcaster.subscribe();
    info!(
        "push channel subscriber connected ({} total)",
        state.broadcaster.subscriber_count()
    );

    let (sender, receiver) = socket.split();
    let sink = sender.with(|text: String| future::ready(Ok::<_, axum::Error>(Message::Text(text))));
    let inbound = receiver.filter_map(|message| future::ready(session_input(message)));

    let stats = run_session(Box::pin(sink), Box::pin(inbound), updates).await;

    info!(
        "push channel subscriber disconnected (sent {} updates, {} pongs, dropped {})",
        stats.updates_sent, stats.pongs_sent, stats.updates_dropped
    );
}
