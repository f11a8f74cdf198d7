use std::sync::Arc;

use axum::extract::ws::{Message, WebSocket, WebSocketUpgrade};
use axum::extract::State;
use axum::response::IntoResponse;
use futures::SinkExt;
use futures::StreamExt;
use tokio_stream::wrappers::BroadcastStream;
use tracing::{debug, info, warn};

use crate::models::location::TrackingStatus;
use crate::state::AppState;

pub async fn ws_handler(
    ws: WebSocketUpgrade,
    State(state): State<Arc<AppState>>,
) -> impl IntoResponse {
    ws.on_upgrade(|socket| handle_socket(socket, state))
}

async fn handle_socket(socket: WebSocket, state: Arc<AppState>) {
    let (mut sender, mut receiver) = socket.split();
    // subscribe before the snapshot so no change slips between them
    let mut updates = BroadcastStream::new(state.tracker.subscribe());
    let snapshot = state.tracker.status();

    info!("websocket client connected");

    let send_task = tokio::spawn(async move {
        if !send_status(&mut sender, &snapshot).await {
            return;
        }

        while let Some(update) = updates.next().await {
            let status = match update {
                Ok(status) => status,
                Err(err) => {
                    debug!(error = %err, "websocket client lagged behind tracking updates");
                    continue;
                }
            };

            if !send_status(&mut sender, &status).await {
                break;
            }
        }
    });

    let recv_task = tokio::spawn(async move {
        while let Some(Ok(_msg)) = receiver.next().await {}
    });

    tokio::select! {
        _ = send_task => {},
        _ = recv_task => {},
    }

    info!("websocket client disconnected");
}

async fn send_status<S>(sender: &mut S, status: &TrackingStatus) -> bool
where
    S: futures::Sink<Message> + Unpin,
{
    let json = match serde_json::to_string(status) {
        Ok(json) => json,
        Err(err) => {
            warn!(error = %err, "failed to serialize tracking status for ws");
            return true;
        }
    };

    sender.send(Message::Text(json)).await.is_ok()
}
