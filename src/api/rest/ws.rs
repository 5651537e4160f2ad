use std::sync::Arc;

use axum::extract::ws::{Message, WebSocket, WebSocketUpgrade};
use axum::extract::{Query, State};
use axum::response::IntoResponse;
use futures::SinkExt;
use futures::StreamExt;
use serde::Deserialize;
use tokio_stream::wrappers::BroadcastStream;
use tracing::{info, warn};
use uuid::Uuid;

use crate::state::AppState;

/// `?unit_id=` narrows the feed to one unit's assignments.
#[derive(Deserialize)]
pub struct FeedQuery {
    pub unit_id: Option<Uuid>,
}

pub async fn ws_handler(
    ws: WebSocketUpgrade,
    State(state): State<Arc<AppState>>,
    Query(query): Query<FeedQuery>,
) -> impl IntoResponse {
    ws.on_upgrade(move |socket| handle_socket(socket, state, query.unit_id))
}

async fn handle_socket(socket: WebSocket, state: Arc<AppState>, unit_id: Option<Uuid>) {
    let (mut sender, mut receiver) = socket.split();
    let mut assignments = BroadcastStream::new(state.assignment_events_tx.subscribe());

    info!(unit_id = ?unit_id, "assignment feed connected");

    let send_task = tokio::spawn(async move {
        while let Some(event) = assignments.next().await {
            let assignment = match event {
                Ok(assignment) => assignment,
                Err(err) => {
                    warn!(error = %err, "assignment feed lagged");
                    continue;
                }
            };
            if unit_id.is_some_and(|id| id != assignment.unit_id) {
                continue;
            }

            let json = match serde_json::to_string(&assignment) {
                Ok(json) => json,
                Err(err) => {
                    warn!(error = %err, "failed to serialize assignment for ws");
                    continue;
                }
            };

            if sender.send(Message::Text(json)).await.is_err() {
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

    info!(unit_id = ?unit_id, "assignment feed disconnected");
}
