use std::sync::Arc;

use axum::extract::ws::{Message, WebSocket, WebSocketUpgrade};
use axum::extract::{Query, State};
use axum::response::IntoResponse;
use futures::SinkExt;
use futures::StreamExt;
use serde::Deserialize;
use tokio::sync::broadcast::error::RecvError;
use tracing::{info, warn};

use crate::models::qr::QrId;
use crate::models::tracking::TrackingView;
use crate::state::AppState;

#[derive(Deserialize)]
pub struct WatchQuery {
    pub qr_id: Option<QrId>,
}

pub async fn ws_handler(
    ws: WebSocketUpgrade,
    State(state): State<Arc<AppState>>,
    Query(query): Query<WatchQuery>,
) -> impl IntoResponse {
    ws.on_upgrade(move |socket| handle_socket(socket, state, query.qr_id))
}

/// Without a filter the viewer sees every code.
fn wanted(filter: Option<&QrId>, view: &TrackingView) -> bool {
    filter.is_none_or(|qr_id| *qr_id == view.qr_id)
}

async fn handle_socket(socket: WebSocket, state: Arc<AppState>, qr_id: Option<QrId>) {
    let (mut sender, mut receiver) = socket.split();
    let mut rx = state.tracking_events_tx.subscribe();

    info!(qr_id = ?qr_id, "tracking viewer connected");

    let send_task = tokio::spawn(async move {
        loop {
            let view = match rx.recv().await {
                Ok(view) => view,
                Err(RecvError::Lagged(skipped)) => {
                    warn!(skipped, "tracking viewer lagged behind");
                    continue;
                }
                Err(RecvError::Closed) => break,
            };

            if !wanted(qr_id.as_ref(), &view) {
                continue;
            }

            let json = match serde_json::to_string(&view) {
                Ok(json) => json,
                Err(err) => {
                    warn!(error = %err, "failed to serialize tracking view for ws");
                    continue;
                }
            };

            if sender.send(Message::Text(json.into())).await.is_err() {
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

    info!("tracking viewer disconnected");
}
