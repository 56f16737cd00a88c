// =============================================================================
// WebSocket Handler — Push-based report updates
// =============================================================================
//
// Clients connect to `/api/v1/ws?token=<token>` and receive:
//   1. The latest report immediately on connect.
//   2. The latest report again, checked every 500 ms, whenever the
//      state_version has moved since the last push.
//
// Ping frames are answered with Pong. Text and binary frames are ignored.
// =============================================================================

use std::sync::atomic::Ordering;
use std::sync::Arc;

use axum::{
    extract::{
        ws::{Message, WebSocket},
        Query, State, WebSocketUpgrade,
    },
    http::StatusCode,
    response::IntoResponse,
};
use futures_util::{Sink, SinkExt, StreamExt};
use serde::{Deserialize, Serialize};
use tokio::time::{interval, Duration};
use tracing::{debug, info, warn};

use crate::api::auth::validate_token;
use crate::app_state::AppState;
use crate::engine::EvaluationReport;

const PUSH_INTERVAL_MS: u64 = 500;

#[derive(Deserialize)]
pub struct WsQuery {
    token: Option<String>,
}

/// One outbound frame.
#[derive(Serialize)]
struct WsPush<'a> {
    sequence: u64,
    state_version: u64,
    server_time: i64,
    report: Option<&'a EvaluationReport>,
}

/// Validates the `?token=` query parameter before upgrading.
pub async fn ws_handler(
    ws: WebSocketUpgrade,
    State(state): State<Arc<AppState>>,
    Query(query): Query<WsQuery>,
) -> impl IntoResponse {
    let token = query.token.unwrap_or_default();
    if !validate_token(&token) {
        warn!("WebSocket connection rejected: invalid token");
        return (StatusCode::FORBIDDEN, "Invalid or missing token").into_response();
    }

    info!("WebSocket connection accepted, upgrading");
    ws.on_upgrade(move |socket| handle_ws_connection(socket, state))
        .into_response()
}

// =============================================================================
// Connection handler
// =============================================================================

/// Runs the push ticker and the receive side under one `tokio::select!`.
async fn handle_ws_connection(socket: WebSocket, state: Arc<AppState>) {
    let (mut sender, mut receiver) = socket.split();

    let mut sequence: u64 = 0;
    let mut last_sent_version = state.current_state_version();
    if let Err(e) = send_latest(&mut sender, &state, &mut sequence).await {
        warn!(error = %e, "Failed to send initial WebSocket frame");
        return;
    }

    let mut push_interval = interval(Duration::from_millis(PUSH_INTERVAL_MS));

    loop {
        tokio::select! {
            _ = push_interval.tick() => {
                let current_version = state.current_state_version();
                if current_version != last_sent_version {
                    match send_latest(&mut sender, &state, &mut sequence).await {
                        Ok(()) => last_sent_version = current_version,
                        Err(e) => {
                            debug!(error = %e, "WebSocket send failed, disconnecting");
                            break;
                        }
                    }
                }
            }

            msg = receiver.next() => {
                match msg {
                    Some(Ok(Message::Ping(data))) => {
                        if let Err(e) = sender.send(Message::Pong(data)).await {
                            debug!(error = %e, "Failed to send Pong, disconnecting");
                            break;
                        }
                    }
                    Some(Ok(Message::Close(_))) => {
                        info!("WebSocket Close frame received");
                        break;
                    }
                    Some(Ok(_)) => {
                        debug!("WebSocket client frame ignored");
                    }
                    Some(Err(e)) => {
                        warn!(error = %e, "WebSocket receive error, disconnecting");
                        break;
                    }
                    None => break,
                }
            }
        }
    }

    info!(frames = sequence, "WebSocket connection closed");
}

// =============================================================================
// Helpers
// =============================================================================

async fn send_latest<S>(sender: &mut S, state: &Arc<AppState>, sequence: &mut u64) -> Result<(), axum::Error>
where
    S: Sink<Message, Error = axum::Error> + Unpin,
{
    state.ws_sequence_number.fetch_add(1, Ordering::Relaxed);
    *sequence += 1;

    let latest = state.latest_report.read().clone();
    let push = WsPush {
        sequence: *sequence,
        state_version: state.current_state_version(),
        server_time: chrono::Utc::now().timestamp_millis(),
        report: latest.as_ref(),
    };

    match serde_json::to_string(&push) {
        Ok(json) => {
            sender.send(Message::Text(json)).await?;
            debug!(version = push.state_version, seq = *sequence, "WebSocket frame sent");
            Ok(())
        }
        Err(e) => {
            // Not a network error; keep the connection.
            warn!(error = %e, "Failed to serialize WebSocket frame");
            Ok(())
        }
    }
}
