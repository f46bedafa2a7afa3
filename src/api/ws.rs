use axum::extract::ws::{Message, WebSocket};
use axum::extract::{Path, State, WebSocketUpgrade};
use axum::response::Response;

use crate::error::ApiError;

use super::state::AppState;

/// `GET /ws/exports/:job_id`. The job must already exist (404 before the
/// upgrade); a closed or nonexistent job still upgrades and immediately
/// delivers a synthetic terminal/current-state event, per §4.5's
/// resilient-subscription requirement — a client that connects after the
/// job already finished still learns the outcome.
pub async fn ws_handler(
    State(state): State<AppState>,
    Path(job_id): Path<String>,
    ws: WebSocketUpgrade,
) -> Result<Response, ApiError> {
    let job = state.store.get(&job_id).await?;
    Ok(ws.on_upgrade(move |socket| handle_socket(socket, state, job)))
}

async fn handle_socket(mut socket: WebSocket, state: AppState, job: crate::domain::ExportJob) {
    let subscription = state.hub.subscribe(&job);
    let keepalive = state.websocket_keepalive;

    loop {
        tokio::select! {
            event = subscription.recv() => {
                match event {
                    Some(event) => {
                        let is_terminal = event.status.is_terminal();
                        let payload = match serde_json::to_string(&event) {
                            Ok(json) => json,
                            Err(e) => {
                                tracing::error!(error = %e, "failed to serialize progress event");
                                break;
                            }
                        };
                        if socket.send(Message::Text(payload.into())).await.is_err() {
                            break;
                        }
                        if is_terminal {
                            break;
                        }
                    }
                    None => break,
                }
            }
            incoming = tokio::time::timeout(keepalive * 2, socket.recv()) => {
                match incoming {
                    Ok(Some(Ok(Message::Text(text)))) if text.trim() == "ping" => {
                        if socket.send(Message::Text("pong".into())).await.is_err() {
                            break;
                        }
                    }
                    Ok(Some(Ok(Message::Close(_)))) | Ok(None) => break,
                    Ok(Some(Ok(_))) => {}
                    Ok(Some(Err(_))) => break,
                    Err(_) => {
                        // No client traffic within the keepalive window; the
                        // client is assumed gone.
                        break;
                    }
                }
            }
        }
    }

    state.hub.unsubscribe(&subscription);
}
