//! WebSocket transport: one connection drives exactly one speculative
//! generation session.
//!
//! The client opens a connection, sends a single [`StartRequest`] text
//! frame, and then receives [`Event`] JSON frames until a `done` or
//! `error` event closes the session. Closing the socket (or a failed
//! send) drops the underlying event stream, which runs the
//! [`crate::speculator::SessionGuard`] drop glue and frees the active
//! session slot even if the client disconnects mid-round.

use std::sync::Arc;

use axum::extract::ws::{Message, WebSocket, WebSocketUpgrade};
use axum::extract::State;
use axum::response::IntoResponse;
use futures::{SinkExt, StreamExt};
use tokio_util::sync::CancellationToken;
use tracing::{info, warn};

use super::schema::{AppState, StartRequest};
use crate::speculator::{SpeculationParams, Speculator};

pub async fn ws_handler(ws: WebSocketUpgrade, State(state): State<AppState>) -> impl IntoResponse {
    ws.on_upgrade(move |socket| handle_socket(socket, state))
}

async fn handle_socket(mut socket: WebSocket, state: AppState) {
    let start_request = match socket.recv().await {
        Some(Ok(Message::Text(text))) => match serde_json::from_str::<StartRequest>(&text) {
            Ok(req) => req,
            Err(e) => {
                let _ = send_error(&mut socket, &format!("invalid start request: {e}")).await;
                return;
            }
        },
        Some(Ok(Message::Close(_))) | None => return,
        Some(Ok(_)) => {
            let _ = send_error(&mut socket, "first frame must be a text StartRequest").await;
            return;
        }
        Some(Err(e)) => {
            warn!(error = %e, "websocket recv failed before session start");
            return;
        }
    };

    let cfg = &state.config.speculation;
    let cancellation = CancellationToken::new();
    let params = SpeculationParams {
        prompt: start_request.prompt,
        max_tokens: start_request.max_tokens.unwrap_or(cfg.default_max_tokens),
        temperature: start_request.temperature.unwrap_or(cfg.default_temperature),
        k: start_request.k.unwrap_or(cfg.default_k),
        eos_tokens: cfg.eos_tokens.clone(),
        draft_pacing_ms: cfg.draft_pacing_ms,
        verify_pacing_ms: cfg.verify_pacing_ms,
        seed: start_request.seed,
        cancellation: cancellation.clone(),
    };

    let speculator = Arc::new(Speculator::new(
        state.draft.clone(),
        state.target.clone(),
        state.metrics.clone(),
    ));

    let (mut sink, mut stream) = socket.split();

    // The client sends nothing after the start request, so any further
    // message (including a close frame) or the stream simply ending
    // means the connection is gone; cancel the in-flight session so it
    // stops drafting and paying for target verification.
    let watcher_token = cancellation.clone();
    let watcher = tokio::spawn(async move {
        while stream.next().await.is_some() {}
        watcher_token.cancel();
    });

    let mut events = Box::pin(speculator.generate(params));

    while let Some(event) = events.next().await {
        let is_terminal = matches!(
            event,
            crate::events::Event::Done { .. } | crate::events::Event::Error { .. }
        );
        let payload = match serde_json::to_string(&event) {
            Ok(p) => p,
            Err(e) => {
                warn!(error = %e, "failed to serialise event");
                break;
            }
        };
        if sink.send(Message::Text(payload)).await.is_err() {
            info!("client disconnected mid-session, dropping event stream");
            cancellation.cancel();
            break;
        }
        if is_terminal {
            break;
        }
    }

    cancellation.cancel();
    watcher.abort();
    let _ = sink.close().await;
}

async fn send_error(socket: &mut WebSocket, message: &str) -> Result<(), axum::Error> {
    let event = crate::events::Event::Error {
        message: message.to_string(),
        round: None,
    };
    let payload = serde_json::to_string(&event).unwrap_or_default();
    socket.send(Message::Text(payload)).await
}
