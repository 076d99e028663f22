//! HTTP handlers: the SSE connection stream, inbound message submission, and
//! health checks.

use std::convert::Infallible;
use std::sync::Arc;

use axum::Json;
use axum::extract::{Query, State};
use axum::http::StatusCode;
use axum::response::sse::{Event, KeepAlive, Sse};
use futures::stream::{self, Stream, StreamExt};
use log::warn;
use serde::Deserialize;
use serde_json::Value;
use tokio::sync::mpsc;
use tokio_stream::wrappers::ReceiverStream;
use uuid::Uuid;

use super::AppState;
use crate::bridge::{Bridge, SubmitError};
use crate::registry::{SESSION_BUFFER_SIZE, Session};

#[derive(Debug, Deserialize)]
pub struct SessionQuery {
    #[serde(rename = "sessionId")]
    pub session_id: String,
}

/// Responder for configured health endpoints.
pub async fn health() -> &'static str {
    "ok"
}

/// SSE connection handshake.
///
/// Allocates a fresh session id and delivery channel, registers the session
/// with the bridge, and streams: first an `endpoint` event telling the client
/// where to POST its messages, then one `message` event per decoded child
/// message. Dropping the stream (client gone) notifies the bridge exactly
/// once via the guard.
pub async fn sse_connect(
    State(state): State<AppState>,
) -> Sse<impl Stream<Item = Result<Event, Infallible>>> {
    let session_id = Uuid::new_v4().to_string();
    let (tx, rx) = mpsc::channel::<Value>(SESSION_BUFFER_SIZE);

    state
        .bridge
        .connect(Session::new(session_id.clone(), tx))
        .await;

    let endpoint = format!("{}?sessionId={}", state.message_path, session_id);
    let guard = DisconnectGuard {
        bridge: Arc::clone(&state.bridge),
        session_id,
    };

    let handshake =
        stream::once(async move { Ok(Event::default().event("endpoint").data(endpoint)) });
    let messages = ReceiverStream::new(rx).map(move |message| {
        // The stream owns the guard; dropping the stream is the disconnect.
        let _keep = &guard;
        Ok(Event::default().event("message").data(message.to_string()))
    });

    Sse::new(handshake.chain(messages)).keep_alive(KeepAlive::default())
}

/// Inbound message submission for one session.
pub async fn submit_message(
    State(state): State<AppState>,
    Query(query): Query<SessionQuery>,
    Json(message): Json<Value>,
) -> (StatusCode, String) {
    match state.bridge.submit(&query.session_id, &message).await {
        Ok(()) => (StatusCode::ACCEPTED, "Accepted".to_string()),
        Err(e @ SubmitError::NoSession(_)) => {
            warn!("Rejected inbound message: {}", e);
            (StatusCode::SERVICE_UNAVAILABLE, e.to_string())
        }
        Err(e @ SubmitError::ChildGone(_)) => {
            warn!("Failed to forward inbound message: {}", e);
            (StatusCode::BAD_GATEWAY, e.to_string())
        }
    }
}

/// Reports the close of one SSE connection to the bridge.
struct DisconnectGuard {
    bridge: Arc<Bridge>,
    session_id: String,
}

impl Drop for DisconnectGuard {
    fn drop(&mut self) {
        let bridge = Arc::clone(&self.bridge);
        let session_id = std::mem::take(&mut self.session_id);
        if let Ok(handle) = tokio::runtime::Handle::try_current() {
            handle.spawn(async move { bridge.disconnect(&session_id).await });
        }
    }
}
