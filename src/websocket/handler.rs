//! WebSocket Handler
//!
//! Authenticates the upgrade request, then runs the connection's receive loop
//! until the client leaves or the transport fails.

use async_trait::async_trait;
use axum::{
    extract::{
        ws::{Message, WebSocket, WebSocketUpgrade},
        State,
    },
    http::{HeaderMap, Uri},
    response::Response,
};
use futures_util::{stream::SplitSink, SinkExt, StreamExt};
use std::sync::Arc;

use super::messages::Envelope;
use super::session::{SendError, Session, SessionSink};
use crate::api::{ApiError, AppState};
use crate::auth::ConnectionContext;

/// WebSocket upgrade handler
///
/// The handshake is authenticated before the upgrade is accepted; a rejected
/// caller gets a plain HTTP error and no session is ever created.
pub async fn websocket_handler(
    ws: WebSocketUpgrade,
    State(state): State<Arc<AppState>>,
    uri: Uri,
    headers: HeaderMap,
) -> Result<Response, ApiError> {
    let context = state
        .authenticator
        .authenticate(uri.query(), &headers)
        .await
        .map_err(|e| {
            tracing::warn!(error = %e, "WebSocket handshake rejected");
            ApiError::from(e)
        })?;

    if state.registry.session_count().await >= state.max_sessions {
        return Err(ApiError::ServiceUnavailable(
            "Too many realtime sessions".to_string(),
        ));
    }

    Ok(ws.on_upgrade(move |socket| handle_socket(socket, state, context)))
}

/// Write half of an axum WebSocket
struct WsSink {
    inner: SplitSink<WebSocket, Message>,
}

#[async_trait]
impl SessionSink for WsSink {
    async fn send_text(&mut self, text: String) -> Result<(), SendError> {
        self.inner
            .send(Message::Text(text))
            .await
            .map_err(|e| SendError::Transport(e.to_string()))
    }

    async fn close(&mut self) {
        let _ = self.inner.send(Message::Close(None)).await;
        let _ = self.inner.close().await;
    }
}

/// Handle an established WebSocket connection
async fn handle_socket(socket: WebSocket, state: Arc<AppState>, context: ConnectionContext) {
    let (sender, mut receiver) = socket.split();
    let session = Arc::new(Session::new(context, Box::new(WsSink { inner: sender })));
    let protocol = Arc::clone(&state.protocol);

    if let Err(e) = protocol.open(Arc::clone(&session)).await {
        tracing::error!(session_id = %session.id(), error = %e, "Failed to open session");
        if let Ok(text) = Envelope::error(e.to_string()).to_text() {
            let _ = session.send(text, state.send_timeout).await;
        }
        session.close().await;
        protocol.close(session.id()).await;
        return;
    }

    while let Some(result) = receiver.next().await {
        match result {
            Ok(Message::Text(text)) => protocol.handle_text(&session, &text).await,
            Ok(Message::Binary(_)) => protocol.handle_binary(&session).await,
            // Axum answers pings itself
            Ok(Message::Ping(_)) | Ok(Message::Pong(_)) => {}
            Ok(Message::Close(_)) => {
                tracing::debug!(session_id = %session.id(), "Client requested close");
                break;
            }
            Err(e) => {
                tracing::debug!(
                    session_id = %session.id(),
                    error = %e,
                    "WebSocket receive error"
                );
                break;
            }
        }

        // A failed write elsewhere has already torn the session down
        if !session.is_open() {
            break;
        }
    }

    protocol.close(session.id()).await;
}
