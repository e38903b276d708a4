//! WebSocket event stream.
//!
//! Each connection is one observer. It starts with no subscription; the client
//! sends `subscribe` with a topic list and then receives matching events.

use std::sync::Arc;

use axum::{
    extract::{
        ws::{Message, WebSocket, WebSocketUpgrade},
        State,
    },
    response::IntoResponse,
};
use futures_util::stream::SplitSink;
use futures_util::{SinkExt, StreamExt};
use serde::Serialize;
use tracing::{debug, info, warn};

use crewrun_core::{ClientMessage, ObserverId, ProtocolError, ServerMessage};

use crate::state::AppState;

/// Upgrade to a WebSocket observer connection.
pub async fn stream(ws: WebSocketUpgrade, State(state): State<Arc<AppState>>) -> impl IntoResponse {
    ws.on_upgrade(move |socket| handle_socket(socket, state))
}

async fn handle_socket(socket: WebSocket, state: Arc<AppState>) {
    let observer_id = ObserverId::generate();
    let mut events = state.broadcaster.connect(observer_id.clone()).await;
    let (mut sink, mut inbound) = socket.split();

    let welcome = ServerMessage::Welcome {
        observer_id: observer_id.clone(),
    };
    if send_json(&mut sink, &welcome).await.is_err() {
        state.broadcaster.disconnect(&observer_id).await;
        return;
    }

    loop {
        tokio::select! {
            frame = inbound.next() => {
                let reply = match frame {
                    Some(Ok(Message::Text(text))) => {
                        handle_client_message(&state, &observer_id, &text).await
                    }
                    Some(Ok(Message::Binary(_))) => ServerMessage::from(&ProtocolError::InvalidMessage(
                        "binary frames are not supported".to_string(),
                    )),
                    Some(Ok(Message::Close(_))) | None => break,
                    Some(Ok(_)) => continue,
                    Some(Err(e)) => {
                        warn!(observer_id = %observer_id, error = %e, "WebSocket error");
                        break;
                    }
                };
                if send_json(&mut sink, &reply).await.is_err() {
                    break;
                }
            }
            event = events.recv() => {
                match event {
                    Some(event) => {
                        if send_json(&mut sink, &event).await.is_err() {
                            break;
                        }
                    }
                    None => break,
                }
            }
        }
    }

    state.broadcaster.disconnect(&observer_id).await;
    info!(observer_id = %observer_id, "WebSocket connection closed");
}

/// Apply one inbound text frame and build the reply.
pub(crate) async fn handle_client_message(
    state: &AppState,
    observer_id: &ObserverId,
    text: &str,
) -> ServerMessage {
    match ClientMessage::parse(text) {
        Ok(ClientMessage::Subscribe { topics }) => {
            match state.broadcaster.subscribe(observer_id, topics).await {
                Ok(topics) => ServerMessage::Subscribed { topics },
                Err(e) => ServerMessage::Error {
                    error: e.code().to_string(),
                    message: e.to_string(),
                    received: None,
                },
            }
        }
        Ok(ClientMessage::Unsubscribe) => {
            if let Err(e) = state.broadcaster.unsubscribe(observer_id).await {
                warn!(observer_id = %observer_id, error = %e, "Unsubscribe for unknown observer");
            }
            ServerMessage::Unsubscribed
        }
        Ok(ClientMessage::Ping) => ServerMessage::Pong,
        Err(e) => {
            debug!(observer_id = %observer_id, error = %e, "Rejected client message");
            ServerMessage::from(&e)
        }
    }
}

async fn send_json<T: Serialize>(
    sink: &mut SplitSink<WebSocket, Message>,
    message: &T,
) -> Result<(), axum::Error> {
    let text = match serde_json::to_string(message) {
        Ok(text) => text,
        Err(e) => {
            warn!(error = %e, "Failed to serialize outbound message");
            return Ok(());
        }
    };
    sink.send(Message::Text(text.into())).await
}
