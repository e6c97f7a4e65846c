//! WebSocket connection handlers.

use std::{str::FromStr, sync::Arc, time::Duration};

use axum::{
    extract::{
        Query, State,
        ws::{Message, WebSocket, WebSocketUpgrade},
    },
    http::StatusCode,
    response::IntoResponse,
};
use futures_util::{sink::SinkExt, stream::StreamExt};
use serde::Deserialize;
use tokio::sync::mpsc;

use crate::{
    domain::{ConnectionId, ConversationId, MessageId, Sequence, UserId},
    infrastructure::dto::websocket::{ClientMessage, ServerMessage},
    ui::state::AppState,
    usecase::ChatError,
};

/// Query parameters for WebSocket connection
#[derive(Debug, Deserialize)]
pub struct ConnectQuery {
    #[serde(default)]
    pub token: Option<String>,
}

pub async fn websocket_handler(
    ws: WebSocketUpgrade,
    State(state): State<Arc<AppState>>,
    Query(query): Query<ConnectQuery>,
) -> Result<impl IntoResponse, StatusCode> {
    let connection_id = ConnectionId::generate();
    let Some(token) = query.token else {
        tracing::info!("Rejected connection '{}': no token", connection_id);
        return Err(StatusCode::UNAUTHORIZED);
    };

    let user_id = state
        .engine
        .connect_participant_usecase
        .authenticate(&connection_id, &token)
        .await
        .map_err(|e| match e {
            ChatError::Unauthenticated => StatusCode::UNAUTHORIZED,
            _ => StatusCode::SERVICE_UNAVAILABLE,
        })?;

    Ok(ws.on_upgrade(move |socket| handle_socket(socket, state, connection_id, user_id)))
}

/// Spawns a task that drains the connection's outbound queue into the WebSocket.
///
/// Every frame for this connection goes through the queue, so frames reach the
/// client in the order they were queued.
fn pusher_loop(
    mut rx: mpsc::Receiver<String>,
    mut sender: futures_util::stream::SplitSink<WebSocket, Message>,
) -> tokio::task::JoinHandle<()> {
    tokio::spawn(async move {
        while let Some(frame) = rx.recv().await {
            if sender.send(Message::Text(frame.into())).await.is_err() {
                break;
            }
        }
    })
}

/// Outbound half of a connection as seen by the frame handlers.
struct Outbound {
    tx: mpsc::Sender<String>,
    send_timeout: Duration,
}

impl Outbound {
    async fn send(&self, frame: &ServerMessage) {
        let text = match serde_json::to_string(frame) {
            Ok(text) => text,
            Err(e) => {
                tracing::error!("Failed to serialize frame: {}", e);
                return;
            }
        };
        if let Err(e) = self.tx.send_timeout(text, self.send_timeout).await {
            tracing::warn!("Dropped reply frame: {}", e);
        }
    }

    async fn error(&self, error: &ChatError, client_message_id: Option<String>) {
        self.send(&ServerMessage::Error {
            code: error.code().to_string(),
            message: error.to_string(),
            client_message_id,
        })
        .await;
    }

    async fn bad_request(&self, message: String, client_message_id: Option<String>) {
        self.send(&ServerMessage::Error {
            code: "bad-request".to_string(),
            message,
            client_message_id,
        })
        .await;
    }
}

async fn handle_socket(
    socket: WebSocket,
    state: Arc<AppState>,
    connection_id: ConnectionId,
    user_id: UserId,
) {
    let engine = state.engine.clone();
    let (tx, rx) = mpsc::channel(engine.config().outbound_buffer);
    let outbound = Outbound {
        tx: tx.clone(),
        send_timeout: engine.config().send_timeout,
    };

    // The connected frame is queued before the connection is admitted, so it is
    // always the first frame the client sees.
    outbound
        .send(&ServerMessage::Connected {
            connection_id: connection_id.to_string(),
            user_id: user_id.to_string(),
        })
        .await;
    engine
        .connect_participant_usecase
        .execute(user_id, connection_id, tx)
        .await;

    let (sender, mut receiver) = socket.split();

    // Spawn a task to receive frames from this client
    let recv_state = state.clone();
    let mut recv_task = tokio::spawn(async move {
        while let Some(msg) = receiver.next().await {
            let msg = match msg {
                Ok(msg) => msg,
                Err(e) => {
                    tracing::warn!("WebSocket error on '{}': {}", connection_id, e);
                    break;
                }
            };
            recv_state.engine.registry.touch(&connection_id).await;

            match msg {
                Message::Text(text) => {
                    tracing::debug!("Received frame on '{}': {}", connection_id, text);
                    handle_frame(&recv_state, &connection_id, &outbound, text.as_str()).await;
                }
                Message::Ping(_) | Message::Pong(_) => {
                    // Ping/pong is handled automatically by the WebSocket protocol
                }
                Message::Binary(_) => {
                    outbound
                        .bad_request("binary frames are not supported".to_string(), None)
                        .await;
                }
                Message::Close(_) => {
                    tracing::info!("Connection '{}' requested close", connection_id);
                    break;
                }
            }
        }
    });

    // Spawn a task to drain the outbound queue into the socket
    let mut send_task = pusher_loop(rx, sender);

    // If any one of the tasks completes, abort the other
    tokio::select! {
        _ = &mut recv_task => send_task.abort(),
        _ = &mut send_task => recv_task.abort(),
    };

    engine
        .disconnect_participant_usecase
        .execute(&connection_id)
        .await;
}

async fn handle_frame(
    state: &AppState,
    connection_id: &ConnectionId,
    outbound: &Outbound,
    text: &str,
) {
    let frame = match serde_json::from_str::<ClientMessage>(text) {
        Ok(frame) => frame,
        Err(e) => {
            tracing::debug!("Malformed frame on '{}': {}", connection_id, e);
            outbound.bad_request(e.to_string(), None).await;
            return;
        }
    };
    let engine = &state.engine;

    match frame {
        ClientMessage::Send {
            conversation_id,
            content,
            client_message_id,
        } => {
            let conversation_id = match ConversationId::from_str(&conversation_id) {
                Ok(id) => id,
                Err(e) => {
                    outbound.bad_request(e.to_string(), client_message_id).await;
                    return;
                }
            };
            match engine
                .send_message_usecase
                .execute(connection_id, &conversation_id, content)
                .await
            {
                Ok(message) => {
                    outbound
                        .send(&ServerMessage::Sent {
                            client_message_id,
                            message_id: message.id.to_string(),
                            sequence: message.sequence.value(),
                        })
                        .await;
                }
                Err(e) => outbound.error(&e, client_message_id).await,
            }
        }
        ClientMessage::Ack { message_id } => {
            let Some(message_id) = parse_message_id(outbound, &message_id).await else {
                return;
            };
            if let Err(e) = engine
                .send_message_usecase
                .acknowledge(connection_id, &message_id)
                .await
            {
                outbound.error(&e, None).await;
            }
        }
        ClientMessage::ResyncRequest {
            conversation_id,
            last_known_sequence,
        } => {
            let conversation_id = match ConversationId::from_str(&conversation_id) {
                Ok(id) => id,
                Err(e) => {
                    outbound.bad_request(e.to_string(), None).await;
                    return;
                }
            };
            let batch = match last_known_sequence {
                Some(sequence) => {
                    engine
                        .resync
                        .resync(connection_id, &conversation_id, Sequence::new(sequence))
                        .await
                }
                None => engine.resync.resume(connection_id, &conversation_id).await,
            };
            // Live `message-delivered` frames may be queued ahead of this batch;
            // clients merge both by sequence number.
            match batch {
                Ok(batch) => {
                    outbound
                        .send(&ServerMessage::ResyncBatch {
                            conversation_id: batch.conversation_id.to_string(),
                            messages: batch.messages.iter().map(Into::into).collect(),
                            complete: batch.complete,
                        })
                        .await;
                }
                Err(e) => outbound.error(&e, None).await,
            }
        }
        ClientMessage::Edit {
            message_id,
            content,
        } => {
            let Some(message_id) = parse_message_id(outbound, &message_id).await else {
                return;
            };
            if let Err(e) = engine
                .send_message_usecase
                .edit(connection_id, &message_id, content)
                .await
            {
                outbound.error(&e, None).await;
            }
        }
        ClientMessage::Delete { message_id } => {
            let Some(message_id) = parse_message_id(outbound, &message_id).await else {
                return;
            };
            if let Err(e) = engine
                .send_message_usecase
                .delete(connection_id, &message_id)
                .await
            {
                outbound.error(&e, None).await;
            }
        }
    }
}

async fn parse_message_id(outbound: &Outbound, value: &str) -> Option<MessageId> {
    match MessageId::from_str(value) {
        Ok(id) => Some(id),
        Err(e) => {
            outbound.bad_request(e.to_string(), None).await;
            None
        }
    }
}
