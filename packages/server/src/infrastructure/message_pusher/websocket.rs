//! WebSocket を使った MessagePusher 実装
//!
//! ## 責務
//!
//! - 接続ごとの送信キュー（`PusherChannel`）を管理
//! - イベントを JSON フレームに変換して接続へ送信
//!
//! ## 設計ノート
//!
//! WebSocket の生成は UI 層（`ui/handler/websocket.rs`）で行われます。
//! この実装は生成された `PusherChannel` を受け取り、フレーム送信に使用します。
//! キューは有限長で、詰まった接続への送信は `send_timeout` で打ち切ります。

use std::{collections::HashMap, time::Duration};

use async_trait::async_trait;
use tokio::sync::{RwLock, mpsc::error::SendTimeoutError};

use crate::{
    domain::{ConnectionId, ConversationEvent, MessagePushError, MessagePusher, PusherChannel},
    infrastructure::dto::websocket::ServerMessage,
};

/// WebSocket を使った MessagePusher 実装
///
/// ## フィールド
///
/// - `connections`: 接続中のコネクションと対応する送信キューのマップ
/// - `send_timeout`: キューが空くまで待つ上限
pub struct WebSocketMessagePusher {
    connections: RwLock<HashMap<ConnectionId, PusherChannel>>,
    send_timeout: Duration,
}

impl WebSocketMessagePusher {
    pub fn new(send_timeout: Duration) -> Self {
        Self {
            connections: RwLock::new(HashMap::new()),
            send_timeout,
        }
    }

    async fn channel_of(&self, connection_id: &ConnectionId) -> Option<PusherChannel> {
        self.connections.read().await.get(connection_id).cloned()
    }
}

#[async_trait]
impl MessagePusher for WebSocketMessagePusher {
    async fn register_connection(&self, connection_id: ConnectionId, sender: PusherChannel) {
        self.connections.write().await.insert(connection_id, sender);
        tracing::debug!("Connection '{}' registered to MessagePusher", connection_id);
    }

    async fn unregister_connection(&self, connection_id: &ConnectionId) {
        self.connections.write().await.remove(connection_id);
        tracing::debug!(
            "Connection '{}' unregistered from MessagePusher",
            connection_id
        );
    }

    async fn push_to(
        &self,
        connection_id: &ConnectionId,
        event: &ConversationEvent,
    ) -> Result<(), MessagePushError> {
        // ロックを保持したまま待たないよう、送信キューを複製してから送る
        let sender = self
            .channel_of(connection_id)
            .await
            .ok_or_else(|| MessagePushError::ConnectionNotFound(connection_id.to_string()))?;

        let frame = serde_json::to_string(&ServerMessage::from(event))
            .map_err(|e| MessagePushError::PushFailed(e.to_string()))?;

        match sender.send_timeout(frame, self.send_timeout).await {
            Ok(()) => {
                tracing::trace!("Pushed event to connection '{}'", connection_id);
                Ok(())
            }
            Err(SendTimeoutError::Timeout(_)) => {
                Err(MessagePushError::SendTimeout(connection_id.to_string()))
            }
            Err(SendTimeoutError::Closed(_)) => Err(MessagePushError::PushFailed(format!(
                "connection '{}' is closed",
                connection_id
            ))),
        }
    }
}
