//! MessagePusher trait 定義
//!
//! クライアント接続へのイベント送信の抽象化。
//! 具体的な実装（WebSocket など）は Infrastructure 層が提供します。

use async_trait::async_trait;
use tokio::sync::mpsc;

use super::{error::MessagePushError, event::ConversationEvent, value_object::ConnectionId};

/// Outbound channel of one connection.
///
/// Carries serialized frames; the connection's writer task drains it into the socket.
/// Bounded, so a stalled client exerts backpressure instead of growing memory.
pub type PusherChannel = mpsc::Sender<String>;

/// Pushes conversation events to individual connections.
#[async_trait]
pub trait MessagePusher: Send + Sync {
    /// Attach the outbound channel of a newly admitted connection.
    async fn register_connection(&self, connection_id: ConnectionId, sender: PusherChannel);

    /// Detach a connection. Idempotent.
    async fn unregister_connection(&self, connection_id: &ConnectionId);

    /// Push one event to one connection, waiting a bounded time for buffer space.
    async fn push_to(
        &self,
        connection_id: &ConnectionId,
        event: &ConversationEvent,
    ) -> Result<(), MessagePushError>;
}
