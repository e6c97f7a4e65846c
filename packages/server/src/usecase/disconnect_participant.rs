//! UseCase: 切断処理
//!
//! コネクションを MessagePusher とレジストリから取り除きます。
//! 最後の接続であればレジストリがプレゼンス遷移を通知し、
//! オフライン判定は猶予期間の後にプレゼンストラッカーが行います。

use std::sync::Arc;

use crate::domain::{ConnectionId, ConnectionSession, MessagePusher};

use super::connection_registry::ConnectionRegistry;

/// 切断のユースケース
pub struct DisconnectParticipantUseCase {
    registry: Arc<ConnectionRegistry>,
    message_pusher: Arc<dyn MessagePusher>,
}

impl DisconnectParticipantUseCase {
    pub fn new(registry: Arc<ConnectionRegistry>, message_pusher: Arc<dyn MessagePusher>) -> Self {
        Self {
            registry,
            message_pusher,
        }
    }

    /// 切断を実行。冪等で、既に切断済みなら `None` を返す。
    pub async fn execute(&self, connection_id: &ConnectionId) -> Option<ConnectionSession> {
        self.message_pusher
            .unregister_connection(connection_id)
            .await;
        let session = self.registry.remove(connection_id).await;
        match &session {
            Some(session) => tracing::info!(
                "Connection '{}' of user '{}' disconnected",
                connection_id,
                session.user_id
            ),
            None => tracing::debug!("Connection '{}' was already gone", connection_id),
        }
        session
    }
}
