//! UseCase: 接続処理
//!
//! 接続時のトークンを認証し、コネクションをレジストリと MessagePusher に登録します。
//! 最初の接続であればレジストリがプレゼンス遷移を通知します。

use std::sync::Arc;

use crate::domain::{Authenticator, ConnectionId, MessagePusher, PusherChannel, UserId};

use super::{
    connection_registry::{ConnectionRegistry, SessionHandle},
    error::ChatError,
};

/// 接続のユースケース
pub struct ConnectParticipantUseCase {
    authenticator: Arc<dyn Authenticator>,
    registry: Arc<ConnectionRegistry>,
    message_pusher: Arc<dyn MessagePusher>,
}

impl ConnectParticipantUseCase {
    pub fn new(
        authenticator: Arc<dyn Authenticator>,
        registry: Arc<ConnectionRegistry>,
        message_pusher: Arc<dyn MessagePusher>,
    ) -> Self {
        Self {
            authenticator,
            registry,
            message_pusher,
        }
    }

    /// 接続時に提示されたトークンをユーザーに解決
    ///
    /// # Errors
    ///
    /// * `Unauthenticated` - 不明なトークン
    pub async fn authenticate(
        &self,
        connection_id: &ConnectionId,
        token: &str,
    ) -> Result<UserId, ChatError> {
        let user_id = self
            .authenticator
            .authenticate(connection_id, token)
            .await
            .inspect_err(|e| {
                tracing::info!("Rejected connection '{}': {}", connection_id, e);
            })?;
        Ok(user_id)
    }

    /// 認証済みのコネクションを登録
    ///
    /// 送信キューを先に登録してからレジストリに追加するため、
    /// 追加された時点でこのコネクションへの配信が可能になっている。
    pub async fn execute(
        &self,
        user_id: UserId,
        connection_id: ConnectionId,
        sender: PusherChannel,
    ) -> SessionHandle {
        self.message_pusher
            .register_connection(connection_id, sender)
            .await;
        let handle = self.registry.admit(user_id, connection_id).await;
        tracing::info!(
            "Connection '{}' of user '{}' connected",
            handle.connection_id,
            handle.user_id
        );
        handle
    }
}
