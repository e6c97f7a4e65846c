//! UseCase: メッセージ操作
//!
//! 接続から届いた送信・編集・削除・既読通知を、そのコネクションのユーザーとして
//! 実行します。シーケンス採番と配信はシーケンサー経由で行われます。

use std::sync::Arc;

use crate::domain::{
    ConnectionId, ConversationId, DeliveryRecord, Message, MessageContent, MessageId, UserId,
};

use super::{
    connection_registry::ConnectionRegistry, dispatcher::FanOutDispatcher, error::ChatError,
    sequencer::MessageSequencer,
};

/// メッセージ送信のユースケース
pub struct SendMessageUseCase {
    registry: Arc<ConnectionRegistry>,
    sequencer: Arc<MessageSequencer>,
    dispatcher: Arc<FanOutDispatcher>,
}

impl SendMessageUseCase {
    pub fn new(
        registry: Arc<ConnectionRegistry>,
        sequencer: Arc<MessageSequencer>,
        dispatcher: Arc<FanOutDispatcher>,
    ) -> Self {
        Self {
            registry,
            sequencer,
            dispatcher,
        }
    }

    /// メッセージ送信を実行
    ///
    /// # Returns
    ///
    /// * `Ok(Message)` - 採番・永続化・配信済みのメッセージ
    /// * `Err(ChatError)` - 内容の検証失敗、参加者でない、永続化タイムアウトなど
    pub async fn execute(
        &self,
        connection_id: &ConnectionId,
        conversation_id: &ConversationId,
        content: String,
    ) -> Result<Message, ChatError> {
        let sender_id = self.user_of(connection_id).await?;
        let content = MessageContent::new(content)?;
        self.sequencer
            .append(conversation_id, sender_id, content)
            .await
    }

    pub async fn edit(
        &self,
        connection_id: &ConnectionId,
        message_id: &MessageId,
        content: String,
    ) -> Result<Message, ChatError> {
        let editor_id = self.user_of(connection_id).await?;
        let content = MessageContent::new(content)?;
        self.sequencer.edit(message_id, editor_id, content).await
    }

    pub async fn delete(
        &self,
        connection_id: &ConnectionId,
        message_id: &MessageId,
    ) -> Result<Message, ChatError> {
        let editor_id = self.user_of(connection_id).await?;
        self.sequencer.delete(message_id, editor_id).await
    }

    /// 既読通知。既に既読、またはレコードが無い場合は `None`。
    pub async fn acknowledge(
        &self,
        connection_id: &ConnectionId,
        message_id: &MessageId,
    ) -> Result<Option<DeliveryRecord>, ChatError> {
        let reader_id = self.user_of(connection_id).await?;
        self.dispatcher
            .acknowledge_read(message_id, &reader_id)
            .await
    }

    async fn user_of(&self, connection_id: &ConnectionId) -> Result<UserId, ChatError> {
        self.registry
            .session(connection_id)
            .await
            .map(|session| session.user_id)
            .ok_or(ChatError::SessionNotFound)
    }
}
