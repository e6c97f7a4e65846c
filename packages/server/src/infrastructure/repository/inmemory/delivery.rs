//! InMemory Delivery Repository 実装
//!
//! (message, recipient) をキーに配信記録を保持します。記録は削除されません。

use std::collections::HashMap;

use async_trait::async_trait;
use tokio::sync::Mutex;

use crate::domain::{
    DeliveryRecord, DeliveryRepository, MessageId, RepositoryError, Timestamp, UserId,
};

#[derive(Default)]
pub struct InMemoryDeliveryRepository {
    records: Mutex<HashMap<(MessageId, UserId), DeliveryRecord>>,
}

impl InMemoryDeliveryRepository {
    pub fn new() -> Self {
        Self::default()
    }

    async fn transition<F>(
        &self,
        message_id: &MessageId,
        recipient_id: &UserId,
        apply: F,
    ) -> Result<Option<DeliveryRecord>, RepositoryError>
    where
        F: FnOnce(&mut DeliveryRecord) -> bool + Send,
    {
        let mut records = self.records.lock().await;
        let Some(record) = records.get_mut(&(*message_id, recipient_id.clone())) else {
            return Ok(None);
        };
        Ok(apply(record).then(|| record.clone()))
    }
}

#[async_trait]
impl DeliveryRepository for InMemoryDeliveryRepository {
    async fn insert_many(&self, new_records: Vec<DeliveryRecord>) -> Result<(), RepositoryError> {
        let mut records = self.records.lock().await;
        for record in new_records {
            records
                .entry((record.message_id, record.recipient_id.clone()))
                .or_insert(record);
        }
        Ok(())
    }

    async fn find(
        &self,
        message_id: &MessageId,
        recipient_id: &UserId,
    ) -> Result<Option<DeliveryRecord>, RepositoryError> {
        let records = self.records.lock().await;
        Ok(records.get(&(*message_id, recipient_id.clone())).cloned())
    }

    async fn mark_delivered(
        &self,
        message_id: &MessageId,
        recipient_id: &UserId,
        at: Timestamp,
    ) -> Result<Option<DeliveryRecord>, RepositoryError> {
        self.transition(message_id, recipient_id, |record| record.mark_delivered(at))
            .await
    }

    async fn mark_read(
        &self,
        message_id: &MessageId,
        recipient_id: &UserId,
        at: Timestamp,
    ) -> Result<Option<DeliveryRecord>, RepositoryError> {
        self.transition(message_id, recipient_id, |record| record.mark_read(at))
            .await
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use crate::domain::{ConversationId, DeliveryState, Message, MessageContent, Sequence};

    fn user(id: &str) -> UserId {
        UserId::new(id.to_string()).unwrap()
    }

    fn message(conversation_id: ConversationId, sequence: u64) -> Message {
        Message::new(
            conversation_id,
            user("alice"),
            MessageContent::new(format!("message {sequence}")).unwrap(),
            Sequence::new(sequence),
            Timestamp::new(1_000),
        )
    }

    #[tokio::test]
    async fn test_insert_keeps_existing_record() {
        // テスト項目: 同じ (メッセージ, 受信者) の記録を再挿入しても既存の状態が保たれる
        // given (前提条件):
        let repo = InMemoryDeliveryRepository::new();
        let message = message(ConversationId::generate(), 1);
        let delivered = DeliveryRecord::delivered(&message, user("bob"), Timestamp::new(1_000));
        repo.insert_many(vec![delivered.clone()]).await.unwrap();

        // when (操作):
        let pending = DeliveryRecord::pending(&message, user("bob"), Timestamp::new(2_000));
        repo.insert_many(vec![pending]).await.unwrap();

        // then (期待する結果):
        let stored = repo.find(&message.id, &user("bob")).await.unwrap();
        assert_eq!(stored, Some(delivered));
    }

    #[tokio::test]
    async fn test_mark_delivered_only_from_pending() {
        // テスト項目: pending の記録だけが delivered に遷移し、変化した記録が返される
        // given (前提条件):
        let repo = InMemoryDeliveryRepository::new();
        let message = message(ConversationId::generate(), 1);
        repo.insert_many(vec![DeliveryRecord::pending(
            &message,
            user("bob"),
            Timestamp::new(1_000),
        )])
        .await
        .unwrap();

        // when (操作):
        let first = repo
            .mark_delivered(&message.id, &user("bob"), Timestamp::new(2_000))
            .await
            .unwrap();
        let second = repo
            .mark_delivered(&message.id, &user("bob"), Timestamp::new(3_000))
            .await
            .unwrap();

        // then (期待する結果):
        assert_eq!(first.unwrap().state, DeliveryState::Delivered);
        assert!(second.is_none());
    }

    #[tokio::test]
    async fn test_mark_read_missing_record_is_noop() {
        // テスト項目: 記録が存在しない既読通知は何もしない
        // given (前提条件):
        let repo = InMemoryDeliveryRepository::new();

        // when (操作):
        let result = repo
            .mark_read(&MessageId::generate(), &user("bob"), Timestamp::new(1_000))
            .await;

        // then (期待する結果):
        assert_eq!(result, Ok(None));
    }
}
