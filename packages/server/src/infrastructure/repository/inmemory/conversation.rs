//! InMemory Conversation Repository 実装
//!
//! ドメイン層が定義する ConversationRepository trait の具体的な実装。
//! HashMap をインメモリ DB として使用します。

use std::collections::HashMap;

use async_trait::async_trait;
use tokio::sync::RwLock;

use crate::domain::{
    Conversation, ConversationId, ConversationRepository, RepositoryError, Sequence, UserId,
};

/// インメモリ Conversation Repository 実装
///
/// Every mutation runs the entity method on the stored conversation under the write
/// lock, so a rejected mutation leaves it unchanged.
#[derive(Default)]
pub struct InMemoryConversationRepository {
    conversations: RwLock<HashMap<ConversationId, Conversation>>,
}

impl InMemoryConversationRepository {
    pub fn new() -> Self {
        Self::default()
    }

    async fn modify<F>(
        &self,
        conversation_id: &ConversationId,
        mutate: F,
    ) -> Result<Conversation, RepositoryError>
    where
        F: FnOnce(&mut Conversation) -> Result<(), crate::domain::ConversationError> + Send,
    {
        let mut conversations = self.conversations.write().await;
        let stored = conversations
            .get_mut(conversation_id)
            .ok_or(RepositoryError::ConversationNotFound(*conversation_id))?;

        // Mutate a copy so a failed check cannot leave a half-applied change behind.
        let mut updated = stored.clone();
        mutate(&mut updated)?;
        *stored = updated.clone();
        Ok(updated)
    }
}

#[async_trait]
impl ConversationRepository for InMemoryConversationRepository {
    async fn insert(&self, conversation: Conversation) -> Result<(), RepositoryError> {
        let mut conversations = self.conversations.write().await;
        if conversations.contains_key(&conversation.id) {
            return Err(RepositoryError::DuplicateConversation(conversation.id));
        }
        conversations.insert(conversation.id, conversation);
        Ok(())
    }

    async fn find(
        &self,
        conversation_id: &ConversationId,
    ) -> Result<Option<Conversation>, RepositoryError> {
        let conversations = self.conversations.read().await;
        Ok(conversations.get(conversation_id).cloned())
    }

    async fn add_participant(
        &self,
        conversation_id: &ConversationId,
        user_id: UserId,
    ) -> Result<Conversation, RepositoryError> {
        self.modify(conversation_id, |conversation| {
            conversation.add_participant(user_id)
        })
        .await
    }

    async fn remove_participant(
        &self,
        conversation_id: &ConversationId,
        user_id: &UserId,
    ) -> Result<Conversation, RepositoryError> {
        self.modify(conversation_id, |conversation| {
            conversation.remove_participant(user_id)
        })
        .await
    }

    async fn record_sequence(
        &self,
        conversation_id: &ConversationId,
        sequence: Sequence,
    ) -> Result<(), RepositoryError> {
        self.modify(conversation_id, |conversation| {
            conversation.record_sequence(sequence)
        })
        .await
        .map(|_| ())
    }

    async fn find_by_participant(
        &self,
        user_id: &UserId,
    ) -> Result<Vec<Conversation>, RepositoryError> {
        let conversations = self.conversations.read().await;
        let mut found: Vec<Conversation> = conversations
            .values()
            .filter(|conversation| conversation.is_participant(user_id))
            .cloned()
            .collect();
        found.sort_by_key(|conversation| (conversation.created_at, conversation.id));
        Ok(found)
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use crate::domain::{ConversationError, Timestamp};

    fn user(id: &str) -> UserId {
        UserId::new(id.to_string()).unwrap()
    }

    fn group(ids: &[&str]) -> Conversation {
        Conversation::new(
            ConversationId::generate(),
            ids.iter().map(|id| user(id)).collect(),
            true,
            None,
            Timestamp::new(1_000),
        )
        .unwrap()
    }

    #[tokio::test]
    async fn test_insert_and_find() {
        // テスト項目: 保存した会話を ID で取得できる
        // given (前提条件):
        let repo = InMemoryConversationRepository::new();
        let conversation = group(&["alice", "bob"]);

        // when (操作):
        repo.insert(conversation.clone()).await.unwrap();
        let found = repo.find(&conversation.id).await.unwrap();

        // then (期待する結果):
        assert_eq!(found, Some(conversation));
    }

    #[tokio::test]
    async fn test_insert_duplicate_fails() {
        // テスト項目: 同じ ID の会話は二重に保存できない
        // given (前提条件):
        let repo = InMemoryConversationRepository::new();
        let conversation = group(&["alice"]);
        repo.insert(conversation.clone()).await.unwrap();

        // when (操作):
        let result = repo.insert(conversation.clone()).await;

        // then (期待する結果):
        assert_eq!(
            result,
            Err(RepositoryError::DuplicateConversation(conversation.id))
        );
    }

    #[tokio::test]
    async fn test_failed_mutation_leaves_conversation_unchanged() {
        // テスト項目: 不正な変更は保存済みの会話に反映されない
        // given (前提条件):
        let repo = InMemoryConversationRepository::new();
        let conversation = group(&["alice", "bob"]);
        repo.insert(conversation.clone()).await.unwrap();

        // when (操作):
        let result = repo.add_participant(&conversation.id, user("bob")).await;
        let skipped = repo
            .record_sequence(&conversation.id, Sequence::new(2))
            .await;

        // then (期待する結果):
        assert_eq!(
            result,
            Err(RepositoryError::Conversation(ConversationError::AlreadyMember))
        );
        assert!(skipped.is_err());
        assert_eq!(repo.find(&conversation.id).await.unwrap(), Some(conversation));
    }

    #[tokio::test]
    async fn test_record_sequence_advances_counter() {
        // テスト項目: 連続したシーケンス番号が記録される
        // given (前提条件):
        let repo = InMemoryConversationRepository::new();
        let conversation = group(&["alice"]);
        repo.insert(conversation.clone()).await.unwrap();

        // when (操作):
        repo.record_sequence(&conversation.id, Sequence::new(1))
            .await
            .unwrap();
        repo.record_sequence(&conversation.id, Sequence::new(2))
            .await
            .unwrap();

        // then (期待する結果):
        let stored = repo.find(&conversation.id).await.unwrap().unwrap();
        assert_eq!(stored.last_sequence, Sequence::new(2));
    }

    #[tokio::test]
    async fn test_find_by_participant() {
        // テスト項目: ユーザーが参加している会話だけが返される
        // given (前提条件):
        let repo = InMemoryConversationRepository::new();
        let with_alice = group(&["alice", "bob"]);
        let without_alice = group(&["bob", "carol"]);
        repo.insert(with_alice.clone()).await.unwrap();
        repo.insert(without_alice).await.unwrap();

        // when (操作):
        let found = repo.find_by_participant(&user("alice")).await.unwrap();

        // then (期待する結果):
        assert_eq!(found, vec![with_alice]);
    }

    #[tokio::test]
    async fn test_modify_missing_conversation() {
        // テスト項目: 存在しない会話の変更は ConversationNotFound になる
        // given (前提条件):
        let repo = InMemoryConversationRepository::new();
        let missing = ConversationId::generate();

        // when (操作):
        let result = repo.add_participant(&missing, user("alice")).await;

        // then (期待する結果):
        assert_eq!(result, Err(RepositoryError::ConversationNotFound(missing)));
    }
}
