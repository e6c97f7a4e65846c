//! InMemory Message Log 実装
//!
//! 会話ごとにメッセージをシーケンス順のベクタで保持します。
//! シーケンス番号は 1 から連続していることを append 時に検証します。

use std::collections::HashMap;

use async_trait::async_trait;
use tokio::sync::RwLock;

use crate::domain::{ConversationId, LogError, Message, MessageId, MessageLog, Sequence};

#[derive(Default)]
struct LogState {
    /// Messages per conversation; the message with sequence `n` sits at index `n - 1`.
    conversations: HashMap<ConversationId, Vec<Message>>,
    /// Conversation and position of every message.
    index: HashMap<MessageId, (ConversationId, usize)>,
}

#[derive(Default)]
pub struct InMemoryMessageLog {
    state: RwLock<LogState>,
}

impl InMemoryMessageLog {
    pub fn new() -> Self {
        Self::default()
    }
}

#[async_trait]
impl MessageLog for InMemoryMessageLog {
    async fn append(&self, message: &Message) -> Result<(), LogError> {
        let mut state = self.state.write().await;
        if state.index.contains_key(&message.id) {
            return Err(LogError::DuplicateMessage(message.id));
        }

        let messages = state
            .conversations
            .entry(message.conversation_id)
            .or_default();
        let expected = Sequence::new(messages.len() as u64).next();
        if message.sequence != expected {
            return Err(LogError::NonContiguous {
                conversation_id: message.conversation_id,
                expected,
                got: message.sequence,
            });
        }
        let position = messages.len();
        messages.push(message.clone());
        state
            .index
            .insert(message.id, (message.conversation_id, position));
        Ok(())
    }

    async fn read_range(
        &self,
        conversation_id: &ConversationId,
        after: Sequence,
        limit: usize,
    ) -> Result<Vec<Message>, LogError> {
        let state = self.state.read().await;
        let Some(messages) = state.conversations.get(conversation_id) else {
            return Ok(Vec::new());
        };
        let start = usize::try_from(after.value()).unwrap_or(usize::MAX);
        let Some(tail) = messages.get(start..) else {
            return Ok(Vec::new());
        };
        Ok(tail.iter().take(limit).cloned().collect())
    }

    async fn find(&self, message_id: &MessageId) -> Result<Option<Message>, LogError> {
        let state = self.state.read().await;
        let found = state
            .index
            .get(message_id)
            .and_then(|(conversation_id, position)| {
                state.conversations.get(conversation_id)?.get(*position)
            })
            .cloned();
        Ok(found)
    }

    async fn update(&self, message: &Message) -> Result<(), LogError> {
        let mut state = self.state.write().await;
        let slot = state
            .conversations
            .get_mut(&message.conversation_id)
            .and_then(|messages| {
                let position = usize::try_from(message.sequence.value())
                    .ok()?
                    .checked_sub(1)?;
                messages.get_mut(position)
            })
            .filter(|stored| stored.id == message.id)
            .ok_or(LogError::MessageNotFound(message.id))?;
        *slot = message.clone();
        Ok(())
    }
}
