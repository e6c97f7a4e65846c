//! Conversation Directory
//!
//! Single source of truth for who participates in which conversation, and for each
//! conversation's committed sequence counter. Callers re-read participant sets on
//! every use instead of caching them.

use std::sync::Arc;

use chatter_shared::time::Clock;

use crate::domain::{
    Authenticator, Conversation, ConversationId, ConversationRepository, Sequence, Timestamp,
    UserId,
};

use super::error::ChatError;

pub struct ConversationDirectory {
    repository: Arc<dyn ConversationRepository>,
    authenticator: Arc<dyn Authenticator>,
    clock: Arc<dyn Clock>,
}

impl ConversationDirectory {
    pub fn new(
        repository: Arc<dyn ConversationRepository>,
        authenticator: Arc<dyn Authenticator>,
        clock: Arc<dyn Clock>,
    ) -> Self {
        Self {
            repository,
            authenticator,
            clock,
        }
    }

    /// Create a conversation.
    ///
    /// # Errors
    ///
    /// * `InvalidParticipants` - a direct conversation without exactly two distinct
    ///   participants, an empty group, or an id unknown to the authentication
    ///   collaborator
    pub async fn create(
        &self,
        participant_ids: Vec<UserId>,
        is_group: bool,
        name: Option<String>,
    ) -> Result<Conversation, ChatError> {
        let conversation = Conversation::new(
            ConversationId::generate(),
            participant_ids,
            is_group,
            name,
            Timestamp::new(self.clock.now_millis()),
        )?;

        for user_id in &conversation.participants {
            self.ensure_known(user_id).await?;
        }

        self.repository.insert(conversation.clone()).await?;
        tracing::info!(
            "Conversation '{}' created with {} participants (group: {})",
            conversation.id,
            conversation.participants.len(),
            conversation.is_group
        );
        Ok(conversation)
    }

    /// Add `user_id` to a group conversation.
    pub async fn add_participant(
        &self,
        conversation_id: &ConversationId,
        user_id: UserId,
    ) -> Result<Conversation, ChatError> {
        self.ensure_known(&user_id).await?;
        let conversation = self
            .repository
            .add_participant(conversation_id, user_id.clone())
            .await?;
        tracing::info!(
            "User '{}' joined conversation '{}'",
            user_id,
            conversation_id
        );
        Ok(conversation)
    }

    /// Remove `user_id` from a group conversation. Their past messages stay in the log.
    pub async fn remove_participant(
        &self,
        conversation_id: &ConversationId,
        user_id: &UserId,
    ) -> Result<Conversation, ChatError> {
        let conversation = self
            .repository
            .remove_participant(conversation_id, user_id)
            .await?;
        tracing::info!("User '{}' left conversation '{}'", user_id, conversation_id);
        Ok(conversation)
    }

    pub async fn get(&self, conversation_id: &ConversationId) -> Result<Conversation, ChatError> {
        self.repository
            .find(conversation_id)
            .await?
            .ok_or(ChatError::ConversationNotFound(*conversation_id))
    }

    /// Current participants in join order.
    pub async fn participants_of(
        &self,
        conversation_id: &ConversationId,
    ) -> Result<Vec<UserId>, ChatError> {
        Ok(self.get(conversation_id).await?.participants)
    }

    pub async fn conversations_of(&self, user_id: &UserId) -> Result<Vec<Conversation>, ChatError> {
        Ok(self.repository.find_by_participant(user_id).await?)
    }

    /// Commit a newly assigned sequence number. Only the conversation's sequencer
    /// calls this.
    pub(crate) async fn record_sequence(
        &self,
        conversation_id: &ConversationId,
        sequence: Sequence,
    ) -> Result<(), ChatError> {
        Ok(self
            .repository
            .record_sequence(conversation_id, sequence)
            .await?)
    }

    async fn ensure_known(&self, user_id: &UserId) -> Result<(), ChatError> {
        match self.authenticator.find_user(user_id).await? {
            Some(_) => Ok(()),
            None => Err(ChatError::InvalidParticipants(format!(
                "unknown user '{}'",
                user_id
            ))),
        }
    }
}
