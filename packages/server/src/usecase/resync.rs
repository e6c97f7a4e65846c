//! Resynchronization Service
//!
//! Replays the log to a (re)connected client from the last sequence it knows.
//! Replies are pages of at most `page_size` messages; the client asks again from the
//! last sequence it received until a page comes back incomplete.

use std::sync::Arc;

use chatter_shared::time::Clock;

use crate::domain::{
    ConnectionId, ConversationId, DeliveryRepository, Message, Sequence, Timestamp,
};

use super::{
    connection_registry::ConnectionRegistry, conversation_directory::ConversationDirectory,
    dispatcher::FanOutDispatcher, error::ChatError, sequencer::MessageSequencer,
};

/// One page of replayed messages.
#[derive(Debug, Clone, PartialEq, Eq)]
pub struct ResyncBatch {
    pub conversation_id: ConversationId,
    /// Ascending by sequence
    pub messages: Vec<Message>,
    /// `true` when the page is shorter than the page size, i.e. the client is caught up
    pub complete: bool,
}

pub struct ResyncService {
    registry: Arc<ConnectionRegistry>,
    directory: Arc<ConversationDirectory>,
    sequencer: Arc<MessageSequencer>,
    deliveries: Arc<dyn DeliveryRepository>,
    dispatcher: Arc<FanOutDispatcher>,
    clock: Arc<dyn Clock>,
    page_size: usize,
}

impl ResyncService {
    pub fn new(
        registry: Arc<ConnectionRegistry>,
        directory: Arc<ConversationDirectory>,
        sequencer: Arc<MessageSequencer>,
        deliveries: Arc<dyn DeliveryRepository>,
        dispatcher: Arc<FanOutDispatcher>,
        clock: Arc<dyn Clock>,
        page_size: usize,
    ) -> Self {
        Self {
            registry,
            directory,
            sequencer,
            deliveries,
            dispatcher,
            clock,
            page_size: page_size.max(1),
        }
    }

    /// Messages of `conversation_id` after `last_known_sequence`, one page at a time.
    ///
    /// Pending delivery records of the connection's user for the returned messages
    /// become `delivered`, and the senders get a receipt. Calling again with the same
    /// `last_known_sequence` returns the same page.
    ///
    /// # Errors
    ///
    /// * `SessionNotFound` - the connection is not admitted
    /// * `ConversationNotFound` - unknown conversation
    /// * `NotAParticipant` - the connection's user is not a current participant
    pub async fn resync(
        &self,
        connection_id: &ConnectionId,
        conversation_id: &ConversationId,
        last_known_sequence: Sequence,
    ) -> Result<ResyncBatch, ChatError> {
        let session = self
            .registry
            .session(connection_id)
            .await
            .ok_or(ChatError::SessionNotFound)?;
        let conversation = self.directory.get(conversation_id).await?;
        if !conversation.is_participant(&session.user_id) {
            return Err(ChatError::NotAParticipant);
        }

        let messages = self
            .sequencer
            .fetch_since(conversation_id, last_known_sequence, self.page_size)
            .await?;

        let now = Timestamp::new(self.clock.now_millis());
        for message in messages
            .iter()
            .filter(|message| message.sender_id != session.user_id)
        {
            if let Some(record) = self
                .deliveries
                .mark_delivered(&message.id, &session.user_id, now)
                .await?
            {
                self.dispatcher.notify_receipt(&record).await;
            }
        }
        // The client vouches for everything up to `last_known_sequence`.
        let through = messages
            .last()
            .map(|message| message.sequence)
            .unwrap_or_else(|| last_known_sequence.min(conversation.last_sequence));
        self.registry
            .advance_cursor(connection_id, *conversation_id, Sequence::ZERO, through)
            .await;

        let complete = messages.len() < self.page_size;
        tracing::debug!(
            "Resync of conversation '{}' for connection '{}' after seq {}: {} messages (complete: {})",
            conversation_id,
            connection_id,
            last_known_sequence,
            messages.len(),
            complete
        );
        Ok(ResyncBatch {
            conversation_id: *conversation_id,
            messages,
            complete,
        })
    }

    /// [`resync`](Self::resync) from the connection's own cursor, i.e. the first
    /// message it has not received yet.
    pub async fn resume(
        &self,
        connection_id: &ConnectionId,
        conversation_id: &ConversationId,
    ) -> Result<ResyncBatch, ChatError> {
        let cursor = self
            .registry
            .cursor(connection_id, conversation_id)
            .await
            .ok_or(ChatError::SessionNotFound)?;
        self.resync(connection_id, conversation_id, cursor).await
    }
}
