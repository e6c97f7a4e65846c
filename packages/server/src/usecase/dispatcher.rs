//! Fan-out Dispatcher
//!
//! Pushes conversation events to every active connection of the current
//! participants and keeps the delivery records up to date. The participant set is
//! re-read from the directory on each dispatch.

use std::{collections::HashSet, sync::Arc};

use chatter_shared::time::Clock;
use futures_util::future::join_all;

use crate::domain::{
    ConnectionId, ConversationEvent, DeliveryRecord, DeliveryRepository, Message, MessageId,
    MessagePusher, Timestamp, UserId,
};

use super::{
    connection_registry::ConnectionRegistry, conversation_directory::ConversationDirectory,
    error::ChatError,
};

pub struct FanOutDispatcher {
    directory: Arc<ConversationDirectory>,
    registry: Arc<ConnectionRegistry>,
    deliveries: Arc<dyn DeliveryRepository>,
    pusher: Arc<dyn MessagePusher>,
    clock: Arc<dyn Clock>,
}

impl FanOutDispatcher {
    pub fn new(
        directory: Arc<ConversationDirectory>,
        registry: Arc<ConnectionRegistry>,
        deliveries: Arc<dyn DeliveryRepository>,
        pusher: Arc<dyn MessagePusher>,
        clock: Arc<dyn Clock>,
    ) -> Self {
        Self {
            directory,
            registry,
            deliveries,
            pusher,
            clock,
        }
    }

    /// Fan a freshly sequenced message out to the conversation.
    ///
    /// The sender's own connections receive the message too, but no delivery record
    /// is kept for the sender. Recipients without a reachable connection get a
    /// `pending` record.
    pub async fn dispatch(&self, message: &Message) -> Result<(), ChatError> {
        let participants = self
            .directory
            .participants_of(&message.conversation_id)
            .await?;
        let event = ConversationEvent::Message(message.clone());
        let now = Timestamp::new(self.clock.now_millis());

        let mut records = Vec::with_capacity(participants.len());
        for participant in participants {
            let reached = self.push_to_user(&participant, &event).await;
            for connection_id in &reached {
                self.registry
                    .advance_cursor(
                        connection_id,
                        message.conversation_id,
                        message.sequence.previous(),
                        message.sequence,
                    )
                    .await;
            }

            if participant == message.sender_id {
                continue;
            }
            if reached.is_empty() {
                records.push(DeliveryRecord::pending(message, participant, now));
            } else {
                records.push(DeliveryRecord::delivered(message, participant, now));
            }
        }

        let delivered: Vec<DeliveryRecord> = records
            .iter()
            .filter(|record| record.delivered_at.is_some())
            .cloned()
            .collect();
        let pending = records.len() - delivered.len();
        self.deliveries.insert_many(records).await?;
        for record in &delivered {
            self.notify_receipt(record).await;
        }

        tracing::debug!(
            "Dispatched message {} (seq {}) of conversation '{}': {} delivered, {} pending",
            message.id,
            message.sequence,
            message.conversation_id,
            delivered.len(),
            pending
        );
        Ok(())
    }

    /// Push a new revision (edit or tombstone) of an already dispatched message.
    /// Delivery records are left as they are.
    pub async fn dispatch_update(&self, message: &Message) -> Result<(), ChatError> {
        let participants = self
            .directory
            .participants_of(&message.conversation_id)
            .await?;
        self.push_to_users(&participants, &ConversationEvent::Message(message.clone()))
            .await;
        Ok(())
    }

    /// Mark a message as read by `recipient_id`.
    ///
    /// A no-op returning `None` when the record is already `read` or does not exist.
    pub async fn acknowledge_read(
        &self,
        message_id: &MessageId,
        recipient_id: &UserId,
    ) -> Result<Option<DeliveryRecord>, ChatError> {
        let now = Timestamp::new(self.clock.now_millis());
        let record = self
            .deliveries
            .mark_read(message_id, recipient_id, now)
            .await?;
        match &record {
            Some(record) => self.notify_receipt(record).await,
            None => tracing::debug!(
                "Read ack of message {} by '{}' changed nothing",
                message_id,
                recipient_id
            ),
        }
        Ok(record)
    }

    /// Tell the original sender about a delivery-state change.
    pub async fn notify_receipt(&self, record: &DeliveryRecord) {
        let event = ConversationEvent::DeliveryReceipt {
            message_id: record.message_id,
            conversation_id: record.conversation_id,
            sequence: record.sequence,
            recipient_id: record.recipient_id.clone(),
            state: record.state,
        };
        self.push_to_user(&record.sender_id, &event).await;
    }

    /// Push an event to every active connection of `users`.
    pub async fn push_to_users(&self, users: &[UserId], event: &ConversationEvent) {
        for user_id in users {
            self.push_to_user(user_id, event).await;
        }
    }

    /// Push to all connections of one user; returns the connections that accepted
    /// the event.
    async fn push_to_user(&self, user_id: &UserId, event: &ConversationEvent) -> Vec<ConnectionId> {
        let connections = self.registry.active_connections_for(user_id).await;
        if connections.is_empty() {
            return Vec::new();
        }

        let pushes = connections.iter().map(|connection_id| async move {
            match self.pusher.push_to(connection_id, event).await {
                Ok(()) => Some(*connection_id),
                Err(e) => {
                    tracing::warn!(
                        "Failed to push to connection '{}' of user '{}': {}",
                        connection_id,
                        user_id,
                        e
                    );
                    None
                }
            }
        });
        join_all(pushes).await.into_iter().flatten().collect()
    }
}

/// Deduplicated participants other than `user_id`.
pub(crate) fn peers_of<'a>(
    user_id: &UserId,
    participants: impl IntoIterator<Item = &'a UserId>,
) -> Vec<UserId> {
    let mut seen = HashSet::new();
    participants
        .into_iter()
        .filter(|peer| *peer != user_id && seen.insert((*peer).clone()))
        .cloned()
        .collect()
}
