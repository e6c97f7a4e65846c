//! Entities of the synchronization engine.

use std::collections::HashMap;

use serde::{Deserialize, Serialize};

use super::{
    error::{ConversationError, MessageError},
    value_object::{
        ConnectionId, ConversationId, DisplayName, MessageContent, MessageId, Sequence, Timestamp,
        UserId,
    },
};

/// A user as known to the engine.
///
/// Owned by the authentication collaborator; only the display name and avatar change.
#[derive(Debug, Clone, PartialEq, Eq, Serialize, Deserialize)]
pub struct User {
    pub id: UserId,
    pub display_name: DisplayName,
    pub avatar: Option<String>,
    pub created_at: Timestamp,
}

impl User {
    pub fn new(
        id: UserId,
        display_name: DisplayName,
        avatar: Option<String>,
        created_at: Timestamp,
    ) -> Self {
        Self {
            id,
            display_name,
            avatar,
            created_at,
        }
    }
}

/// A direct or group conversation.
#[derive(Debug, Clone, PartialEq, Eq, Serialize, Deserialize)]
pub struct Conversation {
    pub id: ConversationId,
    pub name: Option<String>,
    pub is_group: bool,
    /// Current participants in the order they joined.
    pub participants: Vec<UserId>,
    /// Sequence number of the last message appended to the log.
    pub last_sequence: Sequence,
    pub created_at: Timestamp,
}

impl Conversation {
    /// Create a conversation, enforcing the participant rules.
    ///
    /// Duplicate ids are collapsed keeping the first occurrence. A direct conversation
    /// needs exactly two distinct participants, a group at least one.
    pub fn new(
        id: ConversationId,
        participant_ids: Vec<UserId>,
        is_group: bool,
        name: Option<String>,
        created_at: Timestamp,
    ) -> Result<Self, ConversationError> {
        let mut participants: Vec<UserId> = Vec::with_capacity(participant_ids.len());
        for user_id in participant_ids {
            if !participants.contains(&user_id) {
                participants.push(user_id);
            }
        }

        if !is_group && participants.len() != 2 {
            return Err(ConversationError::InvalidParticipants(format!(
                "a direct conversation needs exactly 2 distinct participants, got {}",
                participants.len()
            )));
        }
        if participants.is_empty() {
            return Err(ConversationError::InvalidParticipants(
                "a group conversation needs at least 1 participant".to_string(),
            ));
        }

        Ok(Self {
            id,
            name: name.filter(|n| !n.trim().is_empty()),
            is_group,
            participants,
            last_sequence: Sequence::ZERO,
            created_at,
        })
    }

    pub fn is_participant(&self, user_id: &UserId) -> bool {
        self.participants.contains(user_id)
    }

    pub fn add_participant(&mut self, user_id: UserId) -> Result<(), ConversationError> {
        if !self.is_group {
            return Err(ConversationError::NotGroup);
        }
        if self.is_participant(&user_id) {
            return Err(ConversationError::AlreadyMember);
        }
        self.participants.push(user_id);
        Ok(())
    }

    pub fn remove_participant(&mut self, user_id: &UserId) -> Result<(), ConversationError> {
        if !self.is_group {
            return Err(ConversationError::NotGroup);
        }
        let before = self.participants.len();
        self.participants.retain(|id| id != user_id);
        if self.participants.len() == before {
            return Err(ConversationError::NotAParticipant);
        }
        Ok(())
    }

    /// Advance the counter to `sequence`, which must directly follow the current value.
    pub fn record_sequence(&mut self, sequence: Sequence) -> Result<(), ConversationError> {
        if sequence != self.last_sequence.next() {
            return Err(ConversationError::SequenceOutOfOrder {
                current: self.last_sequence,
                got: sequence,
            });
        }
        self.last_sequence = sequence;
        Ok(())
    }
}

/// Body of a message. Deleting replaces the text with a tombstone.
#[derive(Debug, Clone, PartialEq, Eq, Serialize, Deserialize)]
#[serde(tag = "kind", content = "text", rename_all = "snake_case")]
pub enum MessageBody {
    Text(MessageContent),
    Deleted,
}

/// A sequenced chat message.
#[derive(Debug, Clone, PartialEq, Eq, Serialize, Deserialize)]
pub struct Message {
    pub id: MessageId,
    pub conversation_id: ConversationId,
    pub sender_id: UserId,
    pub body: MessageBody,
    pub sequence: Sequence,
    pub created_at: Timestamp,
    /// Set on edit or delete only.
    pub updated_at: Option<Timestamp>,
}

impl Message {
    pub fn new(
        conversation_id: ConversationId,
        sender_id: UserId,
        content: MessageContent,
        sequence: Sequence,
        created_at: Timestamp,
    ) -> Self {
        Self {
            id: MessageId::generate(),
            conversation_id,
            sender_id,
            body: MessageBody::Text(content),
            sequence,
            created_at,
            updated_at: None,
        }
    }

    pub fn is_deleted(&self) -> bool {
        matches!(self.body, MessageBody::Deleted)
    }

    pub fn content(&self) -> Option<&MessageContent> {
        match &self.body {
            MessageBody::Text(content) => Some(content),
            MessageBody::Deleted => None,
        }
    }

    pub fn edit(&mut self, content: MessageContent, at: Timestamp) -> Result<(), MessageError> {
        if self.is_deleted() {
            return Err(MessageError::Deleted);
        }
        self.body = MessageBody::Text(content);
        self.updated_at = Some(at);
        Ok(())
    }

    /// Replace the body with a tombstone. Returns `false` if it already was one.
    pub fn tombstone(&mut self, at: Timestamp) -> bool {
        if self.is_deleted() {
            return false;
        }
        self.body = MessageBody::Deleted;
        self.updated_at = Some(at);
        true
    }
}

/// Delivery state of one message for one recipient.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Serialize, Deserialize)]
#[serde(rename_all = "snake_case")]
pub enum DeliveryState {
    Pending,
    Delivered,
    Read,
}

/// Per-(message, recipient) delivery tracking.
#[derive(Debug, Clone, PartialEq, Eq, Serialize, Deserialize)]
pub struct DeliveryRecord {
    pub message_id: MessageId,
    pub recipient_id: UserId,
    pub conversation_id: ConversationId,
    pub sender_id: UserId,
    pub sequence: Sequence,
    pub state: DeliveryState,
    pub created_at: Timestamp,
    pub delivered_at: Option<Timestamp>,
    pub read_at: Option<Timestamp>,
}

impl DeliveryRecord {
    /// Record for a recipient the message could not be pushed to.
    pub fn pending(message: &Message, recipient_id: UserId, at: Timestamp) -> Self {
        Self {
            message_id: message.id,
            recipient_id,
            conversation_id: message.conversation_id,
            sender_id: message.sender_id.clone(),
            sequence: message.sequence,
            state: DeliveryState::Pending,
            created_at: at,
            delivered_at: None,
            read_at: None,
        }
    }

    /// Record for a recipient that received the message on at least one connection.
    pub fn delivered(message: &Message, recipient_id: UserId, at: Timestamp) -> Self {
        let mut record = Self::pending(message, recipient_id, at);
        record.state = DeliveryState::Delivered;
        record.delivered_at = Some(at);
        record
    }

    /// `pending -> delivered`. Returns whether the state changed.
    pub fn mark_delivered(&mut self, at: Timestamp) -> bool {
        if self.state != DeliveryState::Pending {
            return false;
        }
        self.state = DeliveryState::Delivered;
        self.delivered_at = Some(at);
        true
    }

    /// `pending | delivered -> read`. Returns whether the state changed.
    ///
    /// Reading a message implies it was delivered, so a pending record gets both
    /// timestamps.
    pub fn mark_read(&mut self, at: Timestamp) -> bool {
        match self.state {
            DeliveryState::Read => false,
            DeliveryState::Pending => {
                self.delivered_at = Some(at);
                self.state = DeliveryState::Read;
                self.read_at = Some(at);
                true
            }
            DeliveryState::Delivered => {
                self.state = DeliveryState::Read;
                self.read_at = Some(at);
                true
            }
        }
    }
}

/// Liveness of a connection as seen by the registry.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Serialize, Deserialize)]
#[serde(rename_all = "snake_case")]
pub enum Liveness {
    Connected,
    Idle,
    Disconnected,
}

/// Ephemeral state of one live connection.
#[derive(Debug, Clone, PartialEq, Eq)]
pub struct ConnectionSession {
    pub connection_id: ConnectionId,
    pub user_id: UserId,
    pub connected_at: Timestamp,
    pub last_activity: Timestamp,
    /// Per conversation, the sequence up to which every message is known to have
    /// reached this connection.
    pub cursors: HashMap<ConversationId, Sequence>,
}

impl ConnectionSession {
    pub fn new(connection_id: ConnectionId, user_id: UserId, connected_at: Timestamp) -> Self {
        Self {
            connection_id,
            user_id,
            connected_at,
            last_activity: connected_at,
            cursors: HashMap::new(),
        }
    }

    pub fn cursor(&self, conversation_id: &ConversationId) -> Sequence {
        self.cursors
            .get(conversation_id)
            .copied()
            .unwrap_or(Sequence::ZERO)
    }

    /// Record that every message in `(after, through]` reached this connection.
    ///
    /// The cursor moves to `through` only when the range starts at or before it, so
    /// it never jumps over a message the connection missed. It never moves back.
    /// Returns whether the cursor moved.
    pub fn advance_cursor(
        &mut self,
        conversation_id: ConversationId,
        after: Sequence,
        through: Sequence,
    ) -> bool {
        let cursor = self.cursors.entry(conversation_id).or_insert(Sequence::ZERO);
        if after > *cursor || through <= *cursor {
            return false;
        }
        *cursor = through;
        true
    }
}
