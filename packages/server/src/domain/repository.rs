//! Collaborator traits the domain depends on.
//!
//! Use cases depend on these traits only; the infrastructure layer provides the
//! implementations.

use async_trait::async_trait;

use super::{
    entity::{Conversation, DeliveryRecord, Message, User},
    error::{AuthError, LogError, RepositoryError},
    value_object::{ConnectionId, ConversationId, MessageId, Sequence, Timestamp, UserId},
};

/// Authentication collaborator.
///
/// Resolves the credentials presented at connection time to a user, and answers
/// whether a user id is known.
#[cfg_attr(test, mockall::automock)]
#[async_trait]
pub trait Authenticator: Send + Sync {
    /// Resolve the token presented by `connection_id` to the authenticated user.
    async fn authenticate(
        &self,
        connection_id: &ConnectionId,
        token: &str,
    ) -> Result<UserId, AuthError>;

    /// Look up a user by id.
    async fn find_user(&self, user_id: &UserId) -> Result<Option<User>, AuthError>;
}

/// Storage of conversations and their participant sets.
///
/// Mutations are applied atomically per conversation: a failed invariant check
/// leaves the stored conversation untouched.
#[async_trait]
pub trait ConversationRepository: Send + Sync {
    async fn insert(&self, conversation: Conversation) -> Result<(), RepositoryError>;

    async fn find(
        &self,
        conversation_id: &ConversationId,
    ) -> Result<Option<Conversation>, RepositoryError>;

    async fn add_participant(
        &self,
        conversation_id: &ConversationId,
        user_id: UserId,
    ) -> Result<Conversation, RepositoryError>;

    async fn remove_participant(
        &self,
        conversation_id: &ConversationId,
        user_id: &UserId,
    ) -> Result<Conversation, RepositoryError>;

    /// Persist a newly assigned sequence number as the conversation's counter.
    async fn record_sequence(
        &self,
        conversation_id: &ConversationId,
        sequence: Sequence,
    ) -> Result<(), RepositoryError>;

    /// All conversations `user_id` currently participates in.
    async fn find_by_participant(
        &self,
        user_id: &UserId,
    ) -> Result<Vec<Conversation>, RepositoryError>;
}

/// Durable, append-only message log.
#[async_trait]
pub trait MessageLog: Send + Sync {
    /// Durably append a sequenced message. Returns only once the write is durable.
    async fn append(&self, message: &Message) -> Result<(), LogError>;

    /// Messages of `conversation_id` with sequence strictly greater than `after`,
    /// ascending, at most `limit` of them.
    async fn read_range(
        &self,
        conversation_id: &ConversationId,
        after: Sequence,
        limit: usize,
    ) -> Result<Vec<Message>, LogError>;

    async fn find(&self, message_id: &MessageId) -> Result<Option<Message>, LogError>;

    /// Replace a stored message with a new revision (edit or tombstone). The
    /// sequence number must not change.
    async fn update(&self, message: &Message) -> Result<(), LogError>;
}

/// Storage of delivery records.
#[async_trait]
pub trait DeliveryRepository: Send + Sync {
    /// Store records; an existing (message, recipient) record is kept as is.
    async fn insert_many(&self, records: Vec<DeliveryRecord>) -> Result<(), RepositoryError>;

    async fn find(
        &self,
        message_id: &MessageId,
        recipient_id: &UserId,
    ) -> Result<Option<DeliveryRecord>, RepositoryError>;

    /// Apply `pending -> delivered`. Returns the record if it changed.
    async fn mark_delivered(
        &self,
        message_id: &MessageId,
        recipient_id: &UserId,
        at: Timestamp,
    ) -> Result<Option<DeliveryRecord>, RepositoryError>;

    /// Apply `-> read`. Returns the record if it changed.
    async fn mark_read(
        &self,
        message_id: &MessageId,
        recipient_id: &UserId,
        at: Timestamp,
    ) -> Result<Option<DeliveryRecord>, RepositoryError>;
}
