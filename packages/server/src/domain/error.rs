//! Domain-level errors.
//!
//! Errors raised by value objects, entities, and the collaborator traits the domain
//! depends on. The use-case layer folds these into [`crate::usecase::ChatError`].

use thiserror::Error;

use super::value_object::{ConversationId, MessageId, Sequence};

/// Validation failures of value objects
#[derive(Debug, Clone, PartialEq, Eq, Error)]
pub enum ValueObjectError {
    #[error("user id must not be empty")]
    EmptyUserId,

    #[error("user id must be at most {max} characters")]
    UserIdTooLong { max: usize },

    #[error("'{0}' is not a valid identifier")]
    InvalidId(String),

    #[error("message content must not be empty")]
    EmptyContent,

    #[error("message content is {actual} characters, the limit is {max}")]
    ContentTooLong { max: usize, actual: usize },

    #[error("display name must not be empty")]
    EmptyDisplayName,

    #[error("display name must be at most {max} characters")]
    DisplayNameTooLong { max: usize },
}

/// Invariant violations on a conversation
#[derive(Debug, Clone, PartialEq, Eq, Error)]
pub enum ConversationError {
    #[error("invalid participants: {0}")]
    InvalidParticipants(String),

    #[error("conversation is not a group")]
    NotGroup,

    #[error("user is already a member")]
    AlreadyMember,

    #[error("user is not a participant")]
    NotAParticipant,

    #[error("sequence {got} does not follow {current}")]
    SequenceOutOfOrder { current: Sequence, got: Sequence },
}

/// Invalid transitions on a message
#[derive(Debug, Clone, PartialEq, Eq, Error)]
pub enum MessageError {
    #[error("message has been deleted")]
    Deleted,
}

/// Errors from conversation and delivery repositories
#[derive(Debug, Clone, PartialEq, Eq, Error)]
pub enum RepositoryError {
    #[error("conversation '{0}' not found")]
    ConversationNotFound(ConversationId),

    #[error("conversation '{0}' already exists")]
    DuplicateConversation(ConversationId),

    #[error(transparent)]
    Conversation(#[from] ConversationError),

    #[error("repository unavailable: {0}")]
    Unavailable(String),
}

/// Errors from the durable message log
#[derive(Debug, Clone, PartialEq, Eq, Error)]
pub enum LogError {
    #[error("sequence {got} in conversation '{conversation_id}' does not follow {expected}")]
    NonContiguous {
        conversation_id: ConversationId,
        expected: Sequence,
        got: Sequence,
    },

    #[error("message '{0}' already exists")]
    DuplicateMessage(MessageId),

    #[error("message '{0}' not found")]
    MessageNotFound(MessageId),

    #[error("log unavailable: {0}")]
    Unavailable(String),
}

/// Errors from the authentication collaborator
#[derive(Debug, Clone, PartialEq, Eq, Error)]
pub enum AuthError {
    #[error("unauthenticated")]
    Unauthenticated,

    #[error("authentication backend unavailable: {0}")]
    Unavailable(String),
}

/// Errors from pushing frames to a connection
#[derive(Debug, Clone, PartialEq, Eq, Error)]
pub enum MessagePushError {
    #[error("connection '{0}' not found")]
    ConnectionNotFound(String),

    #[error("connection '{0}' did not drain its send buffer in time")]
    SendTimeout(String),

    #[error("failed to push message: {0}")]
    PushFailed(String),
}
