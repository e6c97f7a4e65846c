//! Error taxonomy of the synchronization engine.

use thiserror::Error;

use crate::domain::{
    AuthError, ConversationError, ConversationId, LogError, MessageError, MessageId,
    RepositoryError, ValueObjectError,
};

/// Errors surfaced by the engine's use cases.
///
/// Validation errors (`InvalidParticipants`, `NotAParticipant`, `NotGroup`,
/// `AlreadyMember`, `InvalidContent`) are raised before any state is touched.
#[derive(Debug, Clone, PartialEq, Eq, Error)]
pub enum ChatError {
    #[error("invalid participants: {0}")]
    InvalidParticipants(String),

    #[error("user is not a participant of the conversation")]
    NotAParticipant,

    #[error("conversation '{0}' not found")]
    ConversationNotFound(ConversationId),

    #[error("unauthenticated")]
    Unauthenticated,

    #[error("message could not be persisted in time")]
    PersistenceTimeout,

    #[error("user is already a member of the conversation")]
    AlreadyMember,

    #[error("conversation is not a group")]
    NotGroup,

    #[error("message '{0}' not found")]
    MessageNotFound(MessageId),

    #[error("only the sender may change a message")]
    NotMessageSender,

    #[error("message has been deleted")]
    MessageDeleted,

    #[error("invalid content: {0}")]
    InvalidContent(String),

    #[error("connection session not found")]
    SessionNotFound,

    #[error("storage error: {0}")]
    Storage(String),
}

impl ChatError {
    /// Stable machine-readable code sent to clients.
    pub fn code(&self) -> &'static str {
        match self {
            Self::InvalidParticipants(_) => "invalid-participants",
            Self::NotAParticipant => "not-a-participant",
            Self::ConversationNotFound(_) => "conversation-not-found",
            Self::Unauthenticated => "unauthenticated",
            Self::PersistenceTimeout => "persistence-timeout",
            Self::AlreadyMember => "already-member",
            Self::NotGroup => "not-group",
            Self::MessageNotFound(_) => "message-not-found",
            Self::NotMessageSender => "not-message-sender",
            Self::MessageDeleted => "message-deleted",
            Self::InvalidContent(_) => "invalid-content",
            Self::SessionNotFound => "session-not-found",
            Self::Storage(_) => "storage",
        }
    }
}

impl From<ConversationError> for ChatError {
    fn from(error: ConversationError) -> Self {
        match error {
            ConversationError::InvalidParticipants(reason) => Self::InvalidParticipants(reason),
            ConversationError::NotGroup => Self::NotGroup,
            ConversationError::AlreadyMember => Self::AlreadyMember,
            ConversationError::NotAParticipant => Self::NotAParticipant,
            ConversationError::SequenceOutOfOrder { .. } => Self::Storage(error.to_string()),
        }
    }
}

impl From<RepositoryError> for ChatError {
    fn from(error: RepositoryError) -> Self {
        match error {
            RepositoryError::ConversationNotFound(id) => Self::ConversationNotFound(id),
            RepositoryError::Conversation(inner) => inner.into(),
            RepositoryError::DuplicateConversation(_) | RepositoryError::Unavailable(_) => {
                Self::Storage(error.to_string())
            }
        }
    }
}

impl From<LogError> for ChatError {
    fn from(error: LogError) -> Self {
        match error {
            LogError::MessageNotFound(id) => Self::MessageNotFound(id),
            other => Self::Storage(other.to_string()),
        }
    }
}

impl From<AuthError> for ChatError {
    fn from(error: AuthError) -> Self {
        match error {
            AuthError::Unauthenticated => Self::Unauthenticated,
            AuthError::Unavailable(reason) => Self::Storage(reason),
        }
    }
}

impl From<MessageError> for ChatError {
    fn from(error: MessageError) -> Self {
        match error {
            MessageError::Deleted => Self::MessageDeleted,
        }
    }
}

impl From<ValueObjectError> for ChatError {
    fn from(error: ValueObjectError) -> Self {
        Self::InvalidContent(error.to_string())
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn test_repository_error_maps_to_taxonomy() {
        // テスト項目: リポジトリのエラーがエンジンのエラー分類に変換される
        // given (前提条件):
        let id = ConversationId::generate();

        // when (操作):
        let not_found: ChatError = RepositoryError::ConversationNotFound(id).into();
        let not_group: ChatError =
            RepositoryError::Conversation(ConversationError::NotGroup).into();
        let unavailable: ChatError = RepositoryError::Unavailable("down".to_string()).into();

        // then (期待する結果):
        assert_eq!(not_found, ChatError::ConversationNotFound(id));
        assert_eq!(not_group, ChatError::NotGroup);
        assert!(matches!(unavailable, ChatError::Storage(_)));
    }

    #[test]
    fn test_error_codes_are_kebab_case() {
        // テスト項目: クライアント向けのエラーコードが kebab-case である
        // given (前提条件):
        let errors = [
            ChatError::PersistenceTimeout,
            ChatError::NotAParticipant,
            ChatError::InvalidParticipants("x".to_string()),
        ];

        // when (操作):
        let codes: Vec<&str> = errors.iter().map(ChatError::code).collect();

        // then (期待する結果):
        assert_eq!(
            codes,
            vec!["persistence-timeout", "not-a-participant", "invalid-participants"]
        );
    }
}
