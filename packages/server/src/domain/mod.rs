//! Domain layer: value objects, entities, events and the collaborator traits.

pub mod entity;
pub mod error;
pub mod event;
pub mod message_pusher;
pub mod repository;
pub mod value_object;

pub use entity::{
    ConnectionSession, Conversation, DeliveryRecord, DeliveryState, Liveness, Message,
    MessageBody, User,
};
pub use error::{
    AuthError, ConversationError, LogError, MessageError, MessagePushError, RepositoryError,
    ValueObjectError,
};
pub use event::{ConversationEvent, PresenceState, PresenceTransition};
pub use message_pusher::{MessagePusher, PusherChannel};
pub use repository::{
    Authenticator, ConversationRepository, DeliveryRepository, MessageLog,
};
pub use value_object::{
    ConnectionId, ConversationId, DisplayName, MessageContent, MessageId, Sequence, Timestamp,
    UserId,
};

#[cfg(test)]
pub use repository::MockAuthenticator;
