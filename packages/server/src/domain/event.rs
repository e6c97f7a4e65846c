//! Events fanned out to connections.

use serde::{Deserialize, Serialize};

use super::{
    entity::{DeliveryState, Message},
    value_object::{ConversationId, MessageId, Sequence, UserId},
};

/// Aggregated online state of a user across all their connections.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Hash, Serialize, Deserialize)]
#[serde(rename_all = "snake_case")]
pub enum PresenceState {
    Online,
    Offline,
}

/// Emitted by the connection registry when a user's active-connection count
/// crosses 0↔1.
#[derive(Debug, Clone, PartialEq, Eq)]
pub enum PresenceTransition {
    /// First connection admitted.
    CameOnline(UserId),
    /// Last connection removed.
    WentOffline(UserId),
}

impl PresenceTransition {
    pub fn user_id(&self) -> &UserId {
        match self {
            Self::CameOnline(user_id) | Self::WentOffline(user_id) => user_id,
        }
    }
}

/// Everything the dispatcher pushes to conversation participants.
#[derive(Debug, Clone, PartialEq, Eq)]
pub enum ConversationEvent {
    /// A newly sequenced message, or the latest revision of an edited/deleted one.
    Message(Message),
    Presence {
        user_id: UserId,
        state: PresenceState,
    },
    DeliveryReceipt {
        message_id: MessageId,
        conversation_id: ConversationId,
        sequence: Sequence,
        recipient_id: UserId,
        state: DeliveryState,
    },
}
