//! Conversion logic between DTOs and domain entities.

use chatter_shared::time::timestamp_to_rfc3339;

use crate::domain::{
    Conversation, ConversationEvent, DeliveryState, Liveness, Message, PresenceState, User,
};
use crate::infrastructure::dto::{http, websocket as dto};

// ========================================
// Domain Entity → DTO
// ========================================

impl From<&Message> for dto::MessageDto {
    fn from(model: &Message) -> Self {
        Self {
            id: model.id.to_string(),
            conversation_id: model.conversation_id.to_string(),
            sender_id: model.sender_id.to_string(),
            content: model.content().map(|content| content.as_str().to_string()),
            deleted: model.is_deleted(),
            sequence: model.sequence.value(),
            created_at: model.created_at.value(),
            updated_at: model.updated_at.map(|at| at.value()),
        }
    }
}

impl From<PresenceState> for dto::PresenceStateDto {
    fn from(state: PresenceState) -> Self {
        match state {
            PresenceState::Online => Self::Online,
            PresenceState::Offline => Self::Offline,
        }
    }
}

impl From<DeliveryState> for dto::DeliveryStateDto {
    fn from(state: DeliveryState) -> Self {
        match state {
            DeliveryState::Pending => Self::Pending,
            DeliveryState::Delivered => Self::Delivered,
            DeliveryState::Read => Self::Read,
        }
    }
}

impl From<Liveness> for http::LivenessDto {
    fn from(liveness: Liveness) -> Self {
        match liveness {
            Liveness::Connected => Self::Connected,
            Liveness::Idle => Self::Idle,
            Liveness::Disconnected => Self::Disconnected,
        }
    }
}

impl From<&ConversationEvent> for dto::ServerMessage {
    fn from(event: &ConversationEvent) -> Self {
        match event {
            ConversationEvent::Message(message) => Self::MessageDelivered {
                message: message.into(),
            },
            ConversationEvent::Presence { user_id, state } => Self::PresenceChanged {
                user_id: user_id.to_string(),
                state: (*state).into(),
            },
            ConversationEvent::DeliveryReceipt {
                message_id,
                conversation_id,
                sequence,
                recipient_id,
                state,
            } => Self::DeliveryReceipt {
                message_id: message_id.to_string(),
                conversation_id: conversation_id.to_string(),
                sequence: sequence.value(),
                recipient_id: recipient_id.to_string(),
                state: (*state).into(),
            },
        }
    }
}

impl From<&User> for http::UserDto {
    fn from(model: &User) -> Self {
        Self {
            id: model.id.to_string(),
            display_name: model.display_name.as_str().to_string(),
            avatar: model.avatar.clone(),
            created_at: timestamp_to_rfc3339(model.created_at.value()),
        }
    }
}

impl From<&Conversation> for http::ConversationDto {
    fn from(model: &Conversation) -> Self {
        Self {
            id: model.id.to_string(),
            name: model.name.clone(),
            is_group: model.is_group,
            participants: model.participants.iter().map(|id| id.to_string()).collect(),
            last_sequence: model.last_sequence.value(),
            created_at: timestamp_to_rfc3339(model.created_at.value()),
        }
    }
}
