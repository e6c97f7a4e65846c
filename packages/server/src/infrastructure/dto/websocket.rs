//! WebSocket frame DTOs.
//!
//! Frames are JSON text messages tagged by a kebab-case `type` field.

use serde::{Deserialize, Serialize};

/// Frames sent by clients
#[derive(Debug, Clone, PartialEq, Eq, Serialize, Deserialize)]
#[serde(tag = "type", rename_all = "kebab-case")]
pub enum ClientMessage {
    /// Append a message to a conversation
    Send {
        conversation_id: String,
        content: String,
        /// Opaque client token echoed back in `sent`/`error`
        #[serde(default, skip_serializing_if = "Option::is_none")]
        client_message_id: Option<String>,
    },
    /// Read receipt
    Ack { message_id: String },
    /// Request messages after `last_known_sequence`. Without it the server resumes
    /// from the last message it knows reached this connection.
    ResyncRequest {
        conversation_id: String,
        #[serde(default, skip_serializing_if = "Option::is_none")]
        last_known_sequence: Option<u64>,
    },
    Edit {
        message_id: String,
        content: String,
    },
    Delete {
        message_id: String,
    },
}

/// Frames sent by the server
#[derive(Debug, Clone, PartialEq, Eq, Serialize, Deserialize)]
#[serde(tag = "type", rename_all = "kebab-case")]
pub enum ServerMessage {
    /// First frame on every connection
    Connected {
        connection_id: String,
        user_id: String,
    },
    MessageDelivered {
        message: MessageDto,
    },
    PresenceChanged {
        user_id: String,
        state: PresenceStateDto,
    },
    DeliveryReceipt {
        message_id: String,
        conversation_id: String,
        sequence: u64,
        recipient_id: String,
        state: DeliveryStateDto,
    },
    /// Replayed messages, ascending by sequence. Live `message-delivered` frames are
    /// not ordered relative to a batch; clients merge both by sequence and drop
    /// duplicates.
    ResyncBatch {
        conversation_id: String,
        messages: Vec<MessageDto>,
        /// `true` when no further messages are known past this batch
        complete: bool,
    },
    /// The sender's `send` was sequenced
    Sent {
        #[serde(default, skip_serializing_if = "Option::is_none")]
        client_message_id: Option<String>,
        message_id: String,
        sequence: u64,
    },
    Error {
        code: String,
        message: String,
        #[serde(default, skip_serializing_if = "Option::is_none")]
        client_message_id: Option<String>,
    },
}

/// Message as seen by clients
#[derive(Debug, Clone, PartialEq, Eq, Serialize, Deserialize)]
pub struct MessageDto {
    pub id: String,
    pub conversation_id: String,
    pub sender_id: String,
    /// `None` once the message is deleted
    pub content: Option<String>,
    pub deleted: bool,
    pub sequence: u64,
    /// Unix milliseconds
    pub created_at: i64,
    /// Unix milliseconds of the last edit or delete
    pub updated_at: Option<i64>,
}

#[derive(Debug, Clone, Copy, PartialEq, Eq, Serialize, Deserialize)]
#[serde(rename_all = "lowercase")]
pub enum PresenceStateDto {
    Online,
    Offline,
}

#[derive(Debug, Clone, Copy, PartialEq, Eq, Serialize, Deserialize)]
#[serde(rename_all = "lowercase")]
pub enum DeliveryStateDto {
    Pending,
    Delivered,
    Read,
}
