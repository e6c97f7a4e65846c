//! HTTP and WebSocket handlers.

mod http;
mod websocket;

pub use http::{
    add_participant, create_conversation, get_conversation, get_messages, get_presence, get_user,
    health_check, register_user, remove_participant, update_user,
};
pub use websocket::websocket_handler;
