//! Repository implementations.
//!
//! Only the in-memory engine is built in; it backs the `memory://` store URL.

pub mod inmemory;

pub use inmemory::{
    InMemoryConversationRepository, InMemoryDeliveryRepository, InMemoryMessageLog,
    InMemoryUserDirectory,
};
