//! In-memory implementations of the domain repositories.

mod conversation;
mod delivery;
mod message_log;
mod user;

pub use conversation::InMemoryConversationRepository;
pub use delivery::InMemoryDeliveryRepository;
pub use message_log::InMemoryMessageLog;
pub use user::InMemoryUserDirectory;
