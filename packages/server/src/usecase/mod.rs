//! UseCase layer: the engine's components and the operations exposed to the UI layer.

pub mod connect_participant;
pub mod connection_registry;
pub mod conversation_directory;
pub mod disconnect_participant;
pub mod dispatcher;
pub mod error;
pub mod presence;
pub mod resync;
pub mod send_message;
pub mod sequencer;

#[cfg(test)]
pub(crate) mod test_support;

pub use connect_participant::ConnectParticipantUseCase;
pub use connection_registry::{ConnectionRegistry, SessionHandle};
pub use conversation_directory::ConversationDirectory;
pub use disconnect_participant::DisconnectParticipantUseCase;
pub use dispatcher::FanOutDispatcher;
pub use error::ChatError;
pub use presence::PresenceTracker;
pub use resync::{ResyncBatch, ResyncService};
pub use send_message::SendMessageUseCase;
pub use sequencer::MessageSequencer;
