//! Engine assembly.
//!
//! Wires the in-memory collaborators, the engine components and the use cases
//! together, and runs the presence tracker in the background.

use std::sync::Arc;

use chatter_shared::time::{Clock, SystemClock};
use tokio::{sync::mpsc, task::JoinHandle};

use crate::{
    config::{EngineConfig, StoreKind},
    domain::MessageLog,
    infrastructure::{
        message_pusher::WebSocketMessagePusher,
        repository::{
            InMemoryConversationRepository, InMemoryDeliveryRepository, InMemoryMessageLog,
            InMemoryUserDirectory,
        },
    },
    usecase::{
        ConnectParticipantUseCase, ConnectionRegistry, ConversationDirectory,
        DisconnectParticipantUseCase, FanOutDispatcher, MessageSequencer, PresenceTracker,
        ResyncService, SendMessageUseCase,
    },
};

/// A running synchronization engine.
///
/// Must be created inside a Tokio runtime. Dropping it stops the presence tracker.
pub struct Engine {
    pub users: Arc<InMemoryUserDirectory>,
    pub directory: Arc<ConversationDirectory>,
    pub registry: Arc<ConnectionRegistry>,
    pub dispatcher: Arc<FanOutDispatcher>,
    pub sequencer: Arc<MessageSequencer>,
    pub resync: Arc<ResyncService>,
    pub presence: PresenceTracker,
    pub connect_participant_usecase: Arc<ConnectParticipantUseCase>,
    pub disconnect_participant_usecase: Arc<DisconnectParticipantUseCase>,
    pub send_message_usecase: Arc<SendMessageUseCase>,
    config: EngineConfig,
    presence_task: JoinHandle<()>,
}

impl Engine {
    pub fn new(config: EngineConfig) -> Self {
        let log = match config.store {
            StoreKind::Memory => Arc::new(InMemoryMessageLog::new()),
        };
        Self::with_collaborators(config, Arc::new(SystemClock), log)
    }

    /// Build an engine around a given clock and message log.
    pub fn with_collaborators(
        config: EngineConfig,
        clock: Arc<dyn Clock>,
        log: Arc<dyn MessageLog>,
    ) -> Self {
        // 1. Collaborators
        let users = Arc::new(InMemoryUserDirectory::new(clock.clone()));
        let conversations = Arc::new(InMemoryConversationRepository::new());
        let deliveries = Arc::new(InMemoryDeliveryRepository::new());
        let message_pusher = Arc::new(WebSocketMessagePusher::new(config.send_timeout));

        // 2. Engine components
        let (transitions_tx, transitions_rx) = mpsc::unbounded_channel();
        let registry = Arc::new(ConnectionRegistry::new(
            clock.clone(),
            config.idle_after,
            transitions_tx,
        ));
        let directory = Arc::new(ConversationDirectory::new(
            conversations,
            users.clone(),
            clock.clone(),
        ));
        let dispatcher = Arc::new(FanOutDispatcher::new(
            directory.clone(),
            registry.clone(),
            deliveries.clone(),
            message_pusher.clone(),
            clock.clone(),
        ));
        let sequencer = Arc::new(MessageSequencer::new(
            directory.clone(),
            log,
            dispatcher.clone(),
            clock.clone(),
            config.persist_timeout,
            config.max_page_size,
        ));
        let resync = Arc::new(ResyncService::new(
            registry.clone(),
            directory.clone(),
            sequencer.clone(),
            deliveries,
            dispatcher.clone(),
            clock,
            config.resync_page_size,
        ));
        let presence = PresenceTracker::new(
            registry.clone(),
            directory.clone(),
            dispatcher.clone(),
            config.presence_grace,
        );
        let presence_task = presence.spawn(transitions_rx);

        // 3. UseCases
        let connect_participant_usecase = Arc::new(ConnectParticipantUseCase::new(
            users.clone(),
            registry.clone(),
            message_pusher.clone(),
        ));
        let disconnect_participant_usecase = Arc::new(DisconnectParticipantUseCase::new(
            registry.clone(),
            message_pusher,
        ));
        let send_message_usecase = Arc::new(SendMessageUseCase::new(
            registry.clone(),
            sequencer.clone(),
            dispatcher.clone(),
        ));

        tracing::debug!("Engine assembled with {:?}", config);
        Self {
            users,
            directory,
            registry,
            dispatcher,
            sequencer,
            resync,
            presence,
            connect_participant_usecase,
            disconnect_participant_usecase,
            send_message_usecase,
            config,
            presence_task,
        }
    }

    pub fn config(&self) -> &EngineConfig {
        &self.config
    }
}

impl Drop for Engine {
    fn drop(&mut self) {
        self.presence_task.abort();
    }
}
