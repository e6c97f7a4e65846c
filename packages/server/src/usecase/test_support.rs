//! Shared fixtures for use-case tests.

use std::{sync::Arc, time::Duration};

use chatter_shared::time::FixedClock;
use tokio::sync::mpsc;

use crate::{
    domain::{ConnectionId, DisplayName, MessagePusher, PresenceTransition, UserId},
    infrastructure::{
        message_pusher::WebSocketMessagePusher,
        repository::{
            InMemoryConversationRepository, InMemoryDeliveryRepository, InMemoryMessageLog,
            InMemoryUserDirectory,
        },
    },
};

use super::{
    connection_registry::ConnectionRegistry, conversation_directory::ConversationDirectory,
    dispatcher::FanOutDispatcher, resync::ResyncService, sequencer::MessageSequencer,
};

pub(crate) const RESYNC_PAGE_SIZE: usize = 50;

/// In-memory engine parts wired together, without a running presence tracker.
pub(crate) struct Fixture {
    pub clock: Arc<FixedClock>,
    pub users: Arc<InMemoryUserDirectory>,
    pub directory: Arc<ConversationDirectory>,
    pub registry: Arc<ConnectionRegistry>,
    pub pusher: Arc<WebSocketMessagePusher>,
    pub deliveries: Arc<InMemoryDeliveryRepository>,
    pub log: Arc<InMemoryMessageLog>,
    pub dispatcher: Arc<FanOutDispatcher>,
    pub sequencer: Arc<MessageSequencer>,
    pub resync: Arc<ResyncService>,
    pub transitions: Option<mpsc::UnboundedReceiver<PresenceTransition>>,
}

impl Fixture {
    pub fn new() -> Self {
        let clock = Arc::new(FixedClock::new(1_000));
        let users = Arc::new(InMemoryUserDirectory::new(clock.clone()));
        let directory = Arc::new(ConversationDirectory::new(
            Arc::new(InMemoryConversationRepository::new()),
            users.clone(),
            clock.clone(),
        ));
        let (tx, rx) = mpsc::unbounded_channel();
        let registry = Arc::new(ConnectionRegistry::new(
            clock.clone(),
            Duration::from_secs(30),
            tx,
        ));
        let pusher = Arc::new(WebSocketMessagePusher::new(Duration::from_millis(200)));
        let deliveries = Arc::new(InMemoryDeliveryRepository::new());
        let log = Arc::new(InMemoryMessageLog::new());
        let dispatcher = Arc::new(FanOutDispatcher::new(
            directory.clone(),
            registry.clone(),
            deliveries.clone(),
            pusher.clone(),
            clock.clone(),
        ));
        let sequencer = Arc::new(MessageSequencer::new(
            directory.clone(),
            log.clone(),
            dispatcher.clone(),
            clock.clone(),
            Duration::from_secs(1),
            100,
        ));
        let resync = Arc::new(ResyncService::new(
            registry.clone(),
            directory.clone(),
            sequencer.clone(),
            deliveries.clone(),
            dispatcher.clone(),
            clock.clone(),
            RESYNC_PAGE_SIZE,
        ));

        Self {
            clock,
            users,
            directory,
            registry,
            pusher,
            deliveries,
            log,
            dispatcher,
            sequencer,
            resync,
            transitions: Some(rx),
        }
    }

    pub async fn register(&self, name: &str) -> UserId {
        let (user, _token) = self
            .users
            .register(DisplayName::new(name.to_string()).unwrap(), None)
            .await;
        user.id
    }

    /// Admit a connection for `user_id` and attach an outbound queue to it.
    pub async fn connect(&self, user_id: &UserId) -> (ConnectionId, mpsc::Receiver<String>) {
        self.connect_with_capacity(user_id, 64).await
    }

    /// Like [`connect`](Self::connect) with an outbound queue of `capacity` frames.
    pub async fn connect_with_capacity(
        &self,
        user_id: &UserId,
        capacity: usize,
    ) -> (ConnectionId, mpsc::Receiver<String>) {
        let connection_id = ConnectionId::generate();
        let (tx, rx) = mpsc::channel(capacity);
        self.registry.admit(user_id.clone(), connection_id).await;
        self.pusher.register_connection(connection_id, tx).await;
        (connection_id, rx)
    }

    pub async fn disconnect(&self, connection_id: &ConnectionId) {
        self.pusher.unregister_connection(connection_id).await;
        self.registry.remove(connection_id).await;
    }
}

/// Next frame on a connection's queue, parsed as JSON.
pub(crate) async fn recv_frame(rx: &mut mpsc::Receiver<String>) -> serde_json::Value {
    let frame = tokio::time::timeout(Duration::from_secs(1), rx.recv())
        .await
        .expect("timed out waiting for a frame")
        .expect("queue closed");
    serde_json::from_str(&frame).unwrap()
}

/// Assert that nothing arrives on the queue for a short while.
pub(crate) async fn assert_no_frame(rx: &mut mpsc::Receiver<String>) {
    let result = tokio::time::timeout(Duration::from_millis(50), rx.recv()).await;
    assert!(result.is_err(), "unexpected frame: {:?}", result);
}
