//! Presence Tracker
//!
//! Folds the registry's presence transitions into a per-user online/offline state.
//! Going online is immediate. Going offline waits out a grace window, and is
//! dropped if the user reconnected in the meantime, so a quick reconnect never
//! reaches peers. Every state change is pushed to the peers the user shares a
//! conversation with.

use std::{collections::HashMap, sync::Arc, time::Duration};

use tokio::{
    sync::{Mutex, mpsc},
    task::JoinHandle,
};

use crate::domain::{ConversationEvent, PresenceState, PresenceTransition, UserId};

use super::{
    connection_registry::ConnectionRegistry,
    conversation_directory::ConversationDirectory,
    dispatcher::{FanOutDispatcher, peers_of},
};

#[derive(Debug, Clone, Copy)]
struct UserPresence {
    state: PresenceState,
    /// Bumped on every transition; a grace timer only fires if it still matches.
    generation: u64,
}

struct TrackerInner {
    users: Mutex<HashMap<UserId, UserPresence>>,
    registry: Arc<ConnectionRegistry>,
    directory: Arc<ConversationDirectory>,
    dispatcher: Arc<FanOutDispatcher>,
    grace: Duration,
}

#[derive(Clone)]
pub struct PresenceTracker {
    inner: Arc<TrackerInner>,
}

impl PresenceTracker {
    pub fn new(
        registry: Arc<ConnectionRegistry>,
        directory: Arc<ConversationDirectory>,
        dispatcher: Arc<FanOutDispatcher>,
        grace: Duration,
    ) -> Self {
        Self {
            inner: Arc::new(TrackerInner {
                users: Mutex::new(HashMap::new()),
                registry,
                directory,
                dispatcher,
                grace,
            }),
        }
    }

    /// Consume the registry's transitions until the registry is dropped.
    pub fn spawn(
        &self,
        mut transitions: mpsc::UnboundedReceiver<PresenceTransition>,
    ) -> JoinHandle<()> {
        let inner = self.inner.clone();
        tokio::spawn(async move {
            while let Some(transition) = transitions.recv().await {
                inner.apply(transition).await;
            }
            tracing::debug!("Presence tracker stopped");
        })
    }

    /// Current aggregated state; users never seen are offline.
    pub async fn presence_of(&self, user_id: &UserId) -> PresenceState {
        self.inner
            .users
            .lock()
            .await
            .get(user_id)
            .map(|presence| presence.state)
            .unwrap_or(PresenceState::Offline)
    }
}

impl TrackerInner {
    async fn apply(self: &Arc<Self>, transition: PresenceTransition) {
        match transition {
            PresenceTransition::CameOnline(user_id) => {
                let changed = {
                    let mut users = self.users.lock().await;
                    let presence = users.entry(user_id.clone()).or_insert(UserPresence {
                        state: PresenceState::Offline,
                        generation: 0,
                    });
                    presence.generation += 1;
                    let changed = presence.state == PresenceState::Offline;
                    presence.state = PresenceState::Online;
                    changed
                };
                if changed {
                    self.broadcast(&user_id, PresenceState::Online).await;
                } else {
                    tracing::debug!("User '{}' reconnected within the grace window", user_id);
                }
            }
            PresenceTransition::WentOffline(user_id) => {
                let generation = {
                    let mut users = self.users.lock().await;
                    let Some(presence) = users.get_mut(&user_id) else {
                        return;
                    };
                    presence.generation += 1;
                    presence.generation
                };

                let inner = self.clone();
                tokio::spawn(async move {
                    tokio::time::sleep(inner.grace).await;
                    inner.expire(user_id, generation).await;
                });
            }
        }
    }

    /// End of a grace window: go offline unless something happened since.
    async fn expire(&self, user_id: UserId, generation: u64) {
        {
            let mut users = self.users.lock().await;
            let Some(presence) = users.get_mut(&user_id) else {
                return;
            };
            if presence.generation != generation || presence.state == PresenceState::Offline {
                return;
            }
            if self.registry.is_online(&user_id).await {
                return;
            }
            presence.state = PresenceState::Offline;
        }
        self.broadcast(&user_id, PresenceState::Offline).await;
    }

    async fn broadcast(&self, user_id: &UserId, state: PresenceState) {
        let conversations = match self.directory.conversations_of(user_id).await {
            Ok(conversations) => conversations,
            Err(e) => {
                tracing::warn!("Failed to look up conversations of '{}': {}", user_id, e);
                return;
            }
        };
        let peers = peers_of(
            user_id,
            conversations
                .iter()
                .flat_map(|conversation| conversation.participants.iter()),
        );

        tracing::info!(
            "User '{}' is now {:?}; notifying {} peers",
            user_id,
            state,
            peers.len()
        );
        let event = ConversationEvent::Presence {
            user_id: user_id.clone(),
            state,
        };
        self.dispatcher.push_to_users(&peers, &event).await;
    }
}
