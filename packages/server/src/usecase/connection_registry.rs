//! Connection Registry
//!
//! Tracks live connections, the user each one is authenticated as, and their
//! liveness. Sessions live in an arena keyed by connection id; users only hold the
//! set of their connection ids.
//!
//! Admitting the first connection of a user and removing the last one emit a
//! [`PresenceTransition`]. Transitions are emitted while the registry lock is held,
//! so the presence tracker observes them in the same order the registry applied
//! them.

use std::{
    collections::{HashMap, HashSet},
    sync::Arc,
    time::Duration,
};

use chatter_shared::time::Clock;
use tokio::sync::{Mutex, mpsc};

use crate::domain::{
    ConnectionId, ConnectionSession, ConversationId, Liveness, PresenceTransition, Sequence,
    Timestamp, UserId,
};

/// Identity of an admitted connection.
#[derive(Debug, Clone, PartialEq, Eq)]
pub struct SessionHandle {
    pub connection_id: ConnectionId,
    pub user_id: UserId,
    pub connected_at: Timestamp,
}

impl From<&ConnectionSession> for SessionHandle {
    fn from(session: &ConnectionSession) -> Self {
        Self {
            connection_id: session.connection_id,
            user_id: session.user_id.clone(),
            connected_at: session.connected_at,
        }
    }
}

#[derive(Default)]
struct RegistryState {
    sessions: HashMap<ConnectionId, ConnectionSession>,
    by_user: HashMap<UserId, HashSet<ConnectionId>>,
}

pub struct ConnectionRegistry {
    state: Mutex<RegistryState>,
    transitions: mpsc::UnboundedSender<PresenceTransition>,
    clock: Arc<dyn Clock>,
    idle_after: Duration,
}

impl ConnectionRegistry {
    /// Create a registry that reports presence transitions on `transitions`.
    pub fn new(
        clock: Arc<dyn Clock>,
        idle_after: Duration,
        transitions: mpsc::UnboundedSender<PresenceTransition>,
    ) -> Self {
        Self {
            state: Mutex::new(RegistryState::default()),
            transitions,
            clock,
            idle_after,
        }
    }

    /// Admit a connection for `user_id`.
    ///
    /// Several connections per user are allowed. Admitting an already admitted
    /// connection id returns the existing session.
    pub async fn admit(&self, user_id: UserId, connection_id: ConnectionId) -> SessionHandle {
        let now = Timestamp::new(self.clock.now_millis());
        let mut state = self.state.lock().await;

        if let Some(existing) = state.sessions.get(&connection_id) {
            return SessionHandle::from(existing);
        }

        let session = ConnectionSession::new(connection_id, user_id.clone(), now);
        let handle = SessionHandle::from(&session);
        state.sessions.insert(connection_id, session);

        let connections = state.by_user.entry(user_id.clone()).or_default();
        connections.insert(connection_id);
        if connections.len() == 1 {
            self.emit(PresenceTransition::CameOnline(user_id));
        }

        tracing::debug!(
            "Admitted connection '{}' for user '{}'",
            connection_id,
            handle.user_id
        );
        handle
    }

    /// Remove a connection. Idempotent; returns the session if it was present.
    pub async fn remove(&self, connection_id: &ConnectionId) -> Option<ConnectionSession> {
        let mut state = self.state.lock().await;
        let session = state.sessions.remove(connection_id)?;

        let last = match state.by_user.get_mut(&session.user_id) {
            Some(connections) => {
                connections.remove(connection_id);
                connections.is_empty()
            }
            None => false,
        };
        if last {
            state.by_user.remove(&session.user_id);
            self.emit(PresenceTransition::WentOffline(session.user_id.clone()));
        }

        tracing::debug!(
            "Removed connection '{}' of user '{}'",
            connection_id,
            session.user_id
        );
        Some(session)
    }

    pub async fn active_connections_for(&self, user_id: &UserId) -> HashSet<ConnectionId> {
        let state = self.state.lock().await;
        state.by_user.get(user_id).cloned().unwrap_or_default()
    }

    pub async fn is_online(&self, user_id: &UserId) -> bool {
        let state = self.state.lock().await;
        state.by_user.contains_key(user_id)
    }

    pub async fn session(&self, connection_id: &ConnectionId) -> Option<ConnectionSession> {
        let state = self.state.lock().await;
        state.sessions.get(connection_id).cloned()
    }

    /// Record activity on a connection. Returns `false` for unknown connections.
    pub async fn touch(&self, connection_id: &ConnectionId) -> bool {
        let now = Timestamp::new(self.clock.now_millis());
        let mut state = self.state.lock().await;
        match state.sessions.get_mut(connection_id) {
            Some(session) => {
                session.last_activity = now;
                true
            }
            None => false,
        }
    }

    pub async fn liveness(&self, connection_id: &ConnectionId) -> Liveness {
        let now = self.clock.now_millis();
        let state = self.state.lock().await;
        match state.sessions.get(connection_id) {
            None => Liveness::Disconnected,
            Some(session) => {
                let silent_for = now.saturating_sub(session.last_activity.value());
                if silent_for > self.idle_after.as_millis() as i64 {
                    Liveness::Idle
                } else {
                    Liveness::Connected
                }
            }
        }
    }

    /// Record that the messages `(after, through]` of `conversation_id` reached the
    /// connection. See [`ConnectionSession::advance_cursor`].
    pub async fn advance_cursor(
        &self,
        connection_id: &ConnectionId,
        conversation_id: ConversationId,
        after: Sequence,
        through: Sequence,
    ) -> bool {
        let mut state = self.state.lock().await;
        match state.sessions.get_mut(connection_id) {
            Some(session) => session.advance_cursor(conversation_id, after, through),
            None => false,
        }
    }

    /// The connection's cursor for `conversation_id`, or `None` for unknown
    /// connections.
    pub async fn cursor(
        &self,
        connection_id: &ConnectionId,
        conversation_id: &ConversationId,
    ) -> Option<Sequence> {
        let state = self.state.lock().await;
        state
            .sessions
            .get(connection_id)
            .map(|session| session.cursor(conversation_id))
    }

    pub async fn connection_count(&self) -> usize {
        self.state.lock().await.sessions.len()
    }

    fn emit(&self, transition: PresenceTransition) {
        if self.transitions.send(transition).is_err() {
            tracing::debug!("Presence tracker is gone, dropping transition");
        }
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use chatter_shared::time::FixedClock;

    fn user(id: &str) -> UserId {
        UserId::new(id.to_string()).unwrap()
    }

    fn create_test_registry() -> (
        ConnectionRegistry,
        mpsc::UnboundedReceiver<PresenceTransition>,
        Arc<FixedClock>,
    ) {
        let clock = Arc::new(FixedClock::new(1_000));
        let (tx, rx) = mpsc::unbounded_channel();
        let registry = ConnectionRegistry::new(clock.clone(), Duration::from_secs(30), tx);
        (registry, rx, clock)
    }

    #[tokio::test]
    async fn test_admit_tracks_multiple_connections_per_user() {
        // テスト項目: 同じユーザーの複数接続がそれぞれ独立して管理される
        // given (前提条件):
        let (registry, _rx, _clock) = create_test_registry();
        let alice = user("alice");
        let (a, b) = (ConnectionId::generate(), ConnectionId::generate());

        // when (操作):
        registry.admit(alice.clone(), a).await;
        registry.admit(alice.clone(), b).await;

        // then (期待する結果):
        let active = registry.active_connections_for(&alice).await;
        assert_eq!(active, HashSet::from([a, b]));
        assert_eq!(registry.connection_count().await, 2);
    }

    #[tokio::test]
    async fn test_transitions_only_on_first_and_last_connection() {
        // テスト項目: 最初の接続と最後の切断のときだけプレゼンス遷移が通知される
        // given (前提条件):
        let (registry, mut rx, _clock) = create_test_registry();
        let alice = user("alice");
        let (a, b) = (ConnectionId::generate(), ConnectionId::generate());

        // when (操作):
        registry.admit(alice.clone(), a).await;
        registry.admit(alice.clone(), b).await;
        registry.remove(&a).await;
        registry.remove(&b).await;

        // then (期待する結果):
        assert_eq!(
            rx.recv().await,
            Some(PresenceTransition::CameOnline(alice.clone()))
        );
        assert_eq!(
            rx.recv().await,
            Some(PresenceTransition::WentOffline(alice.clone()))
        );
        assert!(rx.try_recv().is_err());
    }

    #[tokio::test]
    async fn test_remove_is_idempotent() {
        // テスト項目: 同じ接続を 2 回削除してもエラーにならず、遷移も 1 回だけ
        // given (前提条件):
        let (registry, mut rx, _clock) = create_test_registry();
        let alice = user("alice");
        let a = ConnectionId::generate();
        registry.admit(alice.clone(), a).await;

        // when (操作):
        let first = registry.remove(&a).await;
        let second = registry.remove(&a).await;

        // then (期待する結果):
        assert!(first.is_some());
        assert!(second.is_none());
        assert!(!registry.is_online(&alice).await);
        assert_eq!(
            rx.recv().await,
            Some(PresenceTransition::CameOnline(alice.clone()))
        );
        assert_eq!(rx.recv().await, Some(PresenceTransition::WentOffline(alice)));
        assert!(rx.try_recv().is_err());
    }

    #[tokio::test]
    async fn test_admit_same_connection_twice_returns_existing_session() {
        // テスト項目: 同じ接続 ID の再登録は既存セッションを返し、遷移を重複させない
        // given (前提条件):
        let (registry, mut rx, _clock) = create_test_registry();
        let a = ConnectionId::generate();

        // when (操作):
        let first = registry.admit(user("alice"), a).await;
        let second = registry.admit(user("alice"), a).await;

        // then (期待する結果):
        assert_eq!(first, second);
        assert_eq!(registry.connection_count().await, 1);
        assert!(rx.recv().await.is_some());
        assert!(rx.try_recv().is_err());
    }

    #[tokio::test]
    async fn test_liveness_goes_idle_without_activity() {
        // テスト項目: 一定時間操作がない接続は idle、操作があれば connected に戻る
        // given (前提条件):
        let (registry, _rx, clock) = create_test_registry();
        let a = ConnectionId::generate();
        registry.admit(user("alice"), a).await;

        // when (操作):
        let fresh = registry.liveness(&a).await;
        clock.advance(31_000);
        let stale = registry.liveness(&a).await;
        registry.touch(&a).await;
        let touched = registry.liveness(&a).await;
        let unknown = registry.liveness(&ConnectionId::generate()).await;

        // then (期待する結果):
        assert_eq!(fresh, Liveness::Connected);
        assert_eq!(stale, Liveness::Idle);
        assert_eq!(touched, Liveness::Connected);
        assert_eq!(unknown, Liveness::Disconnected);
    }

    #[tokio::test]
    async fn test_advance_cursor_updates_session() {
        // テスト項目: 接続ごとのカーソルが前進する
        // given (前提条件):
        let (registry, _rx, _clock) = create_test_registry();
        let a = ConnectionId::generate();
        let conversation_id = ConversationId::generate();
        registry.admit(user("alice"), a).await;

        // when (操作):
        let moved = registry
            .advance_cursor(&a, conversation_id, Sequence::ZERO, Sequence::new(4))
            .await;
        let unknown = registry
            .advance_cursor(
                &ConnectionId::generate(),
                conversation_id,
                Sequence::ZERO,
                Sequence::new(4),
            )
            .await;

        // then (期待する結果):
        assert!(moved);
        assert!(!unknown);
        assert_eq!(
            registry.cursor(&a, &conversation_id).await,
            Some(Sequence::new(4))
        );
        assert_eq!(
            registry
                .cursor(&ConnectionId::generate(), &conversation_id)
                .await,
            None
        );
    }
}
