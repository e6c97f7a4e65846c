//! InMemory User Directory 実装
//!
//! 認証基盤の代わりとなるインメモリ実装。ユーザー登録時に bearer トークンを発行し、
//! 接続時にトークンからユーザーを解決します。

use std::{collections::HashMap, sync::Arc};

use async_trait::async_trait;
use chatter_shared::time::Clock;
use tokio::sync::RwLock;
use uuid::Uuid;

use crate::domain::{AuthError, Authenticator, ConnectionId, DisplayName, Timestamp, User, UserId};

#[derive(Default)]
struct DirectoryState {
    users: HashMap<UserId, User>,
    tokens: HashMap<String, UserId>,
}

pub struct InMemoryUserDirectory {
    state: RwLock<DirectoryState>,
    clock: Arc<dyn Clock>,
}

impl InMemoryUserDirectory {
    pub fn new(clock: Arc<dyn Clock>) -> Self {
        Self {
            state: RwLock::new(DirectoryState::default()),
            clock,
        }
    }

    /// Register a new user and issue their bearer token.
    pub async fn register(
        &self,
        display_name: DisplayName,
        avatar: Option<String>,
    ) -> (User, String) {
        let user = User::new(
            UserId::generate(),
            display_name,
            avatar,
            Timestamp::new(self.clock.now_millis()),
        );
        let token = Uuid::new_v4().simple().to_string();

        let mut state = self.state.write().await;
        state.users.insert(user.id.clone(), user.clone());
        state.tokens.insert(token.clone(), user.id.clone());
        tracing::info!(
            "Registered user '{}' ({})",
            user.id,
            user.display_name.as_str()
        );
        (user, token)
    }

    /// Change the mutable parts of a profile. Returns `None` for unknown users.
    pub async fn update_profile(
        &self,
        user_id: &UserId,
        display_name: Option<DisplayName>,
        avatar: Option<Option<String>>,
    ) -> Option<User> {
        let mut state = self.state.write().await;
        let user = state.users.get_mut(user_id)?;
        if let Some(display_name) = display_name {
            user.display_name = display_name;
        }
        if let Some(avatar) = avatar {
            user.avatar = avatar;
        }
        Some(user.clone())
    }
}

#[async_trait]
impl Authenticator for InMemoryUserDirectory {
    async fn authenticate(
        &self,
        connection_id: &ConnectionId,
        token: &str,
    ) -> Result<UserId, AuthError> {
        let state = self.state.read().await;
        match state.tokens.get(token) {
            Some(user_id) => {
                tracing::debug!(
                    "Connection '{}' authenticated as '{}'",
                    connection_id,
                    user_id
                );
                Ok(user_id.clone())
            }
            None => Err(AuthError::Unauthenticated),
        }
    }

    async fn find_user(&self, user_id: &UserId) -> Result<Option<User>, AuthError> {
        let state = self.state.read().await;
        Ok(state.users.get(user_id).cloned())
    }
}
