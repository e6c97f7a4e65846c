//! Shared application state.

use std::sync::Arc;

use crate::engine::Engine;

/// Shared application state
pub struct AppState {
    /// Engine（コンポーネントとユースケース一式）
    pub engine: Arc<Engine>,
}
