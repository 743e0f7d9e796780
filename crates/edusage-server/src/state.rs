//! Shared application state.

use std::sync::Arc;

use edusage_chat::ChatService;
use edusage_store::SqliteStore;

/// Shared application state accessible from all route handlers.
pub struct AppState {
    pub store: Arc<SqliteStore>,
    pub chat: ChatService,
}

impl AppState {
    pub fn new(store: Arc<SqliteStore>, chat: ChatService) -> Self {
        Self { store, chat }
    }
}
