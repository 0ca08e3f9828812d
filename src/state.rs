// src/state.rs
use std::sync::Arc;

use crate::config::SessionSettings;
use crate::services::session_manager::SessionManager;
use crate::services::upstream::ChatBackend;

pub type SharedState = Arc<AppState>;

pub struct AppState {
    pub sessions: SessionManager,
}

impl AppState {
    pub fn new(backend: Arc<dyn ChatBackend>, settings: SessionSettings) -> Self {
        Self {
            sessions: SessionManager::new(
                backend,
                settings.model,
                settings.ttl,
                settings.max_sessions,
            ),
        }
    }
}
