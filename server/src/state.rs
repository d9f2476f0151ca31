use std::sync::Arc;

use crate::config::RealtimeConfig;
use crate::realtime::{ConnectionLifecycle, SessionRegistry};
use crate::store::{Directory, MessageStore};

/// Shared application state passed to all handlers via axum State extractor.
#[derive(Clone)]
pub struct AppState {
    /// Admission, presence and routing over the live session registry
    pub realtime: ConnectionLifecycle,
    /// Persisted chat history, written by the request layer only
    pub messages: Arc<dyn MessageStore>,
    /// Friends and communities lookup
    pub directory: Arc<dyn Directory>,
    /// Realtime settings (keepalive timings)
    pub realtime_config: Arc<RealtimeConfig>,
}

impl AppState {
    pub fn new(
        realtime_config: RealtimeConfig,
        messages: Arc<dyn MessageStore>,
        directory: Arc<dyn Directory>,
    ) -> Self {
        let registry = Arc::new(SessionRegistry::new());
        Self {
            realtime: ConnectionLifecycle::new(registry, &realtime_config),
            messages,
            directory,
            realtime_config: Arc::new(realtime_config),
        }
    }
}
