use std::sync::Arc;

use crate::config::ServerConfig;
use crate::core::edit_session::EditSessionManager;
use crate::core::heartbeat;
use crate::core::history::ConversationStore;
use crate::core::polaroid::PolaroidQueue;
use crate::core::providers::Providers;
use crate::core::registry::ConnectionRegistry;
use crate::core::streaming::StreamRegistry;

/// Application state shared across handlers and maintenance tasks
pub struct AppState {
    pub config: ServerConfig,
    pub registry: Arc<ConnectionRegistry>,
    pub polaroid: Arc<PolaroidQueue>,
    pub edit_sessions: Arc<EditSessionManager>,
    pub streams: Arc<StreamRegistry>,
    pub history: Arc<ConversationStore>,
    pub providers: Providers,
}

impl AppState {
    /// Build state with providers derived from the configuration
    pub fn new(config: ServerConfig) -> Arc<Self> {
        let providers = Providers::from_config(&config);
        Self::with_providers(config, providers)
    }

    /// Build state with explicit providers (tests inject mocks here)
    pub fn with_providers(config: ServerConfig, providers: Providers) -> Arc<Self> {
        let registry = Arc::new(ConnectionRegistry::new());
        let polaroid = PolaroidQueue::new(registry.clone(), config.polaroid_timeout);
        let edit_sessions = Arc::new(EditSessionManager::new(config.edit_session_idle));
        let streams = Arc::new(StreamRegistry::new(registry.clone(), config.stream_idle));
        let history = Arc::new(ConversationStore::new());

        Arc::new(Self {
            config,
            registry,
            polaroid,
            edit_sessions,
            streams,
            history,
            providers,
        })
    }

    /// Start the heartbeat loops and the expiry sweeps. Called once at boot;
    /// tests drive the underlying `*_once`/`sweep` functions directly instead.
    pub fn spawn_maintenance(self: &Arc<Self>) {
        heartbeat::spawn_heartbeat(self.clone());

        let edit_state = self.clone();
        tokio::spawn(async move {
            let mut interval = tokio::time::interval(edit_state.config.edit_session_sweep);
            interval.tick().await;
            loop {
                interval.tick().await;
                edit_state.edit_sessions.sweep();
            }
        });

        let stream_state = self.clone();
        tokio::spawn(async move {
            let mut interval = tokio::time::interval(stream_state.config.stream_idle);
            interval.tick().await;
            loop {
                interval.tick().await;
                stream_state.streams.sweep();
            }
        });
    }
}
