//! Shared application state

use std::sync::Arc;

use crate::auth::AgentAuth;
use crate::chat::{AssignmentPolicy, ConversationLifecycle, ConversationStore, MessageRouter};
use crate::config::Config;
use crate::websocket::ConnectionRegistry;

/// State shared by HTTP handlers and WebSocket session tasks
#[derive(Clone)]
pub struct AppState {
    pub config: Arc<Config>,
    pub store: Arc<dyn ConversationStore>,
    pub registry: ConnectionRegistry,
    pub lifecycle: Arc<ConversationLifecycle>,
    pub router: Arc<MessageRouter>,
}

impl AppState {
    /// Wire the chat core together around a store and an assignment policy
    pub fn new(
        config: Config,
        store: Arc<dyn ConversationStore>,
        policy: Arc<dyn AssignmentPolicy>,
    ) -> Self {
        let registry = ConnectionRegistry::new();
        let lifecycle = Arc::new(ConversationLifecycle::new(Arc::clone(&store), policy));
        let router = Arc::new(MessageRouter::new(Arc::clone(&store), registry.clone()));

        Self {
            config: Arc::new(config),
            store,
            registry,
            lifecycle,
            router,
        }
    }

    /// Auth state for the agent route group
    pub fn agent_auth(&self) -> AgentAuth {
        AgentAuth {
            bearer_token: self.config.agent_api_token.clone(),
        }
    }
}
