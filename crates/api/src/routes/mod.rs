//! API routes

pub mod agent;
pub mod chat;
pub mod health;

use axum::{
    extract::DefaultBodyLimit,
    middleware,
    routing::{get, post},
    Router,
};
use tower_http::{cors::CorsLayer, trace::TraceLayer};

use crate::{auth::require_agent_auth, state::AppState, websocket::ws_handler};

/// Create all API routes
pub fn create_router(state: AppState) -> Router {
    let agent_auth = state.agent_auth();

    // Health check routes (at root level for infrastructure monitoring)
    let health_routes = Router::new()
        .route("/health", get(health::health))
        .route("/health/live", get(health::liveness))
        .route("/health/ready", get(health::readiness));

    // Widget routes (no account auth; the session token is the capability)
    let chat_routes = Router::new()
        .route("/chat/init", post(chat::init_chat))
        .route("/chat/messages", post(chat::send_message))
        .route(
            "/chat/conversations/:conversation_id/messages",
            get(chat::conversation_messages),
        )
        .route(
            "/chat/conversations/:conversation_id/read",
            post(chat::mark_read),
        )
        .route(
            "/chat/conversations/:conversation_id/unread-count",
            get(chat::unread_count),
        )
        .route(
            "/chat/conversations/:conversation_id/end",
            post(chat::end_conversation),
        )
        .route(
            "/chat/conversations/:conversation_id/satisfaction",
            post(chat::rate_conversation),
        );

    // Agent console routes (bearer token required)
    let agent_routes = Router::new()
        .route(
            "/agent/conversations/pending",
            get(agent::pending_conversations),
        )
        .route(
            "/agent/conversations/active",
            get(agent::active_conversations),
        )
        .route(
            "/agent/conversations/:conversation_id",
            get(agent::conversation_detail),
        )
        .route(
            "/agent/conversations/:conversation_id/assign",
            post(agent::assign_conversation),
        )
        .route(
            "/agent/conversations/:conversation_id/auto-assign",
            post(agent::auto_assign_conversation),
        )
        .route(
            "/agent/conversations/:conversation_id/transfer",
            post(agent::transfer_conversation),
        )
        .route(
            "/agent/conversations/:conversation_id/end",
            post(agent::end_conversation),
        )
        .route(
            "/agent/conversations/:conversation_id/read",
            post(agent::mark_read),
        )
        .route("/agent/messages", post(agent::send_message))
        .route(
            "/agent/messages/:message_id/recall",
            post(agent::recall_message),
        )
        .route("/agent/stats", get(agent::stats))
        .layer(middleware::from_fn_with_state(
            agent_auth,
            require_agent_auth,
        ));

    // WebSocket route (identity comes from the path; one connection per party)
    let websocket_routes = Router::new().route("/ws/chat/:party_kind/:party_id", get(ws_handler));

    let api_v1_routes = Router::new().merge(chat_routes).merge(agent_routes);

    Router::new()
        .merge(health_routes)
        .merge(websocket_routes)
        .nest("/api/v1", api_v1_routes)
        .layer(TraceLayer::new_for_http())
        // The widget is embedded on arbitrary customer sites
        .layer(CorsLayer::permissive())
        .layer(DefaultBodyLimit::max(10 * 1024 * 1024)) // 10MB global limit
        .with_state(state)
}
