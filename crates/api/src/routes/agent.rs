//! Agent console endpoints
//!
//! Everything here sits behind the bearer token middleware. Agents drive
//! conversation transitions through the lifecycle and send messages through
//! the same router the widget uses.

use axum::{
    extract::{Path, Query, State},
    Json,
};
use deskwire_shared::{Conversation, Message, MessageKind, PartyIdentity, PartyKind};
use serde::{Deserialize, Serialize};
use time::{OffsetDateTime, Time};

use crate::chat::InboundMessage;
use crate::error::{ApiError, ApiResult};
use crate::routes::chat::{PageQuery, ReadReceiptResponse};
use crate::state::AppState;

const MAX_PER_PAGE: i64 = 200;

// ====== Request/Response Types ======

#[derive(Debug, Deserialize)]
pub struct ActiveQuery {
    pub agent_id: i64,
}

#[derive(Debug, Serialize)]
pub struct ConversationDetailResponse {
    #[serde(flatten)]
    pub conversation: Conversation,
    pub messages: Vec<Message>,
}

#[derive(Debug, Deserialize)]
pub struct AssignRequest {
    pub agent_id: i64,
}

#[derive(Debug, Serialize)]
pub struct AutoAssignResponse {
    pub agent_id: Option<i64>,
}

#[derive(Debug, Deserialize)]
pub struct TransferRequest {
    pub from_agent_id: i64,
    pub to_agent_id: i64,
}

#[derive(Debug, Deserialize)]
pub struct AgentMessageRequest {
    pub conversation_id: i64,
    pub agent_id: i64,
    pub content: String,
    #[serde(default)]
    pub message_type: MessageKind,
    pub sender_name: Option<String>,
    pub file_url: Option<String>,
    pub file_name: Option<String>,
    pub file_size: Option<i64>,
}

#[derive(Debug, Serialize)]
pub struct StatsResponse {
    pub pending_conversations: i64,
    pub conversations_today: i64,
    pub live_connections: usize,
}

// ====== Handlers ======

/// `GET /api/v1/agent/conversations/pending` - the pickup queue, oldest first
pub async fn pending_conversations(
    State(state): State<AppState>,
) -> ApiResult<Json<Vec<Conversation>>> {
    let conversations = state.store.pending_conversations().await?;
    Ok(Json(conversations))
}

/// `GET /api/v1/agent/conversations/active?agent_id=` - one agent's open desk
pub async fn active_conversations(
    State(state): State<AppState>,
    Query(query): Query<ActiveQuery>,
) -> ApiResult<Json<Vec<Conversation>>> {
    let conversations = state.store.active_conversations(query.agent_id).await?;
    Ok(Json(conversations))
}

/// `GET /api/v1/agent/conversations/:conversation_id` - conversation with a
/// page of its history
pub async fn conversation_detail(
    State(state): State<AppState>,
    Path(conversation_id): Path<i64>,
    Query(query): Query<PageQuery>,
) -> ApiResult<Json<ConversationDetailResponse>> {
    let conversation = state
        .store
        .conversation(conversation_id)
        .await?
        .ok_or(ApiError::ConversationNotFound(conversation_id))?;

    let page = query.page.max(1);
    let per_page = query.per_page.clamp(1, MAX_PER_PAGE);
    let messages = state
        .store
        .messages_page(conversation_id, page, per_page)
        .await?;

    Ok(Json(ConversationDetailResponse {
        conversation,
        messages,
    }))
}

/// `POST /api/v1/agent/conversations/:conversation_id/assign` - claim a
/// waiting conversation
pub async fn assign_conversation(
    State(state): State<AppState>,
    Path(conversation_id): Path<i64>,
    Json(req): Json<AssignRequest>,
) -> ApiResult<Json<Conversation>> {
    let conversation = state.lifecycle.assign(conversation_id, req.agent_id).await?;
    Ok(Json(conversation))
}

/// `POST /api/v1/agent/conversations/:conversation_id/auto-assign` - let the
/// assignment policy pick an agent, if it has one
pub async fn auto_assign_conversation(
    State(state): State<AppState>,
    Path(conversation_id): Path<i64>,
) -> ApiResult<Json<AutoAssignResponse>> {
    let agent_id = state.lifecycle.auto_assign(conversation_id).await?;
    Ok(Json(AutoAssignResponse { agent_id }))
}

/// `POST /api/v1/agent/conversations/:conversation_id/transfer` - hand an
/// active conversation to another agent
pub async fn transfer_conversation(
    State(state): State<AppState>,
    Path(conversation_id): Path<i64>,
    Json(req): Json<TransferRequest>,
) -> ApiResult<Json<Conversation>> {
    let conversation = state
        .lifecycle
        .transfer(conversation_id, req.from_agent_id, req.to_agent_id)
        .await?;
    Ok(Json(conversation))
}

/// `POST /api/v1/agent/conversations/:conversation_id/end` - close from the
/// console; idempotent
pub async fn end_conversation(
    State(state): State<AppState>,
    Path(conversation_id): Path<i64>,
) -> ApiResult<Json<Conversation>> {
    let conversation = state.lifecycle.end(conversation_id).await?;
    Ok(Json(conversation))
}

/// `POST /api/v1/agent/conversations/:conversation_id/read` - the agent
/// marks everything the customer sent as read
pub async fn mark_read(
    State(state): State<AppState>,
    Path(conversation_id): Path<i64>,
) -> ApiResult<Json<ReadReceiptResponse>> {
    state
        .store
        .conversation(conversation_id)
        .await?
        .ok_or(ApiError::ConversationNotFound(conversation_id))?;

    let updated = state
        .store
        .mark_conversation_read(
            conversation_id,
            PartyKind::Customer,
            OffsetDateTime::now_utc(),
        )
        .await?;
    Ok(Json(ReadReceiptResponse { updated }))
}

/// `POST /api/v1/agent/messages` - send a message from the console
pub async fn send_message(
    State(state): State<AppState>,
    Json(req): Json<AgentMessageRequest>,
) -> ApiResult<Json<Message>> {
    let sender = PartyIdentity::agent(req.agent_id.to_string());
    let inbound = InboundMessage {
        conversation_id: req.conversation_id,
        kind: req.message_type,
        content: req.content,
        sender_name: req
            .sender_name
            .unwrap_or_else(|| format!("Agent {}", req.agent_id)),
        file_url: req.file_url,
        file_name: req.file_name,
        file_size: req.file_size,
    };

    let message = state.router.route(&sender, inbound).await?;
    Ok(Json(message))
}

/// `POST /api/v1/agent/messages/:message_id/recall` - recall a message the
/// agent side sent
pub async fn recall_message(
    State(state): State<AppState>,
    Path(message_id): Path<i64>,
) -> ApiResult<Json<Message>> {
    let message = state
        .router
        .recall(PartyKind::Agent, message_id)
        .await?
        .ok_or(ApiError::NotFound)?;
    Ok(Json(message))
}

/// `GET /api/v1/agent/stats` - queue depth and traffic at a glance
pub async fn stats(State(state): State<AppState>) -> ApiResult<Json<StatsResponse>> {
    let midnight_utc = OffsetDateTime::now_utc().replace_time(Time::MIDNIGHT);

    let pending = state.store.count_pending().await?;
    let today = state.store.count_started_since(midnight_utc).await?;
    let connections = state.registry.count().await;

    Ok(Json(StatsResponse {
        pending_conversations: pending,
        conversations_today: today,
        live_connections: connections,
    }))
}
