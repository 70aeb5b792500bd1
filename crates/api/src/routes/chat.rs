//! Customer chat endpoints (the widget surface)
//!
//! No account auth here: the session token handed out by `init` is the
//! capability the widget holds, and messages always resolve to the durable
//! customer behind the conversation.

use axum::{
    extract::{Path, Query, State},
    Json,
};
use deskwire_shared::{
    Conversation, ConversationKind, ConversationStatus, Customer, Message, MessageKind,
    NewCustomer, PartyIdentity, PartyKind, SatisfactionRating,
};
use serde::{Deserialize, Serialize};
use time::OffsetDateTime;

use crate::chat::lifecycle::mint_customer_no;
use crate::chat::InboundMessage;
use crate::error::{ApiError, ApiResult};
use crate::state::AppState;

/// Display name for customers that never supplied one
const DEFAULT_CUSTOMER_NAME: &str = "Guest";

const DEFAULT_CHANNEL: &str = "web";

const MAX_PER_PAGE: i64 = 200;

// ====== Request/Response Types ======

#[derive(Debug, Deserialize)]
pub struct InitChatRequest {
    /// Returning customers present the number they were handed before
    pub customer_no: Option<String>,
    /// Previous session token, to resume an open conversation
    pub session_token: Option<String>,
    pub name: Option<String>,
    pub phone: Option<String>,
    pub email: Option<String>,
    pub channel: Option<String>,
    pub kind: Option<ConversationKind>,
}

#[derive(Debug, Serialize)]
pub struct InitChatResponse {
    pub customer_id: i64,
    pub customer_no: String,
    pub customer_name: String,
    pub conversation_id: i64,
    pub session_token: String,
    pub status: ConversationStatus,
    pub agent_id: Option<i64>,
}

#[derive(Debug, Deserialize)]
pub struct SendMessageRequest {
    pub conversation_id: i64,
    /// The sender's customer number, used to echo the confirmation frame
    pub customer_no: String,
    pub content: String,
    #[serde(default)]
    pub message_type: MessageKind,
    pub sender_name: Option<String>,
    pub file_url: Option<String>,
    pub file_name: Option<String>,
    pub file_size: Option<i64>,
}

#[derive(Debug, Deserialize)]
pub struct PageQuery {
    #[serde(default = "default_page")]
    pub page: i64,
    #[serde(default = "default_per_page")]
    pub per_page: i64,
}

fn default_page() -> i64 {
    1
}

fn default_per_page() -> i64 {
    50
}

#[derive(Debug, Serialize)]
pub struct MessagesPageResponse {
    pub page: i64,
    pub per_page: i64,
    pub messages: Vec<Message>,
}

#[derive(Debug, Serialize)]
pub struct ReadReceiptResponse {
    pub updated: u64,
}

#[derive(Debug, Serialize)]
pub struct UnreadCountResponse {
    pub count: i64,
}

#[derive(Debug, Deserialize)]
pub struct SatisfactionRequest {
    pub rating: i16,
}

// ====== Handlers ======

/// `POST /api/v1/chat/init` - open or resume a widget session
///
/// Finds or provisions the customer, then resumes the conversation behind
/// the presented session token if it still belongs to this customer and has
/// not ended. Anything else gets a fresh conversation.
pub async fn init_chat(
    State(state): State<AppState>,
    Json(req): Json<InitChatRequest>,
) -> ApiResult<Json<InitChatResponse>> {
    let customer = resolve_customer(&state, &req).await?;

    if let Some(token) = req.session_token.as_deref() {
        if let Some(conversation) = state.store.conversation_by_token(token).await? {
            if conversation.customer_id == customer.id && !conversation.status.is_ended() {
                tracing::debug!(
                    conversation_id = conversation.id,
                    customer_id = customer.id,
                    "Resuming conversation"
                );
                return Ok(Json(init_response(customer, conversation)));
            }
        }
    }

    let channel = req.channel.as_deref().unwrap_or(DEFAULT_CHANNEL);
    let kind = req.kind.unwrap_or_default();
    let conversation = state.lifecycle.create(customer.id, channel, kind).await?;

    // The policy may hand the fresh conversation straight to an agent
    let conversation = match state.lifecycle.auto_assign(conversation.id).await? {
        Some(_) => state
            .store
            .conversation(conversation.id)
            .await?
            .unwrap_or(conversation),
        None => conversation,
    };

    Ok(Json(init_response(customer, conversation)))
}

/// `POST /api/v1/chat/messages` - send a message over HTTP
///
/// Same path as a WebSocket send: the router persists first, then relays to
/// whoever is connected. The stored message comes back in the response.
pub async fn send_message(
    State(state): State<AppState>,
    Json(req): Json<SendMessageRequest>,
) -> ApiResult<Json<Message>> {
    let sender = PartyIdentity::customer(req.customer_no);
    let inbound = InboundMessage {
        conversation_id: req.conversation_id,
        kind: req.message_type,
        content: req.content,
        sender_name: req
            .sender_name
            .unwrap_or_else(|| DEFAULT_CUSTOMER_NAME.to_string()),
        file_url: req.file_url,
        file_name: req.file_name,
        file_size: req.file_size,
    };

    let message = state.router.route(&sender, inbound).await?;
    Ok(Json(message))
}

/// `GET /api/v1/chat/conversations/:conversation_id/messages` - history page
pub async fn conversation_messages(
    State(state): State<AppState>,
    Path(conversation_id): Path<i64>,
    Query(query): Query<PageQuery>,
) -> ApiResult<Json<MessagesPageResponse>> {
    require_conversation(&state, conversation_id).await?;

    let page = query.page.max(1);
    let per_page = query.per_page.clamp(1, MAX_PER_PAGE);
    let messages = state
        .store
        .messages_page(conversation_id, page, per_page)
        .await?;

    Ok(Json(MessagesPageResponse {
        page,
        per_page,
        messages,
    }))
}

/// `POST /api/v1/chat/conversations/:conversation_id/read` - the customer
/// marks everything the agent sent as read
pub async fn mark_read(
    State(state): State<AppState>,
    Path(conversation_id): Path<i64>,
) -> ApiResult<Json<ReadReceiptResponse>> {
    require_conversation(&state, conversation_id).await?;

    let updated = state
        .store
        .mark_conversation_read(conversation_id, PartyKind::Agent, OffsetDateTime::now_utc())
        .await?;
    Ok(Json(ReadReceiptResponse { updated }))
}

/// `GET /api/v1/chat/conversations/:conversation_id/unread-count` - messages
/// from the agent the customer has not read yet
pub async fn unread_count(
    State(state): State<AppState>,
    Path(conversation_id): Path<i64>,
) -> ApiResult<Json<UnreadCountResponse>> {
    require_conversation(&state, conversation_id).await?;

    let count = state
        .store
        .unread_count(conversation_id, PartyKind::Agent)
        .await?;
    Ok(Json(UnreadCountResponse { count }))
}

/// `POST /api/v1/chat/conversations/:conversation_id/end` - close the
/// conversation from the widget
pub async fn end_conversation(
    State(state): State<AppState>,
    Path(conversation_id): Path<i64>,
) -> ApiResult<Json<Conversation>> {
    let conversation = state.lifecycle.end(conversation_id).await?;
    Ok(Json(conversation))
}

/// `POST /api/v1/chat/conversations/:conversation_id/satisfaction` - leave a
/// 1-5 rating, before or after the conversation ends
pub async fn rate_conversation(
    State(state): State<AppState>,
    Path(conversation_id): Path<i64>,
    Json(req): Json<SatisfactionRequest>,
) -> ApiResult<Json<Conversation>> {
    let rating =
        SatisfactionRating::new(req.rating).map_err(|err| ApiError::Validation(err.to_string()))?;
    state
        .lifecycle
        .set_satisfaction(conversation_id, rating)
        .await?;
    require_conversation(&state, conversation_id).await.map(Json)
}

// ====== Helpers ======

async fn resolve_customer(state: &AppState, req: &InitChatRequest) -> ApiResult<Customer> {
    if let Some(customer_no) = req.customer_no.as_deref() {
        if let Some(existing) = state.store.find_customer_by_number(customer_no).await? {
            return Ok(existing);
        }
    }

    // Unknown or absent number: provision a fresh customer
    let customer = state
        .store
        .insert_customer(NewCustomer {
            customer_no: mint_customer_no(),
            name: req
                .name
                .clone()
                .unwrap_or_else(|| DEFAULT_CUSTOMER_NAME.to_string()),
            phone: req.phone.clone(),
            email: req.email.clone(),
            source: "widget".to_string(),
        })
        .await?;

    tracing::info!(
        customer_id = customer.id,
        customer_no = %customer.customer_no,
        "Customer provisioned"
    );
    Ok(customer)
}

async fn require_conversation(state: &AppState, conversation_id: i64) -> ApiResult<Conversation> {
    state
        .store
        .conversation(conversation_id)
        .await?
        .ok_or(ApiError::ConversationNotFound(conversation_id))
}

fn init_response(customer: Customer, conversation: Conversation) -> InitChatResponse {
    InitChatResponse {
        customer_id: customer.id,
        customer_no: customer.customer_no,
        customer_name: customer.name,
        conversation_id: conversation.id,
        session_token: conversation.session_token,
        status: conversation.status,
        agent_id: conversation.agent_id,
    }
}
