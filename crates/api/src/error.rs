//! API error types and handling

use axum::{
    http::StatusCode,
    response::{IntoResponse, Response},
    Json,
};
use serde_json::json;

use crate::chat::ChatError;

/// Application error type
#[derive(Debug, thiserror::Error)]
pub enum ApiError {
    // Authentication errors
    #[error("Authentication required")]
    Unauthorized,

    // Validation errors
    #[error("Validation error: {0}")]
    Validation(String),
    #[error("Malformed event: {0}")]
    MalformedEvent(String),

    // Resource errors
    #[error("Resource not found")]
    NotFound,
    #[error("Conversation {0} not found")]
    ConversationNotFound(i64),
    #[error("Conflict: {0}")]
    Conflict(String),

    // Conversation state errors
    #[error("Conversation {0} is ended and accepts no further messages")]
    ConversationClosed(i64),
    #[error("Invalid transition: {0}")]
    InvalidTransition(String),
    #[error("Unknown sender: {0}")]
    UnknownSender(String),

    // Internal errors
    #[error("Internal server error")]
    Internal,
    #[error("Record store unavailable")]
    StoreUnavailable,
}

impl IntoResponse for ApiError {
    fn into_response(self) -> Response {
        let (status, code, message) = match &self {
            // Authentication
            ApiError::Unauthorized => (StatusCode::UNAUTHORIZED, "UNAUTHORIZED", self.to_string()),

            // Validation
            ApiError::Validation(msg) => (StatusCode::BAD_REQUEST, "VALIDATION_ERROR", msg.clone()),
            ApiError::MalformedEvent(msg) => (StatusCode::BAD_REQUEST, "MALFORMED_EVENT", msg.clone()),

            // Resources
            ApiError::NotFound => (StatusCode::NOT_FOUND, "NOT_FOUND", self.to_string()),
            ApiError::ConversationNotFound(_) => (StatusCode::NOT_FOUND, "CONVERSATION_NOT_FOUND", self.to_string()),
            ApiError::Conflict(msg) => (StatusCode::CONFLICT, "CONFLICT", msg.clone()),

            // Conversation state
            ApiError::ConversationClosed(_) => (StatusCode::CONFLICT, "CONVERSATION_CLOSED", self.to_string()),
            ApiError::InvalidTransition(msg) => (StatusCode::CONFLICT, "INVALID_TRANSITION", msg.clone()),
            ApiError::UnknownSender(_) => (StatusCode::UNPROCESSABLE_ENTITY, "UNKNOWN_SENDER", self.to_string()),

            // Internal
            ApiError::Internal => (StatusCode::INTERNAL_SERVER_ERROR, "INTERNAL_ERROR", self.to_string()),
            ApiError::StoreUnavailable => (StatusCode::SERVICE_UNAVAILABLE, "STORE_UNAVAILABLE", self.to_string()),
        };

        let body = Json(json!({
            "error": {
                "code": code,
                "message": message,
            }
        }));

        (status, body).into_response()
    }
}

impl From<ChatError> for ApiError {
    fn from(err: ChatError) -> Self {
        match err {
            ChatError::UnknownConversation(id) => ApiError::ConversationNotFound(id),
            ChatError::ConversationClosed(id) => ApiError::ConversationClosed(id),
            ChatError::UnknownSender(who) => ApiError::UnknownSender(who),
            ChatError::InvalidTransition(msg) => ApiError::InvalidTransition(msg),
            ChatError::Conflict(msg) => ApiError::Conflict(msg),
            ChatError::MalformedEvent(msg) => ApiError::MalformedEvent(msg),
            ChatError::StoreUnavailable(msg) => {
                tracing::error!("Record store unavailable: {msg}");
                ApiError::StoreUnavailable
            }
            // Collisions are retried inside the lifecycle; one leaking out is a bug
            ChatError::TokenCollision => ApiError::Internal,
        }
    }
}

/// Result type alias for API handlers
pub type ApiResult<T> = Result<T, ApiError>;
