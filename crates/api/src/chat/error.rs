//! Chat domain error taxonomy

use thiserror::Error;

/// Errors produced by the chat core: lifecycle, routing, and the record store
#[derive(Debug, Error)]
pub enum ChatError {
    #[error("Conversation {0} not found")]
    UnknownConversation(i64),

    #[error("Conversation {0} is ended and accepts no further messages")]
    ConversationClosed(i64),

    #[error("No durable identity for sender {0}")]
    UnknownSender(String),

    #[error("Invalid transition: {0}")]
    InvalidTransition(String),

    #[error("Conflict: {0}")]
    Conflict(String),

    /// Internal retry signal: the minted session token already exists.
    /// Never crosses the API boundary; the lifecycle regenerates and retries.
    #[error("Session token collision")]
    TokenCollision,

    #[error("Record store unavailable: {0}")]
    StoreUnavailable(String),

    #[error("Malformed event: {0}")]
    MalformedEvent(String),
}

impl From<sqlx::Error> for ChatError {
    fn from(err: sqlx::Error) -> Self {
        ChatError::StoreUnavailable(err.to_string())
    }
}

/// Result type alias for chat core operations
pub type ChatResult<T> = Result<T, ChatError>;
