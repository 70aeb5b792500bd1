//! DeskWire API Library
//!
//! This crate contains the chat session router: the WebSocket transport,
//! the conversation lifecycle, and the HTTP surfaces for widget and agents.

pub mod auth;
pub mod chat;
pub mod config;
pub mod error;
pub mod routes;
pub mod state;
pub mod websocket;

pub use config::Config;
pub use error::{ApiError, ApiResult};
pub use state::AppState;
