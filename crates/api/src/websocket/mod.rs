//! WebSocket transport for real-time chat
//!
//! Binds live sockets to the chat core:
//! - **Connection**: one live handle per party, with a bounded outbound queue
//! - **Registry**: who is online, and the only place that decides it
//! - **Session**: the per-socket task that decodes frames and feeds the router
//! - **Events**: wire-format definitions for both directions

pub mod connection;
pub mod events;
pub mod registry;
pub mod session;

pub use registry::{ConnectionRegistry, Delivery};
pub use session::ws_handler;
