//! Chat core: conversation lifecycle, message routing, and storage
//!
//! The transport-independent heart of the service:
//! - **Store**: durable boundary for conversations, messages, and customers
//! - **Lifecycle**: the one place conversation status changes
//! - **Router**: persist-then-relay for every message, whatever carried it
//! - **Assignment**: pluggable policy for picking up waiting conversations

pub mod assignment;
pub mod error;
pub mod lifecycle;
pub mod memory;
pub mod router;
pub mod store;

pub use assignment::{AssignmentPolicy, NoAutoAssign};
pub use error::{ChatError, ChatResult};
pub use lifecycle::ConversationLifecycle;
pub use memory::MemoryConversationStore;
pub use router::{InboundMessage, MessageRouter};
pub use store::{ConversationStore, PgConversationStore};
