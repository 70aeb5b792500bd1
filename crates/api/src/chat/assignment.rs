//! Agent assignment policy

use async_trait::async_trait;
use deskwire_shared::Conversation;

/// Decides which agent, if any, should pick up a waiting conversation.
///
/// Load balancing and skill matching live behind this seam; the lifecycle
/// never knows how an agent was chosen.
#[async_trait]
pub trait AssignmentPolicy: Send + Sync {
    async fn select_agent(&self, conversation: &Conversation) -> Option<i64>;
}

/// Default policy: never auto-assigns. Conversations stay Pending until an
/// agent claims them from the queue.
pub struct NoAutoAssign;

#[async_trait]
impl AssignmentPolicy for NoAutoAssign {
    async fn select_agent(&self, _conversation: &Conversation) -> Option<i64> {
        None
    }
}
