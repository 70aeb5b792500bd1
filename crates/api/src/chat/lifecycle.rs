//! Conversation lifecycle
//!
//! The single authority for status transitions. Both the live transport and
//! the HTTP agent surface drive conversations through this service, so every
//! transition is validated in one place and written with a conditional
//! update that loses gracefully under concurrency.

use std::sync::Arc;

use deskwire_shared::{
    Conversation, ConversationKind, ConversationPriority, ConversationStatus, NewConversation,
    SatisfactionRating,
};
use rand::Rng;
use time::format_description::FormatItem;
use time::macros::format_description;
use time::OffsetDateTime;

use super::assignment::AssignmentPolicy;
use super::error::{ChatError, ChatResult};
use super::store::ConversationStore;

/// How many fresh session tokens to try before giving up on a collision
const TOKEN_MINT_ATTEMPTS: u32 = 3;

const TOKEN_TIMESTAMP: &[FormatItem<'static>] =
    format_description!("[year][month][day][hour][minute][second]");

pub struct ConversationLifecycle {
    store: Arc<dyn ConversationStore>,
    policy: Arc<dyn AssignmentPolicy>,
}

impl ConversationLifecycle {
    pub fn new(store: Arc<dyn ConversationStore>, policy: Arc<dyn AssignmentPolicy>) -> Self {
        Self { store, policy }
    }

    /// Open a Pending conversation under a fresh session token.
    ///
    /// The store enforces token uniqueness; a collision gets a regenerated
    /// token and another attempt.
    pub async fn create(
        &self,
        customer_id: i64,
        channel: &str,
        kind: ConversationKind,
    ) -> ChatResult<Conversation> {
        for attempt in 1..=TOKEN_MINT_ATTEMPTS {
            let new = NewConversation {
                session_token: mint_session_token(),
                customer_id,
                channel: channel.to_string(),
                kind,
                priority: ConversationPriority::default(),
            };

            match self.store.insert_conversation(new).await {
                Ok(conversation) => {
                    tracing::info!(
                        conversation_id = conversation.id,
                        customer_id,
                        channel,
                        "Conversation created"
                    );
                    return Ok(conversation);
                }
                Err(ChatError::TokenCollision) => {
                    tracing::warn!(attempt, customer_id, "Session token collision, retrying");
                }
                Err(err) => return Err(err),
            }
        }

        Err(ChatError::StoreUnavailable(format!(
            "could not mint a unique session token in {TOKEN_MINT_ATTEMPTS} attempts"
        )))
    }

    /// Assign an agent. Pending and Transferred conversations become Active;
    /// re-assigning the agent that already owns an Active conversation is a
    /// no-op.
    pub async fn assign(&self, conversation_id: i64, agent_id: i64) -> ChatResult<Conversation> {
        let conversation = self.require(conversation_id).await?;

        match conversation.status {
            ConversationStatus::Active => {
                if conversation.agent_id == Some(agent_id) {
                    return Ok(conversation);
                }
                Err(ChatError::InvalidTransition(format!(
                    "conversation {conversation_id} is already active under another agent; transfer it instead"
                )))
            }
            ConversationStatus::Ended => Err(ChatError::InvalidTransition(format!(
                "conversation {conversation_id} is ended"
            ))),
            ConversationStatus::Pending | ConversationStatus::Transferred => {
                let updated = self
                    .store
                    .update_assignment(
                        conversation_id,
                        agent_id,
                        &[ConversationStatus::Pending, ConversationStatus::Transferred],
                    )
                    .await?;

                if !updated {
                    // Lost the race; report against whatever won
                    let current = self.require(conversation_id).await?;
                    if current.status == ConversationStatus::Active
                        && current.agent_id == Some(agent_id)
                    {
                        return Ok(current);
                    }
                    return Err(ChatError::Conflict(format!(
                        "conversation {conversation_id} changed concurrently (now {})",
                        current.status
                    )));
                }

                tracing::info!(conversation_id, agent_id, "Conversation assigned");
                self.require(conversation_id).await
            }
        }
    }

    /// Ask the assignment policy for an agent. `None` leaves the
    /// conversation Pending for a manual pickup.
    pub async fn auto_assign(&self, conversation_id: i64) -> ChatResult<Option<i64>> {
        let conversation = self.require(conversation_id).await?;
        match self.policy.select_agent(&conversation).await {
            Some(agent_id) => {
                self.assign(conversation_id, agent_id).await?;
                Ok(Some(agent_id))
            }
            None => Ok(None),
        }
    }

    /// Hand an Active conversation from one agent to another. The
    /// conversation stays Active for the customer; only ownership and the
    /// transfer counter change.
    pub async fn transfer(
        &self,
        conversation_id: i64,
        from_agent: i64,
        to_agent: i64,
    ) -> ChatResult<Conversation> {
        let conversation = self.require(conversation_id).await?;

        if conversation.status != ConversationStatus::Active
            || conversation.agent_id != Some(from_agent)
        {
            return Err(ChatError::Conflict(format!(
                "conversation {conversation_id} is {} under agent {:?}, not active under agent {from_agent}",
                conversation.status, conversation.agent_id
            )));
        }

        let updated = self
            .store
            .transfer_assignment(conversation_id, from_agent, to_agent)
            .await?;
        if !updated {
            return Err(ChatError::Conflict(format!(
                "conversation {conversation_id} changed concurrently"
            )));
        }

        tracing::info!(conversation_id, from_agent, to_agent, "Conversation transferred");
        self.require(conversation_id).await
    }

    /// Close a conversation and record its duration. Ending an Ended
    /// conversation is a no-op that returns it unchanged.
    pub async fn end(&self, conversation_id: i64) -> ChatResult<Conversation> {
        let conversation = self.require(conversation_id).await?;
        if conversation.status.is_ended() {
            return Ok(conversation);
        }

        let ended_at = OffsetDateTime::now_utc();
        let duration_secs = (ended_at - conversation.started_at).whole_seconds().max(0) as i32;

        let updated = self
            .store
            .end_conversation(conversation_id, ended_at, duration_secs)
            .await?;
        if updated {
            tracing::info!(conversation_id, duration_secs, "Conversation ended");
        }

        // Losing the race means someone else ended it first; same outcome
        self.require(conversation_id).await
    }

    /// Record a satisfaction rating. Allowed in any state, including after
    /// the conversation has ended.
    pub async fn set_satisfaction(
        &self,
        conversation_id: i64,
        rating: SatisfactionRating,
    ) -> ChatResult<()> {
        let updated = self
            .store
            .update_satisfaction(conversation_id, rating)
            .await?;
        if !updated {
            return Err(ChatError::UnknownConversation(conversation_id));
        }
        tracing::info!(conversation_id, rating = rating.value(), "Satisfaction recorded");
        Ok(())
    }

    async fn require(&self, conversation_id: i64) -> ChatResult<Conversation> {
        self.store
            .conversation(conversation_id)
            .await?
            .ok_or(ChatError::UnknownConversation(conversation_id))
    }
}

/// Session tokens look like `CS20250101093000a1b2c3`: a UTC timestamp plus a
/// short random suffix. Uniqueness is enforced by the store, not the format.
fn mint_session_token() -> String {
    let bytes: [u8; 3] = rand::thread_rng().gen();
    format!("CS{}{}", timestamp_now(), hex::encode(bytes))
}

/// Customer numbers share the token shape under a `CUS` prefix
pub(crate) fn mint_customer_no() -> String {
    let bytes: [u8; 2] = rand::thread_rng().gen();
    format!("CUS{}{}", timestamp_now(), hex::encode(bytes))
}

fn timestamp_now() -> String {
    OffsetDateTime::now_utc()
        .format(TOKEN_TIMESTAMP)
        .unwrap_or_else(|_| String::from("00000000000000"))
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn test_session_token_format() {
        let token = mint_session_token();
        // "CS" + 14-digit timestamp + 6 hex chars
        assert_eq!(token.len(), 22);
        assert!(token.starts_with("CS"));
        assert!(token[2..16].chars().all(|c| c.is_ascii_digit()));
        assert!(token[16..].chars().all(|c| c.is_ascii_hexdigit()));
    }

    #[test]
    fn test_customer_no_format() {
        let customer_no = mint_customer_no();
        // "CUS" + 14-digit timestamp + 4 hex chars
        assert_eq!(customer_no.len(), 21);
        assert!(customer_no.starts_with("CUS"));
        assert!(customer_no[3..17].chars().all(|c| c.is_ascii_digit()));
        assert!(customer_no[17..].chars().all(|c| c.is_ascii_hexdigit()));
    }

    #[test]
    fn test_session_tokens_differ() {
        // Same second, different random suffixes
        let first = mint_session_token();
        let second = mint_session_token();
        assert_ne!(first, second);
    }
}
