//! Conversation record store
//!
//! Every durable read and write goes through [`ConversationStore`]. The
//! lifecycle and router own the precondition logic; the store exposes
//! conditional writes that report whether the guarded row still matched.

use async_trait::async_trait;
use deskwire_shared::{
    Conversation, ConversationStatus, Customer, Message, NewConversation, NewCustomer, NewMessage,
    PartyKind, SatisfactionRating,
};
use sqlx::PgPool;
use time::OffsetDateTime;

use super::error::{ChatError, ChatResult};

/// Durable storage boundary for conversations, messages, and customers
#[async_trait]
pub trait ConversationStore: Send + Sync {
    /// Cheap liveness probe for readiness checks
    async fn ping(&self) -> ChatResult<()>;

    // ====== Conversations ======

    async fn conversation(&self, id: i64) -> ChatResult<Option<Conversation>>;

    async fn conversation_by_token(&self, session_token: &str) -> ChatResult<Option<Conversation>>;

    /// Insert a new Pending conversation. A duplicate session token surfaces
    /// as [`ChatError::TokenCollision`] so the caller can mint a fresh one.
    async fn insert_conversation(&self, new: NewConversation) -> ChatResult<Conversation>;

    /// Unassigned conversations, oldest first
    async fn pending_conversations(&self) -> ChatResult<Vec<Conversation>>;

    /// Active conversations owned by one agent
    async fn active_conversations(&self, agent_id: i64) -> ChatResult<Vec<Conversation>>;

    /// Set the agent and flip the status to Active, but only while the row is
    /// still in one of `expected`. Returns false when the guard missed.
    async fn update_assignment(
        &self,
        id: i64,
        agent_id: i64,
        expected: &[ConversationStatus],
    ) -> ChatResult<bool>;

    /// Move an Active conversation from one agent to another and bump the
    /// transfer counter. Returns false when ownership or status changed.
    async fn transfer_assignment(&self, id: i64, from_agent: i64, to_agent: i64)
        -> ChatResult<bool>;

    /// Close a conversation that is not already Ended
    async fn end_conversation(
        &self,
        id: i64,
        ended_at: OffsetDateTime,
        duration_secs: i32,
    ) -> ChatResult<bool>;

    /// Record a satisfaction rating; allowed in any state
    async fn update_satisfaction(&self, id: i64, rating: SatisfactionRating) -> ChatResult<bool>;

    /// Recompute per-conversation aggregates from the message table
    async fn update_stats(&self, id: i64) -> ChatResult<()>;

    // ====== Messages ======

    /// Persist a message; the store assigns the id and `sent_at`
    async fn insert_message(&self, new: NewMessage) -> ChatResult<Message>;

    async fn message(&self, id: i64) -> ChatResult<Option<Message>>;

    /// One page of conversation history in send order. Pages are 1-based.
    async fn messages_page(
        &self,
        conversation_id: i64,
        page: i64,
        per_page: i64,
    ) -> ChatResult<Vec<Message>>;

    /// Mark one message read. `read_at` keeps its first value on repeat
    /// calls. Returns the updated row, or None for an unknown id.
    async fn mark_message_read(&self, id: i64, at: OffsetDateTime) -> ChatResult<Option<Message>>;

    /// Flip the one-way recalled flag. Read state is untouched.
    async fn recall_message(&self, id: i64, at: OffsetDateTime) -> ChatResult<Option<Message>>;

    /// Mark every unread message from `sender_kind` in a conversation as
    /// read. Returns how many rows flipped.
    async fn mark_conversation_read(
        &self,
        conversation_id: i64,
        sender_kind: PartyKind,
        at: OffsetDateTime,
    ) -> ChatResult<u64>;

    /// Unread messages sent by `sender_kind` in a conversation
    async fn unread_count(&self, conversation_id: i64, sender_kind: PartyKind) -> ChatResult<i64>;

    // ====== Customers ======

    async fn customer(&self, id: i64) -> ChatResult<Option<Customer>>;

    async fn find_customer_by_number(&self, customer_no: &str) -> ChatResult<Option<Customer>>;

    async fn insert_customer(&self, new: NewCustomer) -> ChatResult<Customer>;

    // ====== Aggregates ======

    async fn count_pending(&self) -> ChatResult<i64>;

    /// Conversations started at or after `since`
    async fn count_started_since(&self, since: OffsetDateTime) -> ChatResult<i64>;
}

/// Postgres-backed store
pub struct PgConversationStore {
    pool: PgPool,
}

impl PgConversationStore {
    pub fn new(pool: PgPool) -> Self {
        Self { pool }
    }
}

fn is_unique_violation(err: &sqlx::Error) -> bool {
    match err {
        sqlx::Error::Database(db_err) => db_err.code().as_deref() == Some("23505"),
        _ => false,
    }
}

#[async_trait]
impl ConversationStore for PgConversationStore {
    async fn ping(&self) -> ChatResult<()> {
        sqlx::query("SELECT 1").execute(&self.pool).await?;
        Ok(())
    }

    async fn conversation(&self, id: i64) -> ChatResult<Option<Conversation>> {
        let conversation =
            sqlx::query_as::<_, Conversation>("SELECT * FROM conversations WHERE id = $1")
                .bind(id)
                .fetch_optional(&self.pool)
                .await?;
        Ok(conversation)
    }

    async fn conversation_by_token(&self, session_token: &str) -> ChatResult<Option<Conversation>> {
        let conversation = sqlx::query_as::<_, Conversation>(
            "SELECT * FROM conversations WHERE session_token = $1",
        )
        .bind(session_token)
        .fetch_optional(&self.pool)
        .await?;
        Ok(conversation)
    }

    async fn insert_conversation(&self, new: NewConversation) -> ChatResult<Conversation> {
        let result = sqlx::query_as::<_, Conversation>(
            r#"
            INSERT INTO conversations (session_token, customer_id, channel, kind, status, priority)
            VALUES ($1, $2, $3, $4, 'pending', $5)
            RETURNING *
            "#,
        )
        .bind(&new.session_token)
        .bind(new.customer_id)
        .bind(&new.channel)
        .bind(new.kind)
        .bind(new.priority)
        .fetch_one(&self.pool)
        .await;

        match result {
            Ok(conversation) => Ok(conversation),
            Err(err) if is_unique_violation(&err) => Err(ChatError::TokenCollision),
            Err(err) => Err(err.into()),
        }
    }

    async fn pending_conversations(&self) -> ChatResult<Vec<Conversation>> {
        let conversations = sqlx::query_as::<_, Conversation>(
            "SELECT * FROM conversations WHERE status = 'pending' ORDER BY started_at ASC",
        )
        .fetch_all(&self.pool)
        .await?;
        Ok(conversations)
    }

    async fn active_conversations(&self, agent_id: i64) -> ChatResult<Vec<Conversation>> {
        let conversations = sqlx::query_as::<_, Conversation>(
            r#"
            SELECT * FROM conversations
            WHERE agent_id = $1 AND status = 'active'
            ORDER BY started_at ASC
            "#,
        )
        .bind(agent_id)
        .fetch_all(&self.pool)
        .await?;
        Ok(conversations)
    }

    async fn update_assignment(
        &self,
        id: i64,
        agent_id: i64,
        expected: &[ConversationStatus],
    ) -> ChatResult<bool> {
        let expected: Vec<&str> = expected.iter().map(|status| status.as_str()).collect();
        let result = sqlx::query(
            r#"
            UPDATE conversations
            SET agent_id = $2, status = 'active'
            WHERE id = $1 AND status = ANY($3)
            "#,
        )
        .bind(id)
        .bind(agent_id)
        .bind(&expected)
        .execute(&self.pool)
        .await?;
        Ok(result.rows_affected() > 0)
    }

    async fn transfer_assignment(
        &self,
        id: i64,
        from_agent: i64,
        to_agent: i64,
    ) -> ChatResult<bool> {
        let result = sqlx::query(
            r#"
            UPDATE conversations
            SET agent_id = $3, transfer_count = transfer_count + 1
            WHERE id = $1 AND agent_id = $2 AND status = 'active'
            "#,
        )
        .bind(id)
        .bind(from_agent)
        .bind(to_agent)
        .execute(&self.pool)
        .await?;
        Ok(result.rows_affected() > 0)
    }

    async fn end_conversation(
        &self,
        id: i64,
        ended_at: OffsetDateTime,
        duration_secs: i32,
    ) -> ChatResult<bool> {
        let result = sqlx::query(
            r#"
            UPDATE conversations
            SET status = 'ended', ended_at = $2, duration_secs = $3
            WHERE id = $1 AND status <> 'ended'
            "#,
        )
        .bind(id)
        .bind(ended_at)
        .bind(duration_secs)
        .execute(&self.pool)
        .await?;
        Ok(result.rows_affected() > 0)
    }

    async fn update_satisfaction(&self, id: i64, rating: SatisfactionRating) -> ChatResult<bool> {
        let result = sqlx::query("UPDATE conversations SET satisfaction = $2 WHERE id = $1")
            .bind(id)
            .bind(rating)
            .execute(&self.pool)
            .await?;
        Ok(result.rows_affected() > 0)
    }

    async fn update_stats(&self, id: i64) -> ChatResult<()> {
        // avg_response_secs stays at zero until an averaging scheme is wired in
        sqlx::query(
            r#"
            UPDATE conversations c
            SET message_count = (SELECT COUNT(*) FROM messages m WHERE m.conversation_id = c.id),
                avg_response_secs = 0
            WHERE c.id = $1
            "#,
        )
        .bind(id)
        .execute(&self.pool)
        .await?;
        Ok(())
    }

    async fn insert_message(&self, new: NewMessage) -> ChatResult<Message> {
        let message = sqlx::query_as::<_, Message>(
            r#"
            INSERT INTO messages (
                conversation_id, sender_kind, sender_id, sender_name, kind,
                content, file_url, file_name, file_size
            )
            VALUES ($1, $2, $3, $4, $5, $6, $7, $8, $9)
            RETURNING *
            "#,
        )
        .bind(new.conversation_id)
        .bind(new.sender_kind)
        .bind(new.sender_id)
        .bind(&new.sender_name)
        .bind(new.kind)
        .bind(&new.content)
        .bind(&new.file_url)
        .bind(&new.file_name)
        .bind(new.file_size)
        .fetch_one(&self.pool)
        .await?;
        Ok(message)
    }

    async fn message(&self, id: i64) -> ChatResult<Option<Message>> {
        let message = sqlx::query_as::<_, Message>("SELECT * FROM messages WHERE id = $1")
            .bind(id)
            .fetch_optional(&self.pool)
            .await?;
        Ok(message)
    }

    async fn messages_page(
        &self,
        conversation_id: i64,
        page: i64,
        per_page: i64,
    ) -> ChatResult<Vec<Message>> {
        let offset = (page.max(1) - 1) * per_page;
        let messages = sqlx::query_as::<_, Message>(
            r#"
            SELECT * FROM messages
            WHERE conversation_id = $1
            ORDER BY sent_at ASC, id ASC
            LIMIT $2 OFFSET $3
            "#,
        )
        .bind(conversation_id)
        .bind(per_page)
        .bind(offset)
        .fetch_all(&self.pool)
        .await?;
        Ok(messages)
    }

    async fn mark_message_read(&self, id: i64, at: OffsetDateTime) -> ChatResult<Option<Message>> {
        let message = sqlx::query_as::<_, Message>(
            r#"
            UPDATE messages
            SET read = TRUE, read_at = COALESCE(read_at, $2)
            WHERE id = $1
            RETURNING *
            "#,
        )
        .bind(id)
        .bind(at)
        .fetch_optional(&self.pool)
        .await?;
        Ok(message)
    }

    async fn recall_message(&self, id: i64, at: OffsetDateTime) -> ChatResult<Option<Message>> {
        let message = sqlx::query_as::<_, Message>(
            r#"
            UPDATE messages
            SET recalled = TRUE, recalled_at = COALESCE(recalled_at, $2)
            WHERE id = $1
            RETURNING *
            "#,
        )
        .bind(id)
        .bind(at)
        .fetch_optional(&self.pool)
        .await?;
        Ok(message)
    }

    async fn mark_conversation_read(
        &self,
        conversation_id: i64,
        sender_kind: PartyKind,
        at: OffsetDateTime,
    ) -> ChatResult<u64> {
        let result = sqlx::query(
            r#"
            UPDATE messages
            SET read = TRUE, read_at = $3
            WHERE conversation_id = $1 AND sender_kind = $2 AND read = FALSE
            "#,
        )
        .bind(conversation_id)
        .bind(sender_kind)
        .bind(at)
        .execute(&self.pool)
        .await?;
        Ok(result.rows_affected())
    }

    async fn unread_count(&self, conversation_id: i64, sender_kind: PartyKind) -> ChatResult<i64> {
        let count: i64 = sqlx::query_scalar(
            r#"
            SELECT COUNT(*) FROM messages
            WHERE conversation_id = $1 AND sender_kind = $2 AND read = FALSE
            "#,
        )
        .bind(conversation_id)
        .bind(sender_kind)
        .fetch_one(&self.pool)
        .await?;
        Ok(count)
    }

    async fn customer(&self, id: i64) -> ChatResult<Option<Customer>> {
        let customer = sqlx::query_as::<_, Customer>("SELECT * FROM customers WHERE id = $1")
            .bind(id)
            .fetch_optional(&self.pool)
            .await?;
        Ok(customer)
    }

    async fn find_customer_by_number(&self, customer_no: &str) -> ChatResult<Option<Customer>> {
        let customer =
            sqlx::query_as::<_, Customer>("SELECT * FROM customers WHERE customer_no = $1")
                .bind(customer_no)
                .fetch_optional(&self.pool)
                .await?;
        Ok(customer)
    }

    async fn insert_customer(&self, new: NewCustomer) -> ChatResult<Customer> {
        let result = sqlx::query_as::<_, Customer>(
            r#"
            INSERT INTO customers (customer_no, name, phone, email, source)
            VALUES ($1, $2, $3, $4, $5)
            RETURNING *
            "#,
        )
        .bind(&new.customer_no)
        .bind(&new.name)
        .bind(&new.phone)
        .bind(&new.email)
        .bind(&new.source)
        .fetch_one(&self.pool)
        .await;

        match result {
            Ok(customer) => Ok(customer),
            Err(err) if is_unique_violation(&err) => Err(ChatError::Conflict(format!(
                "customer number {} already exists",
                new.customer_no
            ))),
            Err(err) => Err(err.into()),
        }
    }

    async fn count_pending(&self) -> ChatResult<i64> {
        let count: i64 =
            sqlx::query_scalar("SELECT COUNT(*) FROM conversations WHERE status = 'pending'")
                .fetch_one(&self.pool)
                .await?;
        Ok(count)
    }

    async fn count_started_since(&self, since: OffsetDateTime) -> ChatResult<i64> {
        let count: i64 =
            sqlx::query_scalar("SELECT COUNT(*) FROM conversations WHERE started_at >= $1")
                .bind(since)
                .fetch_one(&self.pool)
                .await?;
        Ok(count)
    }
}
