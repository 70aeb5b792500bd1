//! In-memory store
//!
//! Implements [`ConversationStore`] over plain maps with the same conditional
//! write semantics as the Postgres store. Used by the test suite and by
//! local runs without a database.

use std::collections::{BTreeMap, HashMap};

use async_trait::async_trait;
use deskwire_shared::{
    Conversation, ConversationStatus, Customer, Message, NewConversation, NewCustomer, NewMessage,
    PartyKind, SatisfactionRating,
};
use time::OffsetDateTime;
use tokio::sync::Mutex;

use super::error::{ChatError, ChatResult};
use super::store::ConversationStore;

pub struct MemoryConversationStore {
    inner: Mutex<Inner>,
}

struct Inner {
    conversations: HashMap<i64, Conversation>,
    messages: BTreeMap<i64, Message>,
    customers: HashMap<i64, Customer>,
    next_conversation_id: i64,
    next_message_id: i64,
    next_customer_id: i64,
}

impl Default for Inner {
    fn default() -> Self {
        Self {
            conversations: HashMap::new(),
            messages: BTreeMap::new(),
            customers: HashMap::new(),
            next_conversation_id: 1,
            next_message_id: 1,
            next_customer_id: 1,
        }
    }
}

impl MemoryConversationStore {
    pub fn new() -> Self {
        Self {
            inner: Mutex::new(Inner::default()),
        }
    }
}

impl Default for MemoryConversationStore {
    fn default() -> Self {
        Self::new()
    }
}

#[async_trait]
impl ConversationStore for MemoryConversationStore {
    async fn ping(&self) -> ChatResult<()> {
        Ok(())
    }

    async fn conversation(&self, id: i64) -> ChatResult<Option<Conversation>> {
        let inner = self.inner.lock().await;
        Ok(inner.conversations.get(&id).cloned())
    }

    async fn conversation_by_token(&self, session_token: &str) -> ChatResult<Option<Conversation>> {
        let inner = self.inner.lock().await;
        Ok(inner
            .conversations
            .values()
            .find(|conversation| conversation.session_token == session_token)
            .cloned())
    }

    async fn insert_conversation(&self, new: NewConversation) -> ChatResult<Conversation> {
        let mut inner = self.inner.lock().await;
        if inner
            .conversations
            .values()
            .any(|conversation| conversation.session_token == new.session_token)
        {
            return Err(ChatError::TokenCollision);
        }

        let id = inner.next_conversation_id;
        inner.next_conversation_id += 1;

        let conversation = Conversation {
            id,
            session_token: new.session_token,
            customer_id: new.customer_id,
            agent_id: None,
            channel: new.channel,
            kind: new.kind,
            status: ConversationStatus::Pending,
            priority: new.priority,
            started_at: OffsetDateTime::now_utc(),
            ended_at: None,
            duration_secs: None,
            transfer_count: 0,
            message_count: 0,
            avg_response_secs: 0,
            satisfaction: None,
        };
        inner.conversations.insert(id, conversation.clone());
        Ok(conversation)
    }

    async fn pending_conversations(&self) -> ChatResult<Vec<Conversation>> {
        let inner = self.inner.lock().await;
        let mut pending: Vec<Conversation> = inner
            .conversations
            .values()
            .filter(|conversation| conversation.status == ConversationStatus::Pending)
            .cloned()
            .collect();
        pending.sort_by_key(|conversation| (conversation.started_at, conversation.id));
        Ok(pending)
    }

    async fn active_conversations(&self, agent_id: i64) -> ChatResult<Vec<Conversation>> {
        let inner = self.inner.lock().await;
        let mut active: Vec<Conversation> = inner
            .conversations
            .values()
            .filter(|conversation| {
                conversation.agent_id == Some(agent_id)
                    && conversation.status == ConversationStatus::Active
            })
            .cloned()
            .collect();
        active.sort_by_key(|conversation| (conversation.started_at, conversation.id));
        Ok(active)
    }

    async fn update_assignment(
        &self,
        id: i64,
        agent_id: i64,
        expected: &[ConversationStatus],
    ) -> ChatResult<bool> {
        let mut inner = self.inner.lock().await;
        match inner.conversations.get_mut(&id) {
            Some(conversation) if expected.contains(&conversation.status) => {
                conversation.agent_id = Some(agent_id);
                conversation.status = ConversationStatus::Active;
                Ok(true)
            }
            _ => Ok(false),
        }
    }

    async fn transfer_assignment(
        &self,
        id: i64,
        from_agent: i64,
        to_agent: i64,
    ) -> ChatResult<bool> {
        let mut inner = self.inner.lock().await;
        match inner.conversations.get_mut(&id) {
            Some(conversation)
                if conversation.agent_id == Some(from_agent)
                    && conversation.status == ConversationStatus::Active =>
            {
                conversation.agent_id = Some(to_agent);
                conversation.transfer_count += 1;
                Ok(true)
            }
            _ => Ok(false),
        }
    }

    async fn end_conversation(
        &self,
        id: i64,
        ended_at: OffsetDateTime,
        duration_secs: i32,
    ) -> ChatResult<bool> {
        let mut inner = self.inner.lock().await;
        match inner.conversations.get_mut(&id) {
            Some(conversation) if conversation.status != ConversationStatus::Ended => {
                conversation.status = ConversationStatus::Ended;
                conversation.ended_at = Some(ended_at);
                conversation.duration_secs = Some(duration_secs);
                Ok(true)
            }
            _ => Ok(false),
        }
    }

    async fn update_satisfaction(&self, id: i64, rating: SatisfactionRating) -> ChatResult<bool> {
        let mut inner = self.inner.lock().await;
        match inner.conversations.get_mut(&id) {
            Some(conversation) => {
                conversation.satisfaction = Some(rating);
                Ok(true)
            }
            None => Ok(false),
        }
    }

    async fn update_stats(&self, id: i64) -> ChatResult<()> {
        let mut inner = self.inner.lock().await;
        let count = inner
            .messages
            .values()
            .filter(|message| message.conversation_id == id)
            .count() as i32;
        if let Some(conversation) = inner.conversations.get_mut(&id) {
            conversation.message_count = count;
            conversation.avg_response_secs = 0;
        }
        Ok(())
    }

    async fn insert_message(&self, new: NewMessage) -> ChatResult<Message> {
        let mut inner = self.inner.lock().await;
        let id = inner.next_message_id;
        inner.next_message_id += 1;

        let message = Message {
            id,
            conversation_id: new.conversation_id,
            sender_kind: new.sender_kind,
            sender_id: new.sender_id,
            sender_name: new.sender_name,
            kind: new.kind,
            content: new.content,
            file_url: new.file_url,
            file_name: new.file_name,
            file_size: new.file_size,
            read: false,
            read_at: None,
            recalled: false,
            recalled_at: None,
            sent_at: OffsetDateTime::now_utc(),
        };
        inner.messages.insert(id, message.clone());
        Ok(message)
    }

    async fn message(&self, id: i64) -> ChatResult<Option<Message>> {
        let inner = self.inner.lock().await;
        Ok(inner.messages.get(&id).cloned())
    }

    async fn messages_page(
        &self,
        conversation_id: i64,
        page: i64,
        per_page: i64,
    ) -> ChatResult<Vec<Message>> {
        let inner = self.inner.lock().await;
        let mut messages: Vec<Message> = inner
            .messages
            .values()
            .filter(|message| message.conversation_id == conversation_id)
            .cloned()
            .collect();
        messages.sort_by_key(|message| (message.sent_at, message.id));

        let offset = ((page.max(1) - 1) * per_page) as usize;
        Ok(messages
            .into_iter()
            .skip(offset)
            .take(per_page.max(0) as usize)
            .collect())
    }

    async fn mark_message_read(&self, id: i64, at: OffsetDateTime) -> ChatResult<Option<Message>> {
        let mut inner = self.inner.lock().await;
        match inner.messages.get_mut(&id) {
            Some(message) => {
                message.read = true;
                message.read_at.get_or_insert(at);
                Ok(Some(message.clone()))
            }
            None => Ok(None),
        }
    }

    async fn recall_message(&self, id: i64, at: OffsetDateTime) -> ChatResult<Option<Message>> {
        let mut inner = self.inner.lock().await;
        match inner.messages.get_mut(&id) {
            Some(message) => {
                message.recalled = true;
                message.recalled_at.get_or_insert(at);
                Ok(Some(message.clone()))
            }
            None => Ok(None),
        }
    }

    async fn mark_conversation_read(
        &self,
        conversation_id: i64,
        sender_kind: PartyKind,
        at: OffsetDateTime,
    ) -> ChatResult<u64> {
        let mut inner = self.inner.lock().await;
        let mut flipped = 0;
        for message in inner.messages.values_mut() {
            if message.conversation_id == conversation_id
                && message.sender_kind == sender_kind
                && !message.read
            {
                message.read = true;
                message.read_at = Some(at);
                flipped += 1;
            }
        }
        Ok(flipped)
    }

    async fn unread_count(&self, conversation_id: i64, sender_kind: PartyKind) -> ChatResult<i64> {
        let inner = self.inner.lock().await;
        Ok(inner
            .messages
            .values()
            .filter(|message| {
                message.conversation_id == conversation_id
                    && message.sender_kind == sender_kind
                    && !message.read
            })
            .count() as i64)
    }

    async fn customer(&self, id: i64) -> ChatResult<Option<Customer>> {
        let inner = self.inner.lock().await;
        Ok(inner.customers.get(&id).cloned())
    }

    async fn find_customer_by_number(&self, customer_no: &str) -> ChatResult<Option<Customer>> {
        let inner = self.inner.lock().await;
        Ok(inner
            .customers
            .values()
            .find(|customer| customer.customer_no == customer_no)
            .cloned())
    }

    async fn insert_customer(&self, new: NewCustomer) -> ChatResult<Customer> {
        let mut inner = self.inner.lock().await;
        if inner
            .customers
            .values()
            .any(|customer| customer.customer_no == new.customer_no)
        {
            return Err(ChatError::Conflict(format!(
                "customer number {} already exists",
                new.customer_no
            )));
        }

        let id = inner.next_customer_id;
        inner.next_customer_id += 1;

        let customer = Customer {
            id,
            customer_no: new.customer_no,
            name: new.name,
            phone: new.phone,
            email: new.email,
            source: new.source,
            created_at: OffsetDateTime::now_utc(),
        };
        inner.customers.insert(id, customer.clone());
        Ok(customer)
    }

    async fn count_pending(&self) -> ChatResult<i64> {
        let inner = self.inner.lock().await;
        Ok(inner
            .conversations
            .values()
            .filter(|conversation| conversation.status == ConversationStatus::Pending)
            .count() as i64)
    }

    async fn count_started_since(&self, since: OffsetDateTime) -> ChatResult<i64> {
        let inner = self.inner.lock().await;
        Ok(inner
            .conversations
            .values()
            .filter(|conversation| conversation.started_at >= since)
            .count() as i64)
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    fn new_conversation(token: &str) -> NewConversation {
        NewConversation {
            session_token: token.to_string(),
            customer_id: 1,
            channel: "web".to_string(),
            kind: Default::default(),
            priority: Default::default(),
        }
    }

    #[tokio::test]
    async fn test_insert_conversation_rejects_duplicate_token() {
        let store = MemoryConversationStore::new();
        store
            .insert_conversation(new_conversation("CS1"))
            .await
            .unwrap();

        let result = store.insert_conversation(new_conversation("CS1")).await;
        assert!(matches!(result, Err(ChatError::TokenCollision)));
    }

    #[tokio::test]
    async fn test_update_assignment_respects_expected_states() {
        let store = MemoryConversationStore::new();
        let conversation = store
            .insert_conversation(new_conversation("CS2"))
            .await
            .unwrap();

        let updated = store
            .update_assignment(conversation.id, 7, &[ConversationStatus::Pending])
            .await
            .unwrap();
        assert!(updated);

        // Already active: the pending-only guard misses now
        let updated = store
            .update_assignment(conversation.id, 8, &[ConversationStatus::Pending])
            .await
            .unwrap();
        assert!(!updated);

        let current = store.conversation(conversation.id).await.unwrap().unwrap();
        assert_eq!(current.agent_id, Some(7));
        assert_eq!(current.status, ConversationStatus::Active);
    }

    #[tokio::test]
    async fn test_mark_message_read_keeps_first_timestamp() {
        let store = MemoryConversationStore::new();
        let conversation = store
            .insert_conversation(new_conversation("CS3"))
            .await
            .unwrap();
        let message = store
            .insert_message(NewMessage::text(
                conversation.id,
                PartyKind::Customer,
                1,
                "Ada",
                "hello",
            ))
            .await
            .unwrap();

        let first = OffsetDateTime::now_utc();
        let later = first + time::Duration::seconds(30);

        let read = store
            .mark_message_read(message.id, first)
            .await
            .unwrap()
            .unwrap();
        assert!(read.read);
        assert_eq!(read.read_at, Some(first));

        let again = store
            .mark_message_read(message.id, later)
            .await
            .unwrap()
            .unwrap();
        assert_eq!(again.read_at, Some(first));
    }
}
