//! Message routing
//!
//! Every message passes through [`MessageRouter::route`], whatever transport
//! carried it in: resolve the sender to a durable id, persist, then deliver
//! to the counterpart if one is connected. Persistence always comes before
//! delivery, so an offline counterpart only costs a live push, never data.

use std::sync::Arc;

use deskwire_shared::{Conversation, Message, MessageKind, NewMessage, PartyIdentity, PartyKind};
use time::OffsetDateTime;

use crate::websocket::connection::Connection;
use crate::websocket::events::ServerEvent;
use crate::websocket::registry::{ConnectionRegistry, Delivery};

use super::error::{ChatError, ChatResult};
use super::store::ConversationStore;

/// Upper bound on message text, matching the widget's composer limit
const MAX_CONTENT_CHARS: usize = 10_000;

/// A message as it arrives from a transport, before persistence
#[derive(Debug, Clone)]
pub struct InboundMessage {
    pub conversation_id: i64,
    pub kind: MessageKind,
    pub content: String,
    pub sender_name: String,
    pub file_url: Option<String>,
    pub file_name: Option<String>,
    pub file_size: Option<i64>,
}

pub struct MessageRouter {
    store: Arc<dyn ConversationStore>,
    registry: ConnectionRegistry,
}

impl MessageRouter {
    pub fn new(store: Arc<dyn ConversationStore>, registry: ConnectionRegistry) -> Self {
        Self { store, registry }
    }

    /// Accept, persist, and relay one message.
    ///
    /// The write to the store is the durability point: a failure there
    /// rejects the message outright, while a counterpart that is offline or
    /// unresponsive costs nothing but the live push.
    pub async fn route(
        &self,
        sender: &PartyIdentity,
        inbound: InboundMessage,
    ) -> ChatResult<Message> {
        validate(&inbound)?;

        let conversation = self
            .store
            .conversation(inbound.conversation_id)
            .await?
            .ok_or(ChatError::UnknownConversation(inbound.conversation_id))?;

        if !conversation.status.accepts_messages() {
            return Err(ChatError::ConversationClosed(conversation.id));
        }

        let sender_id = resolve_sender(sender, &conversation)?;

        let message = self
            .store
            .insert_message(NewMessage {
                conversation_id: conversation.id,
                sender_kind: sender.kind,
                sender_id,
                sender_name: inbound.sender_name,
                kind: inbound.kind,
                content: inbound.content,
                file_url: inbound.file_url,
                file_name: inbound.file_name,
                file_size: inbound.file_size,
            })
            .await?;

        if let Err(err) = self.store.update_stats(conversation.id).await {
            tracing::warn!(
                conversation_id = conversation.id,
                error = %err,
                "Failed to refresh conversation stats"
            );
        }

        let delivery = self
            .deliver_to_side(
                &conversation,
                sender.kind.counterpart(),
                ServerEvent::message_received(message.clone()),
            )
            .await;
        tracing::debug!(
            conversation_id = conversation.id,
            message_id = message.id,
            delivered = matches!(delivery, Delivery::Delivered),
            "Message routed"
        );

        // The author's own connection gets a confirmation frame; HTTP
        // senders see the message in the response body instead
        self.registry
            .send_to(sender, ServerEvent::message_sent(message.clone()))
            .await;

        Ok(message)
    }

    /// Answer a heartbeat on the connection it arrived on. No store access.
    pub fn heartbeat(&self, connection: &Connection) {
        connection.send(ServerEvent::pong());
    }

    /// Mark one message read and notify its original sender if connected.
    /// Unknown ids are ignored; the flag and its timestamp never regress.
    pub async fn mark_read(&self, message_id: i64) -> ChatResult<Option<Message>> {
        let Some(message) = self
            .store
            .mark_message_read(message_id, OffsetDateTime::now_utc())
            .await?
        else {
            tracing::debug!(message_id, "Read receipt for unknown message ignored");
            return Ok(None);
        };

        self.notify_party(
            message.sender_kind,
            message.sender_id,
            ServerEvent::read_receipt(&message),
        )
        .await;

        Ok(Some(message))
    }

    /// Recall a message: a one-way flag, content left in place for the
    /// audit trail. Only the side that sent a message may recall it.
    pub async fn recall(
        &self,
        sender_kind: PartyKind,
        message_id: i64,
    ) -> ChatResult<Option<Message>> {
        let Some(existing) = self.store.message(message_id).await? else {
            tracing::debug!(message_id, "Recall of unknown message ignored");
            return Ok(None);
        };

        if existing.sender_kind != sender_kind {
            return Err(ChatError::Conflict(format!(
                "message {message_id} was not sent by a {sender_kind}"
            )));
        }

        let Some(message) = self
            .store
            .recall_message(message_id, OffsetDateTime::now_utc())
            .await?
        else {
            return Ok(None);
        };

        if let Some(conversation) = self.store.conversation(message.conversation_id).await? {
            self.deliver_to_side(
                &conversation,
                message.sender_kind.counterpart(),
                ServerEvent::recalled(&message),
            )
            .await;
        }

        Ok(Some(message))
    }

    /// Push an event at one side of a conversation, wherever it is connected
    async fn deliver_to_side(
        &self,
        conversation: &Conversation,
        side: PartyKind,
        event: ServerEvent,
    ) -> Delivery {
        match side {
            PartyKind::Agent => match conversation.agent_id {
                Some(agent_id) => {
                    self.registry
                        .send_to(&PartyIdentity::agent(agent_id.to_string()), event)
                        .await
                }
                // Still pending: the store is the offline queue
                None => Delivery::NotConnected,
            },
            PartyKind::Customer => self.deliver_to_customer(conversation.customer_id, event).await,
        }
    }

    /// Customers usually register under their customer number; fall back to
    /// the raw numeric id for clients that connected with one.
    async fn deliver_to_customer(&self, customer_id: i64, event: ServerEvent) -> Delivery {
        match self.store.customer(customer_id).await {
            Ok(Some(customer)) => {
                let delivery = self
                    .registry
                    .send_to(&PartyIdentity::customer(customer.customer_no), event.clone())
                    .await;
                if matches!(delivery, Delivery::Delivered) {
                    return delivery;
                }
            }
            Ok(None) => {}
            Err(err) => {
                tracing::warn!(customer_id, error = %err, "Customer lookup failed during delivery");
            }
        }

        self.registry
            .send_to(&PartyIdentity::customer(customer_id.to_string()), event)
            .await
    }

    async fn notify_party(&self, kind: PartyKind, party_id: i64, event: ServerEvent) -> Delivery {
        match kind {
            PartyKind::Agent => {
                self.registry
                    .send_to(&PartyIdentity::agent(party_id.to_string()), event)
                    .await
            }
            PartyKind::Customer => self.deliver_to_customer(party_id, event).await,
        }
    }
}

/// Map a wire identity to the durable numeric id recorded on messages
fn resolve_sender(sender: &PartyIdentity, conversation: &Conversation) -> ChatResult<i64> {
    match sender.kind {
        PartyKind::Customer => Ok(conversation.customer_id),
        PartyKind::Agent => {
            if let Some(agent_id) = conversation.agent_id {
                return Ok(agent_id);
            }
            sender
                .id
                .parse::<i64>()
                .map_err(|_| ChatError::UnknownSender(sender.to_string()))
        }
    }
}

fn validate(inbound: &InboundMessage) -> ChatResult<()> {
    if inbound.kind.is_file_backed() {
        let has_file_url = inbound
            .file_url
            .as_deref()
            .map(|url| !url.trim().is_empty())
            .unwrap_or(false);
        if !has_file_url {
            return Err(ChatError::MalformedEvent(format!(
                "{} messages require a file url",
                inbound.kind
            )));
        }
    } else if inbound.content.trim().is_empty() {
        return Err(ChatError::MalformedEvent("empty message content".to_string()));
    }

    if inbound.content.chars().count() > MAX_CONTENT_CHARS {
        return Err(ChatError::MalformedEvent(format!(
            "message content exceeds {MAX_CONTENT_CHARS} characters"
        )));
    }

    Ok(())
}
