//! Common types used across DeskWire

use serde::{Deserialize, Serialize};
use sqlx::FromRow;
use time::OffsetDateTime;

use crate::error::DomainError;

// =============================================================================
// Party Identity
// =============================================================================

/// Which side of a conversation a party sits on
#[derive(Debug, Clone, Copy, PartialEq, Eq, Hash, Serialize, Deserialize, sqlx::Type)]
#[sqlx(type_name = "VARCHAR", rename_all = "lowercase")]
#[serde(rename_all = "lowercase")]
pub enum PartyKind {
    Customer,
    Agent,
}

impl PartyKind {
    /// The opposite side of the conversation
    pub fn counterpart(&self) -> Self {
        match self {
            Self::Customer => Self::Agent,
            Self::Agent => Self::Customer,
        }
    }

    pub fn as_str(&self) -> &'static str {
        match self {
            Self::Customer => "customer",
            Self::Agent => "agent",
        }
    }
}

impl std::fmt::Display for PartyKind {
    fn fmt(&self, f: &mut std::fmt::Formatter<'_>) -> std::fmt::Result {
        f.write_str(self.as_str())
    }
}

/// Routing address of a connected party.
///
/// The `id` is the identity as it appears on the wire: a customer number
/// (e.g. `CUS20250101093000ab12`) for customers, a numeric agent id in
/// string form for agents. Two identities are equal iff kind and id match.
#[derive(Debug, Clone, PartialEq, Eq, Hash, Serialize, Deserialize)]
pub struct PartyIdentity {
    pub kind: PartyKind,
    pub id: String,
}

impl PartyIdentity {
    pub fn new(kind: PartyKind, id: impl Into<String>) -> Self {
        Self {
            kind,
            id: id.into(),
        }
    }

    pub fn customer(id: impl Into<String>) -> Self {
        Self::new(PartyKind::Customer, id)
    }

    pub fn agent(id: impl Into<String>) -> Self {
        Self::new(PartyKind::Agent, id)
    }
}

impl std::fmt::Display for PartyIdentity {
    fn fmt(&self, f: &mut std::fmt::Formatter<'_>) -> std::fmt::Result {
        write!(f, "{}:{}", self.kind, self.id)
    }
}

// =============================================================================
// Enums
// =============================================================================

/// Conversation lifecycle status
#[derive(Debug, Clone, Copy, PartialEq, Eq, Serialize, Deserialize, sqlx::Type)]
#[sqlx(type_name = "VARCHAR", rename_all = "lowercase")]
#[serde(rename_all = "lowercase")]
pub enum ConversationStatus {
    /// Created, waiting for an agent
    Pending,
    /// Owned by an agent, messages flowing
    Active,
    /// Closed; terminal, never accepts another message
    Ended,
    /// Handed off, waiting for the receiving agent to accept
    Transferred,
}

impl Default for ConversationStatus {
    fn default() -> Self {
        Self::Pending
    }
}

impl ConversationStatus {
    /// Whether the lifecycle admits a direct transition to `next`.
    /// `Ended` is terminal; every live state can reach it.
    pub fn can_transition_to(&self, next: Self) -> bool {
        matches!(
            (self, next),
            (Self::Pending, Self::Active)
                | (Self::Pending, Self::Ended)
                | (Self::Active, Self::Transferred)
                | (Self::Active, Self::Ended)
                | (Self::Transferred, Self::Active)
                | (Self::Transferred, Self::Ended)
        )
    }

    /// Ended conversations reject routing; everything else accepts messages
    pub fn accepts_messages(&self) -> bool {
        !matches!(self, Self::Ended)
    }

    pub fn is_ended(&self) -> bool {
        matches!(self, Self::Ended)
    }

    pub fn as_str(&self) -> &'static str {
        match self {
            Self::Pending => "pending",
            Self::Active => "active",
            Self::Ended => "ended",
            Self::Transferred => "transferred",
        }
    }
}

impl std::fmt::Display for ConversationStatus {
    fn fmt(&self, f: &mut std::fmt::Formatter<'_>) -> std::fmt::Result {
        f.write_str(self.as_str())
    }
}

/// What a conversation is about (reporting only, never consulted for routing)
#[derive(Debug, Clone, Copy, PartialEq, Eq, Serialize, Deserialize, sqlx::Type)]
#[sqlx(type_name = "VARCHAR", rename_all = "snake_case")]
#[serde(rename_all = "snake_case")]
pub enum ConversationKind {
    Inquiry,
    Complaint,
    Suggestion,
    AfterSale,
}

impl Default for ConversationKind {
    fn default() -> Self {
        Self::Inquiry
    }
}

/// Conversation priority
#[derive(Debug, Clone, Copy, PartialEq, Eq, Serialize, Deserialize, sqlx::Type)]
#[sqlx(type_name = "VARCHAR", rename_all = "lowercase")]
#[serde(rename_all = "lowercase")]
pub enum ConversationPriority {
    Low,
    Medium,
    High,
    Urgent,
}

impl Default for ConversationPriority {
    fn default() -> Self {
        Self::Medium
    }
}

/// Message payload kind
#[derive(Debug, Clone, Copy, PartialEq, Eq, Serialize, Deserialize, sqlx::Type)]
#[sqlx(type_name = "VARCHAR", rename_all = "lowercase")]
#[serde(rename_all = "lowercase")]
pub enum MessageKind {
    Text,
    Image,
    File,
    Voice,
    Video,
}

impl Default for MessageKind {
    fn default() -> Self {
        Self::Text
    }
}

impl MessageKind {
    /// File-backed kinds carry file metadata alongside (or instead of) text
    pub fn is_file_backed(&self) -> bool {
        !matches!(self, Self::Text)
    }

    pub fn as_str(&self) -> &'static str {
        match self {
            Self::Text => "text",
            Self::Image => "image",
            Self::File => "file",
            Self::Voice => "voice",
            Self::Video => "video",
        }
    }
}

impl std::fmt::Display for MessageKind {
    fn fmt(&self, f: &mut std::fmt::Formatter<'_>) -> std::fmt::Result {
        write!(f, "{}", self.as_str())
    }
}

/// Ordinal 1-5 satisfaction score a customer leaves on a conversation
#[derive(Debug, Clone, Copy, PartialEq, Eq, PartialOrd, Ord, Serialize, sqlx::Type)]
#[serde(transparent)]
#[sqlx(transparent)]
pub struct SatisfactionRating(i16);

impl SatisfactionRating {
    pub const MIN: i16 = 1;
    pub const MAX: i16 = 5;

    pub fn new(value: i16) -> Result<Self, DomainError> {
        if (Self::MIN..=Self::MAX).contains(&value) {
            Ok(Self(value))
        } else {
            Err(DomainError::RatingOutOfRange(value))
        }
    }

    pub fn value(&self) -> i16 {
        self.0
    }
}

// =============================================================================
// Database Models
// =============================================================================

/// Conversation model
#[derive(Debug, Clone, Serialize, FromRow)]
pub struct Conversation {
    pub id: i64,
    /// Opaque stable handle handed to the widget; survives reconnects
    pub session_token: String,
    pub customer_id: i64,
    pub agent_id: Option<i64>,
    pub channel: String,
    pub kind: ConversationKind,
    pub status: ConversationStatus,
    pub priority: ConversationPriority,
    #[serde(with = "time::serde::rfc3339")]
    pub started_at: OffsetDateTime,
    #[serde(with = "time::serde::rfc3339::option")]
    pub ended_at: Option<OffsetDateTime>,
    pub duration_secs: Option<i32>,
    pub transfer_count: i32,
    pub message_count: i32,
    /// First-response aggregate hook; no algorithm mandated yet, always 0
    pub avg_response_secs: i32,
    pub satisfaction: Option<SatisfactionRating>,
}

/// Message model
///
/// Immutable after insert except the read/recall flags, which are monotonic:
/// read never reverts, recall is one-way and does not clear read.
#[derive(Debug, Clone, Serialize, FromRow)]
pub struct Message {
    pub id: i64,
    pub conversation_id: i64,
    pub sender_kind: PartyKind,
    /// Durable numeric party id (customer id or agent id), never a wire handle
    pub sender_id: i64,
    pub sender_name: String,
    pub kind: MessageKind,
    pub content: String,
    pub file_url: Option<String>,
    pub file_name: Option<String>,
    pub file_size: Option<i64>,
    pub read: bool,
    #[serde(with = "time::serde::rfc3339::option")]
    pub read_at: Option<OffsetDateTime>,
    pub recalled: bool,
    #[serde(with = "time::serde::rfc3339::option")]
    pub recalled_at: Option<OffsetDateTime>,
    #[serde(with = "time::serde::rfc3339")]
    pub sent_at: OffsetDateTime,
}

/// Customer record (only the subset the chat core consumes)
#[derive(Debug, Clone, Serialize, FromRow)]
pub struct Customer {
    pub id: i64,
    /// Unique external handle, the identity customers connect with
    pub customer_no: String,
    pub name: String,
    pub phone: Option<String>,
    pub email: Option<String>,
    pub source: String,
    #[serde(with = "time::serde::rfc3339")]
    pub created_at: OffsetDateTime,
}

// =============================================================================
// Insert Payloads
// =============================================================================

/// New conversation, before the store assigns an id
#[derive(Debug, Clone)]
pub struct NewConversation {
    pub session_token: String,
    pub customer_id: i64,
    pub channel: String,
    pub kind: ConversationKind,
    pub priority: ConversationPriority,
}

/// New message, before the store assigns id and sent_at
#[derive(Debug, Clone)]
pub struct NewMessage {
    pub conversation_id: i64,
    pub sender_kind: PartyKind,
    pub sender_id: i64,
    pub sender_name: String,
    pub kind: MessageKind,
    pub content: String,
    pub file_url: Option<String>,
    pub file_name: Option<String>,
    pub file_size: Option<i64>,
}

impl NewMessage {
    /// Plain text message with no file metadata
    pub fn text(
        conversation_id: i64,
        sender_kind: PartyKind,
        sender_id: i64,
        sender_name: impl Into<String>,
        content: impl Into<String>,
    ) -> Self {
        Self {
            conversation_id,
            sender_kind,
            sender_id,
            sender_name: sender_name.into(),
            kind: MessageKind::Text,
            content: content.into(),
            file_url: None,
            file_name: None,
            file_size: None,
        }
    }
}

/// New customer record
#[derive(Debug, Clone)]
pub struct NewCustomer {
    pub customer_no: String,
    pub name: String,
    pub phone: Option<String>,
    pub email: Option<String>,
    pub source: String,
}

#[cfg(test)]
mod tests {
    use super::*;

    // =========================================================================
    // PartyIdentity Tests
    // =========================================================================

    #[test]
    fn test_party_identity_equality() {
        let a = PartyIdentity::customer("CUS123");
        let b = PartyIdentity::customer("CUS123");
        let c = PartyIdentity::agent("CUS123");
        assert_eq!(a, b);
        assert_ne!(a, c); // Same id, different kind
    }

    #[test]
    fn test_party_identity_display() {
        assert_eq!(PartyIdentity::agent("42").to_string(), "agent:42");
        assert_eq!(
            PartyIdentity::customer("CUS123").to_string(),
            "customer:CUS123"
        );
    }

    #[test]
    fn test_party_kind_counterpart() {
        assert_eq!(PartyKind::Customer.counterpart(), PartyKind::Agent);
        assert_eq!(PartyKind::Agent.counterpart(), PartyKind::Customer);
    }

    #[test]
    fn test_party_kind_serde() {
        let kind: PartyKind = serde_json::from_str(r#""customer""#).unwrap();
        assert_eq!(kind, PartyKind::Customer);
        assert_eq!(
            serde_json::to_string(&PartyKind::Agent).unwrap(),
            r#""agent""#
        );
    }

    // =========================================================================
    // ConversationStatus Tests
    // =========================================================================

    #[test]
    fn test_status_default_is_pending() {
        assert_eq!(ConversationStatus::default(), ConversationStatus::Pending);
    }

    #[test]
    fn test_status_valid_transitions() {
        use ConversationStatus::*;
        assert!(Pending.can_transition_to(Active));
        assert!(Pending.can_transition_to(Ended));
        assert!(Active.can_transition_to(Transferred));
        assert!(Active.can_transition_to(Ended));
        assert!(Transferred.can_transition_to(Active));
        assert!(Transferred.can_transition_to(Ended));
    }

    #[test]
    fn test_status_invalid_transitions() {
        use ConversationStatus::*;
        // Ended is terminal
        assert!(!Ended.can_transition_to(Active));
        assert!(!Ended.can_transition_to(Pending));
        assert!(!Ended.can_transition_to(Transferred));
        // Pending cannot be transferred before assignment
        assert!(!Pending.can_transition_to(Transferred));
        // No self loops
        assert!(!Active.can_transition_to(Active));
    }

    #[test]
    fn test_status_gates_messages() {
        assert!(ConversationStatus::Pending.accepts_messages());
        assert!(ConversationStatus::Active.accepts_messages());
        assert!(ConversationStatus::Transferred.accepts_messages());
        assert!(!ConversationStatus::Ended.accepts_messages());
    }

    // =========================================================================
    // SatisfactionRating Tests
    // =========================================================================

    #[test]
    fn test_satisfaction_accepts_ordinal_range() {
        for value in 1..=5 {
            let rating = SatisfactionRating::new(value).unwrap();
            assert_eq!(rating.value(), value);
        }
    }

    #[test]
    fn test_satisfaction_rejects_out_of_range() {
        assert!(SatisfactionRating::new(0).is_err());
        assert!(SatisfactionRating::new(6).is_err());
        assert!(SatisfactionRating::new(-3).is_err());
    }

    // =========================================================================
    // MessageKind Tests
    // =========================================================================

    #[test]
    fn test_message_kind_default_is_text() {
        assert_eq!(MessageKind::default(), MessageKind::Text);
    }

    #[test]
    fn test_message_kind_file_backed() {
        assert!(!MessageKind::Text.is_file_backed());
        assert!(MessageKind::Image.is_file_backed());
        assert!(MessageKind::File.is_file_backed());
        assert!(MessageKind::Voice.is_file_backed());
        assert!(MessageKind::Video.is_file_backed());
    }
}
