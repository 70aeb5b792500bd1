//! Chat wire events
//!
//! Client frames are tagged JSON. Server frames share one envelope shape
//! (`type` + `message` + optional `data`) so widget and agent console can
//! dispatch on `type` alone.

use deskwire_shared::{Message, MessageKind};
use serde::{Deserialize, Serialize};
use serde_json::json;
use uuid::Uuid;

// =============================================================================
// Client-to-Server Events
// =============================================================================

/// Events sent from client to server
#[derive(Debug, Deserialize)]
#[serde(tag = "type", rename_all = "snake_case")]
pub enum ClientEvent {
    /// A chat message for a conversation
    #[serde(rename_all = "camelCase")]
    Message {
        conversation_id: i64,
        content: String,
        #[serde(default)]
        message_type: MessageKind,
        #[serde(default)]
        sender_name: Option<String>,
        #[serde(default)]
        file_url: Option<String>,
        #[serde(default)]
        file_name: Option<String>,
        #[serde(default)]
        file_size: Option<i64>,
    },

    /// Keep-alive; answered with a heartbeat frame
    Heartbeat,

    /// Mark one message as read
    #[serde(rename_all = "camelCase")]
    Read { message_id: i64 },

    /// Recall a previously sent message
    #[serde(rename_all = "camelCase")]
    Recall { message_id: i64 },
}

// =============================================================================
// Server-to-Client Events
// =============================================================================

/// Events sent from server to client
#[derive(Debug, Clone, Serialize)]
#[serde(tag = "type", rename_all = "snake_case")]
pub enum ServerEvent {
    /// Connection lifecycle and receipt notices
    System {
        message: String,
        #[serde(skip_serializing_if = "Option::is_none")]
        data: Option<serde_json::Value>,
    },

    /// A chat message: a send confirmation for the author or a relayed
    /// message for the counterpart
    Message { message: String, data: Message },

    /// Heartbeat response
    Heartbeat { message: String },

    /// Error notice; the connection stays open
    Error { message: String },
}

impl ServerEvent {
    /// First frame after registration
    pub fn connected(connection_id: Uuid) -> Self {
        Self::System {
            message: "connected".to_string(),
            data: Some(json!({ "connection_id": connection_id })),
        }
    }

    /// Pushed to a connection that a newer one for the same party replaced
    pub fn replaced() -> Self {
        Self::System {
            message: "connected elsewhere".to_string(),
            data: None,
        }
    }

    pub fn pong() -> Self {
        Self::Heartbeat {
            message: "pong".to_string(),
        }
    }

    /// Send confirmation echoed to the message author
    pub fn message_sent(message: Message) -> Self {
        Self::Message {
            message: "message sent".to_string(),
            data: message,
        }
    }

    /// New message relayed to the counterpart
    pub fn message_received(message: Message) -> Self {
        Self::Message {
            message: "new message".to_string(),
            data: message,
        }
    }

    /// Read receipt pushed to the original sender
    pub fn read_receipt(message: &Message) -> Self {
        Self::System {
            message: "message read".to_string(),
            data: serde_json::to_value(message).ok(),
        }
    }

    /// Recall notice pushed to the counterpart
    pub fn recalled(message: &Message) -> Self {
        Self::System {
            message: "message recalled".to_string(),
            data: serde_json::to_value(message).ok(),
        }
    }

    pub fn error(message: impl Into<String>) -> Self {
        Self::Error {
            message: message.into(),
        }
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn test_message_event_deserialization() {
        let json = r#"{
            "type": "message",
            "conversationId": 42,
            "content": "hello there",
            "senderName": "Ada"
        }"#;

        let event: ClientEvent = serde_json::from_str(json).unwrap();
        match event {
            ClientEvent::Message {
                conversation_id,
                content,
                message_type,
                sender_name,
                file_url,
                ..
            } => {
                assert_eq!(conversation_id, 42);
                assert_eq!(content, "hello there");
                assert_eq!(message_type, MessageKind::Text);
                assert_eq!(sender_name.as_deref(), Some("Ada"));
                assert!(file_url.is_none());
            }
            _ => panic!("Expected Message event"),
        }
    }

    #[test]
    fn test_file_message_event_deserialization() {
        let json = r#"{
            "type": "message",
            "conversationId": 7,
            "content": "",
            "messageType": "image",
            "fileUrl": "https://cdn.example.com/a.png",
            "fileName": "a.png",
            "fileSize": 2048
        }"#;

        let event: ClientEvent = serde_json::from_str(json).unwrap();
        match event {
            ClientEvent::Message {
                message_type,
                file_url,
                file_name,
                file_size,
                ..
            } => {
                assert_eq!(message_type, MessageKind::Image);
                assert_eq!(file_url.as_deref(), Some("https://cdn.example.com/a.png"));
                assert_eq!(file_name.as_deref(), Some("a.png"));
                assert_eq!(file_size, Some(2048));
            }
            _ => panic!("Expected Message event"),
        }
    }

    #[test]
    fn test_heartbeat_event_deserialization() {
        let json = r#"{"type": "heartbeat"}"#;
        let event: ClientEvent = serde_json::from_str(json).unwrap();
        assert!(matches!(event, ClientEvent::Heartbeat));
    }

    #[test]
    fn test_read_event_deserialization() {
        let json = r#"{"type": "read", "messageId": 99}"#;
        let event: ClientEvent = serde_json::from_str(json).unwrap();
        match event {
            ClientEvent::Read { message_id } => assert_eq!(message_id, 99),
            _ => panic!("Expected Read event"),
        }
    }

    #[test]
    fn test_pong_serialization() {
        let json = serde_json::to_string(&ServerEvent::pong()).unwrap();
        assert_eq!(json, r#"{"type":"heartbeat","message":"pong"}"#);
    }

    #[test]
    fn test_connected_serialization() {
        let connection_id = Uuid::new_v4();
        let json = serde_json::to_string(&ServerEvent::connected(connection_id)).unwrap();
        assert!(json.contains(r#""type":"system""#));
        assert!(json.contains(r#""message":"connected""#));
        assert!(json.contains(&connection_id.to_string()));
    }

    #[test]
    fn test_error_serialization() {
        let json = serde_json::to_string(&ServerEvent::error("bad frame")).unwrap();
        assert_eq!(json, r#"{"type":"error","message":"bad frame"}"#);
    }

    #[test]
    fn test_replaced_omits_data() {
        let json = serde_json::to_string(&ServerEvent::replaced()).unwrap();
        assert_eq!(
            json,
            r#"{"type":"system","message":"connected elsewhere"}"#
        );
    }
}
