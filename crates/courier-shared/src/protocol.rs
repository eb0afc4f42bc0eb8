//! JSON frames exchanged over the WebSocket.
//!
//! Every frame is an envelope `{"type": ..., "data": ...}`. Liveness uses
//! WebSocket ping/pong control frames and never appears here.

use serde::{Deserialize, Serialize};

use crate::error::ProtocolError;
use crate::types::ConnectionState;

const TYPE_CONNECTION_STATE: &str = "connection_state";
const TYPE_NEW_MESSAGE: &str = "new_message";

/// A chat message as delivered to consumers, body in plaintext.
#[derive(Debug, Clone, PartialEq, Eq, Serialize, Deserialize)]
#[serde(rename_all = "camelCase")]
pub struct MessagePayload {
    pub id: String,
    pub chat_id: String,
    /// Unix milliseconds
    pub ts: i64,
    pub sender: String,
    pub body: String,
}

/// Broadcast whenever a message is persisted.
#[derive(Debug, Clone, PartialEq, Eq, Serialize, Deserialize)]
#[serde(rename_all = "camelCase")]
pub struct NewMessageEvent {
    pub message: MessagePayload,
    /// Always equal to `message.chat_id`.
    pub chat_id: String,
    pub chat_title: String,
}

impl NewMessageEvent {
    pub fn new(message: MessagePayload, chat_title: impl Into<String>) -> Self {
        Self {
            chat_id: message.chat_id.clone(),
            message,
            chat_title: chat_title.into(),
        }
    }
}

/// All application frames, discriminated by the `type` field.
#[derive(Debug, Clone, PartialEq, Eq, Serialize)]
#[serde(tag = "type", content = "data", rename_all = "snake_case")]
pub enum WireEvent {
    ConnectionState(ConnectionState),
    NewMessage(NewMessageEvent),
    /// A well-formed frame with a `type` this build does not know.
    #[serde(skip)]
    Ignored,
}

#[derive(Deserialize)]
struct RawFrame {
    #[serde(rename = "type")]
    kind: String,
    #[serde(default)]
    data: serde_json::Value,
}

impl WireEvent {
    /// Serialize to a JSON text frame.
    pub fn encode(&self) -> Result<String, ProtocolError> {
        if matches!(self, Self::Ignored) {
            return Err(ProtocolError::NotSendable);
        }
        Ok(serde_json::to_string(self)?)
    }

    /// Parse a JSON text frame. Unknown `type`s decode to [`WireEvent::Ignored`].
    pub fn decode(text: &str) -> Result<Self, ProtocolError> {
        let raw: RawFrame = serde_json::from_str(text)?;

        let event = match raw.kind.as_str() {
            TYPE_CONNECTION_STATE => Self::ConnectionState(serde_json::from_value(raw.data)?),
            TYPE_NEW_MESSAGE => {
                let event: NewMessageEvent = serde_json::from_value(raw.data)?;
                if event.chat_id != event.message.chat_id {
                    return Err(ProtocolError::ChatIdMismatch {
                        outer: event.chat_id,
                        inner: event.message.chat_id,
                    });
                }
                Self::NewMessage(event)
            }
            _ => Self::Ignored,
        };
        Ok(event)
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    fn sample_message() -> MessagePayload {
        MessagePayload {
            id: "m-1".into(),
            chat_id: "c-1".into(),
            ts: 1_700_000_000_000,
            sender: "Alice".into(),
            body: "The build is passing now".into(),
        }
    }

    #[test]
    fn test_connection_state_frame_shape() {
        let text = WireEvent::ConnectionState(ConnectionState::Connected)
            .encode()
            .unwrap();
        assert_eq!(text, r#"{"type":"connection_state","data":"connected"}"#);
    }

    #[test]
    fn test_new_message_frame_shape() {
        let event = WireEvent::NewMessage(NewMessageEvent::new(sample_message(), "Team Sync"));
        let value: serde_json::Value = serde_json::from_str(&event.encode().unwrap()).unwrap();

        assert_eq!(value["type"], "new_message");
        assert_eq!(value["data"]["chatId"], "c-1");
        assert_eq!(value["data"]["chatTitle"], "Team Sync");
        assert_eq!(value["data"]["message"]["chatId"], value["data"]["chatId"]);
        assert_eq!(value["data"]["message"]["ts"], 1_700_000_000_000i64);
    }

    #[test]
    fn test_decode_known_events() {
        let event = WireEvent::NewMessage(NewMessageEvent::new(sample_message(), "Team Sync"));
        assert_eq!(WireEvent::decode(&event.encode().unwrap()).unwrap(), event);

        let state = WireEvent::decode(r#"{"type":"connection_state","data":"offline"}"#).unwrap();
        assert_eq!(state, WireEvent::ConnectionState(ConnectionState::Offline));
    }

    #[test]
    fn test_unknown_type_is_ignored() {
        let event = WireEvent::decode(r#"{"type":"typing","data":{"chatId":"c-1"}}"#).unwrap();
        assert_eq!(event, WireEvent::Ignored);

        let event = WireEvent::decode(r#"{"type":"presence"}"#).unwrap();
        assert_eq!(event, WireEvent::Ignored);
    }

    #[test]
    fn test_malformed_frames_are_errors() {
        assert!(WireEvent::decode("not json").is_err());
        assert!(WireEvent::decode(r#"{"data":"connected"}"#).is_err());
        assert!(WireEvent::decode(r#"{"type":"connection_state","data":"sideways"}"#).is_err());
        assert!(WireEvent::decode(r#"{"type":"new_message","data":{"chatId":"c"}}"#).is_err());
    }

    #[test]
    fn test_mismatched_chat_ids_rejected() {
        let mut event = NewMessageEvent::new(sample_message(), "Team Sync");
        event.chat_id = "c-2".into();
        let text = serde_json::to_string(&serde_json::json!({
            "type": "new_message",
            "data": event,
        }))
        .unwrap();

        assert!(matches!(
            WireEvent::decode(&text),
            Err(ProtocolError::ChatIdMismatch { .. })
        ));
    }

    #[test]
    fn test_ignored_is_not_sendable() {
        assert!(WireEvent::Ignored.encode().is_err());
    }
}
