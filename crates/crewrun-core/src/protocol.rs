//! Messages exchanged with observers over the real-time transport.

use serde::{Deserialize, Serialize};
use serde_json::Value;
use thiserror::Error;

use crate::{ObserverId, Topic};

/// Inbound message from an observer.
#[derive(Debug, Clone, PartialEq, Eq, Deserialize)]
#[serde(tag = "type", rename_all = "snake_case")]
pub enum ClientMessage {
    /// Replace the observer's topic subscription.
    Subscribe { topics: Vec<Topic> },
    /// Drop every subscription; the connection stays open.
    Unsubscribe,
    Ping,
}

/// Reasons an inbound message is rejected.
#[derive(Debug, Clone, PartialEq, Eq, Error)]
pub enum ProtocolError {
    /// Not JSON, no `type` field, or malformed body for a known type.
    #[error("invalid message: {0}")]
    InvalidMessage(String),

    /// Well-formed message with a type this server does not handle.
    #[error("unsupported message type '{0}'")]
    UnsupportedType(String),
}

impl ClientMessage {
    const KNOWN_TYPES: [&'static str; 3] = ["subscribe", "unsubscribe", "ping"];

    /// Parse a text frame.
    pub fn parse(text: &str) -> Result<Self, ProtocolError> {
        let value: Value =
            serde_json::from_str(text).map_err(|e| ProtocolError::InvalidMessage(e.to_string()))?;

        let kind = value
            .get("type")
            .and_then(Value::as_str)
            .ok_or_else(|| ProtocolError::InvalidMessage("missing 'type' field".to_string()))?
            .to_owned();

        if !Self::KNOWN_TYPES.contains(&kind.as_str()) {
            return Err(ProtocolError::UnsupportedType(kind));
        }

        serde_json::from_value(value).map_err(|e| ProtocolError::InvalidMessage(e.to_string()))
    }
}

/// Control message sent to an observer. Events are sent as their own envelope.
#[derive(Debug, Clone, PartialEq, Eq, Serialize)]
#[serde(tag = "type", rename_all = "snake_case")]
pub enum ServerMessage {
    Welcome {
        observer_id: ObserverId,
    },
    Subscribed {
        topics: Vec<Topic>,
    },
    Unsubscribed,
    Pong,
    Error {
        error: String,
        message: String,
        #[serde(skip_serializing_if = "Option::is_none")]
        received: Option<String>,
    },
}

impl From<&ProtocolError> for ServerMessage {
    fn from(err: &ProtocolError) -> Self {
        match err {
            ProtocolError::InvalidMessage(_) => ServerMessage::Error {
                error: "invalid_message".to_string(),
                message: err.to_string(),
                received: None,
            },
            ProtocolError::UnsupportedType(kind) => ServerMessage::Error {
                error: "unsupported_type".to_string(),
                message: err.to_string(),
                received: Some(kind.clone()),
            },
        }
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn test_parse_subscribe() {
        let msg = ClientMessage::parse(r#"{"type":"subscribe","topics":["activity","all"]}"#);
        assert_eq!(
            msg,
            Ok(ClientMessage::Subscribe {
                topics: vec![Topic::Activity, Topic::All]
            })
        );
    }

    #[test]
    fn test_unknown_type_is_unsupported() {
        let err = ClientMessage::parse(r#"{"type":"launch_rocket"}"#).unwrap_err();
        assert_eq!(err, ProtocolError::UnsupportedType("launch_rocket".to_string()));

        let reply = serde_json::to_value(ServerMessage::from(&err)).unwrap();
        assert_eq!(reply["type"], "error");
        assert_eq!(reply["error"], "unsupported_type");
        assert_eq!(reply["received"], "launch_rocket");
    }

    #[test]
    fn test_garbage_is_invalid() {
        assert!(matches!(
            ClientMessage::parse("not json"),
            Err(ProtocolError::InvalidMessage(_))
        ));
        assert!(matches!(
            ClientMessage::parse(r#"{"topics":[]}"#),
            Err(ProtocolError::InvalidMessage(_))
        ));
        assert!(matches!(
            ClientMessage::parse(r#"{"type":"subscribe","topics":["weather"]}"#),
            Err(ProtocolError::InvalidMessage(_))
        ));
    }
}
