//! Module that contains the messages sent between nodes.
//!
//! Every message travels as one JSON line over its own connection. Releasing the resource is not a
//! message: the holder answers its deferred requests with [`Message::Grant`] directly.

use crate::{clock::Timestamp, NodeId};
use serde::{Deserialize, Serialize};
use std::error::Error;

/// Enum that represents every message a node can receive from a peer.
#[derive(Debug, Clone, PartialEq, Eq, Serialize, Deserialize)]
#[serde(deny_unknown_fields)]
pub enum Message {
    /// The sender wants the resource and asks for permission.
    Request { sender: NodeId, timestamp: Timestamp },
    /// Unconditional permission for the receiver to proceed.
    Grant { sender: NodeId },
}

impl Message {
    pub fn request(sender: NodeId, timestamp: Timestamp) -> Self {
        Self::Request { sender, timestamp }
    }

    pub fn grant(sender: NodeId) -> Self {
        Self::Grant { sender }
    }

    pub fn sender(&self) -> NodeId {
        match self {
            Self::Request { sender, .. } | Self::Grant { sender } => *sender,
        }
    }

    /// Function that returns the message as a JSON formatted `String`.
    pub fn to_json_string(&self) -> Result<String, Box<dyn Error + Send + Sync>> {
        Ok(serde_json::to_string(self)?)
    }

    /// Function that parses the message from a JSON formatted `String`.
    pub fn from_json_string(line: &str) -> Result<Self, Box<dyn Error + Send + Sync>> {
        Ok(serde_json::from_str::<Self>(line)?)
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn request_wire_format() {
        let line = Message::request(3, Timestamp(1_700_000_000_123_456))
            .to_json_string()
            .unwrap();
        assert_eq!(
            line,
            r#"{"Request":{"sender":3,"timestamp":1700000000123456}}"#
        );
        assert_eq!(
            Message::from_json_string(&line).unwrap(),
            Message::request(3, Timestamp(1_700_000_000_123_456))
        );
    }

    #[test]
    fn grant_wire_format() {
        let line = Message::grant(2).to_json_string().unwrap();
        assert_eq!(line, r#"{"Grant":{"sender":2}}"#);
        assert_eq!(Message::from_json_string(&line).unwrap().sender(), 2);
    }

    #[test]
    fn malformed_lines_are_rejected() {
        let malformed = [
            "",
            "REQUEST,1,100.0",
            "OK,2",
            r#"{"Request":{"sender":1}}"#,
            r#"{"Request":{"sender":"one","timestamp":5}}"#,
            r#"{"Request":{"sender":1,"timestamp":"soon"}}"#,
            r#"{"Request":{"sender":-1,"timestamp":5}}"#,
            r#"{"Grant":{"sender":2,"extra":1}}"#,
            r#"{"Grant":{}}"#,
            r#"{"Release":{"sender":2}}"#,
            r#"{"Grant":{"sender":2}"#,
        ];
        for line in malformed {
            assert!(
                Message::from_json_string(line).is_err(),
                "accepted malformed line {line:?}"
            );
        }
    }
}
