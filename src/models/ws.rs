// Copyright 2025 Assistance Micro Design
//
// Licensed under the Apache License, Version 2.0 (the "License");
// you may not use this file except in compliance with the License.
// You may obtain a copy of the License at
//
//     http://www.apache.org/licenses/LICENSE-2.0
//
// Unless required by applicable law or agreed to in writing, software
// distributed under the License is distributed on an "AS IS" BASIS,
// WITHOUT WARRANTIES OR CONDITIONS OF ANY KIND, either express or implied.
// See the License for the specific language governing permissions and
// limitations under the License.

//! Real-time channel message vocabulary.
//!
//! Both directions are explicit tagged enums with encode/decode
//! helpers; an unrecognized client action decodes to a typed error
//! rather than being silently dropped.
//!
//! Client -> server messages are tagged by `action`:
//! `{"action": "subscribe", "tickers": ["AAPL"]}`.
//! Server -> client messages are tagged by `type`:
//! `{"type": "price_update", "ticker": "AAPL", ...}`.

use chrono::{DateTime, Utc};
use serde::{Deserialize, Serialize};
use thiserror::Error;

use super::notification::Notification;
use super::stock::PriceSnapshot;

/// Error decoding an inbound client message.
#[derive(Debug, Error)]
pub enum WsDecodeError {
    /// Payload is not valid JSON or misses required fields
    #[error("Malformed message: {0}")]
    Malformed(String),

    /// Action tag is not part of the protocol
    #[error("Unknown action: {0}")]
    UnknownAction(String),
}

/// Message from client to server.
#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
#[serde(tag = "action", rename_all = "lowercase")]
pub enum ClientMessage {
    /// Add tickers to this connection's subscription set
    Subscribe { tickers: Vec<String> },
    /// Remove tickers from this connection's subscription set
    Unsubscribe { tickers: Vec<String> },
    /// Heartbeat; answered with `pong`
    Ping,
}

impl ClientMessage {
    /// Decodes a raw JSON text frame.
    ///
    /// Distinguishes an unknown `action` from structurally broken JSON
    /// so the server can answer with a precise error message.
    pub fn decode(raw: &str) -> Result<Self, WsDecodeError> {
        match serde_json::from_str::<ClientMessage>(raw) {
            Ok(message) => Ok(message),
            Err(err) => {
                // Recover the offending action tag when the JSON itself is sound
                if let Ok(value) = serde_json::from_str::<serde_json::Value>(raw) {
                    if let Some(action) = value.get("action").and_then(|a| a.as_str()) {
                        if !matches!(action, "subscribe" | "unsubscribe" | "ping") {
                            return Err(WsDecodeError::UnknownAction(action.to_string()));
                        }
                    }
                }
                Err(WsDecodeError::Malformed(err.to_string()))
            }
        }
    }
}

/// Message from server to client.
#[derive(Debug, Clone, Serialize, Deserialize)]
#[serde(tag = "type", rename_all = "snake_case")]
pub enum ServerMessage {
    /// Handshake acknowledgement after successful authentication
    Connected {
        connection_id: String,
        timestamp: DateTime<Utc>,
    },
    /// Price broadcast for a subscribed ticker
    PriceUpdate {
        #[serde(flatten)]
        snapshot: PriceSnapshot,
    },
    /// Notification delivery
    Notification {
        notification: Notification,
        timestamp: DateTime<Utc>,
    },
    /// Heartbeat reply
    Pong { timestamp: DateTime<Utc> },
    /// Protocol or server-side error
    Error { message: String },
}

impl ServerMessage {
    /// Encodes to a JSON text frame.
    pub fn encode(&self) -> String {
        // The enum contains only serializable leaves; encoding cannot fail
        serde_json::to_string(self).unwrap_or_else(|_| {
            "{\"type\":\"error\",\"message\":\"encoding failure\"}".to_string()
        })
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn test_decode_subscribe() {
        let message =
            ClientMessage::decode(r#"{"action": "subscribe", "tickers": ["AAPL", "MSFT"]}"#)
                .unwrap();
        assert_eq!(
            message,
            ClientMessage::Subscribe {
                tickers: vec!["AAPL".to_string(), "MSFT".to_string()]
            }
        );
    }

    #[test]
    fn test_decode_ping() {
        let message = ClientMessage::decode(r#"{"action": "ping"}"#).unwrap();
        assert_eq!(message, ClientMessage::Ping);
    }

    #[test]
    fn test_decode_unknown_action() {
        let err = ClientMessage::decode(r#"{"action": "teleport"}"#).unwrap_err();
        match err {
            WsDecodeError::UnknownAction(action) => assert_eq!(action, "teleport"),
            other => panic!("Expected UnknownAction, got {:?}", other),
        }
    }

    #[test]
    fn test_decode_malformed() {
        let err = ClientMessage::decode("not json at all").unwrap_err();
        assert!(matches!(err, WsDecodeError::Malformed(_)));

        // Valid JSON but a subscribe without tickers is malformed, not unknown
        let err = ClientMessage::decode(r#"{"action": "subscribe"}"#).unwrap_err();
        assert!(matches!(err, WsDecodeError::Malformed(_)));
    }

    #[test]
    fn test_encode_price_update_flattens_snapshot() {
        let message = ServerMessage::PriceUpdate {
            snapshot: PriceSnapshot {
                ticker: "MSFT".to_string(),
                price: 410.0,
                change: 1.0,
                change_percent: 0.25,
                volume: 1000,
                timestamp: Utc::now(),
            },
        };
        let json: serde_json::Value = serde_json::from_str(&message.encode()).unwrap();
        assert_eq!(json["type"], "price_update");
        assert_eq!(json["ticker"], "MSFT");
        assert_eq!(json["changePercent"], 0.25);
    }

    #[test]
    fn test_encode_pong() {
        let message = ServerMessage::Pong {
            timestamp: Utc::now(),
        };
        let json: serde_json::Value = serde_json::from_str(&message.encode()).unwrap();
        assert_eq!(json["type"], "pong");
        assert!(json["timestamp"].is_string());
    }

    #[test]
    fn test_encode_error() {
        let message = ServerMessage::Error {
            message: "Authentication failed".to_string(),
        };
        let json: serde_json::Value = serde_json::from_str(&message.encode()).unwrap();
        assert_eq!(json["type"], "error");
        assert_eq!(json["message"], "Authentication failed");
    }
}
