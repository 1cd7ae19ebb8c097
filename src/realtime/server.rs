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

//! WebSocket endpoint.
//!
//! Clients connect with `GET /ws?token={access_token}`. The token is
//! verified through the auth service before the connection is
//! registered with the hub; failures are answered with a JSON error
//! and close code 1008 (policy violation). A clean server shutdown
//! closes with 1000.
//!
//! ## Protocol
//!
//! Client -> server: `subscribe {tickers}`, `unsubscribe {tickers}`,
//! `ping`. Anything else is answered with `{type: "error"}`.
//! Server -> client: `connected`, `price_update`, `notification`,
//! `pong`, `error`.

use chrono::Utc;
use futures_util::{SinkExt, StreamExt};
use std::sync::Arc;
use tokio::net::{TcpListener, TcpStream};
use tokio_tungstenite::tungstenite::handshake::server::{Request, Response};
use tokio_tungstenite::tungstenite::protocol::frame::coding::CloseCode;
use tokio_tungstenite::tungstenite::protocol::CloseFrame;
use tokio_tungstenite::tungstenite::Message;
use tokio_util::sync::CancellationToken;
use tracing::{debug, info, warn};

use crate::auth::AuthService;
use crate::models::{ClientMessage, ServerMessage, WsDecodeError};
use crate::realtime::hub::Hub;
use crate::security::Validator;

/// Authenticated WebSocket server over the hub.
pub struct WsServer {
    hub: Arc<Hub>,
    auth: Arc<AuthService>,
    bind_addr: String,
    shutdown: CancellationToken,
}

impl WsServer {
    pub fn new(
        hub: Arc<Hub>,
        auth: Arc<AuthService>,
        bind_addr: String,
        shutdown: CancellationToken,
    ) -> Self {
        Self {
            hub,
            auth,
            bind_addr,
            shutdown,
        }
    }

    /// Binds the configured address and runs the accept loop until the
    /// shutdown token fires.
    pub async fn run(self: Arc<Self>) -> anyhow::Result<()> {
        let listener = TcpListener::bind(&self.bind_addr).await?;
        info!(addr = %self.bind_addr, "WebSocket server listening");
        self.run_on(listener).await
    }

    /// Accept loop over an already-bound listener.
    pub async fn run_on(self: Arc<Self>, listener: TcpListener) -> anyhow::Result<()> {
        loop {
            tokio::select! {
                _ = self.shutdown.cancelled() => {
                    info!("WebSocket server shutting down");
                    break;
                }
                accepted = listener.accept() => {
                    match accepted {
                        Ok((stream, peer)) => {
                            debug!(peer = %peer, "Incoming connection");
                            let server = Arc::clone(&self);
                            tokio::spawn(async move {
                                if let Err(e) = server.handle_connection(stream).await {
                                    debug!(error = %e, "Connection ended with error");
                                }
                            });
                        }
                        Err(e) => warn!(error = %e, "Accept failed"),
                    }
                }
            }
        }

        Ok(())
    }

    async fn handle_connection(&self, stream: TcpStream) -> anyhow::Result<()> {
        // Capture the token from the handshake request's query string
        let mut token: Option<String> = None;
        let ws = tokio_tungstenite::accept_hdr_async(stream, |req: &Request, resp: Response| {
            token = extract_token(req.uri().query());
            Ok(resp)
        })
        .await?;

        // Authenticate before registering anything
        let user = match &token {
            Some(token) => self.auth.verify_session(token).await.ok(),
            None => None,
        };

        let Some(user) = user else {
            warn!("WebSocket authentication failed");
            let mut ws = ws;
            let error = ServerMessage::Error {
                message: "Authentication failed".to_string(),
            };
            let _ = ws.send(Message::Text(error.encode().into())).await;
            let _ = ws
                .send(Message::Close(Some(CloseFrame {
                    code: CloseCode::Policy,
                    reason: "authentication failed".into(),
                })))
                .await;
            return Ok(());
        };

        let (connection_id, mut outbound) = self.hub.connect(&user.id).await;
        let (mut sink, mut inbound) = ws.split();

        // Writer task: drains the hub queue in order; sends the normal
        // close frame once the queue ends (disconnect or shutdown)
        let writer_connection_id = connection_id.clone();
        let writer = tokio::spawn(async move {
            while let Some(message) = outbound.recv().await {
                if sink
                    .send(Message::Text(message.encode().into()))
                    .await
                    .is_err()
                {
                    debug!(connection_id = %writer_connection_id, "Write failed, stopping writer");
                    break;
                }
            }
            let _ = sink
                .send(Message::Close(Some(CloseFrame {
                    code: CloseCode::Normal,
                    reason: "server closing".into(),
                })))
                .await;
        });

        self.hub
            .send_to(
                &connection_id,
                ServerMessage::Connected {
                    connection_id: connection_id.clone(),
                    timestamp: Utc::now(),
                },
            )
            .await;

        // Reader loop
        loop {
            tokio::select! {
                _ = self.shutdown.cancelled() => break,
                frame = inbound.next() => {
                    match frame {
                        Some(Ok(Message::Text(text))) => {
                            self.handle_client_message(&connection_id, text.as_str()).await;
                        }
                        Some(Ok(Message::Close(_))) | None => {
                            debug!(connection_id = %connection_id, "Client disconnected");
                            break;
                        }
                        Some(Ok(_)) => {} // binary/ping/pong frames are ignored
                        Some(Err(e)) => {
                            debug!(connection_id = %connection_id, error = %e, "Read failed");
                            break;
                        }
                    }
                }
            }
        }

        // Removing the connection drops its sender; the writer drains
        // the queue and sends the close frame
        self.hub.disconnect(&connection_id).await;
        let _ = writer.await;

        Ok(())
    }

    async fn handle_client_message(&self, connection_id: &str, raw: &str) {
        match ClientMessage::decode(raw) {
            Ok(ClientMessage::Subscribe { tickers }) => {
                match validate_tickers(&tickers) {
                    Ok(validated) => {
                        self.hub.subscribe(connection_id, &validated).await;
                        info!(connection_id = %connection_id, tickers = ?validated, "Subscribed");
                    }
                    Err(message) => self.send_error(connection_id, message).await,
                }
            }
            Ok(ClientMessage::Unsubscribe { tickers }) => {
                match validate_tickers(&tickers) {
                    Ok(validated) => {
                        self.hub.unsubscribe(connection_id, &validated).await;
                        info!(connection_id = %connection_id, tickers = ?validated, "Unsubscribed");
                    }
                    Err(message) => self.send_error(connection_id, message).await,
                }
            }
            Ok(ClientMessage::Ping) => {
                self.hub
                    .send_to(
                        connection_id,
                        ServerMessage::Pong {
                            timestamp: Utc::now(),
                        },
                    )
                    .await;
            }
            Err(WsDecodeError::UnknownAction(action)) => {
                self.send_error(connection_id, format!("Unknown action: {}", action))
                    .await;
            }
            Err(WsDecodeError::Malformed(reason)) => {
                self.send_error(connection_id, format!("Malformed message: {}", reason))
                    .await;
            }
        }
    }

    async fn send_error(&self, connection_id: &str, message: String) {
        self.hub
            .send_to(connection_id, ServerMessage::Error { message })
            .await;
    }
}

/// Pulls `token` out of a query string.
fn extract_token(query: Option<&str>) -> Option<String> {
    query?
        .split('&')
        .find_map(|pair| pair.strip_prefix("token="))
        .filter(|token| !token.is_empty())
        .map(|token| token.to_string())
}

/// Validates and normalizes a ticker list from a client message.
fn validate_tickers(tickers: &[String]) -> Result<Vec<String>, String> {
    if tickers.is_empty() {
        return Err("tickers must be a non-empty list".to_string());
    }

    let mut validated = Vec::with_capacity(tickers.len());
    for ticker in tickers {
        match Validator::validate_ticker(ticker) {
            Ok(normalized) => validated.push(normalized),
            Err(e) => return Err(format!("Invalid ticker '{}': {}", ticker, e)),
        }
    }
    Ok(validated)
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn test_extract_token() {
        assert_eq!(
            extract_token(Some("token=abc123")),
            Some("abc123".to_string())
        );
        assert_eq!(
            extract_token(Some("foo=bar&token=abc123&x=1")),
            Some("abc123".to_string())
        );
        assert_eq!(extract_token(Some("foo=bar")), None);
        assert_eq!(extract_token(Some("token=")), None);
        assert_eq!(extract_token(None), None);
    }

    #[test]
    fn test_validate_tickers() {
        let validated = validate_tickers(&["aapl".to_string(), "MSFT".to_string()]).unwrap();
        assert_eq!(validated, vec!["AAPL".to_string(), "MSFT".to_string()]);

        assert!(validate_tickers(&[]).is_err());
        assert!(validate_tickers(&["123!".to_string()]).is_err());
    }
}
