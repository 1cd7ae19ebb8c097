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

//! Connection hub.
//!
//! Tracks live connections and two secondary indexes (user id ->
//! connections, ticker -> connections). A single readers-writer lock
//! covers all three maps so the indexes can never disagree with each
//! other.
//!
//! Each connection owns an unbounded channel; a writer task drains it
//! into the socket, so outbound messages per connection are delivered
//! in enqueue order. A failed enqueue means the writer is gone and the
//! connection is torn down exactly once.

use chrono::Utc;
use serde::Serialize;
use std::collections::{HashMap, HashSet};
use tokio::sync::{mpsc, RwLock};
use tracing::{debug, info, warn};
use uuid::Uuid;

use crate::models::{Notification, PriceSnapshot, ServerMessage};

struct ConnectionEntry {
    user_id: String,
    sender: mpsc::UnboundedSender<ServerMessage>,
    tickers: HashSet<String>,
}

#[derive(Default)]
struct HubInner {
    connections: HashMap<String, ConnectionEntry>,
    by_user: HashMap<String, HashSet<String>>,
    by_ticker: HashMap<String, HashSet<String>>,
}

/// Connection statistics snapshot.
#[derive(Debug, Clone, Serialize)]
pub struct HubStats {
    pub total_connections: usize,
    pub unique_users: usize,
    pub subscribed_tickers: Vec<String>,
}

/// Real-time connection hub.
#[derive(Default)]
pub struct Hub {
    inner: RwLock<HubInner>,
}

impl Hub {
    pub fn new() -> Self {
        Self::default()
    }

    /// Registers a connection for an authenticated user.
    ///
    /// Returns the fresh connection id and the receiving end of the
    /// connection's outbound queue; the caller owns the writer task
    /// that drains it into the socket.
    pub async fn connect(
        &self,
        user_id: &str,
    ) -> (String, mpsc::UnboundedReceiver<ServerMessage>) {
        let connection_id = Uuid::new_v4().to_string();
        let (sender, receiver) = mpsc::unbounded_channel();

        let mut inner = self.inner.write().await;
        inner.connections.insert(
            connection_id.clone(),
            ConnectionEntry {
                user_id: user_id.to_string(),
                sender,
                tickers: HashSet::new(),
            },
        );
        inner
            .by_user
            .entry(user_id.to_string())
            .or_default()
            .insert(connection_id.clone());

        info!(connection_id = %connection_id, user_id = %user_id, "Connection registered");
        (connection_id, receiver)
    }

    /// Removes a connection from every index. Idempotent; returns
    /// whether the connection was still registered.
    pub async fn disconnect(&self, connection_id: &str) -> bool {
        let mut inner = self.inner.write().await;

        let Some(entry) = inner.connections.remove(connection_id) else {
            return false;
        };

        if let Some(conns) = inner.by_user.get_mut(&entry.user_id) {
            conns.remove(connection_id);
            if conns.is_empty() {
                inner.by_user.remove(&entry.user_id);
            }
        }

        for ticker in &entry.tickers {
            if let Some(conns) = inner.by_ticker.get_mut(ticker) {
                conns.remove(connection_id);
                if conns.is_empty() {
                    inner.by_ticker.remove(ticker);
                }
            }
        }

        info!(connection_id = %connection_id, user_id = %entry.user_id, "Connection removed");
        true
    }

    /// Adds tickers to a connection's subscription set.
    ///
    /// Returns false if the connection is not registered.
    pub async fn subscribe(&self, connection_id: &str, tickers: &[String]) -> bool {
        let mut inner = self.inner.write().await;

        if !inner.connections.contains_key(connection_id) {
            return false;
        }

        for ticker in tickers {
            let ticker = ticker.to_uppercase();
            inner
                .by_ticker
                .entry(ticker.clone())
                .or_default()
                .insert(connection_id.to_string());
            if let Some(entry) = inner.connections.get_mut(connection_id) {
                entry.tickers.insert(ticker);
            }
        }

        debug!(connection_id = %connection_id, count = tickers.len(), "Subscribed to tickers");
        true
    }

    /// Removes tickers from a connection's subscription set.
    pub async fn unsubscribe(&self, connection_id: &str, tickers: &[String]) -> bool {
        let mut inner = self.inner.write().await;

        if !inner.connections.contains_key(connection_id) {
            return false;
        }

        for ticker in tickers {
            let ticker = ticker.to_uppercase();
            if let Some(entry) = inner.connections.get_mut(connection_id) {
                entry.tickers.remove(&ticker);
            }
            if let Some(conns) = inner.by_ticker.get_mut(&ticker) {
                conns.remove(connection_id);
                if conns.is_empty() {
                    inner.by_ticker.remove(&ticker);
                }
            }
        }

        debug!(connection_id = %connection_id, count = tickers.len(), "Unsubscribed from tickers");
        true
    }

    /// Enqueues a message for one connection.
    pub async fn send_to(&self, connection_id: &str, message: ServerMessage) -> bool {
        let failed = {
            let inner = self.inner.read().await;
            match inner.connections.get(connection_id) {
                Some(entry) => entry.sender.send(message).is_err(),
                None => return false,
            }
        };

        if failed {
            self.teardown_failed(&[connection_id.to_string()]).await;
            return false;
        }
        true
    }

    /// Sends a price update to every connection subscribed to the
    /// ticker. Best-effort: returns how many connections it reached.
    pub async fn broadcast_price_update(&self, ticker: &str, snapshot: PriceSnapshot) -> usize {
        let ticker = ticker.to_uppercase();
        let mut delivered = 0;
        let mut failed = Vec::new();

        {
            let inner = self.inner.read().await;
            let Some(subscribers) = inner.by_ticker.get(&ticker) else {
                return 0;
            };

            for connection_id in subscribers {
                if let Some(entry) = inner.connections.get(connection_id) {
                    let message = ServerMessage::PriceUpdate {
                        snapshot: snapshot.clone(),
                    };
                    if entry.sender.send(message).is_ok() {
                        delivered += 1;
                    } else {
                        failed.push(connection_id.clone());
                    }
                }
            }
        }

        if !failed.is_empty() {
            self.teardown_failed(&failed).await;
        }

        debug!(ticker = %ticker, delivered = delivered, "Price update broadcast");
        delivered
    }

    /// Sends a notification to every live connection of a user.
    /// Returns how many connections it reached.
    pub async fn send_notification(&self, user_id: &str, notification: Notification) -> usize {
        let mut delivered = 0;
        let mut failed = Vec::new();

        {
            let inner = self.inner.read().await;
            let Some(connections) = inner.by_user.get(user_id) else {
                debug!(user_id = %user_id, "No live connections for notification");
                return 0;
            };

            for connection_id in connections {
                if let Some(entry) = inner.connections.get(connection_id) {
                    let message = ServerMessage::Notification {
                        notification: notification.clone(),
                        timestamp: Utc::now(),
                    };
                    if entry.sender.send(message).is_ok() {
                        delivered += 1;
                    } else {
                        failed.push(connection_id.clone());
                    }
                }
            }
        }

        if !failed.is_empty() {
            self.teardown_failed(&failed).await;
        }

        delivered
    }

    /// Every ticker that currently has at least one subscriber.
    pub async fn subscribed_tickers(&self) -> Vec<String> {
        let inner = self.inner.read().await;
        let mut tickers: Vec<String> = inner.by_ticker.keys().cloned().collect();
        tickers.sort();
        tickers
    }

    /// Connection statistics snapshot.
    pub async fn stats(&self) -> HubStats {
        let inner = self.inner.read().await;
        HubStats {
            total_connections: inner.connections.len(),
            unique_users: inner.by_user.len(),
            subscribed_tickers: {
                let mut tickers: Vec<String> = inner.by_ticker.keys().cloned().collect();
                tickers.sort();
                tickers
            },
        }
    }

    async fn teardown_failed(&self, connection_ids: &[String]) {
        for connection_id in connection_ids {
            warn!(connection_id = %connection_id, "Send failed, tearing down connection");
            self.disconnect(connection_id).await;
        }
    }
}
