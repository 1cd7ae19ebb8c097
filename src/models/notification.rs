// Copyright 2025 Zileo-Chat-3 Contributors
// SPDX-License-Identifier: Apache-2.0

//! Notification models.
//!
//! Notifications are append-only; the only mutation permitted after
//! creation is flipping the read flag.

use chrono::{DateTime, Utc};
use serde::{Deserialize, Serialize};

/// Notification category tags used by the system.
pub mod kinds {
    pub const PRICE_ALERT: &str = "price_alert";
    pub const RESEARCH_UPDATE: &str = "research_update";
    pub const REBALANCING_SUGGESTION: &str = "rebalancing_suggestion";
}

/// Notification row.
#[derive(Debug, Clone, Serialize, Deserialize)]
pub struct Notification {
    pub id: String,
    pub user_id: String,
    /// Category tag (e.g. `price_alert`, `research_update`)
    #[serde(rename = "type")]
    pub kind: String,
    pub title: String,
    pub message: String,
    /// Structured payload specific to the category
    pub data: serde_json::Value,
    pub is_read: bool,
    pub created_at: DateTime<Utc>,
}

/// Input for creating a notification.
#[derive(Debug, Clone, Serialize, Deserialize)]
pub struct NotificationCreate {
    pub user_id: String,
    #[serde(rename = "type")]
    pub kind: String,
    pub title: String,
    pub message: String,
    pub data: serde_json::Value,
}
