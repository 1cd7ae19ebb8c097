// Copyright 2025 Zileo-Chat-3 Contributors
// SPDX-License-Identifier: Apache-2.0

//! Price alert models.
//!
//! An alert watches one ticker against a threshold. Once the observed
//! price satisfies the condition the alert triggers exactly once:
//! `is_active` flips to false, `triggered_at` is stamped and never
//! modified afterwards.

use chrono::{DateTime, Utc};
use serde::{Deserialize, Serialize};

/// Alert trigger condition.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Serialize, Deserialize)]
#[serde(rename_all = "lowercase")]
pub enum AlertCondition {
    /// Trigger when the observed price is at or above the threshold
    Above,
    /// Trigger when the observed price is at or below the threshold
    Below,
}

impl std::fmt::Display for AlertCondition {
    fn fmt(&self, f: &mut std::fmt::Formatter<'_>) -> std::fmt::Result {
        match self {
            AlertCondition::Above => write!(f, "above"),
            AlertCondition::Below => write!(f, "below"),
        }
    }
}

/// Delivery channel for a triggered alert.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Hash, Serialize, Deserialize)]
pub enum NotificationChannel {
    /// Real-time hub delivery to connected clients
    #[serde(rename = "in-app")]
    InApp,
    /// Delegated to the email delivery worker
    #[serde(rename = "email")]
    Email,
    /// Delegated to the push delivery worker
    #[serde(rename = "push")]
    Push,
}

impl std::fmt::Display for NotificationChannel {
    fn fmt(&self, f: &mut std::fmt::Formatter<'_>) -> std::fmt::Result {
        match self {
            NotificationChannel::InApp => write!(f, "in-app"),
            NotificationChannel::Email => write!(f, "email"),
            NotificationChannel::Push => write!(f, "push"),
        }
    }
}

/// Price alert row.
#[derive(Debug, Clone, Serialize, Deserialize)]
pub struct PriceAlert {
    pub id: String,
    pub user_id: String,
    pub ticker: String,
    pub condition: AlertCondition,
    pub target_price: f64,
    pub notification_channels: Vec<NotificationChannel>,
    pub is_active: bool,
    pub created_at: DateTime<Utc>,
    #[serde(skip_serializing_if = "Option::is_none")]
    pub triggered_at: Option<DateTime<Utc>>,
}

/// Input for creating a price alert.
#[derive(Debug, Clone, Serialize, Deserialize)]
pub struct PriceAlertCreate {
    pub ticker: String,
    pub condition: AlertCondition,
    pub target_price: f64,
    pub notification_channels: Vec<NotificationChannel>,
}

/// Payload describing a fired alert, carried inside the
/// `price_alert` notification.
#[derive(Debug, Clone, Serialize, Deserialize)]
pub struct TriggeredAlert {
    pub alert_id: String,
    pub ticker: String,
    pub condition: AlertCondition,
    pub threshold: f64,
    pub observed: f64,
    pub triggered_at: DateTime<Utc>,
}
