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

//! Price alert evaluator.
//!
//! The predicate is inclusive on both sides: `above` fires when the
//! observed price is at or above the threshold, `below` when at or
//! below. Triggering is a single conditional transition on the active
//! flag, so an alert can fire at most once no matter how many
//! observers race on it.

use std::sync::Arc;
use thiserror::Error;
use tracing::{info, instrument, warn};
use uuid::Uuid;

use crate::alerts::notifications::NotificationService;
use crate::audit::{actions, AuditService};
use crate::db::{queries, DBClient};
use crate::models::{
    kinds, AlertCondition, NotificationChannel, NotificationCreate, PriceAlert, PriceAlertCreate,
    TriggeredAlert,
};
use crate::security::{ValidationError, Validator};

/// Alert operation errors.
#[derive(Debug, Error)]
pub enum AlertError {
    #[error(transparent)]
    Validation(#[from] ValidationError),

    #[error("Alert not found: {0}")]
    NotFound(String),

    #[error("Storage error: {0}")]
    Storage(String),
}

/// Evaluates the alert predicate against an observed price.
pub fn check_condition(alert: &PriceAlert, observed: f64) -> bool {
    match alert.condition {
        AlertCondition::Above => observed >= alert.target_price,
        AlertCondition::Below => observed <= alert.target_price,
    }
}

/// Alert CRUD and the trigger transition.
pub struct AlertService {
    db: Arc<DBClient>,
    notifications: Arc<NotificationService>,
    audit: Arc<AuditService>,
}

impl AlertService {
    pub fn new(
        db: Arc<DBClient>,
        notifications: Arc<NotificationService>,
        audit: Arc<AuditService>,
    ) -> Self {
        Self {
            db,
            notifications,
            audit,
        }
    }

    /// Creates an active alert.
    #[instrument(name = "alert_create", skip(self, input), fields(ticker = %input.ticker))]
    pub async fn create(
        &self,
        user_id: &str,
        input: PriceAlertCreate,
    ) -> Result<PriceAlert, AlertError> {
        let ticker = Validator::validate_ticker(&input.ticker)?;
        Validator::validate_positive_price(input.target_price)?;
        Validator::validate_notification_channels(&input.notification_channels)?;

        let id = Uuid::new_v4().to_string();
        let channels: Vec<String> = input
            .notification_channels
            .iter()
            .map(|c| c.to_string())
            .collect();

        self.db
            .create(
                "price_alert",
                &id,
                serde_json::json!({
                    "user_id": user_id,
                    "ticker": ticker,
                    "condition": input.condition.to_string(),
                    "target_price": input.target_price,
                    "notification_channels": channels,
                }),
            )
            .await
            .map_err(|e| AlertError::Storage(e.to_string()))?;

        info!(alert_id = %id, ticker = %ticker, "Alert created");
        self.get(&id).await
    }

    /// Fetches one alert.
    pub async fn get(&self, id: &str) -> Result<PriceAlert, AlertError> {
        let query = format!(
            "{} WHERE meta::id(id) = $id",
            queries::price_alert::SELECT_BASE
        );
        let rows = self
            .db
            .query_json_with_params(
                &query,
                vec![("id".to_string(), serde_json::Value::String(id.to_string()))],
            )
            .await
            .map_err(|e| AlertError::Storage(e.to_string()))?;

        rows.into_iter()
            .next()
            .map(decode_row)
            .transpose()?
            .ok_or_else(|| AlertError::NotFound(id.to_string()))
    }

    /// Lists one user's alerts.
    pub async fn list_for_user(&self, user_id: &str) -> Result<Vec<PriceAlert>, AlertError> {
        let query = format!(
            "{} WHERE user_id = $user ORDER BY created_at DESC",
            queries::price_alert::SELECT_BASE
        );
        let rows = self
            .db
            .query_json_with_params(
                &query,
                vec![(
                    "user".to_string(),
                    serde_json::Value::String(user_id.to_string()),
                )],
            )
            .await
            .map_err(|e| AlertError::Storage(e.to_string()))?;

        rows.into_iter().map(decode_row).collect()
    }

    /// Every active alert across users; the price-alert agent sweeps
    /// this set.
    pub async fn get_active_alerts(&self) -> Result<Vec<PriceAlert>, AlertError> {
        let query = format!(
            "{} WHERE is_active = true",
            queries::price_alert::SELECT_BASE
        );
        let rows = self
            .db
            .query_json(&query)
            .await
            .map_err(|e| AlertError::Storage(e.to_string()))?;

        rows.into_iter().map(decode_row).collect()
    }

    /// Attempts the one-shot trigger transition.
    ///
    /// Returns the trigger payload when this call performed the
    /// transition, or `None` when the alert was already inactive (a
    /// concurrent observer got there first, or it fired earlier). The
    /// conditional update on `is_active` is the serialization point.
    #[instrument(name = "alert_trigger", skip(self, alert), fields(alert_id = %alert.id, ticker = %alert.ticker))]
    pub async fn trigger(
        &self,
        alert: &PriceAlert,
        observed: f64,
    ) -> Result<Option<TriggeredAlert>, AlertError> {
        let rows = self
            .db
            .query_json_with_params(
                "UPDATE price_alert SET is_active = false, triggered_at = time::now() \
                 WHERE meta::id(id) = $id AND is_active = true \
                 RETURN triggered_at",
                vec![(
                    "id".to_string(),
                    serde_json::Value::String(alert.id.clone()),
                )],
            )
            .await
            .map_err(|e| AlertError::Storage(e.to_string()))?;

        let Some(row) = rows.into_iter().next() else {
            // Already triggered; nothing to do
            return Ok(None);
        };

        let triggered_at = row
            .get("triggered_at")
            .and_then(|v| v.as_str())
            .and_then(|s| s.parse().ok())
            .unwrap_or_else(chrono::Utc::now);

        let triggered = TriggeredAlert {
            alert_id: alert.id.clone(),
            ticker: alert.ticker.clone(),
            condition: alert.condition,
            threshold: alert.target_price,
            observed,
            triggered_at,
        };

        info!(
            alert_id = %alert.id,
            ticker = %alert.ticker,
            observed = observed,
            threshold = alert.target_price,
            "Alert triggered"
        );

        self.dispatch_notification(alert, &triggered).await;

        self.audit
            .record(
                Some(&alert.user_id),
                actions::ALERT_TRIGGERED,
                "price_alert",
                Some(&alert.id),
                serde_json::json!({"ticker": alert.ticker, "observed": observed}),
            )
            .await;

        Ok(Some(triggered))
    }

    /// Creates the `price_alert` notification and routes it per the
    /// alert's channel set. In-app goes through the hub immediately;
    /// email and push are handed to the external delivery workers.
    async fn dispatch_notification(&self, alert: &PriceAlert, triggered: &TriggeredAlert) {
        let direction = match alert.condition {
            AlertCondition::Above => "above",
            AlertCondition::Below => "below",
        };

        let input = NotificationCreate {
            user_id: alert.user_id.clone(),
            kind: kinds::PRICE_ALERT.to_string(),
            title: format!("Price Alert: {}", alert.ticker),
            message: format!(
                "{} is now {} ${:.2}",
                alert.ticker, direction, alert.target_price
            ),
            data: serde_json::json!({
                "alert_id": triggered.alert_id,
                "ticker": triggered.ticker,
                "condition": triggered.condition,
                "threshold": triggered.threshold,
                "observed": triggered.observed,
                "triggered_at": triggered.triggered_at,
                "channels": alert.notification_channels,
            }),
        };

        if let Err(e) = self.notifications.create(input).await {
            warn!(alert_id = %alert.id, error = %e, "Failed to persist trigger notification");
        }

        for channel in &alert.notification_channels {
            match channel {
                NotificationChannel::InApp => {} // pushed by NotificationService::create
                NotificationChannel::Email | NotificationChannel::Push => {
                    info!(
                        alert_id = %alert.id,
                        channel = %channel,
                        "Delegating delivery to external worker"
                    );
                }
            }
        }
    }
}

/// Decodes an alert row, mapping channel strings back to the enum.
fn decode_row(row: serde_json::Value) -> Result<PriceAlert, AlertError> {
    serde_json::from_value(row).map_err(|e| AlertError::Storage(format!("alert row decode: {}", e)))
}
