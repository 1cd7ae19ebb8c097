// Copyright 2025 Zileo-Chat-3 Contributors
// SPDX-License-Identifier: Apache-2.0

//! Notification persistence and in-app delivery.

use std::sync::Arc;
use thiserror::Error;
use tracing::{debug, instrument};
use uuid::Uuid;

use crate::db::{queries, DBClient};
use crate::models::{Notification, NotificationCreate};
use crate::realtime::hub::Hub;

/// Notification errors.
#[derive(Debug, Error)]
pub enum NotificationError {
    #[error("Notification not found: {0}")]
    NotFound(String),

    #[error("Storage error: {0}")]
    Storage(String),
}

/// Creates, lists, and delivers notifications.
pub struct NotificationService {
    db: Arc<DBClient>,
    hub: Arc<Hub>,
}

impl NotificationService {
    pub fn new(db: Arc<DBClient>, hub: Arc<Hub>) -> Self {
        Self { db, hub }
    }

    /// Persists a notification and pushes it to the user's live
    /// connections. Delivery is best-effort; the persisted row is the
    /// source of truth.
    #[instrument(name = "notification_create", skip(self, input), fields(user_id = %input.user_id, kind = %input.kind))]
    pub async fn create(&self, input: NotificationCreate) -> Result<Notification, NotificationError> {
        let id = Uuid::new_v4().to_string();

        self.db
            .create(
                "notification",
                &id,
                serde_json::json!({
                    "user_id": input.user_id,
                    "type": input.kind,
                    "title": input.title,
                    "message": input.message,
                    "data": input.data.to_string(),
                }),
            )
            .await
            .map_err(|e| NotificationError::Storage(e.to_string()))?;

        let notification = self.get(&id).await?;

        let delivered = self
            .hub
            .send_notification(&notification.user_id, notification.clone())
            .await;
        debug!(notification_id = %id, delivered = delivered, "Notification pushed in-app");

        Ok(notification)
    }

    /// Fetches one notification.
    pub async fn get(&self, id: &str) -> Result<Notification, NotificationError> {
        let query = format!(
            "{} WHERE meta::id(id) = $id",
            queries::notification::SELECT_BASE
        );
        let rows = self
            .db
            .query_json_with_params(
                &query,
                vec![("id".to_string(), serde_json::Value::String(id.to_string()))],
            )
            .await
            .map_err(|e| NotificationError::Storage(e.to_string()))?;

        rows.into_iter()
            .next()
            .map(decode_row)
            .transpose()?
            .ok_or_else(|| NotificationError::NotFound(id.to_string()))
    }

    /// Lists a user's notifications, newest first.
    pub async fn list(
        &self,
        user_id: &str,
        unread_only: bool,
    ) -> Result<Vec<Notification>, NotificationError> {
        let mut query = format!(
            "{} WHERE user_id = $user",
            queries::notification::SELECT_BASE
        );
        if unread_only {
            query.push_str(" AND is_read = false");
        }
        query.push_str(" ORDER BY created_at DESC");

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
            .map_err(|e| NotificationError::Storage(e.to_string()))?;

        rows.into_iter().map(decode_row).collect()
    }

    /// Flips the read flag. The only permitted mutation.
    #[instrument(name = "notification_mark_read", skip(self))]
    pub async fn mark_read(&self, id: &str) -> Result<(), NotificationError> {
        self.get(id).await?;
        self.db
            .execute_with_params(
                "UPDATE notification SET is_read = true WHERE meta::id(id) = $id",
                vec![("id".to_string(), serde_json::Value::String(id.to_string()))],
            )
            .await
            .map_err(|e| NotificationError::Storage(e.to_string()))
    }
}

/// Decodes a notification row, expanding the stringified `data`
/// payload back into structured JSON.
fn decode_row(mut row: serde_json::Value) -> Result<Notification, NotificationError> {
    if let Some(raw) = row.get("data").and_then(|d| d.as_str()) {
        let parsed: serde_json::Value =
            serde_json::from_str(raw).unwrap_or(serde_json::Value::Null);
        row["data"] = parsed;
    }

    serde_json::from_value(row)
        .map_err(|e| NotificationError::Storage(format!("notification row decode: {}", e)))
}

#[cfg(test)]
mod tests {
    use super::*;
    use crate::models::kinds;
    use tempfile::tempdir;

    async fn service() -> (NotificationService, Arc<Hub>, tempfile::TempDir) {
        let temp_dir = tempdir().expect("Failed to create temp dir");
        let db = Arc::new(
            DBClient::new(temp_dir.path().join("notif_db").to_str().unwrap())
                .await
                .unwrap(),
        );
        db.initialize_schema().await.unwrap();
        let hub = Arc::new(Hub::new());
        (NotificationService::new(db, hub.clone()), hub, temp_dir)
    }

    fn input(user_id: &str) -> NotificationCreate {
        NotificationCreate {
            user_id: user_id.to_string(),
            kind: kinds::PRICE_ALERT.to_string(),
            title: "Price Alert: AAPL".to_string(),
            message: "AAPL is now above $150.00".to_string(),
            data: serde_json::json!({"ticker": "AAPL", "observed": 151.0}),
        }
    }

    #[tokio::test]
    async fn test_create_and_get() {
        let (service, _hub, _dir) = service().await;
        let created = service.create(input("user-1")).await.unwrap();

        assert_eq!(created.kind, "price_alert");
        assert!(!created.is_read);
        assert_eq!(created.data["ticker"], "AAPL");

        let fetched = service.get(&created.id).await.unwrap();
        assert_eq!(fetched.id, created.id);
        assert_eq!(fetched.data["observed"], 151.0);
    }

    #[tokio::test]
    async fn test_create_delivers_to_connected_user() {
        let (service, hub, _dir) = service().await;
        let (_conn, mut rx) = hub.connect("user-1").await;

        service.create(input("user-1")).await.unwrap();

        match rx.try_recv().unwrap() {
            crate::models::ServerMessage::Notification { notification, .. } => {
                assert_eq!(notification.kind, "price_alert");
            }
            other => panic!("Expected notification, got {:?}", other),
        }
    }

    #[tokio::test]
    async fn test_list_and_mark_read() {
        let (service, _hub, _dir) = service().await;
        let first = service.create(input("user-1")).await.unwrap();
        service.create(input("user-1")).await.unwrap();
        service.create(input("user-2")).await.unwrap();

        let all = service.list("user-1", false).await.unwrap();
        assert_eq!(all.len(), 2);

        service.mark_read(&first.id).await.unwrap();

        let unread = service.list("user-1", true).await.unwrap();
        assert_eq!(unread.len(), 1);
        assert_ne!(unread[0].id, first.id);
    }

    #[tokio::test]
    async fn test_mark_read_unknown_id() {
        let (service, _hub, _dir) = service().await;
        let err = service.mark_read("missing").await.unwrap_err();
        assert!(matches!(err, NotificationError::NotFound(_)));
    }
}
