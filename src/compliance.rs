// Copyright 2025 Zileo-Chat-3 Contributors
// SPDX-License-Identifier: Apache-2.0

//! Compliance: data-deletion requests and policy acceptances.
//!
//! A deletion request starts a grace period; until it elapses the user
//! can cancel. A periodic sweep purges the data graph of every request
//! whose grace period has passed and marks it completed. The request
//! row keeps the email so it remains auditable after the user rows are
//! gone.

use chrono::{DateTime, Utc};
use serde::{Deserialize, Serialize};
use std::sync::Arc;
use thiserror::Error;
use tracing::{info, instrument, warn};
use uuid::Uuid;

use crate::audit::{actions, AuditService};
use crate::db::{queries, DBClient};

/// Grace period before a deletion request is executed.
pub const DELETION_GRACE_DAYS: i64 = 30;

/// Deletion request lifecycle.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Serialize, Deserialize)]
#[serde(rename_all = "lowercase")]
pub enum DeletionStatus {
    Pending,
    Completed,
    Cancelled,
}

/// One data-deletion request.
#[derive(Debug, Clone, Serialize, Deserialize)]
pub struct DeletionRequest {
    pub id: String,
    pub user_id: Option<String>,
    pub user_email: String,
    pub requested_at: DateTime<Utc>,
    pub scheduled_deletion_date: DateTime<Utc>,
    pub status: DeletionStatus,
    #[serde(skip_serializing_if = "Option::is_none")]
    pub completed_at: Option<DateTime<Utc>>,
}

/// Compliance errors.
#[derive(Debug, Error)]
pub enum ComplianceError {
    #[error("Deletion request not found: {0}")]
    NotFound(String),

    #[error("Deletion request {0} is not pending")]
    NotPending(String),

    #[error("Storage error: {0}")]
    Storage(String),
}

/// Deletion requests and policy acceptance records.
pub struct ComplianceService {
    db: Arc<DBClient>,
    audit: Arc<AuditService>,
}

impl ComplianceService {
    pub fn new(db: Arc<DBClient>, audit: Arc<AuditService>) -> Self {
        Self { db, audit }
    }

    /// Opens a deletion request with the standard grace period.
    #[instrument(name = "compliance_request_deletion", skip(self))]
    pub async fn request_deletion(
        &self,
        user_id: &str,
        user_email: &str,
    ) -> Result<DeletionRequest, ComplianceError> {
        let id = Uuid::new_v4().to_string();

        self.db
            .execute_with_params(
                &format!(
                    "CREATE data_deletion_request:`{}` SET user_id = $user, \
                     user_email = $email, status = 'pending', \
                     scheduled_deletion_date = time::now() + {}d",
                    id, DELETION_GRACE_DAYS
                ),
                vec![
                    (
                        "user".to_string(),
                        serde_json::Value::String(user_id.to_string()),
                    ),
                    (
                        "email".to_string(),
                        serde_json::Value::String(user_email.to_string()),
                    ),
                ],
            )
            .await
            .map_err(|e| ComplianceError::Storage(e.to_string()))?;

        info!(request_id = %id, user_id = %user_id, "Deletion request opened");
        self.audit
            .record(
                Some(user_id),
                actions::DELETION_REQUESTED,
                "data_deletion_request",
                Some(&id),
                serde_json::json!({"grace_days": DELETION_GRACE_DAYS}),
            )
            .await;

        self.get(&id).await
    }

    /// Fetches one deletion request.
    pub async fn get(&self, id: &str) -> Result<DeletionRequest, ComplianceError> {
        let rows = self
            .db
            .query_json_with_params(
                "SELECT meta::id(id) AS id, user_id, user_email, requested_at, \
                 scheduled_deletion_date, status, completed_at \
                 FROM data_deletion_request WHERE meta::id(id) = $id",
                vec![("id".to_string(), serde_json::Value::String(id.to_string()))],
            )
            .await
            .map_err(|e| ComplianceError::Storage(e.to_string()))?;

        rows.into_iter()
            .next()
            .map(|row| {
                serde_json::from_value(row)
                    .map_err(|e| ComplianceError::Storage(format!("request decode: {}", e)))
            })
            .transpose()?
            .ok_or_else(|| ComplianceError::NotFound(id.to_string()))
    }

    /// Cancels a pending request inside the grace period.
    #[instrument(name = "compliance_cancel_deletion", skip(self))]
    pub async fn cancel_request(&self, id: &str) -> Result<(), ComplianceError> {
        let request = self.get(id).await?;
        if request.status != DeletionStatus::Pending {
            return Err(ComplianceError::NotPending(id.to_string()));
        }

        self.db
            .execute_with_params(
                "UPDATE data_deletion_request SET status = 'cancelled' \
                 WHERE meta::id(id) = $id",
                vec![("id".to_string(), serde_json::Value::String(id.to_string()))],
            )
            .await
            .map_err(|e| ComplianceError::Storage(e.to_string()))?;

        info!(request_id = %id, "Deletion request cancelled");
        Ok(())
    }

    /// Executes every pending request whose grace period has elapsed.
    /// Returns how many were completed.
    #[instrument(name = "compliance_process_due", skip(self))]
    pub async fn process_due(&self) -> Result<usize, ComplianceError> {
        let rows = self
            .db
            .query_json(
                "SELECT meta::id(id) AS id, user_id, user_email FROM data_deletion_request \
                 WHERE status = 'pending' AND scheduled_deletion_date <= time::now()",
            )
            .await
            .map_err(|e| ComplianceError::Storage(e.to_string()))?;

        let mut completed = 0;
        for row in rows {
            let Some(request_id) = row.get("id").and_then(|v| v.as_str()) else {
                continue;
            };
            let user_id = row.get("user_id").and_then(|v| v.as_str());

            if let Some(user_id) = user_id {
                if let Err(e) = queries::cascade::delete_user_graph(&self.db, user_id).await {
                    warn!(request_id = %request_id, error = %e, "User graph purge failed");
                    continue;
                }
            }

            self.db
                .execute_with_params(
                    "UPDATE data_deletion_request SET status = 'completed', \
                     completed_at = time::now() WHERE meta::id(id) = $id",
                    vec![(
                        "id".to_string(),
                        serde_json::Value::String(request_id.to_string()),
                    )],
                )
                .await
                .map_err(|e| ComplianceError::Storage(e.to_string()))?;

            self.audit
                .record(
                    user_id,
                    actions::DELETION_COMPLETED,
                    "data_deletion_request",
                    Some(request_id),
                    serde_json::json!({}),
                )
                .await;

            completed += 1;
        }

        if completed > 0 {
            info!(completed = completed, "Due deletion requests processed");
        }
        Ok(completed)
    }

    /// Records acceptance of a policy version.
    pub async fn accept_policy(
        &self,
        user_id: &str,
        policy_type: &str,
        policy_version: &str,
    ) -> Result<(), ComplianceError> {
        let id = Uuid::new_v4().to_string();
        self.db
            .create(
                "policy_acceptance",
                &id,
                serde_json::json!({
                    "user_id": user_id,
                    "policy_type": policy_type,
                    "policy_version": policy_version,
                }),
            )
            .await
            .map_err(|e| ComplianceError::Storage(e.to_string()))?;
        Ok(())
    }

    /// Checks whether a user accepted a given policy version.
    pub async fn has_accepted(
        &self,
        user_id: &str,
        policy_type: &str,
        policy_version: &str,
    ) -> Result<bool, ComplianceError> {
        let rows = self
            .db
            .query_json_with_params(
                "SELECT meta::id(id) AS id FROM policy_acceptance \
                 WHERE user_id = $user AND policy_type = $ptype AND policy_version = $version",
                vec![
                    (
                        "user".to_string(),
                        serde_json::Value::String(user_id.to_string()),
                    ),
                    (
                        "ptype".to_string(),
                        serde_json::Value::String(policy_type.to_string()),
                    ),
                    (
                        "version".to_string(),
                        serde_json::Value::String(policy_version.to_string()),
                    ),
                ],
            )
            .await
            .map_err(|e| ComplianceError::Storage(e.to_string()))?;

        Ok(!rows.is_empty())
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use tempfile::tempdir;

    async fn service() -> (ComplianceService, Arc<DBClient>, tempfile::TempDir) {
        let temp_dir = tempdir().expect("Failed to create temp dir");
        let db = Arc::new(
            DBClient::new(temp_dir.path().join("compliance_db").to_str().unwrap())
                .await
                .unwrap(),
        );
        db.initialize_schema().await.unwrap();
        let audit = Arc::new(AuditService::new(db.clone()));
        (ComplianceService::new(db.clone(), audit), db, temp_dir)
    }

    #[tokio::test]
    async fn test_request_has_grace_period() {
        let (service, _db, _dir) = service().await;
        let request = service
            .request_deletion("user-1", "alice@example.com")
            .await
            .unwrap();

        assert_eq!(request.status, DeletionStatus::Pending);
        assert_eq!(request.user_email, "alice@example.com");

        let grace = request.scheduled_deletion_date - request.requested_at;
        assert!(grace >= chrono::Duration::days(DELETION_GRACE_DAYS - 1));
    }

    #[tokio::test]
    async fn test_cancel_pending_request() {
        let (service, _db, _dir) = service().await;
        let request = service
            .request_deletion("user-1", "alice@example.com")
            .await
            .unwrap();

        service.cancel_request(&request.id).await.unwrap();
        let cancelled = service.get(&request.id).await.unwrap();
        assert_eq!(cancelled.status, DeletionStatus::Cancelled);

        // Cannot cancel twice
        assert!(matches!(
            service.cancel_request(&request.id).await.unwrap_err(),
            ComplianceError::NotPending(_)
        ));
    }

    #[tokio::test]
    async fn test_process_due_skips_future_requests() {
        let (service, _db, _dir) = service().await;
        service
            .request_deletion("user-1", "alice@example.com")
            .await
            .unwrap();

        // The grace period has not elapsed
        assert_eq!(service.process_due().await.unwrap(), 0);
    }

    #[tokio::test]
    async fn test_process_due_purges_user() {
        let (service, db, _dir) = service().await;

        // A user with data, and a request already past its grace period
        let user_id = Uuid::new_v4().to_string();
        db.create(
            "user",
            &user_id,
            serde_json::json!({"email": "alice@example.com", "password_hash": "h"}),
        )
        .await
        .unwrap();
        db.execute(&format!(
            "CREATE data_deletion_request:`due-1` SET user_id = '{}', \
             user_email = 'alice@example.com', status = 'pending', \
             scheduled_deletion_date = time::now() - 1d",
            user_id
        ))
        .await
        .unwrap();

        let completed = service.process_due().await.unwrap();
        assert_eq!(completed, 1);

        let request = service.get("due-1").await.unwrap();
        assert_eq!(request.status, DeletionStatus::Completed);
        assert!(request.completed_at.is_some());

        let users = db.query_json("SELECT * FROM user").await.unwrap();
        assert!(users.is_empty(), "user rows purged");
    }

    #[tokio::test]
    async fn test_policy_acceptance() {
        let (service, _db, _dir) = service().await;

        assert!(!service
            .has_accepted("user-1", "privacy_policy", "1.0")
            .await
            .unwrap());

        service
            .accept_policy("user-1", "privacy_policy", "1.0")
            .await
            .unwrap();

        assert!(service
            .has_accepted("user-1", "privacy_policy", "1.0")
            .await
            .unwrap());
        assert!(!service
            .has_accepted("user-1", "privacy_policy", "2.0")
            .await
            .unwrap());
    }
}
