// Copyright 2025 Zileo-Chat-3 Contributors
// SPDX-License-Identifier: Apache-2.0

//! Append-only audit trail.
//!
//! Records security-relevant actions (registration, login, logout,
//! alert triggers, workflow lifecycle changes). Writes are best-effort:
//! an audit failure is logged but never fails the audited operation.

use std::sync::Arc;
use tracing::warn;
use uuid::Uuid;

use crate::db::DBClient;

/// Audit action names.
pub mod actions {
    pub const USER_REGISTERED: &str = "user.registered";
    pub const USER_LOGIN: &str = "user.login";
    pub const USER_LOGOUT: &str = "user.logout";
    pub const SESSION_REFRESHED: &str = "session.refreshed";
    pub const ALERT_TRIGGERED: &str = "alert.triggered";
    pub const WORKFLOW_CREATED: &str = "workflow.created";
    pub const WORKFLOW_SCHEDULED: &str = "workflow.scheduled";
    pub const WORKFLOW_UNSCHEDULED: &str = "workflow.unscheduled";
    pub const DELETION_REQUESTED: &str = "deletion.requested";
    pub const DELETION_COMPLETED: &str = "deletion.completed";
}

/// Writes audit rows.
pub struct AuditService {
    db: Arc<DBClient>,
}

impl AuditService {
    pub fn new(db: Arc<DBClient>) -> Self {
        Self { db }
    }

    /// Records one audit entry. Never fails the caller.
    pub async fn record(
        &self,
        user_id: Option<&str>,
        action: &str,
        resource_type: &str,
        resource_id: Option<&str>,
        details: serde_json::Value,
    ) {
        let id = Uuid::new_v4().to_string();
        let row = serde_json::json!({
            "user_id": user_id,
            "action": action,
            "resource_type": resource_type,
            "resource_id": resource_id,
            "details": details.to_string(),
        });

        if let Err(e) = self.db.create("audit_log", &id, row).await {
            warn!(action = %action, error = %e, "Audit write failed");
        }
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use tempfile::tempdir;

    #[tokio::test]
    async fn test_record_audit_entry() {
        let temp_dir = tempdir().expect("Failed to create temp dir");
        let db = Arc::new(
            DBClient::new(temp_dir.path().join("audit_db").to_str().unwrap())
                .await
                .unwrap(),
        );
        db.initialize_schema().await.unwrap();

        let audit = AuditService::new(db.clone());
        audit
            .record(
                Some("user-1"),
                actions::USER_LOGIN,
                "user",
                Some("user-1"),
                serde_json::json!({"ip": "127.0.0.1"}),
            )
            .await;

        let rows = db
            .query_json("SELECT action, resource_type FROM audit_log")
            .await
            .unwrap();
        assert_eq!(rows.len(), 1);
        assert_eq!(rows[0]["action"], "user.login");
        assert_eq!(rows[0]["resource_type"], "user");
    }
}
