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

//! # Centralized Query Constants
//!
//! SQL query templates for SurrealDB, to eliminate duplication and
//! keep field selection consistent across services.
//!
//! ## Usage
//!
//! ```rust,ignore
//! use crate::db::queries::workflow;
//!
//! // Single workflow lookup
//! let query = format!("{} WHERE meta::id(id) = $id", workflow::SELECT_BASE);
//! ```

/// User query constants.
pub mod user {
    pub const SELECT_BASE: &str = r#"SELECT
        meta::id(id) AS id,
        email,
        password_hash,
        created_at,
        updated_at
    FROM user"#;
}

/// Price alert query constants.
pub mod price_alert {
    pub const SELECT_BASE: &str = r#"SELECT
        meta::id(id) AS id,
        user_id,
        ticker,
        condition,
        target_price,
        notification_channels,
        is_active,
        created_at,
        triggered_at
    FROM price_alert"#;
}

/// Notification query constants.
pub mod notification {
    pub const SELECT_BASE: &str = r#"SELECT
        meta::id(id) AS id,
        user_id,
        type,
        title,
        message,
        data,
        is_read,
        created_at
    FROM notification"#;
}

/// Workflow query constants.
pub mod workflow {
    pub const SELECT_BASE: &str = r#"SELECT
        meta::id(id) AS id,
        user_id,
        name,
        workflow_type,
        definition,
        execution_mode,
        schedule,
        is_active,
        created_at,
        updated_at
    FROM workflow"#;

    /// Tables holding rows keyed by workflow_id that must go when a
    /// workflow is deleted.
    pub const CASCADE_DELETE_TABLES: &[&str] = &["workflow_execution"];
}

/// Workflow execution query constants.
pub mod workflow_execution {
    pub const SELECT_BASE: &str = r#"SELECT
        meta::id(id) AS id,
        workflow_id,
        status,
        progress,
        current_node,
        results,
        errors,
        execution_time_ms,
        started_at,
        completed_at
    FROM workflow_execution"#;
}

/// Portfolio query constants.
pub mod portfolio {
    pub const SELECT_BASE: &str = r#"SELECT
        meta::id(id) AS id,
        user_id,
        created_at,
        updated_at
    FROM portfolio"#;

    pub const SELECT_POSITIONS: &str = r#"SELECT
        meta::id(id) AS id,
        portfolio_id,
        ticker,
        quantity,
        purchase_price,
        purchase_date,
        created_at,
        updated_at
    FROM stock_position"#;
}

/// Cascade delete helpers.
pub mod cascade {
    use crate::db::DBClient;
    use std::sync::Arc;
    use tracing::{info, warn};

    /// Deletes all records from a table that reference the given
    /// workflow_id.
    ///
    /// Best-effort cleanup: logs success or failure but does not
    /// propagate errors.
    pub async fn delete_by_workflow_id(db: &Arc<DBClient>, table: &str, workflow_id: &str) {
        let query = format!("DELETE {} WHERE workflow_id = $wf", table);
        let params = vec![(
            "wf".to_string(),
            serde_json::Value::String(workflow_id.to_string()),
        )];
        match db.execute_with_params(&query, params).await {
            Ok(_) => info!(table = %table, workflow_id = %workflow_id, "Cascade deleted records"),
            Err(e) => warn!(error = %e, table = %table, "Cascade delete failed"),
        }
    }

    /// Performs cascade delete on all related tables for a workflow.
    pub async fn delete_workflow_related(db: &Arc<DBClient>, workflow_id: &str) {
        use super::workflow::CASCADE_DELETE_TABLES;

        let futures: Vec<_> = CASCADE_DELETE_TABLES
            .iter()
            .map(|table| {
                let db = Arc::clone(db);
                let table = *table;
                let wf_id = workflow_id.to_string();
                async move {
                    delete_by_workflow_id(&db, table, &wf_id).await;
                }
            })
            .collect();

        futures::future::join_all(futures).await;

        info!(workflow_id = %workflow_id, "Cascade delete completed for all related tables");
    }

    /// Removes the full data graph owned by a user, in one
    /// transaction. Used by the deletion-request sweep after the grace
    /// period elapses.
    pub async fn delete_user_graph(db: &Arc<DBClient>, user_id: &str) -> anyhow::Result<()> {
        // Ids are generated by this service; anything else is refused
        // before it can be spliced into a statement
        crate::security::Validator::validate_uuid(user_id)
            .map_err(|e| anyhow::anyhow!("refusing to purge non-uuid user id: {}", e))?;

        // Workflow executions hang off workflows, positions hang off
        // the portfolio; collect both sets of owners first
        let workflows = db
            .query_json_with_params(
                "SELECT meta::id(id) AS id FROM workflow WHERE user_id = $user",
                vec![(
                    "user".to_string(),
                    serde_json::Value::String(user_id.to_string()),
                )],
            )
            .await?;
        let portfolios = db
            .query_json_with_params(
                "SELECT meta::id(id) AS id FROM portfolio WHERE user_id = $user",
                vec![(
                    "user".to_string(),
                    serde_json::Value::String(user_id.to_string()),
                )],
            )
            .await?;

        // Only uuid owner ids are spliced into statements
        let owner_ids = |rows: &[serde_json::Value]| -> Vec<String> {
            rows.iter()
                .filter_map(|row| row.get("id").and_then(|v| v.as_str()))
                .filter(|id| crate::security::Validator::validate_uuid(id).is_ok())
                .map(|id| id.to_string())
                .collect()
        };

        let mut statements = Vec::new();
        for id in owner_ids(&workflows) {
            statements.push(format!(
                "DELETE workflow_execution WHERE workflow_id = '{}'",
                id
            ));
        }
        for id in owner_ids(&portfolios) {
            statements.push(format!(
                "DELETE stock_position WHERE portfolio_id = '{}'",
                id
            ));
        }
        for table in [
            "workflow",
            "price_alert",
            "notification",
            "policy_acceptance",
            "portfolio",
        ] {
            statements.push(format!("DELETE {} WHERE user_id = '{}'", table, user_id));
        }
        statements.push(format!("DELETE user:`{}`", user_id));

        db.transaction(statements).await?;

        info!(user_id = %user_id, "Deleted user data graph");
        Ok(())
    }
}
