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

//! Embedded store client.
//!
//! One RocksDB-backed SurrealDB instance holds every persisted entity:
//! users, portfolios and positions, price alerts, notifications,
//! workflow definitions and their execution records, the audit trail,
//! and the compliance tables. `DATABASE_URL` names the on-disk path.
//!
//! ## Conventions
//!
//! - Record ids are uuids minted by the owning service; rows address
//!   as `table:uuid`.
//! - Structured payloads (workflow graphs, execution results,
//!   notification data) live in string-typed columns holding JSON;
//!   services encode before writing and expand after reading.
//! - Timestamp columns are only ever written server-side
//!   (`time::now()` in the statement, or a schema DEFAULT), never
//!   bound from Rust values.
//! - Caller values reach statements through `.bind()` parameters;
//!   the sole exception is record ids, which are uuids by
//!   construction and interpolated backtick-escaped.

use anyhow::Result;
use surrealdb::{
    engine::local::{Db, RocksDb},
    Surreal,
};
use tracing::{debug, error, info, instrument, warn};

/// Longest statement prefix echoed into logs.
const STATEMENT_PREVIEW_LEN: usize = 100;

fn preview(statement: &str) -> String {
    statement.chars().take(STATEMENT_PREVIEW_LEN).collect()
}

/// Handle to the embedded store.
pub struct DBClient {
    pub db: Surreal<Db>,
}

impl DBClient {
    /// Opens (creating if absent) the store at `path` and selects the
    /// stockflow namespace.
    #[instrument(name = "store_open", skip_all, fields(path = %path))]
    pub async fn new(path: &str) -> Result<Self> {
        info!("Opening embedded store");

        let db = Surreal::new::<RocksDb>(path).await.map_err(|e| {
            error!(error = %e, "Embedded store failed to open");
            e
        })?;

        db.use_ns("stockflow").use_db("core").await.map_err(|e| {
            error!(error = %e, "Namespace selection failed");
            e
        })?;

        info!("Embedded store ready");
        Ok(Self { db })
    }

    /// Applies the table definitions from [`super::schema`].
    ///
    /// Definitions use `OVERWRITE`, so re-running on an existing store
    /// is safe and picks up new columns and indexes.
    #[instrument(name = "store_schema", skip(self))]
    pub async fn initialize_schema(&self) -> Result<()> {
        use super::schema::SCHEMA_SQL;

        info!("Applying schema definitions");

        self.db.query(SCHEMA_SQL).await.map_err(|e| {
            error!(error = %e, "Schema definition failed");
            e
        })?;

        info!("Schema applied (users, portfolios, alerts, notifications, workflows, executions, audit, compliance)");
        Ok(())
    }

    /// Runs a SELECT and decodes the first result set into model rows.
    ///
    /// Use for rows whose columns map straight onto a model type; rows
    /// carrying string-encoded payloads go through
    /// [`query_json`](Self::query_json) and a service-level decoder
    /// instead.
    #[instrument(name = "store_select", skip_all, fields(statement = %preview(statement)))]
    pub async fn query<T>(&self, statement: &str) -> Result<Vec<T>>
    where
        T: serde::de::DeserializeOwned,
    {
        let mut response = self.db.query(statement).await.map_err(|e| {
            error!(error = %e, "Select failed");
            e
        })?;

        let rows: Vec<T> = response.take(0).map_err(|e| {
            error!(error = %e, "Rows did not match the expected model shape");
            e
        })?;

        debug!(rows = rows.len(), "Select completed");
        Ok(rows)
    }

    /// Runs a SELECT and returns raw JSON rows.
    ///
    /// Services use this when a row needs reshaping before it is a
    /// model value — expanding a workflow's string-encoded
    /// `definition`, a notification's `data`, or an execution's
    /// `results` column.
    #[instrument(name = "store_select_raw", skip_all, fields(statement = %preview(statement)))]
    pub async fn query_json(&self, statement: &str) -> Result<Vec<serde_json::Value>> {
        let mut response = self.db.query(statement).await.map_err(|e| {
            error!(error = %e, "Select failed");
            e
        })?;

        let rows: Vec<serde_json::Value> = response.take(0).map_err(|e| {
            error!(error = %e, "Raw row extraction failed");
            e
        })?;

        debug!(rows = rows.len(), "Select completed");
        Ok(rows)
    }

    /// Runs a mutation whose result set nobody reads — schema-adjacent
    /// statements and fixed-id UPSERTs like the engine's progress
    /// writes.
    #[instrument(name = "store_execute", skip_all, fields(statement = %preview(statement)))]
    pub async fn execute(&self, statement: &str) -> Result<()> {
        self.db.query(statement).await.map_err(|e| {
            error!(error = %e, "Mutation failed");
            e
        })?;

        debug!("Mutation completed");
        Ok(())
    }

    /// Creates `table:id` from a serializable payload.
    ///
    /// The payload must not carry an `id` field; the record id is the
    /// uuid the owning service minted. The payload binds as a CONTENT
    /// parameter, and the returned `meta::id` is checked because
    /// SurrealDB rejects ASSERT violations *silently* — an alert with
    /// a non-positive target price, say, would otherwise vanish
    /// without an error.
    #[instrument(name = "store_create", skip(self, payload), fields(table = %table, record_id = %id))]
    pub async fn create<T>(&self, table: &str, id: &str, payload: T) -> Result<String>
    where
        T: serde::Serialize + Send + Sync + 'static,
    {
        let content = serde_json::to_value(&payload).map_err(|e| {
            error!(error = %e, "Payload is not serializable");
            anyhow::anyhow!("payload encode: {}", e)
        })?;

        let statement = format!(
            "CREATE {}:`{}` CONTENT $content RETURN meta::id(id) AS created",
            table, id
        );
        let mut response = self
            .db
            .query(&statement)
            .bind(("content", content.clone()))
            .await
            .map_err(|e| {
                error!(error = %e, "Create failed");
                e
            })?;

        let created: Option<serde_json::Value> = response.take(0).map_err(|e| {
            error!(error = %e, "Create returned an unreadable result");
            anyhow::anyhow!("create result: {}", e)
        })?;

        match created {
            Some(_) => {
                debug!("Row created");
                Ok(id.to_string())
            }
            None => {
                error!(
                    content = %content,
                    "Row silently rejected; a column ASSERT constraint did not hold"
                );
                Err(anyhow::anyhow!(
                    "row rejected by {} constraints (check column ASSERTs)",
                    table
                ))
            }
        }
    }

    /// Deletes one row addressed as `table:uuid`.
    #[instrument(name = "store_delete", skip(self), fields(record_id = %id))]
    pub async fn delete(&self, id: &str) -> Result<()> {
        let (table, uuid) = id.split_once(':').ok_or_else(|| {
            error!(record_id = %id, "Record address must be table:uuid");
            anyhow::anyhow!("bad record address '{}', expected table:uuid", id)
        })?;

        let statement = format!("DELETE {}:`{}`", table, uuid);
        self.db.query(&statement).await.map_err(|e| {
            error!(error = %e, "Delete failed");
            e
        })?;

        debug!("Row deleted");
        Ok(())
    }

    /// Runs a SELECT with bound parameters, returning raw JSON rows.
    ///
    /// Caller values only enter statements this way; `$name`
    /// placeholders in the statement pair with `(name, value)` tuples.
    #[instrument(name = "store_select_bound", skip_all, fields(statement = %preview(statement), params = params.len()))]
    pub async fn query_json_with_params(
        &self,
        statement: &str,
        params: Vec<(String, serde_json::Value)>,
    ) -> Result<Vec<serde_json::Value>> {
        let mut pending = self.db.query(statement);
        for (name, value) in params {
            pending = pending.bind((name, value));
        }

        let mut response = pending.await.map_err(|e| {
            error!(error = %e, "Bound select failed");
            e
        })?;

        let rows: Vec<serde_json::Value> = response.take(0).map_err(|e| {
            error!(error = %e, "Raw row extraction failed");
            e
        })?;

        debug!(rows = rows.len(), "Bound select completed");
        Ok(rows)
    }

    /// Runs a mutation with bound parameters.
    ///
    /// The workhorse for state transitions: the alert trigger's
    /// conditional UPDATE, execution finalization, schedule flips.
    #[instrument(name = "store_execute_bound", skip_all, fields(statement = %preview(statement), params = params.len()))]
    pub async fn execute_with_params(
        &self,
        statement: &str,
        params: Vec<(String, serde_json::Value)>,
    ) -> Result<()> {
        let mut pending = self.db.query(statement);
        for (name, value) in params {
            pending = pending.bind((name, value));
        }

        pending.await.map_err(|e| {
            error!(error = %e, "Bound mutation failed");
            e
        })?;

        debug!("Bound mutation completed");
        Ok(())
    }

    /// Runs a statement list inside one transaction.
    ///
    /// All-or-nothing multi-table sweeps — the account purge behind a
    /// matured deletion request being the main one. A failed statement
    /// cancels the transaction and surfaces the failure.
    #[instrument(name = "store_transaction", skip_all, fields(statements = statements.len()))]
    pub async fn transaction(&self, statements: Vec<String>) -> Result<()> {
        self.db.query("BEGIN TRANSACTION").await.map_err(|e| {
            error!(error = %e, "Transaction could not begin");
            e
        })?;

        for (index, statement) in statements.iter().enumerate() {
            if let Err(e) = self.db.query(statement).await {
                error!(
                    error = %e,
                    index = index,
                    statement = %preview(statement),
                    "Transaction statement failed, cancelling"
                );
                self.cancel_transaction().await;
                return Err(e.into());
            }
        }

        if let Err(e) = self.db.query("COMMIT TRANSACTION").await {
            error!(error = %e, "Commit failed, cancelling");
            self.cancel_transaction().await;
            return Err(e.into());
        }

        info!(statements = statements.len(), "Transaction committed");
        Ok(())
    }

    async fn cancel_transaction(&self) {
        if let Err(e) = self.db.query("CANCEL TRANSACTION").await {
            warn!(error = %e, "Transaction cancel also failed");
        }
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use tempfile::tempdir;

    async fn open(dir: &tempfile::TempDir, name: &str) -> DBClient {
        let client = DBClient::new(dir.path().join(name).to_str().unwrap())
            .await
            .expect("store should open");
        client
            .initialize_schema()
            .await
            .expect("schema should apply");
        client
    }

    #[tokio::test]
    async fn test_open_and_schema() {
        let dir = tempdir().expect("Failed to create temp dir");
        let client = open(&dir, "open_db").await;

        // A fresh store has the tables but no rows
        let rows: Vec<serde_json::Value> = client
            .query("SELECT * FROM workflow")
            .await
            .expect("select should run");
        assert!(rows.is_empty());
    }

    #[tokio::test]
    async fn test_create_read_delete_round_trip() {
        let dir = tempdir().expect("Failed to create temp dir");
        let client = open(&dir, "crud_db").await;

        let id = uuid::Uuid::new_v4().to_string();
        client
            .create(
                "user",
                &id,
                serde_json::json!({
                    "email": "alice@example.com",
                    "password_hash": "$2b$12$hash",
                }),
            )
            .await
            .expect("create should succeed");

        let rows = client
            .query_json("SELECT meta::id(id) AS id, email FROM user")
            .await
            .unwrap();
        assert_eq!(rows.len(), 1);
        assert_eq!(rows[0]["email"], "alice@example.com");

        client.delete(&format!("user:{}", id)).await.unwrap();
        assert!(client.query_json("SELECT * FROM user").await.unwrap().is_empty());
    }

    #[tokio::test]
    async fn test_create_rejected_by_assert() {
        let dir = tempdir().expect("Failed to create temp dir");
        let client = open(&dir, "assert_db").await;

        // price_alert requires a strictly positive target price; the
        // silent rejection must surface as an error
        let id = uuid::Uuid::new_v4().to_string();
        let result = client
            .create(
                "price_alert",
                &id,
                serde_json::json!({
                    "user_id": "u1",
                    "ticker": "AAPL",
                    "condition": "above",
                    "target_price": -5.0,
                    "notification_channels": ["in-app"],
                }),
            )
            .await;
        assert!(result.is_err());
    }

    #[tokio::test]
    async fn test_delete_requires_table_uuid_address() {
        let dir = tempdir().expect("Failed to create temp dir");
        let client = open(&dir, "addr_db").await;

        assert!(client.delete("not-an-address").await.is_err());
    }

    #[tokio::test]
    async fn test_bound_params() {
        let dir = tempdir().expect("Failed to create temp dir");
        let client = open(&dir, "bound_db").await;

        for email in ["a@example.com", "b@example.com"] {
            client
                .create(
                    "user",
                    &uuid::Uuid::new_v4().to_string(),
                    serde_json::json!({"email": email, "password_hash": "h"}),
                )
                .await
                .unwrap();
        }

        let rows = client
            .query_json_with_params(
                "SELECT email FROM user WHERE email = $email",
                vec![(
                    "email".to_string(),
                    serde_json::Value::String("a@example.com".to_string()),
                )],
            )
            .await
            .unwrap();
        assert_eq!(rows.len(), 1);

        client
            .execute_with_params(
                "DELETE user WHERE email = $email",
                vec![(
                    "email".to_string(),
                    serde_json::Value::String("a@example.com".to_string()),
                )],
            )
            .await
            .unwrap();
        let remaining = client.query_json("SELECT * FROM user").await.unwrap();
        assert_eq!(remaining.len(), 1);
    }

    #[tokio::test]
    async fn test_transaction_applies_all_statements() {
        let dir = tempdir().expect("Failed to create temp dir");
        let client = open(&dir, "txn_db").await;

        let first = uuid::Uuid::new_v4();
        let second = uuid::Uuid::new_v4();
        client
            .transaction(vec![
                format!(
                    "CREATE user:`{}` SET email = 'a@example.com', password_hash = 'h'",
                    first
                ),
                format!(
                    "CREATE user:`{}` SET email = 'b@example.com', password_hash = 'h'",
                    second
                ),
            ])
            .await
            .expect("transaction should commit");

        let rows = client.query_json("SELECT * FROM user").await.unwrap();
        assert_eq!(rows.len(), 2);
    }
}
