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

//! Workflow engine.
//!
//! Executes validated workflow graphs in sequential or parallel mode.
//!
//! - **Sequential**: topological traversal; each node's produced state
//!   feeds the next. Agent errors do not abort the traversal, but any
//!   accumulated error makes the final status `failed`.
//! - **Parallel**: every agent node runs concurrently from a shared
//!   snapshot of the initial state. Results merge by agent-namespaced
//!   union; a duplicate result key is recorded as an error, never
//!   silently overwritten.
//!
//! Progress is monotonic, held in a live in-memory map while the
//! execution is resident, and persisted on node boundaries so status
//! queries survive the run's eviction. Cancellation stops new nodes,
//! waits out in-flight work up to a grace deadline, and finalizes the
//! record as `failed` with a distinguishing error entry.

use chrono::{DateTime, Utc};
use serde::Deserialize;
use std::collections::HashMap;
use std::sync::Arc;
use std::time::Duration;
use thiserror::Error;
use tokio::task::JoinSet;
use tokio_util::sync::CancellationToken;
use tracing::{debug, error, info, instrument, warn};
use uuid::Uuid;

use crate::agents::AgentRegistry;
use crate::audit::{actions, AuditService};
use crate::db::{queries, DBClient};
use crate::models::{
    AgentReport, ExecutionMode, ExecutionStatus, NodeType, Workflow, WorkflowCreate,
    WorkflowExecution, WorkflowGraph, WorkflowState, CANCELLED_ERROR,
};
use crate::security::{ValidationError, Validator};
use crate::workflow::definition::{self, validate_graph, CompiledGraph, DefinitionError};

/// How long a cancelled execution waits for in-flight nodes.
const DEFAULT_GRACE: Duration = Duration::from_secs(5);

/// Engine errors.
#[derive(Debug, Error)]
pub enum EngineError {
    #[error(transparent)]
    Validation(#[from] ValidationError),

    #[error(transparent)]
    Definition(#[from] DefinitionError),

    #[error("Workflow not found: {0}")]
    WorkflowNotFound(String),

    #[error("Execution not found: {0}")]
    ExecutionNotFound(String),

    #[error("Workflow template '{0}' not found")]
    TemplateNotFound(String),

    #[error("Storage error: {0}")]
    Storage(String),
}

/// Live view of a resident execution.
#[derive(Debug, Clone)]
struct LiveStatus {
    status: ExecutionStatus,
    progress: u8,
    current_node: Option<String>,
}

struct PreparedRun {
    workflow: Workflow,
    compiled: CompiledGraph,
    execution_id: String,
    token: CancellationToken,
    started: std::time::Instant,
}

/// Workflow engine.
pub struct WorkflowEngine {
    db: Arc<DBClient>,
    registry: Arc<AgentRegistry>,
    audit: Arc<AuditService>,
    live: tokio::sync::RwLock<HashMap<String, LiveStatus>>,
    tokens: tokio::sync::Mutex<HashMap<String, CancellationToken>>,
    /// Optional wall-clock deadline per execution
    deadline: Option<Duration>,
    grace: Duration,
}

impl WorkflowEngine {
    pub fn new(db: Arc<DBClient>, registry: Arc<AgentRegistry>, audit: Arc<AuditService>) -> Self {
        Self {
            db,
            registry,
            audit,
            live: tokio::sync::RwLock::new(HashMap::new()),
            tokens: tokio::sync::Mutex::new(HashMap::new()),
            deadline: None,
            grace: DEFAULT_GRACE,
        }
    }

    /// Applies a wall-clock deadline to every execution. Exceeding it
    /// behaves exactly like cancellation.
    pub fn with_deadline(mut self, deadline: Duration) -> Self {
        self.deadline = Some(deadline);
        self
    }

    // ------------------------------------------------------------------
    // Definitions
    // ------------------------------------------------------------------

    /// Creates a workflow definition. The graph is validated up front
    /// and immutable afterwards.
    #[instrument(name = "engine_create_definition", skip(self, input), fields(user_id = %user_id))]
    pub async fn create_definition(
        &self,
        user_id: &str,
        input: WorkflowCreate,
    ) -> Result<Workflow, EngineError> {
        let name = Validator::validate_workflow_name(&input.name)?;
        validate_graph(&input.definition)?;

        let schedule = match &input.schedule {
            Some(expr) => Some(Validator::validate_cron(expr)?),
            None => None,
        };

        let id = Uuid::new_v4().to_string();
        let definition_json = serde_json::to_string(&input.definition)
            .map_err(|e| EngineError::Storage(format!("definition encode: {}", e)))?;

        self.db
            .create(
                "workflow",
                &id,
                serde_json::json!({
                    "user_id": user_id,
                    "name": name,
                    "workflow_type": input.workflow_type,
                    "definition": definition_json,
                    "execution_mode": input.execution_mode.to_string(),
                    "schedule": schedule,
                }),
            )
            .await
            .map_err(|e| EngineError::Storage(e.to_string()))?;

        info!(workflow_id = %id, name = %name, "Workflow definition created");
        self.audit
            .record(
                Some(user_id),
                actions::WORKFLOW_CREATED,
                "workflow",
                Some(&id),
                serde_json::json!({"name": name}),
            )
            .await;

        self.get_workflow(&id).await
    }

    /// Creates a definition from a built-in template.
    pub async fn create_from_template(
        &self,
        user_id: &str,
        template_name: &str,
    ) -> Result<Workflow, EngineError> {
        let template = definition::template(template_name)
            .ok_or_else(|| EngineError::TemplateNotFound(template_name.to_string()))?;

        self.create_definition(
            user_id,
            WorkflowCreate {
                name: template.name.clone(),
                workflow_type: template_name.to_string(),
                definition: template.definition,
                execution_mode: template.execution_mode,
                schedule: None,
            },
        )
        .await
    }

    /// Fetches one workflow definition.
    pub async fn get_workflow(&self, workflow_id: &str) -> Result<Workflow, EngineError> {
        let query = format!(
            "{} WHERE meta::id(id) = $id",
            queries::workflow::SELECT_BASE
        );
        let rows = self
            .db
            .query_json_with_params(
                &query,
                vec![(
                    "id".to_string(),
                    serde_json::Value::String(workflow_id.to_string()),
                )],
            )
            .await
            .map_err(|e| EngineError::Storage(e.to_string()))?;

        rows.into_iter()
            .next()
            .map(decode_workflow_row)
            .transpose()?
            .ok_or_else(|| EngineError::WorkflowNotFound(workflow_id.to_string()))
    }

    /// Lists a user's workflow definitions.
    pub async fn list_workflows(&self, user_id: &str) -> Result<Vec<Workflow>, EngineError> {
        let query = format!(
            "{} WHERE user_id = $user ORDER BY created_at DESC",
            queries::workflow::SELECT_BASE
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
            .map_err(|e| EngineError::Storage(e.to_string()))?;

        rows.into_iter().map(decode_workflow_row).collect()
    }

    /// Active definitions carrying a cron schedule; the scheduler
    /// re-arms these on startup.
    pub async fn list_active_scheduled(&self) -> Result<Vec<Workflow>, EngineError> {
        let query = format!(
            "{} WHERE is_active = true AND schedule != NONE",
            queries::workflow::SELECT_BASE
        );
        let rows = self
            .db
            .query_json(&query)
            .await
            .map_err(|e| EngineError::Storage(e.to_string()))?;

        rows.into_iter().map(decode_workflow_row).collect()
    }

    /// Deletes a workflow definition and its execution history.
    #[instrument(name = "engine_delete_workflow", skip(self))]
    pub async fn delete_workflow(&self, workflow_id: &str) -> Result<(), EngineError> {
        self.get_workflow(workflow_id).await?;

        queries::cascade::delete_workflow_related(&self.db, workflow_id).await;
        self.db
            .delete(&format!("workflow:{}", workflow_id))
            .await
            .map_err(|e| EngineError::Storage(e.to_string()))?;

        info!(workflow_id = %workflow_id, "Workflow deleted");
        Ok(())
    }

    /// Updates the operational scheduling fields of a definition (the
    /// graph itself stays immutable).
    pub async fn set_schedule(
        &self,
        workflow_id: &str,
        schedule: Option<&str>,
        is_active: bool,
    ) -> Result<(), EngineError> {
        // Ensure it exists first so callers get a typed error
        self.get_workflow(workflow_id).await?;

        let schedule_value = match schedule {
            Some(expr) => serde_json::Value::String(Validator::validate_cron(expr)?),
            None => serde_json::Value::Null,
        };

        self.db
            .execute_with_params(
                "UPDATE workflow SET schedule = $schedule, is_active = $active, \
                 updated_at = time::now() WHERE meta::id(id) = $id",
                vec![
                    ("schedule".to_string(), schedule_value),
                    ("active".to_string(), serde_json::Value::Bool(is_active)),
                    (
                        "id".to_string(),
                        serde_json::Value::String(workflow_id.to_string()),
                    ),
                ],
            )
            .await
            .map_err(|e| EngineError::Storage(e.to_string()))
    }

    // ------------------------------------------------------------------
    // Execution
    // ------------------------------------------------------------------

    /// Runs a workflow to completion and returns the final execution
    /// record. Progress can be observed concurrently through
    /// [`get_execution_status`](Self::get_execution_status), and the
    /// run can be cancelled from another task.
    #[instrument(name = "engine_execute", skip(self, context))]
    pub async fn execute_workflow(
        &self,
        workflow_id: &str,
        context: HashMap<String, serde_json::Value>,
    ) -> Result<WorkflowExecution, EngineError> {
        let prepared = self.prepare(workflow_id).await?;
        let execution_id = prepared.execution_id.clone();

        let result = self.drive(prepared, context).await;

        // The record outlives the run; live tracking does not
        self.live.write().await.remove(&execution_id);
        self.tokens.lock().await.remove(&execution_id);

        result?;
        self.get_execution_status(&execution_id).await
    }

    /// Fire-and-forget execution, used by the scheduler. The engine
    /// owns the execution record; the caller gets nothing back.
    pub fn spawn_execution(
        self: &Arc<Self>,
        workflow_id: String,
        context: HashMap<String, serde_json::Value>,
    ) {
        let engine = Arc::clone(self);
        tokio::spawn(async move {
            if let Err(e) = engine.execute_workflow(&workflow_id, context).await {
                error!(workflow_id = %workflow_id, error = %e, "Scheduled execution failed");
            }
        });
    }

    /// Requests cancellation of a running execution. Returns false if
    /// the execution is not resident (finished or unknown).
    pub async fn cancel_execution(&self, execution_id: &str) -> bool {
        let tokens = self.tokens.lock().await;
        match tokens.get(execution_id) {
            Some(token) => {
                info!(execution_id = %execution_id, "Cancellation requested");
                token.cancel();
                true
            }
            None => false,
        }
    }

    /// Current status of an execution: the persisted row, overlaid
    /// with the live in-memory view while the run is resident.
    pub async fn get_execution_status(
        &self,
        execution_id: &str,
    ) -> Result<WorkflowExecution, EngineError> {
        let query = format!(
            "{} WHERE meta::id(id) = $id",
            queries::workflow_execution::SELECT_BASE
        );
        let rows = self
            .db
            .query_json_with_params(
                &query,
                vec![(
                    "id".to_string(),
                    serde_json::Value::String(execution_id.to_string()),
                )],
            )
            .await
            .map_err(|e| EngineError::Storage(e.to_string()))?;

        let mut execution = rows
            .into_iter()
            .next()
            .map(decode_execution_row)
            .transpose()?
            .ok_or_else(|| EngineError::ExecutionNotFound(execution_id.to_string()))?;

        if let Some(live) = self.live.read().await.get(execution_id) {
            execution.status = live.status;
            execution.progress = execution.progress.max(live.progress);
            if live.current_node.is_some() {
                execution.current_node = live.current_node.clone();
            }
        }

        Ok(execution)
    }

    /// Lists every execution of a workflow, newest first.
    pub async fn list_executions(
        &self,
        workflow_id: &str,
    ) -> Result<Vec<WorkflowExecution>, EngineError> {
        let query = format!(
            "{} WHERE workflow_id = $wf ORDER BY started_at DESC",
            queries::workflow_execution::SELECT_BASE
        );
        let rows = self
            .db
            .query_json_with_params(
                &query,
                vec![(
                    "wf".to_string(),
                    serde_json::Value::String(workflow_id.to_string()),
                )],
            )
            .await
            .map_err(|e| EngineError::Storage(e.to_string()))?;

        rows.into_iter().map(decode_execution_row).collect()
    }

    // ------------------------------------------------------------------
    // Run internals
    // ------------------------------------------------------------------

    async fn prepare(&self, workflow_id: &str) -> Result<PreparedRun, EngineError> {
        let workflow = self.get_workflow(workflow_id).await?;
        let compiled = validate_graph(&workflow.definition)?;

        let execution_id = Uuid::new_v4().to_string();
        let token = CancellationToken::new();

        // The start row; every later write targets the same id
        self.db
            .execute_with_params(
                &format!(
                    "UPSERT workflow_execution:`{}` SET workflow_id = $wf, \
                     status = 'running', progress = 0, errors = '[]', \
                     started_at = time::now()",
                    execution_id
                ),
                vec![(
                    "wf".to_string(),
                    serde_json::Value::String(workflow.id.clone()),
                )],
            )
            .await
            .map_err(|e| EngineError::Storage(e.to_string()))?;

        self.tokens
            .lock()
            .await
            .insert(execution_id.clone(), token.clone());
        self.live.write().await.insert(
            execution_id.clone(),
            LiveStatus {
                status: ExecutionStatus::Running,
                progress: 0,
                current_node: None,
            },
        );

        if let Some(deadline) = self.deadline {
            let watchdog = token.clone();
            tokio::spawn(async move {
                tokio::select! {
                    _ = watchdog.cancelled() => {}
                    _ = tokio::time::sleep(deadline) => {
                        warn!("Execution deadline exceeded, cancelling");
                        watchdog.cancel();
                    }
                }
            });
        }

        Ok(PreparedRun {
            workflow,
            compiled,
            execution_id,
            token,
            started: std::time::Instant::now(),
        })
    }

    async fn drive(
        &self,
        prepared: PreparedRun,
        context: HashMap<String, serde_json::Value>,
    ) -> Result<(), EngineError> {
        let PreparedRun {
            workflow,
            compiled,
            execution_id,
            token,
            started,
        } = prepared;

        info!(
            workflow_id = %workflow.id,
            execution_id = %execution_id,
            mode = %workflow.execution_mode,
            "Execution started"
        );

        let state = WorkflowState::with_context(context);
        let (state, cancelled, progress) = match workflow.execution_mode {
            ExecutionMode::Sequential => {
                self.run_sequential(&compiled, state, &execution_id, &token)
                    .await
            }
            ExecutionMode::Parallel => {
                self.run_parallel(&compiled, state, &execution_id, &token)
                    .await
            }
        };

        self.finalize(&execution_id, state, cancelled, progress, started)
            .await
    }

    async fn run_sequential(
        &self,
        compiled: &CompiledGraph,
        mut state: WorkflowState,
        execution_id: &str,
        token: &CancellationToken,
    ) -> (WorkflowState, bool, u8) {
        let total = compiled.order.len().max(1);
        let mut visited = 0usize;
        let mut progress = 0u8;
        let mut cancelled = false;

        for node_id in &compiled.order {
            // The signal is checked between nodes; an in-flight node
            // is allowed to finish
            if token.is_cancelled() {
                cancelled = true;
                break;
            }

            let node = &compiled.nodes[node_id];
            state.current_node = node_id.clone();

            if node.node_type == NodeType::Agent {
                let agent_name = node.agent.as_deref().unwrap_or_default();
                match self.registry.get(agent_name).await {
                    Some(agent) => {
                        debug!(node = %node_id, agent = %agent_name, "Running agent node");
                        state = agent.run(state).await;
                    }
                    None => {
                        state
                            .errors
                            .push(format!("Agent not registered: {}", agent_name));
                    }
                }
            }

            visited += 1;
            progress = ((visited * 100 / total) as u8).min(99);
            self.record_progress(execution_id, progress, node_id).await;
        }

        (state, cancelled, progress)
    }

    async fn run_parallel(
        &self,
        compiled: &CompiledGraph,
        mut state: WorkflowState,
        execution_id: &str,
        token: &CancellationToken,
    ) -> (WorkflowState, bool, u8) {
        let base_state = state.clone();
        let base_error_count = base_state.errors.len();

        let mut set: JoinSet<(String, WorkflowState)> = JoinSet::new();
        for node in compiled.agent_nodes() {
            let agent_name = node.agent.clone().unwrap_or_default();
            match self.registry.get(&agent_name).await {
                Some(agent) => {
                    let snapshot = base_state.clone();
                    set.spawn(async move { (agent_name, agent.run(snapshot).await) });
                }
                None => {
                    state
                        .errors
                        .push(format!("Agent not registered: {}", agent_name));
                }
            }
        }

        let total = set.len().max(1);
        let mut completed = 0usize;
        let mut progress = 0u8;
        let mut cancelled = false;
        let mut grace_deadline: Option<tokio::time::Instant> = None;

        loop {
            let next = if let Some(deadline) = grace_deadline {
                // Cancelled: give in-flight agents until the grace
                // deadline, then abort what is left
                match tokio::time::timeout_at(deadline, set.join_next()).await {
                    Ok(next) => next,
                    Err(_) => {
                        warn!(execution_id = %execution_id, "Grace deadline reached, aborting in-flight nodes");
                        set.abort_all();
                        break;
                    }
                }
            } else {
                tokio::select! {
                    next = set.join_next() => next,
                    _ = token.cancelled() => {
                        cancelled = true;
                        grace_deadline = Some(tokio::time::Instant::now() + self.grace);
                        continue;
                    }
                }
            };

            match next {
                Some(Ok((agent_name, agent_state))) => {
                    completed += 1;

                    // Namespaced union: keys already present from a
                    // concurrent agent are a conflict, never overwritten
                    for (key, report) in agent_state.results {
                        if base_state.results.contains_key(&key) {
                            continue; // unchanged entry from the snapshot
                        }
                        if state.results.contains_key(&key) {
                            state.errors.push(format!(
                                "Conflicting result key '{}' from agent '{}'",
                                key, agent_name
                            ));
                        } else {
                            state.results.insert(key, report);
                        }
                    }
                    state
                        .errors
                        .extend(agent_state.errors.into_iter().skip(base_error_count));

                    progress = ((completed * 100 / total) as u8).min(99);
                    self.record_progress(execution_id, progress, &agent_name)
                        .await;
                }
                Some(Err(join_err)) => {
                    completed += 1;
                    if !join_err.is_cancelled() {
                        state
                            .errors
                            .push(format!("Agent task panicked: {}", join_err));
                    }
                }
                None => break,
            }
        }

        if cancelled {
            (state, true, progress)
        } else {
            // The finish node observes the merged state
            if let Some(finish) = compiled.finish_ids.first() {
                state.current_node = finish.clone();
            }
            (state, false, progress)
        }
    }

    async fn record_progress(&self, execution_id: &str, progress: u8, node: &str) {
        {
            let mut live = self.live.write().await;
            if let Some(entry) = live.get_mut(execution_id) {
                // Monotonic by construction, guarded anyway
                entry.progress = entry.progress.max(progress);
                entry.current_node = Some(node.to_string());
            }
        }

        if let Err(e) = self
            .db
            .execute_with_params(
                &format!(
                    "UPSERT workflow_execution:`{}` SET progress = $progress, \
                     current_node = $node",
                    execution_id
                ),
                vec![
                    (
                        "progress".to_string(),
                        serde_json::Value::Number(progress.into()),
                    ),
                    (
                        "node".to_string(),
                        serde_json::Value::String(node.to_string()),
                    ),
                ],
            )
            .await
        {
            warn!(execution_id = %execution_id, error = %e, "Progress write failed");
        }
    }

    async fn finalize(
        &self,
        execution_id: &str,
        mut state: WorkflowState,
        cancelled: bool,
        progress: u8,
        started: std::time::Instant,
    ) -> Result<(), EngineError> {
        if cancelled {
            state.errors.push(CANCELLED_ERROR.to_string());
        }

        let status = if cancelled || !state.errors.is_empty() {
            ExecutionStatus::Failed
        } else {
            ExecutionStatus::Completed
        };
        let final_progress = if status == ExecutionStatus::Completed {
            100
        } else {
            progress
        };

        let results_json = serde_json::to_string(&state.results)
            .map_err(|e| EngineError::Storage(format!("results encode: {}", e)))?;
        let errors_json = serde_json::to_string(&state.errors)
            .map_err(|e| EngineError::Storage(format!("errors encode: {}", e)))?;
        let elapsed_ms = started.elapsed().as_millis() as i64;

        self.db
            .execute_with_params(
                &format!(
                    "UPSERT workflow_execution:`{}` SET status = $status, \
                     progress = $progress, current_node = $node, results = $results, \
                     errors = $errors, execution_time_ms = $elapsed, \
                     completed_at = time::now()",
                    execution_id
                ),
                vec![
                    (
                        "status".to_string(),
                        serde_json::Value::String(status.to_string()),
                    ),
                    (
                        "progress".to_string(),
                        serde_json::Value::Number(final_progress.into()),
                    ),
                    (
                        "node".to_string(),
                        serde_json::Value::String(state.current_node.clone()),
                    ),
                    (
                        "results".to_string(),
                        serde_json::Value::String(results_json),
                    ),
                    ("errors".to_string(), serde_json::Value::String(errors_json)),
                    (
                        "elapsed".to_string(),
                        serde_json::Value::Number(elapsed_ms.into()),
                    ),
                ],
            )
            .await
            .map_err(|e| EngineError::Storage(e.to_string()))?;

        {
            let mut live = self.live.write().await;
            if let Some(entry) = live.get_mut(execution_id) {
                entry.status = status;
                entry.progress = final_progress;
            }
        }

        info!(
            execution_id = %execution_id,
            status = %status,
            elapsed_ms = elapsed_ms,
            errors = state.errors.len(),
            "Execution finalized"
        );
        Ok(())
    }
}

fn decode_workflow_row(mut row: serde_json::Value) -> Result<Workflow, EngineError> {
    if let Some(raw) = row.get("definition").and_then(|d| d.as_str()) {
        let graph: WorkflowGraph = serde_json::from_str(raw)
            .map_err(|e| EngineError::Storage(format!("definition decode: {}", e)))?;
        row["definition"] = serde_json::to_value(graph)
            .map_err(|e| EngineError::Storage(format!("definition re-encode: {}", e)))?;
    }

    serde_json::from_value(row)
        .map_err(|e| EngineError::Storage(format!("workflow row decode: {}", e)))
}

#[derive(Debug, Deserialize)]
struct ExecutionRow {
    id: String,
    workflow_id: String,
    status: ExecutionStatus,
    progress: u8,
    current_node: Option<String>,
    results: Option<String>,
    errors: Option<String>,
    execution_time_ms: Option<i64>,
    started_at: Option<DateTime<Utc>>,
    completed_at: Option<DateTime<Utc>>,
}

fn decode_execution_row(row: serde_json::Value) -> Result<WorkflowExecution, EngineError> {
    let row: ExecutionRow = serde_json::from_value(row)
        .map_err(|e| EngineError::Storage(format!("execution row decode: {}", e)))?;

    let results: Option<HashMap<String, AgentReport>> = match row.results.as_deref() {
        Some(raw) if !raw.is_empty() => serde_json::from_str(raw)
            .map_err(|e| EngineError::Storage(format!("results decode: {}", e)))?,
        _ => None,
    };

    let errors: Vec<String> = match row.errors.as_deref() {
        Some(raw) if !raw.is_empty() => serde_json::from_str(raw).unwrap_or_default(),
        _ => Vec::new(),
    };

    Ok(WorkflowExecution {
        id: row.id,
        workflow_id: row.workflow_id,
        status: row.status,
        progress: row.progress,
        current_node: row.current_node,
        results,
        errors,
        execution_time_ms: row.execution_time_ms,
        started_at: row.started_at,
        completed_at: row.completed_at,
    })
}
