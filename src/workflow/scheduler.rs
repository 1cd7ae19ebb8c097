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

//! Workflow scheduler.
//!
//! Cron-triggered execution: each scheduled workflow gets a supervisor
//! task that sleeps until the next cron occurrence and fires the
//! engine. Job identity is `workflow_{definition_id}` and re-scheduling
//! replaces the existing job. Jobs live in memory only; on startup the
//! persisted `is_active` + schedule fields re-arm them.

use chrono::{DateTime, Utc};
use cron::Schedule;
use serde::Serialize;
use std::collections::HashMap;
use std::str::FromStr;
use std::sync::Arc;
use thiserror::Error;
use tokio_util::sync::CancellationToken;
use tracing::{debug, info, instrument, warn};

use crate::audit::{actions, AuditService};
use crate::security::{ValidationError, Validator};
use crate::workflow::engine::{EngineError, WorkflowEngine};

/// Scheduler errors.
#[derive(Debug, Error)]
pub enum SchedulerError {
    #[error(transparent)]
    Validation(#[from] ValidationError),

    #[error(transparent)]
    Engine(#[from] EngineError),

    /// No job is registered for this workflow
    #[error("No scheduled job for workflow {0}")]
    JobNotFound(String),
}

/// Listing entry for one scheduled job.
#[derive(Debug, Clone, Serialize)]
pub struct JobInfo {
    pub name: String,
    pub next_run: Option<DateTime<Utc>>,
    pub cron: String,
}

struct JobEntry {
    name: String,
    cron_expr: String,
    schedule: Schedule,
    token: CancellationToken,
}

/// Cron-driven workflow scheduler.
pub struct WorkflowScheduler {
    engine: Arc<WorkflowEngine>,
    audit: Arc<AuditService>,
    jobs: tokio::sync::Mutex<HashMap<String, JobEntry>>,
    shutdown: CancellationToken,
}

/// Job identity for a workflow.
fn job_id(workflow_id: &str) -> String {
    format!("workflow_{}", workflow_id)
}

/// Parses a cron expression, accepting the five-field form by pinning
/// seconds to zero.
fn parse_schedule(expression: &str) -> Result<Schedule, ValidationError> {
    let validated = Validator::validate_cron(expression)?;
    let normalized = if validated.split_whitespace().count() == 5 {
        format!("0 {}", validated)
    } else {
        validated
    };
    Schedule::from_str(&normalized).map_err(|e| ValidationError::InvalidFormat {
        field: "schedule".to_string(),
        details: e.to_string(),
    })
}

impl WorkflowScheduler {
    pub fn new(
        engine: Arc<WorkflowEngine>,
        audit: Arc<AuditService>,
        shutdown: CancellationToken,
    ) -> Self {
        Self {
            engine,
            audit,
            jobs: tokio::sync::Mutex::new(HashMap::new()),
            shutdown,
        }
    }

    /// Schedules a workflow on a cron expression, replacing any
    /// existing job for the same workflow. The definition's schedule
    /// and active flag are persisted so the job survives a restart.
    #[instrument(name = "scheduler_schedule", skip(self, context))]
    pub async fn schedule_workflow(
        &self,
        workflow_id: &str,
        cron_expr: &str,
        context: HashMap<String, serde_json::Value>,
    ) -> Result<String, SchedulerError> {
        let schedule = parse_schedule(cron_expr)?;
        let workflow = self.engine.get_workflow(workflow_id).await?;

        self.engine
            .set_schedule(workflow_id, Some(cron_expr), true)
            .await?;

        let id = job_id(workflow_id);
        let token = self.shutdown.child_token();

        {
            let mut jobs = self.jobs.lock().await;
            if let Some(previous) = jobs.remove(&id) {
                debug!(job_id = %id, "Replacing existing job");
                previous.token.cancel();
            }
            jobs.insert(
                id.clone(),
                JobEntry {
                    name: format!("Workflow {}", workflow.name),
                    cron_expr: cron_expr.to_string(),
                    schedule: schedule.clone(),
                    token: token.clone(),
                },
            );
        }

        // Supervisor task: fire-and-forget at each trigger; the engine
        // owns the execution record
        let engine = Arc::clone(&self.engine);
        let supervised_id = workflow_id.to_string();
        tokio::spawn(async move {
            loop {
                let Some(next) = schedule.upcoming(Utc).next() else {
                    warn!(workflow_id = %supervised_id, "Cron schedule has no future occurrence");
                    break;
                };
                let wait = (next - Utc::now()).to_std().unwrap_or_default();

                tokio::select! {
                    _ = token.cancelled() => {
                        debug!(workflow_id = %supervised_id, "Job supervisor stopping");
                        break;
                    }
                    _ = tokio::time::sleep(wait) => {
                        info!(workflow_id = %supervised_id, "Cron trigger fired");
                        engine.spawn_execution(supervised_id.clone(), context.clone());
                    }
                }
            }
        });

        info!(job_id = %id, cron = %cron_expr, "Workflow scheduled");
        self.audit
            .record(
                Some(&workflow.user_id),
                actions::WORKFLOW_SCHEDULED,
                "workflow",
                Some(workflow_id),
                serde_json::json!({"cron": cron_expr}),
            )
            .await;

        Ok(id)
    }

    /// Cancels the scheduled job for a workflow and flips the
    /// definition inactive. The stored cron expression is kept so the
    /// workflow can be re-armed later.
    #[instrument(name = "scheduler_cancel", skip(self))]
    pub async fn cancel_workflow(&self, workflow_id: &str) -> Result<(), SchedulerError> {
        let id = job_id(workflow_id);

        let entry = {
            let mut jobs = self.jobs.lock().await;
            jobs.remove(&id)
        };

        let Some(entry) = entry else {
            return Err(SchedulerError::JobNotFound(workflow_id.to_string()));
        };
        entry.token.cancel();

        let workflow = self.engine.get_workflow(workflow_id).await?;
        self.engine
            .set_schedule(workflow_id, workflow.schedule.as_deref(), false)
            .await?;

        info!(job_id = %id, "Workflow unscheduled");
        self.audit
            .record(
                Some(&workflow.user_id),
                actions::WORKFLOW_UNSCHEDULED,
                "workflow",
                Some(workflow_id),
                serde_json::json!({}),
            )
            .await;

        Ok(())
    }

    /// Lists registered jobs with their next trigger instants.
    pub async fn list_jobs(&self) -> HashMap<String, JobInfo> {
        let jobs = self.jobs.lock().await;
        jobs.iter()
            .map(|(id, entry)| {
                (
                    id.clone(),
                    JobInfo {
                        name: entry.name.clone(),
                        next_run: entry.schedule.upcoming(Utc).next(),
                        cron: entry.cron_expr.clone(),
                    },
                )
            })
            .collect()
    }

    /// Re-arms jobs for every active definition with a stored schedule.
    /// Called once at startup; returns how many were scheduled.
    pub async fn restore_from_db(&self) -> Result<usize, SchedulerError> {
        let workflows = self.engine.list_active_scheduled().await?;
        let mut restored = 0;

        for workflow in workflows {
            let Some(schedule) = workflow.schedule.clone() else {
                continue;
            };

            let mut context = HashMap::new();
            context.insert(
                "user_id".to_string(),
                serde_json::Value::String(workflow.user_id.clone()),
            );

            match self
                .schedule_workflow(&workflow.id, &schedule, context)
                .await
            {
                Ok(_) => restored += 1,
                Err(e) => {
                    warn!(workflow_id = %workflow.id, error = %e, "Failed to restore schedule")
                }
            }
        }

        info!(restored = restored, "Schedules restored from persistence");
        Ok(restored)
    }

    /// Stops every supervisor task.
    pub async fn stop_all(&self) {
        let mut jobs = self.jobs.lock().await;
        for (id, entry) in jobs.drain() {
            debug!(job_id = %id, "Stopping job");
            entry.token.cancel();
        }
    }
}
