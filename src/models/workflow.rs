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

//! Workflow models.
//!
//! A workflow is a directed acyclic graph of agent and condition
//! nodes. The definition is immutable after creation; each run of it
//! is a `WorkflowExecution` with its own status, progress and result.
//!
//! ## State
//!
//! Agents exchange a typed [`WorkflowState`] record. `results` is keyed
//! by agent name, so parallel executions merge without conflicts, and
//! each value is a tagged [`AgentReport`] rather than a free-form map.

use chrono::{DateTime, Utc};
use serde::{Deserialize, Serialize};
use std::collections::HashMap;

use super::alert::TriggeredAlert;
use super::portfolio::{PortfolioComposition, RebalancingSuggestion};
use super::stock::SentimentLabel;

/// Node kind inside a workflow graph.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Serialize, Deserialize)]
#[serde(rename_all = "lowercase")]
pub enum NodeType {
    /// Runs a registered agent
    Agent,
    /// Structural gate (entry fan-out, finish barrier)
    Condition,
}

/// One node of a workflow graph.
#[derive(Debug, Clone, Serialize, Deserialize)]
pub struct WorkflowNode {
    pub id: String,
    #[serde(rename = "type")]
    pub node_type: NodeType,
    /// Registered agent name; required when `type` is `agent`
    #[serde(default, skip_serializing_if = "Option::is_none")]
    pub agent: Option<String>,
    #[serde(default)]
    pub is_entry: bool,
    #[serde(default)]
    pub is_finish: bool,
}

/// Directed edge between two nodes.
#[derive(Debug, Clone, Serialize, Deserialize)]
pub struct WorkflowEdge {
    pub from: String,
    pub to: String,
}

/// The node/edge graph of a workflow definition.
#[derive(Debug, Clone, Serialize, Deserialize)]
pub struct WorkflowGraph {
    pub nodes: Vec<WorkflowNode>,
    pub edges: Vec<WorkflowEdge>,
}

/// How the non-structural nodes of a graph are driven.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Serialize, Deserialize)]
#[serde(rename_all = "lowercase")]
pub enum ExecutionMode {
    /// Topological traversal; each node feeds the next
    Sequential,
    /// All agent nodes run concurrently from a shared snapshot
    Parallel,
}

impl std::fmt::Display for ExecutionMode {
    fn fmt(&self, f: &mut std::fmt::Formatter<'_>) -> std::fmt::Result {
        match self {
            ExecutionMode::Sequential => write!(f, "sequential"),
            ExecutionMode::Parallel => write!(f, "parallel"),
        }
    }
}

/// Workflow definition row. Immutable once created; a new version is a
/// new row with a new id.
#[derive(Debug, Clone, Serialize, Deserialize)]
pub struct Workflow {
    pub id: String,
    pub user_id: String,
    pub name: String,
    /// Type tag (template name or `custom`)
    pub workflow_type: String,
    pub definition: WorkflowGraph,
    pub execution_mode: ExecutionMode,
    /// Cron expression when the workflow is scheduled
    #[serde(skip_serializing_if = "Option::is_none")]
    pub schedule: Option<String>,
    pub is_active: bool,
    pub created_at: DateTime<Utc>,
    pub updated_at: DateTime<Utc>,
}

/// Input for creating a workflow definition.
#[derive(Debug, Clone, Serialize, Deserialize)]
pub struct WorkflowCreate {
    pub name: String,
    pub workflow_type: String,
    pub definition: WorkflowGraph,
    pub execution_mode: ExecutionMode,
    #[serde(default, skip_serializing_if = "Option::is_none")]
    pub schedule: Option<String>,
}

/// Lifecycle status of one execution.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Serialize, Deserialize)]
#[serde(rename_all = "lowercase")]
pub enum ExecutionStatus {
    Pending,
    Running,
    Completed,
    Failed,
}

impl ExecutionStatus {
    /// True once the execution can no longer change.
    pub fn is_terminal(&self) -> bool {
        matches!(self, ExecutionStatus::Completed | ExecutionStatus::Failed)
    }
}

impl std::fmt::Display for ExecutionStatus {
    fn fmt(&self, f: &mut std::fmt::Formatter<'_>) -> std::fmt::Result {
        match self {
            ExecutionStatus::Pending => write!(f, "pending"),
            ExecutionStatus::Running => write!(f, "running"),
            ExecutionStatus::Completed => write!(f, "completed"),
            ExecutionStatus::Failed => write!(f, "failed"),
        }
    }
}

/// Error entry recorded when a run is cancelled rather than failed on
/// its own; cancellation is modeled as `failed` with this marker.
pub const CANCELLED_ERROR: &str = "workflow cancelled";

/// One run of a workflow.
#[derive(Debug, Clone, Serialize, Deserialize)]
pub struct WorkflowExecution {
    pub id: String,
    pub workflow_id: String,
    pub status: ExecutionStatus,
    /// 0-100, monotonically non-decreasing
    pub progress: u8,
    #[serde(skip_serializing_if = "Option::is_none")]
    pub current_node: Option<String>,
    #[serde(skip_serializing_if = "Option::is_none")]
    pub results: Option<HashMap<String, AgentReport>>,
    #[serde(default, skip_serializing_if = "Vec::is_empty")]
    pub errors: Vec<String>,
    /// Wall-clock duration in milliseconds, set at finalization
    #[serde(skip_serializing_if = "Option::is_none")]
    pub execution_time_ms: Option<i64>,
    #[serde(skip_serializing_if = "Option::is_none")]
    pub started_at: Option<DateTime<Utc>>,
    #[serde(skip_serializing_if = "Option::is_none")]
    pub completed_at: Option<DateTime<Utc>>,
}

/// Mutable state threaded through the agents of one execution.
#[derive(Debug, Clone, Default, Serialize, Deserialize)]
pub struct WorkflowState {
    /// Caller-supplied inputs (user id, target allocations, ...)
    #[serde(default)]
    pub context: HashMap<String, serde_json::Value>,
    /// Agent outputs, keyed by agent name
    #[serde(default)]
    pub results: HashMap<String, AgentReport>,
    /// Recoverable failures accumulated along the run
    #[serde(default)]
    pub errors: Vec<String>,
    /// Name of the node that produced this state
    #[serde(default)]
    pub current_node: String,
}

impl WorkflowState {
    /// Creates a state seeded with the given context.
    pub fn with_context(context: HashMap<String, serde_json::Value>) -> Self {
        Self {
            context,
            ..Default::default()
        }
    }

    /// Convenience accessor for the `user_id` context entry.
    pub fn user_id(&self) -> Option<&str> {
        self.context.get("user_id").and_then(|value| value.as_str())
    }
}

/// Output of one agent, tagged by report kind.
#[derive(Debug, Clone, Serialize, Deserialize)]
#[serde(tag = "kind", rename_all = "snake_case")]
pub enum AgentReport {
    PriceAlerts(PriceAlertReport),
    Research(ResearchReport),
    Rebalancing(RebalancingReport),
}

/// Result of a price-alert sweep.
#[derive(Debug, Clone, Default, Serialize, Deserialize)]
pub struct PriceAlertReport {
    pub checked: usize,
    pub triggered: usize,
    #[serde(default, skip_serializing_if = "Vec::is_empty")]
    pub alerts: Vec<TriggeredAlert>,
    #[serde(skip_serializing_if = "Option::is_none")]
    pub message: Option<String>,
}

/// Per-ticker research summary.
#[derive(Debug, Clone, Serialize, Deserialize)]
pub struct TickerResearch {
    pub ticker: String,
    pub summary: String,
    pub news_count: usize,
    pub sentiment: SentimentLabel,
    pub sentiment_score: f64,
}

/// Result of a research pass over the portfolio.
#[derive(Debug, Clone, Default, Serialize, Deserialize)]
pub struct ResearchReport {
    pub tickers_researched: usize,
    #[serde(default, skip_serializing_if = "Vec::is_empty")]
    pub tickers: Vec<String>,
    #[serde(default, skip_serializing_if = "Vec::is_empty")]
    pub summaries: Vec<TickerResearch>,
    #[serde(skip_serializing_if = "Option::is_none")]
    pub message: Option<String>,
}

/// Result of a rebalancing analysis.
#[derive(Debug, Clone, Default, Serialize, Deserialize)]
pub struct RebalancingReport {
    #[serde(skip_serializing_if = "Option::is_none")]
    pub composition: Option<PortfolioComposition>,
    #[serde(default, skip_serializing_if = "Vec::is_empty")]
    pub suggestions: Vec<RebalancingSuggestion>,
    pub suggestion_count: usize,
    #[serde(skip_serializing_if = "Option::is_none")]
    pub message: Option<String>,
}
