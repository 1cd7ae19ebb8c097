// Copyright 2025 Zileo-Chat-3 Contributors
// SPDX-License-Identifier: Apache-2.0

use async_trait::async_trait;

use crate::models::WorkflowState;

/// A named workflow agent.
///
/// Agents transform the shared [`WorkflowState`] and hand it back.
/// They must not panic and must not "fail": anything recoverable is
/// appended to `state.errors`, and the engine decides what an
/// accumulated error list means for the run's final status.
#[async_trait]
pub trait Agent: Send + Sync {
    /// Registry name. Workflow nodes reference agents by this name,
    /// and the agent namespaces its `results` entry with it.
    fn name(&self) -> &str;

    /// Executes the agent against the current state.
    async fn run(&self, state: WorkflowState) -> WorkflowState;
}
