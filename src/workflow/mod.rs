// Copyright 2025 Zileo-Chat-3 Contributors
// SPDX-License-Identifier: Apache-2.0

//! Workflow orchestration.
//!
//! [`definition`] validates and compiles node/edge graphs and carries
//! the built-in templates, [`engine`] runs executions (sequential or
//! parallel) with progress tracking and cancellation, and
//! [`scheduler`] drives cron-triggered runs.

pub mod definition;
pub mod engine;
pub mod scheduler;

pub use definition::{validate_graph, CompiledGraph, DefinitionError};
pub use engine::{EngineError, WorkflowEngine};
pub use scheduler::{JobInfo, SchedulerError, WorkflowScheduler};
