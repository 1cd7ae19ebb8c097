// Copyright 2025 Zileo-Chat-3 Contributors
// SPDX-License-Identifier: Apache-2.0

//! Workflow agents.
//!
//! An agent is a named async handler with the contract
//! `run(state) -> state`. Agents never fail the run: recoverable
//! problems are appended to the state's error list and execution
//! continues.

pub mod core;
pub mod price_alert;
pub mod rebalancing;
pub mod research;

pub use self::core::{Agent, AgentRegistry};
pub use price_alert::PriceAlertAgent;
pub use rebalancing::RebalancingAgent;
pub use research::ResearchAgent;
