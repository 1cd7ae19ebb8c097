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

//! # Stockflow Backend Library
//!
//! Agentic workflow orchestrator and real-time market data backend.
//!
//! ## Modules
//!
//! - [`agents`] - Workflow agents (registry, agent trait, built-ins)
//! - [`alerts`] - Price alert evaluator and notifications
//! - [`auth`] - Sessions, tokens, and password hashing
//! - [`cache`] - TTL market-data cache with headline dedup
//! - [`db`] - Embedded SurrealDB client and schema management
//! - [`kv`] - TTL key-value store (Redis or in-process)
//! - [`mcp`] - Remote tool-server client
//! - [`models`] - Data models
//! - [`realtime`] - WebSocket hub, server, and price ticker loop
//! - [`resilience`] - Circuit breakers and retry with backoff
//! - [`stocks`] - Market data services over the tool servers
//! - [`workflow`] - Workflow engine and cron scheduler
//! - [`state`] - Application composition root
//!
//! ## Architecture
//!
//! Agents implement the [`Agent`](agents::Agent) contract
//! `run(state) -> state` and are discovered through the
//! [`AgentRegistry`](agents::AgentRegistry). The
//! [`WorkflowEngine`](workflow::WorkflowEngine) drives validated
//! node/edge graphs over them, sequentially or in parallel, while
//! every outward call rides the resilience fabric (breaker, retry,
//! cache) in [`stocks`].
//!
//! ## Example
//!
//! ```rust,ignore
//! use stockflow::{config::Settings, state::AppState};
//!
//! let settings = Settings::from_env()?;
//! let state = AppState::new(settings).await?;
//! state.register_default_agents().await;
//! let handles = state.start().await?;
//! ```

pub mod agents;
pub mod alerts;
pub mod audit;
pub mod auth;
pub mod cache;
pub mod compliance;
pub mod config;
pub mod db;
pub mod errors;
pub mod kv;
pub mod mcp;
pub mod models;
pub mod portfolio;
pub mod realtime;
pub mod resilience;
pub mod security;
pub mod state;
pub mod stocks;
pub mod workflow;

pub use auth::AuthService;
pub use config::Settings;
pub use errors::{AppError, ErrorCode};
pub use mcp::{ToolClient, ToolError};
pub use state::AppState;
