// Copyright 2025 Zileo-Chat-3 Contributors
// SPDX-License-Identifier: Apache-2.0

pub mod agent;
pub mod registry;

pub use agent::Agent;
pub use registry::AgentRegistry;
