// Copyright 2025 Zileo-Chat-3 Contributors
// SPDX-License-Identifier: Apache-2.0

//! Remote capability-server (MCP) client.
//!
//! Agents never talk to third-party APIs directly; they invoke named
//! tools on remote tool servers through [`ToolClient`]. The transport
//! is connectionless JSON over HTTP, so a client is cheap to hold and
//! safe to share.

pub mod client;
pub mod error;

pub use client::{ToolClient, ToolDescriptor, DEFAULT_CALL_TIMEOUT};
pub use error::{ToolError, ToolErrorCategory, ToolResult};
