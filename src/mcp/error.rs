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

//! Tool-client error types.
//!
//! Errors are categorized so the resilience layer can decide which
//! failures are worth retrying and which should trip a breaker.

use serde::Serialize;
use std::fmt;

/// Error category for filtering and retry decisions.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Serialize)]
pub enum ToolErrorCategory {
    /// The server could not be reached or did not answer in time
    Connection,
    /// The server answered with something that is not the protocol
    Protocol,
    /// The tool ran on the server and reported a failure
    Execution,
    /// The requested tool does not exist on the server
    NotFound,
    /// Client-side configuration problem
    Configuration,
}

impl fmt::Display for ToolErrorCategory {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        match self {
            ToolErrorCategory::Connection => write!(f, "connection"),
            ToolErrorCategory::Protocol => write!(f, "protocol"),
            ToolErrorCategory::Execution => write!(f, "execution"),
            ToolErrorCategory::NotFound => write!(f, "not_found"),
            ToolErrorCategory::Configuration => write!(f, "configuration"),
        }
    }
}

/// Tool invocation error.
#[derive(Debug)]
pub enum ToolError {
    /// Requested tool was not found on the server
    ToolNotFound {
        /// Server name
        server: String,
        /// Tool name that was requested
        tool: String,
    },
    /// The server is unreachable or returned a server-side failure
    RemoteUnavailable {
        /// Server name
        server: String,
        /// Underlying error message
        message: String,
    },
    /// The call exceeded its deadline
    Timeout {
        /// Server name
        server: String,
        /// Deadline in milliseconds
        timeout_ms: u64,
    },
    /// The response could not be interpreted
    ProtocolError {
        /// Server name
        server: String,
        /// What went wrong
        message: String,
    },
    /// The tool executed and reported an error payload
    ToolExecutionFailed {
        /// Server name
        server: String,
        /// Tool name
        tool: String,
        /// Remote error message
        message: String,
    },
    /// Invalid client configuration
    InvalidConfig {
        /// Configuration field that is invalid
        field: String,
        /// Reason for invalidity
        reason: String,
    },
}

impl fmt::Display for ToolError {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        match self {
            ToolError::ToolNotFound { server, tool } => {
                write!(f, "Tool '{}' not found on server '{}'", tool, server)
            }
            ToolError::RemoteUnavailable { server, message } => {
                write!(f, "Tool server '{}' unavailable: {}", server, message)
            }
            ToolError::Timeout { server, timeout_ms } => {
                write!(
                    f,
                    "Call to tool server '{}' timed out after {}ms",
                    server, timeout_ms
                )
            }
            ToolError::ProtocolError { server, message } => {
                write!(f, "Protocol error from server '{}': {}", server, message)
            }
            ToolError::ToolExecutionFailed {
                server,
                tool,
                message,
            } => {
                write!(
                    f,
                    "Tool '{}' on server '{}' failed: {}",
                    tool, server, message
                )
            }
            ToolError::InvalidConfig { field, reason } => {
                write!(f, "Invalid tool client configuration for '{}': {}", field, reason)
            }
        }
    }
}

impl std::error::Error for ToolError {}

impl ToolError {
    /// Returns the category of this error.
    pub fn category(&self) -> ToolErrorCategory {
        match self {
            ToolError::RemoteUnavailable { .. } => ToolErrorCategory::Connection,
            ToolError::Timeout { .. } => ToolErrorCategory::Connection,
            ToolError::ProtocolError { .. } => ToolErrorCategory::Protocol,
            ToolError::ToolExecutionFailed { .. } => ToolErrorCategory::Execution,
            ToolError::ToolNotFound { .. } => ToolErrorCategory::NotFound,
            ToolError::InvalidConfig { .. } => ToolErrorCategory::Configuration,
        }
    }

    /// Returns true if the failure may resolve with a retry.
    pub fn is_transient(&self) -> bool {
        self.category() == ToolErrorCategory::Connection
    }
}

/// Result type alias for tool operations.
pub type ToolResult<T> = Result<T, ToolError>;
