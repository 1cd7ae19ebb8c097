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

//! HTTP tool client.
//!
//! Talks to a remote tool server over plain request/response JSON:
//!
//! - `GET {base}/mcp/tools` lists advertised tools. Servers that only
//!   expose a bare `{"tools": ["name", ...]}` at the root endpoint are
//!   accepted through a fallback probe.
//! - `POST {base}/tools/{name}` invokes a tool with a JSON argument
//!   body. The response is either a bare JSON value (the result) or an
//!   envelope `{"success": bool, "data"?: ..., "error"?: ...}`; both
//!   shapes are handled.
//!
//! The tool list is cached per client after the first successful
//! listing and cleared on [`ToolClient::disconnect`].

use reqwest::Client;
use serde::{Deserialize, Serialize};
use std::time::Duration;
use tokio::sync::RwLock;
use tracing::{debug, info, warn};

use crate::mcp::error::{ToolError, ToolResult};

/// Default deadline for a tool invocation (30 seconds).
pub const DEFAULT_CALL_TIMEOUT: Duration = Duration::from_secs(30);

/// Deadline for the cheap listing/probe requests.
const LIST_TIMEOUT: Duration = Duration::from_secs(10);

/// A tool advertised by a server.
#[derive(Debug, Clone, Serialize, Deserialize)]
pub struct ToolDescriptor {
    /// Tool name (used to invoke it)
    pub name: String,
    /// Human-readable description
    #[serde(default)]
    pub description: String,
    /// JSON Schema of the tool's arguments
    #[serde(rename = "inputSchema", default)]
    pub input_schema: serde_json::Value,
}

#[derive(Debug, Deserialize)]
struct ToolListBody {
    #[serde(default)]
    tools: Vec<ToolDescriptor>,
}

/// Client for one remote tool server.
#[derive(Debug)]
pub struct ToolClient {
    /// Server name, used in errors and breaker keys
    name: String,
    base_url: String,
    client: Client,
    call_timeout: Duration,
    /// Tool list cache, filled on first successful listing
    tools: RwLock<Option<Vec<ToolDescriptor>>>,
}

impl ToolClient {
    /// Creates a client for the server at `base_url`.
    ///
    /// # Errors
    ///
    /// Returns an error if the URL is malformed or the HTTP client
    /// cannot be constructed.
    pub fn new(name: impl Into<String>, base_url: impl Into<String>) -> ToolResult<Self> {
        let name = name.into();
        let base_url = base_url.into();

        if !base_url.starts_with("http://") && !base_url.starts_with("https://") {
            return Err(ToolError::InvalidConfig {
                field: "base_url".to_string(),
                reason: format!("must start with http:// or https://: {}", base_url),
            });
        }

        let client = Client::builder()
            .timeout(DEFAULT_CALL_TIMEOUT)
            .build()
            .map_err(|e| ToolError::InvalidConfig {
                field: "http_client".to_string(),
                reason: e.to_string(),
            })?;

        Ok(Self {
            name,
            base_url: base_url.trim_end_matches('/').to_string(),
            client,
            call_timeout: DEFAULT_CALL_TIMEOUT,
            tools: RwLock::new(None),
        })
    }

    /// Overrides the per-call deadline.
    pub fn with_call_timeout(mut self, timeout: Duration) -> Self {
        self.call_timeout = timeout;
        self
    }

    /// Returns the server name.
    pub fn name(&self) -> &str {
        &self.name
    }

    /// Lists the tools advertised by the server.
    ///
    /// The first successful listing is cached; later calls return the
    /// cache until [`disconnect`](Self::disconnect) clears it.
    pub async fn list_tools(&self) -> ToolResult<Vec<ToolDescriptor>> {
        if let Some(cached) = self.tools.read().await.as_ref() {
            return Ok(cached.clone());
        }

        let url = format!("{}/mcp/tools", self.base_url);
        debug!(server = %self.name, url = %url, "Listing tools");

        let response = self
            .client
            .get(&url)
            .timeout(LIST_TIMEOUT)
            .send()
            .await
            .map_err(|e| self.transport_error(e, LIST_TIMEOUT))?;

        let tools = if response.status() == reqwest::StatusCode::NOT_FOUND {
            // Older servers only expose bare tool names at the root
            self.list_tools_fallback().await?
        } else if response.status().is_success() {
            let body: ToolListBody =
                response.json().await.map_err(|e| ToolError::ProtocolError {
                    server: self.name.clone(),
                    message: format!("tool list decode: {}", e),
                })?;
            body.tools
        } else {
            return Err(ToolError::RemoteUnavailable {
                server: self.name.clone(),
                message: format!("tool listing returned HTTP {}", response.status()),
            });
        };

        info!(server = %self.name, count = tools.len(), "Tool list loaded");
        *self.tools.write().await = Some(tools.clone());
        Ok(tools)
    }

    /// Fallback discovery against the root endpoint.
    async fn list_tools_fallback(&self) -> ToolResult<Vec<ToolDescriptor>> {
        let response = self
            .client
            .get(&self.base_url)
            .timeout(LIST_TIMEOUT)
            .send()
            .await
            .map_err(|e| self.transport_error(e, LIST_TIMEOUT))?;

        if !response.status().is_success() {
            return Err(ToolError::RemoteUnavailable {
                server: self.name.clone(),
                message: format!("root endpoint returned HTTP {}", response.status()),
            });
        }

        let body: serde_json::Value =
            response.json().await.map_err(|e| ToolError::ProtocolError {
                server: self.name.clone(),
                message: format!("root endpoint decode: {}", e),
            })?;

        Ok(parse_bare_tool_names(&body))
    }

    /// Invokes a tool with JSON arguments.
    pub async fn call_tool(
        &self,
        tool_name: &str,
        arguments: serde_json::Value,
    ) -> ToolResult<serde_json::Value> {
        let url = format!("{}/tools/{}", self.base_url, tool_name);
        debug!(server = %self.name, tool = %tool_name, "Calling tool");

        let response = self
            .client
            .post(&url)
            .json(&arguments)
            .timeout(self.call_timeout)
            .send()
            .await
            .map_err(|e| self.transport_error(e, self.call_timeout))?;

        let status = response.status();
        if status == reqwest::StatusCode::NOT_FOUND {
            return Err(ToolError::ToolNotFound {
                server: self.name.clone(),
                tool: tool_name.to_string(),
            });
        }

        if !status.is_success() {
            let body = response.text().await.unwrap_or_default();
            return Err(ToolError::RemoteUnavailable {
                server: self.name.clone(),
                message: format!("HTTP {} - {}", status, body),
            });
        }

        let body: serde_json::Value =
            response.json().await.map_err(|e| ToolError::ProtocolError {
                server: self.name.clone(),
                message: format!("tool response decode: {}", e),
            })?;

        unwrap_tool_response(&self.name, tool_name, body)
    }

    /// Forgets the cached tool list.
    pub async fn disconnect(&self) {
        self.tools.write().await.take();
        debug!(server = %self.name, "Tool client disconnected");
    }

    fn transport_error(&self, err: reqwest::Error, deadline: Duration) -> ToolError {
        if err.is_timeout() {
            ToolError::Timeout {
                server: self.name.clone(),
                timeout_ms: deadline.as_millis() as u64,
            }
        } else {
            warn!(server = %self.name, error = %err, "Tool server transport failure");
            ToolError::RemoteUnavailable {
                server: self.name.clone(),
                message: err.to_string(),
            }
        }
    }
}

/// Converts a bare `{"tools": ["a", "b"]}` body into descriptors.
fn parse_bare_tool_names(body: &serde_json::Value) -> Vec<ToolDescriptor> {
    body.get("tools")
        .and_then(|tools| tools.as_array())
        .map(|names| {
            names
                .iter()
                .filter_map(|value| value.as_str())
                .map(|name| ToolDescriptor {
                    name: name.to_string(),
                    description: format!("Tool: {}", name),
                    input_schema: serde_json::json!({"type": "object", "properties": {}}),
                })
                .collect()
        })
        .unwrap_or_default()
}

/// Interprets a tool response body.
///
/// Accepts both a bare JSON value (the result itself) and the
/// `{"success": bool, ...}` envelope.
fn unwrap_tool_response(
    server: &str,
    tool: &str,
    body: serde_json::Value,
) -> ToolResult<serde_json::Value> {
    if let Some(object) = body.as_object() {
        if let Some(success) = object.get("success").and_then(|v| v.as_bool()) {
            return if success {
                Ok(object
                    .get("data")
                    .cloned()
                    .unwrap_or(serde_json::Value::Null))
            } else {
                let message = object
                    .get("error")
                    .and_then(|e| e.as_str())
                    .unwrap_or("unknown error")
                    .to_string();
                Err(ToolError::ToolExecutionFailed {
                    server: server.to_string(),
                    tool: tool.to_string(),
                    message,
                })
            };
        }
    }

    // Bare value: the body is the result
    Ok(body)
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn test_rejects_invalid_url() {
        let err = ToolClient::new("stock-data", "not-a-url").unwrap_err();
        assert!(matches!(err, ToolError::InvalidConfig { .. }));
    }

    #[test]
    fn test_accepts_http_and_https() {
        assert!(ToolClient::new("a", "http://localhost:8002").is_ok());
        assert!(ToolClient::new("b", "https://tools.example.com/mcp").is_ok());
    }

    #[test]
    fn test_trailing_slash_normalized() {
        let client = ToolClient::new("a", "http://localhost:8002/").unwrap();
        assert_eq!(client.base_url, "http://localhost:8002");
    }

    #[test]
    fn test_descriptor_input_schema_rename() {
        let raw = serde_json::json!({
            "name": "get_stock_price",
            "description": "Get current stock price",
            "inputSchema": {"type": "object", "properties": {"ticker": {"type": "string"}}}
        });
        let descriptor: ToolDescriptor = serde_json::from_value(raw).unwrap();
        assert_eq!(descriptor.name, "get_stock_price");
        assert_eq!(descriptor.input_schema["type"], "object");

        let out = serde_json::to_value(&descriptor).unwrap();
        assert!(out.get("inputSchema").is_some());
    }

    #[test]
    fn test_parse_bare_tool_names() {
        let body = serde_json::json!({"tools": ["get_stock_price", "get_historical_data"]});
        let tools = parse_bare_tool_names(&body);
        assert_eq!(tools.len(), 2);
        assert_eq!(tools[0].name, "get_stock_price");

        assert!(parse_bare_tool_names(&serde_json::json!({})).is_empty());
    }

    #[test]
    fn test_unwrap_bare_value() {
        let body = serde_json::json!({"ticker": "AAPL", "price": 150.0});
        let result = unwrap_tool_response("s", "t", body.clone()).unwrap();
        assert_eq!(result, body);

        let list = serde_json::json!([1, 2, 3]);
        assert_eq!(unwrap_tool_response("s", "t", list.clone()).unwrap(), list);
    }

    #[test]
    fn test_unwrap_success_envelope() {
        let body = serde_json::json!({"success": true, "data": {"price": 150.0}});
        let result = unwrap_tool_response("s", "t", body).unwrap();
        assert_eq!(result["price"], 150.0);
    }

    #[test]
    fn test_unwrap_failure_envelope() {
        let body = serde_json::json!({"success": false, "error": "No data found for ticker ZZZZ"});
        let err = unwrap_tool_response("stock-data", "get_stock_price", body).unwrap_err();
        match err {
            ToolError::ToolExecutionFailed { message, .. } => {
                assert!(message.contains("ZZZZ"));
            }
            other => panic!("Expected ToolExecutionFailed, got {:?}", other),
        }
    }

    #[tokio::test]
    async fn test_disconnect_clears_cache() {
        let client = ToolClient::new("a", "http://localhost:8002").unwrap();
        *client.tools.write().await = Some(vec![ToolDescriptor {
            name: "cached".to_string(),
            description: String::new(),
            input_schema: serde_json::Value::Null,
        }]);

        client.disconnect().await;
        assert!(client.tools.read().await.is_none());
    }
}
