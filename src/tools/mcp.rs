//! JSON-RPC client for MCP tool servers
//!
//! Each analysis server exposes a single `/mcp/` endpoint that accepts
//! JSON-RPC 2.0 requests whose `method` is the tool's method name.

use crate::error::AgentError;
use crate::Result;
use reqwest::Client;
use serde::{Deserialize, Serialize};
use serde_json::Value;
use std::sync::atomic::{AtomicU64, Ordering};
use std::time::Duration;
use tracing::debug;

#[derive(Debug, Serialize)]
struct JsonRpcRequest<'a> {
    jsonrpc: &'static str,
    method: &'a str,
    params: &'a Value,
    id: u64,
}

#[derive(Debug, Deserialize)]
struct JsonRpcResponse {
    #[serde(default)]
    result: Option<Value>,
    #[serde(default)]
    error: Option<Value>,
}

/// Pooled client for one MCP server. Safe to share across concurrent steps.
pub struct McpClient {
    name: String,
    endpoint: String,
    client: Client,
    next_id: AtomicU64,
}

impl McpClient {
    /// `endpoint` is the full `/mcp/` URL of the server.
    pub fn new(name: impl Into<String>, endpoint: impl Into<String>, timeout: Duration) -> Result<Self> {
        let client = Client::builder()
            .pool_idle_timeout(Duration::from_secs(60))
            .pool_max_idle_per_host(8)
            .timeout(timeout)
            .build()?;

        Ok(Self {
            name: name.into(),
            endpoint: endpoint.into(),
            client,
            next_id: AtomicU64::new(1),
        })
    }

    pub fn name(&self) -> &str {
        &self.name
    }

    pub fn endpoint(&self) -> &str {
        &self.endpoint
    }

    /// Invoke `method` and return the JSON-RPC `result` member (`{}` when the
    /// server sends none).
    pub async fn call_tool(&self, method: &str, params: &Value) -> Result<Value> {
        let tool = format!("{}.{}", self.name, method);
        let remote_error = |message: String| AgentError::RemoteInvocation {
            tool: tool.clone(),
            message,
        };

        let id = self.next_id.fetch_add(1, Ordering::Relaxed);
        let request = JsonRpcRequest {
            jsonrpc: "2.0",
            method,
            params,
            id,
        };

        debug!(server = %self.name, method, id, "Calling MCP tool");

        let response = self
            .client
            .post(&self.endpoint)
            .header("Content-Type", "application/json")
            .json(&request)
            .send()
            .await
            .map_err(|e| remote_error(format!("request to {} failed: {}", self.endpoint, e)))?;

        let status = response.status();
        if !status.is_success() {
            return Err(remote_error(format!("HTTP error: {}", status)));
        }

        let body: JsonRpcResponse = response
            .json()
            .await
            .map_err(|e| remote_error(format!("invalid JSON-RPC response: {}", e)))?;

        if let Some(error) = body.error.filter(|e| !e.is_null()) {
            let message = error
                .get("message")
                .and_then(Value::as_str)
                .map(str::to_string)
                .unwrap_or_else(|| error.to_string());
            return Err(remote_error(format!("MCP error: {}", message)));
        }

        Ok(body
            .result
            .unwrap_or_else(|| Value::Object(serde_json::Map::new())))
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use serde_json::json;
    use wiremock::matchers::{body_partial_json, method, path};
    use wiremock::{Mock, MockServer, ResponseTemplate};

    async fn client_for(server: &MockServer) -> McpClient {
        McpClient::new(
            "stock_data",
            format!("{}/mcp/", server.uri()),
            Duration::from_secs(5),
        )
        .unwrap()
    }

    #[tokio::test]
    async fn test_returns_result_member() {
        let server = MockServer::start().await;
        Mock::given(method("POST"))
            .and(path("/mcp/"))
            .and(body_partial_json(json!({
                "jsonrpc": "2.0",
                "method": "get_price",
                "params": {"symbol": "AAPL"}
            })))
            .respond_with(ResponseTemplate::new(200).set_body_json(json!({
                "jsonrpc": "2.0",
                "result": {"symbol": "AAPL", "current_price": 190.5},
                "id": 1
            })))
            .expect(1)
            .mount(&server)
            .await;

        let client = client_for(&server).await;
        let result = client
            .call_tool("get_price", &json!({"symbol": "AAPL"}))
            .await
            .unwrap();

        assert_eq!(result["current_price"], json!(190.5));
    }

    #[tokio::test]
    async fn test_missing_result_is_empty_object() {
        let server = MockServer::start().await;
        Mock::given(method("POST"))
            .respond_with(ResponseTemplate::new(200).set_body_json(json!({"jsonrpc": "2.0", "id": 1})))
            .mount(&server)
            .await;

        let result = client_for(&server)
            .await
            .call_tool("get_fundamentals", &json!({"symbol": "MSFT"}))
            .await
            .unwrap();

        assert_eq!(result, json!({}));
    }

    #[tokio::test]
    async fn test_json_rpc_error_is_remote_invocation() {
        let server = MockServer::start().await;
        Mock::given(method("POST"))
            .respond_with(ResponseTemplate::new(200).set_body_json(json!({
                "jsonrpc": "2.0",
                "error": {"code": -32601, "message": "Method not found"},
                "id": 1
            })))
            .mount(&server)
            .await;

        let err = client_for(&server)
            .await
            .call_tool("nope", &json!({}))
            .await
            .unwrap_err();

        match err {
            AgentError::RemoteInvocation { tool, message } => {
                assert_eq!(tool, "stock_data.nope");
                assert!(message.contains("Method not found"));
            }
            other => panic!("unexpected error {:?}", other),
        }
    }

    #[tokio::test]
    async fn test_http_error_status() {
        let server = MockServer::start().await;
        Mock::given(method("POST"))
            .respond_with(ResponseTemplate::new(503))
            .mount(&server)
            .await;

        let err = client_for(&server)
            .await
            .call_tool("get_price", &json!({"symbol": "AAPL"}))
            .await
            .unwrap_err();

        assert!(matches!(err, AgentError::RemoteInvocation { .. }));
        assert!(err.to_string().contains("503"));
    }

    #[tokio::test]
    async fn test_unreachable_server() {
        let client = McpClient::new("technical", "http://127.0.0.1:9/mcp/", Duration::from_secs(2)).unwrap();
        let err = client.call_tool("analyze_patterns", &json!({})).await.unwrap_err();
        assert!(err.is_step_error());
    }

    #[tokio::test]
    async fn test_request_ids_increase() {
        let server = MockServer::start().await;
        Mock::given(method("POST"))
            .and(body_partial_json(json!({"id": 2})))
            .respond_with(ResponseTemplate::new(200).set_body_json(json!({"result": {"second": true}})))
            .mount(&server)
            .await;
        Mock::given(method("POST"))
            .respond_with(ResponseTemplate::new(200).set_body_json(json!({"result": {"second": false}})))
            .mount(&server)
            .await;

        let client = client_for(&server).await;
        let first = client.call_tool("get_price", &json!({})).await.unwrap();
        let second = client.call_tool("get_price", &json!({})).await.unwrap();

        assert_eq!(first, json!({"second": false}));
        assert_eq!(second, json!({"second": true}));
    }
}
