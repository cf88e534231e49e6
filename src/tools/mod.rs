//! Tool trait and catalog
//!
//! Tools are remote analysis operations served over MCP. The catalog is an
//! explicit value built by the caller and handed to the executor; there is no
//! process-wide registry.

pub mod mcp;
pub mod params;
pub mod spec;

pub use mcp::McpClient;
pub use params::ToolRequest;
pub use spec::{find_spec, ToolCategory, ToolKind, ToolServer, ToolSpec, BUILTIN_TOOLS};

use crate::config::Settings;
use crate::error::AgentError;
use crate::Result;
use serde_json::Value;
use std::collections::HashMap;
use std::sync::Arc;
use tracing::debug;

/// Trait for a single tool
#[async_trait::async_trait]
pub trait Tool: Send + Sync {
    fn spec(&self) -> &ToolSpec;
    async fn execute(&self, parameters: Value) -> Result<Value>;
}

/// Capability the plan executor invokes steps through.
#[async_trait::async_trait]
pub trait ToolInvoker: Send + Sync {
    async fn invoke(&self, tool_id: &str, parameters: Value) -> Result<Value>;
}

/// A built-in tool reached through an MCP server.
pub struct RemoteTool {
    spec: &'static ToolSpec,
    client: Arc<McpClient>,
}

impl RemoteTool {
    pub fn new(spec: &'static ToolSpec, client: Arc<McpClient>) -> Self {
        Self { spec, client }
    }
}

#[async_trait::async_trait]
impl Tool for RemoteTool {
    fn spec(&self) -> &ToolSpec {
        self.spec
    }

    async fn execute(&self, parameters: Value) -> Result<Value> {
        let request = ToolRequest::parse(self.spec.kind, parameters)?;
        let params = request.to_params()?;
        debug!(tool_id = self.spec.id, kind = ?request.kind(), "Calling remote tool");
        self.client.call_tool(self.spec.method, &params).await
    }
}

/// Tools available to one agent, addressable by tool id or registry key.
pub struct ToolCatalog {
    tools: Vec<Arc<dyn Tool>>,
    index: HashMap<String, usize>,
}

impl ToolCatalog {
    pub fn new() -> Self {
        Self {
            tools: Vec::new(),
            index: HashMap::new(),
        }
    }

    /// Every built-in tool, wired to the MCP servers from `settings`.
    pub fn from_settings(settings: &Settings) -> Result<Self> {
        let stock_data = Arc::new(McpClient::new(
            ToolServer::StockData.as_str(),
            settings.stock_data_url.clone(),
            settings.tool_http_timeout,
        )?);
        let technical = Arc::new(McpClient::new(
            ToolServer::Technical.as_str(),
            settings.technical_url.clone(),
            settings.tool_http_timeout,
        )?);

        Ok(Self::with_servers(stock_data, technical))
    }

    pub fn with_servers(stock_data: Arc<McpClient>, technical: Arc<McpClient>) -> Self {
        let mut catalog = Self::new();

        for spec in &BUILTIN_TOOLS {
            let client = match spec.server {
                ToolServer::StockData => stock_data.clone(),
                ToolServer::Technical => technical.clone(),
            };
            catalog.register(Arc::new(RemoteTool::new(spec, client)));
        }

        catalog
    }

    /// Register a tool. A later tool with the same id or key replaces the
    /// earlier lookup entry.
    pub fn register(&mut self, tool: Arc<dyn Tool>) {
        let position = self.tools.len();
        let (id, key) = (tool.spec().id, tool.spec().key);

        self.index.insert(id.to_string(), position);
        self.index.insert(key.to_string(), position);
        self.tools.push(tool);

        debug!(tool_id = id, key, "Registered tool");
    }

    pub fn get(&self, name: &str) -> Option<Arc<dyn Tool>> {
        self.index.get(name).map(|&i| self.tools[i].clone())
    }

    pub fn contains(&self, name: &str) -> bool {
        self.index.contains_key(name)
    }

    /// Specs of the registered tools, in registration order.
    pub fn list(&self) -> Vec<&ToolSpec> {
        self.tools
            .iter()
            .enumerate()
            .filter(|(position, tool)| self.index.get(tool.spec().id) == Some(position))
            .map(|(_, tool)| tool.spec())
            .collect()
    }

    pub fn len(&self) -> usize {
        self.list().len()
    }

    pub fn is_empty(&self) -> bool {
        self.len() == 0
    }

    /// Tool descriptions in the form used by planning prompts.
    pub fn describe_for_prompt(&self) -> String {
        self.list()
            .iter()
            .map(|spec| {
                format!(
                    "Tool: {}\nTool ID: {}\nDescription: {}\nWhen to use: {}\nExamples: {}\nParameters: {}",
                    spec.key,
                    spec.id,
                    spec.description,
                    spec.when_to_use,
                    spec.examples.iter().take(2).copied().collect::<Vec<_>>().join(", "),
                    spec.parameters,
                )
            })
            .collect::<Vec<_>>()
            .join("\n\n")
    }

    /// Tools whose descriptions share words with `query`, best match first.
    pub fn search(&self, query: &str) -> Vec<&ToolSpec> {
        let words = significant_words(query);
        if words.is_empty() {
            return Vec::new();
        }

        let mut scored: Vec<(usize, &ToolSpec)> = self
            .list()
            .into_iter()
            .filter_map(|spec| {
                let mut text = format!("{} {}", spec.description, spec.when_to_use);
                for example in spec.examples {
                    text.push(' ');
                    text.push_str(example);
                }
                let haystack = significant_words(&text);
                let score = words.iter().filter(|w| haystack.contains(*w)).count();
                (score > 0).then_some((score, spec))
            })
            .collect();

        // Stable: ties keep registration order.
        scored.sort_by(|a, b| b.0.cmp(&a.0));
        scored.into_iter().map(|(_, spec)| spec).collect()
    }
}

impl Default for ToolCatalog {
    fn default() -> Self {
        Self::new()
    }
}

#[async_trait::async_trait]
impl ToolInvoker for ToolCatalog {
    async fn invoke(&self, tool_id: &str, parameters: Value) -> Result<Value> {
        let tool = self
            .get(tool_id)
            .ok_or_else(|| AgentError::ToolNotFound(tool_id.to_string()))?;
        tool.execute(parameters).await
    }
}

fn significant_words(text: &str) -> Vec<String> {
    text.split(|c: char| !c.is_ascii_alphanumeric())
        .filter(|w| w.len() > 2)
        .map(|w| w.to_ascii_lowercase())
        .collect()
}
