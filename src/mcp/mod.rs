//! In-process MCP servers and their JSON-RPC bridge.
//!
//! An [`SdkMcpServer`] is a configuration DTO: a named collection of
//! tools (and optional prompt/resource handlers) that runs inside the
//! application process. The tool addresses it by name through
//! `mcp_message` control requests; the [`bridge::McpBridge`] answers the
//! JSON-RPC traffic locally over an in-memory request/response channel —
//! no socket, no subprocess.

pub mod bridge;

pub use bridge::McpBridge;

use std::future::Future;
use std::pin::Pin;
use std::sync::Arc;

use serde_json::{json, Value};

use crate::Result;

/// Async handler backing one JSON-RPC method: raw params in, raw result out.
pub type BridgeHandler =
    Arc<dyn Fn(Value) -> Pin<Box<dyn Future<Output = Result<Value>> + Send>> + Send + Sync>;

/// Async handler backing one tool invocation.
pub type ToolHandler =
    Arc<dyn Fn(Value) -> Pin<Box<dyn Future<Output = Result<ToolOutput>> + Send>> + Send + Sync>;

// ── Tool surface ──────────────────────────────────────────────────────────────

/// Result of a tool invocation, in MCP content-block form.
#[derive(Debug, Clone, PartialEq)]
pub struct ToolOutput {
    /// Content blocks returned to the model.
    pub content: Vec<Value>,
    /// Whether the invocation failed.
    pub is_error: bool,
}

impl ToolOutput {
    /// A successful single-text-block result.
    #[must_use]
    pub fn text(text: impl Into<String>) -> Self {
        Self {
            content: vec![json!({ "type": "text", "text": text.into() })],
            is_error: false,
        }
    }

    /// A failed single-text-block result.
    #[must_use]
    pub fn error(text: impl Into<String>) -> Self {
        Self {
            content: vec![json!({ "type": "text", "text": text.into() })],
            is_error: true,
        }
    }

    /// Wire shape for a `tools/call` result.
    #[must_use]
    pub fn to_wire(&self) -> Value {
        json!({ "content": self.content, "isError": self.is_error })
    }
}

/// One tool exposed by an in-process server.
///
/// Carries exactly what the bridge needs: a name, an optional
/// description, a JSON-Schema document for the input, and the handler.
/// Schema synthesis from function signatures is a configuration-layer
/// concern and does not live here.
#[derive(Clone)]
pub struct SdkMcpTool {
    /// Tool name, unique within its server.
    pub name: String,
    /// Human-readable description.
    pub description: Option<String>,
    /// JSON-Schema document for the tool input.
    pub input_schema: Value,
    /// Invocation handler.
    pub handler: ToolHandler,
}

impl SdkMcpTool {
    /// Build a tool from its parts.
    #[must_use]
    pub fn new(
        name: impl Into<String>,
        description: impl Into<String>,
        input_schema: Value,
        handler: ToolHandler,
    ) -> Self {
        Self {
            name: name.into(),
            description: Some(description.into()),
            input_schema,
            handler,
        }
    }

    /// Wire shape for a `tools/list` entry.
    #[must_use]
    pub fn to_wire(&self) -> Value {
        let mut entry = json!({
            "name": self.name,
            "inputSchema": self.input_schema,
        });
        if let Some(description) = &self.description {
            entry["description"] = json!(description);
        }
        entry
    }
}

impl std::fmt::Debug for SdkMcpTool {
    fn fmt(&self, f: &mut std::fmt::Formatter<'_>) -> std::fmt::Result {
        f.debug_struct("SdkMcpTool")
            .field("name", &self.name)
            .field("description", &self.description)
            .finish_non_exhaustive()
    }
}

// ── Server DTO ────────────────────────────────────────────────────────────────

/// Configuration for one in-process MCP server.
#[derive(Clone, Default)]
pub struct SdkMcpServer {
    name: String,
    version: String,
    tools: Vec<Arc<SdkMcpTool>>,
    list_prompts: Option<BridgeHandler>,
    get_prompt: Option<BridgeHandler>,
    list_resources: Option<BridgeHandler>,
    read_resource: Option<BridgeHandler>,
}

impl SdkMcpServer {
    /// Create a server with the given name and version `"1.0.0"`.
    #[must_use]
    pub fn new(name: impl Into<String>) -> Self {
        Self {
            name: name.into(),
            version: "1.0.0".into(),
            ..Self::default()
        }
    }

    /// Server name used for `mcp_message` routing.
    #[must_use]
    pub fn name(&self) -> &str {
        &self.name
    }

    /// Override the advertised version.
    #[must_use]
    pub fn version(mut self, version: impl Into<String>) -> Self {
        self.version = version.into();
        self
    }

    /// Register a tool.
    #[must_use]
    pub fn tool(mut self, tool: SdkMcpTool) -> Self {
        self.tools.push(Arc::new(tool));
        self
    }

    /// Register a prompt surface: list handler plus get handler.
    #[must_use]
    pub fn prompts(mut self, list: BridgeHandler, get: BridgeHandler) -> Self {
        self.list_prompts = Some(list);
        self.get_prompt = Some(get);
        self
    }

    /// Register a resource surface: list handler plus read handler.
    #[must_use]
    pub fn resources(mut self, list: BridgeHandler, read: BridgeHandler) -> Self {
        self.list_resources = Some(list);
        self.read_resource = Some(read);
        self
    }

    pub(crate) fn version_str(&self) -> &str {
        &self.version
    }

    pub(crate) fn tool_list(&self) -> &[Arc<SdkMcpTool>] {
        &self.tools
    }

    pub(crate) fn prompt_handlers(&self) -> (Option<BridgeHandler>, Option<BridgeHandler>) {
        (self.list_prompts.clone(), self.get_prompt.clone())
    }

    pub(crate) fn resource_handlers(&self) -> (Option<BridgeHandler>, Option<BridgeHandler>) {
        (self.list_resources.clone(), self.read_resource.clone())
    }
}

impl std::fmt::Debug for SdkMcpServer {
    fn fmt(&self, f: &mut std::fmt::Formatter<'_>) -> std::fmt::Result {
        f.debug_struct("SdkMcpServer")
            .field("name", &self.name)
            .field("version", &self.version)
            .field("tools", &self.tools.iter().map(|t| &t.name).collect::<Vec<_>>())
            .finish_non_exhaustive()
    }
}
