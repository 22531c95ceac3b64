//! JSON-RPC 2.0 bridge for in-process MCP servers.
//!
//! The bridge answers `initialize`, `tools/list`, `tools/call`,
//! `prompts/list`, `prompts/get`, `resources/list`, and
//! `resources/read`, and silently acknowledges any `notifications/*`
//! method. Each method is backed by an optional handler; list methods
//! without a handler return empty results, every other handler-less
//! method returns a JSON-RPC error with code −32603.
//!
//! The bridge never returns a transport-level failure: every request
//! produces a well-formed JSON-RPC response (or an empty acknowledgment
//! for notifications). Handler errors are serialized into the `error`
//! member and the session continues.

use std::collections::HashMap;
use std::sync::Arc;

use serde_json::{json, Map, Value};
use tokio::sync::Mutex;
use tracing::debug;

use super::{BridgeHandler, SdkMcpServer, SdkMcpTool};

/// MCP protocol revision this bridge implements.
const PROTOCOL_VERSION: &str = "2024-11-05";

/// JSON-RPC internal-error code used for unsupported methods and
/// handler failures.
const INTERNAL_ERROR: i64 = -32603;

/// In-process JSON-RPC responder for one named server.
pub struct McpBridge {
    name: String,
    version: String,
    list_tools: Option<BridgeHandler>,
    call_tool: Option<BridgeHandler>,
    list_prompts: Option<BridgeHandler>,
    get_prompt: Option<BridgeHandler>,
    list_resources: Option<BridgeHandler>,
    read_resource: Option<BridgeHandler>,
    /// One in-flight method at a time; the bridge's contract with its
    /// client is strictly request/response.
    lock: Mutex<()>,
}

impl McpBridge {
    /// Wire a bridge from a server DTO.
    ///
    /// Registered tools back the `tools/list` and `tools/call` methods;
    /// prompt and resource handlers are taken as configured.
    #[must_use]
    pub fn from_server(server: &SdkMcpServer) -> Self {
        let (list_tools, call_tool) = if server.tool_list().is_empty() {
            (None, None)
        } else {
            let by_name: Arc<HashMap<String, Arc<SdkMcpTool>>> = Arc::new(
                server
                    .tool_list()
                    .iter()
                    .map(|tool| (tool.name.clone(), Arc::clone(tool)))
                    .collect(),
            );

            let listing: Vec<Value> =
                server.tool_list().iter().map(|tool| tool.to_wire()).collect();
            let list: BridgeHandler = Arc::new(move |_params| {
                let listing = listing.clone();
                Box::pin(async move { Ok(json!({ "tools": listing })) })
            });

            let call: BridgeHandler = Arc::new(move |params: Value| {
                let by_name = Arc::clone(&by_name);
                Box::pin(async move {
                    let name = params
                        .get("name")
                        .and_then(Value::as_str)
                        .ok_or_else(|| {
                            crate::AgentError::Sdk("tools/call params missing `name`".into())
                        })?
                        .to_owned();
                    let tool = by_name.get(&name).ok_or_else(|| {
                        crate::AgentError::Sdk(format!("tool '{name}' not found"))
                    })?;
                    let arguments = params.get("arguments").cloned().unwrap_or(json!({}));
                    let output = (tool.handler)(arguments).await?;
                    Ok(output.to_wire())
                })
            });

            (Some(list), Some(call))
        };

        let (list_prompts, get_prompt) = server.prompt_handlers();
        let (list_resources, read_resource) = server.resource_handlers();

        Self {
            name: server.name().to_owned(),
            version: server.version_str().to_owned(),
            list_tools,
            call_tool,
            list_prompts,
            get_prompt,
            list_resources,
            read_resource,
            lock: Mutex::new(()),
        }
    }

    /// Server name used for `mcp_message` routing.
    #[must_use]
    pub fn name(&self) -> &str {
        &self.name
    }

    /// Answer one JSON-RPC message.
    ///
    /// Returns a full JSON-RPC response for requests, or an empty object
    /// acknowledging a `notifications/*` method (notifications carry no
    /// id and expect no response body).
    pub async fn handle(&self, message: &Value) -> Value {
        let _serialized = self.lock.lock().await;

        let id = message.get("id").cloned().unwrap_or(Value::Null);
        let Some(method) = message.get("method").and_then(Value::as_str) else {
            return error_response(id, "message is missing string field `method`");
        };

        if method.starts_with("notifications/") {
            debug!(server = %self.name, method, "mcp bridge: notification acknowledged");
            return Value::Object(Map::new());
        }

        let params = message.get("params").cloned().unwrap_or(json!({}));

        match method {
            "initialize" => result_response(id, self.initialize_result()),
            "tools/list" => self.list_or_empty(&self.list_tools, id, params, "tools").await,
            "prompts/list" => {
                self.list_or_empty(&self.list_prompts, id, params, "prompts").await
            }
            "resources/list" => {
                self.list_or_empty(&self.list_resources, id, params, "resources")
                    .await
            }
            "tools/call" => self.required(&self.call_tool, id, params, method).await,
            "prompts/get" => self.required(&self.get_prompt, id, params, method).await,
            "resources/read" => self.required(&self.read_resource, id, params, method).await,
            other => {
                debug!(server = %self.name, method = other, "mcp bridge: unknown method");
                error_response(id, format!("Unknown method: {other}"))
            }
        }
    }

    /// Build the `initialize` result. A capability key is present only
    /// when the corresponding list handler is registered.
    fn initialize_result(&self) -> Value {
        let mut capabilities = Map::new();
        if self.list_tools.is_some() {
            capabilities.insert("tools".into(), json!({}));
        }
        if self.list_prompts.is_some() {
            capabilities.insert("prompts".into(), json!({}));
        }
        if self.list_resources.is_some() {
            capabilities.insert("resources".into(), json!({}));
        }

        json!({
            "protocolVersion": PROTOCOL_VERSION,
            "capabilities": Value::Object(capabilities),
            "serverInfo": { "name": self.name, "version": self.version },
        })
    }

    /// Dispatch a list method: absent handler yields an empty listing.
    async fn list_or_empty(
        &self,
        handler: &Option<BridgeHandler>,
        id: Value,
        params: Value,
        key: &str,
    ) -> Value {
        match handler {
            Some(handler) => invoke(handler, id, params).await,
            None => result_response(id, json!({ key: [] })),
        }
    }

    /// Dispatch a non-list method: absent handler is an error.
    async fn required(
        &self,
        handler: &Option<BridgeHandler>,
        id: Value,
        params: Value,
        method: &str,
    ) -> Value {
        match handler {
            Some(handler) => invoke(handler, id, params).await,
            None => error_response(id, format!("{method} not supported")),
        }
    }
}

impl std::fmt::Debug for McpBridge {
    fn fmt(&self, f: &mut std::fmt::Formatter<'_>) -> std::fmt::Result {
        f.debug_struct("McpBridge")
            .field("name", &self.name)
            .field("version", &self.version)
            .finish_non_exhaustive()
    }
}

// ── Private helpers ───────────────────────────────────────────────────────────

/// Run a handler and wrap its outcome in a JSON-RPC response envelope.
async fn invoke(handler: &BridgeHandler, id: Value, params: Value) -> Value {
    match handler(params).await {
        Ok(result) => result_response(id, result),
        Err(err) => error_response(id, err.to_string()),
    }
}

fn result_response(id: Value, result: Value) -> Value {
    json!({ "jsonrpc": "2.0", "id": id, "result": result })
}

fn error_response(id: Value, message: impl Into<String>) -> Value {
    json!({
        "jsonrpc": "2.0",
        "id": id,
        "error": { "code": INTERNAL_ERROR, "message": message.into() },
    })
}

// ── Tests ─────────────────────────────────────────────────────────────────────
