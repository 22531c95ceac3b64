//! Control-plane wire types.
//!
//! Three record `type` values are control-plane: `control_request`,
//! `control_response`, and `control_cancel_request`. Everything else on
//! the stream is data-plane and flows through untouched.
//!
//! Outbound requests originate locally (initialize, interrupt, mode and
//! model changes, rewind, MCP status). Inbound requests originate in the
//! tool and must be answered (`can_use_tool`, `hook_callback`,
//! `mcp_message`).

pub mod handler;

pub use handler::ControlHandler;

use serde::{Deserialize, Serialize};
use serde_json::{json, Value};

use crate::hooks::{HookEvent, HookMatcher};
use crate::permissions::{PermissionMode, PermissionUpdate};

/// Record `type` for a control request (either direction).
pub const CONTROL_REQUEST: &str = "control_request";
/// Record `type` for a control response (either direction).
pub const CONTROL_RESPONSE: &str = "control_response";
/// Record `type` for a cancellation of an in-flight control request.
pub const CONTROL_CANCEL_REQUEST: &str = "control_cancel_request";

// ── Outbound requests ─────────────────────────────────────────────────────────

/// A control request sent from the application to the tool.
#[derive(Debug, Clone, Serialize)]
#[serde(tag = "subtype", rename_all = "snake_case")]
pub enum OutboundRequest {
    /// The once-per-session handshake carrying the hook configuration.
    Initialize {
        /// Hook registration payload, when hooks are configured.
        #[serde(skip_serializing_if = "Option::is_none")]
        hooks: Option<Value>,
    },
    /// Stop the current generation.
    Interrupt,
    /// Change the permission policy live.
    SetPermissionMode {
        /// Mode to switch to.
        mode: PermissionMode,
    },
    /// Hot-swap the active model. `None` reverts to the tool's default.
    SetModel {
        /// Model identifier, or `None` for the default.
        model: Option<String>,
    },
    /// Restore tracked files to the snapshot at an earlier user message.
    RewindFiles {
        /// The user message whose snapshot to restore.
        user_message_id: String,
    },
    /// Query connected MCP server health.
    McpStatus,
}

impl OutboundRequest {
    /// Wire subtype of this request, for timeouts and diagnostics.
    #[must_use]
    pub fn subtype(&self) -> &'static str {
        match self {
            Self::Initialize { .. } => "initialize",
            Self::Interrupt => "interrupt",
            Self::SetPermissionMode { .. } => "set_permission_mode",
            Self::SetModel { .. } => "set_model",
            Self::RewindFiles { .. } => "rewind_files",
            Self::McpStatus => "mcp_status",
        }
    }
}

/// Wrap an outbound request payload in its envelope.
#[must_use]
pub fn request_envelope(request_id: &str, request: &Value) -> Value {
    json!({
        "type": CONTROL_REQUEST,
        "request_id": request_id,
        "request": request,
    })
}

// ── Inbound requests ──────────────────────────────────────────────────────────

/// A control request sent from the tool to the application.
#[derive(Debug, Clone, Deserialize)]
#[serde(tag = "subtype", rename_all = "snake_case")]
pub enum InboundRequest {
    /// "May I use this tool?"
    CanUseTool {
        /// Tool the model wants to invoke.
        tool_name: String,
        /// Proposed tool input.
        input: Value,
        /// Permission updates the tool suggests alongside an allow.
        #[serde(default)]
        permission_suggestions: Option<Vec<PermissionUpdate>>,
    },
    /// "Run this registered hook with this input."
    HookCallback {
        /// Identifier allocated during the initialize handshake.
        callback_id: String,
        /// Event payload.
        input: Value,
        /// Originating tool invocation, when applicable.
        #[serde(default)]
        tool_use_id: Option<String>,
    },
    /// "Dispatch this JSON-RPC message to in-process server X."
    McpMessage {
        /// Name of the in-process server.
        server_name: String,
        /// The JSON-RPC message to dispatch.
        message: Value,
    },
}

// ── Responses ─────────────────────────────────────────────────────────────────

/// Build a success `control_response` record.
#[must_use]
pub fn success_response(request_id: &str, payload: Option<Value>) -> Value {
    let mut response = json!({
        "subtype": "success",
        "request_id": request_id,
    });
    if let Some(payload) = payload {
        response["response"] = payload;
    }
    json!({ "type": CONTROL_RESPONSE, "response": response })
}

/// Build an error `control_response` record.
#[must_use]
pub fn error_response(request_id: &str, message: &str) -> Value {
    json!({
        "type": CONTROL_RESPONSE,
        "response": {
            "subtype": "error",
            "request_id": request_id,
            "error": message,
        },
    })
}

/// A decoded inbound `control_response`.
#[derive(Debug, Clone)]
pub struct IncomingResponse {
    /// Request this response answers.
    pub request_id: String,
    /// Success payload, or the error message.
    pub outcome: std::result::Result<Option<Value>, String>,
}

/// Decode a `control_response` record. Returns `None` for envelopes so
/// malformed they carry no usable `request_id`.
#[must_use]
pub fn parse_response(record: &Value) -> Option<IncomingResponse> {
    let response = record.get("response")?;
    let request_id = response.get("request_id")?.as_str()?.to_owned();
    let subtype = response.get("subtype").and_then(Value::as_str).unwrap_or("");

    let outcome = if subtype == "error" {
        let message = match response.get("error") {
            Some(Value::String(text)) => text.clone(),
            Some(other) => other.to_string(),
            None => "unspecified control error".to_owned(),
        };
        Err(message)
    } else {
        Ok(response.get("response").cloned())
    };

    Some(IncomingResponse {
        request_id,
        outcome,
    })
}

// ── Hook configuration ────────────────────────────────────────────────────────

/// Serialize the hook configuration for the initialize handshake,
/// allocating callback identifiers in registration order.
///
/// Events are emitted in their canonical order so identifier allocation
/// is deterministic. Returns the wire payload and the allocation list
/// `(callback_id, callback)` used to populate the registry.
#[must_use]
pub fn build_hook_config(
    hooks: &std::collections::HashMap<HookEvent, Vec<HookMatcher>>,
) -> Option<(Value, Vec<(String, crate::hooks::HookCallback)>)> {
    if hooks.values().all(Vec::is_empty) {
        return None;
    }

    let mut events: Vec<_> = hooks
        .iter()
        .filter(|(_, matchers)| !matchers.is_empty())
        .collect();
    events.sort_by_key(|(event, _)| **event);

    let mut allocations = Vec::new();
    let mut config = serde_json::Map::new();

    for (event, matchers) in events {
        let mut wire_matchers = Vec::new();
        for matcher in matchers {
            let mut ids = Vec::new();
            for callback in &matcher.hooks {
                let id = format!("hook_{}", allocations.len());
                ids.push(Value::String(id.clone()));
                allocations.push((id, callback.clone()));
            }

            let mut entry = serde_json::Map::new();
            if let Some(pattern) = &matcher.matcher {
                entry.insert("matcher".into(), json!(pattern));
            }
            entry.insert("hookCallbackIds".into(), Value::Array(ids));
            if let Some(timeout) = matcher.timeout {
                entry.insert("timeout".into(), json!(timeout));
            }
            wire_matchers.push(Value::Object(entry));
        }
        config.insert(event.as_str().into(), Value::Array(wire_matchers));
    }

    Some((Value::Object(config), allocations))
}

// ── Tests ─────────────────────────────────────────────────────────────────────
