//! Typed conversational messages and content blocks.
//!
//! The wire is JSON; the downstream type system is closed. Five message
//! variants and four content-block variants cover everything the tool
//! emits on its data plane. Interior payloads (`system` data, stream
//! events, usage counters) stay opaque [`Value`]s until a consumer asks
//! to interpret them.

pub mod parser;

pub use parser::parse_message;

use serde::{Deserialize, Serialize};
use serde_json::{json, Map, Value};

// ── Content blocks ────────────────────────────────────────────────────────────

/// A single typed block inside a user or assistant message.
#[derive(Debug, Clone, Serialize, Deserialize, PartialEq)]
#[serde(tag = "type", rename_all = "snake_case")]
pub enum ContentBlock {
    /// Plain text.
    Text {
        /// The text content.
        text: String,
    },
    /// Extended thinking with its integrity signature.
    Thinking {
        /// The thinking content.
        thinking: String,
        /// Signature over the thinking content.
        signature: String,
    },
    /// A tool invocation requested by the model.
    ToolUse {
        /// Unique invocation identifier.
        id: String,
        /// Tool name.
        name: String,
        /// Tool input payload.
        input: Value,
    },
    /// The result of a tool invocation.
    ToolResult {
        /// Identifier of the invocation this result answers.
        tool_use_id: String,
        /// Result content (string or block list), when present.
        #[serde(skip_serializing_if = "Option::is_none")]
        content: Option<Value>,
        /// Whether the tool reported an error.
        #[serde(skip_serializing_if = "Option::is_none")]
        is_error: Option<bool>,
    },
}

// ── Message variants ──────────────────────────────────────────────────────────

/// Error classification attached to a failed assistant turn.
#[derive(Debug, Clone, Copy, Serialize, Deserialize, PartialEq, Eq)]
#[serde(rename_all = "snake_case")]
pub enum AssistantError {
    /// Authentication failure.
    AuthFailed,
    /// Billing or quota failure.
    Billing,
    /// Rate limited.
    RateLimit,
    /// Malformed request.
    InvalidRequest,
    /// Upstream server failure.
    Server,
    /// Unclassified failure.
    Unknown,
}

/// Content of a user message: a plain string or typed blocks.
#[derive(Debug, Clone, Serialize, Deserialize, PartialEq)]
#[serde(untagged)]
pub enum UserContent {
    /// Plain prompt text.
    Text(String),
    /// Typed content blocks (e.g. tool results).
    Blocks(Vec<ContentBlock>),
}

/// A user input echo.
#[derive(Debug, Clone, PartialEq)]
pub struct UserMessage {
    /// Message content.
    pub content: UserContent,
    /// Record identifier, when the tool assigns one.
    pub uuid: Option<String>,
    /// Parent tool invocation, for nested agent traffic.
    pub parent_tool_use_id: Option<String>,
}

/// An assistant output message.
#[derive(Debug, Clone, PartialEq)]
pub struct AssistantMessage {
    /// Typed content blocks.
    pub content: Vec<ContentBlock>,
    /// Model that produced the message.
    pub model: String,
    /// Parent tool invocation, for nested agent traffic.
    pub parent_tool_use_id: Option<String>,
    /// Error classification, when the turn failed.
    pub error: Option<AssistantError>,
}

/// A periodic system notice.
///
/// The `init` subtype carries the tool's advertised capabilities
/// (available tools, slash commands, loaded agents and plugins). `data`
/// is deliberately untyped — match on `subtype` and drill into the raw
/// JSON as needed.
#[derive(Debug, Clone, PartialEq)]
pub struct SystemMessage {
    /// Notice subtype (e.g. `init`).
    pub subtype: String,
    /// Subtype-specific payload, kept opaque.
    pub data: Value,
}

/// The terminal record of a response turn.
#[derive(Debug, Clone, Serialize, Deserialize, PartialEq)]
pub struct ResultMessage {
    /// Result subtype (e.g. `success`, `error_during_execution`).
    pub subtype: String,
    /// Total wall-clock duration of the turn, in milliseconds.
    pub duration_ms: u64,
    /// Time spent in API calls, in milliseconds.
    pub duration_api_ms: u64,
    /// Whether the turn ended in error.
    pub is_error: bool,
    /// Number of conversational turns consumed.
    pub num_turns: u32,
    /// Session this result belongs to.
    pub session_id: String,
    /// Total cost of the turn in USD, when reported.
    #[serde(skip_serializing_if = "Option::is_none")]
    pub total_cost_usd: Option<f64>,
    /// Token usage counters, kept opaque.
    #[serde(skip_serializing_if = "Option::is_none")]
    pub usage: Option<Value>,
    /// Final result text, when the turn produced one.
    #[serde(skip_serializing_if = "Option::is_none")]
    pub result: Option<String>,
    /// Structured output payload, passed through untouched.
    #[serde(skip_serializing_if = "Option::is_none")]
    pub structured_output: Option<Value>,
    /// Keys this crate does not model, preserved rather than dropped.
    #[serde(flatten)]
    pub extra: Map<String, Value>,
}

/// An incremental partial-message event.
#[derive(Debug, Clone, Serialize, Deserialize, PartialEq)]
pub struct StreamEvent {
    /// Event record identifier.
    pub uuid: String,
    /// Session this event belongs to.
    pub session_id: String,
    /// Raw API stream event, kept opaque.
    pub event: Value,
    /// Parent tool invocation, for nested agent traffic.
    #[serde(skip_serializing_if = "Option::is_none")]
    pub parent_tool_use_id: Option<String>,
}

/// A typed data-plane message from the tool.
#[derive(Debug, Clone, PartialEq)]
pub enum Message {
    /// Echo of user input.
    User(UserMessage),
    /// Assistant output.
    Assistant(AssistantMessage),
    /// System notice.
    System(SystemMessage),
    /// Terminal result of a response turn.
    Result(ResultMessage),
    /// Incremental partial-message event.
    StreamEvent(StreamEvent),
}

impl Message {
    /// Re-encode this message into its wire record shape.
    ///
    /// `parse_message(m.to_record())` reproduces `m` for every variant.
    #[must_use]
    pub fn to_record(&self) -> Value {
        match self {
            Self::User(user) => {
                let mut record = json!({
                    "type": "user",
                    "message": { "role": "user", "content": user.content },
                });
                if let Some(uuid) = &user.uuid {
                    record["uuid"] = json!(uuid);
                }
                if let Some(parent) = &user.parent_tool_use_id {
                    record["parent_tool_use_id"] = json!(parent);
                }
                record
            }
            Self::Assistant(assistant) => {
                let mut record = json!({
                    "type": "assistant",
                    "message": {
                        "content": assistant.content,
                        "model": assistant.model,
                    },
                });
                if let Some(parent) = &assistant.parent_tool_use_id {
                    record["parent_tool_use_id"] = json!(parent);
                }
                if let Some(error) = &assistant.error {
                    record["error"] = json!(error);
                }
                record
            }
            Self::System(system) => json!({
                "type": "system",
                "subtype": system.subtype,
                "data": system.data,
            }),
            Self::Result(result) => {
                let mut record = serde_json::to_value(result)
                    .unwrap_or_else(|_| Value::Object(Map::new()));
                record["type"] = json!("result");
                record
            }
            Self::StreamEvent(event) => {
                let mut record = serde_json::to_value(event)
                    .unwrap_or_else(|_| Value::Object(Map::new()));
                record["type"] = json!("stream_event");
                record
            }
        }
    }
}
