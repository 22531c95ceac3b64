//! Decoder from raw JSON records into typed [`Message`] variants.
//!
//! The parser is total and pure: it performs no I/O, accepts any
//! [`Value`], and either returns a typed message or a
//! [`AgentError::MessageParse`] that preserves the offending record.
//!
//! Content blocks inside assistant messages are decoded eagerly; an
//! unknown block `type` fails the whole message. Records lacking `type`,
//! carrying an unknown `type`, or missing required fields for the
//! detected variant are rejected.

use serde::Deserialize;
use serde_json::Value;

use crate::errors::{AgentError, Result};
use crate::message::{
    AssistantError, AssistantMessage, ContentBlock, Message, ResultMessage, StreamEvent,
    SystemMessage, UserContent, UserMessage,
};

// ── Wire payload shapes ───────────────────────────────────────────────────────

#[derive(Deserialize)]
struct UserRecord {
    message: UserPayload,
    #[serde(default)]
    uuid: Option<String>,
    #[serde(default)]
    parent_tool_use_id: Option<String>,
}

#[derive(Deserialize)]
struct UserPayload {
    content: Value,
}

#[derive(Deserialize)]
struct AssistantRecord {
    message: AssistantPayload,
    #[serde(default)]
    parent_tool_use_id: Option<String>,
    #[serde(default)]
    error: Option<AssistantError>,
}

#[derive(Deserialize)]
struct AssistantPayload {
    content: Vec<ContentBlock>,
    model: String,
}

#[derive(Deserialize)]
struct SystemRecord {
    subtype: String,
    #[serde(default)]
    data: Value,
}

#[derive(Deserialize)]
struct StreamEventRecord {
    uuid: String,
    session_id: String,
    event: Value,
    #[serde(default)]
    parent_tool_use_id: Option<String>,
}

// ── Public API ────────────────────────────────────────────────────────────────

/// Decode one raw JSON record into a typed [`Message`].
///
/// # Errors
///
/// Returns [`AgentError::MessageParse`] — with the raw record preserved —
/// when the record lacks `type`, carries an unknown `type`, or is missing
/// a required field for the detected variant.
pub fn parse_message(record: Value) -> Result<Message> {
    let Some(kind) = record.get("type").and_then(Value::as_str) else {
        return Err(parse_error("record is missing string field `type`", record));
    };

    match kind {
        "user" => parse_user(record),
        "assistant" => parse_assistant(record),
        "system" => parse_system(record),
        "result" => parse_result(record),
        "stream_event" => parse_stream_event(record),
        other => {
            let reason = format!("unknown message type `{other}`");
            Err(parse_error(reason, record))
        }
    }
}

// ── Variant decoders ──────────────────────────────────────────────────────────

fn parse_user(record: Value) -> Result<Message> {
    let wire: UserRecord = decode(&record, "user")?;

    let content = match wire.message.content {
        Value::String(text) => UserContent::Text(text),
        array @ Value::Array(_) => {
            let blocks: Vec<ContentBlock> = serde_json::from_value(array).map_err(|e| {
                parse_error(format!("user content block: {e}"), record.clone())
            })?;
            UserContent::Blocks(blocks)
        }
        other => {
            let reason = format!(
                "user content must be a string or block array, got {}",
                json_kind(&other)
            );
            return Err(parse_error(reason, record));
        }
    };

    Ok(Message::User(UserMessage {
        content,
        uuid: wire.uuid,
        parent_tool_use_id: wire.parent_tool_use_id,
    }))
}

fn parse_assistant(record: Value) -> Result<Message> {
    let wire: AssistantRecord = decode(&record, "assistant")?;

    Ok(Message::Assistant(AssistantMessage {
        content: wire.message.content,
        model: wire.message.model,
        parent_tool_use_id: wire.parent_tool_use_id,
        error: wire.error,
    }))
}

fn parse_system(record: Value) -> Result<Message> {
    let wire: SystemRecord = decode(&record, "system")?;

    Ok(Message::System(SystemMessage {
        subtype: wire.subtype,
        data: wire.data,
    }))
}

fn parse_result(record: Value) -> Result<Message> {
    let mut stripped = record.clone();
    if let Some(map) = stripped.as_object_mut() {
        map.remove("type");
    }
    let wire: ResultMessage = serde_json::from_value(stripped)
        .map_err(|e| parse_error(format!("result record: {e}"), record))?;

    Ok(Message::Result(wire))
}

fn parse_stream_event(record: Value) -> Result<Message> {
    let wire: StreamEventRecord = decode(&record, "stream_event")?;

    Ok(Message::StreamEvent(StreamEvent {
        uuid: wire.uuid,
        session_id: wire.session_id,
        event: wire.event,
        parent_tool_use_id: wire.parent_tool_use_id,
    }))
}

// ── Private helpers ───────────────────────────────────────────────────────────

/// Deserialize `record` into a wire payload struct, mapping failures to
/// [`AgentError::MessageParse`] with the record preserved.
fn decode<T: serde::de::DeserializeOwned>(record: &Value, variant: &str) -> Result<T> {
    serde_json::from_value(record.clone())
        .map_err(|e| parse_error(format!("{variant} record: {e}"), record.clone()))
}

fn parse_error(reason: impl Into<String>, record: Value) -> AgentError {
    AgentError::MessageParse {
        reason: reason.into(),
        record,
    }
}

/// Human-readable JSON type name for error messages.
fn json_kind(value: &Value) -> &'static str {
    match value {
        Value::Null => "null",
        Value::Bool(_) => "bool",
        Value::Number(_) => "number",
        Value::String(_) => "string",
        Value::Array(_) => "array",
        Value::Object(_) => "object",
    }
}

// ── Tests ─────────────────────────────────────────────────────────────────────
