//! Unit tests for the message parser: every variant, every content
//! block, and the rejection paths.

use serde_json::json;

use agent_duplex::errors::AgentError;
use agent_duplex::message::{parse_message, ContentBlock, Message, UserContent};

// ── Variant decoding ─────────────────────────────────────────────────────────

#[test]
fn user_message_with_string_content() {
    let record = json!({
        "type": "user",
        "message": { "role": "user", "content": "hello" },
        "uuid": "u-1",
    });
    match parse_message(record).expect("parse") {
        Message::User(user) => {
            assert_eq!(user.content, UserContent::Text("hello".into()));
            assert_eq!(user.uuid.as_deref(), Some("u-1"));
            assert!(user.parent_tool_use_id.is_none());
        }
        other => panic!("expected User, got {other:?}"),
    }
}

#[test]
fn user_message_with_tool_result_blocks() {
    let record = json!({
        "type": "user",
        "message": {
            "role": "user",
            "content": [{
                "type": "tool_result",
                "tool_use_id": "toolu_1",
                "content": "ok",
                "is_error": false,
            }],
        },
    });
    match parse_message(record).expect("parse") {
        Message::User(user) => match user.content {
            UserContent::Blocks(blocks) => {
                assert_eq!(blocks.len(), 1);
                assert!(matches!(blocks[0], ContentBlock::ToolResult { .. }));
            }
            other => panic!("expected blocks, got {other:?}"),
        },
        other => panic!("expected User, got {other:?}"),
    }
}

#[test]
fn assistant_message_decodes_all_block_types() {
    let record = json!({
        "type": "assistant",
        "message": {
            "content": [
                { "type": "text", "text": "4" },
                { "type": "thinking", "thinking": "2+2", "signature": "sig" },
                { "type": "tool_use", "id": "toolu_1", "name": "Bash", "input": {"cmd": "ls"} },
            ],
            "model": "opus-4",
        },
        "parent_tool_use_id": "toolu_0",
    });
    match parse_message(record).expect("parse") {
        Message::Assistant(assistant) => {
            assert_eq!(assistant.model, "opus-4");
            assert_eq!(assistant.content.len(), 3);
            assert_eq!(assistant.parent_tool_use_id.as_deref(), Some("toolu_0"));
            assert!(assistant.error.is_none());
        }
        other => panic!("expected Assistant, got {other:?}"),
    }
}

#[test]
fn assistant_error_classification_decodes() {
    let record = json!({
        "type": "assistant",
        "message": { "content": [], "model": "opus-4" },
        "error": "rate_limit",
    });
    match parse_message(record).expect("parse") {
        Message::Assistant(assistant) => {
            assert_eq!(
                assistant.error,
                Some(agent_duplex::message::AssistantError::RateLimit)
            );
        }
        other => panic!("expected Assistant, got {other:?}"),
    }
}

#[test]
fn result_message_decodes_required_and_optional_fields() {
    let record = json!({
        "type": "result",
        "subtype": "success",
        "duration_ms": 1042,
        "duration_api_ms": 980,
        "is_error": false,
        "num_turns": 1,
        "session_id": "s-1",
        "total_cost_usd": 0.0012,
        "result": "4",
        "structured_output": { "answer": 4 },
    });
    match parse_message(record).expect("parse") {
        Message::Result(result) => {
            assert_eq!(result.subtype, "success");
            assert_eq!(result.num_turns, 1);
            assert_eq!(result.total_cost_usd, Some(0.0012));
            assert_eq!(result.result.as_deref(), Some("4"));
            assert_eq!(result.structured_output, Some(json!({ "answer": 4 })));
        }
        other => panic!("expected Result, got {other:?}"),
    }
}

#[test]
fn stream_event_keeps_event_opaque() {
    let record = json!({
        "type": "stream_event",
        "uuid": "e-1",
        "session_id": "s-1",
        "event": { "type": "content_block_delta", "delta": { "text": "4" } },
    });
    match parse_message(record).expect("parse") {
        Message::StreamEvent(event) => {
            assert_eq!(event.event["type"], "content_block_delta");
        }
        other => panic!("expected StreamEvent, got {other:?}"),
    }
}

// ── Rejection paths ──────────────────────────────────────────────────────────

#[test]
fn missing_type_is_rejected() {
    let err = parse_message(json!({ "message": {} })).expect_err("must fail");
    assert!(matches!(err, AgentError::MessageParse { .. }));
}

#[test]
fn unknown_type_preserves_record() {
    let record = json!({ "type": "telemetry", "data": 1 });
    match parse_message(record.clone()) {
        Err(AgentError::MessageParse { reason, record: kept }) => {
            assert!(reason.contains("telemetry"), "got: {reason}");
            assert_eq!(kept, record);
        }
        other => panic!("expected MessageParse, got {other:?}"),
    }
}

#[test]
fn missing_required_field_is_rejected() {
    // Assistant without a model.
    let record = json!({
        "type": "assistant",
        "message": { "content": [] },
    });
    assert!(parse_message(record).is_err());

    // Result without duration counters.
    let record = json!({ "type": "result", "subtype": "success" });
    assert!(parse_message(record).is_err());
}

#[test]
fn unknown_content_block_fails_the_message() {
    let record = json!({
        "type": "assistant",
        "message": {
            "content": [{ "type": "text", "text": "ok" }, { "type": "video", "url": "x" }],
            "model": "opus-4",
        },
    });
    let err = parse_message(record).expect_err("must fail");
    assert!(matches!(err, AgentError::MessageParse { .. }));
}
