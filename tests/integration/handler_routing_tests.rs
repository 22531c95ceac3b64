//! Integration tests for record routing: data-plane ordering,
//! request/response correlation, timeouts, and cancel records.

use std::collections::HashMap;
use std::time::Duration;

use serde_json::json;

use agent_duplex::control::{ControlHandler, OutboundRequest};
use agent_duplex::errors::AgentError;

use super::support::MockTransport;

fn bare_handler(
    transport: std::sync::Arc<MockTransport>,
) -> ControlHandler {
    ControlHandler::new(transport, HashMap::new(), None)
}

// ── Data-plane ordering ──────────────────────────────────────────────────────

/// Non-control records reach the consumer in the exact order received,
/// with no gaps and no duplicates.
#[tokio::test]
async fn data_plane_order_is_preserved() {
    let (transport, tool) = MockTransport::new();
    let handler = bare_handler(transport);
    handler.start().expect("start");

    tool.send(json!({ "type": "system", "subtype": "init", "data": {} }));
    tool.send(json!({ "type": "assistant", "seq": 1 }));
    tool.send(json!({ "type": "assistant", "seq": 2 }));
    tool.send(json!({ "type": "result", "seq": 3 }));
    tool.close_stream();

    let mut seen = Vec::new();
    while let Some(record) = handler.next_record().await {
        seen.push(record.expect("data record"));
    }

    assert_eq!(seen.len(), 4, "no gaps, no duplicates");
    assert_eq!(seen[0]["subtype"], "init");
    assert_eq!(seen[1]["seq"], 1);
    assert_eq!(seen[2]["seq"], 2);
    assert_eq!(seen[3]["seq"], 3);
    assert!(handler.first_result_seen(), "result record must raise the latch");
}

/// Control-plane records never leak into the data channel.
#[tokio::test]
async fn control_records_do_not_reach_the_consumer() {
    let (transport, tool) = MockTransport::new();
    let handler = bare_handler(transport);
    handler.start().expect("start");

    tool.send(json!({
        "type": "control_response",
        "response": { "subtype": "success", "request_id": "req_unknown" },
    }));
    tool.send(json!({ "type": "control_cancel_request", "request_id": "req_x" }));
    tool.send(json!({ "type": "assistant", "seq": 1 }));
    tool.close_stream();

    let mut seen = Vec::new();
    while let Some(record) = handler.next_record().await {
        seen.push(record.expect("data record"));
    }
    assert_eq!(seen.len(), 1);
    assert_eq!(seen[0]["seq"], 1);
}

// ── Correlation ──────────────────────────────────────────────────────────────

/// An outbound request resolves with the payload of the response whose
/// `request_id` matches.
#[tokio::test]
async fn response_resolves_matching_pending_request() {
    let (transport, tool) = MockTransport::new();
    let handler = std::sync::Arc::new(bare_handler(transport.clone()));
    handler.start().expect("start");

    let send = tokio::spawn({
        let handler = std::sync::Arc::clone(&handler);
        async move { handler.send_request(OutboundRequest::McpStatus).await }
    });

    let (request_id, request) = transport.wait_for_request(0).await;
    assert_eq!(request["subtype"], "mcp_status");

    tool.send(json!({
        "type": "control_response",
        "response": {
            "subtype": "success",
            "request_id": request_id,
            "response": { "servers": [] },
        },
    }));

    let payload = send.await.expect("join").expect("request resolves");
    assert_eq!(payload, Some(json!({ "servers": [] })));
}

/// An error response fails exactly the matching request.
#[tokio::test]
async fn error_response_fails_the_request() {
    let (transport, tool) = MockTransport::new();
    let handler = std::sync::Arc::new(bare_handler(transport.clone()));
    handler.start().expect("start");

    let send = tokio::spawn({
        let handler = std::sync::Arc::clone(&handler);
        async move {
            handler
                .send_request(OutboundRequest::SetModel {
                    model: Some("nope".into()),
                })
                .await
        }
    });

    let (request_id, _) = transport.wait_for_request(0).await;
    tool.send(json!({
        "type": "control_response",
        "response": {
            "subtype": "error",
            "request_id": request_id,
            "error": "unknown model",
        },
    }));

    let err = send.await.expect("join").expect_err("must fail");
    assert!(err.to_string().contains("unknown model"), "got: {err}");
}

/// A timed-out request surfaces the distinguished timeout error, evicts
/// its pending entry, and a late response is dropped harmlessly.
#[tokio::test]
async fn timeout_evicts_pending_entry() {
    let (transport, tool) = MockTransport::new();
    let handler = bare_handler(transport.clone());
    handler.start().expect("start");

    let err = handler
        .send_request_with_timeout(OutboundRequest::Interrupt, Duration::from_millis(50))
        .await
        .expect_err("must time out");
    match err {
        AgentError::ControlTimeout { subtype, .. } => assert_eq!(subtype, "interrupt"),
        other => panic!("expected ControlTimeout, got {other:?}"),
    }

    // The late response matches nothing and is dropped; traffic after it
    // still flows.
    let (request_id, _) = transport.wait_for_request(0).await;
    tool.send(json!({
        "type": "control_response",
        "response": { "subtype": "success", "request_id": request_id },
    }));
    tool.send(json!({ "type": "assistant", "seq": 1 }));

    let record = handler.next_record().await.expect("record").expect("ok");
    assert_eq!(record["seq"], 1);
}

/// `control_cancel_request` records are accepted and discarded without
/// failing the stream.
#[tokio::test]
async fn cancel_request_records_are_discarded() {
    let (transport, tool) = MockTransport::new();
    let handler = bare_handler(transport);
    handler.start().expect("start");

    tool.send(json!({ "type": "control_cancel_request", "request_id": "req_1" }));
    tool.send(json!({ "type": "result" }));
    tool.close_stream();

    let record = handler.next_record().await.expect("record").expect("ok");
    assert_eq!(record["type"], "result");
    assert!(handler.next_record().await.is_none(), "stream then closes cleanly");
}

/// A poisoned write fails the issuing request and every other pending
/// request with the same error.
#[tokio::test]
async fn write_failure_poisons_all_pending() {
    let (transport, tool) = MockTransport::new();
    let handler = std::sync::Arc::new(bare_handler(transport.clone()));
    handler.start().expect("start");

    let first = tokio::spawn({
        let handler = std::sync::Arc::clone(&handler);
        async move { handler.send_request(OutboundRequest::McpStatus).await }
    });
    transport.wait_for_request(0).await;

    transport.fail_writes();
    let err = handler
        .send_request(OutboundRequest::Interrupt)
        .await
        .expect_err("write must fail");
    assert!(matches!(err, AgentError::ConnectionLost(_)), "got {err:?}");

    let first_err = first.await.expect("join").expect_err("pending must fail too");
    assert!(
        matches!(first_err, AgentError::ConnectionLost(_)),
        "pending request must fail with the same error, got {first_err:?}"
    );

    drop(tool);
}
